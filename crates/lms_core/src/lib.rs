pub mod domain;
pub mod memory;
pub mod ports;
pub mod progress;
pub mod settlement;

pub use domain::{
    AuthSession, ChargeVerification, Course, CourseCompletion, CourseStatus, DailyCompletions,
    DiscussionMessage, DiscussionThread, EnrolledCourse, Enrollment, EnrollmentSummary,
    InitializedTransaction, Invite, Lesson, Module, NewCourse, NewInvite, NewPayment,
    NewStkRequest, NewUser, Payment, Section, StkPushHandle, StkRequest, StkStatus, User,
    UserCredentials, UserRole,
};
pub use memory::{MemoryStore, StaticCardGateway, StaticMobileGateway};
pub use ports::{
    CardPaymentGateway, DatabaseService, MobileMoneyGateway, PortError, PortResult,
};
pub use progress::{completion_percent, ProgressTracker, RollupOutcome};
pub use settlement::{
    minor_to_major, PaymentSettlement, ReconcileReport, SettlementOutcome, PAYMENT_STATUS_PAID,
};
