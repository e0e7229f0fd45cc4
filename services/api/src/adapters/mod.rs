pub mod db;
pub mod mpesa;
pub mod paystack;

pub use db::DbAdapter;
pub use mpesa::MpesaClient;
pub use paystack::PaystackClient;
