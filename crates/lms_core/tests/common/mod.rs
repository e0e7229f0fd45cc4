use chrono::Utc;
use lms_core::memory::MemoryStore;
use lms_core::{
    Course, DatabaseService, Lesson, Module, NewCourse, NewPayment, NewUser, Section, User,
    UserRole,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// A seeded course with its full content tree and an enrolled learner.
pub struct CourseTree {
    pub trainer: User,
    pub learner: User,
    pub course: Course,
    pub lessons: Vec<Lesson>,
    /// Indexed by lesson.
    pub modules: Vec<Vec<Module>>,
    /// Indexed by lesson, then module.
    pub sections: Vec<Vec<Vec<Section>>>,
}

/// Builds a trainer, a learner, a published course of the given shape and
/// a free enrollment for the learner.
pub async fn seed_course_tree(
    store: &MemoryStore,
    lesson_count: usize,
    modules_per_lesson: usize,
    sections_per_module: usize,
) -> CourseTree {
    let trainer = store
        .create_user(NewUser {
            email: "trainer@example.com".into(),
            full_name: "Course Trainer".into(),
            hashed_password: "hash".into(),
            role: UserRole::Trainer,
        })
        .await
        .unwrap();
    let learner = store
        .create_user(NewUser {
            email: "learner@example.com".into(),
            full_name: "Keen Learner".into(),
            hashed_password: "hash".into(),
            role: UserRole::Learner,
        })
        .await
        .unwrap();

    let course = store
        .create_course(NewCourse {
            trainer_id: trainer.id,
            title: "Intro to Distributed Systems".into(),
            description: Some("Consensus, clocks and queues".into()),
            price: dec!(5000.00),
            currency: "KES".into(),
        })
        .await
        .unwrap();

    let mut lessons = Vec::new();
    let mut modules = Vec::new();
    let mut sections = Vec::new();
    for l in 0..lesson_count {
        let lesson = store
            .create_lesson(course.id, &format!("Lesson {}", l + 1), l as i32)
            .await
            .unwrap();
        let mut lesson_modules = Vec::new();
        let mut lesson_sections = Vec::new();
        for m in 0..modules_per_lesson {
            let module = store
                .create_module(lesson.id, &format!("Module {}.{}", l + 1, m + 1), m as i32)
                .await
                .unwrap();
            let mut module_sections = Vec::new();
            for s in 0..sections_per_module {
                let section = store
                    .create_section(
                        module.id,
                        &format!("Section {}.{}.{}", l + 1, m + 1, s + 1),
                        s as i32,
                    )
                    .await
                    .unwrap();
                module_sections.push(section);
            }
            lesson_modules.push(module);
            lesson_sections.push(module_sections);
        }
        lessons.push(lesson);
        modules.push(lesson_modules);
        sections.push(lesson_sections);
    }

    store
        .upsert_enrollment(learner.id, course.id, "free")
        .await
        .unwrap();

    CourseTree {
        trainer,
        learner,
        course,
        lessons,
        modules,
        sections,
    }
}

/// A confirmed card charge for the given learner and course.
pub fn confirmed_charge(user_id: Uuid, course_id: Uuid, reference: &str) -> NewPayment {
    NewPayment {
        user_id,
        course_id,
        reference: reference.to_string(),
        amount: dec!(5000.00),
        currency: "KES".to_string(),
        channel: "card".to_string(),
        plan_code: None,
        paid_at: Utc::now(),
    }
}
