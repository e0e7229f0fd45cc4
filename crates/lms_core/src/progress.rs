//! crates/lms_core/src/progress.rs
//!
//! Course progress roll-up. Completing a section cascades upward through
//! module, lesson and course. Every stage re-derives completion from full
//! child counts rather than incrementing, so a replayed call converges on
//! the same stored state.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::CourseCompletion;
use crate::ports::{DatabaseService, PortResult};

/// Computes a whole percent from child counts. An entity with no children
/// reports 0, never a division error.
pub fn completion_percent(completed: usize, total: usize) -> i16 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i16
}

/// What a single section completion changed further up the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupOutcome {
    pub module_completed: bool,
    pub lesson_completed: bool,
    pub course: CourseCompletion,
}

/// Orchestrates the upward recalculation. Each stage issues its own reads
/// and writes; there is no surrounding transaction, and a stage only ever
/// narrows toward the derived truth, so interleaved completions of sibling
/// sections cannot corrupt the totals.
pub struct ProgressTracker {
    db: Arc<dyn DatabaseService>,
}

impl ProgressTracker {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Marks a section complete for a learner and rolls the change up.
    /// Idempotent: repeating the call rewrites the same derived state.
    pub async fn complete_section(
        &self,
        user_id: Uuid,
        section_id: Uuid,
    ) -> PortResult<RollupOutcome> {
        let section = self.db.get_section(section_id).await?;
        self.db
            .upsert_section_progress(user_id, section_id, Utc::now())
            .await?;

        let module = self.db.get_module(section.module_id).await?;
        let module_completed = self.recalc_module(user_id, module.id).await?;

        let lesson = self.db.get_lesson(module.lesson_id).await?;
        let lesson_completed = self.recalc_lesson(user_id, lesson.id).await?;

        let course = self.recalc_course(user_id, lesson.course_id).await?;

        tracing::debug!(
            %user_id,
            %section_id,
            module_completed,
            lesson_completed,
            course_percent = course.percent,
            "section completion rolled up"
        );

        Ok(RollupOutcome {
            module_completed,
            lesson_completed,
            course,
        })
    }

    /// Re-derives module completion from its section counts. A module with
    /// no sections is never complete. Only completion is persisted; an
    /// incomplete module keeps no progress row.
    pub async fn recalc_module(&self, user_id: Uuid, module_id: Uuid) -> PortResult<bool> {
        let sections = self.db.list_sections(module_id).await?;
        if sections.is_empty() {
            return Ok(false);
        }

        let ids: Vec<Uuid> = sections.iter().map(|s| s.id).collect();
        let completed = self.db.count_completed_sections(user_id, &ids).await?;
        let done = completed == sections.len();
        if done {
            self.db
                .upsert_module_progress(user_id, module_id, Utc::now())
                .await?;
        }
        Ok(done)
    }

    /// Re-derives lesson completion from its module counts, with the same
    /// rules as `recalc_module`.
    pub async fn recalc_lesson(&self, user_id: Uuid, lesson_id: Uuid) -> PortResult<bool> {
        let modules = self.db.list_modules(lesson_id).await?;
        if modules.is_empty() {
            return Ok(false);
        }

        let ids: Vec<Uuid> = modules.iter().map(|m| m.id).collect();
        let completed = self.db.count_completed_modules(user_id, &ids).await?;
        let done = completed == modules.len();
        if done {
            self.db
                .upsert_lesson_progress(user_id, lesson_id, Utc::now())
                .await?;
        }
        Ok(done)
    }

    /// Recomputes the course percent over its lessons and writes it onto
    /// the learner's enrollment row. The course counts as completed exactly
    /// when the rounded percent reaches 100.
    pub async fn recalc_course(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<CourseCompletion> {
        let lessons = self.db.list_lessons(course_id).await?;
        let ids: Vec<Uuid> = lessons.iter().map(|l| l.id).collect();
        let completed = self.db.count_completed_lessons(user_id, &ids).await?;

        let percent = completion_percent(completed, lessons.len());
        let is_completed = percent == 100;
        let completed_at = if is_completed { Some(Utc::now()) } else { None };

        self.db
            .update_course_progress(user_id, course_id, percent, is_completed, completed_at)
            .await?;

        Ok(CourseCompletion {
            percent,
            is_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_zero_children_is_zero() {
        assert_eq!(completion_percent(0, 0), 0);
    }

    #[test]
    fn percent_rounds_to_nearest_whole() {
        assert_eq!(completion_percent(1, 3), 33);
        assert_eq!(completion_percent(2, 3), 67);
        assert_eq!(completion_percent(1, 2), 50);
        assert_eq!(completion_percent(3, 3), 100);
    }

    #[test]
    fn percent_never_exceeds_one_hundred() {
        assert_eq!(completion_percent(7, 7), 100);
        assert_eq!(completion_percent(0, 5), 0);
    }
}
