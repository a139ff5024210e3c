use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Column names that mark their tasks as finished. Matching is by name
/// on purpose: boards rename columns freely, and a structural role field
/// would change behavior for every custom-named board out there.
pub const DONE_COLUMN_NAMES: &[&str] = &["done", "completed", "complete"];

/// Column names a reopened task returns to.
pub const TODO_COLUMN_NAMES: &[&str] = &["todo", "to do", "backlog", "tasks"];

/// Workflow stages that only receive tasks by drag or toggle, never by
/// direct quick-add.
const NO_QUICK_ADD_NAMES: &[&str] = &["doing", "done"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,

    pub text: String,

    pub completed: bool,

    /// Calendar day the task belongs to. Absent means "the currently
    /// selected date" wherever filtering happens.
    #[serde(default)]
    pub date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        text: String,
        date: NaiveDate,
        due_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            completed: false,
            date: Some(date),
            created_at: now,
            due_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub name: String,
    pub task_ids: Vec<Uuid>,
}

impl Column {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            task_ids: vec![],
        }
    }

    #[must_use]
    pub fn is_done_like(&self) -> bool {
        name_in(&self.name, DONE_COLUMN_NAMES)
    }

    #[must_use]
    pub fn is_todo_like(&self) -> bool {
        name_in(&self.name, TODO_COLUMN_NAMES)
    }

    #[must_use]
    pub fn accepts_quick_add(&self) -> bool {
        !name_in(&self.name, NO_QUICK_ADD_NAMES)
    }
}

fn name_in(name: &str, names: &[&str]) -> bool {
    names.iter().any(|n| name.eq_ignore_ascii_case(n))
}

#[cfg(test)]
mod tests {
    use super::Column;

    #[test]
    fn done_names_match_case_insensitively() {
        for name in ["Done", "COMPLETED", "complete"] {
            let col = Column::new(name);
            assert!(col.is_done_like(), "{name} should be done-like");
        }
        assert!(!Column::new("Doneish").is_done_like());
    }

    #[test]
    fn quick_add_blocked_for_doing_and_done() {
        assert!(Column::new("Todo").accepts_quick_add());
        assert!(!Column::new("Doing").accepts_quick_add());
        assert!(!Column::new("done").accepts_quick_add());
        // "Completed" is done-like for relocation but was never blocked
        // for direct adds.
        assert!(Column::new("Completed").accepts_quick_add());
    }
}
