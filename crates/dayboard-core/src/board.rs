use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::datetime;
use crate::task::{Column, Task};

/// Where a relocated task lands in its destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Head,
    Tail,
}

/// The board owns the task and column collections outright; every mutation
/// goes through it, and every mutation returns with the membership
/// invariant intact: each task id sits in at most one column, and column
/// entries always point at live tasks.
///
/// Bad input (blank text, unknown ids) is a silent no-op, not an error.
/// Callers are expected to pre-validate, but the store stays defensive.
#[derive(Debug, Clone)]
pub struct Board {
    pub(crate) tasks: Vec<Task>,
    pub(crate) columns: Vec<Column>,
    pub(crate) selected_date: NaiveDate,
}

impl Board {
    /// Assembles a board from deserialized parts, repairing membership
    /// before anything else sees it.
    pub fn from_parts(tasks: Vec<Task>, columns: Vec<Column>, selected_date: NaiveDate) -> Self {
        let mut board = Self {
            tasks,
            columns,
            selected_date,
        };
        board.normalize();
        board
    }

    /// The hard-coded starter board used whenever persisted data is
    /// missing, malformed, or empty.
    pub fn seed(selected_date: NaiveDate, now: DateTime<Utc>) -> Self {
        let sample = |text: &str, completed: bool| Task {
            id: Uuid::new_v4(),
            text: text.to_string(),
            completed,
            date: None,
            created_at: now,
            due_at: None,
        };

        let plan = sample("Plan the day", false);
        let polish = sample("Polish the layout", false);
        let drag = sample("Drag a card to reorder", false);
        let ship = sample("Ship it", true);

        let columns = vec![
            Column {
                id: Uuid::new_v4(),
                name: "Todo".to_string(),
                task_ids: vec![plan.id, drag.id],
            },
            Column {
                id: Uuid::new_v4(),
                name: "Doing".to_string(),
                task_ids: vec![polish.id],
            },
            Column {
                id: Uuid::new_v4(),
                name: "Done".to_string(),
                task_ids: vec![ship.id],
            },
        ];

        Self {
            tasks: vec![plan, polish, drag, ship],
            columns,
            selected_date,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn column(&self, id: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Resolves an externally supplied container key: a column id, or a
    /// unique case-insensitive column name.
    pub fn resolve_column_key(&self, key: &str) -> Option<Uuid> {
        if let Ok(id) = key.trim().parse::<Uuid>() {
            if self.columns.iter().any(|c| c.id == id) {
                return Some(id);
            }
        }

        let mut matches = self
            .columns
            .iter()
            .filter(|c| c.name.eq_ignore_ascii_case(key.trim()));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first.id)
        }
    }

    /// Creates a task dated to the selected date and inserts it at the
    /// head of both the collection and the target column (the first column
    /// when the given id is absent). Blank text is ignored.
    #[tracing::instrument(skip(self, text, now))]
    pub fn add_task(
        &mut self,
        text: &str,
        column_id: Option<Uuid>,
        due_time: Option<NaiveTime>,
        now: DateTime<Utc>,
    ) -> Option<&Task> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("ignoring task with blank text");
            return None;
        }

        if self.columns.is_empty() {
            self.columns.push(Column::new("Column"));
        }

        let task = Task::new(
            trimmed.to_string(),
            self.selected_date,
            datetime::due_at_on(self.selected_date, due_time),
            now,
        );

        let target = column_id
            .and_then(|id| self.columns.iter().position(|c| c.id == id))
            .unwrap_or(0);
        self.columns[target].task_ids.insert(0, task.id);
        info!(task = %task.id, column = %self.columns[target].id, "added task");

        self.tasks.insert(0, task);
        self.tasks.first()
    }

    /// Drops the task from the collection and from every column.
    /// Idempotent for unknown ids.
    #[tracing::instrument(skip(self))]
    pub fn remove_task(&mut self, id: Uuid) {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        for col in &mut self.columns {
            col.task_ids.retain(|tid| *tid != id);
        }
        if self.tasks.len() < before {
            info!(task = %id, "removed task");
        }
    }

    /// Flips completion and relocates: completing sends the task to the
    /// head of the first done-like column (else the last column),
    /// reopening to the first todo-like column (else the first).
    #[tracing::instrument(skip(self))]
    pub fn toggle_task(&mut self, id: Uuid) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return;
        };
        task.completed = !task.completed;
        let completed = task.completed;

        let target = if completed {
            self.columns
                .iter()
                .find(|c| c.is_done_like())
                .or_else(|| self.columns.last())
        } else {
            self.columns
                .iter()
                .find(|c| c.is_todo_like())
                .or_else(|| self.columns.first())
        }
        .map(|c| c.id);

        if let Some(column_id) = target {
            self.move_task_to_column(id, column_id, Position::Head);
        }
        info!(task = %id, completed, "toggled task");
    }

    /// Replaces the text when the trimmed value is non-empty; a blank edit
    /// is a revert, not an error. Either way the due time re-anchors to
    /// end of day on the task's own date.
    #[tracing::instrument(skip(self, new_text))]
    pub fn update_task(&mut self, id: Uuid, new_text: &str) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return;
        };
        let trimmed = new_text.trim();
        if !trimmed.is_empty() {
            task.text = trimmed.to_string();
        }
        if let Some(date) = task.date {
            task.due_at = datetime::due_at_on(date, None);
        }
        debug!(task = %id, reverted = trimmed.is_empty(), "updated task");
    }

    /// Same trim-or-keep semantics as task edits.
    #[tracing::instrument(skip(self, new_name))]
    pub fn rename_column(&mut self, id: Uuid, new_name: &str) {
        let Some(col) = self.columns.iter_mut().find(|c| c.id == id) else {
            return;
        };
        let trimmed = new_name.trim();
        if !trimmed.is_empty() {
            col.name = trimmed.to_string();
        }
    }

    /// Deletes the column; its tasks are prepended into the next column,
    /// else the previous, else a freshly created fallback column, so every
    /// task stays reachable.
    #[tracing::instrument(skip(self))]
    pub fn remove_column(&mut self, id: Uuid) {
        let Some(index) = self.columns.iter().position(|c| c.id == id) else {
            return;
        };
        let removed = self.columns.remove(index);
        let rehomed = removed.task_ids.len();

        let target = if index < self.columns.len() {
            index
        } else if index > 0 {
            index - 1
        } else {
            self.columns.push(Column::new("Column"));
            0
        };
        self.columns[target].task_ids.splice(0..0, removed.task_ids);

        info!(column = %id, rehomed, "removed column");
    }

    /// The relocation primitive under both toggling and reconciliation.
    /// Both ids are validated before the task is detached, so an unknown
    /// target can never strand a task outside every column.
    #[tracing::instrument(skip(self))]
    pub fn move_task_to_column(&mut self, task_id: Uuid, column_id: Uuid, position: Position) {
        if self.task(task_id).is_none() {
            return;
        }
        if self.column(column_id).is_none() {
            return;
        }

        for col in &mut self.columns {
            col.task_ids.retain(|tid| *tid != task_id);
        }
        let Some(col) = self.columns.iter_mut().find(|c| c.id == column_id) else {
            return;
        };
        match position {
            Position::Head => col.task_ids.insert(0, task_id),
            Position::Tail => col.task_ids.push(task_id),
        }
        debug!(task = %task_id, column = %column_id, ?position, "moved task");
    }

    /// Permanently drops every task whose date (undated tasks count as
    /// today's) is not `today`, then prunes the columns. One-way by
    /// policy: yesterday's board does not archive. Idempotent.
    #[tracing::instrument(skip(self))]
    pub fn expire_stale(&mut self, today: NaiveDate) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.date.unwrap_or(today) == today);

        let keep: HashSet<Uuid> = self.tasks.iter().map(|t| t.id).collect();
        for col in &mut self.columns {
            col.task_ids.retain(|id| keep.contains(id));
        }

        let dropped = before - self.tasks.len();
        if dropped > 0 {
            info!(dropped, today = %today, "expired stale tasks");
        }
        dropped
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
    }

    /// Membership repair for deserialized data: duplicate ids keep their
    /// first occurrence, ids without a task are dropped, tasks in no
    /// column are prepended to the first one.
    pub(crate) fn normalize(&mut self) {
        let known: HashSet<Uuid> = self.tasks.iter().map(|t| t.id).collect();
        let mut seen: HashSet<Uuid> = HashSet::new();
        for col in &mut self.columns {
            col.task_ids
                .retain(|id| known.contains(id) && seen.insert(*id));
        }

        let orphans: Vec<Uuid> = self
            .tasks
            .iter()
            .map(|t| t.id)
            .filter(|id| !seen.contains(id))
            .collect();
        if orphans.is_empty() {
            return;
        }

        if self.columns.is_empty() {
            self.columns.push(Column::new("Column"));
        }
        warn!(orphans = orphans.len(), "reattached unreferenced tasks");
        self.columns[0].task_ids.splice(0..0, orphans);
    }

    /// Read-only render contract: tasks visible under the selected date,
    /// grouped in column order, with due state computed against `now`.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> BoardSnapshot {
        let visible: HashSet<Uuid> = self
            .tasks
            .iter()
            .filter(|t| t.date.unwrap_or(self.selected_date) == self.selected_date)
            .map(|t| t.id)
            .collect();

        let mut total_visible = 0;
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let tasks: Vec<TaskView> = col
                    .task_ids
                    .iter()
                    .filter(|id| visible.contains(id))
                    .filter_map(|id| self.task(*id))
                    .map(|task| task_view(task, now))
                    .collect();
                total_visible += tasks.len();
                ColumnView {
                    id: col.id,
                    name: col.name.clone(),
                    accepts_quick_add: col.accepts_quick_add(),
                    tasks,
                }
            })
            .collect();

        BoardSnapshot {
            selected_date: self.selected_date,
            columns,
            total_visible,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub selected_date: NaiveDate,
    pub columns: Vec<ColumnView>,
    pub total_visible: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub id: Uuid,
    pub name: String,
    pub accepts_quick_add: bool,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
    pub due_at: Option<DateTime<Utc>>,
    pub overdue: bool,
    pub due_label: Option<String>,
}

fn task_view(task: &Task, now: DateTime<Utc>) -> TaskView {
    let overdue = task
        .due_at
        .map(|due| !task.completed && now > due)
        .unwrap_or(false);
    TaskView {
        id: task.id,
        text: task.text.clone(),
        completed: task.completed,
        due_at: task.due_at,
        overdue,
        due_label: task.due_at.map(|due| datetime::format_relative(due - now)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{Board, Position};
    use crate::task::{Column, Task};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn board() -> Board {
        Board::seed(date(2024, 6, 1), now())
    }

    fn column_id(board: &Board, name: &str) -> Uuid {
        board
            .columns()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
            .expect("column present")
    }

    fn assert_membership(board: &Board) {
        let known: HashSet<Uuid> = board.tasks().iter().map(|t| t.id).collect();
        let mut seen = HashSet::new();
        for col in board.columns() {
            for id in &col.task_ids {
                assert!(known.contains(id), "column references unknown task {id}");
                assert!(seen.insert(*id), "task {id} appears in two columns");
            }
        }
    }

    #[test]
    fn add_inserts_at_head_of_first_column() {
        let mut b = board();
        let id = b
            .add_task("Buy milk", None, None, now())
            .map(|t| t.id)
            .expect("task created");

        assert_eq!(b.tasks()[0].id, id);
        assert_eq!(b.columns()[0].task_ids[0], id);
        assert_eq!(b.tasks()[0].date, Some(date(2024, 6, 1)));
        assert_membership(&b);
    }

    #[test]
    fn add_defaults_due_to_end_of_selected_day() {
        let mut b = board();
        let due = b
            .add_task("Buy milk", None, None, now())
            .and_then(|t| t.due_at)
            .expect("due computed");
        assert_eq!(
            due.with_timezone(crate::datetime::board_timezone())
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            "2024-06-01 23:59:59"
        );
    }

    #[test]
    fn blank_text_is_ignored() {
        let mut b = board();
        let before = b.tasks().len();
        assert!(b.add_task("   ", None, None, now()).is_none());
        assert_eq!(b.tasks().len(), before);
    }

    #[test]
    fn unknown_column_falls_back_to_first() {
        let mut b = board();
        let id = b
            .add_task("Stray", Some(Uuid::new_v4()), None, now())
            .map(|t| t.id)
            .expect("task created");
        assert_eq!(b.columns()[0].task_ids[0], id);
    }

    #[test]
    fn toggle_moves_to_head_of_done() {
        let mut b = board();
        let todo = column_id(&b, "Todo");
        let done = column_id(&b, "Done");
        let id = b
            .add_task("Finish report", None, None, now())
            .map(|t| t.id)
            .expect("task created");

        b.toggle_task(id);

        let task = b.task(id).expect("task still present");
        assert!(task.completed);
        assert_eq!(b.column(done).expect("done column").task_ids[0], id);
        assert!(!b.column(todo).expect("todo column").task_ids.contains(&id));
        assert_membership(&b);
    }

    #[test]
    fn untoggle_returns_to_todo() {
        let mut b = board();
        let todo = column_id(&b, "Todo");
        let id = b
            .add_task("Finish report", None, None, now())
            .map(|t| t.id)
            .expect("task created");

        b.toggle_task(id);
        b.toggle_task(id);

        let task = b.task(id).expect("task still present");
        assert!(!task.completed);
        assert_eq!(b.column(todo).expect("todo column").task_ids[0], id);
        assert_membership(&b);
    }

    #[test]
    fn toggle_without_done_column_uses_last() {
        let mut b = Board::from_parts(
            vec![Task::new("Lone".to_string(), date(2024, 6, 1), None, now())],
            vec![Column::new("Inbox"), Column::new("Someday")],
            date(2024, 6, 1),
        );
        let id = b.tasks()[0].id;

        b.toggle_task(id);

        let last = b.columns().last().expect("columns present");
        assert_eq!(last.name, "Someday");
        assert_eq!(last.task_ids[0], id);
    }

    #[test]
    fn blank_edit_reverts_text() {
        let mut b = board();
        let id = b
            .add_task("Original", None, None, now())
            .map(|t| t.id)
            .expect("task created");

        b.update_task(id, "  ");
        assert_eq!(b.task(id).expect("task").text, "Original");

        b.update_task(id, " Rewritten ");
        assert_eq!(b.task(id).expect("task").text, "Rewritten");
    }

    #[test]
    fn edit_reanchors_due_to_end_of_day() {
        let mut b = board();
        let time = crate::datetime::parse_time_of_day("09:15").expect("valid time");
        let id = b
            .add_task("Early", None, Some(time), now())
            .map(|t| t.id)
            .expect("task created");

        b.update_task(id, "Early still");

        let due = b.task(id).and_then(|t| t.due_at).expect("due present");
        assert_eq!(
            due.with_timezone(crate::datetime::board_timezone())
                .format("%H:%M:%S")
                .to_string(),
            "23:59:59"
        );
    }

    #[test]
    fn remove_column_rehomes_into_next() {
        let mut b = board();
        let todo = column_id(&b, "Todo");
        let doing = column_id(&b, "Doing");
        let moved: Vec<Uuid> = b.column(todo).expect("todo").task_ids.clone();

        b.remove_column(todo);

        let doing_ids = &b.column(doing).expect("doing").task_ids;
        assert_eq!(doing_ids[..moved.len()], moved[..]);
        assert_membership(&b);
    }

    #[test]
    fn removing_last_column_creates_fallback() {
        let t1 = Task::new("One".to_string(), date(2024, 6, 1), None, now());
        let t2 = Task::new("Two".to_string(), date(2024, 6, 1), None, now());
        let only = Column {
            id: Uuid::new_v4(),
            name: "Everything".to_string(),
            task_ids: vec![t1.id, t2.id],
        };
        let expected = only.task_ids.clone();
        let mut b = Board::from_parts(vec![t1, t2], vec![only.clone()], date(2024, 6, 1));

        b.remove_column(only.id);

        assert_eq!(b.columns().len(), 1);
        assert_eq!(b.columns()[0].name, "Column");
        assert_eq!(b.columns()[0].task_ids, expected);
        assert_membership(&b);
    }

    #[test]
    fn move_to_unknown_column_is_a_noop() {
        let mut b = board();
        let id = b
            .add_task("Stays put", None, None, now())
            .map(|t| t.id)
            .expect("task created");

        b.move_task_to_column(id, Uuid::new_v4(), Position::Tail);

        assert_eq!(b.columns()[0].task_ids[0], id);
        assert_membership(&b);
    }

    #[test]
    fn move_to_tail_appends() {
        let mut b = board();
        let doing = column_id(&b, "Doing");
        let id = b
            .add_task("Later", None, None, now())
            .map(|t| t.id)
            .expect("task created");

        b.move_task_to_column(id, doing, Position::Tail);

        let ids = &b.column(doing).expect("doing").task_ids;
        assert_eq!(*ids.last().expect("non-empty"), id);
        assert_membership(&b);
    }

    #[test]
    fn expiry_drops_other_days_and_is_idempotent() {
        let mut b = board();
        b.add_task("Today's", None, None, now());
        b.select_date(date(2024, 5, 31));
        b.add_task("Yesterday's", None, None, now());
        b.select_date(date(2024, 6, 1));

        let dropped = b.expire_stale(date(2024, 6, 1));
        assert_eq!(dropped, 1);
        assert!(b.tasks().iter().all(|t| t.text != "Yesterday's"));

        let again = b.expire_stale(date(2024, 6, 1));
        assert_eq!(again, 0);
        assert_membership(&b);
    }

    #[test]
    fn undated_tasks_survive_expiry() {
        let mut b = board();
        let undated = b.tasks().len();
        b.expire_stale(date(2024, 6, 2));
        // seed tasks carry no date, so they always count as today's
        assert_eq!(b.tasks().len(), undated);
    }

    #[test]
    fn normalize_repairs_foreign_data() {
        let t1 = Task::new("Kept".to_string(), date(2024, 6, 1), None, now());
        let t2 = Task::new("Orphan".to_string(), date(2024, 6, 1), None, now());
        let ghost = Uuid::new_v4();
        let col_a = Column {
            id: Uuid::new_v4(),
            name: "A".to_string(),
            task_ids: vec![t1.id, ghost, t1.id],
        };
        let col_b = Column {
            id: Uuid::new_v4(),
            name: "B".to_string(),
            task_ids: vec![t1.id],
        };

        let b = Board::from_parts(vec![t1.clone(), t2.clone()], vec![col_a, col_b], date(2024, 6, 1));

        assert_membership(&b);
        assert_eq!(b.columns()[0].task_ids, vec![t2.id, t1.id]);
        assert!(b.columns()[1].task_ids.is_empty());
    }

    #[test]
    fn snapshot_filters_by_selected_date_and_flags_overdue() {
        let mut b = board();
        b.add_task("Visible", None, None, now());
        b.select_date(date(2024, 6, 2));
        b.add_task("Hidden tomorrow", None, None, now());
        b.select_date(date(2024, 6, 1));

        let later = Utc
            .with_ymd_and_hms(2024, 6, 3, 0, 0, 0)
            .single()
            .expect("valid instant");
        let snapshot = b.snapshot(later);

        let texts: Vec<&str> = snapshot
            .columns
            .iter()
            .flat_map(|c| c.tasks.iter().map(|t| t.text.as_str()))
            .collect();
        assert!(texts.contains(&"Visible"));
        assert!(!texts.contains(&"Hidden tomorrow"));
        // seed tasks are undated, so they show under the selected date too
        assert_eq!(snapshot.total_visible, texts.len());

        let visible = snapshot
            .columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .find(|t| t.text == "Visible")
            .expect("visible task");
        assert!(visible.overdue);
        assert_eq!(visible.due_label.as_deref(), Some("24 hrs ago"));
    }
}
