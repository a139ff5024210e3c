use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::board::Board;

/// One container's state as reported after a completed drag: the column
/// and the task ids now visually inside it, in order.
#[derive(Debug, Clone)]
pub struct ColumnOrdering {
    pub column_id: Uuid,
    pub task_ids: Vec<Uuid>,
}

/// Maps a raw `container key -> element ids` report, the shape a
/// drag-and-drop layer emits, onto board identifiers. Container keys
/// resolve as a column id or a unique case-insensitive column name;
/// elements must parse as task ids. Anything unresolvable is dropped with
/// a log line and the rest of the report stands.
pub fn orderings_from_raw(
    board: &Board,
    raw: &BTreeMap<String, Vec<String>>,
) -> Vec<ColumnOrdering> {
    let mut orderings = Vec::with_capacity(raw.len());
    for (key, ids) in raw {
        let Some(column_id) = board.resolve_column_key(key) else {
            warn!(key = %key, "unknown container in layout report; dropping");
            continue;
        };
        let task_ids = ids
            .iter()
            .filter_map(|id| match id.parse::<Uuid>() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!(element = %id, "unparseable element id in layout report; dropping");
                    None
                }
            })
            .collect();
        orderings.push(ColumnOrdering { column_id, task_ids });
    }
    orderings
}

impl Board {
    /// Rewrites the store to match the reported per-column orderings, then
    /// re-derives completion from column identity: after a drag, column
    /// membership is the single source of truth, so text-based toggling
    /// and drag relocation converge on the same state.
    ///
    /// Ids that reference no known task or column are dropped; the rest of
    /// the report proceeds. The model and the reporter's snapshot may
    /// transiently diverge, and a stale report must not poison the store.
    #[instrument(skip(self, orderings))]
    pub fn reconcile(&mut self, orderings: &[ColumnOrdering]) {
        let known: HashSet<Uuid> = self.tasks.iter().map(|t| t.id).collect();

        for ordering in orderings {
            let Some(col_idx) = self.columns.iter().position(|c| c.id == ordering.column_id)
            else {
                warn!(column = %ordering.column_id, "reported column not on the board; dropping");
                continue;
            };

            let mut claimed = HashSet::new();
            let mut accepted = Vec::with_capacity(ordering.task_ids.len());
            for id in &ordering.task_ids {
                if !known.contains(id) {
                    warn!(task = %id, "reported task not in the store; dropping");
                    continue;
                }
                if claimed.insert(*id) {
                    accepted.push(*id);
                }
            }

            // A task claimed here may still sit in a column this report
            // did not cover; membership stays unique.
            for (idx, col) in self.columns.iter_mut().enumerate() {
                if idx != col_idx {
                    col.task_ids.retain(|id| !claimed.contains(id));
                }
            }
            self.columns[col_idx].task_ids = accepted;
        }

        self.derive_completion_from_columns();
        debug!(columns = orderings.len(), "applied reported layout");
    }

    /// Every task in a done-like-named column becomes completed; every
    /// other task referenced by any column becomes not completed. Tasks in
    /// no column keep their flag.
    fn derive_completion_from_columns(&mut self) {
        let mut completion: HashMap<Uuid, bool> = HashMap::new();
        for col in &self.columns {
            let done = col.is_done_like();
            for id in &col.task_ids {
                completion.insert(*id, done);
            }
        }
        for task in &mut self.tasks {
            if let Some(done) = completion.get(&task.id) {
                task.completed = *done;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{ColumnOrdering, orderings_from_raw};
    use crate::board::Board;
    use crate::task::{Column, Task};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
    }

    fn task(text: &str) -> Task {
        Task::new(text.to_string(), date(), None, now())
    }

    fn column(name: &str, task_ids: Vec<Uuid>) -> Column {
        Column {
            id: Uuid::new_v4(),
            name: name.to_string(),
            task_ids,
        }
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
    fn layout_overrides_completion_both_ways() {
        let t7 = task("seven");
        let t2 = task("two");
        let mut t9 = task("nine");
        t9.completed = true;

        let todo = column("Todo", vec![t7.id, t2.id]);
        let done = column("Done", vec![t9.id]);
        let (todo_id, done_id) = (todo.id, done.id);
        let mut board = Board::from_parts(
            vec![t7.clone(), t2.clone(), t9.clone()],
            vec![todo, done],
            date(),
        );

        board.reconcile(&[
            ColumnOrdering {
                column_id: done_id,
                task_ids: vec![t7.id, t2.id],
            },
            ColumnOrdering {
                column_id: todo_id,
                task_ids: vec![t9.id],
            },
        ]);

        assert!(board.task(t7.id).expect("t7").completed);
        assert!(board.task(t2.id).expect("t2").completed);
        assert!(!board.task(t9.id).expect("t9").completed);
        assert_eq!(
            board.column(done_id).expect("done").task_ids,
            vec![t7.id, t2.id]
        );
        assert_membership(&board);
    }

    #[test]
    fn unknown_ids_are_dropped_not_fatal() {
        let t1 = task("one");
        let todo = column("Todo", vec![t1.id]);
        let todo_id = todo.id;
        let mut board = Board::from_parts(vec![t1.clone()], vec![todo], date());

        board.reconcile(&[
            ColumnOrdering {
                column_id: Uuid::new_v4(),
                task_ids: vec![t1.id],
            },
            ColumnOrdering {
                column_id: todo_id,
                task_ids: vec![Uuid::new_v4(), t1.id],
            },
        ]);

        assert_eq!(board.column(todo_id).expect("todo").task_ids, vec![t1.id]);
        assert_membership(&board);
    }

    #[test]
    fn partial_report_steals_from_unreported_columns() {
        let t1 = task("one");
        let t2 = task("two");
        let todo = column("Todo", vec![t1.id, t2.id]);
        let doing = column("Doing", vec![]);
        let (todo_id, doing_id) = (todo.id, doing.id);
        let mut board = Board::from_parts(vec![t1.clone(), t2.clone()], vec![todo, doing], date());

        // only the destination column reports; the source keeps its list
        board.reconcile(&[ColumnOrdering {
            column_id: doing_id,
            task_ids: vec![t1.id],
        }]);

        assert_eq!(board.column(doing_id).expect("doing").task_ids, vec![t1.id]);
        assert_eq!(board.column(todo_id).expect("todo").task_ids, vec![t2.id]);
        assert_membership(&board);
    }

    #[test]
    fn raw_reports_resolve_names_and_drop_garbage() {
        let t1 = task("one");
        let done = column("Done", vec![]);
        let todo = column("Todo", vec![t1.id]);
        let done_id = done.id;
        let mut board = Board::from_parts(vec![t1.clone()], vec![done, todo], date());

        let mut raw = BTreeMap::new();
        raw.insert(
            "done".to_string(),
            vec![t1.id.to_string(), "not-a-uuid".to_string()],
        );
        raw.insert("Shipping".to_string(), vec![t1.id.to_string()]);

        let orderings = orderings_from_raw(&board, &raw);
        assert_eq!(orderings.len(), 1);
        assert_eq!(orderings[0].column_id, done_id);
        assert_eq!(orderings[0].task_ids, vec![t1.id]);

        board.reconcile(&orderings);
        assert!(board.task(t1.id).expect("t1").completed);
        assert_membership(&board);
    }
}
