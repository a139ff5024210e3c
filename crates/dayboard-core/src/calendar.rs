use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::task::Task;

/// The viewed month. Transient by design: it resets to the current month
/// at every start, is never persisted, and moves independently of the
/// selected date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarCursor {
    pub year: i32,
    /// 1-based, chrono convention.
    pub month: u32,
}

impl CalendarCursor {
    #[must_use]
    pub fn current(today: NaiveDate) -> Self {
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    /// Advances or retreats by whole months, rolling the year across the
    /// January/December boundary. Any signed delta works.
    pub fn shift(&mut self, delta: i32) {
        let total = self.year * 12 + (self.month as i32 - 1) + delta;
        self.year = total.div_euclid(12);
        self.month = (total.rem_euclid(12) + 1) as u32;
    }

    #[must_use]
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

/// Per-date task counts within one viewed month, for badging calendar
/// cells. Undated tasks count against `today`.
#[must_use]
pub fn count_tasks_by_date(
    tasks: &[Task],
    year: i32,
    month: u32,
    today: NaiveDate,
) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for task in tasks {
        let date = task.date.unwrap_or(today);
        if date.year() == year && date.month() == month {
            *counts.entry(date).or_insert(0) += 1;
        }
    }
    counts
}

/// Up to `limit` task texts dated exactly `date`, for calendar cell
/// previews. Undated tasks never appear here.
#[must_use]
pub fn day_preview(tasks: &[Task], date: NaiveDate, limit: usize) -> Vec<&str> {
    tasks
        .iter()
        .filter(|t| t.date == Some(date))
        .take(limit)
        .map(|t| t.text.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{CalendarCursor, count_tasks_by_date, day_preview};
    use crate::task::Task;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn dated_task(text: &str, d: NaiveDate) -> Task {
        let now = Utc
            .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
            .single()
            .expect("valid now");
        Task::new(text.to_string(), d, None, now)
    }

    #[test]
    fn counts_group_by_date_within_month() {
        let tasks = vec![
            dated_task("a", date(2024, 6, 1)),
            dated_task("b", date(2024, 6, 1)),
            dated_task("c", date(2024, 6, 2)),
            dated_task("elsewhere", date(2024, 7, 2)),
        ];

        let counts = count_tasks_by_date(&tasks, 2024, 6, date(2024, 6, 15));

        assert_eq!(counts.get(&date(2024, 6, 1)), Some(&2));
        assert_eq!(counts.get(&date(2024, 6, 2)), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn undated_tasks_count_as_today() {
        let mut task = dated_task("floating", date(2024, 6, 9));
        task.date = None;

        let counts = count_tasks_by_date(&[task], 2024, 6, date(2024, 6, 9));
        assert_eq!(counts.get(&date(2024, 6, 9)), Some(&1));

        let other_month = count_tasks_by_date(
            &[dated_task("floating", date(2024, 6, 9))],
            2024,
            5,
            date(2024, 6, 9),
        );
        assert!(other_month.is_empty());
    }

    #[test]
    fn shift_rolls_the_year_both_ways() {
        let mut cursor = CalendarCursor {
            year: 2024,
            month: 1,
        };
        cursor.shift(-1);
        assert_eq!((cursor.year, cursor.month), (2023, 12));

        cursor.shift(1);
        assert_eq!((cursor.year, cursor.month), (2024, 1));

        cursor.shift(23);
        assert_eq!((cursor.year, cursor.month), (2025, 12));

        cursor.shift(-25);
        assert_eq!((cursor.year, cursor.month), (2023, 11));
    }

    #[test]
    fn preview_caps_at_limit_and_skips_undated() {
        let d = date(2024, 6, 1);
        let mut undated = dated_task("undated", d);
        undated.date = None;
        let tasks = vec![
            dated_task("one", d),
            undated,
            dated_task("two", d),
            dated_task("three", d),
            dated_task("four", d),
        ];

        let preview = day_preview(&tasks, d, 3);
        assert_eq!(preview, vec!["one", "two", "three"]);
    }
}
