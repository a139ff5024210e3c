use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::background::BackgroundImages;
use crate::board::{BoardSnapshot, ColumnView};
use crate::calendar::CalendarCursor;
use crate::config::Config;

const DUE_BADGE_COLUMN: usize = 48;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, snapshot, background))]
    pub fn print_board(
        &mut self,
        snapshot: &BoardSnapshot,
        background: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let heading = format!("Board for {}", snapshot.selected_date);
        writeln!(out, "{}", self.paint(&heading, "1"))?;
        if let Some(reference) = background {
            writeln!(out, "background: {}", summarize_reference(reference))?;
        }
        writeln!(out)?;

        for col in &snapshot.columns {
            self.print_column(&mut out, col)?;
        }

        let total = snapshot.total_visible;
        writeln!(out, "{} item{}", total, if total == 1 { "" } else { "s" })?;
        Ok(())
    }

    fn print_column(&self, out: &mut impl Write, col: &ColumnView) -> anyhow::Result<()> {
        let header = format!("{} [{}]", col.name, col.tasks.len());
        writeln!(out, "{}", self.paint(&header, "4"))?;

        for task in &col.tasks {
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let id = task.id.simple().to_string();
            let mut line = format!("  {mark} {}  {}", &id[..8], task.text);

            if let Some(label) = &task.due_label {
                let badge = format!("due {label}");
                let badge = if task.overdue {
                    self.paint(&badge, "31")
                } else {
                    badge
                };
                let pad = DUE_BADGE_COLUMN.saturating_sub(UnicodeWidthStr::width(line.as_str()));
                line = format!("{line}{}  {badge}", " ".repeat(pad));
            }

            writeln!(out, "{line}")?;
        }

        writeln!(out)?;
        Ok(())
    }

    /// Month grid starting on Sunday. `*` marks dates with tasks, `~`
    /// dates with a background image; the selected date renders inverse
    /// and today in color.
    #[tracing::instrument(skip(self, counts, backgrounds))]
    pub fn print_calendar(
        &mut self,
        cursor: CalendarCursor,
        counts: &BTreeMap<NaiveDate, usize>,
        backgrounds: &BackgroundImages,
        selected: NaiveDate,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let first = cursor
            .first_day()
            .ok_or_else(|| anyhow!("invalid month: {}-{}", cursor.year, cursor.month))?;

        let mut out = io::stdout().lock();

        let label = first.format("%B %Y").to_string();
        writeln!(out, "{}", self.paint(&label, "1"))?;
        let header: String = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"]
            .iter()
            .map(|name| format!("{name:>3} "))
            .collect();
        writeln!(out, "{header}")?;

        let lead = first.weekday().num_days_from_sunday() as usize;
        let mut cells: Vec<String> = vec!["    ".to_string(); lead];

        for day in 1..=days_in_month(cursor.year, cursor.month) {
            let Some(date) = NaiveDate::from_ymd_opt(cursor.year, cursor.month, day) else {
                continue;
            };
            let marker = if counts.get(&date).copied().unwrap_or(0) > 0 {
                '*'
            } else if backgrounds.get(date).is_some() {
                '~'
            } else {
                ' '
            };

            let mut cell = format!("{day:>3}{marker}");
            if date == selected {
                cell = self.paint(&cell, "7");
            } else if date == today {
                cell = self.paint(&cell, "36");
            }
            cells.push(cell);
        }

        for week in cells.chunks(7) {
            writeln!(out, "{}", week.concat())?;
        }

        let dated: usize = counts.values().sum();
        if dated > 0 {
            writeln!(out)?;
            writeln!(out, "{dated} dated task{}", if dated == 1 { "" } else { "s" })?;
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(30)
}

fn summarize_reference(reference: &str) -> String {
    if let Some(rest) = reference.strip_prefix("data:") {
        let mime = rest.split(';').next().unwrap_or("unknown");
        format!("inline {mime} ({} KiB)", reference.len() / 1024)
    } else {
        reference.to_string()
    }
}
