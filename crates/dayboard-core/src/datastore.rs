use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::background::BackgroundImages;
use crate::board::Board;
use crate::datetime;
use crate::task::{Column, Task};
use crate::theme::Theme;

/// Key-value persistence over one file per key in the data directory.
/// Saves are full-snapshot overwrites; there is no diffing and no retry
/// policy, callers persist after every mutation and decide what to do
/// when a write fails.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub columns_path: PathBuf,
    pub selected_date_path: PathBuf,
    pub backgrounds_path: PathBuf,
    pub theme_path: PathBuf,
}

#[derive(Debug)]
pub struct LoadedState {
    pub board: Board,
    pub backgrounds: BackgroundImages,
    /// True when the board came from the seed fallback rather than
    /// persisted data; callers save promptly so the seeded ids stick.
    pub seeded: bool,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let columns_path = data_dir.join("columns.json");
        let selected_date_path = data_dir.join("selected-date");
        let backgrounds_path = data_dir.join("backgrounds.json");
        let theme_path = data_dir.join("theme");

        for path in [
            &tasks_path,
            &columns_path,
            &selected_date_path,
            &backgrounds_path,
            &theme_path,
        ] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        info!(data_dir = %data_dir.display(), "opened datastore");

        Ok(Self {
            data_dir,
            tasks_path,
            columns_path,
            selected_date_path,
            backgrounds_path,
            theme_path,
        })
    }

    /// Loads the full snapshot. The four payloads fail independently
    /// except tasks and columns, which stand or fall together: if either
    /// is missing, malformed, or empty, both come from the seed board, so
    /// the result never has tasks referencing no column or columns
    /// referencing nonexistent tasks. Bad content is recovered, not
    /// surfaced.
    #[tracing::instrument(skip(self, now))]
    pub fn load(&self, now: DateTime<Utc>) -> LoadedState {
        let today = datetime::today(now);

        let selected_date = read_trimmed(&self.selected_date_path)
            .and_then(|raw| match raw.parse::<NaiveDate>() {
                Ok(date) => Some(date),
                Err(err) => {
                    warn!(value = %raw, error = %err, "bad selected date; using today");
                    None
                }
            })
            .unwrap_or(today);

        let tasks: Option<Vec<Task>> = read_json(&self.tasks_path);
        let columns: Option<Vec<Column>> = read_json(&self.columns_path);

        let (board, seeded) = match (tasks, columns) {
            (Some(tasks), Some(columns)) if !tasks.is_empty() && !columns.is_empty() => {
                (Board::from_parts(tasks, columns, selected_date), false)
            }
            _ => {
                info!("task or column payload missing, malformed, or empty; seeding board");
                (Board::seed(selected_date, now), true)
            }
        };

        let backgrounds = read_json::<BackgroundImages>(&self.backgrounds_path).unwrap_or_default();

        debug!(
            tasks = board.tasks().len(),
            columns = board.columns().len(),
            backgrounds = backgrounds.len(),
            seeded,
            "loaded state"
        );

        LoadedState {
            board,
            backgrounds,
            seeded,
        }
    }

    /// Full-snapshot overwrite, one atomic write per key. Failures
    /// propagate: silently losing the ability to persist is data loss.
    #[tracing::instrument(skip(self, board, backgrounds))]
    pub fn save(&self, board: &Board, backgrounds: &BackgroundImages) -> anyhow::Result<()> {
        save_json_atomic(&self.tasks_path, &board.tasks()).context("failed to save tasks.json")?;
        save_json_atomic(&self.columns_path, &board.columns())
            .context("failed to save columns.json")?;
        save_raw_atomic(&self.selected_date_path, &board.selected_date().to_string())
            .context("failed to save selected-date")?;
        save_json_atomic(&self.backgrounds_path, backgrounds)
            .context("failed to save backgrounds.json")?;

        debug!(
            tasks = board.tasks().len(),
            columns = board.columns().len(),
            "saved board snapshot"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_theme(&self) -> Option<Theme> {
        read_trimmed(&self.theme_path).and_then(|raw| Theme::parse(&raw))
    }

    #[tracing::instrument(skip(self))]
    pub fn save_theme(&self, theme: Theme) -> anyhow::Result<()> {
        save_raw_atomic(&self.theme_path, theme.as_str()).context("failed to save theme")
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(file = %path.display(), error = %err, "key file unreadable");
            return None;
        }
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = read_trimmed(path)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "malformed payload; falling back");
            None
        }
    }
}

fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let serialized = serde_json::to_string(value)?;
    save_raw_atomic(path, &serialized)
}

fn save_raw_atomic(path: &Path, payload: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = payload.len(), "saving atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
