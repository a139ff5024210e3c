use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-date background image references. References are opaque strings
/// (data URLs or anything the view layer can resolve), keyed by date with
/// no link to the task collections: an entry for a date with no tasks is
/// legal and harmless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackgroundImages {
    entries: BTreeMap<NaiveDate, String>,
}

impl BackgroundImages {
    pub fn get(&self, date: NaiveDate) -> Option<&str> {
        self.entries.get(&date).map(String::as_str)
    }

    pub fn set(&mut self, date: NaiveDate, reference: String) {
        if reference.is_empty() {
            return;
        }
        debug!(%date, bytes = reference.len(), "set background image");
        self.entries.insert(date, reference);
    }

    pub fn clear(&mut self, date: NaiveDate) {
        if self.entries.remove(&date).is_some() {
            debug!(%date, "cleared background image");
        }
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
