use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Navigations kept by [`HistoryNavigator`]; older ones are dropped.
pub const HISTORY_LIMIT: usize = 16;

/// Performs a full navigation of the client to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Keeps the most recent navigations, newest last.
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    visits: Mutex<VecDeque<String>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<String> {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, path: &str) {
        info!(path, "navigating");
        let mut visits = self.visits.lock().unwrap_or_else(PoisonError::into_inner);
        if visits.len() == HISTORY_LIMIT {
            visits.pop_front();
        }
        visits.push_back(path.to_string());
    }
}
