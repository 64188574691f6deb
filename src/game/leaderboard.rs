use serde::{Deserialize, Serialize};

use crate::storage::{self, KeyValueStore, LEADERBOARD_KEY};

pub const LEADERBOARD_SIZE: usize = 10;
const MAX_NAME_CHARS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub score: u32,
    pub level: u32,
}

/// Best scores, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Leaderboard {
    entries: Vec<Entry>,
}

impl Leaderboard {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut board: Self = storage::load_json(store, LEADERBOARD_KEY).unwrap_or_default();
        board.normalize();
        board
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        storage::save_json(store, LEADERBOARD_KEY, self);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Whether `score` would make the board.
    pub fn qualifies(&self, score: u32) -> bool {
        score > 0
            && (self.entries.len() < LEADERBOARD_SIZE
                || self.entries.last().is_some_and(|e| score > e.score))
    }

    /// Inserts the entry and returns its 0-based rank, or `None` when it
    /// didn't make the board. Earlier entries win ties.
    pub fn submit(&mut self, mut entry: Entry) -> Option<usize> {
        if !self.qualifies(entry.score) {
            return None;
        }
        entry.name = clean_name(&entry.name);
        let rank = self
            .entries
            .iter()
            .position(|e| e.score < entry.score)
            .unwrap_or(self.entries.len());
        self.entries.insert(rank, entry);
        self.entries.truncate(LEADERBOARD_SIZE);
        Some(rank)
    }

    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries.truncate(LEADERBOARD_SIZE);
    }
}

fn clean_name(name: &str) -> String {
    let trimmed: String = name.trim().chars().take(MAX_NAME_CHARS).collect();
    if trimmed.is_empty() {
        "anonymous".to_string()
    } else {
        trimmed
    }
}
