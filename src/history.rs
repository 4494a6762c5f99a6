//! Practice history: words spoken this session, newest first.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct HistoryList {
    entries: VecDeque<String>,
    max_entries: usize,
}

impl HistoryList {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a spoken string. Returns false if it was already present, in
    /// which case the list is left untouched.
    pub fn record(&mut self, text: &str) -> bool {
        if self.contains(text) {
            return false;
        }
        self.entries.push_front(text.to_string());
        self.entries.truncate(self.max_entries);
        true
    }

    fn contains(&self, text: &str) -> bool {
        self.entries.iter().any(|e| e == text)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}
