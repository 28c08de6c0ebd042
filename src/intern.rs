//! Label interning: one interner per dimension column maps distinct label
//! strings to small increasing ids, with reverse lookup for diagnostics.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct LabelInterner {
    ids: HashMap<String, usize>,
    labels: Vec<String>,
}

impl LabelInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `label`, assigning the next id on first sight.
    pub fn intern(&mut self, label: &str) -> usize {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = self.labels.len();
        self.ids.insert(label.to_string(), id);
        self.labels.push(label.to_string());
        id
    }

    /// Look up a label without interning it.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    /// Reverse lookup; unseen ids resolve to the empty string.
    pub fn resolve(&self, id: usize) -> &str {
        self.labels.get(id).map_or("", String::as_str)
    }

    /// All labels in first-seen order, indexed by id.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
