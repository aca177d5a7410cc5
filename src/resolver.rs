//! Name -> numeric P4 ID lookup used when composing table writes.

use std::collections::HashMap;

use crate::utils::P4PerfError;

/// Resolves fully qualified P4 object names (tables, actions, ...) to their
/// numeric IDs.
pub trait IdResolver {
    fn resolve(&self, name: &str) -> Result<u32, P4PerfError>;
}

/// In-memory resolver built from (name, id) pairs.
#[derive(Debug, Default, Clone)]
pub struct P4IdMap {
    ids: HashMap<String, u32>,
}

impl P4IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` as `id`, replacing any previous mapping.
    pub fn insert(&mut self, name: impl ToString, id: u32) {
        self.ids.insert(name.to_string(), id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: ToString> FromIterator<(S, u32)> for P4IdMap {
    fn from_iter<T: IntoIterator<Item = (S, u32)>>(iter: T) -> Self {
        P4IdMap {
            ids: iter
                .into_iter()
                .map(|(name, id)| (name.to_string(), id))
                .collect(),
        }
    }
}

impl IdResolver for P4IdMap {
    fn resolve(&self, name: &str) -> Result<u32, P4PerfError> {
        self.ids.get(name).copied().ok_or_else(|| {
            P4PerfError::msg(format!("unable to find P4 ID for {}", name))
        })
    }
}
