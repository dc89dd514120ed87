use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory set of registered device tokens.
///
/// Readers and writers share one exclusive lock. It is never held across an await point.
#[derive(Clone, Debug, Default)]
pub struct TokenRegistry {
    tokens: Arc<Mutex<HashSet<String>>>,
}

impl TokenRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set holds no invariants a panicking holder could break.
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `token`. Returns `true` if it was not already present.
    pub fn add(&self, token: &str) -> bool {
        let mut tokens = self.lock();
        if tokens.contains(token) {
            return false;
        }
        tokens.insert(token.to_owned())
    }

    /// Removes `token` if present. Returns whether anything was removed.
    pub fn remove(&self, token: &str) -> bool {
        self.lock().remove(token)
    }

    /// Returns a copy of every registered token.
    #[must_use]
    pub fn list(&self) -> HashSet<String> {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
