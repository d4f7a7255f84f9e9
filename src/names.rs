//! Interned element and attribute names
//!
//! All trees read from one stream share a pool, so a corpus with millions
//! of trees still stores `node`, `rel`, `cat`, ... exactly once.

use lasso::{Spur, ThreadedRodeo};
use std::sync::Arc;

/// Interned name handle
pub type Name = Spur;

#[derive(Clone, Debug)]
pub struct NamePool(Arc<ThreadedRodeo>);

impl Default for NamePool {
    fn default() -> Self {
        Self::new()
    }
}

impl NamePool {
    pub fn new() -> Self {
        Self(Arc::new(ThreadedRodeo::new()))
    }

    #[inline]
    pub fn intern(&self, name: &str) -> Name {
        self.0.get_or_intern(name)
    }

    /// Look up a name without interning it
    ///
    /// `None` means no tree from this pool has ever used the name, so
    /// nothing can match it.
    #[inline]
    pub fn lookup(&self, name: &str) -> Option<Name> {
        self.0.get(name)
    }

    #[inline]
    pub fn resolve(&self, name: Name) -> &str {
        self.0.resolve(&name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
