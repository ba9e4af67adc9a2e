//! Process-wide string interning for atom values and variable names.
//!
//! Interning a string returns a [`Name`] that can be cheaply cloned
//! (reference count increment instead of allocation). Identical strings
//! share the same allocation for the lifetime of the process, so equality
//! is usually a pointer comparison.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

static NAMES: Lazy<Mutex<FxHashSet<Arc<str>>>> =
    Lazy::new(|| Mutex::new(FxHashSet::default()));

/// An interned string - cheap to clone (just an `Arc` increment).
///
/// Two `Name`s created from the same text always share the same
/// allocation, so `==` takes the pointer fast path in the common case.
#[derive(Clone)]
pub struct Name(Arc<str>);

impl Name {
    /// Intern a string, returning the canonical `Name` for it.
    pub fn new(text: &str) -> Self {
        let mut names = NAMES.lock();
        if let Some(existing) = names.get(text) {
            Name(Arc::clone(existing))
        } else {
            let arc: Arc<str> = Arc::from(text);
            names.insert(Arc::clone(&arc));
            Name(arc)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash the contents, not the pointer, so lookups by &str agree.
        self.0.hash(state);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", &*self.0)
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::new(text)
    }
}

impl std::borrow::Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}
