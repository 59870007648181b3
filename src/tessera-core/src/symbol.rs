//! Interned symbol names.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

fn interner() -> &'static Mutex<HashSet<Arc<str>>> {
    static INTERNER: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();
    INTERNER.get_or_init(|| Mutex::new(HashSet::new()))
}

/// An interned name.
///
/// Every symbol with the same name shares one allocation, so equality and
/// hashing are pointer operations. Symbols are cheap to clone and safe to
/// share across threads.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Intern `name` and return its symbol.
    pub fn new(name: &str) -> Self {
        // The set only ever grows, so a poisoned lock still holds valid data.
        let mut set = interner().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = set.get(name) {
            return Self(Arc::clone(existing));
        }
        let interned: Arc<str> = Arc::from(name);
        set.insert(Arc::clone(&interned));
        Self(interned)
    }

    /// The symbol's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<u8>() as usize
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(s: &Symbol) -> u64 {
        let mut h = DefaultHasher::new();
        s.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_same_name_same_symbol() {
        let a = Symbol::new("mass");
        let b = Symbol::from(String::from("mass"));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_different_names_differ() {
        assert_ne!(Symbol::new("x"), Symbol::new("y"));
    }

    #[test]
    fn test_dedup_in_set() {
        let set: HashSet<Symbol> = ["a", "b", "a", "c", "b"].into_iter().map(Symbol::new).collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_ordering_is_by_name() {
        let mut v = vec![Symbol::new("zeta"), Symbol::new("alpha"), Symbol::new("mu")];
        v.sort();
        let names: Vec<_> = v.iter().map(Symbol::as_str).collect();
        assert_eq!(names, ["alpha", "mu", "zeta"]);
    }

    #[test]
    fn test_interning_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| Symbol::new("shared_name")))
            .collect();
        let syms: Vec<Symbol> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(syms.windows(2).all(|w| w[0] == w[1]));
    }
}
