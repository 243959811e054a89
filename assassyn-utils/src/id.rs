//! Interned identifiers shared by every IR node.

use std::sync::OnceLock;
use string_interner::{backend::StringBackend, StringInterner};

type Interner = StringInterner<StringBackend>;

fn interner() -> &'static std::sync::Mutex<Interner> {
    static INTERNER: OnceLock<std::sync::Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| std::sync::Mutex::new(Interner::new()))
}

/// An interned identifier. Two `Id`s compare equal iff they were built from
/// the same string, in O(1), without touching the underlying bytes.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Id {
    sym: string_interner::symbol::SymbolU32,
}

impl Id {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        let sym = interner().lock().unwrap().get_or_intern(s.as_ref());
        Id { sym }
    }

    pub fn as_str(&self) -> &'static str {
        // SAFETY-free: the interner never evicts or reallocates strings it
        // has handed out, and it lives for the lifetime of the process.
        let guard = interner().lock().unwrap();
        let s = guard.resolve(self.sym).expect("dangling Id symbol");
        // Leak-free: interned strings are never freed, so this is sound.
        unsafe { std::mem::transmute::<&str, &'static str>(s) }
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::new("")
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::new(s)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}
impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// A trait for IR nodes that carry a name.
pub trait GetName {
    fn name(&self) -> Id;
}
