//! Interning for identifier names and string-ish literal payloads.
//!
//! Obfuscated input tends to repeat the same mangled identifier (`_0x1a2b`)
//! and the same decoded string constant thousands of times across a single
//! program; hash-consing them means equality between two `Name`s is a
//! pointer compare and the table footprint for a large deobfuscated program
//! stays proportional to the number of *distinct* strings, not occurrences.

use std::cmp::Ordering;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};

use hashconsing::{HConsed, HConsign, HashConsign};
use serde::{Deserialize, Serialize};

/// A hash-consed string: an identifier name, a decoded string literal, or a
/// big-int/regex payload stored in source form.
#[derive(Clone)]
pub struct Name(HConsed<String>);

impl Name {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl Serialize for Name {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}
impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        // Deserialized names are not consed against any particular
        // interner; callers that need cons-identity across a deserialized
        // program should re-intern through `Interner::intern`.
        let s = String::deserialize(d)?;
        thread_local! {
            static SCRATCH: RefCell<HConsign<String>> = RefCell::new(HConsign::empty());
        }
        Ok(SCRATCH.with(|t| Name(t.borrow_mut().mk(s))))
    }
}

/// Per-pipeline string interner. Shared behind `&Interner` (not `&mut`)
/// since many IR constructors need to intern concurrently with other
/// read-only table access; the consing table itself is the only mutable
/// cell.
#[derive(Default)]
pub struct Interner {
    table: RefCell<HConsign<String>>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            table: RefCell::new(HConsign::empty()),
        }
    }

    pub fn intern(&self, s: impl Into<String>) -> Name {
        Name(self.table.borrow_mut().mk(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_strings_intern_to_the_same_handle() {
        let interner = Interner::new();
        let a = interner.intern("_0x1a2b");
        let b = interner.intern("_0x1a2b".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_follows_the_underlying_string() {
        let interner = Interner::new();
        let a = interner.intern("aaa");
        let b = interner.intern("bbb");
        assert!(a < b);
    }
}
