//! Thread-safe string interning for resource, pass, pipeline and push-constant names.
//!
//! Mirrors the `fablex` engine's `Name`/`NameManager` pair: strings are interned once
//! and thereafter compared/hashed as plain integers. A single process-wide table is
//! used so that names coined at graph-metadata load time compare equal to names coined
//! later by passes declaring resources.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

fn table() -> &'static RwLock<NameTable> {
    static TABLE: OnceLock<RwLock<NameTable>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(NameTable::new()))
}

struct NameTable {
    ids: HashMap<String, u32>,
    strings: Vec<String>,
}

impl NameTable {
    fn new() -> Self {
        Self { ids: HashMap::new(), strings: Vec::new() }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_owned());
        self.ids.insert(s.to_owned(), id);
        id
    }
}

/// An interned, hashable, copyable name.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    pub fn new(s: &str) -> Self {
        Name(table().write().intern(s))
    }

    pub fn to_id(self) -> u32 {
        self.0
    }

    /// Reconstructs a `Name` from an id previously returned by `to_id`. The id
    /// must have been interned earlier in the process; used to recover a
    /// resource's name from the `resource_id` half of a `ViewName`.
    pub fn from_id(id: u32) -> Self {
        Name(id)
    }

    pub fn as_str(self) -> String {
        table().read().strings[self.0 as usize].clone()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?}#{})", self.as_str(), self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::new(&s)
    }
}

/// Name of the implicit swap-chain back buffer resource. Passes whose render target
/// metadata omits a texture name write here.
pub const BACK_BUFFER_NAME: &str = "__back_buffer__";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_deduplicated() {
        let a = Name::new("shadow_map");
        let b = Name::new("shadow_map");
        let c = Name::new("gbuffer_albedo");
        assert_eq!(a, b);
        assert_eq!(a.to_id(), b.to_id());
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "shadow_map");
    }
}
