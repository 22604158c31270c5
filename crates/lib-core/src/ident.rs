use std::fmt;

use uuid::Uuid;

/// The stable per-partition identifier of an entry. Survives renames and
/// moves; only delete retires it. Ordering is the lexicographic order of the
/// underlying UUID bytes, which is all the index layer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The reserved id the suffix entry's RDN hangs off; never allocated to
    /// an entry.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_display_parses_back() {
        let id = super::EntryId::random();
        assert_eq!(super::EntryId::parse(&id.to_string()), Some(id));
    }
}
