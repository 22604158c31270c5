use ahash::AHashMap;
use smol_str::SmolStr;
use warren_lib_core::entry::Entry;
use warren_lib_core::ident::EntryId;
use warren_lib_core::name::Dn;
use warren_lib_core::store::{Index, Table};
use warren_lib_core::value::NormValue;

use crate::partition::master::MasterTable;

/// The key of the RDN index: who the parent is plus the canonical RDN
/// string. The suffix entry hangs off the nil id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParentIdAndRdn {
    pub parent: EntryId,
    pub rdn: SmolStr,
}

impl ParentIdAndRdn {
    pub fn new(parent: EntryId, rdn: impl Into<SmolStr>) -> Self {
        Self {
            parent,
            rdn: rdn.into(),
        }
    }

    /// The smallest key of `parent`, where a prefix walk over the parent's
    /// children starts.
    pub fn first_of(parent: EntryId) -> Self {
        Self::new(parent, "")
    }
}

/// A read-time snapshot of one partition: every table cheaply cloned at the
/// moment the search started. Writes that land afterwards stay invisible to
/// cursors built from it.
#[derive(Debug, Clone)]
pub struct PartitionSnapshot {
    pub suffix: Dn,
    pub master: MasterTable,
    pub rdn_fwd: Table<ParentIdAndRdn, EntryId>,
    pub rdn_rev: Table<EntryId, ParentIdAndRdn>,
    pub presence: Table<SmolStr, EntryId>,
    pub sublevel: Table<EntryId, EntryId>,
    pub indices: AHashMap<SmolStr, Index>,
}

impl PartitionSnapshot {
    /// Resolves a normalized DN to its entry id by walking the RDN index
    /// down from the suffix.
    pub fn entry_id(&self, dn: &Dn) -> Option<EntryId> {
        let mut id = self
            .rdn_fwd
            .first(&ParentIdAndRdn::new(EntryId::nil(), self.suffix.norm()))?;
        if dn == &self.suffix {
            return Some(id);
        }
        let relative = dn.relative_to(&self.suffix)?;
        for rdn in relative.iter().rev() {
            id = self.rdn_fwd.first(&ParentIdAndRdn::new(id, rdn.norm()))?;
        }
        Some(id)
    }

    pub fn entry(&self, id: EntryId) -> Option<Entry> {
        self.master.get(id)
    }

    pub fn index(&self, attr_oid: &str) -> Option<&Index> {
        self.indices.get(attr_oid)
    }

    pub fn is_indexed(&self, attr_oid: &str) -> bool {
        self.indices.contains_key(attr_oid)
    }

    /// How many ids carry `attr_oid` at all.
    pub fn presence_count(&self, attr_oid: &str) -> usize {
        self.presence.count(&SmolStr::from(attr_oid))
    }

    /// Ids in the whole subtree under `id`, itself included.
    pub fn subtree_count(&self, id: EntryId) -> usize {
        self.sublevel.count(&id)
    }

    pub fn total_count(&self) -> usize {
        self.master.len()
    }

    /// The value an indexed equality assertion would scan, or `usize::MAX`
    /// as the unindexed sentinel.
    pub fn equality_count(&self, attr_oid: &str, value: &NormValue) -> usize {
        match self.index(attr_oid) {
            Some(index) => index.count(value),
            None => usize::MAX,
        }
    }
}
