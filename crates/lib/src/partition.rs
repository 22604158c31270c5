pub mod btree;
pub mod master;
pub mod snapshot;

use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use warren_lib_core::entry::{Entry, Modification};
use warren_lib_core::errors::OpResult;
use warren_lib_core::ident::EntryId;
use warren_lib_core::name::Dn;
use warren_lib_core::schema::Registries;

pub use btree::BTreePartition;
pub use snapshot::{ParentIdAndRdn, PartitionSnapshot};

/// One storage partition: a named subtree owned by a single store. The nexus
/// holds these read-only and routes every primitive through them; search
/// takes a [`PartitionSnapshot`] and never touches the live tables.
pub trait Partition: Debug + Send + Sync {
    /// The partition's configured name.
    fn id(&self) -> &str;

    /// The normalized suffix DN this partition owns.
    fn suffix(&self) -> &Dn;

    /// A read-time snapshot of every table, for search and for diagnostics.
    fn snapshot(&self) -> PartitionSnapshot;

    fn add(&self, schema: &Registries, entry: Entry) -> OpResult<EntryId>;

    fn delete(&self, schema: &Registries, dn: &Dn) -> OpResult<()>;

    /// Applies a modification list and returns the updated entry.
    fn modify(&self, schema: &Registries, dn: &Dn, mods: &[Modification]) -> OpResult<Entry>;

    /// Rename and/or move `dn` to `new_dn`, which covers all three X.500
    /// variants. The whole subtree follows.
    fn move_and_rename(
        &self,
        schema: &Registries,
        dn: &Dn,
        new_dn: &Dn,
        delete_old_rdn: bool,
    ) -> OpResult<()>;

    fn lookup(&self, dn: &Dn) -> Option<Entry>;

    fn entry_id(&self, dn: &Dn) -> Option<EntryId>;

    fn has_entry(&self, dn: &Dn) -> bool {
        self.entry_id(dn).is_some()
    }

    /// Direct children of `dn`.
    fn child_count(&self, dn: &Dn) -> usize;

    /// Total entries stored.
    fn count(&self) -> usize;
}

/// A shared partition handle, the form the nexus routes through.
#[derive(Debug, Clone)]
pub struct ErasedPartition {
    erased: Arc<dyn Partition>,
}

impl Deref for ErasedPartition {
    type Target = dyn Partition;

    fn deref(&self) -> &Self::Target {
        self.erased.as_ref()
    }
}

pub trait Erased {
    type Erased;

    fn erased(self) -> Self::Erased;
}

impl<T: Partition + 'static> Erased for T {
    type Erased = ErasedPartition;

    fn erased(self) -> Self::Erased {
        ErasedPartition {
            erased: Arc::new(self),
        }
    }
}
