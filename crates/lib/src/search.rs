pub mod cursors;
pub mod evaluator;
pub mod filtering;
pub mod planner;

use std::sync::Arc;

use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{OpResult, OperationError};
use warren_lib_core::ident::EntryId;
use warren_lib_core::schema::Registries;
use warren_lib_core::value::NormValue;

use crate::partition::PartitionSnapshot;

pub use cursors::CandidateCursor;
pub use evaluator::Evaluator;
pub use filtering::{EntryFilter, EntryFilteringCursor, ErasedEntryFilter, SearchParams};

/// Everything the evaluators and cursors of one search share: the partition
/// snapshot they read and the schema they resolve types against.
#[derive(Debug, Clone)]
pub struct SearchEnv {
    pub snapshot: PartitionSnapshot,
    pub schema: Arc<Registries>,
}

/// A candidate produced by an index walk: the id, the index key it was found
/// under when one exists (the cheap evaluation path), and the memoized entry
/// once something needed the full record.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: EntryId,
    pub value: Option<NormValue>,
    pub entry: Option<Entry>,
}

impl Candidate {
    pub fn new(id: EntryId) -> Self {
        Self {
            id,
            value: None,
            entry: None,
        }
    }

    pub fn with_value(id: EntryId, value: NormValue) -> Self {
        Self {
            id,
            value: Some(value),
            entry: None,
        }
    }

    /// The full entry, fetched from the snapshot on first use.
    pub fn entry(&mut self, env: &SearchEnv) -> OpResult<&Entry> {
        if let Some(ref entry) = self.entry {
            return Ok(entry);
        }
        let entry = env.snapshot.entry(self.id).ok_or_else(|| {
            OperationError::internal(format!(
                "candidate {} vanished from the master table",
                self.id
            ))
        })?;
        Ok(self.entry.insert(entry))
    }
}
