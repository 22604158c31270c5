use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use warren_lib_core::entry::Entry;
use warren_lib_core::errors::OpResult;
use warren_lib_core::ident::EntryId;
use warren_lib_core::store::Cursor;
use warren_lib_core::store::cursor as cursor_errors;

/// The id → entry table of a partition. Single-valued, so it does not ride
/// on the duplicate-key [`Table`](warren_lib_core::store::Table); like it,
/// the map sits behind an `Arc` so open cursors keep their snapshot.
#[derive(Debug, Clone, Default)]
pub struct MasterTable {
    map: Arc<BTreeMap<EntryId, Entry>>,
}

impl MasterTable {
    pub fn put(&mut self, id: EntryId, entry: Entry) {
        Arc::make_mut(&mut self.map).insert(id, entry);
    }

    pub fn get(&self, id: EntryId) -> Option<Entry> {
        self.map.get(&id).cloned()
    }

    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        Arc::make_mut(&mut self.map).remove(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A full-scan cursor over a snapshot taken now, id order.
    pub fn scan(&self) -> MasterCursor {
        MasterCursor {
            snapshot: Arc::clone(&self.map),
            pos: MasterPos::BeforeFirst,
        }
    }
}

#[derive(Debug, Clone)]
enum MasterPos {
    BeforeFirst,
    On(EntryId),
    AfterLast,
    Closed,
}

/// Scans the master table in id order.
#[derive(Debug, Clone)]
pub struct MasterCursor {
    snapshot: Arc<BTreeMap<EntryId, Entry>>,
    pos: MasterPos,
}

impl Cursor for MasterCursor {
    type Item = (EntryId, Entry);

    fn before_first(&mut self) -> OpResult<()> {
        if matches!(self.pos, MasterPos::Closed) {
            return Err(cursor_errors::closed_error());
        }
        self.pos = MasterPos::BeforeFirst;
        Ok(())
    }

    fn after_last(&mut self) -> OpResult<()> {
        if matches!(self.pos, MasterPos::Closed) {
            return Err(cursor_errors::closed_error());
        }
        self.pos = MasterPos::AfterLast;
        Ok(())
    }

    fn next(&mut self) -> OpResult<bool> {
        let found = match &self.pos {
            MasterPos::Closed => return Err(cursor_errors::closed_error()),
            MasterPos::AfterLast => None,
            MasterPos::BeforeFirst => self.snapshot.keys().next().copied(),
            MasterPos::On(id) => self
                .snapshot
                .range((Excluded(*id), Unbounded))
                .next()
                .map(|(id, _)| *id),
        };
        match found {
            Some(id) => {
                self.pos = MasterPos::On(id);
                Ok(true)
            }
            None => {
                self.pos = MasterPos::AfterLast;
                Ok(false)
            }
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        let found = match &self.pos {
            MasterPos::Closed => return Err(cursor_errors::closed_error()),
            MasterPos::BeforeFirst => None,
            MasterPos::AfterLast => self.snapshot.keys().next_back().copied(),
            MasterPos::On(id) => self.snapshot.range(..*id).next_back().map(|(id, _)| *id),
        };
        match found {
            Some(id) => {
                self.pos = MasterPos::On(id);
                Ok(true)
            }
            None => {
                self.pos = MasterPos::BeforeFirst;
                Ok(false)
            }
        }
    }

    fn get(&self) -> OpResult<(EntryId, Entry)> {
        match &self.pos {
            MasterPos::Closed => Err(cursor_errors::closed_error()),
            MasterPos::On(id) => self
                .snapshot
                .get(id)
                .map(|entry| (*id, entry.clone()))
                .ok_or_else(cursor_errors::unpositioned_error),
            _ => Err(cursor_errors::unpositioned_error()),
        }
    }

    fn close(&mut self) {
        self.pos = MasterPos::Closed;
    }

    fn is_closed(&self) -> bool {
        matches!(self.pos, MasterPos::Closed)
    }
}
