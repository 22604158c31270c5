use ahash::AHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use warren_lib_core::entry::{Entry, Modification, apply_modifications};
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::ident::EntryId;
use warren_lib_core::name::Dn;
use warren_lib_core::schema::Registries;
use warren_lib_core::store::{Index, Table};
use warren_lib_core::value::ValueData;

use crate::partition::Partition;
use crate::partition::master::MasterTable;
use crate::partition::snapshot::{ParentIdAndRdn, PartitionSnapshot};

/// The in-memory B-tree partition: a master table plus the well-known
/// indices (rdn, presence, sublevel) and one forward/reverse pair per
/// configured user attribute. All tables snapshot cheaply, so readers never
/// block behind a writer for longer than the lock handoff.
#[derive(Debug)]
pub struct BTreePartition {
    id: String,
    suffix: Dn,
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    master: MasterTable,
    rdn_fwd: Table<ParentIdAndRdn, EntryId>,
    rdn_rev: Table<EntryId, ParentIdAndRdn>,
    presence: Table<SmolStr, EntryId>,
    sublevel: Table<EntryId, EntryId>,
    indices: AHashMap<SmolStr, Index>,
}

impl BTreePartition {
    /// `indexed_attrs` names the user attributes this partition indexes; the
    /// names are resolved against the schema now, unknown ones are refused.
    pub fn new(
        id: impl Into<String>,
        suffix: Dn,
        schema: &Registries,
        indexed_attrs: &[String],
    ) -> OpResult<Self> {
        let mut indices = AHashMap::new();
        for name in indexed_attrs {
            let at = schema.attribute_type(name)?;
            indices.insert(at.oid.clone(), Index::new(at.oid.clone()));
        }
        Ok(Self {
            id: id.into(),
            suffix,
            inner: RwLock::new(Inner {
                indices,
                ..Inner::default()
            }),
        })
    }
}

impl Inner {
    fn snapshot(&self, suffix: Dn) -> PartitionSnapshot {
        PartitionSnapshot {
            suffix,
            master: self.master.clone(),
            rdn_fwd: self.rdn_fwd.clone(),
            rdn_rev: self.rdn_rev.clone(),
            presence: self.presence.clone(),
            sublevel: self.sublevel.clone(),
            indices: self.indices.clone(),
        }
    }

    fn entry_id(&self, suffix: &Dn, dn: &Dn) -> Option<EntryId> {
        let mut id = self
            .rdn_fwd
            .first(&ParentIdAndRdn::new(EntryId::nil(), suffix.norm()))?;
        if dn == suffix {
            return Some(id);
        }
        for rdn in dn.relative_to(suffix)?.iter().rev() {
            id = self.rdn_fwd.first(&ParentIdAndRdn::new(id, rdn.norm()))?;
        }
        Some(id)
    }

    /// Parent chain of `id` up to (and excluding) the nil root marker.
    fn ancestor_ids(&self, mut id: EntryId) -> Vec<EntryId> {
        let mut out = Vec::new();
        while let Some(key) = self.rdn_rev.first(&id) {
            if key.parent == EntryId::nil() {
                break;
            }
            out.push(key.parent);
            id = key.parent;
        }
        out
    }

    fn index_entry(&mut self, id: EntryId, entry: &Entry) {
        for attr in entry.attributes() {
            let oid = attr.oid().clone();
            if let Some(index) = self.indices.get_mut(&oid) {
                self.presence.put(oid, id);
                for value in attr.values() {
                    index.add(value.norm().clone(), id);
                }
            }
        }
    }

    fn deindex_entry(&mut self, id: EntryId, entry: &Entry) {
        for attr in entry.attributes() {
            if let Some(index) = self.indices.get_mut(attr.oid()) {
                for value in attr.values() {
                    index.drop_value(value.norm(), id);
                }
                self.presence.remove_value(attr.oid(), &id);
            }
        }
    }

    fn child_count(&self, id: EntryId) -> usize {
        use warren_lib_core::store::Cursor;

        let mut cursor = self.rdn_fwd.cursor();
        let mut count = 0;
        if cursor.before(ParentIdAndRdn::first_of(id)).is_err() {
            return 0;
        }
        while let Ok(true) = cursor.next() {
            let Ok((key, _)) = cursor.get() else { break };
            if key.parent != id {
                break;
            }
            count += 1;
        }
        count
    }
}

impl Partition for BTreePartition {
    fn id(&self) -> &str {
        &self.id
    }

    fn suffix(&self) -> &Dn {
        &self.suffix
    }

    fn snapshot(&self) -> PartitionSnapshot {
        self.inner.read().snapshot(self.suffix.clone())
    }

    fn add(&self, schema: &Registries, mut entry: Entry) -> OpResult<EntryId> {
        let dn = entry.dn().clone();
        let mut inner = self.inner.write();

        let (parent_id, rdn_key) = if dn == self.suffix {
            (EntryId::nil(), SmolStr::from(self.suffix.norm()))
        } else {
            let parent = dn.parent();
            let parent_id = inner.entry_id(&self.suffix, &parent).ok_or_else(|| {
                OperationError::no_such_object(&dn, self.resolved_prefix_locked(&inner, &parent))
            })?;
            let rdn = dn.rdn().ok_or_else(|| {
                OperationError::unwilling("cannot add an entry at the empty DN")
            })?;
            (parent_id, SmolStr::from(rdn.norm()))
        };

        let key = ParentIdAndRdn::new(parent_id, rdn_key);
        if inner.rdn_fwd.has(&key) {
            return Err(OperationError::entry_already_exists(&dn));
        }

        let id = EntryId::random();
        entry.inject_rdn_attributes(schema)?;
        entry.add_value(schema, "entryUUID", ValueData::Text(id.to_string()))?;

        inner.rdn_fwd.put(key.clone(), id);
        inner.rdn_rev.put(id, key);
        inner.sublevel.put(id, id);
        let ancestors = inner.ancestor_ids(id);
        for ancestor in ancestors {
            inner.sublevel.put(ancestor, id);
        }
        inner.index_entry(id, &entry);
        inner.master.put(id, entry);

        log::debug!("partition {}: added {dn} as {id}", self.id);
        Ok(id)
    }

    fn delete(&self, _schema: &Registries, dn: &Dn) -> OpResult<()> {
        let mut inner = self.inner.write();
        let id = inner
            .entry_id(&self.suffix, dn)
            .ok_or_else(|| OperationError::no_such_object(dn, self.resolved_prefix_locked(&inner, dn)))?;

        if inner.sublevel.count(&id) > 1 {
            return Err(OperationError::new(
                LdapErrorKind::NotAllowedOnNonLeaf,
                format!("{dn} still has children"),
            )
            .with_matched_dn(dn.clone()));
        }

        let entry = inner
            .master
            .remove(id)
            .ok_or_else(|| OperationError::internal(format!("master lost entry {id}")))?;
        inner.deindex_entry(id, &entry);

        let ancestors = inner.ancestor_ids(id);
        for ancestor in ancestors {
            inner.sublevel.remove_value(&ancestor, &id);
        }
        inner.sublevel.remove(&id);

        if let Some(key) = inner.rdn_rev.first(&id) {
            inner.rdn_fwd.remove(&key);
        }
        inner.rdn_rev.remove(&id);

        log::debug!("partition {}: deleted {dn} ({id})", self.id);
        Ok(())
    }

    fn modify(&self, schema: &Registries, dn: &Dn, mods: &[Modification]) -> OpResult<Entry> {
        let mut inner = self.inner.write();
        let id = inner
            .entry_id(&self.suffix, dn)
            .ok_or_else(|| OperationError::no_such_object(dn, self.resolved_prefix_locked(&inner, dn)))?;
        let original = inner
            .master
            .get(id)
            .ok_or_else(|| OperationError::internal(format!("master lost entry {id}")))?;

        inner.deindex_entry(id, &original);
        let mut entry = original.clone();
        // Re-index whichever shape survived; failure leaves the old entry.
        match apply_modifications(schema, &mut entry, mods) {
            Ok(()) => {
                inner.index_entry(id, &entry);
                inner.master.put(id, entry.clone());
                Ok(entry)
            }
            Err(err) => {
                inner.index_entry(id, &original);
                Err(err)
            }
        }
    }

    fn move_and_rename(
        &self,
        schema: &Registries,
        dn: &Dn,
        new_dn: &Dn,
        delete_old_rdn: bool,
    ) -> OpResult<()> {
        let mut inner = self.inner.write();
        let id = inner
            .entry_id(&self.suffix, dn)
            .ok_or_else(|| OperationError::no_such_object(dn, self.resolved_prefix_locked(&inner, dn)))?;

        if inner.entry_id(&self.suffix, new_dn).is_some() {
            return Err(OperationError::entry_already_exists(new_dn));
        }
        let new_parent = new_dn.parent();
        let new_parent_id = inner.entry_id(&self.suffix, &new_parent).ok_or_else(|| {
            OperationError::no_such_object(new_dn, self.resolved_prefix_locked(&inner, &new_parent))
        })?;
        if inner.sublevel.has_value(&id, &new_parent_id) {
            return Err(OperationError::unwilling(format!(
                "cannot move {dn} under its own subtree"
            )));
        }

        let old_ancestors = inner.ancestor_ids(id);
        let subtree: Vec<EntryId> = inner.sublevel.values(&id).copied().collect();

        // Relink the RDN index for the moved node only; descendant keys are
        // parent-relative and unaffected.
        let new_rdn = new_dn
            .rdn()
            .ok_or_else(|| OperationError::unwilling("cannot rename to the empty DN"))?;
        if let Some(old_key) = inner.rdn_rev.first(&id) {
            inner.rdn_fwd.remove(&old_key);
            inner.rdn_rev.remove_value(&id, &old_key);
        }
        let new_key = ParentIdAndRdn::new(new_parent_id, new_rdn.norm());
        inner.rdn_fwd.put(new_key.clone(), id);
        inner.rdn_rev.put(id, new_key);

        let new_ancestors = inner.ancestor_ids(id);
        for desc in &subtree {
            for ancestor in &old_ancestors {
                inner.sublevel.remove_value(ancestor, desc);
            }
            for ancestor in &new_ancestors {
                inner.sublevel.put(*ancestor, *desc);
            }
        }

        // Rewrite the DN carried by every entry of the moved subtree.
        for desc in &subtree {
            let mut entry = inner
                .master
                .get(*desc)
                .ok_or_else(|| OperationError::internal(format!("master lost entry {desc}")))?;
            let relative = entry
                .dn()
                .relative_to(dn)
                .ok_or_else(|| OperationError::internal("sublevel index out of sync"))?
                .to_vec();
            let mut target = new_dn.clone();
            for rdn in relative.iter().rev() {
                target = target.child(rdn.clone());
            }
            entry.set_dn(target);
            inner.master.put(*desc, entry);
        }

        // Adjust the moved entry's RDN attributes.
        let mut entry = inner
            .master
            .get(id)
            .ok_or_else(|| OperationError::internal(format!("master lost entry {id}")))?;
        inner.deindex_entry(id, &entry);
        if delete_old_rdn
            && let Some(old_rdn) = dn.rdn()
        {
            for ava in old_rdn.avas() {
                entry.remove_value(ava.attr_norm(), ava.value());
            }
        }
        entry.inject_rdn_attributes(schema)?;
        inner.index_entry(id, &entry);
        inner.master.put(id, entry);

        log::debug!("partition {}: moved {dn} to {new_dn}", self.id);
        Ok(())
    }

    fn lookup(&self, dn: &Dn) -> Option<Entry> {
        let inner = self.inner.read();
        let id = inner.entry_id(&self.suffix, dn)?;
        inner.master.get(id)
    }

    fn entry_id(&self, dn: &Dn) -> Option<EntryId> {
        self.inner.read().entry_id(&self.suffix, dn)
    }

    fn child_count(&self, dn: &Dn) -> usize {
        let inner = self.inner.read();
        match inner.entry_id(&self.suffix, dn) {
            Some(id) => inner.child_count(id),
            None => 0,
        }
    }

    fn count(&self) -> usize {
        self.inner.read().master.len()
    }
}

impl BTreePartition {
    /// The longest prefix of `dn` that exists, for `matchedDN` in errors.
    fn resolved_prefix_locked(&self, inner: &Inner, dn: &Dn) -> Dn {
        let mut current = dn.clone();
        loop {
            if inner.entry_id(&self.suffix, &current).is_some() {
                return current;
            }
            if current.is_root_dse() {
                return current;
            }
            current = current.parent();
        }
    }
}
