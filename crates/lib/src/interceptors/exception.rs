use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use warren_lib_core::entry::{Entry, ModOp};
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::name::Dn;

use crate::chain::{Interceptor, Next, SchemaRef};
use crate::context::{
    AddContext, DeleteContext, ListContext, LookupContext, ModifyContext, MoveContext,
    control_oids,
};
use crate::nexus::PartitionNexus;
use crate::search::EntryFilteringCursor;

/// Tree-level sanity ahead of the partitions: existence, uniqueness, leaf
/// and alias guards, and protection of the subschema subentry. Negative
/// alias answers are remembered in a bounded LRU keyed by the canonical DN;
/// any write touching a cached DN evicts it.
pub struct ExceptionInterceptor {
    schema: SchemaRef,
    nexus: Arc<PartitionNexus>,
    not_alias: Mutex<LruCache<String, ()>>,
}

impl std::fmt::Debug for ExceptionInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionInterceptor").finish_non_exhaustive()
    }
}

impl ExceptionInterceptor {
    pub fn new(schema: SchemaRef, nexus: Arc<PartitionNexus>, cache_size: NonZeroUsize) -> Self {
        Self {
            schema,
            nexus,
            not_alias: Mutex::new(LruCache::new(cache_size)),
        }
    }

    fn invalidate(&self, dn: &Dn) {
        self.not_alias.lock().pop(dn.norm());
    }

    fn no_such_object(&self, dn: &Dn) -> OperationError {
        OperationError::no_such_object(dn, self.nexus.resolved_prefix(dn))
    }

    /// Verifies the parent exists and is not an alias. A hit in the
    /// negative cache skips the whole lookup.
    fn check_parent(&self, parent: &Dn, target: &Dn, deref_suppressed: bool) -> OpResult<()> {
        if parent.is_root_dse() {
            return Ok(());
        }
        if self.not_alias.lock().get(parent.norm()).is_some() {
            return Ok(());
        }

        let partition = self.nexus.find_partition(parent)?;
        let entry = partition
            .lookup(parent)
            .ok_or_else(|| self.no_such_object(target))?;

        if !deref_suppressed && entry.is_object_class(&self.schema.current(), "alias") {
            return Err(OperationError::new(
                LdapErrorKind::AliasDereferencingProblem,
                format!("the parent {parent} is an alias"),
            )
            .with_matched_dn(parent.clone()));
        }

        self.not_alias
            .lock()
            .put(parent.norm().to_string(), ());
        Ok(())
    }
}

impl Interceptor for ExceptionInterceptor {
    fn name(&self) -> &'static str {
        "exception"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        let dn = ctx.entry.dn().clone();
        if &dn == self.nexus.subschema_dn() {
            return Err(OperationError::entry_already_exists(&dn));
        }
        if self.nexus.has_entry(&dn) {
            return Err(OperationError::entry_already_exists(&dn));
        }

        // The suffix entry of a partition has no parent inside the DIT.
        let is_suffix = self
            .nexus
            .partitions()
            .iter()
            .any(|p| p.suffix() == &dn);
        if !is_suffix {
            let deref_suppressed = ctx.state.has_control(control_oids::MANAGE_DSA_IT);
            self.check_parent(&dn.parent(), &dn, deref_suppressed)?;
        }

        next.add(ctx)
    }

    fn delete(&self, next: Next<'_>, ctx: &mut DeleteContext) -> OpResult<()> {
        if &ctx.dn == self.nexus.subschema_dn() {
            return Err(OperationError::unwilling(
                "the subschema subentry cannot be deleted",
            ));
        }
        let partition = self.nexus.find_partition(&ctx.dn)?;
        if !partition.has_entry(&ctx.dn) {
            return Err(self.no_such_object(&ctx.dn));
        }
        if partition.child_count(&ctx.dn) > 0 {
            return Err(OperationError::new(
                LdapErrorKind::NotAllowedOnNonLeaf,
                format!("{} still has children", ctx.dn),
            )
            .with_matched_dn(ctx.dn.clone()));
        }

        let result = next.delete(ctx);
        if result.is_ok() {
            self.invalidate(&ctx.dn);
        }
        result
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        let partition = self.nexus.find_partition(&ctx.dn)?;
        let entry = partition
            .lookup(&ctx.dn)
            .ok_or_else(|| self.no_such_object(&ctx.dn))?;

        let schema = self.schema.current();
        for modification in &ctx.mods {
            if modification.op != ModOp::Add {
                continue;
            }
            let Ok(attr_type) = schema.attribute_type(&modification.attr) else {
                continue; // the schema interceptor reports this one
            };
            for value in &modification.values {
                let value = schema.normalize_value(&attr_type, value.clone())?;
                if entry.contains(&attr_type.oid, &value) {
                    return Err(OperationError::new(
                        LdapErrorKind::AttributeOrValueExists,
                        format!(
                            "{} already holds that {} value",
                            ctx.dn, modification.attr
                        ),
                    )
                    .with_matched_dn(ctx.dn.clone()));
                }
            }
        }

        let result = next.modify(ctx);
        if result.is_ok() {
            self.invalidate(&ctx.dn);
        }
        result
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        if &ctx.dn == self.nexus.subschema_dn() {
            return Err(OperationError::unwilling(
                "the subschema subentry cannot be moved or renamed",
            ));
        }
        if !self.nexus.has_entry(&ctx.dn) {
            return Err(self.no_such_object(&ctx.dn));
        }
        let new_dn = ctx.new_dn()?;
        if &new_dn == self.nexus.subschema_dn() || self.nexus.has_entry(&new_dn) {
            return Err(OperationError::entry_already_exists(&new_dn));
        }
        if let Some(parent) = &ctx.new_parent
            && !self.nexus.has_entry(parent)
        {
            return Err(self.no_such_object(parent));
        }

        let result = next.move_and_rename(ctx);
        if result.is_ok() {
            self.invalidate(&ctx.dn);
        }
        result
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        if !self.nexus.has_entry(&ctx.dn) {
            return Err(self.no_such_object(&ctx.dn));
        }
        next.lookup(ctx)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        if !self.nexus.has_entry(&ctx.dn) {
            return Err(self.no_such_object(&ctx.dn));
        }
        next.list(ctx)
    }

    // Search passes through: an absent base is told apart from an empty
    // result only once the stream has proven empty, down at the nexus.
}
