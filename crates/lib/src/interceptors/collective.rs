use std::sync::Arc;

use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::schema::Registries;
use warren_lib_core::schema::system::{EXCLUDE_ALL_COLLECTIVE, oids};

use crate::chain::{Interceptor, Next, SchemaRef};
use crate::context::{AddContext, ListContext, LookupContext, ModifyContext, SearchContext};
use crate::nexus::PartitionNexus;
use crate::search::filtering::{ErasedEntryFilter, SearchParams};
use crate::search::{EntryFilter, EntryFilteringCursor};

/// Merges inherited attribute values from collective-attribute subentries
/// into read results, honoring each entry's `collectiveExclusions`, and
/// refuses direct writes of collective attributes anywhere but a subentry.
#[derive(Debug)]
pub struct CollectiveAttributeInterceptor {
    schema: SchemaRef,
    nexus: Arc<PartitionNexus>,
    cache: Arc<crate::interceptors::SubentryCache>,
}

impl CollectiveAttributeInterceptor {
    pub fn new(
        schema: SchemaRef,
        nexus: Arc<PartitionNexus>,
        cache: Arc<crate::interceptors::SubentryCache>,
    ) -> Self {
        Self {
            schema,
            nexus,
            cache,
        }
    }

    fn reject_collective_write(
        schema: &Registries,
        target_is_subentry: bool,
        attr: &str,
    ) -> OpResult<()> {
        if target_is_subentry {
            return Ok(());
        }
        if let Some(attr_type) = schema.find_attribute_type(attr)
            && attr_type.collective
        {
            return Err(OperationError::new(
                LdapErrorKind::ObjectClassViolation,
                format!(
                    "collective attribute {} may only live in a collective-attribute subentry",
                    attr_type.preferred_name()
                ),
            ));
        }
        Ok(())
    }
}

impl Interceptor for CollectiveAttributeInterceptor {
    fn name(&self) -> &'static str {
        "collective-attribute"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        let schema = self.schema.current();
        let is_subentry = ctx
            .entry
            .is_object_class(&schema, "collectiveAttributeSubentry");
        for attribute in ctx.entry.attributes() {
            Self::reject_collective_write(&schema, is_subentry, attribute.oid())?;
        }
        next.add(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        let schema = self.schema.current();
        let is_subentry = self
            .nexus
            .find_partition(&ctx.dn)
            .ok()
            .and_then(|p| p.lookup(&ctx.dn))
            .is_some_and(|entry| entry.is_object_class(&schema, "collectiveAttributeSubentry"));
        for modification in &ctx.mods {
            Self::reject_collective_write(&schema, is_subentry, &modification.attr)?;
        }
        next.modify(ctx)
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        let mut entry = next.lookup(ctx)?;
        merge_collective(&self.schema.current(), &self.cache, &mut entry);
        Ok(entry)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.list(ctx)?;
        cursor.add_entry_filter(ErasedEntryFilter::new(CollectiveMergeFilter {
            cache: Arc::clone(&self.cache),
        }));
        Ok(cursor)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.search(ctx)?;
        cursor.add_entry_filter(ErasedEntryFilter::new(CollectiveMergeFilter {
            cache: Arc::clone(&self.cache),
        }));
        Ok(cursor)
    }
}

#[derive(Debug)]
struct CollectiveMergeFilter {
    cache: Arc<crate::interceptors::SubentryCache>,
}

impl EntryFilter for CollectiveMergeFilter {
    fn accept(&self, params: &SearchParams, entry: &mut Entry) -> OpResult<bool> {
        merge_collective(&params.schema, &self.cache, entry);
        Ok(true)
    }
}

/// Folds the collective attributes of every selecting subentry into the
/// entry, minus whatever its `collectiveExclusions` rules out.
fn merge_collective(
    schema: &Registries,
    cache: &crate::interceptors::SubentryCache,
    entry: &mut Entry,
) {
    if entry.is_object_class(schema, "subentry") {
        return;
    }

    let exclusions: Vec<String> = entry
        .attribute(oids::COLLECTIVE_EXCLUSIONS)
        .map(|attr| {
            attr.values()
                .iter()
                .filter_map(|v| v.norm().as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if exclusions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(EXCLUDE_ALL_COLLECTIVE))
    {
        return;
    }

    let excluded = |attr_oid: &str| -> bool {
        let Some(attr_type) = schema.find_attribute_type(attr_oid) else {
            return true;
        };
        exclusions.iter().any(|exclusion| {
            attr_type.oid.as_str() == exclusion
                || attr_type
                    .names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(exclusion))
        })
    };

    let dn = entry.dn().clone();
    for subentry in cache.selecting(&dn) {
        if !subentry.is_collective(schema) {
            continue;
        }
        for attribute in subentry.entry.attributes() {
            if !attribute.attr_type().collective || excluded(attribute.oid()) {
                continue;
            }
            for value in attribute.values() {
                let user = value.user().clone();
                if let Err(err) = entry.add_value(schema, attribute.oid(), user) {
                    log::warn!(
                        "could not merge collective {} into {dn}: {err}",
                        attribute.attr_type().preferred_name()
                    );
                }
            }
        }
    }
}
