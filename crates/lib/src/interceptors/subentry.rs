use std::sync::Arc;

use parking_lot::RwLock;
use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::name::Dn;
use warren_lib_core::schema::Registries;
use warren_lib_core::schema::system::oids;
use warren_lib_core::value::ValueData;

use crate::chain::{Interceptor, Next, SchemaRef};
use crate::context::{AddContext, DeleteContext, ListContext, LookupContext, ModifyContext, MoveContext, SearchContext};
use crate::nexus::PartitionNexus;
use crate::search::filtering::{ErasedEntryFilter, SearchParams};
use crate::search::{EntryFilter, EntryFilteringCursor};

/// A parsed `subtreeSpecification`: the region of the tree a subentry
/// administers, relative to its administrative point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtreeSpecification {
    pub base: Option<Dn>,
    pub minimum: usize,
    pub maximum: Option<usize>,
}

/// Parses the `{ base "...", minimum n, maximum n }` form. Unsupported
/// refinement keywords are rejected rather than silently ignored.
pub fn parse_subtree_specification(
    schema: &Registries,
    raw: &str,
) -> OpResult<SubtreeSpecification> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| bad_spec(raw, "must be enclosed in braces"))?;

    let mut spec = SubtreeSpecification::default();
    let mut rest = inner.trim();
    while !rest.is_empty() {
        let (keyword, tail) = rest
            .split_once(|c: char| c.is_whitespace())
            .ok_or_else(|| bad_spec(raw, "keyword without a value"))?;
        rest = tail.trim_start();
        match keyword {
            "base" => {
                let (value, tail) = quoted(rest).ok_or_else(|| bad_spec(raw, "base needs a quoted DN"))?;
                spec.base = Some(Dn::parse(value)?.normalize(schema)?);
                rest = tail;
            }
            "minimum" => {
                let (value, tail) = number(rest).ok_or_else(|| bad_spec(raw, "minimum needs a number"))?;
                spec.minimum = value;
                rest = tail;
            }
            "maximum" => {
                let (value, tail) = number(rest).ok_or_else(|| bad_spec(raw, "maximum needs a number"))?;
                spec.maximum = Some(value);
                rest = tail;
            }
            other => {
                return Err(bad_spec(raw, format!("unsupported refinement {other:?}")));
            }
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }
    Ok(spec)
}

fn quoted(input: &str) -> Option<(&str, &str)> {
    let rest = input.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some((&rest[..end], &rest[end + 1..]))
}

fn number(input: &str) -> Option<(usize, &str)> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    input[..end].parse().ok().map(|n| (n, &input[end..]))
}

fn bad_spec(raw: &str, detail: impl Into<String>) -> OperationError {
    OperationError::new(
        LdapErrorKind::InvalidAttributeSyntax,
        format!("bad subtreeSpecification {raw:?}: {}", detail.into()),
    )
}

/// One administrative subentry as the engine caches it: where it sits, the
/// region it selects, and its attributes for whoever merges them.
#[derive(Debug, Clone)]
pub struct CachedSubentry {
    pub dn: Dn,
    pub region: Dn,
    pub spec: SubtreeSpecification,
    pub entry: Entry,
}

impl CachedSubentry {
    fn build(schema: &Registries, entry: &Entry) -> OpResult<CachedSubentry> {
        let raw = entry
            .attribute(oids::SUBTREE_SPECIFICATION)
            .and_then(|attr| attr.first())
            .and_then(|value| value.user_str())
            .ok_or_else(|| {
                OperationError::new(
                    LdapErrorKind::ObjectClassViolation,
                    format!("subentry {} carries no subtreeSpecification", entry.dn()),
                )
            })?;
        let spec = parse_subtree_specification(schema, raw)?;

        // The administrative point is the subentry's parent; the base is
        // relative to it.
        let mut region = entry.dn().parent();
        if let Some(base) = &spec.base {
            for rdn in base.rdns().iter().rev() {
                region = region.child(rdn.clone());
            }
        }

        Ok(CachedSubentry {
            dn: entry.dn().clone(),
            region,
            spec,
            entry: entry.clone(),
        })
    }

    /// Whether the region selects `dn`.
    pub fn selects(&self, dn: &Dn) -> bool {
        if dn == &self.dn || !dn.is_descendant_of(&self.region) {
            return false;
        }
        let depth = dn.size() - self.region.size();
        if depth < self.spec.minimum {
            return false;
        }
        match self.spec.maximum {
            Some(maximum) => depth <= maximum,
            None => true,
        }
    }

    pub fn is_collective(&self, schema: &Registries) -> bool {
        self.entry
            .is_object_class(schema, "collectiveAttributeSubentry")
    }
}

/// The process-wide subentry map, shared between the subentry and
/// collective-attribute interceptors. Reads vastly outnumber writes.
#[derive(Debug, Default)]
pub struct SubentryCache {
    entries: RwLock<Vec<CachedSubentry>>,
}

impl SubentryCache {
    pub fn insert(&self, schema: &Registries, entry: &Entry) -> OpResult<()> {
        let cached = CachedSubentry::build(schema, entry)?;
        let mut entries = self.entries.write();
        entries.retain(|c| c.dn != cached.dn);
        entries.push(cached);
        Ok(())
    }

    pub fn remove(&self, dn: &Dn) {
        self.entries.write().retain(|c| &c.dn != dn);
    }

    pub fn contains(&self, dn: &Dn) -> bool {
        self.entries.read().iter().any(|c| &c.dn == dn)
    }

    /// Every cached subentry whose region selects `dn`.
    pub fn selecting(&self, dn: &Dn) -> Vec<CachedSubentry> {
        self.entries
            .read()
            .iter()
            .filter(|c| c.selects(dn))
            .cloned()
            .collect()
    }
}

/// Maintains the subentry cache across writes, validates subtree
/// specifications on the way in, hides subentries from ordinary searches,
/// and stamps the `collectiveAttributeSubentries` references on read.
#[derive(Debug)]
pub struct SubentryInterceptor {
    schema: SchemaRef,
    nexus: Arc<PartitionNexus>,
    cache: Arc<SubentryCache>,
}

impl SubentryInterceptor {
    pub fn new(
        schema: SchemaRef,
        nexus: Arc<PartitionNexus>,
        cache: Arc<SubentryCache>,
    ) -> Self {
        Self {
            schema,
            nexus,
            cache,
        }
    }
}

impl Interceptor for SubentryInterceptor {
    fn name(&self) -> &'static str {
        "subentry"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        let schema = self.schema.current();
        let is_subentry = ctx.entry.is_object_class(&schema, "subentry");
        if is_subentry {
            // Validate before storage sees it; the insert below reuses the
            // stored shape.
            CachedSubentry::build(&schema, &ctx.entry)?;
        }
        next.add(ctx)?;
        if is_subentry {
            self.cache.insert(&schema, &ctx.entry)?;
        }
        Ok(())
    }

    fn delete(&self, next: Next<'_>, ctx: &mut DeleteContext) -> OpResult<()> {
        next.delete(ctx)?;
        self.cache.remove(&ctx.dn);
        Ok(())
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        next.modify(ctx)?;
        if self.cache.contains(&ctx.dn) {
            let schema = self.schema.current();
            match &ctx.state.cached_entry {
                Some(entry) => self.cache.insert(&schema, entry)?,
                None => self.cache.remove(&ctx.dn),
            }
        }
        Ok(())
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        let new_dn = ctx.new_dn()?;
        next.move_and_rename(ctx)?;
        if self.cache.contains(&ctx.dn) {
            self.cache.remove(&ctx.dn);
            if let Ok(partition) = self.nexus.find_partition(&new_dn)
                && let Some(entry) = partition.lookup(&new_dn)
            {
                self.cache.insert(&self.schema.current(), &entry)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        let mut entry = next.lookup(ctx)?;
        let schema = self.schema.current();
        stamp_subentry_refs(&schema, &self.cache, &mut entry);
        Ok(entry)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.list(ctx)?;
        cursor.add_entry_filter(ErasedEntryFilter::new(SubentryVisibilityFilter {
            cache: Arc::clone(&self.cache),
        }));
        Ok(cursor)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.search(ctx)?;
        cursor.add_entry_filter(ErasedEntryFilter::new(SubentryVisibilityFilter {
            cache: Arc::clone(&self.cache),
        }));
        Ok(cursor)
    }
}

/// RFC 3672 visibility: with the subentries control only subentries come
/// back; without it they stay hidden except from a base-object search.
/// Visible ordinary entries get their subentry references stamped.
#[derive(Debug)]
struct SubentryVisibilityFilter {
    cache: Arc<SubentryCache>,
}

impl EntryFilter for SubentryVisibilityFilter {
    fn accept(&self, params: &SearchParams, entry: &mut Entry) -> OpResult<bool> {
        let is_subentry = entry.is_object_class(&params.schema, "subentry");
        if params.subentries_visible {
            return Ok(is_subentry);
        }
        if is_subentry {
            return Ok(params.scope == crate::context::SearchScope::Object);
        }
        stamp_subentry_refs(&params.schema, &self.cache, entry);
        Ok(true)
    }
}

fn stamp_subentry_refs(schema: &Registries, cache: &SubentryCache, entry: &mut Entry) {
    if entry.is_object_class(schema, "subentry") {
        return;
    }
    let dn = entry.dn().clone();
    for subentry in cache.selecting(&dn) {
        if !subentry.is_collective(schema) {
            continue;
        }
        let value = ValueData::Text(subentry.dn.norm().to_string());
        if let Err(err) = entry.add_value(schema, "collectiveAttributeSubentries", value) {
            log::warn!("could not stamp subentry reference on {dn}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use warren_lib_core::schema::system::system_registries;

    use super::*;

    #[test]
    fn test_parse_base_only() {
        let schema = system_registries();
        let spec = parse_subtree_specification(&schema, r#"{ base "ou=configuration" }"#).unwrap();
        assert_eq!(
            spec.base.as_ref().map(|dn| dn.norm().to_string()),
            Some("2.5.4.11=configuration".to_string())
        );
        assert_eq!(spec.minimum, 0);
        assert_eq!(spec.maximum, None);
    }

    #[test]
    fn test_parse_empty_and_bounded() {
        let schema = system_registries();
        assert_eq!(
            parse_subtree_specification(&schema, "{}").unwrap(),
            SubtreeSpecification::default()
        );
        let spec =
            parse_subtree_specification(&schema, r#"{ base "ou=a", minimum 1, maximum 3 }"#)
                .unwrap();
        assert_eq!(spec.minimum, 1);
        assert_eq!(spec.maximum, Some(3));
    }

    #[test]
    fn test_unknown_refinements_are_refused() {
        let schema = system_registries();
        assert!(
            parse_subtree_specification(&schema, r#"{ specificationFilter item:1.2.3 }"#).is_err()
        );
    }

    #[test]
    fn test_selection_region() {
        let schema = system_registries();
        let dn = |s: &str| Dn::parse(s).unwrap().normalize(&schema).unwrap();

        let entry = Entry::with_attrs(
            &schema,
            dn("cn=collective,ou=system"),
            &[
                ("objectClass", &["subentry", "collectiveAttributeSubentry"]),
                ("cn", &["collective"]),
                ("subtreeSpecification", &[r#"{ base "ou=configuration" }"#]),
            ],
        )
        .unwrap();
        let cached = CachedSubentry::build(&schema, &entry).unwrap();

        assert_eq!(cached.region, dn("ou=configuration,ou=system"));
        assert!(cached.selects(&dn("ou=configuration,ou=system")));
        assert!(cached.selects(&dn("ou=services,ou=configuration,ou=system")));
        assert!(!cached.selects(&dn("ou=users,ou=system")));
        assert!(!cached.selects(&dn("cn=collective,ou=system")));
    }
}
