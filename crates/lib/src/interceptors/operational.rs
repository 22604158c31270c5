use std::sync::Arc;

use smol_str::SmolStr;
use warren_lib_core::entry::{Entry, Modification};
use warren_lib_core::errors::OpResult;
use warren_lib_core::name::Dn;
use warren_lib_core::schema::Registries;
use warren_lib_core::schema::syntax::oids as syntax_oids;
use warren_lib_core::value::generalized_time_now;

use crate::chain::{Interceptor, Next, SchemaRef};
use crate::context::{
    AddContext, LookupContext, ModifyContext, MoveContext, OpState, ReturnSpec, SearchContext,
    ListContext,
};
use crate::nexus::PartitionNexus;
use crate::search::filtering::{ErasedEntryFilter, SearchParams};
use crate::search::{EntryFilter, EntryFilteringCursor};

/// Stamps the bookkeeping attributes and keeps them out of answers nobody
/// asked for. Creation stamps ride on the entry before it reaches storage;
/// modification stamps are a follow-up write issued only after the
/// operation below succeeded, so a refused rename never touches them.
#[derive(Debug)]
pub struct OperationalAttributeInterceptor {
    schema: SchemaRef,
    nexus: Arc<PartitionNexus>,
    denormalize: bool,
}

impl OperationalAttributeInterceptor {
    pub fn new(schema: SchemaRef, nexus: Arc<PartitionNexus>, denormalize: bool) -> Self {
        Self {
            schema,
            nexus,
            denormalize,
        }
    }

    /// The follow-up modify that sets `modifiersName` and `modifyTimestamp`
    /// on the final DN. Runs straight against the nexus: interceptors above
    /// have had their say, and re-entering the chain would loop.
    fn stamp_modifier(&self, state: &OpState, dn: &Dn) -> OpResult<()> {
        let mut follow_up = ModifyContext {
            state: OpState::internal(Arc::clone(&state.session)),
            dn: dn.clone(),
            mods: vec![
                Modification::replace(
                    "modifiersName",
                    &[state.principal().dn().norm()],
                ),
                Modification::replace("modifyTimestamp", &[&generalized_time_now()]),
            ],
        };
        self.nexus.modify(&mut follow_up)
    }
}

impl Interceptor for OperationalAttributeInterceptor {
    fn name(&self) -> &'static str {
        "operational-attribute"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        let schema = self.schema.current();
        let creator = ctx.state.principal().dn().norm().to_string();
        ctx.entry.add_str(&schema, "creatorsName", &creator)?;
        ctx.entry
            .add_str(&schema, "createTimestamp", &generalized_time_now())?;
        next.add(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        next.modify(ctx)?;
        if !ctx.state.internal {
            self.stamp_modifier(&ctx.state, &ctx.dn)?;
        }
        Ok(())
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        next.move_and_rename(ctx)?;
        if !ctx.state.internal {
            // The stamp lands on the entry's final name, not where it was.
            self.stamp_modifier(&ctx.state, &ctx.new_dn()?)?;
        }
        Ok(())
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        let mut entry = next.lookup(ctx)?;
        let schema = self.schema.current();
        let spec = ReturnSpec::from_request(&schema, ctx.attrs.as_deref());
        project(&schema, &spec, self.denormalize, &mut entry);
        Ok(entry)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.list(ctx)?;
        cursor.add_entry_filter(ErasedEntryFilter::new(ProjectionFilter {
            denormalize: self.denormalize,
        }));
        Ok(cursor)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.search(ctx)?;
        cursor.add_entry_filter(ErasedEntryFilter::new(ProjectionFilter {
            denormalize: self.denormalize,
        }));
        Ok(cursor)
    }
}

/// Strips everything the request did not ask for, and optionally rewrites
/// DN-valued operational attributes into their short-name form.
#[derive(Debug)]
struct ProjectionFilter {
    denormalize: bool,
}

impl EntryFilter for ProjectionFilter {
    fn accept(&self, params: &SearchParams, entry: &mut Entry) -> OpResult<bool> {
        project(
            &params.schema,
            &params.return_spec,
            self.denormalize,
            entry,
        );
        Ok(true)
    }
}

fn project(schema: &Registries, spec: &ReturnSpec, denormalize: bool, entry: &mut Entry) {
    let drop: Vec<SmolStr> = entry
        .attribute_oids()
        .filter(|oid| !spec.wants(schema, oid))
        .cloned()
        .collect();
    for oid in drop {
        entry.remove_attribute(&oid);
    }

    if denormalize {
        denormalize_dn_attributes(schema, entry);
    }
}

/// Rewrites the values of DN-syntax operational attributes from canonical
/// OID-based form into `name=value` form.
fn denormalize_dn_attributes(schema: &Registries, entry: &mut Entry) {
    let targets: Vec<SmolStr> = entry
        .attributes()
        .filter(|attr| {
            attr.attr_type().is_operational() && attr.attr_type().syntax == syntax_oids::DN
        })
        .map(|attr| attr.oid().clone())
        .collect();

    for oid in targets {
        let Some(attr) = entry.attribute(&oid) else {
            continue;
        };
        let pretty: Vec<String> = attr
            .values()
            .iter()
            .map(|value| {
                value
                    .user_str()
                    .map(|s| denormalize_dn(schema, s))
                    .unwrap_or_default()
            })
            .collect();

        let attr_type = attr.attr_type().clone();
        entry.remove_attribute(&oid);
        for value in pretty {
            if entry.add_value(schema, &attr_type.oid, value.into()).is_err() {
                log::warn!("could not denormalize a {} value", attr_type.preferred_name());
            }
        }
    }
}

fn denormalize_dn(schema: &Registries, raw: &str) -> String {
    let Ok(dn) = Dn::parse(raw) else {
        return raw.to_string();
    };
    dn.rdns()
        .iter()
        .map(|rdn| {
            rdn.avas()
                .iter()
                .map(|ava| {
                    let name = schema
                        .find_attribute_type(ava.attr_norm())
                        .map(|at| at.preferred_name().to_string())
                        .unwrap_or_else(|| ava.attr().to_string());
                    format!("{name}={}", ava.value())
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}
