use warren_lib_core::entry::Entry;
use warren_lib_core::errors::OpResult;
use warren_lib_core::filter::rewriter;

use crate::chain::{Interceptor, Next, SchemaRef};
use crate::context::{
    AddContext, BindContext, DeleteContext, ListContext, LookupContext, ModifyContext,
    MoveContext, SearchContext,
};
use crate::search::EntryFilteringCursor;

/// The head of the chain: every DN entering the pipeline is reduced to its
/// canonical form here, and search filters go through the normalizing
/// rewriter. Nothing below this interceptor ever sees an unnormalized name.
#[derive(Debug)]
pub struct NormalizationInterceptor {
    schema: SchemaRef,
}

impl NormalizationInterceptor {
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema }
    }
}

impl Interceptor for NormalizationInterceptor {
    fn name(&self) -> &'static str {
        "normalization"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        let schema = self.schema.current();
        ctx.entry.set_dn(ctx.entry.dn().normalize(&schema)?);
        next.add(ctx)
    }

    fn delete(&self, next: Next<'_>, ctx: &mut DeleteContext) -> OpResult<()> {
        ctx.dn = ctx.dn.normalize(&self.schema.current())?;
        next.delete(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        ctx.dn = ctx.dn.normalize(&self.schema.current())?;
        next.modify(ctx)
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        let schema = self.schema.current();
        ctx.dn = ctx.dn.normalize(&schema)?;
        if let Some(parent) = &ctx.new_parent {
            ctx.new_parent = Some(parent.normalize(&schema)?);
        }
        if let Some(rdn) = &ctx.new_rdn {
            ctx.new_rdn = Some(rdn.normalize(&schema)?);
        }
        next.move_and_rename(ctx)
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        ctx.dn = ctx.dn.normalize(&self.schema.current())?;
        next.lookup(ctx)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        ctx.dn = ctx.dn.normalize(&self.schema.current())?;
        next.list(ctx)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        let schema = self.schema.current();
        ctx.base = ctx.base.normalize(&schema)?;
        if let Some(filter) = ctx.filter.take() {
            ctx.filter = rewriter::rewrite(filter, &schema);
            if ctx.filter.is_none() {
                log::debug!("filter under {} rewrote to nothing", ctx.base);
            }
        }
        next.search(ctx)
    }

    fn bind(&self, next: Next<'_>, ctx: &mut BindContext) -> OpResult<()> {
        if !ctx.dn.is_root_dse() {
            ctx.dn = ctx.dn.normalize(&self.schema.current())?;
        }
        next.bind(ctx)
    }
}
