use std::sync::Arc;

use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::schema::system::oids;
use warren_lib_core::value::NormValue;

use crate::chain::{Interceptor, Next};
use crate::context::{
    AddContext, BindContext, DeleteContext, ListContext, LookupContext, ModifyContext,
    MoveContext, OpState, Principal, SearchContext,
};
use crate::nexus::PartitionNexus;
use crate::search::EntryFilteringCursor;

/// Resolves bind requests to a principal and keeps unauthenticated sessions
/// out when anonymous access is off. Simple binds compare `userPassword`
/// byte for byte; a missing entry and a wrong password are indistinguishable
/// from the outside.
#[derive(Debug)]
pub struct AuthenticationInterceptor {
    nexus: Arc<PartitionNexus>,
    allow_anonymous: bool,
}

impl AuthenticationInterceptor {
    pub fn new(nexus: Arc<PartitionNexus>, allow_anonymous: bool) -> Self {
        Self {
            nexus,
            allow_anonymous,
        }
    }

    fn check_session(&self, state: &OpState) -> OpResult<()> {
        if !self.allow_anonymous && state.principal().is_anonymous() && !state.internal {
            return Err(OperationError::new(
                LdapErrorKind::InsufficientAccessRights,
                "anonymous access is disabled",
            ));
        }
        Ok(())
    }

    fn invalid_credentials() -> OperationError {
        OperationError::new(LdapErrorKind::InvalidCredentials, "bind failed")
    }
}

impl Interceptor for AuthenticationInterceptor {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        self.check_session(&ctx.state)?;
        next.add(ctx)
    }

    fn delete(&self, next: Next<'_>, ctx: &mut DeleteContext) -> OpResult<()> {
        self.check_session(&ctx.state)?;
        next.delete(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        self.check_session(&ctx.state)?;
        next.modify(ctx)
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        self.check_session(&ctx.state)?;
        next.move_and_rename(ctx)
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        self.check_session(&ctx.state)?;
        next.lookup(ctx)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        self.check_session(&ctx.state)?;
        next.list(ctx)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        self.check_session(&ctx.state)?;
        next.search(ctx)
    }

    /// Terminal: a bind never travels further down the chain.
    fn bind(&self, _next: Next<'_>, ctx: &mut BindContext) -> OpResult<()> {
        if ctx.dn.is_root_dse() {
            if !ctx.credentials.is_empty() {
                return Err(Self::invalid_credentials());
            }
            ctx.principal = Some(Principal::anonymous());
            return Ok(());
        }

        let partition = self
            .nexus
            .find_partition(&ctx.dn)
            .map_err(|_| Self::invalid_credentials())?;
        let entry = partition
            .lookup(&ctx.dn)
            .ok_or_else(Self::invalid_credentials)?;

        let stored = entry
            .attribute(oids::USER_PASSWORD)
            .ok_or_else(Self::invalid_credentials)?;
        let presented = NormValue::Bytes(ctx.credentials.clone());
        if !stored.values().iter().any(|v| v.norm() == &presented) {
            log::debug!("failed simple bind as {}", ctx.dn);
            return Err(Self::invalid_credentials());
        }

        ctx.principal = Some(Principal::simple(ctx.dn.clone()));
        Ok(())
    }
}
