use std::sync::Arc;

use ahash::AHashSet;
use parking_lot::RwLock;
use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::name::Dn;
use warren_lib_core::schema::system::oids;

use crate::chain::{Interceptor, Next};
use crate::context::{
    DeleteContext, ListContext, LookupContext, ModifyContext, MoveContext, OpState, Principal,
    SearchContext,
};
use crate::search::filtering::{ErasedEntryFilter, SearchParams};
use crate::search::{EntryFilter, EntryFilteringCursor};

/// Who counts as an administrator: the admin principal itself plus the
/// members of the administrators group, tracked as canonical DN strings.
/// Kept current by watching modifications of the group entry.
#[derive(Debug)]
pub struct AdminRoster {
    admin_dn: Dn,
    group_dn: Dn,
    users_base: Dn,
    groups_base: Dn,
    members: RwLock<AHashSet<String>>,
}

impl AdminRoster {
    pub fn new(admin_dn: Dn, group_dn: Dn, users_base: Dn, groups_base: Dn) -> Self {
        Self {
            admin_dn,
            group_dn,
            users_base,
            groups_base,
            members: RwLock::new(AHashSet::new()),
        }
    }

    pub fn admin_dn(&self) -> &Dn {
        &self.admin_dn
    }

    pub fn group_dn(&self) -> &Dn {
        &self.group_dn
    }

    /// Reloads the member set from the group entry.
    pub fn refresh(&self, group: &Entry) {
        let mut members = AHashSet::new();
        if let Some(attr) = group.attribute(oids::UNIQUE_MEMBER) {
            for value in attr.values() {
                if let Some(dn) = value.norm().as_str() {
                    members.insert(dn.to_string());
                }
            }
        }
        log::debug!("administrators roster now holds {} members", members.len());
        *self.members.write() = members;
    }

    pub fn is_admin(&self, principal: &Principal) -> bool {
        if principal.dn() == &self.admin_dn {
            return true;
        }
        self.members.read().contains(principal.dn().norm())
    }
}

/// The fixed administrative policy that stands in when rule-based access
/// control is off: the root DSE and the administrative accounts are
/// untouchable, and the user/group subtrees belong to administrators, with
/// a self-access exemption for reading and modifying one's own entry.
#[derive(Debug)]
pub struct DefaultAuthorizationInterceptor {
    roster: Arc<AdminRoster>,
    enabled: bool,
}

impl DefaultAuthorizationInterceptor {
    pub fn new(roster: Arc<AdminRoster>, enabled: bool) -> Self {
        Self { roster, enabled }
    }

    fn denied(message: impl Into<String>) -> OperationError {
        OperationError::new(LdapErrorKind::InsufficientAccessRights, message)
    }

    fn is_admin(&self, state: &OpState) -> bool {
        state.internal || self.roster.is_admin(state.principal())
    }

    /// Strictly below one of the protected containers.
    fn in_protected_subtree(&self, dn: &Dn) -> bool {
        (dn.is_descendant_of(&self.roster.users_base) && dn != &self.roster.users_base)
            || (dn.is_descendant_of(&self.roster.groups_base) && dn != &self.roster.groups_base)
    }
}

impl Interceptor for DefaultAuthorizationInterceptor {
    fn name(&self) -> &'static str {
        "default-authorization"
    }

    fn delete(&self, next: Next<'_>, ctx: &mut DeleteContext) -> OpResult<()> {
        if !self.enabled {
            return next.delete(ctx);
        }
        if ctx.dn.is_root_dse() {
            return Err(Self::denied("the root DSE cannot be deleted"));
        }
        if ctx.dn == *self.roster.admin_dn() {
            return Err(Self::denied(
                "the administrative account cannot be deleted, not even by itself",
            ));
        }
        if ctx.dn == *self.roster.group_dn() {
            return Err(Self::denied("the administrators group cannot be deleted"));
        }
        if !self.is_admin(&ctx.state) && self.in_protected_subtree(&ctx.dn) {
            return Err(Self::denied(format!(
                "only administrators may delete entries under {}",
                ctx.dn.parent()
            )));
        }
        next.delete(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        if !self.enabled {
            return next.modify(ctx);
        }
        if ctx.dn.is_root_dse() {
            return Err(Self::denied("the root DSE cannot be modified"));
        }
        if !self.is_admin(&ctx.state) {
            let principal_dn = ctx.state.principal().dn().clone();
            // Self-access: a principal may always modify its own entry.
            if ctx.dn == principal_dn {
                return next.modify(ctx);
            }
            if ctx.dn == *self.roster.admin_dn() {
                return Err(Self::denied(
                    "only administrators may modify the administrative account",
                ));
            }
            if self.in_protected_subtree(&ctx.dn) {
                return Err(Self::denied(format!(
                    "only administrators may modify entries under {}",
                    ctx.dn.parent()
                )));
            }
        }
        next.modify(ctx)?;
        // A change to the group entry reshapes who counts as an admin.
        if ctx.dn == *self.roster.group_dn()
            && let Some(entry) = &ctx.state.cached_entry
        {
            self.roster.refresh(entry);
        }
        Ok(())
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        if !self.enabled {
            return next.move_and_rename(ctx);
        }
        if ctx.dn.is_root_dse() {
            return Err(Self::denied("the root DSE cannot be moved or renamed"));
        }
        if ctx.dn == *self.roster.admin_dn() {
            return Err(Self::denied(
                "the administrative account cannot be moved or renamed",
            ));
        }
        if ctx.dn == *self.roster.group_dn() {
            return Err(Self::denied(
                "the administrators group cannot be moved or renamed",
            ));
        }
        if !self.is_admin(&ctx.state) {
            let new_dn = ctx.new_dn()?;
            if self.in_protected_subtree(&ctx.dn) || self.in_protected_subtree(&new_dn) {
                return Err(Self::denied(
                    "only administrators may relocate entries in the protected subtrees",
                ));
            }
        }
        next.move_and_rename(ctx)
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        if self.enabled
            && !self.is_admin(&ctx.state)
            && self.in_protected_subtree(&ctx.dn)
            && ctx.dn != *ctx.state.principal().dn()
        {
            return Err(Self::denied(format!(
                "only administrators may look up entries under {}",
                ctx.dn.parent()
            )));
        }
        next.lookup(ctx)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.list(ctx)?;
        if self.enabled && !self.is_admin(&ctx.state) {
            cursor.add_entry_filter(ErasedEntryFilter::new(VisibilityFilter {
                roster: Arc::clone(&self.roster),
            }));
        }
        Ok(cursor)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        let mut cursor = next.search(ctx)?;
        if self.enabled && !self.is_admin(&ctx.state) {
            cursor.add_entry_filter(ErasedEntryFilter::new(VisibilityFilter {
                roster: Arc::clone(&self.roster),
            }));
        }
        Ok(cursor)
    }
}

/// Drops entries a non-administrator must not see. Idempotent and free of
/// side effects, as every search predicate has to be.
#[derive(Debug)]
struct VisibilityFilter {
    roster: Arc<AdminRoster>,
}

impl EntryFilter for VisibilityFilter {
    fn accept(&self, params: &SearchParams, entry: &mut Entry) -> OpResult<bool> {
        let principal = params.session.principal();
        if self.roster.is_admin(principal) {
            return Ok(true);
        }
        let dn = entry.dn();
        let protected = (dn.is_descendant_of(&self.roster.users_base)
            && dn != &self.roster.users_base)
            || (dn.is_descendant_of(&self.roster.groups_base) && dn != &self.roster.groups_base);
        Ok(!protected || dn == principal.dn())
    }
}
