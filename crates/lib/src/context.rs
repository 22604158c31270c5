use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use smol_str::SmolStr;
use warren_lib_core::entry::{Entry, Modification};
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::filter::Filter;
use warren_lib_core::helpers::IndexSet;
use warren_lib_core::name::{Dn, Rdn};
use warren_lib_core::schema::Registries;

/// Control OIDs the core recognizes. Everything else is routed through
/// untouched.
pub mod control_oids {
    /// Makes subentries visible to (and only to) the search.
    pub const SUBENTRIES: &str = "1.3.6.1.4.1.4203.1.10.1";
    /// Suppresses referral handling and alias dereferencing.
    pub const MANAGE_DSA_IT: &str = "2.16.840.1.113730.3.4.2";
    pub const PERSISTENT_SEARCH: &str = "2.16.840.1.113730.3.4.3";
    pub const PASSWORD_POLICY: &str = "1.3.6.1.4.1.42.2.27.8.5.1";
}

/// A request or response control: OID, criticality, opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: SmolStr,
    pub criticality: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(oid: &str) -> Self {
        Self {
            oid: oid.into(),
            criticality: false,
            value: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.criticality = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLevel {
    Anonymous,
    Simple,
}

/// The authenticated identity an operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    dn: Dn,
    auth: AuthLevel,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            dn: Dn::root_dse(),
            auth: AuthLevel::Anonymous,
        }
    }

    pub fn simple(dn: Dn) -> Self {
        Self {
            dn,
            auth: AuthLevel::Simple,
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn is_anonymous(&self) -> bool {
        self.auth == AuthLevel::Anonymous
    }
}

/// One client session. Cheap to clone and share across operations.
#[derive(Debug, Clone)]
pub struct Session {
    principal: Principal,
}

impl Session {
    pub fn new(principal: Principal) -> Arc<Session> {
        Arc::new(Session { principal })
    }

    pub fn anonymous() -> Arc<Session> {
        Self::new(Principal::anonymous())
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

/// The state every operation context shares: the session, the control slots,
/// the abandon flag cursors poll, and a slot for a cached entry snapshot so
/// interceptors do not re-fetch the target.
#[derive(Debug, Clone)]
pub struct OpState {
    pub session: Arc<Session>,
    pub request_controls: Vec<Control>,
    pub response_controls: Vec<Control>,
    pub abandoned: Arc<AtomicBool>,
    pub cached_entry: Option<Entry>,
    /// Engine-issued follow-up operations (operational stamping, group cache
    /// refresh) run with this set and skip user-facing guards.
    pub internal: bool,
}

impl OpState {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            request_controls: Vec::new(),
            response_controls: Vec::new(),
            abandoned: Arc::new(AtomicBool::new(false)),
            cached_entry: None,
            internal: false,
        }
    }

    pub fn internal(session: Arc<Session>) -> Self {
        let mut state = Self::new(session);
        state.internal = true;
        state
    }

    pub fn principal(&self) -> &Principal {
        self.session.principal()
    }

    pub fn has_control(&self, oid: &str) -> bool {
        self.request_controls.iter().any(|c| c.oid == oid)
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Relaxed)
    }

    pub fn abandon_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abandoned)
    }
}

#[derive(Debug)]
pub struct AddContext {
    pub state: OpState,
    pub entry: Entry,
}

#[derive(Debug)]
pub struct DeleteContext {
    pub state: OpState,
    pub dn: Dn,
}

#[derive(Debug)]
pub struct ModifyContext {
    pub state: OpState,
    pub dn: Dn,
    pub mods: Vec<Modification>,
}

/// Covers rename, move, and move-and-rename: `new_rdn` alone renames in
/// place, `new_parent` alone moves under a new superior, both together do
/// both at once.
#[derive(Debug)]
pub struct MoveContext {
    pub state: OpState,
    pub dn: Dn,
    pub new_parent: Option<Dn>,
    pub new_rdn: Option<Rdn>,
    pub delete_old_rdn: bool,
}

impl MoveContext {
    /// The DN the entry ends up under once the operation succeeds.
    pub fn new_dn(&self) -> OpResult<Dn> {
        if self.new_parent.is_none() && self.new_rdn.is_none() {
            return Err(OperationError::new(
                LdapErrorKind::OperationsError,
                "move context carries neither a new parent nor a new RDN",
            ));
        }
        let parent = self
            .new_parent
            .clone()
            .unwrap_or_else(|| self.dn.parent());
        let rdn = match &self.new_rdn {
            Some(rdn) => rdn.clone(),
            None => self
                .dn
                .rdn()
                .cloned()
                .ok_or_else(|| OperationError::unwilling("cannot move the root DSE"))?,
        };
        Ok(parent.child(rdn))
    }
}

#[derive(Debug)]
pub struct LookupContext {
    pub state: OpState,
    pub dn: Dn,
    /// `None` asks for every user attribute.
    pub attrs: Option<Vec<SmolStr>>,
}

#[derive(Debug)]
pub struct ListContext {
    pub state: OpState,
    pub dn: Dn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Object,
    OneLevel,
    Subtree,
}

#[derive(Debug)]
pub struct SearchContext {
    pub state: OpState,
    pub base: Dn,
    pub scope: SearchScope,
    /// `None` once the rewriter has reduced the filter to nothing; the
    /// search then short-circuits to an empty stream.
    pub filter: Option<Filter>,
    pub attrs: Option<Vec<SmolStr>>,
    pub size_limit: Option<usize>,
    pub time_limit_seconds: Option<u32>,
}

impl SearchContext {
    /// Milliseconds for the underlying waits, capped so arithmetic further
    /// down never overflows.
    pub fn time_limit_ms(&self) -> Option<u64> {
        const MAX_MS: u64 = u64::MAX / 2;
        self.time_limit_seconds
            .map(|secs| (u64::from(secs)).saturating_mul(1000).min(MAX_MS))
    }
}

#[derive(Debug)]
pub struct BindContext {
    pub state: OpState,
    pub dn: Dn,
    pub credentials: Vec<u8>,
    /// Filled by the authentication interceptor on success.
    pub principal: Option<Principal>,
}

/// What a read operation should hand back, resolved from the request's
/// attribute-id list against the schema.
#[derive(Debug, Clone)]
pub struct ReturnSpec {
    pub all_user: bool,
    pub all_operational: bool,
    pub no_attrs: bool,
    pub attrs: IndexSet<SmolStr>,
}

impl ReturnSpec {
    /// `None` means "everything the user may see": all user attributes,
    /// no operational ones.
    pub fn from_request(schema: &Registries, attrs: Option<&[SmolStr]>) -> ReturnSpec {
        let Some(attrs) = attrs else {
            return ReturnSpec {
                all_user: true,
                all_operational: false,
                no_attrs: false,
                attrs: IndexSet::default(),
            };
        };

        let mut spec = ReturnSpec {
            all_user: false,
            all_operational: false,
            no_attrs: false,
            attrs: IndexSet::default(),
        };
        for attr in attrs {
            match attr.as_str() {
                "*" => spec.all_user = true,
                "+" => spec.all_operational = true,
                "1.1" => spec.no_attrs = true,
                name => {
                    if let Some(at) = schema.find_attribute_type(name) {
                        spec.attrs.insert(at.oid.clone());
                    }
                    // Unknown requested attributes are silently skipped, the
                    // entry simply cannot produce them.
                }
            }
        }
        if spec.all_user || spec.all_operational || !spec.attrs.is_empty() {
            spec.no_attrs = false;
        }
        spec
    }

    /// Whether the given type should be returned, honoring polymorphic
    /// requests: asking for a supertype produces its subtypes too.
    pub fn wants(&self, schema: &Registries, oid: &str) -> bool {
        if self.no_attrs {
            return false;
        }
        if self
            .attrs
            .iter()
            .any(|requested| schema.is_attribute_subtype(oid, requested))
        {
            return true;
        }
        let Some(at) = schema.find_attribute_type(oid) else {
            return false;
        };
        if at.is_operational() {
            self.all_operational
        } else {
            self.all_user
        }
    }
}

#[cfg(test)]
mod tests {
    use warren_lib_core::schema::system::system_registries;

    use super::*;

    #[test]
    fn test_return_spec_default_is_user_attributes_only() {
        let schema = system_registries();
        let spec = ReturnSpec::from_request(&schema, None);
        assert!(spec.wants(&schema, "2.5.4.3"), "cn comes back");
        assert!(!spec.wants(&schema, "2.5.18.1"), "createTimestamp does not");
    }

    #[test]
    fn test_return_spec_explicit_list() {
        let schema = system_registries();
        let attrs: Vec<SmolStr> = vec!["createTimestamp".into()];
        let spec = ReturnSpec::from_request(&schema, Some(&attrs));
        assert!(spec.wants(&schema, "2.5.18.1"));
        assert!(!spec.wants(&schema, "2.5.4.3"));
    }

    #[test]
    fn test_requesting_a_supertype_covers_collective_subtypes() {
        let schema = system_registries();
        let attrs: Vec<SmolStr> = vec!["ou".into()];
        let spec = ReturnSpec::from_request(&schema, Some(&attrs));
        assert!(spec.wants(&schema, "2.5.4.11.1"), "c-ou rides along with ou");
    }

    #[test]
    fn test_no_attrs_marker() {
        let schema = system_registries();
        let attrs: Vec<SmolStr> = vec!["1.1".into()];
        let spec = ReturnSpec::from_request(&schema, Some(&attrs));
        assert!(!spec.wants(&schema, "2.5.4.3"));
    }
}
