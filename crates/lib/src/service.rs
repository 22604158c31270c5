use std::sync::Arc;

use smol_str::SmolStr;
use warren_lib_core::entry::{Entry, Modification};
use warren_lib_core::errors::{OpResult, OperationError};
use warren_lib_core::ldif;
use warren_lib_core::name::{Dn, Rdn};
use warren_lib_core::schema::Registries;
use warren_lib_core::schema::system::system_registries;
use warren_lib_core::store::Cursor as _;
use warren_lib_core::value::ValueData;

use crate::chain::{InterceptorChain, SchemaRef};
use crate::config::DirectoryConfig;
use crate::context::{
    AddContext, BindContext, Control, DeleteContext, ListContext, LookupContext, ModifyContext,
    MoveContext, OpState, Principal, SearchContext, SearchScope, Session,
};
use crate::interceptors::{AdminRoster, SubentryCache, interceptors};
use crate::nexus::PartitionNexus;
use crate::partition::{BTreePartition, Erased as _};
use crate::search::EntryFilteringCursor;

/// One search request as an embedder phrases it; everything but base,
/// scope and filter is optional.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attrs: Option<Vec<String>>,
    pub size_limit: Option<usize>,
    pub time_limit_seconds: Option<u32>,
    pub controls: Vec<Control>,
}

impl SearchRequest {
    pub fn new(base: &str, scope: SearchScope, filter: &str) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            attrs: None,
            size_limit: None,
            time_limit_seconds: None,
            controls: Vec::new(),
        }
    }

    pub fn attrs(mut self, attrs: &[&str]) -> Self {
        self.attrs = Some(attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn time_limit_seconds(mut self, seconds: u32) -> Self {
        self.time_limit_seconds = Some(seconds);
        self
    }
}

/// The embeddable directory service: owns the schema, the partitions, the
/// nexus and the interceptor chain, and exposes the operation surface.
/// Construction bootstraps the system partition with the administrative
/// entries every instance relies on.
#[derive(Debug)]
pub struct DirectoryService {
    config: DirectoryConfig,
    schema: SchemaRef,
    nexus: Arc<PartitionNexus>,
    chain: InterceptorChain,
    roster: Arc<AdminRoster>,
    subentries: Arc<SubentryCache>,
    admin_session: Arc<Session>,
}

impl DirectoryService {
    pub fn new(config: DirectoryConfig) -> OpResult<Self> {
        let schema = SchemaRef::new(system_registries());
        let registries = schema.current();

        let mut nexus =
            PartitionNexus::new(schema.clone(), config.denormalize_operational_attributes)?;
        let system_suffix = Dn::parse("ou=system")?.normalize(&registries)?;
        nexus.add_partition(
            BTreePartition::new(
                "system",
                system_suffix,
                &registries,
                &config.indexed_attributes,
            )?
            .erased(),
        )?;
        for spec in &config.partitions {
            let suffix = Dn::parse(&spec.suffix)?.normalize(&registries)?;
            nexus.add_partition(
                BTreePartition::new(&spec.id, suffix, &registries, &config.indexed_attributes)?
                    .erased(),
            )?;
        }
        let nexus = Arc::new(nexus);

        let admin_dn = Dn::parse(&config.admin_dn)?.normalize(&registries)?;
        let users_base = Dn::parse("ou=users,ou=system")?.normalize(&registries)?;
        let groups_base = Dn::parse("ou=groups,ou=system")?.normalize(&registries)?;
        let group_dn =
            Dn::parse("cn=Administrators,ou=groups,ou=system")?.normalize(&registries)?;
        let roster = Arc::new(AdminRoster::new(
            admin_dn.clone(),
            group_dn,
            users_base,
            groups_base,
        ));
        let subentries = Arc::new(SubentryCache::default());

        let chain = InterceptorChain::new(
            interceptors(&schema, &nexus, &subentries, &roster, &config),
            Arc::clone(&nexus),
        );

        let service = Self {
            config,
            schema,
            nexus,
            chain,
            roster,
            subentries,
            admin_session: Session::new(Principal::simple(admin_dn)),
        };
        service.bootstrap()?;
        Ok(service)
    }

    /// The entries every instance starts with, created only when missing so
    /// a restart over existing state is a no-op.
    fn bootstrap(&self) -> OpResult<()> {
        let admin_dn = self.config.admin_dn.as_str();
        let seed: &[(&str, &[(&str, &[&str])])] = &[
            (
                "ou=system",
                &[
                    ("objectClass", &["top", "organizationalUnit"]),
                    ("ou", &["system"]),
                ],
            ),
            (
                admin_dn,
                &[
                    ("objectClass", &["top", "inetOrgPerson"]),
                    ("cn", &["system administrator"]),
                    ("sn", &["administrator"]),
                    ("uid", &["admin"]),
                    ("userPassword", &[self.config.admin_password.as_str()]),
                ],
            ),
            (
                "ou=users,ou=system",
                &[
                    ("objectClass", &["top", "organizationalUnit"]),
                    ("ou", &["users"]),
                ],
            ),
            (
                "ou=groups,ou=system",
                &[
                    ("objectClass", &["top", "organizationalUnit"]),
                    ("ou", &["groups"]),
                ],
            ),
            (
                "cn=Administrators,ou=groups,ou=system",
                &[
                    ("objectClass", &["top", "groupOfUniqueNames"]),
                    ("cn", &["Administrators"]),
                    ("uniqueMember", &[admin_dn]),
                ],
            ),
            (
                "ou=configuration,ou=system",
                &[
                    ("objectClass", &["top", "organizationalUnit"]),
                    ("ou", &["configuration"]),
                ],
            ),
            (
                "ou=services,ou=configuration,ou=system",
                &[
                    ("objectClass", &["top", "organizationalUnit"]),
                    ("ou", &["services"]),
                ],
            ),
            (
                "ou=interceptors,ou=configuration,ou=system",
                &[
                    ("objectClass", &["top", "organizationalUnit"]),
                    ("ou", &["interceptors"]),
                ],
            ),
        ];

        let registries = self.schema.current();
        for (dn, attrs) in seed {
            let dn = Dn::parse(dn)?.normalize(&registries)?;
            if self.nexus.has_entry(&dn) {
                continue;
            }
            let entry = Entry::with_attrs(&registries, dn, attrs)?;
            let mut ctx = AddContext {
                state: OpState::internal(Arc::clone(&self.admin_session)),
                entry,
            };
            self.chain.add(&mut ctx)?;
        }

        // Context entries for extra partitions, from their suffix RDNs.
        for spec in &self.config.partitions {
            let dn = Dn::parse(&spec.suffix)?.normalize(&registries)?;
            if self.nexus.has_entry(&dn) {
                continue;
            }
            let mut entry = Entry::new(dn);
            entry.add_str(&registries, "objectClass", "top")?;
            entry.add_str(&registries, "objectClass", "extensibleObject")?;
            entry.inject_rdn_attributes(&registries)?;
            let mut ctx = AddContext {
                state: OpState::internal(Arc::clone(&self.admin_session)),
                entry,
            };
            self.chain.add(&mut ctx)?;
        }

        let group_dn = self.roster.group_dn().clone();
        if let Ok(partition) = self.nexus.find_partition(&group_dn)
            && let Some(group) = partition.lookup(&group_dn)
        {
            self.roster.refresh(&group);
        }

        // Re-seed the subentry cache from stored state.
        for partition in self.nexus.partitions() {
            let snapshot = partition.snapshot();
            let mut scan = snapshot.master.scan();
            while scan.next()? {
                let (_, entry) = scan.get()?;
                if entry.is_object_class(&registries, "subentry") {
                    self.subentries.insert(&registries, &entry)?;
                }
            }
        }

        Ok(())
    }

    pub fn schema(&self) -> Arc<Registries> {
        self.schema.current()
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// A session running as the administrative principal.
    pub fn admin_session(&self) -> Arc<Session> {
        Arc::clone(&self.admin_session)
    }

    pub fn anonymous_session(&self) -> Arc<Session> {
        Session::anonymous()
    }

    /// Simple bind: resolves credentials to an authenticated session.
    pub fn bind(&self, dn: &str, password: &[u8]) -> OpResult<Arc<Session>> {
        let mut ctx = BindContext {
            state: OpState::new(Session::anonymous()),
            dn: Dn::parse(dn)?,
            credentials: password.to_vec(),
            principal: None,
        };
        self.chain.bind(&mut ctx)?;
        let principal = ctx.principal.ok_or_else(|| {
            OperationError::internal("bind succeeded without resolving a principal")
        })?;
        Ok(Session::new(principal))
    }

    pub fn add(
        &self,
        session: &Arc<Session>,
        dn: &str,
        attrs: &[(&str, &[&str])],
    ) -> OpResult<()> {
        let registries = self.schema.current();
        let entry = Entry::with_attrs(&registries, Dn::parse(dn)?, attrs)?;
        self.add_entry(session, entry)
    }

    pub fn add_entry(&self, session: &Arc<Session>, entry: Entry) -> OpResult<()> {
        let mut ctx = AddContext {
            state: OpState::new(Arc::clone(session)),
            entry,
        };
        self.chain.add(&mut ctx)
    }

    pub fn delete(&self, session: &Arc<Session>, dn: &str) -> OpResult<()> {
        let mut ctx = DeleteContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
        };
        self.chain.delete(&mut ctx)
    }

    pub fn modify(
        &self,
        session: &Arc<Session>,
        dn: &str,
        mods: Vec<Modification>,
    ) -> OpResult<()> {
        let mut ctx = ModifyContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
            mods,
        };
        self.chain.modify(&mut ctx)
    }

    /// Rename in place, keeping the parent.
    pub fn rename(
        &self,
        session: &Arc<Session>,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
    ) -> OpResult<()> {
        let mut ctx = MoveContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
            new_parent: None,
            new_rdn: Some(Rdn::parse(new_rdn)?),
            delete_old_rdn,
        };
        self.chain.move_and_rename(&mut ctx)
    }

    /// Move under a new superior, keeping the RDN.
    pub fn move_entry(&self, session: &Arc<Session>, dn: &str, new_parent: &str) -> OpResult<()> {
        let mut ctx = MoveContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
            new_parent: Some(Dn::parse(new_parent)?),
            new_rdn: None,
            delete_old_rdn: false,
        };
        self.chain.move_and_rename(&mut ctx)
    }

    pub fn move_and_rename(
        &self,
        session: &Arc<Session>,
        dn: &str,
        new_parent: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
    ) -> OpResult<()> {
        let mut ctx = MoveContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
            new_parent: Some(Dn::parse(new_parent)?),
            new_rdn: Some(Rdn::parse(new_rdn)?),
            delete_old_rdn,
        };
        self.chain.move_and_rename(&mut ctx)
    }

    pub fn lookup(
        &self,
        session: &Arc<Session>,
        dn: &str,
        attrs: Option<&[&str]>,
    ) -> OpResult<Entry> {
        let mut ctx = LookupContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
            attrs: attrs.map(|list| list.iter().map(|a| SmolStr::from(*a)).collect()),
        };
        self.chain.lookup(&mut ctx)
    }

    /// One-level listing of the children of `dn`.
    pub fn list(&self, session: &Arc<Session>, dn: &str) -> OpResult<EntryFilteringCursor> {
        let mut ctx = ListContext {
            state: OpState::new(Arc::clone(session)),
            dn: Dn::parse(dn)?,
        };
        self.chain.list(&mut ctx)
    }

    pub fn search(
        &self,
        session: &Arc<Session>,
        request: SearchRequest,
    ) -> OpResult<EntryFilteringCursor> {
        let filter = warren_lib_core::filter::parser::parse_filter(&request.filter)?;
        let mut state = OpState::new(Arc::clone(session));
        state.request_controls = request.controls;
        let mut ctx = SearchContext {
            state,
            base: Dn::parse(&request.base)?,
            scope: request.scope,
            filter: Some(filter),
            attrs: request
                .attrs
                .map(|list| list.into_iter().map(SmolStr::from).collect()),
            size_limit: request.size_limit,
            time_limit_seconds: request.time_limit_seconds,
        };
        self.chain.search(&mut ctx)
    }

    /// LDAP compare: whether the entry holds that value under that
    /// attribute, matched under its equality rule.
    pub fn compare(
        &self,
        session: &Arc<Session>,
        dn: &str,
        attr: &str,
        value: &str,
    ) -> OpResult<bool> {
        let registries = self.schema.current();
        let attr_type = registries.attribute_type(attr)?;
        let value = registries.normalize_value(&attr_type, ValueData::from(value))?;
        let entry = self.lookup(session, dn, Some(&[attr]))?;
        Ok(entry.contains(&attr_type.oid, &value))
    }

    pub fn has_entry(&self, dn: &str) -> OpResult<bool> {
        let dn = Dn::parse(dn)?.normalize(&self.schema.current())?;
        Ok(self.nexus.has_entry(&dn))
    }

    /// Feeds LDIF content records through the add pipeline; returns how
    /// many entries landed.
    pub fn load_ldif(&self, session: &Arc<Session>, content: &str) -> OpResult<usize> {
        let registries = self.schema.current();
        let mut loaded = 0usize;
        for record in ldif::parse(content)? {
            let mut entry = Entry::new(Dn::parse(&record.dn)?);
            for (attr, value) in record.attrs {
                entry.add_value(&registries, &attr, value)?;
            }
            self.add_entry(session, entry)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Dumps every partition's live state as LDIF, partitions in mount
    /// order, entries in id order.
    pub fn dump_ldif(&self) -> String {
        let mut out = String::new();
        for partition in self.nexus.partitions() {
            let snapshot = partition.snapshot();
            let mut scan = snapshot.master.scan();
            while let Ok(true) = scan.next() {
                if let Ok((_, entry)) = scan.get() {
                    out.push_str(&ldif::to_ldif(&entry));
                    out.push('\n');
                }
            }
        }
        out
    }
}
