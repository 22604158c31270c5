use std::sync::Arc;

use smol_str::SmolStr;
use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::filter::Filter;
use warren_lib_core::name::Dn;
use warren_lib_core::schema::system::oids;

use crate::chain::SchemaRef;
use crate::context::{
    AddContext, BindContext, DeleteContext, ListContext, LookupContext, ModifyContext,
    MoveContext, ReturnSpec, SearchContext, SearchScope, control_oids,
};
use crate::partition::ErasedPartition;
use crate::search::evaluator::matches_entry;
use crate::search::filtering::SearchParams;
use crate::search::{EntryFilteringCursor, SearchEnv, planner};

/// The DN-routing tree at the top of the partition layer. Maps every target
/// DN to the partition owning the longest matching suffix, synthesizes the
/// root DSE and the subschema subentry, and is the tail every operation
/// chain ends in.
#[derive(Debug)]
pub struct PartitionNexus {
    schema: SchemaRef,
    partitions: Vec<ErasedPartition>,
    tree: SuffixTree,
    subschema_dn: Dn,
    denormalize: bool,
}

impl PartitionNexus {
    pub fn new(schema: SchemaRef, denormalize: bool) -> OpResult<Self> {
        let registries = schema.current();
        let subschema_dn = Dn::parse("cn=schema")?.normalize(&registries)?;
        Ok(Self {
            schema,
            partitions: Vec::new(),
            tree: SuffixTree::new(),
            subschema_dn,
            denormalize,
        })
    }

    /// Mounts a partition. Startup-time only; the routing tree is immutable
    /// once operations flow.
    pub fn add_partition(&mut self, partition: ErasedPartition) -> OpResult<()> {
        let suffix = partition.suffix().clone();
        if suffix.is_root_dse() {
            return Err(OperationError::unwilling(
                "a partition cannot claim the root DSE",
            ));
        }
        self.tree.insert(&suffix, self.partitions.len())?;
        log::debug!("mounted partition {} at {suffix}", partition.id());
        self.partitions.push(partition);
        Ok(())
    }

    pub fn partitions(&self) -> &[ErasedPartition] {
        &self.partitions
    }

    pub fn subschema_dn(&self) -> &Dn {
        &self.subschema_dn
    }

    /// The partition owning the longest suffix of `dn`.
    pub fn find_partition(&self, dn: &Dn) -> OpResult<&ErasedPartition> {
        self.tree
            .find(dn)
            .map(|idx| &self.partitions[idx])
            .ok_or_else(|| {
                OperationError::new(
                    LdapErrorKind::NoSuchObject,
                    format!("no partition owns a suffix of {dn}"),
                )
                .with_matched_dn(Dn::root_dse())
            })
    }

    pub fn has_entry(&self, dn: &Dn) -> bool {
        if dn.is_root_dse() || dn == &self.subschema_dn {
            return true;
        }
        match self.tree.find(dn) {
            Some(idx) => self.partitions[idx].has_entry(dn),
            None => false,
        }
    }

    /// The longest prefix of `dn` that names an existing entry; what error
    /// responses carry as the matched DN.
    pub fn resolved_prefix(&self, dn: &Dn) -> Dn {
        let mut current = dn.clone();
        while !current.is_root_dse() {
            if self.has_entry(&current) {
                return current;
            }
            current = current.parent();
        }
        current
    }

    /// The synthesized root DSE.
    pub fn root_dse(&self) -> OpResult<Entry> {
        let schema = self.schema.current();
        let mut entry = Entry::new(Dn::root_dse());
        entry.add_str(&schema, "objectClass", "top")?;
        entry.add_str(&schema, "objectClass", "extensibleObject")?;
        entry.add_str(&schema, "subschemaSubentry", "cn=schema")?;
        entry.add_str(&schema, "vendorName", "Warren Directory Project")?;
        entry.add_str(&schema, "vendorVersion", env!("CARGO_PKG_VERSION"))?;
        for partition in &self.partitions {
            entry.add_str(&schema, "namingContexts", partition.suffix().user())?;
        }
        for control in [
            control_oids::SUBENTRIES,
            control_oids::MANAGE_DSA_IT,
            control_oids::PERSISTENT_SEARCH,
            control_oids::PASSWORD_POLICY,
        ] {
            entry.add_str(&schema, "supportedControl", control)?;
        }
        Ok(entry)
    }

    fn subschema_entry(&self) -> OpResult<Entry> {
        let schema = self.schema.current();
        let mut entry = Entry::new(self.subschema_dn.clone());
        entry.add_str(&schema, "objectClass", "top")?;
        entry.add_str(&schema, "objectClass", "subschema")?;
        entry.add_str(&schema, "objectClass", "extensibleObject")?;
        entry.add_str(&schema, "cn", "schema")?;
        Ok(entry)
    }

    fn search_params(&self, ctx: &SearchContext) -> SearchParams {
        let schema = self.schema.current();
        let return_spec = ReturnSpec::from_request(&schema, ctx.attrs.as_deref());
        SearchParams {
            schema,
            session: Arc::clone(&ctx.state.session),
            base: ctx.base.clone(),
            scope: ctx.scope,
            return_spec,
            size_limit: ctx.size_limit,
            time_limit_ms: ctx.time_limit_ms(),
            abandoned: ctx.state.abandon_handle(),
            subentries_visible: ctx.state.has_control(control_oids::SUBENTRIES),
            denormalize: self.denormalize,
        }
    }

    // ------------------------------------------------------------------
    // Chain-tail operations.

    pub fn add(&self, ctx: &mut AddContext) -> OpResult<()> {
        let schema = self.schema.current();
        let partition = self.find_partition(ctx.entry.dn())?;
        partition.add(&schema, ctx.entry.clone())?;
        Ok(())
    }

    pub fn delete(&self, ctx: &mut DeleteContext) -> OpResult<()> {
        let schema = self.schema.current();
        let partition = self.find_partition(&ctx.dn)?;
        partition.delete(&schema, &ctx.dn)
    }

    pub fn modify(&self, ctx: &mut ModifyContext) -> OpResult<()> {
        let schema = self.schema.current();
        let partition = self.find_partition(&ctx.dn)?;
        let updated = partition.modify(&schema, &ctx.dn, &ctx.mods)?;
        ctx.state.cached_entry = Some(updated);
        Ok(())
    }

    pub fn move_and_rename(&self, ctx: &mut MoveContext) -> OpResult<()> {
        let schema = self.schema.current();
        let new_dn = ctx.new_dn()?;
        let source = self.find_partition(&ctx.dn)?;
        let target = self.find_partition(&new_dn)?;
        if source.id() != target.id() {
            return Err(OperationError::unwilling(format!(
                "cannot move {} across partitions into {}",
                ctx.dn, new_dn
            )));
        }
        source.move_and_rename(&schema, &ctx.dn, &new_dn, ctx.delete_old_rdn)
    }

    pub fn lookup(&self, ctx: &mut LookupContext) -> OpResult<Entry> {
        if ctx.dn.is_root_dse() {
            return self.root_dse();
        }
        if ctx.dn == self.subschema_dn {
            return self.subschema_entry();
        }
        let partition = self.find_partition(&ctx.dn)?;
        partition
            .lookup(&ctx.dn)
            .ok_or_else(|| OperationError::no_such_object(&ctx.dn, self.resolved_prefix(&ctx.dn)))
    }

    pub fn list(&self, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        let mut search = SearchContext {
            state: ctx.state.clone(),
            base: ctx.dn.clone(),
            scope: SearchScope::OneLevel,
            filter: Some(Filter::Present {
                attr: SmolStr::from(oids::OBJECT_CLASS),
            }),
            attrs: None,
            size_limit: None,
            time_limit_seconds: None,
        };
        self.search(&mut search)
    }

    pub fn search(&self, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        let params = self.search_params(ctx);
        let schema = self.schema.current();

        let Some(filter) = ctx.filter.clone() else {
            return Ok(EntryFilteringCursor::empty(params));
        };

        // The root DSE and the subschema subentry live outside every
        // partition and only answer base-object searches.
        if ctx.base.is_root_dse() || ctx.base == self.subschema_dn {
            if ctx.scope != SearchScope::Object {
                return Err(OperationError::unwilling(
                    "only base-object searches are supported at a synthesized entry",
                ));
            }
            let entry = if ctx.base.is_root_dse() {
                self.root_dse()?
            } else {
                self.subschema_entry()?
            };
            let matched = matches_entry(&schema, &filter, &entry);
            return Ok(EntryFilteringCursor::fixed(
                if matched { vec![entry] } else { Vec::new() },
                params,
            ));
        }

        let partition = self.find_partition(&ctx.base)?;
        let env = Arc::new(SearchEnv {
            snapshot: partition.snapshot(),
            schema,
        });

        let Some(base_id) = env.snapshot.entry_id(&ctx.base) else {
            // An absent base only surfaces once the stream proves empty,
            // which keeps the empty-result and absent-base cases apart.
            let error =
                OperationError::no_such_object(&ctx.base, self.resolved_prefix(&ctx.base));
            return Ok(EntryFilteringCursor::empty(params).with_empty_error(error));
        };

        let base_is_suffix = &ctx.base == partition.suffix();
        let cursor = planner::build(&env, base_id, base_is_suffix, ctx.scope, &filter)?;
        Ok(EntryFilteringCursor::new(env, cursor, params))
    }

    pub fn bind(&self, _ctx: &mut BindContext) -> OpResult<()> {
        Err(OperationError::new(
            LdapErrorKind::OperationsError,
            "bind fell through the chain with no authenticator in place",
        ))
    }
}

/// The arena-allocated DN-prefix tree: nodes own their children by index,
/// no back edges. Node 0 is the synthetic root.
#[derive(Debug)]
struct SuffixTree {
    nodes: Vec<TreeNode>,
}

#[derive(Debug)]
struct TreeNode {
    rdn: SmolStr,
    children: Vec<usize>,
    partition: Option<usize>,
}

impl SuffixTree {
    fn new() -> Self {
        Self {
            nodes: vec![TreeNode {
                rdn: SmolStr::default(),
                children: Vec::new(),
                partition: None,
            }],
        }
    }

    fn insert(&mut self, suffix: &Dn, partition: usize) -> OpResult<()> {
        let mut current = 0usize;
        for rdn in suffix.rdns().iter().rev() {
            let norm = SmolStr::from(rdn.norm());
            let found = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].rdn == norm);
            current = match found {
                Some(child) => child,
                None => {
                    let idx = self.nodes.len();
                    self.nodes.push(TreeNode {
                        rdn: norm,
                        children: Vec::new(),
                        partition: None,
                    });
                    self.nodes[current].children.push(idx);
                    idx
                }
            };
        }
        if self.nodes[current].partition.is_some() {
            return Err(OperationError::unwilling(format!(
                "a partition is already mounted at {suffix}"
            )));
        }
        self.nodes[current].partition = Some(partition);
        Ok(())
    }

    /// The partition of the deepest matching suffix node, if any.
    fn find(&self, dn: &Dn) -> Option<usize> {
        let mut current = 0usize;
        let mut best = self.nodes[0].partition;
        for rdn in dn.rdns().iter().rev() {
            let found = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.nodes[child].rdn.as_str() == rdn.norm());
            match found {
                Some(child) => {
                    current = child;
                    if let Some(partition) = self.nodes[child].partition {
                        best = Some(partition);
                    }
                }
                None => break,
            }
        }
        best
    }
}
