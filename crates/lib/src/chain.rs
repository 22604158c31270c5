use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use warren_lib_core::entry::Entry;
use warren_lib_core::errors::OpResult;
use warren_lib_core::schema::Registries;

use crate::context::{
    AddContext, BindContext, DeleteContext, ListContext, LookupContext, ModifyContext,
    MoveContext, SearchContext,
};
use crate::nexus::PartitionNexus;
use crate::search::EntryFilteringCursor;

/// The process-wide schema handle. Reads are cheap Arc clones; a schema
/// modification rebuilds the registries and swaps them in atomically, which
/// is the whole reader/writer discipline.
#[derive(Debug, Clone)]
pub struct SchemaRef {
    inner: Arc<RwLock<Arc<Registries>>>,
}

impl SchemaRef {
    pub fn new(registries: Registries) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registries))),
        }
    }

    pub fn current(&self) -> Arc<Registries> {
        Arc::clone(&self.inner.read())
    }

    pub fn swap(&self, registries: Registries) {
        *self.inner.write() = Arc::new(registries);
    }
}

/// A cross-cutting handler in the operation pipeline. Every method sees the
/// context and a handle to the remainder of the chain; the default is to
/// delegate untouched. Implementations either mutate the context, call
/// through, or short-circuit with a typed error.
pub trait Interceptor: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn add(&self, next: Next<'_>, ctx: &mut AddContext) -> OpResult<()> {
        next.add(ctx)
    }

    fn delete(&self, next: Next<'_>, ctx: &mut DeleteContext) -> OpResult<()> {
        next.delete(ctx)
    }

    fn modify(&self, next: Next<'_>, ctx: &mut ModifyContext) -> OpResult<()> {
        next.modify(ctx)
    }

    fn move_and_rename(&self, next: Next<'_>, ctx: &mut MoveContext) -> OpResult<()> {
        next.move_and_rename(ctx)
    }

    fn lookup(&self, next: Next<'_>, ctx: &mut LookupContext) -> OpResult<Entry> {
        next.lookup(ctx)
    }

    fn list(&self, next: Next<'_>, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        next.list(ctx)
    }

    fn search(&self, next: Next<'_>, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        next.search(ctx)
    }

    fn bind(&self, next: Next<'_>, ctx: &mut BindContext) -> OpResult<()> {
        next.bind(ctx)
    }
}

#[derive(Debug, Clone)]
pub struct ErasedInterceptor {
    erased: Arc<dyn Interceptor>,
}

impl Deref for ErasedInterceptor {
    type Target = dyn Interceptor;

    fn deref(&self) -> &Self::Target {
        self.erased.as_ref()
    }
}

pub trait Erased {
    type Erased;

    fn erased(self) -> Self::Erased;
}

impl<T: Interceptor + 'static> Erased for T {
    type Erased = ErasedInterceptor;

    fn erased(self) -> Self::Erased {
        ErasedInterceptor {
            erased: Arc::new(self),
        }
    }
}

/// The handle an interceptor calls to hand the operation to whatever is
/// left of the chain; the nexus is the tail.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [ErasedInterceptor],
    nexus: &'a PartitionNexus,
}

macro_rules! dispatch {
    ($name:ident, $ctx:ty, $out:ty) => {
        pub fn $name(self, ctx: &mut $ctx) -> OpResult<$out> {
            match self.interceptors.split_first() {
                Some((head, tail)) => head.$name(
                    Next {
                        interceptors: tail,
                        nexus: self.nexus,
                    },
                    ctx,
                ),
                None => self.nexus.$name(ctx),
            }
        }
    };
}

impl<'a> Next<'a> {
    dispatch!(add, AddContext, ());
    dispatch!(delete, DeleteContext, ());
    dispatch!(modify, ModifyContext, ());
    dispatch!(move_and_rename, MoveContext, ());
    dispatch!(lookup, LookupContext, Entry);
    dispatch!(list, ListContext, EntryFilteringCursor);
    dispatch!(search, SearchContext, EntryFilteringCursor);
    dispatch!(bind, BindContext, ());
}

/// The statically composed pipeline. Immutable after startup; ordering is
/// fixed by the service and matters.
#[derive(Debug)]
pub struct InterceptorChain {
    interceptors: Vec<ErasedInterceptor>,
    nexus: Arc<PartitionNexus>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<ErasedInterceptor>, nexus: Arc<PartitionNexus>) -> Self {
        log::debug!(
            "interceptor chain: {}",
            interceptors
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Self {
            interceptors,
            nexus,
        }
    }

    fn head(&self) -> Next<'_> {
        Next {
            interceptors: &self.interceptors,
            nexus: &self.nexus,
        }
    }

    pub fn add(&self, ctx: &mut AddContext) -> OpResult<()> {
        self.head().add(ctx)
    }

    pub fn delete(&self, ctx: &mut DeleteContext) -> OpResult<()> {
        self.head().delete(ctx)
    }

    pub fn modify(&self, ctx: &mut ModifyContext) -> OpResult<()> {
        self.head().modify(ctx)
    }

    pub fn move_and_rename(&self, ctx: &mut MoveContext) -> OpResult<()> {
        self.head().move_and_rename(ctx)
    }

    pub fn lookup(&self, ctx: &mut LookupContext) -> OpResult<Entry> {
        self.head().lookup(ctx)
    }

    pub fn list(&self, ctx: &mut ListContext) -> OpResult<EntryFilteringCursor> {
        self.head().list(ctx)
    }

    pub fn search(&self, ctx: &mut SearchContext) -> OpResult<EntryFilteringCursor> {
        self.head().search(ctx)
    }

    pub fn bind(&self, ctx: &mut BindContext) -> OpResult<()> {
        self.head().bind(ctx)
    }
}
