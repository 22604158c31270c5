//! The entry-filtering cursor: the stream a search hands back up the chain.
//! Interceptors attach acceptance predicates on the way out; the cursor
//! resuscitates candidates, runs the predicates in attachment order, and
//! enforces limits and abandon along the way.

use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use warren_lib_core::entry::Entry;
use warren_lib_core::errors::{LdapErrorKind, OpResult, OperationError};
use warren_lib_core::name::Dn;
use warren_lib_core::schema::Registries;
use warren_lib_core::store::Cursor;
use warren_lib_core::store::cursor::{closed_error, unpositioned_error};

use crate::context::{ReturnSpec, SearchScope, Session};
use crate::search::cursors::CandidateCursor;
use crate::search::SearchEnv;

/// The per-search state entry filters consult: who is asking, what they
/// asked for, and the limits in force.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub schema: Arc<Registries>,
    pub session: Arc<Session>,
    pub base: Dn,
    pub scope: SearchScope,
    pub return_spec: ReturnSpec,
    pub size_limit: Option<usize>,
    pub time_limit_ms: Option<u64>,
    pub abandoned: Arc<AtomicBool>,
    pub subentries_visible: bool,
    pub denormalize: bool,
}

/// An acceptance predicate attached by an interceptor. It may veto the
/// entry or rework it in place (strip attributes, merge inherited values);
/// it must be idempotent and free of side effects.
pub trait EntryFilter: Debug + Send + Sync {
    fn accept(&self, params: &SearchParams, entry: &mut Entry) -> OpResult<bool>;
}

#[derive(Debug, Clone)]
pub struct ErasedEntryFilter {
    erased: Arc<dyn EntryFilter>,
}

impl ErasedEntryFilter {
    pub fn new(filter: impl EntryFilter + 'static) -> Self {
        Self {
            erased: Arc::new(filter),
        }
    }
}

impl Deref for ErasedEntryFilter {
    type Target = dyn EntryFilter;

    fn deref(&self) -> &Self::Target {
        self.erased.as_ref()
    }
}

/// What feeds the filtering cursor: a live candidate stream, a fixed list
/// (the synthesized root DSE), or nothing at all.
#[derive(Debug)]
enum Feed {
    Candidates {
        cursor: CandidateCursor,
        env: Arc<SearchEnv>,
    },
    Fixed {
        entries: Vec<Entry>,
        /// Index of the entry `get` returns, one past when exhausted.
        pos: Option<usize>,
    },
    Empty,
}

/// The search result stream. Pulls candidates, applies every attached
/// filter in order, and polls the abandon flag between records. Not
/// thread-safe; one owner at a time, like every cursor.
#[derive(Debug)]
pub struct EntryFilteringCursor {
    feed: Feed,
    params: SearchParams,
    filters: Vec<ErasedEntryFilter>,
    current: Option<Entry>,
    returned: usize,
    started: Instant,
    /// Error to surface instead of a clean end when nothing was emitted:
    /// how an absent search base is told apart from an empty result.
    empty_error: Option<OperationError>,
    closed: bool,
}

impl EntryFilteringCursor {
    pub fn new(env: Arc<SearchEnv>, cursor: CandidateCursor, params: SearchParams) -> Self {
        Self {
            feed: Feed::Candidates { cursor, env },
            params,
            filters: Vec::new(),
            current: None,
            returned: 0,
            started: Instant::now(),
            empty_error: None,
            closed: false,
        }
    }

    /// A stream over entries synthesized outside any partition.
    pub fn fixed(entries: Vec<Entry>, params: SearchParams) -> Self {
        Self {
            feed: Feed::Fixed { entries, pos: None },
            params,
            filters: Vec::new(),
            current: None,
            returned: 0,
            started: Instant::now(),
            empty_error: None,
            closed: false,
        }
    }

    pub fn empty(params: SearchParams) -> Self {
        Self {
            feed: Feed::Empty,
            params,
            filters: Vec::new(),
            current: None,
            returned: 0,
            started: Instant::now(),
            empty_error: None,
            closed: false,
        }
    }

    /// Arms the absent-base distinction: raised at exhaustion if the cursor
    /// never produced anything.
    pub fn with_empty_error(mut self, error: OperationError) -> Self {
        self.empty_error = Some(error);
        self
    }

    /// Interceptors call this on the way back up the chain; filters run in
    /// the order they were attached.
    pub fn add_entry_filter(&mut self, filter: ErasedEntryFilter) {
        self.filters.push(filter);
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    fn pull_candidate(&mut self) -> OpResult<Option<Entry>> {
        match &mut self.feed {
            Feed::Empty => Ok(None),
            Feed::Fixed { entries, pos } => {
                let next = pos.map_or(0, |p| p + 1);
                *pos = Some(next);
                Ok(entries.get(next).cloned())
            }
            Feed::Candidates { cursor, env } => {
                if !cursor.next()? {
                    return Ok(None);
                }
                let mut candidate = cursor.get()?;
                let entry = candidate.entry(env)?.clone();
                Ok(Some(entry))
            }
        }
    }

    fn limits(&self) -> OpResult<()> {
        if let Some(limit) = self.params.time_limit_ms
            && self.started.elapsed().as_millis() as u64 > limit
        {
            return Err(OperationError::new(
                LdapErrorKind::TimeLimitExceeded,
                format!("search exceeded its {limit} ms budget"),
            ));
        }
        Ok(())
    }
}

impl Cursor for EntryFilteringCursor {
    type Item = Entry;

    fn before_first(&mut self) -> OpResult<()> {
        Err(OperationError::unwilling(
            "search result streams replay forward only",
        ))
    }

    fn after_last(&mut self) -> OpResult<()> {
        Err(OperationError::unwilling(
            "search result streams replay forward only",
        ))
    }

    fn next(&mut self) -> OpResult<bool> {
        if self.closed {
            return Err(closed_error());
        }
        // Abandon closes quietly: end-of-stream, no response at all.
        if self.params.abandoned.load(Ordering::Relaxed) {
            self.close();
            return Ok(false);
        }

        'candidates: loop {
            self.limits()?;

            let Some(mut entry) = self.pull_candidate()? else {
                self.current = None;
                if self.returned == 0
                    && let Some(error) = self.empty_error.take()
                {
                    return Err(error);
                }
                return Ok(false);
            };

            for filter in &self.filters {
                if !filter.accept(&self.params, &mut entry)? {
                    continue 'candidates;
                }
            }

            if let Some(limit) = self.params.size_limit
                && self.returned >= limit
            {
                return Err(OperationError::new(
                    LdapErrorKind::SizeLimitExceeded,
                    format!("search exceeded its size limit of {limit}"),
                ));
            }

            self.returned += 1;
            self.current = Some(entry);
            return Ok(true);
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        Err(OperationError::unwilling(
            "search result streams replay forward only",
        ))
    }

    fn get(&self) -> OpResult<Entry> {
        if self.closed {
            return Err(closed_error());
        }
        self.current.clone().ok_or_else(unpositioned_error)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Feed::Candidates { cursor, .. } = &mut self.feed {
            cursor.close();
        }
        self.current = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Drains a cursor into a vector, closing it afterwards. Test and embedder
/// convenience; production consumers pull entry by entry.
pub fn drain(mut cursor: EntryFilteringCursor) -> OpResult<Vec<Entry>> {
    let mut out = Vec::new();
    loop {
        match cursor.next() {
            Ok(true) => out.push(cursor.get()?),
            Ok(false) => break,
            Err(err) => {
                cursor.close();
                return Err(err);
            }
        }
    }
    cursor.close();
    Ok(out)
}
