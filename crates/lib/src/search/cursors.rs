//! Candidate cursors: the streams the planner composes. Simple walks ride
//! directly on a table cursor bounded to their key range; composed streams
//! (index walks that can repeat an id, unions, predicate wraps) pull
//! forward-only from a source and keep the emitted history so the cursor
//! protocol's backward half stays honest.

use std::fmt::Debug;
use std::sync::Arc;

use fancy_regex::Regex;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use warren_lib_core::errors::{OpResult, OperationError};
use warren_lib_core::ident::EntryId;
use warren_lib_core::store::cursor::{Cursor, TableCursor, closed_error, unpositioned_error};
use warren_lib_core::value::NormValue;

use crate::partition::ParentIdAndRdn;
use crate::partition::master::MasterCursor;
use crate::search::evaluator::{Evaluate, Evaluator};
use crate::search::{Candidate, SearchEnv};

/// The closed set of cursor shapes a search plan is built from.
#[derive(Debug)]
pub enum CandidateCursor {
    Base(BaseCursor),
    Presence(PresenceCursor),
    OneLevel(OneLevelCursor),
    Subtree(SubtreeCursor),
    All(AllEntriesCursor),
    KeyWalk(Replayed<KeyWalkSource>),
    Union(Replayed<UnionSource>),
    Predicate(Replayed<PredicateSource>),
}

macro_rules! delegate {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            CandidateCursor::Base(c) => c.$method($($arg),*),
            CandidateCursor::Presence(c) => c.$method($($arg),*),
            CandidateCursor::OneLevel(c) => c.$method($($arg),*),
            CandidateCursor::Subtree(c) => c.$method($($arg),*),
            CandidateCursor::All(c) => c.$method($($arg),*),
            CandidateCursor::KeyWalk(c) => c.$method($($arg),*),
            CandidateCursor::Union(c) => c.$method($($arg),*),
            CandidateCursor::Predicate(c) => c.$method($($arg),*),
        }
    };
}

impl Cursor for CandidateCursor {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        delegate!(self, before_first)
    }

    fn after_last(&mut self) -> OpResult<()> {
        delegate!(self, after_last)
    }

    fn next(&mut self) -> OpResult<bool> {
        delegate!(self, next)
    }

    fn previous(&mut self) -> OpResult<bool> {
        delegate!(self, previous)
    }

    fn get(&self) -> OpResult<Candidate> {
        delegate!(self, get)
    }

    fn close(&mut self) {
        delegate!(self, close)
    }

    fn is_closed(&self) -> bool {
        delegate!(self, is_closed)
    }
}

/// The single-candidate stream a base-object search runs on.
#[derive(Debug)]
pub struct BaseCursor {
    id: EntryId,
    pos: BasePos,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BasePos {
    Before,
    On,
    After,
    Closed,
}

impl BaseCursor {
    pub fn new(id: EntryId) -> Self {
        Self {
            id,
            pos: BasePos::Before,
        }
    }
}

impl Cursor for BaseCursor {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        if self.pos == BasePos::Closed {
            return Err(closed_error());
        }
        self.pos = BasePos::Before;
        Ok(())
    }

    fn after_last(&mut self) -> OpResult<()> {
        if self.pos == BasePos::Closed {
            return Err(closed_error());
        }
        self.pos = BasePos::After;
        Ok(())
    }

    fn next(&mut self) -> OpResult<bool> {
        match self.pos {
            BasePos::Closed => Err(closed_error()),
            BasePos::Before => {
                self.pos = BasePos::On;
                Ok(true)
            }
            _ => {
                self.pos = BasePos::After;
                Ok(false)
            }
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        match self.pos {
            BasePos::Closed => Err(closed_error()),
            BasePos::After => {
                self.pos = BasePos::On;
                Ok(true)
            }
            _ => {
                self.pos = BasePos::Before;
                Ok(false)
            }
        }
    }

    fn get(&self) -> OpResult<Candidate> {
        match self.pos {
            BasePos::Closed => Err(closed_error()),
            BasePos::On => Ok(Candidate::new(self.id)),
            _ => Err(unpositioned_error()),
        }
    }

    fn close(&mut self) {
        self.pos = BasePos::Closed;
    }

    fn is_closed(&self) -> bool {
        self.pos == BasePos::Closed
    }
}

/// Walks the presence index for one attribute OID.
#[derive(Debug)]
pub struct PresenceCursor {
    cursor: TableCursor<SmolStr, EntryId>,
    attr: SmolStr,
}

impl PresenceCursor {
    pub fn new(env: &SearchEnv, attr: SmolStr) -> OpResult<Self> {
        let mut cursor = env.snapshot.presence.cursor();
        cursor.before(attr.clone())?;
        Ok(Self { cursor, attr })
    }
}

impl Cursor for PresenceCursor {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        self.cursor.before(self.attr.clone())
    }

    fn after_last(&mut self) -> OpResult<()> {
        self.cursor.after(self.attr.clone())
    }

    fn next(&mut self) -> OpResult<bool> {
        if !self.cursor.next()? {
            return Ok(false);
        }
        let (key, _) = self.cursor.get()?;
        if key == self.attr {
            Ok(true)
        } else {
            // Ran off the end of our range; park just past it.
            self.cursor.after(self.attr.clone())?;
            Ok(false)
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        if !self.cursor.previous()? {
            return Ok(false);
        }
        let (key, _) = self.cursor.get()?;
        if key == self.attr {
            Ok(true)
        } else {
            self.cursor.before(self.attr.clone())?;
            Ok(false)
        }
    }

    fn get(&self) -> OpResult<Candidate> {
        let (_, id) = self.cursor.get()?;
        Ok(Candidate::new(id))
    }

    fn close(&mut self) {
        self.cursor.close();
    }

    fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

/// Direct children of one parent id, off the RDN index.
#[derive(Debug)]
pub struct OneLevelCursor {
    cursor: TableCursor<ParentIdAndRdn, EntryId>,
    parent: EntryId,
}

impl OneLevelCursor {
    pub fn new(env: &SearchEnv, parent: EntryId) -> OpResult<Self> {
        let mut cursor = env.snapshot.rdn_fwd.cursor();
        cursor.before(ParentIdAndRdn::first_of(parent))?;
        Ok(Self { cursor, parent })
    }
}

impl Cursor for OneLevelCursor {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        self.cursor.before(ParentIdAndRdn::first_of(self.parent))
    }

    fn after_last(&mut self) -> OpResult<()> {
        // There is no closed-form "just past this parent" key, so walk off
        // the end of the range.
        self.before_first()?;
        while self.next()? {}
        Ok(())
    }

    fn next(&mut self) -> OpResult<bool> {
        if !self.cursor.next()? {
            return Ok(false);
        }
        let (key, _) = self.cursor.get()?;
        Ok(key.parent == self.parent)
    }

    fn previous(&mut self) -> OpResult<bool> {
        if !self.cursor.previous()? {
            return Ok(false);
        }
        let (key, _) = self.cursor.get()?;
        if key.parent == self.parent {
            Ok(true)
        } else {
            self.cursor.before(ParentIdAndRdn::first_of(self.parent))?;
            Ok(false)
        }
    }

    fn get(&self) -> OpResult<Candidate> {
        let (key, id) = self.cursor.get()?;
        if key.parent == self.parent {
            Ok(Candidate::new(id))
        } else {
            Err(unpositioned_error())
        }
    }

    fn close(&mut self) {
        self.cursor.close();
    }

    fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

/// The descendant region of one base id, off the sublevel index. The base
/// itself is part of the region.
#[derive(Debug)]
pub struct SubtreeCursor {
    cursor: TableCursor<EntryId, EntryId>,
    base: EntryId,
}

impl SubtreeCursor {
    pub fn new(env: &SearchEnv, base: EntryId) -> OpResult<Self> {
        let mut cursor = env.snapshot.sublevel.cursor();
        cursor.before(base)?;
        Ok(Self { cursor, base })
    }
}

impl Cursor for SubtreeCursor {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        self.cursor.before(self.base)
    }

    fn after_last(&mut self) -> OpResult<()> {
        self.cursor.after(self.base)
    }

    fn next(&mut self) -> OpResult<bool> {
        if !self.cursor.next()? {
            return Ok(false);
        }
        let (key, _) = self.cursor.get()?;
        if key == self.base {
            Ok(true)
        } else {
            self.cursor.after(self.base)?;
            Ok(false)
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        if !self.cursor.previous()? {
            return Ok(false);
        }
        let (key, _) = self.cursor.get()?;
        if key == self.base {
            Ok(true)
        } else {
            self.cursor.before(self.base)?;
            Ok(false)
        }
    }

    fn get(&self) -> OpResult<Candidate> {
        let (_, id) = self.cursor.get()?;
        Ok(Candidate::new(id))
    }

    fn close(&mut self) {
        self.cursor.close();
    }

    fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

/// Scans the whole partition in id order; the degenerate subtree walk when
/// the base is the suffix, and the fallback seed for unindexed work.
#[derive(Debug)]
pub struct AllEntriesCursor {
    cursor: MasterCursor,
}

impl AllEntriesCursor {
    pub fn new(env: &SearchEnv) -> Self {
        Self {
            cursor: env.snapshot.master.scan(),
        }
    }
}

impl Cursor for AllEntriesCursor {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        self.cursor.before_first()
    }

    fn after_last(&mut self) -> OpResult<()> {
        self.cursor.after_last()
    }

    fn next(&mut self) -> OpResult<bool> {
        self.cursor.next()
    }

    fn previous(&mut self) -> OpResult<bool> {
        self.cursor.previous()
    }

    fn get(&self) -> OpResult<Candidate> {
        let (id, entry) = self.cursor.get()?;
        let mut candidate = Candidate::new(id);
        candidate.entry = Some(entry);
        Ok(candidate)
    }

    fn close(&mut self) {
        self.cursor.close();
    }

    fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

/// A forward-only candidate producer.
pub trait Pull: Debug {
    fn pull(&mut self) -> OpResult<Option<Candidate>>;
}

/// Gives a [`Pull`] source the full cursor protocol by remembering what it
/// emitted: stepping backward replays history instead of asking the source
/// to run in reverse.
#[derive(Debug)]
pub struct Replayed<S> {
    source: S,
    history: Vec<Candidate>,
    /// 0 is before-first; `i` in `1..=history.len()` sits on `history[i-1]`.
    pos: usize,
    after: bool,
    exhausted: bool,
    closed: bool,
}

impl<S: Pull> Replayed<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            history: Vec::new(),
            pos: 0,
            after: false,
            exhausted: false,
            closed: false,
        }
    }

    fn check_open(&self) -> OpResult<()> {
        if self.closed { Err(closed_error()) } else { Ok(()) }
    }

    fn drain(&mut self) -> OpResult<()> {
        while !self.exhausted {
            match self.source.pull()? {
                Some(candidate) => self.history.push(candidate),
                None => self.exhausted = true,
            }
        }
        Ok(())
    }
}

impl<S: Pull> Cursor for Replayed<S> {
    type Item = Candidate;

    fn before_first(&mut self) -> OpResult<()> {
        self.check_open()?;
        self.pos = 0;
        self.after = false;
        Ok(())
    }

    fn after_last(&mut self) -> OpResult<()> {
        self.check_open()?;
        self.after = true;
        Ok(())
    }

    fn next(&mut self) -> OpResult<bool> {
        self.check_open()?;
        if self.after {
            return Ok(false);
        }
        if self.pos < self.history.len() {
            self.pos += 1;
            return Ok(true);
        }
        match self.source.pull()? {
            Some(candidate) => {
                self.history.push(candidate);
                self.pos = self.history.len();
                Ok(true)
            }
            None => {
                self.exhausted = true;
                self.after = true;
                Ok(false)
            }
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        self.check_open()?;
        if self.after {
            self.drain()?;
            self.after = false;
            self.pos = self.history.len();
            return Ok(self.pos > 0);
        }
        if self.pos > 1 {
            self.pos -= 1;
            Ok(true)
        } else {
            self.pos = 0;
            Ok(false)
        }
    }

    fn get(&self) -> OpResult<Candidate> {
        self.check_open()?;
        if self.after || self.pos == 0 {
            return Err(unpositioned_error());
        }
        Ok(self.history[self.pos - 1].clone())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Walks one user index: all duplicates of a key, a half-open range, or the
/// region sharing a substring filter's initial literal. Multi-valued
/// attributes can surface an id under several keys, so emitted ids are
/// de-duplicated.
#[derive(Debug)]
pub struct KeyWalkSource {
    cursor: TableCursor<NormValue, EntryId>,
    mode: KeyWalkMode,
    seen: FxHashSet<EntryId>,
}

#[derive(Debug)]
pub enum KeyWalkMode {
    Eq(NormValue),
    GreaterOrEqual(NormValue),
    LessOrEqual(NormValue),
    Prefix {
        initial: String,
        pattern: Arc<Regex>,
    },
}

impl KeyWalkSource {
    pub fn new(env: &SearchEnv, attr: &str, mode: KeyWalkMode) -> OpResult<Self> {
        let index = env.snapshot.index(attr).ok_or_else(|| {
            OperationError::internal(format!("planner picked unindexed attribute {attr}"))
        })?;
        let mut cursor = index.cursor();
        match &mode {
            KeyWalkMode::Eq(key) | KeyWalkMode::GreaterOrEqual(key) => {
                cursor.before(key.clone())?;
            }
            KeyWalkMode::LessOrEqual(key) => cursor.after(key.clone())?,
            KeyWalkMode::Prefix { initial, .. } => {
                cursor.before(NormValue::Text(initial.clone()))?;
            }
        }
        Ok(Self {
            cursor,
            mode,
            seen: FxHashSet::default(),
        })
    }
}

impl Pull for KeyWalkSource {
    fn pull(&mut self) -> OpResult<Option<Candidate>> {
        loop {
            let stepped = match self.mode {
                // `<=` walks the index downward from its bound.
                KeyWalkMode::LessOrEqual(_) => self.cursor.previous()?,
                _ => self.cursor.next()?,
            };
            if !stepped {
                return Ok(None);
            }
            let (key, id) = self.cursor.get()?;
            match &self.mode {
                KeyWalkMode::Eq(want) => {
                    if &key != want {
                        return Ok(None);
                    }
                }
                KeyWalkMode::GreaterOrEqual(_) | KeyWalkMode::LessOrEqual(_) => {
                    // Start position already bounds the walk on the one side
                    // that matters.
                }
                KeyWalkMode::Prefix { initial, pattern } => {
                    let Some(text) = key.as_str() else {
                        return Ok(None);
                    };
                    if !text.starts_with(initial.as_str()) {
                        // The early-exit guarantee: once past the shared
                        // prefix nothing further can match.
                        return Ok(None);
                    }
                    if !matches!(pattern.is_match(text), Ok(true)) {
                        continue;
                    }
                }
            }
            if self.seen.insert(id) {
                return Ok(Some(Candidate::with_value(id, key)));
            }
        }
    }
}

/// De-duplicating union: drains child cursors one after another in the
/// order the planner sorted them, suppressing ids already emitted.
#[derive(Debug)]
pub struct UnionSource {
    children: Vec<CandidateCursor>,
    current: usize,
    seen: FxHashSet<EntryId>,
}

impl UnionSource {
    pub fn new(children: Vec<CandidateCursor>) -> Self {
        Self {
            children,
            current: 0,
            seen: FxHashSet::default(),
        }
    }
}

impl Pull for UnionSource {
    fn pull(&mut self) -> OpResult<Option<Candidate>> {
        while self.current < self.children.len() {
            let child = &mut self.children[self.current];
            if child.next()? {
                let candidate = child.get()?;
                if self.seen.insert(candidate.id) {
                    return Ok(Some(candidate));
                }
            } else {
                self.current += 1;
            }
        }
        Ok(None)
    }
}

/// An inner stream gated by post-acceptance predicates: the conjunction
/// shape, the scope gate, and the negation stream are all this.
#[derive(Debug)]
pub struct PredicateSource {
    inner: Box<CandidateCursor>,
    predicates: Vec<Evaluator>,
    env: Arc<SearchEnv>,
}

impl PredicateSource {
    pub fn new(env: Arc<SearchEnv>, inner: CandidateCursor, predicates: Vec<Evaluator>) -> Self {
        Self {
            inner: Box::new(inner),
            predicates,
            env,
        }
    }
}

impl Pull for PredicateSource {
    fn pull(&mut self) -> OpResult<Option<Candidate>> {
        'outer: while self.inner.next()? {
            let mut candidate = self.inner.get()?;
            for predicate in &self.predicates {
                if !predicate.evaluate(&self.env, &mut candidate)? {
                    continue 'outer;
                }
            }
            return Ok(Some(candidate));
        }
        Ok(None)
    }
}
