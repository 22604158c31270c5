use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use crate::errors::{LdapErrorKind, OpResult, OperationError};

/// The ordered-cursor protocol every stream in the engine speaks. A cursor
/// moves through `BEFORE_FIRST → POSITIONED ↔ BETWEEN → AFTER_LAST`, with
/// `CLOSED` absorbing from any state. `get` is only legal while positioned on
/// an element; `close` is idempotent.
pub trait Cursor {
    type Item;

    fn before_first(&mut self) -> OpResult<()>;
    fn after_last(&mut self) -> OpResult<()>;
    /// Advances to the following element; `false` leaves the cursor after
    /// the last element.
    fn next(&mut self) -> OpResult<bool>;
    /// Steps back to the preceding element; `false` leaves the cursor before
    /// the first element.
    fn previous(&mut self) -> OpResult<bool>;
    fn get(&self) -> OpResult<Self::Item>;
    fn close(&mut self);
    fn is_closed(&self) -> bool;
}

pub fn closed_error() -> OperationError {
    OperationError::new(LdapErrorKind::CursorClosed, "cursor is closed")
}

pub fn unpositioned_error() -> OperationError {
    OperationError::new(
        LdapErrorKind::InvalidCursorPosition,
        "cursor is not positioned on an element",
    )
}

/// Where a [`TableCursor`] currently stands.
#[derive(Debug, Clone)]
enum Pos<K, V> {
    BeforeFirst,
    AfterLast,
    /// Positioned on an element.
    On(K, V),
    /// Between elements, at the boundary around `key` (the whole key when
    /// `value` is `None`), on the side `after` says.
    Gap {
        key: K,
        value: Option<V>,
        after: bool,
    },
    Closed,
}

/// An ordered cursor over a [`Table`](crate::store::Table) snapshot.
/// Iteration is key-major, value-minor; for duplicate keys the value order
/// decides. The snapshot never sees writes made after the cursor opened.
#[derive(Debug, Clone)]
pub struct TableCursor<K, V> {
    snapshot: Arc<BTreeMap<K, BTreeSet<V>>>,
    pos: Pos<K, V>,
}

impl<K, V> TableCursor<K, V>
where
    K: Ord + Clone + Debug,
    V: Ord + Clone + Debug,
{
    pub(crate) fn new(snapshot: Arc<BTreeMap<K, BTreeSet<V>>>) -> Self {
        Self {
            snapshot,
            pos: Pos::BeforeFirst,
        }
    }

    fn check_open(&self) -> OpResult<()> {
        if matches!(self.pos, Pos::Closed) {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    /// Positions just before the first value of `key`: the following `next`
    /// returns that element (or the nearest one after a missing key).
    pub fn before(&mut self, key: K) -> OpResult<()> {
        self.check_open()?;
        self.pos = Pos::Gap {
            key,
            value: None,
            after: false,
        };
        Ok(())
    }

    /// Positions just after the last value of `key`.
    pub fn after(&mut self, key: K) -> OpResult<()> {
        self.check_open()?;
        self.pos = Pos::Gap {
            key,
            value: None,
            after: true,
        };
        Ok(())
    }

    /// Positions just before the pair `(key, value)`.
    pub fn before_value(&mut self, key: K, value: V) -> OpResult<()> {
        self.check_open()?;
        self.pos = Pos::Gap {
            key,
            value: Some(value),
            after: false,
        };
        Ok(())
    }

    /// Positions just after the pair `(key, value)`.
    pub fn after_value(&mut self, key: K, value: V) -> OpResult<()> {
        self.check_open()?;
        self.pos = Pos::Gap {
            key,
            value: Some(value),
            after: true,
        };
        Ok(())
    }

    fn first(&self) -> Option<(K, V)> {
        self.snapshot
            .iter()
            .next()
            .and_then(|(k, set)| set.iter().next().map(|v| (k.clone(), v.clone())))
    }

    fn last(&self) -> Option<(K, V)> {
        self.snapshot
            .iter()
            .next_back()
            .and_then(|(k, set)| set.iter().next_back().map(|v| (k.clone(), v.clone())))
    }

    /// The smallest pair greater than `(key, value)`, or greater-or-equal
    /// when `inclusive`.
    fn succ(&self, key: &K, value: &V, inclusive: bool) -> Option<(K, V)> {
        if let Some(set) = self.snapshot.get(key) {
            let found = if inclusive {
                set.range(value.clone()..).next()
            } else {
                set.range((Excluded(value.clone()), Unbounded)).next()
            };
            if let Some(v) = found {
                return Some((key.clone(), v.clone()));
            }
        }
        self.first_from(key, false)
    }

    /// The largest pair less than `(key, value)`, or less-or-equal when
    /// `inclusive`.
    fn pred(&self, key: &K, value: &V, inclusive: bool) -> Option<(K, V)> {
        if let Some(set) = self.snapshot.get(key) {
            let found = if inclusive {
                set.range(..=value.clone()).next_back()
            } else {
                set.range(..value.clone()).next_back()
            };
            if let Some(v) = found {
                return Some((key.clone(), v.clone()));
            }
        }
        self.last_until(key, false)
    }

    /// First pair at or after `key` (strictly after when `!inclusive`).
    fn first_from(&self, key: &K, inclusive: bool) -> Option<(K, V)> {
        let range = if inclusive {
            self.snapshot.range(key.clone()..)
        } else {
            self.snapshot.range((Excluded(key.clone()), Unbounded))
        };
        for (k, set) in range {
            if let Some(v) = set.iter().next() {
                return Some((k.clone(), v.clone()));
            }
        }
        None
    }

    /// Last pair at or before `key` (strictly before when `!inclusive`).
    fn last_until(&self, key: &K, inclusive: bool) -> Option<(K, V)> {
        let range = if inclusive {
            self.snapshot.range(..=key.clone())
        } else {
            self.snapshot.range(..key.clone())
        };
        for (k, set) in range.rev() {
            if let Some(v) = set.iter().next_back() {
                return Some((k.clone(), v.clone()));
            }
        }
        None
    }
}

impl<K, V> Cursor for TableCursor<K, V>
where
    K: Ord + Clone + Debug,
    V: Ord + Clone + Debug,
{
    type Item = (K, V);

    fn before_first(&mut self) -> OpResult<()> {
        self.check_open()?;
        self.pos = Pos::BeforeFirst;
        Ok(())
    }

    fn after_last(&mut self) -> OpResult<()> {
        self.check_open()?;
        self.pos = Pos::AfterLast;
        Ok(())
    }

    fn next(&mut self) -> OpResult<bool> {
        let found = match &self.pos {
            Pos::Closed => return Err(closed_error()),
            Pos::AfterLast => None,
            Pos::BeforeFirst => self.first(),
            Pos::On(k, v) => self.succ(&k.clone(), &v.clone(), false),
            Pos::Gap { key, value, after } => match (value, after) {
                (None, false) => self.first_from(&key.clone(), true),
                (None, true) => self.first_from(&key.clone(), false),
                (Some(v), false) => self.succ(&key.clone(), &v.clone(), true),
                (Some(v), true) => self.succ(&key.clone(), &v.clone(), false),
            },
        };
        match found {
            Some((k, v)) => {
                self.pos = Pos::On(k, v);
                Ok(true)
            }
            None => {
                self.pos = Pos::AfterLast;
                Ok(false)
            }
        }
    }

    fn previous(&mut self) -> OpResult<bool> {
        let found = match &self.pos {
            Pos::Closed => return Err(closed_error()),
            Pos::BeforeFirst => None,
            Pos::AfterLast => self.last(),
            Pos::On(k, v) => self.pred(&k.clone(), &v.clone(), false),
            Pos::Gap { key, value, after } => match (value, after) {
                (None, false) => self.last_until(&key.clone(), false),
                (None, true) => self.last_until(&key.clone(), true),
                (Some(v), false) => self.pred(&key.clone(), &v.clone(), false),
                (Some(v), true) => self.pred(&key.clone(), &v.clone(), true),
            },
        };
        match found {
            Some((k, v)) => {
                self.pos = Pos::On(k, v);
                Ok(true)
            }
            None => {
                self.pos = Pos::BeforeFirst;
                Ok(false)
            }
        }
    }

    fn get(&self) -> OpResult<(K, V)> {
        match &self.pos {
            Pos::Closed => Err(closed_error()),
            Pos::On(k, v) => Ok((k.clone(), v.clone())),
            _ => Err(unpositioned_error()),
        }
    }

    fn close(&mut self) {
        self.pos = Pos::Closed;
    }

    fn is_closed(&self) -> bool {
        matches!(self.pos, Pos::Closed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::table::Table;

    /// The fixture from the cursor contract: duplicate keys iterate
    /// key-major, value-minor.
    fn fixture() -> Table<i64, i64> {
        let mut table = Table::new();
        for (k, v) in [(1, 0), (1, 1), (1, 2), (2, 1), (4, 1), (5, 1)] {
            table.put(k, v);
        }
        table
    }

    fn drain_forward(cursor: &mut TableCursor<i64, i64>) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        while cursor.next().unwrap() {
            out.push(cursor.get().unwrap());
        }
        out
    }

    #[test]
    fn test_full_forward_walk() {
        let table = fixture();
        let mut cursor = table.cursor();
        cursor.before_first().unwrap();
        assert_eq!(
            drain_forward(&mut cursor),
            vec![(1, 0), (1, 1), (1, 2), (2, 1), (4, 1), (5, 1)]
        );
        assert!(!cursor.next().unwrap(), "stays after last");
    }

    #[test]
    fn test_previous_after_after_last_returns_the_last_element() {
        let table = fixture();
        let mut cursor = table.cursor();
        cursor.after_last().unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap(), (5, 1));
    }

    #[test]
    fn test_after_value_then_previous_returns_that_pair() {
        let table = fixture();
        let mut cursor = table.cursor();
        cursor.after_value(1, 2).unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap(), (1, 2));

        // And forward from the same boundary skips it.
        cursor.after_value(1, 2).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap(), (2, 1));
    }

    #[test]
    fn test_before_key_positioning() {
        let table = fixture();
        let mut cursor = table.cursor();

        cursor.before(2).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap(), (2, 1));

        // A missing key lands on the nearest neighbour either way.
        cursor.before(3).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap(), (4, 1));
        cursor.before(3).unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap(), (2, 1));
    }

    #[test]
    fn test_after_key_covers_every_duplicate() {
        let table = fixture();
        let mut cursor = table.cursor();
        cursor.after(1).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap(), (2, 1));
        cursor.after(1).unwrap();
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap(), (1, 2));
    }

    #[test]
    fn test_get_requires_a_position() {
        let table = fixture();
        let mut cursor = table.cursor();
        let err = cursor.get().unwrap_err();
        assert_eq!(err.kind, LdapErrorKind::InvalidCursorPosition);

        cursor.next().unwrap();
        assert!(cursor.get().is_ok());

        cursor.after_last().unwrap();
        assert_eq!(cursor.get().unwrap_err().kind, LdapErrorKind::InvalidCursorPosition);
    }

    #[test]
    fn test_close_absorbs_and_is_idempotent() {
        let table = fixture();
        let mut cursor = table.cursor();
        cursor.next().unwrap();
        cursor.close();
        cursor.close();
        assert!(cursor.is_closed());
        assert_eq!(cursor.next().unwrap_err().kind, LdapErrorKind::CursorClosed);
        assert_eq!(cursor.get().unwrap_err().kind, LdapErrorKind::CursorClosed);
    }

    #[test]
    fn test_direction_reversal_on_a_positioned_cursor() {
        let table = fixture();
        let mut cursor = table.cursor();
        cursor.next().unwrap();
        cursor.next().unwrap();
        assert_eq!(cursor.get().unwrap(), (1, 1));
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.get().unwrap(), (1, 0));
        assert!(!cursor.previous().unwrap());
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap(), (1, 0));
    }
}
