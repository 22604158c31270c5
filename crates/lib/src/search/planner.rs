//! The candidate-cursor planner: annotates a rewritten filter with scan-count
//! estimates from the index sizes, picks the cheapest indexed stream to
//! drive, and gates it with evaluators for everything the stream does not
//! prove by construction.

use std::sync::Arc;

use itertools::Itertools;
use warren_lib_core::errors::OpResult;
use warren_lib_core::filter::Filter;
use warren_lib_core::ident::EntryId;
use warren_lib_core::value::Value;

use crate::context::SearchScope;
use crate::search::cursors::{
    AllEntriesCursor, BaseCursor, CandidateCursor, KeyWalkMode, KeyWalkSource, OneLevelCursor,
    PredicateSource, PresenceCursor, Replayed, SubtreeCursor, UnionSource,
};
use crate::search::evaluator::{
    AndEvaluator, EqualityEvaluator, Evaluator, ExtensibleEvaluator, NotEvaluator, OrEvaluator,
    PresenceEvaluator, RangeEvaluator, ScopeEvaluator, SubstringEvaluator, compile_substring,
};
use crate::search::SearchEnv;

/// The sentinel for "no index can bound this"; an unindexed node forces a
/// scan of whatever stream seeds it.
const UNINDEXED: usize = usize::MAX;

/// Builds the candidate stream for one partition search. The result emits
/// each matching id exactly once, in an order consistent with whichever
/// index drives it, and already honors the scope restriction.
pub fn build(
    env: &Arc<SearchEnv>,
    base_id: EntryId,
    base_is_suffix: bool,
    scope: SearchScope,
    filter: &Filter,
) -> OpResult<CandidateCursor> {
    let scope_eval = Evaluator::Scope(ScopeEvaluator { base_id, scope });

    // A base-object search has exactly one candidate; nothing an index could
    // do beats checking it directly.
    if scope == SearchScope::Object {
        return Ok(predicate(
            env,
            CandidateCursor::Base(BaseCursor::new(base_id)),
            vec![evaluator_for(env, filter)],
        ));
    }

    match build_node(env, base_id, base_is_suffix, scope, filter)? {
        Some(cursor) => Ok(predicate(env, cursor, vec![scope_eval])),
        None => {
            // Nothing indexed anywhere in the filter: seed with the scope
            // stream, which is cheap by construction, and evaluate in full.
            let seed = scope_cursor(env, base_id, base_is_suffix, scope)?;
            Ok(predicate(env, seed, vec![evaluator_for(env, filter)]))
        }
    }
}

/// The scan-count estimate for one node: how many candidates it would emit
/// on its own. Only ever used to order work.
pub fn scan_count(env: &SearchEnv, filter: &Filter) -> usize {
    match filter {
        Filter::Equality { attr, value } | Filter::Approx { attr, value } => {
            env.snapshot.equality_count(attr, value.norm())
        }
        Filter::GreaterOrEqual { attr, .. }
        | Filter::LessOrEqual { attr, .. }
        | Filter::Substring { attr, .. } => match env.snapshot.index(attr) {
            Some(index) => index.len(),
            None => UNINDEXED,
        },
        Filter::Present { attr } => {
            if env.snapshot.is_indexed(attr) {
                env.snapshot.presence_count(attr)
            } else {
                UNINDEXED
            }
        }
        Filter::Extensible { .. } => UNINDEXED,
        Filter::And(children) => children
            .iter()
            .map(|child| scan_count(env, child))
            .min()
            .unwrap_or(UNINDEXED),
        Filter::Or(children) => children
            .iter()
            .map(|child| scan_count(env, child))
            .fold(0usize, usize::saturating_add),
        Filter::Not(_) => UNINDEXED,
    }
}

/// The evaluator tree mirroring a filter. Disjunction children come out
/// sorted by descending scan count so the child most likely to accept is
/// consulted first.
pub fn evaluator_for(env: &SearchEnv, filter: &Filter) -> Evaluator {
    match filter {
        Filter::Equality { attr, value } | Filter::Approx { attr, value } => {
            Evaluator::Equality(EqualityEvaluator {
                attr: attr.clone(),
                value: value.norm().clone(),
            })
        }
        Filter::GreaterOrEqual { attr, value } => Evaluator::Range(RangeEvaluator {
            attr: attr.clone(),
            bound: value.norm().clone(),
            greater: true,
        }),
        Filter::LessOrEqual { attr, value } => Evaluator::Range(RangeEvaluator {
            attr: attr.clone(),
            bound: value.norm().clone(),
            greater: false,
        }),
        Filter::Present { attr } => Evaluator::Presence(PresenceEvaluator { attr: attr.clone() }),
        Filter::Substring {
            attr,
            initial,
            any,
            fin,
        } => Evaluator::Substring(SubstringEvaluator {
            attr: attr.clone(),
            pattern: Arc::new(substring_pattern(initial, any, fin)),
        }),
        Filter::Extensible {
            attr,
            value,
            dn_attributes,
            ..
        } => Evaluator::Extensible(ExtensibleEvaluator {
            attr: attr.clone(),
            value: value.norm().clone(),
            dn_attributes: *dn_attributes,
        }),
        Filter::And(children) => Evaluator::And(AndEvaluator {
            children: children
                .iter()
                .map(|child| evaluator_for(env, child))
                .collect(),
        }),
        Filter::Or(children) => {
            let ordered = children
                .iter()
                .sorted_by_key(|child| std::cmp::Reverse(scan_count(env, child)))
                .map(|child| evaluator_for(env, child))
                .collect();
            Evaluator::Or(OrEvaluator { children: ordered })
        }
        Filter::Not(child) => Evaluator::Not(NotEvaluator {
            child: Box::new(evaluator_for(env, child)),
        }),
    }
}

/// An indexed stream for this node, or `None` when no index helps and the
/// caller has to seed with scope.
fn build_node(
    env: &Arc<SearchEnv>,
    base_id: EntryId,
    base_is_suffix: bool,
    scope: SearchScope,
    filter: &Filter,
) -> OpResult<Option<CandidateCursor>> {
    match filter {
        Filter::Equality { attr, value } | Filter::Approx { attr, value } => {
            key_walk(env, attr, KeyWalkMode::Eq(value.norm().clone()))
        }
        Filter::GreaterOrEqual { attr, value } => {
            key_walk(env, attr, KeyWalkMode::GreaterOrEqual(value.norm().clone()))
        }
        Filter::LessOrEqual { attr, value } => {
            key_walk(env, attr, KeyWalkMode::LessOrEqual(value.norm().clone()))
        }
        Filter::Present { attr } => {
            if env.snapshot.is_indexed(attr) {
                Ok(Some(CandidateCursor::Presence(PresenceCursor::new(
                    env,
                    attr.clone(),
                )?)))
            } else {
                Ok(None)
            }
        }
        Filter::Substring {
            attr,
            initial,
            any,
            fin,
        } => {
            if !env.snapshot.is_indexed(attr) {
                return Ok(None);
            }
            let mode = KeyWalkMode::Prefix {
                initial: initial
                    .as_ref()
                    .and_then(|v| v.norm().as_str())
                    .unwrap_or("")
                    .to_string(),
                pattern: Arc::new(substring_pattern(initial, any, fin)),
            };
            key_walk(env, attr, mode)
        }
        Filter::Extensible { .. } => Ok(None),
        Filter::And(children) => {
            // Drive the cheapest indexed child, everything else rides along
            // as a post-acceptance predicate.
            let chosen = children
                .iter()
                .enumerate()
                .filter(|(_, child)| scan_count(env, child) != UNINDEXED)
                .sorted_by_key(|(_, child)| {
                    let count = scan_count(env, child);
                    // Prefer the minimum non-zero estimate; an exact zero is
                    // still better than a scan.
                    (count == 0, count)
                })
                .next();
            let Some((index, driver)) = chosen else {
                return Ok(None);
            };
            let Some(driver_cursor) = build_node(env, base_id, base_is_suffix, scope, driver)?
            else {
                return Ok(None);
            };
            let rest: Vec<Evaluator> = children
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, child)| evaluator_for(env, child))
                .collect();
            if rest.is_empty() {
                Ok(Some(driver_cursor))
            } else {
                Ok(Some(predicate(env, driver_cursor, rest)))
            }
        }
        Filter::Or(children) => {
            // A union is only worth it when every arm is indexed; one
            // unindexed arm already forces the full scan.
            let ordered: Vec<&Filter> = children
                .iter()
                .sorted_by_key(|child| scan_count(env, child))
                .collect();
            let mut cursors = Vec::with_capacity(ordered.len());
            for child in ordered {
                match build_node(env, base_id, base_is_suffix, scope, child)? {
                    Some(cursor) => cursors.push(cursor),
                    None => return Ok(None),
                }
            }
            Ok(Some(CandidateCursor::Union(Replayed::new(
                UnionSource::new(cursors),
            ))))
        }
        Filter::Not(child) => {
            // Negation scans the scope and keeps what the child rejects.
            let seed = scope_cursor(env, base_id, base_is_suffix, scope)?;
            let negated = Evaluator::Not(NotEvaluator {
                child: Box::new(evaluator_for(env, child)),
            });
            Ok(Some(predicate(env, seed, vec![negated])))
        }
    }
}

fn key_walk(
    env: &Arc<SearchEnv>,
    attr: &str,
    mode: KeyWalkMode,
) -> OpResult<Option<CandidateCursor>> {
    if !env.snapshot.is_indexed(attr) {
        return Ok(None);
    }
    Ok(Some(CandidateCursor::KeyWalk(Replayed::new(
        KeyWalkSource::new(env, attr, mode)?,
    ))))
}

fn scope_cursor(
    env: &Arc<SearchEnv>,
    base_id: EntryId,
    base_is_suffix: bool,
    scope: SearchScope,
) -> OpResult<CandidateCursor> {
    Ok(match scope {
        SearchScope::Object => CandidateCursor::Base(BaseCursor::new(base_id)),
        SearchScope::OneLevel => CandidateCursor::OneLevel(OneLevelCursor::new(env, base_id)?),
        SearchScope::Subtree => {
            if base_is_suffix {
                // The whole partition: the sublevel walk would only repeat
                // the master table in a worse order.
                CandidateCursor::All(AllEntriesCursor::new(env))
            } else {
                CandidateCursor::Subtree(SubtreeCursor::new(env, base_id)?)
            }
        }
    })
}

fn predicate(
    env: &Arc<SearchEnv>,
    inner: CandidateCursor,
    predicates: Vec<Evaluator>,
) -> CandidateCursor {
    CandidateCursor::Predicate(Replayed::new(PredicateSource::new(
        Arc::clone(env),
        inner,
        predicates,
    )))
}

fn substring_pattern(
    initial: &Option<Value>,
    any: &[Value],
    fin: &Option<Value>,
) -> fancy_regex::Regex {
    let any: Vec<&str> = any.iter().filter_map(|v| v.norm().as_str()).collect();
    compile_substring(
        initial.as_ref().and_then(|v| v.norm().as_str()),
        &any,
        fin.as_ref().and_then(|v| v.norm().as_str()),
    )
    .unwrap_or_else(|_| {
        // Components are normalized text by the time the planner runs; a
        // pattern that still fails to compile matches nothing.
        fancy_regex::Regex::new("$^").expect("constant pattern compiles")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unindexed_sentinel_orders_last() {
        // Sorting by descending count puts the unindexed sentinel first,
        // which is exactly what the or-evaluator wants: the arm most likely
        // to match is consulted first.
        let counts = [3usize, UNINDEXED, 0];
        let ordered: Vec<usize> = counts
            .iter()
            .copied()
            .sorted_by_key(|c| std::cmp::Reverse(*c))
            .collect();
        assert_eq!(ordered, vec![UNINDEXED, 3, 0]);
    }

    #[test]
    fn test_scan_count_composition() {
        // Plain arithmetic checks that need no partition: and takes the
        // minimum, or saturates on the unindexed sentinel.
        assert_eq!(
            [5usize, 2, 9].iter().copied().min().unwrap(),
            2,
            "and picks its cheapest child"
        );
        assert_eq!(
            [5usize, UNINDEXED]
                .iter()
                .fold(0usize, |acc, c| acc.saturating_add(*c)),
            UNINDEXED,
            "or with an unindexed arm saturates"
        );
    }
}
