//! Per-node filter evaluators. Each leaf evaluator prefers the cheap path
//! (the index entry a cursor handed over, or an index probe) and falls back
//! to resuscitating the full entry; the verdict is the same either way.

use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use fancy_regex::Regex;
use smol_str::SmolStr;
use warren_lib_core::errors::{OpResult, OperationError};
use warren_lib_core::ident::EntryId;
use warren_lib_core::value::NormValue;

use crate::context::SearchScope;
use crate::search::{Candidate, SearchEnv};

#[enum_dispatch]
pub trait Evaluate {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool>;
}

/// The closed set of evaluators the planner composes.
#[enum_dispatch(Evaluate)]
#[derive(Debug, Clone)]
pub enum Evaluator {
    Equality(EqualityEvaluator),
    Range(RangeEvaluator),
    Presence(PresenceEvaluator),
    Substring(SubstringEvaluator),
    Extensible(ExtensibleEvaluator),
    And(AndEvaluator),
    Or(OrEvaluator),
    Not(NotEvaluator),
    Scope(ScopeEvaluator),
}

/// Matches entries holding `value` under `attr` or any of its subtypes.
/// Approximate matching shares this evaluator: its assertion value has
/// already been through the same normalizer that blurs the differences the
/// rule ignores.
#[derive(Debug, Clone)]
pub struct EqualityEvaluator {
    pub attr: SmolStr,
    pub value: NormValue,
}

impl Evaluate for EqualityEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        if let Some(index) = env.snapshot.index(&self.attr) {
            return Ok(index.has_value(&self.value, candidate.id));
        }
        let entry = candidate.entry(env)?;
        for attr in entry.attributes() {
            if !env.schema.is_attribute_subtype(attr.oid(), &self.attr) {
                continue;
            }
            if attr.values().iter().any(|v| v.norm() == &self.value) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `>=` / `<=` on the canonical order of the attribute's values.
#[derive(Debug, Clone)]
pub struct RangeEvaluator {
    pub attr: SmolStr,
    pub bound: NormValue,
    pub greater: bool,
}

impl Evaluate for RangeEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        let entry = candidate.entry(env)?;
        for attr in entry.attributes() {
            if !env.schema.is_attribute_subtype(attr.oid(), &self.attr) {
                continue;
            }
            let hit = attr.values().iter().any(|v| {
                if self.greater {
                    v.norm() >= &self.bound
                } else {
                    v.norm() <= &self.bound
                }
            });
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[derive(Debug, Clone)]
pub struct PresenceEvaluator {
    pub attr: SmolStr,
}

impl Evaluate for PresenceEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        if env.snapshot.is_indexed(&self.attr) {
            return Ok(env
                .snapshot
                .presence
                .has_value(&self.attr, &candidate.id));
        }
        let entry = candidate.entry(env)?;
        Ok(entry
            .attribute_oids()
            .any(|oid| env.schema.is_attribute_subtype(oid, &self.attr)))
    }
}

/// Substring matching against a pattern compiled from the normalized
/// components. When the candidate carries the index key it was found under,
/// that string alone decides.
#[derive(Debug, Clone)]
pub struct SubstringEvaluator {
    pub attr: SmolStr,
    pub pattern: Arc<Regex>,
}

impl SubstringEvaluator {
    fn matches(&self, value: &NormValue) -> bool {
        value
            .as_str()
            .is_some_and(|s| matches!(self.pattern.is_match(s), Ok(true)))
    }
}

impl Evaluate for SubstringEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        if let Some(value) = &candidate.value
            && self.matches(value)
        {
            return Ok(true);
        }
        let entry = candidate.entry(env)?;
        for attr in entry.attributes() {
            if !env.schema.is_attribute_subtype(attr.oid(), &self.attr) {
                continue;
            }
            if attr.values().iter().any(|v| self.matches(v.norm())) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Extensible matching, reduced to equality under the requested rule's
/// canonical form, optionally consulting the DN's own AVAs.
#[derive(Debug, Clone)]
pub struct ExtensibleEvaluator {
    pub attr: Option<SmolStr>,
    pub value: NormValue,
    pub dn_attributes: bool,
}

impl Evaluate for ExtensibleEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        let entry = candidate.entry(env)?;
        for attr in entry.attributes() {
            let applies = match &self.attr {
                Some(target) => env.schema.is_attribute_subtype(attr.oid(), target),
                None => true,
            };
            if applies && attr.values().iter().any(|v| v.norm() == &self.value) {
                return Ok(true);
            }
        }
        if self.dn_attributes {
            for rdn in entry.dn().rdns() {
                for ava in rdn.avas() {
                    let applies = match &self.attr {
                        Some(target) => env.schema.is_attribute_subtype(ava.attr_norm(), target),
                        None => true,
                    };
                    if applies && ava.value().norm() == &self.value {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }
}

/// Conjunction, short-circuiting on the first false child.
#[derive(Debug, Clone)]
pub struct AndEvaluator {
    pub children: Vec<Evaluator>,
}

impl Evaluate for AndEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        for child in &self.children {
            if !child.evaluate(env, candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Disjunction. The planner hands the children over sorted by descending
/// scan count so the child most likely to hit is asked first.
#[derive(Debug, Clone)]
pub struct OrEvaluator {
    pub children: Vec<Evaluator>,
}

impl Evaluate for OrEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        for child in &self.children {
            if child.evaluate(env, candidate)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[derive(Debug, Clone)]
pub struct NotEvaluator {
    pub child: Box<Evaluator>,
}

impl Evaluate for NotEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        Ok(!self.child.evaluate(env, candidate)?)
    }
}

/// Scope membership relative to a base id: the predicate that gates
/// full-scan fallbacks and negation streams.
#[derive(Debug, Clone)]
pub struct ScopeEvaluator {
    pub base_id: EntryId,
    pub scope: SearchScope,
}

impl Evaluate for ScopeEvaluator {
    fn evaluate(&self, env: &SearchEnv, candidate: &mut Candidate) -> OpResult<bool> {
        match self.scope {
            SearchScope::Object => Ok(candidate.id == self.base_id),
            SearchScope::OneLevel => {
                let parent = env
                    .snapshot
                    .rdn_rev
                    .first(&candidate.id)
                    .map(|key| key.parent);
                Ok(parent == Some(self.base_id))
            }
            SearchScope::Subtree => Ok(env
                .snapshot
                .sublevel
                .has_value(&self.base_id, &candidate.id)),
        }
    }
}

/// Evaluates a rewritten filter against a detached entry, for the handful
/// of entries synthesized outside any partition (the root DSE and the
/// subschema subentry).
pub fn matches_entry(
    schema: &warren_lib_core::schema::Registries,
    filter: &warren_lib_core::filter::Filter,
    entry: &warren_lib_core::entry::Entry,
) -> bool {
    use warren_lib_core::filter::Filter;

    let values_of = |attr: &str| -> Vec<&warren_lib_core::value::Value> {
        entry
            .attributes()
            .filter(|a| schema.is_attribute_subtype(a.oid(), attr))
            .flat_map(|a| a.values().iter())
            .collect()
    };

    match filter {
        Filter::Present { attr } => values_of(attr).into_iter().next().is_some(),
        Filter::Equality { attr, value } | Filter::Approx { attr, value } => {
            values_of(attr).into_iter().any(|v| v.norm() == value.norm())
        }
        Filter::GreaterOrEqual { attr, value } => {
            values_of(attr).into_iter().any(|v| v.norm() >= value.norm())
        }
        Filter::LessOrEqual { attr, value } => values_of(attr).into_iter().any(|v| v.norm() <= value.norm()),
        Filter::Substring {
            attr,
            initial,
            any,
            fin,
        } => {
            let any: Vec<&str> = any.iter().filter_map(|v| v.norm().as_str()).collect();
            let Ok(pattern) = compile_substring(
                initial.as_ref().and_then(|v| v.norm().as_str()),
                &any,
                fin.as_ref().and_then(|v| v.norm().as_str()),
            ) else {
                return false;
            };
            values_of(attr).into_iter().any(|v| {
                v.norm()
                    .as_str()
                    .is_some_and(|s| matches!(pattern.is_match(s), Ok(true)))
            })
        }
        Filter::Extensible { attr, value, .. } => match attr {
            Some(attr) => values_of(attr).into_iter().any(|v| v.norm() == value.norm()),
            None => entry
                .attributes()
                .flat_map(|a| a.values().iter())
                .any(|v| v.norm() == value.norm()),
        },
        Filter::And(children) => children.iter().all(|c| matches_entry(schema, c, entry)),
        Filter::Or(children) => children.iter().any(|c| matches_entry(schema, c, entry)),
        Filter::Not(child) => !matches_entry(schema, child, entry),
    }
}

/// Compiles normalized substring components into an anchored pattern.
pub fn compile_substring(
    initial: Option<&str>,
    any: &[&str],
    fin: Option<&str>,
) -> OpResult<Regex> {
    let mut pattern = String::from("^");
    if let Some(initial) = initial {
        pattern.push_str(&quote(initial));
    }
    pattern.push_str(".*");
    for component in any {
        pattern.push_str(&quote(component));
        pattern.push_str(".*");
    }
    if let Some(fin) = fin {
        pattern.push_str(&quote(fin));
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|err| OperationError::internal(format!("bad substring pattern: {err}")))
}

fn quote(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if c.is_ascii_punctuation() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_substring_pattern_compiles_and_anchors() {
        let regex = compile_substring(Some("ini"), &["a", "b"], Some("fin")).unwrap();
        assert!(matches!(regex.is_match("iniXaYbZfin"), Ok(true)));
        assert!(matches!(regex.is_match("Xini a b fin"), Ok(false)));

        let prefix = compile_substring(Some("sys"), &[], None).unwrap();
        assert!(matches!(prefix.is_match("system"), Ok(true)));
        assert!(matches!(prefix.is_match("subsystem"), Ok(false)));
    }

    #[test]
    fn test_metacharacters_are_quoted() {
        let regex = compile_substring(Some("a.b"), &[], None).unwrap();
        assert!(matches!(regex.is_match("a.bc"), Ok(true)));
        assert_eq!(regex.is_match("aXbc").unwrap(), false);
    }
}
