//! The normalizing filter rewriter: one post-order pass that resolves
//! attribute descriptions to OIDs, normalizes assertion values through each
//! type's equality rule, and applies the null-propagation algebra for
//! undefined attributes. A `None` result means the filter can match nothing.

use smol_str::SmolStr;

use crate::filter::Filter;
use crate::schema::Registries;
use crate::value::Value;

pub fn rewrite(filter: Filter, schema: &Registries) -> Option<Filter> {
    match filter {
        Filter::Present { attr } => {
            let oid = resolve(schema, &attr)?;
            Some(Filter::Present { attr: oid })
        }
        Filter::Equality { attr, value } => {
            let (oid, value) = leaf(schema, &attr, value)?;
            Some(Filter::Equality { attr: oid, value })
        }
        Filter::GreaterOrEqual { attr, value } => {
            let (oid, value) = leaf(schema, &attr, value)?;
            Some(Filter::GreaterOrEqual { attr: oid, value })
        }
        Filter::LessOrEqual { attr, value } => {
            let (oid, value) = leaf(schema, &attr, value)?;
            Some(Filter::LessOrEqual { attr: oid, value })
        }
        Filter::Approx { attr, value } => {
            let (oid, value) = leaf(schema, &attr, value)?;
            Some(Filter::Approx { attr: oid, value })
        }
        Filter::Substring {
            attr,
            initial,
            any,
            fin,
        } => {
            let oid = resolve(schema, &attr)?;
            let initial = match initial {
                Some(v) => Some(normalize(schema, &oid, v)?),
                None => None,
            };
            let fin = match fin {
                Some(v) => Some(normalize(schema, &oid, v)?),
                None => None,
            };
            let any = any
                .into_iter()
                .map(|v| normalize(schema, &oid, v))
                .collect::<Option<Vec<_>>>()?;
            Some(Filter::Substring {
                attr: oid,
                initial,
                any,
                fin,
            })
        }
        Filter::Extensible {
            attr,
            rule,
            value,
            dn_attributes,
        } => {
            let attr = match attr {
                Some(attr) => Some(resolve(schema, &attr)?),
                None => None,
            };
            let rule = match rule {
                Some(rule) => Some(schema.matching_rule(&rule).ok()?.oid.clone()),
                None => None,
            };
            let value = match (&attr, &rule) {
                (_, Some(rule_oid)) => {
                    let rule = schema.matching_rule(rule_oid).ok()?;
                    let norm = rule.normalizer.normalize(schema, value.user()).ok()?;
                    Value::new(value.user().clone(), norm)
                }
                (Some(oid), None) => normalize(schema, oid, value)?,
                (None, None) => return None,
            };
            Some(Filter::Extensible {
                attr,
                rule,
                value,
                dn_attributes,
            })
        }
        Filter::And(children) => {
            let rewritten: Vec<Filter> = children
                .into_iter()
                .map(|child| rewrite(child, schema))
                .collect::<Option<_>>()?;
            collapse(rewritten, Filter::And)
        }
        Filter::Or(children) => {
            let rewritten: Vec<Filter> = children
                .into_iter()
                .filter_map(|child| rewrite(child, schema))
                .collect();
            collapse(rewritten, Filter::Or)
        }
        Filter::Not(child) => Some(Filter::not(rewrite(*child, schema)?)),
    }
}

fn resolve(schema: &Registries, attr: &str) -> Option<SmolStr> {
    match schema.find_attribute_type(attr) {
        Some(at) => Some(at.oid.clone()),
        None => {
            log::debug!("dropping filter leaf on undefined attribute {attr}");
            None
        }
    }
}

fn leaf(schema: &Registries, attr: &str, value: Value) -> Option<(SmolStr, Value)> {
    let oid = resolve(schema, attr)?;
    let value = normalize(schema, &oid, value)?;
    Some((oid, value))
}

fn normalize(schema: &Registries, oid: &str, value: Value) -> Option<Value> {
    let attr_type = schema.find_attribute_type(oid)?;
    match schema.normalize_value(attr_type, value.user().clone()) {
        Ok(value) => Some(value),
        Err(err) => {
            log::debug!("dropping filter leaf on unnormalizable value for {oid}: {err}");
            None
        }
    }
}

fn collapse(mut children: Vec<Filter>, branch: fn(Vec<Filter>) -> Filter) -> Option<Filter> {
    match children.len() {
        0 => None,
        1 => Some(children.remove(0)),
        _ => Some(branch(children)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filter::parser::parse_filter;
    use crate::schema::system::system_registries;

    fn rw(input: &str) -> Option<Filter> {
        rewrite(parse_filter(input).unwrap(), &system_registries())
    }

    #[test]
    fn test_leaf_resolution_and_value_normalization() {
        let filter = rw("(OU=Sys Tem)").unwrap();
        let Filter::Equality { attr, value } = filter else {
            panic!();
        };
        assert_eq!(attr, "2.5.4.11");
        assert_eq!(value.norm().as_str(), Some("sys tem"));
    }

    #[test]
    fn test_undefined_attribute_poisons_a_conjunction() {
        assert_eq!(rw("(&(ou=a)(nonexistent=b))"), None);
    }

    #[test]
    fn test_undefined_attribute_drops_out_of_a_disjunction() {
        let filter = rw("(|(ou=a)(nonexistent=b))").unwrap();
        assert!(matches!(filter, Filter::Equality { .. }), "single survivor collapses");

        assert_eq!(rw("(|(bogus1=a)(bogus2=b))"), None);
    }

    #[test]
    fn test_not_of_undefined_becomes_null() {
        assert_eq!(rw("(!(nonexistent=b))"), None);
    }

    #[test]
    fn test_single_child_branch_collapses() {
        let filter = rw("(&(ou=a))").unwrap();
        assert!(matches!(filter, Filter::Equality { .. }));
    }

    #[test]
    fn test_double_negation_survives_rewrite_intact() {
        let filter = rw("(!(!(ou=a)))").unwrap();
        let Filter::Not(inner) = filter else { panic!() };
        let Filter::Not(inner) = *inner else { panic!() };
        assert!(matches!(*inner, Filter::Equality { .. }));
    }

    #[test]
    fn test_unnormalizable_value_drops_the_leaf() {
        // uidNumber is an INTEGER; "abc" cannot match anything.
        assert_eq!(rw("(uidNumber=abc)"), None);
        assert!(rw("(|(uidNumber=abc)(ou=a))").is_some());
    }
}
