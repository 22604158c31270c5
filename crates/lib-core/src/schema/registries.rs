use std::sync::Arc;

use ahash::AHashMap;
use smol_str::SmolStr;

use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::schema::attribute_type::AttributeType;
use crate::schema::matching_rule::{MatchingRule, Normalizer};
use crate::schema::object_class::ObjectClass;
use crate::schema::syntax::Syntax;
use crate::value::{NormValue, Value, ValueData};

/// The sealed schema registries: attribute types, object classes, matching
/// rules and syntaxes, all addressable by OID or by any of their names.
/// Immutable once built; a schema change rebuilds and atomically swaps the
/// whole set.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    attribute_types: AHashMap<SmolStr, Arc<AttributeType>>,
    object_classes: AHashMap<SmolStr, Arc<ObjectClass>>,
    matching_rules: AHashMap<SmolStr, Arc<MatchingRule>>,
    syntaxes: AHashMap<SmolStr, Arc<Syntax>>,
    attribute_type_list: Vec<Arc<AttributeType>>,
    object_class_list: Vec<Arc<ObjectClass>>,
}

impl Registries {
    pub fn builder() -> RegistriesBuilder {
        RegistriesBuilder::default()
    }

    pub fn find_attribute_type(&self, name_or_oid: &str) -> Option<&Arc<AttributeType>> {
        self.attribute_types.get(&fold(name_or_oid))
    }

    pub fn attribute_type(&self, name_or_oid: &str) -> OpResult<Arc<AttributeType>> {
        self.find_attribute_type(name_or_oid)
            .cloned()
            .ok_or_else(|| OperationError::undefined_attribute_type(name_or_oid))
    }

    pub fn object_class(&self, name_or_oid: &str) -> OpResult<Arc<ObjectClass>> {
        self.object_classes.get(&fold(name_or_oid)).cloned().ok_or_else(|| {
            OperationError::new(
                LdapErrorKind::ObjectClassViolation,
                format!("object class {name_or_oid} is not defined in the schema"),
            )
        })
    }

    pub fn find_object_class(&self, name_or_oid: &str) -> Option<&Arc<ObjectClass>> {
        self.object_classes.get(&fold(name_or_oid))
    }

    pub fn matching_rule(&self, name_or_oid: &str) -> OpResult<Arc<MatchingRule>> {
        self.matching_rules.get(&fold(name_or_oid)).cloned().ok_or_else(|| {
            OperationError::new(
                LdapErrorKind::OperationsError,
                format!("matching rule {name_or_oid} is not registered"),
            )
        })
    }

    pub fn syntax(&self, oid: &str) -> Option<&Arc<Syntax>> {
        self.syntaxes.get(&fold(oid))
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = &Arc<AttributeType>> {
        self.attribute_type_list.iter()
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &Arc<ObjectClass>> {
        self.object_class_list.iter()
    }

    /// The equality rule effective for a type, walking the superior chain
    /// when the type does not declare one of its own.
    pub fn effective_equality(&self, attr: &AttributeType) -> Option<Arc<MatchingRule>> {
        let mut current = Some(attr.oid.clone());
        while let Some(oid) = current {
            let at = self.find_attribute_type(&oid)?;
            if let Some(rule) = &at.equality {
                return self.matching_rules.get(&fold(rule)).cloned();
            }
            current = at.superior.clone();
        }
        None
    }

    pub fn effective_ordering(&self, attr: &AttributeType) -> Option<Arc<MatchingRule>> {
        let mut current = Some(attr.oid.clone());
        while let Some(oid) = current {
            let at = self.find_attribute_type(&oid)?;
            if let Some(rule) = &at.ordering {
                return self.matching_rules.get(&fold(rule)).cloned();
            }
            current = at.superior.clone();
        }
        None
    }

    /// Whether `sub` names the same attribute type as `sup` or one of its
    /// descendants, e.g. `c-ou` answers for `ou`.
    pub fn is_attribute_subtype(&self, sub: &str, sup: &str) -> bool {
        let Some(sup) = self.find_attribute_type(sup) else {
            return false;
        };
        let mut current = self.find_attribute_type(sub).cloned();
        while let Some(at) = current {
            if at.oid == sup.oid {
                return true;
            }
            current = at
                .superior
                .as_ref()
                .and_then(|s| self.find_attribute_type(s).cloned());
        }
        false
    }

    /// Whether `class` names `ancestor` or inherits from it.
    pub fn is_object_class_subclass(&self, class: &str, ancestor: &str) -> bool {
        let Some(ancestor) = self.find_object_class(ancestor) else {
            return false;
        };
        let mut pending = vec![fold(class)];
        while let Some(name) = pending.pop() {
            let Some(oc) = self.object_classes.get(&name) else {
                continue;
            };
            if oc.oid == ancestor.oid {
                return true;
            }
            pending.extend(oc.superior.iter().map(|s| fold(s)));
        }
        false
    }

    /// Applies the type's equality normalizer, producing a [`Value`] carrying
    /// both forms. Types with no effective equality rule keep the user form
    /// as canonical.
    pub fn normalize_value(&self, attr: &AttributeType, user: ValueData) -> OpResult<Value> {
        let norm = match self.effective_equality(attr) {
            Some(rule) => rule.normalizer.normalize(self, &user)?,
            None => match &user {
                ValueData::Text(s) => NormValue::Text(s.clone()),
                ValueData::Bytes(b) => NormValue::Bytes(b.clone()),
            },
        };
        Ok(Value::new(user, norm))
    }

    /// The normalizer a DN component of this type must run through.
    pub fn normalizer_for(&self, attr: &AttributeType) -> Normalizer {
        self.effective_equality(attr)
            .map(|rule| rule.normalizer)
            .unwrap_or(Normalizer::CaseExact)
    }
}

#[derive(Debug, Default)]
pub struct RegistriesBuilder {
    attribute_types: Vec<AttributeType>,
    object_classes: Vec<ObjectClass>,
    matching_rules: Vec<MatchingRule>,
    syntaxes: Vec<Syntax>,
}

impl RegistriesBuilder {
    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntaxes.push(syntax);
        self
    }

    pub fn matching_rule(mut self, rule: MatchingRule) -> Self {
        self.matching_rules.push(rule);
        self
    }

    pub fn attribute_type(mut self, attr: AttributeType) -> Self {
        self.attribute_types.push(attr);
        self
    }

    pub fn object_class(mut self, class: ObjectClass) -> Self {
        self.object_classes.push(class);
        self
    }

    /// Seals the registries. Referential integrity is checked here: every
    /// matching-rule, syntax, superior and must/may reference has to resolve,
    /// and no name or OID may be claimed twice.
    pub fn build(self) -> OpResult<Registries> {
        let mut registries = Registries::default();

        for syntax in self.syntaxes {
            let syntax = Arc::new(syntax);
            insert(&mut registries.syntaxes, &syntax.oid, &syntax)?;
            insert(&mut registries.syntaxes, &syntax.name, &syntax)?;
        }

        for rule in self.matching_rules {
            if registries.syntax(&rule.syntax).is_none() {
                return Err(seal_error(format!(
                    "matching rule {} names unknown syntax {}",
                    rule.oid, rule.syntax
                )));
            }
            let names = rule.names.clone();
            let rule = Arc::new(rule);
            insert(&mut registries.matching_rules, &rule.oid, &rule)?;
            for name in &names {
                insert(&mut registries.matching_rules, name, &rule)?;
            }
        }

        for attr in self.attribute_types {
            if registries.syntax(&attr.syntax).is_none() {
                return Err(seal_error(format!(
                    "attribute type {} names unknown syntax {}",
                    attr.oid, attr.syntax
                )));
            }
            for rule in [&attr.equality, &attr.ordering, &attr.substring]
                .into_iter()
                .flatten()
            {
                if !registries.matching_rules.contains_key(&fold(rule)) {
                    return Err(seal_error(format!(
                        "attribute type {} names unknown matching rule {rule}",
                        attr.oid
                    )));
                }
            }
            let names = attr.names.clone();
            let attr = Arc::new(attr);
            insert(&mut registries.attribute_types, &attr.oid, &attr)?;
            for name in &names {
                insert(&mut registries.attribute_types, name, &attr)?;
            }
            registries.attribute_type_list.push(attr);
        }

        // Superior chains can only be verified once the full set is known.
        for attr in &registries.attribute_type_list {
            if let Some(sup) = &attr.superior
                && !registries.attribute_types.contains_key(&fold(sup))
            {
                return Err(seal_error(format!(
                    "attribute type {} names unknown superior {sup}",
                    attr.oid
                )));
            }
        }

        for class in self.object_classes {
            let names = class.names.clone();
            let class = Arc::new(class);
            insert(&mut registries.object_classes, &class.oid, &class)?;
            for name in &names {
                insert(&mut registries.object_classes, name, &class)?;
            }
            registries.object_class_list.push(class);
        }

        for class in &registries.object_class_list {
            for sup in &class.superior {
                if !registries.object_classes.contains_key(&fold(sup)) {
                    return Err(seal_error(format!(
                        "object class {} names unknown superior {sup}",
                        class.oid
                    )));
                }
            }
            for attr in class.must.iter().chain(&class.may) {
                if !registries.attribute_types.contains_key(&fold(attr)) {
                    return Err(seal_error(format!(
                        "object class {} references unknown attribute {attr}",
                        class.oid
                    )));
                }
            }
        }

        Ok(registries)
    }
}

fn fold(name: &str) -> SmolStr {
    SmolStr::from(name.trim().to_lowercase())
}

fn insert<T>(map: &mut AHashMap<SmolStr, Arc<T>>, key: &str, value: &Arc<T>) -> OpResult<()> {
    if map.insert(fold(key), Arc::clone(value)).is_some() {
        return Err(seal_error(format!("duplicate schema name or OID: {key}")));
    }
    Ok(())
}

fn seal_error(message: String) -> OperationError {
    OperationError::new(LdapErrorKind::SchemaViolation, message)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::matching_rule::oids as mr;
    use crate::schema::syntax::oids as syn;
    use crate::schema::system::system_registries;
    use crate::schema::ObjectClassKind;

    #[test]
    fn test_lookup_by_any_name_or_oid() {
        let schema = system_registries();
        let by_name = schema.attribute_type("organizationalUnitName").unwrap();
        let by_alias = schema.attribute_type("OU").unwrap();
        let by_oid = schema.attribute_type("2.5.4.11").unwrap();
        assert_eq!(by_name.oid, by_alias.oid);
        assert_eq!(by_name.oid, by_oid.oid);
    }

    #[test]
    fn test_seal_rejects_dangling_matching_rule() {
        let result = Registries::builder()
            .syntax(Syntax::new(syn::DIRECTORY_STRING, "Directory String", true))
            .attribute_type(
                AttributeType::new("1.2.3.4", &["broken"], syn::DIRECTORY_STRING)
                    .equality("9.9.9.9"),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_seal_rejects_dangling_must() {
        let result = Registries::builder()
            .syntax(Syntax::new(syn::DIRECTORY_STRING, "Directory String", true))
            .matching_rule(MatchingRule::new(
                mr::CASE_IGNORE_MATCH,
                "caseIgnoreMatch",
                syn::DIRECTORY_STRING,
                Normalizer::CaseIgnore,
            ))
            .object_class(
                ObjectClass::new("1.2.3.5", "broken", ObjectClassKind::Structural)
                    .must(&["missing"]),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_collective_subtype_answers_for_supertype() {
        let schema = system_registries();
        assert!(schema.is_attribute_subtype("c-ou", "ou"));
        assert!(!schema.is_attribute_subtype("ou", "c-ou"));
    }
}
