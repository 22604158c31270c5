use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::helpers::IndexMap;
use crate::name::Dn;
use crate::schema::system::oids;
use crate::schema::{AttributeType, Registries};
use crate::value::{Value, ValueData};

/// One attribute of an entry: the resolved type and its values in insertion
/// order. Duplicates (by canonical form) are rejected at the edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    attr_type: Arc<AttributeType>,
    values: Vec<Value>,
}

impl Attribute {
    pub fn new(attr_type: Arc<AttributeType>) -> Self {
        Self {
            attr_type,
            values: Vec::new(),
        }
    }

    pub fn attr_type(&self) -> &Arc<AttributeType> {
        &self.attr_type
    }

    pub fn oid(&self) -> &SmolStr {
        &self.attr_type.oid
    }

    /// Appends a value; `false` when an equal value was already present.
    pub fn push(&mut self, value: Value) -> bool {
        if self.values.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    pub fn remove(&mut self, value: &Value) -> bool {
        let before = self.values.len();
        self.values.retain(|v| v != value);
        before != self.values.len()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values.contains(value)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An entry: a DN plus attributes keyed by attribute-type OID. Preserves the
/// order attributes were first added, which keeps LDIF dumps stable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entry {
    dn: Dn,
    attributes: IndexMap<SmolStr, Attribute>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: IndexMap::default(),
        }
    }

    /// Builds an entry from `(attribute, values)` pairs, resolving and
    /// normalizing everything against the schema.
    pub fn with_attrs(schema: &Registries, dn: Dn, attrs: &[(&str, &[&str])]) -> OpResult<Entry> {
        let mut entry = Entry::new(dn);
        for (attr, values) in attrs {
            for value in *values {
                entry.add_str(schema, attr, value)?;
            }
        }
        Ok(entry)
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    pub fn add_str(&mut self, schema: &Registries, attr: &str, value: &str) -> OpResult<bool> {
        self.add_value(schema, attr, ValueData::from(value))
    }

    /// Normalizes and stores one value. `false` when the value was already
    /// present.
    pub fn add_value(
        &mut self,
        schema: &Registries,
        attr: &str,
        value: ValueData,
    ) -> OpResult<bool> {
        let attr_type = schema.attribute_type(attr)?;
        let value = schema.normalize_value(&attr_type, value)?;
        Ok(self
            .attributes
            .entry(attr_type.oid.clone())
            .or_insert_with(|| Attribute::new(attr_type))
            .push(value))
    }

    pub fn put_attribute(&mut self, attribute: Attribute) {
        self.attributes
            .insert(attribute.oid().clone(), attribute);
    }

    /// Looks up by canonical OID only; resolution of names happens before an
    /// entry is interrogated.
    pub fn attribute(&self, oid: &str) -> Option<&Attribute> {
        self.attributes.get(oid)
    }

    pub fn attribute_mut(&mut self, oid: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(oid)
    }

    pub fn remove_attribute(&mut self, oid: &str) -> Option<Attribute> {
        self.attributes.shift_remove(oid)
    }

    /// Removes one value, dropping the attribute when it empties out.
    pub fn remove_value(&mut self, oid: &str, value: &Value) -> bool {
        let Some(attr) = self.attributes.get_mut(oid) else {
            return false;
        };
        let removed = attr.remove(value);
        if attr.is_empty() {
            self.attributes.shift_remove(oid);
        }
        removed
    }

    pub fn contains(&self, oid: &str, value: &Value) -> bool {
        self.attribute(oid).is_some_and(|a| a.contains(value))
    }

    pub fn has_attribute(&self, oid: &str) -> bool {
        self.attributes.contains_key(oid)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn attribute_oids(&self) -> impl Iterator<Item = &SmolStr> {
        self.attributes.keys()
    }

    /// The canonical object-class names this entry lists.
    pub fn object_classes(&self) -> Vec<&str> {
        self.attribute(oids::OBJECT_CLASS)
            .map(|attr| {
                attr.values()
                    .iter()
                    .filter_map(|v| v.norm().as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the entry is of `class`, directly or through inheritance.
    pub fn is_object_class(&self, schema: &Registries, class: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|oc| schema.is_object_class_subclass(oc, class))
    }

    /// Guarantees the invariant that every RDN AVA also appears as an
    /// attribute of the entry.
    pub fn inject_rdn_attributes(&mut self, schema: &Registries) -> OpResult<()> {
        let Some(rdn) = self.dn.rdn().cloned() else {
            return Ok(());
        };
        for ava in rdn.avas() {
            let attr_type = schema.attribute_type(ava.attr_norm())?;
            let attribute = self
                .attributes
                .entry(attr_type.oid.clone())
                .or_insert_with(|| Attribute::new(attr_type));
            attribute.push(ava.value().clone());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dn: {}", self.dn)?;
        for attr in self.attributes.values() {
            for value in attr.values() {
                writeln!(f, "{}: {}", attr.attr_type().preferred_name(), value)?;
            }
        }
        Ok(())
    }
}

/// The kinds of change a modify operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Remove,
    Replace,
}

/// One modification: the operation, the target attribute and the values it
/// applies to. An empty value list removes or replaces the whole attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    pub op: ModOp,
    pub attr: SmolStr,
    pub values: Vec<ValueData>,
}

impl Modification {
    pub fn add(attr: &str, values: &[&str]) -> Self {
        Self::build(ModOp::Add, attr, values)
    }

    pub fn remove(attr: &str, values: &[&str]) -> Self {
        Self::build(ModOp::Remove, attr, values)
    }

    pub fn replace(attr: &str, values: &[&str]) -> Self {
        Self::build(ModOp::Replace, attr, values)
    }

    fn build(op: ModOp, attr: &str, values: &[&str]) -> Self {
        Self {
            op,
            attr: attr.into(),
            values: values.iter().map(|v| ValueData::from(*v)).collect(),
        }
    }
}

/// Applies a modification list to an entry in place. The caller has already
/// validated schema constraints; this is pure data plumbing.
pub fn apply_modifications(
    schema: &Registries,
    entry: &mut Entry,
    mods: &[Modification],
) -> OpResult<()> {
    for m in mods {
        let attr_type = schema.attribute_type(&m.attr)?;
        match m.op {
            ModOp::Add => {
                for value in &m.values {
                    entry.add_value(schema, &m.attr, value.clone())?;
                }
            }
            ModOp::Remove => {
                if m.values.is_empty() {
                    if entry.remove_attribute(&attr_type.oid).is_none() {
                        return Err(OperationError::new(
                            LdapErrorKind::NoSuchAttribute,
                            format!("{} has no attribute {}", entry.dn(), m.attr),
                        ));
                    }
                } else {
                    for value in &m.values {
                        let value = schema.normalize_value(&attr_type, value.clone())?;
                        if !entry.remove_value(&attr_type.oid, &value) {
                            return Err(OperationError::new(
                                LdapErrorKind::NoSuchAttribute,
                                format!("{} does not hold that {} value", entry.dn(), m.attr),
                            ));
                        }
                    }
                }
            }
            ModOp::Replace => {
                entry.remove_attribute(&attr_type.oid);
                for value in &m.values {
                    entry.add_value(schema, &m.attr, value.clone())?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::system::system_registries;

    fn schema() -> Registries {
        system_registries()
    }

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap().normalize(&schema()).unwrap()
    }

    #[test]
    fn test_duplicate_values_are_rejected_by_the_matching_rule() {
        let schema = schema();
        let mut entry = Entry::new(dn("ou=system"));
        assert!(entry.add_str(&schema, "ou", "system").unwrap());
        assert!(!entry.add_str(&schema, "ou", "SYSTEM").unwrap());
        assert_eq!(entry.attribute("2.5.4.11").unwrap().len(), 1);
    }

    #[test]
    fn test_object_class_inheritance() {
        let schema = schema();
        let entry = Entry::with_attrs(
            &schema,
            dn("uid=admin,ou=system"),
            &[
                ("objectClass", &["inetOrgPerson"]),
                ("cn", &["admin"]),
                ("sn", &["administrator"]),
                ("uid", &["admin"]),
            ],
        )
        .unwrap();
        assert!(entry.is_object_class(&schema, "person"));
        assert!(entry.is_object_class(&schema, "top"));
        assert!(!entry.is_object_class(&schema, "alias"));
    }

    #[test]
    fn test_modifications() {
        let schema = schema();
        let mut entry = Entry::with_attrs(
            &schema,
            dn("ou=interceptors,ou=configuration,ou=system"),
            &[("objectClass", &["organizationalUnit"]), ("ou", &["interceptors"])],
        )
        .unwrap();

        apply_modifications(
            &schema,
            &mut entry,
            &[Modification::add("description", &["chain configuration"])],
        )
        .unwrap();
        assert!(entry.has_attribute("2.5.4.13"));

        apply_modifications(
            &schema,
            &mut entry,
            &[Modification::replace("description", &["updated"])],
        )
        .unwrap();
        assert_eq!(entry.attribute("2.5.4.13").unwrap().len(), 1);

        apply_modifications(&schema, &mut entry, &[Modification::remove("description", &[])])
            .unwrap();
        assert!(!entry.has_attribute("2.5.4.13"));

        let missing =
            apply_modifications(&schema, &mut entry, &[Modification::remove("description", &[])]);
        assert_eq!(missing.unwrap_err().kind, LdapErrorKind::NoSuchAttribute);
    }

    #[test]
    fn test_rdn_attributes_are_injected() {
        let schema = schema();
        let mut entry = Entry::with_attrs(
            &schema,
            dn("ou=blah,ou=system"),
            &[("objectClass", &["organizationalUnit"])],
        )
        .unwrap();
        entry.inject_rdn_attributes(&schema).unwrap();
        assert!(entry.has_attribute("2.5.4.11"));
        assert_eq!(
            entry.attribute("2.5.4.11").unwrap().first().unwrap().user_str(),
            Some("blah")
        );
    }
}
