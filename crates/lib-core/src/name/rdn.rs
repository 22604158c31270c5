use std::fmt;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::name::ava::Ava;
use crate::name::parser;
use crate::value::{Value, ValueData};

/// A relative distinguished name: one or more AVAs joined by `+`. After
/// normalization the AVAs are held in ascending canonical-type order, which
/// makes the canonical string form unique. Equality and hashing are on that
/// string; RDN ordering beyond equality is deliberately not defined.
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
    user: String,
    norm: String,
}

impl Rdn {
    pub fn parse(input: &str) -> OpResult<Rdn> {
        let (parsed, user) = parser::parse_rdn(input)?;
        Ok(Self::from_avas(
            parsed.into_iter().map(Ava::from_parsed).collect(),
            user,
        ))
    }

    /// Builds a single-AVA RDN programmatically.
    pub fn new(attr: &str, value: impl Into<ValueData>) -> Rdn {
        let ava = Ava::new(attr, value.into());
        let user = ava.user_fragment();
        Self::from_avas(vec![ava], user)
    }

    pub(crate) fn from_avas(mut avas: Vec<Ava>, user: String) -> Rdn {
        avas.sort_by(|a, b| {
            a.attr_norm()
                .cmp(b.attr_norm())
                .then_with(|| a.value().norm().cmp(b.value().norm()))
        });
        let norm = avas.iter().map(Ava::norm_fragment).join("+");
        Rdn { avas, user, norm }
    }

    /// Normalizes every AVA against the schema and re-derives the canonical
    /// string. Duplicate attribute types inside one RDN are rejected here,
    /// once aliases have been resolved to OIDs.
    pub fn normalize(&self, schema: &crate::schema::Registries) -> OpResult<Rdn> {
        let avas: Vec<Ava> = self
            .avas
            .iter()
            .map(|ava| ava.normalize(schema))
            .collect::<OpResult<_>>()?;

        for (a, b) in avas.iter().tuple_combinations() {
            if a.attr_norm() == b.attr_norm() {
                return Err(OperationError::new(
                    LdapErrorKind::InvalidDnSyntax,
                    format!(
                        "RDN {self} repeats attribute type {} after normalization",
                        a.attr_norm()
                    ),
                ));
            }
        }

        Ok(Self::from_avas(avas, self.user.clone()))
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// The first AVA in canonical order; the whole RDN for the common
    /// single-valued case.
    pub fn ava(&self) -> &Ava {
        &self.avas[0]
    }

    pub fn is_multi_valued(&self) -> bool {
        self.avas.len() > 1
    }

    /// The value carried for the given canonical attribute type, if any.
    pub fn value_of(&self, attr_norm: &str) -> Option<&Value> {
        self.avas
            .iter()
            .find(|ava| ava.attr_norm() == attr_norm)
            .map(Ava::value)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn norm(&self) -> &str {
        &self.norm
    }

    pub fn attr_types(&self) -> impl Iterator<Item = &SmolStr> {
        self.avas.iter().map(Ava::attr_norm)
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Rdn {}

impl std::hash::Hash for Rdn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::system::system_registries;

    #[test]
    fn test_multi_valued_rdn_orders_avas_canonically() {
        let schema = system_registries();
        // sn (2.5.4.4) sorts before cn (2.5.4.3)? No: 2.5.4.3 < 2.5.4.4.
        let a = Rdn::parse("sn=Doe+cn=Kim").unwrap().normalize(&schema).unwrap();
        let b = Rdn::parse("cn=Kim+sn=Doe").unwrap().normalize(&schema).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.norm(), b.norm());
        assert_eq!(a.ava().attr_norm(), "2.5.4.3");
    }

    #[test]
    fn test_duplicate_type_is_rejected_after_alias_resolution() {
        let schema = system_registries();
        let rdn = Rdn::parse("cn=a+commonName=b").unwrap();
        assert!(rdn.normalize(&schema).is_err());
    }

    #[test]
    fn test_case_differences_vanish_in_the_canonical_form() {
        let schema = system_registries();
        let a = Rdn::parse("OU=System").unwrap().normalize(&schema).unwrap();
        let b = Rdn::parse("ou=system").unwrap().normalize(&schema).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.user(), "OU=System", "user form survives untouched");
    }
}
