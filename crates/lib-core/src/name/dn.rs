use std::fmt;

use itertools::Itertools;

use crate::errors::OpResult;
use crate::name::ava::Ava;
use crate::name::parser;
use crate::name::rdn::Rdn;
use crate::schema::Registries;

/// A distinguished name: RDNs held most-specific first. Two forms are kept,
/// the user form exactly as provided and the canonical form whose string
/// equality defines entry identity. The empty DN names the root DSE.
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    user: String,
    norm: String,
}

impl Dn {
    pub fn parse(input: &str) -> OpResult<Dn> {
        let rdns = parser::parse_dn(input)?
            .into_iter()
            .map(|(avas, user)| {
                Rdn::from_avas(avas.into_iter().map(Ava::from_parsed).collect(), user)
            })
            .collect::<Vec<_>>();
        Ok(Self::assemble(rdns, Some(input.trim().to_string())))
    }

    pub fn root_dse() -> Dn {
        Self {
            rdns: Vec::new(),
            user: String::new(),
            norm: String::new(),
        }
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Dn {
        Self::assemble(rdns, None)
    }

    fn assemble(rdns: Vec<Rdn>, user: Option<String>) -> Dn {
        let user = user.unwrap_or_else(|| rdns.iter().map(Rdn::user).join(","));
        let norm = rdns.iter().map(Rdn::norm).join(",");
        Dn { rdns, user, norm }
    }

    /// Normalizes every RDN against the schema. Idempotent; fails with
    /// `UndefinedAttributeType` for types the schema does not know.
    pub fn normalize(&self, schema: &Registries) -> OpResult<Dn> {
        let rdns: Vec<Rdn> = self
            .rdns
            .iter()
            .map(|rdn| rdn.normalize(schema))
            .collect::<OpResult<_>>()?;
        Ok(Self::assemble(rdns, Some(self.user.clone())))
    }

    pub fn is_root_dse(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn size(&self) -> usize {
        self.rdns.len()
    }

    /// The most specific RDN, `None` for the root DSE.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The DN without its most specific RDN; the root DSE is its own parent
    /// boundary and yields the empty DN.
    pub fn parent(&self) -> Dn {
        if self.rdns.len() <= 1 {
            return Dn::root_dse();
        }
        Self::assemble(self.rdns[1..].to_vec(), None)
    }

    /// The DN one level below `self`, named by `rdn`.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let user = if self.is_root_dse() {
            rdn.user().to_string()
        } else {
            format!("{},{}", rdn.user(), self.user)
        };
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend_from_slice(&self.rdns);
        Self::assemble(rdns, Some(user))
    }

    /// Whether `self` sits at or below `ancestor`. The root DSE is an
    /// ancestor of everything. Both sides must be in the same normalization
    /// state for the answer to mean anything.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&ancestor.rdns)
            .all(|(a, b)| a == b)
    }

    /// The RDNs above `suffix`, most specific first; `None` when `self` is
    /// not under `suffix`.
    pub fn relative_to<'a>(&'a self, suffix: &Dn) -> Option<&'a [Rdn]> {
        if !self.is_descendant_of(suffix) {
            return None;
        }
        Some(&self.rdns[..self.rdns.len() - suffix.rdns.len()])
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn norm(&self) -> &str {
        &self.norm
    }
}

impl Default for Dn {
    fn default() -> Self {
        Dn::root_dse()
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl std::hash::Hash for Dn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::system::system_registries;

    fn norm(input: &str) -> Dn {
        Dn::parse(input).unwrap().normalize(&system_registries()).unwrap()
    }

    #[test]
    fn test_round_trip_and_idempotency() {
        let dn = norm("UID = Admin , OU=System");
        let reparsed = Dn::parse(&dn.to_string()).unwrap();
        assert_eq!(reparsed.normalize(&system_registries()).unwrap(), dn);

        let twice = dn.normalize(&system_registries()).unwrap();
        assert_eq!(twice.norm(), dn.norm());
    }

    #[test]
    fn test_equality_is_on_the_canonical_form() {
        assert_eq!(norm("uid=admin,ou=system"), norm("UID=ADMIN, OU = System"));
        assert_ne!(norm("uid=admin,ou=system"), norm("uid=admin,ou=users"));
    }

    #[test]
    fn test_aliases_resolve_to_the_same_canonical_type() {
        assert_eq!(
            norm("organizationalUnitName=system").norm(),
            norm("ou=system").norm()
        );
    }

    #[test]
    fn test_parent_and_child() {
        let dn = norm("ou=services,ou=configuration,ou=system");
        assert_eq!(dn.parent(), norm("ou=configuration,ou=system"));
        assert_eq!(
            dn.parent().child(Rdn::parse("ou=services").unwrap().normalize(&system_registries()).unwrap()),
            dn
        );
        assert!(norm("ou=system").parent().is_root_dse());
    }

    #[test]
    fn test_descendant_arithmetic() {
        let base = norm("ou=system");
        let leaf = norm("uid=admin,ou=system");
        assert!(leaf.is_descendant_of(&base));
        assert!(leaf.is_descendant_of(&leaf));
        assert!(leaf.is_descendant_of(&Dn::root_dse()));
        assert!(!base.is_descendant_of(&leaf));

        let relative = leaf.relative_to(&base).unwrap();
        assert_eq!(relative.len(), 1);
        assert_eq!(relative[0].norm(), "0.9.2342.19200300.100.1.1=admin");
    }

    #[test]
    fn test_binary_rdn_value_survives_round_trip() {
        let dn = Dn::parse("cn=#414243,ou=system").unwrap();
        let reparsed = Dn::parse(&dn.norm().to_string()).unwrap();
        assert_eq!(dn.norm(), reparsed.norm());
    }
}
