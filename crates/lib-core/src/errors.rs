use thiserror::Error;

use crate::name::Dn;

/// The tagged error union every layer of the engine propagates. Variants map
/// onto the RFC 4511 result codes via [`LdapErrorKind::result_code`]; the two
/// cursor variants are local conditions that surface as `operationsError` if
/// they ever reach a client.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "camelCase")]
pub enum LdapErrorKind {
    OperationsError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    ConfidentialityRequired,
    NoSuchAttribute,
    UndefinedAttributeType,
    SchemaViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    AliasProblem,
    InvalidDnSyntax,
    AliasDereferencingProblem,
    InvalidCredentials,
    InsufficientAccessRights,
    UnwillingToPerform,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    Abandoned,
    Other,
    InvalidCursorPosition,
    CursorClosed,
}

impl LdapErrorKind {
    pub fn result_code(self) -> u32 {
        match self {
            LdapErrorKind::OperationsError => 1,
            LdapErrorKind::TimeLimitExceeded => 3,
            LdapErrorKind::SizeLimitExceeded => 4,
            LdapErrorKind::ConfidentialityRequired => 13,
            LdapErrorKind::NoSuchAttribute => 16,
            LdapErrorKind::UndefinedAttributeType => 17,
            LdapErrorKind::SchemaViolation => 19,
            LdapErrorKind::AttributeOrValueExists => 20,
            LdapErrorKind::InvalidAttributeSyntax => 21,
            LdapErrorKind::NoSuchObject => 32,
            LdapErrorKind::AliasProblem => 33,
            LdapErrorKind::InvalidDnSyntax => 34,
            LdapErrorKind::AliasDereferencingProblem => 36,
            LdapErrorKind::InvalidCredentials => 49,
            LdapErrorKind::InsufficientAccessRights => 50,
            LdapErrorKind::UnwillingToPerform => 53,
            LdapErrorKind::ObjectClassViolation => 65,
            LdapErrorKind::NotAllowedOnNonLeaf => 66,
            LdapErrorKind::NotAllowedOnRdn => 67,
            LdapErrorKind::EntryAlreadyExists => 68,
            LdapErrorKind::Abandoned => 118,
            LdapErrorKind::Other
            | LdapErrorKind::InvalidCursorPosition
            | LdapErrorKind::CursorClosed => 80,
        }
    }
}

/// An operation failure: the kind, the longest resolved prefix of the failing
/// DN when one is known, and a short diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct OperationError {
    pub kind: LdapErrorKind,
    pub matched_dn: Option<Dn>,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: LdapErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            matched_dn: None,
            message: message.into(),
        }
    }

    pub fn with_matched_dn(mut self, dn: Dn) -> Self {
        self.matched_dn = Some(dn);
        self
    }

    pub fn no_such_object(dn: &Dn, matched: Dn) -> Self {
        Self::new(
            LdapErrorKind::NoSuchObject,
            format!("entry {dn} does not exist"),
        )
        .with_matched_dn(matched)
    }

    pub fn entry_already_exists(dn: &Dn) -> Self {
        Self::new(
            LdapErrorKind::EntryAlreadyExists,
            format!("entry {dn} already exists"),
        )
        .with_matched_dn(dn.clone())
    }

    pub fn undefined_attribute_type(name: &str) -> Self {
        Self::new(
            LdapErrorKind::UndefinedAttributeType,
            format!("attribute type {name} is not defined in the schema"),
        )
    }

    pub fn unwilling(message: impl Into<String>) -> Self {
        Self::new(LdapErrorKind::UnwillingToPerform, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(LdapErrorKind::Other, message)
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(matched) = &self.matched_dn {
            write!(f, " (matched: {matched})")?;
        }
        Ok(())
    }
}

pub type OpResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_kind_renders_as_camel_case() {
        assert_eq!(LdapErrorKind::NoSuchObject.to_string(), "noSuchObject");
        assert_eq!(LdapErrorKind::NotAllowedOnNonLeaf.result_code(), 66);
    }
}
