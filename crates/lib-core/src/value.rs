use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// A value exactly as the client provided it. Whether it is text or bytes is
/// decided by the syntax of the attribute type it is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueData {
    Text(String),
    Bytes(Vec<u8>),
}

impl ValueData {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueData::Text(s) => Some(s),
            ValueData::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ValueData::Text(s) => s.as_bytes(),
            ValueData::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::Text(s) => f.write_str(s),
            ValueData::Bytes(b) => f.write_str(&BASE64.encode(b)),
        }
    }
}

impl From<&str> for ValueData {
    fn from(value: &str) -> Self {
        ValueData::Text(value.to_string())
    }
}

impl From<String> for ValueData {
    fn from(value: String) -> Self {
        ValueData::Text(value)
    }
}

impl From<Vec<u8>> for ValueData {
    fn from(value: Vec<u8>) -> Self {
        ValueData::Bytes(value)
    }
}

/// The canonical form a normalizer reduces a value to. The derived `Ord` is
/// the comparator order for index keys: normalizers pick the variant whose
/// natural order matches the matching rule (`Num` for integerMatch, canonical
/// text for the string rules, raw bytes for octetStringMatch). Values of one
/// attribute always normalize into the same variant, so the cross-variant
/// ordering is arbitrary but never observed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NormValue {
    Text(String),
    Num(i64),
    Bytes(Vec<u8>),
}

impl NormValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NormValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormValue::Text(s) => f.write_str(s),
            NormValue::Num(n) => write!(f, "{n}"),
            NormValue::Bytes(b) => f.write_str(&BASE64.encode(b)),
        }
    }
}

/// An attribute or assertion value, carrying both the user-provided form and
/// the canonical form its equality rule produced. Equality and hashing are on
/// the canonical form only.
#[derive(Debug, Clone)]
pub struct Value {
    user: ValueData,
    norm: NormValue,
}

impl Value {
    pub fn new(user: ValueData, norm: NormValue) -> Self {
        Self { user, norm }
    }

    /// A value whose canonical form is its user form, for syntaxes whose
    /// normalizer is the identity.
    pub fn plain(user: impl Into<String>) -> Self {
        let user = user.into();
        let norm = NormValue::Text(user.clone());
        Self {
            user: ValueData::Text(user),
            norm,
        }
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        let norm = NormValue::Bytes(data.clone());
        Self {
            user: ValueData::Bytes(data),
            norm,
        }
    }

    pub fn user(&self) -> &ValueData {
        &self.user
    }

    pub fn norm(&self) -> &NormValue {
        &self.norm
    }

    pub fn into_norm(self) -> NormValue {
        self.norm
    }

    pub fn user_str(&self) -> Option<&str> {
        self.user.as_str()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.user.fmt(f)
    }
}

/// The current time in generalized-time form, as stamped into
/// `createTimestamp` and `modifyTimestamp`.
pub fn generalized_time_now() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_value_equality_is_on_the_canonical_form() {
        let a = Value::new(
            ValueData::Text("Alice".into()),
            NormValue::Text("alice".into()),
        );
        let b = Value::new(
            ValueData::Text("ALICE ".into()),
            NormValue::Text("alice".into()),
        );
        assert_eq!(a, b);
        assert_eq!(a.user_str(), Some("Alice"));
    }

    #[test]
    fn test_num_norm_orders_numerically() {
        let mut values = vec![NormValue::Num(10), NormValue::Num(9), NormValue::Num(-3)];
        values.sort();
        assert_eq!(
            values,
            vec![NormValue::Num(-3), NormValue::Num(9), NormValue::Num(10)]
        );
    }
}
