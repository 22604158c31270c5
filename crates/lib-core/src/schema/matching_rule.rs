use std::cmp::Ordering;

use smol_str::SmolStr;

use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::name::Dn;
use crate::schema::registries::Registries;
use crate::value::{NormValue, ValueData};

/// An OID-identified (normalizer, comparator, syntax) triple. The comparator
/// is implied by the canonical form the normalizer produces, so a rule only
/// records which normalizer it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRule {
    pub oid: SmolStr,
    pub names: Vec<SmolStr>,
    pub syntax: SmolStr,
    pub normalizer: Normalizer,
}

impl MatchingRule {
    pub fn new(oid: &str, name: &str, syntax: &str, normalizer: Normalizer) -> Self {
        Self {
            oid: oid.into(),
            names: vec![name.into()],
            syntax: syntax.into(),
            normalizer,
        }
    }

    /// Total order over canonical values produced by this rule's normalizer.
    pub fn compare(&self, a: &NormValue, b: &NormValue) -> Ordering {
        a.cmp(b)
    }
}

/// Reduces a user-provided value to its canonical form. A closed set: the
/// engine only ever normalizes through rules it registered itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    /// Trim, collapse internal whitespace, case fold.
    CaseIgnore,
    /// Trim and collapse whitespace, preserve case.
    CaseExact,
    /// Canonical `i64` form; order is numeric, not lexicographic.
    Integer,
    /// Digits only; embedded spaces are insignificant.
    NumericString,
    /// `TRUE` / `FALSE`.
    Boolean,
    /// Spaces and dashes are insignificant.
    TelephoneNumber,
    /// Canonical UTC `YYYYMMDDHHMMSS.mmmZ`.
    GeneralizedTime,
    /// OID or descriptor; descriptors case fold.
    ObjectIdentifier,
    /// Structural DN normalization against the schema.
    DistinguishedName,
    /// Lowercased hyphenated form.
    Uuid,
    /// Bytes compare as-is.
    OctetString,
}

impl Normalizer {
    /// Whether canonical values of this normalizer are human readable. Binary
    /// rules keep byte values out of the text index space.
    pub fn human_readable(self) -> bool {
        !matches!(self, Normalizer::OctetString)
    }

    pub fn normalize(self, schema: &Registries, value: &ValueData) -> OpResult<NormValue> {
        match self {
            Normalizer::CaseIgnore => Ok(NormValue::Text(collapse(text(value)?).to_lowercase())),
            Normalizer::CaseExact => Ok(NormValue::Text(collapse(text(value)?))),
            Normalizer::Integer => {
                let raw = text(value)?;
                let trimmed = raw.trim();
                trimmed
                    .parse::<i64>()
                    .map(NormValue::Num)
                    .map_err(|_| invalid(format!("not an INTEGER value: {trimmed:?}")))
            }
            Normalizer::NumericString => {
                let digits: String = text(value)?.chars().filter(|c| *c != ' ').collect();
                if digits.chars().all(|c| c.is_ascii_digit()) {
                    Ok(NormValue::Text(digits))
                } else {
                    Err(invalid("numeric string holds non-digit characters"))
                }
            }
            Normalizer::Boolean => match text(value)?.trim().to_ascii_uppercase().as_str() {
                "TRUE" => Ok(NormValue::Text("TRUE".into())),
                "FALSE" => Ok(NormValue::Text("FALSE".into())),
                other => Err(invalid(format!("not a BOOLEAN value: {other:?}"))),
            },
            Normalizer::TelephoneNumber => Ok(NormValue::Text(
                text(value)?
                    .chars()
                    .filter(|c| *c != ' ' && *c != '-')
                    .collect::<String>()
                    .to_lowercase(),
            )),
            Normalizer::GeneralizedTime => generalized_time(text(value)?),
            Normalizer::ObjectIdentifier => {
                Ok(NormValue::Text(text(value)?.trim().to_lowercase()))
            }
            Normalizer::DistinguishedName => {
                let dn = Dn::parse(text(value)?)?.normalize(schema)?;
                Ok(NormValue::Text(dn.norm().to_string()))
            }
            Normalizer::Uuid => Ok(NormValue::Text(text(value)?.trim().to_lowercase())),
            Normalizer::OctetString => Ok(NormValue::Bytes(value.as_bytes().to_vec())),
        }
    }
}

fn text(value: &ValueData) -> OpResult<&str> {
    value
        .as_str()
        .ok_or_else(|| invalid("binary value where the syntax expects text"))
}

fn invalid(message: impl Into<String>) -> OperationError {
    OperationError::new(LdapErrorKind::InvalidAttributeSyntax, message)
}

/// Trims and squashes internal whitespace runs down to one space.
fn collapse(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_gap = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            in_gap = true;
            continue;
        }
        if in_gap {
            out.push(' ');
            in_gap = false;
        }
        out.push(ch);
    }
    out
}

/// Canonicalizes a generalized-time string to `YYYYMMDDHHMMSS.mmmZ` UTC.
/// Offset forms are not accepted; the engine always stamps UTC.
fn generalized_time(raw: &str) -> OpResult<NormValue> {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_suffix(['Z', 'z']) else {
        return Err(invalid(format!("generalized time must end in Z: {trimmed:?}")));
    };

    let (seconds, fraction) = match body.split_once('.') {
        Some((sec, frac)) => (sec, frac),
        None => (body, ""),
    };
    if seconds.len() != 14 || !seconds.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("malformed generalized time: {trimmed:?}")));
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("malformed fraction: {trimmed:?}")));
    }

    let mut millis = 0u32;
    for (i, ch) in fraction.chars().take(3).enumerate() {
        millis += ch.to_digit(10).unwrap() * 10u32.pow(2 - i as u32);
    }

    chrono::NaiveDateTime::parse_from_str(seconds, "%Y%m%d%H%M%S")
        .map_err(|_| invalid(format!("impossible date in generalized time: {trimmed:?}")))?;

    Ok(NormValue::Text(format!("{seconds}.{millis:03}Z")))
}

pub mod oids {
    pub const OBJECT_IDENTIFIER_MATCH: &str = "2.5.13.0";
    pub const DISTINGUISHED_NAME_MATCH: &str = "2.5.13.1";
    pub const CASE_IGNORE_MATCH: &str = "2.5.13.2";
    pub const CASE_IGNORE_ORDERING_MATCH: &str = "2.5.13.3";
    pub const CASE_IGNORE_SUBSTRINGS_MATCH: &str = "2.5.13.4";
    pub const CASE_EXACT_MATCH: &str = "2.5.13.5";
    pub const NUMERIC_STRING_MATCH: &str = "2.5.13.8";
    pub const BOOLEAN_MATCH: &str = "2.5.13.13";
    pub const INTEGER_MATCH: &str = "2.5.13.14";
    pub const INTEGER_ORDERING_MATCH: &str = "2.5.13.15";
    pub const OCTET_STRING_MATCH: &str = "2.5.13.17";
    pub const TELEPHONE_NUMBER_MATCH: &str = "2.5.13.20";
    pub const GENERALIZED_TIME_MATCH: &str = "2.5.13.27";
    pub const GENERALIZED_TIME_ORDERING_MATCH: &str = "2.5.13.28";
    pub const CASE_IGNORE_IA5_MATCH: &str = "1.3.6.1.4.1.1466.109.114.2";
    pub const UUID_MATCH: &str = "1.3.6.1.1.16.2";
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::system::system_registries;

    #[test]
    fn test_case_ignore_collapses_and_folds() {
        let schema = system_registries();
        let normalized = Normalizer::CaseIgnore
            .normalize(&schema, &ValueData::Text("  First   Last ".into()))
            .unwrap();
        assert_eq!(normalized, NormValue::Text("first last".into()));
    }

    #[test]
    fn test_integer_normalizes_numerically() {
        let schema = system_registries();
        let ten = Normalizer::Integer
            .normalize(&schema, &ValueData::Text(" 10 ".into()))
            .unwrap();
        let nine = Normalizer::Integer
            .normalize(&schema, &ValueData::Text("9".into()))
            .unwrap();
        assert_eq!(ten, NormValue::Num(10));
        assert!(nine < ten, "numeric order, not lexicographic");
    }

    #[test]
    fn test_generalized_time_gets_a_canonical_fraction() {
        let schema = system_registries();
        let a = Normalizer::GeneralizedTime
            .normalize(&schema, &ValueData::Text("20240229120000Z".into()))
            .unwrap();
        let b = Normalizer::GeneralizedTime
            .normalize(&schema, &ValueData::Text("20240229120000.000Z".into()))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, NormValue::Text("20240229120000.000Z".into()));

        let bad = Normalizer::GeneralizedTime
            .normalize(&schema, &ValueData::Text("20240230120000Z".into()));
        assert!(bad.is_err(), "february 30th must be rejected");
    }
}
