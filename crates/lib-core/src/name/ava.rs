use smol_str::SmolStr;

use crate::errors::OpResult;
use crate::name::parser::{ParsedAva, escape_value};
use crate::schema::Registries;
use crate::value::{NormValue, Value, ValueData};

/// One attribute-type-and-value pair of an RDN. Carries the type as the user
/// wrote it plus the canonical type (the OID, once schema normalization has
/// run) and both value forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    attr: SmolStr,
    attr_norm: SmolStr,
    value: Value,
}

impl Ava {
    pub fn new(attr: &str, value: ValueData) -> Self {
        let norm = match &value {
            ValueData::Text(s) => NormValue::Text(s.clone()),
            ValueData::Bytes(b) => NormValue::Bytes(b.clone()),
        };
        Self {
            attr_norm: SmolStr::from(attr.trim().to_lowercase()),
            attr: SmolStr::from(attr.trim()),
            value: Value::new(value, norm),
        }
    }

    pub(crate) fn from_parsed(parsed: ParsedAva) -> Self {
        Self::new(&parsed.attr, parsed.value)
    }

    /// Resolves the type to its OID and runs the value through the type's
    /// equality normalizer. Fails with `UndefinedAttributeType` when the
    /// schema does not know the type; the caller decides whether to keep the
    /// structural form instead.
    pub fn normalize(&self, schema: &Registries) -> OpResult<Ava> {
        let attr_type = schema.attribute_type(&self.attr)?;
        let value = schema.normalize_value(&attr_type, self.value.user().clone())?;
        Ok(Ava {
            attr: self.attr.clone(),
            attr_norm: attr_type.oid.clone(),
            value,
        })
    }

    pub fn attr(&self) -> &SmolStr {
        &self.attr
    }

    pub fn attr_norm(&self) -> &SmolStr {
        &self.attr_norm
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The `type=value` fragment of the canonical RDN string. Binary values
    /// render in `#hex` form, which parses back to the same bytes.
    pub(crate) fn norm_fragment(&self) -> String {
        let rendered = match self.value.norm() {
            NormValue::Text(s) => escape_value(s),
            NormValue::Num(n) => n.to_string(),
            NormValue::Bytes(b) => hex_form(b),
        };
        format!("{}={rendered}", self.attr_norm)
    }

    /// The `type=value` fragment in user form, for composed DNs.
    pub(crate) fn user_fragment(&self) -> String {
        let rendered = match self.value.user() {
            ValueData::Text(s) => escape_value(s),
            ValueData::Bytes(b) => hex_form(b),
        };
        format!("{}={rendered}", self.attr)
    }
}

fn hex_form(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2 + 1);
    out.push('#');
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
