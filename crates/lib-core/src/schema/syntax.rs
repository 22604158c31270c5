use smol_str::SmolStr;

/// An attribute syntax. The `human_readable` flag decides whether values are
/// carried as text or bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub oid: SmolStr,
    pub name: SmolStr,
    pub human_readable: bool,
}

impl Syntax {
    pub fn new(oid: &str, name: &str, human_readable: bool) -> Self {
        Self {
            oid: oid.into(),
            name: name.into(),
            human_readable,
        }
    }
}

pub mod oids {
    pub const BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
    pub const DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
    pub const DIRECTORY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.15";
    pub const GENERALIZED_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.24";
    pub const IA5_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.26";
    pub const INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
    pub const NUMERIC_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.36";
    pub const OID: &str = "1.3.6.1.4.1.1466.115.121.1.38";
    pub const OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";
    pub const SUBTREE_SPECIFICATION: &str = "1.3.6.1.4.1.1466.115.121.1.45";
    pub const TELEPHONE_NUMBER: &str = "1.3.6.1.4.1.1466.115.121.1.50";
    pub const UUID: &str = "1.3.6.1.1.16.1";
}
