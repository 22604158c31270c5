use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeUsage {
    UserApplications,
    DirectoryOperation,
}

/// An attribute type definition. `equality`, `ordering` and `substring` name
/// matching rules by OID; `superior` names the parent type an attribute
/// polymorphically answers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    pub oid: SmolStr,
    pub names: Vec<SmolStr>,
    pub syntax: SmolStr,
    pub equality: Option<SmolStr>,
    pub ordering: Option<SmolStr>,
    pub substring: Option<SmolStr>,
    pub superior: Option<SmolStr>,
    pub single_value: bool,
    pub collective: bool,
    pub no_user_modification: bool,
    pub usage: AttributeUsage,
}

impl AttributeType {
    pub fn new(oid: &str, names: &[&str], syntax: &str) -> Self {
        Self {
            oid: oid.into(),
            names: names.iter().map(|n| SmolStr::from(*n)).collect(),
            syntax: syntax.into(),
            equality: None,
            ordering: None,
            substring: None,
            superior: None,
            single_value: false,
            collective: false,
            no_user_modification: false,
            usage: AttributeUsage::UserApplications,
        }
    }

    pub fn equality(mut self, rule_oid: &str) -> Self {
        self.equality = Some(rule_oid.into());
        self
    }

    pub fn ordering(mut self, rule_oid: &str) -> Self {
        self.ordering = Some(rule_oid.into());
        self
    }

    pub fn substring(mut self, rule_oid: &str) -> Self {
        self.substring = Some(rule_oid.into());
        self
    }

    pub fn superior(mut self, oid: &str) -> Self {
        self.superior = Some(oid.into());
        self
    }

    pub fn single_value(mut self) -> Self {
        self.single_value = true;
        self
    }

    pub fn collective(mut self) -> Self {
        self.collective = true;
        self
    }

    pub fn operational(mut self) -> Self {
        self.usage = AttributeUsage::DirectoryOperation;
        self.no_user_modification = true;
        self
    }

    /// directoryOperation usage without the no-user-modification bit, for
    /// operational types clients are allowed to write (`collectiveExclusions`,
    /// `administrativeRole`).
    pub fn usage_operational(mut self) -> Self {
        self.usage = AttributeUsage::DirectoryOperation;
        self
    }

    /// The name clients see in results; the first registered name, falling
    /// back to the OID.
    pub fn preferred_name(&self) -> &SmolStr {
        self.names.first().unwrap_or(&self.oid)
    }

    pub fn is_operational(&self) -> bool {
        self.usage == AttributeUsage::DirectoryOperation
    }
}
