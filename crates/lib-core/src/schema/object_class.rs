use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectClass {
    pub oid: SmolStr,
    pub names: Vec<SmolStr>,
    pub kind: ObjectClassKind,
    pub superior: Vec<SmolStr>,
    pub must: Vec<SmolStr>,
    pub may: Vec<SmolStr>,
}

impl ObjectClass {
    pub fn new(oid: &str, name: &str, kind: ObjectClassKind) -> Self {
        Self {
            oid: oid.into(),
            names: vec![name.into()],
            kind,
            superior: Vec::new(),
            must: Vec::new(),
            may: Vec::new(),
        }
    }

    pub fn superior(mut self, name: &str) -> Self {
        self.superior.push(name.into());
        self
    }

    pub fn must(mut self, names: &[&str]) -> Self {
        self.must.extend(names.iter().map(|n| SmolStr::from(*n)));
        self
    }

    pub fn may(mut self, names: &[&str]) -> Self {
        self.may.extend(names.iter().map(|n| SmolStr::from(*n)));
        self
    }

    pub fn preferred_name(&self) -> &SmolStr {
        self.names.first().unwrap_or(&self.oid)
    }
}
