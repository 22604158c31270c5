pub mod parser;
pub mod rewriter;

use std::fmt;

use smol_str::SmolStr;

use crate::value::{NormValue, Value};

/// The search-filter tree. Leaves carry the attribute description as the
/// client sent it until [`rewriter::rewrite`] resolves it to an OID and
/// normalizes the assertion values.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Present {
        attr: SmolStr,
    },
    Equality {
        attr: SmolStr,
        value: Value,
    },
    GreaterOrEqual {
        attr: SmolStr,
        value: Value,
    },
    LessOrEqual {
        attr: SmolStr,
        value: Value,
    },
    Approx {
        attr: SmolStr,
        value: Value,
    },
    Substring {
        attr: SmolStr,
        initial: Option<Value>,
        any: Vec<Value>,
        fin: Option<Value>,
    },
    Extensible {
        attr: Option<SmolStr>,
        rule: Option<SmolStr>,
        value: Value,
        dn_attributes: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn and(children: Vec<Filter>) -> Filter {
        Filter::And(children)
    }

    pub fn or(children: Vec<Filter>) -> Filter {
        Filter::Or(children)
    }

    pub fn not(child: Filter) -> Filter {
        Filter::Not(Box::new(child))
    }

    pub fn equality(attr: &str, value: &str) -> Filter {
        Filter::Equality {
            attr: attr.into(),
            value: Value::plain(value),
        }
    }

    pub fn present(attr: &str) -> Filter {
        Filter::Present { attr: attr.into() }
    }

    /// The attribute a leaf asserts on, `None` for branches and typeless
    /// extensible matches.
    pub fn attr(&self) -> Option<&SmolStr> {
        match self {
            Filter::Present { attr }
            | Filter::Equality { attr, .. }
            | Filter::GreaterOrEqual { attr, .. }
            | Filter::LessOrEqual { attr, .. }
            | Filter::Approx { attr, .. }
            | Filter::Substring { attr, .. } => Some(attr),
            Filter::Extensible { attr, .. } => attr.as_ref(),
            _ => None,
        }
    }
}

/// RFC 4515 escaping for assertion values rendered back into filter strings.
fn escape_assertion(out: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    let rendered = match value.norm() {
        NormValue::Num(n) => n.to_string(),
        _ => value.to_string(),
    };
    for c in rendered.chars() {
        match c {
            '\0' => write!(out, "\\00")?,
            '(' => write!(out, "\\28")?,
            ')' => write!(out, "\\29")?,
            '*' => write!(out, "\\2a")?,
            '\\' => write!(out, "\\5c")?,
            c => write!(out, "{c}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Present { attr } => write!(f, "({attr}=*)"),
            Filter::Equality { attr, value } => {
                write!(f, "({attr}=")?;
                escape_assertion(f, value)?;
                write!(f, ")")
            }
            Filter::GreaterOrEqual { attr, value } => {
                write!(f, "({attr}>=")?;
                escape_assertion(f, value)?;
                write!(f, ")")
            }
            Filter::LessOrEqual { attr, value } => {
                write!(f, "({attr}<=")?;
                escape_assertion(f, value)?;
                write!(f, ")")
            }
            Filter::Approx { attr, value } => {
                write!(f, "({attr}~=")?;
                escape_assertion(f, value)?;
                write!(f, ")")
            }
            Filter::Substring {
                attr,
                initial,
                any,
                fin,
            } => {
                write!(f, "({attr}=")?;
                if let Some(initial) = initial {
                    escape_assertion(f, initial)?;
                }
                write!(f, "*")?;
                for component in any {
                    escape_assertion(f, component)?;
                    write!(f, "*")?;
                }
                if let Some(fin) = fin {
                    escape_assertion(f, fin)?;
                }
                write!(f, ")")
            }
            Filter::Extensible {
                attr,
                rule,
                value,
                dn_attributes,
            } => {
                write!(f, "(")?;
                if let Some(attr) = attr {
                    write!(f, "{attr}")?;
                }
                if *dn_attributes {
                    write!(f, ":dn")?;
                }
                if let Some(rule) = rule {
                    write!(f, ":{rule}")?;
                }
                write!(f, ":=")?;
                escape_assertion(f, value)?;
                write!(f, ")")
            }
            Filter::And(children) => {
                write!(f, "(&")?;
                for child in children {
                    child.fmt(f)?;
                }
                write!(f, ")")
            }
            Filter::Or(children) => {
                write!(f, "(|")?;
                for child in children {
                    child.fmt(f)?;
                }
                write!(f, ")")
            }
            Filter::Not(child) => write!(f, "(!{child})"),
        }
    }
}
