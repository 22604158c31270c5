//! RFC 4515 filter-string parsing: `(attr=value)` prefix notation with `\XX`
//! escapes inside assertion values.

use smol_str::SmolStr;

use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::filter::Filter;
use crate::helpers::hex_pair;
use crate::value::{NormValue, Value, ValueData};

pub fn parse_filter(input: &str) -> OpResult<Filter> {
    let mut scanner = Scanner::new(input.trim());
    let filter = scanner.filter()?;
    if !scanner.at_end() {
        return Err(scanner.error("trailing input after filter"));
    }
    Ok(filter)
}

struct Scanner<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn expect(&mut self, expected: char) -> OpResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            other => Err(self.error(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn error(&self, detail: impl Into<String>) -> OperationError {
        OperationError::new(
            LdapErrorKind::OperationsError,
            format!("bad search filter {:?}: {}", self.input, detail.into()),
        )
    }

    fn filter(&mut self) -> OpResult<Filter> {
        self.expect('(')?;
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.children()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.children()?)
            }
            Some('!') => {
                self.pos += 1;
                Filter::not(self.filter()?)
            }
            Some(_) => self.simple()?,
            None => return Err(self.error("unterminated filter")),
        };
        self.expect(')')?;
        Ok(node)
    }

    fn children(&mut self) -> OpResult<Vec<Filter>> {
        let mut children = Vec::new();
        while self.peek() == Some('(') {
            children.push(self.filter()?);
        }
        Ok(children)
    }

    fn simple(&mut self) -> OpResult<Filter> {
        let attr = self.attribute_description()?;

        match self.peek() {
            Some(':') => self.extensible(attr),
            Some('>') => {
                self.pos += 1;
                self.expect('=')?;
                Ok(Filter::GreaterOrEqual {
                    attr: attr_name(attr, self)?,
                    value: self.assertion_value()?,
                })
            }
            Some('<') => {
                self.pos += 1;
                self.expect('=')?;
                Ok(Filter::LessOrEqual {
                    attr: attr_name(attr, self)?,
                    value: self.assertion_value()?,
                })
            }
            Some('~') => {
                self.pos += 1;
                self.expect('=')?;
                Ok(Filter::Approx {
                    attr: attr_name(attr, self)?,
                    value: self.assertion_value()?,
                })
            }
            Some('=') => {
                self.pos += 1;
                let attr = attr_name(attr, self)?;
                self.equality_or_substring(attr)
            }
            other => Err(self.error(format!("expected a comparison operator, found {other:?}"))),
        }
    }

    /// Everything up to the operator. May legitimately be empty for a
    /// typeless extensible match `(:rule:=v)`.
    fn attribute_description(&mut self) -> OpResult<Option<SmolStr>> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(if out.is_empty() {
            None
        } else {
            Some(SmolStr::from(out))
        })
    }

    fn extensible(&mut self, attr: Option<SmolStr>) -> OpResult<Filter> {
        self.expect(':')?;
        let mut dn_attributes = false;
        let mut rule = None;

        loop {
            match self.peek() {
                Some('=') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let word = self
                        .attribute_description()?
                        .ok_or_else(|| self.error("empty matching-rule id"))?;
                    if word.eq_ignore_ascii_case("dn") && !dn_attributes && rule.is_none() {
                        dn_attributes = true;
                    } else if rule.is_none() {
                        rule = Some(word);
                    } else {
                        return Err(self.error("too many matching-rule components"));
                    }
                    if self.peek() == Some(':') {
                        self.pos += 1;
                    }
                }
                None => return Err(self.error("unterminated extensible match")),
            }
        }

        if attr.is_none() && rule.is_none() {
            return Err(self.error("extensible match needs an attribute or a rule"));
        }

        Ok(Filter::Extensible {
            attr,
            rule,
            value: self.assertion_value()?,
            dn_attributes,
        })
    }

    fn equality_or_substring(&mut self, attr: SmolStr) -> OpResult<Filter> {
        // Split on unescaped '*' first; escapes decode per component, so a
        // \2a never becomes a wildcard.
        let mut components: Vec<String> = vec![String::new()];
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '*' => {
                    components.push(String::new());
                    self.pos += 1;
                }
                '(' => return Err(self.error("unescaped '(' in assertion value")),
                _ => {
                    components.last_mut().unwrap().push(c);
                    self.pos += 1;
                }
            }
        }

        if components.len() == 1 {
            // No wildcard at all, including the legal empty assertion `(attr=)`.
            return Ok(Filter::Equality {
                attr,
                value: plain(unescape(self, &components[0])?),
            });
        }

        if components.len() == 2 && components[0].is_empty() && components[1].is_empty() {
            return Ok(Filter::Present { attr });
        }

        let last = components.len() - 1;
        let mut initial = None;
        let mut fin = None;
        let mut any = Vec::new();
        for (i, component) in components.iter().enumerate() {
            if component.is_empty() {
                continue;
            }
            let value = plain(unescape(self, component)?);
            if i == 0 {
                initial = Some(value);
            } else if i == last {
                fin = Some(value);
            } else {
                any.push(value);
            }
        }

        Ok(Filter::Substring {
            attr,
            initial,
            any,
            fin,
        })
    }

    fn assertion_value(&mut self) -> OpResult<Value> {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '(' | '*' => {
                    return Err(self.error(format!("unescaped {c:?} in assertion value")));
                }
                _ => {
                    raw.push(c);
                    self.pos += 1;
                }
            }
        }
        Ok(plain(unescape(self, &raw)?))
    }
}

fn attr_name(attr: Option<SmolStr>, scanner: &Scanner<'_>) -> OpResult<SmolStr> {
    attr.ok_or_else(|| scanner.error("missing attribute description"))
}

fn unescape(scanner: &Scanner<'_>, raw: &str) -> OpResult<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let hi = chars
                .next()
                .ok_or_else(|| scanner.error("dangling escape"))?;
            let lo = chars
                .next()
                .ok_or_else(|| scanner.error("incomplete escape"))?;
            out.push(hex_pair(hi, lo).ok_or_else(|| scanner.error("bad hex escape"))?);
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    Ok(out)
}

fn plain(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => {
            let norm = NormValue::Text(text.clone());
            Value::new(ValueData::Text(text), norm)
        }
        Err(err) => Value::bytes(err.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_equality_and_present() {
        assert_eq!(
            parse_filter("(ou=system)").unwrap(),
            Filter::equality("ou", "system")
        );
        assert_eq!(parse_filter("(cn=*)").unwrap(), Filter::present("cn"));
    }

    #[test]
    fn test_no_wildcards_means_equality_not_substring() {
        let filter = parse_filter("(cn=abc)").unwrap();
        assert!(matches!(filter, Filter::Equality { .. }));
    }

    #[test]
    fn test_substring_shapes() {
        let filter = parse_filter("(cn=ini*a*b*fin)").unwrap();
        let Filter::Substring {
            initial, any, fin, ..
        } = filter
        else {
            panic!("expected a substring node");
        };
        assert_eq!(initial.unwrap().user_str(), Some("ini"));
        assert_eq!(any.len(), 2);
        assert_eq!(fin.unwrap().user_str(), Some("fin"));

        let prefix = parse_filter("(cn=abc*)").unwrap();
        let Filter::Substring { initial, any, fin, .. } = prefix else {
            panic!("expected a substring node");
        };
        assert!(initial.is_some() && any.is_empty() && fin.is_none());
    }

    #[test]
    fn test_branches() {
        let filter = parse_filter("(&(objectClass=person)(|(cn=a)(cn=b))(!(uid=x)))").unwrap();
        let Filter::And(children) = filter else {
            panic!("expected a conjunction");
        };
        assert_eq!(children.len(), 3);
        assert!(matches!(children[1], Filter::Or(_)));
        assert!(matches!(children[2], Filter::Not(_)));
    }

    #[test]
    fn test_comparisons_and_approx() {
        assert!(matches!(
            parse_filter("(uidNumber>=5)").unwrap(),
            Filter::GreaterOrEqual { .. }
        ));
        assert!(matches!(
            parse_filter("(uidNumber<=5)").unwrap(),
            Filter::LessOrEqual { .. }
        ));
        assert!(matches!(
            parse_filter("(cn~=kim)").unwrap(),
            Filter::Approx { .. }
        ));
    }

    #[test]
    fn test_escapes_decode() {
        let filter = parse_filter(r"(cn=a\2ab)").unwrap();
        let Filter::Equality { value, .. } = filter else {
            panic!("escaped star is not a wildcard");
        };
        assert_eq!(value.user_str(), Some("a*b"));

        let filter = parse_filter(r"(cn=paren\28\29)").unwrap();
        let Filter::Equality { value, .. } = filter else {
            panic!();
        };
        assert_eq!(value.user_str(), Some("paren()"));
    }

    #[test]
    fn test_extensible_forms() {
        let f = parse_filter("(cn:caseExactMatch:=Kim)").unwrap();
        let Filter::Extensible { attr, rule, dn_attributes, .. } = f else {
            panic!();
        };
        assert_eq!(attr.as_deref(), Some("cn"));
        assert_eq!(rule.as_deref(), Some("caseExactMatch"));
        assert!(!dn_attributes);

        let f = parse_filter("(ou:dn:=system)").unwrap();
        let Filter::Extensible { dn_attributes, .. } = f else {
            panic!();
        };
        assert!(dn_attributes);
    }

    #[test]
    fn test_rejects_malformed_filters() {
        assert!(parse_filter("(cn=a").is_err());
        assert!(parse_filter("cn=a").is_err());
        assert!(parse_filter("(=a)").is_err());
        assert!(parse_filter("(cn=a)(cn=b)").is_err());
        assert!(parse_filter("(cn>=a*)").is_err());
    }
}
