//! The DN string grammar: RFC 2253 with the usual extensions. `;` is an
//! accepted separator and parses like `,`; `#hex` values decode to bytes;
//! `\HH` escapes any byte.

use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::helpers::hex_pair;
use crate::value::ValueData;

/// One type=value component, still untouched by the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAva {
    pub attr: String,
    pub value: ValueData,
}

/// Parses a full DN into its RDNs, most specific first. Each RDN comes with
/// the exact slice of the input it was read from.
pub fn parse_dn(input: &str) -> OpResult<Vec<(Vec<ParsedAva>, String)>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut scanner = Scanner::new(input);
    let mut rdns = Vec::new();
    loop {
        rdns.push(scanner.rdn()?);
        match scanner.bump() {
            None => break,
            Some(',') | Some(';') => {
                if scanner.at_end() {
                    return Err(syntax_error(input, "DN ends in a separator"));
                }
            }
            Some(other) => {
                return Err(syntax_error(
                    input,
                    format!("unexpected character {other:?} between RDNs"),
                ));
            }
        }
    }
    Ok(rdns)
}

/// Parses a single RDN; trailing input is an error.
pub fn parse_rdn(input: &str) -> OpResult<(Vec<ParsedAva>, String)> {
    let mut scanner = Scanner::new(input);
    let rdn = scanner.rdn()?;
    if !scanner.at_end() {
        return Err(syntax_error(input, "trailing input after RDN"));
    }
    Ok(rdn)
}

fn syntax_error(input: &str, detail: impl Into<String>) -> OperationError {
    OperationError::new(
        LdapErrorKind::InvalidDnSyntax,
        format!("{}: {:?}", detail.into(), input),
    )
}

struct Scanner<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn byte_pos(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.input.len(), |(i, _)| *i)
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn error(&self, detail: impl Into<String>) -> OperationError {
        syntax_error(self.input, detail)
    }

    fn rdn(&mut self) -> OpResult<(Vec<ParsedAva>, String)> {
        self.skip_spaces();
        let start = self.byte_pos();
        let mut avas = vec![self.ava()?];
        while self.peek() == Some('+') {
            self.pos += 1;
            avas.push(self.ava()?);
        }
        let end = self.byte_pos();
        Ok((avas, self.input[start..end].trim().to_string()))
    }

    fn ava(&mut self) -> OpResult<ParsedAva> {
        self.skip_spaces();
        let attr = self.attribute_type()?;
        self.skip_spaces();
        if self.bump() != Some('=') {
            return Err(self.error(format!("expected '=' after attribute type {attr:?}")));
        }
        self.skip_spaces();
        let value = self.value()?;
        Ok(ParsedAva { attr, value })
    }

    fn attribute_type(&mut self) -> OpResult<String> {
        let mut out = String::new();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        out.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            Some(c) if c.is_ascii_digit() => {
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        out.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            _ => return Err(self.error("expected an attribute type")),
        }
        Ok(out)
    }

    fn value(&mut self) -> OpResult<ValueData> {
        match self.peek() {
            Some('#') => {
                self.pos += 1;
                self.hex_value()
            }
            Some('"') => {
                self.pos += 1;
                self.quoted_value()
            }
            _ => self.plain_value(),
        }
    }

    fn hex_value(&mut self) -> OpResult<ValueData> {
        let mut bytes = Vec::new();
        while let Some(c) = self.peek() {
            if matches!(c, ',' | ';' | '+') {
                break;
            }
            let hi = self.bump().unwrap();
            let lo = self
                .bump()
                .ok_or_else(|| self.error("odd number of digits in #hex value"))?;
            let byte =
                hex_pair(hi, lo).ok_or_else(|| self.error("bad digit in #hex value"))?;
            bytes.push(byte);
        }
        if bytes.is_empty() {
            return Err(self.error("empty #hex value"));
        }
        Ok(ValueData::Bytes(bytes))
    }

    fn quoted_value(&mut self) -> OpResult<ValueData> {
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated quoted value")),
                Some('"') => break,
                Some('\\') => self.escape(&mut bytes)?,
                Some(c) => push_char(&mut bytes, c),
            }
        }
        Ok(into_value(bytes))
    }

    fn plain_value(&mut self) -> OpResult<ValueData> {
        let mut bytes = Vec::new();
        // Unescaped trailing spaces are insignificant; they are buffered and
        // only committed when something follows them.
        let mut pending_spaces = 0usize;
        loop {
            match self.peek() {
                None | Some(',') | Some(';') | Some('+') => break,
                Some('\\') => {
                    flush_spaces(&mut bytes, &mut pending_spaces);
                    self.pos += 1;
                    self.escape(&mut bytes)?;
                }
                Some(' ') => {
                    pending_spaces += 1;
                    self.pos += 1;
                }
                Some(c) => {
                    flush_spaces(&mut bytes, &mut pending_spaces);
                    push_char(&mut bytes, c);
                    self.pos += 1;
                }
            }
        }
        Ok(into_value(bytes))
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> OpResult<()> {
        let first = self
            .bump()
            .ok_or_else(|| self.error("dangling escape at end of value"))?;
        if first.is_ascii_hexdigit() {
            let second = self
                .bump()
                .ok_or_else(|| self.error("incomplete hex escape"))?;
            let byte =
                hex_pair(first, second).ok_or_else(|| self.error("bad hex escape"))?;
            out.push(byte);
        } else {
            push_char(out, first);
        }
        Ok(())
    }
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn flush_spaces(out: &mut Vec<u8>, pending: &mut usize) {
    for _ in 0..*pending {
        out.push(b' ');
    }
    *pending = 0;
}

fn into_value(bytes: Vec<u8>) -> ValueData {
    match String::from_utf8(bytes) {
        Ok(text) => ValueData::Text(text),
        Err(err) => ValueData::Bytes(err.into_bytes()),
    }
}

/// Escapes a normalized value for embedding in a DN string, so the canonical
/// form parses back to itself.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            ' ' if i == 0 || i == last => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_simple_dn() {
        let rdns = parse_dn("uid=admin,ou=system").unwrap();
        assert_eq!(rdns.len(), 2);
        assert_eq!(rdns[0].0[0].attr, "uid");
        assert_eq!(rdns[0].0[0].value, ValueData::Text("admin".into()));
        assert_eq!(rdns[1].1, "ou=system");
    }

    #[test]
    fn test_semicolon_is_a_separator() {
        let rdns = parse_dn("cn=a;ou=b").unwrap();
        assert_eq!(rdns.len(), 2);
    }

    #[test]
    fn test_multi_valued_rdn() {
        let rdns = parse_dn("cn=Kim+sn=Doe,ou=users").unwrap();
        assert_eq!(rdns[0].0.len(), 2);
        assert_eq!(rdns[0].0[1].attr, "sn");
    }

    #[test]
    fn test_escapes() {
        let rdns = parse_dn(r"cn=Doe\, Kim,ou=users").unwrap();
        assert_eq!(rdns[0].0[0].value, ValueData::Text("Doe, Kim".into()));

        let rdns = parse_dn(r"cn=\23tag").unwrap();
        assert_eq!(rdns[0].0[0].value, ValueData::Text("#tag".into()));
    }

    #[test]
    fn test_hex_value() {
        let rdns = parse_dn("cn=#414243").unwrap();
        assert_eq!(rdns[0].0[0].value, ValueData::Bytes(vec![0x41, 0x42, 0x43]));
    }

    #[test]
    fn test_insignificant_spaces() {
        let rdns = parse_dn("  ou = system  ").unwrap();
        assert_eq!(rdns[0].0[0].value, ValueData::Text("system".into()));

        let rdns = parse_dn(r"cn=trailing\ ").unwrap();
        assert_eq!(rdns[0].0[0].value, ValueData::Text("trailing ".into()));
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(parse_dn(",ou=system").is_err());
        assert!(parse_dn("ou=system,").is_err());
        assert!(parse_dn("ou system").is_err());
        assert!(parse_dn("=x").is_err());
        assert!(parse_dn("cn=a,,cn=b").is_err());
    }

    #[test]
    fn test_empty_input_is_the_root_dse() {
        assert_eq!(parse_dn("").unwrap().len(), 0);
        assert_eq!(parse_dn("   ").unwrap().len(), 0);
    }
}
