//! The line-oriented entry interchange format: `dn:` leaders, `attr: value`
//! lines, `::` for base64, folding on a leading space, `#` comments, blank
//! lines between records. Partitions bootstrap from it and dump back to it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use smol_str::SmolStr;

use crate::entry::Entry;
use crate::errors::{LdapErrorKind, OpResult, OperationError};
use crate::value::ValueData;

/// One parsed record: the DN line plus raw attribute/value pairs, untouched
/// by the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct LdifRecord {
    pub dn: String,
    pub attrs: Vec<(SmolStr, ValueData)>,
}

pub fn parse(input: &str) -> OpResult<Vec<LdifRecord>> {
    let mut records = Vec::new();
    for (leader, lines) in fold_records(input)? {
        let mut attrs = Vec::new();
        for line in lines {
            let (attr, value) = split_line(&line)?;
            if attr.eq_ignore_ascii_case("changetype") {
                return Err(OperationError::new(
                    LdapErrorKind::UnwillingToPerform,
                    "change records are not accepted, only content records",
                ));
            }
            attrs.push((attr, value));
        }
        records.push(LdifRecord { dn: leader, attrs });
    }
    Ok(records)
}

/// Splits folded input into records, each a DN plus its attribute lines.
fn fold_records(input: &str) -> OpResult<Vec<(String, Vec<String>)>> {
    let mut logical: Vec<String> = Vec::new();
    let mut records = Vec::new();
    let mut first_line = true;

    let mut flush = |lines: &mut Vec<String>| -> OpResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let leader = lines.remove(0);
        let Some(dn) = parse_dn_line(&leader)? else {
            return Err(ldif_error(format!("record does not start with dn: {leader:?}")));
        };
        records.push((dn, std::mem::take(lines)));
        Ok(())
    };

    for raw in input.lines() {
        if raw.starts_with('#') {
            continue;
        }
        if raw.is_empty() {
            flush(&mut logical)?;
            continue;
        }
        if let Some(rest) = raw.strip_prefix(' ') {
            match logical.last_mut() {
                Some(last) => last.push_str(rest),
                None => return Err(ldif_error("continuation line with nothing to continue")),
            }
            continue;
        }
        if first_line && raw.to_ascii_lowercase().starts_with("version:") {
            first_line = false;
            continue;
        }
        first_line = false;
        logical.push(raw.to_string());
    }
    flush(&mut logical)?;
    Ok(records)
}

fn parse_dn_line(line: &str) -> OpResult<Option<String>> {
    if let Some(b64) = line.strip_prefix("dn::") {
        let bytes = BASE64
            .decode(b64.trim())
            .map_err(|_| ldif_error("bad base64 in dn line"))?;
        let dn = String::from_utf8(bytes).map_err(|_| ldif_error("dn is not UTF-8"))?;
        return Ok(Some(dn));
    }
    if let Some(dn) = line.strip_prefix("dn:") {
        return Ok(Some(dn.trim().to_string()));
    }
    Ok(None)
}

fn split_line(line: &str) -> OpResult<(SmolStr, ValueData)> {
    let colon = line
        .find(':')
        .ok_or_else(|| ldif_error(format!("attribute line without a colon: {line:?}")))?;
    let attr = SmolStr::from(line[..colon].trim());
    if attr.is_empty() {
        return Err(ldif_error(format!("empty attribute name: {line:?}")));
    }
    let rest = &line[colon + 1..];
    if let Some(b64) = rest.strip_prefix(':') {
        let bytes = BASE64
            .decode(b64.trim())
            .map_err(|_| ldif_error(format!("bad base64 value for {attr}")))?;
        let value = match String::from_utf8(bytes) {
            Ok(text) => ValueData::Text(text),
            Err(err) => ValueData::Bytes(err.into_bytes()),
        };
        return Ok((attr, value));
    }
    if rest.starts_with('<') {
        return Err(ldif_error("URL values are not supported"));
    }
    Ok((attr, ValueData::Text(rest.trim_start().to_string())))
}

fn ldif_error(message: impl Into<String>) -> OperationError {
    OperationError::new(LdapErrorKind::OperationsError, message)
}

/// Serializes one entry. Values that are not safe as plain text go out
/// base64 on a `::` line.
pub fn to_ldif(entry: &Entry) -> String {
    let mut out = format!("dn: {}\n", entry.dn());
    for attr in entry.attributes() {
        let name = attr.attr_type().preferred_name();
        for value in attr.values() {
            match value.user() {
                ValueData::Text(text) if is_safe(text) => {
                    out.push_str(&format!("{name}: {text}\n"));
                }
                data => {
                    out.push_str(&format!("{name}:: {}\n", BASE64.encode(data.as_bytes())));
                }
            }
        }
    }
    out
}

/// RFC 2849 SAFE-STRING: printable ASCII, no leading space/colon/less-than.
fn is_safe(text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    let first = text.as_bytes()[0];
    if first == b' ' || first == b':' || first == b'<' {
        return false;
    }
    text.bytes().all(|b| (0x20..0x7f).contains(&b)) && !text.ends_with(' ')
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = "\
version: 1
# the system context
dn: ou=system
objectClass: top
objectClass: organizationalUnit
ou: system

dn: uid=admin,ou=system
objectClass: inetOrgPerson
uid: admin
userPassword:: c2VjcmV0
description: the administrative
 user account
";

    #[test]
    fn test_parse_records() {
        let records = parse(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dn, "ou=system");
        assert_eq!(records[0].attrs.len(), 3);

        let admin = &records[1];
        assert_eq!(admin.dn, "uid=admin,ou=system");
        assert_eq!(
            admin.attrs[2],
            ("userPassword".into(), ValueData::Text("secret".into()))
        );
        // The folded line reassembles.
        assert_eq!(
            admin.attrs[3],
            (
                "description".into(),
                ValueData::Text("the administrative user account".into())
            )
        );
    }

    #[test]
    fn test_change_records_are_refused() {
        let err = parse("dn: ou=x\nchangetype: delete\n").unwrap_err();
        assert_eq!(err.kind, LdapErrorKind::UnwillingToPerform);
    }

    #[test]
    fn test_missing_dn_leader_is_an_error() {
        assert!(parse("ou: system\n").is_err());
    }

    #[test]
    fn test_round_trip_through_an_entry() {
        use crate::name::Dn;
        use crate::schema::system::system_registries;

        let schema = system_registries();
        let dn = Dn::parse("ou=system").unwrap().normalize(&schema).unwrap();
        let entry = Entry::with_attrs(
            &schema,
            dn,
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["system"])],
        )
        .unwrap();

        let dumped = to_ldif(&entry);
        let records = parse(&dumped).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attrs.len(), 3);
    }
}
