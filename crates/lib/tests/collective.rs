//! Collective attributes: inheritance from subentries, exclusions, and the
//! polymorphic return rules.

use pretty_assertions::assert_eq;
use warren_lib::config::DirectoryConfig;
use warren_lib::service::DirectoryService;
use warren_lib_core::entry::{Entry, Modification};
use warren_lib_core::errors::LdapErrorKind;

const C_OU: &str = "2.5.4.11.1";

fn service() -> DirectoryService {
    DirectoryService::new(DirectoryConfig::default()).expect("service boots")
}

fn add_collective_subentry(service: &DirectoryService, name: &str, value: &str) {
    let session = service.admin_session();
    service
        .add(
            &session,
            &format!("cn={name},ou=system"),
            &[
                ("objectClass", &["top", "subentry", "collectiveAttributeSubentry"]),
                ("cn", &[name]),
                ("subtreeSpecification", &[r#"{ base "ou=configuration" }"#]),
                ("c-ou", &[value]),
            ],
        )
        .unwrap();
}

fn c_ou_values(entry: &Entry) -> Vec<String> {
    entry
        .attribute(C_OU)
        .map(|attr| {
            attr.values()
                .iter()
                .filter_map(|v| v.user_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn test_inheritance_exclusion_and_a_second_subentry() {
    let service = service();
    let session = service.admin_session();
    add_collective_subentry(&service, "collective", "configuration");

    // Everything in the selected region inherits c-ou.
    let entry = service
        .lookup(&session, "ou=services,ou=configuration,ou=system", None)
        .unwrap();
    assert_eq!(c_ou_values(&entry), vec!["configuration"]);

    // Excluding c-ou turns it off for that entry alone.
    service
        .modify(
            &session,
            "ou=services,ou=configuration,ou=system",
            vec![Modification::add("collectiveExclusions", &["c-ou"])],
        )
        .unwrap();
    let entry = service
        .lookup(&session, "ou=services,ou=configuration,ou=system", None)
        .unwrap();
    assert_eq!(c_ou_values(&entry), Vec::<String>::new());

    let sibling = service
        .lookup(&session, "ou=interceptors,ou=configuration,ou=system", None)
        .unwrap();
    assert_eq!(c_ou_values(&sibling), vec!["configuration"]);

    // A second subentry adds its value alongside the first.
    add_collective_subentry(&service, "collective2", "configuration2");
    let sibling = service
        .lookup(&session, "ou=interceptors,ou=configuration,ou=system", None)
        .unwrap();
    let mut values = c_ou_values(&sibling);
    values.sort();
    assert_eq!(values, vec!["configuration", "configuration2"]);
}

#[test]
fn test_exclude_all_sentinel() {
    let service = service();
    let session = service.admin_session();
    add_collective_subentry(&service, "collective", "configuration");

    service
        .modify(
            &session,
            "ou=interceptors,ou=configuration,ou=system",
            vec![Modification::add(
                "collectiveExclusions",
                &["excludeAllCollectiveAttributes"],
            )],
        )
        .unwrap();
    let entry = service
        .lookup(&session, "ou=interceptors,ou=configuration,ou=system", None)
        .unwrap();
    assert_eq!(c_ou_values(&entry), Vec::<String>::new());
}

#[test]
fn test_entries_outside_the_region_inherit_nothing() {
    let service = service();
    let session = service.admin_session();
    add_collective_subentry(&service, "collective", "configuration");

    let entry = service.lookup(&session, "ou=users,ou=system", None).unwrap();
    assert_eq!(c_ou_values(&entry), Vec::<String>::new());
}

#[test]
fn test_requested_attribute_projection() {
    let service = service();
    let session = service.admin_session();
    add_collective_subentry(&service, "collective", "configuration");

    // A list that names neither c-ou nor a supertype keeps it out.
    let entry = service
        .lookup(
            &session,
            "ou=services,ou=configuration,ou=system",
            Some(&["objectClass"]),
        )
        .unwrap();
    assert_eq!(c_ou_values(&entry), Vec::<String>::new());

    // Requesting the supertype ou produces the collective subtype too.
    let entry = service
        .lookup(
            &session,
            "ou=services,ou=configuration,ou=system",
            Some(&["ou"]),
        )
        .unwrap();
    assert_eq!(c_ou_values(&entry), vec!["configuration"]);
    assert!(entry.attribute("2.5.4.11").is_some(), "ou itself comes back");
}

#[test]
fn test_direct_collective_writes_are_refused() {
    let service = service();
    let session = service.admin_session();

    let err = service
        .add(
            &session,
            "ou=illegal,ou=system",
            &[
                ("objectClass", &["top", "organizationalUnit", "extensibleObject"]),
                ("ou", &["illegal"]),
                ("c-ou", &["nope"]),
            ],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::ObjectClassViolation);

    let err = service
        .modify(
            &session,
            "ou=users,ou=system",
            vec![Modification::add("c-ou", &["nope"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::ObjectClassViolation);
}
