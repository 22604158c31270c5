//! End-to-end operation tests against a freshly bootstrapped service.

use pretty_assertions::assert_eq;
use warren_lib::config::DirectoryConfig;
use warren_lib::context::SearchScope;
use warren_lib::search::filtering::drain;
use warren_lib::service::{DirectoryService, SearchRequest};
use warren_lib_core::entry::Modification;
use warren_lib_core::errors::LdapErrorKind;

fn service() -> DirectoryService {
    DirectoryService::new(DirectoryConfig::default()).expect("service boots")
}

#[test]
fn test_bootstrap_creates_the_administrative_entries() {
    let service = service();
    for dn in [
        "ou=system",
        "uid=admin,ou=system",
        "ou=users,ou=system",
        "ou=groups,ou=system",
        "cn=Administrators,ou=groups,ou=system",
        "ou=configuration,ou=system",
        "ou=services,ou=configuration,ou=system",
        "ou=interceptors,ou=configuration,ou=system",
    ] {
        assert!(service.has_entry(dn).unwrap(), "{dn} missing after bootstrap");
    }
}

#[test]
fn test_search_under_a_missing_base_reports_the_resolved_prefix() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=blah,ou=system", SearchScope::OneLevel, "(objectClass=*)"),
        )
        .unwrap();
    let err = drain(cursor).unwrap_err();

    assert_eq!(err.kind, LdapErrorKind::NoSuchObject);
    assert_eq!(err.matched_dn.as_ref().map(|dn| dn.user()), Some("ou=system"));
}

#[test]
fn test_delete_refuses_a_non_leaf_and_names_it() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "ou=blah,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["blah"])],
        )
        .unwrap();
    service
        .add(
            &session,
            "ou=subctx,ou=blah,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["subctx"])],
        )
        .unwrap();

    let err = service.delete(&session, "ou=blah,ou=system").unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::NotAllowedOnNonLeaf);
    assert_eq!(
        err.matched_dn.as_ref().map(|dn| dn.user()),
        Some("ou=blah,ou=system")
    );

    // Leaf first, then the parent goes quietly.
    service.delete(&session, "ou=subctx,ou=blah,ou=system").unwrap();
    service.delete(&session, "ou=blah,ou=system").unwrap();
    assert!(!service.has_entry("ou=blah,ou=system").unwrap());
}

#[test]
fn test_rename_onto_an_existing_entry_is_refused() {
    let service = service();
    let session = service.admin_session();

    let err = service
        .rename(&session, "ou=users,ou=system", "ou=groups", false)
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::EntryAlreadyExists);
    assert_eq!(
        err.matched_dn.as_ref().map(|dn| dn.user()),
        Some("ou=groups,ou=system")
    );
}

#[test]
fn test_add_then_lookup_round_trip() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "cn=Kim Wilde,ou=system",
            &[
                ("objectClass", &["top", "person"]),
                ("cn", &["Kim Wilde"]),
                ("sn", &["Wilde"]),
                ("telephoneNumber", &["+1 512 315 0280"]),
            ],
        )
        .unwrap();

    let entry = service.lookup(&session, "cn=Kim Wilde,ou=system", None).unwrap();
    let cn = entry.attribute("2.5.4.3").unwrap();
    assert_eq!(cn.first().unwrap().user_str(), Some("Kim Wilde"));

    // Operational attributes stay out of a default lookup but answer an
    // explicit request.
    assert!(entry.attribute("2.5.18.1").is_none(), "createTimestamp leaked");
    assert!(entry.attribute("1.3.6.1.1.16.4").is_none(), "entryUUID leaked");

    let with_operational = service
        .lookup(
            &session,
            "cn=Kim Wilde,ou=system",
            Some(&["*", "createTimestamp", "creatorsName"]),
        )
        .unwrap();
    assert!(with_operational.attribute("2.5.18.1").is_some());
    let creator = with_operational.attribute("2.5.18.3").unwrap();
    assert!(
        creator.first().unwrap().user_str().unwrap().contains("admin"),
        "creatorsName carries the admin principal"
    );
}

#[test]
fn test_modify_stamps_happen_only_on_success() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "ou=stamped,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["stamped"])],
        )
        .unwrap();

    service
        .modify(
            &session,
            "ou=stamped,ou=system",
            vec![Modification::add("description", &["first"])],
        )
        .unwrap();
    let entry = service
        .lookup(&session, "ou=stamped,ou=system", Some(&["modifyTimestamp"]))
        .unwrap();
    assert!(entry.attribute("2.5.18.2").is_some(), "modifyTimestamp missing");

    // A refused modification leaves no trace: removing a value that is not
    // there fails and the failed attempt stamps nothing new.
    let before = service
        .lookup(&session, "ou=stamped,ou=system", Some(&["modifyTimestamp"]))
        .unwrap();
    let err = service
        .modify(
            &session,
            "ou=stamped,ou=system",
            vec![Modification::remove("seeAlso", &[])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::NoSuchAttribute);
    let after = service
        .lookup(&session, "ou=stamped,ou=system", Some(&["modifyTimestamp"]))
        .unwrap();
    assert_eq!(
        before.attribute("2.5.18.2").unwrap().first(),
        after.attribute("2.5.18.2").unwrap().first()
    );
}

#[test]
fn test_adding_a_present_value_is_refused() {
    let service = service();
    let session = service.admin_session();

    let err = service
        .modify(
            &session,
            "ou=users,ou=system",
            vec![Modification::add("ou", &["users"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::AttributeOrValueExists);
}

#[test]
fn test_double_add_is_refused() {
    let service = service();
    let session = service.admin_session();
    let err = service
        .add(
            &session,
            "ou=users,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["users"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::EntryAlreadyExists);
}

#[test]
fn test_add_under_a_missing_parent_is_refused() {
    let service = service();
    let session = service.admin_session();
    let err = service
        .add(
            &session,
            "ou=a,ou=missing,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["a"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::NoSuchObject);
    assert_eq!(err.matched_dn.as_ref().map(|dn| dn.user()), Some("ou=system"));
}

#[test]
fn test_add_under_an_alias_is_refused() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "ou=real,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["real"])],
        )
        .unwrap();
    service
        .add(
            &session,
            "cn=shortcut,ou=system",
            &[
                ("objectClass", &["top", "alias", "extensibleObject"]),
                ("cn", &["shortcut"]),
                ("aliasedObjectName", &["ou=real,ou=system"]),
            ],
        )
        .unwrap();

    let err = service
        .add(
            &session,
            "ou=below,cn=shortcut,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["below"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::AliasDereferencingProblem);
}

#[test]
fn test_move_carries_the_whole_subtree() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "ou=src,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["src"])],
        )
        .unwrap();
    service
        .add(
            &session,
            "ou=inner,ou=src,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["inner"])],
        )
        .unwrap();

    service
        .move_entry(&session, "ou=src,ou=system", "ou=configuration,ou=system")
        .unwrap();

    assert!(!service.has_entry("ou=src,ou=system").unwrap());
    assert!(service.has_entry("ou=src,ou=configuration,ou=system").unwrap());
    assert!(
        service
            .has_entry("ou=inner,ou=src,ou=configuration,ou=system")
            .unwrap(),
        "descendants follow the move"
    );
}

#[test]
fn test_rename_replaces_the_rdn_attribute_when_asked() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "ou=old,ou=system",
            &[("objectClass", &["top", "organizationalUnit"]), ("ou", &["old"])],
        )
        .unwrap();
    service
        .rename(&session, "ou=old,ou=system", "ou=new", true)
        .unwrap();

    let entry = service.lookup(&session, "ou=new,ou=system", None).unwrap();
    let values: Vec<_> = entry
        .attribute("2.5.4.11")
        .unwrap()
        .values()
        .iter()
        .filter_map(|v| v.user_str())
        .collect();
    assert_eq!(values, vec!["new"], "old RDN value deleted, new one injected");
}

#[test]
fn test_schema_validation_rejects_incomplete_entries() {
    let service = service();
    let session = service.admin_session();

    // person requires sn.
    let err = service
        .add(
            &session,
            "cn=incomplete,ou=system",
            &[("objectClass", &["top", "person"]), ("cn", &["incomplete"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::ObjectClassViolation);

    let err = service
        .add(
            &session,
            "cn=unknown,ou=system",
            &[("objectClass", &["top", "nonexistentClass"]), ("cn", &["unknown"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::ObjectClassViolation);
}

#[test]
fn test_operational_attributes_refuse_user_writes() {
    let service = service();
    let session = service.admin_session();
    let err = service
        .modify(
            &session,
            "ou=users,ou=system",
            vec![Modification::replace("createTimestamp", &["20200101000000Z"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::SchemaViolation);
}

#[test]
fn test_ldif_load_and_dump() {
    let service = service();
    let session = service.admin_session();

    let loaded = service
        .load_ldif(
            &session,
            "dn: ou=imported,ou=system\n\
             objectClass: top\n\
             objectClass: organizationalUnit\n\
             ou: imported\n\
             \n\
             dn: cn=Imported Person,ou=imported,ou=system\n\
             objectClass: top\n\
             objectClass: person\n\
             cn: Imported Person\n\
             sn: Person\n",
        )
        .unwrap();
    assert_eq!(loaded, 2);
    assert!(service.has_entry("cn=Imported Person,ou=imported,ou=system").unwrap());

    let dumped = service.dump_ldif();
    assert!(dumped.contains("dn: ou=imported,ou=system"));
    assert!(dumped.contains("sn: Person"));
}

#[test]
fn test_compare_uses_the_equality_rule() {
    let service = service();
    let session = service.admin_session();

    assert!(service.compare(&session, "ou=users,ou=system", "ou", "USERS").unwrap());
    assert!(!service.compare(&session, "ou=users,ou=system", "ou", "groups").unwrap());

    let err = service
        .compare(&session, "ou=missing,ou=system", "ou", "x")
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::NoSuchObject);
}

#[test]
fn test_root_dse_is_reachable_at_the_empty_dn() {
    let service = service();
    let session = service.anonymous_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("", SearchScope::Object, "(objectClass=*)").attrs(&["*", "+"]),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(entries.len(), 1);

    let root = &entries[0];
    assert!(root.dn().is_root_dse());
    let contexts = root.attribute("1.3.6.1.4.1.1466.101.120.5").unwrap();
    assert_eq!(contexts.first().unwrap().user_str(), Some("ou=system"));
    assert!(root.attribute("2.5.18.10").is_some(), "subschemaSubentry missing");
}
