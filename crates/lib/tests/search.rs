//! Search behavior: planner paths, scopes, limits, abandon, and the
//! visibility rules interceptors attach to the result stream.

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use warren_lib::config::DirectoryConfig;
use warren_lib::context::{Control, SearchScope, control_oids};
use warren_lib::search::filtering::drain;
use warren_lib::service::{DirectoryService, SearchRequest};
use warren_lib_core::entry::Entry;
use warren_lib_core::errors::LdapErrorKind;
use warren_lib_core::store::Cursor;

fn service() -> DirectoryService {
    DirectoryService::new(DirectoryConfig::default()).expect("service boots")
}

fn dns(entries: &[Entry]) -> Vec<String> {
    let mut out: Vec<String> = entries.iter().map(|e| e.dn().user().to_string()).collect();
    out.sort();
    out
}

#[test]
fn test_equality_search_on_an_indexed_attribute() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(uid=admin)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(dns(&entries), vec!["uid=admin,ou=system"]);
}

#[test]
fn test_one_level_scope_sees_only_direct_children() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::OneLevel, "(ou=*)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(
        dns(&entries),
        vec![
            "ou=configuration,ou=system",
            "ou=groups,ou=system",
            "ou=users,ou=system",
        ],
        "grandchildren like ou=services stay out of a one-level search"
    );
}

#[test]
fn test_subtree_scope_reaches_the_whole_region() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new(
                "ou=configuration,ou=system",
                SearchScope::Subtree,
                "(objectClass=organizationalUnit)",
            ),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(
        dns(&entries),
        vec![
            "ou=configuration,ou=system",
            "ou=interceptors,ou=configuration,ou=system",
            "ou=services,ou=configuration,ou=system",
        ]
    );
}

#[test]
fn test_substring_prefix_walk() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(ou=con*)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(dns(&entries), vec!["ou=configuration,ou=system"]);

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(ou=*figurat*)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(dns(&entries), vec!["ou=configuration,ou=system"]);
}

#[test]
fn test_union_emits_each_entry_once() {
    let service = service();
    let session = service.admin_session();

    // Both arms match ou=users; the union must still produce it once.
    let cursor = service
        .search(
            &session,
            SearchRequest::new(
                "ou=system",
                SearchScope::Subtree,
                "(|(ou=users)(objectClass=organizationalUnit))",
            ),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    let users: Vec<_> = entries
        .iter()
        .filter(|e| e.dn().user() == "ou=users,ou=system")
        .collect();
    assert_eq!(users.len(), 1);
}

#[test]
fn test_conjunction_drives_the_cheapest_child() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new(
                "ou=system",
                SearchScope::Subtree,
                "(&(objectClass=organizationalUnit)(ou=users))",
            ),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(dns(&entries), vec!["ou=users,ou=system"]);
}

#[test]
fn test_negation_is_scope_bounded() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::OneLevel, "(!(ou=users))"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert!(
        entries.iter().all(|e| e.dn().user() != "ou=users,ou=system"),
        "negated entry must not appear"
    );
    assert!(
        entries
            .iter()
            .any(|e| e.dn().user() == "ou=groups,ou=system"),
        "other children still do"
    );
}

#[test]
fn test_unindexed_filters_fall_back_to_a_scoped_scan() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "ou=documented,ou=system",
            &[
                ("objectClass", &["top", "organizationalUnit"]),
                ("ou", &["documented"]),
                ("description", &["has text"]),
            ],
        )
        .unwrap();

    // description is not in the default index set.
    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(description=has text)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(dns(&entries), vec!["ou=documented,ou=system"]);
}

#[test]
fn test_integer_ordering_on_an_indexed_attribute() {
    let service = service();
    let session = service.admin_session();

    for (name, number) in [("n1", "9"), ("n2", "10"), ("n3", "2")] {
        service
            .add(
                &session,
                &format!("ou={name},ou=system"),
                &[
                    ("objectClass", &["top", "organizationalUnit", "extensibleObject"]),
                    ("ou", &[name]),
                    ("uidNumber", &[number]),
                ],
            )
            .unwrap();
    }

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(uidNumber>=9)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(
        dns(&entries),
        vec!["ou=n1,ou=system", "ou=n2,ou=system"],
        "numeric order: 10 >= 9 even though \"10\" < \"9\" as text"
    );

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(uidNumber<=2)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(dns(&entries), vec!["ou=n3,ou=system"]);
}

#[test]
fn test_undefined_attribute_poisons_matches() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(&(ou=users)(bogus=1))"),
        )
        .unwrap();
    assert_eq!(drain(cursor).unwrap().len(), 0, "poisoned conjunction matches nothing");

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(|(ou=users)(bogus=1))"),
        )
        .unwrap();
    assert_eq!(drain(cursor).unwrap().len(), 1, "disjunction drops the undefined arm");
}

#[test]
fn test_size_limit_is_partial_success() {
    let service = service();
    let session = service.admin_session();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(objectClass=*)"),
        )
        .unwrap();
    assert!(drain(cursor).unwrap().len() > 2);

    let mut cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(objectClass=*)")
                .size_limit(2),
        )
        .unwrap();
    assert!(cursor.next().unwrap());
    assert!(cursor.next().unwrap());
    let err = cursor.next().unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::SizeLimitExceeded);
}

#[test]
fn test_abandon_ends_the_stream_quietly() {
    let service = service();
    let session = service.admin_session();

    let mut cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(objectClass=*)"),
        )
        .unwrap();
    assert!(cursor.next().unwrap());

    cursor.params().abandoned.store(true, Ordering::Relaxed);
    assert!(!cursor.next().unwrap(), "abandon reads as end-of-stream");
    assert!(cursor.is_closed());
}

#[test]
fn test_subentries_stay_hidden_without_the_control() {
    let service = service();
    let session = service.admin_session();

    service
        .add(
            &session,
            "cn=collective,ou=system",
            &[
                ("objectClass", &["top", "subentry", "collectiveAttributeSubentry"]),
                ("cn", &["collective"]),
                ("subtreeSpecification", &[r#"{ base "ou=configuration" }"#]),
                ("c-ou", &["configuration"]),
            ],
        )
        .unwrap();

    let cursor = service
        .search(
            &session,
            SearchRequest::new("ou=system", SearchScope::Subtree, "(objectClass=*)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert!(
        entries.iter().all(|e| e.dn().user() != "cn=collective,ou=system"),
        "subentries are invisible to ordinary searches"
    );

    let mut request = SearchRequest::new("ou=system", SearchScope::Subtree, "(objectClass=*)");
    request.controls = vec![Control::new(control_oids::SUBENTRIES).critical()];
    let cursor = service.search(&session, request).unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(
        dns(&entries),
        vec!["cn=collective,ou=system"],
        "with the control, only subentries come back"
    );
}

#[test]
fn test_search_results_respect_the_authorization_predicate() {
    let service = service();
    let admin = service.admin_session();

    service
        .add(
            &admin,
            "uid=akarasulu,ou=users,ou=system",
            &[
                ("objectClass", &["top", "inetOrgPerson"]),
                ("cn", &["Alex Karasulu"]),
                ("sn", &["Karasulu"]),
                ("uid", &["akarasulu"]),
                ("userPassword", &["test"]),
            ],
        )
        .unwrap();
    service
        .add(
            &admin,
            "uid=other,ou=users,ou=system",
            &[
                ("objectClass", &["top", "inetOrgPerson"]),
                ("cn", &["Other Person"]),
                ("sn", &["Person"]),
                ("uid", &["other"]),
            ],
        )
        .unwrap();

    let user = service.bind("uid=akarasulu,ou=users,ou=system", b"test").unwrap();
    let cursor = service
        .search(
            &user,
            SearchRequest::new("ou=users,ou=system", SearchScope::Subtree, "(objectClass=*)"),
        )
        .unwrap();
    let entries = drain(cursor).unwrap();
    assert_eq!(
        dns(&entries),
        vec!["ou=users,ou=system", "uid=akarasulu,ou=users,ou=system"],
        "a non-admin only sees the container and its own entry"
    );
}
