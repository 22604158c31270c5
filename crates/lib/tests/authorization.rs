//! The fixed administrative policy that applies while rule-based access
//! control is off.

use pretty_assertions::assert_eq;
use warren_lib::config::DirectoryConfig;
use warren_lib::service::DirectoryService;
use warren_lib_core::entry::Modification;
use warren_lib_core::errors::LdapErrorKind;

fn service_with_user() -> DirectoryService {
    let service = DirectoryService::new(DirectoryConfig::default()).expect("service boots");
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
}

#[test]
fn test_anonymous_cannot_modify_the_admin_account() {
    let service = service_with_user();
    let anonymous = service.anonymous_session();

    let err = service
        .modify(
            &anonymous,
            "uid=admin,ou=system",
            vec![Modification::replace("userPassword", &["hijacked"])],
        )
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);
}

#[test]
fn test_self_access_exemption() {
    let service = service_with_user();
    let user = service.bind("uid=akarasulu,ou=users,ou=system", b"test").unwrap();

    // Reading and modifying one's own entry always works.
    service
        .lookup(&user, "uid=akarasulu,ou=users,ou=system", None)
        .unwrap();
    service
        .modify(
            &user,
            "uid=akarasulu,ou=users,ou=system",
            vec![Modification::replace("userPassword", &["changed"])],
        )
        .unwrap();

    // A different entry in the protected subtree stays off limits.
    let admin = service.admin_session();
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
    let err = service
        .lookup(&user, "uid=other,ou=users,ou=system", None)
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);
    let err = service
        .delete(&user, "uid=other,ou=users,ou=system")
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);
}

#[test]
fn test_the_admin_account_and_group_are_immovable() {
    let service = service_with_user();
    let admin = service.admin_session();

    let err = service.delete(&admin, "uid=admin,ou=system").unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);

    let err = service
        .delete(&admin, "cn=Administrators,ou=groups,ou=system")
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);

    let err = service
        .rename(&admin, "uid=admin,ou=system", "uid=root", false)
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);
}

#[test]
fn test_group_membership_grants_administration() {
    let service = service_with_user();
    let admin = service.admin_session();

    let err = service
        .bind("uid=akarasulu,ou=users,ou=system", b"test")
        .and_then(|user| {
            service.modify(
                &user,
                "uid=admin,ou=system",
                vec![Modification::replace("description", &["nope"])],
            )
        })
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);

    // Joining the administrators group flips the answer.
    service
        .modify(
            &admin,
            "cn=Administrators,ou=groups,ou=system",
            vec![Modification::add(
                "uniqueMember",
                &["uid=akarasulu,ou=users,ou=system"],
            )],
        )
        .unwrap();

    let user = service.bind("uid=akarasulu,ou=users,ou=system", b"test").unwrap();
    service
        .modify(
            &user,
            "uid=admin,ou=system",
            vec![Modification::replace("description", &["updated by a delegate"])],
        )
        .unwrap();
}

#[test]
fn test_bind_outcomes() {
    let service = service_with_user();

    assert!(service.bind("uid=akarasulu,ou=users,ou=system", b"test").is_ok());

    let err = service
        .bind("uid=akarasulu,ou=users,ou=system", b"wrong")
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InvalidCredentials);

    let err = service.bind("uid=ghost,ou=users,ou=system", b"any").unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InvalidCredentials, "missing entries look the same");

    let anonymous = service.bind("", b"").unwrap();
    assert!(anonymous.principal().is_anonymous());
}

#[test]
fn test_anonymous_access_can_be_disabled() {
    let mut config = DirectoryConfig::default();
    config.allow_anonymous_access = false;
    let service = DirectoryService::new(config).expect("service boots");

    let err = service
        .lookup(&service.anonymous_session(), "ou=system", None)
        .unwrap_err();
    assert_eq!(err.kind, LdapErrorKind::InsufficientAccessRights);
}
