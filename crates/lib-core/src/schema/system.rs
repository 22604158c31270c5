use crate::schema::attribute_type::AttributeType;
use crate::schema::matching_rule::{MatchingRule, Normalizer, oids as mr};
use crate::schema::object_class::{ObjectClass, ObjectClassKind};
use crate::schema::registries::Registries;
use crate::schema::syntax::{Syntax, oids as syn};

/// Attribute-type OIDs the engine itself steers by.
pub mod oids {
    pub const OBJECT_CLASS: &str = "2.5.4.0";
    pub const ALIASED_OBJECT_NAME: &str = "2.5.4.1";
    pub const CN: &str = "2.5.4.3";
    pub const OU: &str = "2.5.4.11";
    pub const UID: &str = "0.9.2342.19200300.100.1.1";
    pub const USER_PASSWORD: &str = "2.5.4.35";
    pub const UNIQUE_MEMBER: &str = "2.5.4.50";
    pub const CREATE_TIMESTAMP: &str = "2.5.18.1";
    pub const MODIFY_TIMESTAMP: &str = "2.5.18.2";
    pub const CREATORS_NAME: &str = "2.5.18.3";
    pub const MODIFIERS_NAME: &str = "2.5.18.4";
    pub const SUBTREE_SPECIFICATION: &str = "2.5.18.6";
    pub const COLLECTIVE_EXCLUSIONS: &str = "2.5.18.7";
    pub const SUBSCHEMA_SUBENTRY: &str = "2.5.18.10";
    pub const COLLECTIVE_ATTRIBUTE_SUBENTRIES: &str = "2.5.18.12";
    pub const ENTRY_UUID: &str = "1.3.6.1.1.16.4";
    pub const NAMING_CONTEXTS: &str = "1.3.6.1.4.1.1466.101.120.5";
    pub const SUPPORTED_CONTROL: &str = "1.3.6.1.4.1.1466.101.120.13";

    pub const TOP_OC: &str = "2.5.6.0";
    pub const ALIAS_OC: &str = "2.5.6.1";
    pub const SUBENTRY_OC: &str = "2.5.17.0";
    pub const COLLECTIVE_ATTRIBUTE_SUBENTRY_OC: &str = "2.5.17.2";
    pub const EXTENSIBLE_OBJECT_OC: &str = "1.3.6.1.4.1.1466.101.120.111";
}

/// The value a `collectiveExclusions` attribute uses to turn off every
/// collective attribute at once.
pub const EXCLUDE_ALL_COLLECTIVE: &str = "excludeAllCollectiveAttributes";

/// Builds the sealed system registries every directory instance starts from.
/// Covers exactly the types and classes the engine needs to run and test
/// itself without bootstrap files.
pub fn system_registries() -> Registries {
    build().expect("the built-in system schema must seal")
}

fn build() -> crate::errors::OpResult<Registries> {
    Registries::builder()
        .syntax(Syntax::new(syn::BOOLEAN, "Boolean", true))
        .syntax(Syntax::new(syn::DN, "DN", true))
        .syntax(Syntax::new(syn::DIRECTORY_STRING, "Directory String", true))
        .syntax(Syntax::new(syn::GENERALIZED_TIME, "Generalized Time", true))
        .syntax(Syntax::new(syn::IA5_STRING, "IA5 String", true))
        .syntax(Syntax::new(syn::INTEGER, "INTEGER", true))
        .syntax(Syntax::new(syn::NUMERIC_STRING, "Numeric String", true))
        .syntax(Syntax::new(syn::OID, "OID", true))
        .syntax(Syntax::new(syn::OCTET_STRING, "Octet String", false))
        .syntax(Syntax::new(
            syn::SUBTREE_SPECIFICATION,
            "Subtree Specification",
            true,
        ))
        .syntax(Syntax::new(syn::TELEPHONE_NUMBER, "Telephone Number", true))
        .syntax(Syntax::new(syn::UUID, "UUID", true))
        .matching_rule(MatchingRule::new(
            mr::OBJECT_IDENTIFIER_MATCH,
            "objectIdentifierMatch",
            syn::OID,
            Normalizer::ObjectIdentifier,
        ))
        .matching_rule(MatchingRule::new(
            mr::DISTINGUISHED_NAME_MATCH,
            "distinguishedNameMatch",
            syn::DN,
            Normalizer::DistinguishedName,
        ))
        .matching_rule(MatchingRule::new(
            mr::CASE_IGNORE_MATCH,
            "caseIgnoreMatch",
            syn::DIRECTORY_STRING,
            Normalizer::CaseIgnore,
        ))
        .matching_rule(MatchingRule::new(
            mr::CASE_IGNORE_ORDERING_MATCH,
            "caseIgnoreOrderingMatch",
            syn::DIRECTORY_STRING,
            Normalizer::CaseIgnore,
        ))
        .matching_rule(MatchingRule::new(
            mr::CASE_IGNORE_SUBSTRINGS_MATCH,
            "caseIgnoreSubstringsMatch",
            syn::DIRECTORY_STRING,
            Normalizer::CaseIgnore,
        ))
        .matching_rule(MatchingRule::new(
            mr::CASE_EXACT_MATCH,
            "caseExactMatch",
            syn::DIRECTORY_STRING,
            Normalizer::CaseExact,
        ))
        .matching_rule(MatchingRule::new(
            mr::NUMERIC_STRING_MATCH,
            "numericStringMatch",
            syn::NUMERIC_STRING,
            Normalizer::NumericString,
        ))
        .matching_rule(MatchingRule::new(
            mr::BOOLEAN_MATCH,
            "booleanMatch",
            syn::BOOLEAN,
            Normalizer::Boolean,
        ))
        .matching_rule(MatchingRule::new(
            mr::INTEGER_MATCH,
            "integerMatch",
            syn::INTEGER,
            Normalizer::Integer,
        ))
        .matching_rule(MatchingRule::new(
            mr::INTEGER_ORDERING_MATCH,
            "integerOrderingMatch",
            syn::INTEGER,
            Normalizer::Integer,
        ))
        .matching_rule(MatchingRule::new(
            mr::OCTET_STRING_MATCH,
            "octetStringMatch",
            syn::OCTET_STRING,
            Normalizer::OctetString,
        ))
        .matching_rule(MatchingRule::new(
            mr::TELEPHONE_NUMBER_MATCH,
            "telephoneNumberMatch",
            syn::TELEPHONE_NUMBER,
            Normalizer::TelephoneNumber,
        ))
        .matching_rule(MatchingRule::new(
            mr::GENERALIZED_TIME_MATCH,
            "generalizedTimeMatch",
            syn::GENERALIZED_TIME,
            Normalizer::GeneralizedTime,
        ))
        .matching_rule(MatchingRule::new(
            mr::GENERALIZED_TIME_ORDERING_MATCH,
            "generalizedTimeOrderingMatch",
            syn::GENERALIZED_TIME,
            Normalizer::GeneralizedTime,
        ))
        .matching_rule(MatchingRule::new(
            mr::CASE_IGNORE_IA5_MATCH,
            "caseIgnoreIA5Match",
            syn::IA5_STRING,
            Normalizer::CaseIgnore,
        ))
        .matching_rule(MatchingRule::new(
            mr::UUID_MATCH,
            "uuidMatch",
            syn::UUID,
            Normalizer::Uuid,
        ))
        .attribute_type(
            AttributeType::new(oids::OBJECT_CLASS, &["objectClass"], syn::OID)
                .equality(mr::OBJECT_IDENTIFIER_MATCH),
        )
        .attribute_type(
            AttributeType::new(oids::ALIASED_OBJECT_NAME, &["aliasedObjectName"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH)
                .single_value(),
        )
        .attribute_type(
            AttributeType::new("2.5.4.41", &["name"], syn::DIRECTORY_STRING)
                .equality(mr::CASE_IGNORE_MATCH)
                .substring(mr::CASE_IGNORE_SUBSTRINGS_MATCH),
        )
        .attribute_type(
            AttributeType::new(oids::CN, &["cn", "commonName"], syn::DIRECTORY_STRING)
                .superior("2.5.4.41"),
        )
        .attribute_type(
            AttributeType::new("2.5.4.4", &["sn", "surname"], syn::DIRECTORY_STRING)
                .superior("2.5.4.41"),
        )
        .attribute_type(
            AttributeType::new("2.5.4.7", &["l", "localityName"], syn::DIRECTORY_STRING)
                .superior("2.5.4.41"),
        )
        .attribute_type(
            AttributeType::new("2.5.4.10", &["o", "organizationName"], syn::DIRECTORY_STRING)
                .superior("2.5.4.41"),
        )
        .attribute_type(
            AttributeType::new(
                oids::OU,
                &["ou", "organizationalUnitName"],
                syn::DIRECTORY_STRING,
            )
            .superior("2.5.4.41"),
        )
        .attribute_type(
            AttributeType::new("2.5.4.13", &["description"], syn::DIRECTORY_STRING)
                .equality(mr::CASE_IGNORE_MATCH)
                .substring(mr::CASE_IGNORE_SUBSTRINGS_MATCH),
        )
        .attribute_type(
            AttributeType::new("2.5.4.20", &["telephoneNumber"], syn::TELEPHONE_NUMBER)
                .equality(mr::TELEPHONE_NUMBER_MATCH),
        )
        .attribute_type(
            AttributeType::new("2.5.4.34", &["seeAlso"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH),
        )
        .attribute_type(
            AttributeType::new(oids::USER_PASSWORD, &["userPassword"], syn::OCTET_STRING)
                .equality(mr::OCTET_STRING_MATCH),
        )
        .attribute_type(
            AttributeType::new("2.5.4.31", &["member"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH),
        )
        .attribute_type(
            AttributeType::new(oids::UNIQUE_MEMBER, &["uniqueMember"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH),
        )
        .attribute_type(
            AttributeType::new(oids::UID, &["uid", "userid"], syn::DIRECTORY_STRING)
                .equality(mr::CASE_IGNORE_MATCH)
                .substring(mr::CASE_IGNORE_SUBSTRINGS_MATCH),
        )
        .attribute_type(
            AttributeType::new(
                "0.9.2342.19200300.100.1.25",
                &["dc", "domainComponent"],
                syn::IA5_STRING,
            )
            .equality(mr::CASE_IGNORE_IA5_MATCH)
            .single_value(),
        )
        .attribute_type(
            AttributeType::new("1.3.6.1.1.1.1.0", &["uidNumber"], syn::INTEGER)
                .equality(mr::INTEGER_MATCH)
                .ordering(mr::INTEGER_ORDERING_MATCH)
                .single_value(),
        )
        .attribute_type(
            AttributeType::new("1.3.6.1.1.1.1.1", &["gidNumber"], syn::INTEGER)
                .equality(mr::INTEGER_MATCH)
                .ordering(mr::INTEGER_ORDERING_MATCH)
                .single_value(),
        )
        // Collective shadows of the user types they answer for.
        .attribute_type(
            AttributeType::new("2.5.4.7.1", &["c-l"], syn::DIRECTORY_STRING)
                .superior("2.5.4.7")
                .collective(),
        )
        .attribute_type(
            AttributeType::new("2.5.4.10.1", &["c-o"], syn::DIRECTORY_STRING)
                .superior("2.5.4.10")
                .collective(),
        )
        .attribute_type(
            AttributeType::new("2.5.4.11.1", &["c-ou"], syn::DIRECTORY_STRING)
                .superior(oids::OU)
                .collective(),
        )
        .attribute_type(
            AttributeType::new("2.5.4.20.1", &["c-telephoneNumber"], syn::TELEPHONE_NUMBER)
                .superior("2.5.4.20")
                .collective(),
        )
        // Operational bookkeeping.
        .attribute_type(
            AttributeType::new(oids::CREATE_TIMESTAMP, &["createTimestamp"], syn::GENERALIZED_TIME)
                .equality(mr::GENERALIZED_TIME_MATCH)
                .ordering(mr::GENERALIZED_TIME_ORDERING_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new(oids::MODIFY_TIMESTAMP, &["modifyTimestamp"], syn::GENERALIZED_TIME)
                .equality(mr::GENERALIZED_TIME_MATCH)
                .ordering(mr::GENERALIZED_TIME_ORDERING_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new(oids::CREATORS_NAME, &["creatorsName"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new(oids::MODIFIERS_NAME, &["modifiersName"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new("2.5.18.5", &["administrativeRole"], syn::OID)
                .equality(mr::OBJECT_IDENTIFIER_MATCH)
                .usage_operational(),
        )
        .attribute_type(
            AttributeType::new(
                oids::SUBTREE_SPECIFICATION,
                &["subtreeSpecification"],
                syn::SUBTREE_SPECIFICATION,
            )
            .equality(mr::CASE_EXACT_MATCH)
            .single_value(),
        )
        .attribute_type(
            AttributeType::new(
                oids::COLLECTIVE_EXCLUSIONS,
                &["collectiveExclusions"],
                syn::OID,
            )
            .equality(mr::OBJECT_IDENTIFIER_MATCH)
            .usage_operational(),
        )
        .attribute_type(
            AttributeType::new(oids::SUBSCHEMA_SUBENTRY, &["subschemaSubentry"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new(
                oids::COLLECTIVE_ATTRIBUTE_SUBENTRIES,
                &["collectiveAttributeSubentries"],
                syn::DN,
            )
            .equality(mr::DISTINGUISHED_NAME_MATCH)
            .operational(),
        )
        .attribute_type(
            AttributeType::new(oids::ENTRY_UUID, &["entryUUID"], syn::UUID)
                .equality(mr::UUID_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new(oids::NAMING_CONTEXTS, &["namingContexts"], syn::DN)
                .equality(mr::DISTINGUISHED_NAME_MATCH)
                .operational(),
        )
        .attribute_type(
            AttributeType::new(oids::SUPPORTED_CONTROL, &["supportedControl"], syn::OID)
                .equality(mr::OBJECT_IDENTIFIER_MATCH)
                .operational(),
        )
        .attribute_type(
            AttributeType::new("1.3.6.1.1.4", &["vendorName"], syn::DIRECTORY_STRING)
                .equality(mr::CASE_EXACT_MATCH)
                .single_value()
                .operational(),
        )
        .attribute_type(
            AttributeType::new("1.3.6.1.1.5", &["vendorVersion"], syn::DIRECTORY_STRING)
                .equality(mr::CASE_EXACT_MATCH)
                .single_value()
                .operational(),
        )
        .object_class(
            ObjectClass::new(oids::TOP_OC, "top", ObjectClassKind::Abstract).must(&["objectClass"]),
        )
        .object_class(
            ObjectClass::new(oids::ALIAS_OC, "alias", ObjectClassKind::Structural)
                .superior("top")
                .must(&["aliasedObjectName"]),
        )
        .object_class(
            ObjectClass::new("2.5.6.4", "organization", ObjectClassKind::Structural)
                .superior("top")
                .must(&["o"])
                .may(&["description", "telephoneNumber", "seeAlso", "l"]),
        )
        .object_class(
            ObjectClass::new("2.5.6.5", "organizationalUnit", ObjectClassKind::Structural)
                .superior("top")
                .must(&["ou"])
                .may(&["description", "telephoneNumber", "seeAlso", "l", "userPassword"]),
        )
        .object_class(
            ObjectClass::new("2.5.6.6", "person", ObjectClassKind::Structural)
                .superior("top")
                .must(&["cn", "sn"])
                .may(&["userPassword", "telephoneNumber", "seeAlso", "description"]),
        )
        .object_class(
            ObjectClass::new("2.5.6.7", "organizationalPerson", ObjectClassKind::Structural)
                .superior("person")
                .may(&["ou", "l", "telephoneNumber"]),
        )
        .object_class(
            ObjectClass::new(
                "2.16.840.1.113730.3.2.2",
                "inetOrgPerson",
                ObjectClassKind::Structural,
            )
            .superior("organizationalPerson")
            .may(&["uid", "o", "description"]),
        )
        .object_class(
            ObjectClass::new("0.9.2342.19200300.100.4.5", "account", ObjectClassKind::Structural)
                .superior("top")
                .must(&["uid"])
                .may(&["description", "ou", "seeAlso", "l"]),
        )
        .object_class(
            ObjectClass::new("2.5.6.9", "groupOfNames", ObjectClassKind::Structural)
                .superior("top")
                .must(&["cn", "member"])
                .may(&["description", "o", "ou", "seeAlso"]),
        )
        .object_class(
            ObjectClass::new("2.5.6.17", "groupOfUniqueNames", ObjectClassKind::Structural)
                .superior("top")
                .must(&["cn", "uniqueMember"])
                .may(&["description", "o", "ou", "seeAlso"]),
        )
        .object_class(
            ObjectClass::new(oids::SUBENTRY_OC, "subentry", ObjectClassKind::Structural)
                .superior("top")
                .must(&["cn", "subtreeSpecification"]),
        )
        .object_class(
            ObjectClass::new(
                oids::COLLECTIVE_ATTRIBUTE_SUBENTRY_OC,
                "collectiveAttributeSubentry",
                ObjectClassKind::Auxiliary,
            )
            .superior("top")
            .may(&["c-l", "c-o", "c-ou", "c-telephoneNumber"]),
        )
        .object_class(
            ObjectClass::new("2.5.20.1", "subschema", ObjectClassKind::Auxiliary).superior("top"),
        )
        .object_class(
            ObjectClass::new(
                oids::EXTENSIBLE_OBJECT_OC,
                "extensibleObject",
                ObjectClassKind::Auxiliary,
            )
            .superior("top"),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_schema_seals() {
        let schema = system_registries();
        assert!(schema.attribute_type("objectClass").is_ok());
        assert!(schema.attribute_type("entryUUID").is_ok());
        assert!(schema.object_class("collectiveAttributeSubentry").is_ok());
    }

    #[test]
    fn test_operational_types_are_flagged() {
        let schema = system_registries();
        assert!(schema.attribute_type("createTimestamp").unwrap().is_operational());
        assert!(!schema.attribute_type("cn").unwrap().is_operational());
        // User-writable despite directoryOperation usage.
        let exclusions = schema.attribute_type("collectiveExclusions").unwrap();
        assert!(exclusions.is_operational());
        assert!(!exclusions.no_user_modification);
    }
}
