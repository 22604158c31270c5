use std::sync::Arc;

use crate::chain::{Erased as _, ErasedInterceptor, SchemaRef};
use crate::config::DirectoryConfig;
use crate::nexus::PartitionNexus;

pub mod authn;
pub mod authz;
pub mod collective;
pub mod exception;
pub mod normalization;
pub mod operational;
pub mod schema_check;
pub mod subentry;

pub use authz::AdminRoster;
pub use subentry::SubentryCache;

/// Builds the fixed default pipeline, in the order every operation
/// traverses it:
/// normalization → authentication → exception → operational-attribute →
/// schema → subentry → collective-attribute → default-authorization → nexus.
pub fn interceptors(
    schema: &SchemaRef,
    nexus: &Arc<PartitionNexus>,
    subentries: &Arc<SubentryCache>,
    roster: &Arc<AdminRoster>,
    config: &DirectoryConfig,
) -> Vec<ErasedInterceptor> {
    vec![
        normalization::NormalizationInterceptor::new(schema.clone()).erased(),
        authn::AuthenticationInterceptor::new(Arc::clone(nexus), config.allow_anonymous_access)
            .erased(),
        exception::ExceptionInterceptor::new(
            schema.clone(),
            Arc::clone(nexus),
            config.not_alias_cache_size,
        )
        .erased(),
        operational::OperationalAttributeInterceptor::new(
            schema.clone(),
            Arc::clone(nexus),
            config.denormalize_operational_attributes,
        )
        .erased(),
        schema_check::SchemaInterceptor::new(schema.clone(), Arc::clone(nexus)).erased(),
        subentry::SubentryInterceptor::new(schema.clone(), Arc::clone(nexus), Arc::clone(subentries))
            .erased(),
        collective::CollectiveAttributeInterceptor::new(
            schema.clone(),
            Arc::clone(nexus),
            Arc::clone(subentries),
        )
        .erased(),
        authz::DefaultAuthorizationInterceptor::new(
            Arc::clone(roster),
            !config.access_control_enabled,
        )
        .erased(),
    ]
}
