use std::num::NonZeroUsize;

/// Engine configuration an embedder tweaks before starting the service.
/// Everything has a working default; `DirectoryConfig::default()` boots a
/// self-contained system partition.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Name used for the synthesized root DSE vendor info.
    pub instance_name: String,
    /// The administrative principal.
    pub admin_dn: String,
    /// When rule-based access control is on, the fixed administrative policy
    /// interceptor stands down.
    pub access_control_enabled: bool,
    /// Rewrite DN-valued operational attributes into their short-name form
    /// on the way out.
    pub denormalize_operational_attributes: bool,
    /// Whether unauthenticated sessions may issue operations at all.
    pub allow_anonymous_access: bool,
    /// Attributes every partition indexes, by name or OID.
    pub indexed_attributes: Vec<String>,
    /// Bound on the negative alias cache.
    pub not_alias_cache_size: NonZeroUsize,
    /// The admin account's initial simple-bind secret.
    pub admin_password: String,
    /// Extra partitions mounted at startup, next to the system partition.
    pub partitions: Vec<PartitionSpec>,
}

/// One extra partition to mount: its name and the suffix DN it owns. The
/// suffix context entry is created on first start.
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    pub id: String,
    pub suffix: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            instance_name: "default".into(),
            admin_dn: "uid=admin,ou=system".into(),
            access_control_enabled: false,
            denormalize_operational_attributes: false,
            allow_anonymous_access: true,
            indexed_attributes: vec![
                "objectClass".into(),
                "ou".into(),
                "cn".into(),
                "uid".into(),
                "uidNumber".into(),
            ],
            not_alias_cache_size: NonZeroUsize::new(1024).unwrap(),
            admin_password: "secret".into(),
            partitions: Vec::new(),
        }
    }
}
