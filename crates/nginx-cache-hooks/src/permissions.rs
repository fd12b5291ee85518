#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    /// May trigger a manual purge and see the admin-bar purge link.
    pub manage_cache: bool,
    /// May change the cache zone settings.
    pub manage_settings: bool,
}

impl PermissionSet {
    pub fn administrator() -> Self {
        Self {
            manage_cache: true,
            manage_settings: true,
        }
    }
}

/// The authenticated account an admin request runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub permissions: PermissionSet,
}

impl Principal {
    pub fn new(id: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            id: id.into(),
            permissions,
        }
    }

    pub fn can_manage_cache(&self) -> bool {
        self.permissions.manage_cache
    }
}
