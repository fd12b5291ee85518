use crate::admin::Notice;
use crate::permissions::Principal;
use nginx_cache_core::SettingsStore;
use std::sync::Arc;

/// What the hosting application provides to the purge integration.
pub trait HostApi: Send + Sync {
    fn settings(&self) -> Arc<dyn SettingsStore>;

    /// `None` for anonymous requests.
    fn current_principal(&self) -> Option<Principal>;

    /// Surfaces a message to the operator.
    fn notify(&self, notice: &Notice);
}
