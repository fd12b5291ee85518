pub mod actions;
pub mod admin;
pub mod bus;
pub mod host_api;
pub mod permissions;

pub use actions::{register_auto_purge, PurgeActions, DEFAULT_PURGE_ACTIONS};
pub use admin::{AdminActions, AdminError, AdminQuery, Notice, NoticeLevel, Redirect};
pub use bus::{EventBus, HookCallback, HookEvent, HookRegistry};
pub use host_api::HostApi;
pub use permissions::{PermissionSet, Principal};
