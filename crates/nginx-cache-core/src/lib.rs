pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod guard;
pub mod logging;
pub mod nonce;
pub mod purge;
pub mod settings;
pub mod validator;

pub use config::{CacheZoneConfig, CoreConfig, SecurityConfig};
pub use context::TriggerContext;
pub use error::{format_error_chain, CoreError, CoreResult, ErrorKind, PurgeError, PurgeResult};
pub use fs::{
    CredentialError, DirectoryEntry, EntryKind, Filesystem, FilesystemHandle, FilesystemProvider,
    LocalFilesystem, LocalFilesystemProvider,
};
pub use guard::PurgeGuard;
pub use nonce::{NonceError, NonceIssuer};
pub use purge::{PurgeController, PurgeEvent, PurgeObserver, PURGE_ACTION};
pub use settings::{JsonFileSettings, MemorySettings, SettingValue, SettingsStore};
pub use validator::{PathValidator, ValidationReason, ValidationResult};
