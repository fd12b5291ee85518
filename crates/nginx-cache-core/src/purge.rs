use crate::context::{StageTimer, TriggerContext};
use crate::error::{PurgeError, PurgeResult};
use crate::fs::FilesystemProvider;
use crate::nonce::{NonceError, NonceIssuer};
use crate::settings::SettingsStore;
use crate::validator::{PathValidator, ValidationReason, ValidationResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Action name manual purge tokens are bound to.
pub const PURGE_ACTION: &str = "purge-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeEvent {
    BeforePurge,
    AfterPurge,
}

impl PurgeEvent {
    pub fn hook_name(self) -> &'static str {
        match self {
            PurgeEvent::BeforePurge => "nginx_cache/before_purge",
            PurgeEvent::AfterPurge => "nginx_cache/after_purge",
        }
    }
}

/// Something that wants to run alongside a purge, e.g. flushing an object cache.
pub trait PurgeObserver: Send + Sync {
    fn on_purge_event(&self, event: PurgeEvent);
}

pub struct PurgeController {
    settings: Arc<dyn SettingsStore>,
    provider: Arc<dyn FilesystemProvider>,
    validator: PathValidator,
    observers: Vec<Arc<dyn PurgeObserver>>,
    nonces: Option<NonceIssuer>,
}

impl PurgeController {
    pub fn new(settings: Arc<dyn SettingsStore>, provider: Arc<dyn FilesystemProvider>) -> Self {
        Self {
            settings,
            provider,
            validator: PathValidator::new(),
            observers: Vec::new(),
            nonces: None,
        }
    }

    pub fn with_nonces(mut self, nonces: NonceIssuer) -> Self {
        self.nonces = Some(nonces);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn PurgeObserver>) {
        self.observers.push(observer);
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Current validation outcome for the configured path.
    pub fn check(&self) -> ValidationResult {
        let path = self.settings.cache_zone_config().path;
        self.validate(&path)
    }

    fn validate(&self, path: &str) -> ValidationResult {
        let access = self.provider.acquire(Path::new(path));
        self.validator.validate(path, access.as_deref())
    }

    pub fn request_purge(&self) -> PurgeResult<()> {
        let path = self.settings.cache_zone_config().path;
        let zone = PathBuf::from(&path);
        let access = self.provider.acquire(&zone);

        if let ValidationResult::Invalid(reason) = self.validator.validate(&path, access.as_deref()) {
            if reason.is_configuration() {
                tracing::info!(reason = reason.code(), "cache zone path not configured, skipping purge");
            } else {
                tracing::warn!(path = %path, reason = reason.code(), "refusing to purge cache zone");
            }
            return Err(PurgeError::Invalid(reason));
        }
        let fs = access.map_err(|_| PurgeError::Invalid(ValidationReason::FilesystemUnavailable))?;

        self.emit(PurgeEvent::BeforePurge);

        let timer = StageTimer::new("remove_cache_zone");
        if let Err(source) = fs.remove_recursive(&zone) {
            timer.fail(&source.to_string());
            return Err(PurgeError::Deletion { path: zone, source });
        }
        drop(timer);

        self.emit(PurgeEvent::AfterPurge);
        tracing::info!(path = %zone.display(), "cache zone purged");
        Ok(())
    }

    /// Purges at most once per `ctx`; later calls in the same context are no-ops.
    pub fn request_purge_once(&self, ctx: &TriggerContext) -> PurgeResult<()> {
        let _enter = ctx.span().enter();
        if !ctx.guard().try_claim() {
            tracing::debug!("purge already attempted in this context");
            return Ok(());
        }
        self.request_purge()
    }

    /// Operator-initiated purge. Bypasses the guard, but only after `token`
    /// proves the request was intended by `principal`.
    pub fn request_manual_purge(&self, token: &str, principal: &str) -> PurgeResult<()> {
        let nonces = self.nonces.as_ref().ok_or(NonceError::NotConfigured)?;
        if let Err(err) = nonces.verify(token, PURGE_ACTION, principal) {
            tracing::warn!(principal, error = %err, "manual purge rejected");
            return Err(PurgeError::Unauthorized(err));
        }
        tracing::info!(principal, "manual purge requested");
        self.request_purge()
    }

    pub fn issue_purge_token(&self, principal: &str) -> Option<String> {
        self.nonces
            .as_ref()
            .map(|nonces| nonces.issue(PURGE_ACTION, principal))
    }

    fn emit(&self, event: PurgeEvent) {
        tracing::debug!(hook = event.hook_name(), "notifying purge observers");
        for observer in &self.observers {
            observer.on_purge_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{CredentialError, DirectoryEntry, Filesystem, FilesystemHandle};
    use crate::settings::MemorySettings;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const HASH: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";

    #[derive(Default)]
    struct Counters {
        acquisitions: AtomicUsize,
        removals: AtomicUsize,
        fail_removal: bool,
        listing: Option<DirectoryEntry>,
    }

    struct FakeFs(Arc<Counters>);

    impl Filesystem for FakeFs {
        fn exists(&self, _: &Path) -> bool {
            true
        }
        fn is_dir(&self, _: &Path) -> bool {
            true
        }
        fn list_recursive(&self, _: &Path) -> io::Result<DirectoryEntry> {
            Ok(self
                .0
                .listing
                .clone()
                .unwrap_or_else(|| DirectoryEntry::dir("zone", vec![DirectoryEntry::file(HASH)])))
        }
        fn is_writable(&self, _: &Path) -> bool {
            true
        }
        fn remove_recursive(&self, _: &Path) -> io::Result<()> {
            self.0.removals.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_removal {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
            } else {
                Ok(())
            }
        }
    }

    struct FakeProvider(Arc<Counters>);

    impl FilesystemProvider for FakeProvider {
        fn acquire(&self, _: &Path) -> Result<FilesystemHandle, CredentialError> {
            self.0.acquisitions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeFs(Arc::clone(&self.0))))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<PurgeEvent>>);

    impl PurgeObserver for Recorder {
        fn on_purge_event(&self, event: PurgeEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn build(counters: Counters, path: &str) -> (PurgeController, Arc<Counters>, Arc<Recorder>) {
        let counters = Arc::new(counters);
        let recorder = Arc::new(Recorder::default());
        let mut controller = PurgeController::new(
            Arc::new(MemorySettings::with_cache(path, true)),
            Arc::new(FakeProvider(Arc::clone(&counters))),
        )
        .with_nonces(NonceIssuer::new("secret", 3600));
        controller.add_observer(recorder.clone());
        (controller, counters, recorder)
    }

    #[test]
    fn once_per_context_removes_once() {
        let (controller, counters, _) = build(Counters::default(), "/var/cache/nginx");
        let ctx = TriggerContext::new("save_post");
        for _ in 0..5 {
            controller.request_purge_once(&ctx).unwrap();
        }
        assert_eq!(counters.removals.load(Ordering::SeqCst), 1);

        let next = TriggerContext::new("edit_post");
        controller.request_purge_once(&next).unwrap();
        assert_eq!(counters.removals.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_attempt_still_closes_the_guard() {
        let counters = Counters {
            fail_removal: true,
            ..Counters::default()
        };
        let (controller, counters, _) = build(counters, "/var/cache/nginx");
        let ctx = TriggerContext::new("save_post");
        assert!(controller.request_purge_once(&ctx).is_err());
        assert!(controller.request_purge_once(&ctx).is_ok());
        assert_eq!(counters.removals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_zone_never_reaches_removal() {
        let counters = Counters {
            listing: Some(DirectoryEntry::dir("etc", vec![DirectoryEntry::file("passwd")])),
            ..Counters::default()
        };
        let (controller, counters, recorder) = build(counters, "/etc");
        let err = controller.request_purge().unwrap_err();
        assert_eq!(err.validation_reason(), Some(ValidationReason::NotACacheZoneShape));
        assert_eq!(counters.removals.load(Ordering::SeqCst), 0);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn after_purge_only_fires_on_success() {
        let (controller, _, recorder) = build(Counters::default(), "/var/cache/nginx");
        controller.request_purge().unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![PurgeEvent::BeforePurge, PurgeEvent::AfterPurge]
        );

        let failing = Counters {
            fail_removal: true,
            ..Counters::default()
        };
        let (controller, _, recorder) = build(failing, "/var/cache/nginx");
        let err = controller.request_purge().unwrap_err();
        assert!(matches!(err, PurgeError::Deletion { .. }));
        assert_eq!(*recorder.0.lock().unwrap(), vec![PurgeEvent::BeforePurge]);
    }

    #[test]
    fn manual_purge_requires_valid_token() {
        let (controller, counters, _) = build(Counters::default(), "/var/cache/nginx");
        let err = controller.request_manual_purge("deadbeef", "1").unwrap_err();
        assert!(matches!(err, PurgeError::Unauthorized(NonceError::Mismatch)));
        assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 0);

        let token = controller.issue_purge_token("1").unwrap();
        controller.request_manual_purge(&token, "1").unwrap();
        assert_eq!(counters.removals.load(Ordering::SeqCst), 1);

        let replay = controller.request_manual_purge(&token, "1").unwrap_err();
        assert!(matches!(replay, PurgeError::Unauthorized(NonceError::Replayed)));
    }

    #[test]
    fn manual_purge_ignores_the_guard() {
        let (controller, counters, _) = build(Counters::default(), "/var/cache/nginx");
        let ctx = TriggerContext::new("save_post");
        controller.request_purge_once(&ctx).unwrap();
        let token = controller.issue_purge_token("1").unwrap();
        controller.request_manual_purge(&token, "1").unwrap();
        assert_eq!(counters.removals.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_path_is_reported_as_configuration() {
        let (controller, counters, _) = build(Counters::default(), "");
        let err = controller.request_purge().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert_eq!(counters.removals.load(Ordering::SeqCst), 0);
    }
}
