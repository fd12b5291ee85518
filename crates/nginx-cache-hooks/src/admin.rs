//! Operator-facing side of the integration: the manual purge action, the
//! redirect messages it produces and the notices shown on the settings page.

use crate::host_api::HostApi;
use crate::permissions::Principal;
use nginx_cache_core::settings::{AUTO_PURGE_KEY, CACHE_PATH_KEY};
use nginx_cache_core::{
    CoreError, PurgeController, PurgeError, SettingValue, ValidationReason, ValidationResult,
    PURGE_ACTION,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::form_urlencoded;

pub const ADMIN_PAGE: &str = "tools.php?page=nginx-cache";
pub const MESSAGE_PURGED: &str = "cache-purged";
pub const MESSAGE_PURGE_FAILED: &str = "purge-cache-failed";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("no authenticated principal")]
    Anonymous,
    #[error("principal {0} is not allowed to do this")]
    Forbidden(String),
    #[error(transparent)]
    Purge(#[from] PurgeError),
    #[error(transparent)]
    Settings(#[from] CoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

/// Query string of an admin page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminQuery {
    params: HashMap<String, String>,
}

impl AdminQuery {
    /// Parses an `application/x-www-form-urlencoded` query, percent escapes included.
    pub fn parse(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let params = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

pub struct AdminActions {
    controller: Arc<PurgeController>,
}

impl AdminActions {
    pub fn new(controller: Arc<PurgeController>) -> Self {
        Self { controller }
    }

    /// Handles a settings page load. `Ok(None)` when the request carries no action.
    pub fn handle(&self, query: &AdminQuery, host: &dyn HostApi) -> Result<Option<Redirect>, AdminError> {
        if query.get("action") != Some(PURGE_ACTION) {
            return Ok(None);
        }

        let principal = host.current_principal().ok_or(AdminError::Anonymous)?;
        if !principal.can_manage_cache() {
            tracing::warn!(principal = %principal.id, "manual purge without capability");
            return Err(AdminError::Forbidden(principal.id));
        }

        let token = query.get("_wpnonce").unwrap_or_default();
        let location = match self.controller.request_manual_purge(token, &principal.id) {
            Ok(()) => format!("{ADMIN_PAGE}&message={MESSAGE_PURGED}"),
            Err(err @ PurgeError::Unauthorized(_)) => return Err(err.into()),
            Err(err) => {
                let mut location = format!("{ADMIN_PAGE}&message={MESSAGE_PURGE_FAILED}");
                if let Some(reason) = err.validation_reason() {
                    location.push_str("&reason=");
                    location.push_str(reason.code());
                }
                location
            }
        };
        Ok(Some(Redirect { location }))
    }

    /// Notices for the settings page, given the query it was loaded with.
    pub fn settings_notices(&self, query: &AdminQuery) -> Vec<Notice> {
        let current = self.controller.check();

        if query.get("settings-updated").is_none() {
            match query.get("message") {
                Some(MESSAGE_PURGED) => {
                    return vec![Notice::new(NoticeLevel::Success, "Cache purged.")];
                }
                Some(MESSAGE_PURGE_FAILED) => {
                    let reason = query
                        .get("reason")
                        .and_then(reason_from_code)
                        .or(match current {
                            ValidationResult::Invalid(reason) => Some(reason),
                            ValidationResult::Valid => None,
                        });
                    let detail = reason.map(ValidationReason::message).unwrap_or(
                        "The cache zone could not be removed; check the server logs.",
                    );
                    return vec![Notice::new(
                        NoticeLevel::Error,
                        format!("Cache could not be purged. {detail}"),
                    )];
                }
                _ => {}
            }
        }

        match current {
            ValidationResult::Valid => Vec::new(),
            ValidationResult::Invalid(reason) if reason.is_configuration() => {
                vec![Notice::new(NoticeLevel::Info, reason.message())]
            }
            ValidationResult::Invalid(reason) => vec![Notice::new(NoticeLevel::Error, reason.message())],
        }
    }

    /// Pushes the page notices to the host.
    pub fn show_notices(&self, query: &AdminQuery, host: &dyn HostApi) -> usize {
        let notices = self.settings_notices(query);
        for notice in &notices {
            host.notify(notice);
        }
        notices.len()
    }

    /// Admin-bar link that triggers a manual purge; `None` for principals
    /// without the capability or when tokens are not configured.
    pub fn purge_link(&self, principal: &Principal) -> Option<String> {
        if !principal.can_manage_cache() {
            return None;
        }
        let token = self.controller.issue_purge_token(&principal.id)?;
        Some(format!("{ADMIN_PAGE}&action={PURGE_ACTION}&_wpnonce={token}"))
    }

    /// Stores new settings on behalf of `principal`.
    pub fn update_settings(
        &self,
        host: &dyn HostApi,
        path: Option<&str>,
        auto_purge: Option<bool>,
    ) -> Result<Redirect, AdminError> {
        let principal = host.current_principal().ok_or(AdminError::Anonymous)?;
        if !principal.permissions.manage_settings {
            return Err(AdminError::Forbidden(principal.id));
        }

        let settings = host.settings();
        if let Some(path) = path {
            settings.set(CACHE_PATH_KEY, SettingValue::Text(path.to_string()))?;
        }
        if let Some(auto_purge) = auto_purge {
            settings.set(AUTO_PURGE_KEY, SettingValue::Int(u64::from(auto_purge)))?;
        }
        tracing::info!(principal = %principal.id, "settings updated");
        Ok(Redirect {
            location: format!("{ADMIN_PAGE}&settings-updated=true"),
        })
    }
}

fn reason_from_code(code: &str) -> Option<ValidationReason> {
    [
        ValidationReason::PathEmpty,
        ValidationReason::PathNotFound,
        ValidationReason::NotADirectory,
        ValidationReason::NotACacheZoneShape,
        ValidationReason::NotWritable,
        ValidationReason::FilesystemUnavailable,
    ]
    .into_iter()
    .find(|reason| reason.code() == code)
}
