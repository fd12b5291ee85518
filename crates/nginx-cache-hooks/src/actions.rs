use crate::bus::HookRegistry;
use nginx_cache_core::{format_error_chain, ErrorKind, PurgeController, TriggerContext};
use std::sync::{Arc, Weak};

/// Content-changing events that purge the zone when auto-purge is on.
pub const DEFAULT_PURGE_ACTIONS: &[&str] = &[
    "publish_phone",
    "save_post",
    "edit_post",
    "delete_post",
    "wp_trash_post",
    "clean_post_cache",
    "trackback_post",
    "pingback_post",
    "comment_post",
    "edit_comment",
    "delete_comment",
    "wp_set_comment_status",
    "switch_theme",
    "wp_update_nav_menu",
    "edit_user_profile_update",
];

/// Ordered, de-duplicated list of event names to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeActions {
    names: Vec<String>,
}

impl Default for PurgeActions {
    fn default() -> Self {
        Self::from_names(DEFAULT_PURGE_ACTIONS.iter().copied())
    }
}

impl PurgeActions {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut actions = Self { names: Vec::new() };
        for name in names {
            actions = actions.with(name);
        }
        actions
    }

    /// Configured override, or the defaults when none is set.
    pub fn from_config(names: Option<&[String]>) -> Self {
        match names {
            Some(names) => Self::from_names(names.iter().map(|n| n.trim()).filter(|n| !n.is_empty())),
            None => Self::default(),
        }
    }

    pub fn with(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.names.retain(|n| n != name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Subscribes a once-per-context purge to every action.
///
/// Does nothing unless auto-purge is enabled. Returns the number of
/// subscriptions made. Events fired without a context get a fresh one each.
pub fn register_auto_purge(
    registry: &HookRegistry,
    controller: &Arc<PurgeController>,
    actions: &PurgeActions,
) -> usize {
    if !controller.settings().cache_zone_config().auto_purge {
        tracing::debug!("auto purge disabled, no actions registered");
        return 0;
    }

    for action in actions.iter() {
        let controller: Weak<PurgeController> = Arc::downgrade(controller);
        registry.add_action(action, move |event| {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            let result = match event.context {
                Some(ctx) => controller.request_purge_once(ctx),
                None => controller.request_purge_once(&TriggerContext::new(event.name)),
            };
            if let Err(err) = result {
                let chain = format_error_chain(&err);
                match err.kind() {
                    ErrorKind::Configuration => {
                        tracing::debug!(hook = event.name, error = %chain, "auto purge skipped")
                    }
                    _ => tracing::warn!(hook = event.name, error = %chain, "auto purge failed"),
                }
            }
        });
    }

    tracing::info!(count = actions.len(), "auto purge registered");
    actions.len()
}
