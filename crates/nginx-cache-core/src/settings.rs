//! Key-value settings consumed by the purge core.
//!
//! The host owns the values; the core only ever reads the two keys below.
//! Both are sanitized on the way in and again on the way out, so a value
//! written by some other tool cannot smuggle markup or control characters
//! into a filesystem path.

use crate::config::{CacheZoneConfig, CoreConfig};
use crate::error::{CoreError, CoreResult};
use std::path::PathBuf;
use std::sync::Mutex;

pub const CACHE_PATH_KEY: &str = "nginx_cache_path";
pub const AUTO_PURGE_KEY: &str = "nginx_auto_purge";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    Int(u64),
}

impl SettingValue {
    pub fn as_text(&self) -> String {
        match self {
            SettingValue::Text(s) => s.clone(),
            SettingValue::Int(n) => n.to_string(),
        }
    }

    pub fn as_int(&self) -> u64 {
        match self {
            SettingValue::Int(n) => *n,
            SettingValue::Text(s) => absint(s),
        }
    }
}

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<SettingValue>;
    fn set(&self, key: &str, value: SettingValue) -> CoreResult<()>;

    fn cache_zone_config(&self) -> CacheZoneConfig {
        CacheZoneConfig {
            path: self
                .get(CACHE_PATH_KEY)
                .map(|v| sanitize_text_field(&v.as_text()))
                .unwrap_or_default(),
            auto_purge: self.get(AUTO_PURGE_KEY).map(|v| v.as_int()).unwrap_or(0) != 0,
        }
    }
}

/// Strips tags, drops control characters, collapses whitespace and trims.
pub fn sanitize_text_field(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            c if c.is_control() => stripped.push(' '),
            c => stripped.push(c),
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Absolute integer value of a loosely typed setting. Non-numeric text is 0.
pub fn absint(raw: &str) -> u64 {
    let trimmed = raw.trim();
    let digits: String = trimmed
        .strip_prefix(['-', '+'])
        .unwrap_or(trimmed)
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn read_key(cfg: &CoreConfig, key: &str) -> Option<SettingValue> {
    match key {
        CACHE_PATH_KEY => Some(SettingValue::Text(sanitize_text_field(&cfg.cache.path))),
        AUTO_PURGE_KEY => Some(SettingValue::Int(u64::from(cfg.cache.auto_purge))),
        _ => None,
    }
}

fn write_key(cfg: &mut CoreConfig, key: &str, value: SettingValue) -> CoreResult<()> {
    match key {
        CACHE_PATH_KEY => cfg.cache.path = sanitize_text_field(&value.as_text()),
        AUTO_PURGE_KEY => cfg.cache.auto_purge = value.as_int() != 0,
        other => return Err(CoreError::Config(format!("unknown setting: {other}"))),
    }
    Ok(())
}

/// Settings held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<CoreConfig>,
}

impl MemorySettings {
    pub fn new(cfg: CoreConfig) -> Self {
        Self {
            inner: Mutex::new(cfg),
        }
    }

    pub fn with_cache(path: impl Into<String>, auto_purge: bool) -> Self {
        let mut cfg = CoreConfig::default();
        cfg.cache = CacheZoneConfig {
            path: path.into(),
            auto_purge,
        };
        Self::new(cfg)
    }

    pub fn snapshot(&self) -> CoreConfig {
        self.inner.lock().expect("settings lock").clone()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<SettingValue> {
        read_key(&self.inner.lock().expect("settings lock"), key)
    }

    fn set(&self, key: &str, value: SettingValue) -> CoreResult<()> {
        write_key(&mut self.inner.lock().expect("settings lock"), key, value)
    }
}

/// Settings backed by the JSON config file; every `set` is written through.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    inner: Mutex<CoreConfig>,
}

impl JsonFileSettings {
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let cfg = CoreConfig::load(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(cfg),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn snapshot(&self) -> CoreConfig {
        self.inner.lock().expect("settings lock").clone()
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<SettingValue> {
        read_key(&self.inner.lock().expect("settings lock"), key)
    }

    fn set(&self, key: &str, value: SettingValue) -> CoreResult<()> {
        let mut cfg = self.inner.lock().expect("settings lock");
        let mut next = cfg.clone();
        write_key(&mut next, key, value)?;
        next.save(&self.path)?;
        *cfg = next;
        tracing::debug!(key, path = %self.path.display(), "setting saved");
        Ok(())
    }
}
