use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tokio::sync::watch;

use crate::tracker::normalize_domain_input;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DefaultView {
    #[default]
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "1W")]
    Week,
    #[serde(rename = "1M")]
    Month,
    #[serde(rename = "1Y")]
    Year,
    #[serde(rename = "total")]
    Total,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub idle_tracking_enabled: bool,
    pub ignored_domains: Vec<String>,
    pub default_view: DefaultView,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            idle_tracking_enabled: true,
            ignored_domains: Vec::new(),
            default_view: DefaultView::Today,
        }
    }
}

/// JSON-file backed user settings with change notification.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
    changes: watch::Sender<AppSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                AppSettings::default()
            })
        } else {
            AppSettings::default()
        };

        let (changes, _) = watch::channel(data.clone());
        Ok(Self {
            path,
            data: RwLock::new(data),
            changes,
        })
    }

    pub fn current(&self) -> AppSettings {
        self.read().clone()
    }

    pub fn idle_tracking_enabled(&self) -> bool {
        self.read().idle_tracking_enabled
    }

    pub fn ignored_domains(&self) -> Vec<String> {
        self.read().ignored_domains.clone()
    }

    /// Receives every settings value written after this call.
    pub fn subscribe(&self) -> watch::Receiver<AppSettings> {
        self.changes.subscribe()
    }

    pub fn update(&self, settings: AppSettings) -> Result<()> {
        {
            let mut guard = self.write();
            *guard = settings.clone();
            self.persist(&guard)?;
        }
        self.changes.send_replace(settings);
        Ok(())
    }

    pub fn set_idle_tracking_enabled(&self, enabled: bool) -> Result<()> {
        let mut settings = self.current();
        settings.idle_tracking_enabled = enabled;
        self.update(settings)
    }

    /// Adds a host to the ignore list. Returns `false` when the input was
    /// empty or already present.
    pub fn add_ignored_domain(&self, raw: &str) -> Result<bool> {
        let Some(domain) = normalize_domain_input(raw) else {
            return Ok(false);
        };

        let mut settings = self.current();
        if settings.ignored_domains.contains(&domain) {
            return Ok(false);
        }
        settings.ignored_domains.push(domain);
        self.update(settings)?;
        Ok(true)
    }

    pub fn remove_ignored_domain(&self, domain: &str) -> Result<bool> {
        let mut settings = self.current();
        let before = settings.ignored_domains.len();
        settings.ignored_domains.retain(|d| d != domain);
        if settings.ignored_domains.len() == before {
            return Ok(false);
        }
        self.update(settings)?;
        Ok(true)
    }

    /// Re-reads the file after another writer changed it and broadcasts the
    /// result. A bad file leaves the current settings in place.
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        *self.write() = data.clone();
        self.changes.send_replace(data);
        Ok(())
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, AppSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn defaults_when_file_missing_or_partial() {
        let (dir, store) = store();
        assert_eq!(store.current(), AppSettings::default());

        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"idleTrackingEnabled": false}"#).unwrap();
        let partial = SettingsStore::new(path).unwrap().current();
        assert!(!partial.idle_tracking_enabled);
        assert!(partial.ignored_domains.is_empty());
        assert_eq!(partial.default_view, DefaultView::Today);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(
            SettingsStore::new(path).unwrap().current(),
            AppSettings::default()
        );
    }

    #[test]
    fn serializes_with_camel_case_and_view_codes() {
        let settings = AppSettings {
            idle_tracking_enabled: false,
            ignored_domains: vec!["example.com".into()],
            default_view: DefaultView::Week,
        };
        assert_eq!(
            serde_json::to_value(&settings).unwrap(),
            serde_json::json!({
                "idleTrackingEnabled": false,
                "ignoredDomains": ["example.com"],
                "defaultView": "1W"
            })
        );
    }

    #[test]
    fn update_persists_and_notifies() {
        let (dir, store) = store();
        let rx = store.subscribe();

        store.set_idle_tracking_enabled(false).unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow().idle_tracking_enabled);

        let reopened = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert!(!reopened.idle_tracking_enabled());
    }

    #[test]
    fn ignored_domains_are_normalized_and_deduplicated() {
        let (_dir, store) = store();

        assert!(store.add_ignored_domain(" HTTPS://News.Example.com/x ").unwrap());
        assert!(!store.add_ignored_domain("news.example.com").unwrap());
        assert!(!store.add_ignored_domain("   ").unwrap());
        assert_eq!(store.ignored_domains(), vec!["news.example.com".to_string()]);

        assert!(store.remove_ignored_domain("news.example.com").unwrap());
        assert!(!store.remove_ignored_domain("news.example.com").unwrap());
        assert!(store.ignored_domains().is_empty());
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let (dir, store) = store();
        let rx = store.subscribe();
        let path = dir.path().join("settings.json");

        fs::write(
            &path,
            r#"{"idleTrackingEnabled": false, "ignoredDomains": ["example.com"]}"#,
        )
        .unwrap();
        store.reload().unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(!store.idle_tracking_enabled());
        assert_eq!(store.ignored_domains(), vec!["example.com".to_string()]);

        fs::write(&path, "{broken").unwrap();
        assert!(store.reload().is_err());
        assert!(!store.idle_tracking_enabled());
    }
}
