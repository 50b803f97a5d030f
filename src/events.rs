use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{db::SiteInfo, host::IdleState};

/// Inbound notifications from the browser, in the order they happened.
///
/// Serialized as tagged JSON, e.g. `{"type":"targetActivated","url":"https://a.com/"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Attention moved to another tab.
    TargetActivated { url: Option<String> },
    /// The active tab navigated.
    TargetUrlChanged { url: Option<String> },
    FocusLost,
    FocusGained { url: Option<String> },
    PopupOpened,
    /// `url` is the active tab once the popup is gone, when the host knows it.
    PopupClosed {
        #[serde(default)]
        url: Option<String>,
    },
    SystemSuspending,
    SystemStarting,
    IdleSignal { state: IdleState },
    #[serde(rename_all = "camelCase")]
    PreferenceChanged { idle_tracking_enabled: bool },
    /// Persist the current dwell time without counting a session.
    FlushRequested,
    /// The settings file was rewritten by another process.
    SettingsChanged,
    /// Deletes one day's aggregate, or everything when `date` is absent.
    ClearData {
        #[serde(default)]
        date: Option<NaiveDate>,
    },
    ExportRequested,
}

/// Answers to the events that ask for one.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineReply {
    #[serde(rename_all = "camelCase")]
    Export {
        available_dates: Vec<NaiveDate>,
        site_info: SiteInfo,
    },
    Cleared {
        date: Option<NaiveDate>,
        removed: usize,
    },
}

impl EngineEvent {
    /// The active tab URL this event reports, if it reports one.
    pub fn reported_url(&self) -> Option<Option<&str>> {
        match self {
            Self::TargetActivated { url }
            | Self::TargetUrlChanged { url }
            | Self::FocusGained { url } => Some(url.as_deref()),
            Self::PopupClosed { url: Some(url) } => Some(Some(url.as_str())),
            _ => None,
        }
    }
}
