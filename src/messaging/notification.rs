// Notifications - Session → UI events and user-facing alerts

use crate::sequencer::pattern::ChannelId;
use crate::sequencer::transport::{TransportNotice, TransportState};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// Area an alert comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCategory {
    Transport,
    Sample,
    Project,
    Export,
}

/// Message shown to the user, with a timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub category: AlertCategory,
    pub message: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Alert {
    pub fn new(level: AlertLevel, category: AlertCategory, message: impl Into<String>) -> Self {
        Self {
            level,
            category,
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    pub fn info(category: AlertCategory, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, category, message)
    }

    pub fn warning(category: AlertCategory, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, category, message)
    }

    pub fn error(category: AlertCategory, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, category, message)
    }

    /// Whether the alert is younger than `max_age_ms`
    pub fn is_recent(&self, max_age_ms: u64) -> bool {
        now_millis().saturating_sub(self.timestamp) < max_age_ms
    }
}

/// Everything the UI is told about
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    TransportState(TransportState),
    /// Highlighted step, `None` when stopped
    StepChanged(Option<usize>),
    RecordingSaved {
        channel_id: ChannelId,
        notes: usize,
        hits: usize,
    },
    /// Interactive transport is blocked while an export runs
    ExportStarted,
    /// Render progress, 0.0 to 1.0
    ExportProgress(f32),
    ExportFinished { path: PathBuf, bytes: usize },
    Alert(Alert),
}

impl Notification {
    pub fn error(category: AlertCategory, message: impl Into<String>) -> Self {
        Notification::Alert(Alert::error(category, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notification::Alert(alert) if alert.level == AlertLevel::Error)
    }
}

impl From<TransportNotice> for Notification {
    fn from(notice: TransportNotice) -> Self {
        match notice {
            TransportNotice::StateChanged(state) => Notification::TransportState(state),
            TransportNotice::StepChanged(step) => Notification::StepChanged(step),
            TransportNotice::RecordingSaved {
                channel_id,
                notes,
                hits,
            } => Notification::RecordingSaved {
                channel_id,
                notes,
                hits,
            },
        }
    }
}
