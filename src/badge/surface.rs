use std::sync::Mutex;

use log::info;

/// Where the live indicator is drawn (toolbar badge, tray title, ...).
pub trait BadgeSurface: Send + Sync {
    fn set_text(&self, text: &str);
    fn set_color(&self, color: &str);
}

/// Headless surface: logs indicator changes instead of drawing them.
#[derive(Debug, Default)]
pub struct LogSurface {
    last: Mutex<String>,
}

impl BadgeSurface for LogSurface {
    fn set_text(&self, text: &str) {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *last != text {
            info!("badge: {:?}", text);
            *last = text.to_string();
        }
    }

    fn set_color(&self, _color: &str) {}
}

/// Keeps every published value; handy for hosts that poll and for tests.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    texts: Mutex<Vec<String>>,
    color: Mutex<Option<String>>,
}

impl RecordingSurface {
    pub fn texts(&self) -> Vec<String> {
        match self.texts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().last().cloned()
    }

    pub fn color(&self) -> Option<String> {
        match self.color.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl BadgeSurface for RecordingSurface {
    fn set_text(&self, text: &str) {
        let mut texts = match self.texts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        texts.push(text.to_string());
    }

    fn set_color(&self, color: &str) {
        let mut slot = match self.color.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(color.to_string());
    }
}
