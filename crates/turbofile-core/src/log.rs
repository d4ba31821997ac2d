//! User-facing activity log.
//!
//! This is the message list shown to the user, not diagnostics (those go
//! through `tracing`). It keeps the newest [`LogConfig::max_entries`]
//! entries, drops progress chatter while a transfer is running and filters
//! `transfer_log` messages down to the announcements worth keeping.

use std::collections::VecDeque;

use chrono::{DateTime, Local};

use crate::config::settings::LogConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ActivityLog {
    config: LogConfig,
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn new(config: LogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.max_entries),
            config,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns `true` if `message` looks like a progress report.
    pub fn is_progress(&self, message: &str) -> bool {
        self.config
            .progress_keywords
            .iter()
            .any(|k| message.contains(k.as_str()))
    }

    /// Appends a message. While `transferring`, progress-shaped messages
    /// are dropped. Returns `true` if the message was kept.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, transferring: bool) -> bool {
        let message = message.into();
        if transferring && self.is_progress(&message) {
            return false;
        }
        if self.config.max_entries == 0 {
            return false;
        }
        while self.entries.len() >= self.config.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message,
        });
        true
    }

    /// Classifies a `transfer_log` message. Returns `None` for messages
    /// outside the allow-list.
    pub fn classify_transfer_log(&self, message: &str) -> Option<LogLevel> {
        let keep = self
            .config
            .transfer_log_prefixes
            .iter()
            .any(|p| message.starts_with(p.as_str()));
        if !keep {
            return None;
        }
        Some(if message.starts_with('❌') {
            LogLevel::Error
        } else if message.contains('✅') {
            LogLevel::Success
        } else {
            LogLevel::Info
        })
    }

    /// Records a `transfer_log` message if it passes the allow-list.
    pub fn push_transfer_log(&mut self, message: &str) -> bool {
        match self.classify_transfer_log(message) {
            // Allow-listed messages are announcements, never progress.
            Some(level) => self.push(level, message, false),
            None => false,
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_entries() {
        let mut log = ActivityLog::new(LogConfig {
            max_entries: 3,
            ..LogConfig::default()
        });
        for i in 0..5 {
            log.push(LogLevel::Info, format!("m{i}"), false);
        }
        let messages: Vec<&str> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn progress_suppressed_only_while_transferring() {
        let mut log = ActivityLog::default();
        assert!(!log.push(LogLevel::Info, "copied 42%", true));
        assert!(!log.push(LogLevel::Info, "3.1 MB/s", true));
        assert!(log.push(LogLevel::Info, "copied 42%", false));
        assert!(log.push(LogLevel::Info, "starting", true));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn transfer_log_allow_list() {
        let log = ActivityLog::default();
        assert_eq!(log.classify_transfer_log("📤 Source: S1:/src"), Some(LogLevel::Info));
        assert_eq!(log.classify_transfer_log("📋 Files: 3"), Some(LogLevel::Info));
        assert_eq!(log.classify_transfer_log("❌ f.txt: denied"), Some(LogLevel::Error));
        assert_eq!(log.classify_transfer_log("✅ Transfer complete"), Some(LogLevel::Success));
        assert_eq!(log.classify_transfer_log("sending incremental file list"), None);
        assert_eq!(log.classify_transfer_log("  1,024 100%  1.00MB/s"), None);
    }

    #[test]
    fn transfer_log_push_respects_filter() {
        let mut log = ActivityLog::default();
        assert!(!log.push_transfer_log("noise"));
        assert!(log.push_transfer_log("📥 Target: S2:/dst"));
        assert_eq!(log.last().unwrap().level, LogLevel::Info);
    }
}
