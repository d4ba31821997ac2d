//! Latest progress figures of the running transfer.

use crate::event::{SpeedUpdate, TransferRoute};

/// Last-write-wins view of `speed_update` events. Fields absent from an
/// update keep their previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub speed: Option<String>,
    pub elapsed_time: Option<String>,
    pub transferred_bytes: Option<u64>,
    pub transferred_human: Option<String>,
    pub source_server: Option<String>,
    pub target_server: Option<String>,
    pub route: Option<TransferRoute>,
}

impl ProgressSnapshot {
    pub fn apply(&mut self, update: &SpeedUpdate) {
        if update.speed.is_some() {
            self.speed.clone_from(&update.speed);
        }
        if update.elapsed_time.is_some() {
            self.elapsed_time.clone_from(&update.elapsed_time);
        }
        if update.transferred_bytes.is_some() {
            self.transferred_bytes = update.transferred_bytes;
        }
        if update.transferred_human.is_some() {
            self.transferred_human.clone_from(&update.transferred_human);
        } else if let Some(bytes) = update.transferred_bytes {
            self.transferred_human = Some(format_size(bytes as f64));
        }
        if update.source_server.is_some() {
            self.source_server.clone_from(&update.source_server);
        }
        if update.target_server.is_some() {
            self.target_server.clone_from(&update.target_server);
        }
        if update.transfer_mode.is_some() {
            self.route = update.transfer_mode;
        }
    }

    /// Success message for the activity log, with the amount moved and the
    /// average speed when both the byte count and total time are known.
    pub fn completion_banner(&self, total_time: Option<&str>) -> String {
        let mut banner = "✅ Transfer complete".to_string();
        if let Some(human) = &self.transferred_human {
            banner.push_str(&format!(" ({human})"));
        }
        if let Some(total) = total_time {
            if let (Some(secs), Some(bytes)) = (parse_hms(total), self.transferred_bytes) {
                if secs > 0 && bytes > 0 {
                    let avg = bytes as f64 / secs as f64;
                    banner.push_str(&format!(", average {}/s", format_size(avg)));
                }
            }
            banner.push_str(&format!(" - total time {total}"));
        }
        banner
    }
}

/// Human-readable byte count: `512 B`, `1.50 KB`, `3.20 GB`.
pub fn format_size(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", value as u64)
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Formats seconds as `HH:MM:SS`.
pub fn format_hms(total_secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// Parses `HH:MM:SS` into seconds.
pub fn parse_hms(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let mut total = 0u64;
    for (part, scale) in parts.iter().zip([3600u64, 60, 1]) {
        total += part.trim().parse::<u64>().ok()? * scale;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_keep_previous_value() {
        let mut snap = ProgressSnapshot::default();
        snap.apply(&SpeedUpdate {
            transfer_id: "t".into(),
            speed: Some("1 MB/s".into()),
            elapsed_time: Some("00:00:01".into()),
            ..SpeedUpdate::default()
        });
        snap.apply(&SpeedUpdate {
            transfer_id: "t".into(),
            speed: Some("2 MB/s".into()),
            ..SpeedUpdate::default()
        });
        assert_eq!(snap.speed.as_deref(), Some("2 MB/s"));
        assert_eq!(snap.elapsed_time.as_deref(), Some("00:00:01"));
    }

    #[test]
    fn bytes_fill_in_human_size() {
        let mut snap = ProgressSnapshot::default();
        snap.apply(&SpeedUpdate {
            transfer_id: "t".into(),
            transferred_bytes: Some(1536),
            ..SpeedUpdate::default()
        });
        assert_eq!(snap.transferred_human.as_deref(), Some("1.50 KB"));
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512.0), "512 B");
        assert_eq!(format_size(1024.0 * 1024.0 * 3.0), "3.00 MB");
    }

    #[test]
    fn hms_round_trip_values() {
        assert_eq!(format_hms(3725), "01:02:05");
        assert_eq!(parse_hms("01:02:05"), Some(3725));
        assert_eq!(parse_hms("5s"), None);
    }

    #[test]
    fn banner_includes_average_speed() {
        let snap = ProgressSnapshot {
            transferred_bytes: Some(10 * 1024 * 1024),
            transferred_human: Some("10.00 MB".into()),
            ..ProgressSnapshot::default()
        };
        let banner = snap.completion_banner(Some("00:00:10"));
        assert!(banner.starts_with("✅"));
        assert!(banner.contains("10.00 MB"));
        assert!(banner.contains("1.00 MB/s"));
        assert!(banner.contains("00:00:10"));
    }
}
