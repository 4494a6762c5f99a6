//! Desktop notifications via notify-rust.

use notify_rust::Notification;
use tracing::{debug, warn};

use crate::update::UpdateInfo;

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn notify(&self, summary: &str, body: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .summary(summary)
            .body(body)
            .icon("software-update-available")
            .timeout(5000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }

    pub fn update_available(&self, info: &UpdateInfo, current_version: &str) {
        self.notify(
            "Update available",
            &update_body(info, current_version),
        );
    }
}

fn update_body(info: &UpdateInfo, current_version: &str) -> String {
    format!(
        "Version {} is available (you have {current_version}).\n{}",
        info.version, info.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_body_names_both_versions() {
        let info = UpdateInfo {
            version: "1.2.0".into(),
            url: "https://example.invalid/v1.2.0".into(),
            notes: String::new(),
            download_url: String::new(),
        };
        let body = update_body(&info, "1.0.1");
        assert!(body.contains("1.2.0"));
        assert!(body.contains("1.0.1"));
        assert!(body.ends_with("https://example.invalid/v1.2.0"));
    }
}
