//! bootc image upgrade commands

use std::time::Duration;

/// Unit bootc ships for automatic upgrades
pub const BOOTC_UPDATE_SERVICE: &str = "bootc-fetch-apply-updates.service";

/// Transient unit labsync schedules upgrades under
pub const UPGRADE_UNIT: &str = "labsync-bootc-upgrade";

/// Delay before a scheduled upgrade starts
pub const UPGRADE_DELAY: &str = "30s";

pub const PROBE_COMMAND: &str = "command -v bootc";
pub const CHECK_COMMAND: &str = "bootc upgrade --check";

/// `bootc upgrade --check` contacts the image registry
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(300);

/// Units whose activity means an upgrade is already underway
#[must_use]
pub fn in_progress_units() -> [String; 2] {
    [
        BOOTC_UPDATE_SERVICE.to_string(),
        format!("{UPGRADE_UNIT}.timer"),
    ]
}

#[must_use]
pub fn is_active_command(unit: &str) -> String {
    format!("systemctl is-active {}", shell_words::quote(unit))
}

#[must_use]
pub fn schedule_command() -> String {
    format!("systemd-run --unit={UPGRADE_UNIT} --on-active={UPGRADE_DELAY} bootc upgrade --apply")
}

/// `systemctl is-active` output meaning the unit is running or starting
#[must_use]
pub fn is_active_state(output: &str) -> bool {
    matches!(output.trim(), "active" | "activating")
}

/// Whether `bootc upgrade --check` reported a newer image
#[must_use]
pub fn update_available(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.trim_start().starts_with("Update available"))
}
