use crate::error::SyncError;

use super::SettingsPatch;

const MIN_PASSWORD_LEN: usize = 8;

/// Prefix `https://` unless the URL already has an http(s) scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn invalid(msg: impl Into<String>) -> SyncError {
    SyncError::Validation(msg.into())
}

/// Check every present field and return the patch as it should be applied.
pub(super) fn normalize(patch: &SettingsPatch) -> Result<SettingsPatch, SyncError> {
    let mut patch = patch.clone();

    if let Some(username) = &mut patch.admin_username {
        *username = username.trim().to_string();
        if username.is_empty() {
            return Err(invalid("adminUsername must not be empty"));
        }
    }
    if let Some(password) = &patch.admin_password {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(invalid(format!(
                "adminPassword must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
    }
    if let Some(secs) = patch.initial_timer_seconds {
        if !(1..=60).contains(&secs) {
            return Err(invalid("initialTimerSeconds must be between 1 and 60"));
        }
    }
    if let Some(secs) = patch.confirmation_timer_seconds {
        if !(1..=30).contains(&secs) {
            return Err(invalid("confirmationTimerSeconds must be between 1 and 30"));
        }
    }
    if let Some(ms) = patch.security_scan_duration_ms {
        if ms < 1000 {
            return Err(invalid("securityScanDurationMs must be at least 1000"));
        }
    }
    if let Some(url) = &mut patch.default_destination_url {
        if url.trim().is_empty() {
            return Err(invalid("defaultDestinationUrl must not be empty"));
        }
        *url = normalize_url(url);
    }

    Ok(patch)
}
