//! Admin credential check.
//!
//! Besides the pair stored in the settings, the bootstrap pair below is
//! always accepted. It is the only way back in when the stored password is
//! lost or the store cannot be reached, and it is equally available to
//! anyone who reads this file. Deployments that care should treat the admin
//! screen as low-trust.

use super::Settings;

pub const BOOTSTRAP_USERNAME: &str = "admin";
pub const BOOTSTRAP_PASSWORD: &str = "admin123";

pub(super) fn verify_credentials(settings: &Settings, username: &str, password: &str) -> bool {
    let stored = username == settings.admin_username && password == settings.admin_password;
    let bootstrap = username == BOOTSTRAP_USERNAME && password == BOOTSTRAP_PASSWORD;
    stored || bootstrap
}
