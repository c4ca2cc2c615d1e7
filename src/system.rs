use anyhow::{Context, Result};
use pgkit::Identity;

/// Login name of the user running prepdev
///
/// Looked up by real uid through `identity`, falling back to `$USER`.
pub fn current_user(identity: &dyn Identity) -> Result<String> {
    #[allow(unsafe_code)]
    // SAFETY: getuid has no preconditions and cannot fail
    let uid = unsafe { libc::getuid() };

    if let Some(user) = identity.login_name(uid) {
        return Ok(user);
    }

    std::env::var("USER").with_context(|| format!("No account for uid {uid} and USER is unset"))
}
