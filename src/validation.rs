//! Input validation for secret and profile names.

use crate::{Result, SdbError};

/// Maximum secret name length accepted by Barbican.
const MAX_NAME_LENGTH: usize = 255;

/// Validates a secret name before it is sent to a backend.
///
/// Rejects:
/// - Empty names
/// - Names longer than 255 bytes
/// - Null bytes
/// - Control characters
///
/// # Errors
///
/// Returns [`SdbError::InvalidSecretName`] if validation fails.
///
/// # Example
///
/// ```
/// use barbican_sdb::validation::validate_secret_name;
///
/// assert!(validate_secret_name("user1").is_ok());
/// assert!(validate_secret_name("prod/db password").is_ok());
///
/// assert!(validate_secret_name("").is_err());
/// assert!(validate_secret_name("bad\nname").is_err());
/// ```
pub fn validate_secret_name(name: &str) -> Result<()> {
    match name_problem(name) {
        Some(problem) => Err(SdbError::InvalidSecretName(problem)),
        None => Ok(()),
    }
}

/// Validates a profile name. Profile names are path segments of an sdb URI,
/// so `/` is rejected on top of the secret name rules.
///
/// # Errors
///
/// Returns [`SdbError::InvalidProfile`] if validation fails.
pub fn validate_profile_name(name: &str) -> Result<()> {
    let problem = name_problem(name).or_else(|| {
        name.contains('/')
            .then(|| "name cannot contain '/'".to_string())
    });

    match problem {
        Some(problem) => Err(SdbError::InvalidProfile(format!(
            "profile {:?}: {}",
            name, problem
        ))),
        None => Ok(()),
    }
}

fn name_problem(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("name cannot be empty".to_string());
    }

    if name.len() > MAX_NAME_LENGTH {
        return Some(format!(
            "name exceeds maximum length of {} bytes",
            MAX_NAME_LENGTH
        ));
    }

    if name.contains('\0') {
        return Some("name contains null byte".to_string());
    }

    if name.chars().any(char::is_control) {
        return Some("name contains control characters".to_string());
    }

    None
}
