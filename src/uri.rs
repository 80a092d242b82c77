//! `sdb://profile/key` references.

use crate::{Result, SdbError};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "sdb://";

/// A parsed sdb reference.
///
/// The first path segment names the profile; everything after it is the
/// secret key, slashes included.
///
/// ```
/// use barbican_sdb::SdbUri;
///
/// let uri: SdbUri = "sdb://pwd/app/db-password".parse().unwrap();
/// assert_eq!(uri.profile, "pwd");
/// assert_eq!(uri.key, "app/db-password");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdbUri {
    pub profile: String,
    pub key: String,
}

impl SdbUri {
    pub fn new(profile: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            key: key.into(),
        }
    }
}

impl FromStr for SdbUri {
    type Err = SdbError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| SdbError::InvalidUri(format!("{} does not start with {}", s, SCHEME)))?;

        let (profile, key) = rest
            .split_once('/')
            .ok_or_else(|| SdbError::InvalidUri(format!("{} has no key", s)))?;

        if profile.is_empty() {
            return Err(SdbError::InvalidUri(format!("{} has no profile", s)));
        }
        if key.is_empty() {
            return Err(SdbError::InvalidUri(format!("{} has no key", s)));
        }

        Ok(Self::new(profile, key))
    }
}

impl fmt::Display for SdbUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.profile, self.key)
    }
}
