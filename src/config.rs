//! Connection profiles.
//!
//! A profile is a named block of configuration with a `driver` key and
//! driver-specific options. Profiles usually live in the automation
//! runtime's master configuration:
//!
//! ```yaml
//! pwd:
//!   driver: barbican
//!   auth_url: 'https://auth.cloud.ovh.net/v3'
//!   username: 'user-xxxxxxxxxxxx'
//!   user_domain_name: 'Default'
//!   password: 'xxxxxxxx'
//!   project_name: 'xxxxxxxxxxxxxxxxx'
//!   project_domain_name: 'Default'
//! ```

use crate::validation::validate_profile_name;
use crate::{Result, SdbError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Session TTL used when a profile does not set `session_ttl`.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(1800);

/// Option keys whose values are never printed.
const REDACTED_OPTIONS: &[&str] = &["password"];

/// Driver identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// OpenStack Barbican, authenticated through Keystone v3
    Barbican,
    /// In-memory backend for tests
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Barbican => write!(f, "barbican"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for BackendType {
    type Err = SdbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "barbican" => Ok(Self::Barbican),
            "mock" => Ok(Self::Mock),
            other => Err(SdbError::UnknownDriver(other.to_string())),
        }
    }
}

/// A single connection profile.
///
/// ```
/// use barbican_sdb::{BackendType, Profile};
///
/// let profile = Profile::new(BackendType::Barbican)
///     .with_option("auth_url", "https://keystone.example.com/v3")
///     .with_option("region_name", "GRA");
///
/// assert_eq!(profile.get_option("region_name").map(String::as_str), Some("GRA"));
/// assert!(profile.require("username").is_err());
/// ```
#[derive(Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawProfile")]
pub struct Profile {
    /// Driver that serves this profile
    pub driver: BackendType,

    /// Driver-specific options, stringified
    pub options: HashMap<String, String>,
}

impl Profile {
    /// Creates an empty profile for the given driver.
    pub fn new(driver: BackendType) -> Self {
        Self {
            driver,
            options: HashMap::new(),
        }
    }

    /// Adds a driver-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets the file used to cache authentication tokens between calls.
    pub fn with_session_file(self, path: impl Into<String>) -> Self {
        self.with_option("session_file", path)
    }

    /// Sets how long a cached token is trusted.
    pub fn with_session_ttl(self, ttl: Duration) -> Self {
        self.with_option("session_ttl", ttl.as_secs().to_string())
    }

    /// Gets an option value.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }

    /// Gets an option that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::MissingProfileKey`] if the key is absent.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.options
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SdbError::MissingProfileKey(key.to_string()))
    }

    /// Token cache location, if caching is enabled.
    pub fn session_file(&self) -> Option<&str> {
        self.options.get("session_file").map(String::as_str)
    }

    /// Token cache lifetime (`session_ttl`, in seconds).
    pub fn session_ttl(&self) -> Result<Duration> {
        self.duration_option("session_ttl", DEFAULT_SESSION_TTL)
    }

    /// Parses a whole-seconds option, falling back to `default` when absent.
    pub fn duration_option(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.options.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                SdbError::InvalidProfile(format!("{} must be a number of seconds, got '{}'", key, raw))
            }),
        }
    }
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut options: Vec<(&String, &str)> = self
            .options
            .iter()
            .map(|(k, v)| {
                if REDACTED_OPTIONS.contains(&k.as_str()) {
                    (k, "<redacted>")
                } else {
                    (k, v.as_str())
                }
            })
            .collect();
        options.sort();

        f.debug_struct("Profile")
            .field("driver", &self.driver)
            .field("options", &options)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawProfile {
    driver: String,
    #[serde(flatten)]
    options: HashMap<String, serde_yaml::Value>,
}

impl TryFrom<RawProfile> for Profile {
    type Error = SdbError;

    fn try_from(raw: RawProfile) -> Result<Self> {
        let driver = raw.driver.parse()?;
        let mut options = HashMap::with_capacity(raw.options.len());

        for (key, value) in raw.options {
            let value = match value {
                serde_yaml::Value::Null => continue,
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(SdbError::InvalidProfile(format!(
                        "option {} must be a scalar value",
                        key
                    )))
                }
            };
            options.insert(key, value);
        }

        Ok(Self { driver, options })
    }
}

/// Named set of profiles.
#[derive(Debug, Clone, Default)]
pub struct Profiles {
    profiles: HashMap<String, Profile>,
}

impl Profiles {
    /// Creates an empty profile set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses profiles from a YAML document.
    ///
    /// Every top-level mapping that has a `driver` key is a profile; all
    /// other top-level keys are ignored, so a complete master configuration
    /// file can be passed as-is.
    ///
    /// # Errors
    ///
    /// Fails on malformed YAML, an unknown driver, or non-scalar option values.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let document: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let mut profiles = Self::new();

        let serde_yaml::Value::Mapping(entries) = document else {
            return Ok(profiles);
        };

        for (name, body) in entries {
            let (Some(name), true) = (name.as_str(), body.get("driver").is_some()) else {
                continue;
            };
            validate_profile_name(name)?;
            let profile: Profile = serde_yaml::from_value(body)?;
            profiles.insert(name, profile);
        }

        Ok(profiles)
    }

    /// Reads and parses a YAML profile file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&contents)
    }

    /// Adds or replaces a profile.
    pub fn insert(&mut self, name: impl Into<String>, profile: Profile) {
        self.profiles.insert(name.into(), profile);
    }

    /// Looks up a profile by name.
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Profile names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
