//! Keystone v3 password authentication and service catalog lookup.

use crate::secret::parse_timestamp;
use crate::{Profile, Result, SdbError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Header carrying the issued token in a Keystone response.
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Catalog service type of the key manager.
pub const KEY_MANAGER_SERVICE: &str = "key-manager";

/// The six fields needed to obtain a project-scoped token.
#[derive(Clone)]
pub struct Credentials {
    pub auth_url: Url,
    pub username: String,
    pub user_domain_name: String,
    pub password: String,
    pub project_name: String,
    pub project_domain_name: String,
}

impl Credentials {
    /// Reads credentials from a profile.
    ///
    /// # Errors
    ///
    /// [`SdbError::MissingProfileKey`] for the first absent field, or
    /// [`SdbError::InvalidProfile`] when `auth_url` is not an absolute URL.
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        let auth_url = profile.require("auth_url")?;
        let username = profile.require("username")?;
        let user_domain_name = profile.require("user_domain_name")?;
        let password = profile.require("password")?;
        let project_name = profile.require("project_name")?;
        let project_domain_name = profile.require("project_domain_name")?;

        let auth_url = Url::parse(auth_url)
            .map_err(|e| SdbError::InvalidProfile(format!("auth_url {}: {}", auth_url, e)))?;

        Ok(Self {
            auth_url,
            username: username.to_string(),
            user_domain_name: user_domain_name.to_string(),
            password: password.to_string(),
            project_name: project_name.to_string(),
            project_domain_name: project_domain_name.to_string(),
        })
    }

    /// `<auth_url>/auth/tokens`, whether or not `auth_url` ends with a slash.
    pub fn tokens_url(&self) -> String {
        format!("{}/auth/tokens", self.auth_url.as_str().trim_end_matches('/'))
    }

    /// Identifies the token these credentials obtain: endpoint, user and
    /// project. Never includes the password.
    pub fn scope(&self) -> String {
        format!(
            "{} {}/{} {}/{}",
            self.auth_url.as_str().trim_end_matches('/'),
            self.user_domain_name,
            self.username,
            self.project_domain_name,
            self.project_name
        )
    }

    fn request_body(&self) -> AuthRequest<'_> {
        AuthRequest {
            auth: Auth {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: User {
                            name: &self.username,
                            domain: Domain {
                                name: &self.user_domain_name,
                            },
                            password: &self.password,
                        },
                    },
                },
                scope: Scope {
                    project: Project {
                        name: &self.project_name,
                        domain: Domain {
                            name: &self.project_domain_name,
                        },
                    },
                },
            },
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_url", &self.auth_url.as_str())
            .field("username", &self.username)
            .field("user_domain_name", &self.user_domain_name)
            .field("password", &"<redacted>")
            .field("project_name", &self.project_name)
            .field("project_domain_name", &self.project_domain_name)
            .finish()
    }
}

// Request body for POST /v3/auth/tokens

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: Auth<'a>,
}

#[derive(Serialize)]
struct Auth<'a> {
    identity: Identity<'a>,
    scope: Scope<'a>,
}

#[derive(Serialize)]
struct Identity<'a> {
    methods: [&'static str; 1],
    password: PasswordMethod<'a>,
}

#[derive(Serialize)]
struct PasswordMethod<'a> {
    user: User<'a>,
}

#[derive(Serialize)]
struct User<'a> {
    name: &'a str,
    domain: Domain<'a>,
    password: &'a str,
}

#[derive(Serialize)]
struct Domain<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Scope<'a> {
    project: Project<'a>,
}

#[derive(Serialize)]
struct Project<'a> {
    name: &'a str,
    domain: Domain<'a>,
}

// Response body

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    expires_at: Option<String>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// One service in the token's catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

/// A project-scoped Keystone token.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub catalog: Vec<CatalogEntry>,
}

impl Token {
    /// Finds the URL of `service_type` for `interface`, restricted to
    /// `region` when one is given.
    ///
    /// # Errors
    ///
    /// [`SdbError::NotFound`] when no catalog endpoint matches.
    pub fn endpoint(&self, service_type: &str, interface: &str, region: Option<&str>) -> Result<&str> {
        self.catalog
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|ep| {
                ep.interface == interface
                    && region.map_or(true, |r| {
                        ep.region.as_deref() == Some(r) || ep.region_id.as_deref() == Some(r)
                    })
            })
            .map(|ep| ep.url.as_str())
            .ok_or_else(|| {
                SdbError::NotFound(format!(
                    "{} endpoint (interface {}, region {}) in the service catalog",
                    service_type,
                    interface,
                    region.unwrap_or("any")
                ))
            })
    }
}

/// Requests a project-scoped token with the password method.
pub async fn authenticate(http: &reqwest::Client, credentials: &Credentials) -> Result<Token> {
    let url = credentials.tokens_url();
    debug!(url = %url, user = %credentials.username, project = %credentials.project_name, "requesting keystone token");

    let response = http
        .post(&url)
        .json(&credentials.request_body())
        .send()
        .await
        .map_err(|e| SdbError::Http(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(SdbError::NotAuthenticated);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SdbError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let value = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            SdbError::Other(anyhow::anyhow!("keystone response has no {} header", SUBJECT_TOKEN_HEADER))
        })?;

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| SdbError::Http(format!("invalid token response: {}", e)))?;

    Ok(Token {
        value,
        expires_at: body.token.expires_at.as_deref().and_then(parse_timestamp),
        catalog: body.token.catalog,
    })
}
