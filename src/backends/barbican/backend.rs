//! Barbican backend implementation.

use crate::backends::barbican::keystone::{self, Credentials, KEY_MANAGER_SERVICE};
use crate::backends::barbican::KeystoneSession;
use crate::secret::{parse_timestamp, TEXT_PLAIN};
use crate::session::SessionCache;
use crate::{Backend, Profile, Result, SdbError, Secret, Session};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const BACKEND_NAME: &str = "barbican";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const DEFAULT_INTERFACE: &str = "public";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: usize = 100;
const OCTET_STREAM: &str = "application/octet-stream";

/// OpenStack Barbican backend.
///
/// Authenticates with the Keystone v3 password method and talks to the
/// Barbican v1 REST API found in the token's service catalog.
pub struct BarbicanBackend {
    http: Option<reqwest::Client>,
    credentials: Credentials,
    interface: String,
    region: Option<String>,
    endpoint_override: Option<String>,
    timeout: Duration,
    session_file: Option<String>,
    session_ttl: Duration,
    cache: Option<SessionCache>,
    endpoint: Option<String>,
}

impl BarbicanBackend {
    /// Creates a backend from a profile.
    ///
    /// # Errors
    ///
    /// Fails with [`SdbError::MissingProfileKey`] when one of `auth_url`,
    /// `username`, `user_domain_name`, `password`, `project_name` or
    /// `project_domain_name` is absent, and with [`SdbError::InvalidProfile`]
    /// for malformed URLs or durations.
    pub fn new(profile: Profile) -> Result<Self> {
        let credentials = Credentials::from_profile(&profile)?;

        let interface = profile
            .get_option("interface")
            .cloned()
            .unwrap_or_else(|| DEFAULT_INTERFACE.to_string());

        let endpoint_override = profile
            .get_option("endpoint")
            .map(|raw| normalize_endpoint(raw))
            .transpose()?;

        Ok(Self {
            http: None,
            credentials,
            interface,
            region: profile.get_option("region_name").cloned(),
            endpoint_override,
            timeout: profile.duration_option("timeout", DEFAULT_TIMEOUT)?,
            session_file: profile.session_file().map(str::to_string),
            session_ttl: profile.session_ttl()?,
            cache: None,
            endpoint: None,
        })
    }

    fn http(&self) -> Result<&reqwest::Client> {
        self.http.as_ref().ok_or(SdbError::NotAuthenticated)
    }

    fn endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().ok_or(SdbError::NotAuthenticated)
    }

    fn request(&self, method: Method, url: &str, session: &dyn Session) -> Result<RequestBuilder> {
        debug!(method = %method, url = %url, "barbican request");
        Ok(self
            .http()?
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, session.token()))
    }

    /// Sends a request and maps non-success statuses to errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SdbError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => {
                // A cached token may have been revoked; make the next call authenticate.
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.clear().await {
                        warn!(error = %e, "failed to clear session cache");
                    }
                }
                Err(SdbError::NotAuthenticated)
            }
            StatusCode::FORBIDDEN => Err(SdbError::PermissionDenied(message)),
            StatusCode::NOT_FOUND => Err(SdbError::NotFound(message)),
            _ => Err(SdbError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn list_pages(&self, name: &str, session: &dyn Session) -> Result<Vec<Secret>> {
        let url = format!("{}/secrets", self.endpoint()?);
        let mut secrets = Vec::new();
        let mut offset: usize = 0;

        loop {
            let request = self.request(Method::GET, &url, session)?.query(&[
                ("name", name.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);

            let page: SecretList = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(|e| SdbError::Http(format!("invalid secret list: {}", e)))?;

            let count = page.secrets.len();
            secrets.extend(
                page.secrets
                    .into_iter()
                    .filter(|record| record.name.as_deref() == Some(name))
                    .map(SecretRecord::into_secret),
            );

            offset += count;
            if count == 0 || page.next.is_none() {
                break;
            }
        }

        debug!(key = name, found = secrets.len(), "listed secrets");
        Ok(secrets)
    }

    async fn download_payload(&self, secret: &Secret, session: &dyn Session) -> Result<String> {
        let url = format!("{}/payload", secret.id.trim_end_matches('/'));

        if secret.is_text() {
            let accept = secret.content_type.as_deref().unwrap_or(TEXT_PLAIN);
            let request = self
                .request(Method::GET, &url, session)?
                .header(header::ACCEPT, accept);
            return self
                .send(request)
                .await?
                .text()
                .await
                .map_err(|e| SdbError::Http(e.to_string()));
        }

        let accept = secret.content_type.as_deref().unwrap_or(OCTET_STREAM);
        let request = self
            .request(Method::GET, &url, session)?
            .header(header::ACCEPT, accept);
        let bytes = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| SdbError::Http(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    async fn create(&self, name: &str, payload: &str, session: &dyn Session) -> Result<Secret> {
        let url = format!("{}/secrets", self.endpoint()?);
        let body = CreateSecretRequest {
            name,
            payload,
            payload_content_type: TEXT_PLAIN,
        };

        let request = self.request(Method::POST, &url, session)?.json(&body);
        let created: CreateSecretResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| SdbError::Http(format!("invalid create response: {}", e)))?;

        Ok(Secret {
            id: created.secret_ref,
            name: name.to_string(),
            payload: Some(payload.to_string()),
            content_type: Some(TEXT_PLAIN.to_string()),
            status: None,
            created: None,
        })
    }

    async fn destroy(&self, secret: &Secret, session: &dyn Session) -> Result<()> {
        let request = self.request(Method::DELETE, &secret.id, session)?;
        self.send(request).await?;
        Ok(())
    }
}

/// Validates an endpoint URL and makes it end in `/v1`.
pub(crate) fn normalize_endpoint(raw: &str) -> Result<String> {
    Url::parse(raw)
        .map_err(|e| SdbError::InvalidProfile(format!("endpoint {}: {}", raw, e)))?;

    let trimmed = raw.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}/v1", trimmed))
    }
}

#[async_trait]
impl Backend for BarbicanBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn init(&mut self) -> Result<()> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SdbError::Http(format!("failed to build HTTP client: {}", e)))?;
        self.http = Some(http);

        if let Some(path) = &self.session_file {
            let cache = SessionCache::new(path, self.session_ttl)
                .await?
                .with_scope(self.credentials.scope());
            self.cache = Some(cache);
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.http = None;
        self.endpoint = None;
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.http.is_some() && self.endpoint.is_some()
    }

    async fn authenticate(&mut self) -> Result<Arc<dyn Session>> {
        if let Some(cache) = &self.cache {
            match cache.load().await {
                Ok(Some(cached)) => {
                    if let Some(endpoint) = self.endpoint_override.clone().or(cached.endpoint) {
                        info!(endpoint = %endpoint, "reusing cached keystone token");
                        self.endpoint = Some(endpoint.clone());
                        return Ok(Arc::new(KeystoneSession::new(
                            cached.token,
                            endpoint,
                            Some(cached.expires),
                        )));
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring unreadable session cache"),
            }
        }

        let project = self.credentials.project_name.clone();
        let token = keystone::authenticate(self.http()?, &self.credentials)
            .await
            .map_err(|e| SdbError::backend_op(BACKEND_NAME, "authenticate", &project, e))?;

        let endpoint = match &self.endpoint_override {
            Some(endpoint) => endpoint.clone(),
            None => normalize_endpoint(token.endpoint(
                KEY_MANAGER_SERVICE,
                &self.interface,
                self.region.as_deref(),
            )?)?,
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .save(&token.value, Some(endpoint.as_str()), BACKEND_NAME, token.expires_at)
                .await
            {
                warn!(error = %e, "failed to write session cache");
            }
        }

        info!(endpoint = %endpoint, project = %project, "authenticated against keystone");
        self.endpoint = Some(endpoint.clone());
        Ok(Arc::new(KeystoneSession::new(
            token.value,
            endpoint,
            token.expires_at,
        )))
    }

    async fn list_secrets(&self, name: &str, session: &dyn Session) -> Result<Vec<Secret>> {
        self.list_pages(name, session)
            .await
            .map_err(|e| SdbError::backend_op(BACKEND_NAME, "list", name, e))
    }

    async fn fetch_payload(&self, secret: &Secret, session: &dyn Session) -> Result<String> {
        self.download_payload(secret, session)
            .await
            .map_err(|e| SdbError::backend_op(BACKEND_NAME, "get", &secret.name, e))
    }

    async fn store_secret(
        &mut self,
        name: &str,
        payload: &str,
        session: &dyn Session,
    ) -> Result<Secret> {
        self.create(name, payload, session)
            .await
            .map_err(|e| SdbError::backend_op(BACKEND_NAME, "set", name, e))
    }

    async fn remove_secret(&mut self, secret: &Secret, session: &dyn Session) -> Result<()> {
        self.destroy(secret, session)
            .await
            .map_err(|e| SdbError::backend_op(BACKEND_NAME, "delete", &secret.name, e))
    }
}

// Barbican wire types

#[derive(Debug, Deserialize)]
struct SecretList {
    #[serde(default)]
    secrets: Vec<SecretRecord>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretRecord {
    secret_ref: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    content_types: Option<HashMap<String, String>>,
}

impl SecretRecord {
    fn into_secret(self) -> Secret {
        Secret {
            id: self.secret_ref,
            name: self.name.unwrap_or_default(),
            payload: None,
            content_type: self
                .content_types
                .and_then(|mut types| types.remove("default")),
            status: self.status,
            created: self.created.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateSecretRequest<'a> {
    name: &'a str,
    payload: &'a str,
    payload_content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSecretResponse {
    secret_ref: String,
}
