// API client module: a small blocking HTTP client for the remote
// authority's two surfaces, the auth admin API (`/auth/v1/admin`) and the
// table API (`/rest/v1`). It only moves bytes and status codes; deciding
// what a status means is left to `provision`.

use crate::config::Config;
use crate::error::ProvisionError;
use crate::provision::{AdminBackend, RawResponse};
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";
const REST_PATH: &str = "/rest/v1";

/// Blocking client holding the service credential as default headers.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Body of the admin "create user" call.
#[derive(Serialize, Debug)]
pub struct CreateUserRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub email_confirm: bool,
}

/// Row inserted into the profile table. The remote schema names the
/// display-name column `nome`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: String,
    pub email: String,
    #[serde(rename = "nome")]
    pub display_name: String,
    pub is_admin: bool,
}

/// An account as returned by the admin API. Only the fields we read.
#[derive(Deserialize, Debug, Clone)]
pub struct AdminAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// One page of the admin account listing.
#[derive(Deserialize, Debug, Default)]
pub struct AccountPage {
    #[serde(default)]
    pub users: Vec<AdminAccount>,
}

/// Error envelope used by the auth API. Older deployments only send
/// `msg`; newer ones add `error_code`.
#[derive(Deserialize, Debug, Default)]
pub struct AuthErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl AuthErrorBody {
    /// Parse an error body; `None` when it is not the auth API envelope.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// Human-readable message carried by `body`, if any.
    pub fn message(body: &str) -> Option<String> {
        Self::parse(body)
            .and_then(|e| e.msg)
            .filter(|m| !m.trim().is_empty())
    }
}

impl ApiClient {
    /// Build a client for `config.base_url`, authenticating every request
    /// with the service role key.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .default_headers(auth_headers(&config.service_role_key)?)
            .timeout(config.http_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn execute(
        &self,
        step: &'static str,
        req: RequestBuilder,
    ) -> Result<RawResponse, ProvisionError> {
        let res = req.send().map_err(|e| ProvisionError::transport(step, e))?;
        let status = res.status();
        let body = res.text().map_err(|e| ProvisionError::transport(step, e))?;
        debug!(step, %status, body_len = body.len(), "response received");
        Ok(RawResponse { status, body })
    }
}

impl AdminBackend for ApiClient {
    fn create_user(&self, req: &CreateUserRequest<'_>) -> Result<RawResponse, ProvisionError> {
        let url = format!("{}{}", self.base_url, ADMIN_USERS_PATH);
        debug!(%url, email = req.email, "creating account");
        self.execute("create account", self.client.post(&url).json(req))
    }

    fn list_users(&self, page: u32, per_page: u32) -> Result<RawResponse, ProvisionError> {
        let url = format!("{}{}", self.base_url, ADMIN_USERS_PATH);
        debug!(%url, page, per_page, "listing accounts");
        let req = self
            .client
            .get(&url)
            .query(&[("page", page), ("per_page", per_page)]);
        self.execute("list accounts", req)
    }

    fn insert_profile(
        &self,
        table: &str,
        record: &ProfileRecord,
    ) -> Result<RawResponse, ProvisionError> {
        let url = format!("{}{}/{}", self.base_url, REST_PATH, table);
        debug!(%url, id = %record.id, "inserting profile row");
        let req = self
            .client
            .post(&url)
            .header("Prefer", "return=minimal")
            .json(record);
        self.execute("insert profile", req)
    }
}

/// `apikey` and `Authorization: Bearer` headers, both marked sensitive so
/// they never show up in debug output.
fn auth_headers(key: &SecretString) -> Result<HeaderMap> {
    let key = key.expose_secret();
    let mut apikey =
        HeaderValue::from_str(key).context("Service role key is not a valid header value")?;
    apikey.set_sensitive(true);
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", key))
        .context("Service role key is not a valid header value")?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("apikey"), apikey);
    headers.insert(AUTHORIZATION, bearer);
    Ok(headers)
}
