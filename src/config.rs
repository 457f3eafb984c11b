// Configuration value object, built once at startup from the environment
// (and an optional `.env` file) and passed by reference to every step.

use crate::error::ConfigError;
use reqwest::Url;
use secrecy::SecretString;
use std::time::Duration;

const DEFAULT_PROFILE_TABLE: &str = "users";
const DEFAULT_SETTLE_DELAY_SECS: u64 = 2;
const DEFAULT_LIST_PAGE_SIZE: u32 = 1000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// The account and profile row to provision.
#[derive(Debug)]
pub struct AdminIdentity {
    pub email: String,
    pub password: SecretString,
    pub display_name: String,
    pub is_admin: bool,
    /// Mark the email as verified so no confirmation mail is sent.
    pub pre_confirm: bool,
}

#[derive(Debug)]
pub struct Config {
    /// Base URL of the remote authority, without trailing slash.
    pub base_url: String,
    pub service_role_key: SecretString,
    /// Project ref used to build dashboard links. `None` when the base URL
    /// is not a hosted project domain and no override was given.
    pub project_ref: Option<String>,
    pub admin: AdminIdentity,
    pub profile_table: String,
    pub settle_delay: Duration,
    pub list_page_size: u32,
    pub http_timeout: Duration,
    pub assume_yes: bool,
}

impl Config {
    /// Load configuration from the process environment. A `.env` file in
    /// the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::Missing(key.to_string()));

        let url = parse_base_url(&required("SUPABASE_URL")?)?;
        let base_url = url.as_str().trim_end_matches('/').to_string();
        let service_role_key = SecretString::from(required("SUPABASE_SERVICE_ROLE_KEY")?);
        let project_ref = get("SUPABASE_PROJECT_REF").or_else(|| project_ref_from_url(&url));

        let email = required("ADMIN_EMAIL")?;
        if !email.contains('@') {
            return Err(ConfigError::Invalid(
                "ADMIN_EMAIL".into(),
                format!("`{}` is not an email address", email),
            ));
        }
        // Passwords are taken verbatim; surrounding spaces are part of them.
        let password = lookup("ADMIN_PASSWORD")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing("ADMIN_PASSWORD".to_string()))?;
        let admin = AdminIdentity {
            email,
            password: SecretString::from(password),
            display_name: required("ADMIN_NAME")?,
            is_admin: parse_bool("ADMIN_IS_ADMIN", get("ADMIN_IS_ADMIN"), true)?,
            pre_confirm: parse_bool("ADMIN_EMAIL_CONFIRM", get("ADMIN_EMAIL_CONFIRM"), true)?,
        };

        let profile_table = get("PROFILE_TABLE").unwrap_or_else(|| DEFAULT_PROFILE_TABLE.into());
        let settle_delay = Duration::from_secs(parse_number(
            "PROVISION_SETTLE_DELAY_SECS",
            get("PROVISION_SETTLE_DELAY_SECS"),
            DEFAULT_SETTLE_DELAY_SECS,
        )?);
        let list_page_size = parse_number(
            "PROVISION_LIST_PAGE_SIZE",
            get("PROVISION_LIST_PAGE_SIZE"),
            DEFAULT_LIST_PAGE_SIZE,
        )?;
        if list_page_size == 0 {
            return Err(ConfigError::Invalid(
                "PROVISION_LIST_PAGE_SIZE".into(),
                "must be greater than zero".into(),
            ));
        }
        let http_timeout = Duration::from_secs(parse_number(
            "PROVISION_HTTP_TIMEOUT_SECS",
            get("PROVISION_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let assume_yes = parse_bool("PROVISION_ASSUME_YES", get("PROVISION_ASSUME_YES"), false)?;

        Ok(Config {
            base_url,
            service_role_key,
            project_ref,
            admin,
            profile_table,
            settle_delay,
            list_page_size,
            http_timeout,
            assume_yes,
        })
    }

    /// Dashboard page where the operator pastes and runs the schema SQL.
    pub fn sql_editor_url(&self) -> Option<String> {
        self.project_ref
            .as_ref()
            .map(|r| format!("https://supabase.com/dashboard/project/{}/sql/new", r))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid("SUPABASE_URL".into(), reason);
    let url = Url::parse(raw).map_err(|e| invalid(format!("`{}`: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("`{}` must use http or https", raw)));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid(format!("`{}` has no host", raw)));
    }
    Ok(url)
}

// `https://<ref>.supabase.co` -> `<ref>`
fn project_ref_from_url(url: &Url) -> Option<String> {
    let project = url.host_str()?.strip_suffix(".supabase.co")?;
    (!project.is_empty() && !project.contains('.')).then(|| project.to_string())
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid(
            key.to_string(),
            format!("`{}` is not a boolean", value),
        )),
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| {
            ConfigError::Invalid(key.to_string(), format!("`{}` is not a number", v))
        }),
    }
}
