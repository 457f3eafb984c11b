// Idempotent create-or-adopt provisioning.
//
// Two steps, run strictly in order by `Provisioner::run`:
// 1. `resolve_account` creates the admin account, or finds the existing one
//    when the remote authority reports the email as taken.
// 2. `link_profile` inserts the profile row for that account, treating a
//    duplicate row as success.
//
// Re-running the whole procedure is safe: every "already exists" answer is
// success.

use crate::api::{AccountPage, AdminAccount, AuthErrorBody, CreateUserRequest, ProfileRecord};
use crate::config::Config;
use crate::error::ProvisionError;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Substring the auth API puts in the message for a duplicate email.
const ALREADY_REGISTERED: &str = "already been registered";
const EMAIL_EXISTS_CODES: &[&str] = &["email_exists", "user_already_exists"];

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        RawResponse {
            status,
            body: body.into(),
        }
    }
}

/// The three calls provisioning needs from the remote authority.
pub trait AdminBackend {
    fn create_user(&self, req: &CreateUserRequest<'_>) -> Result<RawResponse, ProvisionError>;
    fn list_users(&self, page: u32, per_page: u32) -> Result<RawResponse, ProvisionError>;
    fn insert_profile(
        &self,
        table: &str,
        record: &ProfileRecord,
    ) -> Result<RawResponse, ProvisionError>;
}

/// Identifier assigned by the remote authority. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.trim().is_empty()).then_some(AccountId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub id: AccountId,
    /// `false` when an existing account was adopted.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Inserted,
    AlreadyPresent,
}

/// Progress of `Provisioner::run`, in the order it is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Resolved(ResolvedAccount),
    Settling(Duration),
    Linking,
    Linked(LinkOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub email: String,
    pub account: ResolvedAccount,
    pub link: LinkOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(ProvisionReport),
    /// The account exists but the profile table does not; the schema has to
    /// be applied before a rerun.
    Blocked { account: ResolvedAccount, table: String },
}

/// Create the account, or adopt the existing one for `email`.
pub fn resolve_account<B: AdminBackend + ?Sized>(
    backend: &B,
    email: &str,
    password: &str,
    pre_confirm: bool,
    page_size: u32,
) -> Result<ResolvedAccount, ProvisionError> {
    let req = CreateUserRequest {
        email,
        password,
        email_confirm: pre_confirm,
    };
    let res = backend.create_user(&req)?;

    if res.status == StatusCode::OK || res.status == StatusCode::CREATED {
        let account: AdminAccount =
            serde_json::from_str(&res.body).map_err(|e| ProvisionError::MalformedResponse {
                step: "create account",
                reason: e.to_string(),
            })?;
        let id = AccountId::new(account.id).ok_or_else(|| ProvisionError::MalformedResponse {
            step: "create account",
            reason: "response carries no account id".into(),
        })?;
        info!(%id, email, "account created");
        return Ok(ResolvedAccount { id, created: true });
    }

    if !is_already_registered(&res) {
        return Err(ProvisionError::Provisioning {
            step: "create account",
            status: res.status,
            body: res.body,
        });
    }

    warn!(email, status = %res.status, "account already registered, looking it up");
    match find_account(backend, email, page_size)? {
        Some(id) => {
            info!(%id, email, "existing account adopted");
            Ok(ResolvedAccount { id, created: false })
        }
        None => Err(ProvisionError::Provisioning {
            step: "account lookup",
            status: res.status,
            body: res.body,
        }),
    }
}

/// Whether a failed create call means "this email already has an account".
/// When the body carries an `error_code`, that code alone decides; status
/// 422 and the message substring only apply to deployments that send none.
pub fn is_already_registered(res: &RawResponse) -> bool {
    let error_code = AuthErrorBody::parse(&res.body).and_then(|e| e.error_code);
    match error_code {
        Some(code) => EMAIL_EXISTS_CODES.contains(&code.as_str()),
        None => {
            res.status == StatusCode::UNPROCESSABLE_ENTITY || res.body.contains(ALREADY_REGISTERED)
        }
    }
}

// Walk the listing page by page; a short page is the last one.
fn find_account<B: AdminBackend + ?Sized>(
    backend: &B,
    email: &str,
    page_size: u32,
) -> Result<Option<AccountId>, ProvisionError> {
    let mut page = 1;
    loop {
        let res = backend.list_users(page, page_size)?;
        if !res.status.is_success() {
            return Err(ProvisionError::Provisioning {
                step: "list accounts",
                status: res.status,
                body: res.body,
            });
        }
        let listing: AccountPage =
            serde_json::from_str(&res.body).map_err(|e| ProvisionError::MalformedResponse {
                step: "list accounts",
                reason: e.to_string(),
            })?;

        let found = listing
            .users
            .iter()
            .find(|a| a.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .and_then(|a| AccountId::new(a.id.clone()));
        if found.is_some() {
            return Ok(found);
        }
        if (listing.users.len() as u64) < u64::from(page_size) {
            return Ok(None);
        }
        page += 1;
    }
}

/// Ensure the profile row for `record.id` exists in `table`.
pub fn link_profile<B: AdminBackend + ?Sized>(
    backend: &B,
    table: &str,
    record: &ProfileRecord,
) -> Result<LinkOutcome, ProvisionError> {
    let res = backend.insert_profile(table, record)?;
    match res.status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
            info!(table, id = %record.id, "profile row inserted");
            Ok(LinkOutcome::Inserted)
        }
        StatusCode::CONFLICT => {
            warn!(table, id = %record.id, "profile row already present");
            Ok(LinkOutcome::AlreadyPresent)
        }
        StatusCode::NOT_FOUND => Err(ProvisionError::SchemaNotReady {
            table: table.to_string(),
            body: res.body,
        }),
        status => Err(ProvisionError::Provisioning {
            step: "insert profile",
            status,
            body: res.body,
        }),
    }
}

/// Runs the two steps in order against one backend.
pub struct Provisioner<'a, B: ?Sized> {
    backend: &'a B,
    config: &'a Config,
    sleep: fn(Duration),
}

impl<'a, B: AdminBackend + ?Sized> Provisioner<'a, B> {
    pub fn new(backend: &'a B, config: &'a Config) -> Self {
        Provisioner {
            backend,
            config,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the settle delay implementation.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Resolve, wait, link. `observe` sees every stage as it is entered.
    /// Only a missing profile table is turned into `Outcome::Blocked`;
    /// every other failure is returned as an error.
    pub fn run(&self, mut observe: impl FnMut(&Stage)) -> Result<Outcome, ProvisionError> {
        let admin = &self.config.admin;

        observe(&Stage::Resolving);
        let account = resolve_account(
            self.backend,
            &admin.email,
            admin.password.expose_secret(),
            admin.pre_confirm,
            self.config.list_page_size,
        )?;
        observe(&Stage::Resolved(account.clone()));

        observe(&Stage::Settling(self.config.settle_delay));
        if !self.config.settle_delay.is_zero() {
            (self.sleep)(self.config.settle_delay);
        }

        observe(&Stage::Linking);
        let record = ProfileRecord {
            id: account.id.as_str().to_string(),
            email: admin.email.clone(),
            display_name: admin.display_name.clone(),
            is_admin: admin.is_admin,
        };
        let link = match link_profile(self.backend, &self.config.profile_table, &record) {
            Ok(link) => link,
            Err(ProvisionError::SchemaNotReady { table, body }) => {
                warn!(%table, %body, "profile table missing");
                return Ok(Outcome::Blocked { account, table });
            }
            Err(e) => return Err(e),
        };
        observe(&Stage::Linked(link));

        Ok(Outcome::Done(ProvisionReport {
            email: admin.email.clone(),
            account,
            link,
        }))
    }
}
