// In-memory remote authority shared by the unit tests. It answers the way
// the real services do: 422 `email_exists` for a taken email, 409 for a
// duplicate profile row, 404 when the table is missing.

use crate::api::{CreateUserRequest, ProfileRecord};
use crate::config::Config;
use crate::error::ProvisionError;
use crate::provision::{AdminBackend, RawResponse};
use reqwest::StatusCode;
use serde_json::json;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create(String),
    List(u32),
    Insert(String, String),
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    pub accounts: RefCell<Vec<(String, String)>>,
    pub rows: RefCell<HashSet<String>>,
    pub calls: RefCell<Vec<Call>>,
    pub next_id: RefCell<u32>,
    /// Returned by every create call instead of the normal behaviour.
    pub create_rejection: Option<RawResponse>,
    pub page_statuses: HashMap<u32, StatusCode>,
    pub table_missing: bool,
    pub transport_down: bool,
}

impl FakeBackend {
    pub fn with_account(self, email: &str, id: &str) -> Self {
        self.accounts.borrow_mut().push((email.into(), id.into()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::List(_))).count()
    }
}

impl AdminBackend for FakeBackend {
    fn create_user(&self, req: &CreateUserRequest<'_>) -> Result<RawResponse, ProvisionError> {
        self.calls.borrow_mut().push(Call::Create(req.email.into()));
        if self.transport_down {
            return Err(ProvisionError::transport(
                "create account",
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }
        if let Some(rejection) = &self.create_rejection {
            return Ok(rejection.clone());
        }
        let mut accounts = self.accounts.borrow_mut();
        if accounts.iter().any(|(e, _)| e.eq_ignore_ascii_case(req.email)) {
            let body = json!({
                "code": 422,
                "error_code": "email_exists",
                "msg": "A user with this email address has already been registered"
            });
            return Ok(RawResponse::new(StatusCode::UNPROCESSABLE_ENTITY, body.to_string()));
        }
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        let id = format!("generated-{}", next);
        accounts.push((req.email.into(), id.clone()));
        let body = json!({"id": id, "email": req.email});
        Ok(RawResponse::new(StatusCode::CREATED, body.to_string()))
    }

    fn list_users(&self, page: u32, per_page: u32) -> Result<RawResponse, ProvisionError> {
        self.calls.borrow_mut().push(Call::List(page));
        if let Some(status) = self.page_statuses.get(&page) {
            return Ok(RawResponse::new(*status, "listing unavailable"));
        }
        let users: Vec<_> = self
            .accounts
            .borrow()
            .iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .map(|(email, id)| json!({"id": id, "email": email}))
            .collect();
        let body = json!({ "users": users });
        Ok(RawResponse::new(StatusCode::OK, body.to_string()))
    }

    fn insert_profile(
        &self,
        table: &str,
        record: &ProfileRecord,
    ) -> Result<RawResponse, ProvisionError> {
        self.calls
            .borrow_mut()
            .push(Call::Insert(table.into(), record.id.clone()));
        if self.table_missing {
            let body = json!({
                "code": "42P01",
                "message": format!("relation \"public.{}\" does not exist", table)
            });
            return Ok(RawResponse::new(StatusCode::NOT_FOUND, body.to_string()));
        }
        if !self.rows.borrow_mut().insert(record.id.clone()) {
            let body = json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            });
            return Ok(RawResponse::new(StatusCode::CONFLICT, body.to_string()));
        }
        Ok(RawResponse::new(StatusCode::CREATED, ""))
    }
}

/// Configuration for `email`/`password` against a hosted project, with
/// the settle delay disabled.
pub(crate) fn test_config(email: &str, password: &str) -> Config {
    let env = HashMap::from([
        ("SUPABASE_URL", "https://proj.supabase.co".to_string()),
        ("SUPABASE_SERVICE_ROLE_KEY", "service".to_string()),
        ("ADMIN_EMAIL", email.to_string()),
        ("ADMIN_PASSWORD", password.to_string()),
        ("ADMIN_NAME", "Admin".to_string()),
        ("PROVISION_SETTLE_DELAY_SECS", "0".to_string()),
    ]);
    Config::from_lookup(|k| env.get(k).cloned()).unwrap()
}
