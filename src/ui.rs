// UI layer: the operator-facing flow. Shows the prerequisite steps, asks
// for confirmation with `dialoguer`, drives the `Provisioner` while
// rendering its stages (spinners from `indicatif`), and prints the final
// report. Everything here is presentation; decisions live in `provision`.

use crate::api::AuthErrorBody;
use crate::config::Config;
use crate::error::ProvisionError;
use crate::provision::{AdminBackend, LinkOutcome, Outcome, ProvisionReport, Provisioner, Stage};
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::ExposeSecret;
use std::io;
use std::time::Duration;
use tracing::info;

/// Path, relative to the application repository, of the schema the operator
/// must apply before provisioning.
pub const SCHEMA_FILE: &str = "supabase/schema.sql";

/// Deployment guide shipped with the application repository.
pub const DEPLOY_GUIDE: &str = "DEPLOY_VERCEL.md";

/// Printed verbatim after a successful run.
pub const FOLLOW_UP_STEPS: &[&str] = &[
    "1. Go to Vercel: https://vercel.com/new",
    "2. Import the application repository",
    "3. Configure the 5 environment variables",
    "4. Deploy!",
];

/// How a run ended, short of a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Done,
    /// The profile table is missing; guidance was printed.
    Blocked,
    /// The operator declined or interrupted the confirmation prompt.
    Aborted,
}

/// Run the whole interactive flow. Returns `Ok` on success, on a guided
/// halt (schema missing) and when the operator aborts; fatal provisioning
/// failures are printed and returned as errors.
pub fn run<B: AdminBackend + ?Sized>(config: &Config, backend: &B) -> Result<()> {
    run_with(config, backend, confirm).map(|_| ())
}

/// `run` with the confirmation prompt supplied by the caller. Nothing is
/// sent to `backend` unless `confirm` answers `true`.
pub fn run_with<B, C>(config: &Config, backend: &B, confirm: C) -> Result<Finish>
where
    B: AdminBackend + ?Sized,
    C: FnOnce(&Config) -> Result<bool>,
{
    header("Admin account bootstrap");
    for line in prerequisite_lines(config) {
        info_line(&line);
    }

    if !confirm(config)? {
        println!();
        error_line("Setup cancelled. Apply the schema first, then run this again.");
        return Ok(Finish::Aborted);
    }

    let mut console = StageRenderer::default();
    let outcome = Provisioner::new(backend, config).run(|stage| console.render(stage, config));
    console.clear();

    match outcome {
        Ok(Outcome::Done(report)) => {
            for line in success_report(config, &report) {
                println!("{}", line);
            }
            Ok(Finish::Done)
        }
        Ok(Outcome::Blocked { table, .. }) => {
            warning_line(&format!("Table '{}' does not exist yet!", table));
            for line in schema_guidance(config) {
                info_line(&line);
            }
            Ok(Finish::Blocked)
        }
        Err(e) => {
            println!();
            for line in failure_lines(&e) {
                error_line(&line);
            }
            Err(e).context("provisioning failed")
        }
    }
}

/// Instructions shown before anything is sent to the remote authority.
pub fn prerequisite_lines(config: &Config) -> Vec<String> {
    let editor = config
        .sql_editor_url()
        .unwrap_or_else(|| "the SQL editor of your project".to_string());
    vec![
        "IMPORTANT: this assumes the database schema has ALREADY been applied.".to_string(),
        "If it has not, do this first:".to_string(),
        format!("1. Open: {}", editor),
        format!("2. Open the file: {}", SCHEMA_FILE),
        "3. Copy ALL of its content".to_string(),
        "4. Paste it into the SQL editor".to_string(),
        "5. Click 'RUN' and wait for 'Success'".to_string(),
    ]
}

/// Shown when the profile table is missing.
pub fn schema_guidance(config: &Config) -> Vec<String> {
    let mut lines = vec!["You need to apply the schema SQL first.".to_string()];
    if let Some(url) = config.sql_editor_url() {
        lines.push(format!("Open: {}", url));
    }
    lines.push(format!("Paste the content of: {}", SCHEMA_FILE));
    lines.push("Click 'RUN' and wait for it to finish".to_string());
    lines.push("Then run this tool again!".to_string());
    lines
}

/// Final report: login data, then the fixed follow-up steps.
pub fn success_report(config: &Config, report: &ProvisionReport) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "SETUP COMPLETE".to_string(),
        String::new(),
        "Login data:".to_string(),
        format!("   Email: {}", report.email),
        format!("   Password: {}", config.admin.password.expose_secret()),
        format!("   User ID: {}", report.account.id),
        String::new(),
        "Next steps:".to_string(),
    ];
    lines.extend(FOLLOW_UP_STEPS.iter().map(|s| format!("   {}", s)));
    lines.push(String::new());
    lines.push(format!("Detailed guide: {}", DEPLOY_GUIDE));
    lines
}

fn confirm(config: &Config) -> Result<bool> {
    if config.assume_yes {
        info!("confirmation skipped (PROVISION_ASSUME_YES)");
        return Ok(true);
    }
    // Esc/q and Ctrl+C both count as "no".
    match Confirm::new()
        .with_prompt("Has the schema been applied? Continue")
        .default(true)
        .interact_opt()
    {
        Ok(answer) => Ok(answer.unwrap_or(false)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(e).context("Failed to read confirmation"),
    }
}

/// Diagnosis printed for a fatal failure: the error, then the remote
/// status, its message when the auth API sent one, and the raw body.
pub fn failure_lines(err: &ProvisionError) -> Vec<String> {
    let mut lines = vec![format!("Provisioning failed: {}", err)];
    if let Some((status, body)) = err.response_details() {
        lines.push(format!("Status: {}", status));
        if let Some(msg) = AuthErrorBody::message(body) {
            lines.push(format!("Message: {}", msg));
        }
        lines.push(format!("Response: {}", body));
    }
    lines
}

/// Renders `Stage`s as step headers and spinners.
#[derive(Default)]
struct StageRenderer {
    spinner: Option<ProgressBar>,
}

impl StageRenderer {
    fn render(&mut self, stage: &Stage, config: &Config) {
        self.clear();
        match stage {
            Stage::Resolving => {
                header("STEP 1: Admin account");
                self.spin(format!("Creating account {}...", config.admin.email));
            }
            Stage::Resolved(account) if account.created => {
                success_line("Account created!");
                info_line(&format!("User ID: {}", account.id));
            }
            Stage::Resolved(account) => {
                warning_line("Account already exists, reusing it.");
                success_line(&format!("Account found! ID: {}", account.id));
            }
            Stage::Settling(delay) if delay.is_zero() => {}
            Stage::Settling(delay) => {
                self.spin(format!("Waiting {} seconds...", delay.as_secs_f32()));
            }
            Stage::Linking => {
                header(&format!("STEP 2: Profile row in '{}'", config.profile_table));
                self.spin("Inserting profile row...".to_string());
            }
            Stage::Linked(LinkOutcome::Inserted) => {
                success_line(&format!("Row created in table '{}'!", config.profile_table));
            }
            Stage::Linked(LinkOutcome::AlreadyPresent) => {
                warning_line(&format!("Row already exists in table '{}'", config.profile_table));
            }
        }
    }

    fn spin(&mut self, message: String) {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

fn header(text: &str) {
    let rule = "=".repeat(60);
    println!("\n{}\n  {}\n{}\n", rule, text.bold(), rule);
}

fn success_line(text: &str) {
    println!("{} {}", "✔".green(), text);
}

fn error_line(text: &str) {
    println!("{} {}", "✘".red(), text.red());
}

fn info_line(text: &str) {
    println!("{} {}", "›".cyan(), text);
}

fn warning_line(text: &str) {
    println!("{} {}", "!".yellow(), text.yellow());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::{AccountId, ResolvedAccount};
    use crate::testing::{test_config, Call, FakeBackend};
    use reqwest::StatusCode;
    use std::collections::HashMap;

    fn config(url: &str) -> Config {
        let env = HashMap::from([
            ("SUPABASE_URL", url.to_string()),
            ("SUPABASE_SERVICE_ROLE_KEY", "service".to_string()),
            ("ADMIN_EMAIL", "a@b.com".to_string()),
            ("ADMIN_PASSWORD", "x".to_string()),
            ("ADMIN_NAME", "Admin".to_string()),
        ]);
        Config::from_lookup(|k| env.get(k).cloned()).unwrap()
    }

    #[test]
    fn success_report_lists_credentials_and_follow_up_steps() {
        let cfg = config("https://proj.supabase.co");
        let report = ProvisionReport {
            email: "a@b.com".into(),
            account: ResolvedAccount {
                id: AccountId::new("0b5f-42").unwrap(),
                created: true,
            },
            link: LinkOutcome::Inserted,
        };
        let lines = success_report(&cfg, &report);

        assert!(lines.contains(&"   Email: a@b.com".to_string()));
        assert!(lines.contains(&"   Password: x".to_string()));
        assert!(lines.contains(&"   User ID: 0b5f-42".to_string()));
        let steps: Vec<_> = lines
            .iter()
            .skip_while(|l| l.as_str() != "Next steps:")
            .skip(1)
            .take(FOLLOW_UP_STEPS.len())
            .map(|l| l.trim_start().to_string())
            .collect();
        assert_eq!(steps, FOLLOW_UP_STEPS);
        assert_eq!(lines.last().unwrap(), &format!("Detailed guide: {}", DEPLOY_GUIDE));
    }

    #[test]
    fn guidance_points_at_sql_editor_when_project_is_known() {
        let hosted = schema_guidance(&config("https://proj.supabase.co"));
        let editor = "Open: https://supabase.com/dashboard/project/proj/sql/new".to_string();
        assert!(hosted.contains(&editor));
        assert!(hosted.iter().any(|l| l.contains(SCHEMA_FILE)));

        let local = schema_guidance(&config("http://localhost:54321"));
        assert!(!local.iter().any(|l| l.starts_with("Open:")));

        let prereq = prerequisite_lines(&config("http://localhost:54321"));
        assert_eq!(prereq[2], "1. Open: the SQL editor of your project");
    }

    #[test]
    fn abort_returns_ok_without_contacting_the_backend() {
        let backend = FakeBackend::default();
        let cfg = test_config("a@b.com", "x");
        let finish = run_with(&cfg, &backend, |_| Ok(false)).unwrap();
        assert_eq!(finish, Finish::Aborted);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn prompt_failure_is_an_error_and_nothing_is_sent() {
        let backend = FakeBackend::default();
        let cfg = test_config("a@b.com", "x");
        let err = run_with(&cfg, &backend, |_| Err(anyhow::anyhow!("no terminal"))).unwrap_err();
        assert_eq!(err.to_string(), "no terminal");
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn full_run_finishes_done() {
        let backend = FakeBackend::default();
        let cfg = test_config("a@b.com", "x");
        let finish = run_with(&cfg, &backend, |_| Ok(true)).unwrap();
        assert_eq!(finish, Finish::Done);
        assert_eq!(
            backend.calls(),
            vec![
                Call::Create("a@b.com".into()),
                Call::Insert("users".into(), "generated-1".into())
            ]
        );
    }

    #[test]
    fn missing_table_finishes_blocked() {
        let backend = FakeBackend {
            table_missing: true,
            ..FakeBackend::default()
        };
        let cfg = test_config("a@b.com", "x");
        let finish = run_with(&cfg, &backend, |_| Ok(true)).unwrap();
        assert_eq!(finish, Finish::Blocked);
    }

    #[test]
    fn fatal_failure_is_returned_as_error() {
        let backend = FakeBackend {
            transport_down: true,
            ..FakeBackend::default()
        };
        let cfg = test_config("a@b.com", "x");
        let err = run_with(&cfg, &backend, |_| Ok(true)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::Transport { .. })
        ));
        assert_eq!(backend.calls(), vec![Call::Create("a@b.com".into())]);
    }

    #[test]
    fn failure_lines_include_status_message_and_body() {
        let body = r#"{"error_code":"weak_password","msg":"Password should be longer"}"#;
        let err = ProvisionError::Provisioning {
            step: "create account",
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: body.to_string(),
        };
        let lines = failure_lines(&err);
        assert_eq!(lines[1], "Status: 422 Unprocessable Entity");
        assert_eq!(lines[2], "Message: Password should be longer");
        assert_eq!(lines[3], format!("Response: {}", body));

        let transport = ProvisionError::transport(
            "create account",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(failure_lines(&transport).len(), 1);
    }
}
