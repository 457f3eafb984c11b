// Entrypoint for the provisioning tool.
// - Keeps `main` small: set up logging, load configuration, build the API
//   client and hand both to the UI flow.
// - Logs go to stderr so they never interleave with the console report.

use admin_bootstrap::{api::ApiClient, config::Config, ui};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let api = ApiClient::new(&config)?;
    tracing::debug!(base_url = api.base_url(), "client ready");

    ui::run(&config, &api)
}
