//! lossylink — lossy UDP link emulator.
//!
//! Relays incoming UDP traffic on the listen port toward `[::1]` on the
//! forward port, pushing every eligible packet through a configurable
//! impairment pipeline (loss, truncation, corruption, delay with jitter) so
//! transport protocols can be exercised against a hostile link. Run
//! `lossylink --help` for the knobs.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::Cli;
use link_impair::Relay;

fn main() -> Result<()> {
    // Everything diagnostic goes to stderr; stdout stays quiet.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Usage output terminates with failure, help request included; only
    // --version exits zero.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayVersion => 0,
                clap::error::ErrorKind::DisplayHelp => 1,
                _ => 2,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    if !cli.ignored.is_empty() {
        tracing::warn!("Ignoring positional arguments: {}", cli.ignored.join(", "));
    }

    let config = config::resolve(&cli)?;
    tracing::info!(
        port = config.listen_port,
        forward_port = config.forward_port,
        delay = config.profile.delay_ms,
        jitter = config.profile.jitter_ms,
        err_rate = config.profile.corrupt_pct,
        cut_rate = config.profile.truncate_pct,
        loss_rate = config.profile.loss_pct,
        seed = config.seed,
        direction = %config.profile.mask,
        "Using parameters"
    );

    let mut relay = Relay::bind(&config)?;

    // The loop only returns on a fatal error. Whatever it left queued is
    // discarded; the summary records how much that was.
    let outcome = relay.run();
    relay.stats().log_summary(relay.queue_len());
    outcome
}
