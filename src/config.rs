//! Relay configuration: built-in defaults, optional TOML file, CLI overrides.

use anyhow::{bail, Context, Result};
use link_impair::{DirectionMask, LinkProfile, RelayConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cli::Cli;

/// Settings as they appear in a TOML config file. Every field is optional:
/// CLI flags take precedence, built-in defaults fill whatever remains.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen_port: Option<i64>,
    pub forward_port: Option<i64>,
    pub delay_ms: Option<i64>,
    pub jitter_ms: Option<i64>,
    pub err_rate: Option<i64>,
    pub cut_rate: Option<i64>,
    pub loss_rate: Option<i64>,
    pub seed: Option<i64>,
    /// "forward", "reverse" or "both"
    pub direction: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }
}

/// Fold file settings and CLI flags into the relay configuration.
///
/// Out-of-range values are reduced, not rejected: ports keep their low 16
/// bits, rates are brought into `[0, 100]` via mod 101, delay and jitter
/// clamp at zero.
/// A seed of -1 (the default) derives one from the wall clock and logs it so
/// the session can be replayed.
pub fn resolve(cli: &Cli) -> Result<RelayConfig> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let pick =
        |flag: Option<i64>, from_file: Option<i64>, default: i64| flag.or(from_file).unwrap_or(default);

    let mask = if cli.both_ways {
        DirectionMask::Both
    } else if cli.reverse {
        DirectionMask::Reverse
    } else {
        match file.direction.as_deref() {
            None | Some("forward") => DirectionMask::Forward,
            Some("reverse") => DirectionMask::Reverse,
            Some("both") => DirectionMask::Both,
            Some(other) => bail!("unknown direction {other:?} in config file"),
        }
    };

    let seed = match pick(cli.seed, file.seed, -1) {
        -1 => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system clock is before the epoch")?
                .as_secs() as u32;
            tracing::info!("Using random seed: {now}");
            now
        }
        value => value as u32,
    };

    Ok(RelayConfig {
        listen_port: pick(cli.listen_port, file.listen_port, 1341) as u16,
        forward_port: pick(cli.forward_port, file.forward_port, 12345) as u16,
        profile: LinkProfile {
            delay_ms: pick(cli.delay, file.delay_ms, 0).max(0) as u32,
            jitter_ms: pick(cli.jitter, file.jitter_ms, 0).max(0) as u32,
            loss_pct: pick(cli.loss_rate, file.loss_rate, 0).rem_euclid(101) as u32,
            corrupt_pct: pick(cli.err_rate, file.err_rate, 0).rem_euclid(101) as u32,
            truncate_pct: pick(cli.cut_rate, file.cut_rate, 0).rem_euclid(101) as u32,
            mask,
        },
        seed,
    })
}
