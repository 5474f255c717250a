//! CLI definitions for lossylink.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "lossylink",
    version,
    about = "Lossy UDP link emulator\n\nRelays all incoming UDP traffic on the listen port to the loopback\naddress [::1] on the forward port, simulating random losses,\ntransmission errors, truncation and delay.",
    long_about = None
)]
pub struct Cli {
    /// UDP port the relay listens on
    #[clap(
        short = 'p',
        long = "port",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub listen_port: Option<i64>,

    /// UDP port on localhost the incoming traffic is forwarded to
    #[clap(
        short = 'P',
        long = "forward-port",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub forward_port: Option<i64>,

    /// Base delay applied to the traffic (ms)
    #[clap(
        short = 'd',
        long = "delay",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub delay: Option<i64>,

    /// Delay jitter (ms); the applied delay becomes delay + rand[-jitter, jitter]
    #[clap(
        short = 'j',
        long = "jitter",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub jitter: Option<i64>,

    /// Packet corruption rate (per 100); a corrupted packet is never cut
    #[clap(
        short = 'e',
        long = "err-rate",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub err_rate: Option<i64>,

    /// Packet truncation rate (per 100); a cut packet is never corrupted
    #[clap(
        short = 'c',
        long = "cut-rate",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub cut_rate: Option<i64>,

    /// Packet loss rate (per 100)
    #[clap(
        short = 'l',
        long = "loss-rate",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub loss_rate: Option<i64>,

    /// Seed for the random generator, to replay a previous session
    /// (-1 derives one from the clock)
    #[clap(
        short = 's',
        long = "seed",
        value_parser = parse_number,
        allow_hyphen_values = true
    )]
    pub seed: Option<i64>,

    /// Impair the reverse path instead of the forward one
    #[clap(short = 'r', long = "reverse")]
    pub reverse: bool,

    /// Impair both directions
    #[clap(short = 'R', long = "both-ways")]
    pub both_ways: bool,

    /// Optional TOML file with the same settings; flags take precedence
    #[clap(short = 'f', long = "config")]
    pub config: Option<PathBuf>,

    /// Positional arguments are accepted and ignored with a warning
    #[clap(hide = true)]
    pub ignored: Vec<String>,
}

/// `strtol`-style number parsing: optional sign, then decimal, `0x` hex or
/// leading-`0` octal. Trailing junk parses the valid prefix and warns.
pub fn parse_number(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix, digits) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };

    let valid = digits.chars().take_while(|c| c.is_digit(radix)).count();
    if valid == 0 {
        return Err(format!("`{raw}` is not a number"));
    }
    let (head, tail) = digits.split_at(valid);
    let magnitude = i64::from_str_radix(head, radix).map_err(|err| err.to_string())?;
    let value = if negative { -magnitude } else { magnitude };
    if !tail.is_empty() {
        eprintln!("!! Parsed {raw} as {value}");
    }
    Ok(value)
}
