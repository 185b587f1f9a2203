use crate::config::{
    DEFAULT_OTP_BLOCK_SECONDS, DEFAULT_OTP_LIMIT, DEFAULT_OTP_TTL_SECONDS,
    DEFAULT_OTP_WINDOW_SECONDS,
};
use clap::{Arg, ArgMatches, Command};

pub const ARG_OTP_TTL: &str = "otp-ttl-seconds";
pub const ARG_OTP_LIMIT: &str = "otp-limit";
pub const ARG_OTP_WINDOW: &str = "otp-window-seconds";
pub const ARG_OTP_BLOCK: &str = "otp-block-seconds";
pub const ARG_OTP_SWEEP: &str = "otp-sweep-seconds";

const DEFAULT_SWEEP_SECONDS: u64 = 60;

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL)
                .long(ARG_OTP_TTL)
                .help("OTP lifetime in seconds")
                .env("TESSERA_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_LIMIT)
                .long(ARG_OTP_LIMIT)
                .help("OTP requests admitted per window before blocking")
                .env("TESSERA_OTP_LIMIT")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_OTP_WINDOW)
                .long(ARG_OTP_WINDOW)
                .help("OTP attempt counter window in seconds")
                .env("TESSERA_OTP_WINDOW_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_BLOCK)
                .long(ARG_OTP_BLOCK)
                .help("How long an email stays blocked once the limit is hit")
                .env("TESSERA_OTP_BLOCK_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_OTP_SWEEP)
                .long(ARG_OTP_SWEEP)
                .help("Interval between purges of expired OTPs and rate-limit keys")
                .env("TESSERA_OTP_SWEEP_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub ttl_seconds: u64,
    pub limit: u32,
    pub window_seconds: u64,
    pub block_seconds: u64,
    pub sweep_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let seconds = |name: &str, default: u64| {
            matches.get_one::<u64>(name).copied().unwrap_or(default)
        };
        Self {
            ttl_seconds: seconds(ARG_OTP_TTL, DEFAULT_OTP_TTL_SECONDS),
            limit: matches
                .get_one::<u32>(ARG_OTP_LIMIT)
                .copied()
                .unwrap_or(DEFAULT_OTP_LIMIT),
            window_seconds: seconds(ARG_OTP_WINDOW, DEFAULT_OTP_WINDOW_SECONDS),
            block_seconds: seconds(ARG_OTP_BLOCK, DEFAULT_OTP_BLOCK_SECONDS),
            sweep_seconds: seconds(ARG_OTP_SWEEP, DEFAULT_SWEEP_SECONDS).max(1),
        }
    }
}
