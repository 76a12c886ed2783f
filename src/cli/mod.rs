use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::Parser;

use crate::error::CliError;

const RECENT_INTERVAL_MS: i64 = 900_000;

pub const VALID_METRICS: [&str; 4] = ["buckets", "accounts", "users", "service"];

#[derive(Parser, Debug)]
#[command(name = "s3metrics", author, version, about, long_about = None)]
pub struct Args {
    /// Access key id
    #[arg(short = 'a', long)]
    pub access_key: Option<String>,

    /// Secret access key
    #[arg(short = 'k', long)]
    pub secret_key: Option<String>,

    /// Metric type (buckets, accounts, users or service)
    #[arg(short = 'm', long)]
    pub metric: Option<String>,

    /// Name of bucket(s) with a comma separator if more than one
    #[arg(long)]
    pub buckets: Option<String>,

    /// Account ID(s) with a comma separator if more than one
    #[arg(long)]
    pub accounts: Option<String>,

    /// User ID(s) with a comma separator if more than one
    #[arg(long)]
    pub users: Option<String>,

    /// Name of service
    #[arg(long)]
    pub service: Option<String>,

    /// Start of time range (Unix milliseconds)
    #[arg(short = 's', long)]
    pub start: Option<String>,

    /// End of time range (Unix milliseconds)
    #[arg(short = 'e', long)]
    pub end: Option<String>,

    /// List metrics including the previous and current 15 minute interval
    #[arg(short = 'r', long)]
    pub recent: bool,

    /// Host of the server
    #[arg(long)]
    pub host: Option<String>,

    /// Port of the server
    #[arg(long)]
    pub port: Option<u16>,

    /// Enable ssl
    #[arg(long)]
    pub ssl: bool,

    /// Skip TLS certificate verification (unsafe, for self-signed endpoints)
    #[arg(long)]
    pub insecure: bool,

    /// Log request and response details
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Buckets,
    Accounts,
    Users,
    Service,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Buckets => "buckets",
            Metric::Accounts => "accounts",
            Metric::Users => "users",
            Metric::Service => "service",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buckets" => Ok(Metric::Buckets),
            "accounts" => Ok(Metric::Accounts),
            "users" => Ok(Metric::Users),
            "service" => Ok(Metric::Service),
            _ => Err(()),
        }
    }
}

/// Validated invocation parameters, good for exactly one request.
#[derive(Debug)]
pub struct QueryParams {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub insecure: bool,
    pub verbose: bool,
    pub access_key: String,
    pub secret_key: String,
    pub metric: Metric,
    pub resources: Vec<String>,
    pub time_range: Vec<i64>,
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, CliError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CliError::Usage(format!("missing required option: {name}"))),
    }
}

pub fn validate(args: Args, now: DateTime<Utc>) -> Result<QueryParams, CliError> {
    let metric = args
        .metric
        .as_deref()
        .and_then(|m| m.parse::<Metric>().ok())
        .ok_or_else(|| {
            CliError::Usage(format!(
                "metric must be one of '{}'",
                VALID_METRICS.join("', '")
            ))
        })?;

    let resource_flag = match metric {
        Metric::Buckets => args.buckets.as_deref(),
        Metric::Accounts => args.accounts.as_deref(),
        Metric::Users => args.users.as_deref(),
        Metric::Service => args.service.as_deref(),
    };

    // Required fields are checked in a fixed order and the first missing
    // one stops validation.
    let host = require(args.host.as_deref(), "host")?.to_string();
    let port = args
        .port
        .ok_or_else(|| CliError::Usage("missing required option: port".to_string()))?;
    let access_key = require(args.access_key.as_deref(), "access-key")?.to_string();
    let secret_key = require(args.secret_key.as_deref(), "secret-key")?.to_string();
    let resource_value = require(resource_flag, metric.as_str())?.to_string();

    let time_range = if args.recent {
        vec![recent_interval_start(now)]
    } else {
        let start = require(args.start.as_deref(), "start")?;
        let start: i64 = start
            .parse()
            .map_err(|_| CliError::Validation("start must be a number".to_string()))?;
        let mut range = vec![start];
        if let Some(end) = args.end.as_deref().filter(|e| !e.is_empty()) {
            let end: i64 = end
                .parse()
                .map_err(|_| CliError::Validation("end must be a number".to_string()))?;
            range.push(end);
        }
        range
    };

    let resources: Vec<String> = resource_value.split(',').map(str::to_string).collect();

    Ok(QueryParams {
        host,
        port,
        use_tls: args.ssl,
        insecure: args.insecure,
        verbose: args.verbose,
        access_key,
        secret_key,
        metric,
        resources,
        time_range,
    })
}

/// Start of the previous 15 minute reporting interval: the wall clock is
/// floored to the latest quarter hour, then pushed back one more interval
/// in case the boundary has just passed.
pub fn recent_interval_start(now: DateTime<Utc>) -> i64 {
    let millis = now.timestamp_millis();
    millis - millis % RECENT_INTERVAL_MS - RECENT_INTERVAL_MS
}
