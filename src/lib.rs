pub mod api;
pub mod archive;
pub mod attachments;
pub mod backup;
pub mod channels;
pub mod cli;
pub mod commands;
pub mod error;
pub mod messages;
pub mod settings;

use chrono::NaiveDate;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cli::{BackupArgs, Cli, Commands};
pub use commands::{run_backup, run_download_attachments, run_export_channels};
pub use error::{AppError, Result};

pub const TOKEN_VAR: &str = "SLACK_TOKEN";

pub fn load_token() -> Result<String> {
    std::env::var(TOKEN_VAR)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Slack timestamp of midnight UTC at the start of `date`.
pub fn date_to_slack_ts(date: NaiveDate) -> String {
    let timestamp = date.and_time(chrono::NaiveTime::default()).and_utc().timestamp();
    format!("{}.000000", timestamp)
}

/// Install the log subscriber; `RUST_LOG` overrides the default `slack_backup=info`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "slack_backup=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
