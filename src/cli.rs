use clap::{Args, Parser, Subcommand};

use crate::settings::SETTINGS_FILE;

#[derive(Parser)]
#[command(name = "slack-backup")]
#[command(about = "Incrementally back up Slack conversations and their attachments")]
pub struct Cli {
    /// Settings file path
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    pub settings: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up messages, thread replies and attachments (the default)
    Backup(BackupArgs),

    /// Export the channels visible to the token
    ExportChannels {
        /// Output file path
        #[arg(short, long, default_value = "channels.json")]
        output: String,

        /// Conversation types: public_channel, private_channel, im
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Download attachments missing from an existing channel archive
    DownloadAttachments {
        /// Channel directory below the archive root (e.g. general or DMs/ana)
        #[arg(short, long)]
        channel: String,

        /// Archive root directory
        #[arg(short, long)]
        output: Option<String>,

        /// Only download images and videos
        #[arg(long)]
        media_only: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct BackupArgs {
    /// Archive root directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Only back up the channel with this exact name (repeatable)
    #[arg(short, long = "channel")]
    pub channels: Vec<String>,

    /// Conversation types: public_channel, private_channel, im
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    /// Only fetch messages posted up to this date (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<String>,

    /// Do not fetch thread replies
    #[arg(long)]
    pub no_threads: bool,

    /// Only download images and videos
    #[arg(long)]
    pub media_only: bool,

    /// Also back up channels the token is not a member of
    #[arg(long)]
    pub all_channels: bool,
}
