use clap::Parser;
use slack_backup::{BackupArgs, Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    slack_backup::init_tracing();
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let cli = Cli::parse();

    let result = match cli.command {
        None => slack_backup::run_backup(&cli.settings, BackupArgs::default()).await,
        Some(Commands::Backup(args)) => slack_backup::run_backup(&cli.settings, args).await,
        Some(Commands::ExportChannels { output, types }) => {
            slack_backup::run_export_channels(&cli.settings, &output, &types).await
        }
        Some(Commands::DownloadAttachments {
            channel,
            output,
            media_only,
        }) => {
            slack_backup::run_download_attachments(&cli.settings, &channel, output.as_deref(), media_only)
                .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
