use std::path::{Path, PathBuf};

use crate::api::{ApiConfig, SlackApi};
use crate::archive::{write_json_atomic, ArchiveStore};
use crate::attachments::{collect_files, download_files, MediaFilter};
use crate::backup::{self, BackupOptions};
use crate::channels::{list_channels, parse_kinds, ChannelFilter, ChannelKind};
use crate::cli::BackupArgs;
use crate::error::Result;
use crate::messages::HistoryOptions;
use crate::settings::{BackupSettings, Settings};
use crate::{date_to_slack_ts, load_token, parse_date};

/// Combine settings and command-line flags; flags win.
pub fn backup_options(settings: &BackupSettings, args: &BackupArgs) -> Result<BackupOptions> {
    let kinds = if args.types.is_empty() {
        parse_kinds(&settings.channel_types)?
    } else {
        parse_kinds(&args.types)?
    };

    let names = if args.channels.is_empty() {
        settings.channels.clone()
    } else {
        args.channels.clone()
    };

    let latest = match &args.until {
        Some(until) => {
            let date = parse_date(until)?;
            Some(date_to_slack_ts(date.succ_opt().unwrap_or(date)))
        }
        None => None,
    };

    let media = if args.media_only {
        MediaFilter::images_and_videos()
    } else {
        MediaFilter::new(&settings.media_types)
    };

    Ok(BackupOptions {
        kinds,
        filter: ChannelFilter {
            names,
            members_only: settings.members_only && !args.all_channels,
        },
        history: HistoryOptions {
            latest,
            include_threads: settings.include_threads && !args.no_threads,
        },
        media,
    })
}

fn open_api(settings: &Settings) -> Result<SlackApi> {
    let token = load_token()?;
    SlackApi::new(ApiConfig::from_settings(token, &settings.api))
}

pub async fn run_backup(settings_path: &str, args: BackupArgs) -> Result<()> {
    let token = load_token()?;
    let settings = Settings::load(Path::new(settings_path))?;
    let options = backup_options(&settings.backup, &args)?;

    let root = args
        .output
        .clone()
        .unwrap_or_else(|| settings.backup.output_dir.clone());
    let store = ArchiveStore::new(root, &settings.backup.media_dir);
    let api = SlackApi::new(ApiConfig::from_settings(token, &settings.api))?;

    println!("Backing up to {}...", store.root().display());

    let report = backup::run_backup(&api, &store, &options).await;

    println!(
        "Backup completed! {} channels backed up, {} skipped, {} failed, {} incomplete; {} messages fetched, {} in the archive.",
        report.channels,
        report.skipped,
        report.failed,
        report.incomplete,
        report.messages_fetched,
        report.messages_archived
    );
    println!(
        "Attachments: {} downloaded, {} skipped, {} filtered, {} failed.",
        report.files.downloaded, report.files.skipped, report.files.filtered, report.files.failed
    );
    Ok(())
}

pub async fn run_export_channels(settings_path: &str, output: &str, types: &[String]) -> Result<()> {
    let settings = Settings::load(Path::new(settings_path))?;
    let api = open_api(&settings)?;

    let kinds = if types.is_empty() {
        ChannelKind::ALL.to_vec()
    } else {
        parse_kinds(types)?
    };

    println!("Exporting channels to {}...", output);

    let channels = list_channels(&api, &kinds).await;
    write_json_atomic(Path::new(output), &channels)?;

    println!(
        "Export completed successfully! {} channels exported.",
        channels.len()
    );
    Ok(())
}

pub async fn run_download_attachments(
    settings_path: &str,
    channel: &str,
    output: Option<&str>,
    media_only: bool,
) -> Result<()> {
    let settings = Settings::load(Path::new(settings_path))?;
    let api = open_api(&settings)?;

    let root = output.map_or_else(|| settings.backup.output_dir.clone(), str::to_string);
    let store = ArchiveStore::new(root, &settings.backup.media_dir);
    let dir = PathBuf::from(channel);

    let messages = store.load(&dir)?;
    let files = collect_files(&messages);
    let media = if media_only {
        MediaFilter::images_and_videos()
    } else {
        MediaFilter::new(&settings.backup.media_types)
    };
    let output_dir = store.media_path(&dir);

    println!(
        "Downloading {} attachments from {} to {}...",
        files.len(),
        store.messages_path(&dir).display(),
        output_dir.display()
    );

    let result = download_files(&api, &files, &output_dir, &media).await;

    println!(
        "Download completed! {} files downloaded, {} skipped, {} filtered, {} failed.",
        result.downloaded, result.skipped, result.filtered, result.failed
    );
    Ok(())
}
