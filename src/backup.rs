//! Backup run: enumerate channels, pull each one's history, merge it into the saved
//! archive and fetch the attachments of what was just pulled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::api::SlackApi;
use crate::archive::{merge, ArchiveOwner, ArchiveStore};
use crate::attachments::{collect_files, download_files, DownloadResult, MediaFilter};
use crate::channels::{list_channels, Channel, ChannelFilter, ChannelKind, Eligibility};
use crate::messages::{fetch_channel_messages, HistoryOptions};
use crate::{AppError, Result};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub kinds: Vec<ChannelKind>,
    pub filter: ChannelFilter,
    pub history: HistoryOptions,
    pub media: MediaFilter,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            kinds: ChannelKind::ALL.to_vec(),
            filter: ChannelFilter::default(),
            history: HistoryOptions::default(),
            media: MediaFilter::default(),
        }
    }
}

/// Outcome of backing up one channel.
#[derive(Debug, Default, Clone)]
pub struct ChannelOutcome {
    pub fetched: usize,
    /// Messages in the channel's archive after this run.
    pub archived: usize,
    /// False when the history listing stopped early; the archive still got what was fetched.
    pub complete: bool,
    pub archive_path: Option<PathBuf>,
    pub files: DownloadResult,
}

#[derive(Debug, Default, Clone)]
pub struct BackupReport {
    pub channels: usize,
    pub skipped: usize,
    pub failed: usize,
    pub incomplete: usize,
    pub messages_fetched: usize,
    pub messages_archived: usize,
    pub files: DownloadResult,
}

pub async fn run_backup(api: &SlackApi, store: &ArchiveStore, options: &BackupOptions) -> BackupReport {
    let channels = list_channels(api, &options.kinds).await;
    tracing::info!("Found {} channels", channels.len());

    let mut report = BackupReport::default();
    let mut used_dirs = HashSet::new();

    for channel in &channels {
        if let Eligibility::Skipped(reason) = options.filter.check(channel) {
            tracing::info!("Skipping channel {} ({}): {}", channel.name, channel.id, reason);
            report.skipped += 1;
            continue;
        }

        let result = match resolve_dir(store, channel, &mut used_dirs) {
            Ok(dir) => backup_channel(api, store, channel, &dir, options).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                report.channels += 1;
                report.messages_fetched += outcome.fetched;
                report.messages_archived += outcome.archived;
                report.files += outcome.files;
                if !outcome.complete {
                    report.incomplete += 1;
                }
            }
            Err(e) => {
                tracing::error!("Backup of channel {} ({}) failed: {}", channel.name, channel.id, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Pick the archive directory of `channel`.
///
/// [`Channel::storage_dir`] is tried first, then [`Channel::storage_dir_with_id`]. A
/// directory is taken when another channel of this run got it or when its owner
/// marker names a different channel id.
pub fn resolve_dir(
    store: &ArchiveStore,
    channel: &Channel,
    used_dirs: &mut HashSet<PathBuf>,
) -> Result<PathBuf> {
    let mut candidates = vec![channel.storage_dir()];
    let with_id = channel.storage_dir_with_id();
    if !candidates.contains(&with_id) {
        candidates.push(with_id);
    }

    for dir in candidates {
        if used_dirs.contains(&dir) {
            continue;
        }
        if let Some(owner) = store.owner(&dir)?.filter(|owner| owner.id != channel.id) {
            tracing::debug!("{} belongs to channel {}", dir.display(), owner.id);
            continue;
        }
        used_dirs.insert(dir.clone());
        return Ok(dir);
    }

    Err(AppError::DirectoryTaken(format!("{} ({})", channel.name, channel.id)))
}

/// Back up a single channel into `dir` below the archive root.
///
/// The saved archive is read before anything is fetched; if it cannot be read the
/// channel is left untouched and the error returned.
pub async fn backup_channel(
    api: &SlackApi,
    store: &ArchiveStore,
    channel: &Channel,
    dir: &Path,
    options: &BackupOptions,
) -> Result<ChannelOutcome> {
    tracing::info!("Fetching messages for channel: {} ({})", channel.name, channel.id);

    let existing = store.load(dir)?;
    let fetched = fetch_channel_messages(api, &channel.id, &options.history).await;
    let complete = fetched.is_complete();
    let incoming = fetched.items;

    if incoming.is_empty() {
        tracing::info!("No messages fetched for {}, archive left as is", channel.name);
        return Ok(ChannelOutcome {
            archived: existing.len(),
            complete,
            ..ChannelOutcome::default()
        });
    }

    let fetched_count = incoming.len();
    let merged = merge(existing, incoming.clone());
    store.claim(
        dir,
        &ArchiveOwner {
            id: channel.id.clone(),
            name: channel.name.clone(),
        },
    )?;
    let path = store.save(dir, &merged)?;
    tracing::info!("Backup updated at {} ({} messages)", path.display(), merged.len());

    let files = collect_files(&incoming);
    let downloads = download_files(api, &files, &store.media_path(dir), &options.media).await;

    Ok(ChannelOutcome {
        fetched: fetched_count,
        archived: merged.len(),
        complete,
        archive_path: Some(path),
        files: downloads,
    })
}
