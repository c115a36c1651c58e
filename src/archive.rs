//! Per-channel message archive: the merge of fetched messages into the saved history,
//! and its on-disk layout.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::messages::Message;
use crate::{AppError, Result};

pub const MESSAGES_FILE: &str = "messages.json";
pub const OWNER_FILE: &str = "channel.json";

/// The channel a directory of the archive belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOwner {
    pub id: String,
    pub name: String,
}

/// Sortable form of a Slack timestamp (`"1705300000.000100"`).
///
/// Missing or malformed timestamps compare as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TsKey {
    secs: u64,
    nanos: u32,
}

impl TsKey {
    pub const ZERO: TsKey = TsKey { secs: 0, nanos: 0 };

    pub fn parse(ts: &str) -> Self {
        let ts = ts.trim();
        let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));

        let Ok(secs) = secs.parse::<u64>() else {
            return Self::ZERO;
        };
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Self::ZERO;
        }

        let mut digits: String = frac.chars().take(9).collect();
        while digits.len() < 9 {
            digits.push('0');
        }
        let nanos = digits.parse::<u32>().unwrap_or(0);

        Self { secs, nanos }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Identity {
    Ts(String),
    /// Messages without a timestamp are told apart by their serialized content.
    Content(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    has_ts: bool,
    ts: TsKey,
    identity: Identity,
}

impl SortKey {
    fn of(message: &Message) -> Self {
        match message.id() {
            Some(ts) => Self {
                has_ts: true,
                ts: TsKey::parse(ts),
                identity: Identity::Ts(ts.to_string()),
            },
            None => Self {
                has_ts: false,
                ts: TsKey::ZERO,
                identity: Identity::Content(serde_json::to_string(message).unwrap_or_default()),
            },
        }
    }
}

/// Merge freshly fetched messages into a saved archive.
///
/// `incoming` wins over `existing` when both hold the same `ts`; nothing from
/// `existing` is dropped otherwise. The result is ordered newest first, and
/// messages without a `ts` come last.
pub fn merge(existing: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut keyed: Vec<(SortKey, Message)> = Vec::with_capacity(existing.len() + incoming.len());

    for message in incoming.into_iter().chain(existing) {
        let key = SortKey::of(&message);
        if seen.insert(key.identity.clone()) {
            keyed.push((key, message));
        }
    }

    keyed.sort_by(|(a, _), (b, _)| descending(a, b));
    keyed.into_iter().map(|(_, message)| message).collect()
}

fn descending(a: &SortKey, b: &SortKey) -> Ordering {
    b.cmp(a)
}

/// Replace characters that are unsafe in a single path component.
pub fn safe_path_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// On-disk layout of the backup:
/// `<root>/<channel dir>/messages.json` and `<root>/<channel dir>/<media dir>/`.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
    media_dir: String,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>, media_dir: &str) -> Self {
        Self {
            root: root.into(),
            media_dir: safe_path_component(media_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn channel_dir(&self, channel_dir: &Path) -> PathBuf {
        self.root.join(channel_dir)
    }

    pub fn messages_path(&self, channel_dir: &Path) -> PathBuf {
        self.channel_dir(channel_dir).join(MESSAGES_FILE)
    }

    pub fn media_path(&self, channel_dir: &Path) -> PathBuf {
        self.channel_dir(channel_dir).join(&self.media_dir)
    }

    /// Saved messages of a channel; a channel never backed up has none.
    pub fn load(&self, channel_dir: &Path) -> Result<Vec<Message>> {
        let path = self.messages_path(channel_dir);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    pub fn save(&self, channel_dir: &Path, messages: &[Message]) -> Result<PathBuf> {
        let path = self.messages_path(channel_dir);
        write_json_atomic(&path, &messages)?;
        Ok(path)
    }

    /// Channel recorded as the owner of `channel_dir`, if any.
    pub fn owner(&self, channel_dir: &Path) -> Result<Option<ArchiveOwner>> {
        let path = self.channel_dir(channel_dir).join(OWNER_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn claim(&self, channel_dir: &Path, owner: &ArchiveOwner) -> Result<()> {
        if self.owner(channel_dir)?.as_ref() == Some(owner) {
            return Ok(());
        }
        write_json_atomic(&self.channel_dir(channel_dir).join(OWNER_FILE), owner)
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| AppError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| AppError::JsonParse(format!("{}: {}", path.display(), e)))
}

/// Write `data` as pretty JSON to a temporary file next to `path`, then rename it
/// over `path`. A crash mid-write leaves the previous file untouched.
pub fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let write_error = |e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_error)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        serde_json::to_writer_pretty(&mut writer, data)
            .map_err(|e| AppError::JsonSerialize(e.to_string()))?;
        writer.flush().map_err(write_error)?;
    }
    tmp.as_file().sync_all().map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;

    Ok(())
}
