//! Message model and retrieval of a channel's history with its thread replies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{take_array, Paged, SlackApi};

/// A Slack message as stored in the archive.
///
/// Only the fields the backup logic reads are typed; everything else the API
/// returns is kept in `extra` so the archive preserves the full payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_replies: Option<Vec<Message>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// The message identifier, ignoring blank timestamps.
    pub fn id(&self) -> Option<&str> {
        self.ts.as_deref().map(str::trim).filter(|ts| !ts.is_empty())
    }

    /// Timestamp of the thread this message roots, if it roots one.
    pub fn thread_root(&self) -> Option<&str> {
        let ts = self.id()?;
        let thread_ts = self.thread_ts.as_deref()?.trim();
        (thread_ts == ts).then_some(ts)
    }

    pub fn files(&self) -> &[FileRef] {
        self.files.as_deref().unwrap_or_default()
    }

    pub fn replies(&self) -> &[Message] {
        self.thread_replies.as_deref().unwrap_or_default()
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private_download: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileRef {
    /// Try `url_private_download` first, then `url_private`.
    pub fn download_url(&self) -> Option<&str> {
        self.url_private_download
            .as_deref()
            .or(self.url_private.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// Only fetch messages older than this Slack timestamp.
    pub latest: Option<String>,
    pub include_threads: bool,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            latest: None,
            include_threads: true,
        }
    }
}

pub async fn fetch_history(api: &SlackApi, channel_id: &str, latest: Option<&str>) -> Paged<Message> {
    let mut params = vec![("channel", channel_id)];
    if let Some(latest) = latest {
        params.push(("latest", latest));
    }

    api.paginate("conversations.history", &params, |body| take_array(body, "messages"))
        .await
}

/// Replies of the thread rooted at `thread_ts`, without the root message itself.
pub async fn fetch_replies(api: &SlackApi, channel_id: &str, thread_ts: &str) -> Paged<Message> {
    let mut paged: Paged<Message> = api
        .paginate(
            "conversations.replies",
            &[("channel", channel_id), ("ts", thread_ts)],
            |body| take_array::<Message>(body, "messages"),
        )
        .await;

    paged.items.retain(|reply| reply.id() != Some(thread_ts));
    paged
}

/// Every top-level message of a channel.
///
/// With threads enabled each message carries `thread_replies`: the fetched replies
/// for thread roots, an empty list for everything else. A failing replies listing
/// keeps whatever replies were fetched and does not affect the history result.
pub async fn fetch_channel_messages(
    api: &SlackApi,
    channel_id: &str,
    options: &HistoryOptions,
) -> Paged<Message> {
    let mut history = fetch_history(api, channel_id, options.latest.as_deref()).await;
    if !options.include_threads {
        return history;
    }

    for message in &mut history.items {
        let replies = match message.thread_root().map(str::to_string) {
            Some(root) => {
                let paged = fetch_replies(api, channel_id, &root).await;
                if let Some(e) = &paged.error {
                    tracing::warn!(
                        channel = channel_id,
                        thread = %root,
                        "Error fetching thread replies: {}",
                        e
                    );
                }
                paged.items
            }
            None => Vec::new(),
        };
        message.thread_replies = Some(replies);
    }

    history
}
