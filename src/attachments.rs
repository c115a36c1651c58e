//! Attachment naming, content-type filtering and the sequential file downloader.

use std::collections::HashSet;
use std::ops::AddAssign;
use std::path::Path;

use crate::api::SlackApi;
use crate::archive::safe_path_component;
use crate::messages::{FileRef, Message};

/// Extension for files whose declared name has none.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Result of downloading attachments
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub downloaded: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub failed: usize,
}

impl AddAssign for DownloadResult {
    fn add_assign(&mut self, other: Self) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.filtered += other.filtered;
        self.failed += other.failed;
    }
}

/// Content-type allow-list for attachment downloads.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    allowed: Vec<String>,
}

impl MediaFilter {
    /// `allowed` holds content-type prefixes such as `image/`; a bare `image`
    /// is read as `image/`. An empty list allows everything.
    pub fn new<S: AsRef<str>>(allowed: &[S]) -> Self {
        let allowed = allowed
            .iter()
            .map(|t| t.as_ref().trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| if t.contains('/') { t } else { format!("{t}/") })
            .collect();
        Self { allowed }
    }

    pub fn images_and_videos() -> Self {
        Self::new(&["image/", "video/"])
    }

    pub fn allows_all(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn allows(&self, file: &FileRef) -> bool {
        if self.allows_all() {
            return true;
        }
        let Some(mimetype) = file.mimetype.as_deref() else {
            return false;
        };
        let mimetype = mimetype.trim().to_ascii_lowercase();
        self.allowed.iter().any(|prefix| mimetype.starts_with(prefix.as_str()))
    }
}

/// File references of `messages` and their thread replies, first occurrence of each
/// file id only. References without an id are kept so they can be reported.
pub fn collect_files(messages: &[Message]) -> Vec<&FileRef> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for message in messages {
        let replies = message.replies().iter();
        for file in message.files().iter().chain(replies.flat_map(Message::files)) {
            match file.id.as_deref() {
                Some(id) if !seen.insert(id) => continue,
                _ => files.push(file),
            }
        }
    }

    files
}

/// Local file name of an attachment: its id plus the extension of its declared name.
pub fn local_file_name(file: &FileRef) -> Option<String> {
    let id = file.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
    let extension = file
        .name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    Some(format!("{}{}", safe_path_component(id), extension))
}

/// Download `files` into `output_dir`, one at a time.
///
/// Files already present are skipped without any request. A missing id, name or
/// URL, a filtered content type or a failed request only affect that one file.
pub async fn download_files(
    api: &SlackApi,
    files: &[&FileRef],
    output_dir: &Path,
    filter: &MediaFilter,
) -> DownloadResult {
    let mut result = DownloadResult::default();
    let total = files.len();
    if total == 0 {
        return result;
    }

    if let Err(e) = std::fs::create_dir_all(output_dir) {
        tracing::error!("Failed to create directory {}: {}", output_dir.display(), e);
        result.failed = total;
        return result;
    }

    for (idx, file) in files.iter().enumerate() {
        let label = file.name.as_deref().or(file.id.as_deref()).unwrap_or("unknown");
        tracing::debug!("[{}/{}] {}", idx + 1, total, label);

        let Some(filename) = local_file_name(file) else {
            tracing::warn!("Skipping file without id: {}", label);
            result.skipped += 1;
            continue;
        };

        if file.name.is_none() {
            tracing::warn!("Skipping file {} without a name", filename);
            result.skipped += 1;
            continue;
        }

        if !filter.allows(file) {
            tracing::info!(
                "Skipping {} ({}): content type not selected",
                label,
                file.mimetype.as_deref().unwrap_or("unknown type")
            );
            result.filtered += 1;
            continue;
        }

        let file_path = output_dir.join(&filename);
        if file_path.exists() {
            tracing::info!("File already downloaded: {}", file_path.display());
            result.skipped += 1;
            continue;
        }

        let Some(url) = file.download_url() else {
            tracing::warn!("Skipping {}: no download URL", label);
            result.skipped += 1;
            continue;
        };

        match api.download(url, &file_path).await {
            Ok(bytes) => {
                tracing::info!("File downloaded: {} ({} bytes)", file_path.display(), bytes);
                result.downloaded += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to download {}: {}", label, e);
                result.failed += 1;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_api;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn file(id: &str, name: &str, mimetype: &str, url: Option<String>) -> FileRef {
        FileRef {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            mimetype: Some(mimetype.to_string()),
            url_private: url,
            ..FileRef::default()
        }
    }

    #[test]
    fn test_local_file_name() {
        let f = file("F1", "Screen Shot.PNG", "image/png", None);
        assert_eq!(local_file_name(&f), Some("F1.png".to_string()));

        let f = file("F2", "Makefile", "text/plain", None);
        assert_eq!(local_file_name(&f), Some("F2.bin".to_string()));

        let f = FileRef::default();
        assert_eq!(local_file_name(&f), None);
    }

    #[test]
    fn test_media_filter() {
        let all = MediaFilter::default();
        assert!(all.allows(&file("F1", "a.pdf", "application/pdf", None)));

        let media = MediaFilter::images_and_videos();
        assert!(media.allows(&file("F1", "a.png", "image/png", None)));
        assert!(media.allows(&file("F2", "a.mp4", "VIDEO/MP4", None)));
        assert!(!media.allows(&file("F3", "a.pdf", "application/pdf", None)));
        assert!(!media.allows(&FileRef {
            id: Some("F4".to_string()),
            ..FileRef::default()
        }));

        let bare = MediaFilter::new(&["image"]);
        assert!(bare.allows(&file("F5", "a.gif", "image/gif", None)));
        assert!(!bare.allows(&file("F6", "a.txt", "imagery/text", None)));
    }

    #[test]
    fn test_collect_files_includes_replies_and_dedups() {
        let messages: Vec<Message> = serde_json::from_value(json!([
            {"ts": "2.0", "files": [{"id": "F1", "name": "a.png"}, {"id": "F2", "name": "b.png"}]},
            {"ts": "1.0", "thread_ts": "1.0", "thread_replies": [
                {"ts": "1.5", "files": [{"id": "F1", "name": "a.png"}, {"id": "F3", "name": "c.png"}]}
            ]}
        ]))
        .unwrap();

        let files = collect_files(&messages);
        let ids: Vec<&str> = files.iter().filter_map(|f| f.id.as_deref()).collect();

        assert_eq!(ids, vec!["F1", "F2", "F3"]);
    }

    #[tokio::test]
    async fn test_download_files_fetches_missing_files() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/files/F1/photo.png")
                .header("authorization", "Bearer xoxb-test");
            then.status(200).body("image-bytes");
        });

        let dir = tempdir().unwrap();
        let api = test_api(&server);
        let f = file("F1", "photo.png", "image/png", Some(server.url("/files/F1/photo.png")));

        let result = download_files(&api, &[&f], dir.path(), &MediaFilter::default()).await;

        assert_eq!(result.downloaded, 1);
        assert_eq!(fs::read(dir.path().join("F1.png")).unwrap(), b"image-bytes");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_existing_file_makes_no_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/files/F1/photo.png");
            then.status(200).body("new-bytes");
        });

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("F1.png"), b"old-bytes").unwrap();
        let api = test_api(&server);
        let f = file("F1", "photo.png", "image/png", Some(server.url("/files/F1/photo.png")));

        let result = download_files(&api, &[&f], dir.path(), &MediaFilter::default()).await;

        assert_eq!(
            result,
            DownloadResult {
                skipped: 1,
                ..DownloadResult::default()
            }
        );
        assert_eq!(fs::read(dir.path().join("F1.png")).unwrap(), b"old-bytes");
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/files/F1/gone.png");
            then.status(404);
        });
        let ok = server.mock(|when, then| {
            when.method(GET).path("/files/F4/ok.png");
            then.status(200).body("ok");
        });

        let dir = tempdir().unwrap();
        let api = test_api(&server);
        let gone = file("F1", "gone.png", "image/png", Some(server.url("/files/F1/gone.png")));
        let no_url = file("F2", "no-url.png", "image/png", None);
        let no_name = FileRef {
            id: Some("F3".to_string()),
            url_private: Some(server.url("/files/F3/x")),
            ..FileRef::default()
        };
        let fine = file("F4", "ok.png", "image/png", Some(server.url("/files/F4/ok.png")));

        let result = download_files(
            &api,
            &[&gone, &no_url, &no_name, &fine],
            dir.path(),
            &MediaFilter::default(),
        )
        .await;

        assert_eq!(
            result,
            DownloadResult {
                downloaded: 1,
                skipped: 2,
                filtered: 0,
                failed: 1,
            }
        );
        assert!(!dir.path().join("F1.png").exists());
        assert!(dir.path().join("F4.png").exists());
        ok.assert_calls(1);
    }

    #[tokio::test]
    async fn test_filtered_files_are_not_requested() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/files/F1/doc.pdf");
            then.status(200).body("pdf");
        });

        let dir = tempdir().unwrap();
        let api = test_api(&server);
        let pdf = file("F1", "doc.pdf", "application/pdf", Some(server.url("/files/F1/doc.pdf")));

        let result =
            download_files(&api, &[&pdf], dir.path(), &MediaFilter::images_and_videos()).await;

        assert_eq!(result.filtered, 1);
        assert_eq!(result.downloaded, 0);
        mock.assert_calls(0);
    }

    #[test]
    fn test_download_result_add_assign() {
        let mut total = DownloadResult {
            downloaded: 1,
            skipped: 2,
            filtered: 0,
            failed: 1,
        };
        total += DownloadResult {
            downloaded: 2,
            skipped: 0,
            filtered: 3,
            failed: 0,
        };

        assert_eq!(
            total,
            DownloadResult {
                downloaded: 3,
                skipped: 2,
                filtered: 3,
                failed: 1,
            }
        );
    }
}
