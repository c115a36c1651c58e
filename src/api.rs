//! Slack Web API access: authenticated GET calls, cursor pagination and raw file downloads.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::settings::ApiSettings;
use crate::{AppError, Result};

/// Connection parameters threaded into every component that talks to Slack.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: String,
    pub page_size: u32,
    /// Fixed pause between two pages of the same listing.
    pub page_delay: Duration,
}

impl ApiConfig {
    pub fn from_settings(token: String, settings: &ApiSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            token,
            page_size: settings.page_size,
            page_delay: Duration::from_millis(settings.page_delay_ms),
        }
    }
}

/// Items gathered by a paginated listing.
///
/// When a page fails the loop stops and `error` holds the reason; `items` still
/// contains everything accumulated before the failure.
#[derive(Debug)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub error: Option<AppError>,
}

impl<T> Paged<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct SlackApi {
    http: reqwest::Client,
    config: ApiConfig,
}

impl SlackApi {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("slack-backup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Http {
                operation: "client setup".to_string(),
                source: e,
            })?;

        Ok(Self { http, config })
    }

    fn method_url(&self, method: &str, params: &[(&str, &str)]) -> Result<Url> {
        let base = format!("{}/{}", self.config.base_url.trim_end_matches('/'), method);
        Url::parse_with_params(&base, params).map_err(|e| AppError::InvalidUrl(format!("{base}: {e}")))
    }

    /// Issue one GET against `method` and return the decoded body.
    ///
    /// A body with `"ok": false` is turned into [`AppError::SlackApi`] carrying the
    /// reported `error` reason.
    pub async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = self.method_url(method, params)?;

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| AppError::Http {
                operation: method.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                operation: method.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::JsonParse(format!("{method}: {e}")))?;

        if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Ok(body)
        } else {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            Err(AppError::SlackApi(reason.to_string()))
        }
    }

    /// Follow `response_metadata.next_cursor` until it runs out, concatenating the
    /// items `extract` pulls out of every page.
    ///
    /// `params` is the fixed part of the query; `limit` and `cursor` are added here.
    pub async fn paginate<T, F>(&self, method: &str, params: &[(&str, &str)], mut extract: F) -> Paged<T>
    where
        F: FnMut(Value) -> Result<Vec<T>>,
    {
        let limit = self.config.page_size.to_string();
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_number = 0_usize;

        loop {
            page_number += 1;
            let result = {
                let mut query = params.to_vec();
                query.push(("limit", limit.as_str()));
                if let Some(cursor) = cursor.as_deref() {
                    query.push(("cursor", cursor));
                }
                self.call(method, &query).await
            };

            let page = result.and_then(|body| {
                let next = next_cursor(&body);
                extract(body).map(|page| (page, next))
            });

            match page {
                Ok((page, next)) => {
                    tracing::debug!(method, page = page_number, items = page.len(), "fetched page");
                    items.extend(page);
                    match next {
                        Some(next) => {
                            cursor = Some(next);
                            tokio::time::sleep(self.config.page_delay).await;
                        }
                        None => break,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        method,
                        page = page_number,
                        fetched = items.len(),
                        "pagination stopped: {}",
                        e
                    );
                    return Paged {
                        items,
                        error: Some(e),
                    };
                }
            }
        }

        Paged { items, error: None }
    }

    /// Stream the file behind `url` to `target`.
    ///
    /// Bytes land in a `.part` sibling first and are renamed onto `target` only once
    /// the body has been fully received, so an existing target is always complete.
    pub async fn download(&self, url: &str, target: &Path) -> Result<u64> {
        let url = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;
        let operation = "file download";

        let mut response = self
            .http
            .get(url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| AppError::Http {
                operation: operation.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            });
        }

        let partial = partial_path(target);
        let write_error = |e| AppError::WriteFile {
            path: partial.display().to_string(),
            source: e,
        };
        let mut file = File::create(&partial).map_err(write_error)?;
        let mut written = 0_u64;

        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = file.write_all(&chunk) {
                        drop(file);
                        let _ = fs::remove_file(&partial);
                        return Err(write_error(e));
                    }
                    written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&partial);
                    return Err(AppError::Http {
                        operation: operation.to_string(),
                        source: e,
                    });
                }
            }
        }

        file.sync_all().map_err(write_error)?;
        drop(file);

        fs::rename(&partial, target).map_err(|e| AppError::WriteFile {
            path: target.display().to_string(),
            source: e,
        })?;

        Ok(written)
    }
}

/// Non-empty `response_metadata.next_cursor` of a page, if any.
pub fn next_cursor(body: &Value) -> Option<String> {
    body.get("response_metadata")
        .and_then(|meta| meta.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string)
}

/// Deserialize the array stored under `field`; a missing field yields an empty list.
pub fn take_array<T: DeserializeOwned>(mut body: Value, field: &str) -> Result<Vec<T>> {
    match body.get_mut(field).map(Value::take) {
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| AppError::JsonParse(format!("{field}: {e}")))
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}
