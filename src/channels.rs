//! Enumeration of the conversations visible to the token, and the predicate that
//! decides which of them get backed up.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{take_array, SlackApi};
use crate::archive::safe_path_component;
use crate::AppError;

/// Directory grouping direct-message archives.
pub const DM_DIR: &str = "DMs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    #[serde(rename = "public_channel")]
    Public,
    #[serde(rename = "private_channel")]
    Private,
    #[serde(rename = "im")]
    DirectMessage,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Public,
        ChannelKind::Private,
        ChannelKind::DirectMessage,
    ];

    pub fn as_api_str(&self) -> &'static str {
        match self {
            ChannelKind::Public => "public_channel",
            ChannelKind::Private => "private_channel",
            ChannelKind::DirectMessage => "im",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for ChannelKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public_channel" | "public" => Ok(ChannelKind::Public),
            "private_channel" | "private" => Ok(ChannelKind::Private),
            "im" | "dm" => Ok(ChannelKind::DirectMessage),
            other => Err(AppError::InvalidChannelType(other.to_string())),
        }
    }
}

/// Parse a list of channel type names, removing duplicates while keeping order.
pub fn parse_kinds<S: AsRef<str>>(names: &[S]) -> crate::Result<Vec<ChannelKind>> {
    let mut kinds = Vec::new();
    for name in names {
        let kind: ChannelKind = name.as_ref().parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub id: String,
    /// Channel name, or the counterpart's user name for direct messages.
    pub name: String,
    pub kind: ChannelKind,
    pub is_member: bool,
    pub is_archived: bool,
    /// Counterpart user id of a direct-message channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Channel {
    /// Directory of this channel below the archive root.
    ///
    /// A name that is already filesystem-safe is used as is. Any other name gets the
    /// channel id appended, so `a/b` can never land in the directory of a channel
    /// actually called `a_b`.
    pub fn storage_dir(&self) -> PathBuf {
        if safe_path_component(&self.name) == self.name {
            self.in_kind_dir(self.name.clone())
        } else {
            self.storage_dir_with_id()
        }
    }

    /// The channel name suffixed with its id; the fallback when [`Channel::storage_dir`]
    /// belongs to another channel.
    pub fn storage_dir_with_id(&self) -> PathBuf {
        self.in_kind_dir(safe_path_component(&format!("{}-{}", self.name, self.id)))
    }

    fn in_kind_dir(&self, name: String) -> PathBuf {
        match self.kind {
            ChannelKind::DirectMessage => PathBuf::from(DM_DIR).join(name),
            _ => PathBuf::from(name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConversation {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_mpim: bool,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_group: bool,
    #[serde(default)]
    is_member: Option<bool>,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    user: Option<String>,
}

impl RawConversation {
    fn kind(&self) -> ChannelKind {
        if self.is_im {
            ChannelKind::DirectMessage
        } else if self.is_private || self.is_mpim || self.is_group {
            ChannelKind::Private
        } else {
            ChannelKind::Public
        }
    }
}

/// All conversations of the requested kinds.
///
/// A failing listing is logged and yields whatever was fetched before the failure,
/// possibly nothing.
pub async fn list_channels(api: &SlackApi, kinds: &[ChannelKind]) -> Vec<Channel> {
    let types = kinds
        .iter()
        .map(ChannelKind::as_api_str)
        .collect::<Vec<_>>()
        .join(",");

    let paged = api
        .paginate(
            "conversations.list",
            &[("types", types.as_str()), ("exclude_archived", "false")],
            |body| take_array::<RawConversation>(body, "channels"),
        )
        .await;

    if let Some(e) = &paged.error {
        tracing::error!("Error fetching channels: {}", e);
    }

    let mut channels = Vec::with_capacity(paged.items.len());
    for raw in paged.items {
        let kind = raw.kind();
        let name = match kind {
            ChannelKind::DirectMessage => match raw.user.as_deref() {
                Some(user_id) => resolve_user_name(api, user_id).await,
                None => unknown_user(&raw.id),
            },
            _ => raw.name.clone().unwrap_or_else(|| raw.id.clone()),
        };

        channels.push(Channel {
            id: raw.id,
            name,
            kind,
            is_member: kind == ChannelKind::DirectMessage || raw.is_member.unwrap_or(false),
            is_archived: raw.is_archived,
            user: raw.user,
        });
    }

    channels
}

/// Name of a user for display and storage; any failure degrades to
/// `unknown_user_<id>`.
pub async fn resolve_user_name(api: &SlackApi, user_id: &str) -> String {
    match api.call("users.info", &[("user", user_id)]).await {
        Ok(body) => user_name(&body).unwrap_or_else(|| unknown_user(user_id)),
        Err(e) => {
            tracing::warn!("Error fetching user info for user_id {}: {}", user_id, e);
            unknown_user(user_id)
        }
    }
}

fn user_name(body: &Value) -> Option<String> {
    let user = body.get("user")?;
    ["name", "real_name"]
        .iter()
        .filter_map(|field| user.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

fn unknown_user(id: &str) -> String {
    format!("unknown_user_{}", id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skipped(String),
}

/// Which channels a backup run processes.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    /// Exact channel names (or ids); empty selects every channel.
    pub names: Vec<String>,
    /// Skip channels the token is not a member of.
    pub members_only: bool,
}

impl ChannelFilter {
    pub fn check(&self, channel: &Channel) -> Eligibility {
        if !self.names.is_empty()
            && !self
                .names
                .iter()
                .any(|name| *name == channel.name || *name == channel.id)
        {
            return Eligibility::Skipped("not selected".to_string());
        }

        if self.members_only && !channel.is_member {
            return Eligibility::Skipped("not a member".to_string());
        }

        Eligibility::Eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_api;
    use httpmock::prelude::*;
    use serde_json::json;

    fn channel(name: &str, kind: ChannelKind, is_member: bool) -> Channel {
        Channel {
            id: format!("C-{name}"),
            name: name.to_string(),
            kind,
            is_member,
            is_archived: false,
            user: None,
        }
    }

    #[test]
    fn test_channel_kind_parse() {
        assert_eq!("public_channel".parse::<ChannelKind>().unwrap(), ChannelKind::Public);
        assert_eq!("private".parse::<ChannelKind>().unwrap(), ChannelKind::Private);
        assert_eq!("im".parse::<ChannelKind>().unwrap(), ChannelKind::DirectMessage);
        assert!(matches!(
            "mpim".parse::<ChannelKind>(),
            Err(AppError::InvalidChannelType(_))
        ));
    }

    #[test]
    fn test_parse_kinds_dedups() {
        let kinds = parse_kinds(&["im", "public_channel", "dm"]).unwrap();
        assert_eq!(kinds, vec![ChannelKind::DirectMessage, ChannelKind::Public]);
    }

    #[test]
    fn test_storage_dir() {
        let public = channel("general", ChannelKind::Public, true);
        assert_eq!(public.storage_dir(), PathBuf::from("general"));

        let dm = channel("ana", ChannelKind::DirectMessage, true);
        assert_eq!(dm.storage_dir(), PathBuf::from("DMs/ana"));

        let odd = channel("../etc", ChannelKind::Private, true);
        assert_eq!(odd.storage_dir(), PathBuf::from(".._etc-C-.._etc"));
    }

    #[test]
    fn test_storage_dir_of_sanitized_name_never_matches_plain_name() {
        let slashed = channel("a/b", ChannelKind::Public, true);
        let plain = channel("a_b", ChannelKind::Public, true);

        assert_eq!(plain.storage_dir(), PathBuf::from("a_b"));
        assert_ne!(slashed.storage_dir(), plain.storage_dir());
        assert_eq!(slashed.storage_dir(), slashed.storage_dir_with_id());
    }

    #[test]
    fn test_storage_dir_with_id() {
        let public = channel("general", ChannelKind::Public, true);
        assert_eq!(public.storage_dir_with_id(), PathBuf::from("general-C-general"));
    }

    #[test]
    fn test_filter_by_name() {
        let filter = ChannelFilter {
            names: vec!["teamway".to_string()],
            members_only: false,
        };

        assert_eq!(
            filter.check(&channel("teamway", ChannelKind::Public, false)),
            Eligibility::Eligible
        );
        assert_eq!(
            filter.check(&channel("random", ChannelKind::Public, true)),
            Eligibility::Skipped("not selected".to_string())
        );
    }

    #[test]
    fn test_filter_by_membership() {
        let filter = ChannelFilter {
            names: Vec::new(),
            members_only: true,
        };

        assert_eq!(
            filter.check(&channel("random", ChannelKind::Public, false)),
            Eligibility::Skipped("not a member".to_string())
        );
        assert_eq!(
            filter.check(&channel("general", ChannelKind::Public, true)),
            Eligibility::Eligible
        );
    }

    #[test]
    fn test_user_name_prefers_name() {
        let body = json!({"ok": true, "user": {"name": "ana", "real_name": "Ana Real"}});
        assert_eq!(user_name(&body), Some("ana".to_string()));

        let body = json!({"ok": true, "user": {"name": "", "real_name": "Ana Real"}});
        assert_eq!(user_name(&body), Some("Ana Real".to_string()));

        assert_eq!(user_name(&json!({"ok": true})), None);
    }

    #[tokio::test]
    async fn test_list_channels_resolves_dm_names() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET)
                .path("/conversations.list")
                .query_param("types", "public_channel,im");
            then.status(200).json_body(json!({
                "ok": true,
                "channels": [
                    {"id": "C1", "name": "general", "is_channel": true, "is_member": true},
                    {"id": "C2", "name": "secret", "is_private": true, "is_member": false},
                    {"id": "D1", "is_im": true, "user": "U1"},
                    {"id": "D2", "is_im": true, "user": "U404"}
                ]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/users.info").query_param("user", "U1");
            then.status(200).json_body(json!({"ok": true, "user": {"id": "U1", "name": "ana"}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/users.info").query_param("user", "U404");
            then.status(200).json_body(json!({"ok": false, "error": "user_not_found"}));
        });

        let api = test_api(&server);
        let channels = list_channels(&api, &[ChannelKind::Public, ChannelKind::DirectMessage]).await;

        list.assert_calls(1);
        assert_eq!(channels.len(), 4);
        assert_eq!(channels[0].kind, ChannelKind::Public);
        assert!(channels[0].is_member);
        assert_eq!(channels[1].kind, ChannelKind::Private);
        assert!(!channels[1].is_member);
        assert_eq!(channels[2].name, "ana");
        assert_eq!(channels[2].kind, ChannelKind::DirectMessage);
        assert!(channels[2].is_member);
        assert_eq!(channels[3].name, "unknown_user_U404");
    }

    #[tokio::test]
    async fn test_list_channels_failure_is_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/conversations.list");
            then.status(200).json_body(json!({"ok": false, "error": "invalid_auth"}));
        });

        let api = test_api(&server);
        let channels = list_channels(&api, &ChannelKind::ALL).await;

        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_user_name_transport_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users.info");
            then.status(500);
        });

        let api = test_api(&server);
        assert_eq!(resolve_user_name(&api, "U9").await, "unknown_user_U9");
    }
}
