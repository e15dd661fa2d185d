//! Domain DTOs, request filters and response envelopes.
//!
//! # Design
//! Response types are deserialized straight from the wire shapes the service
//! returns. Filters are plain enums; `RequestFactory` turns them into query
//! parameters with a `match`, so adding a filter value never touches the
//! encoder.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::cache::SettingKey;
use crate::error::WeebError;

/// The JSON object stored under a setting.
pub type SettingData = Map<String, Value>;

/// Discord snowflakes arrive as either numbers or strings.
fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum FileType {
    Gif,
    Jpg,
    Png,
    /// Returned for file types this client does not know. Never sent.
    Unknown,
}

impl FileType {
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            FileType::Gif => Some("gif"),
            FileType::Jpg => Some("jpg"),
            FileType::Png => Some("png"),
            FileType::Unknown => None,
        }
    }
}

impl From<String> for FileType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "gif" => FileType::Gif,
            "jpg" | "jpeg" => FileType::Jpg,
            "png" => FileType::Png,
            _ => FileType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub name: String,
    pub user: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub base_type: String,
    pub file_type: FileType,
    pub mime_type: String,
    pub account: String,
    pub hidden: bool,
    pub nsfw: bool,
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub source: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewImage {
    pub url: String,
    pub id: String,
    pub file_type: FileType,
    pub base_type: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageTypes {
    pub types: Vec<String>,
    #[serde(default)]
    pub preview: Vec<PreviewImage>,
}

impl ImageTypes {
    pub fn preview_for(&self, kind: &str) -> Option<&PreviewImage> {
        self.preview
            .iter()
            .find(|p| p.kind.eq_ignore_ascii_case(kind))
    }
}

/// Whether hidden images are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HiddenMode {
    Only,
    Hide,
    Default,
}

impl HiddenMode {
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            HiddenMode::Only => Some("true"),
            HiddenMode::Hide => Some("false"),
            HiddenMode::Default => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsfwFilter {
    NoNsfw,
    AllowNsfw,
    OnlyNsfw,
}

impl NsfwFilter {
    pub fn query_value(self) -> &'static str {
        match self {
            NsfwFilter::NoNsfw => "false",
            NsfwFilter::AllowNsfw => "true",
            NsfwFilter::OnlyNsfw => "only",
        }
    }
}

/// Whether image type listings include a preview image per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    Show,
    Hide,
    Default,
}

impl PreviewMode {
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            PreviewMode::Show => Some("true"),
            PreviewMode::Hide => Some("false"),
            PreviewMode::Default => None,
        }
    }
}

/// Filters shared by tag and type listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageFilter {
    pub hidden: Option<HiddenMode>,
    pub nsfw: Option<NsfwFilter>,
}

/// Parameters of a random image lookup. At least one of `kind` or `tags`
/// must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomImageQuery {
    pub kind: Option<String>,
    pub tags: Vec<String>,
    pub filter: ImageFilter,
    pub file_type: Option<FileType>,
}

impl RandomImageQuery {
    pub fn of_type(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), WeebError> {
        if self.kind.is_none() && self.tags.is_empty() {
            return Err(WeebError::invalid("either type or tags must be present"));
        }
        if self.file_type == Some(FileType::Unknown) {
            return Err(WeebError::invalid(
                "unknown file type may not be used in requests",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Image generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscordStatus {
    Online,
    Idle,
    DoNotDisturb,
    Streaming,
    Offline,
}

impl DiscordStatus {
    pub fn query_value(self) -> &'static str {
        match self {
            DiscordStatus::Online => "online",
            DiscordStatus::Idle => "idle",
            DiscordStatus::DoNotDisturb => "dnd",
            DiscordStatus::Streaming => "streaming",
            DiscordStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseData {
    pub title: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<String>,
}

impl LicenseData {
    pub fn new(title: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            avatar: avatar.into(),
            badges: Vec::new(),
            widgets: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "discordUserId", deserialize_with = "snowflake")]
    pub discord_id: u64,
    pub active: bool,
    pub scopes: Vec<String>,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub account: Account,
    #[serde(rename = "wolkeToken")]
    pub wolke_token: bool,
    /// The token that was validated; filled in by the client.
    #[serde(skip)]
    pub token: String,
}

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

fn unknown_count() -> i64 {
    -1
}

/// Snapshot of a user's reputation state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub reputation: i64,
    pub cooldown: Vec<DateTime<FixedOffset>>,
    pub given_reputation: Vec<DateTime<FixedOffset>>,
    #[serde(rename = "userId", deserialize_with = "snowflake")]
    pub id: u64,
    #[serde(deserialize_with = "snowflake")]
    pub bot_id: u64,
    pub account_id: String,
    /// `-1` when the server did not report it.
    #[serde(default = "unknown_count")]
    pub available_reputations: i64,
    #[serde(default)]
    pub next_available_reputations: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub source_user: User,
    pub target_user: User,
}

/// Why the server refused a reputation transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The source user is still on cooldown.
    CooldownHit,
    /// The target already received the daily maximum.
    ReceivedMax,
    /// The target is at the maximum reputation.
    MaxReputation,
}

impl DenialReason {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(DenialReason::CooldownHit),
            2 => Some(DenialReason::ReceivedMax),
            3 => Some(DenialReason::MaxReputation),
            _ => None,
        }
    }
}

/// Per-bot reputation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSettings {
    pub reputation_per_day: i64,
    pub maximum_reputation: i64,
    pub maximum_reputation_received_day: i64,
    /// Seconds.
    pub reputation_cooldown: i64,
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            reputation_per_day: 2,
            maximum_reputation: 0,
            maximum_reputation_received_day: 0,
            reputation_cooldown: 86_400,
        }
    }
}

impl ReputationSettings {
    pub fn validate(&self) -> Result<(), WeebError> {
        if self.reputation_per_day < 1 {
            return Err(WeebError::invalid(
                "reputation per day must be greater than zero",
            ));
        }
        if self.maximum_reputation < 0 {
            return Err(WeebError::invalid("maximum reputation must not be negative"));
        }
        if self.maximum_reputation_received_day < 0 {
            return Err(WeebError::invalid(
                "maximum reputation received per day must not be negative",
            ));
        }
        if self.reputation_cooldown < 0 {
            return Err(WeebError::invalid("reputation cooldown must not be negative"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A setting or sub-setting document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSetting")]
pub struct Setting {
    pub key: SettingKey,
    pub data: SettingData,
}

impl Setting {
    pub fn new(key: SettingKey, data: SettingData) -> Self {
        Self { key, data }
    }

    pub fn is_sub_setting(&self) -> bool {
        matches!(self.key, SettingKey::SubSetting { .. })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSetting {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    sub_type: Option<String>,
    sub_id: Option<String>,
    #[serde(default)]
    data: SettingData,
}

impl TryFrom<RawSetting> for Setting {
    type Error = String;

    fn try_from(raw: RawSetting) -> Result<Self, Self::Error> {
        let key = match (raw.sub_type, raw.sub_id) {
            (Some(sub_type), Some(sub_id)) => {
                SettingKey::sub_setting(raw.kind, raw.id, sub_type, sub_id)
            }
            (None, None) => SettingKey::setting(raw.kind, raw.id),
            _ => return Err("sub-setting needs both subType and subId".to_string()),
        };
        Ok(Setting::new(key, raw.data))
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct TagsEnvelope {
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: User,
}

#[derive(Deserialize)]
pub(crate) struct ReputationSettingsEnvelope {
    pub settings: ReputationSettings,
}

#[derive(Deserialize)]
pub(crate) struct SettingEnvelope {
    pub setting: Setting,
}

#[derive(Deserialize)]
pub(crate) struct SubSettingEnvelope {
    pub subsetting: Setting,
}

#[derive(Deserialize)]
pub(crate) struct SubSettingListEnvelope {
    pub subsettings: Vec<SubSettingId>,
}

#[derive(Deserialize)]
pub(crate) struct SubSettingId {
    #[serde(rename = "subId")]
    pub sub_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_json() -> Value {
        json!({
            "reputation": 3,
            "cooldown": ["2018-03-01T12:00:00.000Z"],
            "givenReputation": [],
            "userId": "184632227894657025",
            "botId": 327_445_590_203_744_257_u64,
            "accountId": "acc",
            "availableReputations": 1,
            "nextAvailableReputations": [3600]
        })
    }

    #[test]
    fn user_accepts_string_and_number_ids() {
        let user: User = serde_json::from_value(user_json()).unwrap();
        assert_eq!(user.id, 184_632_227_894_657_025);
        assert_eq!(user.bot_id, 327_445_590_203_744_257);
        assert_eq!(user.cooldown.len(), 1);
        assert_eq!(user.next_available_reputations, vec![3600]);
    }

    #[test]
    fn user_defaults_optional_counters() {
        let mut raw = user_json();
        raw.as_object_mut().unwrap().remove("availableReputations");
        raw.as_object_mut().unwrap().remove("nextAvailableReputations");
        let user: User = serde_json::from_value(raw).unwrap();
        assert_eq!(user.available_reputations, -1);
        assert!(user.next_available_reputations.is_empty());
    }

    #[test]
    fn setting_parses_top_level() {
        let setting: Setting =
            serde_json::from_value(json!({"type": "guild", "id": "123", "data": {"x": 1}})).unwrap();
        assert_eq!(setting.key, SettingKey::setting("guild", "123"));
        assert_eq!(setting.data.get("x"), Some(&json!(1)));
        assert!(!setting.is_sub_setting());
    }

    #[test]
    fn setting_parses_sub_setting() {
        let setting: Setting = serde_json::from_value(json!({
            "type": "guild", "id": "1", "subType": "member", "subId": "2", "data": {}
        }))
        .unwrap();
        assert_eq!(setting.key, SettingKey::sub_setting("guild", "1", "member", "2"));
        assert!(setting.is_sub_setting());
    }

    #[test]
    fn setting_rejects_half_sub_setting() {
        let result: Result<Setting, _> = serde_json::from_value(json!({
            "type": "guild", "id": "1", "subId": "2", "data": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn file_type_aliases() {
        assert_eq!(FileType::from("JPEG".to_string()), FileType::Jpg);
        assert_eq!(FileType::from("webp".to_string()), FileType::Unknown);
        assert_eq!(FileType::Unknown.query_value(), None);
    }

    #[test]
    fn image_parses_without_source() {
        let image: Image = serde_json::from_value(json!({
            "id": "r1", "type": "pat", "baseType": "pat", "fileType": "gif",
            "mimeType": "image/gif", "account": "acc", "hidden": false, "nsfw": false,
            "tags": [{"name": "cute", "user": "u", "hidden": false}],
            "url": "https://cdn.weeb.sh/images/r1.gif"
        }))
        .unwrap();
        assert_eq!(image.file_type, FileType::Gif);
        assert_eq!(image.source, None);
        assert_eq!(image.tags[0].name, "cute");
    }

    #[test]
    fn random_query_requires_type_or_tags() {
        assert!(RandomImageQuery::default().validate().is_err());
        assert!(RandomImageQuery::of_type("pat").validate().is_ok());
        assert!(RandomImageQuery::with_tags(["cute"]).validate().is_ok());
        let unknown = RandomImageQuery {
            file_type: Some(FileType::Unknown),
            ..RandomImageQuery::of_type("pat")
        };
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn reputation_settings_validation() {
        assert!(ReputationSettings::default().validate().is_ok());
        let zero_per_day = ReputationSettings {
            reputation_per_day: 0,
            ..ReputationSettings::default()
        };
        assert!(zero_per_day.validate().is_err());
        let negative_cooldown = ReputationSettings {
            reputation_cooldown: -1,
            ..ReputationSettings::default()
        };
        assert!(negative_cooldown.validate().is_err());
    }

    #[test]
    fn reputation_settings_wire_names() {
        let value = serde_json::to_value(ReputationSettings::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "reputationPerDay": 2,
                "maximumReputation": 0,
                "maximumReputationReceivedDay": 0,
                "reputationCooldown": 86400
            })
        );
    }

    #[test]
    fn license_omits_empty_lists() {
        let value = serde_json::to_value(LicenseData::new("Weeb", "https://a/b.png")).unwrap();
        assert_eq!(value, json!({"title": "Weeb", "avatar": "https://a/b.png"}));
    }

    #[test]
    fn denial_codes() {
        assert_eq!(DenialReason::from_code(1), Some(DenialReason::CooldownHit));
        assert_eq!(DenialReason::from_code(2), Some(DenialReason::ReceivedMax));
        assert_eq!(DenialReason::from_code(3), Some(DenialReason::MaxReputation));
        assert_eq!(DenialReason::from_code(4), None);
    }
}
