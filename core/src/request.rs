//! Stateless request builder for the weeb.sh API.
//!
//! # Design
//! `RequestFactory` holds only the base URL and the base headers and carries
//! no mutable state between calls. Each operation has a `build_*` method that
//! runs the local validation for that operation and produces an
//! `HttpRequest`. Executing and classifying the request is the dispatcher's
//! job, so everything here is deterministic and testable without I/O.

use serde::Serialize;
use serde_json::json;

use crate::cache::SettingKey;
use crate::config::ClientConfig;
use crate::endpoint::Operation;
use crate::error::WeebError;
use crate::http::{HttpMethod, HttpRequest};
use crate::query::QueryString;
use crate::types::{
    DiscordStatus, FileType, HiddenMode, ImageFilter, LicenseData, NsfwFilter, PreviewMode,
    RandomImageQuery, ReputationSettings, SettingData,
};

/// Every request advertises the encodings `decode` understands.
pub const ACCEPT_ENCODING: &str = "gzip, deflate";

/// An RGB colour sent as six uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u32);

impl Rgb {
    pub fn hex(self) -> String {
        format!("{:06X}", self.0 & 0x00FF_FFFF)
    }
}

#[derive(Debug, Clone)]
pub struct RequestFactory {
    base_url: String,
    authorization: String,
    user_agent: String,
}

impl RequestFactory {
    pub fn new(base_url: &str, authorization: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: authorization.into(),
            user_agent: user_agent.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base(), config.authorization(), config.user_agent())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of `op` with the endpoint's fixed query parameters appended.
    fn query(&self, op: Operation, segments: &[&str]) -> Result<QueryString, WeebError> {
        let descriptor = op.descriptor();
        let mut query = QueryString::new(descriptor.url(&self.base_url, segments)?);
        for (key, value) in descriptor.query {
            query.append(key, value);
        }
        Ok(query)
    }

    fn url(&self, op: Operation, segments: &[&str]) -> Result<String, WeebError> {
        self.query(op, segments).map(QueryString::build)
    }

    fn reputation_url(&self, op: Operation, bot_id: u64, user_id: u64) -> Result<String, WeebError> {
        let bot_id = bot_id.to_string();
        let user_id = user_id.to_string();
        self.url(op, &[bot_id.as_str(), user_id.as_str()])
    }

    fn request(&self, op: Operation, url: String) -> HttpRequest {
        HttpRequest {
            method: op.descriptor().method,
            url,
            headers: vec![
                ("Authorization".to_string(), self.authorization.clone()),
                ("User-Agent".to_string(), self.user_agent.clone()),
                ("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()),
            ],
            body: None,
        }
    }

    fn json_request<B: Serialize + ?Sized>(
        &self,
        op: Operation,
        url: String,
        body: &B,
    ) -> Result<HttpRequest, WeebError> {
        let body = serde_json::to_string(body).map_err(|e| WeebError::Serialization(e.to_string()))?;
        let mut req = self.request(op, url);
        req.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        req.body = Some(body);
        Ok(req)
    }

    // -- accounts -----------------------------------------------------------

    pub fn build_token_info(&self, token: &str) -> Result<HttpRequest, WeebError> {
        let query = self.query(Operation::TokenInfo, &[token])?;
        Ok(self.request(Operation::TokenInfo, query.build()))
    }

    // -- images -------------------------------------------------------------

    pub fn build_image_tags(&self, filter: ImageFilter) -> Result<HttpRequest, WeebError> {
        let mut query = self.query(Operation::ImageTags, &[])?;
        append_filter(&mut query, filter);
        Ok(self.request(Operation::ImageTags, query.build()))
    }

    pub fn build_image_types(
        &self,
        filter: ImageFilter,
        preview: Option<PreviewMode>,
    ) -> Result<HttpRequest, WeebError> {
        let mut query = self.query(Operation::ImageTypes, &[])?;
        append_filter(&mut query, filter);
        if let Some(value) = preview.and_then(PreviewMode::query_value) {
            query.append("preview", value);
        }
        Ok(self.request(Operation::ImageTypes, query.build()))
    }

    pub fn build_random_image(&self, params: &RandomImageQuery) -> Result<HttpRequest, WeebError> {
        params.validate()?;
        let mut query = self.query(Operation::RandomImage, &[])?;
        if let Some(kind) = &params.kind {
            query.append("type", kind);
        }
        query.append_list("tags", &params.tags);
        append_filter(&mut query, params.filter);
        if let Some(value) = params.file_type.and_then(FileType::query_value) {
            query.append("filetype", value);
        }
        Ok(self.request(Operation::RandomImage, query.build()))
    }

    pub fn build_image_by_id(&self, id: &str) -> Result<HttpRequest, WeebError> {
        let url = self.url(Operation::ImageById, &[id])?;
        Ok(self.request(Operation::ImageById, url))
    }

    /// Plain GET for an arbitrary image URL. The token is only ever sent to
    /// the API host.
    pub fn build_download(&self, url: &str) -> Result<HttpRequest, WeebError> {
        check_http_url("image url", url)?;
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()),
        ];
        let api_host = url
            .strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if api_host {
            headers.insert(0, ("Authorization".to_string(), self.authorization.clone()));
        }
        Ok(HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers,
            body: None,
        })
    }

    // -- image generation ---------------------------------------------------

    pub fn build_generate_awoo(&self, face: Option<Rgb>, hair: Option<Rgb>) -> Result<HttpRequest, WeebError> {
        let mut query = self.query(Operation::GenerateAwoo, &[])?;
        if let Some(face) = face {
            query.append("face", &face.hex());
        }
        if let Some(hair) = hair {
            query.append("hair", &hair.hex());
        }
        Ok(self.request(Operation::GenerateAwoo, query.build()))
    }

    pub fn build_generate_eyes(&self) -> Result<HttpRequest, WeebError> {
        let query = self.query(Operation::GenerateEyes, &[])?;
        Ok(self.request(Operation::GenerateEyes, query.build()))
    }

    pub fn build_generate_won(&self) -> Result<HttpRequest, WeebError> {
        let query = self.query(Operation::GenerateWon, &[])?;
        Ok(self.request(Operation::GenerateWon, query.build()))
    }

    pub fn build_discord_status(
        &self,
        avatar: &str,
        status: Option<DiscordStatus>,
    ) -> Result<HttpRequest, WeebError> {
        check_http_url("avatar", avatar)?;
        let mut query = self.query(Operation::DiscordStatus, &[])?;
        query.append("avatar", avatar);
        if let Some(status) = status {
            query.append("status", status.query_value());
        }
        Ok(self.request(Operation::DiscordStatus, query.build()))
    }

    pub fn build_license(&self, data: &LicenseData) -> Result<HttpRequest, WeebError> {
        if data.title.is_empty() {
            return Err(WeebError::invalid("license title must not be empty"));
        }
        check_http_url("avatar", &data.avatar)?;
        let url = self.url(Operation::License, &[])?;
        self.json_request(Operation::License, url, data)
    }

    pub fn build_waifu_insult(&self, avatar: &str) -> Result<HttpRequest, WeebError> {
        check_http_url("avatar", avatar)?;
        let url = self.url(Operation::WaifuInsult, &[])?;
        self.json_request(Operation::WaifuInsult, url, &json!({ "avatar": avatar }))
    }

    pub fn build_loveship(&self, first: &str, second: &str) -> Result<HttpRequest, WeebError> {
        check_http_url("first avatar", first)?;
        check_http_url("second avatar", second)?;
        let url = self.url(Operation::Loveship, &[])?;
        self.json_request(
            Operation::Loveship,
            url,
            &json!({ "targetOne": first, "targetTwo": second }),
        )
    }

    // -- reputation ---------------------------------------------------------

    pub fn build_get_user(&self, bot_id: u64, user_id: u64) -> Result<HttpRequest, WeebError> {
        let url = self.reputation_url(Operation::GetUser, bot_id, user_id)?;
        Ok(self.request(Operation::GetUser, url))
    }

    pub fn build_give_reputation(
        &self,
        bot_id: u64,
        source_id: u64,
        target_id: u64,
    ) -> Result<HttpRequest, WeebError> {
        if source_id == target_id {
            return Err(WeebError::invalid("a user cannot give reputation to itself"));
        }
        let url = self.reputation_url(Operation::GiveReputation, bot_id, target_id)?;
        self.json_request(
            Operation::GiveReputation,
            url,
            &json!({ "source_user": source_id.to_string() }),
        )
    }

    pub fn build_reset_reputation(&self, bot_id: u64, user_id: u64) -> Result<HttpRequest, WeebError> {
        let url = self.reputation_url(Operation::ResetReputation, bot_id, user_id)?;
        self.json_request(Operation::ResetReputation, url, &json!({}))
    }

    pub fn build_increase_reputation(
        &self,
        bot_id: u64,
        user_id: u64,
        amount: u32,
    ) -> Result<HttpRequest, WeebError> {
        let url = self.reputation_url(Operation::IncreaseReputation, bot_id, user_id)?;
        self.json_request(Operation::IncreaseReputation, url, &json!({ "increase": amount }))
    }

    pub fn build_decrease_reputation(
        &self,
        bot_id: u64,
        user_id: u64,
        amount: u32,
    ) -> Result<HttpRequest, WeebError> {
        let url = self.reputation_url(Operation::DecreaseReputation, bot_id, user_id)?;
        self.json_request(Operation::DecreaseReputation, url, &json!({ "decrease": amount }))
    }

    pub fn build_get_reputation_settings(&self) -> Result<HttpRequest, WeebError> {
        let url = self.url(Operation::GetReputationSettings, &[])?;
        Ok(self.request(Operation::GetReputationSettings, url))
    }

    pub fn build_set_reputation_settings(
        &self,
        settings: &ReputationSettings,
    ) -> Result<HttpRequest, WeebError> {
        settings.validate()?;
        let url = self.url(Operation::SetReputationSettings, &[])?;
        self.json_request(Operation::SetReputationSettings, url, settings)
    }

    // -- settings -----------------------------------------------------------

    fn setting_op(key: &SettingKey, top: Operation, sub: Operation) -> Operation {
        match key {
            SettingKey::Setting { .. } => top,
            SettingKey::SubSetting { .. } => sub,
        }
    }

    /// GET for a setting or sub-setting, chosen by the key's shape.
    pub fn build_get_setting(&self, key: &SettingKey) -> Result<HttpRequest, WeebError> {
        let op = Self::setting_op(key, Operation::GetSetting, Operation::GetSubSetting);
        let url = self.url(op, &key.segments())?;
        Ok(self.request(op, url))
    }

    /// POST of `data`. The size limit is enforced by `CacheAsideStore::save`,
    /// which every client save goes through before anything is sent.
    pub fn build_save_setting(&self, key: &SettingKey, data: &SettingData) -> Result<HttpRequest, WeebError> {
        let op = Self::setting_op(key, Operation::SaveSetting, Operation::SaveSubSetting);
        let url = self.url(op, &key.segments())?;
        self.json_request(op, url, data)
    }

    pub fn build_delete_setting(&self, key: &SettingKey) -> Result<HttpRequest, WeebError> {
        let op = Self::setting_op(key, Operation::DeleteSetting, Operation::DeleteSubSetting);
        let url = self.url(op, &key.segments())?;
        Ok(self.request(op, url))
    }

    pub fn build_list_sub_settings(
        &self,
        parent_kind: &str,
        parent_id: &str,
        kind: &str,
    ) -> Result<HttpRequest, WeebError> {
        let url = self.url(Operation::ListSubSettings, &[parent_kind, parent_id, kind])?;
        Ok(self.request(Operation::ListSubSettings, url))
    }
}

fn append_filter(query: &mut QueryString, filter: ImageFilter) {
    if let Some(value) = filter.hidden.and_then(HiddenMode::query_value) {
        query.append("hidden", value);
    }
    if let Some(nsfw) = filter.nsfw {
        query.append("nsfw", NsfwFilter::query_value(nsfw));
    }
}

fn check_http_url(what: &str, value: &str) -> Result<(), WeebError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| WeebError::invalid(format!("{what} is not a valid url: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(()),
        scheme => Err(WeebError::invalid(format!(
            "{what} must be an http(s) url, got scheme {scheme}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn factory() -> RequestFactory {
        RequestFactory::new("http://localhost:3000/", "Wolke secret", "weebsh-rs/test")
    }

    fn body(req: &HttpRequest) -> Value {
        serde_json::from_str(req.body.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn base_headers_on_every_request() {
        let req = factory().build_image_tags(ImageFilter::default()).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:3000/images/tags");
        assert_eq!(req.header("authorization"), Some("Wolke secret"));
        assert_eq!(req.header("user-agent"), Some("weebsh-rs/test"));
        assert_eq!(req.header("accept-encoding"), Some("gzip, deflate"));
        assert_eq!(req.header("content-type"), None);
        assert!(req.body.is_none());
    }

    #[test]
    fn token_info_appends_wolke_flag() {
        let req = factory().build_token_info("abc").unwrap();
        assert_eq!(req.url, "http://localhost:3000/accounts/validate/abc?wolkeToken=1");
    }

    #[test]
    fn image_types_query_order() {
        let filter = ImageFilter {
            hidden: Some(HiddenMode::Hide),
            nsfw: Some(NsfwFilter::OnlyNsfw),
        };
        let req = factory()
            .build_image_types(filter, Some(PreviewMode::Show))
            .unwrap();
        assert_eq!(
            req.url,
            "http://localhost:3000/images/types?hidden=false&nsfw=only&preview=true"
        );
    }

    #[test]
    fn default_modes_add_nothing() {
        let filter = ImageFilter {
            hidden: Some(HiddenMode::Default),
            nsfw: None,
        };
        let req = factory()
            .build_image_types(filter, Some(PreviewMode::Default))
            .unwrap();
        assert_eq!(req.url, "http://localhost:3000/images/types");
    }

    #[test]
    fn random_image_encodes_tags_and_type() {
        let params = RandomImageQuery {
            kind: Some("pat".into()),
            tags: vec!["a b".into(), "c&d".into()],
            filter: ImageFilter::default(),
            file_type: Some(FileType::Gif),
        };
        let req = factory().build_random_image(&params).unwrap();
        assert_eq!(
            req.url,
            "http://localhost:3000/images/random?type=pat&tags=a%20b,c%26d&filetype=gif"
        );
    }

    #[test]
    fn random_image_without_type_or_tags_is_rejected() {
        let err = factory()
            .build_random_image(&RandomImageQuery::default())
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn awoo_colours_are_hex() {
        let req = factory()
            .build_generate_awoo(Some(Rgb(0xFF00AA)), Some(Rgb(0x1)))
            .unwrap();
        assert_eq!(
            req.url,
            "http://localhost:3000/auto-image/generate?type=awooo&face=FF00AA&hair=000001"
        );
    }

    #[test]
    fn discord_status_validates_avatar() {
        let req = factory()
            .build_discord_status("https://cdn.discordapp.com/a.png", Some(DiscordStatus::DoNotDisturb))
            .unwrap();
        assert_eq!(
            req.url,
            "http://localhost:3000/auto-image/discord-status?avatar=https%3A%2F%2Fcdn.discordapp.com%2Fa.png&status=dnd"
        );
        assert!(factory().build_discord_status("not a url", None).is_err());
        assert!(factory().build_discord_status("ftp://x/a.png", None).is_err());
    }

    #[test]
    fn post_bodies_are_json() {
        let req = factory().build_loveship("https://a/1.png", "https://a/2.png").unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(body(&req)["targetTwo"], "https://a/2.png");

        let req = factory().build_give_reputation(1, 2, 3).unwrap();
        assert_eq!(req.url, "http://localhost:3000/reputation/1/3");
        assert_eq!(body(&req), json!({"source_user": "2"}));

        let req = factory().build_reset_reputation(1, 2).unwrap();
        assert_eq!(req.url, "http://localhost:3000/reputation/1/2/reset");
        assert_eq!(body(&req), json!({}));

        let req = factory().build_decrease_reputation(1, 2, 5).unwrap();
        assert_eq!(body(&req), json!({"decrease": 5}));
    }

    #[test]
    fn self_transfer_is_rejected() {
        assert!(factory().build_give_reputation(1, 2, 2).is_err());
    }

    #[test]
    fn license_validates_before_serializing() {
        let mut data = LicenseData::new("Weeb", "https://a/b.png");
        data.badges.push("https://a/badge.png".into());
        let req = factory().build_license(&data).unwrap();
        assert_eq!(body(&req)["badges"][0], "https://a/badge.png");
        assert!(factory().build_license(&LicenseData::new("", "https://a/b.png")).is_err());
    }

    #[test]
    fn reputation_settings_are_validated() {
        let bad = ReputationSettings {
            reputation_per_day: 0,
            ..ReputationSettings::default()
        };
        assert!(factory().build_set_reputation_settings(&bad).is_err());
        let req = factory()
            .build_set_reputation_settings(&ReputationSettings::default())
            .unwrap();
        assert_eq!(body(&req)["reputationCooldown"], 86400);
    }

    #[test]
    fn setting_routes_follow_key_shape() {
        let top = SettingKey::setting("guild", "123");
        let sub = SettingKey::sub_setting("guild", "123", "member", "9");
        assert_eq!(
            factory().build_get_setting(&top).unwrap().url,
            "http://localhost:3000/settings/guild/123"
        );
        let req = factory().build_delete_setting(&sub).unwrap();
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.url, "http://localhost:3000/settings/guild/123/member/9");
        assert_eq!(
            factory().build_list_sub_settings("guild", "123", "member").unwrap().url,
            "http://localhost:3000/settings/guild/123/member"
        );
    }

    #[test]
    fn empty_setting_segment_is_rejected() {
        assert!(factory()
            .build_get_setting(&SettingKey::setting("guild", ""))
            .is_err());
    }

    #[test]
    fn download_sends_token_only_to_api_host() {
        let req = factory().build_download("https://cdn.weeb.sh/images/a.gif").unwrap();
        assert_eq!(req.header("authorization"), None);
        assert_eq!(req.header("accept-encoding"), Some("gzip, deflate"));
        let req = factory().build_download("http://localhost:3000/files/a.gif").unwrap();
        assert_eq!(req.header("authorization"), Some("Wolke secret"));
    }
}
