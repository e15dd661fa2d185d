//! Typed async client for the weeb.sh API.
//!
//! # Design
//! `WeebClient` composes three parts and adds no logic of its own beyond
//! wiring them per operation:
//! - `RequestFactory` builds and validates the request,
//! - `Dispatcher` runs it through the limiter, transport, decoder and
//!   classifier,
//! - two `CacheAsideStore`s keep settings and downloaded images.
//!
//! Every operation returns `Result<Option<T>, WeebError>`: `Ok(None)` means
//! the server answered 404. Argument errors are returned before any cache or
//! network side effect.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::cache::{CacheAsideStore, CacheBackend, SettingKey};
use crate::classify::Outcome;
use crate::config::{ClientConfig, ConfigError};
use crate::dispatch::Dispatcher;
use crate::endpoint::Operation;
use crate::error::WeebError;
use crate::http::{ByteStream, HttpRequest, Transport};
use crate::ratelimit::{NoopRateLimiterFactory, RateLimiterFactory};
use crate::request::{RequestFactory, Rgb};
use crate::transport::ReqwestTransport;
use crate::types::{
    DiscordStatus, Image, ImageFilter, ImageTypes, LicenseData, PreviewMode, RandomImageQuery,
    ReputationSettings, ReputationSettingsEnvelope, Setting, SettingData, SettingEnvelope,
    SubSettingEnvelope, SubSettingListEnvelope, TagsEnvelope, TokenInfo, TransferResult, User,
    UserEnvelope,
};

pub struct WeebClient {
    requests: RequestFactory,
    dispatcher: Dispatcher,
    settings: CacheAsideStore<SettingKey, SettingData>,
    images: CacheAsideStore<String, Bytes>,
    bot_id: Option<u64>,
}

impl std::fmt::Debug for WeebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeebClient")
            .field("base_url", &self.requests.base_url())
            .field("bot_id", &self.bot_id)
            .finish_non_exhaustive()
    }
}

impl WeebClient {
    /// Client over `reqwest` with no rate limiting and no caches.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = ReqwestTransport::with_timeout(config.timeout())
            .map_err(|e| ConfigError::Invalid(format!("cannot build http client: {e}")))?;
        Self::from_parts(config, Arc::new(transport), Arc::new(NoopRateLimiterFactory))
    }

    pub fn from_parts(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        limiters: Arc<dyn RateLimiterFactory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            requests: RequestFactory::from_config(config),
            dispatcher: Dispatcher::new(transport, limiters),
            settings: CacheAsideStore::disabled("settings"),
            images: CacheAsideStore::disabled("images"),
            bot_id: config.bot_id,
        })
    }

    pub fn with_setting_cache(mut self, backend: Arc<dyn CacheBackend<SettingKey, SettingData>>) -> Self {
        self.settings = CacheAsideStore::new("settings", backend);
        self
    }

    pub fn with_image_cache(mut self, backend: Arc<dyn CacheBackend<String, Bytes>>) -> Self {
        self.images = CacheAsideStore::new("images", backend);
        self
    }

    pub fn with_bot_id(mut self, bot_id: u64) -> Self {
        self.bot_id = Some(bot_id);
        self
    }

    pub fn bot_id(&self) -> Option<u64> {
        self.bot_id
    }

    pub fn requests(&self) -> &RequestFactory {
        &self.requests
    }

    fn require_bot_id(&self) -> Result<u64, WeebError> {
        self.bot_id
            .ok_or_else(|| WeebError::invalid("bot id must be configured for reputation calls"))
    }

    async fn json<T: serde::de::DeserializeOwned>(
        &self,
        op: Operation,
        request: HttpRequest,
    ) -> Result<Option<T>, WeebError> {
        self.dispatcher.call_json(op, request).await.into_result()
    }

    async fn stream(&self, op: Operation, request: HttpRequest) -> Result<Option<ByteStream>, WeebError> {
        self.dispatcher.call_stream(op, request).await.into_result()
    }

    // -- accounts -----------------------------------------------------------

    /// Account and scopes behind `token`.
    pub async fn token_info(&self, token: &str) -> Result<Option<TokenInfo>, WeebError> {
        let request = self.requests.build_token_info(token)?;
        let info: Option<TokenInfo> = self.json(Operation::TokenInfo, request).await?;
        Ok(info.map(|info| TokenInfo {
            token: token.to_string(),
            ..info
        }))
    }

    // -- images -------------------------------------------------------------

    pub async fn image_tags(&self, filter: ImageFilter) -> Result<Option<Vec<String>>, WeebError> {
        let request = self.requests.build_image_tags(filter)?;
        let tags: Option<TagsEnvelope> = self.json(Operation::ImageTags, request).await?;
        Ok(tags.map(|t| t.tags))
    }

    pub async fn image_types(
        &self,
        filter: ImageFilter,
        preview: Option<PreviewMode>,
    ) -> Result<Option<ImageTypes>, WeebError> {
        let request = self.requests.build_image_types(filter, preview)?;
        self.json(Operation::ImageTypes, request).await
    }

    pub async fn random_image(&self, query: &RandomImageQuery) -> Result<Option<Image>, WeebError> {
        let request = self.requests.build_random_image(query)?;
        self.json(Operation::RandomImage, request).await
    }

    pub async fn image_by_id(&self, id: &str) -> Result<Option<Image>, WeebError> {
        let request = self.requests.build_image_by_id(id)?;
        self.json(Operation::ImageById, request).await
    }

    /// Download `url` in full through the image cache.
    pub async fn download(&self, url: &str) -> Result<Option<Bytes>, WeebError> {
        let request = self.requests.build_download(url)?;
        let key = url.to_string();
        self.images
            .get_or_compute(&key, move || async move {
                self.dispatcher.fetch_bytes(request).await.into_result()
            })
            .await
    }

    pub async fn download_image(&self, image: &Image) -> Result<Option<Bytes>, WeebError> {
        self.download(&image.url).await
    }

    /// Stream `url` without buffering it and without touching the cache.
    pub async fn download_stream(&self, url: &str) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_download(url)?;
        self.dispatcher.fetch(request).await.into_result()
    }

    // -- image generation ---------------------------------------------------

    pub async fn generate_awoo(
        &self,
        face: Option<Rgb>,
        hair: Option<Rgb>,
    ) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_generate_awoo(face, hair)?;
        self.stream(Operation::GenerateAwoo, request).await
    }

    pub async fn generate_eyes(&self) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_generate_eyes()?;
        self.stream(Operation::GenerateEyes, request).await
    }

    pub async fn generate_won(&self) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_generate_won()?;
        self.stream(Operation::GenerateWon, request).await
    }

    pub async fn discord_status(
        &self,
        avatar: &str,
        status: Option<DiscordStatus>,
    ) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_discord_status(avatar, status)?;
        self.stream(Operation::DiscordStatus, request).await
    }

    pub async fn license(&self, data: &LicenseData) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_license(data)?;
        self.stream(Operation::License, request).await
    }

    pub async fn waifu_insult(&self, avatar: &str) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_waifu_insult(avatar)?;
        self.stream(Operation::WaifuInsult, request).await
    }

    pub async fn loveship(&self, first: &str, second: &str) -> Result<Option<ByteStream>, WeebError> {
        let request = self.requests.build_loveship(first, second)?;
        self.stream(Operation::Loveship, request).await
    }

    // -- reputation ---------------------------------------------------------

    pub async fn user(&self, user_id: u64) -> Result<Option<User>, WeebError> {
        let request = self.requests.build_get_user(self.require_bot_id()?, user_id)?;
        let user: Option<UserEnvelope> = self.json(Operation::GetUser, request).await?;
        Ok(user.map(|u| u.user))
    }

    /// Give one reputation point from `source_id` to `target_id`.
    ///
    /// A refusal for a known reason is `WeebError::TransferDenied`.
    pub async fn give_reputation(
        &self,
        source_id: u64,
        target_id: u64,
    ) -> Result<Option<TransferResult>, WeebError> {
        let request = self
            .requests
            .build_give_reputation(self.require_bot_id()?, source_id, target_id)?;
        self.json(Operation::GiveReputation, request).await
    }

    pub async fn reset_reputation(&self, user_id: u64) -> Result<Option<User>, WeebError> {
        let request = self
            .requests
            .build_reset_reputation(self.require_bot_id()?, user_id)?;
        let user: Option<UserEnvelope> = self.json(Operation::ResetReputation, request).await?;
        Ok(user.map(|u| u.user))
    }

    pub async fn increase_reputation(&self, user_id: u64, amount: u32) -> Result<Option<User>, WeebError> {
        let request = self
            .requests
            .build_increase_reputation(self.require_bot_id()?, user_id, amount)?;
        let user: Option<UserEnvelope> = self.json(Operation::IncreaseReputation, request).await?;
        Ok(user.map(|u| u.user))
    }

    pub async fn decrease_reputation(&self, user_id: u64, amount: u32) -> Result<Option<User>, WeebError> {
        let request = self
            .requests
            .build_decrease_reputation(self.require_bot_id()?, user_id, amount)?;
        let user: Option<UserEnvelope> = self.json(Operation::DecreaseReputation, request).await?;
        Ok(user.map(|u| u.user))
    }

    pub async fn reputation_settings(&self) -> Result<Option<ReputationSettings>, WeebError> {
        let request = self.requests.build_get_reputation_settings()?;
        let settings: Option<ReputationSettingsEnvelope> =
            self.json(Operation::GetReputationSettings, request).await?;
        Ok(settings.map(|s| s.settings))
    }

    pub async fn set_reputation_settings(
        &self,
        settings: &ReputationSettings,
    ) -> Result<Option<ReputationSettings>, WeebError> {
        let request = self.requests.build_set_reputation_settings(settings)?;
        let settings: Option<ReputationSettingsEnvelope> =
            self.json(Operation::SetReputationSettings, request).await?;
        Ok(settings.map(|s| s.settings))
    }

    // -- settings -----------------------------------------------------------

    /// One settings round-trip; the envelope name depends on the key shape.
    async fn call_setting(
        &self,
        op: Operation,
        sub: bool,
        request: HttpRequest,
    ) -> Result<Option<Setting>, WeebError> {
        let outcome = if sub {
            let outcome: Outcome<SubSettingEnvelope> = self.dispatcher.call_json(op, request).await;
            outcome.map(|e| e.subsetting)
        } else {
            let outcome: Outcome<SettingEnvelope> = self.dispatcher.call_json(op, request).await;
            outcome.map(|e| e.setting)
        };
        outcome.into_result()
    }

    /// Read a setting or sub-setting, serving it from the cache when present.
    pub async fn get_setting(&self, key: SettingKey) -> Result<Option<Setting>, WeebError> {
        let request = self.requests.build_get_setting(&key)?;
        let sub = key.parent().is_some();
        let op = if sub {
            Operation::GetSubSetting
        } else {
            Operation::GetSetting
        };
        let data = self
            .settings
            .fetch(&key, move || async move {
                let setting = self.call_setting(op, sub, request).await?;
                Ok(setting.map(|s| s.data))
            })
            .await?;
        Ok(data.map(|data| Setting::new(key, data)))
    }

    /// Store `data` under `key`. The cache is written before the request is
    /// sent and is not rolled back if the server rejects it.
    pub async fn put_setting(&self, key: SettingKey, data: SettingData) -> Result<Option<Setting>, WeebError> {
        let request = self.requests.build_save_setting(&key, &data)?;
        let sub = key.parent().is_some();
        let op = if sub {
            Operation::SaveSubSetting
        } else {
            Operation::SaveSetting
        };
        debug!(?key, "saving setting");
        self.settings
            .save(key, data, move || self.call_setting(op, sub, request))
            .await
    }

    /// Invalidate `key` locally, then delete it on the server.
    pub async fn remove_setting(&self, key: SettingKey) -> Result<Option<Setting>, WeebError> {
        let request = self.requests.build_delete_setting(&key)?;
        let sub = key.parent().is_some();
        let op = if sub {
            Operation::DeleteSubSetting
        } else {
            Operation::DeleteSetting
        };
        self.settings
            .remove(&key, move || self.call_setting(op, sub, request))
            .await
    }

    pub async fn setting(&self, kind: &str, id: &str) -> Result<Option<Setting>, WeebError> {
        self.get_setting(SettingKey::setting(kind, id)).await
    }

    pub async fn save_setting(
        &self,
        kind: &str,
        id: &str,
        data: SettingData,
    ) -> Result<Option<Setting>, WeebError> {
        self.put_setting(SettingKey::setting(kind, id), data).await
    }

    pub async fn delete_setting(&self, kind: &str, id: &str) -> Result<Option<Setting>, WeebError> {
        self.remove_setting(SettingKey::setting(kind, id)).await
    }

    pub async fn sub_setting(
        &self,
        parent_kind: &str,
        parent_id: &str,
        kind: &str,
        id: &str,
    ) -> Result<Option<Setting>, WeebError> {
        self.get_setting(SettingKey::sub_setting(parent_kind, parent_id, kind, id))
            .await
    }

    pub async fn save_sub_setting(
        &self,
        parent_kind: &str,
        parent_id: &str,
        kind: &str,
        id: &str,
        data: SettingData,
    ) -> Result<Option<Setting>, WeebError> {
        self.put_setting(SettingKey::sub_setting(parent_kind, parent_id, kind, id), data)
            .await
    }

    pub async fn delete_sub_setting(
        &self,
        parent_kind: &str,
        parent_id: &str,
        kind: &str,
        id: &str,
    ) -> Result<Option<Setting>, WeebError> {
        self.remove_setting(SettingKey::sub_setting(parent_kind, parent_id, kind, id))
            .await
    }

    /// Ids of the sub-settings of one type under a parent. Never cached.
    pub async fn list_sub_settings(
        &self,
        parent_kind: &str,
        parent_id: &str,
        kind: &str,
    ) -> Result<Option<Vec<String>>, WeebError> {
        let request = self
            .requests
            .build_list_sub_settings(parent_kind, parent_id, kind)?;
        let list: Option<SubSettingListEnvelope> = self.json(Operation::ListSubSettings, request).await?;
        Ok(list.map(|l| l.subsettings.into_iter().map(|s| s.sub_id).collect()))
    }
}
