//! Endpoint descriptors and the rate-limit bucket table.
//!
//! # Design
//! Every remote operation is an `Operation` variant with one immutable
//! `EndpointDescriptor`. The bucket in the descriptor names the counter the
//! upstream server uses for that call. Operations the server throttles as a
//! group share a key; operations it tracks separately must not, or one busy
//! endpoint would starve the others (shared key) or trigger upstream 429s
//! (split key).

use std::fmt;

use serde_json::Value;

use crate::classify::reputation_transfer_override;
use crate::error::WeebError;
use crate::http::HttpMethod;
use crate::query;

/// Identifier of a rate-limit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(&'static str);

impl BucketKey {
    pub const fn new(key: &'static str) -> Self {
        Self(key)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub mod buckets {
    use super::BucketKey;

    pub const TOKEN_VALIDATION: BucketKey = BucketKey::new("/accounts/validate");
    pub const IMAGE_TAGS: BucketKey = BucketKey::new("/images/tags");
    pub const IMAGE_TYPES: BucketKey = BucketKey::new("/images/types");
    pub const RANDOM_IMAGE: BucketKey = BucketKey::new("/images/random");
    pub const IMAGE_INFO: BucketKey = BucketKey::new("/images/info");
    pub const GENERATE: BucketKey = BucketKey::new("/auto-image/generate");
    pub const DISCORD_STATUS: BucketKey = BucketKey::new("/auto-image/discord-status");
    pub const LICENSE: BucketKey = BucketKey::new("/auto-image/license");
    pub const WAIFU_INSULT: BucketKey = BucketKey::new("/auto-image/waifu-insult");
    pub const LOVESHIP: BucketKey = BucketKey::new("/auto-image/love-ship");
    pub const REPUTATION: BucketKey = BucketKey::new("/reputation");
    pub const REPUTATION_RESET: BucketKey = BucketKey::new("/reputation/reset");
    pub const REPUTATION_INCREASE: BucketKey = BucketKey::new("/reputation/increase");
    pub const REPUTATION_DECREASE: BucketKey = BucketKey::new("/reputation/decrease");
    pub const REPUTATION_SETTINGS: BucketKey = BucketKey::new("/reputation/settings");
    pub const SETTINGS: BucketKey = BucketKey::new("/settings");
}

/// Endpoint-specific classification hook, consulted after the success and
/// 404 checks and before the generic status table.
pub type ErrorOverride = fn(status: u16, body: Option<&Value>) -> Option<WeebError>;

/// How a response to an endpoint is classified.
#[derive(Clone, Copy)]
pub struct ResponseSpec {
    pub success_status: u16,
    pub error_override: Option<ErrorOverride>,
}

impl ResponseSpec {
    pub const DEFAULT: ResponseSpec = ResponseSpec {
        success_status: 200,
        error_override: None,
    };
}

impl fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSpec")
            .field("success_status", &self.success_status)
            .field("error_override", &self.error_override.is_some())
            .finish()
    }
}

/// Immutable description of one remote operation.
#[derive(Debug, Clone, Copy)]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    /// Path template; each `{}` is one encoded segment.
    pub path: &'static str,
    pub bucket: BucketKey,
    /// Query parameters sent on every call, ahead of any caller-supplied ones.
    pub query: &'static [(&'static str, &'static str)],
    pub response: ResponseSpec,
}

impl EndpointDescriptor {
    const fn new(method: HttpMethod, path: &'static str, bucket: BucketKey) -> Self {
        Self {
            method,
            path,
            bucket,
            query: &[],
            response: ResponseSpec::DEFAULT,
        }
    }

    const fn with_query(mut self, query: &'static [(&'static str, &'static str)]) -> Self {
        self.query = query;
        self
    }

    const fn with_override(mut self, error_override: ErrorOverride) -> Self {
        self.response.error_override = Some(error_override);
        self
    }

    /// Substitute `segments` into the path template and prefix `base`.
    pub fn url(&self, base: &str, segments: &[&str]) -> Result<String, WeebError> {
        let mut parts = self.path.split("{}");
        let mut url = String::with_capacity(base.len() + self.path.len() + 32);
        url.push_str(base);
        url.push_str(parts.next().unwrap_or_default());
        let mut used = 0;
        for part in parts {
            let segment = segments.get(used).ok_or_else(|| {
                WeebError::invalid(format!("{} expects more path segments", self.path))
            })?;
            if segment.is_empty() {
                return Err(WeebError::invalid(format!(
                    "empty path segment for {}",
                    self.path
                )));
            }
            url.push_str(&query::encode(segment));
            url.push_str(part);
            used += 1;
        }
        if used != segments.len() {
            return Err(WeebError::invalid(format!(
                "{} takes {used} path segments, got {}",
                self.path,
                segments.len()
            )));
        }
        Ok(url)
    }
}

/// Every remote operation the client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    TokenInfo,
    ImageTags,
    ImageTypes,
    RandomImage,
    ImageById,
    GenerateAwoo,
    GenerateEyes,
    GenerateWon,
    DiscordStatus,
    License,
    WaifuInsult,
    Loveship,
    GetUser,
    GiveReputation,
    ResetReputation,
    IncreaseReputation,
    DecreaseReputation,
    GetReputationSettings,
    SetReputationSettings,
    GetSetting,
    SaveSetting,
    DeleteSetting,
    GetSubSetting,
    SaveSubSetting,
    DeleteSubSetting,
    ListSubSettings,
}

impl Operation {
    pub const ALL: [Operation; 26] = [
        Operation::TokenInfo,
        Operation::ImageTags,
        Operation::ImageTypes,
        Operation::RandomImage,
        Operation::ImageById,
        Operation::GenerateAwoo,
        Operation::GenerateEyes,
        Operation::GenerateWon,
        Operation::DiscordStatus,
        Operation::License,
        Operation::WaifuInsult,
        Operation::Loveship,
        Operation::GetUser,
        Operation::GiveReputation,
        Operation::ResetReputation,
        Operation::IncreaseReputation,
        Operation::DecreaseReputation,
        Operation::GetReputationSettings,
        Operation::SetReputationSettings,
        Operation::GetSetting,
        Operation::SaveSetting,
        Operation::DeleteSetting,
        Operation::GetSubSetting,
        Operation::SaveSubSetting,
        Operation::DeleteSubSetting,
        Operation::ListSubSettings,
    ];

    pub const fn descriptor(self) -> EndpointDescriptor {
        use buckets::*;
        use HttpMethod::{Delete, Get, Post};

        match self {
            Operation::TokenInfo => {
                EndpointDescriptor::new(Get, "/accounts/validate/{}", TOKEN_VALIDATION)
                    .with_query(&[("wolkeToken", "1")])
            }
            Operation::ImageTags => EndpointDescriptor::new(Get, "/images/tags", IMAGE_TAGS),
            Operation::ImageTypes => EndpointDescriptor::new(Get, "/images/types", IMAGE_TYPES),
            Operation::RandomImage => EndpointDescriptor::new(Get, "/images/random", RANDOM_IMAGE),
            Operation::ImageById => EndpointDescriptor::new(Get, "/images/info/{}", IMAGE_INFO),
            Operation::GenerateAwoo => EndpointDescriptor::new(Get, "/auto-image/generate", GENERATE)
                .with_query(&[("type", "awooo")]),
            Operation::GenerateEyes => EndpointDescriptor::new(Get, "/auto-image/generate", GENERATE)
                .with_query(&[("type", "eyes")]),
            Operation::GenerateWon => EndpointDescriptor::new(Get, "/auto-image/generate", GENERATE)
                .with_query(&[("type", "won")]),
            Operation::DiscordStatus => {
                EndpointDescriptor::new(Get, "/auto-image/discord-status", DISCORD_STATUS)
            }
            Operation::License => EndpointDescriptor::new(Post, "/auto-image/license", LICENSE),
            Operation::WaifuInsult => {
                EndpointDescriptor::new(Post, "/auto-image/waifu-insult", WAIFU_INSULT)
            }
            Operation::Loveship => EndpointDescriptor::new(Post, "/auto-image/love-ship", LOVESHIP),
            Operation::GetUser => EndpointDescriptor::new(Get, "/reputation/{}/{}", REPUTATION),
            Operation::GiveReputation => {
                EndpointDescriptor::new(Post, "/reputation/{}/{}", REPUTATION)
                    .with_override(reputation_transfer_override)
            }
            Operation::ResetReputation => {
                EndpointDescriptor::new(Post, "/reputation/{}/{}/reset", REPUTATION_RESET)
            }
            Operation::IncreaseReputation => {
                EndpointDescriptor::new(Post, "/reputation/{}/{}/increase", REPUTATION_INCREASE)
            }
            Operation::DecreaseReputation => {
                EndpointDescriptor::new(Post, "/reputation/{}/{}/decrease", REPUTATION_DECREASE)
            }
            Operation::GetReputationSettings => {
                EndpointDescriptor::new(Get, "/reputation/settings", REPUTATION_SETTINGS)
            }
            Operation::SetReputationSettings => {
                EndpointDescriptor::new(Post, "/reputation/settings", REPUTATION_SETTINGS)
            }
            Operation::GetSetting => EndpointDescriptor::new(Get, "/settings/{}/{}", SETTINGS),
            Operation::SaveSetting => EndpointDescriptor::new(Post, "/settings/{}/{}", SETTINGS),
            Operation::DeleteSetting => EndpointDescriptor::new(Delete, "/settings/{}/{}", SETTINGS),
            Operation::GetSubSetting => {
                EndpointDescriptor::new(Get, "/settings/{}/{}/{}/{}", SETTINGS)
            }
            Operation::SaveSubSetting => {
                EndpointDescriptor::new(Post, "/settings/{}/{}/{}/{}", SETTINGS)
            }
            Operation::DeleteSubSetting => {
                EndpointDescriptor::new(Delete, "/settings/{}/{}/{}/{}", SETTINGS)
            }
            Operation::ListSubSettings => {
                EndpointDescriptor::new(Get, "/settings/{}/{}/{}", SETTINGS)
            }
        }
    }

    pub const fn bucket(self) -> BucketKey {
        bucket_key_of(&self.descriptor())
    }
}

/// The rate-limit bucket an endpoint consumes from.
pub const fn bucket_key_of(descriptor: &EndpointDescriptor) -> BucketKey {
    descriptor.bucket
}
