//! Async client core for the weeb.sh image, reputation and settings API.
//!
//! # Overview
//! Every call goes through the same pipeline: `RequestFactory` builds a plain
//! `HttpRequest`, the `Dispatcher` acquires the rate-limit permit for the
//! endpoint's bucket, hands the request to a `Transport`, decodes the body
//! according to `Content-Encoding` and classifies the status into an
//! `Outcome`. Settings and image downloads sit behind a `CacheAsideStore`.
//!
//! # Design
//! - Socket I/O and rate limiting are collaborators behind traits
//!   (`Transport`, `RateLimiterFactory`), so the pipeline is testable with
//!   scripted implementations. `ReqwestTransport` is the default transport.
//! - Endpoint facts (method, path, fixed query, bucket, success status, error
//!   override) live in one table in `endpoint`; nothing else hard-codes them.
//! - Errors are one `thiserror` enum. A 404 is not an error: every operation
//!   returns `Ok(None)` for it.
//! - The crate logs through `tracing` and never installs a subscriber.

pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod query;
pub mod ratelimit;
pub mod request;
pub mod transport;
pub mod types;

pub use cache::{CacheAsideStore, CacheBackend, MemoryCache, NoopCache, SettingKey, MAX_DOCUMENT_SIZE};
pub use classify::Outcome;
pub use client::WeebClient;
pub use config::{ClientConfig, ConfigError, Environment, TokenType};
pub use dispatch::Dispatcher;
pub use endpoint::{bucket_key_of, BucketKey, EndpointDescriptor, Operation};
pub use error::WeebError;
pub use http::{ByteStream, HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use ratelimit::{NoopRateLimiterFactory, RateLimiter, RateLimiterFactory};
pub use request::{RequestFactory, Rgb};
pub use transport::ReqwestTransport;
pub use types::*;
