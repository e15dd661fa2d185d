//! Executes requests: rate-limit permit, transport round-trip, body decoding
//! and outcome classification.
//!
//! # Design
//! The dispatcher never builds requests and never touches a cache. It holds
//! the two external collaborators (`Transport`, `RateLimiterFactory`) and
//! turns one `HttpRequest` into one `Outcome`. The permit is held until the
//! body has been read, or until the caller drops the stream for streamed
//! endpoints, so the limiter sees the whole round-trip.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::classify::{classify_failure, classify_json, classify_transport, Outcome};
use crate::decode::{decode_body, read_to_bytes, ContentEncoding};
use crate::endpoint::{bucket_key_of, Operation, ResponseSpec};
use crate::http::{ByteStream, HttpRequest, HttpResponse, Transport};
use crate::ratelimit::{NoopRateLimiterFactory, Permit, RateLimiterFactory};

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    limiters: Arc<dyn RateLimiterFactory>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, limiters: Arc<dyn RateLimiterFactory>) -> Self {
        Self { transport, limiters }
    }

    /// Dispatcher whose limiter never waits.
    pub fn unlimited(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, Arc::new(NoopRateLimiterFactory))
    }

    /// Issue a JSON endpoint call and decode the success body as `T`.
    #[instrument(level = "debug", skip(self, request), fields(url = %request.url))]
    pub async fn call_json<T: DeserializeOwned>(&self, op: Operation, request: HttpRequest) -> Outcome<T> {
        let descriptor = op.descriptor();
        let bucket = bucket_key_of(&descriptor);
        let _permit = Permit::acquire(self.limiters.as_ref(), bucket).await;
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => return classify_transport(e),
        };
        debug!(?op, %bucket, status = response.status, "response received");
        let status = response.status;
        if status != descriptor.response.success_status {
            return classify_failure(&descriptor.response, status, &failure_body(response).await);
        }
        match read_decoded(response).await {
            Ok(body) => classify_json(&descriptor.response, status, &body),
            Err(e) => classify_transport(format!("failed to read response body: {e}")),
        }
    }

    /// Issue a call whose success body is binary and handed to the caller as
    /// a decoded stream. Failure bodies are read in full for classification.
    #[instrument(level = "debug", skip(self, request), fields(url = %request.url))]
    pub async fn call_stream(&self, op: Operation, request: HttpRequest) -> Outcome<ByteStream> {
        let descriptor = op.descriptor();
        let bucket = bucket_key_of(&descriptor);
        let permit = Permit::acquire(self.limiters.as_ref(), bucket).await;
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => return classify_transport(e),
        };
        debug!(?op, %bucket, status = response.status, "response received");
        streamed(&descriptor.response, response, Some(permit)).await
    }

    /// GET an arbitrary URL without consulting any limiter.
    #[instrument(level = "debug", skip(self, request), fields(url = %request.url))]
    pub async fn fetch(&self, request: HttpRequest) -> Outcome<ByteStream> {
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => return classify_transport(e),
        };
        debug!(status = response.status, "download response received");
        streamed(&ResponseSpec::DEFAULT, response, None).await
    }

    /// `fetch` with the body collected into memory.
    pub async fn fetch_bytes(&self, request: HttpRequest) -> Outcome<Bytes> {
        match self.fetch(request).await {
            Outcome::Success(body) => match read_to_bytes(body).await {
                Ok(bytes) => Outcome::Success(bytes),
                Err(e) => classify_transport(format!("failed to read response body: {e}")),
            },
            Outcome::Empty => Outcome::Empty,
            Outcome::Failed(e) => Outcome::Failed(e),
        }
    }
}

fn encoding_of(response: &HttpResponse) -> ContentEncoding {
    ContentEncoding::from_header(response.header("content-encoding"))
}

async fn read_decoded(response: HttpResponse) -> std::io::Result<Bytes> {
    let encoding = encoding_of(&response);
    read_to_bytes(decode_body(response.body, encoding)).await
}

/// Body of a non-success response. An unreadable body counts as no body:
/// the status alone still classifies the call.
async fn failure_body(response: HttpResponse) -> Bytes {
    let status = response.status;
    read_decoded(response).await.unwrap_or_else(|e| {
        debug!(status, error = %e, "unreadable error body");
        Bytes::new()
    })
}

async fn streamed(spec: &ResponseSpec, response: HttpResponse, permit: Option<Permit>) -> Outcome<ByteStream> {
    let status = response.status;
    if status == spec.success_status {
        let encoding = encoding_of(&response);
        let body = decode_body(response.body, encoding);
        return Outcome::Success(hold_until_drained(body, permit));
    }
    classify_failure(spec, status, &failure_body(response).await)
}

/// Keep `permit` alive for as long as the body stream is.
fn hold_until_drained(body: ByteStream, permit: Option<Permit>) -> ByteStream {
    match permit {
        None => body,
        Some(permit) => stream::unfold((body, permit), |(mut body, permit)| async move {
            let item = body.next().await?;
            Some((item, (body, permit)))
        })
        .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WeebError;
    use crate::http::{HttpMethod, TransportError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct Canned {
        responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
    }

    impl Canned {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn get() -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/images/tags".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn gzipped(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[tokio::test]
    async fn json_success_is_decoded() {
        let transport = Canned::new(vec![Ok(HttpResponse::from_bytes(
            200,
            vec![("content-encoding".into(), "gzip".into())],
            gzipped(br#"{"tags":["pat"]}"#),
        ))]);
        let outcome: Outcome<Value> = Dispatcher::unlimited(transport)
            .call_json(Operation::ImageTags, get())
            .await;
        match outcome {
            Outcome::Success(value) => assert_eq!(value["tags"][0], "pat"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_error_is_transport_failure() {
        let transport = Canned::new(vec![Err(TransportError::Timeout)]);
        let outcome: Outcome<Value> = Dispatcher::unlimited(transport)
            .call_json(Operation::ImageTags, get())
            .await;
        assert!(matches!(
            outcome,
            Outcome::Failed(WeebError::TransportFailure { .. })
        ));
    }

    #[tokio::test]
    async fn broken_gzip_is_transport_failure() {
        let transport = Canned::new(vec![Ok(HttpResponse::from_bytes(
            200,
            vec![("content-encoding".into(), "gzip".into())],
            "not gzip at all",
        ))]);
        let outcome: Outcome<Value> = Dispatcher::unlimited(transport)
            .call_json(Operation::ImageTags, get())
            .await;
        assert!(matches!(
            outcome,
            Outcome::Failed(WeebError::TransportFailure { .. })
        ));
    }

    #[tokio::test]
    async fn streamed_success_is_decoded_lazily() {
        let transport = Canned::new(vec![Ok(HttpResponse::from_bytes(
            200,
            vec![("Content-Encoding".into(), "gzip".into())],
            gzipped(b"\x89PNG fake image"),
        ))]);
        let outcome = Dispatcher::unlimited(transport)
            .call_stream(Operation::GenerateWon, get())
            .await;
        let Outcome::Success(body) = outcome else {
            panic!("expected a body");
        };
        assert_eq!(read_to_bytes(body).await.unwrap().as_ref(), b"\x89PNG fake image");
    }

    #[tokio::test]
    async fn streamed_failure_is_classified() {
        let transport = Canned::new(vec![
            Ok(HttpResponse::from_bytes(403, Vec::new(), r#"{"message":"nope"}"#)),
            Ok(HttpResponse::from_bytes(404, Vec::new(), "")),
        ]);
        let dispatcher = Dispatcher::unlimited(transport);
        assert!(matches!(
            dispatcher.call_stream(Operation::License, get()).await,
            Outcome::Failed(WeebError::ScopeDenied { .. })
        ));
        assert!(matches!(dispatcher.fetch(get()).await, Outcome::Empty));
    }

    fn corrupt_gzip(status: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::from_bytes(
            status,
            vec![("Content-Encoding".into(), "gzip".into())],
            "Not Found",
        ))
    }

    #[tokio::test]
    async fn undecodable_error_body_is_classified_by_status() {
        let transport = Canned::new(vec![corrupt_gzip(404), corrupt_gzip(403), corrupt_gzip(500)]);
        let dispatcher = Dispatcher::unlimited(transport);

        let outcome: Outcome<Value> = dispatcher.call_json(Operation::GetSetting, get()).await;
        assert!(matches!(outcome, Outcome::Empty), "{outcome:?}");

        let outcome: Outcome<Value> = dispatcher.call_json(Operation::ImageTags, get()).await;
        assert!(
            matches!(outcome, Outcome::Failed(WeebError::ScopeDenied { message: None })),
            "{outcome:?}"
        );

        let outcome: Outcome<Value> = dispatcher.call_json(Operation::ImageById, get()).await;
        assert!(
            matches!(outcome, Outcome::Failed(WeebError::Failure { status: 500, message: None })),
            "{outcome:?}"
        );
    }

    #[tokio::test]
    async fn undecodable_streamed_error_body_is_classified_by_status() {
        let transport = Canned::new(vec![corrupt_gzip(404), corrupt_gzip(403), corrupt_gzip(500)]);
        let dispatcher = Dispatcher::unlimited(transport);
        assert!(matches!(
            dispatcher.call_stream(Operation::GenerateWon, get()).await,
            Outcome::Empty
        ));
        assert!(matches!(
            dispatcher.call_stream(Operation::GenerateWon, get()).await,
            Outcome::Failed(WeebError::ScopeDenied { message: None })
        ));
        assert!(matches!(
            dispatcher.call_stream(Operation::GenerateWon, get()).await,
            Outcome::Failed(WeebError::Failure { status: 500, message: None })
        ));
    }

    #[tokio::test]
    async fn fetch_bytes_collects_body() {
        let transport = Canned::new(vec![Ok(HttpResponse::from_bytes(200, Vec::new(), "abc"))]);
        let outcome = Dispatcher::unlimited(transport).fetch_bytes(get()).await;
        assert!(matches!(outcome, Outcome::Success(b) if b.as_ref() == b"abc"));
    }
}
