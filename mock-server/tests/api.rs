use std::io::Read;

use axum::http::{self, Request, StatusCode};
use flate2::read::{GzDecoder, ZlibDecoder};
use http_body_util::BodyExt;
use mock_server::{app, VALID_TOKEN, LIMITED_TOKEN};
use serde_json::Value;
use tower::ServiceExt;

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn authed(method: &str, uri: &str) -> http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Wolke {VALID_TOKEN}"))
}

fn get(uri: &str) -> Request<String> {
    authed("GET", uri).body(String::new()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    authed(method, uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- auth ---

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let resp = app()
        .oneshot(Request::builder().uri("/images/tags").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn limited_token_is_missing_scope() {
    let req = Request::builder()
        .uri("/images/tags")
        .header(http::header::AUTHORIZATION, format!("Bearer {LIMITED_TOKEN}"))
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["message"], "missing scope");
    assert_eq!(body["status"], 403);
}

#[tokio::test]
async fn files_need_no_token() {
    let resp = app()
        .oneshot(Request::builder().uri("/files/pat1.gif").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp).await.starts_with(b"\x89PNG"));
}

// --- images ---

#[tokio::test]
async fn tags_are_gzipped_when_accepted() {
    let req = authed("GET", "/images/tags")
        .header(http::header::ACCEPT_ENCODING, "gzip, deflate")
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::CONTENT_ENCODING], "gzip");

    let compressed = body_bytes(resp).await;
    let mut text = String::new();
    GzDecoder::new(compressed.as_ref()).read_to_string(&mut text).unwrap();
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["tags"], serde_json::json!(["cute", "warm"]));
}

#[tokio::test]
async fn tags_are_plain_without_accept_encoding() {
    let resp = app().oneshot(get("/images/tags")).await.unwrap();
    assert!(resp.headers().get(http::header::CONTENT_ENCODING).is_none());
    let body = body_json(resp).await;
    assert_eq!(body["tags"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn types_include_preview_on_request() {
    let resp = app().oneshot(get("/images/types?preview=true")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["types"], serde_json::json!(["pat", "hug"]));
    assert_eq!(body["preview"][0]["type"], "pat");

    let resp = app().oneshot(get("/images/types")).await.unwrap();
    assert!(body_json(resp).await.get("preview").is_none());
}

#[tokio::test]
async fn random_image_matches_tags() {
    let resp = app().oneshot(get("/images/random?tags=warm")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["id"], "hug1");
}

#[tokio::test]
async fn random_image_without_match_is_404() {
    let resp = app().oneshot(get("/images/random?type=kiss")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn image_info_by_id() {
    let resp = app().oneshot(get("/images/info/pat2")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["nsfw"], true);
    assert_eq!(body["fileType"], "jpg");
}

// --- generation ---

#[tokio::test]
async fn generate_is_deflated_when_accepted() {
    let req = authed("GET", "/auto-image/generate?type=awooo&face=FF00AA")
        .header(http::header::ACCEPT_ENCODING, "deflate")
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()[http::header::CONTENT_ENCODING], "deflate");
    let compressed = body_bytes(resp).await;
    let mut raw = Vec::new();
    ZlibDecoder::new(compressed.as_ref()).read_to_end(&mut raw).unwrap();
    assert!(raw.ends_with(b"awooo:face=FF00AA:hair=default"));
}

#[tokio::test]
async fn generate_unknown_type_is_400() {
    let resp = app()
        .oneshot(get("/auto-image/generate?type=nope"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn license_requires_avatar_url() {
    let resp = app()
        .oneshot(json_request("POST", "/auto-image/license", r#"{"title":"t","avatar":"nope"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- reputation ---

#[tokio::test]
async fn give_until_cooldown() {
    let app = app();
    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(json_request("POST", "/reputation/1/3", r#"{"source_user":"2"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/reputation/1/3", r#"{"source_user":"2"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["code"], 1);
    assert_eq!(body["user"]["userId"], "2");

    let resp = app.oneshot(get("/reputation/1/3")).await.unwrap();
    assert_eq!(body_json(resp).await["user"]["reputation"], 2);
}

#[tokio::test]
async fn increase_then_reset() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/reputation/1/5/increase", r#"{"increase":7}"#))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["user"]["reputation"], 7);
    let resp = app
        .oneshot(json_request("POST", "/reputation/1/5/reset", "{}"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["user"]["reputation"], 0);
}

#[tokio::test]
async fn reputation_settings_roundtrip() {
    let app = app();
    let body = r#"{"reputationPerDay":3,"maximumReputation":10,"maximumReputationReceivedDay":1,"reputationCooldown":60}"#;
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/reputation/settings", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.oneshot(get("/reputation/settings")).await.unwrap();
    assert_eq!(body_json(resp).await["settings"]["reputationPerDay"], 3);
}

// --- settings ---

#[tokio::test]
async fn setting_lifecycle() {
    let app = app();
    let resp = app.clone().oneshot(get("/settings/guild/123")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/settings/guild/123", r#"{"x":1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["setting"]["data"]["x"], 1);

    let resp = app.clone().oneshot(get("/settings/guild/123")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["setting"]["type"], "guild");
    assert_eq!(body["setting"]["id"], "123");

    let resp = app
        .clone()
        .oneshot(authed("DELETE", "/settings/guild/123").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/settings/guild/123")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sub_settings_are_listed() {
    let app = app();
    for id in ["b", "a"] {
        let resp = app
            .clone()
            .oneshot(json_request("POST", &format!("/settings/guild/1/member/{id}"), "{}"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["subsetting"]["subId"], id);
    }
    let resp = app.oneshot(get("/settings/guild/1/member")).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["subsettings"], serde_json::json!([{"subId": "a"}, {"subId": "b"}]));
}

#[tokio::test]
async fn oversized_setting_is_rejected() {
    let big = format!(r#"{{"x":"{}"}}"#, "a".repeat(11 * 1024));
    let resp = app()
        .oneshot(json_request("POST", "/settings/guild/1", &big))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
