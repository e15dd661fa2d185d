use std::{
    collections::{BTreeSet, HashMap},
    io::Write,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{
        header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, HOST},
        HeaderMap, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flate2::{
    write::{GzEncoder, ZlibEncoder},
    Compression,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

/// Token with every scope.
pub const VALID_TOKEN: &str = "mock-token";
/// Token the server knows but that lacks every scope.
pub const LIMITED_TOKEN: &str = "limited-token";

const MAX_SETTING_SIZE: usize = 10 * 1024;
const TIMESTAMP: &str = "2018-03-01T12:00:00.000Z";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSettings {
    pub reputation_per_day: i64,
    pub maximum_reputation: i64,
    pub maximum_reputation_received_day: i64,
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

#[derive(Clone, Debug, Default)]
struct UserState {
    reputation: i64,
    given_today: i64,
    received_today: i64,
}

/// Server-side state shared by all handlers.
#[derive(Default)]
pub struct AppState {
    /// Settings keyed by their path segments: `[type, id]` or
    /// `[type, id, subType, subId]`.
    settings: RwLock<HashMap<Vec<String>, Value>>,
    users: RwLock<HashMap<(u64, u64), UserState>>,
    reputation_settings: RwLock<ReputationSettings>,
    requests: AtomicUsize,
}

impl AppState {
    /// Authenticated API requests seen so far, rejected ones included.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub type SharedState = Arc<AppState>;

pub fn app() -> Router {
    app_with_state(Arc::new(AppState::default()))
}

pub fn app_with_state(state: SharedState) -> Router {
    let api = Router::new()
        .route("/accounts/validate/{token}", get(validate_token))
        .route("/images/tags", get(image_tags))
        .route("/images/types", get(image_types))
        .route("/images/random", get(random_image))
        .route("/images/info/{id}", get(image_info))
        .route("/auto-image/generate", get(generate))
        .route("/auto-image/discord-status", get(discord_status))
        .route("/auto-image/license", post(license))
        .route("/auto-image/waifu-insult", post(waifu_insult))
        .route("/auto-image/love-ship", post(love_ship))
        .route(
            "/reputation/settings",
            get(get_reputation_settings).post(set_reputation_settings),
        )
        .route("/reputation/{bot}/{user}", get(get_user).post(give_reputation))
        .route("/reputation/{bot}/{user}/reset", post(reset_user))
        .route("/reputation/{bot}/{user}/increase", post(increase_user))
        .route("/reputation/{bot}/{user}/decrease", post(decrease_user))
        .route(
            "/settings/{kind}/{id}",
            get(get_setting).post(save_setting).delete(delete_setting),
        )
        .route("/settings/{kind}/{id}/{sub_kind}", get(list_sub_settings))
        .route(
            "/settings/{kind}/{id}/{sub_kind}/{sub_id}",
            get(get_sub_setting)
                .post(save_sub_setting)
                .delete(delete_sub_setting),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize));

    Router::new()
        .route("/files/{name}", get(file))
        .merge(api)
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "status": status.as_u16(), "message": message })),
    )
        .into_response()
}

#[derive(Clone, Copy)]
enum Codec {
    Gzip,
    Deflate,
}

/// Compress `body` with `codec` when the client advertised it.
fn encoded(headers: &HeaderMap, codec: Codec, content_type: &'static str, body: Vec<u8>) -> Response {
    let token = match codec {
        Codec::Gzip => "gzip",
        Codec::Deflate => "deflate",
    };
    let accepted = headers
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .split(',')
        .any(|e| e.trim().eq_ignore_ascii_case(token));
    if !accepted {
        return ([(CONTENT_TYPE, content_type)], body).into_response();
    }
    let compressed = match codec {
        Codec::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&body).and_then(|()| enc.finish())
        }
        Codec::Deflate => {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&body).and_then(|()| enc.finish())
        }
    };
    match compressed {
        Ok(bytes) => ([(CONTENT_TYPE, content_type), (CONTENT_ENCODING, token)], bytes).into_response(),
        Err(_) => error(StatusCode::INTERNAL_SERVER_ERROR, "compression failed"),
    }
}

fn json_encoded(headers: &HeaderMap, codec: Codec, value: &Value) -> Response {
    encoded(headers, codec, "application/json", value.to_string().into_bytes())
}

fn png(content: String) -> Vec<u8> {
    let mut body = PNG_MAGIC.to_vec();
    body.extend_from_slice(content.as_bytes());
    body
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

async fn authorize(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .map(|(_, token)| token.to_string());
    debug!(method = %request.method(), uri = %request.uri(), "api request");
    match token.as_deref() {
        Some(VALID_TOKEN) => next.run(request).await,
        Some(LIMITED_TOKEN) => error(StatusCode::FORBIDDEN, "missing scope"),
        _ => error(StatusCode::UNAUTHORIZED, "unauthorized"),
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

async fn validate_token(
    Path(token): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if token != VALID_TOKEN && token != LIMITED_TOKEN {
        return error(StatusCode::NOT_FOUND, "token not found");
    }
    let scopes: Vec<&str> = if token == VALID_TOKEN {
        vec!["images", "auto-image", "reputation", "settings"]
    } else {
        Vec::new()
    };
    Json(json!({
        "account": {
            "id": "mock-account",
            "name": "Mock",
            "discordUserId": "184632227894657025",
            "active": true,
            "scopes": scopes,
            "tokens": [token],
        },
        "wolkeToken": query.get("wolkeToken").map(String::as_str) == Some("1"),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

struct CatalogueImage {
    id: &'static str,
    kind: &'static str,
    file_type: &'static str,
    hidden: bool,
    nsfw: bool,
    tags: &'static [&'static str],
}

const CATALOGUE: &[CatalogueImage] = &[
    CatalogueImage {
        id: "pat1",
        kind: "pat",
        file_type: "gif",
        hidden: false,
        nsfw: false,
        tags: &["cute"],
    },
    CatalogueImage {
        id: "hug1",
        kind: "hug",
        file_type: "png",
        hidden: false,
        nsfw: false,
        tags: &["cute", "warm"],
    },
    CatalogueImage {
        id: "pat2",
        kind: "pat",
        file_type: "jpg",
        hidden: true,
        nsfw: true,
        tags: &["lewd"],
    },
];

impl CatalogueImage {
    fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.file_type)
    }

    fn url(&self, host: &str) -> String {
        format!("http://{host}/files/{}", self.file_name())
    }

    fn mime_type(&self) -> String {
        match self.file_type {
            "jpg" => "image/jpeg".to_string(),
            other => format!("image/{other}"),
        }
    }

    fn to_json(&self, host: &str) -> Value {
        json!({
            "id": self.id,
            "type": self.kind,
            "baseType": self.kind,
            "fileType": self.file_type,
            "mimeType": self.mime_type(),
            "account": "mock-account",
            "hidden": self.hidden,
            "nsfw": self.nsfw,
            "tags": self.tags.iter().map(|t| json!({"name": t, "user": "mock", "hidden": false})).collect::<Vec<_>>(),
            "url": self.url(host),
        })
    }

    fn preview(&self, host: &str) -> Value {
        json!({
            "url": self.url(host),
            "id": self.id,
            "fileType": self.file_type,
            "baseType": self.kind,
            "type": self.kind,
        })
    }
}

fn host_of(headers: &HeaderMap) -> String {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}

/// `hidden`: absent or `false` hides hidden images, `true` shows only them.
/// `nsfw`: absent or `false` hides nsfw, `true` allows it, `only` requires it.
fn visible(query: &HashMap<String, String>) -> impl Iterator<Item = &'static CatalogueImage> + '_ {
    CATALOGUE.iter().filter(move |image| {
        let hidden_ok = match query.get("hidden").map(String::as_str) {
            Some("true") => image.hidden,
            _ => !image.hidden,
        };
        let nsfw_ok = match query.get("nsfw").map(String::as_str) {
            Some("true") => true,
            Some("only") => image.nsfw,
            _ => !image.nsfw,
        };
        hidden_ok && nsfw_ok
    })
}

async fn image_tags(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    let tags: BTreeSet<&str> = visible(&query).flat_map(|i| i.tags.iter().copied()).collect();
    json_encoded(&headers, Codec::Gzip, &json!({ "tags": tags }))
}

async fn image_types(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    let host = host_of(&headers);
    let mut types: Vec<&str> = Vec::new();
    let mut preview = Vec::new();
    for image in visible(&query) {
        if !types.contains(&image.kind) {
            types.push(image.kind);
            preview.push(image.preview(&host));
        }
    }
    let body = if query.get("preview").map(String::as_str) == Some("true") {
        json!({ "types": types, "preview": preview })
    } else {
        json!({ "types": types })
    };
    json_encoded(&headers, Codec::Gzip, &body)
}

async fn random_image(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    if !query.contains_key("type") && !query.contains_key("tags") {
        return error(StatusCode::BAD_REQUEST, "type or tags required");
    }
    let wanted_tags: Vec<&str> = query
        .get("tags")
        .map(|t| t.split(',').filter(|t| !t.is_empty()).collect())
        .unwrap_or_default();
    let found = visible(&query).find(|image| {
        query.get("type").map_or(true, |kind| kind == image.kind)
            && query.get("filetype").map_or(true, |ft| ft == image.file_type)
            && wanted_tags.iter().all(|t| image.tags.iter().any(|tag| tag == t))
    });
    match found {
        Some(image) => Json(image.to_json(&host_of(&headers))).into_response(),
        None => error(StatusCode::NOT_FOUND, "No image found for your query"),
    }
}

async fn image_info(headers: HeaderMap, Path(id): Path<String>) -> Response {
    match CATALOGUE.iter().find(|image| image.id == id) {
        Some(image) => Json(image.to_json(&host_of(&headers))).into_response(),
        None => error(StatusCode::NOT_FOUND, "Image not found"),
    }
}

async fn file(headers: HeaderMap, Path(name): Path<String>) -> Response {
    match CATALOGUE.iter().find(|image| image.file_name() == name) {
        Some(image) => encoded(
            &headers,
            Codec::Gzip,
            "application/octet-stream",
            png(format!("file:{name}")).repeat(if image.hidden { 1 } else { 64 }),
        ),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ---------------------------------------------------------------------------
// Image generation
// ---------------------------------------------------------------------------

async fn generate(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> Response {
    let kind = query.get("type").map(String::as_str).unwrap_or_default();
    let content = match kind {
        "awooo" => format!(
            "awooo:face={}:hair={}",
            query.get("face").map(String::as_str).unwrap_or("default"),
            query.get("hair").map(String::as_str).unwrap_or("default")
        ),
        "eyes" | "won" => kind.to_string(),
        _ => return error(StatusCode::BAD_REQUEST, "unknown generation type"),
    };
    encoded(&headers, Codec::Deflate, "image/png", png(content))
}

async fn discord_status(Query(query): Query<HashMap<String, String>>) -> Response {
    let Some(avatar) = query.get("avatar").filter(|a| is_http_url(a)) else {
        return error(StatusCode::BAD_REQUEST, "avatar must be a url");
    };
    let status = query.get("status").map(String::as_str).unwrap_or("online");
    ([(CONTENT_TYPE, "image/png")], png(format!("status:{status}:{avatar}"))).into_response()
}

async fn license(Json(body): Json<Value>) -> Response {
    let title = body.get("title").and_then(Value::as_str);
    let avatar = body.get("avatar").and_then(Value::as_str);
    match (title, avatar) {
        (Some(title), Some(avatar)) if is_http_url(avatar) => {
            let badges = body.get("badges").and_then(Value::as_array).map_or(0, Vec::len);
            ([(CONTENT_TYPE, "image/png")], png(format!("license:{title}:{badges}"))).into_response()
        }
        _ => error(StatusCode::BAD_REQUEST, "title and avatar are required"),
    }
}

async fn waifu_insult(Json(body): Json<Value>) -> Response {
    match body.get("avatar").and_then(Value::as_str) {
        Some(avatar) if is_http_url(avatar) => {
            ([(CONTENT_TYPE, "image/png")], png(format!("insult:{avatar}"))).into_response()
        }
        _ => error(StatusCode::BAD_REQUEST, "avatar is required"),
    }
}

async fn love_ship(Json(body): Json<Value>) -> Response {
    let one = body.get("targetOne").and_then(Value::as_str);
    let two = body.get("targetTwo").and_then(Value::as_str);
    match (one, two) {
        (Some(one), Some(two)) => {
            ([(CONTENT_TYPE, "image/png")], png(format!("ship:{one}:{two}"))).into_response()
        }
        _ => error(StatusCode::BAD_REQUEST, "targetOne and targetTwo are required"),
    }
}

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

fn user_json(bot: u64, user: u64, state: &UserState, settings: &ReputationSettings) -> Value {
    let given = usize::try_from(state.given_today).unwrap_or_default();
    json!({
        "reputation": state.reputation,
        "cooldown": vec![TIMESTAMP; given],
        "givenReputation": vec![TIMESTAMP; given],
        "userId": user.to_string(),
        "botId": bot.to_string(),
        "accountId": "mock-account",
        "availableReputations": (settings.reputation_per_day - state.given_today).max(0),
        "nextAvailableReputations": [],
    })
}

async fn get_user(State(state): State<SharedState>, Path((bot, user)): Path<(u64, u64)>) -> Response {
    let users = state.users.read().await;
    let settings = *state.reputation_settings.read().await;
    let entry = users.get(&(bot, user)).cloned().unwrap_or_default();
    Json(json!({ "user": user_json(bot, user, &entry, &settings) })).into_response()
}

#[derive(Deserialize)]
struct GiveBody {
    source_user: String,
}

async fn give_reputation(
    State(state): State<SharedState>,
    Path((bot, target)): Path<(u64, u64)>,
    Json(body): Json<GiveBody>,
) -> Response {
    let Ok(source) = body.source_user.parse::<u64>() else {
        return error(StatusCode::BAD_REQUEST, "source_user must be a snowflake");
    };
    if source == target {
        return error(StatusCode::BAD_REQUEST, "You can't give reputation to yourself");
    }
    let settings = *state.reputation_settings.read().await;
    let mut users = state.users.write().await;
    let source_state = users.get(&(bot, source)).cloned().unwrap_or_default();
    let target_state = users.get(&(bot, target)).cloned().unwrap_or_default();

    let denial = if source_state.given_today >= settings.reputation_per_day {
        Some((1, "Cooldown hit", source, &source_state))
    } else if settings.maximum_reputation_received_day > 0
        && target_state.received_today >= settings.maximum_reputation_received_day
    {
        Some((2, "Target received the maximum for today", target, &target_state))
    } else if settings.maximum_reputation > 0 && target_state.reputation >= settings.maximum_reputation {
        Some((3, "Target is at the maximum reputation", target, &target_state))
    } else {
        None
    };
    if let Some((code, message, id, user)) = denial {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "status": 403,
                "code": code,
                "message": message,
                "user": user_json(bot, id, user, &settings),
            })),
        )
            .into_response();
    }

    let mut source_state = source_state;
    let mut target_state = target_state;
    source_state.given_today += 1;
    target_state.received_today += 1;
    target_state.reputation += 1;
    users.insert((bot, source), source_state.clone());
    users.insert((bot, target), target_state.clone());
    Json(json!({
        "sourceUser": user_json(bot, source, &source_state, &settings),
        "targetUser": user_json(bot, target, &target_state, &settings),
    }))
    .into_response()
}

async fn adjust_user(state: &AppState, bot: u64, user: u64, change: impl FnOnce(&mut UserState)) -> Response {
    let settings = *state.reputation_settings.read().await;
    let mut users = state.users.write().await;
    let entry = users.entry((bot, user)).or_default();
    change(entry);
    Json(json!({ "user": user_json(bot, user, entry, &settings) })).into_response()
}

async fn reset_user(State(state): State<SharedState>, Path((bot, user)): Path<(u64, u64)>) -> Response {
    adjust_user(&state, bot, user, |u| *u = UserState::default()).await
}

#[derive(Deserialize)]
struct IncreaseBody {
    increase: i64,
}

#[derive(Deserialize)]
struct DecreaseBody {
    decrease: i64,
}

async fn increase_user(
    State(state): State<SharedState>,
    Path((bot, user)): Path<(u64, u64)>,
    Json(body): Json<IncreaseBody>,
) -> Response {
    adjust_user(&state, bot, user, |u| u.reputation += body.increase).await
}

async fn decrease_user(
    State(state): State<SharedState>,
    Path((bot, user)): Path<(u64, u64)>,
    Json(body): Json<DecreaseBody>,
) -> Response {
    adjust_user(&state, bot, user, |u| u.reputation -= body.decrease).await
}

async fn get_reputation_settings(State(state): State<SharedState>) -> Json<Value> {
    let settings = *state.reputation_settings.read().await;
    Json(json!({ "settings": settings }))
}

async fn set_reputation_settings(
    State(state): State<SharedState>,
    Json(settings): Json<ReputationSettings>,
) -> Response {
    if settings.reputation_per_day < 1 {
        return error(StatusCode::BAD_REQUEST, "reputationPerDay must be positive");
    }
    *state.reputation_settings.write().await = settings;
    Json(json!({ "settings": settings })).into_response()
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn setting_json(key: &[String], data: &Value) -> Value {
    match key {
        [kind, id, sub_kind, sub_id] => json!({
            "type": kind, "id": id, "subType": sub_kind, "subId": sub_id, "data": data,
        }),
        [kind, id, ..] => json!({ "type": kind, "id": id, "data": data }),
        _ => json!({ "data": data }),
    }
}

fn envelope(key: &[String], data: &Value) -> Json<Value> {
    let name = if key.len() == 4 { "subsetting" } else { "setting" };
    Json(json!({ name: setting_json(key, data) }))
}

async fn read_setting(state: &AppState, key: Vec<String>) -> Response {
    let settings = state.settings.read().await;
    match settings.get(&key) {
        Some(data) => envelope(&key, data).into_response(),
        None => error(StatusCode::NOT_FOUND, "Setting not found"),
    }
}

async fn write_setting(state: &AppState, key: Vec<String>, data: Value) -> Response {
    if !data.is_object() {
        return error(StatusCode::BAD_REQUEST, "setting data must be an object");
    }
    if data.to_string().len() > MAX_SETTING_SIZE {
        return error(StatusCode::PAYLOAD_TOO_LARGE, "setting data is too large");
    }
    let response = envelope(&key, &data).into_response();
    state.settings.write().await.insert(key, data);
    response
}

async fn remove_setting(state: &AppState, key: Vec<String>) -> Response {
    match state.settings.write().await.remove(&key) {
        Some(data) => envelope(&key, &data).into_response(),
        None => error(StatusCode::NOT_FOUND, "Setting not found"),
    }
}

async fn get_setting(State(state): State<SharedState>, Path((kind, id)): Path<(String, String)>) -> Response {
    read_setting(&state, vec![kind, id]).await
}

async fn save_setting(
    State(state): State<SharedState>,
    Path((kind, id)): Path<(String, String)>,
    Json(data): Json<Value>,
) -> Response {
    write_setting(&state, vec![kind, id], data).await
}

async fn delete_setting(State(state): State<SharedState>, Path((kind, id)): Path<(String, String)>) -> Response {
    remove_setting(&state, vec![kind, id]).await
}

async fn get_sub_setting(
    State(state): State<SharedState>,
    Path((kind, id, sub_kind, sub_id)): Path<(String, String, String, String)>,
) -> Response {
    read_setting(&state, vec![kind, id, sub_kind, sub_id]).await
}

async fn save_sub_setting(
    State(state): State<SharedState>,
    Path((kind, id, sub_kind, sub_id)): Path<(String, String, String, String)>,
    Json(data): Json<Value>,
) -> Response {
    write_setting(&state, vec![kind, id, sub_kind, sub_id], data).await
}

async fn delete_sub_setting(
    State(state): State<SharedState>,
    Path((kind, id, sub_kind, sub_id)): Path<(String, String, String, String)>,
) -> Response {
    remove_setting(&state, vec![kind, id, sub_kind, sub_id]).await
}

async fn list_sub_settings(
    State(state): State<SharedState>,
    Path((kind, id, sub_kind)): Path<(String, String, String)>,
) -> Json<Value> {
    let settings = state.settings.read().await;
    let mut ids: Vec<&str> = settings
        .keys()
        .filter(|key| key.len() == 4 && key[0] == kind && key[1] == id && key[2] == sub_kind)
        .map(|key| key[3].as_str())
        .collect();
    ids.sort_unstable();
    let list: Vec<Value> = ids.iter().map(|sub_id| json!({ "subId": sub_id })).collect();
    Json(json!({ "subsettings": list }))
}
