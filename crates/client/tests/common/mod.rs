//! In-process fake of the GymMaster backend.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::{Duration, Utc};
use gymmaster::{ClientConfig, GymClient, SessionStorage};
use serde_json::{json, Value};

pub const TOKEN: &str = "tok";
pub const CHALLENGE: &str = "u1";
pub const GOOD_OTP: &str = "123456";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckInMode {
    Accept,
    NotFound,
    Reject(String),
    Unauthorized,
    /// 200 with `{"success": false}` and nothing else
    SilentFailure,
    /// Never answers
    Hang,
}

#[derive(Debug)]
pub struct BackendState {
    pub two_factor: bool,
    /// Token the backend currently honors
    pub valid_token: String,
    /// Whether the user record carries a member QR identity
    pub has_qr: bool,
    pub checkin: CheckInMode,
    pub classes_fail: bool,
    /// Answer with pre-contract field names (`token`, `dateTime`)
    pub legacy_fields: bool,
    pub attendees: u32,
    pub requests: Vec<Recorded>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            two_factor: false,
            valid_token: TOKEN.to_string(),
            has_qr: true,
            checkin: CheckInMode::Accept,
            classes_fail: false,
            legacy_fields: false,
            attendees: 3,
            requests: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct Backend {
    state: Arc<Mutex<BackendState>>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut BackendState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.with(|s| {
            s.requests
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .cloned()
                .collect()
        })
    }

    pub fn request_count(&self) -> usize {
        self.with(|s| s.requests.len())
    }

    /// Serve on an ephemeral port; returns the API base URL
    pub async fn spawn(&self) -> String {
        let app = Router::new().fallback(handle).with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }
}

pub fn client(base_url: &str, storage: Arc<dyn SessionStorage>) -> GymClient {
    let config = ClientConfig::new(base_url).with_timeout(std::time::Duration::from_secs(5));
    GymClient::new(&config, storage).unwrap()
}

fn user(has_qr: bool) -> Value {
    let mut user = json!({
        "id": "u1",
        "email": "ana@example.com",
        "fullName": "Ana Perez",
        "role": "MEMBER",
    });
    if has_qr {
        user["member"] = json!({
            "id": "m1",
            "qrCode": "QR-ANA",
            "qrCodeExpiry": (Utc::now() + Duration::days(30)).to_rfc3339(),
        });
    }
    user
}

fn class(attendees: u32) -> Value {
    json!({
        "id": "c1",
        "name": "Spin",
        "instructor": "Luis",
        "startTime": (Utc::now() + Duration::hours(2)).to_rfc3339(),
        "durationMinutes": 45,
        "capacity": 10,
        "currentAttendees": attendees,
        "branchName": "Centro",
    })
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn ok(data: Value) -> Response {
    reply(StatusCode::OK, json!({ "success": true, "data": data }))
}

fn fail(status: StatusCode, message: &str) -> Response {
    reply(status, json!({ "success": false, "message": message }))
}

async fn handle(
    State(backend): State<Backend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

    let response = {
        let mut state = backend.state.lock().unwrap();
        state.requests.push(Recorded {
            method: method.clone(),
            path: path.clone(),
            authorization: authorization.clone(),
            body: body.clone(),
        });
        let hang = method == Method::POST && path == "/api/checkins" && state.checkin == CheckInMode::Hang;
        if hang {
            None
        } else {
            Some(respond(&mut state, &method, &path, authorization.as_deref(), &body))
        }
    };

    match response {
        Some(response) => response,
        None => {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            fail(StatusCode::GATEWAY_TIMEOUT, "Too late")
        }
    }
}

fn respond(
    state: &mut BackendState,
    method: &Method,
    path: &str,
    authorization: Option<&str>,
    body: &Value,
) -> Response {
    let grant = |state: &BackendState| {
        if state.legacy_fields {
            ok(json!({ "token": TOKEN, "user": user(state.has_qr) }))
        } else {
            ok(json!({ "accessToken": TOKEN, "user": user(state.has_qr) }))
        }
    };

    match (method.as_str(), path) {
        ("GET", "/api/health") => return reply(StatusCode::OK, json!({ "status": "ok" })),
        ("POST", "/api/auth/login") => {
            if body["password"] == "wrong" {
                return fail(StatusCode::UNAUTHORIZED, "Invalid credentials");
            }
            if state.two_factor {
                return ok(json!({ "requires2FA": true, "userId": CHALLENGE }));
            }
            return grant(state);
        }
        ("POST", "/api/auth/verify-otp") => {
            if body["userId"] == CHALLENGE && body["otpCode"] == GOOD_OTP {
                return grant(state);
            }
            return fail(StatusCode::UNAUTHORIZED, "Invalid OTP code");
        }
        _ => {}
    }

    let expected = format!("Bearer {}", state.valid_token);
    if authorization != Some(expected.as_str()) {
        return fail(StatusCode::UNAUTHORIZED, "Token expired");
    }

    match (method.as_str(), path) {
        ("POST", "/api/auth/refresh-token") => grant(state),
        ("GET", "/api/classes/available") => {
            if state.classes_fail {
                return reply(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "boom" }));
            }
            let mut entry = class(state.attendees);
            if state.legacy_fields {
                let start = entry.as_object_mut().unwrap().remove("startTime").unwrap();
                entry["dateTime"] = start;
            }
            ok(json!([entry]))
        }
        ("GET", "/api/classes/c1") => ok(class(state.attendees)),
        ("POST", "/api/classes/c1/reserve") => {
            state.attendees += 1;
            reply(StatusCode::OK, json!({ "success": true, "message": "Reserved" }))
        }
        ("DELETE", "/api/classes/c1/reserve") => {
            state.attendees = state.attendees.saturating_sub(1);
            reply(StatusCode::OK, json!({ "success": true, "message": "Cancelled" }))
        }
        ("GET", "/api/members/my-stats") => ok(json!({
            "totalCheckinsThisMonth": 7,
            "totalEnrolledClasses": 2,
        })),
        ("GET", "/api/branches") => ok(json!([{
            "id": "b1",
            "name": "Centro",
            "address": "Av. Principal 1",
            "city": "Lima",
            "isActive": true,
            "openingTime": "06:00",
            "closingTime": "22:00",
        }])),
        ("POST", "/api/checkins") => match state.checkin.clone() {
            CheckInMode::Accept => ok(json!({
                "id": format!("ci-{}", state.requests.len()),
                "checkInTime": Utc::now().to_rfc3339(),
                "branch": { "id": body["branchId"], "name": "Centro" },
            })),
            CheckInMode::NotFound => (StatusCode::NOT_FOUND, "Cannot POST /api/checkins").into_response(),
            CheckInMode::Reject(message) => fail(StatusCode::BAD_REQUEST, &message),
            CheckInMode::Unauthorized => fail(StatusCode::UNAUTHORIZED, "Token expired"),
            CheckInMode::SilentFailure => reply(StatusCode::OK, json!({ "success": false })),
            CheckInMode::Hang => fail(StatusCode::GATEWAY_TIMEOUT, "Too late"),
        },
        _ => fail(StatusCode::NOT_FOUND, "Not found"),
    }
}
