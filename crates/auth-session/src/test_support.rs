//! Scripted in-process server for unit tests.

use crate::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use client_config::DEFAULT_REFRESH_PATH;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub retried: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum RefreshReply {
    /// Accept the current refresh credential and rotate the access one.
    Issue {
        access: String,
        refresh: Option<String>,
    },
    Status(u16, Value),
    Malformed,
    Unreachable,
    Hang,
}

impl RefreshReply {
    pub fn issue(access: &str, refresh: Option<&str>) -> Self {
        RefreshReply::Issue {
            access: access.to_string(),
            refresh: refresh.map(str::to_string),
        }
    }
}

struct BackendState {
    valid_access: String,
    valid_refresh: String,
    refresh_reply: Option<RefreshReply>,
    refresh_delay: Duration,
    fixed: HashMap<String, (u16, Value)>,
    offline: bool,
}

/// Accepts exactly one access credential on every unscripted path and
/// answers 401 otherwise.
pub(crate) struct FakeBackend {
    state: Mutex<BackendState>,
    refresh_calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn reply(status: u16, body: &Value) -> ApiResponse {
    ApiResponse::json_body(StatusCode::from_u16(status).unwrap(), body)
}

fn invalid_refresh() -> ApiResponse {
    reply(401, &json!({ "detail": "Token is invalid or expired" }))
}

impl FakeBackend {
    pub fn new(valid_access: &str, valid_refresh: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                valid_access: valid_access.to_string(),
                valid_refresh: valid_refresh.to_string(),
                refresh_reply: None,
                refresh_delay: Duration::ZERO,
                fixed: HashMap::new(),
                offline: false,
            }),
            refresh_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        self.state.lock().unwrap().refresh_reply = Some(reply);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().unwrap().refresh_delay = delay;
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.state
            .lock()
            .unwrap()
            .fixed
            .insert(path.to_string(), (status, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    async fn handle_refresh(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let (scripted, delay) = {
            let state = self.state.lock().unwrap();
            (state.refresh_reply.clone(), state.refresh_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let presented = request
            .body
            .as_ref()
            .and_then(|b| b.get("refresh"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match scripted {
            Some(RefreshReply::Unreachable) => {
                Err(TransportError::Connect("connection refused".to_string()))
            }
            Some(RefreshReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(reply(504, &json!({})))
            }
            Some(RefreshReply::Malformed) => Ok(reply(200, &json!({ "token": "unexpected" }))),
            Some(RefreshReply::Status(status, body)) => Ok(reply(status, &body)),
            Some(RefreshReply::Issue { access, refresh }) => {
                let mut state = self.state.lock().unwrap();
                if presented.as_deref() != Some(state.valid_refresh.as_str()) {
                    return Ok(invalid_refresh());
                }

                state.valid_access = access.clone();
                let mut body = json!({ "access": access });
                if let Some(refresh) = refresh {
                    state.valid_refresh = refresh.clone();
                    body["refresh"] = json!(refresh);
                }
                Ok(reply(200, &body))
            }
            None => Ok(invalid_refresh()),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: request.bearer_token().map(str::to_string),
            body: request.body.clone(),
            retried: request.retried,
        });

        let offline = self.state.lock().unwrap().offline;
        if offline {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        if request.path == DEFAULT_REFRESH_PATH {
            return self.handle_refresh(request).await;
        }

        let state = self.state.lock().unwrap();
        if let Some((status, body)) = state.fixed.get(&request.path) {
            return Ok(reply(*status, body));
        }

        if request.bearer_token() == Some(state.valid_access.as_str()) {
            Ok(reply(
                200,
                &json!({ "path": request.path, "token": state.valid_access }),
            ))
        } else {
            Ok(reply(
                401,
                &json!({ "detail": "Given token not valid for any token type" }),
            ))
        }
    }
}
