//! Common utilities for integration tests.
//!
//! Provides an in-process fake KUMO router served with axum. It answers the
//! `/config` endpoint like the device does and records every request, so tests
//! can assert call counts and written parameters.

use alloc::{collections::VecDeque, sync::Arc};
use core::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};
use std::{collections::HashMap, time::Instant};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use kumo_bridge::{
    KumoConfig, SessionManager,
    config::{DeviceConfig, TimingConfig},
};
use kumo_common::{
    ConfigEvent, ConnectResponse, Line, ParamId, ParamResponse, ParamValue, Port, Request,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// How long the fake holds an idle long poll before answering `[]`.
const POLL_HOLD: Duration = Duration::from_secs(30);

/// Recorded traffic and knobs of the fake router.
#[derive(Default)]
pub struct DeviceState {
    pub connects: AtomicUsize,
    pub gets: AtomicUsize,
    pub polls: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_gets: AtomicBool,
    pub fail_polls: AtomicBool,
    pub get_delay_ms: AtomicU64,
    next_connection: AtomicU64,
    routes: Mutex<HashMap<u32, u32>>,
    sets: Mutex<Vec<(ParamId, String)>>,
    events: Mutex<VecDeque<Vec<ConfigEvent>>>,
}

impl DeviceState {
    pub fn set_route(&self, destination: u32, source: u32) {
        self.routes.lock().insert(destination, source);
    }

    /// Queue a batch for the next long poll.
    pub fn push_events(&self, batch: Vec<ConfigEvent>) {
        self.events.lock().push_back(batch);
    }

    pub fn sets(&self) -> Vec<(ParamId, String)> {
        self.sets.lock().clone()
    }

    fn value_of(&self, param: ParamId) -> Option<ParamValue> {
        Some(match param {
            ParamId::DestinationStatus(destination) => {
                let source = self.routes.lock().get(&destination).copied().unwrap_or(1);
                ParamValue::Integer(i64::from(source))
            }
            ParamId::Name { port, index, line } => {
                let prefix = match port {
                    Port::Destination => "DST",
                    Port::Source => "SRC",
                };
                match line {
                    Line::First => ParamValue::Text(format!("{prefix} {index}")),
                    Line::Second => ParamValue::Text(String::new()),
                }
            }
            ParamId::Salvo(index) => ParamValue::Named {
                name: format!("Salvo {index}"),
            },
            ParamId::TakeSalvo => return None,
        })
    }
}

async fn config_endpoint(
    State(device): State<Arc<DeviceState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Ok(request) = Request::from_query(&query) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match request {
        Request::Connect => {
            device.connects.fetch_add(1, Ordering::SeqCst);
            if device.fail_connect.load(Ordering::SeqCst) {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            let id = device.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
            Json(ConnectResponse {
                connectionid: id.to_string(),
            })
            .into_response()
        }
        Request::Get(param) => {
            device.gets.fetch_add(1, Ordering::SeqCst);
            let delay = device.get_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if device.fail_gets.load(Ordering::SeqCst) {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            match device.value_of(param) {
                Some(value) => Json(ParamResponse { value }).into_response(),
                None => StatusCode::BAD_REQUEST.into_response(),
            }
        }
        Request::Set { param, value } => {
            device.sets.lock().push((param, value.clone()));
            if let ParamId::DestinationStatus(destination) = param
                && let Ok(source) = value.parse::<u32>()
            {
                device.set_route(destination, source);
                device.push_events(vec![ConfigEvent {
                    param_id: Some(param.to_string()),
                    int_value: Some(i64::from(source)),
                    str_value: None,
                }]);
            }
            Json(serde_json::json!({})).into_response()
        }
        Request::WaitForConfigEvents { .. } => {
            device.polls.fetch_add(1, Ordering::SeqCst);
            if device.fail_polls.load(Ordering::SeqCst) {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let start = Instant::now();
            loop {
                if let Some(batch) = device.events.lock().pop_front() {
                    return Json(batch).into_response();
                }
                if start.elapsed() > POLL_HOLD {
                    return Json(Vec::<ConfigEvent>::new()).into_response();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// A running fake router. The server stops when this is dropped.
pub struct FakeKumo {
    pub addr: SocketAddr,
    pub device: Arc<DeviceState>,
    server: JoinHandle<()>,
}

impl Drop for FakeKumo {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeKumo {
    pub async fn start() -> Self {
        let device = Arc::new(DeviceState::default());
        let app = Router::new()
            .route("/config", get(config_endpoint))
            .with_state(Arc::clone(&device));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake router");
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            device,
            server,
        }
    }

    /// Config pointing at this fake with fast timings.
    pub fn config(&self, destinations: u32, sources: u32) -> KumoConfig {
        KumoConfig {
            device: DeviceConfig {
                ip: self.addr.to_string(),
                model: None,
                source_count: Some(sources),
                destination_count: Some(destinations),
            },
            timing: TimingConfig {
                stagger_interval_ms: 1,
                reconnect_delay_ms: 300,
                connect_timeout_ms: 1000,
                fetch_timeout_ms: 1000,
                poll_timeout_ms: 60_000,
                action_timeout_ms: 1000,
            },
        }
    }
}

/// Connect a manager and wait until the bulk sync finished.
pub async fn ready_manager(config: KumoConfig) -> SessionManager {
    let manager = SessionManager::new(config).unwrap();
    manager.connect();
    assert!(
        manager.wait_until_ready(Duration::from_secs(5)).await,
        "manager did not become ready, status {}",
        manager.status()
    );
    manager
}

/// Poll `check` until it holds or `timeout_ms` elapsed.
pub async fn wait_for(timeout_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while !check() {
        if start.elapsed() > Duration::from_millis(timeout_ms) {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}
