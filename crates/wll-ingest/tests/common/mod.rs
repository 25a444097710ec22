//! In-process stand-in for the WLL local API

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};

pub struct DeviceState {
    pub conditions: Mutex<Value>,
    pub conditions_status: Mutex<StatusCode>,
    pub broadcast_port: u16,
    /// Number of upcoming requests answered with HTTP 500
    pub failures_left: AtomicUsize,
    pub current_requests: AtomicUsize,
    pub realtime_durations: Mutex<Vec<u64>>,
}

impl DeviceState {
    pub fn new(broadcast_port: u16) -> Arc<Self> {
        Arc::new(Self {
            conditions: Mutex::new(current_conditions(1700000000, 62.5)),
            conditions_status: Mutex::new(StatusCode::OK),
            broadcast_port,
            failures_left: AtomicUsize::new(0),
            current_requests: AtomicUsize::new(0),
            realtime_durations: Mutex::new(Vec::new()),
        })
    }

    pub fn current_requests(&self) -> usize {
        self.current_requests.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn current_conditions(ts: i64, temp: f64) -> Value {
    json!({
        "data": {
            "did": "001D0A700002",
            "ts": ts,
            "conditions": [
                {"lsid": 48308, "data_structure_type": 1, "txid": 1, "temp": temp,
                 "hum": 48.2, "wind_speed_last": 2.0, "wind_dir_last": 270}
            ]
        },
        "error": null
    })
}

pub fn broadcast_datagram(ts: i64, wind_speed: f64) -> Vec<u8> {
    json!({
        "did": "001D0A700002",
        "ts": ts,
        "conditions": [
            {"lsid": 48308, "data_structure_type": 1, "txid": 1,
             "wind_speed_last": wind_speed, "wind_dir_last": 180,
             "rain_size": 1, "rain_rate_last": 0, "rainfall_daily": 20}
        ]
    })
    .to_string()
    .into_bytes()
}

pub async fn serve(state: Arc<DeviceState>) -> SocketAddr {
    let app = Router::new()
        .route("/v1/current_conditions", get(current))
        .route("/v1/real_time", get(real_time))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn current(State(state): State<Arc<DeviceState>>) -> (StatusCode, Json<Value>) {
    state.current_requests.fetch_add(1, Ordering::SeqCst);
    if state.take_failure() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    let body = state.conditions.lock().unwrap().clone();
    (*state.conditions_status.lock().unwrap(), Json(body))
}

async fn real_time(
    State(state): State<Arc<DeviceState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let duration = params
        .get("duration")
        .and_then(|d| d.parse().ok())
        .unwrap_or(0);
    state.realtime_durations.lock().unwrap().push(duration);
    Json(json!({
        "data": {"broadcast_port": state.broadcast_port, "duration": duration},
        "error": null
    }))
}

/// A UDP port that was free a moment ago
pub fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub async fn send_datagram(port: u16, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(payload, ("127.0.0.1", port)).await.unwrap();
}

pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
