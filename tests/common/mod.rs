//! Shared helpers for integration tests
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use log::kv::{Key, Value, VisitSource};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use rax_workspace_server::config::{
    AdmissionConfig, NetworkConfig, SandboxConfig, ServerConfig, UserConfig,
};
use rax_workspace_server::server::build_app;
use rax_workspace_server::storage::UserRoot;

pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

/// A fresh storage root holding one provisioned user directory.
pub fn storage_with_user(name: &str) -> (TempDir, UserRoot) {
    let storage = TempDir::new().unwrap();
    let root = UserRoot::provision(storage.path(), name).unwrap();
    (storage, root)
}

pub fn test_config(storage_root: &Path) -> ServerConfig {
    ServerConfig {
        server: NetworkConfig {
            bind_address: "127.0.0.1".into(),
            port: 8080,
            storage_root: storage_root.display().to_string(),
            max_body_bytes: 1024 * 1024,
        },
        sandbox: SandboxConfig {
            interpreter: "sh".into(),
            script_extension: "sh".into(),
            ..SandboxConfig::default()
        }
        .with_timeout(Duration::from_secs(5)),
        admission: AdmissionConfig {
            allowed_ips: vec!["127.0.0.1".into()],
            trusted_proxies: vec!["10.0.0.1".into()],
            forwarded_header: "x-forwarded-for".into(),
        },
        users: vec![
            UserConfig {
                username: "alice".into(),
                token: ALICE_TOKEN.into(),
                dir_name: "alice".into(),
            },
            UserConfig {
                username: "bob".into(),
                token: BOB_TOKEN.into(),
                dir_name: "bob".into(),
            },
        ],
    }
}

pub fn app_with(config: &ServerConfig, storage: &TempDir) -> Router {
    build_app(config, fs::canonicalize(storage.path()).unwrap()).unwrap()
}

pub fn app(storage: &TempDir) -> Router {
    app_with(&test_config(storage.path()), storage)
}

/// Builds a request as if it arrived from `peer`.
pub fn request(
    method: &str,
    uri: &str,
    peer: &str,
    json: Option<serde_json::Value>,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match json {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let mut req = builder.body(body).unwrap();
    let addr = SocketAddr::new(peer.parse().unwrap(), 40000);
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

pub async fn send_raw(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = send_raw(app, req).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// One log record as seen by the capturing logger
#[derive(Debug, Clone)]
pub struct CapturedRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub kvs: BTreeMap<String, String>,
}

struct CapturingLogger {
    records: Mutex<Vec<CapturedRecord>>,
}

struct CollectKvs<'a>(&'a mut BTreeMap<String, String>);

impl<'kvs> VisitSource<'kvs> for CollectKvs<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), log::kv::Error> {
        self.0.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut kvs = BTreeMap::new();
        let _ = record.key_values().visit(&mut CollectKvs(&mut kvs));
        if let Ok(mut records) = self.records.lock() {
            records.push(CapturedRecord {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
                kvs,
            });
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    records: Mutex::new(Vec::new()),
};
static INIT: Once = Once::new();

pub fn install_logger() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Records emitted under `target` so far, in order.
pub fn records_for(target: &str) -> Vec<CapturedRecord> {
    LOGGER
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r.target == target)
        .cloned()
        .collect()
}
