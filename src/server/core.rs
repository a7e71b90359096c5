use log::info;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use crate::auth::{CredentialStore, StaticCredentials};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::middleware::AdmissionPolicy;
use crate::protocol::{self, AppState};
use crate::sandbox::SandboxExecutor;

pub struct Server {
    listener: TcpListener,
    app: axum::Router,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Prepares storage, builds the router and binds the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let storage_root = config.server.storage_root_path();
        fs::create_dir_all(&storage_root)?;
        let storage_root = fs::canonicalize(&storage_root)?;
        info!("Storage root: {}", storage_root.display());

        let app = build_app(&config, storage_root)?;

        let addr = config.server.socket_address();
        let listener = TcpListener::bind(&addr).await?;
        info!("Server bound to {}", listener.local_addr()?);

        Ok(Self {
            listener,
            app,
            config: Arc::new(config),
        })
    }

    /// Serves requests until Ctrl-C or SIGTERM.
    pub async fn start(self) -> Result<(), ServerError> {
        info!(
            "Starting RAX workspace server on {} (sandbox timeout {:?}, max {} concurrent runs)",
            self.config.server.socket_address(),
            self.config.sandbox.timeout(),
            self.config.sandbox.max_concurrent
        );

        axum::serve(
            self.listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Server shut down");
        Ok(())
    }
}

/// Wires configuration into the router; shared by the server and tests.
pub fn build_app(config: &ServerConfig, storage_root: PathBuf) -> Result<axum::Router, ServerError> {
    let policy = AdmissionPolicy::from_config(&config.admission)
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    let credentials = CredentialStore::from_users(&config.users);
    info!("Loaded {} user credentials", credentials.len());

    let state = AppState {
        storage_root: Arc::new(storage_root),
        executor: SandboxExecutor::new(config.sandbox.clone()),
        authenticator: Arc::new(StaticCredentials::new(credentials)),
    };

    Ok(protocol::router(
        state,
        Arc::new(policy),
        config.server.max_body_bytes,
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
