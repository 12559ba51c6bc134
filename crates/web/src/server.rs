//! Web server implementation
//!
//! Routes, all mounted under the handler prefix:
//! - `GET /hello`: health probe
//! - `GET /test/*path`: cached test resources
//! - `GET /runner/:case_id`: runner page with the case's files inlined

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use testdrive_common::{DocType, Error, FileLookup, HandlerPathPrefix, Result, TestCaseStore};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::html::HtmlWriter;
use crate::inline::{FileScheme, InlineFileEmitter, InlinePolicy};
use crate::resources::{DeliveryOutcome, MimeTable, ResourceDeliveryHandler};
use crate::startup::{ServerFactory, TestServer};

/// Web server configuration
#[derive(Clone, Default)]
pub struct WebServerConfig {
    pub prefix: HandlerPathPrefix,
    pub mime: MimeTable,
    /// Defaults to [`InlinePolicy::for_prefix`] when unset
    pub inline_policy: Option<InlinePolicy>,
    pub schemes: Vec<Arc<dyn FileScheme>>,
    pub doc_type: DocType,
}

impl WebServerConfig {
    pub fn with_prefix(prefix: HandlerPathPrefix) -> Self {
        Self {
            prefix,
            ..Default::default()
        }
    }
}

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
    prefix: HandlerPathPrefix,
}

struct WebServerState {
    store: Arc<TestCaseStore>,
    doc_type: DocType,
    delivery: ResourceDeliveryHandler,
    emitter: InlineFileEmitter,
}

impl WebServer {
    pub fn new(store: Arc<TestCaseStore>, cfg: WebServerConfig) -> Self {
        let policy = cfg
            .inline_policy
            .unwrap_or_else(|| InlinePolicy::for_prefix(&cfg.prefix));
        let lookup: Arc<dyn FileLookup> = store.clone();
        let state = WebServerState {
            delivery: ResourceDeliveryHandler::new(lookup, cfg.mime),
            emitter: InlineFileEmitter::new(store.clone(), cfg.prefix.clone(), cfg.schemes, policy),
            store,
            doc_type: cfg.doc_type,
        };
        Self {
            state: Arc::new(state),
            prefix: cfg.prefix,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.prefix.prefix_path("/hello"), get(hello_handler))
            .route(&self.prefix.prefix_path("/test/*path"), get(resource_handler))
            .route(&self.prefix.prefix_path("/runner/:case_id"), get(runner_handler))
            .fallback(not_found_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }
}

async fn hello_handler() -> &'static str {
    "ok"
}

async fn resource_handler(
    State(state): State<Arc<WebServerState>>,
    Path(path): Path<String>,
) -> Response {
    let mut body = Vec::new();
    match state.delivery.deliver(&path, &mut body).await {
        Ok(DeliveryOutcome::Served { content_type }) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Ok(DeliveryOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to deliver {}: {}", path, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn runner_handler(
    State(state): State<Arc<WebServerState>>,
    Path(case_id): Path<String>,
) -> Response {
    if state.store.get_case(&case_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut writer = HtmlWriter::new();
    writer.start_head(state.doc_type, "Testdrive runner");
    let count = state.emitter.write_test_files(&mut writer, &case_id);
    writer.finish_head().start_body().finish_body();
    debug!("Runner page for {} inlines {} files", case_id, count);

    Html(writer.into_string()).into_response()
}

async fn not_found_handler() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

struct RunningServer {
    addr: SocketAddr,
    client: reqwest::Client,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// In-process HTTP test server serving a [`TestCaseStore`]
pub struct HttpTestServer {
    addr: SocketAddr,
    store: Arc<TestCaseStore>,
    cfg: WebServerConfig,
    running: Option<RunningServer>,
}

impl HttpTestServer {
    pub fn new(addr: SocketAddr, store: Arc<TestCaseStore>, cfg: WebServerConfig) -> Self {
        Self {
            addr,
            store,
            cfg,
            running: None,
        }
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Base URL (including prefix) reachable from this host
    pub fn base_url(&self) -> Option<String> {
        self.local_addr().map(|addr| {
            let ip = if addr.ip().is_unspecified() {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            } else {
                addr.ip()
            };
            self.cfg
                .prefix
                .suffix_server(&format!("http://{}", SocketAddr::new(ip, addr.port())))
        })
    }
}

#[async_trait]
impl TestServer for HttpTestServer {
    async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| {
                Error::server_startup_caused_by(self.addr.port(), "cannot build health client", e)
            })?;
        let listener = TcpListener::bind(self.addr).await?;
        let addr = listener.local_addr()?;
        let router = WebServer::new(self.store.clone(), self.cfg.clone()).router();

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Test server on {} failed: {}", addr, e);
            }
        });

        info!("Test server listening on {}", addr);
        self.running = Some(RunningServer {
            addr,
            client,
            shutdown,
            task,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(running) = self.running.take() {
            info!("Stopping test server on {}", running.addr);
            running.shutdown.cancel();
            if let Err(e) = running.task.await {
                warn!("Test server task ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        let (Some(running), Some(base)) = (self.running.as_ref(), self.base_url()) else {
            return false;
        };
        let url = format!("{}/hello", base);
        match running.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("Health check returned {}", resp.status());
                false
            }
            Err(e) => {
                if !e.is_connect() {
                    warn!("Health check error: {}", e);
                }
                false
            }
        }
    }

    fn port(&self) -> u16 {
        self.local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.addr.port())
    }

    fn base_url(&self) -> Option<String> {
        HttpTestServer::base_url(self)
    }
}

/// Builds [`HttpTestServer`]s bound to `host`
#[derive(Clone)]
pub struct HttpServerFactory {
    host: IpAddr,
    cfg: WebServerConfig,
}

impl HttpServerFactory {
    pub fn new(host: IpAddr, cfg: WebServerConfig) -> Self {
        Self { host, cfg }
    }
}

impl Default for HttpServerFactory {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), WebServerConfig::default())
    }
}

impl ServerFactory for HttpServerFactory {
    fn create(&self, port: u16, store: Arc<TestCaseStore>) -> Box<dyn TestServer> {
        Box::new(HttpTestServer::new(
            SocketAddr::new(self.host, port),
            store,
            self.cfg.clone(),
        ))
    }
}
