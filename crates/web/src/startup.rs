//! Server startup supervision
//!
//! [`ServerStartup`] optionally preloads file contents, starts a
//! [`TestServer`] and polls it until it reports healthy. Each poll that
//! fails is followed by a one second pause. After every sixth failed poll
//! the server is stopped and started again. Thirty failed polls are fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use testdrive_common::{
    CachedTestCase, DiskFileLoader, Error, FileLoader, Result, TestCaseStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::server::HttpServerFactory;

/// A server that can be started, stopped and probed
#[async_trait]
pub trait TestServer: Send + Sync {
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
    async fn is_healthy(&self) -> bool;
    fn port(&self) -> u16;

    /// Base URL once started, for servers that know it
    fn base_url(&self) -> Option<String> {
        None
    }
}

/// Creates the server a [`ServerStartup`] supervises
pub trait ServerFactory: Send + Sync {
    fn create(&self, port: u16, store: Arc<TestCaseStore>) -> Box<dyn TestServer>;
}

/// Lifecycle of a supervised server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Restarting,
    Healthy,
    Failed,
}

/// Poll limits for [`ServerStartup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub restart_every: u32,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
            restart_every: 6,
        }
    }
}

/// What to do after a health poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStep {
    Ready,
    Wait,
    WaitThenRestart,
    GiveUp,
}

#[derive(Debug)]
struct HealthCheck {
    policy: HealthCheckPolicy,
    attempts: u32,
}

impl HealthCheck {
    fn new(policy: HealthCheckPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    fn observe(&mut self, healthy: bool) -> NextStep {
        self.attempts += 1;
        if healthy {
            NextStep::Ready
        } else if self.attempts >= self.policy.max_attempts {
            NextStep::GiveUp
        } else if self.policy.restart_every > 0 && self.attempts % self.policy.restart_every == 0 {
            NextStep::WaitThenRestart
        } else {
            NextStep::Wait
        }
    }
}

/// Starts a test server and waits for it to become healthy
pub struct ServerStartup {
    port: u16,
    store: Arc<TestCaseStore>,
    preload_files: bool,
    loader: Arc<dyn FileLoader>,
    factory: Arc<dyn ServerFactory>,
    policy: HealthCheckPolicy,
    cancel: Option<CancellationToken>,
    state: LifecycleState,
}

impl ServerStartup {
    pub fn new(
        port: u16,
        store: Arc<TestCaseStore>,
        preload_files: bool,
        loader: Arc<dyn FileLoader>,
        factory: Arc<dyn ServerFactory>,
    ) -> Self {
        Self {
            port,
            store,
            preload_files,
            loader,
            factory,
            policy: HealthCheckPolicy::default(),
            cancel: None,
            state: LifecycleState::Stopped,
        }
    }

    /// Disk loader, default HTTP server and no preloading
    #[deprecated(note = "use ServerStartup::new with explicit dependencies")]
    pub fn with_defaults(port: u16, store: Arc<TestCaseStore>) -> Self {
        Self::new(
            port,
            store,
            false,
            Arc::new(DiskFileLoader),
            Arc::new(HttpServerFactory::default()),
        )
    }

    pub fn with_policy(mut self, policy: HealthCheckPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort the health loop early when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Preload `pending` cases if configured, then start and supervise a
    /// server until healthy. Returns the running server.
    pub async fn run(&mut self, pending: &[CachedTestCase]) -> Result<Box<dyn TestServer>> {
        info!("Starting server on {}", self.port);

        if self.preload_files {
            self.preload(pending).await?;
        }

        let mut server = self.factory.create(self.port, self.store.clone());
        self.state = LifecycleState::Starting;
        match self.supervise(server.as_mut()).await {
            Ok(()) => {
                self.state = LifecycleState::Healthy;
                info!("Server is healthy on {}", server.port());
                Ok(server)
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                if let Err(stop_err) = server.stop().await {
                    warn!("Failed to stop unhealthy server: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    async fn preload(&self, pending: &[CachedTestCase]) -> Result<()> {
        debug!("Preloading files for {} test cases", pending.len());
        let loader = self.loader.clone();
        let cases = pending.to_vec();
        let loaded = tokio::task::spawn_blocking(move || {
            cases
                .iter()
                .map(|case| case.with_loaded_files(loader.as_ref()))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::server_startup_caused_by(self.port, "file preloading aborted", e))??;

        for case in loaded {
            self.store.add_case(case);
        }
        Ok(())
    }

    async fn supervise(&mut self, server: &mut dyn TestServer) -> Result<()> {
        let port = self.port;
        server
            .start()
            .await
            .map_err(|e| Error::server_startup_caused_by(port, "server failed to start", e))?;

        let mut check = HealthCheck::new(self.policy);
        loop {
            let healthy = server.is_healthy().await;
            match check.observe(healthy) {
                NextStep::Ready => return Ok(()),
                NextStep::GiveUp => {
                    return Err(Error::server_startup(
                        port,
                        format!("server never became healthy after {} attempts", check.attempts),
                    ))
                }
                NextStep::Wait => {
                    debug!("Server not healthy yet (attempt {})", check.attempts);
                    self.pause().await?;
                }
                NextStep::WaitThenRestart => {
                    self.pause().await?;
                    warn!(
                        "Stopping unhealthy server and trying again (attempt {})",
                        check.attempts
                    );
                    self.state = LifecycleState::Restarting;
                    server
                        .stop()
                        .await
                        .map_err(|e| Error::server_startup_caused_by(port, "server failed to stop", e))?;
                    server
                        .start()
                        .await
                        .map_err(|e| Error::server_startup_caused_by(port, "server failed to restart", e))?;
                    self.state = LifecycleState::Starting;
                }
            }
        }
    }

    async fn pause(&self) -> Result<()> {
        let interval = self.policy.interval;
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::server_startup(self.port, "startup cancelled")),
                _ = tokio::time::sleep(interval) => Ok(()),
            },
            None => {
                tokio::time::sleep(interval).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use testdrive_common::FileEntry;

    #[derive(Default)]
    struct Counters {
        starts: AtomicU32,
        stops: AtomicU32,
        polls: AtomicU32,
    }

    struct FakeServer {
        counters: Arc<Counters>,
        healthy_on_poll: Option<u32>,
        fail_start: bool,
    }

    #[async_trait]
    impl TestServer for FakeServer {
        async fn start(&mut self) -> Result<()> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "address in use",
                )));
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            let poll = self.counters.polls.fetch_add(1, Ordering::SeqCst) + 1;
            self.healthy_on_poll.is_some_and(|n| poll >= n)
        }

        fn port(&self) -> u16 {
            4224
        }
    }

    struct FakeFactory {
        counters: Arc<Counters>,
        healthy_on_poll: Option<u32>,
        fail_start: bool,
    }

    impl FakeFactory {
        fn new(healthy_on_poll: Option<u32>) -> Self {
            Self {
                counters: Arc::new(Counters::default()),
                healthy_on_poll,
                fail_start: false,
            }
        }
    }

    impl ServerFactory for FakeFactory {
        fn create(&self, _port: u16, _store: Arc<TestCaseStore>) -> Box<dyn TestServer> {
            Box::new(FakeServer {
                counters: self.counters.clone(),
                healthy_on_poll: self.healthy_on_poll,
                fail_start: self.fail_start,
            })
        }
    }

    fn startup(factory: Arc<FakeFactory>, preload: bool) -> (ServerStartup, Arc<TestCaseStore>) {
        let store = Arc::new(TestCaseStore::new());
        let startup = ServerStartup::new(4224, store.clone(), preload, Arc::new(DiskFileLoader), factory);
        (startup, store)
    }

    #[test]
    fn test_health_check_schedule() {
        let mut check = HealthCheck::new(HealthCheckPolicy::default());
        let steps: Vec<_> = (0..30).map(|_| check.observe(false)).collect();

        let restarts: Vec<_> = steps
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == NextStep::WaitThenRestart)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(restarts, vec![6, 12, 18, 24]);
        assert_eq!(steps[29], NextStep::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_on_sixth_poll_needs_no_restart() {
        let factory = Arc::new(FakeFactory::new(Some(6)));
        let (mut startup, _) = startup(factory.clone(), false);

        let server = startup.run(&[]).await.unwrap();

        assert_eq!(server.port(), 4224);
        assert_eq!(startup.state(), LifecycleState::Healthy);
        assert_eq!(factory.counters.polls.load(Ordering::SeqCst), 6);
        assert_eq!(factory.counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(factory.counters.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_after_restart() {
        let factory = Arc::new(FakeFactory::new(Some(7)));
        let (mut startup, _) = startup(factory.clone(), false);

        startup.run(&[]).await.unwrap();

        assert_eq!(factory.counters.starts.load(Ordering::SeqCst), 2);
        assert_eq!(factory.counters.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_healthy_fails_after_thirty_polls() {
        let factory = Arc::new(FakeFactory::new(None));
        let (mut startup, _) = startup(factory.clone(), false);

        let started = tokio::time::Instant::now();
        let err = startup.run(&[]).await.err().unwrap();

        assert!(matches!(err, Error::ServerStartup { port: 4224, .. }));
        assert_eq!(startup.state(), LifecycleState::Failed);
        assert_eq!(factory.counters.polls.load(Ordering::SeqCst), 30);
        // Four restarts, then the final stop after giving up
        assert_eq!(factory.counters.starts.load(Ordering::SeqCst), 5);
        assert_eq!(factory.counters.stops.load(Ordering::SeqCst), 5);
        assert!(started.elapsed() >= Duration::from_secs(29));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy_changes_schedule() {
        let factory = Arc::new(FakeFactory::new(None));
        let (startup, _) = startup(factory.clone(), false);
        let mut startup = startup.with_policy(HealthCheckPolicy {
            max_attempts: 4,
            interval: Duration::from_millis(250),
            restart_every: 2,
        });

        let started = tokio::time::Instant::now();
        assert!(startup.run(&[]).await.is_err());

        assert_eq!(factory.counters.polls.load(Ordering::SeqCst), 4);
        // Restart after the second poll only, then the final stop
        assert_eq!(factory.counters.starts.load(Ordering::SeqCst), 2);
        assert_eq!(factory.counters.stops.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_is_wrapped() {
        let factory = Arc::new(FakeFactory {
            fail_start: true,
            ..FakeFactory::new(Some(1))
        });
        let (mut startup, _) = startup(factory.clone(), false);

        let err = startup.run(&[]).await.err().unwrap();
        match err {
            Error::ServerStartup { source, .. } => assert!(source.is_some()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(factory.counters.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_loop() {
        let factory = Arc::new(FakeFactory::new(None));
        let (startup, _) = startup(factory.clone(), false);
        let token = CancellationToken::new();
        let mut startup = startup.with_cancellation(token.clone());

        token.cancel();
        let err = startup.run(&[]).await.err().unwrap();

        assert!(matches!(err, Error::ServerStartup { .. }));
        assert_eq!(factory.counters.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preload_replaces_cases_with_loaded_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("code.js");
        std::fs::write(&path, "var loaded;").unwrap();
        let entry = FileEntry::unresolved("code.js").from_resolved_path(
            path.to_string_lossy(),
            "code.js",
            1,
        );
        let case = CachedTestCase::new("case", vec![entry], Vec::new(), Vec::new());

        let factory = Arc::new(FakeFactory::new(Some(1)));
        let (mut startup, store) = startup(factory, true);
        store.add_case(case.clone());

        startup.run(&[case]).await.unwrap();

        let cached = store.get_case("case").unwrap();
        assert_eq!(
            cached.load_files()[0].content().unwrap().as_ref(),
            b"var loaded;"
        );
    }

    #[tokio::test(start_paused = true)]
    #[allow(deprecated)]
    async fn test_default_construction_keeps_schedule() {
        let startup = ServerStartup::with_defaults(0, Arc::new(TestCaseStore::new()));
        assert_eq!(startup.policy, HealthCheckPolicy::default());
        assert!(!startup.preload_files);
        assert_eq!(startup.state(), LifecycleState::Stopped);
    }
}
