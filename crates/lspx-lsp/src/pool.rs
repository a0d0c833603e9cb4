//! Shared language server connections, one per (workspace root, server id).
//!
//! Handle creation happens under the map lock, so concurrent acquires for the
//! same key never launch two processes. The handshake itself runs in a
//! detached task; acquirers only wait on the handle's state channel, which
//! lets any number of callers share a ready handle concurrently.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use lspx_core::ToolError;
use lspx_core::registry::ServerDescriptor;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lsp::is_request_timeout;
use crate::session::{LanguageServer, ServerLauncher};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub root: PathBuf,
    pub server_id: String,
}

impl PoolKey {
    pub fn new(root: &Path, server_id: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            server_id: server_id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Longest an acquire waits on a handshake before reporting the server
    /// as still initializing.
    pub acquire_timeout: Duration,
    /// Shut down handles unused for this long. `None` keeps them warm.
    pub idle_shutdown: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(45),
            idle_shutdown: None,
        }
    }
}

#[derive(Clone)]
enum HandleState {
    Initializing,
    Ready(Arc<dyn LanguageServer>),
    Failed { message: String, timed_out: bool },
    /// Removed from the pool; a handshake finishing now must stop its server.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlePhase {
    Initializing,
    Ready,
    Failed,
    Closed,
}

impl HandleState {
    fn phase(&self) -> HandlePhase {
        match self {
            HandleState::Initializing => HandlePhase::Initializing,
            HandleState::Ready(_) => HandlePhase::Ready,
            HandleState::Failed { .. } => HandlePhase::Failed,
            HandleState::Closed => HandlePhase::Closed,
        }
    }
}

struct ClientHandle {
    state: watch::Sender<HandleState>,
    ref_count: AtomicUsize,
    last_released: Mutex<Instant>,
}

impl ClientHandle {
    fn new() -> Self {
        let (state, _) = watch::channel(HandleState::Initializing);
        Self {
            state,
            ref_count: AtomicUsize::new(0),
            last_released: Mutex::new(Instant::now()),
        }
    }

    fn release(&self) {
        let previous = self
            .ref_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            *self
                .last_released
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_released
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Marks the handle closed and hands back the server it was running, if any.
    fn close(&self) -> Option<Arc<dyn LanguageServer>> {
        match self.state.send_replace(HandleState::Closed) {
            HandleState::Ready(server) => Some(server),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HandleSnapshot {
    pub root: PathBuf,
    pub server_id: String,
    pub ref_count: usize,
    pub phase: HandlePhase,
}

/// A borrowed server connection. Dropping it releases the reference.
pub struct PooledClient {
    key: PoolKey,
    handle: Arc<ClientHandle>,
    server: Arc<dyn LanguageServer>,
    released: bool,
}

impl PooledClient {
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Gives up the lease without releasing; the caller owes a matching
    /// [`ClientPool::release`].
    pub fn detach(mut self) -> Arc<dyn LanguageServer> {
        self.released = true;
        self.server.clone()
    }
}

impl Deref for PooledClient {
    type Target = dyn LanguageServer;

    fn deref(&self) -> &Self::Target {
        self.server.as_ref()
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if !self.released {
            self.handle.release();
        }
    }
}

/// One reference counted by `acquire` that has not been handed out as a
/// [`PooledClient`] yet. Released on drop.
struct Reference {
    handle: Arc<ClientHandle>,
    armed: bool,
}

impl Reference {
    fn new(handle: Arc<ClientHandle>) -> Self {
        Self {
            handle,
            armed: true,
        }
    }

    /// Transfers the reference to the caller.
    fn disarm(mut self) -> Arc<ClientHandle> {
        self.armed = false;
        self.handle.clone()
    }

    /// Releases now and keeps the handle for bookkeeping.
    fn into_released(self) -> Arc<ClientHandle> {
        self.handle.clone()
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        if self.armed {
            self.handle.release();
        }
    }
}

pub struct ClientPool {
    launcher: Arc<dyn ServerLauncher>,
    options: PoolOptions,
    handles: Mutex<HashMap<PoolKey, Arc<ClientHandle>>>,
    closed: AtomicBool,
}

impl ClientPool {
    pub fn new(launcher: Arc<dyn ServerLauncher>, options: PoolOptions) -> Self {
        Self {
            launcher,
            options,
            handles: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, HashMap<PoolKey, Arc<ClientHandle>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a lease on the server for (`root`, `server.id`), launching it
    /// on first use. The reference count is incremented on every call.
    pub async fn acquire(
        &self,
        root: &Path,
        server: &ServerDescriptor,
    ) -> Result<PooledClient, ToolError> {
        let key = PoolKey::new(root, &server.id);
        let handle = {
            let mut handles = self.lock_handles();
            if self.closed.load(Ordering::SeqCst) {
                return Err(ToolError::protocol("the client pool is shut down"));
            }
            let handle = match handles.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let created = Arc::new(ClientHandle::new());
                    handles.insert(key.clone(), created.clone());
                    self.start_handshake(&key, created.clone(), server.clone());
                    created
                }
            };
            handle.ref_count.fetch_add(1, Ordering::SeqCst);
            handle
        };

        // Dropping the acquire future from here on must still give the
        // reference back.
        let reference = Reference::new(handle);
        let mut rx = reference.handle.state.subscribe();
        let settled = tokio::time::timeout(
            self.options.acquire_timeout,
            rx.wait_for(|s| !matches!(s, HandleState::Initializing)),
        )
        .await
        .map(|waited| waited.map(|state| (*state).clone()));

        let state = match settled {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => HandleState::Closed,
            Err(_) => {
                return Err(ToolError::Transient {
                    server_id: server.id.clone(),
                });
            }
        };

        match state {
            HandleState::Ready(session) => Ok(PooledClient {
                key,
                handle: reference.disarm(),
                server: session,
                released: false,
            }),
            HandleState::Failed { message, timed_out } => {
                let handle = reference.into_released();
                self.evict(&key, &handle);
                if timed_out {
                    Err(ToolError::Transient {
                        server_id: server.id.clone(),
                    })
                } else {
                    Err(ToolError::Protocol(message))
                }
            }
            HandleState::Initializing | HandleState::Closed => Err(ToolError::protocol(format!(
                "LSP server '{}' was shut down",
                server.id
            ))),
        }
    }

    fn start_handshake(&self, key: &PoolKey, handle: Arc<ClientHandle>, server: ServerDescriptor) {
        let launcher = self.launcher.clone();
        let root = key.root.clone();
        info!(
            "starting LSP server id={} root={}",
            server.id,
            root.display()
        );

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match launcher.launch(&root, &server) {
                Ok(session) => match session.initialize().await {
                    Ok(()) => Ok(session),
                    Err(err) => {
                        if let Err(stop) = session.shutdown().await {
                            warn!("failed to stop LSP server id={}: {stop:#}", server.id);
                        }
                        Err(err)
                    }
                },
                Err(err) => Err(err),
            };

            match outcome {
                Ok(session) => {
                    let mut pending = Some(session);
                    let published = handle.state.send_if_modified(|state| {
                        if !matches!(state, HandleState::Initializing) {
                            return false;
                        }
                        match pending.take() {
                            Some(session) => {
                                *state = HandleState::Ready(session);
                                true
                            }
                            None => false,
                        }
                    });
                    if published {
                        info!(
                            "LSP server ready id={} root={} elapsed_ms={}",
                            server.id,
                            root.display(),
                            started.elapsed().as_millis()
                        );
                    } else if let Some(session) = pending {
                        info!(
                            "pool closed during handshake, stopping id={} root={}",
                            server.id,
                            root.display()
                        );
                        if let Err(err) = session.shutdown().await {
                            warn!("failed to stop LSP server id={}: {err:#}", server.id);
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "LSP server handshake failed id={} root={}: {err:#}",
                        server.id,
                        root.display()
                    );
                    let failed = HandleState::Failed {
                        message: format!("{err:#}"),
                        timed_out: is_request_timeout(&err),
                    };
                    handle.state.send_if_modified(|state| {
                        if matches!(state, HandleState::Initializing) {
                            *state = failed;
                            true
                        } else {
                            false
                        }
                    });
                }
            }
        });
    }

    fn evict(&self, key: &PoolKey, handle: &Arc<ClientHandle>) {
        let mut handles = self.lock_handles();
        if handles.get(key).is_some_and(|h| Arc::ptr_eq(h, handle)) {
            handles.remove(key);
        }
    }

    /// Drops one reference taken by [`acquire`](Self::acquire) (through
    /// [`PooledClient::detach`]). The handle stays warm at zero.
    pub fn release(&self, root: &Path, server_id: &str) {
        let handle = self.lock_handles().get(&PoolKey::new(root, server_id)).cloned();
        if let Some(handle) = handle {
            handle.release();
        }
    }

    pub fn is_initializing(&self, root: &Path, server_id: &str) -> bool {
        self.lock_handles()
            .get(&PoolKey::new(root, server_id))
            .is_some_and(|h| matches!(*h.state.borrow(), HandleState::Initializing))
    }

    pub fn ref_count(&self, root: &Path, server_id: &str) -> Option<usize> {
        self.lock_handles()
            .get(&PoolKey::new(root, server_id))
            .map(|h| h.ref_count.load(Ordering::SeqCst))
    }

    pub fn snapshot(&self) -> Vec<HandleSnapshot> {
        let mut out: Vec<HandleSnapshot> = self
            .lock_handles()
            .iter()
            .map(|(key, h)| HandleSnapshot {
                root: key.root.clone(),
                server_id: key.server_id.clone(),
                ref_count: h.ref_count.load(Ordering::SeqCst),
                phase: h.state.borrow().phase(),
            })
            .collect();
        out.sort_by(|a, b| (&a.root, &a.server_id).cmp(&(&b.root, &b.server_id)));
        out
    }

    /// Spawns the idle reaper when `idle_shutdown` is configured. The task
    /// ends once the pool is dropped or shut down.
    pub fn start_idle_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let idle = self.options.idle_shutdown?;
        let tick = idle.min(Duration::from_millis(500));
        let pool: Weak<ClientPool> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                if pool.closed.load(Ordering::SeqCst) {
                    break;
                }
                pool.reap_idle(idle).await;
            }
        }))
    }

    async fn reap_idle(&self, idle: Duration) {
        let expired: Vec<(PoolKey, Arc<ClientHandle>)> = {
            let mut handles = self.lock_handles();
            let keys: Vec<PoolKey> = handles
                .iter()
                .filter(|(_, h)| {
                    h.ref_count.load(Ordering::SeqCst) == 0
                        && matches!(*h.state.borrow(), HandleState::Ready(_))
                        && h.idle_for() >= idle
                })
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| handles.remove(&k).map(|h| (k, h)))
                .collect()
        };

        for (key, handle) in expired {
            info!(
                "idle shutdown: stopping id={} root={}",
                key.server_id,
                key.root.display()
            );
            if let Some(server) = handle.close()
                && let Err(err) = server.shutdown().await
            {
                warn!("failed to stop idle LSP server id={}: {err:#}", key.server_id);
            }
        }
    }

    /// Stops every pooled server and refuses further acquires.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(PoolKey, Arc<ClientHandle>)> = {
            let mut handles = self.lock_handles();
            self.closed.store(true, Ordering::SeqCst);
            handles.drain().collect()
        };

        for (key, handle) in drained {
            let Some(server) = handle.close() else {
                continue;
            };
            info!(
                "stopping LSP server id={} root={}",
                key.server_id,
                key.root.display()
            );
            if let Err(err) = server.shutdown().await {
                warn!("failed to stop LSP server id={}: {err:#}", key.server_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::{AnyLocation, LspDiagnostic, LspPosition, LspWorkspaceEdit, RequestTimeout};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    #[derive(Clone, Copy)]
    enum InitOutcome {
        Ok,
        TimedOut,
        Crashed,
        /// Crashes during the handshake and then fails to stop.
        Unkillable,
    }

    struct FakeServer {
        gate: Option<Arc<Notify>>,
        outcome: InitOutcome,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LanguageServer for FakeServer {
        async fn initialize(&self) -> Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.outcome {
                InitOutcome::Ok => Ok(()),
                InitOutcome::TimedOut => Err(RequestTimeout {
                    method: "initialize".to_string(),
                }
                .into()),
                InitOutcome::Crashed | InitOutcome::Unkillable => {
                    Err(anyhow!("server exited with status 1"))
                }
            }
        }

        async fn definition(&self, _: &Path, _: LspPosition) -> Result<Vec<AnyLocation>> {
            Ok(Vec::new())
        }

        async fn references(&self, _: &Path, _: LspPosition, _: bool) -> Result<Vec<AnyLocation>> {
            Ok(Vec::new())
        }

        async fn diagnostics(&self, _: &Path, _: Duration) -> Result<Vec<LspDiagnostic>> {
            Ok(Vec::new())
        }

        async fn rename(
            &self,
            _: &Path,
            _: LspPosition,
            _: &str,
        ) -> Result<Option<LspWorkspaceEdit>> {
            Ok(None)
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                InitOutcome::Unkillable => Err(anyhow!("failed to kill LSP server process")),
                _ => Ok(()),
            }
        }
    }

    struct FakeLauncher {
        launched: AtomicUsize,
        shutdowns: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
        outcome: InitOutcome,
    }

    impl FakeLauncher {
        fn new(outcome: InitOutcome, gate: Option<Arc<Notify>>) -> Arc<Self> {
            Arc::new(Self {
                launched: AtomicUsize::new(0),
                shutdowns: Arc::new(AtomicUsize::new(0)),
                gate,
                outcome,
            })
        }
    }

    impl ServerLauncher for FakeLauncher {
        fn launch(&self, _: &Path, _: &ServerDescriptor) -> Result<Arc<dyn LanguageServer>> {
            self.launched.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeServer {
                gate: self.gate.clone(),
                outcome: self.outcome,
                shutdowns: self.shutdowns.clone(),
            }))
        }
    }

    fn descriptor() -> ServerDescriptor {
        ServerDescriptor {
            id: "fake".to_string(),
            command: vec!["fake-ls".to_string()],
            extensions: vec!["fk".to_string()],
            install_hint: "none".to_string(),
            language_id: None,
        }
    }

    fn pool(launcher: Arc<FakeLauncher>, options: PoolOptions) -> Arc<ClientPool> {
        Arc::new(ClientPool::new(launcher, options))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn concurrent_acquires_launch_one_server() {
        let launcher = FakeLauncher::new(InitOutcome::Ok, None);
        let pool = pool(launcher.clone(), PoolOptions::default());
        let root = Path::new("/work/app");
        let server = descriptor();

        let (a, b) = tokio::join!(pool.acquire(root, &server), pool.acquire(root, &server));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
        assert_eq!(pool.ref_count(root, "fake"), Some(2));

        drop(a);
        assert_eq!(pool.ref_count(root, "fake"), Some(1));
        drop(b);
        assert_eq!(pool.ref_count(root, "fake"), Some(0));

        // Warm reuse: no second launch.
        let _c = pool.acquire(root, &server).await.unwrap();
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_roots_get_separate_servers() {
        let launcher = FakeLauncher::new(InitOutcome::Ok, None);
        let pool = pool(launcher.clone(), PoolOptions::default());
        let server = descriptor();

        let _a = pool.acquire(Path::new("/work/a"), &server).await.unwrap();
        let _b = pool.acquire(Path::new("/work/b"), &server).await.unwrap();
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
        assert_eq!(pool.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn explicit_release_balances_detached_acquires() {
        let launcher = FakeLauncher::new(InitOutcome::Ok, None);
        let pool = pool(launcher, PoolOptions::default());
        let root = Path::new("/work/app");
        let server = descriptor();

        let _first = pool.acquire(root, &server).await.unwrap().detach();
        let _second = pool.acquire(root, &server).await.unwrap().detach();
        assert_eq!(pool.ref_count(root, "fake"), Some(2));

        pool.release(root, "fake");
        assert_eq!(pool.ref_count(root, "fake"), Some(1));
        pool.release(root, "fake");
        assert_eq!(pool.ref_count(root, "fake"), Some(0));
        pool.release(root, "fake");
        assert_eq!(pool.ref_count(root, "fake"), Some(0));
    }

    #[tokio::test]
    async fn is_initializing_tracks_the_handshake() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(InitOutcome::Ok, Some(gate.clone()));
        let pool = pool(launcher, PoolOptions::default());
        let root = PathBuf::from("/work/app");

        let waiter = {
            let pool = pool.clone();
            let root = root.clone();
            tokio::spawn(async move { pool.acquire(&root, &descriptor()).await.map(|c| c.detach()) })
        };

        eventually(|| pool.is_initializing(&root, "fake")).await;
        gate.notify_one();
        waiter.await.unwrap().unwrap();
        assert!(!pool.is_initializing(&root, "fake"));
        assert_eq!(pool.snapshot()[0].phase, HandlePhase::Ready);
    }

    #[tokio::test]
    async fn waiting_past_acquire_timeout_is_transient() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(InitOutcome::Ok, Some(gate.clone()));
        let pool = pool(
            launcher.clone(),
            PoolOptions {
                acquire_timeout: Duration::from_millis(20),
                idle_shutdown: None,
            },
        );
        let root = Path::new("/work/app");

        let err = pool.acquire(root, &descriptor()).await.err().unwrap();
        assert!(matches!(err, ToolError::Transient { .. }));
        assert!(pool.is_initializing(root, "fake"));
        assert_eq!(pool.ref_count(root, "fake"), Some(0));

        // The handshake keeps going and the retry reuses it.
        gate.notify_one();
        eventually(|| !pool.is_initializing(root, "fake")).await;
        let _client = pool.acquire(root, &descriptor()).await.unwrap();
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_acquire_gives_its_reference_back() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(InitOutcome::Ok, Some(gate.clone()));
        let pool = pool(launcher, PoolOptions::default());
        let root = Path::new("/work/app");

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), pool.acquire(root, &descriptor())).await;
        assert!(cancelled.is_err());
        assert_eq!(pool.ref_count(root, "fake"), Some(0));

        gate.notify_one();
        eventually(|| !pool.is_initializing(root, "fake")).await;
        assert_eq!(pool.ref_count(root, "fake"), Some(0));

        let client = pool.acquire(root, &descriptor()).await.unwrap();
        assert_eq!(pool.ref_count(root, "fake"), Some(1));
        drop(client);
        assert_eq!(pool.ref_count(root, "fake"), Some(0));
    }

    #[tokio::test]
    async fn initialize_timeout_is_transient_and_evicted() {
        let launcher = FakeLauncher::new(InitOutcome::TimedOut, None);
        let pool = pool(launcher.clone(), PoolOptions::default());
        let root = Path::new("/work/app");

        let err = pool.acquire(root, &descriptor()).await.err().unwrap();
        assert!(matches!(err, ToolError::Transient { .. }));
        assert!(pool.snapshot().is_empty());

        let _ = pool.acquire(root, &descriptor()).await;
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
        // Failed handshakes stop their own process.
        assert_eq!(launcher.shutdowns.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn crashed_handshake_is_a_protocol_error() {
        let launcher = FakeLauncher::new(InitOutcome::Crashed, None);
        let pool = pool(launcher, PoolOptions::default());

        let err = pool
            .acquire(Path::new("/work/app"), &descriptor())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::Protocol(_)));
        assert!(err.to_string().contains("exited with status 1"));
    }

    #[tokio::test]
    async fn failed_stop_after_crash_keeps_the_handshake_error() {
        let launcher = FakeLauncher::new(InitOutcome::Unkillable, None);
        let pool = pool(launcher.clone(), PoolOptions::default());
        let root = Path::new("/work/app");

        let err = pool.acquire(root, &descriptor()).await.err().unwrap();
        assert!(matches!(err, ToolError::Protocol(_)));
        assert!(err.to_string().contains("exited with status 1"));
        assert_eq!(launcher.shutdowns.load(Ordering::SeqCst), 1);
        assert!(pool.snapshot().is_empty());

        let _ = pool.acquire(root, &descriptor()).await;
        assert_eq!(launcher.launched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_all_stops_servers_and_refuses_new_work() {
        let launcher = FakeLauncher::new(InitOutcome::Ok, None);
        let pool = pool(launcher.clone(), PoolOptions::default());
        let root = Path::new("/work/app");

        drop(pool.acquire(root, &descriptor()).await.unwrap());
        pool.shutdown_all().await;

        assert_eq!(launcher.shutdowns.load(Ordering::SeqCst), 1);
        assert!(pool.snapshot().is_empty());
        assert!(pool.acquire(root, &descriptor()).await.is_err());
    }

    #[tokio::test]
    async fn handshake_finishing_after_shutdown_stops_its_server() {
        let gate = Arc::new(Notify::new());
        let launcher = FakeLauncher::new(InitOutcome::Ok, Some(gate.clone()));
        let pool = pool(launcher.clone(), PoolOptions::default());
        let root = PathBuf::from("/work/app");

        let waiter = {
            let pool = pool.clone();
            let root = root.clone();
            tokio::spawn(async move { pool.acquire(&root, &descriptor()).await.map(|c| c.detach()) })
        };
        eventually(|| pool.is_initializing(&root, "fake")).await;

        pool.shutdown_all().await;
        assert!(waiter.await.unwrap().is_err());

        gate.notify_one();
        let shutdowns = launcher.shutdowns.clone();
        eventually(move || shutdowns.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn idle_reaper_stops_unused_servers() {
        let launcher = FakeLauncher::new(InitOutcome::Ok, None);
        let pool = pool(
            launcher.clone(),
            PoolOptions {
                acquire_timeout: Duration::from_secs(5),
                idle_shutdown: Some(Duration::from_millis(20)),
            },
        );
        let root = Path::new("/work/app");

        let held = pool.acquire(Path::new("/work/held"), &descriptor()).await.unwrap();
        drop(pool.acquire(root, &descriptor()).await.unwrap());
        let reaper = pool.start_idle_reaper().unwrap();

        let shutdowns = launcher.shutdowns.clone();
        eventually(move || shutdowns.load(Ordering::SeqCst) == 1).await;
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].root, PathBuf::from("/work/held"));

        drop(held);
        reaper.abort();
    }
}
