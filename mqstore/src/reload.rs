//! File-backed registry and keypair, with hot reload
//!
//! A reload reads and validates the new content off to the side, reconciles store-topic
//! subscriptions against the exact previous snapshot and only then swaps the new snapshot
//! in. Reloads are serialized by one mutex. Content that fails validation is reported and
//! the previous snapshot or keypair stays live.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::MqstoreError;
use crate::keypair::{KeyPair, KeyStore};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::registry::{Registry, Snapshot, StoreTopics, Tenant, User};

async fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, MqstoreError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| MqstoreError::config_reload(format!("read {} failure, {}", path, e)))?;
    serde_json::from_slice(&data).map_err(|e| MqstoreError::config_reload(format!("parse {} failure, {}", path, e)))
}

#[derive(Debug, Clone)]
pub struct RegistryFiles {
    pub users: String,
    pub tenants: String,
    pub store_topics: String,
}

impl RegistryFiles {
    #[inline]
    pub fn from_settings(cfg: &mqstore_conf::Registry) -> Self {
        Self { users: cfg.path(&cfg.users), tenants: cfg.path(&cfg.tenants), store_topics: cfg.path(&cfg.store_topics) }
    }

    pub async fn read(&self) -> Result<Snapshot, MqstoreError> {
        let users: Vec<User> = read_json(&self.users).await?;
        let tenants: Vec<Tenant> = read_json(&self.tenants).await?;
        let store_topics: Vec<String> = read_json(&self.store_topics).await?;
        Snapshot::new(tenants, users, store_topics.into_iter().collect::<StoreTopics>())
    }

    #[inline]
    fn paths(&self) -> Vec<String> {
        vec![self.users.clone(), self.tenants.clone(), self.store_topics.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct KeyPairFiles {
    pub key: String,
    pub cert: String,
}

impl KeyPairFiles {
    #[inline]
    pub fn from_settings(cfg: &mqstore_conf::Cert) -> Self {
        Self { key: cfg.key.clone(), cert: cfg.cert.clone() }
    }

    #[inline]
    pub async fn read(&self) -> Result<KeyPair, MqstoreError> {
        KeyPair::load(&self.key, &self.cert).await
    }

    #[inline]
    fn paths(&self) -> Vec<String> {
        vec![self.key.clone(), self.cert.clone()]
    }
}

pub struct Reloader {
    registry: Arc<Registry>,
    keys: Arc<KeyStore>,
    reconciler: Reconciler,
    registry_files: RegistryFiles,
    keypair_files: KeyPairFiles,
    lock: Mutex<()>,
}

impl Reloader {
    pub fn new(
        registry: Arc<Registry>,
        keys: Arc<KeyStore>,
        reconciler: Reconciler,
        registry_files: RegistryFiles,
        keypair_files: KeyPairFiles,
    ) -> Self {
        Self { registry, keys, reconciler, registry_files, keypair_files, lock: Mutex::new(()) }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Subscribe the store topics of the snapshot that is live at start-up
    pub async fn start(&self) -> ReconcileReport {
        let _guard = self.lock.lock().await;
        let current = self.registry.load();
        self.reconciler.reconcile(current.store_topics()).await
    }

    /// Retry store topics of the live snapshot that are not subscribed yet, `None`
    /// when everything is already in place
    pub async fn resync(&self) -> Option<ReconcileReport> {
        let _guard = self.lock.lock().await;
        let current = self.registry.load();
        if self.reconciler.is_synced(current.store_topics()).await {
            return None;
        }
        Some(self.reconciler.reconcile(current.store_topics()).await)
    }

    /// Reconcile against the live snapshot, then make `snapshot` live
    pub async fn apply(&self, snapshot: Snapshot) -> ReconcileReport {
        let _guard = self.lock.lock().await;
        self.apply_locked(snapshot).await
    }

    async fn apply_locked(&self, snapshot: Snapshot) -> ReconcileReport {
        let report = self.reconciler.reconcile(snapshot.store_topics()).await;
        self.registry.swap(snapshot);
        report
    }

    pub async fn reload_registry(&self) -> Result<ReconcileReport, MqstoreError> {
        let _guard = self.lock.lock().await;
        let snapshot = self.registry_files.read().await.map_err(|e| {
            log::warn!("registry reload rejected, previous snapshot kept, {}", e);
            e
        })?;
        log::info!(
            "registry reloaded, tenants: {}, users: {}, store topics: {}",
            snapshot.tenants().len(),
            snapshot.users().len(),
            snapshot.store_topics().len()
        );
        Ok(self.apply_locked(snapshot).await)
    }

    pub async fn reload_keypair(&self) -> Result<(), MqstoreError> {
        let _guard = self.lock.lock().await;
        let pair = self.keypair_files.read().await.map_err(|e| {
            log::warn!("keypair reload rejected, previous keypair kept, {}", e);
            e
        })?;
        self.keys.swap(pair);
        Ok(())
    }
}

/// Modification times of a fixed list of files
pub struct FileStamps {
    paths: Vec<String>,
    stamps: Vec<Option<SystemTime>>,
}

impl FileStamps {
    pub async fn read(paths: Vec<String>) -> Self {
        let stamps = Self::stamps(&paths).await;
        Self { paths, stamps }
    }

    async fn stamps(paths: &[String]) -> Vec<Option<SystemTime>> {
        let mut stamps = Vec::with_capacity(paths.len());
        for p in paths {
            stamps.push(tokio::fs::metadata(p).await.ok().and_then(|m| m.modified().ok()));
        }
        stamps
    }

    /// Whether any file changed since the last call, remembering the new times
    pub async fn changed(&mut self) -> bool {
        let stamps = Self::stamps(&self.paths).await;
        let changed = stamps != self.stamps;
        self.stamps = stamps;
        changed
    }
}

/// Polls registry and keypair files at a fixed interval and reloads what changed
pub struct Watcher {
    reloader: Arc<Reloader>,
    interval: Duration,
}

impl Watcher {
    #[inline]
    pub fn new(reloader: Arc<Reloader>, interval: Duration) -> Self {
        Self { reloader, interval }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut registry_stamps = FileStamps::read(self.reloader.registry_files.paths()).await;
        let mut keypair_stamps = FileStamps::read(self.reloader.keypair_files.paths()).await;
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = if registry_stamps.changed().await {
                self.reloader.reload_registry().await.ok()
            } else {
                self.reloader.resync().await
            };
            if let Some(report) = report.filter(|r| !r.is_ok()) {
                log::warn!("store topic reconcile had {} failure(s)", report.failures.len());
            }
            if keypair_stamps.changed().await {
                let _ = self.reloader.reload_keypair().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tests::Recorder;
    use crate::bus::{EventBus, LocalBus};
    use crate::keypair::tests::{pair_a, CERT_A, CERT_B, KEY_A, KEY_B};
    use crate::reconcile::tests::FailOnce;

    struct Fixture {
        dir: tempfile::TempDir,
        bus: Arc<LocalBus>,
        reloader: Arc<Reloader>,
    }

    impl Fixture {
        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }

        fn write(&self, name: &str, content: &[u8]) {
            std::fs::write(self.path(name), content).unwrap();
        }

        /// Write and push the mtime ahead so a poll always sees the change
        fn rewrite(&self, name: &str, content: &[u8]) {
            self.write(name, content);
            let file = std::fs::OpenOptions::new().write(true).open(self.path(name)).unwrap();
            file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
        }
    }

    async fn eventually(f: impl Fn() -> bool) -> bool {
        for _ in 0..50 {
            if f() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(LocalBus::new());
        fixture_on(bus.clone(), bus)
    }

    fn fixture_on(bus: Arc<LocalBus>, via: Arc<dyn EventBus>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let p = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        std::fs::write(p("users.json"), r#"[{"username":"alice","password":"secret"}]"#).unwrap();
        std::fs::write(p("clients.json"), r#"[{"id":"boiler1","allowedUsers":["alice"]}]"#).unwrap();
        std::fs::write(p("storeTopics.json"), r#"["a/x","b/y"]"#).unwrap();
        std::fs::write(p("key.pem"), KEY_A).unwrap();
        std::fs::write(p("cert.pem"), CERT_A).unwrap();

        let reconciler = Reconciler::new(via, Arc::new(Recorder::default()));
        let registry_files =
            RegistryFiles { users: p("users.json"), tenants: p("clients.json"), store_topics: p("storeTopics.json") };
        let keypair_files = KeyPairFiles { key: p("key.pem"), cert: p("cert.pem") };
        let reloader = Arc::new(Reloader::new(
            Arc::new(Registry::default()),
            Arc::new(KeyStore::new(pair_a())),
            reconciler,
            registry_files,
            keypair_files,
        ));
        Fixture { dir, bus, reloader }
    }

    #[tokio::test]
    async fn test_reload_registry_reconciles_and_swaps() {
        let f = fixture();
        assert!(f.reloader.start().await.is_ok());
        f.reloader.reload_registry().await.unwrap();
        assert!(f.reloader.registry().authenticate("alice", "secret"));
        assert_eq!(f.bus.filters(), vec!["a/x", "b/y"]);

        f.write("storeTopics.json", br#"["b/y","c/z"]"#);
        let report = f.reloader.reload_registry().await.unwrap();
        assert_eq!(report.subscribed, vec!["c/z"]);
        assert_eq!(report.unsubscribed, vec!["a/x"]);
        assert_eq!(f.bus.filters(), vec!["b/y", "c/z"]);
        assert_eq!(f.reloader.registry().load().store_topics().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_registry_keeps_previous_snapshot() {
        let f = fixture();
        f.reloader.reload_registry().await.unwrap();

        f.write("clients.json", br#"[{"id":"boiler1","allowedUsers":["alice"]},{"id":""}]"#);
        assert!(matches!(f.reloader.reload_registry().await, Err(MqstoreError::ConfigReload(_))));

        f.write("clients.json", b"[{\"id\":");
        assert!(f.reloader.reload_registry().await.is_err());

        f.write("clients.json", br#"[{"id":"boiler1","allowedUsers":["alice"]}]"#);
        f.write("storeTopics.json", br#"["a/#/x"]"#);
        assert!(f.reloader.reload_registry().await.is_err());

        assert!(f.reloader.registry().user_topic_permission("alice", "boiler1/temp"));
        assert_eq!(f.bus.filters(), vec!["a/x", "b/y"]);
    }

    #[tokio::test]
    async fn test_reload_keypair_as_one_pair() {
        let f = fixture();
        f.write("key.pem", KEY_B);
        assert!(f.reloader.reload_keypair().await.is_err());
        assert!(f.reloader.keys.load().subject().contains("mqstore-test-a"));

        f.write("cert.pem", CERT_B);
        f.reloader.reload_keypair().await.unwrap();
        assert!(f.reloader.keys.load().subject().contains("mqstore-test-b"));
    }

    #[tokio::test]
    async fn test_file_stamps() {
        let f = fixture();
        let mut stamps = FileStamps::read(vec![f.path("users.json"), f.path("missing.json")]).await;
        assert!(!stamps.changed().await);

        let file = std::fs::OpenOptions::new().write(true).open(f.path("users.json")).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10)).unwrap();
        assert!(stamps.changed().await);
        assert!(!stamps.changed().await);

        f.write("missing.json", b"[]");
        assert!(stamps.changed().await);
    }

    #[tokio::test]
    async fn test_failed_store_topic_is_subscribed_later() {
        let bus = Arc::new(LocalBus::new());
        let f = fixture_on(bus.clone(), Arc::new(FailOnce::new(bus, "c/z")));
        f.write("storeTopics.json", br#"["a/x","c/z"]"#);

        let report = f.reloader.reload_registry().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "c/z");
        assert_eq!(f.reloader.registry().load().store_topics().len(), 2);
        assert_eq!(f.bus.filters(), vec!["a/x"]);

        //Same files again, the pattern that failed is still missing and gets added.
        let report = f.reloader.reload_registry().await.unwrap();
        assert_eq!(report.subscribed, vec!["c/z"]);
        assert_eq!(f.bus.filters(), vec!["a/x", "c/z"]);
        assert!(f.reloader.resync().await.is_none());
    }

    #[tokio::test]
    async fn test_resync_retries_without_file_change() {
        let bus = Arc::new(LocalBus::new());
        let f = fixture_on(bus.clone(), Arc::new(FailOnce::new(bus, "b/y")));
        f.reloader.reload_registry().await.unwrap();
        assert_eq!(f.bus.filters(), vec!["a/x"]);

        let report = f.reloader.resync().await.unwrap();
        assert_eq!(report.subscribed, vec!["b/y"]);
        assert_eq!(f.bus.filters(), vec!["a/x", "b/y"]);
    }

    #[tokio::test]
    async fn test_watcher_reloads_changed_files() {
        let f = fixture();
        f.reloader.reload_registry().await.unwrap();
        assert_eq!(f.bus.filters(), vec!["a/x", "b/y"]);

        let watcher = Watcher::new(f.reloader.clone(), Duration::from_millis(100)).spawn();
        tokio::time::sleep(Duration::from_millis(300)).await;

        f.rewrite("storeTopics.json", br#"["b/y","c/z"]"#);
        let bus = f.bus.clone();
        assert!(eventually(|| bus.filters() == vec!["b/y", "c/z"]).await);

        f.rewrite("key.pem", KEY_B);
        f.rewrite("cert.pem", CERT_B);
        let reloader = f.reloader.clone();
        assert!(eventually(|| reloader.keys.load().subject().contains("mqstore-test-b")).await);

        watcher.abort();
    }
}
