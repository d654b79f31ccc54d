#![deny(unsafe_code)]

use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use config::{Config, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use mqstore_utils::{deserialize_addr, deserialize_duration};

pub use self::logging::Log;
pub use self::options::Options;

pub mod logging;
pub mod options;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub registry: Registry,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub token: Token,
    #[serde(default)]
    pub cert: Cert,
    #[serde(default, skip)]
    pub opts: Options,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/mqstore/mqstore").required(false))
            .add_source(File::with_name("mqstore").required(false))
            .add_source(
                config::Environment::with_prefix("mqstore").prefix_separator("_").separator("__").try_parsing(true),
            );

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(true));
        }

        let mut inner: Inner = builder.build()?.try_deserialize()?;

        //Command line configuration overriding file configuration
        if let Some(laddr) = opts.http_laddr {
            inner.http.laddr = laddr;
        }
        if let Some(dir) = opts.registry_dir.as_ref() {
            inner.registry.dir.clone_from(dir);
        }
        if let Some(path) = opts.store_path.as_ref() {
            inner.store.path.clone_from(path);
        }

        inner.opts = opts;
        Ok(Self(Arc::new(inner)))
    }

    #[inline]
    pub fn instance() -> Result<&'static Self> {
        SETTINGS.get().ok_or_else(|| anyhow!("Settings not initialized"))
    }

    #[inline]
    pub fn init(opts: Options) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(opts)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() -> Result<()> {
        let cfg = Self::instance()?;
        log::debug!("Config info is {:?}", cfg.0);
        log::info!("http.laddr is {}, tls: {}", cfg.http.laddr, cfg.http.tls);
        log::info!("registry.dir is {}, watch_interval: {:?}", cfg.registry.dir, cfg.registry.watch_interval);
        log::info!("store.path is {}, max_connections: {}", cfg.store.path, cfg.store.max_connections);
        log::info!("token.ttl is {:?}", cfg.token.ttl);
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    #[serde(default = "Http::laddr_default", deserialize_with = "deserialize_addr")]
    pub laddr: SocketAddr,
    //Serve the data API over TLS with the hot-reloaded certificate.
    #[serde(default)]
    pub tls: bool,
}

impl Default for Http {
    #[inline]
    fn default() -> Self {
        Self { laddr: Self::laddr_default(), tls: false }
    }
}

impl Http {
    fn laddr_default() -> SocketAddr {
        ([0, 0, 0, 0], 8081).into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    #[serde(default = "Registry::dir_default")]
    pub dir: String,
    #[serde(default = "Registry::users_default")]
    pub users: String,
    #[serde(default = "Registry::tenants_default")]
    pub tenants: String,
    #[serde(default = "Registry::store_topics_default")]
    pub store_topics: String,
    //How often registry and certificate files are checked for modification.
    #[serde(default = "Registry::watch_interval_default", deserialize_with = "deserialize_duration")]
    pub watch_interval: Duration,
}

impl Default for Registry {
    #[inline]
    fn default() -> Self {
        Self {
            dir: Self::dir_default(),
            users: Self::users_default(),
            tenants: Self::tenants_default(),
            store_topics: Self::store_topics_default(),
            watch_interval: Self::watch_interval_default(),
        }
    }
}

impl Registry {
    fn dir_default() -> String {
        "./config".into()
    }
    fn users_default() -> String {
        "users.json".into()
    }
    fn tenants_default() -> String {
        "clients.json".into()
    }
    fn store_topics_default() -> String {
        "storeTopics.json".into()
    }
    fn watch_interval_default() -> Duration {
        Duration::from_secs(2)
    }

    #[inline]
    pub fn path(&self, file: &str) -> String {
        format!("{}/{}", self.dir.trim_end_matches(['/', '\\']), file)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    //SQLite database file, ":memory:" keeps everything in process.
    #[serde(default = "Store::path_default")]
    pub path: String,
    #[serde(default = "Store::max_connections_default")]
    pub max_connections: u32,
    #[serde(default = "Store::connection_timeout_default", deserialize_with = "deserialize_duration")]
    pub connection_timeout: Duration,
    //Appends are retried with exponential backoff, starting at the initial interval,
    //until this much time has passed.
    #[serde(default = "Store::retry_initial_interval_default", deserialize_with = "deserialize_duration")]
    pub retry_initial_interval: Duration,
    #[serde(default = "Store::retry_max_elapsed_time_default", deserialize_with = "deserialize_duration")]
    pub retry_max_elapsed_time: Duration,
    #[serde(default = "Store::retry_multiplier_default")]
    pub retry_multiplier: f64,
}

impl Default for Store {
    #[inline]
    fn default() -> Self {
        Self {
            path: Self::path_default(),
            max_connections: Self::max_connections_default(),
            connection_timeout: Self::connection_timeout_default(),
            retry_initial_interval: Self::retry_initial_interval_default(),
            retry_max_elapsed_time: Self::retry_max_elapsed_time_default(),
            retry_multiplier: Self::retry_multiplier_default(),
        }
    }
}

impl Store {
    fn path_default() -> String {
        "./mqstore.db".into()
    }
    fn max_connections_default() -> u32 {
        20
    }
    fn connection_timeout_default() -> Duration {
        Duration::from_secs(30)
    }
    fn retry_initial_interval_default() -> Duration {
        Duration::from_millis(500)
    }
    fn retry_max_elapsed_time_default() -> Duration {
        Duration::from_secs(10)
    }
    fn retry_multiplier_default() -> f64 {
        2.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    #[serde(default = "Token::ttl_default", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
}

impl Default for Token {
    #[inline]
    fn default() -> Self {
        Self { ttl: Self::ttl_default() }
    }
}

impl Token {
    fn ttl_default() -> Duration {
        Duration::from_secs(86400)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cert {
    #[serde(default = "Cert::key_default")]
    pub key: String,
    #[serde(default = "Cert::cert_default")]
    pub cert: String,
}

impl Default for Cert {
    #[inline]
    fn default() -> Self {
        Self { key: Self::key_default(), cert: Self::cert_default() }
    }
}

impl Cert {
    fn key_default() -> String {
        "./cert/key.pem".into()
    }
    fn cert_default() -> String {
        "./cert/cert.pem".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new(Options::default()).expect("Settings creation failed");
        assert_eq!(settings.http.laddr.port(), 8081);
        assert_eq!(settings.token.ttl, Duration::from_secs(86400));
        assert_eq!(settings.registry.path(&settings.registry.users), "./config/users.json");
        assert_eq!(settings.store.max_connections, 20);
    }

    #[test]
    fn test_command_line_overrides() {
        let opts = Options {
            http_laddr: Some(([127, 0, 0, 1], 9000).into()),
            registry_dir: Some("/tmp/registry/".into()),
            store_path: Some(":memory:".into()),
            ..Default::default()
        };
        let settings = Settings::new(opts).expect("Settings creation failed");
        assert_eq!(settings.http.laddr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(settings.registry.path("clients.json"), "/tmp/registry/clients.json");
        assert_eq!(settings.store.path, ":memory:");
    }

    #[test]
    fn test_duration_fields_from_toml() {
        let cfg = Config::builder()
            .add_source(config::File::from_str(
                "[token]\nttl = \"1h\"\n\
                 [registry]\nwatch_interval = \"500ms\"\n\
                 [store]\nretry_initial_interval = \"20ms\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let inner: Inner = cfg.try_deserialize().unwrap();
        assert_eq!(inner.token.ttl, Duration::from_secs(3600));
        assert_eq!(inner.registry.watch_interval, Duration::from_millis(500));
        assert_eq!(inner.store.retry_initial_interval, Duration::from_millis(20));
        assert_eq!(inner.store.retry_max_elapsed_time, Duration::from_secs(10));
    }
}
