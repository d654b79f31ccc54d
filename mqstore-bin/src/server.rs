#![deny(unsafe_code)]

use std::process;
use std::sync::Arc;
use std::time::Duration;

use structopt::StructOpt;
use tokio::sync::oneshot;

use mqstore::bus::LocalBus;
use mqstore::context::ServerContext;
use mqstore::keypair::KeyStore;
use mqstore::logger::{logger_from_settings, logger_init};
use mqstore::reconcile::Reconciler;
use mqstore::registry::Registry;
use mqstore::reload::{KeyPairFiles, RegistryFiles, Reloader, Watcher};
use mqstore::store::{sqlite::SqliteStore, RetryPolicy, StoreHandler, StoreWriter};
use mqstore_conf::{Options, Settings};

#[tokio::main]
async fn main() {
    //init config
    let settings = Settings::init(Options::from_args()).expect("settings init failed");

    //init log
    logger_init(logger_from_settings(&settings.log), settings.log.level).expect("logger init failed");
    let _ = Settings::logs();

    if let Err(e) = run(settings).await {
        log::error!("mqstored failed, {:?}", e);
        tokio::time::sleep(Duration::from_millis(500)).await;
        process::exit(1);
    }
}

async fn run(settings: &'static Settings) -> mqstore::Result<()> {
    let store = StoreWriter::new(
        Arc::new(SqliteStore::from_settings(&settings.store)?),
        RetryPolicy::from_settings(&settings.store),
    );

    let registry_files = RegistryFiles::from_settings(&settings.registry);
    let keypair_files = KeyPairFiles::from_settings(&settings.cert);
    let registry = Arc::new(Registry::new(registry_files.read().await?));
    let keys = Arc::new(KeyStore::new(keypair_files.read().await?));

    let bus = Arc::new(LocalBus::new());
    let reconciler = Reconciler::new(bus.clone(), Arc::new(StoreHandler::new(store.clone())));
    let reloader = Arc::new(Reloader::new(registry.clone(), keys.clone(), reconciler, registry_files, keypair_files));

    let report = reloader.start().await;
    log::info!("store topics subscribed: {:?}", report.subscribed);
    if !report.is_ok() {
        log::warn!("store topic subscribe failures: {:?}", report.failures);
    }

    let watcher = Watcher::new(reloader.clone(), settings.registry.watch_interval).spawn();

    let scx = ServerContext::builder(registry, keys, store).token_ttl(settings.token.ttl).bus(bus).build();

    let (tx, rx) = oneshot::channel();
    let http = tokio::spawn(mqstore_http::listen_and_serve(scx, settings.http.laddr, settings.http.tls, rx));

    tokio::select! {
        res = http => {
            watcher.abort();
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
            let _ = tx.send(());
            watcher.abort();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
    Ok(())
}
