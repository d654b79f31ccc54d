#![deny(unsafe_code)]

//! # Overall Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mqstore::bus::LocalBus;
//! use mqstore::keypair::{KeyPair, KeyStore};
//! use mqstore::reconcile::Reconciler;
//! use mqstore::registry::Registry;
//! use mqstore::store::{sqlite::SqliteStore, RetryPolicy, StoreHandler, StoreWriter};
//!
//! #[tokio::main]
//! async fn main() -> mqstore::Result<()> {
//!     let store = StoreWriter::new(
//!         Arc::new(SqliteStore::in_memory()?),
//!         RetryPolicy::new(Duration::from_millis(500), Duration::from_secs(10), 2.0),
//!     );
//!     let bus = Arc::new(LocalBus::new());
//!     let reconciler = Reconciler::new(bus.clone(), Arc::new(StoreHandler::new(store.clone())));
//!     let registry = Arc::new(Registry::default());
//!     let keys = Arc::new(KeyStore::new(KeyPair::load("./cert/key.pem", "./cert/cert.pem").await?));
//!
//!     let scx = mqstore::context::ServerContext::builder(registry, keys, store).bus(bus).build();
//!     let _ = scx.tokens.issue("alice")?;
//!     let _ = reconciler;
//!     Ok(())
//! }
//! ```

/// Registry and access decisions
pub mod acl; // Topic access controller
pub mod auth; // Credential validator
pub mod registry; // Tenants, users, store topics

/// Event bus and its authorization hooks
pub mod bus;
pub mod hook;

/// Persistence
pub mod query; // Time-range query translator
pub mod reconcile; // Store-topic subscription reconciler
pub mod store;

/// Keys and tokens
pub mod keypair;
pub mod token;

pub mod context;
pub mod error;
pub mod logger;
pub mod reload;
pub mod topic;

pub use error::MqstoreError;

pub type Result<T> = anyhow::Result<T>;
