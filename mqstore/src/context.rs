use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::EventBus;
use crate::hook::AuthHandler;
use crate::keypair::KeyStore;
use crate::registry::Registry;
use crate::store::StoreWriter;
use crate::token::TokenIssuer;

/// Shared handles every request path needs
#[derive(Clone)]
pub struct ServerContext {
    inner: Arc<ServerContextInner>,
}

pub struct ServerContextInner {
    pub registry: Arc<Registry>,
    pub keys: Arc<KeyStore>,
    pub tokens: TokenIssuer,
    pub store: StoreWriter,
    pub auth: AuthHandler,
    pub bus: Option<Arc<dyn EventBus>>,
}

impl Deref for ServerContext {
    type Target = ServerContextInner;
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl ServerContext {
    #[inline]
    pub fn builder(registry: Arc<Registry>, keys: Arc<KeyStore>, store: StoreWriter) -> ServerContextBuilder {
        ServerContextBuilder { registry, keys, store, token_ttl: Duration::from_secs(86400), bus: None }
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ServerContext ...")?;
        Ok(())
    }
}

pub struct ServerContextBuilder {
    registry: Arc<Registry>,
    keys: Arc<KeyStore>,
    store: StoreWriter,
    token_ttl: Duration,
    bus: Option<Arc<dyn EventBus>>,
}

impl ServerContextBuilder {
    #[inline]
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[inline]
    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> ServerContext {
        ServerContext {
            inner: Arc::new(ServerContextInner {
                tokens: TokenIssuer::new(self.keys.clone(), self.token_ttl),
                auth: AuthHandler::new(self.registry.clone()),
                registry: self.registry,
                keys: self.keys,
                store: self.store,
                bus: self.bus,
            }),
        }
    }
}
