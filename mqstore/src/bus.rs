//! Event bus seam
//!
//! The core subscribes store-topic patterns and publishes HTTP-submitted values through
//! [`EventBus`]. [`LocalBus`] is the in-process implementation: it keeps one handler per
//! topic filter and fans each published message out to every matching filter.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::MqstoreError;
use crate::topic::TopicFilter;
use crate::Result;

type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

#[async_trait]
pub trait MessageHandler: Sync + Send {
    async fn handle(&self, topic: &str, payload: &Bytes) -> Result<()>;
}

#[async_trait]
pub trait EventBus: Sync + Send {
    async fn subscribe(&self, filter: &str, handler: Arc<dyn MessageHandler>) -> std::result::Result<(), MqstoreError>;

    async fn unsubscribe(&self, filter: &str) -> std::result::Result<(), MqstoreError>;

    /// Returns the number of handlers the message was delivered to
    async fn publish(&self, topic: &str, payload: Bytes) -> std::result::Result<usize, MqstoreError>;
}

struct Subscription {
    filter: TopicFilter,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
pub struct LocalBus {
    subs: DashMap<String, Subscription>,
}

impl LocalBus {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn filters(&self) -> Vec<String> {
        let mut filters = self.subs.iter().map(|e| e.key().clone()).collect::<Vec<_>>();
        filters.sort();
        filters
    }

    #[inline]
    pub fn is_subscribed(&self, filter: &str) -> bool {
        self.subs.contains_key(filter)
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn subscribe(&self, filter: &str, handler: Arc<dyn MessageHandler>) -> std::result::Result<(), MqstoreError> {
        let parsed = filter.parse::<TopicFilter>().map_err(|e| MqstoreError::Bus(e.to_string()))?;
        match self.subs.entry(filter.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(MqstoreError::Bus(format!("`{}` is already subscribed", filter)))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Subscription { filter: parsed, handler });
                log::debug!("subscribed {}", filter);
                Ok(())
            }
        }
    }

    async fn unsubscribe(&self, filter: &str) -> std::result::Result<(), MqstoreError> {
        match self.subs.remove(filter) {
            Some(_) => {
                log::debug!("unsubscribed {}", filter);
                Ok(())
            }
            None => Err(MqstoreError::Bus(format!("`{}` is not subscribed", filter))),
        }
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> std::result::Result<usize, MqstoreError> {
        //Handlers are cloned out first so no map shard stays locked across an await.
        let handlers = self
            .subs
            .iter()
            .filter(|e| e.value().filter.matches_str(topic))
            .map(|e| e.value().handler.clone())
            .collect::<Vec<_>>();

        let mut delivered = 0;
        for handler in handlers {
            match handler.handle(topic, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!("deliver message failure, topic: {}, {:?}", topic, e),
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub(crate) struct Recorder(pub(crate) Mutex<Vec<(String, Bytes)>>);

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, topic: &str, payload: &Bytes) -> Result<()> {
            self.0.lock().push((topic.to_owned(), payload.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_matching_filters() {
        let bus = LocalBus::new();
        let exact = Arc::new(Recorder::default());
        let wild = Arc::new(Recorder::default());
        bus.subscribe("boiler1/temp", exact.clone()).await.unwrap();
        bus.subscribe("boiler1/#", wild.clone()).await.unwrap();

        assert_eq!(bus.publish("boiler1/temp", Bytes::from_static(b"21.5")).await.unwrap(), 2);
        assert_eq!(bus.publish("boiler1/pressure", Bytes::from_static(b"1.2")).await.unwrap(), 1);
        assert_eq!(bus.publish("boiler2/temp", Bytes::from_static(b"0")).await.unwrap(), 0);

        assert_eq!(exact.0.lock().len(), 1);
        assert_eq!(wild.0.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let bus = LocalBus::new();
        let h = Arc::new(Recorder::default());
        bus.subscribe("a/x", h.clone()).await.unwrap();
        assert!(bus.subscribe("a/x", h.clone()).await.is_err());
        assert!(bus.subscribe("a/#/x", h.clone()).await.is_err());
        assert_eq!(bus.filters(), vec!["a/x"]);
        bus.unsubscribe("a/x").await.unwrap();
        assert!(bus.unsubscribe("a/x").await.is_err());
        assert_eq!(bus.publish("a/x", Bytes::new()).await.unwrap(), 0);
    }
}
