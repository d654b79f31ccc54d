//! Keeps live bus subscriptions equal to the configured store-topic set

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bus::{EventBus, MessageHandler};
use crate::error::MqstoreError;
use crate::registry::StoreTopics;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub added: StoreTopics,
    pub removed: StoreTopics,
}

impl Changes {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// `added = new \ old`, `removed = old \ new`
#[inline]
pub fn diff(old: &StoreTopics, new: &StoreTopics) -> Changes {
    Changes {
        added: new.difference(old).cloned().collect(),
        removed: old.difference(new).cloned().collect(),
    }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub failures: Vec<(String, MqstoreError)>,
}

impl ReconcileReport {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies store-topic changes to the bus and remembers which patterns are really
/// subscribed. Each reconcile diffs against that set, so a pattern whose subscribe
/// failed is added again on the next pass and one whose unsubscribe failed is removed
/// again.
pub struct Reconciler {
    bus: Arc<dyn EventBus>,
    handler: Arc<dyn MessageHandler>,
    active: Mutex<StoreTopics>,
}

impl Reconciler {
    #[inline]
    pub fn new(bus: Arc<dyn EventBus>, handler: Arc<dyn MessageHandler>) -> Self {
        Self { bus, handler, active: Mutex::new(StoreTopics::new()) }
    }

    /// Subscribe every added pattern and unsubscribe every removed one. A failing
    /// pattern is logged and recorded, the others are still applied.
    pub async fn apply(&self, changes: &Changes) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for pattern in &changes.removed {
            match self.bus.unsubscribe(pattern).await {
                Ok(()) => {
                    log::info!("store topic unsubscribed, {}", pattern);
                    report.unsubscribed.push(pattern.clone());
                }
                Err(e) => {
                    log::warn!("store topic unsubscribe failure, {}, {}", pattern, e);
                    report.failures.push((pattern.clone(), e));
                }
            }
        }
        for pattern in &changes.added {
            match self.bus.subscribe(pattern, self.handler.clone()).await {
                Ok(()) => {
                    log::info!("store topic subscribed, {}", pattern);
                    report.subscribed.push(pattern.clone());
                }
                Err(e) => {
                    log::warn!("store topic subscribe failure, {}, {}", pattern, e);
                    report.failures.push((pattern.clone(), e));
                }
            }
        }
        report
    }

    /// Bring the live subscriptions to `wanted`
    pub async fn reconcile(&self, wanted: &StoreTopics) -> ReconcileReport {
        let mut active = self.active.lock().await;
        let report = self.apply(&diff(&active, wanted)).await;
        for pattern in &report.unsubscribed {
            active.remove(pattern);
        }
        active.extend(report.subscribed.iter().cloned());
        report
    }

    /// Patterns currently subscribed through this reconciler
    #[inline]
    pub async fn active(&self) -> StoreTopics {
        self.active.lock().await.clone()
    }

    #[inline]
    pub async fn is_synced(&self, wanted: &StoreTopics) -> bool {
        *self.active.lock().await == *wanted
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::bus::tests::Recorder;
    use crate::bus::LocalBus;
    use crate::registry::tests::topics;

    #[test]
    fn test_diff() {
        let changes = diff(&topics(&["a/x", "b/y"]), &topics(&["b/y", "c/z"]));
        assert_eq!(changes.added, topics(&["c/z"]));
        assert_eq!(changes.removed, topics(&["a/x"]));
        assert!(diff(&topics(&["a/x"]), &topics(&["a/x"])).is_empty());
        assert_eq!(diff(&StoreTopics::new(), &topics(&["a/x"])).added, topics(&["a/x"]));
    }

    /// LocalBus that fails the first subscribe of one pattern
    pub(crate) struct FailOnce {
        pub(crate) inner: Arc<LocalBus>,
        pattern: &'static str,
        failed: AtomicBool,
    }

    impl FailOnce {
        pub(crate) fn new(inner: Arc<LocalBus>, pattern: &'static str) -> Self {
            Self { inner, pattern, failed: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl EventBus for FailOnce {
        async fn subscribe(&self, filter: &str, handler: Arc<dyn MessageHandler>) -> Result<(), MqstoreError> {
            if filter == self.pattern && !self.failed.swap(true, Ordering::SeqCst) {
                return Err(MqstoreError::Bus("connection lost".into()));
            }
            self.inner.subscribe(filter, handler).await
        }

        async fn unsubscribe(&self, filter: &str) -> Result<(), MqstoreError> {
            self.inner.unsubscribe(filter).await
        }

        async fn publish(&self, topic: &str, payload: Bytes) -> Result<usize, MqstoreError> {
            self.inner.publish(topic, payload).await
        }
    }

    #[tokio::test]
    async fn test_reconcile_leaves_intersection_untouched() {
        let bus = Arc::new(LocalBus::new());
        let reconciler = Reconciler::new(bus.clone(), Arc::new(Recorder::default()));

        let first = reconciler.reconcile(&topics(&["a/x", "b/y"])).await;
        assert!(first.is_ok());
        assert_eq!(bus.filters(), vec!["a/x", "b/y"]);

        //A resubscription of "b/y" would fail on LocalBus and show up as a failure.
        let report = reconciler.reconcile(&topics(&["b/y", "c/z"])).await;
        assert!(report.is_ok());
        assert_eq!(report.subscribed, vec!["c/z"]);
        assert_eq!(report.unsubscribed, vec!["a/x"]);
        assert_eq!(bus.filters(), vec!["b/y", "c/z"]);
        assert!(reconciler.is_synced(&topics(&["b/y", "c/z"])).await);
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_retried() {
        let bus = Arc::new(FailOnce::new(Arc::new(LocalBus::new()), "c/z"));
        let reconciler = Reconciler::new(bus.clone(), Arc::new(Recorder::default()));
        let wanted = topics(&["a/x", "c/z"]);

        let report = reconciler.reconcile(&wanted).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "c/z");
        assert_eq!(bus.inner.filters(), vec!["a/x"]);
        assert_eq!(reconciler.active().await, topics(&["a/x"]));
        assert!(!reconciler.is_synced(&wanted).await);

        let report = reconciler.reconcile(&wanted).await;
        assert!(report.is_ok());
        assert_eq!(report.subscribed, vec!["c/z"]);
        assert_eq!(bus.inner.filters(), vec!["a/x", "c/z"]);
        assert!(reconciler.is_synced(&wanted).await);
    }

    #[tokio::test]
    async fn test_failed_unsubscribe_stays_active() {
        let bus = Arc::new(LocalBus::new());
        let reconciler = Reconciler::new(bus.clone(), Arc::new(Recorder::default()));
        reconciler.reconcile(&topics(&["a/x"])).await;

        //Removed behind the reconciler's back, so its unsubscribe fails.
        bus.unsubscribe("a/x").await.unwrap();
        let report = reconciler.reconcile(&topics(&["c/z"])).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "a/x");
        assert_eq!(bus.filters(), vec!["c/z"]);
        assert_eq!(reconciler.active().await, topics(&["a/x", "c/z"]));
    }
}
