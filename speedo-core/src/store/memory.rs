use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;

use super::{ChangeEvent, ChangeKind, Namespace, Store, StoreError, Subscription};

/// A Send + Sync in-process [Store].
///
/// Clones share the same data. Subscribers are notified while the write lock
/// is held, so every subscriber sees writes to a key in the order they
/// happened.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    maps: IndexMap<Namespace, IndexMap<String, Vec<u8>>>,
    subscribers: IndexMap<Namespace, Vec<flume::Sender<ChangeEvent>>>,
}

impl MemoryStoreInner {
    /// Send the event to all subscribers, dropping those which are gone
    fn publish(&mut self, event: ChangeEvent) {
        if let Some(subscribers) = self.subscribers.get_mut(&event.namespace) {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone all entries of a namespace
    pub async fn entries(&self, namespace: Namespace) -> IndexMap<String, Vec<u8>> {
        self.inner
            .lock()
            .await
            .maps
            .get(&namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of live subscriptions to a namespace
    pub async fn subscribers(&self, namespace: Namespace) -> usize {
        let mut guard = self.inner.lock().await;
        match guard.subscribers.get_mut(&namespace) {
            Some(subs) => {
                subs.retain(|tx| !tx.is_disconnected());
                subs.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, namespace: Namespace, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        let prev = guard
            .maps
            .entry(namespace)
            .or_default()
            .insert(key.to_owned(), value.clone());
        let kind = match prev {
            Some(_) => ChangeKind::Updated,
            None => ChangeKind::Added,
        };
        guard.publish(ChangeEvent {
            namespace,
            key: key.to_owned(),
            value,
            kind,
        });
        Ok(())
    }

    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .maps
            .get(&namespace)
            .and_then(|m| m.get(key))
            .cloned())
    }

    async fn subscribe(&self, namespace: Namespace) -> Result<Subscription, StoreError> {
        let (tx, rx) = flume::unbounded();
        self.inner
            .lock()
            .await
            .subscribers
            .entry(namespace)
            .or_default()
            .push(tx);
        Ok(Subscription::new(namespace, rx))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::store::StoreExt;
    use crate::types::SpeedObservation;

    fn is_send_sync<T: Send + Sync>(_: T) {}

    #[test]
    fn test_is_send_sync() {
        is_send_sync(MemoryStore::new());
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryStore::new();
        assert!(store.get(Namespace::Speed, "neil").await.unwrap().is_none());
        store
            .put(Namespace::Speed, "neil", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(
            store.get(Namespace::Speed, "neil").await.unwrap(),
            Some(vec![1, 2, 3])
        );
        // namespaces are separate maps
        assert!(store
            .get(Namespace::Position, "neil")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_typed_values() {
        let store = MemoryStore::new();
        let obs = SpeedObservation {
            key: "neil".into(),
            metres_per_second: 1.5,
            at_time: 42,
        };
        store.put_value(Namespace::Speed, "neil", &obs).await.unwrap();
        let read: Option<SpeedObservation> =
            store.get_value(Namespace::Speed, "neil").await.unwrap();
        assert_eq!(read, Some(obs));
    }

    #[tokio::test]
    async fn test_subscription_sees_writes_in_order() {
        let store = MemoryStore::new();
        let sub = store.subscribe(Namespace::Command).await.unwrap();
        store.put(Namespace::Position, "x", vec![0]).await.unwrap();
        store.put(Namespace::Command, "speedo", vec![1]).await.unwrap();
        store.put(Namespace::Command, "speedo", vec![2]).await.unwrap();

        let first = timeout(Duration::from_millis(100), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.key, "speedo");
        assert_eq!(first.value, vec![1]);
        assert_eq!(first.kind, ChangeKind::Added);

        let second = sub.try_next().unwrap();
        assert_eq!(second.value, vec![2]);
        assert_eq!(second.kind, ChangeKind::Updated);
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe(Namespace::Speed).await.unwrap();
        let _other = store.subscribe(Namespace::Speed).await.unwrap();
        assert_eq!(store.subscribers(Namespace::Speed).await, 2);
        drop(sub);
        store.put(Namespace::Speed, "neil", vec![]).await.unwrap();
        assert_eq!(store.subscribers(Namespace::Speed).await, 1);
    }

    #[tokio::test]
    async fn test_decode_error() {
        let store = MemoryStore::new();
        store
            .put(Namespace::Speed, "neil", vec![0xc1])
            .await
            .unwrap();
        let read = store
            .get_value::<SpeedObservation>(Namespace::Speed, "neil")
            .await;
        assert!(matches!(read, Err(StoreError::Decode(_))));
    }
}
