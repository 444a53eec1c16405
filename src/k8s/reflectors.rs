use std::fmt::Debug;
use std::future;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::{
    runtime::{
        reflector::{self, store::Writer, Store},
        watcher, WatchStreamExt,
    },
    Api,
};
use serde::de::DeserializeOwned;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::warn;

use super::error::K8sError;
use crate::api::agent::Agent;
use crate::api::card::AgentCard;
use crate::api::registry::AgentRegistry;

/// Watch-fed read caches shared by the reconciler and the HTTP facade.
///
/// All cluster reads go through these stores to avoid hammering the API
/// server, writes go directly to the API. The view is the one process-wide
/// singleton, its lifecycle is bound to the process.
#[derive(Clone)]
pub struct ClusterView {
    pub registries: Store<AgentRegistry>,
    pub agents: Store<Agent>,
    pub services: Store<Service>,
    pub namespaces: Store<Namespace>,
    pub cards: Store<AgentCard>,
}

/// A reflector whose watch loop runs on a background task owned by this
/// struct. Dropping it aborts the watch.
pub struct SpawnedReflector<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    reader: Store<K>,
    writer_task: AbortHandle,
}

impl<K> SpawnedReflector<K>
where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    /// Starts watching the provided api and waits for the initial listing to
    /// land in the store before returning.
    pub async fn start(api: Api<K>, wc: watcher::Config) -> Result<Self, K8sError> {
        let (reader, writer) = reflector::store();
        let writer_task = Self::start_reflector(writer, api, wc).abort_handle();

        reader.wait_until_ready().await?;

        Ok(SpawnedReflector {
            reader,
            writer_task,
        })
    }

    fn start_reflector(writer: Writer<K>, api: Api<K>, wc: watcher::Config) -> JoinHandle<()> {
        tokio::spawn(async move {
            watcher(api, wc)
                .default_backoff()
                .reflect(writer)
                .touched_objects()
                .for_each(|o| {
                    if let Some(e) = o.err() {
                        warn!("recoverable error watching k8s events: {}", e)
                    }
                    future::ready(())
                })
                .await
        })
    }

    pub fn reader(&self) -> Store<K> {
        self.reader.clone()
    }
}

impl<K> Drop for SpawnedReflector<K>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    fn drop(&mut self) {
        self.writer_task.abort();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::card::AgentCardSpec;
    use kube::runtime::reflector::ObjectRef;
    use tokio::sync::oneshot::{channel, Sender};

    async fn mocked_writer_task(_send: Sender<()>) {
        // _send will be dropped when the task is finished
        loop {
            tokio::time::sleep(tokio::time::Duration::from_micros(10)).await;
        }
    }

    #[tokio::test]
    async fn test_reflector_abort_writer_on_drop() {
        let (reader, _writer) = reflector::store::<AgentCard>();
        let (send, recv) = channel();
        let reflector = SpawnedReflector {
            reader,
            writer_task: tokio::spawn(mocked_writer_task(send)).abort_handle(),
        };
        drop(reflector);
        assert!(recv.await.is_err()); // must get err because the sender is dropped.
    }

    #[tokio::test]
    async fn test_store_with_serves_lookups() {
        let mut card = AgentCard::new(
            "a1",
            AgentCardSpec {
                name: "a1".to_string(),
                ..Default::default()
            },
        );
        card.metadata.namespace = Some("n".to_string());

        let store = testing::store_with(vec![card]);

        assert_eq!(store.state().len(), 1);
        let found = store.get(&ObjectRef::new("a1").within("n")).unwrap();
        assert_eq!(found.spec.name, "a1");
        assert!(store.get(&ObjectRef::new("missing").within("n")).is_none());
    }
}
