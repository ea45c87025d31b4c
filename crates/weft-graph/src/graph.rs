//! The graph facade: one store, one watch registry, one commit worker.
//!
//! [`Graph`] is a cheap-to-clone handle. Mutators run synchronously on the
//! caller's thread and may be called from any number of threads at once.
//! Commits are asynchronous: [`Graph::request_commit`] enqueues and returns
//! immediately, [`Graph::commit`] awaits the outcome.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use weft_graph::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(MemorySink::new());
//! let graph = Graph::open(GraphConfig::named("demo").with_id_seed(1), sink.clone()).await?;
//!
//! let e = graph.create("T")?;
//! graph.set(&e, "P", 111)?;
//! graph.add_tag(&e, "G")?;
//!
//! let report = graph.commit().await?;
//! assert_eq!(report.inserted, 1);
//! let id = e.id().expect("assigned at commit");
//! assert_eq!(sink.get(&id).and_then(|r| r.get("P").cloned()), Some(Value::Integer(111)));
//!
//! graph.close().await;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use weft_store::entity::{Entity, EntityRecord};
use weft_store::error::StoreResult;
use weft_store::store::EntityStore;
use weft_store::value::Value;
use weft_watch::delegate::WatchDelegate;
use weft_watch::filter::WatchFilter;
use weft_watch::registry::{Subscription, WatchRegistry};

use crate::config::GraphConfig;
use crate::coordinator::{CommitReport, CommitResult, CommitWorker, Completion, Message};
use crate::error::{CommitError, GraphError, GraphResult};
use crate::ids::IdGenerator;
use crate::sink::DurableSink;

struct GraphInner {
    config: GraphConfig,
    store: EntityStore,
    registry: WatchRegistry,
    sender: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    history: Arc<Mutex<VecDeque<CommitReport>>>,
}

/// Handle to an open object graph. Clones share the same graph.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    /// Open a graph over `sink`.
    ///
    /// Persisted records are loaded through the sink and materialized as
    /// `Persisted` entities before the commit worker is spawned on the
    /// current tokio runtime. Commit sequence numbers continue from the last
    /// one the sink persisted.
    pub async fn open(config: GraphConfig, sink: Arc<dyn DurableSink>) -> GraphResult<Self> {
        let runtime = Handle::try_current().map_err(|_| GraphError::NoRuntime)?;
        config.validate()?;

        let store = EntityStore::new();
        let persisted = sink.load().await?;
        let loaded = store.load(persisted.records)?;

        let registry = WatchRegistry::new();
        let history = Arc::new(Mutex::new(VecDeque::new()));
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = CommitWorker {
            name: config.name.clone(),
            store: store.clone(),
            registry: registry.clone(),
            sink,
            ids: IdGenerator::new(config.id_seed, persisted.sequence),
            sequence: persisted.sequence,
            history: history.clone(),
            history_len: config.history_len,
        };
        runtime.spawn(worker.run(receiver));

        info!(
            graph = %config.name,
            loaded = loaded.len(),
            sequence = persisted.sequence,
            "graph opened"
        );
        Ok(Self {
            inner: Arc::new(GraphInner {
                config,
                store,
                registry,
                sender,
                closed: AtomicBool::new(false),
                history,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// The underlying store, for callers that want its full surface.
    pub fn store(&self) -> &EntityStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.inner.registry
    }

    // -- entity surface -----------------------------------------------------

    pub fn create(&self, entity_type: &str) -> StoreResult<Entity> {
        self.inner.store.create(entity_type)
    }

    pub fn set(
        &self,
        entity: &Entity,
        name: &str,
        value: impl Into<Value>,
    ) -> StoreResult<Option<Value>> {
        self.inner.store.set(entity, name, value)
    }

    pub fn set_json(
        &self,
        entity: &Entity,
        name: &str,
        json: serde_json::Value,
    ) -> StoreResult<Option<Value>> {
        self.inner.store.set_json(entity, name, json)
    }

    pub fn remove(&self, entity: &Entity, name: &str) -> StoreResult<Option<Value>> {
        self.inner.store.remove(entity, name)
    }

    pub fn add_tag(&self, entity: &Entity, tag: &str) -> StoreResult<bool> {
        self.inner.store.add_tag(entity, tag)
    }

    pub fn remove_tag(&self, entity: &Entity, tag: &str) -> StoreResult<bool> {
        self.inner.store.remove_tag(entity, tag)
    }

    pub fn delete(&self, entity: &Entity) -> StoreResult<()> {
        self.inner.store.delete(entity)
    }

    /// Live handle of a persisted entity.
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.inner.store.entity(id)
    }

    /// Last committed image of a persisted entity.
    pub fn committed(&self, id: &str) -> Option<EntityRecord> {
        self.inner.store.committed(id)
    }

    pub fn pending_entities(&self) -> usize {
        self.inner.store.pending_entities()
    }

    // -- commits ------------------------------------------------------------

    /// Enqueue a commit. Never blocks; `completion` runs exactly once, on
    /// the commit worker, after the outcome is known and every watcher has
    /// been notified.
    pub fn request_commit(&self, completion: impl FnOnce(CommitResult) + Send + 'static) {
        let completion: Completion = Box::new(completion);
        if self.inner.closed.load(Ordering::Acquire) {
            completion(Err(CommitError::Closed));
            return;
        }
        if let Err(mpsc::error::SendError(message)) =
            self.inner.sender.send(Message::Commit(completion))
        {
            if let Message::Commit(completion) = message {
                completion(Err(CommitError::Closed));
            }
        }
    }

    /// Commit and wait for the outcome.
    pub async fn commit(&self) -> CommitResult {
        let (tx, rx) = oneshot::channel();
        self.request_commit(move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(CommitError::WorkerStopped))
    }

    /// The most recent commit reports, oldest first.
    pub fn history(&self) -> Vec<CommitReport> {
        self.inner.history.lock().iter().cloned().collect()
    }

    // -- subscriptions ------------------------------------------------------

    /// Register a paused, unbound subscription.
    pub fn subscribe(&self, filter: WatchFilter) -> Subscription {
        self.inner.registry.subscribe(filter)
    }

    /// Subscribe, bind `delegate` and activate in one step.
    pub fn watch(&self, filter: WatchFilter, delegate: WatchDelegate) -> Subscription {
        let subscription = self.subscribe(filter);
        subscription.bind(delegate);
        subscription.activate();
        subscription
    }

    // -- lifecycle ----------------------------------------------------------

    /// Finish every commit already requested, then stop the worker. Later
    /// requests complete with [`CommitError::Closed`]. Closing twice is a
    /// no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (ack, done) = oneshot::channel();
        if self.inner.sender.send(Message::Close(ack)).is_ok() {
            let _ = done.await;
        }
        debug!(graph = %self.inner.config.name, "graph closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.inner.config.name)
            .field("store", &self.inner.store)
            .field("registry", &self.inner.registry)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use weft_store::error::ErrorKind;

    use super::*;
    use crate::sink::MemorySink;

    async fn open(sink: &Arc<MemorySink>) -> Graph {
        Graph::open(GraphConfig::named("unit").with_id_seed(9), sink.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_commit_skips_sink() {
        let sink = Arc::new(MemorySink::new());
        let graph = open(&sink).await;
        let report = graph.commit().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.sequence, 0);
        assert_eq!(sink.transactions(), 0);
        assert!(graph.history().is_empty());
    }

    #[tokio::test]
    async fn ephemeral_entity_never_reaches_sink() {
        let sink = Arc::new(MemorySink::new());
        let graph = open(&sink).await;
        let e = graph.create("T").unwrap();
        graph.set(&e, "P", 1).unwrap();
        graph.delete(&e).unwrap();

        let report = graph.commit().await.unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(report.events, 0);
        assert_eq!(report.sequence, 0);
        assert_eq!(sink.transactions(), 0);
        assert!(graph.history().is_empty());
        assert!(e.id().is_none());
        assert_eq!(e.state(), weft_store::entity::LifecycleState::Deleted);
    }

    #[tokio::test]
    async fn history_is_a_rolling_window() {
        let sink = Arc::new(MemorySink::new());
        let graph = Graph::open(GraphConfig::named("h").with_history_len(2), sink.clone())
            .await
            .unwrap();
        let e = graph.create("T").unwrap();
        for i in 0..4 {
            graph.set(&e, "P", i).unwrap();
            graph.commit().await.unwrap();
        }
        let seqs: Vec<u64> = graph.history().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[tokio::test]
    async fn requests_after_close_fail_fast() {
        let sink = Arc::new(MemorySink::new());
        let graph = open(&sink).await;
        graph.close().await;
        graph.close().await;
        let err = graph.commit().await.unwrap_err();
        assert_eq!(err, CommitError::Closed);
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn open_outside_runtime_fails() {
        let sink: Arc<dyn DurableSink> = Arc::new(MemorySink::new());
        let fut = Graph::open(GraphConfig::default(), sink);
        // Poll with a bare executor: no tokio context is entered.
        let err = poll_once(fut).unwrap_err();
        assert!(matches!(err, GraphError::NoRuntime));
    }

    /// Poll a future once with a no-op waker, outside any runtime.
    fn poll_once<F: std::future::Future>(fut: F) -> F::Output {
        use std::task::{Context, Poll, Wake, Waker};

        struct Noop;
        impl Wake for Noop {
            fn wake(self: Arc<Self>) {}
        }

        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);
        let mut fut = std::pin::pin!(fut);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => out,
            Poll::Pending => panic!("future did not complete on first poll"),
        }
    }
}
