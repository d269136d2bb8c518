//! Controller manager: watch loops, worker pools, and lifecycle.
//!
//! Registration happens before [`ControllerManager::run`]; the manager
//! opens watch streams, performs the initial relists (populating caches
//! and indexes before any reconcile fires), then spawns one watcher task
//! per kind and a worker pool per controller. Shutdown is a broadcast
//! observed at every suspension point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{ReconcileError, StoreResult};
use crate::domain::meta::Kind;
use crate::domain::models::Object;
use crate::domain::ports::store::{ListOptions, ResourceStore};

use super::cache::KindCache;
use super::index::{IndexSpec, WatchInterest};
use super::queue::WorkQueue;
use super::reconciler::{ReconcileOutcome, Reconciler};

/// Default interval between full relists.
pub const DEFAULT_RELIST_INTERVAL: Duration = Duration::from_secs(300);

/// One controller registration.
pub struct ControllerSpec {
    /// The reconciler; its [`Reconciler::kind`] names the owned kind.
    pub reconciler: Arc<dyn Reconciler>,
    /// Parallel workers draining this controller's queue.
    pub workers: usize,
    /// Cross-kind watches feeding this controller's queue.
    pub watches: Vec<WatchInterest>,
    /// Field indexes this controller relies on.
    pub indexes: Vec<IndexSpec>,
}

/// Owns caches, queues, and controller registrations.
pub struct ControllerManager {
    store: Arc<dyn ResourceStore>,
    relist_interval: Duration,
    caches: RwLock<HashMap<Kind, Arc<KindCache>>>,
    controllers: Mutex<Vec<ControllerSpec>>,
    shutdown: broadcast::Sender<()>,
}

impl ControllerManager {
    /// New manager over a store.
    pub fn new(store: Arc<dyn ResourceStore>, relist_interval: Duration) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            store,
            relist_interval,
            caches: RwLock::new(HashMap::new()),
            controllers: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// The store this manager runs against.
    pub fn store(&self) -> Arc<dyn ResourceStore> {
        self.store.clone()
    }

    /// Get or create the cache for a kind. Mappers and reconcilers
    /// capture the returned handle before `run`.
    pub fn cache_for(&self, kind: Kind) -> Arc<KindCache> {
        if let Some(cache) = self.caches.read().expect("cache map poisoned").get(&kind) {
            return cache.clone();
        }
        let mut caches = self.caches.write().expect("cache map poisoned");
        caches
            .entry(kind)
            .or_insert_with(|| Arc::new(KindCache::new(kind, std::iter::empty())))
            .clone()
    }

    /// Register a controller. Must happen before `run`.
    pub fn register(&self, spec: ControllerSpec) {
        // Indexes and watch sources materialize caches up front so the
        // initial relist populates them before the first reconcile.
        for index in &spec.indexes {
            self.cache_for(index.kind).register_index(&index.path);
        }
        self.cache_for(spec.reconciler.kind());
        for watch in &spec.watches {
            self.cache_for(watch.source_kind);
        }
        self.controllers
            .lock()
            .expect("controller list poisoned")
            .push(spec);
    }

    /// Signal every watcher and worker to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// A sender that triggers shutdown when used.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run all controllers until shutdown. Performs the initial relists
    /// before spawning any worker.
    pub async fn run(&self) -> StoreResult<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let controllers: Vec<ControllerSpec> = {
            let mut guard = self.controllers.lock().expect("controller list poisoned");
            guard.drain(..).collect()
        };

        // Queue per owned kind.
        let mut queues: HashMap<Kind, Arc<WorkQueue>> = HashMap::new();
        for spec in &controllers {
            queues
                .entry(spec.reconciler.kind())
                .or_insert_with(|| Arc::new(WorkQueue::new()));
        }

        // Fan-out table: source kind -> (target queue, mapper).
        let mut fanout: HashMap<Kind, Vec<(Arc<WorkQueue>, WatchInterest)>> = HashMap::new();
        for spec in &controllers {
            let queue = queues[&spec.reconciler.kind()].clone();
            for watch in &spec.watches {
                fanout
                    .entry(watch.source_kind)
                    .or_default()
                    .push((queue.clone(), watch.clone()));
            }
        }

        let watched_kinds: Vec<Kind> = self
            .caches
            .read()
            .expect("cache map poisoned")
            .keys()
            .copied()
            .collect();

        // Open watches first, then relist, so no event gap exists between
        // the list and the stream.
        let mut streams = Vec::new();
        for kind in &watched_kinds {
            let stream = self.store.watch(*kind).await?;
            streams.push((*kind, stream));
        }
        for kind in &watched_kinds {
            let objects = self.store.list(*kind, ListOptions::all()).await?;
            let cache = self.cache_for(*kind);
            let keys = cache.replace_all(objects);
            if let Some(queue) = queues.get(kind) {
                for key in keys {
                    queue.add(key);
                }
            }
        }
        info!(kinds = watched_kinds.len(), "initial relist complete");

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for (kind, stream) in streams {
            let cache = self.cache_for(kind);
            let own_queue = queues.get(&kind).cloned();
            let kind_fanout = fanout.get(&kind).cloned().unwrap_or_default();
            let store = self.store.clone();
            let relist_interval = self.relist_interval;
            let shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(watch_loop(
                kind,
                stream,
                cache,
                own_queue,
                kind_fanout,
                store,
                relist_interval,
                shutdown,
            )));
        }

        for spec in controllers {
            let kind = spec.reconciler.kind();
            let queue = queues[&kind].clone();
            for worker in 0..spec.workers.max(1) {
                let reconciler = spec.reconciler.clone();
                let queue = queue.clone();
                handles.push(tokio::spawn(worker_loop(kind, worker, reconciler, queue)));
            }
        }

        // Wait for shutdown, then stop queues so workers drain out.
        let _ = shutdown_rx.recv().await;
        for queue in queues.values() {
            queue.shut_down();
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("controller manager stopped");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn watch_loop(
    kind: Kind,
    mut stream: crate::domain::ports::store::WatchStream,
    cache: Arc<KindCache>,
    own_queue: Option<Arc<WorkQueue>>,
    fanout: Vec<(Arc<WorkQueue>, WatchInterest)>,
    store: Arc<dyn ResourceStore>,
    relist_interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut relist = tokio::time::interval(relist_interval);
    relist.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    relist.reset();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = stream.next() => {
                match event {
                    Some(event) => {
                        let object = event.object.clone();
                        let key = cache.apply_event(&event);
                        debug!(kind = %kind, key = %key, "watch event");
                        if let Some(queue) = &own_queue {
                            queue.add(key);
                        }
                        dispatch_fanout(&fanout, &object);
                    }
                    None => {
                        // Stream lost; a fresh relist re-enqueues all keys
                        // so no work is silently dropped.
                        warn!(kind = %kind, "watch stream closed, relisting");
                        match store.watch(kind).await {
                            Ok(new_stream) => stream = new_stream,
                            Err(err) => {
                                error!(kind = %kind, error = %err, "re-watch failed");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                                continue;
                            }
                        }
                        relist_now(kind, &store, &cache, own_queue.as_ref()).await;
                    }
                }
            }
            _ = relist.tick() => {
                relist_now(kind, &store, &cache, own_queue.as_ref()).await;
            }
        }
    }
}

fn dispatch_fanout(fanout: &[(Arc<WorkQueue>, WatchInterest)], object: &Object) {
    for (queue, watch) in fanout {
        for key in (watch.mapper)(object) {
            queue.add(key);
        }
    }
}

async fn relist_now(
    kind: Kind,
    store: &Arc<dyn ResourceStore>,
    cache: &Arc<KindCache>,
    own_queue: Option<&Arc<WorkQueue>>,
) {
    match store.list(kind, ListOptions::all()).await {
        Ok(objects) => {
            let keys = cache.replace_all(objects);
            debug!(kind = %kind, keys = keys.len(), "relisted");
            if let Some(queue) = own_queue {
                for key in keys {
                    queue.add(key);
                }
            }
        }
        Err(err) => warn!(kind = %kind, error = %err, "relist failed"),
    }
}

async fn worker_loop(
    kind: Kind,
    worker: usize,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
) {
    debug!(kind = %kind, worker, "worker started");
    while let Some(key) = queue.next().await {
        // The reconcile runs in its own task so panics are recovered at
        // the reconciler boundary and turned into requeues.
        let task_reconciler = reconciler.clone();
        let task_key = key.clone();
        let joined =
            tokio::spawn(async move { task_reconciler.reconcile(&task_key).await }).await;

        let result = match joined {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => Err(ReconcileError::Fatal(format!(
                "reconciler panicked: {join_error}"
            ))),
            Err(_) => {
                queue.done(&key);
                break;
            }
        };

        // The key is still in flight here; the queue parks these
        // re-enqueues (with their schedule) until done() releases it.
        match result {
            Ok(ReconcileOutcome::Done) => {
                queue.forget(&key);
            }
            Ok(ReconcileOutcome::Requeue) => {
                queue.forget(&key);
                queue.add(key.clone());
            }
            Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                queue.forget(&key);
                queue.add_after(key.clone(), delay);
            }
            Err(err) if err.should_backoff() => {
                warn!(kind = %kind, key = %key, error = %err, "reconcile failed, backing off");
                queue.add_rate_limited(key.clone());
            }
            Err(err) => {
                // Invalid input or missing reference: the object will be
                // re-enqueued by a watch/index event when an input changes.
                warn!(kind = %kind, key = %key, error = %err, "reconcile degraded, waiting for input change");
                queue.forget(&key);
            }
        }
        queue.done(&key);
    }
    debug!(kind = %kind, worker, "worker stopped");
}
