//! Worker contexts, one thread each, shared by every session.

use crossbeam_channel::Sender;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::actor::{Actor, ActorParent, ContextKind, Event, Fanout, Port, SessionId, Target};
use crate::core::config::{RequestCacheConfig, RuntimeOptions, WorkerPoolConfig};
use crate::plugins::WorkerPlugins;
use crate::tiles::dispatcher::{Dispatcher, Link};
use crate::worker::Worker;
use crate::Result;

struct PooledWorker {
    worker: Worker,
    fanout: Fanout,
    inbox: Sender<Event>,
    thread: Option<JoinHandle<()>>,
}

/// A fixed set of worker contexts.
///
/// Each worker answers every connected session; a session reaches the pool
/// through the [`Dispatcher`] returned by [`WorkerPool::connect`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    request_cache: RequestCacheConfig,
    workers: Vec<PooledWorker>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `options.worker_pool.worker_count` workers (at least one).
    pub fn new(options: RuntimeOptions, plugins: WorkerPlugins) -> Result<Self> {
        let RuntimeOptions {
            worker_pool: config,
            request_cache,
        } = options;
        let count = config.worker_count.max(1);

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let fanout = Fanout::new();
            let port = Port::new(Target::Fanout(fanout.clone()));
            let inbox = port.inbox_tx.clone();
            let name = format!("{}-{}", config.thread_name_prefix, index);
            let (actor, mailbox) = Actor::new(name, port, ContextKind::Worker, None);

            let worker = Worker::new(actor, plugins.clone());
            let thread = mailbox.spawn(Arc::new(worker.clone()))?;
            workers.push(PooledWorker {
                worker,
                fanout,
                inbox,
                thread: Some(thread),
            });
        }
        log::debug!("worker pool started with {} workers", count);

        Ok(Self {
            config,
            request_cache,
            workers,
        })
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn worker(&self, index: usize) -> Option<&Worker> {
        self.workers.get(index).map(|pooled| &pooled.worker)
    }

    /// Open a new session: one front actor per worker, each running its own
    /// loop that serves worker requests with `parent`.
    pub fn connect(&self, parent: Arc<dyn ActorParent>) -> Result<Dispatcher> {
        let session = SessionId::generate();
        let mut links = Vec::with_capacity(self.workers.len());
        for (index, pooled) in self.workers.iter().enumerate() {
            let port = Port::new(Target::Direct(pooled.inbox.clone()));
            let key = pooled.fanout.subscribe(port.inbox_tx.clone());
            let name = format!("{}-{}-{}", self.config.thread_name_prefix, session, index);
            let (actor, mailbox) = Actor::new(name, port, ContextKind::Coordinator, Some(session));

            let link = Link {
                actor,
                fanout: pooled.fanout.clone(),
                key,
            };
            if let Err(err) = mailbox.spawn(parent.clone()) {
                // Dropping the dispatcher built so far tears down what started.
                drop(Dispatcher::new(session, links, self.request_cache.clone()));
                link.fanout.unsubscribe(link.key);
                return Err(err.into());
            }
            links.push(link);
        }
        log::debug!("{} connected to {} workers", session, links.len());
        Ok(Dispatcher::new(session, links, self.request_cache.clone()))
    }

    /// Stop every worker and wait for its thread.
    pub fn shutdown(&mut self) {
        for pooled in &self.workers {
            pooled.worker.actor().remove();
        }
        for pooled in &mut self.workers {
            if let Some(thread) = pooled.thread.take() {
                if thread.join().is_err() {
                    log::error!("{} panicked", pooled.worker.actor().name());
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
