//! Front actors of one session, one per pooled worker.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::actor::{lock, Actor, Cancelable, Fanout, ResponseCallback, SessionId};
use crate::core::config::RequestCacheConfig;
use crate::worker::WorkerMethod;
use crate::{Error, Result};

/// Completion of a [`Dispatcher::broadcast`]: every worker's answer, in
/// worker order, or the first error.
pub type BroadcastCallback = Box<dyn FnOnce(Result<Vec<Value>>) + Send>;

pub(crate) struct Link {
    pub actor: Actor,
    pub fanout: Fanout,
    pub key: u64,
}

struct Inner {
    session: SessionId,
    links: Vec<Link>,
    next: AtomicUsize,
    cache: RequestCacheConfig,
    requests_since_check: AtomicUsize,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for link in &self.links {
            link.fanout.unsubscribe(link.key);
            link.actor.remove();
        }
        log::debug!("{}: dispatcher closed", self.session);
    }
}

/// Hands out the session's worker actors.
///
/// Cheap to clone. The front loops stop when the last clone is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("session", &self.inner.session)
            .field("actors", &self.inner.links.len())
            .finish()
    }
}

struct Gather {
    results: Vec<Option<Value>>,
    remaining: usize,
    callback: Option<BroadcastCallback>,
}

impl Gather {
    fn settle(&mut self, index: usize, result: Result<Value>) -> Option<(BroadcastCallback, Result<Vec<Value>>)> {
        let callback = self.callback.take()?;
        match result {
            Err(err) => Some((callback, Err(err))),
            Ok(value) => {
                self.results[index] = Some(value);
                self.remaining -= 1;
                if self.remaining > 0 {
                    self.callback = Some(callback);
                    return None;
                }
                let results = self.results.iter_mut().map(|r| r.take().unwrap_or_default()).collect();
                Some((callback, Ok(results)))
            }
        }
    }
}

impl Dispatcher {
    pub(crate) fn new(session: SessionId, links: Vec<Link>, cache: RequestCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                links,
                next: AtomicUsize::new(0),
                cache,
                requests_since_check: AtomicUsize::new(0),
            }),
        }
    }

    pub fn session(&self) -> SessionId {
        self.inner.session
    }

    pub fn len(&self) -> usize {
        self.inner.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.links.is_empty()
    }

    /// The next actor, round-robin.
    pub fn get_actor(&self) -> Result<Actor> {
        let links = &self.inner.links;
        if links.is_empty() {
            return Err(Error::Disconnected("dispatcher has no workers".to_string()));
        }
        let index = self.inner.next.fetch_add(1, Ordering::Relaxed) % links.len();
        Ok(links[index].actor.clone())
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.inner.links.iter().map(|link| &link.actor)
    }

    /// Send `method` to every worker.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        method: &str,
        data: &T,
        callback: Option<BroadcastCallback>,
    ) -> Vec<Cancelable> {
        let count = self.inner.links.len();
        let Some(callback) = callback else {
            return self
                .actors()
                .filter_map(|actor| match actor.send(method, data, None, None) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        log::warn!("{} to {} not sent: {}", method, actor.name(), err);
                        None
                    }
                })
                .collect();
        };

        if count == 0 {
            callback(Ok(Vec::new()));
            return Vec::new();
        }

        let gather = Arc::new(Mutex::new(Gather {
            results: vec![None; count],
            remaining: count,
            callback: Some(callback),
        }));
        let mut handles = Vec::with_capacity(count);
        for (index, actor) in self.actors().enumerate() {
            let shared = gather.clone();
            let on_response: ResponseCallback = Box::new(move |result| {
                let settled = lock(&shared).settle(index, result);
                if let Some((callback, result)) = settled {
                    callback(result);
                }
            });
            match actor.send(method, data, Some(on_response), None) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    let settled = lock(&gather).settle(index, Err(err.error));
                    if let Some((callback, result)) = settled {
                        callback(result);
                    }
                }
            }
        }
        handles
    }

    /// Count a completed tile request; every `check_threshold` of them the
    /// workers' request cache is trimmed back to `capacity`.
    pub fn cache_entry_possibly_added(&self) {
        let cache = &self.inner.cache;
        if !cache.enabled {
            return;
        }
        let seen = self.inner.requests_since_check.fetch_add(1, Ordering::AcqRel) + 1;
        if seen <= cache.check_threshold {
            return;
        }
        self.inner.requests_since_check.store(0, Ordering::Release);
        match self.get_actor() {
            Ok(actor) => {
                if let Err(err) = actor.send(
                    WorkerMethod::EnforceCacheSizeLimit.name(),
                    &cache.capacity,
                    None,
                    None,
                ) {
                    log::warn!("cache trim not sent: {}", err);
                }
            }
            Err(err) => log::warn!("cache trim not sent: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorParent, CallOutcome, ContextKind, Done, Incoming, Mailbox, Port};
    use serde_json::json;

    /// Answers with its own index; fails `fail`.
    struct Indexed(usize, Mutex<Vec<String>>);

    impl ActorParent for Indexed {
        fn call(&self, request: Incoming, done: Done) -> CallOutcome {
            lock(&self.1).push(request.method.clone());
            match request.method.as_str() {
                "fail" if self.0 == 1 => done.fail(Error::Parse("worker 1 failed".into())),
                _ => done.ok(self.0),
            }
            Ok(None)
        }
    }

    struct Rig {
        dispatcher: Dispatcher,
        fronts: Vec<Mailbox>,
        workers: Vec<(Mailbox, Indexed)>,
    }

    impl Rig {
        fn pump(&self) {
            for (mailbox, parent) in &self.workers {
                mailbox.pump(parent);
            }
            for mailbox in &self.fronts {
                mailbox.pump(&());
            }
        }
    }

    fn rig(count: usize, cache: RequestCacheConfig) -> Rig {
        let session = SessionId::generate();
        let mut links = Vec::new();
        let mut fronts = Vec::new();
        let mut workers = Vec::new();
        for i in 0..count {
            let (a, b) = Port::pair();
            let (actor, front_box) = Actor::new(format!("front-{i}"), a, ContextKind::Coordinator, Some(session));
            let (_, worker_box) = Actor::new(format!("worker-{i}"), b, ContextKind::Worker, None);
            links.push(Link {
                actor,
                fanout: Fanout::new(),
                key: 0,
            });
            fronts.push(front_box);
            workers.push((worker_box, Indexed(i, Mutex::new(Vec::new()))));
        }
        Rig {
            dispatcher: Dispatcher::new(session, links, cache),
            fronts,
            workers,
        }
    }

    fn collect() -> (BroadcastCallback, Arc<Mutex<Option<Result<Vec<Value>>>>>) {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        (Box::new(move |result| *lock(&sink) = Some(result)), seen)
    }

    #[test]
    fn test_round_robin() {
        let rig = rig(3, RequestCacheConfig::default());
        let names: Vec<String> = (0..4)
            .map(|_| rig.dispatcher.get_actor().unwrap().name().to_string())
            .collect();
        assert_eq!(names, ["front-0", "front-1", "front-2", "front-0"]);
    }

    #[test]
    fn test_broadcast_collects_in_worker_order() {
        let rig = rig(3, RequestCacheConfig::default());
        let (cb, seen) = collect();
        rig.dispatcher.broadcast("setImages", &json!([]), Some(cb));
        rig.pump();

        let seen = lock(&seen).take().unwrap().unwrap();
        assert_eq!(seen, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_broadcast_reports_first_error() {
        let rig = rig(3, RequestCacheConfig::default());
        let (cb, seen) = collect();
        rig.dispatcher.broadcast("fail", &(), Some(cb));
        rig.pump();
        assert!(matches!(lock(&seen).take(), Some(Err(_))));
    }

    #[test]
    fn test_empty_broadcast_completes() {
        let dispatcher = Dispatcher::new(SessionId::generate(), Vec::new(), RequestCacheConfig::default());
        let (cb, seen) = collect();
        dispatcher.broadcast("setImages", &json!([]), Some(cb));
        assert_eq!(lock(&seen).take().unwrap().unwrap(), Vec::<Value>::new());
        assert!(dispatcher.get_actor().is_err());
    }

    #[test]
    fn test_cache_trim_after_threshold() {
        let cache = RequestCacheConfig {
            enabled: true,
            capacity: 10,
            check_threshold: 2,
        };
        let rig = rig(1, cache);
        for _ in 0..3 {
            rig.dispatcher.cache_entry_possibly_added();
        }
        rig.pump();
        let calls = lock(&rig.workers[0].1 .1).clone();
        assert_eq!(calls, vec!["enforceCacheSizeLimit".to_string()]);

        rig.dispatcher.cache_entry_possibly_added();
        rig.pump();
        assert_eq!(lock(&rig.workers[0].1 .1).len(), 1);
    }
}
