//! The actor: request/response correlation, cancellation and the per-context
//! task queue.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use crate::actor::invoker::ThrottledInvoker;
use crate::actor::port::{Event, Port, Target};
use crate::actor::{lock, Cancelable, Envelope, MessageType, RequestId, SessionId};
use crate::prelude::HashMap;
use crate::{Error, Result, WireError};

/// Completion of a request on the sending side. Invoked at most once, on the
/// sender's own context loop.
pub type ResponseCallback = Box<dyn FnOnce(Result<Value>) + Send>;

/// Which side of the boundary an actor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Owns map state. Incoming messages are handled in-line unless the
    /// sender asked for queuing.
    Coordinator,
    /// Does decode work. Every incoming message is queued so that cancel
    /// notices can overtake queued work.
    Worker,
}

/// A request delivered to an [`ActorParent`].
#[derive(Debug, Clone)]
pub struct Incoming {
    pub method: String,
    pub source_session: Option<SessionId>,
    pub params: Value,
}

/// `Ok` with an optional cancel handle when the method was found, `Err`
/// handing the completion back when it was not.
pub type CallOutcome = std::result::Result<Option<Cancelable>, Done>;

/// The object whose methods an actor invokes for incoming requests.
pub trait ActorParent: Send + Sync {
    fn call(&self, request: Incoming, done: Done) -> CallOutcome;
}

/// A parent without methods; every request is answered with "method not found".
impl ActorParent for () {
    fn call(&self, _request: Incoming, done: Done) -> CallOutcome {
        Err(done)
    }
}

/// A request that never left this context. The callback, if any, is handed
/// back so the caller can route the failure through its own completion path.
pub struct SendError {
    pub error: Error,
    pub callback: Option<ResponseCallback>,
}

impl fmt::Debug for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError")
            .field("error", &self.error)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send failed: {}", self.error)
    }
}

impl From<SendError> for Error {
    fn from(err: SendError) -> Self {
        err.error
    }
}

#[derive(Default)]
struct State {
    callbacks: HashMap<RequestId, ResponseCallback>,
    tasks: HashMap<RequestId, Envelope>,
    task_queue: VecDeque<RequestId>,
    cancel_callbacks: HashMap<RequestId, Cancelable>,
}

struct Inner {
    name: String,
    kind: ContextKind,
    session: Option<SessionId>,
    target: Target,
    inbox_tx: Sender<Event>,
    invoker: ThrottledInvoker,
    state: Mutex<State>,
}

/// One end of the transport between two contexts.
///
/// Cheap to clone; all clones share correlation state. The context loop that
/// feeds it lives in the [`Mailbox`] returned by [`Actor::new`].
#[derive(Clone)]
pub struct Actor {
    inner: Arc<Inner>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("session", &self.inner.session)
            .finish()
    }
}

impl Actor {
    pub fn new(
        name: impl Into<String>,
        port: Port,
        kind: ContextKind,
        session: Option<SessionId>,
    ) -> (Actor, Mailbox) {
        let Port {
            target,
            inbox_tx,
            inbox_rx,
        } = port;
        let actor = Actor {
            inner: Arc::new(Inner {
                name: name.into(),
                kind,
                session,
                target,
                invoker: ThrottledInvoker::new(inbox_tx.clone()),
                inbox_tx,
                state: Mutex::new(State::default()),
            }),
        };
        let mailbox = Mailbox {
            actor: actor.clone(),
            inbox: inbox_rx,
        };
        (actor, mailbox)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    pub fn session(&self) -> Option<SessionId> {
        self.inner.session
    }

    /// Send `method` with `data` to the counterpart.
    ///
    /// `callback` fires at most once, later, on this actor's loop. The
    /// returned handle hides the callback and notifies the counterpart.
    pub fn send<T: Serialize + ?Sized>(
        &self,
        method: &str,
        data: &T,
        callback: Option<ResponseCallback>,
        target_session: Option<SessionId>,
    ) -> std::result::Result<Cancelable, SendError> {
        self.send_with(method, data, callback, target_session, false)
    }

    /// Like [`Actor::send`]; `must_queue` asks a coordinating receiver to
    /// queue the request instead of running it in-line.
    pub fn send_with<T: Serialize + ?Sized>(
        &self,
        method: &str,
        data: &T,
        callback: Option<ResponseCallback>,
        target_session: Option<SessionId>,
        must_queue: bool,
    ) -> std::result::Result<Cancelable, SendError> {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(err) => {
                return Err(SendError {
                    error: err.into(),
                    callback,
                })
            }
        };

        let has_callback = callback.is_some();
        let id = {
            let mut state = lock(&self.inner.state);
            let mut id = RequestId::generate();
            while state.callbacks.contains_key(&id) {
                id = RequestId::generate();
            }
            if let Some(callback) = callback {
                state.callbacks.insert(id.clone(), callback);
            }
            id
        };

        let envelope = Envelope::request(
            id.clone(),
            method,
            data,
            has_callback,
            target_session,
            self.inner.session,
            must_queue,
        );
        if !self.inner.target.post(envelope) {
            let callback = lock(&self.inner.state).callbacks.remove(&id);
            return Err(SendError {
                error: Error::Disconnected(format!("{} has no counterpart", self.inner.name)),
                callback,
            });
        }

        let weak = Arc::downgrade(&self.inner);
        Ok(Cancelable::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let callback = lock(&inner.state).callbacks.remove(&id);
            drop(callback);
            inner
                .target
                .post(Envelope::cancel(id, target_session, inner.session));
        }))
    }

    /// Entry point for every envelope taken off the inbox.
    pub fn receive(&self, envelope: Envelope, parent: &dyn ActorParent) {
        if envelope.id.is_empty() {
            log::debug!("{}: dropping message without id", self.inner.name);
            return;
        }

        if let Some(target) = envelope.target_session_id {
            if self.inner.session != Some(target) {
                return;
            }
        }

        if envelope.message_type == MessageType::Cancel {
            // The id stays in the ordered queue; with its task gone it is
            // skipped when dequeued.
            let cancel = {
                let mut state = lock(&self.inner.state);
                state.tasks.remove(&envelope.id);
                state.cancel_callbacks.remove(&envelope.id)
            };
            if let Some(cancel) = cancel {
                cancel.cancel();
            }
        } else if self.inner.kind == ContextKind::Worker || envelope.must_queue {
            {
                let mut state = lock(&self.inner.state);
                state.task_queue.push_back(envelope.id.clone());
                state.tasks.insert(envelope.id.clone(), envelope);
            }
            self.inner.invoker.trigger();
        } else {
            self.process_task(envelope, parent);
        }
    }

    /// Run one queued task.
    pub fn process(&self, parent: &dyn ActorParent) {
        self.inner.invoker.acknowledge();

        let (task, more) = {
            let mut state = lock(&self.inner.state);
            let Some(id) = state.task_queue.pop_front() else {
                return;
            };
            let task = state.tasks.remove(&id);
            (task, !state.task_queue.is_empty())
        };

        // Next drain goes in before the current task runs, so a task that
        // panics or stalls does not hold up later cancels.
        if more {
            self.inner.invoker.trigger();
        }

        if let Some(task) = task {
            self.process_task(task, parent);
        }
    }

    fn process_task(&self, envelope: Envelope, parent: &dyn ActorParent) {
        let method = match envelope.message_type {
            MessageType::Response => {
                let callback = lock(&self.inner.state).callbacks.remove(&envelope.id);
                // No callback means the request was canceled.
                if let Some(callback) = callback {
                    let result = match envelope.error {
                        Some(err) => Err(Error::from(err)),
                        None => Ok(envelope.data),
                    };
                    callback(result);
                }
                return;
            }
            MessageType::Cancel => return,
            MessageType::Call(method) => method,
        };

        let completed = Arc::new(AtomicBool::new(false));
        let done = Done {
            id: envelope.id.clone(),
            has_callback: envelope.has_callback,
            reply_session: envelope.source_session_id,
            completed: completed.clone(),
            actor: Arc::downgrade(&self.inner),
        };
        let request = Incoming {
            method: method.clone(),
            source_session: envelope.source_session_id,
            params: envelope.data,
        };

        match parent.call(request, done) {
            Ok(Some(cancel)) => {
                let mut state = lock(&self.inner.state);
                if !completed.load(Ordering::Acquire) {
                    state.cancel_callbacks.insert(envelope.id, cancel);
                }
            }
            Ok(None) => {}
            Err(done) => {
                log::warn!("{}: could not find function {}", self.inner.name, method);
                done.fail(Error::MethodNotFound(method));
            }
        }
    }

    /// Run `job` on this actor's loop, behind whatever is already in the
    /// inbox. Returns false, dropping the job unrun, once the loop is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.inner.inbox_tx.send(Event::Run(Box::new(job))).is_ok()
    }

    /// Stop this actor's loop. Outstanding callbacks are dropped unfired.
    pub fn remove(&self) {
        // Handlers may own completions whose drop takes the state lock again.
        let state = std::mem::take(&mut *lock(&self.inner.state));
        drop(state);
        if self.inner.inbox_tx.send(Event::Close).is_err() {
            log::debug!("{}: already stopped", self.inner.name);
        }
    }

    /// Requests still waiting for a response.
    pub fn pending_callbacks(&self) -> usize {
        lock(&self.inner.state).callbacks.len()
    }

    /// Tasks received but not yet run.
    pub fn queued_tasks(&self) -> usize {
        lock(&self.inner.state).tasks.len()
    }

    /// Handlers that can still be interrupted by a `<cancel>`.
    pub fn cancelable_tasks(&self) -> usize {
        lock(&self.inner.state).cancel_callbacks.len()
    }
}

/// Terminal completion of one incoming request.
///
/// Consuming `self` makes a second completion impossible. Finishing clears
/// any cancel handle registered for the request and, when the requester
/// asked for a callback, posts the response back.
pub struct Done {
    id: RequestId,
    has_callback: bool,
    reply_session: Option<SessionId>,
    completed: Arc<AtomicBool>,
    actor: Weak<Inner>,
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("id", &self.id)
            .field("has_callback", &self.has_callback)
            .finish()
    }
}

impl Done {
    pub fn has_callback(&self) -> bool {
        self.has_callback
    }

    pub fn respond(mut self, result: Result<Value>) {
        let Some(inner) = self.actor.upgrade() else {
            log::debug!("completion for {} after its actor was dropped", self.id);
            return;
        };

        let cancel = self.finish(&inner);
        drop(cancel);

        if !self.has_callback {
            return;
        }

        let id = std::mem::take(&mut self.id);
        let result = result.map_err(|err| WireError::from(&err));
        let envelope = Envelope::response(id, self.reply_session, inner.session, result);
        if !inner.target.post(envelope) {
            log::warn!("{}: response has no receiver", inner.name);
        }
    }

    pub fn send<T: Serialize>(self, result: Result<T>) {
        let result = result.and_then(|value| serde_json::to_value(value).map_err(Error::from));
        self.respond(result);
    }

    pub fn ok<T: Serialize>(self, value: T) {
        self.send(Ok(value));
    }

    /// Complete with no error and no data.
    pub fn empty(self) {
        self.respond(Ok(Value::Null));
    }

    pub fn fail(self, err: Error) {
        self.respond(Err(err));
    }

    /// Mark the request completed and hand back its cancel handle, if one was
    /// registered. The handle is dropped by the caller, outside the lock.
    fn finish(&self, inner: &Inner) -> Option<Cancelable> {
        let mut state = lock(&inner.state);
        self.completed.store(true, Ordering::Release);
        state.cancel_callbacks.remove(&self.id)
    }
}

/// A completion dropped unanswered still releases its cancel handle. No
/// response goes out; the requester either canceled or gave up on it.
impl Drop for Done {
    fn drop(&mut self) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        let Some(inner) = self.actor.upgrade() else {
            return;
        };
        if self.finish(&inner).is_some() {
            log::debug!("{}: request {} dropped without a response", inner.name, self.id);
        }
    }
}

/// The receiving half of a context: drains the inbox into its actor.
pub struct Mailbox {
    actor: Actor,
    inbox: Receiver<Event>,
}

impl Mailbox {
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Handle one event. Returns false once the loop should stop.
    pub fn handle(&self, event: Event, parent: &dyn ActorParent) -> bool {
        match event {
            Event::Message(envelope) => self.actor.receive(envelope, parent),
            Event::Process => self.actor.process(parent),
            Event::Run(job) => job(),
            Event::Close => return false,
        }
        true
    }

    /// Block on the inbox until the actor is removed or every sender is gone.
    pub fn run(self, parent: Arc<dyn ActorParent>) {
        log::debug!("{}: context loop started", self.actor.name());
        while let Ok(event) = self.inbox.recv() {
            if !self.handle(event, parent.as_ref()) {
                break;
            }
        }
        log::debug!("{}: context loop stopped", self.actor.name());
    }

    /// Run the loop on a dedicated, named thread.
    pub fn spawn(self, parent: Arc<dyn ActorParent>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(self.actor.name().to_string())
            .spawn(move || self.run(parent))
    }

    /// Handle every event currently in the inbox, including drains scheduled
    /// while doing so. Returns the number of events handled.
    pub fn pump(&self, parent: &dyn ActorParent) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox.try_recv() {
            handled += 1;
            if !self.handle(event, parent) {
                break;
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Echoes `echo`, parks `slow` until canceled, counts calls.
    #[derive(Default)]
    struct TestParent {
        calls: AtomicUsize,
        canceled: Arc<AtomicUsize>,
        parked: Mutex<Vec<Done>>,
    }

    impl ActorParent for TestParent {
        fn call(&self, request: Incoming, done: Done) -> CallOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request.method.as_str() {
                "echo" => {
                    done.respond(Ok(request.params));
                    Ok(None)
                }
                "slow" => {
                    lock(&self.parked).push(done);
                    let canceled = self.canceled.clone();
                    Ok(Some(Cancelable::new(move || {
                        canceled.fetch_add(1, Ordering::SeqCst);
                    })))
                }
                "forget" => {
                    drop(done);
                    Ok(Some(Cancelable::noop()))
                }
                _ => Err(done),
            }
        }
    }

    fn front_and_worker() -> ((Actor, Mailbox), (Actor, Mailbox)) {
        let (a, b) = Port::pair();
        let session = SessionId::generate();
        (
            Actor::new("front", a, ContextKind::Coordinator, Some(session)),
            Actor::new("worker", b, ContextKind::Worker, None),
        )
    }

    fn capture() -> (ResponseCallback, Arc<Mutex<Vec<Result<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            Box::new(move |result| lock(&sink).push(result)),
            seen,
        )
    }

    #[test]
    fn test_round_trip() {
        let ((front, front_box), (_worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, seen) = capture();

        front.send("echo", &json!({"n": 1}), Some(cb), None).unwrap();
        worker_box.pump(&parent);
        front_box.pump(&());

        let seen = lock(&seen);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap(), &json!({"n": 1}));
        assert_eq!(front.pending_callbacks(), 0);
    }

    #[test]
    fn test_callback_is_never_synchronous() {
        let ((front, _front_box), (_worker, _worker_box)) = front_and_worker();
        let (cb, seen) = capture();
        front.send("echo", &1, Some(cb), None).unwrap();
        assert!(lock(&seen).is_empty());
        assert_eq!(front.pending_callbacks(), 1);
    }

    #[test]
    fn test_cancel_before_response_suppresses_callback() {
        let ((front, front_box), (_worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, seen) = capture();

        let handle = front.send("echo", &1, Some(cb), None).unwrap();
        handle.cancel();
        worker_box.pump(&parent);
        front_box.pump(&());

        assert!(lock(&seen).is_empty());
        // The cancel notice overtook the queued task.
        assert_eq!(parent.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_late_response_after_cancel_is_noop() {
        let ((front, front_box), (_worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, seen) = capture();

        let handle = front.send("echo", &1, Some(cb), None).unwrap();
        worker_box.pump(&parent);
        handle.cancel();
        front_box.pump(&());
        handle.cancel();
        worker_box.pump(&parent);

        assert!(lock(&seen).is_empty());
        assert_eq!(parent.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_method_reports_not_found() {
        let ((front, front_box), (_worker, worker_box)) = front_and_worker();
        let (cb, seen) = capture();

        front.send("bogus", &json!({}), Some(cb), None).unwrap();
        worker_box.pump(&TestParent::default());
        front_box.pump(&());

        let seen = lock(&seen);
        match &seen[0] {
            Err(Error::MethodNotFound(method)) => assert_eq!(method, "bogus"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_reaches_running_handler() {
        let ((front, front_box), (worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, seen) = capture();

        let handle = front.send("slow", &(), Some(cb), None).unwrap();
        worker_box.pump(&parent);
        assert_eq!(worker.cancelable_tasks(), 1);

        handle.cancel();
        worker_box.pump(&parent);
        assert_eq!(parent.canceled.load(Ordering::SeqCst), 1);
        assert_eq!(worker.cancelable_tasks(), 0);

        // Completing after the cancel still goes out but lands nowhere.
        let done = lock(&parent.parked).pop().unwrap();
        done.ok(5);
        front_box.pump(&());
        assert!(lock(&seen).is_empty());
    }

    #[test]
    fn test_completion_clears_cancel_handle() {
        let ((front, front_box), (worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, seen) = capture();

        let handle = front.send("slow", &(), Some(cb), None).unwrap();
        worker_box.pump(&parent);
        lock(&parent.parked).pop().unwrap().ok("finished");
        assert_eq!(worker.cancelable_tasks(), 0);

        front_box.pump(&());
        handle.cancel();
        worker_box.pump(&parent);
        assert_eq!(parent.canceled.load(Ordering::SeqCst), 0);
        assert_eq!(lock(&seen).len(), 1);
    }

    #[test]
    fn test_dropped_completion_clears_cancel_handle() {
        let ((front, front_box), (worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, seen) = capture();

        let handle = front.send("slow", &(), Some(cb), None).unwrap();
        worker_box.pump(&parent);
        assert_eq!(worker.cancelable_tasks(), 1);

        drop(lock(&parent.parked).pop());
        assert_eq!(worker.cancelable_tasks(), 0);
        // Nothing is answered for a dropped completion.
        assert_eq!(front_box.pump(&()), 0);
        assert!(lock(&seen).is_empty());
        assert_eq!(front.pending_callbacks(), 1);

        handle.cancel();
        worker_box.pump(&parent);
        assert_eq!(parent.canceled.load(Ordering::SeqCst), 0);
        assert_eq!(front.pending_callbacks(), 0);
    }

    #[test]
    fn test_completion_dropped_during_call_is_not_registered() {
        let ((front, _front_box), (worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let (cb, _seen) = capture();

        front.send("forget", &(), Some(cb), None).unwrap();
        worker_box.pump(&parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 1);
        assert_eq!(worker.cancelable_tasks(), 0);
    }

    #[test]
    fn test_remove_drops_parked_completions() {
        let ((front, _front_box), (worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        front.send("slow", &(), None, None).unwrap();
        worker_box.pump(&parent);
        assert_eq!(worker.cancelable_tasks(), 1);

        worker.remove();
        drop(lock(&parent.parked).pop());
        assert_eq!(worker.cancelable_tasks(), 0);
    }

    #[test]
    fn test_messages_without_id_are_dropped() {
        let ((_front, _front_box), (worker, _worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let mut envelope =
            Envelope::request(RequestId::default(), "echo", json!(1), true, None, None, false);
        worker.receive(envelope.clone(), &parent);
        assert_eq!(worker.queued_tasks(), 0);

        envelope.id = RequestId("x".into());
        worker.receive(envelope, &parent);
        assert_eq!(worker.queued_tasks(), 1);
    }

    #[test]
    fn test_other_session_is_dropped() {
        let ((front, _front_box), (_worker, _worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let foreign = Envelope::request(
            RequestId("a".into()),
            "echo",
            json!(1),
            false,
            Some(SessionId(u64::MAX)),
            None,
            false,
        );
        front.receive(foreign, &parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 0);

        let own = Envelope::request(
            RequestId("b".into()),
            "echo",
            json!(1),
            false,
            front.session(),
            None,
            false,
        );
        front.receive(own, &parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_coordinator_queues_only_when_asked() {
        let (a, _b) = Port::pair();
        let (front, front_box) = Actor::new("front", a, ContextKind::Coordinator, None);
        let parent = TestParent::default();

        let inline = Envelope::request(RequestId("a".into()), "echo", json!(1), false, None, None, false);
        front.receive(inline, &parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 1);

        let queued = Envelope::request(RequestId("b".into()), "echo", json!(1), false, None, None, true);
        front.receive(queued, &parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 1);
        front_box.pump(&parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_queue_is_fifo_and_skips_canceled() {
        let ((front, front_box), (_worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for n in 0..4 {
            let order = order.clone();
            let cb: ResponseCallback = Box::new(move |result: Result<Value>| {
                lock(&order).push(result.unwrap().as_i64().unwrap());
            });
            handles.push(front.send("echo", &n, Some(cb), None).unwrap());
        }
        handles[2].cancel();

        worker_box.pump(&parent);
        front_box.pump(&());
        assert_eq!(*lock(&order), vec![0, 1, 3]);
    }

    #[test]
    fn test_send_without_callback_still_runs() {
        let ((front, front_box), (_worker, worker_box)) = front_and_worker();
        let parent = TestParent::default();
        front.send("echo", &1, None, None).unwrap();
        worker_box.pump(&parent);
        assert_eq!(parent.calls.load(Ordering::SeqCst), 1);
        // No response is posted when nobody is waiting.
        assert_eq!(front_box.pump(&()), 0);
    }

    #[test]
    fn test_send_to_closed_context_returns_callback() {
        let (a, b) = Port::pair();
        let (front, _front_box) = Actor::new("front", a, ContextKind::Coordinator, None);
        drop(b);

        let (cb, _seen) = capture();
        let err = front.send("echo", &1, Some(cb), None).unwrap_err();
        assert!(matches!(err.error, Error::Disconnected(_)));
        assert!(err.callback.is_some());
        assert_eq!(front.pending_callbacks(), 0);
    }

    #[test]
    fn test_unserializable_payload_fails_locally() {
        let ((front, _front_box), (_worker, worker_box)) = front_and_worker();
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");

        let err = front.send("echo", &bad, None, None).unwrap_err();
        assert!(matches!(err.error, Error::Serialization(_)));
        assert_eq!(worker_box.pump(&()), 0);
    }

    #[test]
    fn test_outstanding_ids_are_unique() {
        let ((front, _front_box), (_worker, worker_box)) = front_and_worker();
        for _ in 0..500 {
            let (cb, _) = capture();
            front.send("echo", &(), Some(cb), None).unwrap();
        }
        assert_eq!(front.pending_callbacks(), 500);
        worker_box.pump(&());
    }

    #[test]
    fn test_posted_job_runs_on_the_loop() {
        let ((_front, _front_box), (worker, worker_box)) = front_and_worker();
        let ran = Arc::new(Mutex::new(None));
        let sink = ran.clone();
        let poster = worker.clone();
        std::thread::spawn(move || {
            assert!(poster.post(move || *lock(&sink) = Some(std::thread::current().id())));
        })
        .join()
        .unwrap();

        assert!(lock(&ran).is_none());
        assert_eq!(worker_box.pump(&()), 1);
        assert_eq!(*lock(&ran), Some(std::thread::current().id()));

        drop(worker_box);
        assert!(!worker.post(|| {}));
    }

    #[test]
    fn test_remove_stops_loop() {
        let ((_front, _front_box), (worker, worker_box)) = front_and_worker();
        let handle = worker_box.spawn(Arc::new(())).unwrap();
        worker.remove();
        handle.join().unwrap();
    }
}
