//! Message transport between the front context and worker contexts.
//!
//! Every context runs a loop over a crossbeam inbox. An [`Actor`] correlates
//! requests with responses by a random id, lets either side cancel, and on
//! worker contexts queues incoming work behind a throttled drain so that
//! cancel notices can overtake it.

mod cancel;
mod envelope;
mod invoker;
mod port;
mod request;
mod session;
mod transport;

pub use cancel::Cancelable;
pub use envelope::{Envelope, MessageType, RequestId, SessionId};
pub use invoker::ThrottledInvoker;
pub use port::{Event, Fanout, Port, Target};
pub use request::PendingRequest;
pub use session::SessionActor;
pub use transport::{
    Actor, ActorParent, CallOutcome, ContextKind, Done, Incoming, Mailbox, ResponseCallback,
    SendError,
};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock that recovers from a panicked holder instead of propagating the poison.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
