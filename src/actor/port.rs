//! Channels between contexts.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::actor::{lock, Envelope};
use crate::prelude::HashMap;

/// Everything a context loop can be woken up for.
pub enum Event {
    /// A message posted by the counterpart.
    Message(Envelope),
    /// Drain one task from the queue.
    Process,
    /// Continue work that finished off this context, e.g. on a network thread.
    Run(Box<dyn FnOnce() + Send>),
    /// Stop the loop.
    Close,
}

/// Where an actor's outbound envelopes go.
#[derive(Clone)]
pub enum Target {
    /// A single counterpart context.
    Direct(Sender<Event>),
    /// Every subscribed context; used by workers serving several sessions.
    Fanout(Fanout),
}

impl Target {
    /// Deliver `envelope`. Returns false when no receiver is left.
    pub fn post(&self, envelope: Envelope) -> bool {
        match self {
            Target::Direct(tx) => tx.send(Event::Message(envelope)).is_ok(),
            Target::Fanout(fanout) => fanout.post(envelope),
        }
    }
}

/// Broadcast channel from one worker to the front actors of every session
/// connected to it.
#[derive(Clone, Default)]
pub struct Fanout {
    subscribers: Arc<Mutex<HashMap<u64, Sender<Event>>>>,
    next_key: Arc<AtomicU64>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, tx: Sender<Event>) -> u64 {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).insert(key, tx);
        key
    }

    pub fn unsubscribe(&self, key: u64) {
        lock(&self.subscribers).remove(&key);
    }

    pub fn len(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn post(&self, envelope: Envelope) -> bool {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|_, tx| tx.send(Event::Message(envelope.clone())).is_ok());
        !subscribers.is_empty()
    }
}

/// One end of a link between two contexts: the outbound target plus this
/// context's own inbox.
pub struct Port {
    pub target: Target,
    pub inbox_tx: Sender<Event>,
    pub inbox_rx: Receiver<Event>,
}

impl Port {
    pub fn new(target: Target) -> Self {
        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
        Self {
            target,
            inbox_tx,
            inbox_rx,
        }
    }

    /// Two ports wired to each other.
    pub fn pair() -> (Port, Port) {
        let (a_tx, a_rx) = crossbeam_channel::unbounded();
        let (b_tx, b_rx) = crossbeam_channel::unbounded();
        let a = Port {
            target: Target::Direct(b_tx.clone()),
            inbox_tx: a_tx.clone(),
            inbox_rx: a_rx,
        };
        let b = Port {
            target: Target::Direct(a_tx),
            inbox_tx: b_tx,
            inbox_rx: b_rx,
        };
        (a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::RequestId;

    #[test]
    fn test_fanout_reaches_every_subscriber() {
        let fanout = Fanout::new();
        let (tx1, rx1) = crossbeam_channel::unbounded();
        let (tx2, rx2) = crossbeam_channel::unbounded();
        fanout.subscribe(tx1);
        let key = fanout.subscribe(tx2);

        let target = Target::Fanout(fanout.clone());
        assert!(target.post(Envelope::cancel(RequestId("a".into()), None, None)));
        assert_eq!(rx1.try_iter().count(), 1);
        assert_eq!(rx2.try_iter().count(), 1);

        fanout.unsubscribe(key);
        target.post(Envelope::cancel(RequestId("b".into()), None, None));
        assert_eq!(rx1.try_iter().count(), 1);
        assert_eq!(rx2.try_iter().count(), 0);
    }

    #[test]
    fn test_fanout_drops_closed_subscribers() {
        let fanout = Fanout::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        fanout.subscribe(tx);
        drop(rx);

        assert!(!Target::Fanout(fanout.clone()).post(Envelope::cancel(
            RequestId("a".into()),
            None,
            None
        )));
        assert!(fanout.is_empty());
    }
}
