use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::actor::port::Event;

/// Coalesces drain requests: however often `trigger` is called, at most one
/// `Process` event is waiting in the inbox at a time.
///
/// Because the event goes through the same inbox as incoming messages, a
/// `<cancel>` that arrives between two drains is always seen before the next
/// queued task runs.
pub struct ThrottledInvoker {
    tx: Sender<Event>,
    triggered: AtomicBool,
}

impl ThrottledInvoker {
    pub fn new(tx: Sender<Event>) -> Self {
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.tx.send(Event::Process).is_err() {
            log::debug!("drain trigger after the context closed");
        }
    }

    /// Called by the loop when the `Process` event is taken off the inbox.
    pub fn acknowledge(&self) {
        self.triggered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_coalesced_until_acknowledged() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let invoker = ThrottledInvoker::new(tx);

        invoker.trigger();
        invoker.trigger();
        assert_eq!(rx.try_iter().count(), 1);

        invoker.acknowledge();
        invoker.trigger();
        assert_eq!(rx.try_iter().count(), 1);
    }
}
