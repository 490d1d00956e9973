//! Routes replies to the run waiting for them.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

use crate::messages::{ProcessId, ProtocolMessage};

/// Remembered `(process_id, seq)` pairs, and the limit on queued replies.
const CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the waiting run.
    Delivered,
    /// No run is waiting yet, kept until one does.
    Queued,
    /// Seen before, dropped.
    Duplicate,
    /// Queue full, dropped.
    Dropped,
}

#[derive(Default)]
struct Inner {
    waiters: HashMap<ProcessId, oneshot::Sender<ProtocolMessage>>,
    queued: HashMap<ProcessId, VecDeque<ProtocolMessage>>,
    seen: HashSet<(ProcessId, i32)>,
    seen_order: VecDeque<(ProcessId, i32)>,
}

impl Inner {
    fn num_queued(&self) -> usize {
        self.queued.values().map(VecDeque::len).sum()
    }
}

#[derive(Default)]
pub struct Mailbox {
    inner: Mutex<Inner>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(process_id, seq)`. Returns false if it was seen before.
    pub fn mark_seen(&self, process_id: ProcessId, seq: i32) -> bool {
        Self::mark(&mut self.inner.lock(), process_id, seq)
    }

    fn mark(inner: &mut Inner, process_id: ProcessId, seq: i32) -> bool {
        if !inner.seen.insert((process_id, seq)) {
            return false;
        }
        inner.seen_order.push_back((process_id, seq));
        if inner.seen_order.len() > CAPACITY {
            if let Some(old) = inner.seen_order.pop_front() {
                inner.seen.remove(&old);
            }
        }
        true
    }

    /// Wait for the next message of `process_id`. A message that arrived
    /// earlier is returned right away.
    pub fn wait_for(&self, process_id: ProcessId) -> oneshot::Receiver<ProtocolMessage> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let early = inner.queued.get_mut(&process_id).and_then(VecDeque::pop_front);
        if inner.queued.get(&process_id).map_or(false, VecDeque::is_empty) {
            inner.queued.remove(&process_id);
        }
        match early {
            Some(msg) => {
                // The receiver is still alive.
                let _ = tx.send(msg);
            }
            None => {
                inner.waiters.insert(process_id, tx);
            }
        }
        rx
    }

    /// Stop waiting, e.g. after a timeout.
    pub fn cancel(&self, process_id: &ProcessId) {
        self.inner.lock().waiters.remove(process_id);
    }

    pub fn deliver(&self, msg: ProtocolMessage) -> Delivery {
        let mut inner = self.inner.lock();
        if !Self::mark(&mut inner, msg.process_id, msg.seq) {
            warn!(process_id = %msg.process_id, seq = msg.seq, "dropping duplicate message");
            return Delivery::Duplicate;
        }
        let msg = match inner.waiters.remove(&msg.process_id) {
            Some(waiter) => match waiter.send(msg) {
                Ok(()) => return Delivery::Delivered,
                // The run gave up waiting in the meantime.
                Err(msg) => msg,
            },
            None => msg,
        };
        if inner.num_queued() >= CAPACITY {
            warn!(process_id = %msg.process_id, seq = msg.seq, "reply queue full, dropping message");
            return Delivery::Dropped;
        }
        warn!(process_id = %msg.process_id, seq = msg.seq, "no run waiting, queueing message");
        inner.queued.entry(msg.process_id).or_default().push_back(msg);
        Delivery::Queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::{CustomData, Protocol},
        sig::ExtendedPrivateKey,
    };

    fn msg(pid: u8, seq: i32) -> ProtocolMessage {
        ProtocolMessage {
            protocol: Protocol::Install,
            process_id: ProcessId([pid; 16]),
            seq,
            to_identity_key: ExtendedPrivateKey::from_seed(b"mailbox").unwrap().public_key(),
            params: None,
            custom_data: CustomData::default(),
        }
    }

    #[tokio::test]
    async fn reply_reaches_waiter() {
        let mailbox = Mailbox::new();
        let rx = mailbox.wait_for(ProcessId([1; 16]));
        assert_eq!(mailbox.deliver(msg(1, 1)), Delivery::Delivered);
        assert_eq!(rx.await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn early_reply_is_queued_for_its_run() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.deliver(msg(2, -1)), Delivery::Queued);
        // Another run's waiter does not get it.
        let mut other = mailbox.wait_for(ProcessId([3; 16]));
        assert!(other.try_recv().is_err());

        let rx = mailbox.wait_for(ProcessId([2; 16]));
        assert_eq!(rx.await.unwrap().seq, -1);
    }

    #[test]
    fn duplicates_are_dropped() {
        let mailbox = Mailbox::new();
        assert!(mailbox.mark_seen(ProcessId([4; 16]), 0));
        assert!(!mailbox.mark_seen(ProcessId([4; 16]), 0));
        assert_eq!(mailbox.deliver(msg(4, 1)), Delivery::Queued);
        assert_eq!(mailbox.deliver(msg(4, 1)), Delivery::Duplicate);
    }

    #[test]
    fn cancelled_waiter_leaves_reply_queued() {
        let mailbox = Mailbox::new();
        let rx = mailbox.wait_for(ProcessId([5; 16]));
        mailbox.cancel(&ProcessId([5; 16]));
        drop(rx);
        assert_eq!(mailbox.deliver(msg(5, 1)), Delivery::Queued);
    }
}
