//! Blocking inbound queue and cooperative cancellation.

use ledgerbft_messages::ConsensusMessage;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "continue" flag checked between batches.
///
/// Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Ask the owner to stop after its current batch.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Re-arm the flag for a new run.
    pub fn restart(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO queue of inbound consensus messages for one validator.
#[derive(Debug, Default)]
pub struct Inbox {
    messages: Mutex<VecDeque<ConsensusMessage>>,
    available: Condvar,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message and wake the waiting worker.
    pub fn push(&self, message: ConsensusMessage) {
        self.messages.lock().push_back(message);
        self.available.notify_one();
    }

    /// Block until at least one message is queued or `flag` is cleared, then
    /// take everything queued.
    ///
    /// Returns an empty batch only when the flag was cleared.
    pub fn wait_drain(&self, flag: &RunFlag) -> Vec<ConsensusMessage> {
        let mut messages = self.messages.lock();
        while messages.is_empty() && flag.is_running() {
            self.available.wait(&mut messages);
        }
        messages.drain(..).collect()
    }

    /// Take everything queued without blocking.
    pub fn try_drain(&self) -> Vec<ConsensusMessage> {
        self.messages.lock().drain(..).collect()
    }

    /// Wake all waiters so they re-check their run flag.
    ///
    /// Takes the queue lock first so a waiter between its predicate check and
    /// its wait cannot miss the notification.
    pub fn interrupt(&self) {
        let _guard = self.messages.lock();
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbft_messages::MessageType;
    use ledgerbft_types::{BlockBuilder, BlockHeight, Hash, ValidatorId};
    use std::thread;
    use std::time::Duration;

    fn message(sender: u64) -> ConsensusMessage {
        let block = BlockBuilder::new(BlockHeight(1), Hash::ZERO).finalize();
        ConsensusMessage::new(MessageType::Echo, block, ValidatorId(sender), 1)
    }

    #[test]
    fn test_drain_preserves_order() {
        let inbox = Inbox::new();
        for i in 0..3 {
            inbox.push(message(i));
        }
        let batch = inbox.try_drain();
        let senders: Vec<u64> = batch.iter().map(|m| m.sender_id.0).collect();
        assert_eq!(senders, vec![0, 1, 2]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_wait_wakes_on_push() {
        let inbox = Arc::new(Inbox::new());
        let flag = RunFlag::new();

        let waiter = {
            let inbox = Arc::clone(&inbox);
            let flag = flag.clone();
            thread::spawn(move || inbox.wait_drain(&flag))
        };

        thread::sleep(Duration::from_millis(20));
        inbox.push(message(7));

        let batch = waiter.join().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].sender_id, ValidatorId(7));
    }

    #[test]
    fn test_stop_wakes_waiter() {
        let inbox = Arc::new(Inbox::new());
        let flag = RunFlag::new();

        let waiter = {
            let inbox = Arc::clone(&inbox);
            let flag = flag.clone();
            thread::spawn(move || inbox.wait_drain(&flag))
        };

        thread::sleep(Duration::from_millis(20));
        flag.stop();
        inbox.interrupt();

        assert!(waiter.join().unwrap().is_empty());
        assert!(!flag.is_running());
    }

    #[test]
    fn test_queued_messages_returned_even_when_stopped() {
        let inbox = Inbox::new();
        let flag = RunFlag::new();
        inbox.push(message(1));
        flag.stop();
        assert_eq!(inbox.wait_drain(&flag).len(), 1);
    }
}
