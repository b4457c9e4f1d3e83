use crossbeam_channel::{Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A blocking multi-producer queue with an explicit end.
///
/// Once [`finish`](Self::finish) has been called, [`push`](Self::push) hands items straight back
/// to the producer, and [`pop`](Self::pop) keeps handing out the items that are still queued and
/// then returns `None` instead of blocking.
///
/// When the consumer goes away for good it [`close`](Self::close)s the queue, taking whatever is
/// left.
#[derive(Debug)]
pub struct PendingQueue<T> {
    /// `None` once finished. Dropping the only sender is what ends the channel.
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    fn sender(&self) -> MutexGuard<'_, Option<Sender<T>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`, waking a waiting consumer.
    ///
    /// Fails, returning the item, if the queue has been finished.
    pub fn push(&self, item: T) -> Result<(), T> {
        match self.sender().as_ref() {
            Some(sender) => sender.send(item).map_err(|e| e.into_inner()),
            None => Err(item),
        }
    }

    /// Take the item at the front, waiting for one to arrive if necessary.
    ///
    /// Returns `None` once the queue is finished and empty.
    pub fn pop(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Refuse further pushes and wake every waiting consumer once the queue runs dry. Cannot be
    /// undone.
    pub fn finish(&self) {
        self.sender().take();
    }

    pub fn is_finished(&self) -> bool {
        self.sender().is_none()
    }

    /// Finish the queue and return everything still queued.
    pub fn close(&self) -> Vec<T> {
        self.finish();
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
