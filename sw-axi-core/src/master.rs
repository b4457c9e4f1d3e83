//! Handles through which local code initiates bus transactions.

use crate::error::{Error, Result};
use crate::queue::PendingQueue;
use crate::transaction::{Buffer, Transaction, TransactionType};
use log::trace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A unit of work for the outbound worker.
pub(crate) enum WorkItem {
    /// A request from a local master, to be stamped with a correlation id and tracked.
    Request { txn: Transaction, waiter: Waiter },
    /// The answer of a local slave, sent as-is.
    Response(Transaction),
    /// A local master is done issuing requests.
    Terminate(u64),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::Request { txn, .. } => write!(f, "Request({txn})"),
            WorkItem::Response(txn) => write!(f, "Response({txn})"),
            WorkItem::Terminate(id) => write!(f, "Terminate({id})"),
        }
    }
}

/// The party waiting for the response to an outstanding request.
pub(crate) enum Waiter {
    Read {
        buffer: Buffer,
        done: oneshot::Sender<Result<Buffer>>,
    },
    Write {
        done: oneshot::Sender<Result<()>>,
    },
}

impl Waiter {
    /// Resolve with the outcome carried by `response`.
    ///
    /// A failed response leaves the read buffer untouched. A read response carrying more bytes
    /// than were requested is truncated to the buffer's length.
    pub(crate) fn complete(self, response: &Transaction) {
        if !response.ok {
            self.fail(Error::Response(response.message.clone()));
            return;
        }
        if response.txn_type != self.expects() {
            let message = format!("expected {}, got {}", self.expects(), response.txn_type);
            self.fail(Error::Response(message));
            return;
        }
        match self {
            Waiter::Read { mut buffer, done } => {
                let len = buffer.data.len().min(response.data.len());
                buffer.data[..len].copy_from_slice(&response.data[..len]);
                // The master may have stopped waiting; nobody to tell then.
                let _ = done.send(Ok(buffer));
            }
            Waiter::Write { done } => {
                let _ = done.send(Ok(()));
            }
        }
    }

    pub(crate) fn fail(self, error: Error) {
        match self {
            Waiter::Read { done, .. } => {
                let _ = done.send(Err(error));
            }
            Waiter::Write { done } => {
                let _ = done.send(Err(error));
            }
        }
    }

    fn expects(&self) -> TransactionType {
        match self {
            Waiter::Read { .. } => TransactionType::ReadResp,
            Waiter::Write { .. } => TransactionType::WriteResp,
        }
    }
}

/// Resolves exactly once with the outcome of a request.
///
/// If the bridge goes away before the request is answered, the completion resolves with
/// [`Error::SessionClosed`].
#[must_use = "dropping a completion discards the outcome of the request"]
pub struct Completion<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T> Completion<T> {
    fn new() -> (oneshot::Sender<Result<T>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Block until the request completes.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(Error::SessionClosed))
    }

    /// Block until the request completes or `timeout` elapses.
    ///
    /// On timeout the completion is handed back so it can be waited on again.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<T>, Self> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(oneshot::RecvTimeoutError::Timeout) => Err(self),
            Err(oneshot::RecvTimeoutError::Disconnected) => Ok(Err(Error::SessionClosed)),
        }
    }

    /// Take the outcome if the request already completed, or get the completion back.
    pub fn try_wait(self) -> Result<Result<T>, Self> {
        match self.receiver.try_recv() {
            Ok(result) => Ok(result),
            Err(oneshot::TryRecvError::Empty) => Err(self),
            Err(oneshot::TryRecvError::Disconnected) => Ok(Err(Error::SessionClosed)),
        }
    }
}

/// A software master registered with the router.
///
/// Requests are queued for the bridge's outbound worker and return immediately; the returned
/// [`Completion`] resolves once the response arrives. Cloning yields another handle to the
/// same master, and handles may be used from any thread.
#[derive(Clone)]
pub struct Master {
    id: u64,
    queue: Arc<PendingQueue<WorkItem>>,
}

impl fmt::Debug for Master {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Master")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Master {
    pub(crate) fn new(id: u64, queue: Arc<PendingQueue<WorkItem>>) -> Self {
        Self { id, queue }
    }

    /// Router-assigned id of this master.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read `buffer.len()` bytes at `buffer.address`.
    ///
    /// The completion yields the buffer back, filled with the bytes read.
    pub fn read(&self, buffer: Buffer) -> Completion<Buffer> {
        let txn = Transaction::read_request(self.id, buffer.address, buffer.len() as u64);
        let (done, completion) = Completion::new();
        self.enqueue(txn, Waiter::Read { buffer, done });
        completion
    }

    /// Write the bytes of `buffer` to `buffer.address`.
    pub fn write(&self, buffer: &Buffer) -> Completion<()> {
        let txn = Transaction::write_request(self.id, buffer.address, buffer.data.clone());
        let (done, completion) = Completion::new();
        self.enqueue(txn, Waiter::Write { done });
        completion
    }

    /// Tell the router this master won't issue any more requests.
    pub fn terminate(&self) {
        trace!("Terminating master {}", self.id);
        // A closed queue means the session is gone, which terminates the master anyway.
        let _ = self.queue.push(WorkItem::Terminate(self.id));
    }

    fn enqueue(&self, txn: Transaction, waiter: Waiter) {
        trace!("Master {} queueing {txn}", self.id);
        if let Err(WorkItem::Request { waiter, .. }) =
            self.queue.push(WorkItem::Request { txn, waiter })
        {
            waiter.fail(Error::SessionClosed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn master() -> (Master, Arc<PendingQueue<WorkItem>>) {
        let queue = Arc::new(PendingQueue::new());
        (Master::new(4, queue.clone()), queue)
    }

    fn pop_request(queue: &PendingQueue<WorkItem>) -> (Transaction, Waiter) {
        match queue.pop() {
            Some(WorkItem::Request { txn, waiter }) => (txn, waiter),
            Some(other) => panic!("expected a request, got {other}"),
            None => panic!("queue ended"),
        }
    }

    #[test]
    fn read_completes_with_response_data() {
        let (master, queue) = master();
        let completion = master.read(Buffer::zeroed(0x1000, 4));

        let (txn, waiter) = pop_request(&queue);
        assert_eq!(TransactionType::ReadReq, txn.txn_type);
        assert_eq!((4, 0x1000, 4), (txn.initiator, txn.address, txn.size));
        assert_eq!(TransactionType::ReadResp, waiter.expects());

        let completion = completion.try_wait().unwrap_err();
        waiter.complete(&txn.respond(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(vec![1, 2, 3, 4], completion.wait().unwrap().data);
    }

    #[test]
    fn short_read_response_fills_a_prefix() {
        let (master, queue) = master();
        let completion = master.read(Buffer::new(0x10, vec![9; 4]));
        let (txn, waiter) = pop_request(&queue);
        waiter.complete(&txn.respond(vec![1, 2]));
        assert_eq!(vec![1, 2, 9, 9], completion.wait().unwrap().data);
    }

    #[test]
    fn failed_response_reports_message() {
        let (master, queue) = master();
        let completion = master.write(&Buffer::new(0x20, b"hi".to_vec()));

        let (txn, waiter) = pop_request(&queue);
        assert_eq!(TransactionType::WriteReq, txn.txn_type);
        assert_eq!(b"hi".to_vec(), txn.data);

        waiter.complete(&txn.respond_err("Slave operation failed"));
        match completion.wait() {
            Err(Error::Response(message)) => assert_eq!("Slave operation failed", message),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn mismatched_response_type_fails() {
        let (master, queue) = master();
        let completion = master.read(Buffer::zeroed(0, 2));
        let (txn, waiter) = pop_request(&queue);
        let mut response = txn.respond(vec![1, 2]);
        response.txn_type = TransactionType::WriteResp;
        waiter.complete(&response);
        assert!(matches!(completion.wait(), Err(Error::Response(_))));
    }

    #[test]
    fn dropped_waiter_closes_session() {
        let (master, queue) = master();
        let completion = master.write(&Buffer::new(0, vec![0]));
        drop(pop_request(&queue));
        assert!(matches!(completion.wait(), Err(Error::SessionClosed)));
    }

    #[test]
    fn closed_queue_fails_immediately() {
        let (master, queue) = master();
        queue.close();
        let completion = master.read(Buffer::zeroed(0, 1));
        assert!(matches!(
            completion.try_wait(),
            Ok(Err(Error::SessionClosed))
        ));
        master.terminate();
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_timeout_hands_completion_back() {
        let (master, queue) = master();
        let completion = master.write(&Buffer::new(0, vec![1]));
        let completion = completion
            .wait_timeout(Duration::from_millis(10))
            .unwrap_err();

        let responder = thread::spawn(move || {
            let (txn, waiter) = pop_request(&queue);
            waiter.complete(&txn.respond(Vec::new()));
        });
        assert!(completion
            .wait_timeout(Duration::from_secs(5))
            .unwrap()
            .is_ok());
        responder.join().unwrap();
    }

    #[test]
    fn terminate_is_queued_after_requests() {
        let (master, queue) = master();
        let clone = master.clone();
        let _completion = clone.write(&Buffer::new(0, vec![1]));
        master.terminate();
        assert!(matches!(queue.pop(), Some(WorkItem::Request { .. })));
        assert!(matches!(queue.pop(), Some(WorkItem::Terminate(4))));
        assert_eq!(4, clone.id());
    }
}
