//! Blocking response handles for asynchronous requests.

use crate::error::{Result, SyncError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Create a connected promise/future pair.
pub(crate) fn response_channel<T>() -> (Promise<T>, ResponseFuture<T>) {
    let (sender, receiver) = bounded(1);
    (Promise { sender }, ResponseFuture { receiver })
}

/// Completion side of a pending request. Consumed on resolution; dropping
/// it unresolved fails the paired future with [`SyncError::Terminated`].
pub(crate) struct Promise<T> {
    sender: Sender<Result<T>>,
}

impl<T> Promise<T> {
    /// Resolve the paired future. A caller that already gave up is fine;
    /// the result is discarded.
    pub(crate) fn complete(self, result: Result<T>) {
        let _ = self.sender.try_send(result);
    }
}

/// Caller-side handle to the eventual answer of a request.
///
/// Resolves exactly once. Callers must not assume same-thread completion:
/// the result arrives from the resource's worker thread.
pub struct ResponseFuture<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> ResponseFuture<T> {
    /// Block until the result arrives.
    pub fn wait(&self) -> Result<T> {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => Err(SyncError::Terminated),
        }
    }

    /// Non-blocking poll. `None` while the request is still in flight.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SyncError::Terminated)),
        }
    }

    /// Block until the result arrives or `timeout` elapses. On timeout the
    /// in-flight operation may still complete; its result is discarded.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SyncError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SyncError::Terminated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_then_wait() {
        let (promise, future) = response_channel::<u32>();
        promise.complete(Ok(7));
        assert_eq!(future.wait(), Ok(7));
    }

    #[test]
    fn test_try_wait_pending() {
        let (promise, future) = response_channel::<u32>();
        assert!(future.try_wait().is_none());
        promise.complete(Ok(1));
        assert_eq!(future.try_wait(), Some(Ok(1)));
    }

    #[test]
    fn test_dropped_promise_terminates() {
        let (promise, future) = response_channel::<u32>();
        drop(promise);
        assert_eq!(future.wait(), Err(SyncError::Terminated));
    }

    #[test]
    fn test_wait_timeout() {
        let (_promise, future) = response_channel::<u32>();
        assert_eq!(
            future.wait_timeout(Duration::from_millis(10)),
            Err(SyncError::Timeout)
        );
    }

    #[test]
    fn test_discarded_result_is_ok() {
        let (promise, future) = response_channel::<u32>();
        drop(future);
        promise.complete(Ok(3));
    }
}
