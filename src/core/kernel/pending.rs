use crate::core::errors::ExchangeError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// In-flight requests multiplexed over one socket, keyed by request id.
///
/// Each entry is a single-use channel. The [`PendingGuard`] returned by
/// [`PendingRequests::register`] removes its entry when dropped, so the map
/// never outlives the caller whether it got a reply, timed out or was
/// cancelled.
#[derive(Debug)]
pub struct PendingRequests<T> {
    inner: Mutex<HashMap<u64, oneshot::Sender<T>>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`. A second registration for the same id
    /// replaces the first, whose receiver then resolves as closed.
    pub fn register(&self, id: u64) -> PendingGuard<'_, T> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        PendingGuard {
            pending: self,
            id,
            rx: Some(rx),
        }
    }

    /// Hand a reply to the waiter registered for `id`.
    ///
    /// Returns `false` when nobody is waiting, the caller then treats the
    /// frame as an ordinary event.
    pub fn deliver(&self, id: u64, value: T) -> bool {
        let sender = self.inner.lock().remove(&id);
        match sender {
            Some(tx) => {
                // receiver may have timed out between lookup and send
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every waiter; their calls fail with `StreamClosed`.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    fn remove(&self, id: u64) {
        self.inner.lock().remove(&id);
    }
}

/// Handle for one in-flight request, see [`PendingRequests::register`].
#[derive(Debug)]
pub struct PendingGuard<'a, T> {
    pending: &'a PendingRequests<T>,
    id: u64,
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> PendingGuard<'_, T> {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply, bounded by `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<T, ExchangeError> {
        let Some(rx) = self.rx.take() else {
            return Err(ExchangeError::StreamClosed);
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ExchangeError::StreamClosed),
            Err(_) => Err(ExchangeError::ResponseTimeout {
                id: self.id,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl<T> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
