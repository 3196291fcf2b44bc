//! Waiters for pushed `channel_history` replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use uuid::Uuid;

type Pending = HashMap<String, Vec<(String, oneshot::Sender<()>)>>;

#[derive(Clone, Default)]
pub struct HistoryWaiters {
    inner: Arc<Mutex<Pending>>,
}

impl HistoryWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register interest in the next reply for `channel`. Returns the
    /// request id to put on the wire and the receiver to await.
    pub fn register(&self, channel: &str) -> (String, oneshot::Receiver<()>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock()
            .entry(channel.to_string())
            .or_default()
            .push((id.clone(), tx));
        (id, rx)
    }

    /// Wake waiters for `channel`: the one matching `request_id`, or all of
    /// them when the reply carries no id. Returns how many were woken.
    pub fn complete(&self, channel: &str, request_id: Option<&str>) -> usize {
        let mut pending = self.lock();
        let Some(waiters) = pending.get_mut(channel) else {
            return 0;
        };

        let (woken, kept): (Vec<_>, Vec<_>) = waiters
            .drain(..)
            .partition(|(id, _)| request_id.map_or(true, |r| r == id.as_str()));
        *waiters = kept;
        if waiters.is_empty() {
            pending.remove(channel);
        }

        let count = woken.len();
        for (_, tx) in woken {
            let _ = tx.send(());
        }
        count
    }

    /// Forget a waiter that gave up.
    pub fn cancel(&self, channel: &str, request_id: &str) {
        let mut pending = self.lock();
        if let Some(waiters) = pending.get_mut(channel) {
            waiters.retain(|(id, _)| id.as_str() != request_id);
            if waiters.is_empty() {
                pending.remove(channel);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
