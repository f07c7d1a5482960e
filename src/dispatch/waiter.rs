//! Pending long-poll requests.
//!
//! Each waiter owns a `oneshot::Sender`; answering it consumes the sender, so a
//! waiter can be resolved at most once. Every resolution path removes the
//! waiter from the set in the same step.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::event::Event;

pub type WaiterReply = oneshot::Receiver<Vec<Arc<Event>>>;

#[derive(Debug)]
struct Waiter {
    expires_at: Instant,
    reply: oneshot::Sender<Vec<Arc<Event>>>,
}

#[derive(Debug, Default)]
pub struct WaiterSet {
    waiters: Vec<Waiter>,
}

impl WaiterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, expires_at: Instant) -> WaiterReply {
        let (reply, rx) = oneshot::channel();
        self.waiters.push(Waiter { expires_at, reply });
        rx
    }

    /// Hand `event` to every waiter and clear the set.
    /// Returns how many callers were still listening.
    pub fn fulfill_all(&mut self, event: &Arc<Event>) -> usize {
        self.waiters
            .drain(..)
            .map(|w| w.reply.send(vec![Arc::clone(event)]).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }

    /// Answer waiters whose deadline is at or before `now` with an empty list.
    pub fn expire(&mut self, now: Instant) -> usize {
        let (expired, live): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|w| w.expires_at <= now);
        self.waiters = live;
        let count = expired.len();
        for waiter in expired {
            let _ = waiter.reply.send(Vec::new());
        }
        count
    }

    /// Answer everyone with an empty list (dispatcher shutdown).
    pub fn release_all(&mut self) -> usize {
        let count = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.reply.send(Vec::new());
        }
        count
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
