//! Capacity-bounded, id-ordered event log.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::{ChattyError, Result};
use crate::event::Event;

/// Retained events, oldest first. Pruned with hysteresis: nothing is dropped
/// until the log exceeds `max_events`, then it is cut back to `prune_events`.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<Arc<Event>>,
    max_events: usize,
    prune_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize, prune_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events,
            prune_events,
        }
    }

    /// Append and prune if needed. Returns how many old events were dropped.
    pub fn append(&mut self, event: Arc<Event>) -> usize {
        debug_assert!(
            self.events
                .back()
                .map_or(true, |last| last.event_id < event.event_id),
            "events must be appended in id order"
        );
        self.events.push_back(event);
        if self.events.len() > self.max_events {
            let excess = self.events.len() - self.prune_events;
            self.events.drain(..excess);
            excess
        } else {
            0
        }
    }

    /// All retained events newer than `last_event_id`, oldest first.
    ///
    /// A positive bookmark older than the oldest retained event can no longer be
    /// answered as a delta and fails with [`ChattyError::TooManyEvents`].
    pub fn poll(&self, last_event_id: u64) -> Result<Vec<Arc<Event>>> {
        let Some(oldest) = self.oldest_id() else {
            return Ok(Vec::new());
        };
        if last_event_id > 0 && last_event_id < oldest {
            return Err(ChattyError::TooManyEvents {
                requested: last_event_id,
                oldest,
            });
        }
        let start = self.events.partition_point(|e| e.event_id <= last_event_id);
        Ok(self.events.range(start..).cloned().collect())
    }

    pub fn oldest_id(&self) -> Option<u64> {
        self.events.front().map(|e| e.event_id)
    }

    pub fn newest_id(&self) -> Option<u64> {
        self.events.back().map(|e| e.event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;

    fn msg(id: u64) -> Arc<Event> {
        Arc::new(Event::new(
            id,
            EventData::ServerMessage {
                message: format!("m{id}"),
            },
        ))
    }

    fn filled(max: usize, prune: usize, count: u64) -> EventLog {
        let mut log = EventLog::new(max, prune);
        for id in 1..=count {
            log.append(msg(id));
        }
        log
    }

    #[test]
    fn empty_log_polls_empty_for_any_bookmark() {
        let log = EventLog::new(10, 5);
        assert!(log.poll(0).unwrap().is_empty());
        assert!(log.poll(12345).unwrap().is_empty());
    }

    #[test]
    fn prunes_only_past_the_high_watermark() {
        let mut log = filled(10, 6, 10);
        assert_eq!(log.len(), 10);
        assert_eq!(log.append(msg(11)), 5);
        assert_eq!(log.len(), 6);
        assert_eq!(log.oldest_id(), Some(6));
        assert_eq!(log.newest_id(), Some(11));
        // Next insert stays below the bound, no pruning.
        assert_eq!(log.append(msg(12)), 0);
        assert_eq!(log.len(), 7);
    }

    #[test]
    fn poll_returns_strictly_newer_events_in_order() {
        let log = filled(100, 50, 5);
        let ids: Vec<u64> = log.poll(2).unwrap().iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert!(log.poll(5).unwrap().is_empty());
        assert_eq!(log.poll(0).unwrap().len(), 5);
        // Idempotent without intervening appends.
        let again: Vec<u64> = log.poll(2).unwrap().iter().map(|e| e.event_id).collect();
        assert_eq!(again, ids);
    }

    #[test]
    fn stale_bookmark_requires_resync() {
        // 1..=10000 with a 10000/1000 window leaves 9001..=10000 after the last prune.
        let log = filled(9_999, 1_000, 10_000);
        assert_eq!(log.oldest_id(), Some(9_001));

        let err = log.poll(500).unwrap_err();
        assert!(matches!(
            err,
            ChattyError::TooManyEvents {
                requested: 500,
                oldest: 9_001
            }
        ));
        let events = log.poll(9_001).unwrap();
        assert_eq!(events.len(), 999);
        assert_eq!(events[0].event_id, 9_002);
        // Bookmark 0 means "everything you have".
        assert_eq!(log.poll(0).unwrap().len(), 1_000);
    }
}
