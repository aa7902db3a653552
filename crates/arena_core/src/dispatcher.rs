//! Event sequencing and delivery.
//!
//! The [`Dispatcher`] wraps an [`EventSink`] and stamps every event with a
//! `seq` and an `event_id` at the moment the sink accepts it. There is one
//! dispatcher, and so one seq counter, per simulation run.

use std::collections::BTreeMap;

use crate::error::{ArenaError, Result, SinkError};
use crate::events::{to_ndjson_line, CombatEvent, EventPayload};
use crate::math::{Fixed, SimTime};

/// First sequence number handed out in a run.
pub const FIRST_SEQ: u64 = 1;

/// Consumer of delivered events.
///
/// Returning an error aborts the simulation run; the event's seq is not
/// consumed.
pub trait EventSink {
    /// Accept one sequenced event.
    ///
    /// # Errors
    ///
    /// Any error refuses the event.
    fn deliver(&mut self, event: &CombatEvent) -> std::result::Result<(), SinkError>;
}

impl<F> EventSink for F
where
    F: FnMut(&CombatEvent) -> std::result::Result<(), SinkError>,
{
    fn deliver(&mut self, event: &CombatEvent) -> std::result::Result<(), SinkError> {
        self(event)
    }
}

/// Sink that keeps every delivered event in memory.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<CombatEvent>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered events in seq order.
    #[must_use]
    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Take the delivered events.
    #[must_use]
    pub fn into_events(self) -> Vec<CombatEvent> {
        self.events
    }

    /// Number of delivered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Encode the log as NDJSON lines.
    ///
    /// # Errors
    ///
    /// Returns an error if an event cannot be encoded.
    pub fn to_ndjson_lines(&self) -> Result<Vec<String>> {
        self.events.iter().map(to_ndjson_line).collect()
    }
}

impl EventSink for EventLog {
    fn deliver(&mut self, event: &CombatEvent) -> std::result::Result<(), SinkError> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Build the event id for `seq` in run `run_id`.
#[must_use]
pub fn event_id(run_id: u64, seq: u64) -> String {
    format!("{run_id:016x}-{seq:08}")
}

// ============================================================================
// Timed queue
// ============================================================================

/// Items keyed by time; ties keep insertion order.
#[derive(Debug, Clone)]
pub struct TimedQueue<T> {
    entries: BTreeMap<(i64, u64), T>,
    inserted: u64,
}

impl<T> Default for TimedQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            inserted: 0,
        }
    }
}

impl<T> TimedQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `item` for time `at`.
    pub fn push(&mut self, at: SimTime, item: T) {
        self.entries.insert((at.to_bits(), self.inserted), item);
        self.inserted += 1;
    }

    /// Earliest item due at or before `now`, without removing it.
    #[must_use]
    pub fn peek_due(&self, now: SimTime) -> Option<(SimTime, &T)> {
        self.entries
            .first_key_value()
            .filter(|((at, _), _)| *at <= now.to_bits())
            .map(|((at, _), item)| (Fixed::from_bits(*at), item))
    }

    /// Remove and return the earliest item due at or before `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Option<(SimTime, T)> {
        let (&(at, _), _) = self.entries.first_key_value()?;
        if at > now.to_bits() {
            return None;
        }
        self.entries
            .pop_first()
            .map(|((at, _), item)| (Fixed::from_bits(at), item))
    }

    /// Time of the earliest queued item.
    #[must_use]
    pub fn next_time(&self) -> Option<SimTime> {
        self.entries
            .first_key_value()
            .map(|((at, _), _)| Fixed::from_bits(*at))
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every queued item.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Sequencing wrapper around an [`EventSink`].
#[derive(Debug)]
pub struct Dispatcher<S> {
    sink: S,
    run_id: u64,
    next_seq: u64,
    scheduled: TimedQueue<CombatEvent>,
}

impl<S: EventSink> Dispatcher<S> {
    /// Create a dispatcher for one run.
    pub fn new(sink: S, run_id: u64) -> Self {
        Self {
            sink,
            run_id,
            next_seq: FIRST_SEQ,
            scheduled: TimedQueue::new(),
        }
    }

    /// Stamp and deliver an event now, returning its seq.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Delivery`] if the sink refuses the event. The
    /// seq counter is left untouched.
    pub fn deliver(&mut self, mut event: CombatEvent) -> Result<u64> {
        let seq = self.next_seq;
        event.seq = Some(seq);
        event.event_id = event_id(self.run_id, seq);

        match self.sink.deliver(&event) {
            Ok(()) => {
                self.next_seq += 1;
                tracing::trace!(
                    seq,
                    event_type = event.event_type(),
                    timestamp = %event.timestamp,
                    "Delivered event"
                );
                Ok(seq)
            }
            Err(source) => {
                tracing::warn!(seq, event_type = event.event_type(), error = %source, "Event sink rejected event");
                Err(ArenaError::Delivery {
                    seq,
                    event_type: event.event_type(),
                    source,
                })
            }
        }
    }

    /// Build and deliver an event now.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::deliver`].
    pub fn emit(&mut self, timestamp: SimTime, payload: EventPayload) -> Result<u64> {
        self.deliver(CombatEvent::new(timestamp, payload))
    }

    /// Queue an event for delivery at its timestamp.
    pub fn enqueue_scheduled(&mut self, event: CombatEvent) {
        self.scheduled.push(event.timestamp, event);
    }

    /// Deliver the event now if its timestamp is not in the future,
    /// otherwise queue it. Returns the seq when delivered.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::deliver`].
    pub fn schedule_or_deliver(&mut self, now: SimTime, event: CombatEvent) -> Result<Option<u64>> {
        if event.timestamp <= now {
            self.deliver(event).map(Some)
        } else {
            self.enqueue_scheduled(event);
            Ok(None)
        }
    }

    /// Deliver every queued event due at or before `now`, earliest first,
    /// insertion order on ties. Returns how many were delivered.
    ///
    /// # Errors
    ///
    /// Stops at the first refused event, which stays queued.
    pub fn deliver_scheduled(&mut self, now: SimTime) -> Result<usize> {
        let mut delivered = 0;
        while let Some((_, event)) = self.scheduled.peek_due(now) {
            let event = event.clone();
            self.deliver(event)?;
            self.scheduled.pop_due(now);
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Number of queued events.
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    /// Drop queued events that will never be delivered.
    pub fn discard_scheduled(&mut self) -> usize {
        let dropped = self.scheduled.len();
        self.scheduled.clear();
        dropped
    }

    /// Seq of the last delivered event.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        (self.next_seq > FIRST_SEQ).then(|| self.next_seq - 1)
    }

    /// Run identifier used in event ids.
    #[must_use]
    pub const fn run_id(&self) -> u64 {
        self.run_id
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwrap the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
