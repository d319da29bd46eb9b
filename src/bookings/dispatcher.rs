//! Version-guarded reduction of booking events.
//!
//! Pure state reduction over the event stream: no network access. Any
//! event whose version is at or below the locally held version is a
//! duplicate or arrived out of order and is discarded, so applying
//! events in any order converges to the in-order result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use crate::bookings::types::{Booking, BookingEventPayload, BookingStatus};
use crate::channel::bus::{ChannelEvent, EventBus};
use crate::channel::events;

/// Subscription target: one booking id or every booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingKey {
    Id(String),
    All,
}

impl BookingKey {
    fn matches(&self, booking_id: &str) -> bool {
        match self {
            BookingKey::Id(id) => id == booking_id,
            BookingKey::All => true,
        }
    }
}

type BookingHandler = Arc<dyn Fn(&Booking) + Send + Sync>;

struct TrackedBooking {
    booking: Booking,
    last_event_at: Instant,
}

struct DispatcherInner {
    bookings: HashMap<String, TrackedBooking>,
    subscribers: Vec<(u64, BookingKey, BookingHandler)>,
    next_id: u64,
    max_tracked: usize,
}

/// Applies channel events to per-booking state and notifies
/// subscribers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BookingEventDispatcher {
    inner: Arc<Mutex<DispatcherInner>>,
}

impl BookingEventDispatcher {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DispatcherInner {
                bookings: HashMap::new(),
                subscribers: Vec::new(),
                next_id: 1,
                max_tracked,
            })),
        }
    }

    /// Route every booking-lifecycle event from `bus` into this
    /// dispatcher. Returns the bus subscriptions for later teardown.
    pub fn attach(&self, bus: &EventBus) -> Vec<crate::channel::SubscriptionId> {
        events::BOOKING_EVENTS
            .iter()
            .map(|name| {
                let dispatcher = self.clone();
                bus.on(name, move |event| dispatcher.handle_event(event))
            })
            .collect()
    }

    /// Apply one channel event.
    pub fn handle_event(&self, event: &ChannelEvent) {
        let payload: BookingEventPayload = match serde_json::from_value(event.data.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping malformed {} payload: {}", event.name, e);
                return;
            }
        };

        if event.name == events::BOOKING_TIMER {
            self.apply_timer(payload.id, payload.deadline);
            return;
        }

        let Some(version) = payload.version else {
            warn!("Dropping {} for {} without version", event.name, payload.id);
            return;
        };
        let status = payload.status.or_else(|| implied_status(&event.name));
        self.apply_versioned(payload.id, version, status, payload.deadline);
    }

    /// Subscribe to state changes for one booking id or all bookings.
    pub fn subscribe<F>(&self, key: BookingKey, handler: F) -> u64
    where
        F: Fn(&Booking) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, key, Arc::new(handler)));
        id
    }

    /// Remove a subscriber. Returns whether one was removed.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _, _)| *sid != id);
        inner.subscribers.len() != before
    }

    /// Current state for a booking, if tracked.
    pub fn get_state(&self, booking_id: &str) -> Option<Booking> {
        self.inner
            .lock()
            .unwrap()
            .bookings
            .get(booking_id)
            .map(|t| t.booking.clone())
    }

    /// Number of bookings currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.inner.lock().unwrap().bookings.len()
    }

    /// Drop all booking state and subscribers (sign-out).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.bookings.clear();
        inner.subscribers.clear();
    }

    fn apply_versioned(
        &self,
        id: String,
        version: u64,
        status: Option<BookingStatus>,
        deadline: Option<i64>,
    ) {
        let (snapshot, handlers) = {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();

            let snapshot = if let Some(tracked) = inner.bookings.get_mut(&id) {
                if version <= tracked.booking.version {
                    debug!(
                        "Discarding stale event for booking {} (v{} <= v{})",
                        id, version, tracked.booking.version
                    );
                    return;
                }
                tracked.booking.version = version;
                if let Some(status) = status {
                    tracked.booking.status = status;
                }
                if deadline.is_some() {
                    tracked.booking.deadline = deadline;
                }
                tracked.last_event_at = now;
                tracked.booking.clone()
            } else {
                evict_if_full(&mut inner);
                let booking = Booking {
                    id: id.clone(),
                    status: status.unwrap_or(BookingStatus::Pending),
                    version,
                    deadline,
                };
                inner.bookings.insert(
                    id.clone(),
                    TrackedBooking {
                        booking: booking.clone(),
                        last_event_at: now,
                    },
                );
                booking
            };

            (snapshot.clone(), matching_handlers(&inner, &snapshot.id))
        };

        for handler in handlers {
            handler(&snapshot);
        }
    }

    /// Countdown update: applied without advancing the version, ignored
    /// once the booking is terminal.
    fn apply_timer(&self, id: String, deadline: Option<i64>) {
        let (snapshot, handlers) = {
            let mut inner = self.inner.lock().unwrap();
            let now = Instant::now();

            let snapshot = if let Some(tracked) = inner.bookings.get_mut(&id) {
                if tracked.booking.status.is_terminal() {
                    debug!("Ignoring timer for terminal booking {}", id);
                    return;
                }
                tracked.booking.deadline = deadline;
                tracked.last_event_at = now;
                tracked.booking.clone()
            } else {
                evict_if_full(&mut inner);
                let booking = Booking {
                    id: id.clone(),
                    status: BookingStatus::Pending,
                    version: 0,
                    deadline,
                };
                inner.bookings.insert(
                    id.clone(),
                    TrackedBooking {
                        booking: booking.clone(),
                        last_event_at: now,
                    },
                );
                booking
            };

            (snapshot.clone(), matching_handlers(&inner, &snapshot.id))
        };

        for handler in handlers {
            handler(&snapshot);
        }
    }
}

fn implied_status(event_name: &str) -> Option<BookingStatus> {
    match event_name {
        events::BOOKING_NEW => Some(BookingStatus::Pending),
        events::BOOKING_ACCEPTED => Some(BookingStatus::Accepted),
        events::BOOKING_REJECTED => Some(BookingStatus::Rejected),
        events::BOOKING_EXPIRED => Some(BookingStatus::Expired),
        events::BOOKING_COMPLETED => Some(BookingStatus::Completed),
        _ => None,
    }
}

fn matching_handlers(inner: &DispatcherInner, booking_id: &str) -> Vec<BookingHandler> {
    inner
        .subscribers
        .iter()
        .filter(|(_, key, _)| key.matches(booking_id))
        .map(|(_, _, handler)| Arc::clone(handler))
        .collect()
}

/// Evict the least-recently-updated booking once the cap is reached.
/// Evicted ids simply re-enter as fresh records on their next event.
fn evict_if_full(inner: &mut DispatcherInner) {
    if inner.bookings.len() < inner.max_tracked {
        return;
    }
    let oldest = inner
        .bookings
        .iter()
        .min_by_key(|(_, tracked)| tracked.last_event_at)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        debug!("Evicting booking {} (tracking cap reached)", id);
        inner.bookings.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(name: &str, json: &str) -> ChannelEvent {
        ChannelEvent::new(name, serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_creates_record_on_first_event() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":1}"#));

        let booking = dispatcher.get_state("b1").unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.version, 1);
    }

    #[test]
    fn test_duplicate_version_discarded() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":1}"#));
        dispatcher.handle_event(&event(
            events::BOOKING_ACCEPTED,
            r#"{"id":"b1","version":1}"#,
        ));

        // Same version: still pending
        assert_eq!(
            dispatcher.get_state("b1").unwrap().status,
            BookingStatus::Pending
        );

        dispatcher.handle_event(&event(
            events::BOOKING_ACCEPTED,
            r#"{"id":"b1","version":2}"#,
        ));
        let booking = dispatcher.get_state("b1").unwrap();
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert_eq!(booking.version, 2);
    }

    #[test]
    fn test_out_of_order_converges() {
        let in_order = BookingEventDispatcher::new(512);
        let reordered = BookingEventDispatcher::new(512);

        let e1 = event(events::BOOKING_NEW, r#"{"id":"b1","version":1}"#);
        let e2 = event(events::BOOKING_ACCEPTED, r#"{"id":"b1","version":2}"#);
        let e3 = event(events::BOOKING_COMPLETED, r#"{"id":"b1","version":3}"#);

        for e in [&e1, &e2, &e3] {
            in_order.handle_event(e);
        }
        for e in [&e3, &e1, &e2] {
            reordered.handle_event(e);
        }

        assert_eq!(in_order.get_state("b1"), reordered.get_state("b1"));
        assert_eq!(
            reordered.get_state("b1").unwrap().status,
            BookingStatus::Completed
        );
    }

    #[test]
    fn test_timer_updates_deadline_without_version() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":4}"#));
        dispatcher.handle_event(&event(
            events::BOOKING_TIMER,
            r#"{"id":"b1","deadline":1700000000}"#,
        ));

        let booking = dispatcher.get_state("b1").unwrap();
        assert_eq!(booking.deadline, Some(1700000000));
        assert_eq!(booking.version, 4);
    }

    #[test]
    fn test_timer_ignored_for_terminal_booking() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(
            events::BOOKING_REJECTED,
            r#"{"id":"b1","version":1}"#,
        ));
        dispatcher.handle_event(&event(
            events::BOOKING_TIMER,
            r#"{"id":"b1","deadline":1700000000}"#,
        ));

        assert_eq!(dispatcher.get_state("b1").unwrap().deadline, None);
    }

    #[test]
    fn test_timer_creates_pending_record() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(
            events::BOOKING_TIMER,
            r#"{"id":"b9","deadline":1700000500}"#,
        ));

        let booking = dispatcher.get_state("b9").unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.version, 0);
        assert_eq!(booking.deadline, Some(1700000500));
    }

    #[test]
    fn test_payment_update_keeps_status() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(
            events::BOOKING_ACCEPTED,
            r#"{"id":"b1","version":1}"#,
        ));
        dispatcher.handle_event(&event(events::PAYMENT_UPDATE, r#"{"id":"b1","version":2}"#));

        let booking = dispatcher.get_state("b1").unwrap();
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert_eq!(booking.version, 2);
    }

    #[test]
    fn test_versioned_event_without_version_dropped() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(events::BOOKING_ACCEPTED, r#"{"id":"b1"}"#));
        assert!(dispatcher.get_state("b1").is_none());
    }

    #[test]
    fn test_malformed_payload_dropped() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&ChannelEvent::new(
            events::BOOKING_NEW,
            serde_json::json!("not an object"),
        ));
        assert_eq!(dispatcher.tracked_count(), 0);
    }

    #[test]
    fn test_subscribers_and_wildcard() {
        let dispatcher = BookingEventDispatcher::new(512);
        let b1_count = Arc::new(AtomicUsize::new(0));
        let all_count = Arc::new(AtomicUsize::new(0));

        let c = b1_count.clone();
        dispatcher.subscribe(BookingKey::Id("b1".to_string()), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = all_count.clone();
        let all_id = dispatcher.subscribe(BookingKey::All, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":1}"#));
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b2","version":1}"#));

        assert_eq!(b1_count.load(Ordering::SeqCst), 1);
        assert_eq!(all_count.load(Ordering::SeqCst), 2);

        assert!(dispatcher.unsubscribe(all_id));
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b3","version":1}"#));
        assert_eq!(all_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_event_does_not_notify() {
        let dispatcher = BookingEventDispatcher::new(512);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        dispatcher.subscribe(BookingKey::All, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":2}"#));
        dispatcher.handle_event(&event(
            events::BOOKING_ACCEPTED,
            r#"{"id":"b1","version":1}"#,
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lru_eviction_at_cap() {
        let dispatcher = BookingEventDispatcher::new(2);
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":1}"#));
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b2","version":1}"#));
        // Touch b1 so b2 becomes the LRU entry
        dispatcher.handle_event(&event(
            events::BOOKING_ACCEPTED,
            r#"{"id":"b1","version":2}"#,
        ));

        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b3","version":1}"#));
        assert_eq!(dispatcher.tracked_count(), 2);
        assert!(dispatcher.get_state("b2").is_none());
        assert!(dispatcher.get_state("b1").is_some());
        assert!(dispatcher.get_state("b3").is_some());
    }

    #[test]
    fn test_clear_wipes_state() {
        let dispatcher = BookingEventDispatcher::new(512);
        dispatcher.handle_event(&event(events::BOOKING_NEW, r#"{"id":"b1","version":1}"#));
        dispatcher.clear();
        assert_eq!(dispatcher.tracked_count(), 0);
        assert!(dispatcher.get_state("b1").is_none());
    }
}
