//! In-process publish/subscribe between views.
//!
//! Delivery is synchronous: `publish` runs every handler registered for the
//! event's topic before returning. Handlers are snapshotted first, so a
//! handler may subscribe or unsubscribe (itself included) while running.
//! Subscriptions added during a publish see only later events.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Color scheme preference broadcast to every view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

/// Invalidation channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Tasks,
    Projects,
    Team,
    Recent,
    Search,
    Theme,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::Tasks => "tasks",
            Topic::Projects => "projects",
            Topic::Team => "team",
            Topic::Recent => "recent",
            Topic::Search => "search",
            Topic::Theme => "theme",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TasksChanged,
    ProjectsChanged,
    TeamChanged,
    RecentChanged,
    /// Global search box contents
    Search(String),
    Theme(ThemeMode),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::TasksChanged => Topic::Tasks,
            Event::ProjectsChanged => Topic::Projects,
            Event::TeamChanged => Topic::Team,
            Event::RecentChanged => Topic::Recent,
            Event::Search(_) => Topic::Search,
            Event::Theme(_) => Topic::Theme,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct Notifier {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscriptions", &self.lock().subscriptions.len())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Notifier::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.subscriptions.push(Subscription {
            id,
            topic,
            handler: Arc::new(handler),
        });
        trace!(%topic, ?id, "subscribed");
        id
    }

    /// Returns false if `id` was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.subscriptions.len();
        registry.subscriptions.retain(|s| s.id != id);
        registry.subscriptions.len() != before
    }

    /// Deliver `event` to the current subscribers of its topic, in
    /// subscription order. Returns how many handlers ran.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic();
        let handlers: Vec<Handler> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        trace!(%topic, subscribers = handlers.len(), "publish");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(notifier: &Notifier, topic: Topic) -> (SubscriptionId, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let id = notifier.subscribe(topic, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (id, hits)
    }

    #[test]
    fn delivers_only_to_matching_topic() {
        let bus = Notifier::new();
        let (_, projects) = counter(&bus, Topic::Projects);
        let (_, team) = counter(&bus, Topic::Team);

        assert_eq!(bus.publish(Event::ProjectsChanged), 1);
        assert_eq!(projects.load(Ordering::SeqCst), 1);
        assert_eq!(team.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_fire_in_subscription_order() {
        let bus = Notifier::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe(Topic::Tasks, move |_| order.lock().unwrap().push(n));
        }
        bus.publish(Event::TasksChanged);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribed_handler_stops_receiving() {
        let bus = Notifier::new();
        let (id, hits) = counter(&bus, Topic::Recent);
        bus.publish(Event::RecentChanged);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(Event::RecentChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(Topic::Recent), 0);
    }

    #[test]
    fn late_subscriber_does_not_see_earlier_events() {
        let bus = Notifier::new();
        bus.publish(Event::ProjectsChanged);
        let (_, hits) = counter(&bus, Topic::Projects);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = Notifier::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));
        let id = {
            let bus2 = bus.clone();
            let slot = Arc::clone(&slot);
            let hits = Arc::clone(&hits);
            bus.subscribe(Topic::Search, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock().unwrap() {
                    bus2.unsubscribe(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        bus.publish(Event::Search("x".into()));
        bus.publish(Event::Search("y".into()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_during_publish_applies_to_next_event() {
        let bus = Notifier::new();
        let added = Arc::new(AtomicUsize::new(0));
        {
            let bus2 = bus.clone();
            let added = Arc::clone(&added);
            bus.subscribe(Topic::Theme, move |_| {
                let added = Arc::clone(&added);
                bus2.subscribe(Topic::Theme, move |_| {
                    added.fetch_add(1, Ordering::SeqCst);
                });
            });
        }
        assert_eq!(bus.publish(Event::Theme(ThemeMode::Dark)), 1);
        assert_eq!(added.load(Ordering::SeqCst), 0);
        assert_eq!(bus.publish(Event::Theme(ThemeMode::Light)), 2);
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn payload_reaches_handler() {
        let bus = Notifier::new();
        let got = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&got);
        bus.subscribe(Topic::Search, move |event| {
            if let Event::Search(q) = event {
                *sink.lock().unwrap() = q.clone();
            }
        });
        bus.publish(Event::Search("apollo".into()));
        assert_eq!(*got.lock().unwrap(), "apollo");
    }
}
