//! Mounted per-screen caches.
//!
//! A [`View`] subscribes to the topics its screen cares about and marks
//! itself stale whenever one fires. Refreshes are tagged with a generation:
//! a response that lands after the view unmounted, or after a newer refresh
//! started, is dropped without touching state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::api::ApiError;
use crate::sync::bus::{Event, Notifier, SubscriptionId, Topic};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(Vec<T>),
    /// Missing or expired token; the screen shows a sign-in prompt
    NotAuthenticated,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Unmounted, or superseded by a newer refresh
    Discarded,
}

/// Handle for one in-flight refresh
#[derive(Debug)]
#[must_use]
pub struct RefreshTicket {
    generation: u64,
}

#[derive(Debug, Default)]
struct Shared {
    mounted: AtomicBool,
    stale: AtomicBool,
    invalidations: AtomicU64,
    generation: AtomicU64,
    query: Mutex<String>,
}

pub struct View<T> {
    name: String,
    notifier: Notifier,
    shared: Arc<Shared>,
    subscriptions: Vec<SubscriptionId>,
    state: ViewState<T>,
}

impl<T> View<T> {
    /// Subscribe to `topics` and start out stale so the first
    /// [`View::refresh_if_stale`] loads.
    pub fn mount(name: impl Into<String>, notifier: &Notifier, topics: &[Topic]) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            mounted: AtomicBool::new(true),
            stale: AtomicBool::new(true),
            ..Default::default()
        });
        let subscriptions = topics
            .iter()
            .map(|&topic| {
                let shared = Arc::clone(&shared);
                notifier.subscribe(topic, move |event| on_event(&shared, event))
            })
            .collect();
        debug!(view = %name, ?topics, "mounted");
        View {
            name,
            notifier: notifier.clone(),
            shared,
            subscriptions,
            state: ViewState::Loading,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.mounted.load(Ordering::SeqCst)
    }

    pub fn is_stale(&self) -> bool {
        self.shared.stale.load(Ordering::SeqCst)
    }

    /// Invalidation events received since mount
    pub fn invalidations(&self) -> u64 {
        self.shared.invalidations.load(Ordering::SeqCst)
    }

    /// Latest search text broadcast on [`Topic::Search`]
    pub fn query(&self) -> String {
        self.shared
            .query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> &ViewState<T> {
        &self.state
    }

    /// Loaded items; empty unless the view is `Ready`.
    pub fn items(&self) -> &[T] {
        match &self.state {
            ViewState::Ready(items) => items,
            _ => &[],
        }
    }

    /// Start a refresh. Any earlier ticket is superseded.
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.shared.stale.store(false, Ordering::SeqCst);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RefreshTicket { generation }
    }

    /// Apply a fetch result if its ticket is still current and the view is
    /// still mounted.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<T>, ApiError>,
    ) -> RefreshOutcome {
        let current = self.shared.generation.load(Ordering::SeqCst);
        if !self.is_mounted() || ticket.generation != current {
            debug!(view = %self.name, generation = ticket.generation, "late response dropped");
            return RefreshOutcome::Discarded;
        }
        self.state = match result {
            Ok(items) => ViewState::Ready(items),
            Err(e) if e.is_auth() => ViewState::NotAuthenticated,
            Err(e) => ViewState::Failed(e.to_string()),
        };
        RefreshOutcome::Applied
    }

    pub async fn refresh<F, Fut>(&mut self, fetch: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let ticket = self.begin_refresh();
        let result = fetch().await;
        self.complete_refresh(ticket, result)
    }

    /// Refresh only if an invalidation arrived since the last refresh.
    pub async fn refresh_if_stale<F, Fut>(&mut self, fetch: F) -> Option<RefreshOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        if !self.is_mounted() || !self.is_stale() {
            return None;
        }
        Some(self.refresh(fetch).await)
    }

    /// Stop listening. Responses for refreshes already started are dropped.
    pub fn unmount(&mut self) {
        if !self.shared.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        for id in self.subscriptions.drain(..) {
            self.notifier.unsubscribe(id);
        }
        debug!(view = %self.name, "unmounted");
    }
}

impl<T> Drop for View<T> {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn on_event(shared: &Shared, event: &Event) {
    if !shared.mounted.load(Ordering::SeqCst) {
        return;
    }
    if let Event::Search(query) = event {
        *shared.query.lock().unwrap_or_else(PoisonError::into_inner) = query.clone();
    }
    shared.invalidations.fetch_add(1, Ordering::SeqCst);
    shared.stale.store(true, Ordering::SeqCst);
}
