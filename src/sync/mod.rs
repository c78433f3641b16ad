//! Keeping local state, server state, and open views in agreement.

pub mod bus;
pub mod cache;
pub mod coalesce;
pub mod policy;
pub mod reconciler;
pub mod view;

pub use bus::{Event, Notifier, SubscriptionId, ThemeMode, Topic};
pub use reconciler::{FlushOutcome, Reconciler, SyncError};
pub use view::{RefreshOutcome, View, ViewState};
