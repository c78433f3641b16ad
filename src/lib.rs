//! Client-side state for a task and project tracker: optimistic writes with
//! rollback, debounced inline edits, cross-view invalidation, and progress
//! derived from live task data.

pub mod api;
pub mod cli;
pub mod io;
pub mod logging;
pub mod model;
pub mod ops;
pub mod sync;
