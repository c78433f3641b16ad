pub mod activity;
pub mod config;
pub mod member;
pub mod project;
pub mod task;

pub use activity::*;
pub use config::*;
pub use member::*;
pub use project::*;
pub use task::*;
