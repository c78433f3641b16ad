pub mod commands;
pub mod demo;
pub mod handlers;
pub mod output;
