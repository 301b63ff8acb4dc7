pub mod cli;
pub mod config;
pub mod core;
pub mod diagnostic;
pub mod executor;
pub mod exit;
pub mod extract;
pub mod logs;
pub mod platform;
pub mod selection;
pub mod solutions;
pub mod ui;
