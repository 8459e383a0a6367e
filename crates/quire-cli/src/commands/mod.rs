pub mod clear;
pub mod common;
pub mod config;
pub mod save;
pub mod status;
pub mod watch;
