// autopush-daemon library entry point.

pub mod config;
pub mod exit_code;
pub mod git;
pub mod runtime;
pub mod startup;
pub mod tracker;
pub mod watcher;
