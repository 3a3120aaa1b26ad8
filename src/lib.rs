#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod cache;
pub mod confidence;
pub mod config;
pub mod controller;
pub mod data;
pub mod hints;
pub mod layout;
pub mod reddit;
pub mod selector;
pub mod validator;
pub mod view;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
