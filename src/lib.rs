pub mod api;
pub mod chart;
pub mod config;
pub mod details;
pub mod editors;
pub mod error;
pub mod login;
pub mod models;
pub mod period;
pub mod poll;
pub mod session;
pub mod spoof;
pub mod store;
pub mod summary;
pub mod toast;
pub mod ui;
pub mod validation;
