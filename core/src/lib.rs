pub mod auth;
pub mod callable;
pub mod clock;
pub mod config;
pub mod custody;
pub mod error;
pub mod event;
pub mod fee;
pub mod lounge;
pub mod orders;
pub mod reconciliation;
pub mod request;
pub mod session;
pub mod settlement;
pub mod store;
pub mod types;
pub mod withdrawal;
