//! Core of the Lifeline dead man's switch.
//!
//! Everything here is synchronous and transport independent. The tick CLI and
//! the HTTP gateway both wrap a [`switch::Switch`].

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod messages;
pub mod notify;
pub mod ratelimit;
pub mod state;
pub mod store;
pub mod switch;
pub mod token;
