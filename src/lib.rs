//! Chatgate - Rate-Limited Chat Gateway
//!
//! This crate serves a customer-service chat assistant over HTTP and guards
//! it with a multi-tier admission limiter: per session, per client origin
//! over a minute and an hour, and globally per minute. Counters live in
//! memory and a background compactor keeps them bounded.

pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod repl;
