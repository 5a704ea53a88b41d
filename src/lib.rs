//! Gram Data Library
//!
//! Proxies the public employment guarantee scheme open-data API, aggregates
//! its rows into monthly summaries per district and financial year, and
//! caches the results.

pub mod cache;
pub mod cli;
pub mod data;
pub mod handler;
pub mod refresh;
pub mod store;
