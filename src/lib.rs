//! tablesync library
//!
//! Offline-first access to a restaurant directory: a cache-first resource
//! proxy, a read-through repository over a durable key-value store, and a
//! coordinator that uploads reviews queued while offline.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;
