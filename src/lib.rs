// Library root module for route-executor
// This file defines the public API and module structure for the
// route-executor library
// It exports the main functionality that can be used by other crates

pub mod config;
pub mod contracts;
pub mod errors;
pub mod manager;
pub mod metrics;
pub mod processors;
pub mod routes;
pub mod signing;
pub mod transactor;
pub mod transport;
pub mod types;
pub mod watcher;
