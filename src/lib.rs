pub mod activity;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod instance;
pub mod reconcile;
pub mod routes;
pub mod server;
pub mod snapshot;

#[cfg(test)]
mod test_utils;
