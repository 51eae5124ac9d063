//! Pull request reviewer assignment service.
//!
//! The crate ships a `reviewer-service` binary; the library surface exists so
//! integration tests can build the router over any [`store::Store`].

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod state;
pub mod store;
