//! # reviewer-domain
//!
//! Data model and reviewer assignment policy for the reviewer service.
//!
//! ## Design Principles
//!
//! - Identifiers (team names, user ids, pull request ids) are caller-supplied
//!   strings and are stored verbatim
//! - A pull request is `OPEN` until merged; `MERGED` is terminal
//! - Reviewer selection is a pure function over a materialized team snapshot,
//!   so it can be tested without a database
//!
//! Persistence, transactions and transport live in `reviewer-service`.

pub mod assignment;
mod model;

pub use assignment::{select_reviewer, NoCandidate, ReviewCandidate};
pub use model::*;
