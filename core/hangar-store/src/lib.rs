//! # hangar-store
//!
//! Durable side of the Hangar system: the append-only performing log and
//! the work-order catalog, both in one SQLite file. The log is the single
//! source of truth; everything session-shaped is derived from it by
//! `hangar-core` at read time.

pub mod db;
pub mod error;

pub use db::Db;
pub use error::{Result, StoreError};
