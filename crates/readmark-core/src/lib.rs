//! Core types and trait definitions for readmark read-state tracking.
//!
//! This crate has no database dependencies. It defines the
//! reading model, the reconciliation rules that turn a reading, a watermark and
//! an item timestamp into a read/unread answer, and the [`ReadingStore`]
//! abstraction that storage backends implement.
//!
//! [`ReadingStore`]: store::ReadingStore

pub mod clock;
pub mod config;
pub mod error;
pub mod item;
pub mod reader;
pub mod reading;
pub mod reconcile;
pub mod retry;
pub mod store;

pub use error::{Error, Result};
