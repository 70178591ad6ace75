//! Visibility: instance partitioning of the live entity set.
//!
//! Two entities can see each other exactly when they share an instance id.
//!
//! # Invariants
//! - Excluded candidates are absent from the result, never present with
//!   empty attributes.
//! - A query costs a fixed number of store round-trips, independent of the
//!   number of candidates.
//! - "Observer has no instance" is reported separately from "observer does
//!   not exist".

mod filter;

pub use filter::{Elements, VisibilityError, VisibleResponse, query_visible, visible};
