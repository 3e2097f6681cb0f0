//! Shared types for the book reconstruction stack
//!
//! Fixed-point scalar types and system-wide constants. All prices and
//! quantities are i64 ticks at [`constants::FIXED_POINT_SCALE`]; floating
//! point appears only at ingestion and output boundaries.

#![warn(missing_docs)]

pub mod constants;
pub mod types;

pub use types::{Px, Qty, Symbol, Ts};
