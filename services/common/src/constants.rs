//! Common constants used across all services
//!
//! Single source of truth for all magic numbers.

// Fixed-point arithmetic constants
/// Fixed-point scale factor (8 decimal places)
pub const FIXED_POINT_SCALE: i64 = 100_000_000;
/// Fixed-point scale factor as f64, for boundary conversions only
pub const FIXED_POINT_SCALE_F64: f64 = 100_000_000.0;

// Time constants
/// Milliseconds per second
pub const MILLIS_PER_SEC: u64 = 1000;
/// Nanoseconds per second
pub const NANOS_PER_SEC: u64 = 1_000_000_000;
/// Nanoseconds per millisecond
pub const NANOS_PER_MILLI: u64 = 1_000_000;
/// Nanoseconds per microsecond
pub const NANOS_PER_MICRO: u64 = 1000;

// Retry constants
/// Default number of retries for transient upstream failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay between retries in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
/// Cap on the exponential backoff delay in milliseconds
pub const MAX_RETRY_DELAY_MS: u64 = 5000;

// Numeric limits for validation
/// Maximum representable price before scaling overflows
pub const MAX_PRICE: i64 = i64::MAX / FIXED_POINT_SCALE;
/// Minimum quantity accepted from a feed (in ticks)
pub const MIN_QUANTITY: i64 = 1;
