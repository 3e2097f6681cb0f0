//! Core scalar types for the book reconstruction stack

use crate::constants::{FIXED_POINT_SCALE, FIXED_POINT_SCALE_F64, NANOS_PER_MICRO, NANOS_PER_MILLI};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol identifier for trading instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub u32);

impl Symbol {
    /// Create a new Symbol with given ID
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw identifier
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYM_{}", self.0)
    }
}

/// Price type (stored as i64 ticks for determinism, 8 decimal places)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Px(i64);

impl Px {
    /// Create a new Price from a decimal value (ingestion boundary only)
    ///
    /// Internal code should ALWAYS use `from_i64` and fixed-point arithmetic.
    #[must_use]
    pub fn new(value: f64) -> Self {
        let scaled = (value * FIXED_POINT_SCALE_F64).round();
        let clamped = if scaled >= i64::MAX as f64 {
            i64::MAX
        } else if scaled <= i64::MIN as f64 {
            i64::MIN
        } else {
            // Bounds checked above, the cast cannot truncate
            #[allow(clippy::cast_possible_truncation)]
            {
                scaled as i64
            }
        };
        Self(clamped)
    }

    /// Get price as f64 for external APIs only
    ///
    /// WARNING: for values > 2^53 / 10^8 this may lose precision. Internal
    /// code should ALWAYS use fixed-point arithmetic.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / FIXED_POINT_SCALE_F64
        }
    }

    /// Get price as i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Create from i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from whole units
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * FIXED_POINT_SCALE)
    }

    /// Zero price
    pub const ZERO: Self = Self(0);

    /// Add two prices (fixed-point arithmetic)
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Subtract two prices (fixed-point arithmetic)
    #[must_use]
    pub const fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / FIXED_POINT_SCALE;
        let frac = (self.0 % FIXED_POINT_SCALE).abs();
        write!(f, "{whole}.{frac:08}")
    }
}

/// Quantity type for order sizes (stored as i64 ticks for determinism, 8 decimal places)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qty(i64);

impl Qty {
    /// Create a new Quantity from a decimal value (ingestion boundary only)
    ///
    /// Internal code should ALWAYS use `from_i64` and fixed-point arithmetic.
    #[must_use]
    pub fn new(value: f64) -> Self {
        let scaled = (value * FIXED_POINT_SCALE_F64).round();
        let clamped = if scaled >= i64::MAX as f64 {
            i64::MAX
        } else if scaled <= i64::MIN as f64 {
            i64::MIN
        } else {
            // Bounds checked above, the cast cannot truncate
            #[allow(clippy::cast_possible_truncation)]
            {
                scaled as i64
            }
        };
        Self(clamped)
    }

    /// Get quantity as f64 for external APIs only
    ///
    /// WARNING: for values > 2^53 / 10^8 this may lose precision. Internal
    /// code should ALWAYS use fixed-point arithmetic.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / FIXED_POINT_SCALE_F64
        }
    }

    /// Get quantity as i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Create from i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from whole units
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * FIXED_POINT_SCALE)
    }

    /// Check if quantity is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Zero quantity
    pub const ZERO: Self = Self(0);

    /// Add two quantities (fixed-point arithmetic)
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Subtract two quantities (fixed-point arithmetic)
    #[must_use]
    pub const fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / FIXED_POINT_SCALE;
        let frac = (self.0 % FIXED_POINT_SCALE).abs();
        write!(f, "{whole}.{frac:08}")
    }
}

/// Timestamp in nanoseconds since UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ts(pub u64);

impl Ts {
    /// Get current timestamp
    #[must_use]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0));
        // Avoid u128: u64 nanoseconds cover ~584 years
        let nanos = duration.as_secs() * 1_000_000_000 + u64::from(duration.subsec_nanos());
        Self(nanos)
    }

    /// Create timestamp from nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Get timestamp as nanoseconds
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get timestamp as microseconds
    #[must_use]
    pub const fn as_micros(&self) -> u64 {
        self.0 / NANOS_PER_MICRO
    }

    /// Get timestamp as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / NANOS_PER_MILLI
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
