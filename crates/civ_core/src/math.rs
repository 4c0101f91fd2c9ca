//! Fixed-point math utilities for deterministic simulation.
//!
//! Modifier multipliers, unit stats and positions all use fixed-point
//! arithmetic so that an authority and a replaying observer compute
//! bit-identical values on every platform.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Build a multiplier from a whole percentage (`125` is `1.25`).
///
/// Data tables express ratios as integer percentages so they stay exact
/// in RON files and never pass through a float.
#[must_use]
pub fn percent(value: i32) -> Fixed {
    Fixed::from_num(value) / Fixed::from_num(100)
}

/// Build a fixed-point number from a tenths value (`7` is `0.7`).
#[must_use]
pub fn tenths(value: i32) -> Fixed {
    Fixed::from_num(value) / Fixed::from_num(10)
}

/// Divide a tick count by a speed multiplier, rounding up.
///
/// A multiplier of zero or below is treated as "never finishes" and returns
/// `u64::MAX`.
#[must_use]
pub fn scale_duration(ticks: u64, speed: Fixed) -> u64 {
    if speed <= Fixed::ZERO {
        return u64::MAX;
    }
    let scaled = Fixed::saturating_from_num(ticks) / speed;
    scaled.saturating_ceil().saturating_to_num::<u64>()
}

/// Convert a millisecond duration to ticks at `tick_rate`, rounding up.
#[must_use]
pub fn millis_to_ticks(millis: u32, tick_rate: u32) -> u64 {
    (u64::from(millis) * u64::from(tick_rate)).div_ceil(1000)
}

/// Convert whole seconds to ticks at `tick_rate`.
#[must_use]
pub fn secs_to_ticks(secs: u32, tick_rate: u32) -> u64 {
    u64::from(secs) * u64::from(tick_rate)
}

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from whole-number coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Whether `other` lies within `radius` of this point (inclusive).
    #[must_use]
    pub fn within(self, other: Self, radius: Fixed) -> bool {
        self.distance_squared(other) <= radius.saturating_mul(radius)
    }

    /// Step from this point toward `target` by at most `step`.
    ///
    /// Lands exactly on `target` when it is closer than `step`.
    #[must_use]
    pub fn move_towards(self, target: Self, step: Fixed) -> Self {
        let remaining = self.distance(target);
        if remaining <= step || remaining == Fixed::ZERO {
            return target;
        }
        Self {
            x: self.x + (target.x - self.x).saturating_mul(step) / remaining,
            y: self.y + (target.y - self.y).saturating_mul(step) / remaining,
        }
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Deterministic across platforms.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        if mid.saturating_mul(mid) <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}
