// SPDX-License-Identifier: GPL-3.0-only

//! Time bases and timestamp rescaling

use std::cmp::Ordering;
use std::fmt;

/// A time base expressed as `num / den` seconds per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const MILLISECONDS: Rational = Rational { num: 1, den: 1000 };
    pub const NANOSECONDS: Rational = Rational {
        num: 1,
        den: 1_000_000_000,
    };

    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Time base of one tick per frame at `fps`
    pub fn per_frame(fps: u32) -> Self {
        Self::new(1, i64::from(fps.max(1)))
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Convert `value` ticks of `from` into ticks of `to`, rounding to nearest
///
/// Halfway cases round away from zero. Intermediate math is done in 128 bits
/// so nanosecond time bases cannot overflow.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if from == to {
        return value;
    }
    let mut numerator = i128::from(value) * i128::from(from.num) * i128::from(to.den);
    let mut denominator = i128::from(from.den) * i128::from(to.num);
    if denominator == 0 {
        return value;
    }
    if denominator < 0 {
        numerator = -numerator;
        denominator = -denominator;
    }
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Compare two timestamps expressed in different time bases
pub fn compare(a: i64, a_base: Rational, b: i64, b_base: Rational) -> Ordering {
    let lhs = i128::from(a) * i128::from(a_base.num) * i128::from(b_base.den);
    let rhs = i128::from(b) * i128::from(b_base.num) * i128::from(a_base.den);
    lhs.cmp(&rhs)
}
