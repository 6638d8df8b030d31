//! Exact unsigned rational arithmetic for tick-to-seconds conversion.
//!
//! Tempos are seconds-per-tick ratios whose denominators divide
//! `1_000_000 * division`, so sums of tick spans stay small and exact.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use serde::{Deserialize, Serialize};

/// A reduced fraction `num / den`. The denominator is never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fraction {
    num: u128,
    den: u128,
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { num: 0, den: 1 };

    /// Builds a reduced fraction. A zero denominator yields zero.
    pub fn new(num: u128, den: u128) -> Self {
        if den == 0 || num == 0 {
            return Self::ZERO;
        }
        let g = gcd(num, den);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    pub fn from_int(value: u64) -> Self {
        Self {
            num: u128::from(value),
            den: 1,
        }
    }

    #[inline]
    pub fn numer(&self) -> u128 {
        self.num
    }

    #[inline]
    pub fn denom(&self) -> u128 {
        self.den
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Nearest `f64` value.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Multiplies by an integer tick count.
    pub fn scale(&self, ticks: u64) -> Self {
        if ticks == 0 {
            return Self::ZERO;
        }
        let t = u128::from(ticks);
        let g = gcd(t, self.den);
        Self::new(
            (t / g).saturating_mul(self.num),
            self.den / g,
        )
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, rhs: Fraction) -> Fraction {
        if self.num == 0 {
            return rhs;
        }
        if rhs.num == 0 {
            return self;
        }
        let g = gcd(self.den, rhs.den);
        let lhs_scale = rhs.den / g;
        let rhs_scale = self.den / g;
        Fraction::new(
            self.num
                .saturating_mul(lhs_scale)
                .saturating_add(rhs.num.saturating_mul(rhs_scale)),
            self.den.saturating_mul(lhs_scale),
        )
    }
}

impl AddAssign for Fraction {
    fn add_assign(&mut self, rhs: Fraction) {
        *self = *self + rhs;
    }
}

impl Mul for Fraction {
    type Output = Fraction;

    fn mul(self, rhs: Fraction) -> Fraction {
        if self.num == 0 || rhs.num == 0 {
            return Fraction::ZERO;
        }
        let g1 = gcd(self.num, rhs.den);
        let g2 = gcd(rhs.num, self.den);
        Fraction::new(
            (self.num / g1).saturating_mul(rhs.num / g2),
            (self.den / g2).saturating_mul(rhs.den / g1),
        )
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.num
            .saturating_mul(other.den)
            .cmp(&other.num.saturating_mul(self.den))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
