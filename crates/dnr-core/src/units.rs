//! Unit-safe wrappers for the quantities used by the restoration models.
//!
//! Loads, capacities and flows are carried as [`Megawatts`]; storage energy as
//! [`MegawattHours`]; dispatch step lengths as [`Hours`]. All types are
//! `#[repr(transparent)]` over `f64`, so the solver layers can unwrap them with
//! `.value()` at no cost.
//!
//! ```
//! use dnr_core::units::{Hours, MegawattHours, Megawatts};
//!
//! let p = Megawatts(2.0);
//! let e: MegawattHours = p * Hours(0.5);
//! assert_eq!(e, MegawattHours(1.0));
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            #[inline]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Stored or delivered energy in megawatt-hours (MWh)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegawattHours(pub f64);

impl_unit_ops!(MegawattHours, "MWh");

/// Duration in hours
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Hours(pub f64);

impl_unit_ops!(Hours, "h");

impl Mul<Hours> for Megawatts {
    type Output = MegawattHours;
    fn mul(self, rhs: Hours) -> Self::Output {
        MegawattHours(self.0 * rhs.0)
    }
}

impl Div<Hours> for MegawattHours {
    type Output = Megawatts;
    fn div(self, rhs: Hours) -> Self::Output {
        Megawatts(self.0 / rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_times_duration_is_energy() {
        assert_eq!(Megawatts(3.0) * Hours(2.0), MegawattHours(6.0));
        assert_eq!(MegawattHours(6.0) / Hours(2.0), Megawatts(3.0));
    }

    #[test]
    fn sums_and_display() {
        let total: Megawatts = [Megawatts(1.0), Megawatts(2.5)].iter().sum();
        assert_eq!(total.value(), 3.5);
        assert_eq!(format!("{}", MegawattHours(1.25)), "1.2500 MWh");
    }
}
