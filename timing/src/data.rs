//! Delay and power results.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// A delay and the output slew it produces.
///
/// Addition chains stages along a path: delays accumulate, and the result
/// carries the slew of the right-hand (later) stage. Addition is therefore
/// not commutative.
///
/// ```
/// use timing::DelayData;
/// assert_eq!(DelayData::new(1., 2.) + DelayData::new(3., 4.), DelayData::new(4., 4.));
/// assert_eq!(DelayData::new(3., 4.) + DelayData::new(1., 2.), DelayData::new(4., 2.));
/// ```
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayData {
    /// Propagation delay.
    pub delay: f64,
    /// Output slew.
    pub slew: f64,
}

impl DelayData {
    /// Creates a new [`DelayData`].
    #[inline]
    pub fn new(delay: f64, slew: f64) -> Self {
        Self { delay, slew }
    }
}

impl Add for DelayData {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            delay: self.delay + rhs.delay,
            slew: rhs.slew,
        }
    }
}

impl AddAssign for DelayData {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for DelayData {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Dynamic and leakage power, in nW.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerData {
    /// Switching power.
    pub dynamic: f64,
    /// Static leakage power.
    pub leakage: f64,
}

impl PowerData {
    /// Creates a new [`PowerData`].
    #[inline]
    pub fn new(dynamic: f64, leakage: f64) -> Self {
        Self { dynamic, leakage }
    }

    /// Total power.
    #[inline]
    pub fn total(&self) -> f64 {
        self.dynamic + self.leakage
    }
}

impl Add for PowerData {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            dynamic: self.dynamic + rhs.dynamic,
            leakage: self.leakage + rhs.leakage,
        }
    }
}

impl Sum for PowerData {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}
