//! Scalar helpers and weighted random selection

use rand::Rng;

/// Linear interpolation between `a` and `b`
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Inverse of [`lerp`]: where `value` sits between `a` and `b`
///
/// Returns 0 for an empty interval.
#[inline]
pub fn inverse_lerp(a: f64, b: f64, value: f64) -> f64 {
    if a == b {
        0.0
    } else {
        (value - a) / (b - a)
    }
}

/// Clamp to `[min, max]`
#[inline]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Clamp to `[0, 1]`
#[inline]
pub fn saturate(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Half-up rounding (`floor(x + 0.5)`), which differs from `f64::round` on
/// negative halves
#[inline]
pub fn js_round(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// An item with a selection weight
#[derive(Debug, Clone, PartialEq)]
pub struct Weighted<T> {
    pub weight: f64,
    pub item: T,
}

impl<T> Weighted<T> {
    pub fn new(weight: f64, item: T) -> Self {
        Self { weight, item }
    }
}

/// Pick one item with probability proportional to its weight.
///
/// Draws uniformly in `[0, total)` and returns the first item whose
/// cumulative weight exceeds the draw. Zero-weight items are never chosen.
/// Returns `None` when the list is empty or the total weight is not positive.
pub fn weighted_random<'a, T, R>(items: &'a [Weighted<T>], rng: &mut R) -> Option<&'a T>
where
    R: Rng + ?Sized,
{
    let total: f64 = items.iter().map(|w| w.weight.max(0.0)).sum();
    if total.is_nan() || total <= 0.0 {
        return None;
    }

    let draw = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for entry in items {
        cumulative += entry.weight.max(0.0);
        if cumulative > draw {
            return Some(&entry.item);
        }
    }

    // Float accumulation can leave the last bucket a hair short of the draw
    items.iter().rev().find(|w| w.weight > 0.0).map(|w| &w.item)
}
