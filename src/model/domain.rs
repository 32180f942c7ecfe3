use crate::butternut_asserts::butternut_assert_extreme;
use crate::butternut_asserts::butternut_assert_moderate;
use crate::butternut_asserts::butternut_assert_simple;
use crate::math::num_ext::NumExt;

/// The number of intervals above which [`Domain::relax_if_too_complex`] falls back to the
/// continuous hull.
const COMPLEXITY_LIMIT: usize = 32;

/// The largest domain for which [`Domain::multiplication_by`] stays exact; beyond it the result
/// is relaxed to the continuous hull.
const EXACT_MULTIPLICATION_LIMIT: u64 = 1024;

/// A set of integers, stored as a sorted list of disjoint closed intervals.
///
/// Invariant: consecutive intervals are neither overlapping nor adjacent, so the representation
/// of a set is unique. All arithmetic on interval bounds saturates at the `i64` boundaries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Domain {
    intervals: Vec<(i64, i64)>,
}

impl Domain {
    /// The empty set.
    pub fn empty() -> Domain {
        Domain { intervals: vec![] }
    }

    /// The interval `[lower_bound, upper_bound]`; empty if `lower_bound > upper_bound`.
    pub fn new(lower_bound: i64, upper_bound: i64) -> Domain {
        if lower_bound > upper_bound {
            Domain::empty()
        } else {
            Domain {
                intervals: vec![(lower_bound, upper_bound)],
            }
        }
    }

    /// The singleton `{value}`.
    pub fn constant(value: i64) -> Domain {
        Domain::new(value, value)
    }

    /// The domain `{0, 1}` of a Boolean variable.
    pub fn boolean() -> Domain {
        Domain::new(0, 1)
    }

    /// The set containing exactly the given values.
    pub fn from_values(values: impl IntoIterator<Item = i64>) -> Domain {
        Domain::from_intervals(values.into_iter().map(|v| (v, v)).collect())
    }

    fn from_intervals(mut intervals: Vec<(i64, i64)>) -> Domain {
        intervals.retain(|(lb, ub)| lb <= ub);
        intervals.sort_unstable();

        let mut normalised: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
        for (lb, ub) in intervals {
            match normalised.last_mut() {
                Some(last) if lb <= last.1.saturating_add(1) => last.1 = last.1.max(ub),
                _ => normalised.push((lb, ub)),
            }
        }
        butternut_assert_extreme!(normalised
            .windows(2)
            .all(|pair| i128::from(pair[0].1) + 1 < i128::from(pair[1].0)));

        Domain {
            intervals: normalised,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether the set is a singleton.
    pub fn is_fixed(&self) -> bool {
        self.size() == 1
    }

    /// The value of a singleton set.
    pub fn fixed_value(&self) -> i64 {
        butternut_assert_simple!(self.is_fixed());
        self.intervals[0].0
    }

    /// The smallest element. The set must not be empty.
    pub fn lower_bound(&self) -> i64 {
        butternut_assert_simple!(!self.is_empty());
        self.intervals[0].0
    }

    /// The largest element. The set must not be empty.
    pub fn upper_bound(&self) -> i64 {
        butternut_assert_simple!(!self.is_empty());
        self.intervals[self.intervals.len() - 1].1
    }

    /// The number of elements, saturated at `u64::MAX`.
    pub fn size(&self) -> u64 {
        let mut total: u128 = 0;
        for (lb, ub) in &self.intervals {
            total += (i128::from(*ub) - i128::from(*lb) + 1) as u128;
        }
        u64::try_from(total).unwrap_or(u64::MAX)
    }

    pub fn num_intervals(&self) -> usize {
        self.intervals.len()
    }

    pub fn intervals(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.intervals.iter().copied()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.intervals
            .binary_search_by(|&(lb, ub)| {
                if value < lb {
                    std::cmp::Ordering::Greater
                } else if value > ub {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Iterate over the elements in increasing order.
    ///
    /// Only sensible for small sets; callers are expected to have bounded the size first.
    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.intervals.iter().flat_map(|&(lb, ub)| lb..=ub)
    }

    pub fn intersection(&self, other: &Domain) -> Domain {
        let mut result = Vec::new();
        let mut right = other.intervals.iter().copied().peekable();

        for &(lb, ub) in &self.intervals {
            while let Some(&(other_lb, other_ub)) = right.peek() {
                if other_ub < lb {
                    let _ = right.next();
                    continue;
                }
                if other_lb > ub {
                    break;
                }
                result.push((lb.max(other_lb), ub.min(other_ub)));
                if other_ub <= ub {
                    let _ = right.next();
                } else {
                    break;
                }
            }
        }

        Domain::from_intervals(result)
    }

    pub fn union_with(&self, other: &Domain) -> Domain {
        let mut intervals = self.intervals.clone();
        intervals.extend_from_slice(&other.intervals);
        Domain::from_intervals(intervals)
    }

    /// The complement with respect to all of `i64`.
    pub fn complement(&self) -> Domain {
        let mut result = Vec::new();
        let mut next_lb = i64::MIN;

        for &(lb, ub) in &self.intervals {
            if lb > next_lb {
                result.push((next_lb, lb - 1));
            }
            if ub == i64::MAX {
                return Domain::from_intervals(result);
            }
            next_lb = ub + 1;
        }
        result.push((next_lb, i64::MAX));

        Domain::from_intervals(result)
    }

    /// The set `{-v | v in self}`.
    pub fn negation(&self) -> Domain {
        Domain::from_intervals(
            self.intervals
                .iter()
                .map(|&(lb, ub)| (ub.saturating_neg(), lb.saturating_neg()))
                .collect(),
        )
    }

    /// The Minkowski sum `{a + b | a in self, b in other}`.
    pub fn addition_with(&self, other: &Domain) -> Domain {
        let mut intervals = Vec::with_capacity(self.intervals.len() * other.intervals.len());
        for &(lb, ub) in &self.intervals {
            for &(other_lb, other_ub) in &other.intervals {
                intervals.push((lb.saturating_add(other_lb), ub.saturating_add(other_ub)));
            }
        }
        Domain::from_intervals(intervals)
    }

    /// The set `{coefficient * v | v in self}`.
    ///
    /// Exact for small sets; for large sets a continuous superset is returned, as if
    /// [`Domain::relax_if_too_complex`] had been applied.
    pub fn multiplication_by(&self, coefficient: i64) -> Domain {
        match coefficient {
            0 => {
                if self.is_empty() {
                    Domain::empty()
                } else {
                    Domain::constant(0)
                }
            }
            1 => self.clone(),
            -1 => self.negation(),
            _ if self.size() <= EXACT_MULTIPLICATION_LIMIT => {
                Domain::from_values(self.values().map(|v| v.saturating_mul(coefficient)))
            }
            _ => self.continuous_hull_multiplication(coefficient),
        }
    }

    fn continuous_hull_multiplication(&self, coefficient: i64) -> Domain {
        let a = self.lower_bound().saturating_mul(coefficient);
        let b = self.upper_bound().saturating_mul(coefficient);
        Domain::new(a.min(b), a.max(b))
    }

    /// Replaces the set by its continuous hull when the interval list has grown too large.
    pub fn relax_if_too_complex(&self) -> Domain {
        if self.num_intervals() > COMPLEXITY_LIMIT {
            Domain::new(self.lower_bound(), self.upper_bound())
        } else {
            self.clone()
        }
    }

    /// A superset of `{a * b | a in self, b in other}` where every interval is treated as
    /// continuous.
    pub fn continuous_multiplication_by(&self, other: &Domain) -> Domain {
        let mut intervals = Vec::with_capacity(self.intervals.len() * other.intervals.len());
        for &(lb, ub) in &self.intervals {
            for &(other_lb, other_ub) in &other.intervals {
                let products = [
                    lb.saturating_mul(other_lb),
                    lb.saturating_mul(other_ub),
                    ub.saturating_mul(other_lb),
                    ub.saturating_mul(other_ub),
                ];
                let min = *products.iter().min().unwrap();
                let max = *products.iter().max().unwrap();
                intervals.push((min, max));
            }
        }
        Domain::from_intervals(intervals)
    }

    /// The set `{v | coefficient * v in self}`.
    pub fn inverse_multiplication_by(&self, coefficient: i64) -> Domain {
        if coefficient == 0 {
            return if self.contains(0) {
                Domain::new(i64::MIN, i64::MAX)
            } else {
                Domain::empty()
            };
        }

        Domain::from_intervals(
            self.intervals
                .iter()
                .map(|&(lb, ub)| {
                    if coefficient > 0 {
                        (lb.div_ceil(coefficient), ub.div_floor(coefficient))
                    } else {
                        (ub.div_ceil(coefficient), lb.div_floor(coefficient))
                    }
                })
                .collect(),
        )
    }

    /// A superset of `{a % m | a in self, m in modulo, m != 0}`, where `%` is the truncated
    /// remainder (the sign follows the dividend).
    pub fn positive_modulo_image_superset(&self, modulo: &Domain) -> Domain {
        if self.is_empty() || modulo.is_empty() {
            return Domain::empty();
        }

        let max_abs_modulo = modulo
            .lower_bound()
            .saturating_abs()
            .max(modulo.upper_bound().saturating_abs());
        if max_abs_modulo == 0 {
            return Domain::empty();
        }
        let bound = max_abs_modulo - 1;

        let upper = if self.upper_bound() > 0 {
            bound.min(self.upper_bound())
        } else {
            0
        };
        let lower = if self.lower_bound() < 0 {
            (-bound).max(self.lower_bound())
        } else {
            0
        };
        Domain::new(lower, upper)
    }

    /// A superset of `{a / m | a in self, m in divisor, m != 0}` with truncated division.
    pub fn positive_division_image_superset(&self, divisor: &Domain) -> Domain {
        if self.is_empty() || divisor.is_empty() {
            return Domain::empty();
        }

        // The extreme quotients are attained at the corners: the numerator bounds combined with
        // the smallest and largest magnitude divisor of each available sign.
        let mut divisor_corners = Vec::new();
        if let Some(min_positive) = divisor
            .intervals
            .iter()
            .find(|&&(_, ub)| ub > 0)
            .map(|&(lb, _)| lb.max(1))
        {
            divisor_corners.push(min_positive);
        }
        if divisor.upper_bound() > 0 {
            divisor_corners.push(divisor.upper_bound());
        }
        if let Some(max_negative) = divisor
            .intervals
            .iter()
            .rev()
            .find(|&&(lb, _)| lb < 0)
            .map(|&(_, ub)| ub.min(-1))
        {
            divisor_corners.push(max_negative);
        }
        if divisor.lower_bound() < 0 {
            divisor_corners.push(divisor.lower_bound());
        }

        if divisor_corners.is_empty() {
            // The divisor can only be zero.
            return Domain::empty();
        }

        let mut min_quotient = i64::MAX;
        let mut max_quotient = i64::MIN;
        for &d in &divisor_corners {
            butternut_assert_moderate!(d != 0);
            for a in [self.lower_bound(), self.upper_bound()] {
                let q = a.checked_div(d).unwrap_or(i64::MAX);
                min_quotient = min_quotient.min(q);
                max_quotient = max_quotient.max(q);
            }
        }
        Domain::new(min_quotient, max_quotient)
    }
}
