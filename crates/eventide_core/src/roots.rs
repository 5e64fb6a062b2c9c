//! Root finding on quadratic separation functions.
//!
//! Every pair event in the kernel reduces to finding when a scalar
//! function `f(t) = a t^2 + b t + c` of the relative trajectory crosses
//! zero. Positive `f` means "outside" the boundary in question (contact
//! shell, capture shell). Only crossings where `f` decreases through zero
//! are events; crossings where the pair separates are ignored.
//!
//! # Overlapped starts
//!
//! Round-off can leave a pair slightly on the wrong side of a boundary
//! (`f(0) < 0`). Such a pair:
//! - collides immediately if it is still approaching,
//! - otherwise collides at its next turning point if that point is still
//!   inside the overlapped region,
//! - otherwise re-enters normally at the later root.
//!
//! # Grazing
//!
//! When the discriminant is within the rounding noise of zero the two roots
//! are indistinguishable. The curvature decides: a convex `f` only touches
//! zero from above and produces no event, a concave `f` is dipping below
//! zero at the touching point.

/// Multiple of the local error bound within which a root is accepted.
pub const ACCEPT_FACTOR: f64 = 4.0;

/// `f(t) = a t^2 + b t + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Quadratic {
    #[inline]
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn eval(&self, t: f64) -> f64 {
        (self.a * t + self.b) * t + self.c
    }

    #[inline]
    pub fn slope(&self, t: f64) -> f64 {
        2.0 * self.a * t + self.b
    }

    /// Rounding error bound of [`Quadratic::eval`] at `t`.
    pub fn error_bound(&self, t: f64, precision: f64) -> f64 {
        let scale = (self.a * t * t).abs() + (self.b * t).abs() + self.c.abs();
        precision * scale.max(f64::MIN_POSITIVE)
    }

    /// True when `|f(t)|` is within [`ACCEPT_FACTOR`] error bounds of zero.
    pub fn accepts(&self, t: f64, precision: f64) -> bool {
        self.eval(t).abs() <= ACCEPT_FACTOR * self.error_bound(t, precision)
    }

    /// Real roots in ascending order.
    ///
    /// Uses the cancellation-free form `q = -(b + sgn(b) sqrt(D)) / 2`,
    /// roots `q / a` and `c / q`.
    pub fn roots(&self) -> Option<(f64, f64)> {
        if self.a == 0.0 {
            if self.b == 0.0 {
                return None;
            }
            let r = -self.c / self.b;
            return Some((r, r));
        }

        let disc = self.b * self.b - 4.0 * self.a * self.c;
        if disc < 0.0 {
            return None;
        }

        let sign = if self.b < 0.0 { -1.0 } else { 1.0 };
        let q = -0.5 * (self.b + sign * disc.sqrt());
        if q == 0.0 {
            return Some((0.0, 0.0));
        }

        let (r1, r2) = (q / self.a, self.c / q);
        Some(if r1 <= r2 { (r1, r2) } else { (r2, r1) })
    }

    fn is_grazing(&self, precision: f64) -> bool {
        let disc = self.b * self.b - 4.0 * self.a * self.c;
        let scale = (self.b * self.b).max((4.0 * self.a * self.c).abs());
        disc.abs() <= precision * scale
    }

    /// Earliest `t >= 0` at which `f` decreases through zero, or
    /// `f64::INFINITY` when there is none.
    pub fn next_entry(&self, precision: f64) -> f64 {
        if self.c >= 0.0 {
            self.entry_from_outside(precision)
        } else {
            self.entry_from_overlap(precision)
        }
    }

    fn entry_from_outside(&self, precision: f64) -> f64 {
        if self.a == 0.0 {
            return if self.b < 0.0 {
                self.polish(-self.c / self.b, precision)
            } else {
                f64::INFINITY
            };
        }

        if self.is_grazing(precision) {
            if self.a > 0.0 {
                return f64::INFINITY;
            }
            return (-self.b / (2.0 * self.a)).max(0.0);
        }

        let Some((r1, r2)) = self.roots() else {
            return f64::INFINITY;
        };

        if self.a > 0.0 {
            // Both roots behind us unless the pair is closing.
            if self.b >= 0.0 {
                return f64::INFINITY;
            }
            self.polish(r1, precision)
        } else {
            // r1 <= 0 <= r2 since c >= 0; f falls through zero at r2.
            self.polish(r2, precision)
        }
    }

    fn entry_from_overlap(&self, precision: f64) -> f64 {
        if self.b < 0.0 {
            return 0.0;
        }
        if self.a >= 0.0 {
            return f64::INFINITY;
        }

        let turning = -self.b / (2.0 * self.a);
        if self.eval(turning) <= ACCEPT_FACTOR * self.error_bound(turning, precision) {
            return turning;
        }

        match self.roots() {
            Some((_, r2)) => self.polish(r2, precision),
            None => turning,
        }
    }

    /// Newton-polishes a root and applies the acceptance test.
    fn polish(&self, root: f64, precision: f64) -> f64 {
        let mut t = root;
        for _ in 0..2 {
            let slope = self.slope(t);
            if slope == 0.0 {
                break;
            }
            let next = t - self.eval(t) / slope;
            if !next.is_finite() || self.eval(next).abs() >= self.eval(t).abs() {
                break;
            }
            t = next;
        }
        let t = t.max(0.0);

        if self.accepts(t, precision) {
            t
        } else {
            tracing::trace!(root = t, residual = self.eval(t), "Rejected inaccurate root");
            f64::INFINITY
        }
    }
}

/// Time for a coordinate `x` moving at `v` to leave `[lower, upper]`.
///
/// Returns `f64::INFINITY` for a stationary coordinate. Positions already
/// past the boundary they are heading for give zero.
#[inline]
pub fn interval_exit(x: f64, v: f64, lower: f64, upper: f64) -> f64 {
    if v > 0.0 {
        ((upper - x) / v).max(0.0)
    } else if v < 0.0 {
        ((lower - x) / v).max(0.0)
    } else {
        f64::INFINITY
    }
}
