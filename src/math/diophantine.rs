/// The solution set of a linear diophantine equation `a * x + b * y = c` with two unknowns.
///
/// All solutions are of the form `x = x0 + x_step * z`, `y = y0 - y_step * z` for an arbitrary
/// integer parameter `z`, where `x_step = b / gcd(a, b)` and `y_step = a / gcd(a, b)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DiophantineSolution {
    pub(crate) x0: i64,
    pub(crate) y0: i64,
    pub(crate) x_step: i64,
    pub(crate) y_step: i64,
}

/// Solves `a * x + b * y = c` over the integers.
///
/// Returns `None` if the equation has no solution, or if a particular solution does not fit in
/// an `i64`. Both coefficients must be non-zero.
pub(crate) fn solve_linear_diophantine(a: i64, b: i64, c: i64) -> Option<DiophantineSolution> {
    debug_assert!(a != 0 && b != 0);

    let (gcd, x_gcd, y_gcd) = extended_gcd(a, b);
    if c % gcd != 0 {
        return None;
    }

    let scale = c / gcd;
    let x0 = i64::try_from(i128::from(x_gcd).checked_mul(i128::from(scale))?).ok()?;
    let y0 = i64::try_from(i128::from(y_gcd).checked_mul(i128::from(scale))?).ok()?;

    Some(DiophantineSolution {
        x0,
        y0,
        x_step: b / gcd,
        y_step: a / gcd,
    })
}

/// Returns `(g, x, y)` such that `a * x + b * y = g` where `g = gcd(a, b) > 0`.
fn extended_gcd(a: i64, b: i64) -> (i64, i64, i64) {
    let (mut old_r, mut r) = (a, b);
    let (mut old_s, mut s) = (1i64, 0i64);
    let (mut old_t, mut t) = (0i64, 1i64);

    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
        (old_t, t) = (t, old_t - quotient * t);
    }

    if old_r < 0 {
        (-old_r, -old_s, -old_t)
    } else {
        (old_r, old_s, old_t)
    }
}
