use crate::config::Tolerance;

/// First element where `accelerated` strays from `reference`.
///
/// Returns `(index, reference, accelerated)`. NaN matches NaN; a length
/// difference is reported at the first missing index.
pub fn first_mismatch(reference: &[f64], accelerated: &[f64], tol: Tolerance) -> Option<(usize, f64, f64)> {
    let diverged = reference.iter().zip(accelerated).enumerate().find(|&(_, (&r, &a))| {
        if r.is_nan() || a.is_nan() {
            return r.is_nan() != a.is_nan();
        }
        if r == a {
            return false;
        }
        !((a - r).abs() <= tol.atol + tol.rtol * r.abs())
    });
    if let Some((i, (&r, &a))) = diverged {
        return Some((i, r, a));
    }

    let n = reference.len().min(accelerated.len());
    if reference.len() != accelerated.len() {
        let r = reference.get(n).copied().unwrap_or(f64::NAN);
        let a = accelerated.get(n).copied().unwrap_or(f64::NAN);
        return Some((n, r, a));
    }
    None
}
