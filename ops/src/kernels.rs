//! Scalar kernel slots.
//!
//! Each kernel is a zero-sized type; the type is the tag a compute binding is
//! monomorphised over. `map(a, b)` receives a tensor element as `a` and the
//! node's scalar operand as `b`. Kernels are pure and keep no state.

/// A pure element transform against a scalar operand
pub trait ScalarKernel: Send + Sync + 'static {
    const NAME: &'static str;

    fn map(a: f64, b: f64) -> f64;
}

macro_rules! scalar_kernel {
    ($(#[$doc:meta])* $ty:ident, $name:literal, |$a:ident, $b:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $ty;

        impl ScalarKernel for $ty {
            const NAME: &'static str = $name;

            #[inline]
            fn map($a: f64, $b: f64) -> f64 {
                $body
            }
        }
    };
}

scalar_kernel!(
    /// `max(a, b)`; a NaN element propagates
    Maximum, "maximum", |a, b| if a.is_nan() || a > b { a } else { b }
);

scalar_kernel!(
    /// `min(a, b)`; a NaN element propagates
    Minimum, "minimum", |a, b| if a.is_nan() || a < b { a } else { b }
);

scalar_kernel!(
    /// `a ^ b`
    Power, "power", |a, b| a.powf(b)
);

scalar_kernel!(
    /// `b ^ a`
    RPower, "rpower", |a, b| b.powf(a)
);

scalar_kernel!(
    /// `sqrt(a² + b²)`
    Hypot, "hypot", |a, b| a.hypot(b)
);

scalar_kernel!(
    /// Smooth L1 with `b` as sigma: quadratic inside `|a| < 1/b²`, linear outside.
    SmoothL1, "smooth_l1", |a, b| {
        let bsq = b * b;
        let ibsq = 1.0 / bsq;
        if a > ibsq {
            a - 0.5 * ibsq
        } else if a < -ibsq {
            -a - 0.5 * ibsq
        } else {
            0.5 * a * a * bsq
        }
    }
);

scalar_kernel!(
    /// `1` where `a >= b`, else `0`
    GreaterEqual, "ge", |a, b| if a >= b { 1.0 } else { 0.0 }
);

scalar_kernel!(
    /// `1` where `a <= b`, else `0`
    LessEqual, "le", |a, b| if a <= b { 1.0 } else { 0.0 }
);

scalar_kernel!(
    /// d(a^b)/da = `b · a^(b-1)`
    PowerGrad, "power_grad", |a, b| a.powf(b - 1.0) * b
);

scalar_kernel!(
    /// d(b^x)/dx expressed through the forward output `a = b^x`: `a · ln b`
    RPowerGrad, "rpower_grad", |a, b| a * b.ln()
);

scalar_kernel!(
    /// d hypot(a, b)/da = `a / hypot(a, b)`
    HypotGradLeft, "hypot_grad_left", |a, b| a / a.hypot(b)
);

scalar_kernel!(
    SmoothL1Gradient, "smooth_l1_gradient", |a, b| {
        let bsq = b * b;
        let ibsq = 1.0 / bsq;
        if a > ibsq {
            1.0
        } else if a < -ibsq {
            -1.0
        } else {
            bsq * a
        }
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    fn apply<K: ScalarKernel>(xs: &[f64], b: f64) -> Vec<f64> {
        xs.iter().map(|&a| K::map(a, b)).collect()
    }

    #[test]
    fn maximum_and_minimum() {
        assert_eq!(apply::<Maximum>(&[1.0, 5.0, 3.0], 2.0), vec![2.0, 5.0, 3.0]);
        assert_eq!(apply::<Minimum>(&[1.0, 5.0, 3.0], 2.0), vec![1.0, 2.0, 2.0]);
        assert!(Maximum::map(f64::NAN, 2.0).is_nan());
    }

    #[test]
    fn smooth_l1_matches_reference_values() {
        assert_eq!(apply::<SmoothL1>(&[1.0, 2.0, 3.0, 4.0], 1.0), vec![0.5, 1.5, 2.5, 3.5]);
        // sigma = 2: quadratic zone is |x| < 0.25
        assert_eq!(SmoothL1::map(0.1, 2.0), 0.5 * 0.1 * 0.1 * 4.0);
        assert_eq!(SmoothL1::map(-1.0, 2.0), 1.0 - 0.125);
    }

    #[test]
    fn gradients() {
        assert_eq!(PowerGrad::map(3.0, 2.0), 6.0);
        assert_eq!(GreaterEqual::map(2.0, 2.0), 1.0);
        assert_eq!(LessEqual::map(3.0, 2.0), 0.0);
        assert_eq!(apply::<SmoothL1Gradient>(&[-2.0, 0.5, 2.0], 1.0), vec![-1.0, 0.5, 1.0]);
        assert_eq!(HypotGradLeft::map(3.0, 4.0), 0.6);

        let out = RPower::map(3.0, 2.0);
        assert_eq!(out, 8.0);
        assert!((RPowerGrad::map(out, 2.0) - 8.0 * 2f64.ln()).abs() < 1e-12);
    }
}
