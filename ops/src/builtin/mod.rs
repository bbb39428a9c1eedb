//! Builtin operators: the elementwise scalar family and its gradients.

pub mod binary_scalar;
pub mod extended;
pub mod smooth_l1;

/// Name of the scalar operand field every operator in this family declares
pub const SCALAR: &str = "scalar";
