use super::binary_scalar::{backward, forward};
use crate::descriptor::OperatorDescriptor;
use crate::gradient::GradientRule;
use crate::kernels::{SmoothL1, SmoothL1Gradient};
use crate::types::RegistrationError;

/// `scalar` is sigma: the loss is quadratic for `|x| < 1/sigma²`.
fn smooth_l1() -> Result<OperatorDescriptor, RegistrationError> {
    forward::<SmoothL1>("smooth_l1", GradientRule::UsesInput("_backward_smooth_l1"))
        .describe("Smooth L1 loss, quadratic near zero and linear beyond 1/sigma²")
        .build()
}

fn backward_smooth_l1() -> Result<OperatorDescriptor, RegistrationError> {
    backward::<SmoothL1Gradient>("_backward_smooth_l1").build()
}

crate::register_op!(smooth_l1, alias = "_npx_smooth_l1");
crate::register_op!(backward_smooth_l1);
