//! maximum / minimum / power / rpower / hypot against a scalar.

use core_types::DispatchKey;

use super::binary_scalar::{backward, forward};
use crate::accel;
use crate::descriptor::OperatorDescriptor;
use crate::gradient::GradientRule;
use crate::kernels::{
    GreaterEqual, Hypot, HypotGradLeft, LessEqual, Maximum, Minimum, Power, PowerGrad, RPower, RPowerGrad,
};
use crate::types::RegistrationError;

fn maximum_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    forward::<Maximum>("_maximum_scalar", GradientRule::UsesInput("_backward_maximum_scalar"))
        .describe("Elementwise maximum of a tensor and a scalar")
        .build()
}

fn backward_maximum_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    backward::<GreaterEqual>("_backward_maximum_scalar").build()
}

fn minimum_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    forward::<Minimum>("_minimum_scalar", GradientRule::UsesInput("_backward_minimum_scalar"))
        .describe("Elementwise minimum of a tensor and a scalar")
        .build()
}

fn backward_minimum_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    backward::<LessEqual>("_backward_minimum_scalar").build()
}

// x^p needs x for its derivative, so the backward pass takes the input.
fn power_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    forward::<Power>("_power_scalar", GradientRule::UsesInput("_backward_power_scalar"))
        .describe("Raise every element to a scalar power")
        .accelerated(DispatchKey::CPU_DENSE, accel::power_binding())
        .build()
}

fn backward_power_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    backward::<PowerGrad>("_backward_power_scalar").build()
}

fn rpower_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    forward::<RPower>("_rpower_scalar", GradientRule::UsesOutput("_backward_rpower_scalar"))
        .describe("Raise a scalar to the power of every element")
        .build()
}

fn backward_rpower_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    backward::<RPowerGrad>("_backward_rpower_scalar").build()
}

fn hypot_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    forward::<Hypot>("_hypot_scalar", GradientRule::UsesInput("_backward_hypot_scalar"))
        .describe("Hypotenuse of every element and a scalar")
        .build()
}

fn backward_hypot_scalar() -> Result<OperatorDescriptor, RegistrationError> {
    backward::<HypotGradLeft>("_backward_hypot_scalar").build()
}

crate::register_op!(maximum_scalar, alias = "_MaximumScalar", alias = "_npi_maximum_scalar");
crate::register_op!(backward_maximum_scalar);
crate::register_op!(minimum_scalar, alias = "_MinimumScalar", alias = "_npi_minimum_scalar");
crate::register_op!(backward_minimum_scalar);
crate::register_op!(power_scalar, alias = "_PowerScalar");
crate::register_op!(backward_power_scalar);
crate::register_op!(rpower_scalar, alias = "_RPowerScalar");
crate::register_op!(backward_rpower_scalar);
crate::register_op!(hypot_scalar, alias = "_npi_hypot_scalar", alias = "_HypotScalar");
crate::register_op!(backward_hypot_scalar);
