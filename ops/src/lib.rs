// `dispatch_dtype!`, generated from supported_types.yaml. Included first so
// every module below sees it in textual scope.
include!(concat!(env!("OUT_DIR"), "/generated_dispatch_dtype.rs"));

pub mod accel;
pub mod builtin;
pub mod descriptor;
pub mod gradient;
pub mod infer;
pub mod kernels;
pub mod node;
pub mod op;
pub mod params;
pub mod registry;
pub mod types;

pub use core_types::DataType;
pub use descriptor::{ComputeBindings, InplaceVerdict, OperatorDescriptor, OperatorDescriptorBuilder};
pub use gradient::{BackwardSpec, GradSource, GradientRule};
pub use node::OpNode;
pub use op::{AcceleratedCompute, ComputeFn, InvocationContext, OpFactory, Outcome};
pub use params::{ParamField, ParamKind, ParamValue, ParameterBlock};
pub use registry::{OpRegistry, OpRegistryBuilder, registry};
pub use types::{InferError, Inferred, OpError, PartialShape, RegistrationError, TensorAny, TensorPosition};

#[doc(hidden)]
pub use inventory;

/// Register an operator with the inventory system.
///
/// `$build` is a `fn() -> Result<OperatorDescriptor, RegistrationError>`;
/// every `alias` becomes another name for the same descriptor.
#[macro_export]
macro_rules! register_op {
    ($build:path $(, alias = $alias:literal)* $(,)?) => {
        $crate::inventory::submit! {
            $crate::OpFactory {
                build:   $build,
                aliases: &[$($alias),*],
            }
        }
    };
}
