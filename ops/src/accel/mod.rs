//! Accelerated compute bindings.
//!
//! Each one checks whether it can serve a call before touching any output
//! and declines otherwise; the dispatcher then runs the reference binding.

use std::sync::Arc;

use core_types::{StorageKind, WriteMode};
use tensor::Tensor;

use crate::op::{AcceleratedCompute, InvocationContext};
use crate::types::TensorAny;

#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod parallel;

pub use parallel::ParallelElemwise;

/// Highest rank the accelerated paths take
pub const MAX_ACCEL_RANK: usize = 6;

/// The accelerated binding `_power_scalar` carries in this build
pub fn power_binding() -> Arc<dyn AcceleratedCompute> {
    #[cfg(feature = "wgpu")]
    {
        Arc::new(gpu::GpuPower)
    }
    #[cfg(not(feature = "wgpu"))]
    {
        Arc::new(ParallelElemwise::<crate::kernels::Power>::new())
    }
}

/// A unary call on contiguous dense `f32` tensors of equal shape, written
/// with `Overwrite` or `Inplace`.
pub(crate) struct DenseF32Call<'c> {
    pub input:  &'c Tensor<f32>,
    pub output: &'c Tensor<f32>,
}

impl<'c> DenseF32Call<'c> {
    /// The call, or the reason an accelerated path cannot take it
    pub(crate) fn check(ctx: &'c InvocationContext<'_>) -> Result<Self, &'static str> {
        let ([TensorAny::F32(input)], [TensorAny::F32(output)], [req]) =
            (ctx.inputs.as_slice(), ctx.outputs.as_slice(), ctx.req.as_slice())
        else {
            return Err("not a single f32 input and output");
        };
        if input.storage() != StorageKind::Dense || output.storage() != StorageKind::Dense {
            return Err("sparse storage");
        }
        if !input.view().is_contiguous() || !output.view().is_contiguous() {
            return Err("strided view");
        }
        if !(1..=MAX_ACCEL_RANK).contains(&input.view().rank()) {
            return Err("unsupported rank");
        }
        if input.view().numel() == 0 {
            return Err("empty tensor");
        }
        if input.shape() != output.shape() {
            return Err("shape mismatch");
        }
        if !matches!(req, WriteMode::Overwrite | WriteMode::Inplace) {
            return Err("write mode");
        }
        Ok(Self { input, output })
    }

    /// Input and output are the same elements of the same buffer
    pub(crate) fn in_place(&self) -> bool {
        self.input.buffer_id() == self.output.buffer_id() && self.input.view() == self.output.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Device;
    use memory::MemoryManager;

    #[test]
    fn support_check() {
        let mm = MemoryManager::new();
        let x = Tensor::<f32>::from_vec(&mm, &[1.0, 2.0, 3.0, 4.0], &[2, 2], Device::cpu()).unwrap();
        let y = Tensor::<f32>::empty(&mm, &[2, 2], Device::cpu()).unwrap();

        let ctx = InvocationContext::new(&mm, vec![x.clone().into()], vec![y.clone().into()]);
        let call = DenseF32Call::check(&ctx).unwrap();
        assert!(!call.in_place());

        let ctx = InvocationContext::new(&mm, vec![x.clone().into()], vec![x.clone().into()]);
        assert!(DenseF32Call::check(&ctx).unwrap().in_place());

        let transposed = x.as_strided(&[2, 2], &[1, 2], 0).unwrap();
        let ctx = InvocationContext::new(&mm, vec![transposed.into()], vec![y.clone().into()]);
        assert_eq!(DenseF32Call::check(&ctx).err(), Some("strided view"));

        let ctx = InvocationContext::new(&mm, vec![x.clone().with_storage(StorageKind::Csr).into()], vec![y.clone().into()]);
        assert_eq!(DenseF32Call::check(&ctx).err(), Some("sparse storage"));

        let ctx = InvocationContext::new(&mm, vec![x.into()], vec![y.into()]).with_req(vec![WriteMode::Accumulate]);
        assert_eq!(DenseF32Call::check(&ctx).err(), Some("write mode"));

        let big = Tensor::<f32>::empty(&mm, &[1; 7], Device::cpu()).unwrap();
        let ctx = InvocationContext::new(&mm, vec![big.clone().into()], vec![big.into()]);
        assert_eq!(DenseF32Call::check(&ctx).err(), Some("unsupported rank"));
    }
}
