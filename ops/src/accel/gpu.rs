//! Power kernel on a `wgpu` device.

use std::sync::OnceLock;

use anyhow::Result;
use core_types::DataType;
use opattr_gpu::types::BufferKind;
use opattr_gpu::{GpuContext, KernelManager};
use tracing::debug;

use super::DenseF32Call;
use crate::builtin::SCALAR;
use crate::op::{AcceleratedCompute, InvocationContext, Outcome};
use crate::params::ParameterBlock;
use crate::types::OpError;

const WORKGROUP_SIZE: u32 = 64;

const POWER_SRC: &str = r#"
@group(0) @binding(0) var<storage, read>       X: array<f32>;
@group(0) @binding(1) var<storage, read>       P: array<f32>;
@group(0) @binding(2) var<storage, read_write> Y: array<f32>;

@compute @workgroup_size(64)
fn power_scalar(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i < arrayLength(&Y)) {
        Y[i] = pow(X[i], P[0]);
    }
}
"#;

static RUNTIME: OnceLock<Option<KernelManager>> = OnceLock::new();

/// Shared device and pipeline cache, `None` when no adapter is available.
fn runtime() -> Option<&'static KernelManager> {
    RUNTIME
        .get_or_init(|| match pollster::block_on(GpuContext::new()) {
            Ok(ctx) => Some(KernelManager::new(ctx)),
            Err(err) => {
                debug!(error = %err, "no gpu available, gpu bindings will decline");
                None
            }
        })
        .as_ref()
}

/// `x ^ scalar` as a WGSL compute shader.
///
/// WGSL leaves `pow` undefined for negative bases, for a zero base with a
/// non-positive exponent, and for non-finite values; such calls decline.
pub struct GpuPower;

impl GpuPower {
    fn run(kernels: &KernelManager, x: &[f32], p: f32) -> Result<Vec<f32>> {
        let ctx = kernels.context();
        let (pipeline, layout) = kernels.get(POWER_SRC, "power_scalar", vec![DataType::F32], vec![DataType::F32], 1)?;

        let bytes = std::mem::size_of_val(x) as u64;
        let x_buf = ctx.create_buffer_with_data(bytemuck::cast_slice(x), BufferKind::Main);
        let p_buf = ctx.create_buffer_with_data(bytemuck::bytes_of(&p), BufferKind::Main);
        let y_buf = ctx.create_buffer(bytes, BufferKind::Main);
        let staging = ctx.create_buffer(bytes, BufferKind::Download);

        ctx.dispatch_compute_1d(&pipeline, &layout, &[&x_buf, &p_buf], &[&y_buf], x.len() as u32, WORKGROUP_SIZE);
        ctx.copy_buffer_to_buffer(&y_buf, &staging, bytes);
        Ok(decode_f32(&ctx.read_buffer(&staging)?))
    }
}

/// Downloaded bytes as `f32`s; the staging buffer carries no alignment guarantee.
fn decode_f32(raw: &[u8]) -> Vec<f32> {
    bytemuck::pod_collect_to_vec(raw)
}

/// `pow` has a defined WGSL result for every element
fn pow_defined(x: &[f32], p: f32) -> bool {
    p.is_finite() && x.iter().all(|&v| v.is_finite() && v >= 0.0 && !(v == 0.0 && p <= 0.0))
}

impl AcceleratedCompute for GpuPower {
    fn name(&self) -> &'static str {
        "wgpu_power"
    }

    fn try_compute(&self, params: &ParameterBlock, ctx: &InvocationContext<'_>) -> Result<Outcome, OpError> {
        let call = match DenseF32Call::check(ctx) {
            Ok(call) => call,
            Err(reason) => {
                debug!(op = params.owner(), reason, "gpu path declined");
                return Ok(Outcome::Declined);
            }
        };
        let p = params.float(SCALAR)? as f32;
        let x = call.input.to_vec(ctx.memory)?;
        if !pow_defined(&x, p) {
            debug!(op = params.owner(), "gpu path declined: pow undefined for these values");
            return Ok(Outcome::Declined);
        }

        let Some(kernels) = runtime() else {
            return Ok(Outcome::Declined);
        };
        if x.len() as u64 > kernels.context().max_elems_1d(WORKGROUP_SIZE) {
            debug!(op = params.owner(), "gpu path declined: dispatch too large");
            return Ok(Outcome::Declined);
        }

        // Nothing has been written yet, so a device failure is still a decline.
        let y = match Self::run(kernels, &x, p) {
            Ok(y) => y,
            Err(err) => {
                debug!(op = params.owner(), error = %err, "gpu execution failed, declining");
                return Ok(Outcome::Declined);
            }
        };
        ctx.memory.scatter(call.output.buffer_id(), call.output.view(), &y, |_, new| new)?;
        Ok(Outcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamField;
    use core_types::Device;
    use memory::MemoryManager;
    use tensor::Tensor;

    fn block(scalar: &str) -> ParameterBlock {
        ParameterBlock::parse("_power_scalar", &[ParamField::float(SCALAR, Some(1.0), "")], [(SCALAR, scalar)]).unwrap()
    }

    #[test]
    fn pow_domain() {
        assert!(pow_defined(&[0.0, 1.5, 4.0], 2.0));
        assert!(!pow_defined(&[-1.0, 2.0], 2.0));
        assert!(!pow_defined(&[0.0], 0.0));
        assert!(!pow_defined(&[0.0], -1.0));
        assert!(!pow_defined(&[1.0, f32::NAN], 2.0));
        assert!(!pow_defined(&[1.0], f32::INFINITY));
    }

    #[test]
    fn downloads_decode_from_unaligned_bytes() {
        let values = [1.0f32, -2.5, 3.25];
        let mut raw = vec![0u8];
        raw.extend_from_slice(bytemuck::cast_slice(&values));
        assert_eq!(decode_f32(&raw[1..]), values.to_vec());
    }

    #[test]
    fn negative_bases_decline() {
        let mm = MemoryManager::new();
        let x = Tensor::<f32>::from_vec(&mm, &[-1.0, 2.0], &[2], Device::cpu()).unwrap();
        let y = Tensor::<f32>::from_vec(&mm, &[9.0, 9.0], &[2], Device::cpu()).unwrap();
        let ctx = InvocationContext::new(&mm, vec![x.into()], vec![y.clone().into()]);
        assert_eq!(GpuPower.try_compute(&block("2"), &ctx).unwrap(), Outcome::Declined);
        assert_eq!(y.to_vec(&mm).unwrap(), vec![9.0, 9.0]);
    }

    #[test]
    fn matches_host_power_when_a_device_exists() {
        let mm = MemoryManager::new();
        let x = Tensor::<f32>::from_vec(&mm, &[1.0, 2.0, 3.0, 4.0], &[4], Device::cpu()).unwrap();
        let y = Tensor::<f32>::empty(&mm, &[4], Device::cpu()).unwrap();
        let ctx = InvocationContext::new(&mm, vec![x.into()], vec![y.clone().into()]);
        if GpuPower.try_compute(&block("2"), &ctx).unwrap() == Outcome::Declined {
            return;
        }
        let got = y.to_vec(&mm).unwrap();
        for (g, want) in got.iter().zip([1.0f32, 4.0, 9.0, 16.0]) {
            assert!((g - want).abs() <= 1e-3 * want);
        }
    }
}
