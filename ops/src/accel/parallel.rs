use std::marker::PhantomData;

use anyhow::anyhow;
use rayon::prelude::*;
use tracing::debug;

use super::DenseF32Call;
use crate::builtin::SCALAR;
use crate::kernels::ScalarKernel;
use crate::op::{AcceleratedCompute, InvocationContext, Outcome};
use crate::params::ParameterBlock;
use crate::types::OpError;

/// Data-parallel `out = K(x, scalar)` over contiguous `f32` buffers.
///
/// Works on the buffers directly instead of gathering through views, and
/// splits the elements across the rayon pool. An in-place call is updated
/// under a single write lock.
pub struct ParallelElemwise<K> {
    _kernel: PhantomData<fn() -> K>,
}

impl<K: ScalarKernel> ParallelElemwise<K> {
    pub fn new() -> Self {
        Self { _kernel: PhantomData }
    }
}

impl<K: ScalarKernel> Default for ParallelElemwise<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn apply<K: ScalarKernel>(x: f32, scalar: f64) -> f32 {
    K::map(x as f64, scalar) as f32
}

impl<K: ScalarKernel> AcceleratedCompute for ParallelElemwise<K> {
    fn name(&self) -> &'static str {
        "parallel_elemwise"
    }

    fn try_compute(&self, params: &ParameterBlock, ctx: &InvocationContext<'_>) -> Result<Outcome, OpError> {
        let call = match DenseF32Call::check(ctx) {
            Ok(call) => call,
            Err(reason) => {
                debug!(op = params.owner(), kernel = K::NAME, reason, "parallel path declined");
                return Ok(Outcome::Declined);
            }
        };
        let scalar = params.float(SCALAR)?;
        let n = call.input.view().numel();
        let in_off = call.input.view().offset as usize;
        let out_off = call.output.view().offset as usize;
        let out_id = call.output.buffer_id();

        let written = if call.in_place() {
            ctx.memory.with_slice_mut::<f32, _>(out_id, |buf| {
                buf.get_mut(out_off..out_off + n)
                    .map(|dst| dst.par_iter_mut().for_each(|v| *v = apply::<K>(*v, scalar)))
                    .is_some()
            })?
        } else {
            let values = ctx
                .memory
                .with_slice::<f32, _>(call.input.buffer_id(), |buf| {
                    buf.get(in_off..in_off + n)
                        .map(|src| src.par_iter().map(|&x| apply::<K>(x, scalar)).collect::<Vec<f32>>())
                })?
                .ok_or_else(|| anyhow!("input view out of bounds for {}", call.input.buffer_id()))?;
            ctx.memory.with_slice_mut::<f32, _>(out_id, |buf| {
                buf.get_mut(out_off..out_off + n).map(|dst| dst.copy_from_slice(&values)).is_some()
            })?
        };

        if !written {
            return Err(anyhow!("output view out of bounds for {out_id}").into());
        }
        Ok(Outcome::Handled)
    }
}
