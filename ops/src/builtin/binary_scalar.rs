//! Shared plumbing of `tensor ⊙ scalar` operators and their backward passes.

use core_types::{DispatchKey, Element, WriteMode};
use memory::MemoryManager;

use super::SCALAR;
use crate::descriptor::{OperatorDescriptor, OperatorDescriptorBuilder};
use crate::gradient::GradientRule;
use crate::kernels::ScalarKernel;
use crate::op::InvocationContext;
use crate::params::{ParamField, ParameterBlock};
use crate::types::{OpError, TensorAny, TensorPosition};

fn scalar_field() -> ParamField {
    ParamField::float(SCALAR, Some(1.0), "scalar operand")
}

/// One input, one output, identity shape and type, output may reuse the input.
pub fn forward<K: ScalarKernel>(name: &str, gradient: GradientRule) -> OperatorDescriptorBuilder {
    OperatorDescriptor::builder(name)
        .num_inputs(1)
        .num_outputs(1)
        .param(scalar_field())
        .inplace(0, 0)
        .gradient(gradient)
        .compute(DispatchKey::CPU_DENSE, compute::<K>)
}

/// Inputs `(ograd, forward tensor)`; the input gradient may reuse either buffer.
pub fn backward<K: ScalarKernel>(name: &str) -> OperatorDescriptorBuilder {
    OperatorDescriptor::builder(name)
        .num_inputs(2)
        .num_outputs(1)
        .param(scalar_field())
        .inplace(0, 0)
        .inplace(0, 1)
        .compute(DispatchKey::CPU_DENSE, compute_backward::<K>)
}

/// `out = K(x, scalar)`
pub fn compute<K: ScalarKernel>(params: &ParameterBlock, ctx: &InvocationContext<'_>) -> Result<(), OpError> {
    let scalar = params.float(SCALAR)?;
    let ([input], [output], [req]) = (ctx.inputs.as_slice(), ctx.outputs.as_slice(), ctx.req.as_slice()) else {
        return Err(arity(params, ctx, 1));
    };
    same_type(params, input, output, TensorPosition::Output(0))?;
    if !req.writes() {
        return Ok(());
    }

    dispatch_dtype!(input.dtype(), T => {
        let x = ctx.memory.gather::<T>(input.buffer_id(), input.view())?;
        let y: Vec<T> = x.into_iter().map(|a| T::from_f64(K::map(a.to_f64(), scalar))).collect();
        write_output(ctx.memory, output, *req, &y)
    })
}

/// `igrad = ograd · K(t, scalar)` where `t` is the forward input or output
pub fn compute_backward<K: ScalarKernel>(params: &ParameterBlock, ctx: &InvocationContext<'_>) -> Result<(), OpError> {
    let scalar = params.float(SCALAR)?;
    let ([ograd, fwd], [igrad], [req]) = (ctx.inputs.as_slice(), ctx.outputs.as_slice(), ctx.req.as_slice()) else {
        return Err(arity(params, ctx, 2));
    };
    same_type(params, ograd, fwd, TensorPosition::Input(1))?;
    same_type(params, ograd, igrad, TensorPosition::Output(0))?;
    if !req.writes() {
        return Ok(());
    }

    dispatch_dtype!(ograd.dtype(), T => {
        let g = ctx.memory.gather::<T>(ograd.buffer_id(), ograd.view())?;
        let t = ctx.memory.gather::<T>(fwd.buffer_id(), fwd.view())?;
        if g.len() != t.len() {
            return Err(OpError::ShapeMismatch {
                op: params.owner().to_string(),
                position: TensorPosition::Input(1),
                expected: ograd.shape().as_slice().into(),
                found: fwd.shape().as_slice().into(),
            });
        }
        let y: Vec<T> = g
            .into_iter()
            .zip(t)
            .map(|(g, t)| T::from_f64(g.to_f64() * K::map(t.to_f64(), scalar)))
            .collect();
        write_output(ctx.memory, igrad, *req, &y)
    })
}

/// Store `values` into `output` as `req` asks.
pub(crate) fn write_output<T: Element>(
    memory: &MemoryManager,
    output: &TensorAny,
    req:    WriteMode,
    values: &[T],
) -> Result<(), OpError> {
    match req {
        WriteMode::Skip => {}
        WriteMode::Overwrite | WriteMode::Inplace => {
            memory.scatter(output.buffer_id(), output.view(), values, |_, new| new)?;
        }
        WriteMode::Accumulate => {
            memory.scatter(output.buffer_id(), output.view(), values, |old, new| {
                T::from_f64(old.to_f64() + new.to_f64())
            })?;
        }
    }
    Ok(())
}

fn arity(params: &ParameterBlock, ctx: &InvocationContext<'_>, inputs: usize) -> OpError {
    let (what, expected, found) = if ctx.inputs.len() != inputs {
        ("inputs", inputs, ctx.inputs.len())
    } else if ctx.outputs.len() != 1 {
        ("outputs", 1, ctx.outputs.len())
    } else {
        ("write modes", ctx.outputs.len(), ctx.req.len())
    };
    OpError::ArityMismatch { op: params.owner().to_string(), what, expected, found }
}

fn same_type(params: &ParameterBlock, a: &TensorAny, b: &TensorAny, at: TensorPosition) -> Result<(), OpError> {
    if a.dtype() == b.dtype() {
        return Ok(());
    }
    Err(OpError::TypeMismatch { op: params.owner().to_string(), position: at, expected: a.dtype(), found: b.dtype() })
}
