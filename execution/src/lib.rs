//! Dispatch resolver: picks and runs the compute binding of an operator node.

pub mod config;
pub mod parity;

use core_types::{BufferId, DeviceKind, Element, WriteMode};
use memory::MemoryManager;
use opattr_ops::{
    dispatch_dtype, AcceleratedCompute, ComputeFn, InvocationContext, OpError, OpNode, OpRegistry,
    OperatorDescriptor, Outcome, ParameterBlock, PartialShape, TensorAny,
};
use tensor::Tensor;
use tracing::{debug, warn};

pub use config::{DispatchConfig, Tolerance};

/// Which binding produced the outputs of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    Reference,
    Accelerated(&'static str),
    /// The named accelerated binding declined; the reference binding ran.
    Fallback(&'static str),
}

/// Runs operator nodes against their compute bindings.
///
/// Holds no mutable state: one engine can serve any number of threads.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    config: DispatchConfig,
}

impl ExecutionEngine {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Engine configured by `DispatchConfig::from_env`
    pub fn from_env() -> Self {
        Self::new(DispatchConfig::from_env())
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Instantiate `name` from `config` and dispatch it.
    pub fn dispatch_named<I, K, V>(
        &self,
        registry: &OpRegistry,
        name: &str,
        config: I,
        ctx: &InvocationContext<'_>,
    ) -> Result<DispatchPath, OpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.dispatch(&OpNode::new(registry, name, config)?, ctx)
    }

    /// Run `node` on the tensors of `ctx`.
    ///
    /// Every check happens before a binding runs, so a failed call leaves
    /// the outputs untouched.
    pub fn dispatch(&self, node: &OpNode, ctx: &InvocationContext<'_>) -> Result<DispatchPath, OpError> {
        let desc = node.descriptor();
        let params = node.params();
        let op = desc.name();

        if ctx.req.len() != ctx.outputs.len() {
            return Err(OpError::ArityMismatch {
                op: op.to_string(),
                what: "write modes",
                expected: ctx.outputs.len(),
                found: ctx.req.len(),
            });
        }

        // inferring over the concrete tensors checks arity, types and shapes
        let types = |ts: &[TensorAny]| ts.iter().map(|t| Some(t.dtype())).collect::<Vec<_>>();
        desc.infer_type(params, &types(&ctx.inputs), &types(&ctx.outputs))?;
        let shapes = |ts: &[TensorAny]| ts.iter().map(|t| PartialShape::known(&t.shape())).collect::<Vec<_>>();
        desc.infer_shape(params, &shapes(&ctx.inputs), &shapes(&ctx.outputs))?;

        let device = ctx.inputs.first().map_or(DeviceKind::Cpu, |t| t.device().kind);
        let storages: Vec<_> = ctx.inputs.iter().map(TensorAny::storage).collect();
        let key = desc.infer_storage(params, device, &storages)?;
        let bindings = desc.bindings(key);
        let Some(reference) = bindings.and_then(|b| b.reference) else {
            return Err(OpError::UnsupportedDispatch { op: op.to_string(), key });
        };

        check_aliasing(desc, ctx)?;

        let accelerated = bindings.and_then(|b| b.accelerated.as_deref()).filter(|_| self.config.accelerate);
        debug!(op, %key, accelerated = accelerated.map(|a| a.name()), "dispatch");

        match (accelerated, self.config.verify) {
            (None, _) => {
                reference(params, ctx)?;
                Ok(DispatchPath::Reference)
            }
            (Some(fast), None) => accelerate(op, fast, reference, params, ctx),
            (Some(fast), Some(tol)) => {
                let scratch = Scratch::for_outputs(ctx)?;
                let ref_ctx = InvocationContext {
                    inputs:  ctx.inputs.clone(),
                    outputs: scratch.outputs.clone(),
                    req:     ctx.req.iter().map(|r| if *r == WriteMode::Inplace { WriteMode::Overwrite } else { *r }).collect(),
                    memory:  ctx.memory,
                };
                reference(params, &ref_ctx)?;
                let path = accelerate(op, fast, reference, params, ctx)?;
                scratch.compare(op, ctx, tol)?;
                Ok(path)
            }
        }
    }
}

fn accelerate(
    op: &str,
    fast: &dyn AcceleratedCompute,
    reference: ComputeFn,
    params: &ParameterBlock,
    ctx: &InvocationContext<'_>,
) -> Result<DispatchPath, OpError> {
    match fast.try_compute(params, ctx)? {
        Outcome::Handled => Ok(DispatchPath::Accelerated(fast.name())),
        Outcome::Declined => {
            debug!(op, binding = fast.name(), "accelerated binding declined, running reference");
            reference(params, ctx)?;
            Ok(DispatchPath::Fallback(fast.name()))
        }
    }
}

/// Reject buffer sharing the operator's in-place policy does not allow.
fn check_aliasing(desc: &OperatorDescriptor, ctx: &InvocationContext<'_>) -> Result<(), OpError> {
    let violation = |output: usize, reason: String| OpError::AliasingViolation {
        op: desc.name().to_string(),
        output,
        reason,
    };

    for (o, (out, req)) in ctx.outputs.iter().zip(&ctx.req).enumerate() {
        if !req.writes() {
            continue;
        }
        let id = out.buffer_id();

        if let Some(other) = ctx.outputs[..o]
            .iter()
            .zip(&ctx.req)
            .position(|(prev, r)| r.writes() && prev.buffer_id() == id)
        {
            return Err(violation(o, format!("shares its buffer with output {other}")));
        }

        let shared: Vec<(usize, &TensorAny)> =
            ctx.inputs.iter().enumerate().filter(|(_, inp)| inp.buffer_id() == id).collect();

        if *req != WriteMode::Inplace {
            if let Some((i, _)) = shared.first() {
                return Err(violation(o, format!("shares its buffer with input {i} without an in-place request")));
            }
            continue;
        }

        if shared.is_empty() {
            return Err(violation(o, "in-place request, but the buffer belongs to no input".to_string()));
        }
        for (i, inp) in shared {
            if !desc.may_alias(o, i) {
                return Err(violation(o, format!("reuse of input {i} is not declared")));
            }
            if inp.dtype() != out.dtype() {
                return Err(violation(o, format!("input {i} is {}, output is {}", inp.dtype(), out.dtype())));
            }
            if inp.view() != out.view() {
                return Err(violation(o, format!("input {i} views the buffer differently")));
            }
        }
    }
    Ok(())
}

/// Reference outputs for a verified call, released when dropped.
struct Scratch<'m> {
    memory:  &'m MemoryManager,
    ids:     Vec<BufferId>,
    outputs: Vec<TensorAny>,
}

impl<'m> Scratch<'m> {
    /// Fresh copies of every written output. Skipped outputs stay as they are.
    fn for_outputs(ctx: &InvocationContext<'m>) -> Result<Self, OpError> {
        let mut scratch = Scratch { memory: ctx.memory, ids: Vec::new(), outputs: Vec::new() };
        for (out, req) in ctx.outputs.iter().zip(&ctx.req) {
            if !req.writes() {
                scratch.outputs.push(out.clone());
                continue;
            }
            let copy: TensorAny = dispatch_dtype!(out.dtype(), T => {
                let current = ctx.memory.gather::<T>(out.buffer_id(), out.view())?;
                Tensor::<T>::from_vec(ctx.memory, &current, &out.shape(), out.device())?.into()
            });
            scratch.ids.push(copy.buffer_id());
            scratch.outputs.push(copy);
        }
        Ok(scratch)
    }

    fn compare(&self, op: &str, ctx: &InvocationContext<'_>, tol: Tolerance) -> Result<(), OpError> {
        for (o, ((expected, actual), req)) in self.outputs.iter().zip(&ctx.outputs).zip(&ctx.req).enumerate() {
            if !req.writes() {
                continue;
            }
            let reference = to_f64(self.memory, expected)?;
            let accelerated = to_f64(self.memory, actual)?;
            if let Some((index, reference, accelerated)) = parity::first_mismatch(&reference, &accelerated, tol) {
                warn!(op, output = o, index, reference, accelerated, "accelerated binding diverges from reference");
                return Err(OpError::NumericalParity { op: op.to_string(), output: o, index, reference, accelerated });
            }
        }
        Ok(())
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.memory.release(id);
        }
    }
}

fn to_f64(memory: &MemoryManager, t: &TensorAny) -> Result<Vec<f64>, OpError> {
    Ok(dispatch_dtype!(t.dtype(), T => {
        memory.gather::<T>(t.buffer_id(), t.view())?.into_iter().map(Element::to_f64).collect()
    }))
}
