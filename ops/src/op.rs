use core_types::WriteMode;
use memory::MemoryManager;

use crate::descriptor::OperatorDescriptor;
use crate::params::ParameterBlock;
use crate::types::{OpError, RegistrationError, TensorAny};

/// Per-call bundle handed to a compute binding.
///
/// Lives for one compute call: the input views, one output view and one
/// write mode per output, and the memory the views point into.
#[derive(Clone)]
pub struct InvocationContext<'a> {
    pub inputs:  Vec<TensorAny>,
    pub outputs: Vec<TensorAny>,
    pub req:     Vec<WriteMode>,
    pub memory:  &'a MemoryManager,
}

impl<'a> InvocationContext<'a> {
    /// Context that overwrites every output
    pub fn new(memory: &'a MemoryManager, inputs: Vec<TensorAny>, outputs: Vec<TensorAny>) -> Self {
        let req = vec![WriteMode::Overwrite; outputs.len()];
        Self { inputs, outputs, req, memory }
    }

    pub fn with_req(mut self, req: Vec<WriteMode>) -> Self {
        self.req = req;
        self
    }
}

/// Reference compute binding: a plain function, stateless by construction.
pub type ComputeFn = for<'p, 'c, 'm> fn(&'p ParameterBlock, &'c InvocationContext<'m>) -> Result<(), OpError>;

/// What an accelerated binding did with a call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Outputs are written and complete.
    Handled,
    /// Nothing was written; the reference binding must run instead.
    Declined,
}

/// Optimised compute path with a guaranteed reference fallback.
///
/// An implementation decides whether it can serve a call before it writes
/// anything: `Declined` must leave every output untouched. Work submitted to
/// another executor has to be complete before `Handled` is returned.
pub trait AcceleratedCompute: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_compute(&self, params: &ParameterBlock, ctx: &InvocationContext<'_>) -> Result<Outcome, OpError>;
}

/// Wrapper for operator factory functions collected by `inventory`
pub struct OpFactory {
    pub build:   fn() -> Result<OperatorDescriptor, RegistrationError>,
    pub aliases: &'static [&'static str],
}

// Collect all registered ops
inventory::collect!(OpFactory);
