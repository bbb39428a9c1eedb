use std::sync::Arc;

use crate::descriptor::OperatorDescriptor;
use crate::types::{OpError, RegistrationError};

/// How a forward operator is differentiated.
///
/// The name is the backward operator the rule binds to. Its inputs are
/// always the upstream gradients first, then what the rule consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GradientRule {
    /// Not differentiable
    #[default]
    None,
    /// Backward consumes the forward inputs
    UsesInput(&'static str),
    /// Backward consumes the forward outputs
    UsesOutput(&'static str),
    /// Backward consumes the forward inputs, then the forward outputs
    UsesInputOutput(&'static str),
}

impl GradientRule {
    pub fn backward_op(&self) -> Option<&'static str> {
        match *self {
            GradientRule::None => None,
            GradientRule::UsesInput(b) | GradientRule::UsesOutput(b) | GradientRule::UsesInputOutput(b) => Some(b),
        }
    }

    /// Positional arguments of the backward invocation
    pub fn sources(&self, num_inputs: usize, num_outputs: usize) -> Vec<GradSource> {
        let (with_inputs, with_outputs) = match self {
            GradientRule::None => return Vec::new(),
            GradientRule::UsesInput(_) => (true, false),
            GradientRule::UsesOutput(_) => (false, true),
            GradientRule::UsesInputOutput(_) => (true, true),
        };

        let mut sources: Vec<GradSource> = (0..num_outputs).map(GradSource::OutputGrad).collect();
        if with_inputs {
            sources.extend((0..num_inputs).map(GradSource::ForwardInput));
        }
        if with_outputs {
            sources.extend((0..num_outputs).map(GradSource::ForwardOutput));
        }
        sources
    }
}

/// Where one argument of a backward invocation comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GradSource {
    /// Upstream gradient of forward output `i`
    OutputGrad(usize),
    /// Forward input `i`
    ForwardInput(usize),
    /// Forward output `i`
    ForwardOutput(usize),
}

/// A backward invocation derived from a forward operator's gradient rule.
#[derive(Clone)]
pub struct BackwardSpec {
    pub forward:  Arc<OperatorDescriptor>,
    pub backward: Arc<OperatorDescriptor>,
    pub sources:  Vec<GradSource>,
}

impl std::fmt::Debug for BackwardSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackwardSpec")
            .field("forward", &self.forward.name())
            .field("backward", &self.backward.name())
            .field("sources", &self.sources)
            .finish()
    }
}

impl BackwardSpec {
    /// Assemble the backward arguments in positional order.
    pub fn gather<T: Clone>(&self, out_grads: &[T], inputs: &[T], outputs: &[T]) -> Result<Vec<T>, OpError> {
        let fwd = &self.forward;
        let check = |what: &'static str, expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(OpError::ArityMismatch { op: fwd.name().to_string(), what, expected, found })
            }
        };
        check("output gradients", fwd.num_outputs(), out_grads.len())?;
        check("inputs", fwd.num_inputs(), inputs.len())?;
        check("outputs", fwd.num_outputs(), outputs.len())?;

        Ok(self
            .sources
            .iter()
            .map(|src| match *src {
                GradSource::OutputGrad(i) => out_grads[i].clone(),
                GradSource::ForwardInput(i) => inputs[i].clone(),
                GradSource::ForwardOutput(i) => outputs[i].clone(),
            })
            .collect())
    }
}

/// Derive the backward invocation of `forward`, resolving names with `lookup`.
pub(crate) fn bind<'r>(
    forward: &Arc<OperatorDescriptor>,
    lookup: impl Fn(&str) -> Option<&'r Arc<OperatorDescriptor>>,
) -> Result<Option<BackwardSpec>, RegistrationError> {
    let rule = forward.gradient();
    let Some(name) = rule.backward_op() else {
        return Ok(None);
    };
    let backward = lookup(name).ok_or_else(|| RegistrationError::UnknownBackward {
        op: forward.name().to_string(),
        backward: name.to_string(),
    })?;

    let sources = rule.sources(forward.num_inputs(), forward.num_outputs());
    if backward.num_inputs() != sources.len() {
        return Err(RegistrationError::BackwardInputs {
            op: forward.name().to_string(),
            backward: name.to_string(),
            expected: sources.len(),
            found: backward.num_inputs(),
        });
    }
    if backward.num_outputs() != forward.num_inputs() {
        return Err(RegistrationError::BackwardOutputs {
            op: forward.name().to_string(),
            backward: name.to_string(),
            expected: forward.num_inputs(),
            found: backward.num_outputs(),
        });
    }

    Ok(Some(BackwardSpec { forward: forward.clone(), backward: backward.clone(), sources }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_put_gradients_first() {
        use GradSource::*;
        assert_eq!(GradientRule::UsesInput("b").sources(1, 1), vec![OutputGrad(0), ForwardInput(0)]);
        assert_eq!(GradientRule::UsesOutput("b").sources(1, 1), vec![OutputGrad(0), ForwardOutput(0)]);
        assert_eq!(
            GradientRule::UsesInputOutput("b").sources(2, 1),
            vec![OutputGrad(0), ForwardInput(0), ForwardInput(1), ForwardOutput(0)]
        );
        assert!(GradientRule::None.sources(1, 1).is_empty());
        assert_eq!(GradientRule::None.backward_op(), None);
    }
}
