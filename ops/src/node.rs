use std::sync::Arc;

use crate::descriptor::OperatorDescriptor;
use crate::gradient::BackwardSpec;
use crate::params::ParameterBlock;
use crate::registry::OpRegistry;
use crate::types::OpError;

/// One operator instance in a graph: a descriptor plus its parsed parameters.
#[derive(Clone, Debug)]
pub struct OpNode {
    descriptor: Arc<OperatorDescriptor>,
    params:     ParameterBlock,
}

impl OpNode {
    /// Instantiate `name` (or an alias of it) from a string configuration.
    pub fn new<I, K, V>(registry: &OpRegistry, name: &str, config: I) -> Result<Self, OpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::from_descriptor(registry.lookup(name)?.clone(), config)
    }

    pub fn from_descriptor<I, K, V>(descriptor: Arc<OperatorDescriptor>, config: I) -> Result<Self, OpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = descriptor.parse_params(config)?;
        Ok(Self { descriptor, params })
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<OperatorDescriptor> {
        &self.descriptor
    }

    pub fn params(&self) -> &ParameterBlock {
        &self.params
    }

    /// The node computing this node's input gradients.
    ///
    /// It shares this node's parameters; the returned spec orders its
    /// arguments.
    pub fn backward_node(&self, registry: &OpRegistry) -> Result<Option<(OpNode, BackwardSpec)>, OpError> {
        let Some(spec) = registry.bind_gradient(self.name())? else {
            return Ok(None);
        };
        let node = OpNode {
            descriptor: spec.backward.clone(),
            params:     self.params.reowned(spec.backward.name()),
        };
        Ok(Some((node, spec)))
    }
}
