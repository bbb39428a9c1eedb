use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use core_types::{DataType, DeviceKind, DispatchKey, StorageKind};
use tracing::debug;

use crate::descriptor::OperatorDescriptor;
use crate::gradient::{self, BackwardSpec};
use crate::op::OpFactory;
use crate::params::ParameterBlock;
use crate::types::{Inferred, OpError, PartialShape, RegistrationError};

/// Mutable phase of the registry: names are added, never replaced.
#[derive(Default)]
pub struct OpRegistryBuilder {
    map: HashMap<String, Arc<OperatorDescriptor>>,
}

impl OpRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every operator submitted through `register_op!`.
    pub fn collect_inventory(&mut self) -> Result<(), RegistrationError> {
        for factory in inventory::iter::<OpFactory> {
            let desc = self.register((factory.build)()?)?;
            for alias in factory.aliases {
                self.add_alias(desc.name(), alias)?;
            }
        }
        Ok(())
    }

    /// Register a descriptor under its own name
    pub fn register(&mut self, desc: OperatorDescriptor) -> Result<Arc<OperatorDescriptor>, RegistrationError> {
        if self.map.contains_key(desc.name()) {
            return Err(RegistrationError::Duplicate(desc.name().to_string()));
        }
        let desc = Arc::new(desc);
        self.map.insert(desc.name().to_string(), desc.clone());
        Ok(desc)
    }

    /// A second name for an already registered operator
    pub fn add_alias(&mut self, existing: &str, alias: &str) -> Result<(), RegistrationError> {
        let desc = self.map.get(existing).cloned().ok_or_else(|| RegistrationError::AliasTarget {
            alias: alias.to_string(),
            target: existing.to_string(),
        })?;
        if self.map.contains_key(alias) {
            return Err(RegistrationError::Duplicate(alias.to_string()));
        }
        self.map.insert(alias.to_string(), desc);
        Ok(())
    }

    /// Validate gradient bindings and freeze the registry.
    pub fn build(self) -> Result<OpRegistry, RegistrationError> {
        for desc in self.map.values() {
            gradient::bind(desc, |name| self.map.get(name))?;
        }
        debug!(names = self.map.len(), "operator registry built");
        Ok(OpRegistry { map: self.map })
    }
}

/// Read-only name → descriptor table, safe to share between threads
pub struct OpRegistry {
    map: HashMap<String, Arc<OperatorDescriptor>>,
}

impl OpRegistry {
    pub fn builder() -> OpRegistryBuilder {
        OpRegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<OperatorDescriptor>, OpError> {
        self.map.get(name).ok_or_else(|| OpError::NotFound(name.to_string()))
    }

    /// lookup sans error
    pub fn get(&self, name: &str) -> Option<&Arc<OperatorDescriptor>> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Every registered name, aliases included, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Backward invocation of `forward`, `None` for non-differentiable operators
    pub fn bind_gradient(&self, forward: &str) -> Result<Option<BackwardSpec>, OpError> {
        let desc = self.lookup(forward)?;
        Ok(gradient::bind(desc, |name| self.map.get(name))?)
    }

    pub fn infer_shape(
        &self,
        name:    &str,
        params:  &ParameterBlock,
        inputs:  &[PartialShape],
        outputs: &[PartialShape],
    ) -> Result<Inferred<PartialShape>, OpError> {
        self.lookup(name)?.infer_shape(params, inputs, outputs)
    }

    pub fn infer_type(
        &self,
        name:    &str,
        params:  &ParameterBlock,
        inputs:  &[Option<DataType>],
        outputs: &[Option<DataType>],
    ) -> Result<Inferred<Option<DataType>>, OpError> {
        self.lookup(name)?.infer_type(params, inputs, outputs)
    }

    pub fn infer_storage(
        &self,
        name:   &str,
        params: &ParameterBlock,
        device: DeviceKind,
        inputs: &[StorageKind],
    ) -> Result<DispatchKey, OpError> {
        self.lookup(name)?.infer_storage(params, device, inputs)
    }
}

static REGISTRY: OnceLock<Result<OpRegistry, RegistrationError>> = OnceLock::new();

/// The process-wide registry of builtin operators.
///
/// Built from the inventory on first use. A registration conflict is
/// reported on this and every later call.
pub fn registry() -> Result<&'static OpRegistry, RegistrationError> {
    REGISTRY
        .get_or_init(|| {
            let mut builder = OpRegistryBuilder::new();
            builder.collect_inventory()?;
            builder.build()
        })
        .as_ref()
        .map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::{GradSource, GradientRule};
    use crate::op::InvocationContext;

    fn noop(_: &ParameterBlock, _: &InvocationContext<'_>) -> Result<(), OpError> {
        Ok(())
    }

    fn op(name: &str) -> OperatorDescriptor {
        OperatorDescriptor::builder(name).compute(DispatchKey::CPU_DENSE, noop).build().unwrap()
    }

    #[test]
    fn names_are_unique() {
        let mut b = OpRegistryBuilder::new();
        b.register(op("a")).unwrap();
        assert_eq!(b.register(op("a")).unwrap_err(), RegistrationError::Duplicate("a".into()));

        b.register(op("b")).unwrap();
        assert_eq!(b.add_alias("a", "b").unwrap_err(), RegistrationError::Duplicate("b".into()));
        assert!(matches!(b.add_alias("zzz", "c"), Err(RegistrationError::AliasTarget { .. })));
    }

    #[test]
    fn aliases_share_the_descriptor() {
        let mut b = OpRegistryBuilder::new();
        b.register(op("a")).unwrap();
        b.add_alias("a", "A").unwrap();
        let reg = b.build().unwrap();

        assert!(Arc::ptr_eq(reg.lookup("a").unwrap(), reg.lookup("A").unwrap()));
        assert_eq!(reg.names(), vec!["A", "a"]);
        assert!(matches!(reg.lookup("nope"), Err(OpError::NotFound(n)) if n == "nope"));
    }

    #[test]
    fn builtin_aliases_resolve_to_one_descriptor() {
        let reg = registry().unwrap();
        for (name, alias) in [
            ("_maximum_scalar", "_MaximumScalar"),
            ("_maximum_scalar", "_npi_maximum_scalar"),
            ("_minimum_scalar", "_MinimumScalar"),
            ("_minimum_scalar", "_npi_minimum_scalar"),
            ("_power_scalar", "_PowerScalar"),
            ("_rpower_scalar", "_RPowerScalar"),
            ("_hypot_scalar", "_HypotScalar"),
            ("_hypot_scalar", "_npi_hypot_scalar"),
            ("smooth_l1", "_npx_smooth_l1"),
        ] {
            let desc = reg.lookup(name).unwrap();
            assert!(Arc::ptr_eq(desc, reg.lookup(alias).unwrap()), "{alias} -> {name}");
            assert_eq!(desc.name(), name);
        }
    }

    #[test]
    fn build_validates_backward_operators() {
        let forward = || {
            OperatorDescriptor::builder("f")
                .compute(DispatchKey::CPU_DENSE, noop)
                .gradient(GradientRule::UsesOutput("_backward_f"))
                .build()
                .unwrap()
        };

        let mut b = OpRegistryBuilder::new();
        b.register(forward()).unwrap();
        assert!(matches!(b.build(), Err(RegistrationError::UnknownBackward { .. })));

        let mut b = OpRegistryBuilder::new();
        b.register(forward()).unwrap();
        b.register(op("_backward_f")).unwrap();
        assert!(matches!(b.build(), Err(RegistrationError::BackwardInputs { expected: 2, found: 1, .. })));

        let mut b = OpRegistryBuilder::new();
        b.register(forward()).unwrap();
        b.register(
            OperatorDescriptor::builder("_backward_f")
                .num_inputs(2)
                .compute(DispatchKey::CPU_DENSE, noop)
                .build()
                .unwrap(),
        )
        .unwrap();
        let reg = b.build().unwrap();
        let spec = reg.bind_gradient("f").unwrap().unwrap();
        assert_eq!(spec.backward.name(), "_backward_f");
        assert_eq!(spec.sources, vec![GradSource::OutputGrad(0), GradSource::ForwardOutput(0)]);
        assert!(reg.bind_gradient("_backward_f").unwrap().is_none());
    }
}
