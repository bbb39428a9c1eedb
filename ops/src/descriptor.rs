use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use core_types::{DataType, DeviceKind, DispatchKey, StorageKind};

use crate::gradient::GradientRule;
use crate::infer::{elemwise_shape, elemwise_storage, elemwise_type};
use crate::op::{AcceleratedCompute, ComputeFn};
use crate::params::{ParamField, ParameterBlock};
use crate::types::{InferError, Inferred, OpError, PartialShape, RegistrationError};

pub type ShapeInferFn =
    fn(&ParameterBlock, &[PartialShape], &[PartialShape]) -> Result<Inferred<PartialShape>, InferError>;

pub type TypeInferFn =
    fn(&ParameterBlock, &[Option<DataType>], &[Option<DataType>]) -> Result<Inferred<Option<DataType>>, InferError>;

pub type StorageInferFn = fn(&ParameterBlock, DeviceKind, &[StorageKind]) -> DispatchKey;

/// Compute functions registered under one dispatch key
#[derive(Clone, Default)]
pub struct ComputeBindings {
    pub reference:   Option<ComputeFn>,
    pub accelerated: Option<Arc<dyn AcceleratedCompute>>,
}

/// Scheduler advice for one output buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InplaceVerdict {
    /// Write into the buffer of this input
    Reuse(usize),
    /// Allocate a fresh buffer
    Fresh,
}

/// Registry entry for one named operator. Immutable once built.
pub struct OperatorDescriptor {
    name:          String,
    description:   &'static str,
    num_inputs:    usize,
    num_outputs:   usize,
    params:        Vec<ParamField>,
    shape_infer:   ShapeInferFn,
    type_infer:    TypeInferFn,
    storage_infer: StorageInferFn,
    claims:        Vec<DispatchKey>,
    inplace:       Vec<(usize, usize)>,
    gradient:      GradientRule,
    bindings:      HashMap<DispatchKey, ComputeBindings>,
}

impl OperatorDescriptor {
    pub fn builder(name: impl Into<String>) -> OperatorDescriptorBuilder {
        OperatorDescriptorBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn params(&self) -> &[ParamField] {
        &self.params
    }

    pub fn gradient(&self) -> GradientRule {
        self.gradient
    }

    /// Dispatch keys the storage rule may produce
    pub fn claims(&self) -> &[DispatchKey] {
        &self.claims
    }

    /// Declared `(output, input)` reuse pairs
    pub fn inplace_pairs(&self) -> &[(usize, usize)] {
        &self.inplace
    }

    pub fn may_alias(&self, output: usize, input: usize) -> bool {
        self.inplace.contains(&(output, input))
    }

    pub fn bindings(&self, key: DispatchKey) -> Option<&ComputeBindings> {
        self.bindings.get(&key)
    }

    /// Parse a node configuration against the declared fields.
    pub fn parse_params<I, K, V>(&self, config: I) -> Result<ParameterBlock, OpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        ParameterBlock::parse(&self.name, &self.params, config)
    }

    pub fn infer_shape(
        &self,
        params:  &ParameterBlock,
        inputs:  &[PartialShape],
        outputs: &[PartialShape],
    ) -> Result<Inferred<PartialShape>, OpError> {
        self.check_arity(inputs.len(), outputs.len())?;
        (self.shape_infer)(params, inputs, outputs).map_err(|e| OpError::from_infer(&self.name, e))
    }

    pub fn infer_type(
        &self,
        params:  &ParameterBlock,
        inputs:  &[Option<DataType>],
        outputs: &[Option<DataType>],
    ) -> Result<Inferred<Option<DataType>>, OpError> {
        self.check_arity(inputs.len(), outputs.len())?;
        (self.type_infer)(params, inputs, outputs).map_err(|e| OpError::from_infer(&self.name, e))
    }

    /// Dispatch key for inputs of the given storage kinds on `device`
    pub fn infer_storage(
        &self,
        params: &ParameterBlock,
        device: DeviceKind,
        inputs: &[StorageKind],
    ) -> Result<DispatchKey, OpError> {
        self.check_arity(inputs.len(), self.num_outputs)?;
        Ok((self.storage_infer)(params, device, inputs))
    }

    /// Which outputs may be computed in the buffer of an input.
    ///
    /// Takes the concrete `(shape, type)` of every input and output. An
    /// output reuses the first declared input that matches it exactly and
    /// that no earlier output already took.
    pub fn plan_inplace(
        &self,
        inputs:  &[(&[usize], DataType)],
        outputs: &[(&[usize], DataType)],
    ) -> Vec<InplaceVerdict> {
        let mut taken = HashSet::new();
        outputs
            .iter()
            .enumerate()
            .map(|(o, out)| {
                let candidate = self.inplace.iter().filter(|(po, _)| *po == o).map(|(_, i)| *i).find(|&i| {
                    !taken.contains(&i) && inputs.get(i).is_some_and(|inp| inp.0 == out.0 && inp.1 == out.1)
                });
                match candidate {
                    Some(i) => {
                        taken.insert(i);
                        InplaceVerdict::Reuse(i)
                    }
                    None => InplaceVerdict::Fresh,
                }
            })
            .collect()
    }

    pub(crate) fn check_arity(&self, inputs: usize, outputs: usize) -> Result<(), OpError> {
        if inputs != self.num_inputs {
            return Err(OpError::ArityMismatch {
                op: self.name.clone(),
                what: "inputs",
                expected: self.num_inputs,
                found: inputs,
            });
        }
        if outputs != self.num_outputs {
            return Err(OpError::ArityMismatch {
                op: self.name.clone(),
                what: "outputs",
                expected: self.num_outputs,
                found: outputs,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for OperatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.bindings.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("OperatorDescriptor")
            .field("name", &self.name)
            .field("num_inputs", &self.num_inputs)
            .field("num_outputs", &self.num_outputs)
            .field("inplace", &self.inplace)
            .field("gradient", &self.gradient)
            .field("bindings", &keys)
            .finish()
    }
}

/// Assembles an `OperatorDescriptor`; conflicts surface from `build`.
pub struct OperatorDescriptorBuilder {
    name:          String,
    description:   &'static str,
    num_inputs:    usize,
    num_outputs:   usize,
    params:        Vec<ParamField>,
    shape_infer:   ShapeInferFn,
    type_infer:    TypeInferFn,
    storage_infer: StorageInferFn,
    claims:        Vec<DispatchKey>,
    inplace:       Vec<(usize, usize)>,
    gradient:      GradientRule,
    reference:     Vec<(DispatchKey, ComputeFn)>,
    accelerated:   Vec<(DispatchKey, Arc<dyn AcceleratedCompute>)>,
}

impl OperatorDescriptorBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            description: "",
            num_inputs: 1,
            num_outputs: 1,
            params: Vec::new(),
            shape_infer: elemwise_shape,
            type_infer: elemwise_type,
            storage_infer: elemwise_storage,
            claims: vec![DispatchKey::CPU_DENSE],
            inplace: Vec::new(),
            gradient: GradientRule::None,
            reference: Vec::new(),
            accelerated: Vec::new(),
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn num_inputs(mut self, n: usize) -> Self {
        self.num_inputs = n;
        self
    }

    pub fn num_outputs(mut self, n: usize) -> Self {
        self.num_outputs = n;
        self
    }

    pub fn param(mut self, field: ParamField) -> Self {
        self.params.push(field);
        self
    }

    pub fn shape_infer(mut self, f: ShapeInferFn) -> Self {
        self.shape_infer = f;
        self
    }

    pub fn type_infer(mut self, f: TypeInferFn) -> Self {
        self.type_infer = f;
        self
    }

    /// Storage rule together with every key it can produce
    pub fn storage_infer(mut self, f: StorageInferFn, claims: &[DispatchKey]) -> Self {
        self.storage_infer = f;
        self.claims = claims.to_vec();
        self
    }

    /// Output `output` may be computed in the buffer of input `input`
    pub fn inplace(mut self, output: usize, input: usize) -> Self {
        self.inplace.push((output, input));
        self
    }

    pub fn gradient(mut self, rule: GradientRule) -> Self {
        self.gradient = rule;
        self
    }

    /// Reference binding for `key`
    pub fn compute(mut self, key: DispatchKey, f: ComputeFn) -> Self {
        self.reference.push((key, f));
        self
    }

    /// Accelerated binding for `key`; needs a reference binding under the same key
    pub fn accelerated(mut self, key: DispatchKey, binding: Arc<dyn AcceleratedCompute>) -> Self {
        self.accelerated.push((key, binding));
        self
    }

    pub fn build(self) -> Result<OperatorDescriptor, RegistrationError> {
        let op = || self.name.clone();

        for &(output, input) in &self.inplace {
            if output >= self.num_outputs || input >= self.num_inputs {
                return Err(RegistrationError::InvalidInplace { op: op(), output, input });
            }
        }

        let mut seen = HashSet::new();
        for field in &self.params {
            if !seen.insert(field.name) {
                return Err(RegistrationError::DuplicateParam { op: op(), field: field.name });
            }
        }

        let mut bindings: HashMap<DispatchKey, ComputeBindings> = HashMap::new();
        for &(key, f) in &self.reference {
            let slot = bindings.entry(key).or_default();
            if slot.reference.is_some() {
                return Err(RegistrationError::DuplicateBinding { op: op(), key, kind: "reference" });
            }
            slot.reference = Some(f);
        }
        for (key, binding) in &self.accelerated {
            let key = *key;
            let Some(slot) = bindings.get_mut(&key) else {
                return Err(RegistrationError::AcceleratedWithoutReference { op: op(), key });
            };
            if slot.accelerated.is_some() {
                return Err(RegistrationError::DuplicateBinding { op: op(), key, kind: "accelerated" });
            }
            slot.accelerated = Some(binding.clone());
        }

        for &key in &self.claims {
            if bindings.get(&key).is_none_or(|b| b.reference.is_none()) {
                return Err(RegistrationError::MissingBinding { op: op(), key });
            }
        }

        Ok(OperatorDescriptor {
            name: self.name,
            description: self.description,
            num_inputs: self.num_inputs,
            num_outputs: self.num_outputs,
            params: self.params,
            shape_infer: self.shape_infer,
            type_infer: self.type_infer,
            storage_infer: self.storage_infer,
            claims: self.claims,
            inplace: self.inplace,
            gradient: self.gradient,
            bindings,
        })
    }
}
