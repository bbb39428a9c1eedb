//! Inference rules shared by elementwise operators.

use core_types::{DataType, DeviceKind, DispatchKey, StorageKind};

use crate::params::ParameterBlock;
use crate::types::{InferError, Inferred, PartialShape, TensorPosition};

fn positions(n_in: usize, n_out: usize) -> impl Iterator<Item = TensorPosition> {
    (0..n_in).map(TensorPosition::Input).chain((0..n_out).map(TensorPosition::Output))
}

/// Every declared input and output has one common shape.
///
/// Known dimensions anywhere fill unknown ones everywhere; a conflict is
/// reported at the first tensor that disagrees with what came before it.
pub fn elemwise_shape(
    _params: &ParameterBlock,
    inputs:  &[PartialShape],
    outputs: &[PartialShape],
) -> Result<Inferred<PartialShape>, InferError> {
    let mut common = PartialShape::unknown();
    for (position, shape) in positions(inputs.len(), outputs.len()).zip(inputs.iter().chain(outputs)) {
        common = common.merge(shape).ok_or_else(|| InferError::Shape {
            position,
            expected: common.clone(),
            found: shape.clone(),
        })?;
    }
    Ok(Inferred {
        inputs:  vec![common.clone(); inputs.len()],
        outputs: vec![common; outputs.len()],
    })
}

/// Every declared input and output has one common element type.
pub fn elemwise_type(
    _params: &ParameterBlock,
    inputs:  &[Option<DataType>],
    outputs: &[Option<DataType>],
) -> Result<Inferred<Option<DataType>>, InferError> {
    let mut common: Option<DataType> = None;
    for (position, dtype) in positions(inputs.len(), outputs.len()).zip(inputs.iter().chain(outputs)) {
        match (common, *dtype) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(InferError::Type { position, expected, found });
            }
            (None, Some(found)) => common = Some(found),
            _ => {}
        }
    }
    Ok(Inferred {
        inputs:  vec![common; inputs.len()],
        outputs: vec![common; outputs.len()],
    })
}

/// All-dense inputs dispatch dense; otherwise the first sparse kind decides.
pub fn elemwise_storage(_params: &ParameterBlock, device: DeviceKind, inputs: &[StorageKind]) -> DispatchKey {
    let storage = inputs
        .iter()
        .copied()
        .find(|s| *s != StorageKind::Dense)
        .unwrap_or(StorageKind::Dense);
    DispatchKey::new(device, storage)
}
