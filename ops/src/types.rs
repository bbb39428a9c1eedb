use std::fmt;

use core_types::{BufferId, DataType, Device, DispatchKey, StorageKind, ViewDescriptor};
use derive_more::From;
use tensor::Tensor;

include!(concat!(env!("OUT_DIR"), "/generated_tensor_any.rs"));

/// A shape that may be only partly known during graph construction.
///
/// `None` rank means nothing is known; a known rank may still hold unknown
/// (`None`) dimensions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PartialShape(Option<Vec<Option<usize>>>);

impl PartialShape {
    pub fn unknown() -> Self {
        Self(None)
    }

    pub fn known(dims: &[usize]) -> Self {
        Self(Some(dims.iter().copied().map(Some).collect()))
    }

    /// Known rank, some dimensions possibly unknown
    pub fn with_dims(dims: Vec<Option<usize>>) -> Self {
        Self(Some(dims))
    }

    pub fn rank(&self) -> Option<usize> {
        self.0.as_ref().map(Vec::len)
    }

    pub fn dims(&self) -> Option<&[Option<usize>]> {
        self.0.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.0.as_ref().is_some_and(|d| d.iter().all(Option::is_some))
    }

    /// The concrete shape, when every dimension is known
    pub fn to_shape(&self) -> Option<Vec<usize>> {
        self.0.as_ref()?.iter().copied().collect()
    }

    /// Most specific shape consistent with both, `None` when they conflict.
    pub fn merge(&self, other: &PartialShape) -> Option<PartialShape> {
        match (&self.0, &other.0) {
            (None, _) => Some(other.clone()),
            (_, None) => Some(self.clone()),
            (Some(a), Some(b)) => {
                if a.len() != b.len() {
                    return None;
                }
                a.iter()
                    .zip(b)
                    .map(|(x, y)| match (x, y) {
                        (Some(x), Some(y)) if x != y => Err(()),
                        (Some(x), _) => Ok(Some(*x)),
                        (None, y) => Ok(*y),
                    })
                    .collect::<Result<Vec<_>, ()>>()
                    .ok()
                    .map(PartialShape::with_dims)
            }
        }
    }
}

impl From<&[usize]> for PartialShape {
    fn from(dims: &[usize]) -> Self {
        PartialShape::known(dims)
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("?"),
            Some(dims) => {
                f.write_str("[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match d {
                        Some(d) => write!(f, "{d}")?,
                        None => f.write_str("?")?,
                    }
                }
                f.write_str("]")
            }
        }
    }
}

/// Result of shape or type inference: one entry per declared input and output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inferred<T> {
    pub inputs:  Vec<T>,
    pub outputs: Vec<T>,
}

impl<T> Inferred<T> {
    pub fn all(&self) -> impl Iterator<Item = &T> {
        self.inputs.iter().chain(&self.outputs)
    }
}

/// Which tensor of a call an error refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TensorPosition {
    Input(usize),
    Output(usize),
}

impl fmt::Display for TensorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorPosition::Input(i) => write!(f, "input {i}"),
            TensorPosition::Output(i) => write!(f, "output {i}"),
        }
    }
}

/// Inference failures, before they are attributed to an operator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferError {
    #[error("{position}: expected shape {expected}, found {found}")]
    Shape { position: TensorPosition, expected: PartialShape, found: PartialShape },
    #[error("{position}: expected {expected}, found {found}")]
    Type { position: TensorPosition, expected: DataType, found: DataType },
}

/// Errors raised while building the registry. Fatal: initialisation aborts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("operator `{0}` is already registered")]
    Duplicate(String),
    #[error("cannot alias `{alias}`: operator `{target}` is not registered")]
    AliasTarget { alias: String, target: String },
    #[error("operator `{op}` claims {key} but has no reference binding for it")]
    MissingBinding { op: String, key: DispatchKey },
    #[error("operator `{op}` has an accelerated binding for {key} but no reference binding to fall back to")]
    AcceleratedWithoutReference { op: String, key: DispatchKey },
    #[error("operator `{op}` binds more than one {kind} compute function for {key}")]
    DuplicateBinding { op: String, key: DispatchKey, kind: &'static str },
    #[error("operator `{op}`: in-place pair output {output} <- input {input} is out of range")]
    InvalidInplace { op: String, output: usize, input: usize },
    #[error("operator `{op}` declares parameter `{field}` twice")]
    DuplicateParam { op: String, field: &'static str },
    #[error("operator `{op}` binds its gradient to unknown operator `{backward}`")]
    UnknownBackward { op: String, backward: String },
    #[error("backward operator `{backward}` of `{op}` takes {found} inputs, its gradient rule supplies {expected}")]
    BackwardInputs { op: String, backward: String, expected: usize, found: usize },
    #[error("backward operator `{backward}` of `{op}` yields {found} gradients, `{op}` has {expected} inputs")]
    BackwardOutputs { op: String, backward: String, expected: usize, found: usize },
}

/// Errors during lookup, inference and dispatch
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("unknown operator `{0}`")]
    NotFound(String),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("operator `{op}` expects {expected} {what}, found {found}")]
    ArityMismatch { op: String, what: &'static str, expected: usize, found: usize },

    #[error("shape mismatch in `{op}`: {position} expected {expected}, found {found}")]
    ShapeMismatch { op: String, position: TensorPosition, expected: PartialShape, found: PartialShape },

    #[error("type mismatch in `{op}`: {position} expected {expected}, found {found}")]
    TypeMismatch { op: String, position: TensorPosition, expected: DataType, found: DataType },

    #[error("invalid parameter `{field}` for `{op}`: {reason}")]
    InvalidParameter { op: String, field: String, reason: String },

    #[error("operator `{op}` has no compute binding for {key}")]
    UnsupportedDispatch { op: String, key: DispatchKey },

    #[error("accelerated `{op}` diverges from reference at output {output}[{index}]: {accelerated} vs {reference}")]
    NumericalParity { op: String, output: usize, index: usize, reference: f64, accelerated: f64 },

    #[error("aliasing violation in `{op}` at output {output}: {reason}")]
    AliasingViolation { op: String, output: usize, reason: String },

    #[error(transparent)]
    Memory(#[from] anyhow::Error),
}

impl OpError {
    /// Attribute an inference failure to operator `op`.
    pub fn from_infer(op: &str, err: InferError) -> Self {
        match err {
            InferError::Shape { position, expected, found } => OpError::ShapeMismatch {
                op: op.to_string(),
                position,
                expected,
                found,
            },
            InferError::Type { position, expected, found } => OpError::TypeMismatch {
                op: op.to_string(),
                position,
                expected,
                found,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_fills_unknown_dimensions() {
        let a = PartialShape::with_dims(vec![Some(2), None]);
        let b = PartialShape::with_dims(vec![None, Some(3)]);
        assert_eq!(a.merge(&b), Some(PartialShape::known(&[2, 3])));
        assert_eq!(PartialShape::unknown().merge(&a), Some(a.clone()));
        assert!(!a.is_complete());
        assert_eq!(a.to_shape(), None);
    }

    #[test]
    fn merge_rejects_conflicts() {
        let a = PartialShape::known(&[2, 3]);
        assert_eq!(a.merge(&PartialShape::known(&[2, 4])), None);
        assert_eq!(a.merge(&PartialShape::known(&[2])), None);
    }

    #[test]
    fn partial_shapes_display() {
        assert_eq!(PartialShape::unknown().to_string(), "?");
        assert_eq!(PartialShape::with_dims(vec![Some(4), None]).to_string(), "[4, ?]");
        assert_eq!(PartialShape::known(&[]).to_string(), "[]");
    }
}
