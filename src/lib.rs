//! Operator attribute registry and dispatch.
//!
//! Re-exports the workspace crates under one name. Operators live in
//! [`ops`]; [`execution::ExecutionEngine`] runs them.

pub use core_types;
pub use execution;
pub use memory;
pub use opattr_ops as ops;
pub use tensor;
