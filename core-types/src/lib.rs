use bytemuck::{Pod, Zeroable};
use std::fmt;

include!(concat!(env!("OUT_DIR"), "/generated_data_types.rs"));

/// Type alias for a buffer identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);
impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// Maximum number of dimensions for a view descriptor
pub const MAX_DIMS: usize = 8; // (B, C, H, W, D, T) + 2 should be enough

/// Descriptor for a view into a buffer, in elements
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct ViewDescriptor {
    pub offset:  u32,
    pub ndim:    u32,
    pub shape:   [u32; MAX_DIMS],
    pub strides: [u32; MAX_DIMS],
}

impl ViewDescriptor {
    /// Logical shape of the view
    pub fn dims(&self) -> Vec<usize> {
        self.shape[..self.ndim as usize].iter().map(|&d| d as usize).collect()
    }

    pub fn rank(&self) -> usize {
        self.ndim as usize
    }

    /// Number of addressed elements (1 for a rank-0 view)
    pub fn numel(&self) -> usize {
        self.shape[..self.ndim as usize].iter().map(|&d| d as usize).product()
    }

    /// Row-major without gaps; unit dimensions may carry any stride.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1u32;
        for d in (0..self.ndim as usize).rev() {
            if self.shape[d] != 1 && self.strides[d] != expected {
                return false;
            }
            expected = expected.saturating_mul(self.shape[d]);
        }
        true
    }

    /// Element offsets of the view in row-major iteration order.
    pub fn offsets(&self) -> Vec<usize> {
        let n = self.ndim as usize;
        let total = self.numel();
        let mut out = Vec::with_capacity(total);
        let mut index = [0u32; MAX_DIMS];
        for _ in 0..total {
            let off: usize = (0..n)
                .map(|d| index[d] as usize * self.strides[d] as usize)
                .sum();
            out.push(self.offset as usize + off);

            // odometer increment, last dimension fastest
            for d in (0..n).rev() {
                index[d] += 1;
                if index[d] < self.shape[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        out
    }
}

/// Kind of device a tensor lives on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => f.write_str("cpu"),
            DeviceKind::Gpu => f.write_str("gpu"),
        }
    }
}

/// A concrete device: kind + ordinal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Device {
    pub kind: DeviceKind,
    pub id:   usize,
}

impl Device {
    pub const fn cpu() -> Self {
        Self { kind: DeviceKind::Cpu, id: 0 }
    }

    pub const fn gpu(id: usize) -> Self {
        Self { kind: DeviceKind::Gpu, id }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Storage representation of a tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StorageKind {
    #[default]
    Dense,
    RowSparse,
    Csr,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Dense => f.write_str("dense"),
            StorageKind::RowSparse => f.write_str("row_sparse"),
            StorageKind::Csr => f.write_str("csr"),
        }
    }
}

/// Key of a compute binding: where the inputs live and how they are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub device:  DeviceKind,
    pub storage: StorageKind,
}

impl DispatchKey {
    pub const CPU_DENSE: DispatchKey = DispatchKey::new(DeviceKind::Cpu, StorageKind::Dense);

    pub const fn new(device: DeviceKind, storage: StorageKind) -> Self {
        Self { device, storage }
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.device, self.storage)
    }
}

/// How a compute call treats one of its outputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum WriteMode {
    /// Leave the output untouched.
    Skip,
    /// Replace the output contents.
    #[default]
    Overwrite,
    /// Replace the output contents; the output shares its buffer with an input.
    Inplace,
    /// Add the result to the existing output contents.
    Accumulate,
}

impl WriteMode {
    pub fn writes(self) -> bool {
        !matches!(self, WriteMode::Skip)
    }
}
