use wgpu::{BindGroupLayout, Buffer, BufferUsages, ComputePipeline};

/// What a device buffer is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Shader storage, copyable both ways
    Main,
    /// Host-readable staging target
    Download,
}

impl From<BufferKind> for BufferUsages {
    fn from(kind: BufferKind) -> Self {
        match kind {
            BufferKind::Main => BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            BufferKind::Download => BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        }
    }
}

#[derive(Debug)]
pub struct AbstractBuffer(pub(crate) Buffer);

impl AbstractBuffer {
    pub(crate) fn raw(&self) -> &Buffer {
        &self.0
    }

    pub fn size(&self) -> u64 {
        self.0.size()
    }
}

#[derive(Debug)]
pub struct AbstractBindGroupLayout(pub(crate) BindGroupLayout);

#[derive(Debug)]
pub struct AbstractComputePipeline(pub(crate) ComputePipeline);
