mod utils;

use anyhow::{Result, ensure};
use core_types::{BufferId, DataType, Device, Element, StorageKind, ViewDescriptor};
use memory::MemoryManager;
use std::marker::PhantomData;

pub use utils::{compute_strides, contiguous_view, strided_view};

/// Lightweight handle: (BufferId, ViewDescriptor, device, dtype, storage)
///
/// Cloning a handle never copies data; clones alias the same buffer.
#[derive(Clone, Debug)]
pub struct Tensor<T: Element> {
    buffer_id: BufferId,
    device:    Device,
    view:      ViewDescriptor,
    dtype:     DataType,
    storage:   StorageKind,
    _marker:   PhantomData<T>,
}

impl<T: Element> Tensor<T> {
    /* --------------------------------------------------------------------- */
    /* Constructors                                                          */
    /* --------------------------------------------------------------------- */

    /// Allocate a zero-filled dense tensor on the given device.
    pub fn empty(mgr: &MemoryManager, shape: &[usize], device: Device) -> Result<Self> {
        let view   = contiguous_view(shape)?;
        let bytes  = view.numel() * T::DTYPE.size_in_bytes();
        let buf_id = mgr.allocate_raw(bytes)?;
        Ok(Self::from_parts(buf_id, view, device))
    }

    /// Construct a dense tensor by uploading a host slice
    pub fn from_vec(mgr: &MemoryManager, data: &[T], shape: &[usize], device: Device) -> Result<Self> {
        let view = contiguous_view(shape)?;
        ensure!(
            data.len() == view.numel(),
            "shape {shape:?} needs {} elements, got {}",
            view.numel(),
            data.len()
        );
        let buf_id = mgr.allocate_raw(std::mem::size_of_val(data))?;
        mgr.write_to_buffer(buf_id, data)?;
        Ok(Self::from_parts(buf_id, view, device))
    }

    fn from_parts(buffer_id: BufferId, view: ViewDescriptor, device: Device) -> Self {
        Tensor {
            buffer_id,
            device,
            view,
            dtype:   T::DTYPE,
            storage: StorageKind::Dense,
            _marker: PhantomData,
        }
    }

    /// A handle on the same buffer with a different view.
    pub fn as_strided(&self, shape: &[usize], strides: &[usize], offset: usize) -> Result<Self> {
        Ok(Tensor { view: strided_view(shape, strides, offset)?, ..self.clone() })
    }

    /// Retag the storage representation of this handle.
    pub fn with_storage(self, storage: StorageKind) -> Self {
        Tensor { storage, ..self }
    }

    /// Retag the device this handle claims to live on.
    pub fn on_device(self, device: Device) -> Self {
        Tensor { device, ..self }
    }

    /// Copy the viewed elements to the host, in row-major order.
    pub fn to_vec(&self, mgr: &MemoryManager) -> Result<Vec<T>> {
        mgr.gather(self.buffer_id, &self.view)
    }

    /// Give the buffer back to the manager. Other handles on it dangle.
    pub fn release(self, mgr: &MemoryManager) {
        mgr.release(self.buffer_id);
    }

    /* --------------------------------------------------------------------- */
    /* Accessors                                                             */
    /* --------------------------------------------------------------------- */

    /// The view descriptor (shape, strides, offset)
    pub fn view(&self) -> &ViewDescriptor {
        &self.view
    }

    /// The logical shape
    pub fn shape(&self) -> Vec<usize> {
        self.view.dims()
    }

    /// The internal BufferId
    pub fn buffer_id(&self) -> BufferId {
        self.buffer_id
    }

    /// The device this tensor lives on
    pub fn device(&self) -> Device {
        self.device
    }

    /// The tensor’s DataType
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// The storage representation tag
    pub fn storage(&self) -> StorageKind {
        self.storage
    }
}

/* ------------------------------------------------------------------------- */
/*                                     Tests                                 */
/* ------------------------------------------------------------------------- */
#[cfg(test)]
mod tests {
    use super::*;
    use core_types::MAX_DIMS;

    #[test]
    fn test_empty_tensor_dtype_and_view() {
        let mm = MemoryManager::new();

        let shape = [2, 3, 4];
        let t: Tensor<f32> = Tensor::empty(&mm, &shape, Device::cpu()).unwrap();

        assert_eq!(t.dtype(), DataType::F32);
        assert_eq!(t.storage(), StorageKind::Dense);
        assert_eq!(t.shape(), vec![2, 3, 4]);

        // strides for [2,3,4] row-major = [12,4,1]
        let mut expect_strides = [0u32; MAX_DIMS];
        expect_strides[..3].copy_from_slice(&[12, 4, 1]);
        assert_eq!(t.view().strides, expect_strides);

        assert_eq!(t.device(), Device::cpu());
        assert_eq!(t.to_vec(&mm).unwrap(), vec![0.0; 24]);
    }

    #[test]
    fn test_from_vec_and_to_vec_preserves_data_and_dtype() {
        let mm = MemoryManager::new();

        let data = vec![1i32, 2, 3, 4];
        let t = Tensor::from_vec(&mm, &data, &[2, 2], Device::cpu()).unwrap();

        assert_eq!(t.to_vec(&mm).unwrap(), data);
        assert_eq!(t.dtype(), DataType::I32);
        assert!(Tensor::from_vec(&mm, &data, &[3], Device::cpu()).is_err());
    }

    #[test]
    fn strided_handles_share_the_buffer() {
        let mm = MemoryManager::new();
        let t = Tensor::from_vec(&mm, &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], Device::cpu()).unwrap();

        let transposed = t.as_strided(&[3, 2], &[1, 3], 0).unwrap();
        assert_eq!(transposed.buffer_id(), t.buffer_id());
        assert_eq!(transposed.to_vec(&mm).unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let sparse = t.clone().with_storage(StorageKind::RowSparse);
        assert_eq!(sparse.storage(), StorageKind::RowSparse);
        assert_eq!(sparse.buffer_id(), t.buffer_id());

        t.release(&mm);
        assert!(transposed.to_vec(&mm).is_err());
    }
}
