mod pool;

use anyhow::{Result, anyhow, bail, ensure};
use bytemuck::Pod;
use core_types::{BufferId, ViewDescriptor};

pub use pool::{BufferPool, HostBuffer};

/// Typed window onto a buffer's words, trimmed to its byte size.
fn typed<T: Pod>(words: &[u64], size_bytes: usize) -> Result<&[T]> {
    let all: &[T] = bytemuck::try_cast_slice(words)
        .map_err(|e| anyhow!("buffer cannot be viewed as {}: {e:?}", std::any::type_name::<T>()))?;
    Ok(&all[..size_bytes / std::mem::size_of::<T>()])
}

fn typed_mut<T: Pod>(words: &mut [u64], size_bytes: usize) -> Result<&mut [T]> {
    let all: &mut [T] = bytemuck::try_cast_slice_mut(words)
        .map_err(|e| anyhow!("buffer cannot be viewed as {}: {e:?}", std::any::type_name::<T>()))?;
    Ok(&mut all[..size_bytes / std::mem::size_of::<T>()])
}

/// Owns the host buffers tensors point into.
///
/// A `BufferId` is the identity of a storage allocation: two tensors alias
/// exactly when they carry the same id. All methods take `&self`, the pool
/// locks internally, so one manager can be shared by concurrent dispatches.
pub struct MemoryManager {
    main_pool: BufferPool,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self { main_pool: BufferPool::new() }
    }

    /// Raw allocation (zero-filled)
    pub fn allocate_raw(&self, size_bytes: usize) -> Result<BufferId> {
        Ok(self.main_pool.create_buffer(size_bytes)?.0)
    }

    /// Raw deallocation
    pub fn release(&self, id: BufferId) {
        self.main_pool.release_buffer(id);
    }

    /// Size in bytes of a live buffer
    pub fn buffer_size(&self, id: BufferId) -> Option<usize> {
        self.main_pool.get_buffer_size(id)
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.main_pool.len()
    }

    /// Raw upload into the start of the buffer.
    pub fn write_to_buffer<T: Pod>(&self, dest_id: BufferId, data: &[T]) -> Result<()> {
        let (buf, size) = self.entry(dest_id)?;
        let mut words = buf.write();
        let dst = typed_mut::<T>(&mut words, size)?;
        ensure!(
            data.len() <= dst.len(),
            "write of {} elements overflows {dest_id} ({} elements)",
            data.len(),
            dst.len()
        );
        dst[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read the elements addressed by `view`, in row-major order.
    pub fn gather<T: Pod>(&self, id: BufferId, view: &ViewDescriptor) -> Result<Vec<T>> {
        let (buf, size) = self.entry(id)?;
        let words = buf.read();
        let src = typed::<T>(&words, size)?;
        view.offsets()
            .into_iter()
            .map(|off| {
                src.get(off)
                    .copied()
                    .ok_or_else(|| anyhow!("view offset {off} out of bounds for {id} ({} elements)", src.len()))
            })
            .collect()
    }

    /// Write `values` to the elements addressed by `view`.
    ///
    /// `combine(old, new)` decides the stored value. Bounds are checked for
    /// the whole view before the first element is written.
    pub fn scatter<T: Pod>(
        &self,
        id: BufferId,
        view: &ViewDescriptor,
        values: &[T],
        combine: impl Fn(T, T) -> T,
    ) -> Result<()> {
        let offsets = view.offsets();
        ensure!(
            offsets.len() == values.len(),
            "scatter of {} values into a view of {} elements",
            values.len(),
            offsets.len()
        );

        let (buf, size) = self.entry(id)?;
        let mut words = buf.write();
        let dst = typed_mut::<T>(&mut words, size)?;
        if let Some(&bad) = offsets.iter().find(|&&off| off >= dst.len()) {
            bail!("view offset {bad} out of bounds for {id} ({} elements)", dst.len());
        }
        for (off, &value) in offsets.into_iter().zip(values) {
            dst[off] = combine(dst[off], value);
        }
        Ok(())
    }

    /// Run `f` over the buffer's elements under its read lock.
    pub fn with_slice<T: Pod, R>(&self, id: BufferId, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let (buf, size) = self.entry(id)?;
        let words = buf.read();
        Ok(f(typed::<T>(&words, size)?))
    }

    /// Run `f` over the buffer's elements under its write lock.
    pub fn with_slice_mut<T: Pod, R>(&self, id: BufferId, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let (buf, size) = self.entry(id)?;
        let mut words = buf.write();
        Ok(f(typed_mut::<T>(&mut words, size)?))
    }

    fn entry(&self, id: BufferId) -> Result<(HostBuffer, usize)> {
        let buf = self.main_pool.get(id).ok_or_else(|| anyhow!("unknown buffer {id}"))?;
        let size = self.main_pool.get_buffer_size(id).ok_or_else(|| anyhow!("unknown buffer {id}"))?;
        Ok((buf, size))
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    fn view(shape: &[u32], strides: &[u32], offset: u32) -> ViewDescriptor {
        let mut vd = ViewDescriptor::zeroed();
        vd.offset = offset;
        vd.ndim = shape.len() as u32;
        vd.shape[..shape.len()].copy_from_slice(shape);
        vd.strides[..strides.len()].copy_from_slice(strides);
        vd
    }

    #[test]
    fn test_allocate_and_free() {
        let mm = MemoryManager::new();
        let id = mm.allocate_raw(256).unwrap();
        assert_eq!(mm.buffer_size(id), Some(256));
        assert_eq!(mm.live_buffers(), 1);
        mm.release(id);
        assert_eq!(mm.buffer_size(id), None);
        assert!(mm.with_slice::<u8, _>(id, |_| ()).is_err());
    }

    #[test]
    fn test_upload_download_roundtrip() {
        let mm = MemoryManager::new();
        let data = vec![10u32, 20, 30, 40];

        let id = mm.allocate_raw(data.len() * std::mem::size_of::<u32>()).unwrap();
        mm.write_to_buffer(id, &data).unwrap();
        let back = mm.with_slice::<u32, _>(id, <[u32]>::to_vec).unwrap();
        assert_eq!(data, back);
        mm.release(id);
    }

    #[test]
    fn gather_and_scatter_honour_strides() {
        let mm = MemoryManager::new();
        let id = mm.allocate_raw(6 * 4).unwrap();
        mm.write_to_buffer(id, &[0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let column = view(&[3], &[2], 1);
        assert_eq!(mm.gather::<f32>(id, &column).unwrap(), vec![1.0, 3.0, 5.0]);

        mm.scatter(id, &column, &[10.0f32, 10.0, 10.0], |old, new| old + new).unwrap();
        assert_eq!(
            mm.with_slice::<f32, _>(id, <[f32]>::to_vec).unwrap(),
            vec![0.0, 11.0, 2.0, 13.0, 4.0, 15.0]
        );
    }

    #[test]
    fn out_of_bounds_scatter_writes_nothing() {
        let mm = MemoryManager::new();
        let id = mm.allocate_raw(4 * 4).unwrap();
        let too_long = view(&[5], &[1], 0);
        assert!(mm.scatter(id, &too_long, &[1.0f32; 5], |_, new| new).is_err());
        assert_eq!(mm.with_slice::<f32, _>(id, <[f32]>::to_vec).unwrap(), vec![0.0; 4]);
        assert!(mm.gather::<f32>(id, &too_long).is_err());
    }

    #[test]
    fn slices_are_typed_and_trimmed() {
        let mm = MemoryManager::new();
        let id = mm.allocate_raw(3 * 4).unwrap();
        mm.with_slice_mut::<f32, _>(id, |s| s.copy_from_slice(&[1.0, 2.0, 3.0])).unwrap();
        let sum = mm.with_slice::<f32, _>(id, |s| s.iter().sum::<f32>()).unwrap();
        assert_eq!(sum, 6.0);
        assert_eq!(mm.with_slice::<f32, _>(id, <[f32]>::len).unwrap(), 3);
    }
}
