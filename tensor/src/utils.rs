use anyhow::{Result, ensure};
use bytemuck::Zeroable;
use core_types::{MAX_DIMS, ViewDescriptor};

/// Row-major strides (in elements) for a dense tensor of `shape`.
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let n = shape.len();
    let mut strides = vec![0; n];
    if n == 0 {
        return strides;
    }
    // The last dimension has stride 1
    strides[n - 1] = 1;
    for i in (0..n - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Build a view descriptor from explicit geometry.
pub fn strided_view(shape: &[usize], strides: &[usize], offset: usize) -> Result<ViewDescriptor> {
    ensure!(
        shape.len() <= MAX_DIMS,
        "rank {} exceeds the supported maximum of {MAX_DIMS}",
        shape.len()
    );
    ensure!(
        shape.len() == strides.len(),
        "shape has {} dimensions but {} strides were given",
        shape.len(),
        strides.len()
    );
    let fits = |v: usize| u32::try_from(v).is_ok();
    ensure!(
        fits(offset) && shape.iter().chain(strides).all(|&v| fits(v)),
        "view geometry does not fit 32-bit descriptors"
    );

    let mut vd = ViewDescriptor::zeroed();
    vd.offset = offset as u32;
    vd.ndim = shape.len() as u32;
    for (i, (&d, &s)) in shape.iter().zip(strides).enumerate() {
        vd.shape[i] = d as u32;
        vd.strides[i] = s as u32;
    }
    Ok(vd)
}

/// Dense row-major view of `shape` starting at element 0.
pub fn contiguous_view(shape: &[usize]) -> Result<ViewDescriptor> {
    strided_view(shape, &compute_strides(shape), 0)
}
