use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use core_types::DataType;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::{AbstractBindGroupLayout, AbstractComputePipeline};
use crate::GpuContext;

/// Signature of a specialized kernel: shader + dtypes
#[derive(Clone, PartialEq, Eq, Hash)]
struct KernelKey {
    src:   Arc<str>,
    ent:   Arc<str>,
    t_in:  Vec<DataType>,
    t_out: Vec<DataType>,
    p_len: usize,
}

struct PipelineBundle {
    pipeline: Arc<AbstractComputePipeline>,
    layout:   Arc<AbstractBindGroupLayout>,
}

/// Compiled pipelines and their layouts, cached by shader and element types.
///
/// `p_len` counts extra read-only parameter buffers bound after the inputs.
pub struct KernelManager {
    ctx:   GpuContext,
    cache: Mutex<HashMap<KernelKey, Arc<PipelineBundle>>>,
}

impl KernelManager {
    pub fn new(ctx: GpuContext) -> Self {
        Self { ctx, cache: Mutex::new(HashMap::new()) }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn get(
        &self,
        src: &str,
        entry: &str,
        t_in: Vec<DataType>,
        t_out: Vec<DataType>,
        p_len: usize,
    ) -> Result<(Arc<AbstractComputePipeline>, Arc<AbstractBindGroupLayout>)> {
        let key = KernelKey { src: Arc::from(src), ent: Arc::from(entry), t_in, t_out, p_len };

        // cache lookup
        if let Some(b) = self.cache.lock().get(&key) {
            return Ok((b.pipeline.clone(), b.layout.clone()));
        }

        let n_in = key.t_in.len() + key.p_len;
        let n_out = key.t_out.len();
        let layout = self.ctx.create_storage_layout(n_in, n_out);
        let pipeline = self.ctx.create_compute_pipeline(src, entry, &layout)?;
        debug!(entry, n_in, n_out, "compiled compute pipeline");

        let bundle = Arc::new(PipelineBundle { pipeline: pipeline.clone(), layout: layout.clone() });
        self.cache.lock().insert(key, bundle);

        Ok((pipeline, layout))
    }

    /// Number of cached pipelines
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;

    #[test]
    fn compile_and_retrieve() {
        let Ok(ctx) = block_on(GpuContext::new()) else {
            return;
        };
        let manager = KernelManager::new(ctx);

        let src = r#"
            @group(0) @binding(0) var<storage, read>  A: array<f32>;
            @group(0) @binding(1) var<storage, read_write> B: array<f32>;
            @compute @workgroup_size(64)
            fn negate(@builtin(global_invocation_id) gid: vec3<u32>) {
                let i = gid.x;
                if (i < arrayLength(&B)) {
                    B[i] = -A[i];
                }
            }
        "#;

        let (pipeline, layout) = manager.get(src, "negate", vec![DataType::F32], vec![DataType::F32], 0).unwrap();
        let (pipeline2, layout2) = manager.get(src, "negate", vec![DataType::F32], vec![DataType::F32], 0).unwrap();

        assert!(Arc::ptr_eq(&pipeline, &pipeline2));
        assert!(Arc::ptr_eq(&layout, &layout2));
        assert_eq!(manager.len(), 1);

        assert!(manager.get("not wgsl", "main", vec![], vec![DataType::F32], 0).is_err());
    }
}
