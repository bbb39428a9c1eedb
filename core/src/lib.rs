pub mod kernel_manager;
pub mod types;

use std::sync::{mpsc, Arc};

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use wgpu::{
    util::DeviceExt, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    CommandEncoder, CommandEncoderDescriptor, ComputePassDescriptor, ComputePipelineDescriptor, Device, ErrorFilter,
    Instance, PipelineCompilationOptions, PipelineLayoutDescriptor, PollType, Queue, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

pub use kernel_manager::KernelManager;
use types::{AbstractBindGroupLayout, AbstractBuffer, AbstractComputePipeline, BufferKind};

/// Context for GPU operations
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<Device>,
    pub queue:  Arc<Queue>,
}

impl GpuContext {
    /* ------------------------------------------------------------------ */
    /* Construction                                                       */
    /* ------------------------------------------------------------------ */
    pub async fn new() -> Result<Self> {
        let instance = Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| anyhow!("no suitable adapter found: {e}"))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .context("device request failed")?;

        debug!(adapter = ?adapter.get_info().name, "gpu context created");
        Ok(Self { device: Arc::new(device), queue: Arc::new(queue) })
    }

    /* ------------------------------------------------------------------ */
    /* Buffers                                                            */
    /* ------------------------------------------------------------------ */

    /// Allocate an uninitialised GPU buffer.
    pub fn create_buffer(&self, size: u64, usage: BufferKind) -> AbstractBuffer {
        AbstractBuffer(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size,
            usage: usage.into(),
            mapped_at_creation: false,
        }))
    }

    /// Allocate and initialise a GPU buffer from host data.
    pub fn create_buffer_with_data(&self, data: &[u8], usage: BufferKind) -> AbstractBuffer {
        AbstractBuffer(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: None,
            contents: data,
            usage: usage.into(),
        }))
    }

    /// Blocking read: map-read the entire buffer.
    pub fn read_buffer(&self, buffer: &AbstractBuffer) -> Result<Vec<u8>> {
        let slice = buffer.raw().slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.wait_idle()?;
        rx.recv().context("map callback dropped")?.context("buffer map failed")?;

        let data = slice.get_mapped_range().to_vec();
        buffer.raw().unmap();
        Ok(data)
    }

    /* ------------------------------------------------------------------ */
    /* Encoder helpers                                                    */
    /* ------------------------------------------------------------------ */
    fn create_encoder(&self, label: &str) -> CommandEncoder {
        self.device.create_command_encoder(&CommandEncoderDescriptor { label: Some(label) })
    }

    fn submit_encoder(&self, encoder: CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
    }

    pub fn copy_buffer_to_buffer(&self, src: &AbstractBuffer, dst: &AbstractBuffer, size: u64) {
        let mut enc = self.create_encoder("copy-b2b");
        enc.copy_buffer_to_buffer(src.raw(), 0, dst.raw(), 0, size);
        self.submit_encoder(enc);
    }

    /* ------------------------------------------------------------------ */
    /* Shaders Preprocessing                                              */
    /* ------------------------------------------------------------------ */

    /// Storage layout: `n_in` read-only bindings, then `n_out` read-write ones.
    pub fn create_storage_layout(&self, n_in: usize, n_out: usize) -> Arc<AbstractBindGroupLayout> {
        let entry = |binding: usize, read_only: bool| BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let entries: Vec<BindGroupLayoutEntry> = (0..n_in)
            .map(|i| entry(i, true))
            .chain((0..n_out).map(|i| entry(n_in + i, false)))
            .collect();

        let bgl = self.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("storage-layout"),
            entries: &entries,
        });
        Arc::new(AbstractBindGroupLayout(bgl))
    }

    /// Compile a compute pipeline from WGSL source.
    ///
    /// Validation errors are captured and returned instead of reaching the
    /// device's uncaptured-error handler.
    pub fn create_compute_pipeline(
        &self,
        src: &str,
        entry: &str,
        layout: &AbstractBindGroupLayout,
    ) -> Result<Arc<AbstractComputePipeline>> {
        self.device.push_error_scope(ErrorFilter::Validation);

        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("wgsl-module"),
            source: ShaderSource::Wgsl(src.into()),
        });
        let pipeline_layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("compute-pl-layout"),
            bind_group_layouts: &[&layout.0],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("compute-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry),
            compilation_options: PipelineCompilationOptions::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(anyhow!("pipeline `{entry}` failed validation: {err}"));
        }
        Ok(Arc::new(AbstractComputePipeline(pipeline)))
    }

    /* ------------------------------------------------------------------ */
    /* Dispatch                                                           */
    /* ------------------------------------------------------------------ */

    fn create_storage_bind_group(
        &self,
        layout: &AbstractBindGroupLayout,
        inputs: &[&AbstractBuffer],
        outputs: &[&AbstractBuffer],
    ) -> BindGroup {
        let entries: Vec<BindGroupEntry> = inputs
            .iter()
            .chain(outputs)
            .enumerate()
            .map(|(i, b)| BindGroupEntry { binding: i as u32, resource: b.0.as_entire_binding() })
            .collect();
        self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("storage-bg"),
            layout: &layout.0,
            entries: &entries,
        })
    }

    /// Record and submit one 1-D dispatch over `total_elems` invocations.
    pub fn dispatch_compute_1d(
        &self,
        pipeline: &AbstractComputePipeline,
        layout: &AbstractBindGroupLayout,
        inputs: &[&AbstractBuffer],
        outputs: &[&AbstractBuffer],
        total_elems: u32,
        workgroup_size: u32,
    ) {
        let bg = self.create_storage_bind_group(layout, inputs, outputs);
        let (x, _, _) = dispatch_size_1d(total_elems, workgroup_size);

        let mut enc = self.create_encoder("dispatch-1d");
        {
            let mut pass = enc.begin_compute_pass(&ComputePassDescriptor::default());
            pass.set_pipeline(&pipeline.0);
            pass.set_bind_group(0, &bg, &[]);
            pass.dispatch_workgroups(x, 1, 1);
        }
        self.submit_encoder(enc);
    }

    /* ------------------------------------------------------------------ */
    /* Misc utils                                                         */
    /* ------------------------------------------------------------------ */

    /// Block until all submitted work has finished.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.poll(PollType::Wait).map_err(|e| anyhow!("device poll failed: {e}"))?;
        Ok(())
    }

    /// Largest 1-D dispatch, in invocations, for `workgroup_size`
    pub fn max_elems_1d(&self, workgroup_size: u32) -> u64 {
        self.device.limits().max_compute_workgroups_per_dimension as u64 * workgroup_size as u64
    }
}

/// Helper: compute `(x,1,1)` for 1-D dispatch with `workgroup_size`.
pub fn dispatch_size_1d(total: u32, workgroup_size: u32) -> (u32, u32, u32) {
    (total.div_ceil(workgroup_size), 1, 1)
}
