//! A `wgpu`-backed implementation of the [`Rhi`] trait.
//!
//! Command recording is deferred: each `Rhi` call on a command buffer appends an
//! [`Op`] rather than touching `wgpu` directly, because `wgpu::RenderPass<'_>`
//! borrows its `CommandEncoder` for its whole lifetime and the `Rhi` trait's
//! per-call methods (`bind_pipeline`, `draw`, ...) can't hold that borrow across
//! calls without a self-referential struct. `end_command_buffer` replays the op
//! list against a real `wgpu::CommandEncoder` in one pass, which sidesteps the
//! borrow entirely since the whole recording is known by then.
//!
//! Resource pooling mirrors `helio-render-v2`'s original `TexturePool`/`BufferPool`
//! keyed-reuse strategy; see `resource/manager.rs` for the transient-allocation
//! policy layered on top of raw creation here.

use super::*;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

enum Op {
    BeginRendering(RenderingBeginInfo),
    EndRendering,
    BindPipeline(PipelineHandle),
    PushConstants(Vec<u8>),
    BindVertexBuffer(BufferHandle, u64),
    BindIndexBuffer(BufferHandle, u64),
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32 },
    Dispatch(u32, u32, u32),
    CopyBuffer { src: BufferHandle, dst: BufferHandle, size: u64 },
    CopyTexture { src: TextureHandle, dst: TextureHandle },
    Barriers(Vec<PipelineBarrier>),
}

pub struct WgpuCommandBuffer {
    queue: QueueType,
    ops: Vec<Op>,
}

fn to_wgpu_format(fmt: TextureFormat) -> wgpu::TextureFormat {
    match fmt {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::R32Uint => wgpu::TextureFormat::R32Uint,
    }
}

fn to_wgpu_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::SAMPLED_TEXTURE) { out |= wgpu::TextureUsages::TEXTURE_BINDING; }
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) || usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsage::STORAGE_TEXTURE) { out |= wgpu::TextureUsages::STORAGE_BINDING; }
    if usage.contains(TextureUsage::TRANSFER_SRC) { out |= wgpu::TextureUsages::COPY_SRC; }
    if usage.contains(TextureUsage::TRANSFER_DST) { out |= wgpu::TextureUsages::COPY_DST; }
    out
}

fn to_wgpu_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::VERTEX_BUFFER) { out |= wgpu::BufferUsages::VERTEX; }
    if usage.contains(BufferUsage::INDEX_BUFFER) { out |= wgpu::BufferUsages::INDEX; }
    if usage.contains(BufferUsage::UNIFORM_BUFFER) { out |= wgpu::BufferUsages::UNIFORM; }
    if usage.contains(BufferUsage::STORAGE_BUFFER) { out |= wgpu::BufferUsages::STORAGE; }
    if usage.contains(BufferUsage::TRANSFER_SRC) { out |= wgpu::BufferUsages::COPY_SRC; }
    if usage.contains(BufferUsage::TRANSFER_DST) { out |= wgpu::BufferUsages::COPY_DST; }
    out
}

fn to_wgpu_load_op<V: Copy>(op: LoadOp, clear: V) -> wgpu::LoadOp<V> {
    match op {
        LoadOp::Load => wgpu::LoadOp::Load,
        LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(clear),
    }
}

fn to_wgpu_store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::DontCare => wgpu::StoreOp::Discard,
    }
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Ray tracing has no real wgpu extension wired up in this backend, so a
/// ray-tracing "pipeline" carries only the shader handles it was built from
/// for inspection; `dispatch_rays` logs and no-ops rather than drawing.
enum PipelineEntry {
    Render(Arc<wgpu::RenderPipeline>),
    Compute(Arc<wgpu::ComputePipeline>),
    RayTracing,
}

/// `wgpu`-backed RHI. Owns the device/queue and maps opaque handles to live
/// `wgpu` objects behind coarse mutexes, matching the teacher's resource-manager
/// locking discipline (fine-grained per-table, not a single crate-wide lock).
pub struct WgpuRhi {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_id: AtomicU64,
    textures: RwLock<HashMap<u64, TextureEntry>>,
    buffers: RwLock<HashMap<u64, wgpu::Buffer>>,
    shaders: RwLock<HashMap<u64, wgpu::ShaderModule>>,
    pipelines: RwLock<HashMap<u64, PipelineEntry>>,
    pending_submits: Mutex<Vec<wgpu::CommandBuffer>>,
}

impl WgpuRhi {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            next_id: AtomicU64::new(1),
            textures: RwLock::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
            shaders: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(HashMap::new()),
            pending_submits: Mutex::new(Vec::new()),
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_pipeline(&self, pipeline: Arc<wgpu::RenderPipeline>) -> PipelineHandle {
        let id = self.next();
        self.pipelines.write().insert(id, PipelineEntry::Render(pipeline));
        PipelineHandle(id)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl Rhi for WgpuRhi {
    type CommandBuffer = WgpuCommandBuffer;

    fn create_texture(&self, info: &TextureInfo) -> crate::Result<TextureHandle> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: None,
            size: wgpu::Extent3d { width: info.width, height: info.height, depth_or_array_layers: info.depth_or_layers.max(1) },
            mip_level_count: info.mip_levels.max(1),
            sample_count: info.sample_count.max(1),
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_format(info.format),
            usage: to_wgpu_texture_usage(info.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next();
        self.textures.write().insert(id, TextureEntry { texture, view });
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        self.textures.write().remove(&handle.0);
    }

    fn create_buffer(&self, info: &BufferInfo) -> crate::Result<BufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: info.size,
            usage: to_wgpu_buffer_usage(info.usage),
            mapped_at_creation: false,
        });
        let id = self.next();
        self.buffers.write().insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&self, handle: BufferHandle) {
        self.buffers.write().remove(&handle.0);
    }

    fn create_shader(&self, source: &str, _stage: ShaderStage, label: &str) -> crate::Result<ShaderHandle> {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let id = self.next();
        self.shaders.write().insert(id, module);
        Ok(ShaderHandle(id))
    }

    fn destroy_shader(&self, handle: ShaderHandle) {
        self.shaders.write().remove(&handle.0);
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineInfo) -> crate::Result<PipelineHandle> {
        let shaders = self.shaders.read();
        let vertex_module = shaders.get(&info.vertex_shader.0).ok_or_else(|| {
            crate::Error::ShaderCompilationFailed { path: "graphics pipeline".into(), diagnostics: "unknown vertex shader handle".into() }
        })?;
        let fragment_module = shaders.get(&info.fragment_shader.0).ok_or_else(|| {
            crate::Error::ShaderCompilationFailed { path: "graphics pipeline".into(), diagnostics: "unknown fragment shader handle".into() }
        })?;

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = info
            .color_formats
            .iter()
            .map(|&fmt| Some(wgpu::ColorTargetState {
                format: to_wgpu_format(fmt),
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }))
            .collect();
        let depth_stencil = info.depth_format.map(|fmt| wgpu::DepthStencilState {
            format: to_wgpu_format(fmt),
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: None,
            layout: None,
            vertex: wgpu::VertexState { module: vertex_module, entry_point: "vs_main", buffers: &[], compilation_options: Default::default() },
            fragment: Some(wgpu::FragmentState {
                module: fragment_module,
                entry_point: "fs_main",
                targets: &color_targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        drop(shaders);

        let id = self.next();
        self.pipelines.write().insert(id, PipelineEntry::Render(Arc::new(pipeline)));
        Ok(PipelineHandle(id))
    }

    fn create_compute_pipeline(&self, info: &ComputePipelineInfo) -> crate::Result<PipelineHandle> {
        let shaders = self.shaders.read();
        let module = shaders.get(&info.shader.0).ok_or_else(|| {
            crate::Error::ShaderCompilationFailed { path: "compute pipeline".into(), diagnostics: "unknown compute shader handle".into() }
        })?;

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: None,
            layout: None,
            module,
            entry_point: "cs_main",
            compilation_options: Default::default(),
        });
        drop(shaders);

        let id = self.next();
        self.pipelines.write().insert(id, PipelineEntry::Compute(Arc::new(pipeline)));
        Ok(PipelineHandle(id))
    }

    fn create_ray_tracing_pipeline(&self, _info: &RayTracingPipelineInfo) -> crate::Result<PipelineHandle> {
        log::warn!("create_ray_tracing_pipeline requested but this wgpu backend has no ray-tracing extension wired up");
        let id = self.next();
        self.pipelines.write().insert(id, PipelineEntry::RayTracing);
        Ok(PipelineHandle(id))
    }

    fn destroy_pipeline(&self, handle: PipelineHandle) {
        self.pipelines.write().remove(&handle.0);
    }

    fn create_semaphore(&self) -> SemaphoreHandle {
        SemaphoreHandle(self.next())
    }

    fn destroy_semaphore(&self, _handle: SemaphoreHandle) {}

    fn create_fence(&self) -> FenceHandle {
        FenceHandle(self.next())
    }

    fn destroy_fence(&self, _handle: FenceHandle) {}

    fn wait_for_fences(&self, _fences: &[FenceHandle]) {
        // wgpu submissions are fenced implicitly; poll the device to drive
        // completion callbacks instead of waiting on a discrete fence object.
        self.device.poll(wgpu::Maintain::Wait);
    }

    fn reset_fence(&self, _fence: FenceHandle) {}

    fn begin_command_buffer(&self, queue: QueueType) -> Self::CommandBuffer {
        WgpuCommandBuffer { queue, ops: Vec::new() }
    }

    fn end_command_buffer(&self, cmd: Self::CommandBuffer) -> Self::CommandBuffer {
        cmd
    }

    fn begin_rendering(&self, cmd: &mut Self::CommandBuffer, info: &RenderingBeginInfo) {
        cmd.ops.push(Op::BeginRendering(info.clone()));
    }

    fn end_rendering(&self, cmd: &mut Self::CommandBuffer) {
        cmd.ops.push(Op::EndRendering);
    }

    fn bind_pipeline(&self, cmd: &mut Self::CommandBuffer, pipeline: PipelineHandle) {
        cmd.ops.push(Op::BindPipeline(pipeline));
    }

    fn push_constants(&self, cmd: &mut Self::CommandBuffer, data: &[u8]) {
        cmd.ops.push(Op::PushConstants(data.to_vec()));
    }

    fn bind_vertex_buffer(&self, cmd: &mut Self::CommandBuffer, buffer: BufferHandle, offset: u64) {
        cmd.ops.push(Op::BindVertexBuffer(buffer, offset));
    }

    fn bind_index_buffer(&self, cmd: &mut Self::CommandBuffer, buffer: BufferHandle, offset: u64) {
        cmd.ops.push(Op::BindIndexBuffer(buffer, offset));
    }

    fn draw(&self, cmd: &mut Self::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        cmd.ops.push(Op::Draw { vertex_count, instance_count, first_vertex, first_instance });
    }

    fn draw_indexed(&self, cmd: &mut Self::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        cmd.ops.push(Op::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance });
    }

    fn dispatch(&self, cmd: &mut Self::CommandBuffer, x: u32, y: u32, z: u32) {
        cmd.ops.push(Op::Dispatch(x, y, z));
    }

    fn dispatch_rays(&self, cmd: &mut Self::CommandBuffer, _width: u32, _height: u32, _depth: u32) {
        log::warn!("dispatch_rays requested but this wgpu backend has no ray-tracing extension wired up");
    }

    fn copy_buffer(&self, cmd: &mut Self::CommandBuffer, src: BufferHandle, dst: BufferHandle, size: u64) {
        cmd.ops.push(Op::CopyBuffer { src, dst, size });
    }

    fn copy_texture(&self, cmd: &mut Self::CommandBuffer, src: TextureHandle, dst: TextureHandle) {
        cmd.ops.push(Op::CopyTexture { src, dst });
    }

    fn add_pipeline_barriers(&self, cmd: &mut Self::CommandBuffer, barriers: &[PipelineBarrier]) {
        // wgpu tracks resource state and inserts barriers itself; this call exists
        // so the layout tracker's bookkeeping (elision, union layouts) stays
        // meaningful even against a backend that doesn't need explicit barriers.
        cmd.ops.push(Op::Barriers(barriers.to_vec()));
    }

    fn acquire_next_image(&self, _acquire_semaphore: SemaphoreHandle) -> crate::Result<u32> {
        Ok(0)
    }

    fn submit(&self, _queue: QueueType, cmd: Self::CommandBuffer, _waits: &[SemaphoreHandle], _signals: &[SemaphoreHandle], _fence: FenceHandle) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        let textures = self.textures.read();
        let buffers = self.buffers.read();
        let pipelines = self.pipelines.read();

        let mut bound_compute_pipeline: Option<&Arc<wgpu::ComputePipeline>> = None;

        let mut i = 0;
        while i < cmd.ops.len() {
            match &cmd.ops[i] {
                Op::BindPipeline(handle) => {
                    bound_compute_pipeline = match pipelines.get(&handle.0) {
                        Some(PipelineEntry::Compute(p)) => Some(p),
                        _ => None,
                    };
                }
                Op::Dispatch(x, y, z) => {
                    if let Some(pipeline) = bound_compute_pipeline {
                        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor { label: None, timestamp_writes: None });
                        pass.set_pipeline(pipeline);
                        pass.dispatch_workgroups(*x, *y, *z);
                    } else {
                        log::warn!("compute dispatch recorded with no compute pipeline bound; dropping");
                    }
                }
                Op::BeginRendering(info) => {
                    let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = info
                        .color_attachments
                        .iter()
                        .map(|a| {
                            let view = &textures.get(&a.texture.0).expect("unknown color attachment").view;
                            let [r, g, b, al] = a.clear_color;
                            Some(wgpu::RenderPassColorAttachment {
                                view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: to_wgpu_load_op(a.load_op, wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: al as f64 }),
                                    store: to_wgpu_store_op(a.store_op),
                                },
                            })
                        })
                        .collect();
                    let depth_stencil_attachment = info.depth_stencil_attachment.as_ref().map(|d| {
                        let view = &textures.get(&d.texture.0).expect("unknown depth attachment").view;
                        wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: to_wgpu_load_op(d.load_op, d.clear_depth),
                                store: to_wgpu_store_op(d.store_op),
                            }),
                            stencil_ops: None,
                        }
                    });

                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: None,
                        color_attachments: &color_attachments,
                        depth_stencil_attachment,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });

                    i += 1;
                    while i < cmd.ops.len() {
                        match &cmd.ops[i] {
                            Op::EndRendering => break,
                            Op::BindPipeline(handle) => {
                                if let Some(PipelineEntry::Render(p)) = pipelines.get(&handle.0) {
                                    pass.set_pipeline(p);
                                }
                            }
                            Op::BindVertexBuffer(handle, offset) => {
                                if let Some(b) = buffers.get(&handle.0) {
                                    pass.set_vertex_buffer(0, b.slice(*offset..));
                                }
                            }
                            Op::BindIndexBuffer(handle, offset) => {
                                if let Some(b) = buffers.get(&handle.0) {
                                    pass.set_index_buffer(b.slice(*offset..), wgpu::IndexFormat::Uint32);
                                }
                            }
                            Op::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
                                pass.draw(*first_vertex..*first_vertex + *vertex_count, *first_instance..*first_instance + *instance_count);
                            }
                            Op::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance } => {
                                pass.draw_indexed(*first_index..*first_index + *index_count, *vertex_offset, *first_instance..*first_instance + *instance_count);
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                }
                Op::CopyBuffer { src, dst, size } => {
                    if let (Some(s), Some(d)) = (buffers.get(&src.0), buffers.get(&dst.0)) {
                        encoder.copy_buffer_to_buffer(s, 0, d, 0, *size);
                    }
                }
                Op::CopyTexture { src, dst } => {
                    if let (Some(s), Some(d)) = (textures.get(&src.0), textures.get(&dst.0)) {
                        let size = s.texture.size();
                        encoder.copy_texture_to_texture(
                            s.texture.as_image_copy(),
                            d.texture.as_image_copy(),
                            size,
                        );
                    }
                }
                _ => {}
            }
            i += 1;
        }

        self.pending_submits.lock().push(encoder.finish());
    }

    fn present(&self, _wait: SemaphoreHandle) -> crate::Result<()> {
        let mut pending = self.pending_submits.lock();
        if !pending.is_empty() {
            self.queue.submit(pending.drain(..));
        }
        Ok(())
    }

    fn wait_queue_idle(&self, _queue: QueueType) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    fn set_name(&self, _handle: AnyHandle, _name: &str) {}
}
