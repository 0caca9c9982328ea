//! An in-memory [`Rhi`] implementation used by the test suite.
//!
//! Records every submit and barrier call instead of touching a GPU, so tests can
//! assert on submit-context/barrier structure (spec §8's testable properties)
//! without a window or device.

use super::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug)]
pub struct RecordedSubmit {
    pub queue: QueueType,
    pub waits: Vec<SemaphoreHandle>,
    pub signals: Vec<SemaphoreHandle>,
    pub barrier_count: usize,
}

#[derive(Debug, Default)]
pub struct FakeCommandBuffer {
    pub barriers: Vec<PipelineBarrier>,
    pub began_rendering: Option<RenderingBeginInfo>,
    pub bound_pipeline: Option<PipelineHandle>,
    pub draw_calls: u32,
}

pub struct FakeRhi {
    next_id: AtomicU64,
    pub submits: Mutex<Vec<RecordedSubmit>>,
    pub present_count: AtomicU64,
    pub texture_creates: AtomicU64,
    pub buffer_creates: AtomicU64,
    pub shader_creates: AtomicU64,
    pub pipeline_creates: AtomicU64,
    images_to_acquire: AtomicU64,
}

impl FakeRhi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            submits: Mutex::new(Vec::new()),
            present_count: AtomicU64::new(0),
            texture_creates: AtomicU64::new(0),
            buffer_creates: AtomicU64::new(0),
            shader_creates: AtomicU64::new(0),
            pipeline_creates: AtomicU64::new(0),
            images_to_acquire: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for FakeRhi {
    fn default() -> Self {
        Self::new()
    }
}

impl Rhi for FakeRhi {
    type CommandBuffer = FakeCommandBuffer;

    fn create_texture(&self, _info: &TextureInfo) -> crate::Result<TextureHandle> {
        self.texture_creates.fetch_add(1, Ordering::Relaxed);
        Ok(TextureHandle(self.next()))
    }

    fn destroy_texture(&self, _handle: TextureHandle) {}

    fn create_buffer(&self, _info: &BufferInfo) -> crate::Result<BufferHandle> {
        self.buffer_creates.fetch_add(1, Ordering::Relaxed);
        Ok(BufferHandle(self.next()))
    }

    fn destroy_buffer(&self, _handle: BufferHandle) {}

    fn create_shader(&self, _source: &str, _stage: ShaderStage, _label: &str) -> crate::Result<ShaderHandle> {
        self.shader_creates.fetch_add(1, Ordering::Relaxed);
        Ok(ShaderHandle(self.next()))
    }

    fn destroy_shader(&self, _handle: ShaderHandle) {}

    fn create_graphics_pipeline(&self, _info: &GraphicsPipelineInfo) -> crate::Result<PipelineHandle> {
        self.pipeline_creates.fetch_add(1, Ordering::Relaxed);
        Ok(PipelineHandle(self.next()))
    }

    fn create_compute_pipeline(&self, _info: &ComputePipelineInfo) -> crate::Result<PipelineHandle> {
        self.pipeline_creates.fetch_add(1, Ordering::Relaxed);
        Ok(PipelineHandle(self.next()))
    }

    fn create_ray_tracing_pipeline(&self, _info: &RayTracingPipelineInfo) -> crate::Result<PipelineHandle> {
        self.pipeline_creates.fetch_add(1, Ordering::Relaxed);
        Ok(PipelineHandle(self.next()))
    }

    fn destroy_pipeline(&self, _handle: PipelineHandle) {}

    fn create_semaphore(&self) -> SemaphoreHandle {
        SemaphoreHandle(self.next())
    }

    fn destroy_semaphore(&self, _handle: SemaphoreHandle) {}

    fn create_fence(&self) -> FenceHandle {
        FenceHandle(self.next())
    }

    fn destroy_fence(&self, _handle: FenceHandle) {}
    fn wait_for_fences(&self, _fences: &[FenceHandle]) {}
    fn reset_fence(&self, _fence: FenceHandle) {}

    fn begin_command_buffer(&self, _queue: QueueType) -> Self::CommandBuffer {
        FakeCommandBuffer::default()
    }

    fn end_command_buffer(&self, cmd: Self::CommandBuffer) -> Self::CommandBuffer {
        cmd
    }

    fn begin_rendering(&self, cmd: &mut Self::CommandBuffer, info: &RenderingBeginInfo) {
        cmd.began_rendering = Some(info.clone());
    }

    fn end_rendering(&self, _cmd: &mut Self::CommandBuffer) {}

    fn bind_pipeline(&self, cmd: &mut Self::CommandBuffer, pipeline: PipelineHandle) {
        cmd.bound_pipeline = Some(pipeline);
    }

    fn push_constants(&self, _cmd: &mut Self::CommandBuffer, _data: &[u8]) {}
    fn bind_vertex_buffer(&self, _cmd: &mut Self::CommandBuffer, _buffer: BufferHandle, _offset: u64) {}
    fn bind_index_buffer(&self, _cmd: &mut Self::CommandBuffer, _buffer: BufferHandle, _offset: u64) {}

    fn draw(&self, cmd: &mut Self::CommandBuffer, _vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        cmd.draw_calls += 1;
    }

    fn draw_indexed(&self, cmd: &mut Self::CommandBuffer, _index_count: u32, _instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {
        cmd.draw_calls += 1;
    }

    fn dispatch(&self, cmd: &mut Self::CommandBuffer, _x: u32, _y: u32, _z: u32) {
        cmd.draw_calls += 1;
    }

    fn dispatch_rays(&self, cmd: &mut Self::CommandBuffer, _width: u32, _height: u32, _depth: u32) {
        cmd.draw_calls += 1;
    }

    fn copy_buffer(&self, _cmd: &mut Self::CommandBuffer, _src: BufferHandle, _dst: BufferHandle, _size: u64) {}
    fn copy_texture(&self, _cmd: &mut Self::CommandBuffer, _src: TextureHandle, _dst: TextureHandle) {}

    fn add_pipeline_barriers(&self, cmd: &mut Self::CommandBuffer, barriers: &[PipelineBarrier]) {
        cmd.barriers.extend_from_slice(barriers);
    }

    fn acquire_next_image(&self, _acquire_semaphore: SemaphoreHandle) -> crate::Result<u32> {
        Ok((self.images_to_acquire.fetch_add(1, Ordering::Relaxed) % 3) as u32)
    }

    fn submit(&self, queue: QueueType, cmd: Self::CommandBuffer, waits: &[SemaphoreHandle], signals: &[SemaphoreHandle], _fence: FenceHandle) {
        self.submits.lock().push(RecordedSubmit {
            queue,
            waits: waits.to_vec(),
            signals: signals.to_vec(),
            barrier_count: cmd.barriers.len(),
        });
    }

    fn present(&self, _wait: SemaphoreHandle) -> crate::Result<()> {
        self.present_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_queue_idle(&self, _queue: QueueType) {}

    fn set_name(&self, _handle: AnyHandle, _name: &str) {}
}
