//! The GPU abstraction layer boundary.
//!
//! Per the frame graph core's scope, the RHI is an external collaborator consumed
//! only through an interface: none of `graph`, `resource`, `pipeline` or `executor`
//! name a concrete backend. The [`Rhi`] trait mirrors the bit-exact contract the
//! core actually calls (resource create/destroy, command buffer recording,
//! barriers, submission, presentation); [`wgpu_backend`] is one real implementation
//! of it, [`fake`] is an in-memory implementation used by the test suite to assert
//! on submit-context and barrier structure without a GPU.

pub mod fake;
pub mod wgpu_backend;

use bitflags::bitflags;
use std::fmt;

/// Opaque handle to a created texture. Carries no lifetime; validity is the
/// backend's responsibility once `destroy_texture` has not yet been called.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct TextureHandle(pub u64);

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct BufferHandle(pub u64);

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct PipelineHandle(pub u64);

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ShaderHandle(pub u64);

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct SemaphoreHandle(pub u64);

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct FenceHandle(pub u64);

/// Which hardware queue a command buffer is destined for. The render graph
/// compiler assigns queue indices (graphics = 0, compute = 1); this enum is the
/// RHI-facing counterpart consumed at submission time.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum QueueType {
    Graphics,
    Compute,
}

bitflags! {
    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    pub struct TextureUsage: u32 {
        const SAMPLED_TEXTURE        = 1 << 0;
        const COLOR_ATTACHMENT       = 1 << 1;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 2;
        const STORAGE_TEXTURE        = 1 << 3;
        const TRANSFER_SRC           = 1 << 4;
        const TRANSFER_DST           = 1 << 5;
    }
}

bitflags! {
    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    pub struct BufferUsage: u32 {
        const VERTEX_BUFFER   = 1 << 0;
        const INDEX_BUFFER    = 1 << 1;
        const UNIFORM_BUFFER  = 1 << 2;
        const STORAGE_BUFFER  = 1 << 3;
        const TRANSFER_SRC    = 1 << 4;
        const TRANSFER_DST    = 1 << 5;
    }
}

/// A resource's layout/state, tracked per view by the resource layout tracker.
/// Multiple bits may be set only on the union computed for a view read by more
/// than one queue in a single dependency level; any one requester always asks
/// for exactly one of these.
bitflags! {
    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    pub struct ResourceLayout: u32 {
        const UNDEFINED             = 0;
        const COLOR_ATTACHMENT      = 1 << 0;
        const DEPTH_STENCIL         = 1 << 1;
        const SHADER_READ           = 1 << 2;
        const GENERAL               = 1 << 3;
        const TRANSFER_SRC          = 1 << 4;
        const TRANSFER_DST          = 1 << 5;
        const PRESENT               = 1 << 6;
    }
}

#[derive(Clone, Debug)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub depth_or_layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Depth32Float,
    Depth24PlusStencil8,
    R32Uint,
}

impl TextureFormat {
    pub fn is_depth_stencil(self) -> bool {
        matches!(self, TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8)
    }
}

#[derive(Clone, Debug)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
}

/// Which shader stage a compiled module is bound to. Drives hit-group
/// synthesis for ray-tracing pipelines (see `pipeline::hit_groups`).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    RayGeneration,
    RayMiss,
    RayClosestHit,
    RayAnyHit,
}

#[derive(Clone, Debug)]
pub struct GraphicsPipelineInfo {
    pub vertex_shader: ShaderHandle,
    pub fragment_shader: ShaderHandle,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

#[derive(Clone, Debug)]
pub struct ComputePipelineInfo {
    pub shader: ShaderHandle,
}

/// One synthesized hit group: a closest-hit and/or any-hit shader sharing a
/// slot, tagged with the geometry type it was grouped under.
#[derive(Clone, Debug)]
pub struct HitGroup {
    pub closest_hit: Option<ShaderHandle>,
    pub any_hit: Option<ShaderHandle>,
    pub is_procedural: bool,
}

#[derive(Clone, Debug)]
pub struct RayTracingPipelineInfo {
    pub raygen_shader: ShaderHandle,
    pub miss_shaders: Vec<ShaderHandle>,
    pub hit_groups: Vec<HitGroup>,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// A single pipeline barrier transition for one view of one resource. Produced by
/// the resource layout tracker whenever a transition is not elided (old != new).
#[derive(Clone, Copy, Debug)]
pub struct PipelineBarrier {
    pub texture: Option<TextureHandle>,
    pub buffer: Option<BufferHandle>,
    pub view_index: u32,
    pub old_layout: ResourceLayout,
    pub new_layout: ResourceLayout,
}

#[derive(Clone, Debug, Default)]
pub struct RenderingBeginInfo {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
    pub width: u32,
    pub height: u32,
    /// Set when this pass's render target is the swap-chain image acquired at
    /// the top of the frame rather than a transient color attachment. Backends
    /// resolve this against whatever image `acquire_next_image` handed back;
    /// the core never holds a handle for it.
    pub back_buffer: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
}

#[derive(Clone, Copy, Debug)]
pub struct DepthStencilAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

/// Any handle type that can be named for debugging (`set_name`).
#[derive(Clone, Copy, Debug)]
pub enum AnyHandle {
    Texture(TextureHandle),
    Buffer(BufferHandle),
    Pipeline(PipelineHandle),
    Shader(ShaderHandle),
    Semaphore(SemaphoreHandle),
    Fence(FenceHandle),
}

/// The GPU abstraction layer boundary consumed by the frame graph core.
///
/// Implementors own actual device resources; the core never reaches past this
/// trait to a concrete API. `CommandBuffer` is an associated type rather than a
/// handle because recording is inherently sequential and single-threaded per
/// buffer, which a handle-based API would only obscure.
pub trait Rhi: Send + Sync {
    type CommandBuffer: Send;

    fn create_texture(&self, info: &TextureInfo) -> crate::Result<TextureHandle>;
    fn destroy_texture(&self, handle: TextureHandle);

    fn create_buffer(&self, info: &BufferInfo) -> crate::Result<BufferHandle>;
    fn destroy_buffer(&self, handle: BufferHandle);

    fn create_shader(&self, source: &str, stage: ShaderStage, label: &str) -> crate::Result<ShaderHandle>;
    fn destroy_shader(&self, handle: ShaderHandle);

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineInfo) -> crate::Result<PipelineHandle>;
    fn create_compute_pipeline(&self, info: &ComputePipelineInfo) -> crate::Result<PipelineHandle>;
    fn create_ray_tracing_pipeline(&self, info: &RayTracingPipelineInfo) -> crate::Result<PipelineHandle>;
    fn destroy_pipeline(&self, handle: PipelineHandle);

    fn create_semaphore(&self) -> SemaphoreHandle;
    fn destroy_semaphore(&self, handle: SemaphoreHandle);

    fn create_fence(&self) -> FenceHandle;
    fn destroy_fence(&self, handle: FenceHandle);
    fn wait_for_fences(&self, fences: &[FenceHandle]);
    fn reset_fence(&self, fence: FenceHandle);

    fn begin_command_buffer(&self, queue: QueueType) -> Self::CommandBuffer;
    fn end_command_buffer(&self, cmd: Self::CommandBuffer) -> Self::CommandBuffer;

    fn begin_rendering(&self, cmd: &mut Self::CommandBuffer, info: &RenderingBeginInfo);
    fn end_rendering(&self, cmd: &mut Self::CommandBuffer);

    fn bind_pipeline(&self, cmd: &mut Self::CommandBuffer, pipeline: PipelineHandle);
    fn push_constants(&self, cmd: &mut Self::CommandBuffer, data: &[u8]);
    fn bind_vertex_buffer(&self, cmd: &mut Self::CommandBuffer, buffer: BufferHandle, offset: u64);
    fn bind_index_buffer(&self, cmd: &mut Self::CommandBuffer, buffer: BufferHandle, offset: u64);

    fn draw(&self, cmd: &mut Self::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(&self, cmd: &mut Self::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32);
    fn dispatch(&self, cmd: &mut Self::CommandBuffer, x: u32, y: u32, z: u32);
    fn dispatch_rays(&self, cmd: &mut Self::CommandBuffer, width: u32, height: u32, depth: u32);

    fn copy_buffer(&self, cmd: &mut Self::CommandBuffer, src: BufferHandle, dst: BufferHandle, size: u64);
    fn copy_texture(&self, cmd: &mut Self::CommandBuffer, src: TextureHandle, dst: TextureHandle);

    fn add_pipeline_barriers(&self, cmd: &mut Self::CommandBuffer, barriers: &[PipelineBarrier]);

    /// Waits on prior fences internally if required, then acquires the next
    /// swap-chain image, signaling `acquire_semaphore` when it is ready.
    fn acquire_next_image(&self, acquire_semaphore: SemaphoreHandle) -> crate::Result<u32>;

    fn submit(
        &self,
        queue: QueueType,
        cmd: Self::CommandBuffer,
        waits: &[SemaphoreHandle],
        signals: &[SemaphoreHandle],
        fence: FenceHandle,
    );

    fn present(&self, wait: SemaphoreHandle) -> crate::Result<()>;
    fn wait_queue_idle(&self, queue: QueueType);

    fn set_name(&self, handle: AnyHandle, name: &str);
}

impl fmt::Debug for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", match self { QueueType::Graphics => "graphics", QueueType::Compute => "compute" })
    }
}
