//! Shader loading (deduplicated, scheduler-dispatched, disk-cached) and
//! pipeline creation (graphics, compute, ray-tracing), including ray-tracing
//! hit-group synthesis.
//!
//! Grounded in `original_source`'s `ShaderManager`/`ShaderCache`
//! (`shader_manager.h`/`.cpp`) and `PipelineManager` (`pipeline_manager.h`/`.cpp`).
//! The RHI boundary here exposes `create_shader` as taking source text rather
//! than a compiled binary, so the disk cache persists the define-expanded
//! shader source rather than a device-specific bytecode blob; see DESIGN.md.

mod hit_groups;
mod manager;
mod shader_cache;

pub use hit_groups::{synthesize_hit_groups, HitGroupSpec};
pub use manager::PipelineManager;
pub use shader_cache::ShaderCache;
