//! Shader load deduplication and pipeline creation. Grounded in
//! `original_source`'s `ShaderManager`/`PipelineManager`.
//!
//! A shader is identified by `(path, shader_type, entry_point, defines)`. The
//! first caller to request a given identity dispatches its compilation onto
//! the scheduler's `Low` priority class (background asset/pipeline work, per
//! the scheduling model); every other caller racing on the same identity is
//! handed the same in-flight `TaskGroup` rather than compiling again, mirroring
//! `ShaderManager::request_shader_loading`'s mutex-guarded
//! `s_shaderByRelativePath` map.

use super::{shader_cache::ShaderCache, synthesize_hit_groups};
use crate::error::{Error, Result};
use crate::resource::{PipelineMetadata, ShaderMetadata, ShaderTypeSpec};
use crate::rhi::{
    ComputePipelineInfo, GraphicsPipelineInfo, HitGroup, PipelineHandle, RayTracingPipelineInfo, Rhi, ShaderHandle,
    TextureFormat,
};
use crate::scheduler::{Priority, PriorityPool, TaskGroup};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct ShaderKey {
    path: String,
    shader_type: ShaderTypeSpec,
    entry_point: String,
    defines: Vec<String>,
}

impl From<&ShaderMetadata> for ShaderKey {
    fn from(m: &ShaderMetadata) -> Self {
        Self { path: m.path.clone(), shader_type: m.shader_type, entry_point: m.entry_point.clone(), defines: m.defines.clone() }
    }
}

enum ShaderState {
    Loading(Arc<TaskGroup>),
    Loaded(ShaderHandle),
    Failed(String),
}

/// Shader and pipeline manager for one `Rhi` backend. One instance lives for
/// the whole renderer; passes hold an `Arc` to it and call `create_pipeline`
/// from their `RenderPass::create_pipeline` hook.
pub struct PipelineManager<R: Rhi> {
    rhi: Arc<R>,
    pool: Arc<PriorityPool>,
    cache: ShaderCache,
    shaders: Mutex<HashMap<ShaderKey, ShaderState>>,
    pipelines: Mutex<HashMap<String, PipelineHandle>>,
}

impl<R: Rhi + 'static> PipelineManager<R> {
    pub fn new(rhi: Arc<R>, pool: Arc<PriorityPool>, shader_cache_root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            rhi,
            pool,
            cache: ShaderCache::new(shader_cache_root),
            shaders: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    /// Requests background loading of `shader`, returning a `TaskGroup` the
    /// caller must `wait()` on before using the shader's handle. Returns an
    /// already-completed group if the shader is already loaded or failed, and
    /// the in-flight group if another caller is already loading the identical
    /// shader identity.
    pub fn request_shader_loading(self: &Arc<Self>, shader: &ShaderMetadata) -> Arc<TaskGroup> {
        let key = ShaderKey::from(shader);
        let mut shaders = self.shaders.lock();
        match shaders.get(&key) {
            Some(ShaderState::Loading(group)) => return group.clone(),
            Some(_) => return TaskGroup::new(),
            None => {}
        }

        let group = TaskGroup::new();
        shaders.insert(key.clone(), ShaderState::Loading(group.clone()));
        drop(shaders);

        let this = self.clone();
        let shader = shader.clone();
        group.dispatch(&this.pool, Priority::Low, move || {
            let result = this.compile_shader(&shader);
            let mut shaders = this.shaders.lock();
            shaders.insert(
                ShaderKey::from(&shader),
                match result {
                    Ok(handle) => ShaderState::Loaded(handle),
                    Err(e) => ShaderState::Failed(e.to_string()),
                },
            );
        });
        group
    }

    /// Blocks until `shader` is loaded, then returns its handle. Convenience
    /// wrapper around `request_shader_loading` + `wait` for a single shader.
    pub fn wait_for_shader(self: &Arc<Self>, shader: &ShaderMetadata) -> Result<ShaderHandle> {
        self.request_shader_loading(shader).wait();
        self.shader_handle(shader)
    }

    fn compile_shader(&self, shader: &ShaderMetadata) -> Result<ShaderHandle> {
        let processed_source = if self.cache.is_shader_outdated(&shader.path) {
            let source = std::fs::read_to_string(&shader.path)
                .map_err(|e| Error::ShaderCompilationFailed { path: shader.path.clone(), diagnostics: e.to_string() })?;
            let (processed, dependencies) = apply_defines(&source, &shader.defines);
            self.cache.update(&shader.path, &processed, &dependencies)?;
            processed
        } else {
            self.cache.load_cached_source(&shader.path)?
        };

        self.rhi.create_shader(&processed_source, shader.shader_type.into(), &shader.path)
    }

    fn shader_handle(&self, shader: &ShaderMetadata) -> Result<ShaderHandle> {
        let key = ShaderKey::from(shader);
        match self.shaders.lock().get(&key) {
            Some(ShaderState::Loaded(handle)) => Ok(*handle),
            Some(ShaderState::Failed(diagnostics)) => {
                Err(Error::ShaderCompilationFailed { path: shader.path.clone(), diagnostics: diagnostics.clone() })
            }
            _ => Err(Error::ShaderCompilationFailed {
                path: shader.path.clone(),
                diagnostics: "shader handle requested before loading completed".into(),
            }),
        }
    }

    /// Creates (or returns the already-created) pipeline named by
    /// `pipeline_metadata.name`, dispatching and waiting on every one of its
    /// shaders' loads first. `color_formats`/`depth_format` come from the
    /// calling pass's render-target metadata, which this manager has no
    /// visibility into — pipeline identity is shader-driven, format
    /// resolution is the pass's job.
    pub fn create_pipeline(
        self: &Arc<Self>,
        pipeline_metadata: &PipelineMetadata,
        color_formats: &[TextureFormat],
        depth_format: Option<TextureFormat>,
    ) -> Result<PipelineHandle> {
        if let Some(&handle) = self.pipelines.lock().get(&pipeline_metadata.name) {
            return Ok(handle);
        }

        let groups: Vec<Arc<TaskGroup>> =
            pipeline_metadata.shaders.iter().map(|shader| self.request_shader_loading(shader)).collect();
        for group in &groups {
            group.wait();
        }

        let handles: Vec<ShaderHandle> =
            pipeline_metadata.shaders.iter().map(|shader| self.shader_handle(shader)).collect::<Result<_>>()?;

        let handle = if pipeline_metadata.shaders.iter().any(|s| s.shader_type == ShaderTypeSpec::RayGeneration) {
            self.build_ray_tracing_pipeline(pipeline_metadata, &handles)?
        } else if pipeline_metadata.shaders.iter().any(|s| s.shader_type == ShaderTypeSpec::Compute) {
            self.build_compute_pipeline(pipeline_metadata, &handles)?
        } else {
            self.build_graphics_pipeline(pipeline_metadata, &handles, color_formats, depth_format)?
        };

        self.pipelines.lock().insert(pipeline_metadata.name.clone(), handle);
        Ok(handle)
    }

    fn build_graphics_pipeline(
        &self,
        metadata: &PipelineMetadata,
        handles: &[ShaderHandle],
        color_formats: &[TextureFormat],
        depth_format: Option<TextureFormat>,
    ) -> Result<PipelineHandle> {
        let find = |want: ShaderTypeSpec, missing: &str| {
            metadata
                .shaders
                .iter()
                .zip(handles)
                .find(|(s, _)| s.shader_type == want)
                .map(|(_, &h)| h)
                .ok_or_else(|| Error::ShaderCompilationFailed { path: metadata.name.clone(), diagnostics: missing.to_string() })
        };
        let vertex_shader = find(ShaderTypeSpec::Vertex, "graphics pipeline requires a vertex shader")?;
        let fragment_shader = find(ShaderTypeSpec::Fragment, "graphics pipeline requires a fragment shader")?;
        self.rhi.create_graphics_pipeline(&GraphicsPipelineInfo {
            vertex_shader,
            fragment_shader,
            color_formats: color_formats.to_vec(),
            depth_format,
        })
    }

    fn build_compute_pipeline(&self, metadata: &PipelineMetadata, handles: &[ShaderHandle]) -> Result<PipelineHandle> {
        let shader = metadata
            .shaders
            .iter()
            .zip(handles)
            .find(|(s, _)| s.shader_type == ShaderTypeSpec::Compute)
            .map(|(_, &h)| h)
            .ok_or_else(|| Error::ShaderCompilationFailed {
                path: metadata.name.clone(),
                diagnostics: "compute pipeline requires a compute shader".into(),
            })?;
        self.rhi.create_compute_pipeline(&ComputePipelineInfo { shader })
    }

    fn build_ray_tracing_pipeline(&self, metadata: &PipelineMetadata, handles: &[ShaderHandle]) -> Result<PipelineHandle> {
        let raygen_shader = metadata
            .shaders
            .iter()
            .zip(handles)
            .find(|(s, _)| s.shader_type == ShaderTypeSpec::RayGeneration)
            .map(|(_, &h)| h)
            .ok_or_else(|| Error::ShaderCompilationFailed {
                path: metadata.name.clone(),
                diagnostics: "ray tracing pipeline requires a raygen shader".into(),
            })?;
        let miss_shaders: Vec<ShaderHandle> = metadata
            .shaders
            .iter()
            .zip(handles)
            .filter(|(s, _)| s.shader_type == ShaderTypeSpec::RayMiss)
            .map(|(_, &h)| h)
            .collect();
        let hit_groups: Vec<HitGroup> = synthesize_hit_groups(&metadata.shaders)
            .into_iter()
            .map(|g| HitGroup {
                closest_hit: g.closest_hit.map(|i| handles[i]),
                any_hit: g.any_hit.map(|i| handles[i]),
                is_procedural: g.is_procedural,
            })
            .collect();
        self.rhi.create_ray_tracing_pipeline(&RayTracingPipelineInfo { raygen_shader, miss_shaders, hit_groups })
    }
}

/// Expands `defines` into leading WGSL `override` declarations (matching the
/// teacher's pipeline cache's WGSL-override approach to shader defines) and
/// scans `#include "path"` lines for dependency paths to record in the shader
/// cache's staleness metadata.
fn apply_defines(source: &str, defines: &[String]) -> (String, Vec<String>) {
    let mut processed = String::new();
    for define in defines {
        processed.push_str(&format!("override {define}: bool = true;\n"));
    }
    processed.push_str(source);

    let dependencies = source
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("#include")?.trim();
            let rest = rest.strip_prefix('"')?;
            let end = rest.find('"')?;
            Some(rest[..end].to_string())
        })
        .collect();

    (processed, dependencies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::HitGroupTypeSpec;
    use crate::rhi::fake::FakeRhi;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("helio_pipeline_manager_test_{name}_{:?}", std::thread::current().id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn shader(dir: &std::path::Path, file: &str, shader_type: ShaderTypeSpec, contents: &str) -> ShaderMetadata {
        let path = dir.join(file);
        std::fs::write(&path, contents).unwrap();
        ShaderMetadata {
            path: path.to_str().unwrap().to_string(),
            shader_type,
            entry_point: "main".into(),
            defines: Vec::new(),
            hit_group_type: HitGroupTypeSpec::Triangles,
        }
    }

    #[test]
    fn creating_a_pipeline_twice_reuses_the_cached_handle() {
        let dir = scratch_dir("dedup");
        let rhi = Arc::new(FakeRhi::new());
        let pool = Arc::new(PriorityPool::with_thread_counts(2, 1, 1));
        let manager = PipelineManager::new(rhi, pool, dir.join("cache"));

        let metadata = PipelineMetadata {
            name: "pipeline_manager_test_pipeline".into(),
            shaders: vec![
                shader(&dir, "vs.wgsl", ShaderTypeSpec::Vertex, "fn vs_main() {}"),
                shader(&dir, "fs.wgsl", ShaderTypeSpec::Fragment, "fn fs_main() {}"),
            ],
        };

        let first = manager.create_pipeline(&metadata, &[TextureFormat::Rgba8Unorm], None).unwrap();
        let second = manager.create_pipeline(&metadata, &[TextureFormat::Rgba8Unorm], None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn concurrent_requests_for_the_identical_shader_compile_only_once() {
        let dir = scratch_dir("concurrent");
        let rhi = Arc::new(FakeRhi::new());
        let pool = Arc::new(PriorityPool::with_thread_counts(4, 1, 1));
        let manager = PipelineManager::new(rhi, pool, dir.join("cache"));
        let shader_metadata = shader(&dir, "vs.wgsl", ShaderTypeSpec::Vertex, "fn vs_main() {}");

        let groups: Vec<_> = (0..8).map(|_| manager.request_shader_loading(&shader_metadata)).collect();
        for group in &groups {
            group.wait();
        }

        let handle_a = manager.shader_handle(&shader_metadata).unwrap();
        let handle_b = manager.shader_handle(&shader_metadata).unwrap();
        assert_eq!(handle_a, handle_b);
    }
}
