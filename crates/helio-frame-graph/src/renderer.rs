//! The application-facing entry point: owns the graph metadata, the render
//! graph, the transient resource manager and the frame executor, and exposes
//! the four calls a host application makes — `new`, `predraw`, `draw`, and
//! (implicit on drop) `shutdown`.

use crate::error::Result;
use crate::executor::{FrameExecutor, FrameInputs};
use crate::graph::{RenderGraph, RenderPassType};
use crate::name::Name;
use crate::pass::{RenderPass, ScheduleContext};
use crate::pipeline::PipelineManager;
use crate::resource::{GraphMetadata, ShaderTypeSpec, TransientResourceManager};
use crate::rhi::{PipelineHandle, QueueType, Rhi, TextureFormat};
use crate::scheduler::PriorityPool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Renderer construction parameters. Ring size, shader-cache location and
/// initial swap-chain extent are the only knobs the frame graph core itself
/// needs; everything else (device selection, window, surface format) lives on
/// the RHI backend's own config, outside this crate's scope.
pub struct RendererConfig {
    pub ring_size: usize,
    pub shader_cache_root: PathBuf,
    pub width: u32,
    pub height: u32,
}

fn pass_type(metadata_type: crate::resource::RenderPassTypeSpec) -> RenderPassType {
    match metadata_type {
        crate::resource::RenderPassTypeSpec::Graphics => RenderPassType::Graphics,
        crate::resource::RenderPassTypeSpec::Compute => RenderPassType::Compute,
    }
}

fn uses_ray_tracing(pass_metadata: &crate::resource::RenderPassMetadata) -> bool {
    pass_metadata
        .pipeline
        .as_ref()
        .map(|p| p.shaders.iter().any(|s| s.shader_type == ShaderTypeSpec::RayGeneration))
        .unwrap_or(false)
}

/// Resolves the color/depth attachment formats a pass's pipeline must be
/// built against, from its render-target metadata. The back-buffer case
/// (`texture_name: None`) has no declared format here — a pass targeting the
/// back buffer is expected to pass its surface format to `create_pipeline`
/// itself, outside the metadata-driven path this helper covers.
fn attachment_formats(
    graph_metadata: &GraphMetadata,
    pass_metadata: &crate::resource::RenderPassMetadata,
) -> (Vec<TextureFormat>, Option<TextureFormat>) {
    let mut color_formats = Vec::new();
    let mut depth_format = None;
    for target in &pass_metadata.render_targets {
        let Some(texture_name) = target.texture_name.as_deref() else { continue };
        let Some(metadata) = graph_metadata.get_texture_metadata(Name::new(texture_name)) else { continue };
        let format: TextureFormat = metadata.format.into();
        if format.is_depth_stencil() {
            depth_format = Some(format);
        } else {
            color_formats.push(format);
        }
    }
    (color_formats, depth_format)
}

/// Owns one frame graph's worth of long-lived state for an `Rhi` backend:
/// the graph metadata document, the compiled graph, the transient resource
/// manager, the pipeline/shader manager, the scheduler pool and the frame
/// executor.
pub struct Renderer<R: Rhi + 'static> {
    rhi: Arc<R>,
    pool: Arc<PriorityPool>,
    pipelines: Arc<PipelineManager<R>>,
    graph_metadata: GraphMetadata,
    graph: RenderGraph,
    resources: TransientResourceManager,
    executor: FrameExecutor<R>,
    passes: Vec<Box<dyn RenderPass<R>>>,
    pipeline_handles: HashMap<Name, PipelineHandle>,
    width: u32,
    height: u32,
}

impl<R: Rhi + 'static> Renderer<R> {
    /// Builds the render graph's fixed node set from `graph_metadata`'s
    /// render-pass declarations, in the order `passes` lists them. Every pass
    /// named in `graph_metadata` must have a matching entry in `passes`, in
    /// the same order — the two lists describe the same fixed set of nodes,
    /// one as data, one as behavior.
    pub fn new(rhi: Arc<R>, config: RendererConfig, graph_metadata: GraphMetadata, passes: Vec<Box<dyn RenderPass<R>>>) -> Result<Self> {
        log::info!("creating frame graph renderer ({}x{}, ring size {})", config.width, config.height, config.ring_size);

        let pool = Arc::new(PriorityPool::new());
        let pipelines = PipelineManager::new(rhi.clone(), pool.clone(), config.shader_cache_root);

        let node_decls: Vec<(Name, RenderPassType, bool)> = graph_metadata
            .render_passes_metadata()
            .map(|pass_metadata| (Name::new(&pass_metadata.name), pass_type(pass_metadata.pass_type), uses_ray_tracing(pass_metadata)))
            .collect();
        let graph = RenderGraph::new(&node_decls);

        Ok(Self {
            rhi,
            pool,
            pipelines,
            graph_metadata,
            graph,
            resources: TransientResourceManager::new(),
            executor: FrameExecutor::new(config.ring_size),
            passes,
            pipeline_handles: HashMap::new(),
            width: config.width,
            height: config.height,
        })
    }

    /// One-shot preparation performed before the first `draw`: compiles every
    /// metadata-declared pipeline up front (rather than stalling the first
    /// frame that needs one) and gives each pass its `create_pipeline` hook,
    /// for state a pass builds outside the metadata-driven path (e.g.
    /// uploading a font atlas).
    pub fn predraw(&mut self) -> Result<()> {
        for pass_metadata in self.graph_metadata.render_passes_metadata() {
            let Some(pipeline_metadata) = &pass_metadata.pipeline else { continue };
            let (color_formats, depth_format) = attachment_formats(&self.graph_metadata, pass_metadata);
            let handle = self.pipelines.create_pipeline(pipeline_metadata, &color_formats, depth_format)?;
            self.pipeline_handles.insert(Name::new(&pass_metadata.name), handle);
        }
        for pass in &mut self.passes {
            pass.create_pipeline(&*self.rhi)?;
        }
        Ok(())
    }

    /// Runs one frame: clears and rebuilds the graph from each pass's
    /// declared dependencies, allocates transient resources, enqueues
    /// deferred destruction for resources that dropped out this frame, then
    /// hands everything to the frame executor.
    pub fn draw(&mut self, inputs: FrameInputs<R>) -> Result<()> {
        let ring_index = self.executor.ring_index();

        self.graph.clear();
        self.resources.begin_frame();
        self.resources.begin_resource_scheduling();

        for pass in &self.passes {
            let pass_name = pass.name();
            let mut ctx = ScheduleContext { pass_name, graph: &mut self.graph, resources: &mut self.resources };
            pass.schedule_resources(&mut ctx)?;
        }

        self.resources.end_resource_scheduling()?;
        self.resources.enqueue_unique_previous_frame_resources(self.executor.deletion_queue_mut(), ring_index);
        self.resources.allocate_scheduled_resources_with(&*self.rhi)?;
        self.graph.build()?;

        self.executor.execute_frame(
            &*self.rhi,
            &self.graph,
            &self.resources,
            &self.graph_metadata,
            &mut self.passes,
            &self.pipeline_handles,
            self.width,
            self.height,
            inputs,
        )
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        log::info!("resizing frame graph renderer to {width}x{height}");
        self.width = width;
        self.height = height;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pipelines(&self) -> &Arc<PipelineManager<R>> {
        &self.pipelines
    }

    pub fn pool(&self) -> &Arc<PriorityPool> {
        &self.pool
    }
}

impl<R: Rhi + 'static> Drop for Renderer<R> {
    /// Waits both queues idle, then drains every ring slot's deletion queue
    /// (not just the current one) and destroys every semaphore/fence the
    /// executor ever acquired. Implicit `shutdown()`.
    fn drop(&mut self) {
        log::info!("shutting down frame graph renderer");
        self.rhi.wait_queue_idle(QueueType::Graphics);
        self.rhi.wait_queue_idle(QueueType::Compute);
        for ring_index in 0..self.executor.ring_size() {
            self.executor.deletion_queue_mut().drain(ring_index, &*self.rhi);
        }
        self.executor.destroy(&*self.rhi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::fake::FakeRhi;

    struct NoopPass {
        name: Name,
    }

    impl RenderPass<FakeRhi> for NoopPass {
        fn name(&self) -> Name {
            self.name
        }

        fn schedule_resources(&self, ctx: &mut ScheduleContext) -> Result<()> {
            let back_buffer = Name::new(crate::name::BACK_BUFFER_NAME);
            ctx.graph.add_write_dependency(self.name, back_buffer, crate::resource::ViewName::encode(back_buffer, 0))
        }

        fn execute(&mut self, _cmd: &mut <FakeRhi as Rhi>::CommandBuffer) -> Result<()> {
            Ok(())
        }
    }

    const DOCUMENT: &str = r#"
    {
        "textures": [],
        "render_passes": [
            { "name": "renderer_test_pass", "type": "graphics", "render_targets": [ { } ] }
        ]
    }
    "#;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("helio_renderer_test_{name}_{:?}", std::thread::current().id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn draw_presents_once_when_a_pass_writes_the_back_buffer() {
        let rhi = Arc::new(FakeRhi::new());
        let graph_metadata = GraphMetadata::from_json(DOCUMENT).unwrap();
        let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![Box::new(NoopPass { name: Name::new("renderer_test_pass") })];
        let config = RendererConfig { ring_size: 2, shader_cache_root: scratch_dir("draw"), width: 16, height: 16 };

        let mut renderer = Renderer::new(rhi.clone(), config, graph_metadata, passes).unwrap();
        renderer.predraw().unwrap();
        renderer.draw(FrameInputs::default()).unwrap();

        assert_eq!(rhi.present_count.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_drains_every_ring_slot() {
        let rhi = Arc::new(FakeRhi::new());
        let graph_metadata = GraphMetadata::from_json(DOCUMENT).unwrap();
        let passes: Vec<Box<dyn RenderPass<FakeRhi>>> = vec![Box::new(NoopPass { name: Name::new("renderer_test_drop_pass") })];
        let config = RendererConfig { ring_size: 2, shader_cache_root: scratch_dir("drop"), width: 8, height: 8 };

        let mut renderer = Renderer::new(rhi.clone(), config, graph_metadata, passes).unwrap();
        renderer.draw(FrameInputs::default()).unwrap();
        drop(renderer);
    }
}
