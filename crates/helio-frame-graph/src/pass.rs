//! The render pass trait and the default resource-scheduling behavior every
//! concrete pass's `schedule_resources` is built from.
//!
//! Grounded in `original_source`'s `RenderPass` base class and
//! `ResourceScheduler` static helpers (`render_pass.h`/`resource_scheduler.h`).
//! Per the design note on dynamic dispatch, passes are modeled as a trait with
//! two required methods (`schedule_resources`, `execute`) and one optional one
//! (`create_pipeline`), rather than a base class with virtual state tables —
//! the state-layout tables become the free functions in [`resource_scheduler`].

use crate::error::{Error, Result};
use crate::graph::RenderGraph;
use crate::name::{Name, BACK_BUFFER_NAME};
use crate::resource::{GraphMetadata, RenderPassMetadata, TextureMetadata, TransientResourceManager, ViewName, DEFAULT_READ_LAYOUT};
use crate::rhi::{Rhi, ResourceLayout, TextureFormat, TextureInfo, TextureUsage};

/// Threaded through `schedule_resources`: the graph node and resource manager a
/// pass declares its read/write dependencies against.
pub struct ScheduleContext<'a> {
    pub pass_name: Name,
    pub graph: &'a mut RenderGraph,
    pub resources: &'a mut TransientResourceManager,
}

/// A render pass's three hooks. `R` is the concrete RHI backend a given
/// `Renderer<R>` is wired to; fixing it per-renderer keeps `dyn RenderPass<R>`
/// object-safe without boxing command buffers.
pub trait RenderPass<R: Rhi>: Send + Sync {
    fn name(&self) -> Name;

    /// Declares this frame's resource allocations/usages and graph
    /// read/write dependencies. Called once per frame, before the graph is
    /// compiled. Most concrete passes delegate entirely to
    /// [`resource_scheduler::default_schedule_resources`].
    fn schedule_resources(&self, ctx: &mut ScheduleContext) -> Result<()>;

    /// Creates (or recreates, on reload) this pass's pipeline. Most passes
    /// accept the default no-op and rely on the metadata-driven pipeline
    /// manager instead.
    fn create_pipeline(&mut self, _rhi: &R) -> Result<()> {
        Ok(())
    }

    /// Records draws/dispatches into `cmd`. Entirely opaque to the core: binds
    /// its pipeline, pushes constants, issues draws/dispatches/ray-dispatches.
    fn execute(&mut self, cmd: &mut R::CommandBuffer) -> Result<()>;
}

/// Metadata-driven default `schedule_resources` behavior, free-function style
/// per the design note that the base class's state-layout tables become free
/// functions parameterized on the pass's own metadata. A concrete pass calls
/// this first from its own `schedule_resources` and then layers on anything
/// its hook needs beyond declarative metadata (extra reads a shader computes
/// dynamically, ping-pong history, and so on).
pub fn default_schedule_resources(ctx: &mut ScheduleContext, pass_metadata: &RenderPassMetadata, graph_metadata: &GraphMetadata) -> Result<()> {
    for input in &pass_metadata.input_textures {
        resource_scheduler::read_texture(ctx, Name::new(input))?;
    }
    for target in &pass_metadata.render_targets {
        resource_scheduler::create_render_target(ctx, target, graph_metadata)?;
    }
    for storage in &pass_metadata.output_storage_textures {
        resource_scheduler::create_storage_texture(ctx, Name::new(storage), graph_metadata)?;
    }
    Ok(())
}

/// The free functions every pass's default resource scheduling is built from.
/// Grounded in `original_source`'s `ResourceScheduler` static class.
pub mod resource_scheduler {
    use super::*;
    use crate::resource::RenderTargetMetadata;

    fn texture_info(metadata: &TextureMetadata, usage: TextureUsage) -> TextureInfo {
        let mut usage = usage;
        if metadata.is_transfer_dst {
            usage |= TextureUsage::TRANSFER_DST;
        }
        let mip_levels = if metadata.use_mips && metadata.width > 0 && metadata.height > 0 {
            32 - metadata.width.max(metadata.height).leading_zeros()
        } else {
            1
        };
        TextureInfo {
            width: metadata.width,
            height: metadata.height,
            depth_or_layers: metadata.layer_count,
            mip_levels,
            sample_count: metadata.sample_count.unwrap_or(1),
            format: metadata.format.into(),
            usage,
        }
    }

    fn queue_allocation(ctx: &mut ScheduleContext, name: Name, metadata: &TextureMetadata, usage: TextureUsage) {
        let info = texture_info(metadata, usage);
        let pass = ctx.pass_name;
        ctx.resources.queue_resource_allocation(pass, name, crate::resource::ResourceInfo::Texture(info), Box::new(|_| {}));
    }

    /// Input texture: requests the default read layout (`ShaderRead`) on view 0
    /// and adds a read dependency on the same view.
    pub fn read_texture(ctx: &mut ScheduleContext, texture: Name) -> Result<()> {
        let view = ViewName::encode(texture, 0);
        let pass = ctx.pass_name;
        ctx.resources.queue_resource_usage(
            pass,
            texture,
            Box::new(move |resource| resource.scheduling_info.add_view_info(pass, 0, DEFAULT_READ_LAYOUT)),
        );
        ctx.graph.add_read_dependency(pass, view);
        Ok(())
    }

    /// One render-target metadata entry: a depth-stencil or color attachment
    /// allocation and write-dependency, or — if the entry names no texture —
    /// a write-dependency on the swap-chain back buffer sentinel.
    pub fn create_render_target(ctx: &mut ScheduleContext, target: &RenderTargetMetadata, graph_metadata: &GraphMetadata) -> Result<()> {
        let Some(texture_name) = target.texture_name.as_deref() else {
            let back_buffer = Name::new(BACK_BUFFER_NAME);
            let view = ViewName::encode(back_buffer, 0);
            return ctx.graph.add_write_dependency(ctx.pass_name, back_buffer, view).map_err(|err| match err {
                Error::DuplicateWriter { pass, first_writer, .. } => Error::MultipleBackBufferWrites { pass, first_writer },
                other => other,
            });
        };

        let name = Name::new(texture_name);
        let metadata = graph_metadata.get_texture_metadata(name).ok_or(Error::UnknownResource { pass: ctx.pass_name, resource: name })?;
        let format: TextureFormat = metadata.format.into();

        let (usage, layout) = if format.is_depth_stencil() {
            (TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::SAMPLED_TEXTURE | TextureUsage::TRANSFER_SRC, ResourceLayout::DEPTH_STENCIL)
        } else {
            (TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED_TEXTURE | TextureUsage::TRANSFER_SRC, ResourceLayout::COLOR_ATTACHMENT)
        };

        queue_allocation(ctx, name, metadata, usage);
        let pass = ctx.pass_name;
        ctx.resources.queue_resource_usage(
            pass,
            name,
            Box::new(move |resource| resource.scheduling_info.add_view_info(pass, 0, layout)),
        );
        ctx.graph.add_write_dependency(pass, name, ViewName::encode(name, 0))
    }

    /// An output storage-texture name: `StorageTexture | SampledTexture`
    /// allocation at `General` layout, with a write dependency.
    pub fn create_storage_texture(ctx: &mut ScheduleContext, texture: Name, graph_metadata: &GraphMetadata) -> Result<()> {
        let metadata = graph_metadata.get_texture_metadata(texture).ok_or(Error::UnknownResource { pass: ctx.pass_name, resource: texture })?;
        queue_allocation(ctx, texture, metadata, TextureUsage::STORAGE_TEXTURE | TextureUsage::SAMPLED_TEXTURE);
        let pass = ctx.pass_name;
        ctx.resources.queue_resource_usage(
            pass,
            texture,
            Box::new(move |resource| resource.scheduling_info.add_view_info(pass, 0, ResourceLayout::GENERAL)),
        );
        ctx.graph.add_write_dependency(pass, texture, ViewName::encode(texture, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RenderPassType;
    use crate::resource::{GraphMetadata, RenderTargetMetadata, TransientResourceManager};

    const DOCUMENT: &str = r#"
    {
        "textures": [
            { "name": "pass_test_albedo", "format": "rgba8_unorm" },
            { "name": "pass_test_depth", "format": "depth32_float" }
        ],
        "render_passes": [
            {
                "name": "pass_test_gbuffer",
                "type": "graphics",
                "render_targets": [
                    { "texture_name": "pass_test_albedo" },
                    { "texture_name": "pass_test_depth" }
                ]
            },
            {
                "name": "pass_test_composite",
                "type": "graphics",
                "input_textures": ["pass_test_albedo"],
                "render_targets": [ { } ]
            }
        ]
    }
    "#;

    #[test]
    fn default_schedule_resources_wires_reads_writes_and_back_buffer() {
        let graph_metadata = GraphMetadata::from_json(DOCUMENT).unwrap();
        let passes = vec![
            (Name::new("pass_test_gbuffer"), RenderPassType::Graphics, false),
            (Name::new("pass_test_composite"), RenderPassType::Graphics, false),
        ];
        let mut graph = RenderGraph::new(&passes);
        let mut resources = TransientResourceManager::new();
        graph.clear();
        resources.begin_frame();
        resources.begin_resource_scheduling();

        for pass_metadata in graph_metadata.render_passes_metadata() {
            let mut ctx = ScheduleContext { pass_name: Name::new(&pass_metadata.name), graph: &mut graph, resources: &mut resources };
            default_schedule_resources(&mut ctx, pass_metadata, &graph_metadata).unwrap();
        }

        resources.end_resource_scheduling().unwrap();
        graph.build().unwrap();

        assert_eq!(graph.dependency_levels().len(), 2);
        let albedo = Name::new("pass_test_albedo");
        assert!(resources.get(albedo).is_some());
        let back_buffer = Name::new(BACK_BUFFER_NAME);
        assert!(resources.get(back_buffer).is_none(), "back buffer is a sentinel, never a transient resource");
    }

    #[test]
    fn two_passes_writing_the_back_buffer_is_reported_distinctly() {
        let passes = vec![
            (Name::new("pass_test_bb_a"), RenderPassType::Graphics, false),
            (Name::new("pass_test_bb_b"), RenderPassType::Graphics, false),
        ];
        let mut graph = RenderGraph::new(&passes);
        let mut resources = TransientResourceManager::new();
        graph.clear();
        resources.begin_frame();
        resources.begin_resource_scheduling();

        let target = RenderTargetMetadata { texture_name: None, store_op: Default::default(), load_op: Default::default(), clear_color: None, clear_depth_stencil: None };
        let graph_metadata = GraphMetadata::from_json(r#"{"textures": [], "render_passes": []}"#).unwrap();

        {
            let mut ctx = ScheduleContext { pass_name: Name::new("pass_test_bb_a"), graph: &mut graph, resources: &mut resources };
            resource_scheduler::create_render_target(&mut ctx, &target, &graph_metadata).unwrap();
        }
        let err = {
            let mut ctx = ScheduleContext { pass_name: Name::new("pass_test_bb_b"), graph: &mut graph, resources: &mut resources };
            resource_scheduler::create_render_target(&mut ctx, &target, &graph_metadata).unwrap_err()
        };
        assert!(matches!(err, Error::MultipleBackBufferWrites { .. }));
    }
}
