//! Builds the `RenderingBeginInfo` a graphics-queue node's `begin_rendering`
//! call needs from its render-target metadata, for step 4 (record) of the
//! frame executor.

use crate::name::Name;
use crate::resource::{GraphMetadata, ResourceHandle, TransientResourceManager};
use crate::rhi::{ColorAttachment, DepthStencilAttachment, RenderingBeginInfo, TextureFormat};

/// `is_back_buffer` is passed in rather than re-derived here: the executor
/// already knows it from the barrier plan computed earlier this frame.
pub fn render_target_info(
    graph_metadata: &GraphMetadata,
    resources: &TransientResourceManager,
    pass_name: Name,
    is_back_buffer: bool,
    width: u32,
    height: u32,
) -> RenderingBeginInfo {
    let mut info = RenderingBeginInfo { width, height, back_buffer: is_back_buffer, ..Default::default() };
    let Some(pass_metadata) = graph_metadata.get_render_pass_metadata(pass_name) else {
        return info;
    };

    for target in &pass_metadata.render_targets {
        let Some(texture_name) = target.texture_name.as_deref() else {
            info.back_buffer = true;
            continue;
        };
        let resource_name = Name::new(texture_name);
        let Some(resource) = resources.get(resource_name) else { continue };
        let Some(ResourceHandle::Texture(texture)) = resource.handle else { continue };
        let is_depth = graph_metadata
            .get_texture_metadata(resource_name)
            .map(|metadata| TextureFormat::from(metadata.format).is_depth_stencil())
            .unwrap_or(false);

        if is_depth {
            let (clear_depth, clear_stencil) = target.clear_depth_stencil.unwrap_or((1.0, 0));
            info.depth_stencil_attachment = Some(DepthStencilAttachment {
                texture,
                load_op: target.load_op.into(),
                store_op: target.store_op.into(),
                clear_depth,
                clear_stencil,
            });
        } else {
            info.color_attachments.push(ColorAttachment {
                texture,
                load_op: target.load_op.into(),
                store_op: target.store_op.into(),
                clear_color: target.clear_color.unwrap_or([0.0; 4]),
            });
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RenderPassType;
    use crate::resource::ResourceInfo;
    use crate::rhi::fake::FakeRhi;
    use crate::rhi::{TextureInfo, TextureUsage};

    const DOCUMENT: &str = r#"
    {
        "textures": [ { "name": "attachments_test_color", "format": "rgba8_unorm" } ],
        "render_passes": [
            { "name": "attachments_test_pass", "type": "graphics", "render_targets": [ { "texture_name": "attachments_test_color" } ] },
            { "name": "attachments_test_bb_pass", "type": "graphics", "render_targets": [ { } ] }
        ]
    }
    "#;

    #[test]
    fn color_attachment_resolves_from_allocated_handle() {
        let rhi = FakeRhi::new();
        let metadata = GraphMetadata::from_json(DOCUMENT).unwrap();
        let mut resources = TransientResourceManager::new();
        let pass = Name::new("attachments_test_pass");
        let name = Name::new("attachments_test_color");

        resources.begin_frame();
        resources.begin_resource_scheduling();
        resources.queue_resource_allocation(
            pass,
            name,
            ResourceInfo::Texture(TextureInfo { width: 4, height: 4, depth_or_layers: 1, mip_levels: 1, sample_count: 1, format: TextureFormat::Rgba8Unorm, usage: TextureUsage::COLOR_ATTACHMENT }),
            Box::new(|_| {}),
        );
        resources.end_resource_scheduling().unwrap();
        resources.allocate_scheduled_resources_with(&rhi).unwrap();

        let info = render_target_info(&metadata, &resources, pass, false, 4, 4);
        assert_eq!(info.color_attachments.len(), 1);
        assert!(info.depth_stencil_attachment.is_none());
        assert!(!info.back_buffer);
        let _ = RenderPassType::Graphics;
    }

    #[test]
    fn missing_texture_name_marks_back_buffer() {
        let metadata = GraphMetadata::from_json(DOCUMENT).unwrap();
        let resources = TransientResourceManager::new();
        let info = render_target_info(&metadata, &resources, Name::new("attachments_test_bb_pass"), true, 4, 4);
        assert!(info.back_buffer);
        assert!(info.color_attachments.is_empty());
    }
}
