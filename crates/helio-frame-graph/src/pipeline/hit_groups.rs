//! Ray-tracing hit-group synthesis: grouping a pipeline's closest-hit/any-hit
//! shaders into the minimal set of hit groups a ray-tracing pipeline needs.
//!
//! Grounded in `original_source`'s `PipelineManager::configure_pipeline_info`
//! (`pipeline_manager.cpp`), whose `fillGeometryHitGroup` lambda has
//! fallthrough-shaped control flow across a triangle/procedural `switch`. This
//! expresses the same grouping rule as a single explicit match with no
//! fallthrough (see DESIGN.md).

use crate::resource::{HitGroupTypeSpec, ShaderMetadata, ShaderTypeSpec};

/// One synthesized hit group, referencing shaders by their index into the
/// pipeline metadata's shader list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HitGroupSpec {
    pub closest_hit: Option<usize>,
    pub any_hit: Option<usize>,
    pub is_procedural: bool,
}

/// Walks `shaders` in declaration order and groups consecutive closest-hit/
/// any-hit shaders: a shader joins the last group if that group's geometry
/// type (triangles/procedural) matches and the group's matching slot
/// (closest-hit for a closest-hit shader, any-hit for an any-hit shader) is
/// still empty; otherwise it starts a new group. Non-hit shaders (raygen,
/// miss, compute, ...) are skipped.
pub fn synthesize_hit_groups(shaders: &[ShaderMetadata]) -> Vec<HitGroupSpec> {
    let mut groups: Vec<HitGroupSpec> = Vec::new();

    for (index, shader) in shaders.iter().enumerate() {
        let is_closest_hit = shader.shader_type == ShaderTypeSpec::RayClosestHit;
        let is_any_hit = shader.shader_type == ShaderTypeSpec::RayAnyHit;
        if !is_closest_hit && !is_any_hit {
            continue;
        }
        let is_procedural = shader.hit_group_type == HitGroupTypeSpec::Procedural;

        let reuse_last = match groups.last() {
            Some(group) if group.is_procedural == is_procedural => {
                (!is_closest_hit || group.closest_hit.is_none()) && (!is_any_hit || group.any_hit.is_none())
            }
            _ => false,
        };

        if !reuse_last {
            groups.push(HitGroupSpec { closest_hit: None, any_hit: None, is_procedural });
        }
        let group = groups.last_mut().expect("a group was just pushed if none existed");
        if is_closest_hit {
            group.closest_hit = Some(index);
        } else {
            group.any_hit = Some(index);
        }
    }

    groups
}
