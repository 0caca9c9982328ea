//! The graph metadata configuration document: read once at startup and never
//! touched again during frame scheduling. Grounded in `original_source`'s
//! `RenderGraphMetadata`/`resource_metadata.h`.

use crate::error::{Error, Result};
use crate::name::{Name, BACK_BUFFER_NAME};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormatSpec {
    Rgba8Unorm,
    Rgba16Float,
    Depth32Float,
    Depth24PlusStencil8,
    R32Uint,
}

impl From<TextureFormatSpec> for crate::rhi::TextureFormat {
    fn from(spec: TextureFormatSpec) -> Self {
        match spec {
            TextureFormatSpec::Rgba8Unorm => crate::rhi::TextureFormat::Rgba8Unorm,
            TextureFormatSpec::Rgba16Float => crate::rhi::TextureFormat::Rgba16Float,
            TextureFormatSpec::Depth32Float => crate::rhi::TextureFormat::Depth32Float,
            TextureFormatSpec::Depth24PlusStencil8 => crate::rhi::TextureFormat::Depth24PlusStencil8,
            TextureFormatSpec::R32Uint => crate::rhi::TextureFormat::R32Uint,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TextureMetadata {
    pub name: String,
    pub format: TextureFormatSpec,
    /// Missing or zero means "the current swap-chain extent", resolved by the
    /// renderer when the texture is actually allocated.
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub sample_count: Option<u32>,
    #[serde(default = "default_layer_count")]
    pub layer_count: u32,
    #[serde(default)]
    pub use_mips: bool,
    #[serde(default)]
    pub is_transfer_dst: bool,
}

fn default_layer_count() -> u32 {
    1
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPassTypeSpec {
    Graphics,
    Compute,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadOpSpec {
    #[default]
    Clear,
    Load,
    DontCare,
}

impl From<LoadOpSpec> for crate::rhi::LoadOp {
    fn from(spec: LoadOpSpec) -> Self {
        match spec {
            LoadOpSpec::Clear => crate::rhi::LoadOp::Clear,
            LoadOpSpec::Load => crate::rhi::LoadOp::Load,
            LoadOpSpec::DontCare => crate::rhi::LoadOp::DontCare,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreOpSpec {
    #[default]
    Store,
    DontCare,
}

impl From<StoreOpSpec> for crate::rhi::StoreOp {
    fn from(spec: StoreOpSpec) -> Self {
        match spec {
            StoreOpSpec::Store => crate::rhi::StoreOp::Store,
            StoreOpSpec::DontCare => crate::rhi::StoreOp::DontCare,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RenderTargetMetadata {
    /// Missing = implicit swap-chain back buffer.
    #[serde(default)]
    pub texture_name: Option<String>,
    #[serde(default)]
    pub store_op: StoreOpSpec,
    #[serde(default)]
    pub load_op: LoadOpSpec,
    #[serde(default)]
    pub clear_color: Option<[f32; 4]>,
    #[serde(default)]
    pub clear_depth_stencil: Option<(f32, u32)>,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShaderTypeSpec {
    #[default]
    Vertex,
    Fragment,
    Compute,
    RayGeneration,
    RayMiss,
    RayClosestHit,
    RayAnyHit,
}

impl From<ShaderTypeSpec> for crate::rhi::ShaderStage {
    fn from(spec: ShaderTypeSpec) -> Self {
        match spec {
            ShaderTypeSpec::Vertex => crate::rhi::ShaderStage::Vertex,
            ShaderTypeSpec::Fragment => crate::rhi::ShaderStage::Fragment,
            ShaderTypeSpec::Compute => crate::rhi::ShaderStage::Compute,
            ShaderTypeSpec::RayGeneration => crate::rhi::ShaderStage::RayGeneration,
            ShaderTypeSpec::RayMiss => crate::rhi::ShaderStage::RayMiss,
            ShaderTypeSpec::RayClosestHit => crate::rhi::ShaderStage::RayClosestHit,
            ShaderTypeSpec::RayAnyHit => crate::rhi::ShaderStage::RayAnyHit,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HitGroupTypeSpec {
    #[default]
    Triangles,
    Procedural,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash)]
pub struct ShaderMetadata {
    pub path: String,
    #[serde(rename = "type")]
    pub shader_type: ShaderTypeSpec,
    pub entry_point: String,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub hit_group_type: HitGroupTypeSpec,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PipelineMetadata {
    pub name: String,
    pub shaders: Vec<ShaderMetadata>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RenderPassMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub pass_type: RenderPassTypeSpec,
    #[serde(default)]
    pub input_textures: Vec<String>,
    #[serde(default)]
    pub render_targets: Vec<RenderTargetMetadata>,
    #[serde(default)]
    pub output_storage_textures: Vec<String>,
    #[serde(default)]
    pub pipeline: Option<PipelineMetadata>,
}

impl RenderPassMetadata {
    /// Missing pipeline name defaults to the pass's own name.
    pub fn pipeline_name(&self) -> String {
        self.pipeline.as_ref().map(|p| p.name.clone()).unwrap_or_else(|| self.name.clone())
    }
}

#[derive(Clone, Debug, Deserialize)]
struct GraphMetadataDocument {
    #[serde(default)]
    textures: Vec<TextureMetadata>,
    render_passes: Vec<RenderPassMetadata>,
}

/// The parsed graph metadata document: texture declarations and render-pass
/// declarations, indexed by interned name for O(1) lookup during pass
/// construction.
pub struct GraphMetadata {
    textures_by_name: HashMap<Name, TextureMetadata>,
    render_passes_by_name: HashMap<Name, RenderPassMetadata>,
    render_passes_ordered: Vec<Name>,
}

impl GraphMetadata {
    pub fn from_json(json: &str) -> Result<Self> {
        let document: GraphMetadataDocument =
            serde_json::from_str(json).map_err(|e| Error::MetadataParse(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::MetadataParse(e.to_string()))?;
        Self::from_json(&contents)
    }

    fn from_document(document: GraphMetadataDocument) -> Result<Self> {
        let mut textures_by_name = HashMap::new();
        for texture in document.textures {
            textures_by_name.insert(Name::new(&texture.name), texture);
        }

        let mut render_passes_by_name = HashMap::new();
        let mut render_passes_ordered = Vec::new();
        for pass in document.render_passes {
            for input in &pass.input_textures {
                if input != BACK_BUFFER_NAME && !textures_by_name.contains_key(&Name::new(input)) {
                    return Err(Error::UnknownInputTexture { pass: Name::new(&pass.name), texture: Name::new(input) });
                }
            }
            let name = Name::new(&pass.name);
            render_passes_ordered.push(name);
            render_passes_by_name.insert(name, pass);
        }

        Ok(Self { textures_by_name, render_passes_by_name, render_passes_ordered })
    }

    pub fn get_texture_metadata(&self, name: Name) -> Option<&TextureMetadata> {
        self.textures_by_name.get(&name)
    }

    pub fn get_render_pass_metadata(&self, name: Name) -> Option<&RenderPassMetadata> {
        self.render_passes_by_name.get(&name)
    }

    pub fn render_passes_metadata(&self) -> impl Iterator<Item = &RenderPassMetadata> {
        self.render_passes_ordered.iter().map(move |n| &self.render_passes_by_name[n])
    }
}
