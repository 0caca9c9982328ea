//! Crate-wide error type.
//!
//! Variants correspond to the error kinds in the frame executor's error handling
//! design: most are fatal and reported eagerly at the scheduling API boundary;
//! `SwapChainOutOfDate` is the sole recoverable-at-frame-boundary case.

use crate::name::Name;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The render graph contains a dependency cycle. Fatal, no recovery; names the
    /// first back-edge discovered by the depth-first search.
    #[error("cyclic dependency detected in render graph: {from} -> {to}")]
    CyclicDependency { from: Name, to: Name },

    /// A pass referenced a resource name that was never queued for allocation or
    /// usage this frame. Fatal for the current frame.
    #[error("unknown resource '{resource}' referenced by pass '{pass}'")]
    UnknownResource { pass: Name, resource: Name },

    /// The same resource name was queued for primary creation more than once in a
    /// single frame's scheduling pass. Fatal for the current frame.
    #[error("resource '{resource}' queued for allocation more than once (first by '{first_pass}', again by '{pass}')")]
    DuplicateResource { pass: Name, resource: Name, first_pass: Name },

    /// More than one pass declared a write dependency against the same view in a
    /// single frame. Fatal; multiple writers make dependency-level assignment
    /// ambiguous.
    #[error("view '{view:?}' of resource '{resource}' written by both '{first_writer}' and '{pass}'")]
    DuplicateWriter { pass: Name, resource: Name, view: (u32, u32), first_writer: Name },

    /// A requested layout/usage is incompatible with the usage flags the resource
    /// was declared with.
    #[error("layout '{requested:?}' requested for resource '{resource}' is incompatible with its declared usage")]
    LayoutMismatch { resource: Name, requested: String },

    /// Shader compilation failed. Fatal at startup; recoverable only via an
    /// explicit reload request.
    #[error("shader compilation failed for '{path}': {diagnostics}")]
    ShaderCompilationFailed { path: String, diagnostics: String },

    /// The RHI device was lost. Fatal at the current frame boundary.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// The RHI ran out of memory. Fatal at the current frame boundary.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The swap chain is stale relative to the window surface. Recoverable: the
    /// caller should recreate the swap chain and skip the frame that failed.
    #[error("swap chain out of date")]
    SwapChainOutOfDate,

    /// More than one render-target entry in a single frame targeted the implicit
    /// back buffer. Left undefined by the original source; this crate surfaces it
    /// rather than silently picking a winner (see design note on Open Questions).
    #[error("back buffer written by both '{first_writer}' and '{pass}'")]
    MultipleBackBufferWrites { pass: Name, first_writer: Name },

    /// The graph metadata document referenced a texture name that no pass and no
    /// texture declaration ever defines. Fatal at load.
    #[error("render pass '{pass}' references unknown input texture '{texture}'")]
    UnknownInputTexture { pass: Name, texture: Name },

    #[error("failed to parse graph metadata: {0}")]
    MetadataParse(String),

    #[error("wgpu error: {0}")]
    Wgpu(String),
}

impl From<wgpu::Error> for Error {
    fn from(err: wgpu::Error) -> Self {
        Error::Wgpu(err.to_string())
    }
}
