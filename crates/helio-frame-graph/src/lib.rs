//! Multi-queue render graph compiler, transient resource manager and frame
//! executor. Consumes a declarative graph-metadata document and a GPU
//! abstraction ([`rhi::Rhi`]) and produces a minimized cross-queue
//! synchronization schedule every frame.
//!
//! Module map:
//! - [`name`] — process-wide string interning.
//! - [`error`] — the crate's single fallible-API error type.
//! - [`rhi`] — the GPU abstraction boundary, plus a `wgpu` backend and an
//!   in-memory fake used by the test suite.
//! - [`resource`] — transient resource allocation, layout tracking, ping-pong
//!   naming and the graph-metadata document parser.
//! - [`graph`] — the render graph: nodes, dependency levels, compilation.
//! - [`pass`] — the render pass trait and default resource-scheduling helpers.
//! - [`pipeline`] — shader and pipeline management, including the shader cache
//!   and ray-tracing hit-group synthesis.
//! - [`scheduler`] — the priority thread pool passes and shader compilation
//!   run on.
//! - [`sync_manager`], [`command_pool`], [`deletion_queue`] — per-frame GPU
//!   resource lifecycle (semaphores/fences, command allocators, deferred
//!   destruction).
//! - [`executor`] — ties the above together: acquire, submit-context
//!   configuration, barrier configuration, recording, submission, present.
//! - [`renderer`] — the application-facing entry point.

pub mod command_pool;
pub mod deletion_queue;
pub mod error;
pub mod executor;
pub mod graph;
pub mod name;
pub mod pass;
pub mod pipeline;
pub mod renderer;
pub mod resource;
pub mod rhi;
pub mod scheduler;
pub mod sync_manager;

pub use error::{Error, Result};
pub use renderer::{Renderer, RendererConfig};
