//! Disk-persisted shader cache: skips reprocessing a shader's source (define
//! expansion, dependency scanning) across process runs unless the source or
//! one of its recorded dependencies has changed since the cached copy was
//! written.
//!
//! Grounded in `original_source`'s `ShaderCache::is_shader_outdated`
//! (`shader_manager.cpp`): a shader is outdated if its cached copy is
//! missing, or its own source file is newer than the cache, or any dependency
//! path recorded in the cache's metadata sidecar is newer than the cache.
//! The sidecar is a `serde_json`-serialized `{dependency_path: null}`-shaped
//! map, mirroring the original's placeholder-valued dependency map.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Serialize, Deserialize, Default)]
struct ShaderCacheMetadata {
    #[serde(default)]
    dependencies: HashMap<String, ()>,
}

/// Rooted at a directory with two subdirectories: `sources/` (the cached,
/// define-expanded shader text) and `metadata/` (one JSON sidecar per shader,
/// named by the shader's own file name).
pub struct ShaderCache {
    root: PathBuf,
}

impl ShaderCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn cache_key(shader_relative_path: &str) -> String {
        shader_relative_path.replace(['/', '\\'], "_")
    }

    fn source_path(&self, shader_relative_path: &str) -> PathBuf {
        self.root.join("sources").join(Self::cache_key(shader_relative_path))
    }

    fn metadata_path(&self, shader_relative_path: &str) -> PathBuf {
        self.root.join("metadata").join(Self::cache_key(shader_relative_path)).with_extension("shadermeta")
    }

    /// A shader is outdated if it has never been cached, its own source file
    /// is newer than the cached copy, or any dependency path recorded the last
    /// time it was cached is newer than the cached copy. Missing mtimes (a
    /// source or dependency that can no longer be read) are treated as
    /// outdated rather than panicking — a stale cache is always safe to
    /// rebuild from.
    pub fn is_shader_outdated(&self, shader_relative_path: &str) -> bool {
        let cache_mtime = match mtime(&self.source_path(shader_relative_path)) {
            Some(t) => t,
            None => return true,
        };
        if mtime(Path::new(shader_relative_path)).map_or(true, |source_mtime| source_mtime > cache_mtime) {
            return true;
        }
        let metadata = self.read_metadata(shader_relative_path).unwrap_or_default();
        metadata.dependencies.keys().any(|dep| mtime(Path::new(dep)).map_or(true, |t| t > cache_mtime))
    }

    fn read_metadata(&self, shader_relative_path: &str) -> Option<ShaderCacheMetadata> {
        let contents = std::fs::read_to_string(self.metadata_path(shader_relative_path)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Loads the cached, already-processed shader source.
    pub fn load_cached_source(&self, shader_relative_path: &str) -> Result<String> {
        std::fs::read_to_string(self.source_path(shader_relative_path))
            .map_err(|e| Error::ShaderCompilationFailed { path: shader_relative_path.to_string(), diagnostics: e.to_string() })
    }

    /// Persists `processed_source` and records `dependencies` (paths
    /// discovered while processing) for the next run's staleness check.
    pub fn update(&self, shader_relative_path: &str, processed_source: &str, dependencies: &[String]) -> Result<()> {
        let write = |path: &Path, contents: &str| -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::ShaderCompilationFailed { path: shader_relative_path.to_string(), diagnostics: e.to_string() })?;
            }
            std::fs::write(path, contents)
                .map_err(|e| Error::ShaderCompilationFailed { path: shader_relative_path.to_string(), diagnostics: e.to_string() })
        };

        write(&self.source_path(shader_relative_path), processed_source)?;

        let metadata = ShaderCacheMetadata { dependencies: dependencies.iter().map(|d| (d.clone(), ())).collect() };
        let json = serde_json::to_string_pretty(&metadata).map_err(|e| Error::MetadataParse(e.to_string()))?;
        write(&self.metadata_path(shader_relative_path), &json)
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}
