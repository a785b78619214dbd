//! Local executable lookup

use std::path::{Path, PathBuf};

use super::ExecutableLocator;

/// Looks programs up in PATH, accepting explicit paths as-is when they exist
#[derive(Debug, Clone, Default)]
pub struct PathLocator;

impl ExecutableLocator for PathLocator {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        let explicit = Path::new(program);
        if explicit.components().count() > 1 {
            return explicit.exists().then(|| explicit.to_path_buf());
        }

        match which::which(program) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!("'{}' not found in PATH: {}", program, e);
                None
            }
        }
    }
}
