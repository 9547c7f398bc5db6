use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("failed to allocate {width}x{height} pixel buffer")]
    Allocation { width: u32, height: u32 },

    #[error("pixel buffer length mismatch: expected {expected} bytes, got {actual} bytes")]
    BufferLength { expected: usize, actual: usize },

    #[error("failed to load plan {path}: {reason}")]
    PlanLoad { path: PathBuf, reason: String },

    #[error("invalid plan: {0}")]
    PlanInvalid(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("failed to load font {path}: {reason}")]
    FontLoad { path: PathBuf, reason: String },

    /// Primary stats/plan retrieval failed; the session cannot continue.
    #[error("session failed: {0}")]
    Session(String),
}

impl MosaicError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(_) | Self::PlanLoad { .. })
    }
}

pub fn find_mosaic_error(error: &anyhow::Error) -> Option<&MosaicError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<MosaicError>())
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn mosaic_error_is_found_through_context_chain() {
        let result: anyhow::Result<()> = Err(MosaicError::Session("stats endpoint down".into()))
            .context("loading plan for render");
        let error = result.expect_err("should fail");
        let found = find_mosaic_error(&error).expect("typed error in chain");
        assert!(found.is_fatal());
    }

    #[test]
    fn config_errors_are_not_fatal_to_a_session() {
        assert!(!MosaicError::ConfigInvalid("x".into()).is_fatal());
    }
}
