//! Code generation errors.

use thiserror::Error;

/// Errors surfaced by a backend.
#[derive(Debug, Error)]
pub enum GenError {
    /// The architecture is enumerated but has no emitter yet.
    #[error("no backend implemented for architecture '{0}'")]
    Unsupported(&'static str),

    /// The module contains a construct the backend cannot emit.
    #[error("cannot emit: {0}")]
    Emit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            GenError::Unsupported("ppc64").to_string(),
            "no backend implemented for architecture 'ppc64'"
        );
        assert_eq!(
            GenError::Emit("too many arguments".into()).to_string(),
            "cannot emit: too many arguments"
        );
    }
}
