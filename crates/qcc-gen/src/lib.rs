//! qcc-gen - Assembly Backends
//!
//! Each backend is a self-contained template that walks a completed IR
//! [`Module`] and materializes architecture-specific assembly text. The
//! [`Backend`] trait is the whole contract: a name, a [`DataModel`] the
//! type-system layer reads during session setup, and `emit` producing a
//! byte buffer of assembly.
//!
//! Every recognized architecture is enumerated in
//! [`Arch`](qcc_util::Arch); the x86-64 emitter is implemented here,
//! while the remaining architectures resolve to
//! [`GenError::Unsupported`] until their templates land.

mod error;
mod x86_64;

pub use error::GenError;
pub use x86_64::X86_64Backend;

use qcc_ir::Module;
use qcc_util::{Arch, DataModel};

/// An assembly backend.
pub trait Backend {
    /// Backend display name.
    fn name(&self) -> &'static str;

    /// The architecture this backend targets.
    fn arch(&self) -> Arch;

    /// The data model the type system uses for this target.
    fn data_model(&self) -> DataModel {
        self.arch().data_model()
    }

    /// Emit assembly text for a completed module.
    fn emit(&self, module: &Module) -> Result<Vec<u8>, GenError>;
}

/// Resolve the backend for an architecture.
pub fn backend_for(arch: Arch) -> Result<Box<dyn Backend>, GenError> {
    match arch {
        Arch::X86_64 => Ok(Box::new(X86_64Backend)),
        other => Err(GenError::Unsupported(other.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        let backend = backend_for(Arch::X86_64).expect("x86_64 is implemented");
        assert_eq!(backend.name(), "x86_64");
        assert_eq!(backend.data_model().pointer_width, 8);
    }

    #[test]
    fn test_unimplemented_arches_enumerate() {
        for arch in [Arch::S370, Arch::Ppc64, Arch::Arm64] {
            let err = backend_for(arch).err().expect("unsupported");
            assert!(matches!(err, GenError::Unsupported(_)));
        }
    }
}
