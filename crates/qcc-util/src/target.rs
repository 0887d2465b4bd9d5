//! Target architecture descriptors.
//!
//! Each backend supplies a [`DataModel`] (pointer width, endianness,
//! stack growth direction) that the type-system layer reads during
//! session setup. The pointer width decides ILP32 vs LP64, which in turn
//! fixes the width of `long` and the alignment of 8-byte scalars.

/// Supported target architectures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86.
    X86,
    /// 64-bit x86.
    X86_64,
    /// IBM System/370.
    S370,
    /// IBM System/370-XA.
    S370Xa,
    /// IBM System/390.
    S390,
    /// IBM z/Architecture.
    SystemZ,
    /// 32-bit PowerPC.
    Ppc32,
    /// 64-bit PowerPC, big-endian.
    Ppc64,
    /// 64-bit PowerPC, little-endian.
    Ppc64le,
    /// AArch64 with the standard AAPCS64 ABI.
    Arm64,
    /// AArch64 with the Darwin platform ABI.
    Arm64Darwin,
}

impl Arch {
    /// Resolve an `-arch=` spelling.
    pub fn from_name(name: &str) -> Option<Arch> {
        Some(match name {
            "x86" | "i386" | "i686" => Arch::X86,
            "x86_64" | "x86-64" | "amd64" => Arch::X86_64,
            "370" | "s370" => Arch::S370,
            "370xa" | "s370xa" => Arch::S370Xa,
            "390" | "s390" => Arch::S390,
            "z" | "systemz" | "s390x" => Arch::SystemZ,
            "ppc" | "ppc32" => Arch::Ppc32,
            "ppc64" => Arch::Ppc64,
            "ppc64le" => Arch::Ppc64le,
            "arm64" | "aarch64" => Arch::Arm64,
            "arm64-darwin" | "aarch64-darwin" => Arch::Arm64Darwin,
            _ => return None,
        })
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::S370 => "370",
            Arch::S370Xa => "370xa",
            Arch::S390 => "390",
            Arch::SystemZ => "z",
            Arch::Ppc32 => "ppc32",
            Arch::Ppc64 => "ppc64",
            Arch::Ppc64le => "ppc64le",
            Arch::Arm64 => "arm64",
            Arch::Arm64Darwin => "arm64-darwin",
        }
    }

    /// The architecture's data model.
    pub fn data_model(self) -> DataModel {
        match self {
            Arch::X86 => DataModel::new(4, false, true),
            Arch::X86_64 => DataModel::new(8, false, true),
            Arch::S370 | Arch::S370Xa | Arch::S390 => DataModel::new(4, true, true),
            Arch::SystemZ => DataModel::new(8, true, true),
            Arch::Ppc32 => DataModel::new(4, true, true),
            Arch::Ppc64 => DataModel::new(8, true, true),
            Arch::Ppc64le => DataModel::new(8, false, true),
            Arch::Arm64 | Arch::Arm64Darwin => DataModel::new(8, false, true),
        }
    }
}

impl Default for Arch {
    fn default() -> Self {
        Arch::X86_64
    }
}

/// Target data model read by the type system during setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataModel {
    /// Width of a pointer in bytes (4 or 8).
    pub pointer_width: u32,
    /// Multi-byte scalars stored most-significant byte first.
    pub big_endian: bool,
    /// The stack grows toward lower addresses.
    pub stack_grows_down: bool,
}

impl DataModel {
    const fn new(pointer_width: u32, big_endian: bool, stack_grows_down: bool) -> Self {
        Self {
            pointer_width,
            big_endian,
            stack_grows_down,
        }
    }

    /// Width of `long` in bytes: 4 under ILP32, 8 under LP64.
    #[inline]
    pub fn long_width(&self) -> u32 {
        self.pointer_width
    }

    /// Natural word size in bytes.
    #[inline]
    pub fn word_size(&self) -> u32 {
        self.pointer_width
    }

    /// Maximum scalar alignment: 8-byte scalars align to the word size
    /// under ILP32 and to 8 under LP64.
    #[inline]
    pub fn max_align(&self) -> u32 {
        self.pointer_width.max(4)
    }

    /// True for LP64 models.
    #[inline]
    pub fn is_lp64(&self) -> bool {
        self.pointer_width == 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_aliases() {
        assert_eq!(Arch::from_name("amd64"), Some(Arch::X86_64));
        assert_eq!(Arch::from_name("aarch64"), Some(Arch::Arm64));
        assert_eq!(Arch::from_name("s390x"), Some(Arch::SystemZ));
        assert_eq!(Arch::from_name("riscv"), None);
    }

    #[test]
    fn test_long_follows_pointer_width() {
        assert_eq!(Arch::X86.data_model().long_width(), 4);
        assert_eq!(Arch::X86_64.data_model().long_width(), 8);
        assert_eq!(Arch::SystemZ.data_model().long_width(), 8);
        assert_eq!(Arch::S390.data_model().long_width(), 4);
    }

    #[test]
    fn test_endianness() {
        assert!(Arch::Ppc64.data_model().big_endian);
        assert!(!Arch::Ppc64le.data_model().big_endian);
        assert!(!Arch::X86_64.data_model().big_endian);
    }

    #[test]
    fn test_lp64() {
        assert!(Arch::Arm64.data_model().is_lp64());
        assert!(!Arch::Ppc32.data_model().is_lp64());
    }
}
