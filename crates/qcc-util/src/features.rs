//! Language feature matrix.
//!
//! Each recognized language standard resolves to an immutable descriptor:
//! a fixed-width bitset of boolean features. The session resolves the
//! requested [`Standard`] to its base [`FeatureSet`] and layers user
//! overrides on top; the lexer, preprocessor, parser, and semantic
//! analyzer query the effective set to gate constructs.
//!
//! # Examples
//!
//! ```
//! use qcc_util::features::{Feature, Standard};
//!
//! let c89 = Standard::C89.features();
//! let c99 = Standard::C99.features();
//! assert!(!c89.contains(Feature::LineComments));
//! assert!(c99.contains(Feature::LineComments));
//!
//! // User overrides layer on top of the base descriptor.
//! let custom = c89.with(Feature::LineComments);
//! assert!(custom.contains(Feature::LineComments));
//! ```

/// A gateable language feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Feature {
    /// `//` line comments.
    LineComments = 0,
    /// `long long` integers and the `ll` suffix.
    LongLong,
    /// Hexadecimal floating constants (`0x1.8p3`).
    HexFloats,
    /// Digit separators in numeric literals (`1'000'000`).
    DigitSeparators,
    /// Binary integer literals (`0b1010`).
    BinaryLiterals,
    /// Variadic macros (`#define F(a, ...)` and `__VA_ARGS__`).
    VariadicMacros,
    /// Designated initializers (`{ .x = 1 }`).
    DesignatedInit,
    /// `_Generic` selection.
    Generic,
    /// `[[...]]` attribute syntax.
    Attributes,
    /// Vendor statement expressions (`({ ... })`).
    StmtExpr,
    /// Digraphs (`<:` `:>` `<%` `%>` `%:`).
    Digraphs,
    /// `\u` / `\U` universal character escapes.
    UnicodeEscapes,
    /// Declarations in `for` init clauses.
    ForDecl,
    /// `_Bool`.
    Bool,
    /// `restrict` qualifier.
    Restrict,
    /// `inline` specifier.
    Inline,
    /// `typeof` operator.
    Typeof,
}

impl Feature {
    const COUNT: u32 = 17;

    #[inline]
    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Parse a feature from its user-facing name (the `-fenable-` /
    /// `-fdisable-` spelling).
    pub fn from_name(name: &str) -> Option<Feature> {
        Some(match name {
            "line-comments" => Feature::LineComments,
            "long-long" => Feature::LongLong,
            "hex-floats" => Feature::HexFloats,
            "digit-separators" => Feature::DigitSeparators,
            "binary-literals" => Feature::BinaryLiterals,
            "variadic-macros" => Feature::VariadicMacros,
            "designated-init" => Feature::DesignatedInit,
            "generic" => Feature::Generic,
            "attributes" => Feature::Attributes,
            "stmt-expr" => Feature::StmtExpr,
            "digraphs" => Feature::Digraphs,
            "unicode-escapes" => Feature::UnicodeEscapes,
            "for-decl" => Feature::ForDecl,
            "bool" => Feature::Bool,
            "restrict" => Feature::Restrict,
            "inline" => Feature::Inline,
            "typeof" => Feature::Typeof,
            _ => return None,
        })
    }
}

/// Fixed-width bitset over [`Feature`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureSet(u32);

impl FeatureSet {
    /// The empty set.
    pub const fn empty() -> Self {
        FeatureSet(0)
    }

    /// Every recognized feature.
    pub fn all() -> Self {
        FeatureSet((1 << Feature::COUNT) - 1)
    }

    /// Membership test.
    #[inline]
    pub fn contains(self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    /// Copy with a feature enabled.
    #[inline]
    pub fn with(self, feature: Feature) -> Self {
        FeatureSet(self.0 | feature.bit())
    }

    /// Copy with a feature disabled.
    #[inline]
    pub fn without(self, feature: Feature) -> Self {
        FeatureSet(self.0 & !feature.bit())
    }

    /// Enable a feature in place (user override).
    pub fn enable(&mut self, feature: Feature) {
        self.0 |= feature.bit();
    }

    /// Disable a feature in place (user override).
    pub fn disable(&mut self, feature: Feature) {
        self.0 &= !feature.bit();
    }
}

/// A recognized language standard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Standard {
    C89,
    Gnu89,
    C99,
    Gnu99,
    C11,
    Gnu11,
    C17,
    Gnu17,
    C23,
    Gnu23,
}

impl Standard {
    /// Resolve a `-std=` spelling, including per-year aliases.
    pub fn from_name(name: &str) -> Option<Standard> {
        Some(match name {
            "c89" | "c90" | "iso9899:1990" | "ansi" => Standard::C89,
            "gnu89" | "gnu90" => Standard::Gnu89,
            "c99" | "iso9899:1999" => Standard::C99,
            "gnu99" => Standard::Gnu99,
            "c11" | "iso9899:2011" => Standard::C11,
            "gnu11" => Standard::Gnu11,
            "c17" | "c18" | "iso9899:2017" => Standard::C17,
            "gnu17" | "gnu18" => Standard::Gnu17,
            "c23" | "c2x" | "iso9899:2024" => Standard::C23,
            "gnu23" | "gnu2x" => Standard::Gnu23,
            _ => return None,
        })
    }

    /// The base feature descriptor for this standard.
    pub fn features(self) -> FeatureSet {
        let c89 = FeatureSet::empty();
        let c99 = c89
            .with(Feature::LineComments)
            .with(Feature::LongLong)
            .with(Feature::HexFloats)
            .with(Feature::VariadicMacros)
            .with(Feature::DesignatedInit)
            .with(Feature::Digraphs)
            .with(Feature::UnicodeEscapes)
            .with(Feature::ForDecl)
            .with(Feature::Bool)
            .with(Feature::Restrict)
            .with(Feature::Inline);
        let c11 = c99.with(Feature::Generic);
        let c17 = c11;
        let c23 = c17
            .with(Feature::Attributes)
            .with(Feature::DigitSeparators)
            .with(Feature::BinaryLiterals)
            .with(Feature::Typeof);
        let gnu = |base: FeatureSet| {
            base.with(Feature::StmtExpr)
                .with(Feature::Typeof)
                .with(Feature::LineComments)
                .with(Feature::LongLong)
                .with(Feature::BinaryLiterals)
        };
        match self {
            Standard::C89 => c89,
            Standard::Gnu89 => gnu(c89),
            Standard::C99 => c99,
            Standard::Gnu99 => gnu(c99),
            Standard::C11 => c11,
            Standard::Gnu11 => gnu(c11),
            Standard::C17 => c17,
            Standard::Gnu17 => gnu(c17),
            Standard::C23 => c23,
            Standard::Gnu23 => gnu(c23),
        }
    }

    /// The value of `__STDC_VERSION__`, when the standard defines one.
    pub fn version_macro(self) -> Option<i64> {
        match self {
            Standard::C89 | Standard::Gnu89 => None,
            Standard::C99 | Standard::Gnu99 => Some(199901),
            Standard::C11 | Standard::Gnu11 => Some(201112),
            Standard::C17 | Standard::Gnu17 => Some(201710),
            Standard::C23 | Standard::Gnu23 => Some(202311),
        }
    }

    /// Canonical `-std=` spelling.
    pub fn name(self) -> &'static str {
        match self {
            Standard::C89 => "c89",
            Standard::Gnu89 => "gnu89",
            Standard::C99 => "c99",
            Standard::Gnu99 => "gnu99",
            Standard::C11 => "c11",
            Standard::Gnu11 => "gnu11",
            Standard::C17 => "c17",
            Standard::Gnu17 => "gnu17",
            Standard::C23 => "c23",
            Standard::Gnu23 => "gnu23",
        }
    }
}

impl Default for Standard {
    fn default() -> Self {
        Standard::Gnu17
    }
}
