//! AST node definitions.
//!
//! The tree is a tagged sum over declaration, statement, and expression
//! kinds. Every node carries its [`Span`]; every expression additionally
//! carries a [`NodeId`], the key under which the semantic analyzer
//! records the node's resolved type. Syntactic types ([`TyExpr`]) are
//! what the parser builds from declaration specifiers and declarators;
//! the semantic analyzer converts them to real types.

use qcc_lex::IntSuffix;
use qcc_util::{Span, Symbol};

/// Key for per-expression semantic information.
pub type NodeId = u32;

/// AST root: one translation unit.
#[derive(Debug, Clone, Default)]
pub struct TranslationUnit {
    pub decls: Vec<Decl>,
}

/// A declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    /// Function declaration or definition.
    Function(FnDecl),
    /// Object declaration.
    Var(VarDecl),
    /// `typedef` declaration.
    Typedef(TypedefDecl),
    /// Standalone tag declaration: `struct S { ... };` or `enum E;`.
    Tag(TyExpr),
}

/// Function declaration or definition.
#[derive(Debug, Clone)]
pub struct FnDecl {
    pub name: Symbol,
    /// The full function type (a `TyExprKind::Function`).
    pub ty: TyExpr,
    pub storage: Option<StorageClass>,
    pub is_inline: bool,
    /// Present for definitions, absent for prototypes.
    pub body: Option<Stmt>,
}

/// Object declaration.
#[derive(Debug, Clone)]
pub struct VarDecl {
    /// Semantic-info key, like an expression's; the analyzer records
    /// the declared type under it.
    pub id: NodeId,
    pub name: Symbol,
    pub ty: TyExpr,
    pub storage: Option<StorageClass>,
    pub init: Option<Init>,
}

/// `typedef` declaration.
#[derive(Debug, Clone)]
pub struct TypedefDecl {
    pub name: Symbol,
    pub ty: TyExpr,
}

/// Storage-class specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Extern,
    Static,
    Auto,
    Register,
}

/// An initializer: a single expression or a brace-enclosed list.
#[derive(Debug, Clone)]
pub enum Init {
    Expr(Expr),
    List(Vec<InitItem>),
}

/// One item of an initializer list, optionally designated.
#[derive(Debug, Clone)]
pub struct InitItem {
    pub designator: Option<Designator>,
    pub init: Init,
}

/// A designator in a designated initializer.
#[derive(Debug, Clone)]
pub enum Designator {
    /// `.field`
    Field(Symbol),
    /// `[index]`
    Index(Expr),
}

// =============================================================================
// STATEMENTS
// =============================================================================

/// A statement.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `{ ... }`
    Compound(Vec<BlockItem>),
    /// Expression statement.
    Expr(Expr),
    /// `;`
    Null,
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<ForInit>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        cond: Expr,
        body: Box<Stmt>,
    },
    Case {
        value: Expr,
        body: Box<Stmt>,
    },
    Default {
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Goto(Symbol),
    Label {
        name: Symbol,
        body: Box<Stmt>,
    },
}

/// An item of a compound statement.
#[derive(Debug, Clone)]
pub enum BlockItem {
    Decl(Decl),
    Stmt(Stmt),
}

/// The init clause of a `for` statement.
#[derive(Debug, Clone)]
pub enum ForInit {
    Decl(Box<Decl>),
    Expr(Expr),
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// An expression.
#[derive(Debug, Clone)]
pub struct Expr {
    /// Semantic-info key; unique per node within a translation unit.
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit {
        value: u64,
        suffix: IntSuffix,
    },
    FloatLit {
        value: f64,
        is_f32: bool,
    },
    CharLit(u32),
    StrLit(Vec<u8>),
    Ident(Symbol),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Plain (`op == None`) or compound assignment.
    Assign {
        op: Option<BinOp>,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: Symbol,
        /// `->` rather than `.`.
        arrow: bool,
    },
    Cast {
        ty: TyExpr,
        operand: Box<Expr>,
    },
    SizeofExpr(Box<Expr>),
    SizeofType(TyExpr),
    PostIncDec {
        inc: bool,
        operand: Box<Expr>,
    },
    Comma {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// GNU statement expression `({ ... })`.
    StmtExpr(Vec<BlockItem>),
    /// `_Generic(controlling, ty: expr, ..., default: expr)`.
    Generic {
        controlling: Box<Expr>,
        assocs: Vec<GenericAssoc>,
    },
}

/// One association of a `_Generic` selection.
#[derive(Debug, Clone)]
pub struct GenericAssoc {
    /// `None` for `default:`.
    pub ty: Option<TyExpr>,
    pub expr: Expr,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `+x`
    Plus,
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `*x`
    Deref,
    /// `&x`
    AddrOf,
    /// `++x`
    PreInc,
    /// `--x`
    PreDec,
}

/// Binary operators (excluding assignment, comma, and `?:`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
}

impl BinOp {
    /// Comparison or logical operators produce `int`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    /// Short-circuit logical operators.
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::LogAnd | BinOp::LogOr)
    }

    /// Spelling for dumps and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
            BinOp::LogAnd => "&&",
            BinOp::LogOr => "||",
        }
    }
}

// =============================================================================
// SYNTACTIC TYPES
// =============================================================================

/// Type qualifier bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quals {
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_restrict: bool,
    pub is_atomic: bool,
}

impl Quals {
    pub fn any(&self) -> bool {
        self.is_const || self.is_volatile || self.is_restrict || self.is_atomic
    }
}

/// Width of an integer type specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    Short,
    Int,
    Long,
    LongLong,
}

/// `struct` vs `union`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Struct,
    Union,
}

/// A type as spelled in source.
#[derive(Debug, Clone)]
pub struct TyExpr {
    pub kind: TyExprKind,
    pub quals: Quals,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TyExprKind {
    Void,
    /// Plain, `signed`, or `unsigned` char.
    Char { signed: Option<bool> },
    Int { width: IntWidth, unsigned: bool },
    Bool,
    Float,
    Double,
    LongDouble,
    /// A typedef name.
    Named(Symbol),
    Record {
        kind: RecordKind,
        tag: Option<Symbol>,
        /// Present when this mention defines the body.
        fields: Option<Vec<FieldDecl>>,
    },
    Enum {
        tag: Option<Symbol>,
        enumerators: Option<Vec<Enumerator>>,
    },
    Pointer(Box<TyExpr>),
    Array {
        elem: Box<TyExpr>,
        /// `None` for an incomplete `[]`.
        len: Option<Box<Expr>>,
    },
    Function {
        ret: Box<TyExpr>,
        params: Vec<ParamDecl>,
        variadic: bool,
    },
    /// GNU/C23 `typeof(expr)`.
    Typeof(Box<Expr>),
}

/// A struct/union field declaration.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    /// `None` for anonymous bit-field padding.
    pub name: Option<Symbol>,
    pub ty: TyExpr,
    pub bit_width: Option<Expr>,
    pub span: Span,
}

/// One enumerator of an `enum` definition.
#[derive(Debug, Clone)]
pub struct Enumerator {
    pub name: Symbol,
    pub value: Option<Expr>,
    pub span: Span,
}

/// A function parameter declaration.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: Option<Symbol>,
    pub ty: TyExpr,
    pub span: Span,
}

impl TyExpr {
    /// Shorthand for a bare `int`, the recovery type.
    pub fn int(span: Span) -> TyExpr {
        TyExpr {
            kind: TyExprKind::Int {
                width: IntWidth::Int,
                unsigned: false,
            },
            quals: Quals::default(),
            span,
        }
    }

    /// Is this a function type?
    pub fn is_function(&self) -> bool {
        matches!(self.kind, TyExprKind::Function { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binop_classification() {
        assert!(BinOp::Lt.is_comparison());
        assert!(!BinOp::Add.is_comparison());
        assert!(BinOp::LogAnd.is_logical());
        assert!(!BinOp::BitAnd.is_logical());
    }

    #[test]
    fn test_binop_spelling() {
        assert_eq!(BinOp::Shl.as_str(), "<<");
        assert_eq!(BinOp::Ne.as_str(), "!=");
    }

    #[test]
    fn test_quals_any() {
        let mut q = Quals::default();
        assert!(!q.any());
        q.is_const = true;
        assert!(q.any());
    }

    #[test]
    fn test_recovery_type_is_int() {
        let ty = TyExpr::int(Span::DUMMY);
        assert!(matches!(
            ty.kind,
            TyExprKind::Int { width: IntWidth::Int, unsigned: false }
        ));
    }
}
