//! The C type system.
//!
//! Types are cheap handles: an `Rc` around a [`TypeKind`]. Primitive
//! types are singletons owned by the [`TypeContext`]; derived types are
//! freshly constructed. Struct/union/enum types keep their body in a
//! `RefCell` cell behind the stable handle, so a tag can be referenced
//! before its fields are known and completed in place later — every
//! earlier pointer-to-tag observes the completion.
//!
//! Sizes and alignments come from the target's [`DataModel`]: the
//! pointer width decides the width of `long` and the maximum scalar
//! alignment (ILP32 vs LP64).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use qcc_par::ast::{NodeId, Quals, RecordKind};
use qcc_util::{DataModel, Span, Symbol};
use rustc_hash::FxHashMap;

/// Integer kinds, ordered by conversion rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntKind {
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

/// Floating kinds, ordered by conversion rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

/// A function type.
#[derive(Clone, Debug)]
pub struct FuncType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub param_names: Vec<Option<Symbol>>,
    pub variadic: bool,
    /// `int f()` with unspecified parameters.
    pub unspecified: bool,
}

/// A struct or union field with its computed byte offset.
#[derive(Clone, Debug)]
pub struct Field {
    /// `None` for anonymous members and padding bit-fields.
    pub name: Option<Symbol>,
    pub ty: Type,
    pub offset: u64,
    pub bit_width: Option<u32>,
}

/// Completed layout of a record.
#[derive(Debug)]
pub struct RecordBody {
    pub fields: Vec<Field>,
    pub size: u64,
    pub align: u64,
}

/// Shared identity of a struct/union type.
#[derive(Debug)]
pub struct RecordData {
    pub kind: RecordKind,
    pub tag: Option<Symbol>,
    pub decl_loc: Span,
    /// `None` while the type is incomplete.
    pub body: RefCell<Option<RecordBody>>,
}

/// Stable handle to a record type; identity is the allocation.
#[derive(Clone, Debug)]
pub struct RecordRef(pub Rc<RecordData>);

impl RecordRef {
    pub fn is_complete(&self) -> bool {
        self.0.body.borrow().is_some()
    }
}

/// Shared identity of an enum type.
#[derive(Debug)]
pub struct EnumData {
    pub tag: Option<Symbol>,
    pub decl_loc: Span,
    /// `None` while the type is incomplete.
    pub enumerators: RefCell<Option<Vec<(Symbol, i64)>>>,
}

/// Stable handle to an enum type.
#[derive(Clone, Debug)]
pub struct EnumRef(pub Rc<EnumData>);

/// The type kind sum.
#[derive(Debug)]
pub enum TypeKind {
    Void,
    Int { kind: IntKind, unsigned: bool },
    Float(FloatKind),
    Pointer(Type),
    /// `len == 0` means incomplete (`T x[]`).
    Array { elem: Type, len: u64 },
    Function(FuncType),
    Record(RecordRef),
    Enum(EnumRef),
}

/// A type handle with qualifier bits.
#[derive(Clone, Debug)]
pub struct Type {
    kind: Rc<TypeKind>,
    pub quals: Quals,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.quals == other.quals && self.kind == other.kind
    }
}

impl PartialEq for TypeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeKind::Void, TypeKind::Void) => true,
            (
                TypeKind::Int { kind: k1, unsigned: u1 },
                TypeKind::Int { kind: k2, unsigned: u2 },
            ) => k1 == k2 && u1 == u2,
            (TypeKind::Float(a), TypeKind::Float(b)) => a == b,
            (TypeKind::Pointer(a), TypeKind::Pointer(b)) => a == b,
            (
                TypeKind::Array { elem: e1, len: l1 },
                TypeKind::Array { elem: e2, len: l2 },
            ) => e1 == e2 && l1 == l2,
            (TypeKind::Function(a), TypeKind::Function(b)) => a == b,
            (TypeKind::Record(a), TypeKind::Record(b)) => a == b,
            (TypeKind::Enum(a), TypeKind::Enum(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for FuncType {
    fn eq(&self, other: &Self) -> bool {
        self.ret == other.ret && self.params == other.params && self.variadic == other.variadic
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EnumRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Type {
    fn new(kind: TypeKind) -> Type {
        Type {
            kind: Rc::new(kind),
            quals: Quals::default(),
        }
    }

    /// The kind tag.
    #[inline]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Copy with different qualifiers.
    pub fn with_quals(&self, quals: Quals) -> Type {
        Type {
            kind: Rc::clone(&self.kind),
            quals,
        }
    }

    /// Copy with no qualifiers.
    pub fn unqualified(&self) -> Type {
        self.with_quals(Quals::default())
    }

    pub fn is_void(&self) -> bool {
        matches!(*self.kind, TypeKind::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(*self.kind, TypeKind::Int { .. } | TypeKind::Enum(_))
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(*self.kind, TypeKind::Int { unsigned: true, .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(*self.kind, TypeKind::Float(_))
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(*self.kind, TypeKind::Pointer(_))
    }

    /// Scalar: arithmetic or pointer.
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.kind, TypeKind::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(*self.kind, TypeKind::Function(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(*self.kind, TypeKind::Record(_))
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self) -> Option<Type> {
        match &*self.kind {
            TypeKind::Pointer(inner) => Some(inner.clone()),
            _ => None,
        }
    }

    /// The element type of an array.
    pub fn elem(&self) -> Option<Type> {
        match &*self.kind {
            TypeKind::Array { elem, .. } => Some(elem.clone()),
            _ => None,
        }
    }

    /// The function type, looking through one pointer level.
    pub fn as_function(&self) -> Option<&FuncType> {
        match &*self.kind {
            TypeKind::Function(f) => Some(f),
            TypeKind::Pointer(inner) => match inner.kind() {
                TypeKind::Function(f) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordRef> {
        match &*self.kind {
            TypeKind::Record(rec) => Some(rec),
            _ => None,
        }
    }

    /// Null pointer constants and arithmetic compare by structure;
    /// records and enums by identity.
    pub fn compatible(&self, other: &Type) -> bool {
        match (&*self.kind, &*other.kind) {
            (TypeKind::Void, TypeKind::Void) => true,
            (
                TypeKind::Int { kind: a, unsigned: ua },
                TypeKind::Int { kind: b, unsigned: ub },
            ) => a == b && ua == ub,
            (TypeKind::Float(a), TypeKind::Float(b)) => a == b,
            (TypeKind::Pointer(a), TypeKind::Pointer(b)) => a.compatible(b),
            (TypeKind::Array { elem: a, len: la }, TypeKind::Array { elem: b, len: lb }) => {
                a.compatible(b) && (*la == 0 || *lb == 0 || la == lb)
            }
            (TypeKind::Function(a), TypeKind::Function(b)) => {
                a.ret.compatible(&b.ret)
                    && a.variadic == b.variadic
                    && (a.unspecified
                        || b.unspecified
                        || (a.params.len() == b.params.len()
                            && a.params
                                .iter()
                                .zip(b.params.iter())
                                .all(|(x, y)| x.compatible(y))))
            }
            (TypeKind::Record(a), TypeKind::Record(b)) => Rc::ptr_eq(&a.0, &b.0),
            (TypeKind::Enum(a), TypeKind::Enum(b)) => Rc::ptr_eq(&a.0, &b.0),
            // Enums interconvert with int.
            (TypeKind::Enum(_), TypeKind::Int { kind: IntKind::Int, .. })
            | (TypeKind::Int { kind: IntKind::Int, .. }, TypeKind::Enum(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.kind {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Int { kind, unsigned } => {
                let name = match kind {
                    IntKind::Bool => "_Bool",
                    IntKind::Char => "char",
                    IntKind::Short => "short",
                    IntKind::Int => "int",
                    IntKind::Long => "long",
                    IntKind::LongLong => "long long",
                };
                if *unsigned && *kind != IntKind::Bool {
                    write!(f, "unsigned {}", name)
                } else {
                    write!(f, "{}", name)
                }
            }
            TypeKind::Float(kind) => match kind {
                FloatKind::Float => write!(f, "float"),
                FloatKind::Double => write!(f, "double"),
                FloatKind::LongDouble => write!(f, "long double"),
            },
            TypeKind::Pointer(inner) => write!(f, "{} *", inner),
            TypeKind::Array { elem, len } => {
                if *len == 0 {
                    write!(f, "{} []", elem)
                } else {
                    write!(f, "{} [{}]", elem, len)
                }
            }
            TypeKind::Function(func) => {
                write!(f, "{} (", func.ret)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if func.variadic {
                    if !func.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
            TypeKind::Record(rec) => {
                let kw = match rec.0.kind {
                    RecordKind::Struct => "struct",
                    RecordKind::Union => "union",
                };
                match rec.0.tag {
                    Some(tag) => write!(f, "{} {}", kw, tag),
                    None => write!(f, "{} <anonymous>", kw),
                }
            }
            TypeKind::Enum(en) => match en.0.tag {
                Some(tag) => write!(f, "enum {}", tag),
                None => write!(f, "enum <anonymous>"),
            },
        }
    }
}

/// How an assignment's types relate.
#[derive(Debug, PartialEq, Eq)]
pub enum Assignability {
    Ok,
    /// Accepted with the given warning text.
    Warn(&'static str),
    Incompatible,
}

/// Owner of primitive singletons and per-expression semantic results.
pub struct TypeContext {
    pub data_model: DataModel,

    void_ty: Type,
    bool_ty: Type,
    int_tys: FxHashMap<(IntKind, bool), Type>,
    float_ty: Type,
    double_ty: Type,
    long_double_ty: Type,

    /// Resolved type of every analyzed expression node.
    pub expr_types: FxHashMap<NodeId, Type>,
    /// Chosen association index for every `_Generic` node.
    pub generic_choices: FxHashMap<NodeId, usize>,
    /// Identifier nodes that resolved to enumeration constants, with
    /// their values. Lowering folds these to immediates.
    pub const_idents: FxHashMap<NodeId, i64>,
    /// Declared type of every object declaration, keyed by the
    /// declaration's node id.
    pub decl_types: FxHashMap<NodeId, Type>,
}

impl TypeContext {
    /// Create a context for a target data model; primitive singletons
    /// are allocated once here.
    pub fn new(data_model: DataModel) -> Self {
        let mut int_tys = FxHashMap::default();
        for kind in [
            IntKind::Bool,
            IntKind::Char,
            IntKind::Short,
            IntKind::Int,
            IntKind::Long,
            IntKind::LongLong,
        ] {
            for unsigned in [false, true] {
                int_tys.insert(
                    (kind, unsigned),
                    Type::new(TypeKind::Int { kind, unsigned }),
                );
            }
        }
        Self {
            data_model,
            void_ty: Type::new(TypeKind::Void),
            bool_ty: int_tys[&(IntKind::Bool, false)].clone(),
            int_tys,
            float_ty: Type::new(TypeKind::Float(FloatKind::Float)),
            double_ty: Type::new(TypeKind::Float(FloatKind::Double)),
            long_double_ty: Type::new(TypeKind::Float(FloatKind::LongDouble)),
            expr_types: FxHashMap::default(),
            generic_choices: FxHashMap::default(),
            const_idents: FxHashMap::default(),
            decl_types: FxHashMap::default(),
        }
    }

    // Primitive accessors hand out singleton clones.

    pub fn void(&self) -> Type {
        self.void_ty.clone()
    }

    pub fn bool_(&self) -> Type {
        self.bool_ty.clone()
    }

    pub fn int_of(&self, kind: IntKind, unsigned: bool) -> Type {
        self.int_tys[&(kind, unsigned)].clone()
    }

    pub fn int_(&self) -> Type {
        self.int_of(IntKind::Int, false)
    }

    pub fn uint(&self) -> Type {
        self.int_of(IntKind::Int, true)
    }

    pub fn char_(&self) -> Type {
        self.int_of(IntKind::Char, false)
    }

    pub fn long_(&self) -> Type {
        self.int_of(IntKind::Long, false)
    }

    pub fn ulong(&self) -> Type {
        self.int_of(IntKind::Long, true)
    }

    pub fn float_of(&self, kind: FloatKind) -> Type {
        match kind {
            FloatKind::Float => self.float_ty.clone(),
            FloatKind::Double => self.double_ty.clone(),
            FloatKind::LongDouble => self.long_double_ty.clone(),
        }
    }

    pub fn double_(&self) -> Type {
        self.double_ty.clone()
    }

    /// The unsigned type of `size_t` (pointer-width).
    pub fn size_type(&self) -> Type {
        if self.data_model.is_lp64() {
            self.int_of(IntKind::Long, true)
        } else {
            self.uint()
        }
    }

    // Derived constructors: fresh allocations, no hash-consing.

    pub fn pointer_to(&self, pointee: Type) -> Type {
        Type::new(TypeKind::Pointer(pointee))
    }

    pub fn array_of(&self, elem: Type, len: u64) -> Type {
        Type::new(TypeKind::Array { elem, len })
    }

    pub fn function(&self, func: FuncType) -> Type {
        Type::new(TypeKind::Function(func))
    }

    /// Create an incomplete record type.
    pub fn incomplete_record(
        &self,
        kind: RecordKind,
        tag: Option<Symbol>,
        decl_loc: Span,
    ) -> (Type, RecordRef) {
        let data = RecordRef(Rc::new(RecordData {
            kind,
            tag,
            decl_loc,
            body: RefCell::new(None),
        }));
        (Type::new(TypeKind::Record(data.clone())), data)
    }

    /// Create an incomplete enum type.
    pub fn incomplete_enum(&self, tag: Option<Symbol>, decl_loc: Span) -> (Type, EnumRef) {
        let data = EnumRef(Rc::new(EnumData {
            tag,
            decl_loc,
            enumerators: RefCell::new(None),
        }));
        (Type::new(TypeKind::Enum(data.clone())), data)
    }

    /// Complete a record in place: walk the fields in order, align each
    /// offset up, and round the final size to the maximum alignment.
    /// Unions place every field at offset zero.
    pub fn complete_record(
        &self,
        rec: &RecordRef,
        fields: Vec<(Option<Symbol>, Type, Option<u32>)>,
    ) {
        let mut laid = Vec::with_capacity(fields.len());
        let mut offset: u64 = 0;
        let mut max_align: u64 = 1;
        let mut max_size: u64 = 0;
        let is_union = rec.0.kind == RecordKind::Union;

        for (name, ty, bit_width) in fields {
            let align = self.align_of(&ty).max(1);
            let size = self.size_of(&ty).unwrap_or(0);
            max_align = max_align.max(align);
            let field_offset = if is_union {
                0
            } else {
                offset = align_up(offset, align);
                let at = offset;
                offset += size;
                at
            };
            max_size = max_size.max(size);
            laid.push(Field {
                name,
                ty,
                offset: field_offset,
                bit_width,
            });
        }

        let size = if is_union {
            align_up(max_size, max_align)
        } else {
            align_up(offset, max_align)
        };
        *rec.0.body.borrow_mut() = Some(RecordBody {
            fields: laid,
            size: size.max(1),
            align: max_align,
        });
    }

    /// Size in bytes; `None` for incomplete and function types and
    /// `void`.
    pub fn size_of(&self, ty: &Type) -> Option<u64> {
        let dm = &self.data_model;
        Some(match ty.kind() {
            TypeKind::Void => return None,
            TypeKind::Int { kind, .. } => match kind {
                IntKind::Bool | IntKind::Char => 1,
                IntKind::Short => 2,
                IntKind::Int => 4,
                IntKind::Long => dm.long_width() as u64,
                IntKind::LongLong => 8,
            },
            TypeKind::Float(kind) => match kind {
                FloatKind::Float => 4,
                FloatKind::Double | FloatKind::LongDouble => 8,
            },
            TypeKind::Pointer(_) => dm.pointer_width as u64,
            TypeKind::Array { elem, len } => {
                if *len == 0 {
                    return None;
                }
                self.size_of(elem)? * len
            }
            TypeKind::Function(_) => return None,
            TypeKind::Record(rec) => rec.0.body.borrow().as_ref()?.size,
            TypeKind::Enum(_) => 4,
        })
    }

    /// Alignment in bytes, capped at the data model's maximum scalar
    /// alignment.
    pub fn align_of(&self, ty: &Type) -> u64 {
        match ty.kind() {
            TypeKind::Array { elem, .. } => self.align_of(elem),
            TypeKind::Record(rec) => rec
                .0
                .body
                .borrow()
                .as_ref()
                .map(|b| b.align)
                .unwrap_or(1),
            _ => {
                let natural = self.size_of(ty).unwrap_or(1);
                natural.min(self.data_model.max_align() as u64).max(1)
            }
        }
    }

    /// Look up a field, descending into anonymous record members.
    /// Returns the field's type and its offset from the record start.
    pub fn find_field(&self, rec: &RecordRef, name: Symbol) -> Option<(Type, u64)> {
        let body = rec.0.body.borrow();
        let body = body.as_ref()?;
        for field in &body.fields {
            if field.name == Some(name) {
                return Some((field.ty.clone(), field.offset));
            }
            if field.name.is_none() {
                if let TypeKind::Record(inner) = field.ty.kind() {
                    if let Some((ty, off)) = self.find_field(inner, name) {
                        return Some((ty, field.offset + off));
                    }
                }
            }
        }
        None
    }

    // =========================================================================
    // CONVERSION RULES
    // =========================================================================

    /// Integer promotion: integers below `int` rank widen to `int`.
    /// Every sub-int type fits in `int` on all supported data models,
    /// so the promoted type is always signed `int`; enums promote to
    /// `int` as well.
    pub fn promote(&self, ty: &Type) -> Type {
        match ty.kind() {
            TypeKind::Int { kind, unsigned } => {
                if *kind < IntKind::Int {
                    self.int_()
                } else {
                    self.int_of(*kind, *unsigned)
                }
            }
            TypeKind::Enum(_) => self.int_(),
            _ => ty.unqualified(),
        }
    }

    /// The usual arithmetic conversions over two operand types.
    pub fn usual_arithmetic(&self, a: &Type, b: &Type) -> Type {
        // Floating wins by rank.
        for kind in [FloatKind::LongDouble, FloatKind::Double, FloatKind::Float] {
            if matches!(a.kind(), TypeKind::Float(k) if *k == kind)
                || matches!(b.kind(), TypeKind::Float(k) if *k == kind)
            {
                return self.float_of(kind);
            }
        }
        let a = self.promote(a);
        let b = self.promote(b);
        let (ak, au) = int_parts(&a);
        let (bk, bu) = int_parts(&b);
        if ak == bk {
            return self.int_of(ak, au || bu);
        }
        let (hi_kind, hi_unsigned, lo_unsigned) = if ak > bk {
            (ak, au, bu)
        } else {
            (bk, bu, au)
        };
        if hi_unsigned || !lo_unsigned {
            // Higher rank absorbs: same signedness, or the unsigned
            // operand already has the higher rank.
            self.int_of(hi_kind, hi_unsigned)
        } else {
            // Signed higher rank vs unsigned lower rank: the signed type
            // represents all lower-rank unsigned values when strictly
            // wider, otherwise the unsigned variant wins.
            let hi = self.int_of(hi_kind, false);
            let lo = self.int_of(if ak > bk { bk } else { ak }, true);
            let hi_size = self.size_of(&hi).unwrap_or(4);
            let lo_size = self.size_of(&lo).unwrap_or(4);
            if hi_size > lo_size {
                hi
            } else {
                self.int_of(hi_kind, true)
            }
        }
    }

    /// Array-to-pointer and function-to-pointer decay.
    pub fn decay(&self, ty: &Type) -> Type {
        match ty.kind() {
            TypeKind::Array { elem, .. } => self.pointer_to(elem.clone()),
            TypeKind::Function(_) => self.pointer_to(ty.unqualified()),
            _ => ty.clone(),
        }
    }

    /// Assignment compatibility of `src` (after decay) into `dst`.
    pub fn assignable(&self, dst: &Type, src: &Type, src_is_null_const: bool) -> Assignability {
        if dst.compatible(src) {
            return Assignability::Ok;
        }
        if dst.is_arithmetic() && src.is_arithmetic() {
            return Assignability::Ok;
        }
        if dst.is_pointer() && src.is_pointer() {
            let dp = dst.pointee().expect("pointer has pointee");
            let sp = src.pointee().expect("pointer has pointee");
            if dp.is_void() || sp.is_void() || dp.unqualified().compatible(&sp.unqualified()) {
                return Assignability::Ok;
            }
            return Assignability::Warn("assignment from incompatible pointer type");
        }
        if dst.is_pointer() && src.is_integer() {
            if src_is_null_const {
                return Assignability::Ok;
            }
            return Assignability::Warn("assignment makes pointer from integer without a cast");
        }
        if dst.is_integer() && src.is_pointer() {
            return Assignability::Warn("assignment makes integer from pointer without a cast");
        }
        Assignability::Incompatible
    }

    // =========================================================================
    // PER-EXPRESSION RESULTS
    // =========================================================================

    /// Record an expression's resolved type.
    pub fn set_expr_type(&mut self, id: NodeId, ty: Type) {
        self.expr_types.insert(id, ty);
    }

    /// The resolved type of an analyzed expression.
    pub fn type_of(&self, id: NodeId) -> Option<&Type> {
        self.expr_types.get(&id)
    }
}

fn int_parts(ty: &Type) -> (IntKind, bool) {
    match ty.kind() {
        TypeKind::Int { kind, unsigned } => (*kind, *unsigned),
        _ => (IntKind::Int, false),
    }
}

pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align > 0);
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcc_util::Arch;

    fn ctx() -> TypeContext {
        TypeContext::new(Arch::X86_64.data_model())
    }

    fn ctx32() -> TypeContext {
        TypeContext::new(Arch::X86.data_model())
    }

    #[test]
    fn test_primitive_sizes_lp64() {
        let t = ctx();
        assert_eq!(t.size_of(&t.char_()), Some(1));
        assert_eq!(t.size_of(&t.int_()), Some(4));
        assert_eq!(t.size_of(&t.long_()), Some(8));
        assert_eq!(t.size_of(&t.pointer_to(t.void())), Some(8));
    }

    #[test]
    fn test_long_width_ilp32() {
        let t = ctx32();
        assert_eq!(t.size_of(&t.long_()), Some(4));
        assert_eq!(t.size_of(&t.pointer_to(t.void())), Some(4));
        assert_eq!(t.size_of(&t.int_of(IntKind::LongLong, false)), Some(8));
    }

    #[test]
    fn test_promotion() {
        let t = ctx();
        let c = t.char_();
        let s = t.int_of(IntKind::Short, false);
        assert!(t.promote(&c).compatible(&t.int_()));
        assert!(t.promote(&s).compatible(&t.int_()));
        let u = t.int_of(IntKind::Long, true);
        assert!(t.promote(&u).compatible(&u));
    }

    #[test]
    fn test_usual_arithmetic_floats_win() {
        let t = ctx();
        let r = t.usual_arithmetic(&t.int_(), &t.double_());
        assert!(matches!(r.kind(), TypeKind::Float(FloatKind::Double)));
    }

    #[test]
    fn test_usual_arithmetic_unsigned() {
        let t = ctx();
        let r = t.usual_arithmetic(&t.uint(), &t.int_());
        assert!(r.is_unsigned_integer());
        // unsigned int + long(64-bit): long represents all uint values.
        let r = t.usual_arithmetic(&t.uint(), &t.long_());
        assert!(matches!(
            r.kind(),
            TypeKind::Int { kind: IntKind::Long, unsigned: false }
        ));
    }

    #[test]
    fn test_usual_arithmetic_unsigned_same_size() {
        // On ILP32, long is 4 bytes: unsigned int + long -> unsigned long.
        let t = ctx32();
        let r = t.usual_arithmetic(&t.uint(), &t.long_());
        assert!(matches!(
            r.kind(),
            TypeKind::Int { kind: IntKind::Long, unsigned: true }
        ));
    }

    #[test]
    fn test_decay() {
        let t = ctx();
        let arr = t.array_of(t.int_(), 10);
        let decayed = t.decay(&arr);
        assert!(decayed.is_pointer());
        assert!(decayed.pointee().expect("pointee").compatible(&t.int_()));
    }

    #[test]
    fn test_record_completion_in_place() {
        let t = ctx();
        let (ty, rec) = t.incomplete_record(RecordKind::Struct, None, Span::DUMMY);
        let ptr = t.pointer_to(ty.clone());
        assert_eq!(t.size_of(&ty), None);

        t.complete_record(
            &rec,
            vec![
                (Some(Symbol::intern("x")), t.int_(), None),
                (Some(Symbol::intern("y")), t.int_(), None),
            ],
        );
        // The earlier pointer observes the completion.
        let through = ptr.pointee().expect("pointee");
        assert_eq!(t.size_of(&through), Some(8));
        let (fty, off) = t.find_field(&rec, Symbol::intern("y")).expect("field y");
        assert_eq!(off, 4);
        assert!(fty.compatible(&t.int_()));
    }

    #[test]
    fn test_struct_layout_padding() {
        let t = ctx();
        let (_, rec) = t.incomplete_record(RecordKind::Struct, None, Span::DUMMY);
        t.complete_record(
            &rec,
            vec![
                (Some(Symbol::intern("c")), t.char_(), None),
                (Some(Symbol::intern("l")), t.long_(), None),
                (Some(Symbol::intern("c2")), t.char_(), None),
            ],
        );
        let body = rec.0.body.borrow();
        let body = body.as_ref().expect("complete");
        assert_eq!(body.fields[0].offset, 0);
        assert_eq!(body.fields[1].offset, 8);
        assert_eq!(body.fields[2].offset, 16);
        assert_eq!(body.size, 24);
        assert_eq!(body.align, 8);
    }

    #[test]
    fn test_union_layout() {
        let t = ctx();
        let (_, rec) = t.incomplete_record(RecordKind::Union, None, Span::DUMMY);
        t.complete_record(
            &rec,
            vec![
                (Some(Symbol::intern("i")), t.int_(), None),
                (Some(Symbol::intern("d")), t.double_(), None),
            ],
        );
        let body = rec.0.body.borrow();
        let body = body.as_ref().expect("complete");
        assert_eq!(body.fields[0].offset, 0);
        assert_eq!(body.fields[1].offset, 0);
        assert_eq!(body.size, 8);
    }

    #[test]
    fn test_assignability() {
        let t = ctx();
        let vp = t.pointer_to(t.void());
        let ip = t.pointer_to(t.int_());
        let fp = t.pointer_to(t.float_of(FloatKind::Float));
        assert_eq!(t.assignable(&ip, &vp, false), Assignability::Ok);
        assert_eq!(t.assignable(&vp, &ip, false), Assignability::Ok);
        assert!(matches!(t.assignable(&ip, &fp, false), Assignability::Warn(_)));
        assert_eq!(t.assignable(&ip, &t.int_(), true), Assignability::Ok);
        assert!(matches!(
            t.assignable(&ip, &t.int_(), false),
            Assignability::Warn(_)
        ));
        let (st, rec) = t.incomplete_record(RecordKind::Struct, None, Span::DUMMY);
        t.complete_record(&rec, vec![]);
        assert_eq!(t.assignable(&t.int_(), &st, false), Assignability::Incompatible);
    }

    #[test]
    fn test_display() {
        let t = ctx();
        assert_eq!(t.int_().to_string(), "int");
        assert_eq!(t.pointer_to(t.char_()).to_string(), "char *");
        assert_eq!(t.array_of(t.int_(), 4).to_string(), "int [4]");
    }
}
