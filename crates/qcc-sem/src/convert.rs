//! Conversion of syntactic types to semantic types.
//!
//! Struct/union/enum mentions are where the tag namespace is populated:
//! a mention without a body either refers to a visible tag or forward-
//! declares an incomplete one; a mention with a body defines the tag in
//! the current scope, completing an earlier incomplete type in place if
//! one exists there.

use qcc_par::ast::*;
use qcc_util::{Span, Symbol};

use crate::analysis::SemanticAnalyzer;
use crate::scope::{Binding, BindingKind, DefineOutcome, StorageSlot};
use crate::types::{FloatKind, FuncType, IntKind, Type, TypeKind};

impl<'h> SemanticAnalyzer<'h> {
    /// Convert a syntactic type to a semantic one, defining or
    /// completing tags and enum constants along the way.
    pub fn convert_ty(&mut self, ty: &TyExpr) -> Type {
        let converted = match &ty.kind {
            TyExprKind::Void => self.types.void(),
            TyExprKind::Bool => self.types.bool_(),
            TyExprKind::Char { signed } => {
                self.types.int_of(IntKind::Char, *signed == Some(false))
            }
            TyExprKind::Int { width, unsigned } => {
                let kind = match width {
                    IntWidth::Short => IntKind::Short,
                    IntWidth::Int => IntKind::Int,
                    IntWidth::Long => IntKind::Long,
                    IntWidth::LongLong => IntKind::LongLong,
                };
                self.types.int_of(kind, *unsigned)
            }
            TyExprKind::Float => self.types.float_of(FloatKind::Float),
            TyExprKind::Double => self.types.float_of(FloatKind::Double),
            TyExprKind::LongDouble => self.types.float_of(FloatKind::LongDouble),
            TyExprKind::Named(name) => self.resolve_typedef(*name, ty.span),
            TyExprKind::Record { kind, tag, fields } => {
                self.convert_record(*kind, *tag, fields.as_deref(), ty.span)
            }
            TyExprKind::Enum { tag, enumerators } => {
                self.convert_enum(*tag, enumerators.as_deref(), ty.span)
            }
            TyExprKind::Pointer(inner) => {
                let pointee = self.convert_ty(inner);
                self.types.pointer_to(pointee)
            }
            TyExprKind::Array { elem, len } => {
                let elem_ty = self.convert_ty(elem);
                if self.types.size_of(&elem_ty).is_none() {
                    self.handler
                        .error("array has incomplete element type", ty.span);
                }
                let length = match len {
                    None => 0,
                    Some(expr) => {
                        let _ = self.analyze_expr(expr);
                        match self.fold_const(expr) {
                            Some(n) if n > 0 => n as u64,
                            Some(_) => {
                                self.handler
                                    .error("array size must be positive", expr.span);
                                1
                            }
                            None => {
                                self.handler.error(
                                    "array size is not an integer constant expression",
                                    expr.span,
                                );
                                1
                            }
                        }
                    }
                };
                self.types.array_of(elem_ty, length)
            }
            TyExprKind::Function { ret, params, variadic } => {
                let ret_ty = self.convert_ty(ret);
                let mut param_tys = Vec::with_capacity(params.len());
                let mut param_names = Vec::with_capacity(params.len());
                for param in params {
                    let converted = self.convert_ty(&param.ty);
                    if converted.is_void() {
                        self.handler
                            .error("parameter has void type", param.span);
                        param_tys.push(self.types.int_());
                    } else {
                        // Array and function parameters decay.
                        param_tys.push(self.types.decay(&converted));
                    }
                    param_names.push(param.name);
                }
                self.types.function(FuncType {
                    ret: ret_ty,
                    params: param_tys,
                    param_names,
                    variadic: *variadic,
                    unspecified: false,
                })
            }
            TyExprKind::Typeof(expr) => self.analyze_value(expr),
        };
        if ty.quals.any() {
            converted.with_quals(ty.quals)
        } else {
            converted
        }
    }

    fn resolve_typedef(&mut self, name: Symbol, span: Span) -> Type {
        match self.symtab.lookup_ordinary(name) {
            Some(id) if self.symtab.binding(id).kind == BindingKind::Typedef => {
                self.symtab.binding(id).ty.clone()
            }
            _ => {
                self.handler
                    .error(format!("unknown type name '{}'", name), span);
                self.types.int_()
            }
        }
    }

    fn convert_record(
        &mut self,
        kind: RecordKind,
        tag: Option<Symbol>,
        fields: Option<&[FieldDecl]>,
        span: Span,
    ) -> Type {
        let Some(field_decls) = fields else {
            // Reference or forward declaration.
            let Some(tag) = tag else {
                return self.types.int_();
            };
            if let Some(existing) = self.symtab.lookup_tag(tag) {
                return self.check_tag_kind(existing, kind, tag, span);
            }
            let (ty, _) = self.types.incomplete_record(kind, Some(tag), span);
            self.symtab.define_tag(tag, ty.clone());
            return ty;
        };

        // Definition: the tag binds in the current scope.
        let (ty, rec) = match tag.and_then(|t| self.symtab.lookup_tag_here(t)) {
            Some(existing) => match existing.as_record() {
                Some(rec) if rec.0.kind == kind && !rec.is_complete() => {
                    (existing.clone(), rec.clone())
                }
                Some(rec) if rec.0.kind == kind => {
                    self.handler.error(
                        format!(
                            "redefinition of '{}'",
                            tag.expect("tagged lookup").as_str()
                        ),
                        span,
                    );
                    (existing.clone(), rec.clone())
                }
                _ => {
                    self.handler.error(
                        format!(
                            "use of '{}' with tag type that does not match previous declaration",
                            tag.expect("tagged lookup")
                        ),
                        span,
                    );
                    let (ty, rec) = self.types.incomplete_record(kind, tag, span);
                    (ty, rec)
                }
            },
            None => {
                let (ty, rec) = self.types.incomplete_record(kind, tag, span);
                if let Some(tag) = tag {
                    self.symtab.define_tag(tag, ty.clone());
                }
                (ty, rec)
            }
        };

        let mut laid_fields = Vec::with_capacity(field_decls.len());
        for field in field_decls {
            let field_ty = self.convert_ty(&field.ty);
            let bit_width = match &field.bit_width {
                None => None,
                Some(expr) => {
                    let _ = self.analyze_expr(expr);
                    match self.fold_const(expr) {
                        Some(w) if (0..=64).contains(&w) => Some(w as u32),
                        Some(_) => {
                            self.handler
                                .error("bit-field width out of range", expr.span);
                            None
                        }
                        None => {
                            self.handler.error(
                                "bit-field width is not an integer constant",
                                expr.span,
                            );
                            None
                        }
                    }
                }
            };
            if bit_width.is_some() && !field_ty.is_integer() {
                self.handler
                    .error("bit-field has non-integer type", field.span);
            }
            if self.types.size_of(&field_ty).is_none() {
                self.handler.error(
                    match field.name {
                        Some(name) => format!("field '{}' has incomplete type", name),
                        None => "field has incomplete type".to_owned(),
                    },
                    field.span,
                );
                continue;
            }
            laid_fields.push((field.name, field_ty, bit_width));
        }
        self.types.complete_record(&rec, laid_fields);
        ty
    }

    fn check_tag_kind(
        &mut self,
        existing: Type,
        kind: RecordKind,
        tag: Symbol,
        span: Span,
    ) -> Type {
        let matches_kind = existing
            .as_record()
            .map(|rec| rec.0.kind == kind)
            .unwrap_or(false);
        if !matches_kind {
            self.handler.error(
                format!(
                    "use of '{}' with tag type that does not match previous declaration",
                    tag
                ),
                span,
            );
            return self.types.int_();
        }
        existing
    }

    fn convert_enum(
        &mut self,
        tag: Option<Symbol>,
        enumerators: Option<&[Enumerator]>,
        span: Span,
    ) -> Type {
        let Some(list) = enumerators else {
            let Some(tag) = tag else {
                return self.types.int_();
            };
            if let Some(existing) = self.symtab.lookup_tag(tag) {
                if !matches!(existing.kind(), TypeKind::Enum(_)) {
                    self.handler.error(
                        format!(
                            "use of '{}' with tag type that does not match previous declaration",
                            tag
                        ),
                        span,
                    );
                    return self.types.int_();
                }
                return existing;
            }
            let (ty, _) = self.types.incomplete_enum(Some(tag), span);
            self.symtab.define_tag(tag, ty.clone());
            return ty;
        };

        let (ty, en) = match tag.and_then(|t| self.symtab.lookup_tag_here(t)) {
            Some(existing) => match existing.kind() {
                TypeKind::Enum(en) if en.0.enumerators.borrow().is_none() => {
                    (existing.clone(), en.clone())
                }
                TypeKind::Enum(en) => {
                    self.handler.error(
                        format!("redefinition of 'enum {}'", tag.expect("tagged")),
                        span,
                    );
                    (existing.clone(), en.clone())
                }
                _ => {
                    self.handler.error(
                        format!(
                            "use of '{}' with tag type that does not match previous declaration",
                            tag.expect("tagged")
                        ),
                        span,
                    );
                    let (ty, en) = self.types.incomplete_enum(tag, span);
                    (ty, en)
                }
            },
            None => {
                let (ty, en) = self.types.incomplete_enum(tag, span);
                if let Some(tag) = tag {
                    self.symtab.define_tag(tag, ty.clone());
                }
                (ty, en)
            }
        };

        let mut values = Vec::with_capacity(list.len());
        let mut next: i64 = 0;
        for item in list {
            let value = match &item.value {
                None => next,
                Some(expr) => {
                    let _ = self.analyze_expr(expr);
                    match self.fold_const(expr) {
                        Some(v) => v,
                        None => {
                            self.handler.error(
                                "enumerator value is not an integer constant",
                                expr.span,
                            );
                            next
                        }
                    }
                }
            };
            next = value.wrapping_add(1);
            values.push((item.name, value));

            let binding = Binding {
                name: item.name,
                kind: BindingKind::EnumConstant(value),
                ty: self.types.int_(),
                storage: None,
                loc: item.span,
                scope_depth: self.symtab.depth(),
                slot: StorageSlot::None,
                defined: true,
                used: Default::default(),
            };
            if let DefineOutcome::Conflict(_) = self.symtab.define_ordinary(binding) {
                self.handler
                    .error(format!("redefinition of '{}'", item.name), item.span);
            }
        }
        *en.0.enumerators.borrow_mut() = Some(values);
        ty
    }
}
