//! Integer constant folding.
//!
//! A recursive evaluator over literal, unary, binary, and ternary
//! integer expressions, used by `case` labels, enumerator values, array
//! bounds, bit-field widths, and null-pointer-constant detection.
//! Division by zero yields 0; [`fold_const`](SemanticAnalyzer::fold_const)
//! reports it, [`try_fold`](SemanticAnalyzer::try_fold) stays silent.

use qcc_par::ast::*;

use crate::analysis::SemanticAnalyzer;
use crate::scope::BindingKind;

impl<'h> SemanticAnalyzer<'h> {
    /// Fold an integer constant expression, reporting division by zero.
    pub fn fold_const(&self, e: &Expr) -> Option<i64> {
        self.fold(e, true)
    }

    /// Fold without emitting diagnostics.
    pub(crate) fn try_fold(&self, e: &Expr) -> Option<i64> {
        self.fold(e, false)
    }

    fn fold(&self, e: &Expr, report: bool) -> Option<i64> {
        match &e.kind {
            ExprKind::IntLit { value, .. } => Some(*value as i64),
            ExprKind::CharLit(code) => Some(*code as i64),
            ExprKind::Ident(name) => {
                let id = self.symtab.lookup_ordinary(*name)?;
                match self.symtab.binding(id).kind {
                    BindingKind::EnumConstant(value) => Some(value),
                    _ => None,
                }
            }
            ExprKind::Unary { op, operand } => {
                let v = self.fold(operand, report)?;
                Some(match op {
                    UnOp::Plus => v,
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Not => (v == 0) as i64,
                    UnOp::BitNot => !v,
                    _ => return None,
                })
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.fold(lhs, report)?;
                let r = self.fold(rhs, report)?;
                Some(match op {
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mul => l.wrapping_mul(r),
                    BinOp::Div => {
                        if r == 0 {
                            if report {
                                self.handler.error("division by zero", e.span);
                            }
                            0
                        } else {
                            l.wrapping_div(r)
                        }
                    }
                    BinOp::Rem => {
                        if r == 0 {
                            if report {
                                self.handler.error("remainder by zero", e.span);
                            }
                            0
                        } else {
                            l.wrapping_rem(r)
                        }
                    }
                    BinOp::Shl => l.wrapping_shl(r as u32),
                    BinOp::Shr => l.wrapping_shr(r as u32),
                    BinOp::Lt => (l < r) as i64,
                    BinOp::Le => (l <= r) as i64,
                    BinOp::Gt => (l > r) as i64,
                    BinOp::Ge => (l >= r) as i64,
                    BinOp::Eq => (l == r) as i64,
                    BinOp::Ne => (l != r) as i64,
                    BinOp::BitAnd => l & r,
                    BinOp::BitOr => l | r,
                    BinOp::BitXor => l ^ r,
                    BinOp::LogAnd => ((l != 0) && (r != 0)) as i64,
                    BinOp::LogOr => ((l != 0) || (r != 0)) as i64,
                })
            }
            ExprKind::Cond { cond, then, otherwise } => {
                let c = self.fold(cond, report)?;
                if c != 0 {
                    self.fold(then, report)
                } else {
                    self.fold(otherwise, report)
                }
            }
            ExprKind::Cast { operand, .. } => {
                // Truncate to the annotated cast type when it is integral.
                let v = self.fold(operand, report)?;
                match self.types.type_of(e.id) {
                    Some(ty) if ty.is_integer() => {
                        let size = self.types.size_of(ty).unwrap_or(8);
                        Some(truncate(v, size, ty.is_unsigned_integer()))
                    }
                    Some(_) => None,
                    None => Some(v),
                }
            }
            ExprKind::SizeofType(_) | ExprKind::SizeofExpr(_) => {
                // The analyzer caches the computed size under the node id
                // when it is known.
                self.types.const_idents.get(&e.id).copied()
            }
            ExprKind::Comma { lhs, rhs } => {
                let _ = self.fold(lhs, report)?;
                self.fold(rhs, report)
            }
            _ => None,
        }
    }
}

/// Wrap a folded value to an integer type's width.
fn truncate(value: i64, size: u64, unsigned: bool) -> i64 {
    match size {
        1 => {
            if unsigned {
                value as u8 as i64
            } else {
                value as i8 as i64
            }
        }
        2 => {
            if unsigned {
                value as u16 as i64
            } else {
                value as i16 as i64
            }
        }
        4 => {
            if unsigned {
                value as u32 as i64
            } else {
                value as i32 as i64
            }
        }
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::test_util::{analyze, analyze_ok};

    /// Enum values observe full constant arithmetic, which makes them a
    /// convenient window into the folder.
    fn enum_value(expr: &str) -> i64 {
        let src = format!("enum probe {{ V = {} }}; int f(void) {{ return V; }}", expr);
        let out = analyze_ok(&src);
        *out.types.const_idents.values().next().expect("V folded")
    }

    #[test]
    fn test_fold_arithmetic() {
        assert_eq!(enum_value("1 + 2 * 3"), 7);
        assert_eq!(enum_value("(1 + 2) * 3"), 9);
        assert_eq!(enum_value("10 / 3"), 3);
        assert_eq!(enum_value("10 % 3"), 1);
        assert_eq!(enum_value("-5 + 2"), -3);
    }

    #[test]
    fn test_fold_bitwise_and_shift() {
        assert_eq!(enum_value("1 << 4"), 16);
        assert_eq!(enum_value("255 >> 4"), 15);
        assert_eq!(enum_value("12 & 10"), 8);
        assert_eq!(enum_value("12 | 10"), 14);
        assert_eq!(enum_value("12 ^ 10"), 6);
        assert_eq!(enum_value("~0"), -1);
    }

    #[test]
    fn test_fold_comparisons_and_logic() {
        assert_eq!(enum_value("3 < 5"), 1);
        assert_eq!(enum_value("3 > 5"), 0);
        assert_eq!(enum_value("1 && 2"), 1);
        assert_eq!(enum_value("0 || 0"), 0);
        assert_eq!(enum_value("!3"), 0);
    }

    #[test]
    fn test_fold_ternary() {
        assert_eq!(enum_value("1 ? 10 : 20"), 10);
        assert_eq!(enum_value("0 ? 10 : 20"), 20);
    }

    #[test]
    fn test_fold_char_constant() {
        assert_eq!(enum_value("'A'"), 65);
    }

    #[test]
    fn test_division_by_zero_diagnosed() {
        let out = analyze("enum bad { V = 1 / 0 };");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_enum_constant_reference() {
        assert_eq!(
            {
                let out = analyze_ok(
                    "enum a { X = 4 }; enum b { Y = X * 2 }; int f(void) { return Y; }",
                );
                let max = out.types.const_idents.values().copied().max();
                max.expect("folded")
            },
            8
        );
    }
}
