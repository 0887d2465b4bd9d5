//! Scoped symbol tables.
//!
//! Each scope carries three name tables: ordinary identifiers, tags,
//! and (on function scopes only) labels. Scopes are strictly stacked:
//! every `push_scope` has exactly one matching `pop_scope`, and lookups
//! walk outward. Locals get a stack-frame slot by aligning the owning
//! function's running offset to the symbol's alignment and advancing by
//! its size.

use std::cell::Cell;

use qcc_par::ast::StorageClass;
use qcc_util::{Span, Symbol};
use rustc_hash::FxHashMap;

use crate::types::Type;

/// Index of a binding in the table's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindingId(pub u32);

/// What a name is bound to.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingKind {
    Variable,
    Function,
    Parameter,
    Typedef,
    EnumConstant(i64),
}

/// Where a symbol's storage lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageSlot {
    /// Linkage object addressed by name.
    Global(Symbol),
    /// Byte offset within the enclosing function's frame.
    Stack(u64),
    /// No storage (typedefs, enum constants, functions).
    None,
}

/// A named binding.
#[derive(Clone, Debug)]
pub struct Binding {
    pub name: Symbol,
    pub kind: BindingKind,
    pub ty: Type,
    pub storage: Option<StorageClass>,
    pub loc: Span,
    pub scope_depth: u32,
    pub slot: StorageSlot,
    pub defined: bool,
    pub used: Cell<bool>,
}

/// Scope kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    File,
    Function,
    Block,
}

/// A label in the nearest function scope.
#[derive(Clone, Debug)]
pub struct LabelInfo {
    pub defined: bool,
    pub used: bool,
    pub loc: Span,
}

struct Scope {
    kind: ScopeKind,
    ordinary: FxHashMap<Symbol, BindingId>,
    tags: FxHashMap<Symbol, Type>,
    /// Present only on function scopes.
    labels: Option<FxHashMap<Symbol, LabelInfo>>,
    /// Running stack offset; meaningful on function scopes.
    stack_offset: u64,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            ordinary: FxHashMap::default(),
            tags: FxHashMap::default(),
            labels: if kind == ScopeKind::Function {
                Some(FxHashMap::default())
            } else {
                None
            },
            stack_offset: 0,
        }
    }
}

/// The stacked symbol table.
pub struct SymbolTable {
    bindings: Vec<Binding>,
    scopes: Vec<Scope>,
}

/// Result of a define attempt.
pub enum DefineOutcome {
    /// Fresh definition.
    New(BindingId),
    /// Allowed redeclaration (functions, extern objects).
    Redeclared(BindingId),
    /// Conflict with an existing same-scope binding.
    Conflict(BindingId),
}

impl SymbolTable {
    /// Create a table holding only the file scope.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            scopes: vec![Scope::new(ScopeKind::File)],
        }
    }

    /// Current nesting depth; the file scope is depth 0.
    pub fn depth(&self) -> u32 {
        self.scopes.len() as u32 - 1
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "file scope must remain");
        self.scopes.pop();
    }

    /// Is the current scope the file scope?
    pub fn at_file_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    pub fn binding_mut(&mut self, id: BindingId) -> &mut Binding {
        &mut self.bindings[id.0 as usize]
    }

    // =========================================================================
    // ORDINARY NAMESPACE
    // =========================================================================

    /// Define an ordinary name in the current scope.
    ///
    /// Redeclaration in the same scope conflicts unless both old and new
    /// bindings are functions, or both are objects with linkage
    /// (`extern`), or both are identical typedefs.
    pub fn define_ordinary(&mut self, binding: Binding) -> DefineOutcome {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        if let Some(&existing) = scope.ordinary.get(&binding.name) {
            let prev = &self.bindings[existing.0 as usize];
            let both_functions =
                prev.kind == BindingKind::Function && binding.kind == BindingKind::Function;
            let both_extern = prev.storage == Some(StorageClass::Extern)
                && binding.storage == Some(StorageClass::Extern);
            let same_typedef = prev.kind == BindingKind::Typedef
                && binding.kind == BindingKind::Typedef
                && prev.ty.compatible(&binding.ty);
            if both_functions || both_extern || same_typedef {
                // Keep the first binding, but a compatible definition
                // refines it: the defining declaration carries the
                // parameter names later phases need.
                let compatible = prev.ty.compatible(&binding.ty);
                let prev = &mut self.bindings[existing.0 as usize];
                if binding.defined && compatible {
                    prev.ty = binding.ty;
                    prev.loc = binding.loc;
                }
                prev.defined |= binding.defined;
                return DefineOutcome::Redeclared(existing);
            }
            return DefineOutcome::Conflict(existing);
        }
        let id = BindingId(self.bindings.len() as u32);
        scope.ordinary.insert(binding.name, id);
        self.bindings.push(binding);
        DefineOutcome::New(id)
    }

    /// Look up an ordinary name, walking parent scopes.
    pub fn lookup_ordinary(&self, name: Symbol) -> Option<BindingId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.ordinary.get(&name) {
                return Some(id);
            }
        }
        None
    }

    // =========================================================================
    // TAG NAMESPACE
    // =========================================================================

    /// Define a tag in the current scope.
    pub fn define_tag(&mut self, name: Symbol, ty: Type) {
        let scope = self.scopes.last_mut().expect("scope stack never empty");
        scope.tags.insert(name, ty);
    }

    /// Look up a tag in the current scope only (for definitions).
    pub fn lookup_tag_here(&self, name: Symbol) -> Option<Type> {
        self.scopes
            .last()
            .expect("scope stack never empty")
            .tags
            .get(&name)
            .cloned()
    }

    /// Look up a tag, walking parent scopes (for references).
    pub fn lookup_tag(&self, name: Symbol) -> Option<Type> {
        for scope in self.scopes.iter().rev() {
            if let Some(ty) = scope.tags.get(&name) {
                return Some(ty.clone());
            }
        }
        None
    }

    // =========================================================================
    // LABEL NAMESPACE (function scopes only)
    // =========================================================================

    fn function_labels(&mut self) -> Option<&mut FxHashMap<Symbol, LabelInfo>> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.labels.as_mut())
    }

    /// Record a label definition. Returns false if it was already
    /// defined in this function.
    pub fn define_label(&mut self, name: Symbol, loc: Span) -> bool {
        let Some(labels) = self.function_labels() else {
            return false;
        };
        match labels.get_mut(&name) {
            Some(info) if info.defined => false,
            Some(info) => {
                info.defined = true;
                info.loc = loc;
                true
            }
            None => {
                labels.insert(
                    name,
                    LabelInfo {
                        defined: true,
                        used: false,
                        loc,
                    },
                );
                true
            }
        }
    }

    /// Record a `goto` reference; forward references insert an
    /// undefined placeholder resolved by function end.
    pub fn reference_label(&mut self, name: Symbol, loc: Span) {
        let Some(labels) = self.function_labels() else {
            return;
        };
        labels
            .entry(name)
            .and_modify(|info| info.used = true)
            .or_insert(LabelInfo {
                defined: false,
                used: true,
                loc,
            });
    }

    /// Labels still undefined at function end.
    pub fn undefined_labels(&mut self) -> Vec<(Symbol, Span)> {
        let Some(labels) = self.function_labels() else {
            return Vec::new();
        };
        labels
            .iter()
            .filter(|(_, info)| !info.defined)
            .map(|(name, info)| (*name, info.loc))
            .collect()
    }

    // =========================================================================
    // STORAGE ASSIGNMENT
    // =========================================================================

    /// Reserve a stack slot in the enclosing function's frame: align the
    /// running offset up, then advance it by the object's size.
    pub fn alloc_stack(&mut self, size: u64, align: u64) -> u64 {
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.kind == ScopeKind::Function);
        let Some(scope) = scope else {
            return 0;
        };
        let align = align.max(1);
        let offset = (scope.stack_offset + align - 1) / align * align;
        scope.stack_offset = offset + size;
        offset
    }

    /// Total frame bytes reserved in the innermost function scope.
    pub fn frame_size(&self) -> u64 {
        self.scopes
            .iter()
            .rev()
            .find(|scope| scope.kind == ScopeKind::Function)
            .map(|scope| scope.stack_offset)
            .unwrap_or(0)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeContext;
    use qcc_util::Arch;

    fn ctx() -> TypeContext {
        TypeContext::new(Arch::X86_64.data_model())
    }

    fn var(name: &str, ty: Type, depth: u32) -> Binding {
        Binding {
            name: Symbol::intern(name),
            kind: BindingKind::Variable,
            ty,
            storage: None,
            loc: Span::DUMMY,
            scope_depth: depth,
            slot: StorageSlot::None,
            defined: true,
            used: Cell::new(false),
        }
    }

    #[test]
    fn test_lookup_walks_scopes() {
        let t = ctx();
        let mut tab = SymbolTable::new();
        tab.define_ordinary(var("x", t.int_(), 0));
        tab.push_scope(ScopeKind::Function);
        assert!(tab.lookup_ordinary(Symbol::intern("x")).is_some());
        assert!(tab.lookup_ordinary(Symbol::intern("y")).is_none());
        tab.pop_scope();
    }

    #[test]
    fn test_shadowing() {
        let t = ctx();
        let mut tab = SymbolTable::new();
        tab.define_ordinary(var("x", t.int_(), 0));
        tab.push_scope(ScopeKind::Block);
        tab.define_ordinary(var("x", t.double_(), 1));
        let id = tab.lookup_ordinary(Symbol::intern("x")).expect("x");
        assert!(tab.binding(id).ty.is_float());
        tab.pop_scope();
        let id = tab.lookup_ordinary(Symbol::intern("x")).expect("x");
        assert!(tab.binding(id).ty.is_integer());
    }

    #[test]
    fn test_same_scope_conflict() {
        let t = ctx();
        let mut tab = SymbolTable::new();
        tab.define_ordinary(var("x", t.int_(), 0));
        match tab.define_ordinary(var("x", t.int_(), 0)) {
            DefineOutcome::Conflict(_) => {}
            _ => panic!("redefinition must conflict"),
        }
    }

    #[test]
    fn test_function_redeclaration_allowed() {
        let t = ctx();
        let mut tab = SymbolTable::new();
        let f = Binding {
            kind: BindingKind::Function,
            defined: false,
            ..var("f", t.int_(), 0)
        };
        tab.define_ordinary(f.clone());
        let again = Binding { defined: true, ..f };
        match tab.define_ordinary(again) {
            DefineOutcome::Redeclared(id) => assert!(tab.binding(id).defined),
            _ => panic!("function redeclaration must be allowed"),
        }
    }

    #[test]
    fn test_tag_namespace_separate() {
        let t = ctx();
        let mut tab = SymbolTable::new();
        tab.define_ordinary(var("S", t.int_(), 0));
        assert!(tab.lookup_tag(Symbol::intern("S")).is_none());
        tab.define_tag(Symbol::intern("S"), t.int_());
        assert!(tab.lookup_tag(Symbol::intern("S")).is_some());
    }

    #[test]
    fn test_labels_live_on_function_scope() {
        let mut tab = SymbolTable::new();
        tab.push_scope(ScopeKind::Function);
        tab.push_scope(ScopeKind::Block);
        tab.reference_label(Symbol::intern("out"), Span::DUMMY);
        assert_eq!(tab.undefined_labels().len(), 1);
        assert!(tab.define_label(Symbol::intern("out"), Span::DUMMY));
        assert!(tab.undefined_labels().is_empty());
        // Duplicate definition is rejected.
        assert!(!tab.define_label(Symbol::intern("out"), Span::DUMMY));
        tab.pop_scope();
        tab.pop_scope();
    }

    #[test]
    fn test_stack_allocation_aligns() {
        let mut tab = SymbolTable::new();
        tab.push_scope(ScopeKind::Function);
        assert_eq!(tab.alloc_stack(1, 1), 0);
        assert_eq!(tab.alloc_stack(8, 8), 8);
        assert_eq!(tab.alloc_stack(4, 4), 16);
        assert_eq!(tab.frame_size(), 20);
        tab.pop_scope();
    }

    #[test]
    fn test_block_allocations_share_function_frame() {
        let mut tab = SymbolTable::new();
        tab.push_scope(ScopeKind::Function);
        tab.alloc_stack(4, 4);
        tab.push_scope(ScopeKind::Block);
        assert_eq!(tab.alloc_stack(4, 4), 4);
        tab.pop_scope();
        assert_eq!(tab.frame_size(), 8);
        tab.pop_scope();
    }
}
