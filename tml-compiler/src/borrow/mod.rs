// Borrow and move analysis. Intraprocedural over the AST: each function
// body is walked with a stack of scopes tracking, per place, whether it
// has been moved out, which fields are gone, and which borrows are live.
// Branch joins union the moved-out sets.

use crate::env::TypeEnv;
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;
use tml_diagnostics::{Diagnostic, Span};

mod borrows;
mod closure_analysis;
mod moves;

/// How an expression's value is being requested by its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ctx {
    /// Read without consuming (conditions, copies, receiver lookups).
    Read,
    /// Ownership transfer: bindings, by-value arguments, returns.
    Consume,
    /// `ref x`.
    BorrowShared,
    /// `ref mut x`.
    BorrowMut,
}

#[derive(Debug, Clone)]
pub(crate) struct Borrower {
    /// Binding that holds the reference; `None` for expression-temporary
    /// borrows released at the end of the statement.
    pub holder: Option<String>,
    pub span: ast::Span,
    pub mutable: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PlaceState {
    pub mutable: bool,
    pub copy: bool,
    pub decl_span: ast::Span,
    pub moved: Option<ast::Span>,
    pub moved_fields: Vec<(String, ast::Span)>,
    pub borrows: Vec<Borrower>,
    /// This binding holds `ref <target>`; used to release borrows when
    /// the binding dies and to flag returned references to locals.
    pub ref_target: Option<String>,
    pub is_param: bool,
}

impl PlaceState {
    pub fn live_shared(&self) -> impl Iterator<Item = &Borrower> {
        self.borrows.iter().filter(|b| !b.mutable)
    }

    pub fn live_mut(&self) -> Option<&Borrower> {
        self.borrows.iter().find(|b| b.mutable)
    }
}

pub struct BorrowChecker<'a> {
    source: &'a str,
    file: String,
    env: &'a TypeEnv,
    pub(crate) scopes: Vec<HashMap<String, PlaceState>>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Set while walking a `return` value.
    pub(crate) in_return: bool,
    /// The current function's declared return type is a reference, so a
    /// returned reference can actually escape (B010).
    pub(crate) returns_ref: bool,
}

impl<'a> BorrowChecker<'a> {
    pub fn new(source: &'a str, file: &str, env: &'a TypeEnv) -> Self {
        Self {
            source,
            file: file.to_string(),
            env,
            scopes: Vec::new(),
            diagnostics: Vec::new(),
            in_return: false,
            returns_ref: false,
        }
    }

    /// Check every function body in the module; returns all B-coded
    /// diagnostics found.
    pub fn check_module(mut self, module: &ast::Module) -> Vec<Diagnostic> {
        self.check_decls(&module.decls);
        self.diagnostics
    }

    fn check_decls(&mut self, decls: &[ast::Decl]) {
        for decl in decls {
            match decl {
                ast::Decl::Func(f) => self.check_function(f),
                ast::Decl::Impl(i) => {
                    for method in &i.methods {
                        self.check_function(method);
                    }
                }
                ast::Decl::Class(c) => {
                    for method in &c.methods {
                        self.check_function(method);
                    }
                }
                ast::Decl::Mod(m) => self.check_decls(&m.decls),
                _ => {}
            }
        }
    }

    pub(crate) fn check_function(&mut self, f: &ast::FuncDecl) {
        let Some(body) = &f.body else { return };
        // Nested functions do not see enclosing locals.
        let saved_scopes = std::mem::take(&mut self.scopes);
        let saved_returns_ref = self.returns_ref;
        self.returns_ref = matches!(f.return_type, Some(ast::TypeExpr::Ref { .. }));
        self.push_scope();

        for param in &f.params {
            for name in param.pattern.bindings() {
                let copy = self.type_expr_is_copy(&param.ty) || name == "this";
                let mutable =
                    matches!(&param.pattern, ast::Pattern::Ident { mutable: true, .. });
                self.declare(name, mutable, copy, param.span.clone(), true);
            }
        }

        self.walk_block(body);
        self.pop_scope();
        self.scopes = saved_scopes;
        self.returns_ref = saved_returns_ref;
    }

    // ==================== Scopes & places ====================

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            // Dying reference bindings release their borrows.
            for (name, state) in &scope {
                if state.ref_target.is_some() {
                    self.release_borrows_held_by(name);
                }
            }
        }
    }

    pub(crate) fn declare(
        &mut self,
        name: &str,
        mutable: bool,
        copy: bool,
        span: ast::Span,
        is_param: bool,
    ) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                PlaceState {
                    mutable,
                    copy,
                    decl_span: span,
                    moved: None,
                    moved_fields: Vec::new(),
                    borrows: Vec::new(),
                    ref_target: None,
                    is_param,
                },
            );
        }
    }

    pub(crate) fn place(&self, name: &str) -> Option<&PlaceState> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub(crate) fn place_mut(&mut self, name: &str) -> Option<&mut PlaceState> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }

    pub(crate) fn release_borrows_held_by(&mut self, holder: &str) {
        for scope in self.scopes.iter_mut() {
            for state in scope.values_mut() {
                state
                    .borrows
                    .retain(|b| b.holder.as_deref() != Some(holder));
            }
        }
    }

    pub(crate) fn release_temporary_borrows(&mut self) {
        for scope in self.scopes.iter_mut() {
            for state in scope.values_mut() {
                state.borrows.retain(|b| b.holder.is_some());
            }
        }
    }

    // ==================== Diagnostics ====================

    pub(crate) fn span(&self, range: &ast::Span) -> Span {
        Span::from_source_range(&self.file, self.source, range.clone())
    }

    pub(crate) fn report(&mut self, code: &str, message: impl Into<String>, range: &ast::Span) {
        let span = self.span(range);
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    pub(crate) fn report_with_label(
        &mut self,
        code: &str,
        message: impl Into<String>,
        range: &ast::Span,
        label_range: &ast::Span,
        label: &str,
    ) {
        let span = self.span(range);
        let label_span = self.span(label_range);
        self.diagnostics
            .push(Diagnostic::error(code, message, span).with_label(label_span, label));
    }

    // ==================== Copy approximation ====================

    /// Copy-ness of a syntactic type, via the environment when named.
    pub(crate) fn type_expr_is_copy(&self, ty: &ast::TypeExpr) -> bool {
        match ty {
            ast::TypeExpr::Named { path, .. } => {
                let name = path.last().map(|s| s.as_str()).unwrap_or("");
                if let Some(prim) = Ty::primitive_from_name(name) {
                    return prim.is_copy();
                }
                // User aggregates move; unknown generics conservatively
                // stay copy so inference gaps don't produce false moves.
                !(self.env.structs.contains_key(name)
                    || self.env.enums.contains_key(name)
                    || self.env.classes.contains_key(name)
                    || self.env.unions.contains_key(name))
            }
            ast::TypeExpr::Ref { .. } | ast::TypeExpr::Ptr { .. } | ast::TypeExpr::Func { .. } => {
                true
            }
            ast::TypeExpr::Array { elem, .. } | ast::TypeExpr::Slice { elem, .. } => {
                self.type_expr_is_copy(elem)
            }
            ast::TypeExpr::Tuple { elems, .. } => elems.iter().all(|e| self.type_expr_is_copy(e)),
            ast::TypeExpr::Dyn { .. } => false,
            ast::TypeExpr::Infer { .. } => true,
        }
    }

    /// Copy-ness of an expression's value. Unknown shapes default to
    /// copy: the analysis under-approximates moves rather than invent
    /// them.
    pub(crate) fn expr_is_copy(&self, expr: &ast::Expr) -> bool {
        match &expr.kind {
            ast::ExprKind::Literal(ast::Literal::Str(_)) => false,
            ast::ExprKind::Literal(_) => true,
            ast::ExprKind::InterpolatedString(_) => false,
            ast::ExprKind::Ident(name) => self.place(name).map(|p| p.copy).unwrap_or(true),
            ast::ExprKind::StructLit { .. }
            | ast::ExprKind::New { .. }
            | ast::ExprKind::Closure { .. } => false,
            ast::ExprKind::Array(elems) => elems.iter().all(|e| self.expr_is_copy(e)),
            ast::ExprKind::Tuple(elems) => elems.iter().all(|e| self.expr_is_copy(e)),
            ast::ExprKind::Call { callee, .. } => {
                if let ast::ExprKind::Ident(name) = &callee.kind {
                    if self.env.enum_for_variant(name).is_some() {
                        return false;
                    }
                    if let Some(sig) = self.env.functions.get(name) {
                        return sig.ret.is_copy();
                    }
                }
                true
            }
            ast::ExprKind::Field { object, .. } => {
                // Without full types, assume projections of non-copy
                // aggregates may themselves be non-copy only when the
                // base is a known local aggregate.
                if let ast::ExprKind::Ident(name) = &object.kind {
                    if let Some(state) = self.place(name) {
                        return state.copy;
                    }
                }
                true
            }
            _ => true,
        }
    }
}
