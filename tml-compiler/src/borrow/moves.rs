// Move analysis: statement and expression walking. Consuming a
// non-copy place marks it moved-out; later uses are B001/B005/B011/B016.
// Branch merges union the moved-out sets of the arms.

use super::{BorrowChecker, Ctx, PlaceState};
use std::collections::HashMap;
use tml_ast as ast;

impl<'a> BorrowChecker<'a> {
    pub(crate) fn walk_block(&mut self, block: &ast::Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.walk_stmt(stmt);
            self.release_temporary_borrows();
        }
        self.pop_scope();
    }

    pub(crate) fn walk_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Let {
                pattern, ty, value, ..
            } => self.walk_binding(pattern, ty.as_ref(), value, false),
            ast::Stmt::LetElse {
                pattern,
                ty,
                value,
                else_block,
                ..
            } => {
                self.walk_binding(pattern, ty.as_ref(), value, false);
                self.walk_block(else_block);
            }
            ast::Stmt::Var {
                name, ty, value, span,
            } => {
                self.walk_expr(value, Ctx::Consume);
                let copy = ty
                    .as_ref()
                    .map(|t| self.type_expr_is_copy(t))
                    .unwrap_or_else(|| self.expr_is_copy(value));
                self.declare(name, true, copy, span.clone(), false);
                self.record_ref_binding(name, value);
            }
            ast::Stmt::Expr(expr) => {
                self.walk_expr(expr, Ctx::Read);
            }
            ast::Stmt::Decl(decl) => {
                if let ast::Decl::Func(f) = decl.as_ref() {
                    self.check_function(f);
                }
            }
        }
    }

    fn walk_binding(
        &mut self,
        pattern: &ast::Pattern,
        ty: Option<&ast::TypeExpr>,
        value: &ast::Expr,
        force_mut: bool,
    ) {
        self.walk_expr(value, Ctx::Consume);
        let copy = ty
            .map(|t| self.type_expr_is_copy(t))
            .unwrap_or_else(|| self.expr_is_copy(value));
        self.bind_pattern(pattern, copy, force_mut);
        if let ast::Pattern::Ident { name, .. } = pattern {
            self.record_ref_binding(name, value);
        }
    }

    pub(crate) fn bind_pattern(&mut self, pattern: &ast::Pattern, copy: bool, force_mut: bool) {
        match pattern {
            ast::Pattern::Ident {
                name,
                mutable,
                span,
                ..
            } => {
                self.declare(name, *mutable || force_mut, copy, span.clone(), false);
            }
            ast::Pattern::Tuple { elems, .. } => {
                for p in elems {
                    self.bind_pattern(p, copy, force_mut);
                }
            }
            ast::Pattern::Struct { fields, .. } => {
                for (_, p) in fields {
                    self.bind_pattern(p, copy, force_mut);
                }
            }
            ast::Pattern::Enum { args, .. } => {
                for p in args {
                    self.bind_pattern(p, copy, force_mut);
                }
            }
            ast::Pattern::Or { alts, .. } => {
                if let Some(first) = alts.first() {
                    self.bind_pattern(first, copy, force_mut);
                }
            }
            _ => {}
        }
    }

    /// Remember `let r = ref x` so the borrow dies with `r` and so a
    /// `return r` can be flagged as escaping.
    fn record_ref_binding(&mut self, name: &str, value: &ast::Expr) {
        if let ast::ExprKind::Unary {
            op: ast::UnaryOp::Ref { .. },
            operand,
        } = &value.kind
        {
            if let ast::ExprKind::Ident(target) = &operand.kind {
                let target = target.clone();
                // Re-home the just-registered temporary borrow onto the
                // binding.
                if let Some(state) = self.place_mut(&target) {
                    if let Some(borrow) = state.borrows.iter_mut().rev().find(|b| b.holder.is_none())
                    {
                        borrow.holder = Some(name.to_string());
                    }
                }
                if let Some(state) = self.place_mut(name) {
                    state.ref_target = Some(target);
                }
            }
        }
    }

    pub(crate) fn walk_expr(&mut self, expr: &ast::Expr, ctx: Ctx) {
        match &expr.kind {
            ast::ExprKind::Literal(_) | ast::ExprKind::Base => {}
            ast::ExprKind::Ident(name) => self.use_place(name, ctx, &expr.span),
            ast::ExprKind::Path(_) => {}
            ast::ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs, Ctx::Read);
                self.walk_expr(rhs, Ctx::Read);
            }
            ast::ExprKind::Unary { op, operand } => match op {
                ast::UnaryOp::Ref { mutable } => {
                    let borrow_ctx = if *mutable {
                        Ctx::BorrowMut
                    } else {
                        Ctx::BorrowShared
                    };
                    self.walk_expr(operand, borrow_ctx);
                    if self.in_return && self.returns_ref {
                        if let ast::ExprKind::Ident(name) = &operand.kind {
                            if self.is_local(name) {
                                self.report(
                                    "B010",
                                    format!("returning a reference to local variable `{}`", name),
                                    &expr.span,
                                );
                            }
                        }
                    }
                }
                _ => self.walk_expr(operand, Ctx::Read),
            },
            ast::ExprKind::Assign { target, value, .. } => {
                self.walk_expr(value, Ctx::Consume);
                self.walk_assign_target(target, &expr.span);
            }
            ast::ExprKind::Call { callee, args, .. } => {
                self.walk_call(callee, args);
            }
            ast::ExprKind::MethodCall { receiver, args, .. } => {
                self.walk_expr(receiver, Ctx::Read);
                for arg in args {
                    let ctx = if self.expr_is_copy(arg) {
                        Ctx::Read
                    } else {
                        Ctx::Consume
                    };
                    self.walk_expr(arg, ctx);
                }
            }
            ast::ExprKind::Field { object, field } => {
                self.use_field(object, field, ctx, &expr.span);
            }
            ast::ExprKind::Index { object, index } => {
                self.walk_expr(object, Ctx::Read);
                self.walk_expr(index, Ctx::Read);
            }
            ast::ExprKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                self.walk_expr(cond, Ctx::Read);
                let before = self.snapshot();
                self.walk_block(then_block);
                let after_then = self.snapshot();
                self.restore(before.clone());
                if let Some(else_expr) = else_branch {
                    self.walk_expr(else_expr, Ctx::Read);
                }
                let after_else = self.snapshot();
                self.restore(Self::join(before, &[after_then, after_else]));
            }
            ast::ExprKind::Block(block) => self.walk_block(block),
            ast::ExprKind::Loop { body, .. } => self.walk_block(body),
            ast::ExprKind::While { cond, body, .. } => {
                self.walk_expr(cond, Ctx::Read);
                self.walk_block(body);
            }
            ast::ExprKind::For {
                pattern,
                iter,
                body,
                ..
            } => {
                self.walk_expr(iter, Ctx::Read);
                self.push_scope();
                self.bind_pattern(pattern, true, false);
                self.walk_block(body);
                self.pop_scope();
            }
            ast::ExprKind::When { scrutinee, arms } => {
                self.walk_expr(scrutinee, Ctx::Read);
                let before = self.snapshot();
                let mut after_arms = Vec::new();
                for arm in arms {
                    self.restore(before.clone());
                    self.push_scope();
                    let copy = true; // pattern bindings copy payloads out
                    self.bind_pattern(&arm.pattern, copy, false);
                    if let Some(guard) = &arm.guard {
                        self.walk_expr(guard, Ctx::Read);
                    }
                    self.walk_expr(&arm.body, Ctx::Read);
                    self.pop_scope();
                    after_arms.push(self.snapshot());
                }
                self.restore(Self::join(before, &after_arms));
            }
            ast::ExprKind::Return(value) => {
                if let Some(inner) = value {
                    let saved = self.in_return;
                    self.in_return = true;
                    self.walk_expr(inner, Ctx::Consume);
                    // Returning a binding that holds a reference to a
                    // local escapes the frame too.
                    if let ast::ExprKind::Ident(name) = &inner.kind {
                        let escapes = self.returns_ref
                            && self
                                .place(name)
                                .and_then(|p| p.ref_target.clone())
                                .map(|target| self.is_local(&target))
                                .unwrap_or(false);
                        if escapes {
                            self.report(
                                "B010",
                                format!(
                                    "`{}` refers to a local variable and cannot be returned",
                                    name
                                ),
                                &inner.span,
                            );
                        }
                    }
                    self.in_return = saved;
                }
            }
            ast::ExprKind::Break { .. } | ast::ExprKind::Continue { .. } => {}
            ast::ExprKind::StructLit { fields, base, .. } => {
                for (_, value) in fields {
                    let ctx = if self.expr_is_copy(value) {
                        Ctx::Read
                    } else {
                        Ctx::Consume
                    };
                    self.walk_expr(value, ctx);
                }
                if let Some(base_expr) = base {
                    self.walk_expr(base_expr, Ctx::Consume);
                }
            }
            ast::ExprKind::Tuple(elems) | ast::ExprKind::Array(elems) => {
                for elem in elems {
                    let ctx = if self.expr_is_copy(elem) {
                        Ctx::Read
                    } else {
                        Ctx::Consume
                    };
                    self.walk_expr(elem, ctx);
                }
            }
            ast::ExprKind::ArrayRepeat { elem, count } => {
                self.walk_expr(elem, Ctx::Read);
                self.walk_expr(count, Ctx::Read);
            }
            ast::ExprKind::Closure { is_move, params, body, .. } => {
                self.analyze_closure(*is_move, params, body, &expr.span);
            }
            ast::ExprKind::Range { start, end, .. } => {
                self.walk_expr(start, Ctx::Read);
                self.walk_expr(end, Ctx::Read);
            }
            ast::ExprKind::Cast { expr: inner, .. }
            | ast::ExprKind::Is { expr: inner, .. }
            | ast::ExprKind::Try(inner)
            | ast::ExprKind::Await(inner) => {
                self.walk_expr(inner, Ctx::Read);
            }
            ast::ExprKind::InterpolatedString(parts) => {
                for part in parts {
                    if let ast::InterpPart::Expr(inner) = part {
                        self.walk_expr(inner, Ctx::Read);
                    }
                }
            }
            ast::ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.walk_expr(cond, Ctx::Read);
                let before = self.snapshot();
                self.walk_expr(then_expr, Ctx::Read);
                let after_then = self.snapshot();
                self.restore(before.clone());
                self.walk_expr(else_expr, Ctx::Read);
                let after_else = self.snapshot();
                self.restore(Self::join(before, &[after_then, after_else]));
            }
            ast::ExprKind::New { args, .. } => {
                for arg in args {
                    let ctx = if self.expr_is_copy(arg) {
                        Ctx::Read
                    } else {
                        Ctx::Consume
                    };
                    self.walk_expr(arg, ctx);
                }
            }
        }
    }

    fn walk_call(&mut self, callee: &ast::Expr, args: &[ast::Expr]) {
        // Parameter modes come from the signature when known: reference
        // parameters borrow, everything else consumes non-copy values.
        let param_refs: Option<Vec<bool>> = match &callee.kind {
            ast::ExprKind::Ident(name) => self
                .env
                .functions
                .get(name)
                .map(|sig| {
                    sig.params
                        .iter()
                        .map(|(_, ty)| matches!(ty, crate::ty::Ty::Ref { .. }))
                        .collect()
                }),
            _ => None,
        };
        if !matches!(&callee.kind, ast::ExprKind::Ident(_) | ast::ExprKind::Path(_)) {
            self.walk_expr(callee, Ctx::Read);
        }

        for (i, arg) in args.iter().enumerate() {
            let is_ref_param = param_refs
                .as_ref()
                .and_then(|ps| ps.get(i).copied())
                .unwrap_or(false);
            let ctx = if is_ref_param || self.expr_is_copy(arg) {
                Ctx::Read
            } else {
                Ctx::Consume
            };
            self.walk_expr(arg, ctx);
        }
    }

    fn walk_assign_target(&mut self, target: &ast::Expr, stmt_span: &ast::Span) {
        match &target.kind {
            ast::ExprKind::Ident(name) => {
                let name = name.clone();
                self.check_assign(&name, stmt_span);
            }
            ast::ExprKind::Field { object, .. } | ast::ExprKind::Index { object, .. } => {
                if let ast::ExprKind::Ident(name) = &object.kind {
                    let name = name.clone();
                    self.check_assign(&name, stmt_span);
                } else {
                    self.walk_expr(object, Ctx::Read);
                }
            }
            ast::ExprKind::Unary {
                op: ast::UnaryOp::Deref,
                operand,
            } => self.walk_expr(operand, Ctx::Read),
            _ => self.walk_expr(target, Ctx::Read),
        }
    }

    pub(crate) fn is_local(&self, name: &str) -> bool {
        self.place(name).map(|p| !p.is_param).unwrap_or(false)
    }

    // ==================== Branch state ====================

    pub(crate) fn snapshot(&self) -> Vec<HashMap<String, PlaceState>> {
        self.scopes.clone()
    }

    pub(crate) fn restore(&mut self, snapshot: Vec<HashMap<String, PlaceState>>) {
        self.scopes = snapshot;
    }

    /// Merge arm states over a common pre-state: moved-out places union
    /// (a move on any path poisons the join), live borrows intersect.
    pub(crate) fn join(
        mut base: Vec<HashMap<String, PlaceState>>,
        arms: &[Vec<HashMap<String, PlaceState>>],
    ) -> Vec<HashMap<String, PlaceState>> {
        for scope in base.iter_mut() {
            for (name, state) in scope.iter_mut() {
                for arm in arms {
                    if let Some(arm_state) = arm.iter().rev().find_map(|s| s.get(name)) {
                        if state.moved.is_none() {
                            state.moved = arm_state.moved.clone();
                        }
                        for moved_field in &arm_state.moved_fields {
                            if !state
                                .moved_fields
                                .iter()
                                .any(|(f, _)| f == &moved_field.0)
                            {
                                state.moved_fields.push(moved_field.clone());
                            }
                        }
                        // Intersection of live borrows.
                        state.borrows.retain(|b| {
                            arm_state
                                .borrows
                                .iter()
                                .any(|ab| ab.span == b.span)
                        });
                    }
                }
            }
        }
        base
    }
}
