// Bottom-up expression inference with unification, plus the coercion
// rules for numeric literals, class upcasts, and dyn behaviors.

use super::TypeChecker;
use crate::env::FuncSig;
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;
use tml_diagnostics::fuzzy;

impl<'a> TypeChecker<'a> {
    pub(crate) fn fresh_var(&mut self) -> Ty {
        let id = self.next_var;
        self.next_var += 1;
        Ty::Var(id)
    }

    /// Resolve unification variables through the substitution map.
    pub(crate) fn apply(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::Var(id) => match self.subst.get(id) {
                Some(bound) => self.apply(bound),
                None => ty.clone(),
            },
            Ty::Named { name, module, args } => Ty::Named {
                name: name.clone(),
                module: module.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Ty::Class { name, args } => Ty::Class {
                name: name.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Ty::DynBehavior { behavior, args } => Ty::DynBehavior {
                behavior: behavior.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Ty::Ref {
                mutable,
                inner,
                lifetime,
            } => Ty::Ref {
                mutable: *mutable,
                inner: Box::new(self.apply(inner)),
                lifetime: lifetime.clone(),
            },
            Ty::Ptr { mutable, inner } => Ty::Ptr {
                mutable: *mutable,
                inner: Box::new(self.apply(inner)),
            },
            Ty::Array { elem, size } => Ty::Array {
                elem: Box::new(self.apply(elem)),
                size: *size,
            },
            Ty::Slice { elem } => Ty::Slice {
                elem: Box::new(self.apply(elem)),
            },
            Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| self.apply(e)).collect()),
            Ty::Func {
                params,
                ret,
                is_async,
            } => Ty::Func {
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(ret)),
                is_async: *is_async,
            },
            Ty::Closure { params, ret } => Ty::Closure {
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(ret)),
            },
            other => other.clone(),
        }
    }

    /// Structural unification; `actual` may coerce into `expected`
    /// (class upcast, closure-to-func, shared view of a mut ref).
    /// Returns false on mismatch without emitting.
    pub(crate) fn unify(&mut self, actual: &Ty, expected: &Ty) -> bool {
        let a = self.apply(actual);
        let e = self.apply(expected);

        match (&a, &e) {
            (Ty::Error, _) | (_, Ty::Error) => true,
            (Ty::Var(id), _) => {
                self.subst.insert(*id, e.clone());
                true
            }
            (_, Ty::Var(id)) => {
                self.subst.insert(*id, a.clone());
                true
            }
            (Ty::Named { name: n1, args: a1, .. }, Ty::Named { name: n2, args: a2, .. }) => {
                n1 == n2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| self.unify(x, y))
            }
            (Ty::Class { name: actual_class, .. }, Ty::Class { name: expected_class, .. }) => {
                // Upcast along the inheritance chain.
                self.env
                    .class_chain(actual_class)
                    .iter()
                    .any(|c| &c.name == expected_class)
            }
            (Ty::Class { name, .. }, Ty::DynBehavior { behavior, .. }) => {
                self.env.implements(name, behavior)
            }
            (Ty::Named { name, .. }, Ty::DynBehavior { behavior, .. }) => {
                self.env.implements(name, behavior)
            }
            (
                Ty::DynBehavior { behavior: b1, args: a1 },
                Ty::DynBehavior { behavior: b2, args: a2 },
            ) => b1 == b2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| self.unify(x, y)),
            (
                Ty::Ref {
                    mutable: m1,
                    inner: i1,
                    ..
                },
                Ty::Ref {
                    mutable: m2,
                    inner: i2,
                    ..
                },
            ) => (*m1 || !*m2) && self.unify(i1, i2),
            // References auto-deref in value contexts.
            (Ty::Ref { inner, .. }, _) => {
                let inner = (**inner).clone();
                self.unify(&inner, &e)
            }
            (
                Ty::Ptr {
                    inner: i1, ..
                },
                Ty::Ptr {
                    inner: i2, ..
                },
            ) => self.unify(i1, i2),
            (Ty::Array { elem: e1, size: s1 }, Ty::Array { elem: e2, size: s2 }) => {
                s1 == s2 && self.unify(e1, e2)
            }
            (Ty::Array { elem: e1, .. }, Ty::Slice { elem: e2 }) => self.unify(e1, e2),
            (Ty::Slice { elem: e1 }, Ty::Slice { elem: e2 }) => self.unify(e1, e2),
            (Ty::Tuple(t1), Ty::Tuple(t2)) => {
                t1.len() == t2.len() && t1.iter().zip(t2).all(|(x, y)| self.unify(x, y))
            }
            (
                Ty::Func {
                    params: p1,
                    ret: r1,
                    ..
                },
                Ty::Func {
                    params: p2,
                    ret: r2,
                    ..
                },
            )
            | (
                Ty::Closure { params: p1, ret: r1 },
                Ty::Func {
                    params: p2,
                    ret: r2,
                    ..
                },
            )
            | (
                Ty::Func {
                    params: p1,
                    ret: r1,
                    ..
                },
                Ty::Closure { params: p2, ret: r2 },
            )
            | (Ty::Closure { params: p1, ret: r1 }, Ty::Closure { params: p2, ret: r2 }) => {
                p1.len() == p2.len()
                    && p1.iter().zip(p2).all(|(x, y)| self.unify(x, y))
                    && self.unify(r1, r2)
            }
            _ => a == e,
        }
    }

    pub(crate) fn expect_type(
        &mut self,
        actual: &Ty,
        expected: &Ty,
        range: &ast::Span,
        context: &str,
    ) -> Ty {
        if self.unify(actual, expected) {
            self.apply(expected)
        } else {
            let (a, e) = (self.apply(actual), self.apply(expected));
            self.error(
                "T001",
                format!("mismatched types {}: expected `{}`, found `{}`", context, e, a),
                range,
            );
            Ty::Error
        }
    }

    // ==================== Expressions ====================

    pub(crate) fn infer_expr(&mut self, expr: &ast::Expr, expected: Option<&Ty>) -> Ty {
        let ty = self.infer_expr_inner(expr, expected);
        self.apply(&ty)
    }

    fn infer_expr_inner(&mut self, expr: &ast::Expr, expected: Option<&Ty>) -> Ty {
        match &expr.kind {
            ast::ExprKind::Literal(lit) => self.infer_literal(lit, expected),
            ast::ExprKind::Ident(name) => self.infer_ident(name, &expr.span),
            ast::ExprKind::Path(path) => self.infer_path(path, &expr.span),
            ast::ExprKind::Binary { op, lhs, rhs } => self.infer_binary(*op, lhs, rhs, &expr.span),
            ast::ExprKind::Unary { op, operand } => self.infer_unary(*op, operand, &expr.span),
            ast::ExprKind::Assign { op, target, value } => {
                self.infer_assign(*op, target, value, &expr.span)
            }
            ast::ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.infer_call(callee, type_args, args, &expr.span),
            ast::ExprKind::MethodCall {
                receiver,
                method,
                type_args,
                args,
            } => self.infer_method_call(receiver, method, type_args, args, &expr.span),
            ast::ExprKind::Field { object, field } => self.infer_field(object, field, &expr.span),
            ast::ExprKind::Index { object, index } => self.infer_index(object, index, &expr.span),
            ast::ExprKind::If {
                cond,
                then_block,
                else_branch,
            } => {
                let cond_ty = self.infer_expr(cond, Some(&Ty::Bool));
                if !self.unify(&cond_ty, &Ty::Bool) {
                    self.error(
                        "T014",
                        format!("`if` condition must be `Bool`, found `{}`", cond_ty),
                        &cond.span,
                    );
                }
                let then_ty = self.check_block_value(then_block, expected);
                match else_branch {
                    Some(else_expr) => {
                        let else_ty = self.infer_expr(else_expr, expected.or(Some(&then_ty)));
                        if !self.unify(&else_ty, &then_ty) {
                            self.error(
                                "T015",
                                format!(
                                    "`if` branches have mismatched types: `{}` vs `{}`",
                                    then_ty, else_ty
                                ),
                                &else_expr.span,
                            );
                            return Ty::Error;
                        }
                        self.apply(&then_ty)
                    }
                    None => Ty::Unit,
                }
            }
            ast::ExprKind::Block(block) => {
                self.push_scope();
                let ty = self.check_block_value(block, expected);
                self.pop_scope();
                ty
            }
            ast::ExprKind::Loop { label, body } => {
                self.loop_labels.push(label.clone());
                self.push_scope();
                self.check_block(body);
                self.pop_scope();
                self.loop_labels.pop();
                Ty::Unit
            }
            ast::ExprKind::While { label, cond, body } => {
                let cond_ty = self.infer_expr(cond, Some(&Ty::Bool));
                if !self.unify(&cond_ty, &Ty::Bool) {
                    self.error(
                        "T014",
                        format!("`while` condition must be `Bool`, found `{}`", cond_ty),
                        &cond.span,
                    );
                }
                self.loop_labels.push(label.clone());
                self.push_scope();
                self.check_block(body);
                self.pop_scope();
                self.loop_labels.pop();
                Ty::Unit
            }
            ast::ExprKind::For {
                label,
                pattern,
                iter,
                body,
            } => {
                let elem_ty = self.iterable_element(iter);
                self.loop_labels.push(label.clone());
                self.push_scope();
                self.check_pattern(pattern, &elem_ty, true);
                self.check_block(body);
                self.pop_scope();
                self.loop_labels.pop();
                Ty::Unit
            }
            ast::ExprKind::When { scrutinee, arms } => {
                self.infer_when(scrutinee, arms, &expr.span, expected)
            }
            ast::ExprKind::Return(value) => {
                let ret = self.current_ret.clone().unwrap_or(Ty::Unit);
                match value {
                    Some(inner) => {
                        let ty = self.infer_expr(inner, Some(&ret));
                        if !self.unify(&ty, &ret) {
                            self.error(
                                "T016",
                                format!(
                                    "return type mismatch: expected `{}`, found `{}`",
                                    self.apply(&ret),
                                    ty
                                ),
                                &inner.span,
                            );
                        }
                    }
                    None => {
                        if !self.unify(&Ty::Unit, &ret) {
                            self.error(
                                "T016",
                                format!(
                                    "return type mismatch: expected `{}`, found `Unit`",
                                    self.apply(&ret)
                                ),
                                &expr.span,
                            );
                        }
                    }
                }
                Ty::Unit
            }
            ast::ExprKind::Break { label } => {
                self.check_loop_target(label.as_deref(), "break", &expr.span, "T030");
                Ty::Unit
            }
            ast::ExprKind::Continue { label } => {
                self.check_loop_target(label.as_deref(), "continue", &expr.span, "T031");
                Ty::Unit
            }
            ast::ExprKind::StructLit { path, fields, base } => {
                self.infer_struct_lit(path, fields, base.as_deref(), &expr.span)
            }
            ast::ExprKind::Tuple(elems) => {
                if elems.is_empty() {
                    return Ty::Unit;
                }
                Ty::Tuple(elems.iter().map(|e| self.infer_expr(e, None)).collect())
            }
            ast::ExprKind::Array(elems) => {
                let expected_elem = match expected.map(|e| self.apply(e)) {
                    Some(Ty::Array { elem, .. }) | Some(Ty::Slice { elem }) => Some(*elem),
                    _ => None,
                };
                let elem_ty = match elems.first() {
                    Some(first) => {
                        let first_ty = self.infer_expr(first, expected_elem.as_ref());
                        for elem in &elems[1..] {
                            let ty = self.infer_expr(elem, Some(&first_ty));
                            if !self.unify(&ty, &first_ty) {
                                self.error(
                                    "T001",
                                    format!(
                                        "array elements disagree: `{}` vs `{}`",
                                        first_ty, ty
                                    ),
                                    &elem.span,
                                );
                            }
                        }
                        first_ty
                    }
                    None => expected_elem.unwrap_or_else(|| self.fresh_var()),
                };
                Ty::Array {
                    elem: Box::new(elem_ty),
                    size: elems.len() as u64,
                }
            }
            ast::ExprKind::ArrayRepeat { elem, count } => {
                let elem_ty = self.infer_expr(elem, None);
                let size = self.const_eval_int(count).unwrap_or_else(|| {
                    self.error(
                        "T002",
                        "array repeat count must be a constant integer",
                        &count.span,
                    );
                    0
                });
                Ty::Array {
                    elem: Box::new(elem_ty),
                    size: size.max(0) as u64,
                }
            }
            ast::ExprKind::Closure {
                params,
                return_type,
                body,
                ..
            } => self.infer_closure(params, return_type.as_ref(), body, expected),
            ast::ExprKind::Range { start, end, .. } => {
                let start_ty = self.infer_expr(start, None);
                if !start_ty.is_integer() && !start_ty.is_error() {
                    self.error(
                        "T051",
                        format!("range bounds must be integers, found `{}`", start_ty),
                        &start.span,
                    );
                }
                let end_ty = self.infer_expr(end, Some(&start_ty));
                if !self.unify(&end_ty, &start_ty) {
                    self.error(
                        "T051",
                        format!(
                            "range bounds disagree: `{}` vs `{}`",
                            start_ty, end_ty
                        ),
                        &end.span,
                    );
                }
                Ty::Named {
                    name: "Range".to_string(),
                    module: String::new(),
                    args: vec![self.apply(&start_ty)],
                }
            }
            ast::ExprKind::Cast { expr: inner, ty } => {
                let from = self.infer_expr(inner, None);
                let to = self.resolve_type(ty);
                let ok = from.is_error()
                    || to.is_error()
                    || (from.is_numeric() && to.is_numeric())
                    || (from.is_integer() && matches!(to, Ty::Bool | Ty::Char))
                    || (matches!(from, Ty::Bool | Ty::Char) && to.is_integer())
                    || matches!(from, Ty::Ptr { .. })
                    || matches!(to, Ty::Ptr { .. });
                if !ok {
                    self.error(
                        "T001",
                        format!("cannot cast `{}` to `{}`", from, to),
                        &expr.span,
                    );
                    return Ty::Error;
                }
                to
            }
            ast::ExprKind::Is { expr: inner, .. } => {
                self.infer_expr(inner, None);
                Ty::Bool
            }
            ast::ExprKind::Try(inner) => self.infer_try(inner, &expr.span),
            ast::ExprKind::Await(inner) => {
                if !self.in_async {
                    self.error(
                        "T032",
                        "`await` is only allowed inside `async` functions",
                        &expr.span,
                    );
                }
                self.infer_expr(inner, None)
            }
            ast::ExprKind::InterpolatedString(parts) => {
                for part in parts {
                    if let ast::InterpPart::Expr(inner) = part {
                        let ty = self.infer_expr(inner, None);
                        let printable = ty.is_numeric()
                            || matches!(ty, Ty::Bool | Ty::Char | Ty::Str | Ty::Error);
                        if !printable {
                            self.error(
                                "T001",
                                format!("`{}` cannot be interpolated into a string", ty),
                                &inner.span,
                            );
                        }
                    }
                }
                Ty::Str
            }
            ast::ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_ty = self.infer_expr(cond, Some(&Ty::Bool));
                if !self.unify(&cond_ty, &Ty::Bool) {
                    self.error(
                        "T014",
                        format!("ternary condition must be `Bool`, found `{}`", cond_ty),
                        &cond.span,
                    );
                }
                let then_ty = self.infer_expr(then_expr, expected);
                let else_ty = self.infer_expr(else_expr, Some(&then_ty));
                if !self.unify(&else_ty, &then_ty) {
                    self.error(
                        "T015",
                        format!(
                            "ternary branches have mismatched types: `{}` vs `{}`",
                            then_ty, else_ty
                        ),
                        &else_expr.span,
                    );
                    return Ty::Error;
                }
                self.apply(&then_ty)
            }
            ast::ExprKind::New { class, args } => self.infer_new(class, args, &expr.span),
            ast::ExprKind::Base => match self.base_class_of_current() {
                Some(base) => Ty::Class {
                    name: base,
                    args: Vec::new(),
                },
                None => {
                    let message = match &self.current_class {
                        Some(class) => format!("class `{}` has no base class", class),
                        None => "`base` is only valid inside class methods".to_string(),
                    };
                    self.error("T076", message, &expr.span);
                    Ty::Error
                }
            },
        }
    }

    fn check_loop_target(&mut self, label: Option<&str>, what: &str, span: &ast::Span, code: &str) {
        if self.loop_labels.is_empty() {
            self.error(code, format!("`{}` outside of a loop", what), span);
            return;
        }
        if let Some(label) = label {
            let known = self
                .loop_labels
                .iter()
                .any(|l| l.as_deref() == Some(label));
            if !known {
                self.error(code, format!("unknown loop label `{}`", label), span);
            }
        }
    }

    fn base_class_of_current(&self) -> Option<String> {
        let class = self.current_class.as_ref()?;
        self.env.classes.get(class)?.base.clone()
    }

    fn infer_literal(&mut self, lit: &ast::Literal, expected: Option<&Ty>) -> Ty {
        match lit {
            ast::Literal::Int { suffix, .. } => {
                if let Some(suffix) = suffix {
                    return Ty::primitive_from_name(suffix.type_name()).unwrap_or(Ty::I32);
                }
                match expected.map(|e| self.apply(e)) {
                    Some(ty) if ty.is_numeric() => ty,
                    _ => Ty::I32,
                }
            }
            ast::Literal::Float { suffix, .. } => {
                if let Some(suffix) = suffix {
                    return Ty::primitive_from_name(suffix.type_name()).unwrap_or(Ty::F64);
                }
                match expected.map(|e| self.apply(e)) {
                    Some(ty) if ty.is_float() => ty,
                    _ => Ty::F64,
                }
            }
            ast::Literal::Bool(_) => Ty::Bool,
            ast::Literal::Str(_) => Ty::Str,
            ast::Literal::Char(_) => Ty::Char,
            ast::Literal::Null => match expected.map(|e| self.apply(e)) {
                Some(ty @ Ty::Ptr { .. }) => ty,
                _ => Ty::Ptr {
                    mutable: false,
                    inner: Box::new(Ty::Unit),
                },
            },
        }
    }

    fn infer_ident(&mut self, name: &str, span: &ast::Span) -> Ty {
        if let Some(local) = self.lookup(name) {
            return local.ty.clone();
        }
        if let Some(konst) = self.env.consts.get(name) {
            return konst.ty.clone();
        }
        if let Some(sig) = self.env.functions.get(name) {
            return sig.ty();
        }
        // Bare unit variant: `Nothing`.
        if let Some((info, idx)) = self.env.enum_for_variant(name) {
            if info.variants[idx].payload.is_empty() {
                let name = info.name.clone();
                let params = info.type_params.clone();
                let args: Vec<Ty> = params.iter().map(|_| self.fresh_var()).collect();
                return Ty::Named {
                    name,
                    module: String::new(),
                    args,
                };
            }
        }

        let mut candidates = self.visible_locals();
        candidates.extend(self.env.functions.keys().cloned());
        let suggestions = fuzzy::suggest(name, &candidates);
        let mut message = format!("undeclared variable `{}`", name);
        if let Some(best) = suggestions.first() {
            message.push_str(&format!("; did you mean `{}`?", best));
        }
        self.error("T009", message, span);
        Ty::Error
    }

    fn infer_path(&mut self, path: &ast::PathRef, span: &ast::Span) -> Ty {
        let segments = &path.segments;
        if segments.len() == 2 {
            let (head, tail) = (&segments[0], &segments[1]);
            // Enum variant path: `Maybe::Just` as a value (unit only).
            if let Some(info) = self.env.enums.get(head).cloned() {
                if let Some((_, variant)) = info.variant(tail) {
                    if variant.payload.is_empty() {
                        let args: Vec<Ty> =
                            info.type_params.iter().map(|_| self.fresh_var()).collect();
                        return Ty::Named {
                            name: info.name.clone(),
                            module: String::new(),
                            args,
                        };
                    }
                    // Payload constructors are called; as a bare value
                    // they behave like functions.
                    let args: Vec<Ty> =
                        info.type_params.iter().map(|_| self.fresh_var()).collect();
                    let map: HashMap<String, Ty> = info
                        .type_params
                        .iter()
                        .cloned()
                        .zip(args.iter().cloned())
                        .collect();
                    return Ty::Func {
                        params: variant.payload.iter().map(|p| p.substitute(&map)).collect(),
                        ret: Box::new(Ty::Named {
                            name: info.name.clone(),
                            module: String::new(),
                            args,
                        }),
                        is_async: false,
                    };
                }
                self.error(
                    "T024",
                    format!("enum `{}` has no variant `{}`", head, tail),
                    span,
                );
                return Ty::Error;
            }
        }
        self.error(
            "T009",
            format!("unresolved path `{}`", segments.join("::")),
            span,
        );
        Ty::Error
    }

    fn infer_binary(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: &ast::Span,
    ) -> Ty {
        use ast::BinaryOp::*;
        match op {
            And | Or => {
                for side in [lhs, rhs] {
                    let ty = self.infer_expr(side, Some(&Ty::Bool));
                    if !self.unify(&ty, &Ty::Bool) {
                        self.error(
                            "T001",
                            format!("`{}` requires `Bool` operands, found `{}`", op.symbol(), ty),
                            &side.span,
                        );
                    }
                }
                Ty::Bool
            }
            Eq | Ne | Lt | Le | Gt | Ge => {
                let lhs_ty = self.infer_expr(lhs, None);
                let rhs_ty = self.infer_expr(rhs, Some(&lhs_ty));
                if !self.unify(&rhs_ty, &lhs_ty) {
                    self.error(
                        "T001",
                        format!(
                            "cannot compare `{}` with `{}`",
                            self.apply(&lhs_ty),
                            rhs_ty
                        ),
                        span,
                    );
                }
                Ty::Bool
            }
            BitAnd | BitOr | BitXor | Shl | Shr => {
                let lhs_ty = self.infer_expr(lhs, None);
                let rhs_ty = self.infer_expr(rhs, Some(&lhs_ty));
                let lhs_applied = self.apply(&lhs_ty);
                if !lhs_applied.is_integer() && !lhs_applied.is_error() {
                    self.error(
                        "T001",
                        format!(
                            "`{}` requires integer operands, found `{}`",
                            op.symbol(),
                            lhs_applied
                        ),
                        &lhs.span,
                    );
                    return Ty::Error;
                }
                if !self.unify(&rhs_ty, &lhs_ty) {
                    self.error(
                        "T001",
                        format!(
                            "mismatched operands for `{}`: `{}` vs `{}`",
                            op.symbol(),
                            lhs_applied,
                            rhs_ty
                        ),
                        span,
                    );
                }
                lhs_applied
            }
            Add | Sub | Mul | Div | Rem => {
                let lhs_ty = self.infer_expr(lhs, None);
                let lhs_applied = self.apply(&lhs_ty);
                // String concatenation via `+`.
                if matches!(op, Add) && lhs_applied == Ty::Str {
                    let rhs_ty = self.infer_expr(rhs, Some(&Ty::Str));
                    if !self.unify(&rhs_ty, &Ty::Str) {
                        self.error(
                            "T001",
                            format!("cannot concatenate `Str` with `{}`", rhs_ty),
                            &rhs.span,
                        );
                    }
                    return Ty::Str;
                }
                let rhs_ty = self.infer_expr(rhs, Some(&lhs_ty));
                if !self.unify(&rhs_ty, &lhs_ty) {
                    self.error(
                        "T001",
                        format!(
                            "mismatched operands for `{}`: `{}` vs `{}`",
                            op.symbol(),
                            lhs_applied,
                            rhs_ty
                        ),
                        span,
                    );
                    return Ty::Error;
                }
                let resolved = self.apply(&lhs_ty);
                if !resolved.is_numeric() && !resolved.is_error() && !matches!(resolved, Ty::Ptr { .. } | Ty::Var(_))
                {
                    self.error(
                        "T001",
                        format!("`{}` is not defined for `{}`", op.symbol(), resolved),
                        span,
                    );
                    return Ty::Error;
                }
                resolved
            }
        }
    }

    fn infer_unary(&mut self, op: ast::UnaryOp, operand: &ast::Expr, span: &ast::Span) -> Ty {
        match op {
            ast::UnaryOp::Neg => {
                let ty = self.infer_expr(operand, None);
                if !ty.is_numeric() && !ty.is_error() && !matches!(ty, Ty::Var(_)) {
                    self.error("T001", format!("cannot negate `{}`", ty), span);
                    return Ty::Error;
                }
                ty
            }
            ast::UnaryOp::Not => {
                let ty = self.infer_expr(operand, Some(&Ty::Bool));
                if !self.unify(&ty, &Ty::Bool) {
                    self.error("T001", format!("`not` requires `Bool`, found `{}`", ty), span);
                }
                Ty::Bool
            }
            ast::UnaryOp::BitNot => {
                let ty = self.infer_expr(operand, None);
                if !ty.is_integer() && !ty.is_error() {
                    self.error("T001", format!("`~` requires an integer, found `{}`", ty), span);
                    return Ty::Error;
                }
                ty
            }
            ast::UnaryOp::Ref { mutable } => {
                let inner = self.infer_expr(operand, None);
                Ty::Ref {
                    mutable,
                    inner: Box::new(inner),
                    lifetime: None,
                }
            }
            ast::UnaryOp::Deref => {
                let ty = self.infer_expr(operand, None);
                match self.apply(&ty) {
                    Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => *inner,
                    Ty::Error => Ty::Error,
                    other => {
                        self.error(
                            "T017",
                            format!("cannot dereference non-reference type `{}`", other),
                            span,
                        );
                        Ty::Error
                    }
                }
            }
            ast::UnaryOp::PreInc | ast::UnaryOp::PreDec => {
                let ty = self.infer_expr(operand, None);
                if !ty.is_integer() && !ty.is_error() {
                    self.error(
                        "T001",
                        format!("increment/decrement requires an integer, found `{}`", ty),
                        span,
                    );
                }
                self.require_mutable_place(operand);
                ty
            }
        }
    }

    fn infer_assign(
        &mut self,
        op: ast::AssignOp,
        target: &ast::Expr,
        value: &ast::Expr,
        span: &ast::Span,
    ) -> Ty {
        let target_ty = self.infer_expr(target, None);
        self.require_mutable_place(target);
        let value_ty = self.infer_expr(value, Some(&target_ty));
        if !self.unify(&value_ty, &target_ty) {
            self.error(
                "T001",
                format!(
                    "cannot assign `{}` to a place of type `{}`",
                    value_ty,
                    self.apply(&target_ty)
                ),
                span,
            );
        }
        if !matches!(op, ast::AssignOp::Assign) {
            let resolved = self.apply(&target_ty);
            if !resolved.is_numeric() && !resolved.is_error() && resolved != Ty::Str {
                self.error(
                    "T001",
                    format!("compound assignment is not defined for `{}`", resolved),
                    span,
                );
            }
        }
        Ty::Unit
    }

    /// Assignability + `let` immutability (T013). Borrow conflicts are
    /// the borrow checker's concern.
    fn require_mutable_place(&mut self, target: &ast::Expr) {
        match &target.kind {
            ast::ExprKind::Ident(name) => {
                if let Some(local) = self.lookup(name) {
                    if !local.mutable {
                        let decl_span = local.span.clone();
                        let span = self.span(&target.span);
                        let label_span = self.span(&decl_span);
                        self.diags.emit(
                            tml_diagnostics::Diagnostic::error(
                                "T013",
                                format!("cannot assign to immutable binding `{}`", name),
                                span,
                            )
                            .with_label(label_span, "declared immutable here")
                            .with_help(format!("declare it with `var {}` to allow mutation", name)),
                        );
                    }
                } else if self.env.consts.contains_key(name) {
                    self.error(
                        "T013",
                        format!("cannot assign to constant `{}`", name),
                        &target.span,
                    );
                }
            }
            ast::ExprKind::Field { object, .. } | ast::ExprKind::Index { object, .. } => {
                self.require_mutable_place(object);
            }
            ast::ExprKind::Unary {
                op: ast::UnaryOp::Deref,
                operand,
            } => {
                let ty = self.infer_expr(operand, None);
                if let Ty::Ref { mutable: false, .. } = self.apply(&ty) {
                    self.error(
                        "T013",
                        "cannot assign through a shared reference",
                        &target.span,
                    );
                }
            }
            _ => {}
        }
    }

    // ==================== Calls ====================

    fn infer_call(
        &mut self,
        callee: &ast::Expr,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        // Named call targets get richer resolution than plain values.
        if let ast::ExprKind::Ident(name) = &callee.kind {
            return self.infer_named_call(name, type_args, args, span, &callee.span);
        }
        if let ast::ExprKind::Path(path) = &callee.kind {
            return self.infer_path_call(path, type_args, args, span);
        }

        let callee_ty = self.infer_expr(callee, None);
        self.check_value_call(&callee_ty, args, span)
    }

    fn check_value_call(&mut self, callee_ty: &Ty, args: &[ast::Expr], span: &ast::Span) -> Ty {
        match self.apply(callee_ty) {
            Ty::Func { params, ret, .. } | Ty::Closure { params, ret } => {
                if params.len() != args.len() {
                    self.error(
                        "T004",
                        format!(
                            "this call takes {} argument{} but {} {} supplied",
                            params.len(),
                            if params.len() == 1 { "" } else { "s" },
                            args.len(),
                            if args.len() == 1 { "was" } else { "were" }
                        ),
                        span,
                    );
                    return *ret;
                }
                for (arg, param) in args.iter().zip(&params) {
                    let arg_ty = self.infer_expr(arg, Some(param));
                    self.expect_type(&arg_ty, param, &arg.span, "in argument");
                }
                *ret
            }
            Ty::Error => Ty::Error,
            other => {
                self.error(
                    "T010",
                    format!("expression of type `{}` is not callable", other),
                    span,
                );
                Ty::Error
            }
        }
    }

    fn infer_named_call(
        &mut self,
        name: &str,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
        callee_span: &ast::Span,
    ) -> Ty {
        // Locals holding closures/function pointers shadow functions.
        if let Some(local) = self.lookup(name) {
            let ty = local.ty.clone();
            return self.check_value_call(&ty, args, span);
        }

        // Enum variant constructor: `Just(x)`, `Ok(v)`, user variants.
        if let Some((info, idx)) = self.env.enum_for_variant(name) {
            let info = info.clone();
            return self.infer_variant_ctor(&info, idx, type_args, args, span);
        }

        if let Some(sig) = self.env.functions.get(name).cloned() {
            return self.infer_sig_call(&sig, type_args, args, span);
        }

        let mut candidates: Vec<String> = self.env.functions.keys().cloned().collect();
        candidates.extend(self.visible_locals());
        let suggestions = fuzzy::suggest(name, &candidates);
        let mut message = format!("unknown function `{}`", name);
        if let Some(best) = suggestions.first() {
            message.push_str(&format!("; did you mean `{}`?", best));
        }
        self.error("T003", message, callee_span);
        for arg in args {
            self.infer_expr(arg, None);
        }
        Ty::Error
    }

    pub(crate) fn infer_variant_ctor(
        &mut self,
        info: &crate::env::EnumInfo,
        variant_idx: usize,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        let variant = &info.variants[variant_idx];
        if variant.payload.len() != args.len() {
            self.error(
                "T034",
                format!(
                    "variant `{}` takes {} value{} but {} {} supplied",
                    variant.name,
                    variant.payload.len(),
                    if variant.payload.len() == 1 { "" } else { "s" },
                    args.len(),
                    if args.len() == 1 { "was" } else { "were" }
                ),
                span,
            );
        }

        let enum_args: Vec<Ty> = if !type_args.is_empty() {
            type_args.iter().map(|t| self.resolve_type(t)).collect()
        } else {
            info.type_params.iter().map(|_| self.fresh_var()).collect()
        };
        let map: HashMap<String, Ty> = info
            .type_params
            .iter()
            .cloned()
            .zip(enum_args.iter().cloned())
            .collect();

        for (arg, payload) in args.iter().zip(&variant.payload) {
            let expected = payload.substitute(&map);
            let arg_ty = self.infer_expr(arg, Some(&expected));
            self.expect_type(&arg_ty, &expected, &arg.span, "in variant payload");
        }

        Ty::Named {
            name: info.name.clone(),
            module: String::new(),
            args: enum_args.iter().map(|a| self.apply(a)).collect(),
        }
    }

    pub(crate) fn infer_sig_call(
        &mut self,
        sig: &FuncSig,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        if sig.params.len() != args.len() {
            self.error(
                "T004",
                format!(
                    "`{}` takes {} argument{} but {} {} supplied",
                    sig.name,
                    sig.params.len(),
                    if sig.params.len() == 1 { "" } else { "s" },
                    args.len(),
                    if args.len() == 1 { "was" } else { "were" }
                ),
                span,
            );
            return sig.ret.clone();
        }

        if sig.generics.is_empty() {
            for (arg, (_, param_ty)) in args.iter().zip(&sig.params) {
                let arg_ty = self.infer_expr(arg, Some(param_ty));
                self.expect_type(&arg_ty, param_ty, &arg.span, "in argument");
            }
            return sig.ret.clone();
        }

        // Generic call: seed parameters from explicit type arguments,
        // fresh variables otherwise, then unify against each argument.
        let mut map: HashMap<String, Ty> = HashMap::new();
        for (i, g) in sig.generics.iter().enumerate() {
            let ty = match type_args.get(i) {
                Some(t) => self.resolve_type(t),
                None => self.fresh_var(),
            };
            map.insert(g.name.clone(), ty);
        }

        for (arg, (_, param_ty)) in args.iter().zip(&sig.params) {
            let expected = param_ty.substitute(&map);
            let arg_ty = self.infer_expr(arg, Some(&expected));
            self.expect_type(&arg_ty, &expected, &arg.span, "in argument");
        }

        // Check behavior bounds on the deduced arguments.
        for g in &sig.generics {
            let deduced = self.apply(&map[&g.name]);
            for bound in &g.bounds {
                let satisfied = match &deduced {
                    Ty::Named { name, .. } | Ty::Class { name, .. } => {
                        self.env.implements(name, bound)
                    }
                    Ty::Var(_) | Ty::Error => true,
                    _ => bound == "Copy" || bound == "Printable",
                };
                if !satisfied {
                    self.error(
                        "T025",
                        format!(
                            "`{}` does not implement behavior `{}` required by `{}`",
                            deduced, bound, sig.name
                        ),
                        span,
                    );
                }
            }
        }

        let ret = sig.ret.substitute(&map);
        let ret = self.apply(&ret);
        if ret.contains_var() {
            self.error(
                "T007",
                format!(
                    "cannot infer type arguments for `{}`; annotate them explicitly",
                    sig.name
                ),
                span,
            );
            return Ty::Error;
        }
        ret
    }

    fn infer_path_call(
        &mut self,
        path: &ast::PathRef,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        let segments = &path.segments;
        if segments.len() == 2 {
            let (head, tail) = (segments[0].clone(), segments[1].clone());

            // Primitive static methods: `I32::default()` etc.
            if let Some(prim) = Ty::primitive_from_name(&head) {
                return self.infer_primitive_static(&prim, &tail, args, span);
            }

            // Enum variant constructor through its type.
            if let Some(info) = self.env.enums.get(&head).cloned() {
                if let Some((idx, _)) = info.variant(&tail) {
                    return self.infer_variant_ctor(&info, idx, type_args, args, span);
                }
                self.error(
                    "T024",
                    format!("enum `{}` has no variant `{}`", head, tail),
                    span,
                );
                return Ty::Error;
            }

            // Class or struct static method.
            if self.env.classes.contains_key(&head) {
                if let Some((_, method)) = self.env.find_class_method(&head, &tail) {
                    if !method.is_static {
                        self.error(
                            "T078",
                            format!("method `{}` on class `{}` is not static", tail, head),
                            span,
                        );
                    }
                    return self.infer_sig_call(&method.sig, type_args, args, span);
                }
                self.error(
                    "T078",
                    format!("class `{}` has no method `{}`", head, tail),
                    span,
                );
                return Ty::Error;
            }
            if self.env.structs.contains_key(&head) {
                if let Some(sig) = self.env.inherent_method(&head, &tail).cloned() {
                    return self.infer_sig_call(&sig, type_args, args, span);
                }
                self.error(
                    "T006",
                    format!("`{}` has no associated function `{}`", head, tail),
                    span,
                );
                return Ty::Error;
            }

            // Imported module function: `mathx::square(3)`.
            if let Some(sig) = self.env.functions.get(&tail).cloned() {
                if sig.module == head || self.imports.get(&tail) == Some(&head) {
                    return self.infer_sig_call(&sig, type_args, args, span);
                }
            }
        }

        self.error(
            "T003",
            format!("unknown function `{}`", segments.join("::")),
            span,
        );
        for arg in args {
            self.infer_expr(arg, None);
        }
        Ty::Error
    }

    fn infer_primitive_static(
        &mut self,
        prim: &Ty,
        method: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        match method {
            "default" | "zero" | "one" | "min_value" | "max_value" => {
                if !args.is_empty() {
                    self.error(
                        "T004",
                        format!("`{}::{}` takes no arguments", prim, method),
                        span,
                    );
                }
                prim.clone()
            }
            "from" => {
                if args.len() != 1 {
                    self.error("T004", format!("`{}::from` takes one argument", prim), span);
                    return prim.clone();
                }
                let arg_ty = self.infer_expr(&args[0], None);
                if !arg_ty.is_numeric() && !arg_ty.is_error() {
                    self.error(
                        "T001",
                        format!("`{}::from` requires a numeric argument, found `{}`", prim, arg_ty),
                        &args[0].span,
                    );
                }
                prim.clone()
            }
            _ => {
                self.error(
                    "T006",
                    format!("`{}` has no static method `{}`", prim, method),
                    span,
                );
                Ty::Error
            }
        }
    }

    // ==================== try / new / closures ====================

    fn infer_try(&mut self, inner: &ast::Expr, span: &ast::Span) -> Ty {
        let inner_ty = self.infer_expr(inner, None);
        let applied = self.apply(&inner_ty);
        let (ctor, value_ty) = match &applied {
            Ty::Named { name, args, .. } if name == "Maybe" && args.len() == 1 => {
                ("Maybe", args[0].clone())
            }
            Ty::Named { name, args, .. } if name == "Outcome" && args.len() == 2 => {
                ("Outcome", args[0].clone())
            }
            Ty::Error => return Ty::Error,
            other => {
                self.error(
                    "T033",
                    format!(
                        "the try operator `!` requires `Maybe[T]` or `Outcome[T, E]`, found `{}`",
                        other
                    ),
                    span,
                );
                return Ty::Error;
            }
        };

        // The surrounding function must return the same shape.
        let ret = self.current_ret.clone().unwrap_or(Ty::Unit);
        let ret_ok = match (&self.apply(&ret), ctor) {
            (Ty::Named { name, .. }, "Maybe") if name == "Maybe" => true,
            (Ty::Named { name, .. }, "Outcome") if name == "Outcome" => true,
            (Ty::Error, _) => true,
            _ => false,
        };
        if !ret_ok {
            self.error_with_help(
                "T033",
                format!(
                    "`!` propagates to the caller, but this function returns `{}`",
                    self.apply(&ret)
                ),
                span,
                format!("change the return type to `{}[…]`", ctor),
            );
        }
        value_ty
    }

    fn infer_new(&mut self, class: &ast::PathRef, args: &[ast::Expr], span: &ast::Span) -> Ty {
        let name = class.last().to_string();
        let Some(info) = self.env.classes.get(&name).cloned() else {
            let candidates: Vec<String> = self.env.classes.keys().cloned().collect();
            let suggestions = fuzzy::suggest(&name, &candidates);
            let mut message = format!("unknown class `{}` in `new` expression", name);
            if let Some(best) = suggestions.first() {
                message.push_str(&format!("; did you mean `{}`?", best));
            }
            self.error("T066", message, span);
            for arg in args {
                self.infer_expr(arg, None);
            }
            return Ty::Error;
        };

        if info.is_abstract {
            self.error_with_help(
                "T040",
                format!("cannot instantiate abstract class `{}`", name),
                span,
                "instantiate a concrete subclass instead",
            );
        }

        let type_args: Vec<Ty> = class.type_args.iter().map(|t| self.resolve_type(t)).collect();

        // Constructor: the `init` method when present; otherwise `new`
        // takes one argument per own field without a default.
        if let Some(ctor) = info.method("init") {
            self.infer_sig_call(&ctor.sig.clone(), &[], args, span);
        } else {
            let required: Vec<_> = info
                .fields
                .iter()
                .filter(|f| !f.has_default)
                .cloned()
                .collect();
            if !args.is_empty() && args.len() != required.len() {
                self.error(
                    "T004",
                    format!(
                        "`new {}` takes {} argument{} but {} {} supplied",
                        name,
                        required.len(),
                        if required.len() == 1 { "" } else { "s" },
                        args.len(),
                        if args.len() == 1 { "was" } else { "were" }
                    ),
                    span,
                );
            }
            for (arg, field) in args.iter().zip(&required) {
                let arg_ty = self.infer_expr(arg, Some(&field.ty));
                self.expect_type(&arg_ty, &field.ty, &arg.span, "in constructor argument");
            }
        }

        Ty::Class {
            name,
            args: type_args,
        }
    }

    fn infer_closure(
        &mut self,
        params: &[(ast::Pattern, Option<ast::TypeExpr>)],
        return_type: Option<&ast::TypeExpr>,
        body: &ast::Expr,
        expected: Option<&Ty>,
    ) -> Ty {
        // Parameter types come from annotations, the expected function
        // type, or fresh variables.
        let expected_fn = expected.map(|e| self.apply(e));
        let expected_params: Option<Vec<Ty>> = match &expected_fn {
            Some(Ty::Func { params, .. }) | Some(Ty::Closure { params, .. }) => {
                Some(params.clone())
            }
            _ => None,
        };

        let mut param_tys = Vec::new();
        self.push_scope();
        for (i, (pattern, annotation)) in params.iter().enumerate() {
            let ty = match annotation {
                Some(t) => self.resolve_type(t),
                None => expected_params
                    .as_ref()
                    .and_then(|ps| ps.get(i).cloned())
                    .unwrap_or_else(|| self.fresh_var()),
            };
            if let ast::Pattern::Ident { name, mutable, span, .. } = pattern {
                self.bind(name, ty.clone(), *mutable, span.clone());
            }
            param_tys.push(ty);
        }

        let declared_ret = return_type.map(|t| self.resolve_type(t));
        let saved_ret = self.current_ret.clone();
        if let Some(ret) = &declared_ret {
            self.current_ret = Some(ret.clone());
        }
        let body_ty = self.infer_expr(body, declared_ret.as_ref());
        self.current_ret = saved_ret;
        self.pop_scope();

        let ret = declared_ret.unwrap_or(body_ty);
        Ty::Closure {
            params: param_tys.iter().map(|p| self.apply(p)).collect(),
            ret: Box::new(self.apply(&ret)),
        }
    }

    // ==================== Field / index ====================

    pub(crate) fn infer_field(
        &mut self,
        object: &ast::Expr,
        field: &str,
        span: &ast::Span,
    ) -> Ty {
        let object_ty = self.infer_expr(object, None);
        let base = self.apply(&object_ty);
        self.field_type_of(&base, field, span)
    }

    pub(crate) fn field_type_of(&mut self, base: &Ty, field: &str, span: &ast::Span) -> Ty {
        let base = base.deref_all().clone();
        match &base {
            Ty::Tuple(elems) => match field.parse::<usize>() {
                Ok(idx) if idx < elems.len() => elems[idx].clone(),
                _ => {
                    self.error(
                        "T005",
                        format!("tuple of {} elements has no field `{}`", elems.len(), field),
                        span,
                    );
                    Ty::Error
                }
            },
            Ty::Named { name, args, .. } => {
                if let Some(info) = self.env.structs.get(name).cloned() {
                    let map: HashMap<String, Ty> = info
                        .type_params
                        .iter()
                        .cloned()
                        .zip(args.iter().cloned())
                        .collect();
                    if let Some(f) = info.fields.iter().find(|f| f.name == field) {
                        return f.ty.substitute(&map);
                    }
                    // Smart-pointer auto-deref: look through the payload.
                    if is_smart_pointer(name) && args.len() == 1 {
                        return self.field_type_of(&args[0].clone(), field, span);
                    }
                    let candidates: Vec<String> =
                        info.fields.iter().map(|f| f.name.clone()).collect();
                    let suggestions = fuzzy::suggest(field, &candidates);
                    let mut message =
                        format!("struct `{}` has no field `{}`", name, field);
                    if let Some(best) = suggestions.first() {
                        message.push_str(&format!("; did you mean `{}`?", best));
                    }
                    self.error("T005", message, span);
                    return Ty::Error;
                }
                if let Some(info) = self.env.unions.get(name).cloned() {
                    if let Some(f) = info.fields.iter().find(|f| f.name == field) {
                        return f.ty.clone();
                    }
                    self.error(
                        "T059",
                        format!("union `{}` has no field `{}`", name, field),
                        span,
                    );
                    return Ty::Error;
                }
                if is_smart_pointer(name) && args.len() == 1 {
                    return self.field_type_of(&args[0].clone(), field, span);
                }
                self.error(
                    "T005",
                    format!("type `{}` has no field `{}`", base, field),
                    span,
                );
                Ty::Error
            }
            Ty::Class { name, .. } => {
                for f in self.env.all_class_fields(name) {
                    if f.name == field {
                        return f.ty;
                    }
                }
                if let Some(info) = self.env.classes.get(name) {
                    if let Some(p) = info.properties.iter().find(|p| p.name == field) {
                        return p.ty.clone();
                    }
                }
                self.error(
                    "T073",
                    format!("class `{}` has no field `{}`", name, field),
                    span,
                );
                Ty::Error
            }
            Ty::Ptr { inner, .. } => {
                let inner_ty = (**inner).clone();
                match self.field_type_of(&inner_ty, field, span) {
                    Ty::Error => {
                        self.error(
                            "T074",
                            format!("no field `{}` reachable through pointer", field),
                            span,
                        );
                        Ty::Error
                    }
                    ok => ok,
                }
            }
            Ty::Error => Ty::Error,
            other => {
                self.error(
                    "T005",
                    format!("type `{}` has no field `{}`", other, field),
                    span,
                );
                Ty::Error
            }
        }
    }

    fn infer_index(&mut self, object: &ast::Expr, index: &ast::Expr, span: &ast::Span) -> Ty {
        let object_ty = self.infer_expr(object, None);
        let index_ty = self.infer_expr(index, Some(&Ty::I64));
        if !index_ty.is_integer() && !index_ty.is_error() && !matches!(index_ty, Ty::Var(_)) {
            self.error(
                "T001",
                format!("index must be an integer, found `{}`", index_ty),
                &index.span,
            );
        }
        match self.apply(&object_ty).deref_all() {
            Ty::Array { elem, .. } | Ty::Slice { elem } => (**elem).clone(),
            Ty::Str => Ty::Char,
            Ty::Ptr { inner, .. } => (**inner).clone(),
            Ty::Error => Ty::Error,
            other => {
                self.error(
                    "T001",
                    format!("type `{}` cannot be indexed", other),
                    span,
                );
                Ty::Error
            }
        }
    }

    // ==================== Struct literals ====================

    fn infer_struct_lit(
        &mut self,
        path: &ast::PathRef,
        fields: &[(String, ast::Expr)],
        base: Option<&ast::Expr>,
        span: &ast::Span,
    ) -> Ty {
        let name = path.last().to_string();
        let Some(info) = self.env.structs.get(&name).cloned() else {
            if self.env.unions.contains_key(&name) {
                return self.infer_union_lit(&name, fields, span);
            }
            self.error("T022", format!("unknown struct `{}`", name), span);
            for (_, value) in fields {
                self.infer_expr(value, None);
            }
            return Ty::Error;
        };

        let args: Vec<Ty> = info.type_params.iter().map(|_| self.fresh_var()).collect();
        let map: HashMap<String, Ty> = info
            .type_params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();

        let mut seen: Vec<&str> = Vec::new();
        for (field_name, value) in fields {
            match info.fields.iter().find(|f| &f.name == field_name) {
                Some(f) => {
                    let expected = f.ty.substitute(&map);
                    let value_ty = self.infer_expr(value, Some(&expected));
                    self.expect_type(&value_ty, &expected, &value.span, "in field initializer");
                    seen.push(field_name);
                }
                None => {
                    self.error(
                        "T059",
                        format!("struct `{}` has no field `{}`", name, field_name),
                        &value.span,
                    );
                    self.infer_expr(value, None);
                }
            }
        }

        if let Some(base_expr) = base {
            let expected = Ty::Named {
                name: name.clone(),
                module: String::new(),
                args: args.clone(),
            };
            let base_ty = self.infer_expr(base_expr, Some(&expected));
            if !self.unify(&base_ty, &expected) {
                self.error(
                    "T062",
                    format!(
                        "struct update base must be `{}`, found `{}`",
                        expected, base_ty
                    ),
                    &base_expr.span,
                );
            }
        } else {
            for f in &info.fields {
                if !f.has_default && !seen.contains(&f.name.as_str()) {
                    self.error(
                        "T061",
                        format!("missing field `{}` in `{}` literal", f.name, name),
                        span,
                    );
                }
            }
        }

        Ty::Named {
            name,
            module: String::new(),
            args: args.iter().map(|a| self.apply(a)).collect(),
        }
    }

    fn infer_union_lit(
        &mut self,
        name: &str,
        fields: &[(String, ast::Expr)],
        span: &ast::Span,
    ) -> Ty {
        if fields.len() != 1 {
            self.error(
                "T060",
                format!(
                    "union literal `{}` must initialize exactly one field, found {}",
                    name,
                    fields.len()
                ),
                span,
            );
        }
        let info = self.env.unions.get(name).cloned();
        for (field_name, value) in fields {
            match info
                .as_ref()
                .and_then(|u| u.fields.iter().find(|f| &f.name == field_name))
            {
                Some(f) => {
                    let expected = f.ty.clone();
                    let value_ty = self.infer_expr(value, Some(&expected));
                    self.expect_type(&value_ty, &expected, &value.span, "in union initializer");
                }
                None => {
                    self.error(
                        "T059",
                        format!("union `{}` has no field `{}`", name, field_name),
                        &value.span,
                    );
                    self.infer_expr(value, None);
                }
            }
        }
        Ty::named(name)
    }

    // ==================== Iteration ====================

    pub(crate) fn iterable_element(&mut self, iter: &ast::Expr) -> Ty {
        let iter_ty = self.infer_expr(iter, None);
        match self.apply(&iter_ty).deref_all() {
            Ty::Array { elem, .. } | Ty::Slice { elem } => (**elem).clone(),
            Ty::Named { name, args, .. } if name == "Range" && args.len() == 1 => args[0].clone(),
            Ty::Named { name, .. } => {
                // Anything with a `next(this) -> Maybe[T]` method.
                let name = name.clone();
                if let Some((_, sig)) = self.env.behavior_method(&name, "next") {
                    if let Ty::Named { name: m, args, .. } = &sig.ret {
                        if m == "Maybe" && args.len() == 1 {
                            return args[0].clone();
                        }
                    }
                }
                if let Some(sig) = self.env.inherent_method(&name, "next") {
                    if let Ty::Named { name: m, args, .. } = &sig.ret {
                        if m == "Maybe" && args.len() == 1 {
                            return args[0].clone();
                        }
                    }
                }
                self.error(
                    "T050",
                    format!("`{}` is not iterable (no `next` returning `Maybe[T]`)", name),
                    &iter.span,
                );
                Ty::Error
            }
            Ty::Error => Ty::Error,
            other => {
                self.error(
                    "T050",
                    format!("`{}` is not iterable", other),
                    &iter.span,
                );
                Ty::Error
            }
        }
    }
}

pub(crate) use crate::typeck_is_smart_pointer as is_smart_pointer;
