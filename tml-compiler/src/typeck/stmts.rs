// Function bodies, statements, patterns, and method-call resolution.

use super::TypeChecker;
use crate::env::MethodInfo;
use crate::ty::Ty;
use crate::typeck::infer::is_smart_pointer;
use std::collections::HashMap;
use tml_ast as ast;
use tml_diagnostics::fuzzy;

impl<'a> TypeChecker<'a> {
    pub(crate) fn check_func_body(
        &mut self,
        f: &ast::FuncDecl,
        impl_ctx: Option<(&str, &[ast::GenericParam])>,
    ) {
        let Some(body) = &f.body else {
            return;
        };

        let saved_generics = self.generic_scope.clone();
        if let Some((_, impl_generics)) = impl_ctx {
            for g in impl_generics {
                self.generic_scope.push(g.name.clone());
            }
        }
        for g in &f.generics {
            self.generic_scope.push(g.name.clone());
        }

        let saved_async = self.in_async;
        self.in_async = f.is_async;
        let saved_ret = self.current_ret.clone();
        let ret = f
            .return_type
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(Ty::Unit);
        self.current_ret = Some(ret.clone());

        self.push_scope();
        for param in &f.params {
            let bindings = param.pattern.bindings();
            let name = bindings.first().map(|s| s.to_string());
            let Some(name) = name else { continue };
            let ty = if name == "this" {
                match impl_ctx {
                    Some((self_name, _)) => self.self_receiver_type(self_name),
                    None => match &self.current_class {
                        Some(class) => Ty::Class {
                            name: class.clone(),
                            args: Vec::new(),
                        },
                        None => Ty::named("This"),
                    },
                }
            } else {
                self.resolve_type(&param.ty)
            };
            let mutable = matches!(&param.pattern, ast::Pattern::Ident { mutable: true, .. });
            self.bind(&name, ty, mutable, param.span.clone());
        }

        self.check_block(body);

        // Non-Unit functions must return on every path.
        if ret != Ty::Unit && !ret.is_error() && !self.block_diverges(body) {
            self.error_with_help(
                "T029",
                format!(
                    "function `{}` returns `{}` but not all paths return a value",
                    f.name, ret
                ),
                &f.span,
                "add a `return` at the end of the function",
            );
        }

        self.pop_scope();
        self.current_ret = saved_ret;
        self.in_async = saved_async;
        self.generic_scope = saved_generics;
    }

    fn self_receiver_type(&self, self_name: &str) -> Ty {
        if self.env.classes.contains_key(self_name) {
            Ty::Class {
                name: self_name.to_string(),
                args: Vec::new(),
            }
        } else {
            let params = self
                .env
                .structs
                .get(self_name)
                .map(|s| s.type_params.clone())
                .or_else(|| self.env.enums.get(self_name).map(|e| e.type_params.clone()))
                .unwrap_or_default();
            Ty::Named {
                name: self_name.to_string(),
                module: String::new(),
                args: params.iter().map(|p| Ty::named(p)).collect(),
            }
        }
    }

    pub(crate) fn check_method_body(&mut self, class: &ast::ClassDecl, method: &ast::FuncDecl) {
        let saved_generics = self.generic_scope.clone();
        for g in &class.generics {
            self.generic_scope.push(g.name.clone());
        }
        self.check_func_body(method, None);
        self.generic_scope = saved_generics;
    }

    pub(crate) fn check_property_body(&mut self, class: &ast::ClassDecl, property: &ast::Property) {
        let ty = self.resolve_type(&property.ty);
        let class_ty = Ty::Class {
            name: class.name.clone(),
            args: Vec::new(),
        };

        if let Some(getter) = &property.getter {
            let saved_ret = self.current_ret.replace(ty.clone());
            self.push_scope();
            self.bind("this", class_ty.clone(), false, property.span.clone());
            self.check_block(getter);
            if !self.block_diverges(getter) {
                self.error(
                    "T029",
                    format!("property `{}` getter must return a value", property.name),
                    &property.span,
                );
            }
            self.pop_scope();
            self.current_ret = saved_ret;
        }
        if let Some(setter) = &property.setter {
            let saved_ret = self.current_ret.replace(Ty::Unit);
            self.push_scope();
            self.bind("this", class_ty, false, property.span.clone());
            self.bind("value", ty, false, property.span.clone());
            self.check_block(setter);
            self.pop_scope();
            self.current_ret = saved_ret;
        }
    }

    // ==================== Blocks & statements ====================

    pub(crate) fn check_block(&mut self, block: &ast::Block) {
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
    }

    /// Like `check_block` but yields the value of a trailing expression
    /// statement (used for closure bodies and block expressions).
    pub(crate) fn check_block_value(
        &mut self,
        block: &ast::Block,
        expected: Option<&Ty>,
    ) -> Ty {
        let Some((last, init)) = block.stmts.split_last() else {
            return Ty::Unit;
        };
        for stmt in init {
            self.check_stmt(stmt);
        }
        match last {
            ast::Stmt::Expr(expr) => self.infer_expr(expr, expected),
            other => {
                self.check_stmt(other);
                Ty::Unit
            }
        }
    }

    pub(crate) fn check_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Let {
                pattern,
                ty,
                value,
                span,
            } => {
                let annotation = ty.as_ref().map(|t| self.resolve_type(t));
                let value_ty = self.infer_expr(value, annotation.as_ref());
                let bound_ty = match &annotation {
                    Some(expected) => {
                        self.expect_type(&value_ty, expected, &value.span, "in let binding")
                    }
                    None => value_ty,
                };
                if !pattern.is_irrefutable() && !matches!(pattern, ast::Pattern::Enum { .. }) {
                    self.error(
                        "T035",
                        "let bindings require an irrefutable pattern",
                        span,
                    );
                }
                if matches!(pattern, ast::Pattern::Enum { .. }) {
                    self.error_with_help(
                        "T035",
                        "refutable pattern in `let` binding",
                        span,
                        "use `let … else { … }` to handle the non-matching case",
                    );
                }
                self.check_pattern(pattern, &bound_ty, false);
            }
            ast::Stmt::LetElse {
                pattern,
                ty,
                value,
                else_block,
                ..
            } => {
                let annotation = ty.as_ref().map(|t| self.resolve_type(t));
                let value_ty = self.infer_expr(value, annotation.as_ref());
                let bound_ty = match &annotation {
                    Some(expected) => {
                        self.expect_type(&value_ty, expected, &value.span, "in let binding")
                    }
                    None => value_ty,
                };
                // The else block runs without the bindings and must leave.
                self.push_scope();
                self.check_block(else_block);
                self.pop_scope();
                if !self.block_diverges(else_block) {
                    self.error_with_help(
                        "T029",
                        "the `else` block of `let … else` must diverge",
                        &else_block.span,
                        "end it with `return`, `break`, `continue`, or `panic(…)`",
                    );
                }
                self.check_pattern(pattern, &bound_ty, false);
            }
            ast::Stmt::Var {
                name,
                ty,
                value,
                span,
            } => {
                let annotation = ty.as_ref().map(|t| self.resolve_type(t));
                let value_ty = self.infer_expr(value, annotation.as_ref());
                let bound_ty = match &annotation {
                    Some(expected) => {
                        self.expect_type(&value_ty, expected, &value.span, "in var binding")
                    }
                    None => value_ty,
                };
                self.bind(name, bound_ty, true, span.clone());
            }
            ast::Stmt::Expr(expr) => {
                self.infer_expr(expr, None);
            }
            ast::Stmt::Decl(decl) => {
                // Nested declarations join the environment late.
                self.collect_decls(std::slice::from_ref(decl.as_ref()), "");
                if let ast::Decl::Func(f) = decl.as_ref() {
                    self.check_func_body(f, None);
                }
            }
        }
    }

    // ==================== Patterns ====================

    /// Bind and validate a pattern against the scrutinee type.
    pub(crate) fn check_pattern(&mut self, pattern: &ast::Pattern, ty: &Ty, force_mut: bool) {
        let ty = self.apply(ty);
        match pattern {
            ast::Pattern::Wildcard { .. } => {}
            ast::Pattern::Ident {
                name,
                mutable,
                span,
                ..
            } => {
                self.bind(name, ty, *mutable || force_mut, span.clone());
            }
            ast::Pattern::Literal { value, span } => {
                let lit_ty = self.infer_literal_for_pattern(value);
                if !self.unify(&lit_ty, &ty) {
                    self.error(
                        "T035",
                        format!(
                            "pattern of type `{}` cannot match scrutinee of type `{}`",
                            lit_ty, ty
                        ),
                        span,
                    );
                }
            }
            ast::Pattern::Tuple { elems, span } => match &ty {
                Ty::Tuple(elem_tys) => {
                    if elems.len() != elem_tys.len() {
                        self.error(
                            "T036",
                            format!(
                                "tuple pattern has {} elements but the value has {}",
                                elems.len(),
                                elem_tys.len()
                            ),
                            span,
                        );
                        return;
                    }
                    for (p, t) in elems.iter().zip(elem_tys) {
                        self.check_pattern(p, t, force_mut);
                    }
                }
                Ty::Error => {}
                other => {
                    self.error(
                        "T068",
                        format!("tuple pattern on non-tuple type `{}`", other),
                        span,
                    );
                }
            },
            ast::Pattern::Struct {
                path,
                fields,
                span,
                ..
            } => {
                let name = path.last().to_string();
                let struct_name = match &ty {
                    Ty::Named { name: n, .. } => n.clone(),
                    Ty::Error => return,
                    other => {
                        self.error(
                            "T070",
                            format!("struct pattern on non-struct type `{}`", other),
                            span,
                        );
                        return;
                    }
                };
                if name != struct_name {
                    self.error(
                        "T035",
                        format!(
                            "pattern names `{}` but the scrutinee is `{}`",
                            name, struct_name
                        ),
                        span,
                    );
                }
                let info = self.env.structs.get(&struct_name).cloned();
                let args = match &ty {
                    Ty::Named { args, .. } => args.clone(),
                    _ => Vec::new(),
                };
                for (field_name, sub) in fields {
                    let field_ty = match &info {
                        Some(info) => {
                            let map: HashMap<String, Ty> = info
                                .type_params
                                .iter()
                                .cloned()
                                .zip(args.iter().cloned())
                                .collect();
                            match info.fields.iter().find(|f| &f.name == field_name) {
                                Some(f) => f.ty.substitute(&map),
                                None => {
                                    self.error(
                                        "T072",
                                        format!(
                                            "struct `{}` has no field `{}` (in pattern)",
                                            struct_name, field_name
                                        ),
                                        &sub.span(),
                                    );
                                    Ty::Error
                                }
                            }
                        }
                        None => Ty::Error,
                    };
                    self.check_pattern(sub, &field_ty, force_mut);
                }
            }
            ast::Pattern::Enum {
                path,
                variant,
                args: sub_patterns,
                span,
            } => {
                let enum_name = match &ty {
                    Ty::Named { name, .. } => name.clone(),
                    Ty::Error => {
                        for p in sub_patterns {
                            self.check_pattern(p, &Ty::Error, force_mut);
                        }
                        return;
                    }
                    other => {
                        self.error(
                            "T069",
                            format!("enum pattern on non-enum type `{}`", other),
                            span,
                        );
                        return;
                    }
                };
                if !path.segments.is_empty() {
                    let named = path.last();
                    if named != enum_name {
                        self.error(
                            "T023",
                            format!(
                                "pattern names enum `{}` but the scrutinee is `{}`",
                                named, enum_name
                            ),
                            span,
                        );
                    }
                }
                let Some(info) = self.env.enums.get(&enum_name).cloned() else {
                    self.error("T023", format!("unknown enum type `{}`", enum_name), span);
                    return;
                };
                let ty_args = match &ty {
                    Ty::Named { args, .. } => args.clone(),
                    _ => Vec::new(),
                };
                let Some((_, variant_info)) = info.variant(variant) else {
                    self.error(
                        "T024",
                        format!("enum `{}` has no variant `{}`", enum_name, variant),
                        span,
                    );
                    return;
                };
                if variant_info.payload.len() != sub_patterns.len() {
                    self.error(
                        "T034",
                        format!(
                            "variant `{}` has {} value{} but the pattern binds {}",
                            variant,
                            variant_info.payload.len(),
                            if variant_info.payload.len() == 1 { "" } else { "s" },
                            sub_patterns.len()
                        ),
                        span,
                    );
                    return;
                }
                let map: HashMap<String, Ty> = info
                    .type_params
                    .iter()
                    .cloned()
                    .zip(ty_args.iter().cloned())
                    .collect();
                for (p, payload) in sub_patterns.iter().zip(&variant_info.payload) {
                    let payload_ty = payload.substitute(&map);
                    self.check_pattern(p, &payload_ty, force_mut);
                }
            }
            ast::Pattern::Or { alts, .. } => {
                // Alternatives bind the same names (parser-enforced);
                // bind once from the first and validate all.
                for (i, alt) in alts.iter().enumerate() {
                    if i == 0 {
                        self.check_pattern(alt, &ty, force_mut);
                    } else {
                        // Validate without rebinding: a throwaway scope.
                        self.push_scope();
                        self.check_pattern(alt, &ty, force_mut);
                        self.pop_scope();
                    }
                }
            }
            ast::Pattern::Range {
                start, end, span, ..
            } => {
                let start_ty = self.infer_literal_for_pattern(start);
                let end_ty = self.infer_literal_for_pattern(end);
                if !self.unify(&start_ty, &ty) || !self.unify(&end_ty, &ty) {
                    self.error(
                        "T035",
                        format!("range pattern does not match scrutinee type `{}`", ty),
                        span,
                    );
                }
            }
        }
    }

    fn infer_literal_for_pattern(&mut self, lit: &ast::Literal) -> Ty {
        match lit {
            ast::Literal::Int { .. } => self.fresh_var(), // any integer width
            ast::Literal::Float { .. } => Ty::F64,
            ast::Literal::Bool(_) => Ty::Bool,
            ast::Literal::Str(_) => Ty::Str,
            ast::Literal::Char(_) => Ty::Char,
            ast::Literal::Null => Ty::Ptr {
                mutable: false,
                inner: Box::new(Ty::Unit),
            },
        }
    }

    // ==================== when ====================

    pub(crate) fn infer_when(
        &mut self,
        scrutinee: &ast::Expr,
        arms: &[ast::WhenArm],
        span: &ast::Span,
        expected: Option<&Ty>,
    ) -> Ty {
        let scrutinee_ty = self.infer_expr(scrutinee, None);
        let mut result: Option<Ty> = None;

        for arm in arms {
            self.push_scope();
            self.check_pattern(&arm.pattern, &scrutinee_ty, false);
            if let Some(guard) = &arm.guard {
                let guard_ty = self.infer_expr(guard, Some(&Ty::Bool));
                if !self.unify(&guard_ty, &Ty::Bool) {
                    self.error(
                        "T014",
                        format!("when guard must be `Bool`, found `{}`", guard_ty),
                        &guard.span,
                    );
                }
            }
            let body_ty = self.infer_expr(&arm.body, expected.or(result.as_ref()));
            self.pop_scope();

            match &result {
                None => result = Some(body_ty),
                Some(prev) => {
                    // Unit-typed arms (diverging `return` bodies) mix freely.
                    if !self.unify(&body_ty, prev)
                        && body_ty != Ty::Unit
                        && *prev != Ty::Unit
                    {
                        self.error(
                            "T015",
                            format!(
                                "when arms have mismatched types: `{}` vs `{}`",
                                prev, body_ty
                            ),
                            &arm.body.span,
                        );
                    }
                }
            }
        }

        self.check_exhaustive(&scrutinee_ty, arms, span);
        result.map(|t| self.apply(&t)).unwrap_or(Ty::Unit)
    }

    // ==================== Method calls ====================

    pub(crate) fn infer_method_call(
        &mut self,
        receiver: &ast::Expr,
        method: &str,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        let receiver_ty = self.infer_expr(receiver, None);
        let base = self.apply(&receiver_ty).deref_all().clone();

        match &base {
            Ty::Array { .. } | Ty::Slice { .. } => match method {
                "len" => {
                    self.expect_no_args(args, "len", span);
                    Ty::I64
                }
                _ => {
                    self.error(
                        "T006",
                        format!("`{}` has no method `{}`", base, method),
                        span,
                    );
                    Ty::Error
                }
            },
            Ty::Str => match method {
                "len" => {
                    self.expect_no_args(args, "len", span);
                    Ty::I64
                }
                "duplicate" => {
                    self.expect_no_args(args, "duplicate", span);
                    Ty::Str
                }
                _ => {
                    self.error(
                        "T006",
                        format!("`Str` has no method `{}`", method),
                        span,
                    );
                    Ty::Error
                }
            },
            Ty::Ptr { inner, mutable } => {
                self.infer_pointer_method(inner, *mutable, method, args, span)
            }
            Ty::Named { name, args: ty_args, .. } => {
                let name = name.clone();
                let ty_args = ty_args.clone();
                // Ranges iterate.
                if name == "Range" && method == "next" && ty_args.len() == 1 {
                    return Ty::maybe(ty_args[0].clone());
                }
                self.infer_named_method(&base, &name, &ty_args, method, type_args, args, span)
            }
            Ty::Class { name, .. } => {
                let name = name.clone();
                match self.env.find_class_method(&name, method) {
                    Some((_, info)) => self.infer_class_method_call(&info, args, span),
                    None => {
                        // Property getters are called without parens via
                        // field syntax; methods missing entirely:
                        let chain_methods: Vec<String> = self
                            .env
                            .class_chain(&name)
                            .iter()
                            .flat_map(|c| c.methods.iter().map(|m| m.sig.name.clone()))
                            .collect();
                        let suggestions = fuzzy::suggest(method, &chain_methods);
                        let mut message =
                            format!("class `{}` has no method `{}`", name, method);
                        if let Some(best) = suggestions.first() {
                            message.push_str(&format!("; did you mean `{}`?", best));
                        }
                        self.error("T078", message, span);
                        Ty::Error
                    }
                }
            }
            Ty::DynBehavior { behavior, .. } => {
                let behavior = behavior.clone();
                match self
                    .env
                    .behaviors
                    .get(&behavior)
                    .and_then(|b| b.method(method))
                    .cloned()
                {
                    Some(bm) => {
                        let sig = bm.sig.clone();
                        self.check_method_args(&sig, args, span);
                        sig.ret.clone()
                    }
                    None => {
                        self.error(
                            "T079",
                            format!("behavior `{}` has no method `{}`", behavior, method),
                            span,
                        );
                        Ty::Error
                    }
                }
            }
            Ty::Closure { .. } | Ty::Func { .. } if method == "call" => {
                self.check_value_call_like(&base, args, span)
            }
            Ty::Error => Ty::Error,
            other => {
                self.error(
                    "T006",
                    format!("type `{}` has no method `{}`", other, method),
                    span,
                );
                Ty::Error
            }
        }
    }

    fn check_value_call_like(&mut self, ty: &Ty, args: &[ast::Expr], span: &ast::Span) -> Ty {
        match ty {
            Ty::Func { params, ret, .. } | Ty::Closure { params, ret } => {
                if params.len() != args.len() {
                    self.error(
                        "T004",
                        format!(
                            "this call takes {} arguments but {} were supplied",
                            params.len(),
                            args.len()
                        ),
                        span,
                    );
                }
                for (arg, param) in args.iter().zip(params) {
                    let arg_ty = self.infer_expr(arg, Some(param));
                    self.expect_type(&arg_ty, param, &arg.span, "in argument");
                }
                (**ret).clone()
            }
            _ => Ty::Error,
        }
    }

    fn infer_named_method(
        &mut self,
        base: &Ty,
        name: &str,
        ty_args: &[Ty],
        method: &str,
        _explicit_type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        // Inherent impls first, then behavior impls (defaults fill in).
        let found = self
            .env
            .inherent_method(name, method)
            .cloned()
            .or_else(|| self.env.behavior_method(name, method).map(|(_, sig)| sig));

        if let Some(sig) = found {
            // Map the defining type's parameters onto the receiver's
            // arguments so `Stack[I32].push` expects an `I32`.
            let type_params = self
                .env
                .structs
                .get(name)
                .map(|s| s.type_params.clone())
                .or_else(|| self.env.enums.get(name).map(|e| e.type_params.clone()))
                .unwrap_or_default();
            let map: HashMap<String, Ty> = type_params
                .into_iter()
                .zip(ty_args.iter().cloned())
                .collect();
            let mut sig = sig.clone();
            for (_, param_ty) in sig.params.iter_mut() {
                *param_ty = param_ty.substitute(&map);
            }
            sig.ret = sig.ret.substitute(&map);
            self.check_method_args(&sig, args, span);
            return sig.ret;
        }

        // Smart pointers forward methods to their payload.
        if is_smart_pointer(name) && ty_args.len() == 1 {
            if let Ty::Named { name: inner, args: inner_args, .. } = ty_args[0].deref_all().clone()
            {
                return self.infer_named_method(
                    &ty_args[0].clone(),
                    &inner,
                    &inner_args,
                    method,
                    _explicit_type_args,
                    args,
                    span,
                );
            }
        }

        let mut pool: Vec<String> = self
            .env
            .impls
            .iter()
            .filter(|i| i.self_name == name)
            .flat_map(|i| i.methods.iter().map(|m| m.name.clone()))
            .collect();
        pool.sort();
        pool.dedup();
        let suggestions = fuzzy::suggest(method, &pool);
        let mut message = format!("`{}` has no method `{}`", base, method);
        if let Some(best) = suggestions.first() {
            message.push_str(&format!("; did you mean `{}`?", best));
        }
        self.error("T006", message, span);
        Ty::Error
    }

    fn infer_class_method_call(
        &mut self,
        info: &MethodInfo,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        self.check_method_args(&info.sig, args, span);
        info.sig.ret.clone()
    }

    /// Check call arguments against a method signature whose first
    /// parameter is the receiver.
    pub(crate) fn check_method_args(
        &mut self,
        sig: &crate::env::FuncSig,
        args: &[ast::Expr],
        span: &ast::Span,
    ) {
        let expected: Vec<&(String, Ty)> = sig
            .params
            .iter()
            .filter(|(name, _)| name != "this")
            .collect();
        if expected.len() != args.len() {
            self.error(
                "T004",
                format!(
                    "`{}` takes {} argument{} but {} {} supplied",
                    sig.name,
                    expected.len(),
                    if expected.len() == 1 { "" } else { "s" },
                    args.len(),
                    if args.len() == 1 { "was" } else { "were" }
                ),
                span,
            );
            return;
        }
        for (arg, (_, param_ty)) in args.iter().zip(expected) {
            let arg_ty = self.infer_expr(arg, Some(param_ty));
            self.expect_type(&arg_ty, param_ty, &arg.span, "in argument");
        }
    }

    fn infer_pointer_method(
        &mut self,
        inner: &Ty,
        mutable: bool,
        method: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> Ty {
        match method {
            "read" => {
                if !args.is_empty() {
                    self.error("T080", "pointer `read()` takes no arguments", span);
                }
                (*inner).clone()
            }
            "write" => {
                if args.len() != 1 {
                    self.error(
                        "T081",
                        "pointer `write()` requires exactly one argument",
                        span,
                    );
                    return Ty::Unit;
                }
                if !mutable {
                    self.error(
                        "T013",
                        "cannot `write` through an immutable pointer",
                        span,
                    );
                }
                let expected = (*inner).clone();
                let arg_ty = self.infer_expr(&args[0], Some(&expected));
                if !self.unify(&arg_ty, &expected) {
                    self.error(
                        "T057",
                        format!(
                            "pointer write expects `{}`, found `{}`",
                            expected, arg_ty
                        ),
                        &args[0].span,
                    );
                }
                Ty::Unit
            }
            "is_null" => {
                if !args.is_empty() {
                    self.error("T082", "pointer `is_null()` takes no arguments", span);
                }
                Ty::Bool
            }
            "offset" => {
                if args.len() != 1 {
                    self.error(
                        "T083",
                        "pointer `offset()` requires exactly one argument",
                        span,
                    );
                } else {
                    let arg_ty = self.infer_expr(&args[0], Some(&Ty::I64));
                    if !arg_ty.is_integer() && !arg_ty.is_error() {
                        self.error(
                            "T057",
                            format!("pointer offset must be an integer, found `{}`", arg_ty),
                            &args[0].span,
                        );
                    }
                }
                Ty::Ptr {
                    mutable,
                    inner: Box::new((*inner).clone()),
                }
            }
            _ => {
                self.error(
                    "T084",
                    format!("unknown pointer method `{}`", method),
                    span,
                );
                Ty::Error
            }
        }
    }

    fn expect_no_args(&mut self, args: &[ast::Expr], method: &str, span: &ast::Span) {
        if !args.is_empty() {
            self.error(
                "T004",
                format!("`{}` takes no arguments", method),
                span,
            );
        }
    }

    // ==================== Divergence ====================

    pub(crate) fn block_diverges(&self, block: &ast::Block) -> bool {
        block
            .stmts
            .last()
            .map(|s| self.stmt_diverges(s))
            .unwrap_or(false)
    }

    fn stmt_diverges(&self, stmt: &ast::Stmt) -> bool {
        match stmt {
            ast::Stmt::Expr(e) => self.expr_diverges(e),
            _ => false,
        }
    }

    pub(crate) fn expr_diverges(&self, expr: &ast::Expr) -> bool {
        match &expr.kind {
            ast::ExprKind::Return(_) | ast::ExprKind::Break { .. } | ast::ExprKind::Continue { .. } => {
                true
            }
            ast::ExprKind::Call { callee, .. } => matches!(
                &callee.kind,
                ast::ExprKind::Ident(name) if name == "panic" || name == "exit"
            ),
            ast::ExprKind::Loop { body, .. } => {
                // An infinite loop with no break diverges.
                !block_contains_break(body)
            }
            ast::ExprKind::If {
                then_block,
                else_branch,
                ..
            } => match else_branch {
                Some(else_expr) => {
                    self.block_diverges(then_block) && self.expr_diverges(else_expr)
                }
                None => false,
            },
            ast::ExprKind::Block(block) => self.block_diverges(block),
            ast::ExprKind::When { arms, .. } => {
                !arms.is_empty() && arms.iter().all(|arm| self.expr_diverges(&arm.body))
            }
            _ => false,
        }
    }
}

fn block_contains_break(block: &ast::Block) -> bool {
    block.stmts.iter().any(|s| match s {
        ast::Stmt::Expr(e) => expr_contains_break(e),
        _ => false,
    })
}

fn expr_contains_break(expr: &ast::Expr) -> bool {
    match &expr.kind {
        ast::ExprKind::Break { .. } => true,
        ast::ExprKind::If {
            then_block,
            else_branch,
            ..
        } => {
            block_contains_break(then_block)
                || else_branch
                    .as_ref()
                    .map(|e| expr_contains_break(e))
                    .unwrap_or(false)
        }
        ast::ExprKind::Block(block) => block_contains_break(block),
        ast::ExprKind::When { arms, .. } => arms.iter().any(|a| expr_contains_break(&a.body)),
        // Nested loops swallow their own breaks.
        ast::ExprKind::Loop { .. } | ast::ExprKind::While { .. } | ast::ExprKind::For { .. } => {
            false
        }
        _ => false,
    }
}
