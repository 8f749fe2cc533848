// Expression type inference inside the IR generator. The checker has
// already validated the module; this pass answers "what type does this
// lower to" using locals, the environment, and the active substitution.

use super::LlvmIrGen;
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn infer_expr_ty(&mut self, expr: &ast::Expr) -> Ty {
        match &expr.kind {
            ast::ExprKind::Literal(lit) => match lit {
                ast::Literal::Int { suffix, .. } => suffix
                    .as_ref()
                    .and_then(|s| Ty::primitive_from_name(s.type_name()))
                    .unwrap_or(Ty::I32),
                ast::Literal::Float { suffix, .. } => suffix
                    .as_ref()
                    .and_then(|s| Ty::primitive_from_name(s.type_name()))
                    .unwrap_or(Ty::F64),
                ast::Literal::Bool(_) => Ty::Bool,
                ast::Literal::Str(_) => Ty::Str,
                ast::Literal::Char(_) => Ty::Char,
                ast::Literal::Null => Ty::Ptr {
                    mutable: false,
                    inner: Box::new(Ty::Unit),
                },
            },
            ast::ExprKind::Ident(name) => {
                if let Some(local) = self.locals.get(name) {
                    return local.sem.clone();
                }
                if let Some(konst) = self.env.consts.get(name) {
                    return konst.ty.clone();
                }
                if let Some(sig) = self.env.functions.get(name) {
                    return sig.ty();
                }
                if let Some((info, idx)) = self.env.enum_for_variant(name) {
                    if info.variants[idx].payload.is_empty() {
                        let args =
                            vec![Ty::Unit; info.type_params.len()];
                        return Ty::Named {
                            name: info.name.clone(),
                            module: String::new(),
                            args,
                        };
                    }
                }
                Ty::Error
            }
            ast::ExprKind::Path(path) => {
                if path.segments.len() == 2 {
                    if let Some(info) = self.env.enums.get(&path.segments[0]) {
                        let args = vec![Ty::Unit; info.type_params.len()];
                        return Ty::Named {
                            name: info.name.clone(),
                            module: String::new(),
                            args,
                        };
                    }
                }
                Ty::Error
            }
            ast::ExprKind::Binary { op, lhs, rhs } => {
                use ast::BinaryOp::*;
                match op {
                    Eq | Ne | Lt | Le | Gt | Ge | And | Or => Ty::Bool,
                    _ => {
                        let l = self.infer_expr_ty(lhs);
                        if l.is_error() {
                            self.infer_expr_ty(rhs)
                        } else {
                            l
                        }
                    }
                }
            }
            ast::ExprKind::Unary { op, operand } => match op {
                ast::UnaryOp::Not => Ty::Bool,
                ast::UnaryOp::Ref { mutable } => Ty::Ref {
                    mutable: *mutable,
                    inner: Box::new(self.infer_expr_ty(operand)),
                    lifetime: None,
                },
                ast::UnaryOp::Deref => match self.infer_expr_ty(operand) {
                    Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => *inner,
                    other => other,
                },
                _ => self.infer_expr_ty(operand),
            },
            ast::ExprKind::Assign { .. } => Ty::Unit,
            ast::ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.infer_call_ty(callee, type_args, args),
            ast::ExprKind::MethodCall {
                receiver, method, ..
            } => self.infer_method_ret(receiver, method),
            ast::ExprKind::Field { object, field } => {
                let base = self.infer_expr_ty(object);
                self.field_sem_ty(&base, field).unwrap_or(Ty::Error)
            }
            ast::ExprKind::Index { object, .. } => {
                match self.infer_expr_ty(object).deref_all() {
                    Ty::Array { elem, .. } | Ty::Slice { elem } => (**elem).clone(),
                    Ty::Str => Ty::Char,
                    Ty::Ptr { inner, .. } => (**inner).clone(),
                    _ => Ty::Error,
                }
            }
            ast::ExprKind::If {
                then_block,
                else_branch,
                ..
            } => {
                let then_ty = self.block_value_ty(then_block);
                if then_ty == Ty::Unit {
                    if let Some(else_expr) = else_branch {
                        return self.infer_expr_ty(else_expr);
                    }
                }
                then_ty
            }
            ast::ExprKind::Block(block) => self.block_value_ty(block),
            ast::ExprKind::When { arms, .. } => arms
                .iter()
                .map(|arm| self.infer_expr_ty(&arm.body))
                .find(|t| *t != Ty::Unit && !t.is_error())
                .unwrap_or(Ty::Unit),
            ast::ExprKind::StructLit { path, .. } => {
                // Generic arguments are re-derived at the literal itself
                // during lowering.
                Ty::Named {
                    name: path.last().to_string(),
                    module: String::new(),
                    args: Vec::new(),
                }
            }
            ast::ExprKind::Tuple(elems) => {
                if elems.is_empty() {
                    Ty::Unit
                } else {
                    Ty::Tuple(elems.iter().map(|e| self.infer_expr_ty(e)).collect())
                }
            }
            ast::ExprKind::Array(elems) => {
                let elem = elems
                    .first()
                    .map(|e| self.infer_expr_ty(e))
                    .unwrap_or(Ty::I32);
                Ty::Array {
                    elem: Box::new(elem),
                    size: elems.len() as u64,
                }
            }
            ast::ExprKind::ArrayRepeat { elem, count } => {
                let elem_ty = self.infer_expr_ty(elem);
                let size = match &count.kind {
                    ast::ExprKind::Literal(ast::Literal::Int { value, .. }) => *value as u64,
                    _ => 0,
                };
                Ty::Array {
                    elem: Box::new(elem_ty),
                    size,
                }
            }
            ast::ExprKind::Closure { params, return_type, body, .. } => {
                let param_tys: Vec<Ty> = params
                    .iter()
                    .map(|(_, ann)| {
                        ann.as_ref()
                            .map(|t| self.resolve_type_expr(t))
                            .unwrap_or(Ty::I32)
                    })
                    .collect();
                let ret = return_type
                    .as_ref()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or_else(|| self.infer_expr_ty(body));
                Ty::Closure {
                    params: param_tys,
                    ret: Box::new(ret),
                }
            }
            ast::ExprKind::Range { start, .. } => Ty::Named {
                name: "Range".to_string(),
                module: String::new(),
                args: vec![self.infer_expr_ty(start)],
            },
            ast::ExprKind::Cast { ty, .. } => self.resolve_type_expr(ty),
            ast::ExprKind::Is { .. } => Ty::Bool,
            ast::ExprKind::Try(inner) => match self.infer_expr_ty(inner) {
                Ty::Named { name, args, .. } if name == "Maybe" && args.len() == 1 => {
                    args[0].clone()
                }
                Ty::Named { name, args, .. } if name == "Outcome" && args.len() == 2 => {
                    args[0].clone()
                }
                _ => Ty::Error,
            },
            ast::ExprKind::Await(inner) => self.infer_expr_ty(inner),
            ast::ExprKind::InterpolatedString(_) => Ty::Str,
            ast::ExprKind::Ternary { then_expr, .. } => self.infer_expr_ty(then_expr),
            ast::ExprKind::New { class, .. } => Ty::Class {
                name: class.last().to_string(),
                args: class
                    .type_args
                    .iter()
                    .map(|t| self.resolve_type_expr(t))
                    .collect(),
            },
            ast::ExprKind::Base => match self
                .this_class
                .as_ref()
                .and_then(|c| self.env.classes.get(c))
                .and_then(|c| c.base.clone())
            {
                Some(base) => Ty::Class {
                    name: base,
                    args: Vec::new(),
                },
                None => Ty::Error,
            },
            ast::ExprKind::Return(_)
            | ast::ExprKind::Break { .. }
            | ast::ExprKind::Continue { .. } => Ty::Unit,
            ast::ExprKind::Loop { .. }
            | ast::ExprKind::While { .. }
            | ast::ExprKind::For { .. } => Ty::Unit,
        }
    }

    pub(crate) fn block_value_ty(&mut self, block: &ast::Block) -> Ty {
        match block.stmts.last() {
            Some(ast::Stmt::Expr(expr)) => self.infer_expr_ty(expr),
            _ => Ty::Unit,
        }
    }

    fn infer_call_ty(
        &mut self,
        callee: &ast::Expr,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
    ) -> Ty {
        match &callee.kind {
            ast::ExprKind::Ident(name) => {
                if let Some(local) = self.locals.get(name) {
                    if let Ty::Func { ret, .. } | Ty::Closure { ret, .. } = &local.sem {
                        return (**ret).clone();
                    }
                }
                if let Some((info, idx)) = self.env.enum_for_variant(name) {
                    let info = info.clone();
                    return self.variant_result_ty(&info, idx, type_args, args);
                }
                if let Some(sig) = self.env.functions.get(name).cloned() {
                    if sig.generics.is_empty() {
                        return sig.ret.clone();
                    }
                    let subst = self.deduce_generic_args(&sig, type_args, args);
                    return sig.ret.substitute(&subst);
                }
                Ty::Error
            }
            ast::ExprKind::Path(path) if path.segments.len() == 2 => {
                let (head, tail) = (path.segments[0].clone(), path.segments[1].clone());
                if let Some(prim) = Ty::primitive_from_name(&head) {
                    return prim;
                }
                if let Some(info) = self.env.enums.get(&head).cloned() {
                    if let Some((idx, _)) = info.variant(&tail) {
                        return self.variant_result_ty(&info, idx, type_args, args);
                    }
                }
                if let Some((_, method)) = self.env.find_class_method(&head, &tail) {
                    return method.sig.ret.clone();
                }
                if let Some(sig) = self.env.inherent_method(&head, &tail) {
                    return sig.ret.clone();
                }
                if let Some(sig) = self.env.functions.get(&tail) {
                    return sig.ret.clone();
                }
                Ty::Error
            }
            _ => match self.infer_expr_ty(callee) {
                Ty::Func { ret, .. } | Ty::Closure { ret, .. } => (*ret).clone(),
                _ => Ty::Error,
            },
        }
    }

    pub(crate) fn variant_result_ty(
        &mut self,
        info: &crate::env::EnumInfo,
        variant_idx: usize,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
    ) -> Ty {
        let mut enum_args: Vec<Ty> = if !type_args.is_empty() {
            type_args.iter().map(|t| self.resolve_type_expr(t)).collect()
        } else {
            vec![Ty::Unit; info.type_params.len()]
        };

        // Deduce unannotated arguments from the payload expressions.
        if type_args.is_empty() {
            let variant = &info.variants[variant_idx];
            for (payload, arg) in variant.payload.iter().zip(args) {
                if let Ty::Named { name, args: pa, .. } = payload {
                    if pa.is_empty() {
                        if let Some(pos) =
                            info.type_params.iter().position(|p| p == name)
                        {
                            enum_args[pos] = self.infer_expr_ty(arg);
                        }
                    }
                }
            }
        }

        Ty::Named {
            name: info.name.clone(),
            module: String::new(),
            args: enum_args,
        }
    }

    /// Deduce a generic function's type arguments at a call site: use
    /// explicit brackets when present, otherwise match declaration
    /// parameter shapes against the argument types.
    pub(crate) fn deduce_generic_args(
        &mut self,
        sig: &crate::env::FuncSig,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
    ) -> HashMap<String, Ty> {
        let mut map = HashMap::new();
        for (i, g) in sig.generics.iter().enumerate() {
            if let Some(t) = type_args.get(i) {
                map.insert(g.name.clone(), self.resolve_type_expr(t));
            }
        }
        if map.len() == sig.generics.len() {
            return map;
        }
        for ((_, param_ty), arg) in sig.params.iter().zip(args) {
            let arg_ty = self.infer_expr_ty(arg);
            bind_type_params(param_ty, &arg_ty, &sig.generics, &mut map);
        }
        // Anything left unbound defaults to Unit; the checker has
        // already diagnosed T007 for return-position escapes.
        for g in &sig.generics {
            map.entry(g.name.clone()).or_insert(Ty::Unit);
        }
        map
    }

    fn infer_method_ret(&mut self, receiver: &ast::Expr, method: &str) -> Ty {
        let recv = self.infer_expr_ty(receiver);
        match recv.deref_all() {
            Ty::Array { .. } | Ty::Slice { .. } if method == "len" => Ty::I64,
            Ty::Str if method == "len" => Ty::I64,
            Ty::Str if method == "duplicate" => Ty::Str,
            Ty::Ptr { inner, mutable } => match method {
                "read" => (**inner).clone(),
                "write" => Ty::Unit,
                "is_null" => Ty::Bool,
                "offset" => Ty::Ptr {
                    mutable: *mutable,
                    inner: inner.clone(),
                },
                _ => Ty::Error,
            },
            Ty::Named { name, args, .. } => {
                if name == "Range" && method == "next" {
                    return Ty::maybe(args.first().cloned().unwrap_or(Ty::I64));
                }
                let type_params = self
                    .env
                    .structs
                    .get(name)
                    .map(|s| s.type_params.clone())
                    .or_else(|| self.env.enums.get(name).map(|e| e.type_params.clone()))
                    .unwrap_or_default();
                let map = self.param_map(&type_params, args);
                if let Some(sig) = self.env.inherent_method(name, method) {
                    return sig.ret.substitute(&map);
                }
                if let Some((_, sig)) = self.env.behavior_method(name, method) {
                    return sig.ret.substitute(&map);
                }
                Ty::Error
            }
            Ty::Class { name, .. } => self
                .env
                .find_class_method(name, method)
                .map(|(_, m)| m.sig.ret)
                .unwrap_or(Ty::Error),
            Ty::DynBehavior { behavior, .. } => self
                .env
                .behaviors
                .get(behavior)
                .and_then(|b| b.method(method))
                .map(|m| m.sig.ret.clone())
                .unwrap_or(Ty::Error),
            _ => Ty::Error,
        }
    }

    /// Field type through the environment; mirrors the checker's lookup
    /// with smart-pointer auto-deref.
    pub(crate) fn field_sem_ty(&mut self, base: &Ty, field: &str) -> Option<Ty> {
        match base.deref_all() {
            Ty::Tuple(elems) => field.parse::<usize>().ok().and_then(|i| elems.get(i).cloned()),
            Ty::Named { name, args, .. } => {
                if let Some(info) = self.env.structs.get(name).cloned() {
                    let map = self.param_map(&info.type_params, args);
                    if let Some(f) = info.fields.iter().find(|f| f.name == field) {
                        return Some(f.ty.substitute(&map));
                    }
                }
                if let Some(info) = self.env.unions.get(name).cloned() {
                    return info
                        .fields
                        .iter()
                        .find(|f| f.name == field)
                        .map(|f| f.ty.clone());
                }
                if crate::typeck_is_smart_pointer(name) && args.len() == 1 {
                    let inner = args[0].clone();
                    return self.field_sem_ty(&inner, field);
                }
                None
            }
            Ty::Class { name, .. } => self
                .env
                .all_class_fields(name)
                .into_iter()
                .find(|f| f.name == field)
                .map(|f| f.ty),
            Ty::Ptr { inner, .. } => {
                let inner = (**inner).clone();
                self.field_sem_ty(&inner, field)
            }
            _ => None,
        }
    }
}

/// Structural matcher binding generic parameter names to concrete types.
pub(crate) fn bind_type_params(
    param: &Ty,
    arg: &Ty,
    generics: &[crate::env::GenericSig],
    map: &mut HashMap<String, Ty>,
) {
    match (param, arg) {
        (Ty::Named { name, args: pa, .. }, _)
            if pa.is_empty() && generics.iter().any(|g| &g.name == name) =>
        {
            map.entry(name.clone()).or_insert_with(|| arg.clone());
        }
        (
            Ty::Named { name: pn, args: pa, .. },
            Ty::Named { name: an, args: aa, .. },
        ) if pn == an => {
            for (p, a) in pa.iter().zip(aa) {
                bind_type_params(p, a, generics, map);
            }
        }
        (Ty::Ref { inner: p, .. }, Ty::Ref { inner: a, .. })
        | (Ty::Ptr { inner: p, .. }, Ty::Ptr { inner: a, .. })
        | (Ty::Slice { elem: p }, Ty::Slice { elem: a })
        | (Ty::Array { elem: p, .. }, Ty::Array { elem: a, .. }) => {
            bind_type_params(p, a, generics, map);
        }
        (Ty::Tuple(ps), Ty::Tuple(aas)) => {
            for (p, a) in ps.iter().zip(aas) {
                bind_type_params(p, a, generics, map);
            }
        }
        (
            Ty::Func { params: pp, ret: pr, .. },
            Ty::Func { params: ap, ret: ar, .. },
        )
        | (
            Ty::Func { params: pp, ret: pr, .. },
            Ty::Closure { params: ap, ret: ar },
        ) => {
            for (p, a) in pp.iter().zip(ap) {
                bind_type_params(p, a, generics, map);
            }
            bind_type_params(pr, ar, generics, map);
        }
        _ => {}
    }
}
