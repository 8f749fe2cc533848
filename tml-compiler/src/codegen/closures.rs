// Closure lowering. Plain function references are thin `{ fn, null }`
// fat pointers. Capturing closures synthesize an environment struct and
// a trampoline whose first parameter rebuilds the captures; non-move
// closures capture the *slots* (by reference) so writes are visible to
// the enclosing frame, while `move` closures snapshot by value into a
// heap environment that can outlive the frame.

use super::{CgResult, LlvmIrGen, VarInfo};
use crate::ty::Ty;
use std::collections::BTreeMap;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn gen_closure(
        &mut self,
        is_move: bool,
        params: &[(ast::Pattern, Option<ast::TypeExpr>)],
        return_type: Option<&ast::TypeExpr>,
        body: &ast::Expr,
    ) -> CgResult<String> {
        self.closure_counter += 1;
        let closure_id = self.closure_counter;
        let fn_name = format!("closure_{}", closure_id);

        // Parameter types.
        let mut param_names = Vec::new();
        let mut param_sems = Vec::new();
        for (pattern, annotation) in params {
            let name = pattern
                .bindings()
                .first()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "_".to_string());
            let sem = annotation
                .as_ref()
                .map(|t| self.resolve_type_expr(t))
                .unwrap_or(Ty::I32);
            param_names.push(name);
            param_sems.push(sem);
        }

        // Captures: free identifiers that name enclosing locals.
        let mut bound: Vec<String> = param_names.clone();
        let mut captures: BTreeMap<String, VarInfo> = BTreeMap::new();
        collect_free_idents(body, &mut bound, &mut |name| {
            if let Some(info) = self.locals.get(name) {
                captures.entry(name.to_string()).or_insert_with(|| info.clone());
            }
        });

        let ret_sem = return_type
            .map(|t| self.resolve_type_expr(t))
            .unwrap_or_else(|| self.infer_expr_ty(body));
        let ret_llvm = if ret_sem == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&ret_sem)
        };

        // Environment struct: pointers to slots (by-ref) or values
        // (move).
        let capture_list: Vec<(String, VarInfo)> = captures.into_iter().collect();
        let env_ty_name = format!("%struct.closure_env_{}", closure_id);
        let env_ptr = if capture_list.is_empty() {
            None
        } else {
            let field_tys: Vec<String> = capture_list
                .iter()
                .map(|(_, info)| {
                    if is_move {
                        info.llvm_ty.clone()
                    } else {
                        "ptr".to_string()
                    }
                })
                .collect();
            self.type_defs.push_str(&format!(
                "{} = type {{ {} }}\n",
                env_ty_name,
                field_tys.join(", ")
            ));

            let env = if is_move {
                // Heap environment survives the frame.
                let size: u64 = capture_list
                    .iter()
                    .map(|(_, info)| {
                        let sem = info.sem.clone();
                        self.size_of(&sem)
                    })
                    .sum();
                self.runtime("malloc");
                let raw = self.fresh_reg();
                self.emit_line(format!("  {} = call ptr @malloc(i64 {})", raw, size.max(8)));
                raw
            } else {
                let slot = self.fresh_reg();
                self.emit_line(format!("  {} = alloca {}", slot, env_ty_name));
                slot
            };

            for (i, (name, info)) in capture_list.iter().enumerate() {
                let field_ptr = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                    field_ptr, env_ty_name, env, i
                ));
                if is_move {
                    let value = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = load {}, ptr {}",
                        value, info.llvm_ty, info.ptr
                    ));
                    self.emit_line(format!(
                        "  store {} {}, ptr {}",
                        info.llvm_ty, value, field_ptr
                    ));
                } else {
                    // Capture the slot address itself.
                    self.emit_line(format!("  store ptr {}, ptr {}", info.ptr, field_ptr));
                }
                let _ = name;
            }
            Some(env)
        };

        // Emit the trampoline as a sibling function.
        self.emit_closure_fn(
            &fn_name,
            &env_ty_name,
            &capture_list,
            is_move,
            &param_names,
            &param_sems,
            &ret_sem,
            &ret_llvm,
            body,
        )?;

        // Build the fat pointer value.
        let env_value = env_ptr.unwrap_or_else(|| "null".to_string());
        let with_fn = self.fresh_reg();
        self.emit_line(format!(
            "  {} = insertvalue {{ ptr, ptr }} poison, ptr @tml_{}, 0",
            with_fn, fn_name
        ));
        let fat = self.fresh_reg();
        self.emit_line(format!(
            "  {} = insertvalue {{ ptr, ptr }} {}, ptr {}, 1",
            fat, with_fn, env_value
        ));

        self.set_last(
            Ty::Closure {
                params: param_sems,
                ret: Box::new(ret_sem),
            },
            "{ ptr, ptr }",
        );
        Ok(fat)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_closure_fn(
        &mut self,
        fn_name: &str,
        env_ty_name: &str,
        captures: &[(String, VarInfo)],
        is_move: bool,
        param_names: &[String],
        param_sems: &[Ty],
        ret_sem: &Ty,
        ret_llvm: &str,
        body: &ast::Expr,
    ) -> CgResult<()> {
        // Stash the current function's emission state.
        let saved_out = std::mem::take(&mut self.out);
        let saved_locals = std::mem::take(&mut self.locals);
        let saved_tmp = self.tmp;
        let saved_label = self.label;
        let saved_terminated = self.block_terminated;
        let saved_fn = self.current_fn.clone();
        let saved_ret_ty = self.current_ret_ty.clone();
        let saved_ret_sem = self.current_ret_sem.clone();
        let saved_drops = std::mem::take(&mut self.scope_drops);
        let saved_loops = std::mem::take(&mut self.loop_stack);

        self.tmp = 0;
        self.label = 0;
        self.block_terminated = false;
        self.current_fn = fn_name.to_string();
        self.current_ret_ty = ret_llvm.to_string();
        self.current_ret_sem = ret_sem.clone();

        let mut header_params = Vec::new();
        if !captures.is_empty() {
            header_params.push("ptr %env".to_string());
        }
        let mut param_llvms = Vec::new();
        for (name, sem) in param_names.iter().zip(param_sems) {
            let llvm_ty = self.llvm_type(sem);
            header_params.push(format!("{} %{}", llvm_ty, name));
            param_llvms.push(llvm_ty);
        }

        self.emit_line(format!(
            "define internal {} @tml_{}({}) {{",
            ret_llvm,
            fn_name,
            header_params.join(", ")
        ));
        self.emit_line("entry:");

        // Reconstruct captures from the environment.
        for (i, (name, info)) in captures.iter().enumerate() {
            let field_ptr = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr %env, i32 0, i32 {}",
                field_ptr, env_ty_name, i
            ));
            let slot = if is_move {
                // The env field is the storage itself.
                field_ptr
            } else {
                let loaded = self.fresh_reg();
                self.emit_line(format!("  {} = load ptr, ptr {}", loaded, field_ptr));
                loaded
            };
            self.locals.insert(
                name.clone(),
                VarInfo {
                    ptr: slot,
                    llvm_ty: info.llvm_ty.clone(),
                    sem: info.sem.clone(),
                    is_fat_closure: info.is_fat_closure,
                    direct: false,
                },
            );
        }

        // Parameters spill into slots.
        self.push_drop_scope();
        for (name, (sem, llvm_ty)) in param_names
            .iter()
            .zip(param_sems.iter().zip(&param_llvms))
        {
            let slot = self.fresh_reg();
            self.emit_line(format!("  {} = alloca {}", slot, llvm_ty));
            self.emit_line(format!("  store {} %{}, ptr {}", llvm_ty, name, slot));
            self.locals.insert(
                name.clone(),
                VarInfo {
                    ptr: slot,
                    llvm_ty: llvm_ty.clone(),
                    sem: sem.clone(),
                    is_fat_closure: llvm_ty == "{ ptr, ptr }",
                    direct: false,
                },
            );
        }

        let body_value = self.gen_expr(body)?;
        if !self.block_terminated {
            if ret_llvm == "void" {
                self.emit_line("  ret void");
            } else if body_value.is_empty() {
                self.emit_line(format!(
                    "  ret {} {}",
                    ret_llvm,
                    super::zero_value_of(ret_llvm)
                ));
            } else {
                self.emit_line(format!("  ret {} {}", ret_llvm, body_value));
            }
        }
        self.pop_drop_scope();
        self.emit_line("}");
        self.emit_line("");

        let text = std::mem::take(&mut self.out);
        self.emit_to_funcs(text);

        // Restore the suspended function.
        self.out = saved_out;
        self.locals = saved_locals;
        self.tmp = saved_tmp;
        self.label = saved_label;
        self.block_terminated = saved_terminated;
        self.current_fn = saved_fn;
        self.current_ret_ty = saved_ret_ty;
        self.current_ret_sem = saved_ret_sem;
        self.scope_drops = saved_drops;
        self.loop_stack = saved_loops;
        Ok(())
    }
}

/// Walk an expression calling `visit` for every identifier that is not
/// locally bound inside the closure body.
fn collect_free_idents(
    expr: &ast::Expr,
    bound: &mut Vec<String>,
    visit: &mut impl FnMut(&str),
) {
    match &expr.kind {
        ast::ExprKind::Ident(name) => {
            if !bound.contains(name) {
                visit(name);
            }
        }
        ast::ExprKind::Binary { lhs, rhs, .. } => {
            collect_free_idents(lhs, bound, visit);
            collect_free_idents(rhs, bound, visit);
        }
        ast::ExprKind::Unary { operand, .. } => collect_free_idents(operand, bound, visit),
        ast::ExprKind::Assign { target, value, .. } => {
            collect_free_idents(target, bound, visit);
            collect_free_idents(value, bound, visit);
        }
        ast::ExprKind::Call { callee, args, .. } => {
            collect_free_idents(callee, bound, visit);
            for arg in args {
                collect_free_idents(arg, bound, visit);
            }
        }
        ast::ExprKind::MethodCall { receiver, args, .. } => {
            collect_free_idents(receiver, bound, visit);
            for arg in args {
                collect_free_idents(arg, bound, visit);
            }
        }
        ast::ExprKind::Field { object, .. } => collect_free_idents(object, bound, visit),
        ast::ExprKind::Index { object, index } => {
            collect_free_idents(object, bound, visit);
            collect_free_idents(index, bound, visit);
        }
        ast::ExprKind::If {
            cond,
            then_block,
            else_branch,
        } => {
            collect_free_idents(cond, bound, visit);
            collect_block_idents(then_block, bound, visit);
            if let Some(else_expr) = else_branch {
                collect_free_idents(else_expr, bound, visit);
            }
        }
        ast::ExprKind::Block(block) => collect_block_idents(block, bound, visit),
        ast::ExprKind::Loop { body, .. } => collect_block_idents(body, bound, visit),
        ast::ExprKind::While { cond, body, .. } => {
            collect_free_idents(cond, bound, visit);
            collect_block_idents(body, bound, visit);
        }
        ast::ExprKind::For {
            pattern,
            iter,
            body,
            ..
        } => {
            collect_free_idents(iter, bound, visit);
            let mark = bound.len();
            for name in pattern.bindings() {
                bound.push(name.to_string());
            }
            collect_block_idents(body, bound, visit);
            bound.truncate(mark);
        }
        ast::ExprKind::When { scrutinee, arms } => {
            collect_free_idents(scrutinee, bound, visit);
            for arm in arms {
                let mark = bound.len();
                for name in arm.pattern.bindings() {
                    bound.push(name.to_string());
                }
                if let Some(guard) = &arm.guard {
                    collect_free_idents(guard, bound, visit);
                }
                collect_free_idents(&arm.body, bound, visit);
                bound.truncate(mark);
            }
        }
        ast::ExprKind::Return(Some(inner))
        | ast::ExprKind::Try(inner)
        | ast::ExprKind::Await(inner)
        | ast::ExprKind::Cast { expr: inner, .. }
        | ast::ExprKind::Is { expr: inner, .. } => collect_free_idents(inner, bound, visit),
        ast::ExprKind::StructLit { fields, base, .. } => {
            for (_, value) in fields {
                collect_free_idents(value, bound, visit);
            }
            if let Some(base_expr) = base {
                collect_free_idents(base_expr, bound, visit);
            }
        }
        ast::ExprKind::Tuple(elems) | ast::ExprKind::Array(elems) => {
            for elem in elems {
                collect_free_idents(elem, bound, visit);
            }
        }
        ast::ExprKind::ArrayRepeat { elem, count } => {
            collect_free_idents(elem, bound, visit);
            collect_free_idents(count, bound, visit);
        }
        ast::ExprKind::Range { start, end, .. } => {
            collect_free_idents(start, bound, visit);
            collect_free_idents(end, bound, visit);
        }
        ast::ExprKind::InterpolatedString(parts) => {
            for part in parts {
                if let ast::InterpPart::Expr(inner) = part {
                    collect_free_idents(inner, bound, visit);
                }
            }
        }
        ast::ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            collect_free_idents(cond, bound, visit);
            collect_free_idents(then_expr, bound, visit);
            collect_free_idents(else_expr, bound, visit);
        }
        ast::ExprKind::Closure { params, body, .. } => {
            let mark = bound.len();
            for (pattern, _) in params {
                for name in pattern.bindings() {
                    bound.push(name.to_string());
                }
            }
            collect_free_idents(body, bound, visit);
            bound.truncate(mark);
        }
        ast::ExprKind::New { args, .. } => {
            for arg in args {
                collect_free_idents(arg, bound, visit);
            }
        }
        _ => {}
    }
}

fn collect_block_idents(
    block: &ast::Block,
    bound: &mut Vec<String>,
    visit: &mut impl FnMut(&str),
) {
    let mark = bound.len();
    for stmt in &block.stmts {
        match stmt {
            ast::Stmt::Let { pattern, value, .. } => {
                collect_free_idents(value, bound, visit);
                for name in pattern.bindings() {
                    bound.push(name.to_string());
                }
            }
            ast::Stmt::LetElse {
                pattern,
                value,
                else_block,
                ..
            } => {
                collect_free_idents(value, bound, visit);
                collect_block_idents(else_block, bound, visit);
                for name in pattern.bindings() {
                    bound.push(name.to_string());
                }
            }
            ast::Stmt::Var { name, value, .. } => {
                collect_free_idents(value, bound, visit);
                bound.push(name.clone());
            }
            ast::Stmt::Expr(expr) => collect_free_idents(expr, bound, visit),
            ast::Stmt::Decl(_) => {}
        }
    }
    bound.truncate(mark);
}
