// Statement lowering: bindings with pattern destructuring, expression
// statements, scope-exit drop glue, and the lifetime markers around
// allocas.

use super::{CgResult, CodegenError, DropEntry, LlvmIrGen, VarInfo};
use crate::ty::Ty;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn gen_block(&mut self, block: &ast::Block) -> CgResult<()> {
        self.push_drop_scope();
        for stmt in &block.stmts {
            if self.block_terminated {
                break;
            }
            self.gen_stmt(stmt)?;
        }
        if !self.block_terminated {
            self.emit_current_scope_drops();
        }
        self.pop_drop_scope();
        Ok(())
    }

    /// A block in value position: the trailing expression statement's
    /// value is the block's value.
    pub(crate) fn gen_block_value(&mut self, block: &ast::Block) -> CgResult<String> {
        self.push_drop_scope();
        let mut result = String::new();
        let mut result_state = (Ty::Unit, "void".to_string());
        let count = block.stmts.len();
        for (i, stmt) in block.stmts.iter().enumerate() {
            if self.block_terminated {
                break;
            }
            if i + 1 == count {
                if let ast::Stmt::Expr(expr) = stmt {
                    result = self.gen_expr(expr)?;
                    result_state = (self.last_sem.clone(), self.last_ty.clone());
                } else {
                    self.gen_stmt(stmt)?;
                }
            } else {
                self.gen_stmt(stmt)?;
            }
        }
        if !self.block_terminated {
            self.emit_current_scope_drops();
        }
        self.pop_drop_scope();
        self.set_last(result_state.0, &result_state.1);
        Ok(result)
    }

    pub(crate) fn gen_stmt(&mut self, stmt: &ast::Stmt) -> CgResult<()> {
        match stmt {
            ast::Stmt::Let {
                pattern, ty, value, ..
            } => self.gen_binding(pattern, ty.as_ref(), value, false),
            ast::Stmt::Var {
                name, ty, value, span,
            } => {
                let pattern = ast::Pattern::Ident {
                    name: name.clone(),
                    mutable: true,
                    ty: None,
                    span: span.clone(),
                };
                self.gen_binding(&pattern, ty.as_ref(), value, true)
            }
            ast::Stmt::LetElse {
                pattern,
                ty,
                value,
                else_block,
                span,
            } => self.gen_let_else(pattern, ty.as_ref(), value, else_block, span),
            ast::Stmt::Expr(expr) => {
                let value = self.gen_expr(expr)?;
                // A call returning a fresh heap string that nobody binds
                // is freed at the end of the scope.
                if self.last_sem == Ty::Str && self.expr_allocates(expr) {
                    self.register_heap_str(&value);
                }
                Ok(())
            }
            ast::Stmt::Decl(decl) => {
                if let ast::Decl::Func(f) = decl.as_ref() {
                    // Nested functions are emitted as siblings; stash the
                    // current buffer while generating them.
                    let saved_out = std::mem::take(&mut self.out);
                    let saved_locals = std::mem::take(&mut self.locals);
                    let saved_terminated = self.block_terminated;
                    let saved_fn = self.current_fn.clone();
                    let saved_ret = self.current_ret_ty.clone();
                    let saved_ret_sem = self.current_ret_sem.clone();
                    let saved_tmp = self.tmp;
                    let saved_label = self.label;
                    self.gen_function(f, None, &self.generic_subst.clone(), None);
                    self.out = saved_out;
                    self.locals = saved_locals;
                    self.block_terminated = saved_terminated;
                    self.current_fn = saved_fn;
                    self.current_ret_ty = saved_ret;
                    self.current_ret_sem = saved_ret_sem;
                    self.tmp = saved_tmp;
                    self.label = saved_label;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn gen_binding(
        &mut self,
        pattern: &ast::Pattern,
        annotation: Option<&ast::TypeExpr>,
        value: &ast::Expr,
        _mutable: bool,
    ) -> CgResult<()> {
        let declared = annotation.map(|t| self.resolve_type_expr(t));
        if let Some(declared) = &declared {
            let llvm_ty = self.llvm_type(declared);
            self.expected_literal_ty = Some(llvm_ty);
        }
        let init = self.gen_expr(value)?;
        self.expected_literal_ty = None;
        let init_ty = self.last_ty.clone();
        let init_sem = self.last_sem.clone();
        let heap_str = init_sem == Ty::Str && self.expr_allocates(value);

        let sem = declared.unwrap_or(init_sem);

        match pattern {
            ast::Pattern::Ident { name, .. } => {
                let name = name.clone();
                self.store_new_local(&name, init, &init_ty, sem, heap_str)?;
                Ok(())
            }
            ast::Pattern::Wildcard { .. } => Ok(()),
            ast::Pattern::Tuple { elems, .. } => {
                // Spill the tuple and GEP each element out.
                let tuple_sems = match &sem {
                    Ty::Tuple(sems) => sems.clone(),
                    _ => {
                        return Err(CodegenError::with_span(
                            "C022",
                            "tuple pattern requires a tuple initializer",
                            pattern.span(),
                        ));
                    }
                };
                let tuple_ty = init_ty.clone();
                let slot = self.fresh_reg();
                self.emit_line(format!("  {} = alloca {}", slot, tuple_ty));
                self.emit_line(format!("  store {} {}, ptr {}", tuple_ty, init, slot));
                for (i, (sub, elem_sem)) in elems.iter().zip(tuple_sems).enumerate() {
                    let elem_llvm = self.llvm_type(&elem_sem);
                    let field = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                        field, tuple_ty, slot, i
                    ));
                    let loaded = self.fresh_reg();
                    self.emit_line(format!("  {} = load {}, ptr {}", loaded, elem_llvm, field));
                    match sub {
                        ast::Pattern::Ident { name, .. } => {
                            self.store_new_local(name, loaded, &elem_llvm, elem_sem, false)?;
                        }
                        ast::Pattern::Wildcard { .. } => {}
                        other => {
                            return Err(CodegenError::with_span(
                                "C022",
                                "nested patterns in tuple bindings must be identifiers",
                                other.span(),
                            ));
                        }
                    }
                }
                Ok(())
            }
            other => Err(CodegenError::with_span(
                "C022",
                "unsupported pattern in binding",
                other.span(),
            )),
        }
    }

    /// Allocate a slot, store the initializer, and register the local
    /// with lifetime markers and drop bookkeeping.
    pub(crate) fn store_new_local(
        &mut self,
        name: &str,
        value: String,
        value_ty: &str,
        sem: Ty,
        heap_str: bool,
    ) -> CgResult<()> {
        let slot_ty = if sem == Ty::Bool {
            "i8".to_string()
        } else {
            let declared = self.llvm_type(&sem);
            if declared == "void" {
                value_ty.to_string()
            } else {
                declared
            }
        };
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, slot_ty));
        self.runtime("llvm.lifetime.start");
        self.emit_line(format!(
            "  call void @llvm.lifetime.start.p0(i64 -1, ptr {})",
            slot
        ));

        let value = if sem == Ty::Bool && value_ty == "i1" {
            self.widen_bool(&value)
        } else if value_ty != slot_ty && value_ty != "void" {
            let unsigned = self.last_is_unsigned;
            let from = value_ty.to_string();
            self.coerce_numeric(value, &from, &slot_ty, unsigned)?
        } else {
            value
        };
        if value_ty != "void" {
            self.emit_line(format!("  store {} {}, ptr {}", slot_ty, value, slot));
        }

        let is_fat = slot_ty == "{ ptr, ptr }" && matches!(sem, Ty::Closure { .. } | Ty::Func { .. });
        self.locals.insert(
            name.to_string(),
            VarInfo {
                ptr: slot.clone(),
                llvm_ty: slot_ty,
                sem: sem.clone(),
                is_fat_closure: is_fat,
                direct: false,
            },
        );

        // Drop glue registration: user Drop impls and heap strings.
        let needs_drop = match &sem {
            Ty::Named { name, .. } => self.env.has_drop_impl(name),
            _ => false,
        };
        if needs_drop || heap_str {
            if let Some(scope) = self.scope_drops.last_mut() {
                scope.push(DropEntry {
                    ptr: slot,
                    sem,
                    heap_str,
                    name: Some(name.to_string()),
                });
            }
        }
        Ok(())
    }

    /// Does this expression yield a heap string the caller owns?
    pub(crate) fn expr_allocates(&self, expr: &ast::Expr) -> bool {
        match &expr.kind {
            ast::ExprKind::Call { callee, .. } => match &callee.kind {
                ast::ExprKind::Ident(name) => self
                    .env
                    .functions
                    .get(name)
                    .map(|sig| sig.allocates)
                    .unwrap_or(false),
                _ => false,
            },
            ast::ExprKind::InterpolatedString(_) => true,
            ast::ExprKind::Binary {
                op: ast::BinaryOp::Add,
                lhs,
                ..
            } => {
                // Str + Str concatenation allocates.
                matches!(
                    &lhs.kind,
                    ast::ExprKind::Literal(ast::Literal::Str(_))
                        | ast::ExprKind::InterpolatedString(_)
                )
            }
            _ => false,
        }
    }

    pub(crate) fn register_heap_str(&mut self, reg: &str) {
        if let Some(scope) = self.scope_drops.last_mut() {
            scope.push(DropEntry {
                ptr: reg.to_string(),
                sem: Ty::Str,
                heap_str: true,
                name: None,
            });
        }
    }

    // ==================== Drop glue ====================

    pub(crate) fn push_drop_scope(&mut self) {
        self.scope_drops.push(Vec::new());
    }

    pub(crate) fn pop_drop_scope(&mut self) {
        self.scope_drops.pop();
    }

    /// Emit drops for the innermost scope (block exit).
    pub(crate) fn emit_current_scope_drops(&mut self) {
        let Some(entries) = self.scope_drops.last().cloned() else {
            return;
        };
        self.emit_drop_entries(&entries);
    }

    /// Emit drops for every open scope (function return).
    pub(crate) fn emit_scope_drops(&mut self) {
        let all: Vec<DropEntry> = self
            .scope_drops
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev().cloned())
            .collect();
        self.emit_drop_entries(&all);
    }

    fn emit_drop_entries(&mut self, entries: &[DropEntry]) {
        for entry in entries.iter().rev() {
            if entry.heap_str {
                self.runtime("tml_str_free");
                if entry.name.is_some() {
                    // Named slot: free the current pointer value.
                    let loaded = self.fresh_reg();
                    self.emit_line(format!("  {} = load ptr, ptr {}", loaded, entry.ptr));
                    self.emit_line(format!("  call void @tml_str_free(ptr {})", loaded));
                } else {
                    self.emit_line(format!("  call void @tml_str_free(ptr {})", entry.ptr));
                }
                continue;
            }
            if let Ty::Named { name, .. } = &entry.sem {
                if self.env.has_drop_impl(name) {
                    let line = format!("  call void @tml_{}_drop(ptr {})", name, entry.ptr);
                    self.emit_line(line);
                }
            }
            if entry.name.is_some() {
                self.runtime("llvm.lifetime.end");
                self.emit_line(format!(
                    "  call void @llvm.lifetime.end.p0(i64 -1, ptr {})",
                    entry.ptr
                ));
            }
        }
    }

    // ==================== Misc helpers ====================

    pub(crate) fn to_i64(&mut self, value: String) -> CgResult<String> {
        let from = self.last_ty.clone();
        if from == "i64" {
            return Ok(value);
        }
        let unsigned = self.last_is_unsigned;
        self.coerce_numeric(value, &from, "i64", unsigned)
    }
}
