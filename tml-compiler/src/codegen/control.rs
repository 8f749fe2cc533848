// Control flow: if/else with PHI merges, the three loop forms, labelled
// break/continue, and return with drop glue.

use super::{CgResult, CodegenError, LlvmIrGen, LoopCtx};
use crate::ty::Ty;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn gen_if_expr(
        &mut self,
        cond: &ast::Expr,
        then_block: &ast::Block,
        else_branch: Option<&ast::Expr>,
    ) -> CgResult<String> {
        let cond_val = self.gen_expr(cond)?;
        let cond_bool = self.as_condition(cond_val)?;

        let then_label = self.fresh_label("if_then");
        let else_label = self.fresh_label("if_else");
        let merge_label = self.fresh_label("if_end");
        let else_target = if else_branch.is_some() {
            else_label.clone()
        } else {
            merge_label.clone()
        };

        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond_bool, then_label, else_target
        ));

        // Then branch.
        self.emit_line(format!("{}:", then_label));
        self.block_terminated = false;
        let then_val = self.gen_block_value(then_block)?;
        let then_ty = self.last_ty.clone();
        let then_sem = self.last_sem.clone();
        let then_terminated = self.block_terminated;
        let then_end = self.current_block_hint();
        if !then_terminated {
            self.emit_line(format!("  br label %{}", merge_label));
        }

        // Else branch.
        let mut else_info: Option<(String, String, bool)> = None;
        if let Some(else_expr) = else_branch {
            self.emit_line(format!("{}:", else_label));
            self.block_terminated = false;
            let else_val = self.gen_expr(else_expr)?;
            let else_terminated = self.block_terminated;
            let else_end = self.current_block_hint();
            if !else_terminated {
                self.emit_line(format!("  br label %{}", merge_label));
            }
            else_info = Some((else_val, else_end, else_terminated));
        }

        self.emit_line(format!("{}:", merge_label));
        self.block_terminated = false;

        // Value-producing ifs merge through a PHI when both branches
        // flow into the merge block.
        if let Some((else_val, else_end, else_terminated)) = &else_info {
            if then_ty != "void"
                && !then_val.is_empty()
                && !else_val.is_empty()
                && !then_terminated
                && !*else_terminated
            {
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = phi {} [ {}, %{} ], [ {}, %{} ]",
                    reg, then_ty, then_val, then_end, else_val, else_end
                ));
                self.set_last(then_sem, &then_ty);
                return Ok(reg);
            }
        }

        // Both arms terminated: the merge block itself is unreachable.
        let both_terminated = then_terminated
            && else_info
                .as_ref()
                .map(|(_, _, t)| *t)
                .unwrap_or(false);
        if both_terminated {
            self.emit_line("  unreachable");
            self.block_terminated = true;
        }

        self.set_last(Ty::Unit, "void");
        Ok(String::new())
    }

    pub(crate) fn gen_loop(&mut self, label: Option<&str>, body: &ast::Block) -> CgResult<()> {
        let header = self.fresh_label("loop_header");
        let exit = self.fresh_label("loop_exit");

        self.emit_line(format!("  br label %{}", header));
        self.emit_line(format!("{}:", header));
        self.block_terminated = false;

        self.loop_stack.push(LoopCtx {
            continue_label: header.clone(),
            break_label: exit.clone(),
            name: label.map(str::to_string),
        });
        self.gen_block(body)?;
        self.loop_stack.pop();

        if !self.block_terminated {
            self.emit_line(format!("  br label %{}", header));
        }
        self.emit_line(format!("{}:", exit));
        self.block_terminated = false;
        Ok(())
    }

    pub(crate) fn gen_while(
        &mut self,
        label: Option<&str>,
        cond: &ast::Expr,
        body: &ast::Block,
    ) -> CgResult<()> {
        let header = self.fresh_label("while_header");
        let body_label = self.fresh_label("while_body");
        let exit = self.fresh_label("while_exit");

        self.emit_line(format!("  br label %{}", header));
        self.emit_line(format!("{}:", header));
        self.block_terminated = false;
        let cond_val = self.gen_expr(cond)?;
        let cond_bool = self.as_condition(cond_val)?;
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond_bool, body_label, exit
        ));

        self.emit_line(format!("{}:", body_label));
        self.block_terminated = false;
        self.loop_stack.push(LoopCtx {
            continue_label: header.clone(),
            break_label: exit.clone(),
            name: label.map(str::to_string),
        });
        self.gen_block(body)?;
        self.loop_stack.pop();
        if !self.block_terminated {
            self.emit_line(format!("  br label %{}", header));
        }

        self.emit_line(format!("{}:", exit));
        self.block_terminated = false;
        Ok(())
    }

    /// `for pat in iterable`: ranges lower to a counting loop; anything
    /// else drives the Iterator protocol (`next()` returning Maybe).
    pub(crate) fn gen_for(
        &mut self,
        label: Option<&str>,
        pattern: &ast::Pattern,
        iter: &ast::Expr,
        body: &ast::Block,
    ) -> CgResult<()> {
        let iter_ty = self.infer_expr_ty(iter);

        if let ast::ExprKind::Range {
            start,
            end,
            inclusive,
        } = &iter.kind
        {
            return self.gen_range_for(label, pattern, start, end, *inclusive, body);
        }

        match iter_ty.deref_all().clone() {
            Ty::Array { elem, size } => self.gen_array_for(label, pattern, iter, &elem, size, body),
            Ty::Named { .. } => self.gen_iterator_for(label, pattern, iter, body),
            other => Err(CodegenError::with_span(
                "C003",
                format!("`{}` cannot be iterated", other),
                iter.span.clone(),
            )),
        }
    }

    fn gen_range_for(
        &mut self,
        label: Option<&str>,
        pattern: &ast::Pattern,
        start: &ast::Expr,
        end: &ast::Expr,
        inclusive: bool,
        body: &ast::Block,
    ) -> CgResult<()> {
        let start_val = self.gen_expr(start)?;
        let elem_ty = self.last_ty.clone();
        let elem_sem = self.last_sem.clone();
        let unsigned = self.last_is_unsigned;
        self.expected_literal_ty = Some(elem_ty.clone());
        let end_val = self.gen_expr(end)?;
        self.expected_literal_ty = None;

        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, elem_ty));
        self.emit_line(format!("  store {} {}, ptr {}", elem_ty, start_val, slot));

        let header = self.fresh_label("for_header");
        let body_label = self.fresh_label("for_body");
        let step_label = self.fresh_label("for_step");
        let exit = self.fresh_label("for_exit");

        self.emit_line(format!("  br label %{}", header));
        self.emit_line(format!("{}:", header));
        self.block_terminated = false;
        let current = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", current, elem_ty, slot));
        let cmp = self.fresh_reg();
        let cmp_op = match (inclusive, unsigned) {
            (true, true) => "ule",
            (true, false) => "sle",
            (false, true) => "ult",
            (false, false) => "slt",
        };
        self.emit_line(format!(
            "  {} = icmp {} {} {}, {}",
            cmp, cmp_op, elem_ty, current, end_val
        ));
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cmp, body_label, exit
        ));

        self.emit_line(format!("{}:", body_label));
        self.block_terminated = false;
        self.push_drop_scope();
        if let ast::Pattern::Ident { name, .. } = pattern {
            self.store_new_local(name, current.clone(), &elem_ty, elem_sem.clone(), false)?;
        }
        self.loop_stack.push(LoopCtx {
            continue_label: step_label.clone(),
            break_label: exit.clone(),
            name: label.map(str::to_string),
        });
        self.gen_block(body)?;
        self.loop_stack.pop();
        self.pop_drop_scope();
        if !self.block_terminated {
            self.emit_line(format!("  br label %{}", step_label));
        }

        self.emit_line(format!("{}:", step_label));
        self.block_terminated = false;
        let stepped = self.fresh_reg();
        let reload = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reload, elem_ty, slot));
        self.emit_line(format!("  {} = add {} {}, 1", stepped, elem_ty, reload));
        self.emit_line(format!("  store {} {}, ptr {}", elem_ty, stepped, slot));
        self.emit_line(format!("  br label %{}", header));

        self.emit_line(format!("{}:", exit));
        self.block_terminated = false;
        Ok(())
    }

    fn gen_array_for(
        &mut self,
        label: Option<&str>,
        pattern: &ast::Pattern,
        iter: &ast::Expr,
        elem: &Ty,
        size: u64,
        body: &ast::Block,
    ) -> CgResult<()> {
        let (base_ptr, _) = self.gen_place(iter)?;
        let elem_ty = self.llvm_type(elem);
        let arr_ty = format!("[{} x {}]", size, elem_ty);

        let idx_slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca i64", idx_slot));
        self.emit_line(format!("  store i64 0, ptr {}", idx_slot));

        let header = self.fresh_label("for_header");
        let body_label = self.fresh_label("for_body");
        let step_label = self.fresh_label("for_step");
        let exit = self.fresh_label("for_exit");

        self.emit_line(format!("  br label %{}", header));
        self.emit_line(format!("{}:", header));
        self.block_terminated = false;
        let idx = self.fresh_reg();
        self.emit_line(format!("  {} = load i64, ptr {}", idx, idx_slot));
        let cmp = self.fresh_reg();
        self.emit_line(format!("  {} = icmp ult i64 {}, {}", cmp, idx, size));
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cmp, body_label, exit
        ));

        self.emit_line(format!("{}:", body_label));
        self.block_terminated = false;
        let elem_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i64 0, i64 {}",
            elem_ptr, arr_ty, base_ptr, idx
        ));
        let loaded = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", loaded, elem_ty, elem_ptr));
        self.push_drop_scope();
        if let ast::Pattern::Ident { name, .. } = pattern {
            self.store_new_local(name, loaded, &elem_ty, elem.clone(), false)?;
        }
        self.loop_stack.push(LoopCtx {
            continue_label: step_label.clone(),
            break_label: exit.clone(),
            name: label.map(str::to_string),
        });
        self.gen_block(body)?;
        self.loop_stack.pop();
        self.pop_drop_scope();
        if !self.block_terminated {
            self.emit_line(format!("  br label %{}", step_label));
        }

        self.emit_line(format!("{}:", step_label));
        self.block_terminated = false;
        let reload = self.fresh_reg();
        self.emit_line(format!("  {} = load i64, ptr {}", reload, idx_slot));
        let next = self.fresh_reg();
        self.emit_line(format!("  {} = add i64 {}, 1", next, reload));
        self.emit_line(format!("  store i64 {}, ptr {}", next, idx_slot));
        self.emit_line(format!("  br label %{}", header));

        self.emit_line(format!("{}:", exit));
        self.block_terminated = false;
        Ok(())
    }

    /// Iterator protocol: `loop { when it.next() { Just(x) => body,
    /// Nothing => break } }`.
    fn gen_iterator_for(
        &mut self,
        label: Option<&str>,
        pattern: &ast::Pattern,
        iter: &ast::Expr,
        body: &ast::Block,
    ) -> CgResult<()> {
        let iter_sem = self.infer_expr_ty(iter);
        let (iter_ptr, _) = self.gen_place(iter)?;

        let elem_sem = match self.iterator_item_ty(&iter_sem) {
            Some(t) => t,
            None => {
                return Err(CodegenError::with_span(
                    "C003",
                    format!("`{}` has no usable `next` method", iter_sem),
                    iter.span.clone(),
                ));
            }
        };
        let maybe_sem = Ty::maybe(elem_sem.clone());
        let maybe_ty = self.llvm_type(&maybe_sem);
        let elem_ty = self.llvm_type(&elem_sem);

        let header = self.fresh_label("for_header");
        let body_label = self.fresh_label("for_body");
        let exit = self.fresh_label("for_exit");

        let next_fn = match iter_sem.deref_all() {
            Ty::Named { name, args, .. } => {
                let mangled = super::mangle::mangle_name(name, args);
                format!("@tml_{}_next", mangled)
            }
            _ => "@tml_next".to_string(),
        };

        self.emit_line(format!("  br label %{}", header));
        self.emit_line(format!("{}:", header));
        self.block_terminated = false;
        let item = self.fresh_reg();
        self.emit_line(format!(
            "  {} = call {} {}(ptr {})",
            item, maybe_ty, next_fn, iter_ptr
        ));
        // Tag 1 is Just.
        let item_slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", item_slot, maybe_ty));
        self.emit_line(format!("  store {} {}, ptr {}", maybe_ty, item, item_slot));
        let tag_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
            tag_ptr, maybe_ty, item_slot
        ));
        let tag = self.fresh_reg();
        self.emit_line(format!("  {} = load i32, ptr {}", tag, tag_ptr));
        let is_just = self.fresh_reg();
        self.emit_line(format!("  {} = icmp eq i32 {}, 1", is_just, tag));
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            is_just, body_label, exit
        ));

        self.emit_line(format!("{}:", body_label));
        self.block_terminated = false;
        let payload_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 1",
            payload_ptr, maybe_ty, item_slot
        ));
        let value = self.fresh_reg();
        self.emit_line(format!(
            "  {} = load {}, ptr {}",
            value, elem_ty, payload_ptr
        ));
        self.push_drop_scope();
        if let ast::Pattern::Ident { name, .. } = pattern {
            self.store_new_local(name, value, &elem_ty, elem_sem.clone(), false)?;
        }
        self.loop_stack.push(LoopCtx {
            continue_label: header.clone(),
            break_label: exit.clone(),
            name: label.map(str::to_string),
        });
        self.gen_block(body)?;
        self.loop_stack.pop();
        self.pop_drop_scope();
        if !self.block_terminated {
            self.emit_line(format!("  br label %{}", header));
        }

        self.emit_line(format!("{}:", exit));
        self.block_terminated = false;
        Ok(())
    }

    fn iterator_item_ty(&mut self, iter_sem: &Ty) -> Option<Ty> {
        match iter_sem.deref_all() {
            Ty::Named { name, args, .. } => {
                if name == "Range" {
                    return args.first().cloned();
                }
                let name = name.clone();
                let args = args.clone();
                let type_params = self
                    .env
                    .structs
                    .get(&name)
                    .map(|s| s.type_params.clone())
                    .unwrap_or_default();
                let map = self.param_map(&type_params, &args);
                let ret = self
                    .env
                    .inherent_method(&name, "next")
                    .map(|sig| sig.ret.clone())
                    .or_else(|| self.env.behavior_method(&name, "next").map(|(_, s)| s.ret))?;
                match ret.substitute(&map) {
                    Ty::Named { name, args, .. } if name == "Maybe" && args.len() == 1 => {
                        Some(args[0].clone())
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    // ==================== break / continue / return ====================

    fn find_loop(&self, label: Option<&str>) -> Option<&LoopCtx> {
        match label {
            None => self.loop_stack.last(),
            Some(wanted) => self
                .loop_stack
                .iter()
                .rev()
                .find(|ctx| ctx.name.as_deref() == Some(wanted)),
        }
    }

    pub(crate) fn gen_break(&mut self, label: Option<&str>, span: &ast::Span) -> CgResult<()> {
        let target = self
            .find_loop(label)
            .map(|ctx| ctx.break_label.clone())
            .ok_or_else(|| {
                CodegenError::with_span("C003", "`break` outside of a loop", span.clone())
            })?;
        self.emit_line(format!("  br label %{}", target));
        self.block_terminated = true;
        self.set_last(Ty::Unit, "void");
        Ok(())
    }

    pub(crate) fn gen_continue(&mut self, label: Option<&str>, span: &ast::Span) -> CgResult<()> {
        let target = self
            .find_loop(label)
            .map(|ctx| ctx.continue_label.clone())
            .ok_or_else(|| {
                CodegenError::with_span("C003", "`continue` outside of a loop", span.clone())
            })?;
        self.emit_line(format!("  br label %{}", target));
        self.block_terminated = true;
        self.set_last(Ty::Unit, "void");
        Ok(())
    }

    pub(crate) fn gen_return(&mut self, value: Option<&ast::Expr>) -> CgResult<String> {
        match value {
            Some(inner) => {
                let ret_ty = self.current_ret_ty.clone();
                self.expected_literal_ty = Some(ret_ty.clone());
                let mut v = self.gen_expr(inner)?;
                self.expected_literal_ty = None;
                // References auto-deref when returned by value.
                if let Ty::Ref { inner: pointee, .. } = self.last_sem.clone() {
                    if ret_ty != "ptr" {
                        let pointee_llvm = self.llvm_type(&pointee);
                        let loaded = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = load {}, ptr {}",
                            loaded, pointee_llvm, v
                        ));
                        self.set_last((*pointee).clone(), &pointee_llvm);
                        v = loaded;
                    }
                }
                let from_ty = self.last_ty.clone();
                let unsigned = self.last_is_unsigned;
                let v = if from_ty != ret_ty && from_ty != "void" {
                    self.coerce_numeric(v, &from_ty, &ret_ty, unsigned)?
                } else {
                    v
                };
                self.emit_scope_drops();
                self.emit_line(format!("  ret {} {}", ret_ty, v));
            }
            None => {
                self.emit_scope_drops();
                self.emit_line("  ret void");
            }
        }
        self.block_terminated = true;
        self.set_last(Ty::Unit, "void");
        Ok(String::new())
    }
}
