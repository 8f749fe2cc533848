// `when` lowering: a decision cascade over the scrutinee. Enum arms
// compare the tag and bitcast the payload bytes; guards add a second
// conditional hop; or-patterns OR their tests together. `let … else`
// reuses the same machinery with a single refutable pattern.

use super::{CgResult, CodegenError, LlvmIrGen};
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn gen_when(
        &mut self,
        scrutinee: &ast::Expr,
        arms: &[ast::WhenArm],
        span: &ast::Span,
    ) -> CgResult<String> {
        let scrutinee_sem = self.infer_expr_ty(scrutinee);
        let mut value = self.gen_expr(scrutinee)?;
        let mut value_llvm = self.last_ty.clone();
        // Bool scrutinees normalize to their i8 memory form.
        if value_llvm == "i1" {
            value = self.widen_bool(&value);
            value_llvm = "i8".to_string();
        }

        // Spill the scrutinee so arms can GEP into it.
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, value_llvm));
        if !value.is_empty() {
            self.emit_line(format!("  store {} {}, ptr {}", value_llvm, value, slot));
        }

        // Result plumbing for value-position whens.
        let result_sem = arms
            .iter()
            .map(|arm| self.infer_expr_ty(&arm.body))
            .find(|t| *t != Ty::Unit && !t.is_error())
            .unwrap_or(Ty::Unit);
        let result_llvm = if result_sem == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&result_sem)
        };
        let result_slot = if result_llvm != "void" {
            let slot = self.fresh_reg();
            self.emit_line(format!("  {} = alloca {}", slot, result_llvm));
            Some(slot)
        } else {
            None
        };

        let end_label = self.fresh_label("when_end");
        let mut any_open_exit = false;

        for (i, arm) in arms.iter().enumerate() {
            let body_label = self.fresh_label("when_body");
            let next_label = if i + 1 < arms.len() {
                self.fresh_label("when_next")
            } else {
                end_label.clone()
            };

            let cond = self.gen_pattern_test(&arm.pattern, &slot, &scrutinee_sem, span)?;
            self.emit_line(format!(
                "  br i1 {}, label %{}, label %{}",
                cond, body_label, next_label
            ));

            self.emit_line(format!("{}:", body_label));
            self.block_terminated = false;
            if self.options.coverage {
                let id = self.cov_counter;
                self.cov_counter += 1;
                self.runtime("tml_cov_hit");
                self.emit_line(format!("  call void @tml_cov_hit(i32 {})", id));
            }
            self.push_drop_scope();
            self.bind_pattern_payloads(&arm.pattern, &slot, &scrutinee_sem)?;

            // Guards fall through to the next arm on failure.
            if let Some(guard) = &arm.guard {
                let guard_val = self.gen_expr(guard)?;
                let guard_bool = self.as_condition(guard_val)?;
                let guarded_label = self.fresh_label("when_guarded");
                self.emit_line(format!(
                    "  br i1 {}, label %{}, label %{}",
                    guard_bool, guarded_label, next_label
                ));
                self.emit_line(format!("{}:", guarded_label));
                self.block_terminated = false;
            }

            let body_value = self.gen_expr(&arm.body)?;
            if let Some(result_slot) = &result_slot {
                if !self.block_terminated && !body_value.is_empty() {
                    let body_ty = self.last_ty.clone();
                    let body_value = if body_ty != result_llvm && body_ty != "void" {
                        let unsigned = self.last_is_unsigned;
                        self.coerce_numeric(body_value, &body_ty, &result_llvm, unsigned)?
                    } else {
                        body_value
                    };
                    self.emit_line(format!(
                        "  store {} {}, ptr {}",
                        result_llvm, body_value, result_slot
                    ));
                }
            }
            self.pop_drop_scope();
            if !self.block_terminated {
                self.emit_line(format!("  br label %{}", end_label));
                any_open_exit = true;
            }

            if i + 1 < arms.len() {
                self.emit_line(format!("{}:", next_label));
                self.block_terminated = false;
            }
        }

        self.emit_line(format!("{}:", end_label));
        self.block_terminated = false;

        if let Some(result_slot) = result_slot {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = load {}, ptr {}",
                reg, result_llvm, result_slot
            ));
            self.set_last(result_sem, &result_llvm);
            Ok(reg)
        } else {
            if !any_open_exit && !arms.is_empty() {
                // Every arm diverged; the end block is unreachable.
                self.emit_line("  unreachable");
                self.block_terminated = true;
            }
            self.set_last(Ty::Unit, "void");
            Ok(String::new())
        }
    }

    /// Emit the boolean test for one pattern against the spilled
    /// scrutinee. Bindings happen separately once the test passes.
    fn gen_pattern_test(
        &mut self,
        pattern: &ast::Pattern,
        slot: &str,
        scrutinee_sem: &Ty,
        span: &ast::Span,
    ) -> CgResult<String> {
        match pattern {
            ast::Pattern::Wildcard { .. } | ast::Pattern::Ident { .. } => Ok("true".to_string()),
            ast::Pattern::Enum { variant, .. } => {
                let Some((info, idx)) = self.lookup_variant(scrutinee_sem, variant) else {
                    return Err(CodegenError::with_span(
                        "C003",
                        format!("variant `{}` not found during lowering", variant),
                        span.clone(),
                    ));
                };
                let _ = info;
                let enum_llvm = self.scrutinee_llvm(scrutinee_sem);
                let tag_ptr = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
                    tag_ptr, enum_llvm, slot
                ));
                let tag = self.fresh_reg();
                self.emit_line(format!("  {} = load i32, ptr {}", tag, tag_ptr));
                let cond = self.fresh_reg();
                self.emit_line(format!("  {} = icmp eq i32 {}, {}", cond, tag, idx));
                Ok(cond)
            }
            ast::Pattern::Literal { value, .. } => {
                self.gen_literal_test(value, slot, scrutinee_sem)
            }
            ast::Pattern::Range {
                start,
                end,
                inclusive,
                ..
            } => {
                let llvm_ty = self.scrutinee_llvm(scrutinee_sem);
                let current = self.fresh_reg();
                self.emit_line(format!("  {} = load {}, ptr {}", current, llvm_ty, slot));
                let unsigned = scrutinee_sem.is_unsigned();
                let lower = literal_int_text(start);
                let upper = literal_int_text(end);
                let ge = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = icmp {} {} {}, {}",
                    ge,
                    if unsigned { "uge" } else { "sge" },
                    llvm_ty,
                    current,
                    lower
                ));
                let le_op = match (inclusive, unsigned) {
                    (true, true) => "ule",
                    (true, false) => "sle",
                    (false, true) => "ult",
                    (false, false) => "slt",
                };
                let le = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = icmp {} {} {}, {}",
                    le, le_op, llvm_ty, current, upper
                ));
                let cond = self.fresh_reg();
                self.emit_line(format!("  {} = and i1 {}, {}", cond, ge, le));
                Ok(cond)
            }
            ast::Pattern::Or { alts, .. } => {
                let mut acc: Option<String> = None;
                for alt in alts {
                    let test = self.gen_pattern_test(alt, slot, scrutinee_sem, span)?;
                    acc = Some(match acc {
                        None => test,
                        Some(prev) => {
                            let reg = self.fresh_reg();
                            self.emit_line(format!("  {} = or i1 {}, {}", reg, prev, test));
                            reg
                        }
                    });
                }
                Ok(acc.unwrap_or_else(|| "false".to_string()))
            }
            // Tuple and struct destructuring patterns are irrefutable at
            // this level; their sub-patterns bind.
            ast::Pattern::Tuple { .. } | ast::Pattern::Struct { .. } => Ok("true".to_string()),
        }
    }

    fn gen_literal_test(
        &mut self,
        value: &ast::Literal,
        slot: &str,
        scrutinee_sem: &Ty,
    ) -> CgResult<String> {
        let llvm_ty = self.scrutinee_llvm(scrutinee_sem);
        let current = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", current, llvm_ty, slot));
        match value {
            ast::Literal::Str(text) => {
                let label = self.intern_string(text);
                self.runtime("tml_str_eq");
                let cond = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call i1 @tml_str_eq(ptr {}, ptr {})",
                    cond, current, label
                ));
                Ok(cond)
            }
            ast::Literal::Float { value, .. } => {
                let cond = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = fcmp oeq {} {}, {}",
                    cond,
                    llvm_ty,
                    current,
                    super::expr::float_constant(*value)
                ));
                Ok(cond)
            }
            ast::Literal::Bool(b) => {
                let cond = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = icmp eq {} {}, {}",
                    cond,
                    llvm_ty,
                    current,
                    u8::from(*b)
                ));
                Ok(cond)
            }
            other => {
                let text = match other {
                    ast::Literal::Int { value, .. } => format!("{}", *value as i128),
                    ast::Literal::Char(c) => format!("{}", *c as u32 as u8),
                    ast::Literal::Null => "null".to_string(),
                    _ => "0".to_string(),
                };
                let cond = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = icmp eq {} {}, {}",
                    cond, llvm_ty, current, text
                ));
                Ok(cond)
            }
        }
    }

    fn scrutinee_llvm(&mut self, sem: &Ty) -> String {
        // Bool spills in its i8 memory form.
        self.llvm_type(sem.deref_all())
    }

    fn lookup_variant(&self, sem: &Ty, variant: &str) -> Option<(String, usize)> {
        match sem.deref_all() {
            Ty::Named { name, .. } => {
                let info = self.env.enums.get(name)?;
                info.variant(variant).map(|(idx, _)| (name.clone(), idx))
            }
            _ => self
                .env
                .enum_for_variant(variant)
                .map(|(info, idx)| (info.name.clone(), idx)),
        }
    }

    /// Bind payloads / fields for the arm's pattern after its test has
    /// matched.
    pub(crate) fn bind_pattern_payloads(
        &mut self,
        pattern: &ast::Pattern,
        slot: &str,
        scrutinee_sem: &Ty,
    ) -> CgResult<()> {
        match pattern {
            ast::Pattern::Ident { name, .. } => {
                // Bind the whole scrutinee by value.
                let llvm_ty = self.scrutinee_llvm(scrutinee_sem);
                let loaded = self.fresh_reg();
                self.emit_line(format!("  {} = load {}, ptr {}", loaded, llvm_ty, slot));
                self.store_new_local(name, loaded, &llvm_ty, scrutinee_sem.clone(), false)?;
                Ok(())
            }
            ast::Pattern::Enum { variant, args, .. } => {
                if args.is_empty() {
                    return Ok(());
                }
                let (enum_name, idx) = self
                    .lookup_variant(scrutinee_sem, variant)
                    .unwrap_or_default();
                let (enum_args, info) = match scrutinee_sem.deref_all() {
                    Ty::Named { name, args, .. } => (
                        args.clone(),
                        self.env.enums.get(name).cloned(),
                    ),
                    _ => (Vec::new(), self.env.enums.get(&enum_name).cloned()),
                };
                let Some(info) = info else { return Ok(()) };
                let map: HashMap<String, Ty> = info
                    .type_params
                    .iter()
                    .cloned()
                    .zip(enum_args.iter().cloned())
                    .collect();
                let payload_tys = info
                    .variants
                    .get(idx)
                    .map(|v| v.payload.clone())
                    .unwrap_or_default();

                let enum_llvm = self.scrutinee_llvm(scrutinee_sem);
                let payload_ptr = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 1",
                    payload_ptr, enum_llvm, slot
                ));

                let mut offset = 0u64;
                for (sub, payload_ty) in args.iter().zip(&payload_tys) {
                    let field_sem = payload_ty.substitute(&map);
                    let field_llvm = self.llvm_type(&field_sem);
                    let field_ptr = if offset == 0 {
                        payload_ptr.clone()
                    } else {
                        let stepped = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds i8, ptr {}, i64 {}",
                            stepped, payload_ptr, offset
                        ));
                        stepped
                    };
                    match sub {
                        ast::Pattern::Ident { name, .. } => {
                            let loaded = self.fresh_reg();
                            self.emit_line(format!(
                                "  {} = load {}, ptr {}",
                                loaded, field_llvm, field_ptr
                            ));
                            self.store_new_local(name, loaded, &field_llvm, field_sem.clone(), false)?;
                        }
                        ast::Pattern::Wildcard { .. } | ast::Pattern::Literal { .. } => {}
                        nested => {
                            // Nested destructuring recurses with the
                            // payload as the new scrutinee.
                            let nested_slot = self.fresh_reg();
                            self.emit_line(format!(
                                "  {} = alloca {}",
                                nested_slot, field_llvm
                            ));
                            let loaded = self.fresh_reg();
                            self.emit_line(format!(
                                "  {} = load {}, ptr {}",
                                loaded, field_llvm, field_ptr
                            ));
                            self.emit_line(format!(
                                "  store {} {}, ptr {}",
                                field_llvm, loaded, nested_slot
                            ));
                            self.bind_pattern_payloads(nested, &nested_slot, &field_sem)?;
                        }
                    }
                    offset += self.size_of(&field_sem);
                }
                Ok(())
            }
            ast::Pattern::Tuple { elems, .. } => {
                let elem_sems = match scrutinee_sem.deref_all() {
                    Ty::Tuple(sems) => sems.clone(),
                    _ => return Ok(()),
                };
                let tuple_llvm = self.scrutinee_llvm(scrutinee_sem);
                for (i, (sub, elem_sem)) in elems.iter().zip(&elem_sems).enumerate() {
                    let field_ptr = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                        field_ptr, tuple_llvm, slot, i
                    ));
                    if let ast::Pattern::Ident { name, .. } = sub {
                        let elem_llvm = self.llvm_type(elem_sem);
                        let loaded = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = load {}, ptr {}",
                            loaded, elem_llvm, field_ptr
                        ));
                        self.store_new_local(name, loaded, &elem_llvm, elem_sem.clone(), false)?;
                    }
                }
                Ok(())
            }
            ast::Pattern::Struct { fields, .. } => {
                let (struct_name, struct_args) = match scrutinee_sem.deref_all() {
                    Ty::Named { name, args, .. } => (name.clone(), args.clone()),
                    _ => return Ok(()),
                };
                let Some(info) = self.env.structs.get(&struct_name).cloned() else {
                    return Ok(());
                };
                let map = self.param_map(&info.type_params, &struct_args);
                let mangled = self.require_type_instantiation(&struct_name, &struct_args);
                for (field_name, sub) in fields {
                    let Some(pos) = info.fields.iter().position(|f| &f.name == field_name)
                    else {
                        continue;
                    };
                    let field_sem = info.fields[pos].ty.substitute(&map);
                    let field_llvm = self.llvm_type(&field_sem);
                    let field_ptr = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = getelementptr inbounds %struct.{}, ptr {}, i32 0, i32 {}",
                        field_ptr, mangled, slot, pos
                    ));
                    if let ast::Pattern::Ident { name, .. } = sub {
                        let loaded = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = load {}, ptr {}",
                            loaded, field_llvm, field_ptr
                        ));
                        self.store_new_local(name, loaded, &field_llvm, field_sem, false)?;
                    }
                }
                Ok(())
            }
            ast::Pattern::Or { alts, .. } => {
                // All alternatives bind the same names; bind from the
                // first (duplicated binding slots per the or-pattern
                // contract).
                if let Some(first) = alts.first() {
                    self.bind_pattern_payloads(first, slot, scrutinee_sem)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `let pattern = expr else { … }`: a two-armed when whose failing
    /// arm runs the diverging else block.
    pub(crate) fn gen_let_else(
        &mut self,
        pattern: &ast::Pattern,
        annotation: Option<&ast::TypeExpr>,
        value: &ast::Expr,
        else_block: &ast::Block,
        span: &ast::Span,
    ) -> CgResult<()> {
        let _ = annotation;
        let scrutinee_sem = self.infer_expr_ty(value);
        let v = self.gen_expr(value)?;
        let value_llvm = self.last_ty.clone();

        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, value_llvm));
        self.emit_line(format!("  store {} {}, ptr {}", value_llvm, v, slot));

        let bind_label = self.fresh_label("let_bind");
        let else_label = self.fresh_label("let_else");

        let cond = self.gen_pattern_test(pattern, &slot, &scrutinee_sem, span)?;
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond, bind_label, else_label
        ));

        self.emit_line(format!("{}:", else_label));
        self.block_terminated = false;
        self.gen_block(else_block)?;
        if !self.block_terminated {
            // The checker guarantees divergence; keep the IR well formed
            // regardless.
            self.emit_line("  unreachable");
            self.block_terminated = true;
        }

        self.emit_line(format!("{}:", bind_label));
        self.block_terminated = false;
        self.bind_pattern_payloads(pattern, &slot, &scrutinee_sem)?;
        Ok(())
    }
}

fn literal_int_text(lit: &ast::Literal) -> String {
    match lit {
        ast::Literal::Int { value, .. } => format!("{}", *value as i128),
        ast::Literal::Char(c) => format!("{}", *c as u32 as u8),
        _ => "0".to_string(),
    }
}
