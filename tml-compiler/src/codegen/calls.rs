// Call lowering. Resolution order mirrors the checker: enum variant
// constructors, runtime built-ins, user functions (generic ones through
// the instantiation queue), then indirect calls through function or
// closure values.

use super::{CgResult, CodegenError, LlvmIrGen};
use crate::env::EnumInfo;
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn gen_call(
        &mut self,
        callee: &ast::Expr,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        // Literal argument contexts never leak across calls.
        self.expected_literal_ty = None;

        match &callee.kind {
            ast::ExprKind::Ident(name) => {
                let name = name.clone();

                // Locals holding closures or function pointers win over
                // global functions.
                if self.locals.contains_key(&name) {
                    return self.gen_indirect_call(&name, args, span);
                }

                if let Some((info, idx)) = self.env.enum_for_variant(&name) {
                    let info = info.clone();
                    return self.gen_enum_value(&info, idx, type_args, args, span);
                }

                if self.env.is_builtin_function(&name) {
                    return self.gen_builtin_call(&name, args, span);
                }

                if let Some(sig) = self.env.functions.get(&name).cloned() {
                    if sig.generics.is_empty() {
                        return self.gen_direct_call(&name, &sig.params, &sig.ret, args);
                    }
                    // Monomorphization on demand.
                    let subst = self.deduce_generic_args(&sig, type_args, args);
                    let mangled = self.require_fn_instantiation(&name, &sig, &subst, span)?;
                    let params: Vec<(String, Ty)> = sig
                        .params
                        .iter()
                        .map(|(n, t)| (n.clone(), t.substitute(&subst)))
                        .collect();
                    let ret = sig.ret.substitute(&subst);
                    return self.gen_direct_call(&mangled, &params, &ret, args);
                }

                Err(CodegenError::with_span(
                    "C004",
                    format!("function `{}` not found in codegen", name),
                    span.clone(),
                ))
            }
            ast::ExprKind::Path(path) => self.gen_path_call(path, type_args, args, span),
            _ => {
                // Arbitrary callee expression: evaluate to a fat pointer
                // and dispatch.
                let value = self.gen_expr(callee)?;
                let sem = self.last_sem.clone();
                self.gen_fat_pointer_call(value, &sem, args, span)
            }
        }
    }

    /// Direct call to a known symbol: `@tml_<stem>(args…)`.
    pub(crate) fn gen_direct_call(
        &mut self,
        stem: &str,
        params: &[(String, Ty)],
        ret: &Ty,
        args: &[ast::Expr],
    ) -> CgResult<String> {
        let mut arg_text = Vec::new();
        for (arg, (_, param_ty)) in args.iter().zip(params) {
            let param_sem = param_ty.clone();
            let param_llvm = self.llvm_type(&param_sem);
            self.expected_literal_ty = Some(param_llvm.clone());
            let value = self.gen_expr(arg)?;
            self.expected_literal_ty = None;
            let value = self.coerced_store_value(value, &param_sem, &param_llvm)?;
            // References to places pass the place address.
            arg_text.push(format!("{} {}", param_llvm, value));
        }

        let ret_llvm = if *ret == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(ret)
        };
        if ret_llvm == "void" {
            self.emit_line(format!("  call void @tml_{}({})", stem, arg_text.join(", ")));
            self.set_last(Ty::Unit, "void");
            Ok(String::new())
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} @tml_{}({})",
                reg,
                ret_llvm,
                stem,
                arg_text.join(", ")
            ));
            self.set_last(ret.clone(), &ret_llvm);
            Ok(reg)
        }
    }

    fn gen_path_call(
        &mut self,
        path: &ast::PathRef,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        if path.segments.len() == 2 {
            let (head, tail) = (path.segments[0].clone(), path.segments[1].clone());

            if let Some(prim) = Ty::primitive_from_name(&head) {
                return self.gen_primitive_static(&prim, &tail, args, span);
            }

            if let Some(info) = self.env.enums.get(&head).cloned() {
                if let Some((idx, _)) = info.variant(&tail) {
                    return self.gen_enum_value(&info, idx, type_args, args, span);
                }
            }

            // Class / struct static methods.
            if self.env.classes.contains_key(&head) {
                if let Some((owner, method)) = self.env.find_class_method(&head, &tail) {
                    let stem = format!("{}_{}", owner, tail);
                    let params: Vec<(String, Ty)> = method
                        .sig
                        .params
                        .iter()
                        .filter(|(n, _)| n != "this")
                        .cloned()
                        .collect();
                    return self.gen_direct_call(&stem, &params, &method.sig.ret, args);
                }
            }
            if let Some(sig) = self.env.inherent_method(&head, &tail).cloned() {
                let stem = format!("{}_{}", head, tail);
                let params: Vec<(String, Ty)> = sig
                    .params
                    .iter()
                    .filter(|(n, _)| n != "this")
                    .cloned()
                    .collect();
                return self.gen_direct_call(&stem, &params, &sig.ret, args);
            }

            // Imported module function, addressed by qualified path.
            if let Some(sig) = self.env.functions.get(&tail).cloned() {
                return self.gen_direct_call(&tail, &sig.params, &sig.ret, args);
            }
        }

        Err(CodegenError::with_span(
            "C004",
            format!("function `{}` not found in codegen", path.segments.join("::")),
            span.clone(),
        ))
    }

    fn gen_primitive_static(
        &mut self,
        prim: &Ty,
        method: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let llvm_ty = self.llvm_type(prim);
        let value = match method {
            "default" | "zero" => "0".to_string(),
            "one" => "1".to_string(),
            "min_value" => primitive_min(prim).to_string(),
            "max_value" => primitive_max(prim).to_string(),
            "from" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span(
                        "C015",
                        format!("`{}::from` is missing its argument", prim),
                        span.clone(),
                    )
                })?;
                let v = self.gen_expr(arg)?;
                let from_ty = self.last_ty.clone();
                let unsigned = self.last_is_unsigned;
                let out = self.coerce_numeric(v, &from_ty, &llvm_ty, unsigned)?;
                self.set_last(prim.clone(), &llvm_ty);
                return Ok(out);
            }
            _ => {
                return Err(CodegenError::with_span(
                    "C035",
                    format!("unknown static method `{}::{}`", prim, method),
                    span.clone(),
                ));
            }
        };
        if prim.is_float() {
            self.set_last(prim.clone(), &llvm_ty);
            return Ok(super::expr::float_constant(value.parse().unwrap_or(0.0)));
        }
        self.set_last(prim.clone(), &llvm_ty);
        Ok(value)
    }

    // ==================== Enum construction ====================

    /// Build an enum value: alloca, store the tag, store the payload
    /// into the byte blob, load the whole struct back.
    pub(crate) fn gen_enum_value(
        &mut self,
        info: &EnumInfo,
        variant_idx: usize,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let variant = info.variants[variant_idx].clone();
        if variant.payload.len() != args.len() {
            return Err(CodegenError::with_span(
                "C015",
                format!(
                    "variant `{}` expects {} argument(s), got {}",
                    variant.name,
                    variant.payload.len(),
                    args.len()
                ),
                span.clone(),
            ));
        }

        let enum_args = self.resolve_enum_args(info, variant_idx, type_args, args);
        let mangled = self.require_type_instantiation(&info.name, &enum_args);
        let enum_ty = format!("%struct.{}", mangled);
        let map = self.param_map(&info.type_params, &enum_args);

        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}, align 8", slot, enum_ty));
        let tag_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
            tag_ptr, enum_ty, slot
        ));
        self.emit_line(format!("  store i32 {}, ptr {}", variant_idx, tag_ptr));

        if !args.is_empty() {
            let payload_ptr = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 1",
                payload_ptr, enum_ty, slot
            ));
            // Sequential payload slots; with opaque pointers the blob
            // pointer doubles as the first field's address.
            let mut offset_ptr = payload_ptr.clone();
            let mut offset_bytes = 0u64;
            for (arg, payload_ty) in args.iter().zip(&variant.payload) {
                let field_sem = payload_ty.substitute(&map);
                let field_llvm = self.llvm_type(&field_sem);
                self.expected_literal_ty = Some(field_llvm.clone());
                let value = self.gen_expr(arg)?;
                self.expected_literal_ty = None;
                let value = self.coerced_store_value(value, &field_sem, &field_llvm)?;
                if offset_bytes > 0 {
                    let stepped = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = getelementptr inbounds i8, ptr {}, i64 {}",
                        stepped, payload_ptr, offset_bytes
                    ));
                    offset_ptr = stepped;
                }
                self.emit_line(format!(
                    "  store {} {}, ptr {}",
                    field_llvm, value, offset_ptr
                ));
                offset_bytes += self.size_of(&field_sem);
            }
        }

        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, enum_ty, slot));
        self.set_last(
            Ty::Named {
                name: info.name.clone(),
                module: String::new(),
                args: enum_args,
            },
            &enum_ty,
        );
        Ok(reg)
    }

    fn resolve_enum_args(
        &mut self,
        info: &EnumInfo,
        variant_idx: usize,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
    ) -> Vec<Ty> {
        if !type_args.is_empty() {
            return type_args.iter().map(|t| self.resolve_type_expr(t)).collect();
        }
        // Deduce from payloads; fall back to the expected literal
        // context (e.g. assigning `Nothing` to a `Maybe[I32]` slot), and
        // finally to the surrounding function's return type.
        let mut deduced = vec![Ty::Unit; info.type_params.len()];
        let variant = &info.variants[variant_idx];
        for (payload, arg) in variant.payload.iter().zip(args) {
            if let Ty::Named { name, args: pa, .. } = payload {
                if pa.is_empty() {
                    if let Some(pos) = info.type_params.iter().position(|p| p == name) {
                        deduced[pos] = self.infer_expr_ty(arg);
                    }
                }
            }
        }
        if deduced.iter().any(|t| *t == Ty::Unit) {
            if let Ty::Named { name, args, .. } = &self.current_ret_sem {
                if name == &info.name && args.len() == deduced.len() {
                    for (slot, ret_arg) in deduced.iter_mut().zip(args) {
                        if *slot == Ty::Unit {
                            *slot = ret_arg.clone();
                        }
                    }
                }
            }
        }
        deduced
    }

    // ==================== Built-ins ====================

    fn gen_builtin_call(
        &mut self,
        name: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        match name {
            "print" | "println" | "eprint" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span(
                        "C015",
                        format!("`{}` is missing its argument", name),
                        span.clone(),
                    )
                })?;
                let value = self.gen_expr(arg)?;
                let value = self.stringify_value(value)?;
                let symbol: &'static str = match name {
                    "print" => "tml_print",
                    "println" => "tml_println",
                    _ => "tml_eprint",
                };
                self.runtime(symbol);
                self.emit_line(format!("  call void @{}(ptr {})", symbol, value));
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "print_int" => {
                let value = self.gen_arg_as(args, 0, "i64", span)?;
                self.runtime("tml_print_int");
                self.emit_line(format!("  call void @tml_print_int(i64 {})", value));
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "print_float" => {
                let value = self.gen_arg_as(args, 0, "double", span)?;
                self.runtime("tml_print_float");
                self.emit_line(format!("  call void @tml_print_float(double {})", value));
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "exit" => {
                let value = self.gen_arg_as(args, 0, "i32", span)?;
                self.runtime("exit");
                self.emit_line(format!("  call void @exit(i32 {})", value));
                self.emit_line("  unreachable");
                self.block_terminated = true;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "panic" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span("C015", "`panic` is missing its message", span.clone())
                })?;
                let value = self.gen_expr(arg)?;
                self.runtime("tml_eprint");
                self.runtime("exit");
                self.emit_line(format!("  call void @tml_eprint(ptr {})", value));
                self.emit_line("  call void @exit(i32 1)");
                self.emit_line("  unreachable");
                self.block_terminated = true;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "assert" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span(
                        "C015",
                        "`assert` is missing its condition",
                        span.clone(),
                    )
                })?;
                let value = self.gen_expr(arg)?;
                let cond = self.as_condition(value)?;
                let ok_label = self.fresh_label("assert_ok");
                let fail_label = self.fresh_label("assert_fail");
                self.emit_line(format!(
                    "  br i1 {}, label %{}, label %{}",
                    cond, ok_label, fail_label
                ));
                self.emit_line(format!("{}:", fail_label));
                self.runtime("tml_eprint");
                self.runtime("exit");
                let message = self.intern_string("assertion failed");
                self.emit_line(format!("  call void @tml_eprint(ptr {})", message));
                self.emit_line("  call void @exit(i32 1)");
                self.emit_line("  unreachable");
                self.emit_line(format!("{}:", ok_label));
                self.block_terminated = false;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "assert_eq" => {
                let left = self.gen_arg_as(args, 0, "i64", span)?;
                let right = self.gen_arg_as(args, 1, "i64", span)?;
                let cmp = self.fresh_reg();
                self.emit_line(format!("  {} = icmp eq i64 {}, {}", cmp, left, right));
                let ok_label = self.fresh_label("assert_ok");
                let fail_label = self.fresh_label("assert_fail");
                self.emit_line(format!(
                    "  br i1 {}, label %{}, label %{}",
                    cmp, ok_label, fail_label
                ));
                self.emit_line(format!("{}:", fail_label));
                self.runtime("tml_eprint");
                self.runtime("exit");
                let message = self.intern_string("assertion failed: values differ");
                self.emit_line(format!("  call void @tml_eprint(ptr {})", message));
                self.emit_line("  call void @exit(i32 1)");
                self.emit_line("  unreachable");
                self.emit_line(format!("{}:", ok_label));
                self.block_terminated = false;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "str_len" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span("C015", "`str_len` is missing its argument", span.clone())
                })?;
                let value = self.gen_expr(arg)?;
                self.runtime("tml_str_len");
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = call i64 @tml_str_len(ptr {})", reg, value));
                self.set_last(Ty::I64, "i64");
                Ok(reg)
            }
            "str_concat" => {
                let a = self.gen_arg_value(args, 0, span)?;
                let b = self.gen_arg_value(args, 1, span)?;
                self.runtime("tml_str_concat");
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call ptr @tml_str_concat(ptr {}, ptr {})",
                    reg, a, b
                ));
                self.set_last(Ty::Str, "ptr");
                Ok(reg)
            }
            "str_eq" => {
                let a = self.gen_arg_value(args, 0, span)?;
                let b = self.gen_arg_value(args, 1, span)?;
                self.runtime("tml_str_eq");
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call i1 @tml_str_eq(ptr {}, ptr {})",
                    reg, a, b
                ));
                self.set_last(Ty::Bool, "i1");
                Ok(reg)
            }
            "str_free" => {
                let value = self.gen_arg_value(args, 0, span)?;
                self.runtime("tml_str_free");
                self.emit_line(format!("  call void @tml_str_free(ptr {})", value));
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "int_to_str" => {
                let value = self.gen_arg_as(args, 0, "i64", span)?;
                self.runtime("tml_int_to_str");
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = call ptr @tml_int_to_str(i64 {})", reg, value));
                self.set_last(Ty::Str, "ptr");
                Ok(reg)
            }
            "float_to_str" => {
                let value = self.gen_arg_as(args, 0, "double", span)?;
                self.runtime("tml_float_to_str");
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call ptr @tml_float_to_str(double {})",
                    reg, value
                ));
                self.set_last(Ty::Str, "ptr");
                Ok(reg)
            }
            "time_us" | "time_ns" => {
                self.runtime(if name == "time_us" { "time_us" } else { "time_ns" });
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = call i64 @{}()", reg, name));
                self.set_last(Ty::I64, "i64");
                Ok(reg)
            }
            "sqrt" => {
                let value = self.gen_arg_as(args, 0, "double", span)?;
                self.runtime("llvm.sqrt.f64");
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call double @llvm.sqrt.f64(double {})",
                    reg, value
                ));
                self.set_last(Ty::F64, "double");
                Ok(reg)
            }
            "abs" => {
                let value = self.gen_arg_as(args, 0, "i64", span)?;
                self.runtime("llvm.abs.i64");
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call i64 @llvm.abs.i64(i64 {}, i1 false)",
                    reg, value
                ));
                self.set_last(Ty::I64, "i64");
                Ok(reg)
            }
            other => Err(CodegenError::with_span(
                "C014",
                format!("intrinsic `{}` is not supported", other),
                span.clone(),
            )),
        }
    }

    fn gen_arg_value(
        &mut self,
        args: &[ast::Expr],
        index: usize,
        span: &ast::Span,
    ) -> CgResult<String> {
        let arg = args.get(index).ok_or_else(|| {
            CodegenError::with_span(
                "C017",
                format!("missing argument {}", index + 1),
                span.clone(),
            )
        })?;
        self.gen_expr(arg)
    }

    fn gen_arg_as(
        &mut self,
        args: &[ast::Expr],
        index: usize,
        target: &str,
        span: &ast::Span,
    ) -> CgResult<String> {
        self.expected_literal_ty = Some(target.to_string());
        let value = self.gen_arg_value(args, index, span)?;
        self.expected_literal_ty = None;
        let from = self.last_ty.clone();
        if from == target {
            return Ok(value);
        }
        let unsigned = self.last_is_unsigned;
        self.coerce_numeric(value, &from, target, unsigned)
    }

    // ==================== Indirect calls ====================

    /// Call through a local variable holding a function value. Fat
    /// pointers dispatch on the environment slot at runtime.
    fn gen_indirect_call(
        &mut self,
        name: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let info = self.locals.get(name).cloned().ok_or_else(|| {
            CodegenError::with_span("C004", format!("`{}` not found", name), span.clone())
        })?;
        let value = if info.direct {
            info.ptr.clone()
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = load {}, ptr {}",
                reg, info.llvm_ty, info.ptr
            ));
            reg
        };
        self.gen_fat_pointer_call(value, &info.sem, args, span)
    }

    pub(crate) fn gen_fat_pointer_call(
        &mut self,
        value: String,
        sem: &Ty,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let (params, ret) = match sem {
            Ty::Func { params, ret, .. } | Ty::Closure { params, ret } => {
                (params.clone(), (**ret).clone())
            }
            other => {
                return Err(CodegenError::with_span(
                    "C024",
                    format!("cannot call a value of type `{}`", other),
                    span.clone(),
                ));
            }
        };

        let mut arg_text = Vec::new();
        for (arg, param_sem) in args.iter().zip(&params) {
            let param_llvm = self.llvm_type(param_sem);
            self.expected_literal_ty = Some(param_llvm.clone());
            let v = self.gen_expr(arg)?;
            self.expected_literal_ty = None;
            let v = self.coerced_store_value(v, param_sem, &param_llvm)?;
            arg_text.push(format!("{} {}", param_llvm, v));
        }
        let ret_llvm = if ret == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&ret)
        };

        // Split the fat pointer.
        let fn_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = extractvalue {{ ptr, ptr }} {}, 0",
            fn_ptr, value
        ));
        let env_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = extractvalue {{ ptr, ptr }} {}, 1",
            env_ptr, value
        ));

        // Null environment -> thin call; otherwise the trampoline takes
        // the environment first.
        let is_thin = self.fresh_reg();
        self.emit_line(format!("  {} = icmp eq ptr {}, null", is_thin, env_ptr));
        let thin_label = self.fresh_label("call_thin");
        let fat_label = self.fresh_label("call_fat");
        let merge_label = self.fresh_label("call_end");
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            is_thin, thin_label, fat_label
        ));

        self.emit_line(format!("{}:", thin_label));
        let thin_result = if ret_llvm == "void" {
            self.emit_line(format!(
                "  call void {}({})",
                fn_ptr,
                arg_text.join(", ")
            ));
            String::new()
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} {}({})",
                reg,
                ret_llvm,
                fn_ptr,
                arg_text.join(", ")
            ));
            reg
        };
        self.emit_line(format!("  br label %{}", merge_label));

        self.emit_line(format!("{}:", fat_label));
        let mut fat_args = vec![format!("ptr {}", env_ptr)];
        fat_args.extend(arg_text.iter().cloned());
        let fat_result = if ret_llvm == "void" {
            self.emit_line(format!(
                "  call void {}({})",
                fn_ptr,
                fat_args.join(", ")
            ));
            String::new()
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} {}({})",
                reg,
                ret_llvm,
                fn_ptr,
                fat_args.join(", ")
            ));
            reg
        };
        self.emit_line(format!("  br label %{}", merge_label));

        self.emit_line(format!("{}:", merge_label));
        self.block_terminated = false;
        if ret_llvm == "void" {
            self.set_last(Ty::Unit, "void");
            Ok(String::new())
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = phi {} [ {}, %{} ], [ {}, %{} ]",
                reg, ret_llvm, thin_result, thin_label, fat_result, fat_label
            ));
            self.set_last(ret, &ret_llvm);
            Ok(reg)
        }
    }

    // ==================== Method calls ====================

    pub(crate) fn gen_method_call(
        &mut self,
        receiver: &ast::Expr,
        method: &str,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let receiver_sem = self.infer_expr_ty(receiver);

        match receiver_sem.deref_all().clone() {
            Ty::Array { size, .. } if method == "len" => {
                self.set_last(Ty::I64, "i64");
                Ok(format!("{}", size))
            }
            Ty::Slice { .. } if method == "len" => {
                let value = self.gen_expr(receiver)?;
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = extractvalue {{ ptr, i64 }} {}, 1",
                    reg, value
                ));
                self.set_last(Ty::I64, "i64");
                Ok(reg)
            }
            Ty::Str => match method {
                "len" => {
                    let value = self.gen_expr(receiver)?;
                    self.runtime("tml_str_len");
                    let reg = self.fresh_reg();
                    self.emit_line(format!("  {} = call i64 @tml_str_len(ptr {})", reg, value));
                    self.set_last(Ty::I64, "i64");
                    Ok(reg)
                }
                "duplicate" => {
                    let value = self.gen_expr(receiver)?;
                    self.runtime("tml_str_dup");
                    let reg = self.fresh_reg();
                    self.emit_line(format!("  {} = call ptr @tml_str_dup(ptr {})", reg, value));
                    self.register_heap_str(&reg);
                    self.set_last(Ty::Str, "ptr");
                    Ok(reg)
                }
                other => Err(CodegenError::with_span(
                    "C006",
                    format!("`Str` has no method `{}`", other),
                    span.clone(),
                )),
            },
            Ty::Ptr { inner, mutable } => {
                self.gen_pointer_method(receiver, &inner, mutable, method, args, span)
            }
            Ty::Named { name, args: ty_args, .. } => {
                self.gen_named_method(receiver, &name, &ty_args, method, type_args, args, span)
            }
            Ty::Class { name, .. } => {
                self.gen_class_method(receiver, &name, method, args, span)
            }
            Ty::DynBehavior { behavior, .. } => {
                self.gen_dyn_method(receiver, &behavior, method, args, span)
            }
            Ty::Closure { .. } | Ty::Func { .. } if method == "call" => {
                let value = self.gen_expr(receiver)?;
                let sem = self.last_sem.clone();
                self.gen_fat_pointer_call(value, &sem, args, span)
            }
            other => Err(CodegenError::with_span(
                "C006",
                format!("method `{}` not found on `{}`", method, other),
                span.clone(),
            )),
        }
    }

    fn gen_pointer_method(
        &mut self,
        receiver: &ast::Expr,
        inner: &Ty,
        mutable: bool,
        method: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let ptr_value = self.gen_expr(receiver)?;
        let inner_llvm = self.llvm_type(&inner.clone());
        match method {
            "read" => {
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = load {}, ptr {}", reg, inner_llvm, ptr_value));
                self.set_last(inner.clone(), &inner_llvm);
                Ok(reg)
            }
            "write" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span(
                        "C019",
                        "pointer `write` is missing its value",
                        span.clone(),
                    )
                })?;
                self.expected_literal_ty = Some(inner_llvm.clone());
                let value = self.gen_expr(arg)?;
                self.expected_literal_ty = None;
                self.emit_line(format!(
                    "  store {} {}, ptr {}",
                    inner_llvm, value, ptr_value
                ));
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            "is_null" => {
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = icmp eq ptr {}, null", reg, ptr_value));
                self.set_last(Ty::Bool, "i1");
                Ok(reg)
            }
            "offset" => {
                let arg = args.first().ok_or_else(|| {
                    CodegenError::with_span(
                        "C019",
                        "pointer `offset` is missing its count",
                        span.clone(),
                    )
                })?;
                let count = self.gen_expr(arg)?;
                let count = self.to_i64(count)?;
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i64 {}",
                    reg, inner_llvm, ptr_value, count
                ));
                self.set_last(
                    Ty::Ptr {
                        mutable,
                        inner: Box::new(inner.clone()),
                    },
                    "ptr",
                );
                Ok(reg)
            }
            other => Err(CodegenError::with_span(
                "C006",
                format!("unknown pointer method `{}`", other),
                span.clone(),
            )),
        }
    }

    fn gen_named_method(
        &mut self,
        receiver: &ast::Expr,
        name: &str,
        ty_args: &[Ty],
        method: &str,
        _explicit: &[ast::TypeExpr],
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        // Ranges expose `next` through dedicated lowering in for loops;
        // a direct call materializes Maybe via the same protocol.
        let sig = self
            .env
            .inherent_method(name, method)
            .cloned()
            .or_else(|| self.env.behavior_method(name, method).map(|(_, s)| s));
        let Some(sig) = sig else {
            return Err(CodegenError::with_span(
                "C006",
                format!("method `{}` not found on `{}`", method, name),
                span.clone(),
            ));
        };

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

        // Receiver passes by pointer.
        let (recv_ptr, _) = self.gen_place(receiver)?;
        let mut arg_text = vec![format!("ptr {}", recv_ptr)];
        for (arg, (_, param_ty)) in args
            .iter()
            .zip(sig.params.iter().filter(|(n, _)| n != "this"))
        {
            let param_sem = param_ty.substitute(&map);
            let param_llvm = self.llvm_type(&param_sem);
            self.expected_literal_ty = Some(param_llvm.clone());
            let value = self.gen_expr(arg)?;
            self.expected_literal_ty = None;
            let value = self.coerced_store_value(value, &param_sem, &param_llvm)?;
            arg_text.push(format!("{} {}", param_llvm, value));
        }

        let stem = if ty_args.is_empty() {
            format!("{}_{}", name, method)
        } else {
            // Generic struct methods are instantiated together with the
            // type.
            let mangled = super::mangle::mangle_name(name, ty_args);
            self.require_method_instantiation(name, ty_args, method, span)?;
            format!("{}_{}", mangled, method)
        };

        let ret_sem = sig.ret.substitute(&map);
        let ret_llvm = if ret_sem == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&ret_sem)
        };
        if ret_llvm == "void" {
            self.emit_line(format!(
                "  call void @tml_{}({})",
                stem,
                arg_text.join(", ")
            ));
            self.set_last(Ty::Unit, "void");
            Ok(String::new())
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} @tml_{}({})",
                reg,
                ret_llvm,
                stem,
                arg_text.join(", ")
            ));
            self.set_last(ret_sem, &ret_llvm);
            Ok(reg)
        }
    }

    /// Class method dispatch: virtual methods go through the vtable
    /// slot, everything else calls the providing class directly.
    fn gen_class_method(
        &mut self,
        receiver: &ast::Expr,
        class: &str,
        method: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let (owner, info) = self.env.find_class_method(class, method).ok_or_else(|| {
            CodegenError::with_span(
                "C006",
                format!("method `{}` not found on class `{}`", method, class),
                span.clone(),
            )
        })?;

        let obj = self.gen_expr(receiver)?;
        let is_base_call = matches!(&receiver.kind, ast::ExprKind::Base);

        let mut arg_text = vec![format!("ptr {}", obj)];
        for (arg, (_, param_ty)) in args
            .iter()
            .zip(info.sig.params.iter().filter(|(n, _)| n != "this"))
        {
            let param_sem = param_ty.clone();
            let param_llvm = self.llvm_type(&param_sem);
            self.expected_literal_ty = Some(param_llvm.clone());
            let value = self.gen_expr(arg)?;
            self.expected_literal_ty = None;
            let value = self.coerced_store_value(value, &param_sem, &param_llvm)?;
            arg_text.push(format!("{} {}", param_llvm, value));
        }

        let ret_sem = info.sig.ret.clone();
        let ret_llvm = if ret_sem == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&ret_sem)
        };

        let slots = self.env.vtable_layout(class);
        let slot_index = slots.iter().position(|s| s == method);
        let dispatch_virtual = (info.is_virtual || info.is_override)
            && self.env.class_needs_vtable(class)
            && slot_index.is_some()
            && !is_base_call;

        if dispatch_virtual {
            let slot_index = slot_index.unwrap_or(0);
            let mangled = self.require_class_instantiation(class, &[]);
            // Load the vtable pointer from field 0 of the object.
            let vtable_ptr_ptr = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds %class.{}, ptr {}, i32 0, i32 0",
                vtable_ptr_ptr, mangled, obj
            ));
            let vtable_ptr = self.fresh_reg();
            self.emit_line(format!("  {} = load ptr, ptr {}", vtable_ptr, vtable_ptr_ptr));
            let slot_ptr = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds ptr, ptr {}, i64 {}",
                slot_ptr, vtable_ptr, slot_index
            ));
            let fn_ptr = self.fresh_reg();
            self.emit_line(format!("  {} = load ptr, ptr {}", fn_ptr, slot_ptr));
            if ret_llvm == "void" {
                self.emit_line(format!(
                    "  call void {}({})",
                    fn_ptr,
                    arg_text.join(", ")
                ));
                self.set_last(Ty::Unit, "void");
                return Ok(String::new());
            }
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} {}({})",
                reg,
                ret_llvm,
                fn_ptr,
                arg_text.join(", ")
            ));
            self.set_last(ret_sem, &ret_llvm);
            return Ok(reg);
        }

        let stem = format!("{}_{}", owner, method);
        if ret_llvm == "void" {
            self.emit_line(format!(
                "  call void @tml_{}({})",
                stem,
                arg_text.join(", ")
            ));
            self.set_last(Ty::Unit, "void");
            Ok(String::new())
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} @tml_{}({})",
                reg,
                ret_llvm,
                stem,
                arg_text.join(", ")
            ));
            self.set_last(ret_sem, &ret_llvm);
            Ok(reg)
        }
    }

    fn gen_dyn_method(
        &mut self,
        receiver: &ast::Expr,
        behavior: &str,
        method: &str,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let sig = self
            .env
            .behaviors
            .get(behavior)
            .and_then(|b| b.method(method))
            .map(|m| m.sig.clone())
            .ok_or_else(|| {
                CodegenError::with_span(
                    "C033",
                    format!("method `{}` not found in vtable of `{}`", method, behavior),
                    span.clone(),
                )
            })?;
        let slot_index = self
            .env
            .behaviors
            .get(behavior)
            .map(|b| {
                b.methods
                    .iter()
                    .position(|m| m.sig.name == method)
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        let fat = self.gen_expr(receiver)?;
        let data = self.fresh_reg();
        self.emit_line(format!(
            "  {} = extractvalue {{ ptr, ptr }} {}, 0",
            data, fat
        ));
        let vtable = self.fresh_reg();
        self.emit_line(format!(
            "  {} = extractvalue {{ ptr, ptr }} {}, 1",
            vtable, fat
        ));
        let slot_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds ptr, ptr {}, i64 {}",
            slot_ptr, vtable, slot_index
        ));
        let fn_ptr = self.fresh_reg();
        self.emit_line(format!("  {} = load ptr, ptr {}", fn_ptr, slot_ptr));

        let mut arg_text = vec![format!("ptr {}", data)];
        for (arg, (_, param_ty)) in args
            .iter()
            .zip(sig.params.iter().filter(|(n, _)| n != "this"))
        {
            let param_llvm = self.llvm_type(param_ty);
            let value = self.gen_expr(arg)?;
            arg_text.push(format!("{} {}", param_llvm, value));
        }
        let ret_llvm = if sig.ret == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&sig.ret)
        };
        if ret_llvm == "void" {
            self.emit_line(format!("  call void {}({})", fn_ptr, arg_text.join(", ")));
            self.set_last(Ty::Unit, "void");
            Ok(String::new())
        } else {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = call {} {}({})",
                reg,
                ret_llvm,
                fn_ptr,
                arg_text.join(", ")
            ));
            self.set_last(sig.ret.clone(), &ret_llvm);
            Ok(reg)
        }
    }

    // ==================== new ====================

    /// `new C(args)`: compute the size via the GEP-null trick, malloc,
    /// store the vtable pointer, call the `init` constructor if any.
    pub(crate) fn gen_new(
        &mut self,
        class: &ast::PathRef,
        args: &[ast::Expr],
        span: &ast::Span,
    ) -> CgResult<String> {
        let name = class.last().to_string();
        let info = self.env.classes.get(&name).cloned().ok_or_else(|| {
            CodegenError::with_span(
                "C032",
                format!("unknown class `{}` in new expression", name),
                span.clone(),
            )
        })?;
        let ty_args: Vec<Ty> = class
            .type_args
            .iter()
            .map(|t| self.resolve_type_expr(t))
            .collect();
        let mangled = self.require_class_instantiation(&name, &ty_args);
        let class_ty = format!("%class.{}", mangled);

        let obj = if info.is_value_class {
            let slot = self.fresh_reg();
            self.emit_line(format!("  {} = alloca {}", slot, class_ty));
            slot
        } else {
            // sizeof via getelementptr null, 1.
            let size_ptr = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr {}, ptr null, i32 1",
                size_ptr, class_ty
            ));
            let size = self.fresh_reg();
            self.emit_line(format!("  {} = ptrtoint ptr {} to i64", size, size_ptr));
            self.runtime("malloc");
            let raw = self.fresh_reg();
            self.emit_line(format!("  {} = call ptr @malloc(i64 {})", raw, size));
            raw
        };

        if self.env.class_needs_vtable(&name) {
            self.require_vtable(&name);
            let vtable_field = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
                vtable_field, class_ty, obj
            ));
            self.emit_line(format!(
                "  store ptr @vtable.{}, ptr {}",
                name, vtable_field
            ));
        }

        // Constructor call or positional field initialization.
        if let Some(ctor) = info.method("init") {
            let mut arg_text = vec![format!("ptr {}", obj)];
            for (arg, (_, param_ty)) in args
                .iter()
                .zip(ctor.sig.params.iter().filter(|(n, _)| n != "this"))
            {
                let param_llvm = self.llvm_type(param_ty);
                self.expected_literal_ty = Some(param_llvm.clone());
                let value = self.gen_expr(arg)?;
                self.expected_literal_ty = None;
                arg_text.push(format!("{} {}", param_llvm, value));
            }
            self.emit_line(format!(
                "  call void @tml_{}_init({})",
                name,
                arg_text.join(", ")
            ));
        } else if !args.is_empty() {
            let required: Vec<_> = info
                .fields
                .iter()
                .filter(|f| !f.has_default)
                .cloned()
                .collect();
            for (arg, field) in args.iter().zip(&required) {
                let Some((index, field_ty)) = self.class_field_index(&name, &field.name) else {
                    continue;
                };
                let field_llvm = self.llvm_type(&field_ty);
                self.expected_literal_ty = Some(field_llvm.clone());
                let value = self.gen_expr(arg)?;
                self.expected_literal_ty = None;
                let field_ptr = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                    field_ptr, class_ty, obj, index
                ));
                self.emit_line(format!(
                    "  store {} {}, ptr {}",
                    field_llvm, value, field_ptr
                ));
            }
        }

        if info.is_value_class {
            let reg = self.fresh_reg();
            self.emit_line(format!("  {} = load {}, ptr {}", reg, class_ty, obj));
            self.set_last(
                Ty::Class {
                    name,
                    args: ty_args,
                },
                &class_ty,
            );
            Ok(reg)
        } else {
            self.set_last(
                Ty::Class {
                    name,
                    args: ty_args,
                },
                "ptr",
            );
            Ok(obj)
        }
    }

    // ==================== try ====================

    /// `expr!`: branch on the tag; tag 1 (Ok/Just) yields the payload,
    /// anything else rebuilds the error variant and returns it.
    pub(crate) fn gen_try(&mut self, inner: &ast::Expr, span: &ast::Span) -> CgResult<String> {
        let inner_sem = self.infer_expr_ty(inner);
        let (enum_name, enum_args, payload_sem) = match &inner_sem {
            Ty::Named { name, args, .. } if name == "Maybe" && args.len() == 1 => {
                ("Maybe", args.clone(), args[0].clone())
            }
            Ty::Named { name, args, .. } if name == "Outcome" && args.len() == 2 => {
                ("Outcome", args.clone(), args[0].clone())
            }
            other => {
                return Err(CodegenError::with_span(
                    "C003",
                    format!("try operator on non-Outcome/Maybe type `{}`", other),
                    span.clone(),
                ));
            }
        };

        let value = self.gen_expr(inner)?;
        let enum_llvm = self.last_ty.clone();
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, enum_llvm));
        self.emit_line(format!("  store {} {}, ptr {}", enum_llvm, value, slot));

        let tag_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
            tag_ptr, enum_llvm, slot
        ));
        let tag = self.fresh_reg();
        self.emit_line(format!("  {} = load i32, ptr {}", tag, tag_ptr));
        let is_ok = self.fresh_reg();
        self.emit_line(format!("  {} = icmp eq i32 {}, 1", is_ok, tag));

        let ok_label = self.fresh_label("try_ok");
        let err_label = self.fresh_label("try_err");
        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            is_ok, ok_label, err_label
        ));

        // Error path: propagate. The returned enum shares the payload
        // bytes, so the incoming storage can be returned wholesale when
        // the function's error shape matches.
        self.emit_line(format!("{}:", err_label));
        self.block_terminated = false;
        let ret_ty = self.current_ret_ty.clone();
        if ret_ty == enum_llvm {
            let propagated = self.fresh_reg();
            self.emit_line(format!(
                "  {} = load {}, ptr {}",
                propagated, enum_llvm, slot
            ));
            self.emit_scope_drops();
            self.emit_line(format!("  ret {} {}", ret_ty, propagated));
        } else {
            // Different instantiation: rebuild the failure variant in
            // the function's return shape (tag 0 carries the payload
            // bytes for Outcome errors; Nothing carries none).
            let ret_slot = self.fresh_reg();
            self.emit_line(format!("  {} = alloca {}", ret_slot, ret_ty));
            let ret_tag = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 0",
                ret_tag, ret_ty, ret_slot
            ));
            self.emit_line(format!("  store i32 0, ptr {}", ret_tag));
            if enum_name == "Outcome" {
                let src_payload = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 1",
                    src_payload, enum_llvm, slot
                ));
                let dst_payload = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 1",
                    dst_payload, ret_ty, ret_slot
                ));
                let err_sem = enum_args.get(1).cloned().unwrap_or(Ty::Unit);
                let err_size = self.size_of(&err_sem);
                self.runtime("llvm.memcpy");
                self.emit_line(format!(
                    "  call void @llvm.memcpy.p0.p0.i64(ptr {}, ptr {}, i64 {}, i1 false)",
                    dst_payload, src_payload, err_size
                ));
            }
            let propagated = self.fresh_reg();
            self.emit_line(format!(
                "  {} = load {}, ptr {}",
                propagated, ret_ty, ret_slot
            ));
            self.emit_scope_drops();
            self.emit_line(format!("  ret {} {}", ret_ty, propagated));
        }

        // Ok path: the payload is the expression's value.
        self.emit_line(format!("{}:", ok_label));
        self.block_terminated = false;
        let payload_ptr = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 1",
            payload_ptr, enum_llvm, slot
        ));
        let payload_llvm = self.llvm_type(&payload_sem);
        let reg = self.fresh_reg();
        self.emit_line(format!(
            "  {} = load {}, ptr {}",
            reg, payload_llvm, payload_ptr
        ));
        self.set_last(payload_sem, &payload_llvm);
        Ok(reg)
    }
}

fn primitive_min(ty: &Ty) -> i128 {
    match ty {
        Ty::I8 => i8::MIN as i128,
        Ty::I16 => i16::MIN as i128,
        Ty::I32 => i32::MIN as i128,
        Ty::I64 => i64::MIN as i128,
        _ => 0,
    }
}

fn primitive_max(ty: &Ty) -> i128 {
    match ty {
        Ty::I8 => i8::MAX as i128,
        Ty::I16 => i16::MAX as i128,
        Ty::I32 => i32::MAX as i128,
        Ty::I64 => i64::MAX as i128,
        Ty::U8 => u8::MAX as i128,
        Ty::U16 => u16::MAX as i128,
        Ty::U32 => u32::MAX as i128,
        Ty::U64 => u64::MAX as i128,
        _ => 0,
    }
}
