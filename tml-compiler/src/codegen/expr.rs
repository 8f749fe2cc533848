// Expression lowering. `gen_expr` returns the value's register (or an
// inline constant) and maintains the `last_ty` / `last_sem` /
// `last_is_unsigned` side channels the way the surrounding emitters
// expect.

use super::{CgResult, CodegenError, LlvmIrGen};
use crate::ty::Ty;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    pub(crate) fn gen_expr(&mut self, expr: &ast::Expr) -> CgResult<String> {
        match &expr.kind {
            ast::ExprKind::Literal(lit) => self.gen_literal(lit),
            ast::ExprKind::Ident(name) => self.gen_ident(name, &expr.span),
            ast::ExprKind::Path(path) => self.gen_path_value(path, &expr.span),
            ast::ExprKind::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
            ast::ExprKind::Unary { op, operand } => self.gen_unary(*op, operand),
            ast::ExprKind::Assign { op, target, value } => self.gen_assign(*op, target, value),
            ast::ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.gen_call(callee, type_args, args, &expr.span),
            ast::ExprKind::MethodCall {
                receiver,
                method,
                type_args,
                args,
            } => self.gen_method_call(receiver, method, type_args, args, &expr.span),
            ast::ExprKind::Field { object, field } => self.gen_field_access(object, field),
            ast::ExprKind::Index { object, index } => self.gen_index(object, index),
            ast::ExprKind::If {
                cond,
                then_block,
                else_branch,
            } => self.gen_if_expr(cond, then_block, else_branch.as_deref()),
            ast::ExprKind::Block(block) => self.gen_block_value(block),
            ast::ExprKind::Loop { label, body } => {
                self.gen_loop(label.as_deref(), body)?;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            ast::ExprKind::While { label, cond, body } => {
                self.gen_while(label.as_deref(), cond, body)?;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            ast::ExprKind::For {
                label,
                pattern,
                iter,
                body,
            } => {
                self.gen_for(label.as_deref(), pattern, iter, body)?;
                self.set_last(Ty::Unit, "void");
                Ok(String::new())
            }
            ast::ExprKind::When { scrutinee, arms } => self.gen_when(scrutinee, arms, &expr.span),
            ast::ExprKind::Return(value) => self.gen_return(value.as_deref()),
            ast::ExprKind::Break { label } => {
                self.gen_break(label.as_deref(), &expr.span)?;
                Ok(String::new())
            }
            ast::ExprKind::Continue { label } => {
                self.gen_continue(label.as_deref(), &expr.span)?;
                Ok(String::new())
            }
            ast::ExprKind::StructLit { path, fields, base } => {
                self.gen_struct_lit(path, fields, base.as_deref(), &expr.span)
            }
            ast::ExprKind::Tuple(elems) => self.gen_tuple(elems),
            ast::ExprKind::Array(elems) => self.gen_array(elems),
            ast::ExprKind::ArrayRepeat { elem, count } => self.gen_array_repeat(elem, count),
            ast::ExprKind::Closure {
                is_move,
                params,
                return_type,
                body,
            } => self.gen_closure(*is_move, params, return_type.as_ref(), body),
            ast::ExprKind::Range {
                start,
                end,
                inclusive,
            } => self.gen_range(start, end, *inclusive),
            ast::ExprKind::Cast { expr: inner, ty } => self.gen_cast(inner, ty),
            ast::ExprKind::Is { expr: inner, ty } => self.gen_is(inner, ty),
            ast::ExprKind::Try(inner) => self.gen_try(inner, &expr.span),
            ast::ExprKind::Await(inner) => {
                // The synchronous runtime resolves awaits immediately.
                self.gen_expr(inner)
            }
            ast::ExprKind::InterpolatedString(parts) => self.gen_interpolated(parts),
            ast::ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.gen_ternary(cond, then_expr, else_expr),
            ast::ExprKind::New { class, args } => self.gen_new(class, args, &expr.span),
            ast::ExprKind::Base => self.gen_base(&expr.span),
        }
    }

    pub(crate) fn set_last(&mut self, sem: Ty, llvm_ty: &str) {
        self.last_is_unsigned = sem.is_unsigned();
        self.last_sem = sem;
        self.last_ty = llvm_ty.to_string();
    }

    // ==================== Literals ====================

    pub(crate) fn gen_literal(&mut self, lit: &ast::Literal) -> CgResult<String> {
        match lit {
            ast::Literal::Int { value, suffix } => {
                let sem = suffix
                    .as_ref()
                    .and_then(|s| Ty::primitive_from_name(s.type_name()))
                    .or_else(|| {
                        self.expected_literal_ty
                            .as_deref()
                            .and_then(llvm_int_to_sem)
                    })
                    .unwrap_or(Ty::I32);
                let llvm_ty = self.llvm_type(&sem);
                self.set_last(sem, &llvm_ty);
                Ok(format!("{}", *value as i128))
            }
            ast::Literal::Float { value, suffix } => {
                let sem = suffix
                    .as_ref()
                    .and_then(|s| Ty::primitive_from_name(s.type_name()))
                    .or_else(|| match self.expected_literal_ty.as_deref() {
                        Some("float") => Some(Ty::F32),
                        _ => None,
                    })
                    .unwrap_or(Ty::F64);
                let llvm_ty = self.llvm_type(&sem);
                self.set_last(sem, &llvm_ty);
                Ok(float_constant(*value))
            }
            ast::Literal::Bool(b) => {
                self.set_last(Ty::Bool, "i1");
                Ok(if *b { "1" } else { "0" }.to_string())
            }
            ast::Literal::Str(text) => {
                let label = self.intern_string(text);
                self.set_last(Ty::Str, "ptr");
                Ok(label)
            }
            ast::Literal::Char(c) => {
                self.set_last(Ty::Char, "i8");
                Ok(format!("{}", *c as u32 as u8))
            }
            ast::Literal::Null => {
                self.set_last(
                    Ty::Ptr {
                        mutable: false,
                        inner: Box::new(Ty::Unit),
                    },
                    "ptr",
                );
                Ok("null".to_string())
            }
        }
    }

    // ==================== Identifiers ====================

    fn gen_ident(&mut self, name: &str, span: &ast::Span) -> CgResult<String> {
        if let Some(info) = self.locals.get(name).cloned() {
            if info.direct {
                self.set_last(info.sem.clone(), &info.llvm_ty);
                return Ok(info.ptr);
            }
            let reg = self.fresh_reg();
            self.emit_line(format!("  {} = load {}, ptr {}", reg, info.llvm_ty, info.ptr));
            self.set_last(info.sem.clone(), &info.llvm_ty);
            return Ok(reg);
        }

        if let Some(konst) = self.env.consts.get(name).cloned() {
            let llvm_ty = self.llvm_type(&konst.ty);
            self.set_last(konst.ty.clone(), &llvm_ty);
            return Ok(konst
                .int_value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "0".to_string()));
        }

        // Bare unit variant (`Nothing`) materializes an enum value.
        if let Some((info, idx)) = self.env.enum_for_variant(name) {
            if info.variants[idx].payload.is_empty() {
                let info = info.clone();
                return self.gen_enum_value(&info, idx, &[], &[], span);
            }
        }

        // Plain function reference becomes a thin fat-pointer.
        if let Some(sig) = self.env.functions.get(name).cloned() {
            let value = format!("{{ ptr @tml_{}, ptr null }}", name);
            self.set_last(sig.ty(), "{ ptr, ptr }");
            return Ok(value);
        }

        Err(CodegenError::with_span(
            "C003",
            format!("unknown identifier `{}` reached codegen", name),
            span.clone(),
        ))
    }

    fn gen_path_value(&mut self, path: &ast::PathRef, span: &ast::Span) -> CgResult<String> {
        if path.segments.len() == 2 {
            let (head, tail) = (path.segments[0].clone(), path.segments[1].clone());
            if let Some(info) = self.env.enums.get(&head).cloned() {
                if let Some((idx, variant)) = info.variant(&tail) {
                    if variant.payload.is_empty() {
                        return self.gen_enum_value(&info, idx, &[], &[], span);
                    }
                }
            }
        }
        Err(CodegenError::with_span(
            "C003",
            format!("unsupported path `{}`", path.segments.join("::")),
            span.clone(),
        ))
    }

    // ==================== Places ====================

    /// Lower an expression to the address of its storage. Chained field
    /// accesses become GEP chains without intermediate loads.
    pub(crate) fn gen_place(&mut self, expr: &ast::Expr) -> CgResult<(String, Ty)> {
        match &expr.kind {
            ast::ExprKind::Ident(name) => {
                let info = self.locals.get(name).cloned().ok_or_else(|| {
                    CodegenError::with_span(
                        "C026",
                        format!("`{}` is not an addressable variable", name),
                        expr.span.clone(),
                    )
                })?;
                Ok((info.ptr, info.sem))
            }
            ast::ExprKind::Field { object, field } => {
                let object_ty = self.infer_expr_ty(object);
                match object_ty.deref_all().clone() {
                    Ty::Class { name, .. } => {
                        // Classes are pointers; load the object pointer
                        // and index into the class layout.
                        let obj = self.gen_expr(object)?;
                        let (index, field_ty) = self
                            .class_field_index(&name, field)
                            .ok_or_else(|| {
                                CodegenError::with_span(
                                    "C027",
                                    format!("field `{}` not found on class `{}`", field, name),
                                    expr.span.clone(),
                                )
                            })?;
                        let mangled = self.require_class_instantiation(&name, &[]);
                        let reg = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds %class.{}, ptr {}, i32 0, i32 {}",
                            reg, mangled, obj, index
                        ));
                        Ok((reg, field_ty))
                    }
                    base_ty => {
                        let (base_ptr, base_sem) = self.gen_place_or_spill(object, base_ty)?;
                        self.gen_field_ptr(&base_ptr, &base_sem, field, &expr.span)
                    }
                }
            }
            ast::ExprKind::Index { object, index } => {
                let object_ty = self.infer_expr_ty(object);
                let (base_ptr, base_sem) = self.gen_place_or_spill(object, object_ty)?;
                match base_sem.deref_all().clone() {
                    Ty::Array { elem, size } => {
                        self.expected_literal_ty = Some("i64".to_string());
                        let idx = self.gen_expr(index)?;
                        let idx = self.to_i64(idx)?;
                        self.expected_literal_ty = None;
                        let elem_llvm = self.llvm_type(&elem);
                        let arr_ty = format!("[{} x {}]", size, elem_llvm);
                        let reg = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds {}, ptr {}, i64 0, i64 {}",
                            reg, arr_ty, base_ptr, idx
                        ));
                        Ok((reg, (*elem).clone()))
                    }
                    Ty::Slice { elem } => {
                        let data = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds {{ ptr, i64 }}, ptr {}, i32 0, i32 0",
                            data, base_ptr
                        ));
                        let base = self.fresh_reg();
                        self.emit_line(format!("  {} = load ptr, ptr {}", base, data));
                        self.expected_literal_ty = Some("i64".to_string());
                        let idx = self.gen_expr(index)?;
                        let idx = self.to_i64(idx)?;
                        self.expected_literal_ty = None;
                        let elem_llvm = self.llvm_type(&elem);
                        let reg = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds {}, ptr {}, i64 {}",
                            reg, elem_llvm, base, idx
                        ));
                        Ok((reg, (*elem).clone()))
                    }
                    other => Err(CodegenError::with_span(
                        "C003",
                        format!("cannot index a value of type `{}`", other),
                        expr.span.clone(),
                    )),
                }
            }
            ast::ExprKind::Unary {
                op: ast::UnaryOp::Deref,
                operand,
            } => {
                let value = self.gen_expr(operand)?;
                let sem = match self.last_sem.clone() {
                    Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => *inner,
                    other => other,
                };
                Ok((value, sem))
            }
            _ => {
                // Spill an rvalue into a temporary slot.
                let ty = self.infer_expr_ty(expr);
                self.gen_place_or_spill(expr, ty)
            }
        }
    }

    /// Place of an lvalue, or an alloca'd copy of an rvalue.
    fn gen_place_or_spill(&mut self, expr: &ast::Expr, sem: Ty) -> CgResult<(String, Ty)> {
        match &expr.kind {
            ast::ExprKind::Ident(_)
            | ast::ExprKind::Field { .. }
            | ast::ExprKind::Index { .. } => {
                // References transparently point at their target.
                if let Ty::Ref { inner, .. } = &sem {
                    if let ast::ExprKind::Ident(name) = &expr.kind {
                        if let Some(info) = self.locals.get(name).cloned() {
                            let reg = self.fresh_reg();
                            self.emit_line(format!("  {} = load ptr, ptr {}", reg, info.ptr));
                            return Ok((reg, (**inner).clone()));
                        }
                    }
                }
                self.gen_place(expr)
            }
            _ => {
                let value = self.gen_expr(expr)?;
                let llvm_ty = self.last_ty.clone();
                let value_sem = self.last_sem.clone();
                let slot = self.fresh_reg();
                self.emit_line(format!("  {} = alloca {}", slot, llvm_ty));
                self.emit_line(format!("  store {} {}, ptr {}", llvm_ty, value, slot));
                Ok((slot, value_sem))
            }
        }
    }

    /// GEP to a named field of a struct/union/tuple stored at `ptr`.
    pub(crate) fn gen_field_ptr(
        &mut self,
        base_ptr: &str,
        base_sem: &Ty,
        field: &str,
        span: &ast::Span,
    ) -> CgResult<(String, Ty)> {
        match base_sem.deref_all().clone() {
            Ty::Named { name, args, .. } => {
                if let Some(info) = self.env.structs.get(&name).cloned() {
                    let map = self.param_map(&info.type_params, &args);
                    if let Some(pos) = info.fields.iter().position(|f| f.name == field) {
                        let field_ty = info.fields[pos].ty.substitute(&map);
                        let mangled = self.require_type_instantiation(&name, &args);
                        let reg = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds %struct.{}, ptr {}, i32 0, i32 {}",
                            reg, mangled, base_ptr, pos
                        ));
                        return Ok((reg, field_ty));
                    }
                    // Smart-pointer auto-deref: load the inner pointer
                    // and GEP into the pointee.
                    if crate::typeck_is_smart_pointer(&name) && args.len() == 1 {
                        let mangled = self.require_type_instantiation(&name, &args);
                        let inner_ptr_ptr = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = getelementptr inbounds %struct.{}, ptr {}, i32 0, i32 0",
                            inner_ptr_ptr, mangled, base_ptr
                        ));
                        let inner_ptr = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = load ptr, ptr {}",
                            inner_ptr, inner_ptr_ptr
                        ));
                        // Shared pointers go through ArcInner { strong,
                        // weak, data }: the payload is field 2.
                        let data_ptr = if matches!(name.as_str(), "Arc" | "Rc" | "Shared")
                            && self.env.structs.contains_key("ArcInner")
                        {
                            let inner_mangled =
                                self.require_type_instantiation("ArcInner", &args);
                            let reg = self.fresh_reg();
                            self.emit_line(format!(
                                "  {} = getelementptr inbounds %struct.{}, ptr {}, i32 0, i32 2",
                                reg, inner_mangled, inner_ptr
                            ));
                            reg
                        } else {
                            inner_ptr
                        };
                        return self.gen_field_ptr(&data_ptr, &args[0].clone(), field, span);
                    }
                }
                if let Some(info) = self.env.unions.get(&name).cloned() {
                    if let Some(f) = info.fields.iter().find(|f| f.name == field) {
                        // Union access is a bitcast-free reinterpret of
                        // the storage with opaque pointers.
                        return Ok((base_ptr.to_string(), f.ty.clone()));
                    }
                }
                Err(CodegenError::with_span(
                    "C027",
                    format!("field `{}` not found on `{}`", field, name),
                    span.clone(),
                ))
            }
            Ty::Tuple(elems) => {
                let idx: usize = field.parse().map_err(|_| {
                    CodegenError::with_span(
                        "C027",
                        format!("invalid tuple field `{}`", field),
                        span.clone(),
                    )
                })?;
                let tuple_ty = self.llvm_type(&Ty::Tuple(elems.clone()));
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                    reg, tuple_ty, base_ptr, idx
                ));
                Ok((reg, elems.get(idx).cloned().unwrap_or(Ty::Error)))
            }
            other => Err(CodegenError::with_span(
                "C027",
                format!("cannot access field `{}` on `{}`", field, other),
                span.clone(),
            )),
        }
    }

    fn gen_field_access(&mut self, object: &ast::Expr, field: &str) -> CgResult<String> {
        // Class properties lower to getter calls.
        let object_ty = self.infer_expr_ty(object);
        if let Ty::Class { name, .. } = object_ty.deref_all() {
            let name = name.clone();
            let has_field = self
                .env
                .all_class_fields(&name)
                .iter()
                .any(|f| f.name == field);
            if !has_field {
                if let Some(info) = self.env.classes.get(&name) {
                    if let Some(p) = info.properties.iter().find(|p| p.name == field).cloned() {
                        let obj = self.gen_expr(object)?;
                        let ret_ty = self.llvm_type(&p.ty.clone());
                        let reg = self.fresh_reg();
                        self.emit_line(format!(
                            "  {} = call {} @tml_{}_get_{}(ptr {})",
                            reg, ret_ty, name, field, obj
                        ));
                        self.set_last(p.ty.clone(), &ret_ty);
                        return Ok(reg);
                    }
                }
            }
        }

        let span = object.span.clone();
        let place = self.gen_place(&ast::Expr::new(
            ast::ExprKind::Field {
                object: Box::new(object.clone()),
                field: field.to_string(),
            },
            span,
        ))?;
        let (ptr, sem) = place;
        let llvm_ty = self.llvm_type(&sem);
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, llvm_ty, ptr));
        self.set_last(sem, &llvm_ty);
        Ok(reg)
    }

    fn gen_index(&mut self, object: &ast::Expr, index: &ast::Expr) -> CgResult<String> {
        let span = object.span.clone();
        let (ptr, sem) = self.gen_place(&ast::Expr::new(
            ast::ExprKind::Index {
                object: Box::new(object.clone()),
                index: Box::new(index.clone()),
            },
            span,
        ))?;
        let llvm_ty = self.llvm_type(&sem);
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, llvm_ty, ptr));
        self.set_last(sem, &llvm_ty);
        Ok(reg)
    }

    // ==================== Assignment ====================

    fn gen_assign(
        &mut self,
        op: ast::AssignOp,
        target: &ast::Expr,
        value: &ast::Expr,
    ) -> CgResult<String> {
        let (ptr, sem) = self.gen_place(target)?;
        let llvm_ty = self.llvm_type(&sem);

        let stored = if matches!(op, ast::AssignOp::Assign) {
            self.expected_literal_ty = Some(llvm_ty.clone());
            let v = self.gen_expr(value)?;
            self.expected_literal_ty = None;
            self.coerced_store_value(v, &sem, &llvm_ty)?
        } else {
            let current = self.fresh_reg();
            self.emit_line(format!("  {} = load {}, ptr {}", current, llvm_ty, ptr));
            self.expected_literal_ty = Some(llvm_ty.clone());
            let rhs = self.gen_expr(value)?;
            self.expected_literal_ty = None;
            let binop = compound_op_name(op, &llvm_ty, sem.is_unsigned());
            if binop == "concat" {
                self.runtime("tml_str_concat");
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call ptr @tml_str_concat(ptr {}, ptr {})",
                    reg, current, rhs
                ));
                reg
            } else {
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = {} {} {}, {}",
                    reg, binop, llvm_ty, current, rhs
                ));
                reg
            }
        };

        // Bool slots are i8; coerced_store_value has already widened i1.
        self.emit_line(format!("  store {} {}, ptr {}", llvm_ty, stored, ptr));
        self.set_last(Ty::Unit, "void");
        Ok(String::new())
    }

    /// Numeric-coerce a value about to be stored into a slot of
    /// `target_ty`.
    pub(crate) fn coerced_store_value(
        &mut self,
        value: String,
        _sem: &Ty,
        target_ty: &str,
    ) -> CgResult<String> {
        let from = self.last_ty.clone();
        if from == target_ty || from == "void" {
            return Ok(value);
        }
        let unsigned = self.last_is_unsigned;
        self.coerce_numeric(value, &from, target_ty, unsigned)
    }

    // ==================== Binary / unary ====================

    fn gen_binary(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
    ) -> CgResult<String> {
        use ast::BinaryOp::*;

        if matches!(op, And | Or) {
            return self.gen_short_circuit(op, lhs, rhs);
        }

        let lhs_val = self.gen_expr(lhs)?;
        let lhs_ty = self.last_ty.clone();
        let lhs_sem = self.last_sem.clone();
        let unsigned = self.last_is_unsigned;

        // String operations route to the runtime.
        if lhs_sem == Ty::Str {
            let rhs_val = self.gen_expr(rhs)?;
            return match op {
                Add => {
                    self.runtime("tml_str_concat");
                    let reg = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = call ptr @tml_str_concat(ptr {}, ptr {})",
                        reg, lhs_val, rhs_val
                    ));
                    self.set_last(Ty::Str, "ptr");
                    Ok(reg)
                }
                Eq | Ne => {
                    self.runtime("tml_str_eq");
                    let reg = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = call i1 @tml_str_eq(ptr {}, ptr {})",
                        reg, lhs_val, rhs_val
                    ));
                    let out = if matches!(op, Ne) {
                        let inverted = self.fresh_reg();
                        self.emit_line(format!("  {} = xor i1 {}, true", inverted, reg));
                        inverted
                    } else {
                        reg
                    };
                    self.set_last(Ty::Bool, "i1");
                    Ok(out)
                }
                _ => Err(self.error(
                    "C003",
                    format!("operator `{}` is not defined for Str", op.symbol()),
                )),
            };
        }

        self.expected_literal_ty = Some(lhs_ty.clone());
        let rhs_val = self.gen_expr(rhs)?;
        let rhs_ty = self.last_ty.clone();
        self.expected_literal_ty = None;
        let rhs_val = if rhs_ty != lhs_ty {
            self.coerce_numeric(rhs_val, &rhs_ty, &lhs_ty, unsigned)?
        } else {
            rhs_val
        };

        let is_float = lhs_ty == "float" || lhs_ty == "double";
        let reg = self.fresh_reg();
        match op {
            Add | Sub | Mul | Div | Rem => {
                let name = arith_op_name(op, is_float, unsigned);
                self.emit_line(format!(
                    "  {} = {} {} {}, {}",
                    reg, name, lhs_ty, lhs_val, rhs_val
                ));
                self.set_last(lhs_sem, &lhs_ty);
                Ok(reg)
            }
            Eq | Ne | Lt | Le | Gt | Ge => {
                let cmp = cmp_op_name(op, is_float, unsigned);
                let inst = if is_float { "fcmp" } else { "icmp" };
                self.emit_line(format!(
                    "  {} = {} {} {} {}, {}",
                    reg, inst, cmp, lhs_ty, lhs_val, rhs_val
                ));
                self.set_last(Ty::Bool, "i1");
                Ok(reg)
            }
            BitAnd | BitOr | BitXor => {
                let name = match op {
                    BitAnd => "and",
                    BitOr => "or",
                    _ => "xor",
                };
                self.emit_line(format!(
                    "  {} = {} {} {}, {}",
                    reg, name, lhs_ty, lhs_val, rhs_val
                ));
                self.set_last(lhs_sem, &lhs_ty);
                Ok(reg)
            }
            Shl | Shr => {
                let name = match op {
                    Shl => "shl",
                    _ if unsigned => "lshr",
                    _ => "ashr",
                };
                self.emit_line(format!(
                    "  {} = {} {} {}, {}",
                    reg, name, lhs_ty, lhs_val, rhs_val
                ));
                self.set_last(lhs_sem, &lhs_ty);
                Ok(reg)
            }
            And | Or => unreachable!("handled by gen_short_circuit"),
        }
    }

    fn gen_short_circuit(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
    ) -> CgResult<String> {
        let lhs_val = self.gen_expr(lhs)?;
        let lhs_bool = self.as_condition(lhs_val)?;

        let rhs_label = self.fresh_label("sc_rhs");
        let merge_label = self.fresh_label("sc_end");
        let lhs_block = self.current_block_hint();

        match op {
            ast::BinaryOp::And => self.emit_line(format!(
                "  br i1 {}, label %{}, label %{}",
                lhs_bool, rhs_label, merge_label
            )),
            _ => self.emit_line(format!(
                "  br i1 {}, label %{}, label %{}",
                lhs_bool, merge_label, rhs_label
            )),
        }

        self.emit_line(format!("{}:", rhs_label));
        self.block_terminated = false;
        let rhs_val = self.gen_expr(rhs)?;
        let rhs_bool = self.as_condition(rhs_val)?;
        let rhs_end = self.current_block_hint();
        self.emit_line(format!("  br label %{}", merge_label));

        self.emit_line(format!("{}:", merge_label));
        self.block_terminated = false;
        let reg = self.fresh_reg();
        let short_value = if matches!(op, ast::BinaryOp::And) {
            "false"
        } else {
            "true"
        };
        self.emit_line(format!(
            "  {} = phi i1 [ {}, %{} ], [ {}, %{} ]",
            reg, short_value, lhs_block, rhs_bool, rhs_end
        ));
        self.set_last(Ty::Bool, "i1");
        Ok(reg)
    }

    fn gen_unary(&mut self, op: ast::UnaryOp, operand: &ast::Expr) -> CgResult<String> {
        match op {
            ast::UnaryOp::Neg => {
                let value = self.gen_expr(operand)?;
                let ty = self.last_ty.clone();
                let sem = self.last_sem.clone();
                let reg = self.fresh_reg();
                if ty == "float" || ty == "double" {
                    self.emit_line(format!("  {} = fneg {} {}", reg, ty, value));
                } else {
                    self.emit_line(format!("  {} = sub {} 0, {}", reg, ty, value));
                }
                self.set_last(sem, &ty);
                Ok(reg)
            }
            ast::UnaryOp::Not => {
                let value = self.gen_expr(operand)?;
                let cond = self.as_condition(value)?;
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = xor i1 {}, true", reg, cond));
                self.set_last(Ty::Bool, "i1");
                Ok(reg)
            }
            ast::UnaryOp::BitNot => {
                let value = self.gen_expr(operand)?;
                let ty = self.last_ty.clone();
                let sem = self.last_sem.clone();
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = xor {} {}, -1", reg, ty, value));
                self.set_last(sem, &ty);
                Ok(reg)
            }
            ast::UnaryOp::Ref { mutable } => {
                let (ptr, sem) = self.gen_place(operand)?;
                self.set_last(
                    Ty::Ref {
                        mutable,
                        inner: Box::new(sem),
                        lifetime: None,
                    },
                    "ptr",
                );
                Ok(ptr)
            }
            ast::UnaryOp::Deref => {
                let value = self.gen_expr(operand)?;
                let inner = match self.last_sem.clone() {
                    Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => *inner,
                    other => other,
                };
                let llvm_ty = self.llvm_type(&inner);
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = load {}, ptr {}", reg, llvm_ty, value));
                self.set_last(inner, &llvm_ty);
                Ok(reg)
            }
            ast::UnaryOp::PreInc | ast::UnaryOp::PreDec => {
                let (ptr, sem) = self.gen_place(operand)?;
                let llvm_ty = self.llvm_type(&sem);
                let current = self.fresh_reg();
                self.emit_line(format!("  {} = load {}, ptr {}", current, llvm_ty, ptr));
                let next = self.fresh_reg();
                let name = if matches!(op, ast::UnaryOp::PreInc) {
                    "add"
                } else {
                    "sub"
                };
                self.emit_line(format!(
                    "  {} = {} {} {}, 1",
                    next, name, llvm_ty, current
                ));
                self.emit_line(format!("  store {} {}, ptr {}", llvm_ty, next, ptr));
                self.set_last(sem, &llvm_ty);
                Ok(next)
            }
        }
    }

    /// Reduce a value of Bool-ish LLVM type to an i1 condition register.
    pub(crate) fn as_condition(&mut self, value: String) -> CgResult<String> {
        match self.last_ty.as_str() {
            "i1" => Ok(value),
            "i8" => {
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = icmp ne i8 {}, 0", reg, value));
                Ok(reg)
            }
            other => {
                let other = other.to_string();
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = icmp ne {} {}, 0", reg, other, value));
                Ok(reg)
            }
        }
    }

    /// Label of the block currently being appended to; the emitter keeps
    /// labels purely textual, so this scans backwards for the last label
    /// or falls back to `entry`.
    pub(crate) fn current_block_hint(&self) -> String {
        for line in self.out.lines().rev() {
            let trimmed = line.trim_end();
            if trimmed.ends_with(':') && !trimmed.starts_with(' ') {
                return trimmed.trim_end_matches(':').to_string();
            }
        }
        "entry".to_string()
    }

    // ==================== Aggregates ====================

    fn gen_tuple(&mut self, elems: &[ast::Expr]) -> CgResult<String> {
        if elems.is_empty() {
            self.set_last(Ty::Unit, "void");
            return Ok(String::new());
        }
        let mut sems = Vec::new();
        let mut values = Vec::new();
        for elem in elems {
            let value = self.gen_expr(elem)?;
            sems.push(self.last_sem.clone());
            values.push((value, self.last_ty.clone()));
        }
        let tuple_sem = Ty::Tuple(sems);
        let tuple_ty = self.llvm_type(&tuple_sem);
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, tuple_ty));
        for (i, (value, elem_ty)) in values.iter().enumerate() {
            let field = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                field, tuple_ty, slot, i
            ));
            self.emit_line(format!("  store {} {}, ptr {}", elem_ty, value, field));
        }
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, tuple_ty, slot));
        self.set_last(tuple_sem, &tuple_ty);
        Ok(reg)
    }

    fn gen_array(&mut self, elems: &[ast::Expr]) -> CgResult<String> {
        let elem_sem = elems
            .first()
            .map(|e| self.infer_expr_ty(e))
            .unwrap_or(Ty::I32);
        let elem_ty = self.llvm_type(&elem_sem);
        let arr_sem = Ty::Array {
            elem: Box::new(elem_sem.clone()),
            size: elems.len() as u64,
        };
        let arr_ty = format!("[{} x {}]", elems.len(), elem_ty);
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, arr_ty));
        for (i, elem) in elems.iter().enumerate() {
            self.expected_literal_ty = Some(elem_ty.clone());
            let value = self.gen_expr(elem)?;
            self.expected_literal_ty = None;
            let field = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i64 0, i64 {}",
                field, arr_ty, slot, i
            ));
            self.emit_line(format!("  store {} {}, ptr {}", elem_ty, value, field));
        }
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, arr_ty, slot));
        self.set_last(arr_sem, &arr_ty);
        Ok(reg)
    }

    fn gen_array_repeat(&mut self, elem: &ast::Expr, count: &ast::Expr) -> CgResult<String> {
        let size = match &count.kind {
            ast::ExprKind::Literal(ast::Literal::Int { value, .. }) => *value as u64,
            _ => {
                return Err(self.error("C003", "array repeat count must be constant"));
            }
        };
        let elem_sem = self.infer_expr_ty(elem);
        let elem_ty = self.llvm_type(&elem_sem);
        let arr_ty = format!("[{} x {}]", size, elem_ty);
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, arr_ty));
        let value = self.gen_expr(elem)?;
        for i in 0..size {
            let field = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i64 0, i64 {}",
                field, arr_ty, slot, i
            ));
            self.emit_line(format!("  store {} {}, ptr {}", elem_ty, value, field));
        }
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, arr_ty, slot));
        self.set_last(
            Ty::Array {
                elem: Box::new(elem_sem),
                size,
            },
            &arr_ty,
        );
        Ok(reg)
    }

    fn gen_struct_lit(
        &mut self,
        path: &ast::PathRef,
        fields: &[(String, ast::Expr)],
        base: Option<&ast::Expr>,
        span: &ast::Span,
    ) -> CgResult<String> {
        let name = path.last().to_string();

        if self.env.unions.contains_key(&name) {
            return self.gen_union_lit(&name, fields, span);
        }

        let info = self.env.structs.get(&name).cloned().ok_or_else(|| {
            CodegenError::with_span(
                "C005",
                format!("struct or class `{}` not found in codegen", name),
                span.clone(),
            )
        })?;

        // Generic argument deduction from the field initializers.
        let mut args = vec![Ty::Unit; info.type_params.len()];
        for (field_name, value) in fields {
            if let Some(f) = info.fields.iter().find(|f| &f.name == field_name) {
                if let Ty::Named { name: pname, args: pa, .. } = &f.ty {
                    if pa.is_empty() {
                        if let Some(pos) = info.type_params.iter().position(|p| p == pname) {
                            args[pos] = self.infer_expr_ty(value);
                        }
                    }
                }
            }
        }

        let mangled = self.require_type_instantiation(&name, &args);
        let struct_ty = format!("%struct.{}", mangled);
        let map = self.param_map(&info.type_params, &args);

        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, struct_ty));

        if let Some(base_expr) = base {
            let base_val = self.gen_expr(base_expr)?;
            self.emit_line(format!(
                "  store {} {}, ptr {}",
                struct_ty, base_val, slot
            ));
        }

        for (field_name, value) in fields {
            let Some(pos) = info.fields.iter().position(|f| &f.name == field_name) else {
                return Err(CodegenError::with_span(
                    "C027",
                    format!("field `{}` not found on `{}`", field_name, name),
                    value.span.clone(),
                ));
            };
            let field_sem = info.fields[pos].ty.substitute(&map);
            let field_ty = self.llvm_type(&field_sem);
            self.expected_literal_ty = Some(field_ty.clone());
            let field_val = self.gen_expr(value)?;
            self.expected_literal_ty = None;
            let field_val = self.coerced_store_value(field_val, &field_sem, &field_ty)?;
            let field_ptr = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                field_ptr, struct_ty, slot, pos
            ));
            self.emit_line(format!(
                "  store {} {}, ptr {}",
                field_ty, field_val, field_ptr
            ));
        }

        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, struct_ty, slot));
        self.set_last(
            Ty::Named {
                name,
                module: String::new(),
                args,
            },
            &struct_ty,
        );
        Ok(reg)
    }

    fn gen_union_lit(
        &mut self,
        name: &str,
        fields: &[(String, ast::Expr)],
        span: &ast::Span,
    ) -> CgResult<String> {
        let union_ty = format!("%union.{}", name);
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, union_ty));
        if let Some((_, value)) = fields.first() {
            let field_val = self.gen_expr(value)?;
            let field_ty = self.last_ty.clone();
            self.emit_line(format!(
                "  store {} {}, ptr {}",
                field_ty, field_val, slot
            ));
        } else {
            return Err(CodegenError::with_span(
                "C003",
                format!("union literal `{}` has no field", name),
                span.clone(),
            ));
        }
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, union_ty, slot));
        self.set_last(Ty::named(name), &union_ty);
        Ok(reg)
    }

    // ==================== Ranges, casts, is ====================

    fn gen_range(
        &mut self,
        start: &ast::Expr,
        end: &ast::Expr,
        inclusive: bool,
    ) -> CgResult<String> {
        let start_val = self.gen_expr(start)?;
        let elem_ty = self.last_ty.clone();
        let elem_sem = self.last_sem.clone();
        self.expected_literal_ty = Some(elem_ty.clone());
        let end_val = self.gen_expr(end)?;
        self.expected_literal_ty = None;

        let range_ty = format!("{{ {}, {}, i8 }}", elem_ty, elem_ty);
        let slot = self.fresh_reg();
        self.emit_line(format!("  {} = alloca {}", slot, range_ty));
        for (idx, (value, ty)) in [
            (start_val.as_str(), elem_ty.as_str()),
            (end_val.as_str(), elem_ty.as_str()),
        ]
        .iter()
        .enumerate()
        {
            let field = self.fresh_reg();
            self.emit_line(format!(
                "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 {}",
                field, range_ty, slot, idx
            ));
            self.emit_line(format!("  store {} {}, ptr {}", ty, value, field));
        }
        let incl_field = self.fresh_reg();
        self.emit_line(format!(
            "  {} = getelementptr inbounds {}, ptr {}, i32 0, i32 2",
            incl_field, range_ty, slot
        ));
        self.emit_line(format!(
            "  store i8 {}, ptr {}",
            u8::from(inclusive),
            incl_field
        ));
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = load {}, ptr {}", reg, range_ty, slot));
        self.set_last(
            Ty::Named {
                name: "Range".to_string(),
                module: String::new(),
                args: vec![elem_sem],
            },
            &range_ty,
        );
        Ok(reg)
    }

    fn gen_cast(&mut self, inner: &ast::Expr, ty: &ast::TypeExpr) -> CgResult<String> {
        let value = self.gen_expr(inner)?;
        let from_ty = self.last_ty.clone();
        let unsigned = self.last_is_unsigned;
        let target_sem = self.resolve_type_expr(ty);
        let target_ty = self.llvm_type(&target_sem);

        let result = if from_ty == target_ty {
            value
        } else if from_ty == "ptr" && target_ty != "ptr" {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = ptrtoint ptr {} to {}",
                reg, value, target_ty
            ));
            reg
        } else if from_ty != "ptr" && target_ty == "ptr" {
            let reg = self.fresh_reg();
            self.emit_line(format!(
                "  {} = inttoptr {} {} to ptr",
                reg, from_ty, value
            ));
            reg
        } else {
            self.coerce_numeric(value, &from_ty, &target_ty, unsigned)?
        };
        self.set_last(target_sem, &target_ty);
        Ok(result)
    }

    fn gen_is(&mut self, inner: &ast::Expr, ty: &ast::TypeExpr) -> CgResult<String> {
        let inner_sem = self.infer_expr_ty(inner);
        let target = self.resolve_type_expr(ty);

        // Class values test against the target's vtable pointer.
        if let (Ty::Class { name: actual, .. }, Ty::Class { name: wanted, .. }) =
            (inner_sem.deref_all(), &target)
        {
            let actual = actual.clone();
            let wanted = wanted.clone();
            if self.env.class_needs_vtable(&actual) {
                let obj = self.gen_expr(inner)?;
                self.require_vtable(&wanted);
                let vtable_ptr = self.fresh_reg();
                let mangled = self.require_class_instantiation(&actual, &[]);
                self.emit_line(format!(
                    "  {} = getelementptr inbounds %class.{}, ptr {}, i32 0, i32 0",
                    vtable_ptr, mangled, obj
                ));
                let loaded = self.fresh_reg();
                self.emit_line(format!("  {} = load ptr, ptr {}", loaded, vtable_ptr));
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = icmp eq ptr {}, @vtable.{}",
                    reg, loaded, wanted
                ));
                self.set_last(Ty::Bool, "i1");
                return Ok(reg);
            }
        }

        // Everything else is statically decided.
        let value = if types_statically_equal(&inner_sem, &target) {
            "1"
        } else {
            "0"
        };
        self.gen_expr(inner)?; // evaluate for effects
        self.set_last(Ty::Bool, "i1");
        Ok(value.to_string())
    }

    // ==================== Interpolation ====================

    /// Build the final string through repeated runtime concatenation;
    /// the result is heap-owned and registered for drop glue.
    fn gen_interpolated(&mut self, parts: &[ast::InterpPart]) -> CgResult<String> {
        self.runtime("tml_str_concat");
        let mut acc: Option<String> = None;
        for part in parts {
            let piece = match part {
                ast::InterpPart::Text(text) => {
                    let label = self.intern_string(text);
                    label
                }
                ast::InterpPart::Expr(inner) => {
                    let value = self.gen_expr(inner)?;
                    self.stringify_value(value)?
                }
            };
            acc = Some(match acc {
                None => piece,
                Some(current) => {
                    let reg = self.fresh_reg();
                    self.emit_line(format!(
                        "  {} = call ptr @tml_str_concat(ptr {}, ptr {})",
                        reg, current, piece
                    ));
                    reg
                }
            });
        }
        let result = acc.unwrap_or_else(|| self.intern_string(""));
        self.register_heap_str(&result);
        self.set_last(Ty::Str, "ptr");
        Ok(result)
    }

    /// Convert the last-emitted value into a `ptr` string using the
    /// runtime formatters.
    pub(crate) fn stringify_value(&mut self, value: String) -> CgResult<String> {
        match self.last_ty.as_str() {
            "ptr" => Ok(value),
            "double" | "float" => {
                self.runtime("tml_float_to_str");
                let widened = if self.last_ty == "float" {
                    let reg = self.fresh_reg();
                    self.emit_line(format!("  {} = fpext float {} to double", reg, value));
                    reg
                } else {
                    value
                };
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call ptr @tml_float_to_str(double {})",
                    reg, widened
                ));
                Ok(reg)
            }
            "i1" => {
                self.runtime("tml_bool_to_str");
                let reg = self.fresh_reg();
                self.emit_line(format!("  {} = call ptr @tml_bool_to_str(i1 {})", reg, value));
                Ok(reg)
            }
            int_ty => {
                let int_ty = int_ty.to_string();
                self.runtime("tml_int_to_str");
                let widened = if int_ty == "i64" {
                    value
                } else {
                    let unsigned = self.last_is_unsigned;
                    let from = int_ty.to_string();
                    self.coerce_numeric(value, &from, "i64", unsigned)?
                };
                let reg = self.fresh_reg();
                self.emit_line(format!(
                    "  {} = call ptr @tml_int_to_str(i64 {})",
                    reg, widened
                ));
                Ok(reg)
            }
        }
    }

    fn gen_ternary(
        &mut self,
        cond: &ast::Expr,
        then_expr: &ast::Expr,
        else_expr: &ast::Expr,
    ) -> CgResult<String> {
        let cond_val = self.gen_expr(cond)?;
        let cond_bool = self.as_condition(cond_val)?;

        let then_label = self.fresh_label("tern_then");
        let else_label = self.fresh_label("tern_else");
        let merge_label = self.fresh_label("tern_end");

        self.emit_line(format!(
            "  br i1 {}, label %{}, label %{}",
            cond_bool, then_label, else_label
        ));

        self.emit_line(format!("{}:", then_label));
        self.block_terminated = false;
        let then_val = self.gen_expr(then_expr)?;
        let value_ty = self.last_ty.clone();
        let value_sem = self.last_sem.clone();
        let then_end = self.current_block_hint();
        self.emit_line(format!("  br label %{}", merge_label));

        self.emit_line(format!("{}:", else_label));
        self.block_terminated = false;
        let else_val = self.gen_expr(else_expr)?;
        let else_end = self.current_block_hint();
        self.emit_line(format!("  br label %{}", merge_label));

        self.emit_line(format!("{}:", merge_label));
        self.block_terminated = false;
        let reg = self.fresh_reg();
        self.emit_line(format!(
            "  {} = phi {} [ {}, %{} ], [ {}, %{} ]",
            reg, value_ty, then_val, then_end, else_val, else_end
        ));
        self.set_last(value_sem, &value_ty);
        Ok(reg)
    }

    fn gen_base(&mut self, span: &ast::Span) -> CgResult<String> {
        let class = self.this_class.clone().ok_or_else(|| {
            CodegenError::with_span(
                "C029",
                "cannot determine class for base expression",
                span.clone(),
            )
        })?;
        let base = self
            .env
            .classes
            .get(&class)
            .and_then(|c| c.base.clone())
            .ok_or_else(|| {
                CodegenError::with_span(
                    "C030",
                    format!("class `{}` has no base class", class),
                    span.clone(),
                )
            })?;
        // `base` is the same object pointer, re-typed.
        self.set_last(
            Ty::Class {
                name: base,
                args: Vec::new(),
            },
            "ptr",
        );
        Ok("%this".to_string())
    }
}

fn llvm_int_to_sem(llvm_ty: &str) -> Option<Ty> {
    Some(match llvm_ty {
        "i8" => Ty::I8,
        "i16" => Ty::I16,
        "i32" => Ty::I32,
        "i64" => Ty::I64,
        "i128" => Ty::I128,
        "double" => Ty::F64,
        "float" => Ty::F32,
        _ => return None,
    })
}

/// Exact textual constant for a double: hexadecimal bit pattern, the
/// representation LLVM always accepts.
pub(crate) fn float_constant(value: f64) -> String {
    format!("0x{:016X}", value.to_bits())
}

fn arith_op_name(op: ast::BinaryOp, is_float: bool, unsigned: bool) -> &'static str {
    use ast::BinaryOp::*;
    match (op, is_float) {
        (Add, false) => "add",
        (Sub, false) => "sub",
        (Mul, false) => "mul",
        (Div, false) => {
            if unsigned {
                "udiv"
            } else {
                "sdiv"
            }
        }
        (Rem, false) => {
            if unsigned {
                "urem"
            } else {
                "srem"
            }
        }
        (Add, true) => "fadd",
        (Sub, true) => "fsub",
        (Mul, true) => "fmul",
        (Div, true) => "fdiv",
        (Rem, true) => "frem",
        _ => "add",
    }
}

fn cmp_op_name(op: ast::BinaryOp, is_float: bool, unsigned: bool) -> &'static str {
    use ast::BinaryOp::*;
    if is_float {
        match op {
            Eq => "oeq",
            Ne => "one",
            Lt => "olt",
            Le => "ole",
            Gt => "ogt",
            _ => "oge",
        }
    } else if unsigned {
        match op {
            Eq => "eq",
            Ne => "ne",
            Lt => "ult",
            Le => "ule",
            Gt => "ugt",
            _ => "uge",
        }
    } else {
        match op {
            Eq => "eq",
            Ne => "ne",
            Lt => "slt",
            Le => "sle",
            Gt => "sgt",
            _ => "sge",
        }
    }
}

fn compound_op_name(op: ast::AssignOp, llvm_ty: &str, unsigned: bool) -> &'static str {
    use ast::AssignOp::*;
    let is_float = llvm_ty == "float" || llvm_ty == "double";
    if llvm_ty == "ptr" {
        return "concat";
    }
    match op {
        Add => {
            if is_float {
                "fadd"
            } else {
                "add"
            }
        }
        Sub => {
            if is_float {
                "fsub"
            } else {
                "sub"
            }
        }
        Mul => {
            if is_float {
                "fmul"
            } else {
                "mul"
            }
        }
        Div => {
            if is_float {
                "fdiv"
            } else if unsigned {
                "udiv"
            } else {
                "sdiv"
            }
        }
        Rem => {
            if is_float {
                "frem"
            } else if unsigned {
                "urem"
            } else {
                "srem"
            }
        }
        BitAnd => "and",
        BitOr => "or",
        BitXor => "xor",
        Shl => "shl",
        Shr => {
            if unsigned {
                "lshr"
            } else {
                "ashr"
            }
        }
        Assign => "add",
    }
}

fn types_statically_equal(a: &Ty, b: &Ty) -> bool {
    match (a.deref_all(), b.deref_all()) {
        (Ty::Named { name: n1, .. }, Ty::Named { name: n2, .. }) => n1 == n2,
        (Ty::Class { name: n1, .. }, Ty::Class { name: n2, .. }) => n1 == n2,
        (x, y) => x == y,
    }
}
