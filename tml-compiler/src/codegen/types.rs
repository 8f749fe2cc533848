// Semantic type -> LLVM textual type lowering, plus emission of struct,
// enum, union, and class type definitions (generic instances included).

use super::{CgResult, LlvmIrGen};
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;

impl<'a> LlvmIrGen<'a> {
    /// The lowering table of the IR contract. Signedness is tracked out
    /// of band; Bool is i8 in memory and i1 in registers.
    pub(crate) fn llvm_type(&mut self, ty: &Ty) -> String {
        match ty {
            Ty::I8 | Ty::U8 | Ty::Bool | Ty::Char => "i8".to_string(),
            Ty::I16 | Ty::U16 => "i16".to_string(),
            Ty::I32 | Ty::U32 => "i32".to_string(),
            Ty::I64 | Ty::U64 => "i64".to_string(),
            Ty::I128 | Ty::U128 => "i128".to_string(),
            Ty::F32 => "float".to_string(),
            Ty::F64 => "double".to_string(),
            Ty::Str | Ty::Ptr { .. } | Ty::Ref { .. } => "ptr".to_string(),
            Ty::Unit => "void".to_string(),
            Ty::Tuple(elems) => {
                let inner: Vec<String> = elems.iter().map(|e| self.llvm_type(e)).collect();
                format!("{{ {} }}", inner.join(", "))
            }
            Ty::Array { elem, size } => {
                format!("[{} x {}]", size, self.llvm_type(elem))
            }
            Ty::Slice { .. } => "{ ptr, i64 }".to_string(),
            Ty::Named { name, args, .. } => {
                if self.env.unions.contains_key(name) {
                    return format!("%union.{}", name);
                }
                if name == "Range" {
                    // Ranges lower to a { start, end, inclusive } struct.
                    let elem = args
                        .first()
                        .map(|a| self.llvm_type(a))
                        .unwrap_or_else(|| "i64".to_string());
                    return format!("{{ {}, {}, i8 }}", elem, elem);
                }
                let mangled = self.require_type_instantiation(name, args);
                format!("%struct.{}", mangled)
            }
            Ty::Class { name, args } => {
                let mangled = self.require_class_instantiation(name, args);
                if self.class_is_value(name) {
                    format!("%class.{}", mangled)
                } else {
                    "ptr".to_string()
                }
            }
            Ty::DynBehavior { .. } => "{ ptr, ptr }".to_string(),
            Ty::Func { .. } => "ptr".to_string(),
            Ty::Closure { .. } => "{ ptr, ptr }".to_string(),
            Ty::Var(_) | Ty::Error => "ptr".to_string(),
        }
    }

    pub(crate) fn class_is_value(&self, name: &str) -> bool {
        self.env
            .classes
            .get(name)
            .map(|c| c.is_value_class)
            .unwrap_or(false)
    }

    /// Byte size of a lowered type, for enum payload sizing and the
    /// malloc fallback path.
    pub(crate) fn size_of(&mut self, ty: &Ty) -> u64 {
        match ty {
            Ty::I8 | Ty::U8 | Ty::Bool | Ty::Char => 1,
            Ty::I16 | Ty::U16 => 2,
            Ty::I32 | Ty::U32 | Ty::F32 => 4,
            Ty::I64 | Ty::U64 | Ty::F64 => 8,
            Ty::I128 | Ty::U128 => 16,
            Ty::Str | Ty::Ptr { .. } | Ty::Ref { .. } | Ty::Func { .. } => 8,
            Ty::Unit => 0,
            Ty::Tuple(elems) => elems.iter().map(|e| self.size_of(e)).sum(),
            Ty::Array { elem, size } => self.size_of(elem) * size,
            Ty::Slice { .. } | Ty::Closure { .. } | Ty::DynBehavior { .. } => 16,
            Ty::Named { name, args, .. } => {
                if let Some(info) = self.env.structs.get(name).cloned() {
                    let map = self.param_map(&info.type_params, args);
                    return info
                        .fields
                        .iter()
                        .map(|f| {
                            let ty = f.ty.substitute(&map);
                            self.size_of(&ty)
                        })
                        .sum();
                }
                if let Some(info) = self.env.enums.get(name).cloned() {
                    let map = self.param_map(&info.type_params, args);
                    let payload = info
                        .variants
                        .iter()
                        .map(|v| {
                            v.payload
                                .iter()
                                .map(|p| {
                                    let ty = p.substitute(&map);
                                    self.size_of(&ty)
                                })
                                .sum::<u64>()
                        })
                        .max()
                        .unwrap_or(0);
                    return 4 + payload.max(4);
                }
                if let Some(info) = self.env.unions.get(name).cloned() {
                    return info
                        .fields
                        .iter()
                        .map(|f| self.size_of(&f.ty.clone()))
                        .max()
                        .unwrap_or(0);
                }
                8
            }
            Ty::Class { name, .. } => {
                if self.class_is_value(name) {
                    let fields = self.env.all_class_fields(name);
                    fields.iter().map(|f| self.size_of(&f.ty.clone())).sum()
                } else {
                    8
                }
            }
            Ty::Var(_) | Ty::Error => 8,
        }
    }

    pub(crate) fn param_map(&self, params: &[String], args: &[Ty]) -> HashMap<String, Ty> {
        params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect()
    }

    /// Max payload byte size across an enum's variants (after
    /// substitution).
    pub(crate) fn enum_payload_size(&mut self, name: &str, args: &[Ty]) -> u64 {
        let Some(info) = self.env.enums.get(name).cloned() else {
            return 8;
        };
        let map = self.param_map(&info.type_params, args);
        info.variants
            .iter()
            .map(|v| {
                v.payload
                    .iter()
                    .map(|p| {
                        let ty = p.substitute(&map);
                        self.size_of(&ty)
                    })
                    .sum::<u64>()
            })
            .max()
            .unwrap_or(0)
            .max(4)
    }

    // ==================== Type definitions ====================

    /// Emit `%struct.Mangled = type { … }` (or the enum layout) once.
    /// Returns the mangled base name.
    pub(crate) fn require_type_instantiation(&mut self, name: &str, args: &[Ty]) -> String {
        let mangled = super::mangle::mangle_name(name, args);
        if self.defined_types.contains(&mangled) {
            return mangled;
        }
        if self.env.structs.contains_key(name) {
            self.define_struct_type(name, args);
        } else if self.env.enums.contains_key(name) {
            self.define_enum_type(name, args);
        }
        mangled
    }

    pub(crate) fn define_struct_type(&mut self, name: &str, args: &[Ty]) {
        let mangled = super::mangle::mangle_name(name, args);
        if !self.defined_types.insert(mangled.clone()) {
            return;
        }
        let Some(info) = self.env.structs.get(name).cloned() else {
            return;
        };
        let map = self.param_map(&info.type_params, args);
        let fields: Vec<String> = info
            .fields
            .iter()
            .map(|f| {
                let ty = f.ty.substitute(&map);
                self.llvm_type(&ty)
            })
            .collect();
        let body = if fields.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", fields.join(", "))
        };
        self.type_defs
            .push_str(&format!("%struct.{} = type {}\n", mangled, body));
    }

    /// Enums lower to `{ i32 tag, [N x i8] payload }`.
    pub(crate) fn define_enum_type(&mut self, name: &str, args: &[Ty]) {
        let mangled = super::mangle::mangle_name(name, args);
        if !self.defined_types.insert(mangled.clone()) {
            return;
        }
        let payload = self.enum_payload_size(name, args);
        self.type_defs.push_str(&format!(
            "%struct.{} = type {{ i32, [{} x i8] }}\n",
            mangled, payload
        ));
    }

    pub(crate) fn define_union_type(&mut self, name: &str) {
        let key = format!("union.{}", name);
        if !self.defined_types.insert(key) {
            return;
        }
        let size = self
            .env
            .unions
            .get(name)
            .cloned()
            .map(|u| {
                u.fields
                    .iter()
                    .map(|f| self.size_of(&f.ty.clone()))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        self.type_defs
            .push_str(&format!("%union.{} = type {{ [{} x i8] }}\n", name, size));
    }

    /// Class layout: `[vtable ptr?, base fields…, own fields…]`. Value
    /// classes omit the vtable slot.
    pub(crate) fn require_class_instantiation(&mut self, name: &str, args: &[Ty]) -> String {
        let mangled = super::mangle::mangle_name(name, args);
        if !self.defined_types.contains(&format!("class.{}", mangled)) {
            self.define_class_type(name, args);
        }
        mangled
    }

    pub(crate) fn define_class_type(&mut self, name: &str, args: &[Ty]) {
        let mangled = super::mangle::mangle_name(name, args);
        let key = format!("class.{}", mangled);
        if !self.defined_types.insert(key) {
            return;
        }
        let Some(info) = self.env.classes.get(name).cloned() else {
            return;
        };
        let map = self.param_map(&info.type_params, args);
        let mut fields = Vec::new();
        if self.env.class_needs_vtable(name) {
            fields.push("ptr".to_string());
        }
        for field in self.env.all_class_fields(name) {
            let ty = field.ty.substitute(&map);
            fields.push(self.llvm_type(&ty));
        }
        let body = if fields.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", fields.join(", "))
        };
        self.type_defs
            .push_str(&format!("%class.{} = type {}\n", mangled, body));
    }

    /// Index of a field in the lowered class layout (vtable offset
    /// included).
    pub(crate) fn class_field_index(&mut self, class: &str, field: &str) -> Option<(usize, Ty)> {
        let base = usize::from(self.env.class_needs_vtable(class));
        let fields = self.env.all_class_fields(class);
        fields
            .iter()
            .position(|f| f.name == field)
            .map(|i| (base + i, fields[i].ty.clone()))
    }

    // ==================== Syntactic resolution ====================

    /// Resolve a syntactic type inside codegen, honoring the active
    /// generic substitution.
    pub(crate) fn resolve_type_expr(&mut self, ty: &ast::TypeExpr) -> Ty {
        match ty {
            ast::TypeExpr::Named { path, args, .. } => {
                let name = path.last().cloned().unwrap_or_default();
                if let Some(prim) = Ty::primitive_from_name(&name) {
                    return prim;
                }
                if let Some(replacement) = self.generic_subst.get(&name) {
                    return replacement.clone();
                }
                let args: Vec<Ty> = args.iter().map(|a| self.resolve_type_expr(a)).collect();
                if let Some((params, target)) = self.env.aliases.get(&name).cloned() {
                    let map: HashMap<String, Ty> =
                        params.into_iter().zip(args.into_iter()).collect();
                    return target.substitute(&map);
                }
                if self.env.classes.contains_key(&name) {
                    return Ty::Class { name, args };
                }
                if self.env.behaviors.contains_key(&name) {
                    return Ty::DynBehavior {
                        behavior: name,
                        args,
                    };
                }
                Ty::Named {
                    name,
                    module: String::new(),
                    args,
                }
            }
            ast::TypeExpr::Ref {
                mutable,
                inner,
                lifetime,
                ..
            } => Ty::Ref {
                mutable: *mutable,
                inner: Box::new(self.resolve_type_expr(inner)),
                lifetime: lifetime.clone(),
            },
            ast::TypeExpr::Ptr { mutable, inner, .. } => Ty::Ptr {
                mutable: *mutable,
                inner: Box::new(self.resolve_type_expr(inner)),
            },
            ast::TypeExpr::Array { elem, size, .. } => {
                let elem = self.resolve_type_expr(elem);
                let size = const_int_of(size).unwrap_or(0);
                Ty::Array {
                    elem: Box::new(elem),
                    size,
                }
            }
            ast::TypeExpr::Slice { elem, .. } => Ty::Slice {
                elem: Box::new(self.resolve_type_expr(elem)),
            },
            ast::TypeExpr::Tuple { elems, .. } => {
                if elems.is_empty() {
                    Ty::Unit
                } else {
                    Ty::Tuple(elems.iter().map(|e| self.resolve_type_expr(e)).collect())
                }
            }
            ast::TypeExpr::Func { params, ret, .. } => Ty::Func {
                params: params.iter().map(|p| self.resolve_type_expr(p)).collect(),
                ret: Box::new(
                    ret.as_ref()
                        .map(|r| self.resolve_type_expr(r))
                        .unwrap_or(Ty::Unit),
                ),
                is_async: false,
            },
            ast::TypeExpr::Dyn { behavior, .. } => Ty::DynBehavior {
                behavior: behavior.last().to_string(),
                args: behavior
                    .type_args
                    .iter()
                    .map(|a| self.resolve_type_expr(a))
                    .collect(),
            },
            ast::TypeExpr::Infer { .. } => Ty::Error,
        }
    }

    /// Load a Bool memory value (i8) into an i1 register when needed.
    pub(crate) fn truncate_bool(&mut self, value: &str) -> String {
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = trunc i8 {} to i1", reg, value));
        reg
    }

    pub(crate) fn widen_bool(&mut self, value: &str) -> String {
        let reg = self.fresh_reg();
        self.emit_line(format!("  {} = zext i1 {} to i8", reg, value));
        reg
    }

    /// Numeric conversion between two integer/float LLVM types, tracking
    /// signedness.
    pub(crate) fn coerce_numeric(
        &mut self,
        value: String,
        from: &str,
        to: &str,
        unsigned: bool,
    ) -> CgResult<String> {
        if from == to {
            return Ok(value);
        }
        let reg = self.fresh_reg();
        let line = match (int_bits(from), int_bits(to)) {
            (Some(fb), Some(tb)) if fb < tb => {
                // i1 always zero-extends; wider ints follow signedness.
                let op = if unsigned || from == "i1" { "zext" } else { "sext" };
                format!("  {} = {} {} {} to {}", reg, op, from, value, to)
            }
            (Some(fb), Some(tb)) if fb > tb => {
                format!("  {} = trunc {} {} to {}", reg, from, value, to)
            }
            (Some(_), Some(_)) => return Ok(value),
            (None, None) => {
                // float <-> double
                if from == "float" && to == "double" {
                    format!("  {} = fpext float {} to double", reg, value)
                } else if from == "double" && to == "float" {
                    format!("  {} = fptrunc double {} to float", reg, value)
                } else {
                    return Ok(value);
                }
            }
            (Some(_), None) => {
                let op = if unsigned { "uitofp" } else { "sitofp" };
                format!("  {} = {} {} {} to {}", reg, op, from, value, to)
            }
            (None, Some(_)) => {
                let op = if unsigned { "fptoui" } else { "fptosi" };
                format!("  {} = {} {} {} to {}", reg, op, from, value, to)
            }
        };
        self.emit_line(line);
        Ok(reg)
    }
}

pub(crate) fn int_bits(llvm_ty: &str) -> Option<u32> {
    match llvm_ty {
        "i1" => Some(1),
        "i8" => Some(8),
        "i16" => Some(16),
        "i32" => Some(32),
        "i64" => Some(64),
        "i128" => Some(128),
        _ => None,
    }
}

fn const_int_of(expr: &ast::Expr) -> Option<u64> {
    match &expr.kind {
        ast::ExprKind::Literal(ast::Literal::Int { value, .. }) => Some(*value as u64),
        _ => None,
    }
}
