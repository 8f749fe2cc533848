// Type checker entry: signature collection, import resolution, and the
// driver that checks every function body. Inference lives in infer.rs,
// class hierarchy rules in classes.rs, impl coverage in traits.rs,
// `when` exhaustiveness in exhaustive.rs.

use crate::env::*;
use crate::module_registry::{ModuleRegistry, ModuleView};
use crate::ty::Ty;
use std::collections::HashMap;
use tml_ast as ast;
use tml_diagnostics::{fuzzy, Diagnostic, DiagnosticEngine, Span};

mod classes;
mod exhaustive;
mod infer;
mod stmts;
mod traits;

pub struct CheckResult {
    pub env: TypeEnv,
    pub diagnostics: Vec<Diagnostic>,
}

/// Check one module against a registry of importable modules.
pub fn check_module(
    module: &ast::Module,
    source: &str,
    file_name: &str,
    registry: &mut ModuleRegistry,
) -> CheckResult {
    let mut checker = TypeChecker::new(source, file_name);
    checker.resolve_imports(module, registry);
    checker.predeclare_types(&module.decls);
    checker.collect_decls(&module.decls, "");
    checker.validate_classes();
    checker.validate_impls();
    checker.check_bodies(&module.decls);
    CheckResult {
        env: checker.env,
        diagnostics: checker.diags.take(),
    }
}

/// Build just the typed view of a module (used for imports): collection
/// and validation, no body checking, no diagnostics kept.
fn build_module_view(module: &ast::Module, source: &str, file_name: &str) -> TypeEnv {
    let mut checker = TypeChecker::new(source, file_name);
    checker.predeclare_types(&module.decls);
    checker.collect_decls(&module.decls, "");
    checker.env
}

#[derive(Debug, Clone)]
pub(crate) struct Local {
    pub ty: Ty,
    pub mutable: bool,
    pub span: ast::Span,
}

pub(crate) struct TypeChecker<'a> {
    pub(crate) source: &'a str,
    pub(crate) file: String,
    pub(crate) env: TypeEnv,
    pub(crate) diags: DiagnosticEngine,
    pub(crate) scopes: Vec<HashMap<String, Local>>,
    pub(crate) subst: HashMap<u32, Ty>,
    pub(crate) next_var: u32,
    /// Type parameters currently in scope (function/impl/class generics).
    pub(crate) generic_scope: Vec<String>,
    pub(crate) current_ret: Option<Ty>,
    pub(crate) loop_labels: Vec<Option<String>>,
    pub(crate) in_async: bool,
    pub(crate) current_class: Option<String>,
    /// local name → module path for `use` imports.
    pub(crate) imports: HashMap<String, String>,
}

impl<'a> TypeChecker<'a> {
    pub(crate) fn new(source: &'a str, file_name: &str) -> Self {
        Self {
            source,
            file: file_name.to_string(),
            env: TypeEnv::with_builtins(),
            diags: DiagnosticEngine::new(),
            scopes: Vec::new(),
            subst: HashMap::new(),
            next_var: 0,
            generic_scope: Vec::new(),
            current_ret: None,
            loop_labels: Vec::new(),
            in_async: false,
            current_class: None,
            imports: HashMap::new(),
        }
    }

    pub(crate) fn span(&self, range: &ast::Span) -> Span {
        Span::from_source_range(&self.file, self.source, range.clone())
    }

    pub(crate) fn error(&mut self, code: &str, message: impl Into<String>, range: &ast::Span) {
        let span = self.span(range);
        self.diags.emit_error(code, message, span);
    }

    pub(crate) fn error_with_help(
        &mut self,
        code: &str,
        message: impl Into<String>,
        range: &ast::Span,
        help: impl Into<String>,
    ) {
        let span = self.span(range);
        self.diags
            .emit(Diagnostic::error(code, message, span).with_help(help));
    }

    // ==================== Imports ====================

    pub(crate) fn resolve_imports(&mut self, module: &ast::Module, registry: &mut ModuleRegistry) {
        for decl in &module.decls {
            let ast::Decl::Use(use_decl) = decl else {
                continue;
            };
            let module_path = use_decl.module_path();
            let imported = use_decl.path.last().cloned().unwrap_or_default();
            let local = use_decl.local_name().to_string();

            if module_path.is_empty() {
                self.error(
                    "T027",
                    format!("import `{}` is missing its module path", imported),
                    &use_decl.span,
                );
                continue;
            }

            match registry.view_or_build(&module_path, build_module_view) {
                ModuleView::Missing => {
                    self.error(
                        "T027",
                        format!("module `{}` not found", module_path),
                        &use_decl.span,
                    );
                }
                ModuleView::Cycle(chain) => {
                    self.error_with_help(
                        "T039",
                        format!("circular dependency importing `{}`", module_path),
                        &use_decl.span,
                        format!("import chain: {}", chain.join(" -> ")),
                    );
                }
                ModuleView::Ready(view) => {
                    self.import_symbol(view, &module_path, &imported, &local, &use_decl.span);
                }
            }
        }
    }

    /// Copy one imported symbol into the local environment under both its
    /// short (or aliased) name and remember the defining module.
    fn import_symbol(
        &mut self,
        view: &TypeEnv,
        module_path: &str,
        imported: &str,
        local: &str,
        span: &ast::Span,
    ) {
        let mut found = false;
        if let Some(sig) = view.functions.get(imported) {
            let mut sig = sig.clone();
            sig.module = module_path.to_string();
            sig.name = local.to_string();
            self.env.functions.insert(local.to_string(), sig);
            found = true;
        }
        if let Some(info) = view.structs.get(imported) {
            let mut info = info.clone();
            info.module = module_path.to_string();
            info.name = local.to_string();
            self.env.structs.insert(local.to_string(), info);
            found = true;
        }
        if let Some(info) = view.enums.get(imported) {
            let mut info = info.clone();
            info.module = module_path.to_string();
            info.name = local.to_string();
            self.env.enums.insert(local.to_string(), info);
            found = true;
        }
        if let Some(info) = view.classes.get(imported) {
            let mut info = info.clone();
            info.module = module_path.to_string();
            info.name = local.to_string();
            self.env.classes.insert(local.to_string(), info);
            found = true;
        }
        if let Some(info) = view.behaviors.get(imported) {
            let mut info = info.clone();
            info.module = module_path.to_string();
            info.name = local.to_string();
            self.env.behaviors.insert(local.to_string(), info);
            found = true;
        }
        // Behavior impls travel with their self type.
        for imp in &view.impls {
            if imp.self_name == imported {
                let mut imp = imp.clone();
                imp.self_name = local.to_string();
                self.env.impls.push(imp);
            }
        }
        if !found {
            self.error(
                "T027",
                format!("module `{}` has no symbol `{}`", module_path, imported),
                span,
            );
        } else {
            self.imports
                .insert(local.to_string(), module_path.to_string());
        }
    }

    // ==================== Collection ====================

    /// First pass: register every type name as an empty shell so field
    /// and signature resolution can see forward references. Duplicate
    /// type names are diagnosed here.
    pub(crate) fn predeclare_types(&mut self, decls: &[ast::Decl]) {
        for decl in decls {
            let (name, span) = match decl {
                ast::Decl::Struct(d) => (&d.name, &d.span),
                ast::Decl::Enum(d) => (&d.name, &d.span),
                ast::Decl::Union(d) => (&d.name, &d.span),
                ast::Decl::Class(d) => (&d.name, &d.span),
                ast::Decl::Behavior(d) => (&d.name, &d.span),
                ast::Decl::Mod(m) => {
                    self.predeclare_types(&m.decls);
                    continue;
                }
                _ => continue,
            };
            if Ty::primitive_from_name(name).is_some() {
                let (name, span) = (name.clone(), span.clone());
                self.error(
                    "T038",
                    format!("cannot redefine builtin type `{}`", name),
                    &span,
                );
                continue;
            }
            if self.env.has_type(name) {
                let (name, span) = (name.clone(), span.clone());
                self.error("T008", format!("duplicate definition of `{}`", name), &span);
                continue;
            }
            match decl {
                ast::Decl::Struct(d) => {
                    self.env.structs.insert(
                        d.name.clone(),
                        StructInfo {
                            name: d.name.clone(),
                            module: String::new(),
                            type_params: d.generics.iter().map(|g| g.name.clone()).collect(),
                            fields: Vec::new(),
                            span: d.span.clone(),
                        },
                    );
                }
                ast::Decl::Enum(d) => {
                    self.env.enums.insert(
                        d.name.clone(),
                        EnumInfo {
                            name: d.name.clone(),
                            module: String::new(),
                            type_params: d.generics.iter().map(|g| g.name.clone()).collect(),
                            variants: Vec::new(),
                            span: d.span.clone(),
                        },
                    );
                }
                ast::Decl::Union(d) => {
                    self.env.unions.insert(
                        d.name.clone(),
                        UnionInfo {
                            name: d.name.clone(),
                            fields: Vec::new(),
                            span: d.span.clone(),
                        },
                    );
                }
                ast::Decl::Class(d) => {
                    self.env.classes.insert(
                        d.name.clone(),
                        ClassInfo {
                            name: d.name.clone(),
                            module: String::new(),
                            type_params: d.generics.iter().map(|g| g.name.clone()).collect(),
                            base: None,
                            base_args: Vec::new(),
                            interfaces: Vec::new(),
                            fields: Vec::new(),
                            methods: Vec::new(),
                            properties: Vec::new(),
                            is_abstract: d.is_abstract(),
                            is_sealed: d.is_sealed(),
                            is_value_class: d.is_value_class(),
                            is_pooled: d.is_pooled(),
                            span: d.span.clone(),
                        },
                    );
                }
                ast::Decl::Behavior(d) => {
                    self.env.behaviors.insert(
                        d.name.clone(),
                        BehaviorInfo {
                            name: d.name.clone(),
                            module: String::new(),
                            generics: Vec::new(),
                            super_behaviors: Vec::new(),
                            assoc_types: Vec::new(),
                            methods: Vec::new(),
                            span: d.span.clone(),
                        },
                    );
                }
                _ => {}
            }
        }
    }

    pub(crate) fn collect_decls(&mut self, decls: &[ast::Decl], module_prefix: &str) {
        for decl in decls {
            match decl {
                ast::Decl::Func(f) => self.collect_func(f, module_prefix),
                ast::Decl::Struct(s) => self.collect_struct(s, module_prefix),
                ast::Decl::Enum(e) => self.collect_enum(e, module_prefix),
                ast::Decl::Union(u) => self.collect_union(u),
                ast::Decl::Class(c) => self.collect_class(c, module_prefix),
                ast::Decl::Behavior(b) => self.collect_behavior(b),
                ast::Decl::Impl(i) => self.collect_impl(i),
                ast::Decl::TypeAlias(a) => self.collect_alias(a),
                ast::Decl::Const(c) => self.collect_const(c),
                ast::Decl::Use(_) => {}
                ast::Decl::Mod(m) => {
                    // Nested modules flatten into the parent scope with
                    // their declarations reachable unqualified.
                    self.collect_decls(&m.decls, &m.name);
                }
            }
        }
    }

    fn duplicate_check(&mut self, name: &str, span: &ast::Span) -> bool {
        let taken = self.env.has_type(name)
            || (self.env.functions.contains_key(name) && !self.env.is_builtin_function(name));
        if taken {
            self.error("T008", format!("duplicate definition of `{}`", name), span);
        }
        taken
    }

    fn collect_func(&mut self, f: &ast::FuncDecl, module_prefix: &str) {
        if Ty::primitive_from_name(&f.name).is_some() {
            self.error(
                "T038",
                format!("cannot redefine builtin type `{}`", f.name),
                &f.span,
            );
            return;
        }
        self.duplicate_check(&f.name, &f.span);
        let sig = self.func_sig(f, module_prefix);

        if f.has_decorator("allocates") && sig.ret != Ty::Str {
            self.error_with_help(
                "T001",
                format!("`@allocates` on `{}` requires a `Str` return type", f.name),
                &f.span,
                "`@allocates` marks functions whose returned string the caller must free",
            );
        }

        self.env.functions.insert(f.name.clone(), sig);
    }

    pub(crate) fn func_sig(&mut self, f: &ast::FuncDecl, module_prefix: &str) -> FuncSig {
        let saved_generics = self.generic_scope.clone();
        for g in &f.generics {
            self.generic_scope.push(g.name.clone());
        }

        let mut params = Vec::new();
        for param in &f.params {
            let name = param
                .pattern
                .bindings()
                .first()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "_".to_string());
            let ty = if name == "this" {
                self.this_type()
            } else {
                self.resolve_type(&param.ty)
            };
            params.push((name, ty));
        }
        let ret = f
            .return_type
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(Ty::Unit);

        self.generic_scope = saved_generics;

        FuncSig {
            name: f.name.clone(),
            module: module_prefix.to_string(),
            generics: f
                .generics
                .iter()
                .map(|g| GenericSig {
                    name: g.name.clone(),
                    bounds: g.bounds.clone(),
                })
                .collect(),
            params,
            ret,
            is_async: f.is_async,
            is_lowlevel: f.is_lowlevel,
            allocates: f.has_decorator("allocates"),
            has_body: f.body.is_some(),
            span: f.span.clone(),
        }
    }

    fn this_type(&self) -> Ty {
        match &self.current_class {
            Some(class) => Ty::Class {
                name: class.clone(),
                args: Vec::new(),
            },
            None => Ty::named("This"),
        }
    }

    fn collect_struct(&mut self, s: &ast::StructDecl, module_prefix: &str) {
        if Ty::primitive_from_name(&s.name).is_some() {
            return; // diagnosed during predeclaration
        }
        let saved = self.generic_scope.clone();
        let mut seen_params = Vec::new();
        for g in &s.generics {
            if seen_params.contains(&g.name) {
                self.error(
                    "T008",
                    format!("duplicate type parameter `{}`", g.name),
                    &g.span,
                );
            }
            seen_params.push(g.name.clone());
            self.generic_scope.push(g.name.clone());
        }
        let fields = s
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.clone(),
                ty: self.resolve_type(&f.ty),
                is_pub: f.is_pub,
                has_default: f.default.is_some(),
            })
            .collect();
        self.generic_scope = saved;
        self.env.structs.insert(
            s.name.clone(),
            StructInfo {
                name: s.name.clone(),
                module: module_prefix.to_string(),
                type_params: s.generics.iter().map(|g| g.name.clone()).collect(),
                fields,
                span: s.span.clone(),
            },
        );
    }

    fn collect_enum(&mut self, e: &ast::EnumDecl, module_prefix: &str) {
        let saved = self.generic_scope.clone();
        for g in &e.generics {
            self.generic_scope.push(g.name.clone());
        }
        let variants = e
            .variants
            .iter()
            .map(|v| VariantInfo {
                name: v.name.clone(),
                payload: v.payload.iter().map(|t| self.resolve_type(t)).collect(),
            })
            .collect();
        self.generic_scope = saved;
        self.env.enums.insert(
            e.name.clone(),
            EnumInfo {
                name: e.name.clone(),
                module: module_prefix.to_string(),
                type_params: e.generics.iter().map(|g| g.name.clone()).collect(),
                variants,
                span: e.span.clone(),
            },
        );
    }

    fn collect_union(&mut self, u: &ast::UnionDecl) {
        let fields = u
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.clone(),
                ty: self.resolve_type(&f.ty),
                is_pub: f.is_pub,
                has_default: false,
            })
            .collect();
        self.env.unions.insert(
            u.name.clone(),
            UnionInfo {
                name: u.name.clone(),
                fields,
                span: u.span.clone(),
            },
        );
    }

    fn collect_class(&mut self, c: &ast::ClassDecl, module_prefix: &str) {
        let saved = self.generic_scope.clone();
        for g in &c.generics {
            self.generic_scope.push(g.name.clone());
        }
        let saved_class = self.current_class.replace(c.name.clone());

        let (base, base_args) = match &c.base {
            Some(ast::TypeExpr::Named { path, args, .. }) => (
                path.last().cloned(),
                args.iter().map(|a| self.resolve_type(a)).collect(),
            ),
            Some(other) => {
                self.error("T046", "base class must be a named class", &other.span());
                (None, Vec::new())
            }
            None => (None, Vec::new()),
        };

        let interfaces = c
            .interfaces
            .iter()
            .filter_map(|i| match i {
                ast::TypeExpr::Named { path, .. } => path.last().cloned(),
                other => {
                    self.error("T047", "interface must be a named behavior", &other.span());
                    None
                }
            })
            .collect();

        let fields = c
            .fields
            .iter()
            .map(|f| FieldInfo {
                name: f.name.clone(),
                ty: self.resolve_type(&f.ty),
                is_pub: f.is_pub,
                has_default: f.default.is_some(),
            })
            .collect();

        let methods = c
            .methods
            .iter()
            .map(|m| MethodInfo {
                sig: self.func_sig(m, module_prefix),
                is_virtual: m.is_virtual,
                is_override: m.is_override,
                is_static: m.is_static,
            })
            .collect();

        let properties = c
            .properties
            .iter()
            .map(|p| PropertyInfo {
                name: p.name.clone(),
                ty: self.resolve_type(&p.ty),
                has_getter: p.getter.is_some(),
                has_setter: p.setter.is_some(),
            })
            .collect();

        self.current_class = saved_class;
        self.generic_scope = saved;

        self.env.classes.insert(
            c.name.clone(),
            ClassInfo {
                name: c.name.clone(),
                module: module_prefix.to_string(),
                type_params: c.generics.iter().map(|g| g.name.clone()).collect(),
                base,
                base_args,
                interfaces,
                fields,
                methods,
                properties,
                is_abstract: c.is_abstract(),
                is_sealed: c.is_sealed(),
                is_value_class: c.is_value_class(),
                is_pooled: c.is_pooled(),
                span: c.span.clone(),
            },
        );
    }

    fn collect_behavior(&mut self, b: &ast::BehaviorDecl) {
        let saved = self.generic_scope.clone();
        for g in &b.generics {
            self.generic_scope.push(g.name.clone());
        }
        for assoc in &b.assoc_types {
            self.generic_scope.push(assoc.clone());
        }
        self.generic_scope.push("This".to_string());
        let methods = b
            .methods
            .iter()
            .map(|m| BehaviorMethod {
                sig: self.func_sig(m, ""),
                has_default: m.body.is_some(),
            })
            .collect();
        self.generic_scope = saved;
        self.env.behaviors.insert(
            b.name.clone(),
            BehaviorInfo {
                name: b.name.clone(),
                module: String::new(),
                generics: b
                    .generics
                    .iter()
                    .map(|g| GenericSig {
                        name: g.name.clone(),
                        bounds: g.bounds.clone(),
                    })
                    .collect(),
                super_behaviors: b.super_behaviors.clone(),
                assoc_types: b.assoc_types.clone(),
                methods,
                span: b.span.clone(),
            },
        );
    }

    fn collect_impl(&mut self, i: &ast::ImplDecl) {
        let saved = self.generic_scope.clone();
        for g in &i.generics {
            self.generic_scope.push(g.name.clone());
        }
        self.generic_scope.push("This".to_string());
        let self_ty = self.resolve_type(&i.self_type);
        let self_name = match &self_ty {
            Ty::Named { name, .. } | Ty::Class { name, .. } => name.clone(),
            other => other.to_string(),
        };
        let methods = i.methods.iter().map(|m| self.func_sig(m, "")).collect();
        self.generic_scope = saved;
        self.env.impls.push(ImplInfo {
            behavior: i.behavior.as_ref().map(|b| b.last().to_string()),
            self_name,
            self_ty,
            generics: i
                .generics
                .iter()
                .map(|g| GenericSig {
                    name: g.name.clone(),
                    bounds: g.bounds.clone(),
                })
                .collect(),
            methods,
            span: i.span.clone(),
        });
    }

    fn collect_alias(&mut self, a: &ast::TypeAliasDecl) {
        self.duplicate_check(&a.name, &a.span);
        let saved = self.generic_scope.clone();
        for g in &a.generics {
            self.generic_scope.push(g.name.clone());
        }
        let ty = self.resolve_type(&a.ty);
        self.generic_scope = saved;
        self.env.aliases.insert(
            a.name.clone(),
            (a.generics.iter().map(|g| g.name.clone()).collect(), ty),
        );
    }

    fn collect_const(&mut self, c: &ast::ConstDecl) {
        let ty = c
            .ty
            .as_ref()
            .map(|t| self.resolve_type(t))
            .unwrap_or(Ty::I32);
        let int_value = self.const_eval_int(&c.value);
        self.env.consts.insert(c.name.clone(), ConstInfo { ty, int_value });
    }

    /// Fold a constant integer initializer; diagnoses `T020` on division
    /// by zero inside const expressions.
    pub(crate) fn const_eval_int(&mut self, expr: &ast::Expr) -> Option<i128> {
        match &expr.kind {
            ast::ExprKind::Literal(ast::Literal::Int { value, .. }) => Some(*value as i128),
            ast::ExprKind::Literal(ast::Literal::Bool(b)) => Some(*b as i128),
            ast::ExprKind::Unary {
                op: ast::UnaryOp::Neg,
                operand,
            } => self.const_eval_int(operand).map(|v| -v),
            ast::ExprKind::Binary { op, lhs, rhs } => {
                let l = self.const_eval_int(lhs)?;
                let r = self.const_eval_int(rhs)?;
                match op {
                    ast::BinaryOp::Add => l.checked_add(r),
                    ast::BinaryOp::Sub => l.checked_sub(r),
                    ast::BinaryOp::Mul => l.checked_mul(r),
                    ast::BinaryOp::Div | ast::BinaryOp::Rem => {
                        if r == 0 {
                            self.error(
                                "T020",
                                "division by zero in constant expression",
                                &expr.span,
                            );
                            None
                        } else if matches!(op, ast::BinaryOp::Div) {
                            l.checked_div(r)
                        } else {
                            l.checked_rem(r)
                        }
                    }
                    ast::BinaryOp::Shl => l.checked_shl(r.try_into().ok()?),
                    ast::BinaryOp::Shr => l.checked_shr(r.try_into().ok()?),
                    ast::BinaryOp::BitAnd => Some(l & r),
                    ast::BinaryOp::BitOr => Some(l | r),
                    ast::BinaryOp::BitXor => Some(l ^ r),
                    _ => None,
                }
            }
            ast::ExprKind::Ident(name) => {
                self.env.consts.get(name).and_then(|c| c.int_value)
            }
            _ => None,
        }
    }

    // ==================== Type resolution ====================

    /// Resolve a syntactic type to a semantic one. Unknown names are
    /// T002; generic parameters in scope stay as named placeholders.
    pub(crate) fn resolve_type(&mut self, ty: &ast::TypeExpr) -> Ty {
        match ty {
            ast::TypeExpr::Named { path, args, span } => {
                let name = path.last().cloned().unwrap_or_default();
                let args: Vec<Ty> = args.iter().map(|a| self.resolve_type(a)).collect();

                if let Some(prim) = Ty::primitive_from_name(&name) {
                    return prim;
                }
                if self.generic_scope.contains(&name) {
                    return Ty::named(&name);
                }
                if name == "This" {
                    return Ty::named("This");
                }
                if let Some((params, target)) = self.env.aliases.get(&name).cloned() {
                    let map: HashMap<String, Ty> =
                        params.into_iter().zip(args.into_iter()).collect();
                    return target.substitute(&map);
                }
                if self.env.classes.contains_key(&name) {
                    return Ty::Class { name, args };
                }
                if self.env.behaviors.contains_key(&name) {
                    // A bare behavior in type position means dyn dispatch.
                    return Ty::DynBehavior {
                        behavior: name,
                        args,
                    };
                }
                if name == "Range" {
                    return Ty::Named {
                        name,
                        module: String::new(),
                        args,
                    };
                }
                if self.env.structs.contains_key(&name)
                    || self.env.enums.contains_key(&name)
                    || self.env.unions.contains_key(&name)
                {
                    let module = self
                        .imports
                        .get(&name)
                        .cloned()
                        .unwrap_or_default();
                    return Ty::Named { name, module, args };
                }

                let candidates: Vec<String> = self
                    .env
                    .structs
                    .keys()
                    .chain(self.env.enums.keys())
                    .chain(self.env.classes.keys())
                    .cloned()
                    .collect();
                let suggestions = fuzzy::suggest(&name, &candidates);
                let mut message = format!("unknown type `{}`", name);
                if let Some(best) = suggestions.first() {
                    message.push_str(&format!("; did you mean `{}`?", best));
                }
                self.error("T002", message, span);
                Ty::Error
            }
            ast::TypeExpr::Ref {
                mutable,
                inner,
                lifetime,
                ..
            } => Ty::Ref {
                mutable: *mutable,
                inner: Box::new(self.resolve_type(inner)),
                lifetime: lifetime.clone(),
            },
            ast::TypeExpr::Ptr { mutable, inner, .. } => Ty::Ptr {
                mutable: *mutable,
                inner: Box::new(self.resolve_type(inner)),
            },
            ast::TypeExpr::Array { elem, size, span } => {
                let elem = self.resolve_type(elem);
                let size_value = self.const_eval_int(size).unwrap_or_else(|| {
                    self.error("T002", "array length must be a constant integer", span);
                    0
                });
                Ty::Array {
                    elem: Box::new(elem),
                    size: size_value.max(0) as u64,
                }
            }
            ast::TypeExpr::Slice { elem, .. } => Ty::Slice {
                elem: Box::new(self.resolve_type(elem)),
            },
            ast::TypeExpr::Tuple { elems, .. } => {
                if elems.is_empty() {
                    Ty::Unit
                } else {
                    Ty::Tuple(elems.iter().map(|e| self.resolve_type(e)).collect())
                }
            }
            ast::TypeExpr::Func { params, ret, .. } => Ty::Func {
                params: params.iter().map(|p| self.resolve_type(p)).collect(),
                ret: Box::new(
                    ret.as_ref()
                        .map(|r| self.resolve_type(r))
                        .unwrap_or(Ty::Unit),
                ),
                is_async: false,
            },
            ast::TypeExpr::Dyn { behavior, span } => {
                let name = behavior.last().to_string();
                if !self.env.behaviors.contains_key(&name) {
                    self.error("T025", format!("unknown behavior `{}`", name), span);
                    return Ty::Error;
                }
                Ty::DynBehavior {
                    behavior: name,
                    args: behavior
                        .type_args
                        .iter()
                        .map(|a| self.resolve_type(a))
                        .collect(),
                }
            }
            ast::TypeExpr::Infer { .. } => self.fresh_var(),
        }
    }

    // ==================== Scopes ====================

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn bind(&mut self, name: &str, ty: Ty, mutable: bool, span: ast::Span) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Local { ty, mutable, span });
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub(crate) fn visible_locals(&self) -> Vec<String> {
        let mut out = Vec::new();
        for scope in &self.scopes {
            out.extend(scope.keys().cloned());
        }
        out
    }

    // ==================== Body checking ====================

    fn check_bodies(&mut self, decls: &[ast::Decl]) {
        for decl in decls {
            match decl {
                ast::Decl::Func(f) => self.check_func_body(f, None),
                ast::Decl::Impl(i) => {
                    let self_name = match self.resolve_impl_self_name(i) {
                        Some(n) => n,
                        None => continue,
                    };
                    for method in &i.methods {
                        self.check_func_body(method, Some((&self_name, &i.generics)));
                    }
                }
                ast::Decl::Class(c) => {
                    let saved = self.current_class.replace(c.name.clone());
                    for method in &c.methods {
                        self.check_method_body(c, method);
                    }
                    for property in &c.properties {
                        self.check_property_body(c, property);
                    }
                    self.current_class = saved;
                }
                ast::Decl::Behavior(b) => {
                    // Default method bodies are checked against `This`.
                    for method in &b.methods {
                        if method.body.is_some() {
                            self.check_func_body(method, None);
                        }
                    }
                }
                ast::Decl::Mod(m) => self.check_bodies(&m.decls),
                _ => {}
            }
        }
    }

    fn resolve_impl_self_name(&mut self, i: &ast::ImplDecl) -> Option<String> {
        match &i.self_type {
            ast::TypeExpr::Named { path, .. } => path.last().cloned(),
            other => {
                self.error("T002", "impl self type must be a named type", &other.span());
                None
            }
        }
    }
}
