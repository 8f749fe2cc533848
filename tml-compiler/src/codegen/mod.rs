// LLVM textual IR generation. The module is emitted as text: a header,
// runtime declares, type definitions, globals (strings, vtables), the
// function bodies, a synthesized @main, and the attribute group. All
// iteration is over ordered maps so the output is byte-stable.

use crate::env::TypeEnv;
use crate::ty::Ty;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tml_ast as ast;

mod calls;
mod closures;
mod control;
mod entry;
mod expr;
mod generics;
mod infer;
mod mangle;
mod stmt;
mod types;
mod vtables;
mod when_lower;

pub use mangle::{demangle_type, mangle_name, mangle_type};

#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct CodegenError {
    pub code: String,
    pub message: String,
    pub span: Option<ast::Span>,
}

impl CodegenError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(code: &str, message: impl Into<String>, span: ast::Span) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            span: Some(span),
        }
    }
}

pub(crate) type CgResult<T> = Result<T, CodegenError>;

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub target_triple: String,
    pub coverage: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            target_triple: default_target_triple(),
            coverage: false,
        }
    }
}

pub fn default_target_triple() -> String {
    if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "arm64-apple-macosx".to_string()
        } else {
            "x86_64-apple-macosx".to_string()
        }
    } else if cfg!(target_arch = "aarch64") {
        "aarch64-unknown-linux-gnu".to_string()
    } else {
        "x86_64-unknown-linux-gnu".to_string()
    }
}

/// A local variable slot inside the current function.
#[derive(Debug, Clone)]
pub(crate) struct VarInfo {
    /// Register holding the alloca pointer (or the parameter itself for
    /// `this`).
    pub ptr: String,
    pub llvm_ty: String,
    pub sem: Ty,
    /// Stored as a `{ ptr, ptr }` fat pointer.
    pub is_fat_closure: bool,
    /// `this` is a direct parameter, not an alloca slot.
    pub direct: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct LoopCtx {
    pub continue_label: String,
    pub break_label: String,
    pub name: Option<String>,
}

/// One queued monomorphization of a generic function.
#[derive(Debug, Clone)]
pub(crate) struct PendingFn {
    pub decl: ast::FuncDecl,
    pub subst: HashMap<String, Ty>,
    pub mangled: String,
}

/// A value scheduled for drop glue at scope exit.
#[derive(Debug, Clone)]
pub(crate) struct DropEntry {
    pub ptr: String,
    pub sem: Ty,
    /// Heap `Str` returned by an `@allocates` function.
    pub heap_str: bool,
    pub name: Option<String>,
}

pub struct LlvmIrGen<'a> {
    pub(crate) env: &'a TypeEnv,
    pub(crate) module: &'a ast::Module,
    pub(crate) options: CodegenOptions,

    // Output buffers, assembled at the very end.
    pub(crate) type_defs: String,
    pub(crate) globals: String,
    pub(crate) funcs: String,
    pub(crate) out: String,

    // Interned string literals: value -> label, emission in first-use
    // order.
    pub(crate) string_labels: HashMap<String, String>,
    pub(crate) string_order: Vec<(String, String)>,

    // Deterministic counters.
    pub(crate) tmp: u32,
    pub(crate) label: u32,
    pub(crate) cov_counter: u32,

    // Current function state.
    pub(crate) locals: HashMap<String, VarInfo>,
    pub(crate) current_fn: String,
    pub(crate) current_ret_ty: String,
    pub(crate) current_ret_sem: Ty,
    pub(crate) current_fn_allocates: bool,
    pub(crate) block_terminated: bool,
    pub(crate) loop_stack: Vec<LoopCtx>,
    pub(crate) scope_drops: Vec<Vec<DropEntry>>,
    pub(crate) this_class: Option<String>,

    // Expression side channels.
    pub(crate) last_ty: String,
    pub(crate) last_sem: Ty,
    pub(crate) last_is_unsigned: bool,
    pub(crate) expected_literal_ty: Option<String>,

    // Active generic substitution while emitting an instantiation.
    pub(crate) generic_subst: HashMap<String, Ty>,

    // Monomorphization registries, keyed by mangled names. The type
    // queue also covers enums and unions.
    pub(crate) instantiated: BTreeSet<String>,
    pub(crate) pending_fns: Vec<PendingFn>,
    pub(crate) defined_types: BTreeSet<String>,

    // Declaration lookup from the AST, including imported modules.
    pub(crate) fn_decls: BTreeMap<String, ast::FuncDecl>,
    pub(crate) class_decls: BTreeMap<String, ast::ClassDecl>,

    // Vtables discovered while lowering; emitted as globals.
    pub(crate) vtables_emitted: BTreeSet<String>,

    pub(crate) used_runtime: BTreeSet<&'static str>,
    pub(crate) closure_counter: u32,
    pub(crate) errors: Vec<CodegenError>,
}

impl<'a> LlvmIrGen<'a> {
    pub fn new(env: &'a TypeEnv, module: &'a ast::Module, options: CodegenOptions) -> Self {
        Self {
            env,
            module,
            options,
            type_defs: String::new(),
            globals: String::new(),
            funcs: String::new(),
            out: String::new(),
            string_labels: HashMap::new(),
            string_order: Vec::new(),
            tmp: 0,
            label: 0,
            cov_counter: 0,
            locals: HashMap::new(),
            current_fn: String::new(),
            current_ret_ty: "void".to_string(),
            current_ret_sem: Ty::Unit,
            current_fn_allocates: false,
            block_terminated: false,
            loop_stack: Vec::new(),
            scope_drops: Vec::new(),
            this_class: None,
            last_ty: "void".to_string(),
            last_sem: Ty::Unit,
            last_is_unsigned: false,
            expected_literal_ty: None,
            generic_subst: HashMap::new(),
            instantiated: BTreeSet::new(),
            pending_fns: Vec::new(),
            defined_types: BTreeSet::new(),
            fn_decls: BTreeMap::new(),
            class_decls: BTreeMap::new(),
            vtables_emitted: BTreeSet::new(),
            used_runtime: BTreeSet::new(),
            closure_counter: 0,
            errors: Vec::new(),
        }
    }

    /// Lower the whole module to LLVM textual IR.
    pub fn generate(mut self) -> Result<String, Vec<CodegenError>> {
        self.collect_decls(&self.module.decls.to_vec());

        // Non-generic type definitions up front; generic ones appear on
        // demand with mangled names.
        for (name, info) in self.env.structs.clone() {
            if info.type_params.is_empty() {
                self.define_struct_type(&name, &[]);
            }
        }
        for (name, info) in self.env.enums.clone() {
            if info.type_params.is_empty() {
                self.define_enum_type(&name, &[]);
            }
        }
        for name in self.env.unions.keys().cloned().collect::<Vec<_>>() {
            self.define_union_type(&name);
        }
        for (name, info) in self.env.classes.clone() {
            if info.type_params.is_empty() {
                self.define_class_type(&name, &[]);
            }
        }

        // Function bodies.
        let decls = self.module.decls.to_vec();
        self.gen_decls(&decls);

        // Drain monomorphization queues to a fixed point; instantiating
        // one body may queue more.
        self.drain_pending();

        // Vtables for every class that needs one.
        self.emit_all_vtables();

        // Entry point.
        let main_text = self.synthesize_main();

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        // Assemble in the contractual order.
        let mut ir = String::new();
        ir.push_str(&self.render_header());
        ir.push_str(&self.render_runtime_decls());
        ir.push('\n');
        if !self.type_defs.is_empty() {
            ir.push_str(&self.type_defs);
            ir.push('\n');
        }
        ir.push_str(&self.render_string_constants());
        if !self.globals.is_empty() {
            ir.push_str(&self.globals);
            ir.push('\n');
        }
        ir.push_str(&self.funcs);
        ir.push_str(&main_text);
        ir.push('\n');
        ir.push_str("; Function attributes for optimization\n");
        ir.push_str("attributes #0 = { nounwind mustprogress willreturn }\n");
        Ok(ir)
    }

    fn collect_decls(&mut self, decls: &[ast::Decl]) {
        for decl in decls {
            match decl {
                ast::Decl::Func(f) => {
                    self.fn_decls.insert(f.name.clone(), f.clone());
                }
                ast::Decl::Class(c) => {
                    self.class_decls.insert(c.name.clone(), c.clone());
                }
                ast::Decl::Mod(m) => self.collect_decls(&m.decls),
                _ => {}
            }
        }
    }

    fn gen_decls(&mut self, decls: &[ast::Decl]) {
        for decl in decls {
            match decl {
                ast::Decl::Func(f) => {
                    if f.generics.is_empty() {
                        self.gen_function(f, None, &HashMap::new(), None);
                    }
                }
                ast::Decl::Impl(i) => self.gen_impl(i),
                ast::Decl::Class(c) => self.gen_class_methods(c),
                ast::Decl::Mod(m) => self.gen_decls(&m.decls),
                _ => {}
            }
        }
    }

    fn gen_impl(&mut self, imp: &ast::ImplDecl) {
        let type_name = match &imp.self_type {
            ast::TypeExpr::Named { path, .. } => match path.last() {
                Some(n) => n.clone(),
                None => return,
            },
            _ => return,
        };
        // Generic impls are instantiated on demand with their type.
        if !imp.generics.is_empty() {
            return;
        }
        for method in &imp.methods {
            let mangled = format!("{}_{}", type_name, method.name);
            self.gen_function(method, Some(&type_name), &HashMap::new(), Some(mangled));
        }
        // Behavior default methods the impl omits still get bodies.
        if let Some(behavior_ref) = &imp.behavior {
            let behavior_name = behavior_ref.last().to_string();
            self.gen_default_methods(&type_name, &behavior_name, imp);
        }
    }

    fn gen_default_methods(&mut self, type_name: &str, behavior_name: &str, imp: &ast::ImplDecl) {
        // Default bodies live on the behavior declaration in the AST.
        let behavior_decl = self.module.decls.iter().find_map(|d| match d {
            ast::Decl::Behavior(b) if b.name == behavior_name => Some(b.clone()),
            _ => None,
        });
        let Some(behavior_decl) = behavior_decl else {
            return;
        };
        for method in &behavior_decl.methods {
            if method.body.is_none() {
                continue;
            }
            if imp.methods.iter().any(|m| m.name == method.name) {
                continue;
            }
            let mangled = format!("{}_{}", type_name, method.name);
            self.emit_to_funcs(format!(
                "; Default implementation from behavior {}\n",
                behavior_name
            ));
            self.gen_function(method, Some(type_name), &HashMap::new(), Some(mangled));
        }
    }

    fn gen_class_methods(&mut self, class: &ast::ClassDecl) {
        if !class.generics.is_empty() {
            return;
        }
        for method in &class.methods {
            if !method.generics.is_empty() {
                continue;
            }
            let saved = self.this_class.replace(class.name.clone());
            let mangled = format!("{}_{}", class.name, method.name);
            self.gen_function(method, Some(&class.name), &HashMap::new(), Some(mangled));
            self.this_class = saved;
        }
        for property in &class.properties {
            self.gen_property(class, property);
        }
    }

    // ==================== Emission helpers ====================

    pub(crate) fn emit_line(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub(crate) fn emit_to_funcs(&mut self, text: impl AsRef<str>) {
        self.funcs.push_str(text.as_ref());
    }

    pub(crate) fn fresh_reg(&mut self) -> String {
        self.tmp += 1;
        format!("%t{}", self.tmp)
    }

    pub(crate) fn fresh_label(&mut self, stem: &str) -> String {
        self.label += 1;
        format!("{}{}", stem, self.label)
    }

    /// Intern a string literal, returning its global label.
    pub(crate) fn intern_string(&mut self, value: &str) -> String {
        if let Some(label) = self.string_labels.get(value) {
            return label.clone();
        }
        let label = format!("@.str.{}", self.string_order.len());
        self.string_labels
            .insert(value.to_string(), label.clone());
        self.string_order
            .push((label.clone(), value.to_string()));
        label
    }

    pub(crate) fn error(&mut self, code: &str, message: impl Into<String>) -> CodegenError {
        CodegenError::new(code, message)
    }

    pub(crate) fn record_error(&mut self, err: CodegenError) {
        self.errors.push(err);
    }

    pub(crate) fn runtime(&mut self, name: &'static str) {
        self.used_runtime.insert(name);
    }

    // ==================== Function emission ====================

    /// Emit one function definition. `self_type` names the impl target
    /// for methods; `mangled_override` replaces the plain symbol stem.
    pub(crate) fn gen_function(
        &mut self,
        f: &ast::FuncDecl,
        self_type: Option<&str>,
        subst: &HashMap<String, Ty>,
        mangled_override: Option<String>,
    ) {
        let Some(body) = &f.body else {
            return;
        };

        let stem = mangled_override.unwrap_or_else(|| f.name.clone());
        let symbol = format!("@tml_{}", stem);

        // Reset per-function state; register numbering restarts at 1.
        self.tmp = 0;
        self.label = 0;
        self.locals.clear();
        self.loop_stack.clear();
        self.scope_drops.clear();
        self.block_terminated = false;
        self.out.clear();
        self.current_fn = stem.clone();
        let saved_subst = std::mem::replace(&mut self.generic_subst, subst.clone());
        self.current_fn_allocates = f.has_decorator("allocates");

        let ret_sem = f
            .return_type
            .as_ref()
            .map(|t| self.resolve_type_expr(t))
            .unwrap_or(Ty::Unit);
        let ret_ty = if ret_sem == Ty::Unit {
            "void".to_string()
        } else {
            self.llvm_type(&ret_sem)
        };
        self.current_ret_ty = ret_ty.clone();
        self.current_ret_sem = ret_sem.clone();

        // Parameter list.
        let mut params_text = Vec::new();
        let mut param_infos = Vec::new();
        for param in &f.params {
            let name = param
                .pattern
                .bindings()
                .first()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "_anon".to_string());
            let (sem, llvm_ty) = if name == "this" {
                let class = self_type.unwrap_or("This").to_string();
                let sem = Ty::Class {
                    name: class,
                    args: Vec::new(),
                };
                (sem, "ptr".to_string())
            } else {
                let sem = self.resolve_type_expr(&param.ty);
                let llvm_ty = self.llvm_type(&sem);
                (sem, llvm_ty)
            };
            params_text.push(format!("{} %{}", llvm_ty, name));
            param_infos.push((name, sem, llvm_ty));
        }

        let linkage = if f.name == "main" { "" } else { "internal " };
        let mut def = format!(
            "define {}{} {}({})",
            linkage,
            ret_ty,
            symbol,
            params_text.join(", ")
        );
        if self.function_is_pure(f) {
            def.push_str(" #0");
        }
        def.push_str(" {");
        self.emit_line(def);
        self.emit_line("entry:");

        if self.options.coverage {
            let id = self.cov_counter;
            self.cov_counter += 1;
            self.runtime("tml_cov_hit");
            self.emit_line(format!("  call void @tml_cov_hit(i32 {})", id));
        }

        // Parameters spill into allocas; `this` stays a direct pointer.
        self.push_drop_scope();
        for (name, sem, llvm_ty) in param_infos {
            if name == "this" {
                self.locals.insert(
                    name.clone(),
                    VarInfo {
                        ptr: format!("%{}", name),
                        llvm_ty,
                        sem,
                        is_fat_closure: false,
                        direct: true,
                    },
                );
                continue;
            }
            let slot = self.fresh_reg();
            self.emit_line(format!("  {} = alloca {}", slot, llvm_ty));
            self.emit_line(format!("  store {} %{}, ptr {}", llvm_ty, name, slot));
            let is_fat = llvm_ty == "{ ptr, ptr }";
            self.locals.insert(
                name.clone(),
                VarInfo {
                    ptr: slot,
                    llvm_ty,
                    sem,
                    is_fat_closure: is_fat,
                    direct: false,
                },
            );
        }

        if let Err(err) = self.gen_block(body) {
            self.record_error(err);
        }

        if !self.block_terminated {
            self.emit_scope_drops();
            if self.current_ret_ty == "void" {
                self.emit_line("  ret void");
            } else {
                self.emit_line(format!(
                    "  ret {} {}",
                    self.current_ret_ty.clone(),
                    zero_value_of(&self.current_ret_ty)
                ));
            }
        }
        self.pop_drop_scope();
        self.emit_line("}");
        self.emit_line("");

        let body_text = std::mem::take(&mut self.out);
        self.emit_to_funcs(body_text);
        self.generic_subst = saved_subst;
    }

    fn gen_property(&mut self, class: &ast::ClassDecl, property: &ast::Property) {
        // Properties lower to plain getter/setter functions taking the
        // receiver pointer.
        let class_name = class.name.clone();
        if let Some(getter) = &property.getter {
            let f = ast::FuncDecl {
                decorators: Vec::new(),
                is_pub: property.is_pub,
                is_async: false,
                is_lowlevel: false,
                is_static: false,
                is_virtual: false,
                is_override: false,
                name: format!("get_{}", property.name),
                generics: Vec::new(),
                params: vec![this_param(property.span.clone())],
                return_type: Some(property.ty.clone()),
                where_clause: Vec::new(),
                body: Some(getter.clone()),
                span: property.span.clone(),
            };
            let saved = self.this_class.replace(class_name.clone());
            let mangled = format!("{}_get_{}", class_name, property.name);
            self.gen_function(&f, Some(&class_name), &HashMap::new(), Some(mangled));
            self.this_class = saved;
        }
        if let Some(setter) = &property.setter {
            let f = ast::FuncDecl {
                decorators: Vec::new(),
                is_pub: property.is_pub,
                is_async: false,
                is_lowlevel: false,
                is_static: false,
                is_virtual: false,
                is_override: false,
                name: format!("set_{}", property.name),
                generics: Vec::new(),
                params: vec![
                    this_param(property.span.clone()),
                    ast::Param {
                        pattern: ast::Pattern::Ident {
                            name: "value".to_string(),
                            mutable: false,
                            ty: None,
                            span: property.span.clone(),
                        },
                        ty: property.ty.clone(),
                        span: property.span.clone(),
                    },
                ],
                return_type: None,
                where_clause: Vec::new(),
                body: Some(setter.clone()),
                span: property.span.clone(),
            };
            let saved = self.this_class.replace(class_name.clone());
            let mangled = format!("{}_set_{}", class_name, property.name);
            self.gen_function(&f, Some(&class_name), &HashMap::new(), Some(mangled));
            self.this_class = saved;
        }
    }

    /// Purity heuristic for the #0 attribute group: no calls, no stores
    /// through pointers received from outside.
    fn function_is_pure(&self, f: &ast::FuncDecl) -> bool {
        fn expr_pure(expr: &ast::Expr) -> bool {
            match &expr.kind {
                ast::ExprKind::Call { .. }
                | ast::ExprKind::MethodCall { .. }
                | ast::ExprKind::New { .. }
                | ast::ExprKind::Await(_)
                | ast::ExprKind::InterpolatedString(_) => false,
                ast::ExprKind::Binary { lhs, rhs, .. } => expr_pure(lhs) && expr_pure(rhs),
                ast::ExprKind::Unary { operand, .. } => expr_pure(operand),
                ast::ExprKind::Return(value) => {
                    value.as_ref().map(|v| expr_pure(v)).unwrap_or(true)
                }
                ast::ExprKind::If {
                    cond,
                    then_block,
                    else_branch,
                } => {
                    expr_pure(cond)
                        && block_pure(then_block)
                        && else_branch.as_ref().map(|e| expr_pure(e)).unwrap_or(true)
                }
                ast::ExprKind::Block(b) => block_pure(b),
                ast::ExprKind::Literal(_)
                | ast::ExprKind::Ident(_)
                | ast::ExprKind::Path(_)
                | ast::ExprKind::Field { .. }
                | ast::ExprKind::Index { .. }
                | ast::ExprKind::Tuple(_)
                | ast::ExprKind::Cast { .. }
                | ast::ExprKind::Is { .. } => true,
                ast::ExprKind::When { scrutinee, arms } => {
                    expr_pure(scrutinee) && arms.iter().all(|a| expr_pure(&a.body))
                }
                _ => false,
            }
        }
        fn block_pure(block: &ast::Block) -> bool {
            block.stmts.iter().all(|s| match s {
                ast::Stmt::Expr(e) => expr_pure(e),
                ast::Stmt::Let { value, .. } | ast::Stmt::Var { value, .. } => expr_pure(value),
                _ => false,
            })
        }
        f.body.as_ref().map(|b| block_pure(b)).unwrap_or(false)
    }
}

fn this_param(span: ast::Span) -> ast::Param {
    ast::Param {
        pattern: ast::Pattern::Ident {
            name: "this".to_string(),
            mutable: false,
            ty: None,
            span: span.clone(),
        },
        ty: ast::TypeExpr::Infer { span: span.clone() },
        span,
    }
}

pub(crate) fn zero_value_of(llvm_ty: &str) -> &'static str {
    match llvm_ty {
        "float" | "double" => "0.0",
        "ptr" => "null",
        s if s.starts_with('{') || s.starts_with('%') || s.starts_with('[') => "zeroinitializer",
        _ => "0",
    }
}
