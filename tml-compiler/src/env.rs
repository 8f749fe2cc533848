// Type environment: every signature the checker resolves and the IR
// generator consumes. Maps are ordered so iteration (and therefore
// emitted IR) is deterministic.

use crate::ty::Ty;
use std::collections::BTreeMap;
use tml_ast as ast;

#[derive(Debug, Clone)]
pub struct GenericSig {
    pub name: String,
    pub bounds: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FuncSig {
    pub name: String,
    pub module: String,
    pub generics: Vec<GenericSig>,
    pub params: Vec<(String, Ty)>,
    pub ret: Ty,
    pub is_async: bool,
    pub is_lowlevel: bool,
    /// `@allocates`: the returned `Str` is heap-owned by the caller.
    pub allocates: bool,
    pub has_body: bool,
    pub span: ast::Span,
}

impl FuncSig {
    pub fn ty(&self) -> Ty {
        Ty::Func {
            params: self.params.iter().map(|(_, t)| t.clone()).collect(),
            ret: Box::new(self.ret.clone()),
            is_async: self.is_async,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Ty,
    pub is_pub: bool,
    pub has_default: bool,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub module: String,
    pub type_params: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub span: ast::Span,
}

#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub name: String,
    pub payload: Vec<Ty>,
}

#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: String,
    pub module: String,
    pub type_params: Vec<String>,
    pub variants: Vec<VariantInfo>,
    pub span: ast::Span,
}

impl EnumInfo {
    pub fn variant(&self, name: &str) -> Option<(usize, &VariantInfo)> {
        self.variants
            .iter()
            .enumerate()
            .find(|(_, v)| v.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct UnionInfo {
    pub name: String,
    pub fields: Vec<FieldInfo>,
    pub span: ast::Span,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub sig: FuncSig,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: Ty,
    pub has_getter: bool,
    pub has_setter: bool,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub module: String,
    pub type_params: Vec<String>,
    pub base: Option<String>,
    pub base_args: Vec<Ty>,
    pub interfaces: Vec<String>,
    /// Own fields only; inherited fields come from the base chain.
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub properties: Vec<PropertyInfo>,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_value_class: bool,
    pub is_pooled: bool,
    pub span: ast::Span,
}

impl ClassInfo {
    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.sig.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorMethod {
    pub sig: FuncSig,
    pub has_default: bool,
}

#[derive(Debug, Clone)]
pub struct BehaviorInfo {
    pub name: String,
    pub module: String,
    pub generics: Vec<GenericSig>,
    pub super_behaviors: Vec<String>,
    pub assoc_types: Vec<String>,
    pub methods: Vec<BehaviorMethod>,
    pub span: ast::Span,
}

impl BehaviorInfo {
    pub fn method(&self, name: &str) -> Option<&BehaviorMethod> {
        self.methods.iter().find(|m| m.sig.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct ImplInfo {
    pub behavior: Option<String>,
    pub self_name: String,
    pub self_ty: Ty,
    pub generics: Vec<GenericSig>,
    pub methods: Vec<FuncSig>,
    pub span: ast::Span,
}

#[derive(Debug, Clone)]
pub struct ConstInfo {
    pub ty: Ty,
    /// Integer value when the initializer folded to one (const-eval).
    pub int_value: Option<i128>,
}

/// The resolved view of one compilation: all signatures by name.
#[derive(Debug, Default)]
pub struct TypeEnv {
    pub functions: BTreeMap<String, FuncSig>,
    pub structs: BTreeMap<String, StructInfo>,
    pub enums: BTreeMap<String, EnumInfo>,
    pub unions: BTreeMap<String, UnionInfo>,
    pub classes: BTreeMap<String, ClassInfo>,
    pub behaviors: BTreeMap<String, BehaviorInfo>,
    pub impls: Vec<ImplInfo>,
    pub consts: BTreeMap<String, ConstInfo>,
    pub aliases: BTreeMap<String, (Vec<String>, Ty)>,
}

impl TypeEnv {
    /// Environment pre-seeded with the prelude: Maybe/Outcome, the
    /// Iterator behavior, and the runtime built-in functions.
    pub fn with_builtins() -> Self {
        let mut env = TypeEnv::default();

        env.enums.insert(
            "Maybe".to_string(),
            EnumInfo {
                name: "Maybe".to_string(),
                module: String::new(),
                type_params: vec!["T".to_string()],
                variants: vec![
                    VariantInfo {
                        name: "Nothing".to_string(),
                        payload: Vec::new(),
                    },
                    VariantInfo {
                        name: "Just".to_string(),
                        payload: vec![Ty::named("T")],
                    },
                ],
                span: 0..0,
            },
        );

        env.enums.insert(
            "Outcome".to_string(),
            EnumInfo {
                name: "Outcome".to_string(),
                module: String::new(),
                type_params: vec!["T".to_string(), "E".to_string()],
                variants: vec![
                    VariantInfo {
                        name: "Err".to_string(),
                        payload: vec![Ty::named("E")],
                    },
                    VariantInfo {
                        name: "Ok".to_string(),
                        payload: vec![Ty::named("T")],
                    },
                ],
                span: 0..0,
            },
        );

        env.behaviors.insert(
            "Iterator".to_string(),
            BehaviorInfo {
                name: "Iterator".to_string(),
                module: String::new(),
                generics: Vec::new(),
                super_behaviors: Vec::new(),
                assoc_types: vec!["Item".to_string()],
                methods: vec![BehaviorMethod {
                    sig: FuncSig {
                        name: "next".to_string(),
                        module: String::new(),
                        generics: Vec::new(),
                        params: vec![("this".to_string(), Ty::named("This"))],
                        ret: Ty::maybe(Ty::named("Item")),
                        is_async: false,
                        is_lowlevel: false,
                        allocates: false,
                        has_body: false,
                        span: 0..0,
                    },
                    has_default: false,
                }],
                span: 0..0,
            },
        );

        env.behaviors.insert(
            "Drop".to_string(),
            BehaviorInfo {
                name: "Drop".to_string(),
                module: String::new(),
                generics: Vec::new(),
                super_behaviors: Vec::new(),
                assoc_types: Vec::new(),
                methods: vec![BehaviorMethod {
                    sig: FuncSig {
                        name: "drop".to_string(),
                        module: String::new(),
                        generics: Vec::new(),
                        params: vec![("this".to_string(), Ty::named("This"))],
                        ret: Ty::Unit,
                        is_async: false,
                        is_lowlevel: false,
                        allocates: false,
                        has_body: false,
                        span: 0..0,
                    },
                    has_default: false,
                }],
                span: 0..0,
            },
        );

        for (name, params, ret, allocates) in builtin_functions() {
            env.functions.insert(
                name.to_string(),
                FuncSig {
                    name: name.to_string(),
                    module: String::new(),
                    generics: Vec::new(),
                    params,
                    ret,
                    is_async: false,
                    is_lowlevel: false,
                    allocates,
                    has_body: false,
                    span: 0..0,
                },
            );
        }

        env
    }

    pub fn is_builtin_function(&self, name: &str) -> bool {
        self.functions
            .get(name)
            .map(|f| !f.has_body && f.span == (0..0))
            .unwrap_or(false)
    }

    /// Any user type with this name?
    pub fn has_type(&self, name: &str) -> bool {
        self.structs.contains_key(name)
            || self.enums.contains_key(name)
            || self.unions.contains_key(name)
            || self.classes.contains_key(name)
            || self.aliases.contains_key(name)
            || self.behaviors.contains_key(name)
    }

    /// Fields of a class including inherited ones, base-first, following
    /// the layout `[vtable?, base fields…, own fields…]` (the vtable slot
    /// itself is a codegen artifact, not listed here).
    pub fn all_class_fields(&self, name: &str) -> Vec<FieldInfo> {
        let mut out = Vec::new();
        self.collect_class_fields(name, &mut out, 0);
        out
    }

    fn collect_class_fields(&self, name: &str, out: &mut Vec<FieldInfo>, depth: usize) {
        // Cycles are diagnosed by the checker; cap recursion anyway.
        if depth > 64 {
            return;
        }
        if let Some(class) = self.classes.get(name) {
            if let Some(base) = &class.base {
                self.collect_class_fields(base, out, depth + 1);
            }
            out.extend(class.fields.iter().cloned());
        }
    }

    /// Walk the inheritance chain upward: `name`, its base, and so on.
    pub fn class_chain(&self, name: &str) -> Vec<&ClassInfo> {
        let mut out = Vec::new();
        let mut cursor = Some(name.to_string());
        while let Some(current) = cursor {
            match self.classes.get(&current) {
                Some(class) => {
                    if out.iter().any(|c: &&ClassInfo| c.name == class.name) {
                        break; // cycle; reported elsewhere
                    }
                    cursor = class.base.clone();
                    out.push(class);
                }
                None => break,
            }
        }
        out
    }

    /// Resolve a method anywhere in the inheritance chain, nearest first.
    pub fn find_class_method(&self, class: &str, method: &str) -> Option<(String, MethodInfo)> {
        for info in self.class_chain(class) {
            if let Some(m) = info.method(method) {
                return Some((info.name.clone(), m.clone()));
            }
        }
        None
    }

    /// True when the class (or an ancestor) declares a virtual method,
    /// which forces a vtable slot at field 0.
    pub fn class_needs_vtable(&self, class: &str) -> bool {
        if self
            .classes
            .get(class)
            .map(|c| c.is_value_class)
            .unwrap_or(false)
        {
            return false;
        }
        self.class_chain(class)
            .iter()
            .any(|c| !c.interfaces.is_empty() || c.methods.iter().any(|m| m.is_virtual || m.is_override))
    }

    /// Stable vtable slot order for a class: inherited virtual methods
    /// first (parent order preserved), then newly introduced ones.
    pub fn vtable_layout(&self, class: &str) -> Vec<String> {
        let chain = self.class_chain(class);
        let mut slots: Vec<String> = Vec::new();
        // Walk from the root down so parent slots come first.
        for info in chain.iter().rev() {
            for interface in &info.interfaces {
                if let Some(behavior) = self.behaviors.get(interface) {
                    for m in &behavior.methods {
                        if !slots.contains(&m.sig.name) {
                            slots.push(m.sig.name.clone());
                        }
                    }
                }
            }
            for m in &info.methods {
                if m.is_virtual && !slots.contains(&m.sig.name) {
                    slots.push(m.sig.name.clone());
                }
            }
        }
        slots
    }

    /// The class whose definition provides `method` when dispatching on
    /// `class` (nearest override wins).
    pub fn vtable_impl_class(&self, class: &str, method: &str) -> Option<String> {
        for info in self.class_chain(class) {
            if info.method(method).is_some() {
                return Some(info.name.clone());
            }
        }
        None
    }

    /// Find the enum that declares a bare variant constructor (`Just`,
    /// `Ok`, user variants). Ambiguity is resolved in declaration order.
    pub fn enum_for_variant(&self, variant: &str) -> Option<(&EnumInfo, usize)> {
        for info in self.enums.values() {
            if let Some((idx, _)) = info.variant(variant) {
                return Some((info, idx));
            }
        }
        None
    }

    /// Inherent (non-behavior) impl methods for a named type.
    pub fn inherent_method(&self, type_name: &str, method: &str) -> Option<&FuncSig> {
        self.impls
            .iter()
            .filter(|i| i.behavior.is_none() && i.self_name == type_name)
            .flat_map(|i| i.methods.iter())
            .find(|m| m.name == method)
    }

    /// Behavior-impl methods reachable for a named type, with default
    /// methods from the behavior filling gaps.
    pub fn behavior_method(&self, type_name: &str, method: &str) -> Option<(String, FuncSig)> {
        for imp in self.impls.iter().filter(|i| i.self_name == type_name) {
            let Some(behavior_name) = &imp.behavior else {
                continue;
            };
            if let Some(sig) = imp.methods.iter().find(|m| m.name == method) {
                return Some((behavior_name.clone(), sig.clone()));
            }
            if let Some(behavior) = self.behaviors.get(behavior_name) {
                if let Some(bm) = behavior.method(method) {
                    if bm.has_default {
                        return Some((behavior_name.clone(), bm.sig.clone()));
                    }
                }
            }
        }
        None
    }

    /// Does `type_name` implement `behavior` (directly)?
    pub fn implements(&self, type_name: &str, behavior: &str) -> bool {
        self.impls
            .iter()
            .any(|i| i.self_name == type_name && i.behavior.as_deref() == Some(behavior))
            || self
                .classes
                .get(type_name)
                .map(|c| c.interfaces.iter().any(|i| i == behavior))
                .unwrap_or(false)
    }

    /// Whether a type carries a user `Drop` impl (drop glue target).
    pub fn has_drop_impl(&self, type_name: &str) -> bool {
        self.impls
            .iter()
            .any(|i| i.self_name == type_name && i.behavior.as_deref() == Some("Drop"))
    }
}

/// Runtime built-ins surfaced to user code. The C runtime provides the
/// symbol; the signature here is what the checker enforces.
fn builtin_functions() -> Vec<(&'static str, Vec<(String, Ty)>, Ty, bool)> {
    let p = |name: &str, ty: Ty| (name.to_string(), ty);
    vec![
        ("print", vec![p("value", Ty::Str)], Ty::Unit, false),
        ("println", vec![p("value", Ty::Str)], Ty::Unit, false),
        ("print_int", vec![p("value", Ty::I64)], Ty::Unit, false),
        ("print_float", vec![p("value", Ty::F64)], Ty::Unit, false),
        ("eprint", vec![p("value", Ty::Str)], Ty::Unit, false),
        ("exit", vec![p("code", Ty::I32)], Ty::Unit, false),
        ("panic", vec![p("message", Ty::Str)], Ty::Unit, false),
        ("assert", vec![p("cond", Ty::Bool)], Ty::Unit, false),
        (
            "assert_eq",
            vec![p("left", Ty::I64), p("right", Ty::I64)],
            Ty::Unit,
            false,
        ),
        ("str_len", vec![p("s", Ty::Str)], Ty::I64, false),
        (
            "str_concat",
            vec![p("a", Ty::Str), p("b", Ty::Str)],
            Ty::Str,
            true,
        ),
        (
            "str_eq",
            vec![p("a", Ty::Str), p("b", Ty::Str)],
            Ty::Bool,
            false,
        ),
        ("int_to_str", vec![p("value", Ty::I64)], Ty::Str, true),
        ("float_to_str", vec![p("value", Ty::F64)], Ty::Str, true),
        ("str_free", vec![p("s", Ty::Str)], Ty::Unit, false),
        ("time_us", vec![], Ty::I64, false),
        ("time_ns", vec![], Ty::I64, false),
        ("sqrt", vec![p("x", Ty::F64)], Ty::F64, false),
        ("abs", vec![p("x", Ty::I64)], Ty::I64, false),
    ]
}
