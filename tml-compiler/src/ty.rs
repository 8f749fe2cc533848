// Semantic types. The checker resolves syntactic `TypeExpr`s into these;
// the IR generator lowers them to LLVM text.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Ty {
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bool,
    Char,
    Str,
    Unit,
    /// Struct, enum, union, or alias target, with the defining module path
    /// ("" for the current module) and applied type arguments.
    Named {
        name: String,
        module: String,
        args: Vec<Ty>,
    },
    Ref {
        mutable: bool,
        inner: Box<Ty>,
        lifetime: Option<String>,
    },
    Ptr {
        mutable: bool,
        inner: Box<Ty>,
    },
    Array {
        elem: Box<Ty>,
        size: u64,
    },
    Slice {
        elem: Box<Ty>,
    },
    Tuple(Vec<Ty>),
    Func {
        params: Vec<Ty>,
        ret: Box<Ty>,
        is_async: bool,
    },
    /// Function value that may carry a captured environment; lowered as a
    /// `{ ptr, ptr }` fat pointer.
    Closure {
        params: Vec<Ty>,
        ret: Box<Ty>,
    },
    Class {
        name: String,
        args: Vec<Ty>,
    },
    DynBehavior {
        behavior: String,
        args: Vec<Ty>,
    },
    /// Unification variable introduced during inference.
    Var(u32),
    /// Poisoned type; produced after an error to stop cascades.
    Error,
}

impl Ty {
    pub fn named(name: &str) -> Ty {
        Ty::Named {
            name: name.to_string(),
            module: String::new(),
            args: Vec::new(),
        }
    }

    pub fn maybe(inner: Ty) -> Ty {
        Ty::Named {
            name: "Maybe".to_string(),
            module: String::new(),
            args: vec![inner],
        }
    }

    pub fn outcome(ok: Ty, err: Ty) -> Ty {
        Ty::Named {
            name: "Outcome".to_string(),
            module: String::new(),
            args: vec![ok, err],
        }
    }

    pub fn primitive_from_name(name: &str) -> Option<Ty> {
        Some(match name {
            "I8" => Ty::I8,
            "I16" => Ty::I16,
            "I32" => Ty::I32,
            "I64" => Ty::I64,
            "I128" => Ty::I128,
            "U8" => Ty::U8,
            "U16" => Ty::U16,
            "U32" => Ty::U32,
            "U64" => Ty::U64,
            "U128" => Ty::U128,
            "Isize" => Ty::I64,
            "Usize" => Ty::U64,
            "F32" => Ty::F32,
            "F64" => Ty::F64,
            "Bool" => Ty::Bool,
            "Char" => Ty::Char,
            "Str" => Ty::Str,
            "Unit" => Ty::Unit,
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Ty::I8
                | Ty::I16
                | Ty::I32
                | Ty::I64
                | Ty::I128
                | Ty::U8
                | Ty::U16
                | Ty::U32
                | Ty::U64
                | Ty::U128
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Ty::U8 | Ty::U16 | Ty::U32 | Ty::U64 | Ty::U128)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Ty::Error)
    }

    /// Copy semantics: duplicating the value does not transfer ownership.
    /// Everything that owns heap state (Str, named aggregates, classes,
    /// closures) moves instead.
    pub fn is_copy(&self) -> bool {
        match self {
            Ty::Str
            | Ty::Named { .. }
            | Ty::Class { .. }
            | Ty::Closure { .. }
            | Ty::DynBehavior { .. }
            | Ty::Slice { .. } => false,
            Ty::Array { elem, .. } => elem.is_copy(),
            Ty::Tuple(elems) => elems.iter().all(Ty::is_copy),
            _ => true,
        }
    }

    /// Strip references for method/field lookup.
    pub fn deref_all(&self) -> &Ty {
        match self {
            Ty::Ref { inner, .. } => inner.deref_all(),
            other => other,
        }
    }

    pub fn contains_var(&self) -> bool {
        match self {
            Ty::Var(_) => true,
            Ty::Named { args, .. } | Ty::Class { args, .. } | Ty::DynBehavior { args, .. } => {
                args.iter().any(Ty::contains_var)
            }
            Ty::Ref { inner, .. } | Ty::Ptr { inner, .. } => inner.contains_var(),
            Ty::Array { elem, .. } | Ty::Slice { elem } => elem.contains_var(),
            Ty::Tuple(elems) => elems.iter().any(Ty::contains_var),
            Ty::Func { params, ret, .. } | Ty::Closure { params, ret } => {
                params.iter().any(Ty::contains_var) || ret.contains_var()
            }
            _ => false,
        }
    }

    /// Substitute named type parameters (`T` → concrete) through a type.
    pub fn substitute(&self, map: &std::collections::HashMap<String, Ty>) -> Ty {
        match self {
            Ty::Named { name, module, args } => {
                if args.is_empty() && module.is_empty() {
                    if let Some(replacement) = map.get(name) {
                        return replacement.clone();
                    }
                }
                Ty::Named {
                    name: name.clone(),
                    module: module.clone(),
                    args: args.iter().map(|a| a.substitute(map)).collect(),
                }
            }
            Ty::Ref {
                mutable,
                inner,
                lifetime,
            } => Ty::Ref {
                mutable: *mutable,
                inner: Box::new(inner.substitute(map)),
                lifetime: lifetime.clone(),
            },
            Ty::Ptr { mutable, inner } => Ty::Ptr {
                mutable: *mutable,
                inner: Box::new(inner.substitute(map)),
            },
            Ty::Array { elem, size } => Ty::Array {
                elem: Box::new(elem.substitute(map)),
                size: *size,
            },
            Ty::Slice { elem } => Ty::Slice {
                elem: Box::new(elem.substitute(map)),
            },
            Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| e.substitute(map)).collect()),
            Ty::Func {
                params,
                ret,
                is_async,
            } => Ty::Func {
                params: params.iter().map(|p| p.substitute(map)).collect(),
                ret: Box::new(ret.substitute(map)),
                is_async: *is_async,
            },
            Ty::Closure { params, ret } => Ty::Closure {
                params: params.iter().map(|p| p.substitute(map)).collect(),
                ret: Box::new(ret.substitute(map)),
            },
            Ty::Class { name, args } => {
                if args.is_empty() {
                    if let Some(replacement) = map.get(name) {
                        return replacement.clone();
                    }
                }
                Ty::Class {
                    name: name.clone(),
                    args: args.iter().map(|a| a.substitute(map)).collect(),
                }
            }
            Ty::DynBehavior { behavior, args } => Ty::DynBehavior {
                behavior: behavior.clone(),
                args: args.iter().map(|a| a.substitute(map)).collect(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ty::I8 => write!(f, "I8"),
            Ty::I16 => write!(f, "I16"),
            Ty::I32 => write!(f, "I32"),
            Ty::I64 => write!(f, "I64"),
            Ty::I128 => write!(f, "I128"),
            Ty::U8 => write!(f, "U8"),
            Ty::U16 => write!(f, "U16"),
            Ty::U32 => write!(f, "U32"),
            Ty::U64 => write!(f, "U64"),
            Ty::U128 => write!(f, "U128"),
            Ty::F32 => write!(f, "F32"),
            Ty::F64 => write!(f, "F64"),
            Ty::Bool => write!(f, "Bool"),
            Ty::Char => write!(f, "Char"),
            Ty::Str => write!(f, "Str"),
            Ty::Unit => write!(f, "Unit"),
            Ty::Named { name, args, .. } | Ty::Class { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            Ty::Ref { mutable, inner, .. } => {
                write!(f, "ref {}{}", if *mutable { "mut " } else { "" }, inner)
            }
            Ty::Ptr { mutable, inner } => {
                write!(f, "ptr {}{}", if *mutable { "mut " } else { "" }, inner)
            }
            Ty::Array { elem, size } => write!(f, "Array[{}; {}]", elem, size),
            Ty::Slice { elem } => write!(f, "Slice[{}]", elem),
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Ty::Func { params, ret, .. } | Ty::Closure { params, ret } => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Ty::DynBehavior { behavior, args } => {
                write!(f, "dyn {}", behavior)?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            Ty::Var(id) => write!(f, "?{}", id),
            Ty::Error => write!(f, "<error>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn display_forms() {
        assert_eq!(Ty::maybe(Ty::I32).to_string(), "Maybe[I32]");
        assert_eq!(
            Ty::Ref {
                mutable: true,
                inner: Box::new(Ty::Str),
                lifetime: None
            }
            .to_string(),
            "ref mut Str"
        );
        assert_eq!(
            Ty::Array {
                elem: Box::new(Ty::I32),
                size: 3
            }
            .to_string(),
            "Array[I32; 3]"
        );
    }

    #[test]
    fn substitution_replaces_parameters() {
        let mut map = HashMap::new();
        map.insert("T".to_string(), Ty::I64);
        let generic = Ty::maybe(Ty::named("T"));
        assert_eq!(generic.substitute(&map), Ty::maybe(Ty::I64));
    }

    #[test]
    fn copy_classification() {
        assert!(Ty::I32.is_copy());
        assert!(!Ty::Str.is_copy());
        assert!(!Ty::named("Point").is_copy());
        assert!(Ty::Tuple(vec![Ty::I32, Ty::Bool]).is_copy());
        assert!(!Ty::Tuple(vec![Ty::I32, Ty::Str]).is_copy());
    }
}
