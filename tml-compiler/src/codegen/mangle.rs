// Name mangling: `mangle(name, args)` = name ++ "__" ++ args joined by
// "__". The encoding is paired with a decoder; splitting `A__B__C` back
// into arguments consults the declared arity of `A`, never guesswork.

use crate::env::TypeEnv;
use crate::ty::Ty;

/// Encode one semantic type for use inside a mangled symbol.
pub fn mangle_type(ty: &Ty) -> String {
    match ty {
        Ty::I8 => "I8".into(),
        Ty::I16 => "I16".into(),
        Ty::I32 => "I32".into(),
        Ty::I64 => "I64".into(),
        Ty::I128 => "I128".into(),
        Ty::U8 => "U8".into(),
        Ty::U16 => "U16".into(),
        Ty::U32 => "U32".into(),
        Ty::U64 => "U64".into(),
        Ty::U128 => "U128".into(),
        Ty::F32 => "F32".into(),
        Ty::F64 => "F64".into(),
        Ty::Bool => "Bool".into(),
        Ty::Char => "Char".into(),
        Ty::Str => "Str".into(),
        Ty::Unit => "Unit".into(),
        Ty::Named { name, args, .. } | Ty::Class { name, args } => mangle_name(name, args),
        Ty::Ref {
            mutable, inner, ..
        } => {
            if *mutable {
                format!("mutref_{}", mangle_type(inner))
            } else {
                format!("ref_{}", mangle_type(inner))
            }
        }
        Ty::Ptr { mutable, inner } => {
            if *mutable {
                format!("mutptr_{}", mangle_type(inner))
            } else {
                format!("ptr_{}", mangle_type(inner))
            }
        }
        Ty::Array { elem, size } => format!("array{}_{}", size, mangle_type(elem)),
        Ty::Slice { elem } => format!("slice_{}", mangle_type(elem)),
        Ty::Tuple(elems) => {
            let mut out = format!("tuple{}", elems.len());
            for elem in elems {
                out.push('_');
                out.push_str(&mangle_type(elem));
            }
            out
        }
        Ty::Func { params, ret, .. } | Ty::Closure { params, ret } => {
            let mut out = format!("fn{}", params.len());
            for p in params {
                out.push('_');
                out.push_str(&mangle_type(p));
            }
            out.push_str("_ret_");
            out.push_str(&mangle_type(ret));
            out
        }
        Ty::DynBehavior { behavior, args } => {
            if args.is_empty() {
                format!("dyn_{}", behavior)
            } else {
                format!("dyn_{}", mangle_name(behavior, args))
            }
        }
        Ty::Var(id) => format!("var{}", id),
        Ty::Error => "error".into(),
    }
}

/// `mangle_name("Maybe", [I32])` -> `Maybe__I32`.
pub fn mangle_name(name: &str, args: &[Ty]) -> String {
    if args.is_empty() {
        return name.to_string();
    }
    let mut out = name.to_string();
    for arg in args {
        out.push_str("__");
        out.push_str(&mangle_type(arg));
    }
    out
}

/// Decode a mangled type string back into a semantic type. Generic
/// argument lists are split by the declared arity of the base type
/// recorded in the environment.
pub fn demangle_type(s: &str, env: &TypeEnv) -> Option<Ty> {
    if let Some(prim) = Ty::primitive_from_name(s) {
        return Some(prim);
    }
    if let Some(rest) = s.strip_prefix("mutref_") {
        return Some(Ty::Ref {
            mutable: true,
            inner: Box::new(demangle_type(rest, env)?),
            lifetime: None,
        });
    }
    if let Some(rest) = s.strip_prefix("ref_") {
        return Some(Ty::Ref {
            mutable: false,
            inner: Box::new(demangle_type(rest, env)?),
            lifetime: None,
        });
    }
    if let Some(rest) = s.strip_prefix("mutptr_") {
        return Some(Ty::Ptr {
            mutable: true,
            inner: Box::new(demangle_type(rest, env)?),
        });
    }
    if let Some(rest) = s.strip_prefix("ptr_") {
        return Some(Ty::Ptr {
            mutable: false,
            inner: Box::new(demangle_type(rest, env)?),
        });
    }
    if let Some(rest) = s.strip_prefix("dyn_") {
        let (behavior, args) = split_generic(rest, env)?;
        return Some(Ty::DynBehavior { behavior, args });
    }
    if let Some(rest) = s.strip_prefix("slice_") {
        return Some(Ty::Slice {
            elem: Box::new(demangle_type(rest, env)?),
        });
    }
    if let Some(rest) = s.strip_prefix("array") {
        if let Some(sep) = rest.find('_') {
            if let Ok(size) = rest[..sep].parse::<u64>() {
                return Some(Ty::Array {
                    elem: Box::new(demangle_type(&rest[sep + 1..], env)?),
                    size,
                });
            }
        }
    }

    let (name, args) = split_generic(s, env)?;
    if env.classes.contains_key(&name) {
        return Some(Ty::Class { name, args });
    }
    Some(Ty::Named {
        name,
        module: String::new(),
        args,
    })
}

/// Split `Base__A__B` using the arity of `Base` from the environment.
/// The argument segments are re-joined greedily so nested mangles
/// (`Maybe__Stack__I32` with arity-1 `Maybe` of arity-1 `Stack`) decode
/// correctly.
fn split_generic(s: &str, env: &TypeEnv) -> Option<(String, Vec<Ty>)> {
    let Some(split) = s.find("__") else {
        return Some((s.to_string(), Vec::new()));
    };
    let base = s[..split].to_string();
    let arity = env
        .structs
        .get(&base)
        .map(|i| i.type_params.len())
        .or_else(|| env.enums.get(&base).map(|i| i.type_params.len()))
        .or_else(|| env.classes.get(&base).map(|i| i.type_params.len()))
        .unwrap_or(1);

    let rest = &s[split + 2..];
    let segments: Vec<&str> = rest.split("__").collect();
    let mut args = Vec::new();
    let mut cursor = 0usize;

    for i in 0..arity {
        if cursor >= segments.len() {
            return None;
        }
        // The final argument absorbs all remaining segments; earlier
        // arguments absorb segments until the remainder can still fill
        // the leftover arity.
        let remaining_args = arity - i - 1;
        let take = if remaining_args == 0 {
            segments.len() - cursor
        } else {
            let mut take = 1;
            // Nested generic heads pull their own arity of segments.
            if let Some((_, nested_arity)) = nested_head(segments[cursor], env) {
                take += nested_arity;
            }
            take.min(segments.len() - cursor - remaining_args)
        };
        let arg_str = segments[cursor..cursor + take].join("__");
        args.push(demangle_type(&arg_str, env)?);
        cursor += take;
    }

    Some((base, args))
}

fn nested_head(segment: &str, env: &TypeEnv) -> Option<(String, usize)> {
    let head = segment
        .trim_start_matches("ref_")
        .trim_start_matches("mutref_")
        .trim_start_matches("ptr_")
        .trim_start_matches("mutptr_");
    let arity = env
        .structs
        .get(head)
        .map(|i| i.type_params.len())
        .or_else(|| env.enums.get(head).map(|i| i.type_params.len()))
        .or_else(|| env.classes.get(head).map(|i| i.type_params.len()))?;
    if arity == 0 {
        None
    } else {
        Some((head.to_string(), arity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::TypeEnv;

    #[test]
    fn mangles_primitives_and_generics() {
        assert_eq!(mangle_name("id", &[Ty::I32]), "id__I32");
        assert_eq!(
            mangle_name("Maybe", &[Ty::maybe(Ty::Str)]),
            "Maybe__Maybe__Str"
        );
        assert_eq!(
            mangle_type(&Ty::Ptr {
                mutable: false,
                inner: Box::new(Ty::I64)
            }),
            "ptr_I64"
        );
        assert_eq!(
            mangle_type(&Ty::Tuple(vec![Ty::I32, Ty::Bool])),
            "tuple2_I32_Bool"
        );
    }

    #[test]
    fn mangling_is_injective_for_distinct_args() {
        let a = mangle_name("pair", &[Ty::I32, Ty::maybe(Ty::I64)]);
        let b = mangle_name("pair", &[Ty::maybe(Ty::I32), Ty::I64]);
        assert_ne!(a, b);
    }

    #[test]
    fn demangles_with_declared_arity() {
        let env = TypeEnv::with_builtins();
        let ty = Ty::maybe(Ty::I32);
        let mangled = mangle_type(&ty);
        assert_eq!(demangle_type(&mangled, &env), Some(ty));

        // Outcome has arity 2: both arguments recovered.
        let outcome = Ty::outcome(Ty::Str, Ty::I32);
        let mangled = mangle_type(&outcome);
        assert_eq!(mangled, "Outcome__Str__I32");
        assert_eq!(demangle_type(&mangled, &env), Some(outcome));

        // Nested: Maybe[Maybe[I32]].
        let nested = Ty::maybe(Ty::maybe(Ty::I32));
        assert_eq!(demangle_type(&mangle_type(&nested), &env), Some(nested));
    }

    #[test]
    fn demangles_pointers() {
        let env = TypeEnv::with_builtins();
        let ty = Ty::Ptr {
            mutable: true,
            inner: Box::new(Ty::maybe(Ty::I8)),
        };
        assert_eq!(demangle_type(&mangle_type(&ty), &env), Some(ty));
    }
}
