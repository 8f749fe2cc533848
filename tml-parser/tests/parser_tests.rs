use tml_ast::*;
use tml_parser::{parse_source, parse_source_partial};

fn parse_ok(source: &str) -> Module {
    let (module, diagnostics) = parse_source(source, "test.tml");
    assert!(
        diagnostics.is_empty(),
        "unexpected diagnostics: {:#?}",
        diagnostics
    );
    module.expect("expected a module")
}

#[test]
fn parses_function_with_return_type() {
    let module = parse_ok("func main() -> I32 { return 0 }");
    assert_eq!(module.decls.len(), 1);
    match &module.decls[0] {
        Decl::Func(f) => {
            assert_eq!(f.name, "main");
            assert!(f.return_type.is_some());
            let body = f.body.as_ref().expect("body");
            assert_eq!(body.stmts.len(), 1);
        }
        other => panic!("expected func, got {:?}", other),
    }
}

#[test]
fn parses_generic_function_and_call() {
    let module = parse_ok(
        "func id[T](x: T) -> T { return x }\nfunc main() -> I32 { return id[I32](7) }",
    );
    let main = match &module.decls[1] {
        Decl::Func(f) => f,
        other => panic!("expected func, got {:?}", other),
    };
    let body = main.body.as_ref().expect("body");
    match &body.stmts[0] {
        Stmt::Expr(Expr {
            kind: ExprKind::Return(Some(inner)),
            ..
        }) => match &inner.kind {
            ExprKind::Call { type_args, args, .. } => {
                assert_eq!(type_args.len(), 1);
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected generic call, got {:?}", other),
        },
        other => panic!("expected return, got {:?}", other),
    }
}

#[test]
fn index_is_not_generic_call() {
    let module = parse_ok("func main() -> I32 { return xs[0] }");
    let f = match &module.decls[0] {
        Decl::Func(f) => f,
        _ => unreachable!(),
    };
    match &f.body.as_ref().unwrap().stmts[0] {
        Stmt::Expr(Expr {
            kind: ExprKind::Return(Some(inner)),
            ..
        }) => assert!(matches!(inner.kind, ExprKind::Index { .. })),
        other => panic!("expected return of index, got {:?}", other),
    }
}

#[test]
fn parses_struct_enum_union() {
    let module = parse_ok(
        "struct Point { x: I32, y: I32 }\n\
         enum Shape[T] { Circle(T), Rect(T, T), Empty }\n\
         union Raw { as_int: I64, as_float: F64 }",
    );
    assert!(matches!(module.decls[0], Decl::Struct(_)));
    match &module.decls[1] {
        Decl::Enum(e) => {
            assert_eq!(e.variants.len(), 3);
            assert_eq!(e.variants[1].payload.len(), 2);
            assert_eq!(e.generics.len(), 1);
        }
        other => panic!("expected enum, got {:?}", other),
    }
    assert!(matches!(module.decls[2], Decl::Union(_)));
}

#[test]
fn parses_class_hierarchy() {
    let module = parse_ok(
        "class Animal { name: Str\n virtual func speak(this) -> Str { return \"?\" } }\n\
         class Dog extends Animal implements Printable {\n\
             override func speak(this) -> Str { return \"woof\" }\n\
             static func kind() -> Str { return \"dog\" }\n\
         }",
    );
    let dog = match &module.decls[1] {
        Decl::Class(c) => c,
        other => panic!("expected class, got {:?}", other),
    };
    assert!(dog.base.is_some());
    assert_eq!(dog.interfaces.len(), 1);
    assert!(dog.methods[0].is_override);
    assert!(dog.methods[1].is_static);
}

#[test]
fn parses_class_property() {
    let module = parse_ok(
        "class Counter {\n\
             count: I32 = 0\n\
             total: I32 { get { return this.count } }\n\
         }",
    );
    let class = match &module.decls[0] {
        Decl::Class(c) => c,
        other => panic!("expected class, got {:?}", other),
    };
    assert_eq!(class.fields.len(), 1);
    assert_eq!(class.properties.len(), 1);
    assert!(class.properties[0].getter.is_some());
    assert!(class.properties[0].setter.is_none());
}

#[test]
fn parses_behavior_and_impl() {
    let module = parse_ok(
        "behavior Printable { func fmt(this) -> Str\n func describe(this) -> Str { return this.fmt() } }\n\
         impl Printable for Point { func fmt(this) -> Str { return \"point\" } }",
    );
    let behavior = match &module.decls[0] {
        Decl::Behavior(b) => b,
        other => panic!("expected behavior, got {:?}", other),
    };
    assert_eq!(behavior.methods.len(), 2);
    assert!(behavior.methods[0].body.is_none());
    assert!(behavior.methods[1].body.is_some());

    let imp = match &module.decls[1] {
        Decl::Impl(i) => i,
        other => panic!("expected impl, got {:?}", other),
    };
    assert_eq!(imp.behavior.as_ref().map(|b| b.last()), Some("Printable"));
}

#[test]
fn parses_when_with_guards_and_or_patterns() {
    let module = parse_ok(
        "func classify(n: I32) -> I32 {\n\
            when n {\n\
                0 | 1 => return 0,\n\
                2 to 9 => return 1,\n\
                x if x > 100 => return 3,\n\
                _ => return 2,\n\
            }\n\
         }",
    );
    let f = match &module.decls[0] {
        Decl::Func(f) => f,
        _ => unreachable!(),
    };
    match &f.body.as_ref().unwrap().stmts[0] {
        Stmt::Expr(Expr {
            kind: ExprKind::When { arms, .. },
            ..
        }) => {
            assert_eq!(arms.len(), 4);
            assert!(matches!(arms[0].pattern, Pattern::Or { .. }));
            assert!(matches!(arms[1].pattern, Pattern::Range { .. }));
            assert!(arms[2].guard.is_some());
            assert!(matches!(arms[3].pattern, Pattern::Wildcard { .. }));
        }
        other => panic!("expected when, got {:?}", other),
    }
}

#[test]
fn parses_let_else_and_var() {
    let module = parse_ok(
        "func main() -> I32 {\n\
            var n = 10\n\
            let Just(v) = lookup() else { return -1 }\n\
            n = n + v\n\
            return n\n\
         }",
    );
    let f = match &module.decls[0] {
        Decl::Func(f) => f,
        _ => unreachable!(),
    };
    let stmts = &f.body.as_ref().unwrap().stmts;
    assert!(matches!(stmts[0], Stmt::Var { .. }));
    assert!(matches!(stmts[1], Stmt::LetElse { .. }));
}

#[test]
fn parses_closures() {
    let module = parse_ok(
        "func main() -> I32 {\n\
            var n = 10\n\
            let add = do(x) { n = n + x }\n\
            let own = move do(y: I32) -> I32 { return y }\n\
            add(5)\n\
            return n\n\
         }",
    );
    let f = match &module.decls[0] {
        Decl::Func(f) => f,
        _ => unreachable!(),
    };
    let stmts = &f.body.as_ref().unwrap().stmts;
    match &stmts[1] {
        Stmt::Let { value, .. } => {
            assert!(matches!(
                value.kind,
                ExprKind::Closure { is_move: false, .. }
            ));
        }
        other => panic!("expected let, got {:?}", other),
    }
    match &stmts[2] {
        Stmt::Let { value, .. } => {
            assert!(matches!(value.kind, ExprKind::Closure { is_move: true, .. }));
        }
        other => panic!("expected let, got {:?}", other),
    }
}

#[test]
fn parses_new_base_and_virtual_dispatch_source() {
    let module = parse_ok(
        "func main() -> I32 {\n\
            let a: Animal = new Dog()\n\
            print(a.speak())\n\
            return 0\n\
         }",
    );
    let f = match &module.decls[0] {
        Decl::Func(f) => f,
        _ => unreachable!(),
    };
    match &f.body.as_ref().unwrap().stmts[0] {
        Stmt::Let { value, .. } => assert!(matches!(value.kind, ExprKind::New { .. })),
        other => panic!("expected let with new, got {:?}", other),
    }
}

#[test]
fn parses_interpolated_strings() {
    let module = parse_ok("func greet(name: Str) { print(\"hi ${name}, ${1 + 2}\") }");
    let f = match &module.decls[0] {
        Decl::Func(f) => f,
        _ => unreachable!(),
    };
    match &f.body.as_ref().unwrap().stmts[0] {
        Stmt::Expr(Expr {
            kind: ExprKind::Call { args, .. },
            ..
        }) => match &args[0].kind {
            ExprKind::InterpolatedString(parts) => {
                assert_eq!(parts.len(), 4);
                assert!(matches!(parts[1], InterpPart::Expr(_)));
                assert!(matches!(parts[3], InterpPart::Expr(_)));
            }
            other => panic!("expected interpolated string, got {:?}", other),
        },
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn parses_use_and_module() {
    let module = parse_ok(
        "use std::io::println\n\
         use std::sync::Mutex as Lock\n\
         mod helpers { func helper() -> I32 { return 1 } }",
    );
    match &module.decls[1] {
        Decl::Use(u) => {
            assert_eq!(u.local_name(), "Lock");
            assert_eq!(u.module_path(), "std::sync");
        }
        other => panic!("expected use, got {:?}", other),
    }
    assert!(matches!(module.decls[2], Decl::Mod(_)));
}

#[test]
fn parses_ternary_cast_is_try_await() {
    parse_ok(
        "async func fetch() -> I32 {\n\
            let a = cond ? 1 : 2\n\
            let b = x as I64\n\
            let c = y is Str\n\
            let d = compute()!\n\
            let e = task().await\n\
            return 0\n\
         }",
    );
}

#[test]
fn recovers_from_multiple_errors() {
    let source = "func ok1() -> I32 { return 1 }\n\
                  func broken( { bad }\n\
                  func ok2() -> I32 { return 2 }\n\
                  struct AlsoBroken { x I32 }\n\
                  func ok3() -> I32 { return 3 }";
    let (module, diagnostics) = parse_source_partial(source, "test.tml");
    assert!(diagnostics.len() >= 2, "want 2+ errors, got {:?}", diagnostics);
    let names: Vec<_> = module
        .decls
        .iter()
        .filter_map(|d| d.name().map(str::to_string))
        .collect();
    assert!(names.contains(&"ok1".to_string()));
    assert!(names.contains(&"ok2".to_string()));
    assert!(names.contains(&"ok3".to_string()));
}

#[test]
fn when_arrow_fixit() {
    let source = "func f(m: Maybe[I32]) -> I32 { when m { Just(v) -> return v, Nothing => return 0 } }";
    let (_, diagnostics) = parse_source_partial(source, "test.tml");
    let arrow_error = diagnostics
        .iter()
        .find(|d| d.code == "P048")
        .expect("expected P048");
    assert!(!arrow_error.fixes.is_empty());
    assert_eq!(arrow_error.fixes[0].replacement, "=>");
}

#[test]
fn decorators_are_attached() {
    let module = parse_ok(
        "@test\nfunc check_math() { assert_eq(2 + 2, 4) }\n\
         @allocates\nfunc make_label() -> Str { return \"x\" }",
    );
    match &module.decls[0] {
        Decl::Func(f) => assert!(f.has_decorator("test")),
        _ => unreachable!(),
    }
    match &module.decls[1] {
        Decl::Func(f) => assert!(f.has_decorator("allocates")),
        _ => unreachable!(),
    }
}

#[test]
fn array_types_and_literals() {
    let module = parse_ok(
        "func first(xs: Array[I32; 3]) -> I32 { return xs[0] }\n\
         func zeros() -> Array[I32; 4] { return [0; 4] }\n\
         func all(s: Slice[I32]) -> I32 { return s.len() }",
    );
    match &module.decls[0] {
        Decl::Func(f) => assert!(matches!(f.params[0].ty, TypeExpr::Array { .. })),
        _ => unreachable!(),
    }
    match &module.decls[2] {
        Decl::Func(f) => assert!(matches!(f.params[0].ty, TypeExpr::Slice { .. })),
        _ => unreachable!(),
    }
}
