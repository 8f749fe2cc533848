// The `explain` command: a flat static map from diagnostic code to its
// stored explanation, printed verbatim. Exit code 0 for known codes, 1
// for unknown ones.

pub fn run(code: &str) -> i32 {
    let normalized = code.trim().to_ascii_uppercase();
    match lookup(&normalized) {
        Some(text) => {
            println!("{}", text.trim_start_matches('\n'));
            0
        }
        None => {
            eprintln!("error: no extended explanation for `{}`", code);
            eprintln!("codes look like L001 (lexer), P001 (parser), T001 (types), B001 (borrows), C001 (codegen), E001 (general)");
            1
        }
    }
}

fn lookup(code: &str) -> Option<&'static str> {
    Some(match code {
        // ==================== Lexer ====================
        "L001" => r#"
Invalid character [L001]

The lexer encountered a character that is not valid in TML source code.

Example of erroneous code:

    let x@ = 42     // '@' is not valid here

How to fix: remove the invalid character. Decorators (`@inline`,
`@test`) are only valid immediately before a declaration.
"#,
        "L002" => r##"
Unterminated string literal [L002]

A string literal was opened with `"` but never closed before the end of
the line or file.

    let s = "hello

Add the closing quote, or use a raw string `r#"…"#` for multi-line text.
"##,
        "L003" => r#"
Invalid number literal [L003]

A numeric literal is malformed: it has no digits after a base prefix, or
its shape cannot be classified.

    let x = 0x        // no digits after `0x`
"#,
        "L004" => r#"
Invalid escape sequence [L004]

A string or character literal contains an unknown escape. Valid escapes
are \\ \" \' \n \r \t \0 \xNN and \u{…}.

    let s = "bad \q escape"     // `\q` is not an escape
"#,
        "L005" => r#"
Unterminated character literal [L005]

A character literal is missing its closing quote or contains more than
one character.

    let c = 'ab'      // two characters
    let d = 'x        // missing closing quote
"#,
        "L006" => r#"
Empty character literal [L006]

`''` contains no character. Write the character, or use a string if you
meant an empty text.
"#,
        "L008" => r#"
Invalid hexadecimal literal [L008]

A `0x` literal contains a digit outside 0-9/a-f.

    let x = 0xG1      // `G` is not a hex digit
"#,
        "L009" => r#"
Invalid binary literal [L009]

A `0b` literal contains a digit other than 0 or 1.

    let x = 0b102     // `2` is not a binary digit
"#,
        "L010" => r#"
Invalid octal literal [L010]

A `0o` literal contains a digit outside 0-7.

    let x = 0o78      // `8` is not an octal digit
"#,
        "L012" => r#"
Unterminated block comment [L012]

A `/*` comment never finds its matching `*/`. Block comments nest, so
every `/*` needs its own `*/`.
"#,
        "L013" => r##"
Unterminated raw string literal [L013]

A raw string `r#"…"#` was not closed with a quote followed by the same
number of `#` characters it was opened with.
"##,
        "L015" => r#"
Unterminated template literal [L015]

A `${…}` interpolation hole inside a string is missing its closing `}`.

    let s = "value: ${x"
"#,
        "L016" => r#"
Invalid integer type suffix [L016]

An integer literal carries a suffix that is not a known integer type.
Valid suffixes: i8 i16 i32 i64 i128 u8 u16 u32 u64 u128.

    let x = 42i99     // `i99` is not a type
"#,
        "L017" => r#"
Invalid float type suffix [L017]

A float literal carries a suffix other than f32 or f64.

    let x = 3.14f16   // `f16` is not a float type
"#,
        "L018" => r#"
Missing exponent digits [L018]

A float literal has an `e` exponent marker with no digits after it.

    let x = 1.0e      // missing the exponent
"#,
        "L019" => r#"
Invalid floating-point number [L019]

The literal cannot be represented as an F64 (it overflows to infinity).
"#,
        "L020" => r#"
Invalid integer number [L020]

The literal does not fit any integer type, or exceeds the range of its
explicit suffix.

    let x = 300i8     // 300 does not fit in I8
"#,

        // ==================== Parser ====================
        "P001" => r#"
Unexpected token [P001]

The parser found a token that cannot start or continue the construct it
was reading. The message names what was expected at that point.
"#,
        "P003" => r#"
Missing brace [P003]

A `{` or `}` was expected. Every block, struct body, and when expression
is brace-delimited.
"#,
        "P004" => r#"
Invalid expression [P004]

An expression was expected here. Expressions start with a literal, an
identifier, `(`, `[`, or a keyword like `if`, `when`, `new`, or `do`.
"#,
        "P005" => r#"
Expected type [P005]

A type was expected. Types look like `I32`, `Maybe[T]`, `ref Str`,
`(I32, Bool)`, `Array[U8; 16]`, or `func(I32) -> Bool`.
"#,
        "P007" => r#"
Expected pattern [P007]

A pattern was expected: `_`, an identifier, a literal, a tuple, a
variant like `Just(x)`, or a struct pattern like `Point { x, y }`.
"#,
        "P008" => r#"
Expected colon [P008]

A `:` was expected, usually between a name and its type:

    func scale(factor: F64) -> F64
"#,
        "P009" => r#"
Expected comma [P009]

A `,` was expected between list elements (arguments, fields, variants,
when arms).
"#,
        "P010" => r#"
Expected parenthesis [P010]

A `(` was expected, typically to begin a parameter or argument list.
"#,
        "P014" => r#"
Invalid literal in pattern [P014]

Only literals (integers, floats, strings, chars, booleans, null) can
appear in literal patterns.
"#,
        "P017" => r#"
Unclosed parenthesis [P017]

A `(` has no matching `)`.
"#,
        "P019" => "Invalid operator [P019]\n\nThe token is not a valid operator in this position.",
        "P022" => r#"
Expected type name [P022]

A named type was expected. `Array` additionally needs `[T; N]` and
`Slice` needs `[T]`.
"#,
        "P026" => r#"
Expected module name [P026]

Imports are `::`-separated paths ending in the imported symbol:

    use std::io::println
    use std::sync::Mutex as Lock
"#,
        "P037" => r#"
Expected expression in interpolation [P037]

A `${}` interpolation hole is empty or contains trailing tokens after
its expression.

    print("x is ${}")     // empty hole
"#,
        "P041" => r#"
Invalid struct pattern [P041]

Struct patterns list field names, optionally with sub-patterns:

    when p { Point { x, y: py } => …, }
"#,
        "P043" => r#"
Invalid tuple pattern [P043]

Tuple patterns are parenthesized, comma-separated sub-patterns:
`(a, b, _)`.
"#,
        "P045" => r#"
Expected field type [P045]

Struct, union, and class fields are written `name: Type`.

    struct Point { x: I32, y: I32 }
"#,
        "P047" => "Invalid when arm [P047]\n\nEach arm is `pattern [if guard] => expression`.",
        "P048" => r#"
Expected arrow in when arm [P048]

When arms use `=>` between the pattern and the body; `->` is for
function return types.

    when m { Just(v) => v, Nothing => 0 }
"#,
        "P050" => r#"
Expected get or set [P050]

Property bodies contain accessor blocks:

    total: I32 { get { return this.count } }
"#,
        "P064" => r#"
Invalid closure expression [P064]

Closures are written with `do`:

    let add = do(x, y) { x + y }
    let own = move do(x) { x }
"#,
        "P065" => r#"
Invalid closure parameter [P065]

Closure parameters must be plain identifiers, optionally typed:
`do(x, y: I32) { … }`.
"#,

        // ==================== Type checker ====================
        "T001" => r#"
Type mismatch [T001]

An expression's type does not match what its context requires. The
message shows the expected and found types.

    let x: I32 = "hello"      // expected `I32`, found `Str`
"#,
        "T002" => r#"
Unknown type [T002]

A type name is not defined and is not a primitive. Check the spelling
or add the missing `use` import.
"#,
        "T003" => "Unknown function [T003]\n\nNo function with this name is in scope.",
        "T004" => r#"
Argument count mismatch [T004]

A call supplies a different number of arguments than the function
declares.
"#,
        "T005" => "Unknown field [T005]\n\nThe type has no field with this name.",
        "T006" => "Unknown method [T006]\n\nNo inherent or behavior method with this name exists for the type.",
        "T007" => r#"
Cannot infer type [T007]

A generic call leaves a type parameter unbound and the return type
depends on it. Annotate explicitly: `make[I32]()`.
"#,
        "T008" => "Duplicate definition [T008]\n\nThe name is already defined in this scope.",
        "T009" => "Undeclared variable [T009]\n\nThe name is not bound in any enclosing scope.",
        "T010" => "Not callable [T010]\n\nOnly functions, closures, and function-typed values can be called.",
        "T011" => "Missing type annotation [T011]\n\nThe type cannot be inferred here; add an annotation.",
        "T013" => r#"
Immutable assignment [T013]

Assignment to a `let` binding. Declare it `var` to allow mutation:

    var x = 1
    x = 2
"#,
        "T014" => "Condition not Bool [T014]\n\n`if`, `while`, guards, and the ternary condition must be `Bool`.",
        "T015" => "Branch type mismatch [T015]\n\nThe branches of an `if`/ternary/when produce incompatible types.",
        "T016" => "Return type mismatch [T016]\n\nA `return` value does not match the declared return type.",
        "T017" => "Cannot dereference non-reference type [T017]\n\n`*x` needs a `ref` or `ptr` operand.",
        "T020" => r#"
Division by zero in const expression [T020]

A constant initializer divides by zero; constants are evaluated at
compile time.
"#,
        "T022" => "Unknown struct [T022]\n\nNo struct with this name is defined or imported.",
        "T023" => "Unknown enum type [T023]\n\nNo enum with this name is defined or imported.",
        "T024" => "Unknown enum variant [T024]\n\nThe enum does not declare this variant.",
        "T025" => "Unknown behavior [T025]\n\nNo behavior with this name is defined or imported.",
        "T026" => r#"
Missing behavior implementation [T026]

An `impl Behavior for T` (or a class `implements`) omits a method the
behavior requires and provides no default for.
"#,
        "T027" => "Module not found [T027]\n\nThe imported module path does not resolve to a known module.",
        "T029" => "Missing return statement [T029]\n\nA non-Unit function has a path that falls off the end without returning.",
        "T030" => "Break outside of loop [T030]",
        "T031" => "Continue outside of loop [T031]",
        "T032" => "Await outside async [T032]\n\n`.await` is only valid inside `async func`.",
        "T033" => r#"
Invalid try operator [T033]

`expr!` requires the operand to be `Maybe[T]` or `Outcome[T, E]`, and
the surrounding function must return the same shape so the failure can
propagate.
"#,
        "T034" => "Wrong variant arguments [T034]\n\nThe variant constructor or pattern has the wrong payload count.",
        "T035" => "Pattern type mismatch [T035]\n\nThe pattern cannot match a scrutinee of this type.",
        "T036" => "Tuple arity mismatch [T036]\n\nThe tuple pattern has a different element count than the value.",
        "T037" => r#"
Non-exhaustive when [T037]

The arms of a `when` do not cover every value of the scrutinee. The
message names an uncovered witness; add an arm for it or a trailing
`_ => …`.
"#,
        "T038" => "Cannot redefine builtin type [T038]",
        "T039" => r#"
Circular dependency [T039]

Either module imports form a cycle, or a class `extends` chain loops
back on itself.
"#,
        "T040" => r#"
Cannot instantiate abstract [T040]

`new` on an `@abstract` class. Instantiate a concrete subclass.
"#,
        "T042" => r#"
Value class virtual method [T042]

`@value` classes are stored by value and have no vtable, so they cannot
declare `virtual` methods.
"#,
        "T044" => "Pool/value class conflict [T044]\n\n`@pool` and `@value` are mutually exclusive.",
        "T045" => r#"
Missing abstract implementation [T045]

A concrete class inherits an abstract method and never overrides it.
"#,
        "T046" => "Base class not found [T046]\n\nThe `extends` target is unknown or not extendable.",
        "T047" => "Interface not found [T047]\n\nThe `implements` target is not a known behavior.",
        "T050" => "Iterator type error [T050]\n\n`for` needs an array, a range, or a type with `next() -> Maybe[T]`.",
        "T051" => "Range type error [T051]\n\nRange bounds must be integers of the same type.",
        "T052" => "Division by zero [T052]",
        "T054" => "Lifetime error [T054]",
        "T055" => "Const initializer type mismatch [T055]",
        "T056" => "Variable binding type mismatch [T056]",
        "T057" => "Pointer argument type mismatch [T057]",
        "T058" => r#"
Override parameter type mismatch [T058]

An `override` method's parameters or return type differ from the
virtual method it overrides (after generic substitution).
"#,
        "T059" => "Unknown field in struct/union literal [T059]",
        "T060" => "Union literal field count error [T060]\n\nUnion literals initialize exactly one field.",
        "T061" => "Missing required field in struct literal [T061]",
        "T062" => "Struct update base type mismatch [T062]\n\nThe `..base` expression must have the struct's own type.",
        "T063" => "Override without base class [T063]",
        "T064" => "Cannot override non-virtual method [T064]\n\nMark the base method `virtual` to allow overriding.",
        "T065" => "Override method not found in base [T065]",
        "T066" => "Invalid class name in new expression [T066]",
        "T068" => "Tuple pattern on non-tuple type [T068]",
        "T069" => "Enum pattern on non-enum type [T069]",
        "T070" => "Struct pattern on non-struct type [T070]",
        "T072" => "Unknown field in struct pattern [T072]",
        "T073" => "Field not found on class [T073]",
        "T074" => "Field not found through pointer [T074]",
        "T076" => "Class has no base class [T076]\n\n`base` is only meaningful in classes declared with `extends`.",
        "T078" => "Method not found on class [T078]",
        "T079" => "Method not found on behavior [T079]",
        "T080" => "Pointer read() takes no arguments [T080]",
        "T081" => "Pointer write() requires exactly one argument [T081]",
        "T082" => "Pointer is_null() takes no arguments [T082]",
        "T083" => "Pointer offset() requires exactly one argument [T083]",
        "T084" => "Unknown pointer method [T084]\n\nPointers support read, write, is_null, and offset.",

        // ==================== Borrow checker ====================
        "B001" => r#"
Use after move [B001]

A value was used after ownership moved elsewhere. Non-copyable values
(strings, structs, enums, classes) transfer ownership on assignment,
by-value calls, and returns.

    let s = "hello"
    let t = s           // `s` moves to `t`
    print(s)            // error: `s` was moved

Use the new owner, duplicate the value, or borrow with `ref`.
"#,
        "B002" => r#"
Move while borrowed [B002]

A value was moved while a reference to it is still live; moving would
leave the reference dangling. End the borrow first.
"#,
        "B003" => "Assign to non-mutable variable [B003]\n\nDeclare the binding with `var` to assign to it.",
        "B004" => r#"
Assign while borrowed [B004]

Assignment to a place while a reference to it is live would invalidate
the reference.

    var x = 1
    let r = ref x
    x = 2               // error: `x` is borrowed by `r`

Move the assignment after the last use of the reference, or scope the
borrow with a block.
"#,
        "B005" => "Borrow after move [B005]\n\nThe value was moved away; there is nothing left to borrow.",
        "B006" => r#"
Mutable borrow of non-mutable variable [B006]

`ref mut` requires the place to be declared `var`.
"#,
        "B007" => "Mutable borrow while immutably borrowed [B007]\n\nShared and exclusive borrows cannot coexist.",
        "B008" => "Double mutable borrow [B008]\n\nAt most one `ref mut` to a place may be live at a time.",
        "B009" => "Immutable borrow while mutably borrowed [B009]",
        "B010" => r#"
Return local reference [B010]

The function returns a reference to one of its own locals, which dies
when the function returns. Return the value itself instead.
"#,
        "B011" => "Partial move [B011]\n\nThis field was already moved out of the value.",
        "B013" => "Use while borrowed [B013]\n\nThe place is exclusively borrowed; it cannot be read until the borrow ends.",
        "B014" => "Closure captures moved value [B014]\n\nThe closure refers to a variable whose value was already moved.",
        "B015" => "Closure capture conflict [B015]\n\nThe closure's capture conflicts with an existing borrow of the variable.",
        "B016" => r#"
Partially moved value [B016]

The whole value cannot be used because one of its fields was moved out.
Sibling fields remain individually usable.
"#,
        "B017" => "Reborrow outlives origin [B017]",

        // ==================== Codegen ====================
        "C001" => "Codegen error [C001]\n\nGeneric IR-generation failure; an internal consistency report follows.",
        "C002" => "Unsupported feature in codegen [C002]",
        "C003" => "Type error in codegen [C003]\n\nInternal: the checker admitted a case the generator cannot lower.",
        "C004" => "Function not found in codegen [C004]",
        "C005" => "Struct or class not found in codegen [C005]",
        "C006" => "Method not found in codegen [C006]",
        "C007" => "Invalid generic instantiation [C007]",
        "C008" => "Missing implementation in codegen [C008]",
        "C010" => "Linker error [C010]\n\nThe external C compiler/linker invocation failed.",
        "C014" => "Intrinsic error in codegen [C014]",
        "C015" => "Missing method argument [C015]",
        "C016" => "Missing closure argument [C016]",
        "C017" => "Missing function or closure argument [C017]",
        "C019" => "Pointer method missing argument [C019]",
        "C022" => "Tuple pattern requires initializer [C022]",
        "C024" => "Cannot call non-function field [C024]",
        "C026" => "Operation requires a variable [C026]",
        "C027" => "Field resolution error [C027]",
        "C029" => "Cannot determine class for base expression [C029]",
        "C030" => "Class has no base class in codegen [C030]",
        "C032" => "Unknown class in new expression [C032]",
        "C033" => "Method not found in vtable [C033]",
        "C035" => "Unknown static method [C035]",

        // ==================== General ====================
        "E001" => "File not found [E001]\n\nThe input path does not exist or is not readable.",
        "E002" => "I/O error [E002]",
        "E003" => r#"
Internal compiler error [E003]

The compiler hit an assertion it believes is unreachable. Please report
the source that triggered it.
"#,
        "E004" => "Command error [E004]\n\nAn external tool (the C compiler) could not be invoked.",
        "E005" => "Configuration error [E005]",
        "E006" => "Dependency error [E006]",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::lookup;

    #[test]
    fn known_codes_resolve() {
        for code in ["L001", "P048", "T001", "T037", "B004", "C010", "E003"] {
            assert!(lookup(code).is_some(), "missing explanation for {}", code);
        }
    }

    #[test]
    fn unknown_codes_do_not() {
        assert!(lookup("Z999").is_none());
        assert!(lookup("T999").is_none());
    }

    #[test]
    fn explanations_name_their_code() {
        for code in ["B001", "B004", "T033", "L016"] {
            let text = lookup(code).expect("known code");
            assert!(text.contains(code), "{} text should cite itself", code);
        }
    }
}
