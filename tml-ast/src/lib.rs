// Abstract syntax tree for TML.
//
// Every syntactic category is a tagged union; nodes are heap-owned by
// their parents through `Box`/`Vec`. Byte spans index into the source
// buffer the driver keeps alive for diagnostics.

use serde::{Deserialize, Serialize};

/// Half-open byte range into the source file.
pub type Span = std::ops::Range<usize>;

/// A parsed source file: an ordered sequence of top-level declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub decls: Vec<Decl>,
}

// ===================== Declarations =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Func(FuncDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Union(UnionDecl),
    Class(ClassDecl),
    Behavior(BehaviorDecl),
    Impl(ImplDecl),
    TypeAlias(TypeAliasDecl),
    Const(ConstDecl),
    Use(UseDecl),
    Mod(ModDecl),
}

impl Decl {
    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Func(d) => Some(&d.name),
            Decl::Struct(d) => Some(&d.name),
            Decl::Enum(d) => Some(&d.name),
            Decl::Union(d) => Some(&d.name),
            Decl::Class(d) => Some(&d.name),
            Decl::Behavior(d) => Some(&d.name),
            Decl::TypeAlias(d) => Some(&d.name),
            Decl::Const(d) => Some(&d.name),
            Decl::Mod(d) => Some(&d.name),
            Decl::Impl(_) | Decl::Use(_) => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Decl::Func(d) => d.span.clone(),
            Decl::Struct(d) => d.span.clone(),
            Decl::Enum(d) => d.span.clone(),
            Decl::Union(d) => d.span.clone(),
            Decl::Class(d) => d.span.clone(),
            Decl::Behavior(d) => d.span.clone(),
            Decl::Impl(d) => d.span.clone(),
            Decl::TypeAlias(d) => d.span.clone(),
            Decl::Const(d) => d.span.clone(),
            Decl::Use(d) => d.span.clone(),
            Decl::Mod(d) => d.span.clone(),
        }
    }
}

/// `@name` or `@name(args)` before a declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decorator {
    pub name: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// Generic parameter with optional behavior bounds: `T`, `T: Printable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: String,
    pub bounds: Vec<String>,
    pub span: Span,
}

/// `where T: Printable + Ordered` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WherePredicate {
    pub param: String,
    pub bounds: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub pattern: Pattern,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub decorators: Vec<Decorator>,
    pub is_pub: bool,
    pub is_async: bool,
    pub is_lowlevel: bool,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub where_clause: Vec<WherePredicate>,
    pub body: Option<Block>,
    pub span: Span,
}

impl FuncDecl {
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d.name == name)
    }

    /// True when the first parameter is the method receiver `this`.
    pub fn has_this(&self) -> bool {
        matches!(
            self.params.first(),
            Some(Param {
                pattern: Pattern::Ident { name, .. },
                ..
            }) if name == "this"
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub is_pub: bool,
    pub name: String,
    pub ty: TypeExpr,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub decorators: Vec<Decorator>,
    pub is_pub: bool,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub where_clause: Vec<WherePredicate>,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    pub payload: Vec<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub decorators: Vec<Decorator>,
    pub is_pub: bool,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub where_clause: Vec<WherePredicate>,
    pub variants: Vec<VariantDef>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionDecl {
    pub decorators: Vec<Decorator>,
    pub is_pub: bool,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

/// Class property with `get`/`set` accessor bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub is_pub: bool,
    pub name: String,
    pub ty: TypeExpr,
    pub getter: Option<Block>,
    pub setter: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub decorators: Vec<Decorator>,
    pub is_pub: bool,
    pub name: String,
    pub generics: Vec<GenericParam>,
    /// `extends Base` with optional type arguments.
    pub base: Option<TypeExpr>,
    /// `implements I1, I2`.
    pub interfaces: Vec<TypeExpr>,
    pub where_clause: Vec<WherePredicate>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<FuncDecl>,
    pub properties: Vec<Property>,
    pub span: Span,
}

impl ClassDecl {
    pub fn is_abstract(&self) -> bool {
        self.decorators.iter().any(|d| d.name == "abstract")
    }

    pub fn is_sealed(&self) -> bool {
        self.decorators.iter().any(|d| d.name == "sealed")
    }

    pub fn is_value_class(&self) -> bool {
        self.decorators.iter().any(|d| d.name == "value")
    }

    pub fn is_pooled(&self) -> bool {
        self.decorators.iter().any(|d| d.name == "pool")
    }
}

/// Behavior (trait) declaration. Methods without bodies are required;
/// methods with bodies are defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDecl {
    pub decorators: Vec<Decorator>,
    pub is_pub: bool,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub super_behaviors: Vec<String>,
    pub assoc_types: Vec<String>,
    pub methods: Vec<FuncDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplDecl {
    pub generics: Vec<GenericParam>,
    /// `impl Behavior for Type` when present; inherent impl otherwise.
    pub behavior: Option<PathRef>,
    pub self_type: TypeExpr,
    pub where_clause: Vec<WherePredicate>,
    pub methods: Vec<FuncDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    pub is_pub: bool,
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub is_pub: bool,
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub span: Span,
}

/// `use path::to::Name` or `use path::to::Name as Alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseDecl {
    pub path: Vec<String>,
    pub alias: Option<String>,
    pub span: Span,
}

impl UseDecl {
    /// The name the import binds locally.
    pub fn local_name(&self) -> &str {
        self.alias
            .as_deref()
            .or_else(|| self.path.last().map(|s| s.as_str()))
            .unwrap_or("")
    }

    /// The module part of the path (everything before the imported name).
    pub fn module_path(&self) -> String {
        if self.path.len() <= 1 {
            String::new()
        } else {
            self.path[..self.path.len() - 1].join("::")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModDecl {
    pub is_pub: bool,
    pub name: String,
    pub decls: Vec<Decl>,
    pub span: Span,
}

/// A `::`-separated path with optional generic arguments on the last
/// segment: `std::sync::Mutex[I32]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRef {
    pub segments: Vec<String>,
    pub type_args: Vec<TypeExpr>,
    pub span: Span,
}

impl PathRef {
    pub fn last(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or("")
    }
}

// ===================== Statements =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        pattern: Pattern,
        ty: Option<TypeExpr>,
        value: Expr,
        span: Span,
    },
    /// `let pattern: T = expr else { diverging-block }`.
    LetElse {
        pattern: Pattern,
        ty: Option<TypeExpr>,
        value: Expr,
        else_block: Block,
        span: Span,
    },
    Var {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    /// Declaration nested inside a function body.
    Decl(Box<Decl>),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. } | Stmt::LetElse { span, .. } | Stmt::Var { span, .. } => {
                span.clone()
            }
            Stmt::Expr(e) => e.span.clone(),
            Stmt::Decl(d) => d.span(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

// ===================== Expressions =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LitSuffix {
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
}

impl LitSuffix {
    pub fn type_name(&self) -> &'static str {
        match self {
            LitSuffix::I8 => "I8",
            LitSuffix::I16 => "I16",
            LitSuffix::I32 => "I32",
            LitSuffix::I64 => "I64",
            LitSuffix::I128 => "I128",
            LitSuffix::U8 => "U8",
            LitSuffix::U16 => "U16",
            LitSuffix::U32 => "U32",
            LitSuffix::U64 => "U64",
            LitSuffix::U128 => "U128",
            LitSuffix::F32 => "F32",
            LitSuffix::F64 => "F64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int {
        value: u128,
        suffix: Option<LitSuffix>,
    },
    Float {
        value: f64,
        suffix: Option<LitSuffix>,
    },
    Bool(bool),
    Str(String),
    Char(char),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    /// `ref x` / `ref mut x`.
    Ref {
        mutable: bool,
    },
    Deref,
    PreInc,
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

/// Piece of an interpolated string after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpPart {
    Text(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Path(PathRef),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Field {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_branch: Option<Box<Expr>>,
    },
    Block(Block),
    Loop {
        label: Option<String>,
        body: Block,
    },
    While {
        label: Option<String>,
        cond: Box<Expr>,
        body: Block,
    },
    For {
        label: Option<String>,
        pattern: Pattern,
        iter: Box<Expr>,
        body: Block,
    },
    When {
        scrutinee: Box<Expr>,
        arms: Vec<WhenArm>,
    },
    Return(Option<Box<Expr>>),
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    StructLit {
        path: PathRef,
        fields: Vec<(String, Expr)>,
        /// `..base` functional update.
        base: Option<Box<Expr>>,
    },
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    ArrayRepeat {
        elem: Box<Expr>,
        count: Box<Expr>,
    },
    /// `do(params) { body }`, optionally `move do(params) { body }`.
    Closure {
        is_move: bool,
        params: Vec<(Pattern, Option<TypeExpr>)>,
        return_type: Option<TypeExpr>,
        body: Box<Expr>,
    },
    /// `a to b` (exclusive) / `a through b` (inclusive).
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Cast {
        expr: Box<Expr>,
        ty: TypeExpr,
    },
    Is {
        expr: Box<Expr>,
        ty: TypeExpr,
    },
    /// Try operator: `expr!`.
    Try(Box<Expr>),
    Await(Box<Expr>),
    InterpolatedString(Vec<InterpPart>),
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    New {
        class: PathRef,
        args: Vec<Expr>,
    },
    /// `base` receiver inside class methods.
    Base,
}

// ===================== Patterns =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Wildcard {
        span: Span,
    },
    Ident {
        name: String,
        mutable: bool,
        ty: Option<TypeExpr>,
        span: Span,
    },
    Literal {
        value: Literal,
        span: Span,
    },
    Tuple {
        elems: Vec<Pattern>,
        span: Span,
    },
    Struct {
        path: PathRef,
        fields: Vec<(String, Pattern)>,
        has_rest: bool,
        span: Span,
    },
    Enum {
        path: PathRef,
        variant: String,
        args: Vec<Pattern>,
        span: Span,
    },
    Or {
        alts: Vec<Pattern>,
        span: Span,
    },
    Range {
        start: Literal,
        end: Literal,
        inclusive: bool,
        span: Span,
    },
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Wildcard { span }
            | Pattern::Ident { span, .. }
            | Pattern::Literal { span, .. }
            | Pattern::Tuple { span, .. }
            | Pattern::Struct { span, .. }
            | Pattern::Enum { span, .. }
            | Pattern::Or { span, .. }
            | Pattern::Range { span, .. } => span.clone(),
        }
    }

    /// Bound names introduced by the pattern, in source order.
    pub fn bindings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Ident { name, .. } => out.push(name),
            Pattern::Tuple { elems, .. } => {
                for p in elems {
                    p.collect_bindings(out);
                }
            }
            Pattern::Struct { fields, .. } => {
                for (_, p) in fields {
                    p.collect_bindings(out);
                }
            }
            Pattern::Enum { args, .. } => {
                for p in args {
                    p.collect_bindings(out);
                }
            }
            Pattern::Or { alts, .. } => {
                if let Some(first) = alts.first() {
                    first.collect_bindings(out);
                }
            }
            _ => {}
        }
    }

    /// True for patterns that can never fail to match.
    pub fn is_irrefutable(&self) -> bool {
        match self {
            Pattern::Wildcard { .. } | Pattern::Ident { .. } => true,
            Pattern::Tuple { elems, .. } => elems.iter().all(Pattern::is_irrefutable),
            _ => false,
        }
    }
}

// ===================== Syntactic types =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Path plus generic arguments: `Maybe[I32]`, `std::sync::Mutex[T]`.
    Named {
        path: Vec<String>,
        args: Vec<TypeExpr>,
        span: Span,
    },
    Ref {
        mutable: bool,
        inner: Box<TypeExpr>,
        lifetime: Option<String>,
        span: Span,
    },
    Ptr {
        mutable: bool,
        inner: Box<TypeExpr>,
        span: Span,
    },
    Array {
        elem: Box<TypeExpr>,
        size: Box<Expr>,
        span: Span,
    },
    Slice {
        elem: Box<TypeExpr>,
        span: Span,
    },
    Tuple {
        elems: Vec<TypeExpr>,
        span: Span,
    },
    Func {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
        span: Span,
    },
    /// `dyn Behavior`.
    Dyn {
        behavior: PathRef,
        span: Span,
    },
    Infer {
        span: Span,
    },
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. }
            | TypeExpr::Ref { span, .. }
            | TypeExpr::Ptr { span, .. }
            | TypeExpr::Array { span, .. }
            | TypeExpr::Slice { span, .. }
            | TypeExpr::Tuple { span, .. }
            | TypeExpr::Func { span, .. }
            | TypeExpr::Dyn { span, .. }
            | TypeExpr::Infer { span } => span.clone(),
        }
    }

    pub fn named(name: &str, span: Span) -> Self {
        TypeExpr::Named {
            path: vec![name.to_string()],
            args: Vec::new(),
            span,
        }
    }

    /// Base name for single-segment named types.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            TypeExpr::Named { path, .. } => path.last().map(|s| s.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_bindings_in_order() {
        let pat = Pattern::Tuple {
            elems: vec![
                Pattern::Ident {
                    name: "a".into(),
                    mutable: false,
                    ty: None,
                    span: 0..1,
                },
                Pattern::Enum {
                    path: PathRef {
                        segments: vec!["Maybe".into()],
                        type_args: vec![],
                        span: 3..8,
                    },
                    variant: "Just".into(),
                    args: vec![Pattern::Ident {
                        name: "b".into(),
                        mutable: true,
                        ty: None,
                        span: 9..10,
                    }],
                    span: 3..11,
                },
            ],
            span: 0..12,
        };
        assert_eq!(pat.bindings(), ["a", "b"]);
        assert!(!pat.is_irrefutable());
    }

    #[test]
    fn ast_serializes_to_json() {
        let module = Module {
            name: "main".into(),
            decls: vec![Decl::Const(ConstDecl {
                is_pub: false,
                name: "LIMIT".into(),
                ty: Some(TypeExpr::named("I32", 12..15)),
                value: Expr::new(
                    ExprKind::Literal(Literal::Int {
                        value: 8,
                        suffix: None,
                    }),
                    18..19,
                ),
                span: 0..19,
            })],
        };
        let json = serde_json::to_string(&module).unwrap();
        let back: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(module, back);
    }

    #[test]
    fn use_decl_names() {
        let use_decl = UseDecl {
            path: vec!["std".into(), "sync".into(), "Mutex".into()],
            alias: None,
            span: 0..20,
        };
        assert_eq!(use_decl.local_name(), "Mutex");
        assert_eq!(use_decl.module_path(), "std::sync");

        let aliased = UseDecl {
            alias: Some("Lock".into()),
            ..use_decl
        };
        assert_eq!(aliased.local_name(), "Lock");
    }
}
