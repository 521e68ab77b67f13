//! Abstract Syntax Tree for Asthra
//!
//! The node shapes produced by the parser (an external collaborator) and
//! consumed by semantic analysis. Nodes are plain serde-serializable data:
//! the CLI driver reads a parser-emitted JSON AST, and the analyzer fills in
//! `type_info` on every expression it successfully types.

use serde::{Deserialize, Serialize};

use crate::types::{PrimitiveKind, TypeId};

/// Source span for error reporting and tooling.
///
/// Lines and columns are 0-indexed internally; display adds 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(
        file: impl Into<String>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Span {
            file: file.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file,
            self.start_line + 1,
            self.start_column + 1
        )
    }
}

/// Visibility of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Pub,
    Priv,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
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
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Deref,
    AddrOf { mutable: bool },
}

/// A syntactic type annotation, resolved to a [`TypeId`] by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Named type, possibly with type arguments: `i32`, `Point`,
    /// `Vec<i32>`, `Result<i32, string>`.
    Named {
        name: String,
        type_args: Vec<TypeExpr>,
    },
    Pointer {
        mutable: bool,
        inner: Box<TypeExpr>,
    },
    Slice {
        mutable: bool,
        inner: Box<TypeExpr>,
    },
    Array {
        inner: Box<TypeExpr>,
        length: u64,
    },
    Tuple(Vec<TypeExpr>),
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            type_args: Vec::new(),
        }
    }
}

/// An expression node. `type_info` is absent until analysis succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    #[serde(default)]
    pub type_info: Option<TypeId>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            type_info: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal with optional type suffix (`42`, `42u8`).
    IntLiteral {
        value: i64,
        suffix: Option<PrimitiveKind>,
    },
    /// Float literal with optional type suffix (`1.5`, `1.5f32`).
    FloatLiteral {
        value: f64,
        suffix: Option<PrimitiveKind>,
    },
    StringLiteral(String),
    CharLiteral(char),
    BoolLiteral(bool),
    /// The unit literal `()` of type void.
    Unit,
    Identifier(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `f(...)`, `obj.m(...)`, or `Enum.Variant(...)` depending on what the
    /// callee expression resolves to.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `Type::func(...)` or `Type::<A, B>::func(...)`.
    AssociatedCall {
        type_name: String,
        type_args: Vec<TypeExpr>,
        func: String,
        args: Vec<Expr>,
    },
    FieldAccess {
        object: Box<Expr>,
        field: String,
    },
    /// Bare enum-variant constructor `.Variant(value)`; the enum comes from
    /// the expected type.
    EnumVariant {
        variant: String,
        payload: Option<Box<Expr>>,
    },
    StructLiteral {
        name: String,
        type_args: Vec<TypeExpr>,
        fields: Vec<(String, Expr)>,
    },
    ArrayLiteral(Vec<Expr>),
    /// `[value; count]`
    ArrayRepeat {
        value: Box<Expr>,
        count: Box<Expr>,
    },
    TupleLiteral(Vec<Expr>),
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `base[start..end]`; either bound may be absent.
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
}

/// A sequence of statements with its own lexical scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    IfLet {
        pattern: Pattern,
        value: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    /// `for v in iter { body }`; only `range(..)` iterables in this core.
    For {
        var: String,
        iter: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
    },
    Break,
    Continue,
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// `_`
    Wildcard,
    /// Binds the scrutinee to a new name.
    Identifier(String),
    Literal(LiteralPattern),
    /// `Enum.Variant(sub)` or `.Variant(sub)` with the enum inferred.
    EnumVariant {
        enum_name: Option<String>,
        variant: String,
        binding: Option<Box<Pattern>>,
    },
    Struct {
        name: String,
        fields: Vec<(String, Pattern)>,
    },
    Tuple(Vec<Pattern>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralPattern {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Char(char),
}

/// An FFI annotation as written in source (`#[transfer_full]`), validated
/// into a structured form by the ffi module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfiAnnotationAst {
    pub name: String,
    pub span: Span,
}

/// A parameter declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub annotations: Vec<FfiAnnotationAst>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub visibility: Visibility,
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<Param>,
    /// Absent means `void`.
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternDecl {
    pub visibility: Visibility,
    pub name: String,
    /// Link-time symbol name, when it differs from `name`.
    pub extern_name: Option<String>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// Index of the first variadic parameter for variadic externs.
    pub variadic_from: Option<usize>,
    /// Annotations on the return value.
    #[serde(default)]
    pub annotations: Vec<FfiAnnotationAst>,
    pub span: Span,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructFieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub visibility: Visibility,
    pub name: String,
    pub type_params: Vec<String>,
    pub fields: Vec<StructFieldDecl>,
    pub span: Span,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariantDecl {
    pub name: String,
    /// Associated payload type, if any.
    pub payload: Option<TypeExpr>,
    /// Explicit integer value; automatic values increment from 0.
    pub value: Option<i64>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub visibility: Visibility,
    pub name: String,
    pub type_params: Vec<String>,
    pub variants: Vec<EnumVariantDecl>,
    pub span: Span,
    #[serde(default)]
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplBlock {
    /// Name of the struct the block attaches to.
    pub target: String,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Function(FunctionDecl),
    Extern(ExternDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Impl(ImplBlock),
    Import(ImportDecl),
}

impl Decl {
    pub fn span(&self) -> &Span {
        match self {
            Decl::Function(d) => &d.span,
            Decl::Extern(d) => &d.span,
            Decl::Struct(d) => &d.span,
            Decl::Enum(d) => &d.span,
            Decl::Impl(d) => &d.span,
            Decl::Import(d) => &d.span,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Function(d) => Some(&d.name),
            Decl::Extern(d) => Some(&d.name),
            Decl::Struct(d) => Some(&d.name),
            Decl::Enum(d) => Some(&d.name),
            Decl::Impl(d) => Some(&d.target),
            Decl::Import(_) => None,
        }
    }
}

/// One compilation unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

impl Program {
    pub fn find_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.decls.iter().find_map(|d| match d {
            Decl::Function(f) if f.name == name => Some(f),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new("test.as", 0, 0, 0, 4)
    }

    #[test]
    fn test_span_display_is_one_indexed() {
        let s = Span::new("main.as", 4, 7, 4, 10);
        assert_eq!(format!("{}", s), "main.as:5:8");
    }

    #[test]
    fn test_expr_starts_untyped() {
        let e = Expr::new(
            ExprKind::IntLiteral {
                value: 1,
                suffix: None,
            },
            span(),
        );
        assert!(e.type_info.is_none());
    }

    #[test]
    fn test_ast_json_round_trip() {
        let program = Program {
            decls: vec![Decl::Function(FunctionDecl {
                visibility: Visibility::Pub,
                name: "main".to_string(),
                type_params: vec![],
                params: vec![],
                return_type: Some(TypeExpr::named("i32")),
                body: Block {
                    stmts: vec![Stmt {
                        kind: StmtKind::Return(Some(Expr::new(
                            ExprKind::IntLiteral {
                                value: 0,
                                suffix: None,
                            },
                            span(),
                        ))),
                        span: span(),
                    }],
                    span: span(),
                },
                span: span(),
                validated: false,
            })],
        };
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn test_binary_op_classes() {
        assert!(BinaryOp::Add.is_arithmetic());
        assert!(BinaryOp::Le.is_comparison());
        assert!(BinaryOp::And.is_logical());
        assert!(BinaryOp::Shl.is_bitwise());
        assert!(!BinaryOp::Eq.is_arithmetic());
    }
}
