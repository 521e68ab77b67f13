//! Asthra Compiler Library
//!
//! The semantic-analysis and code-generation core of the Asthra compiler.
//! The parser is an external collaborator: it hands this crate an untyped
//! AST (see [`ast`]), the analyzer types and annotates it, and the code
//! generator lowers it to an architecture-agnostic register IR ready for a
//! back-end formatter.
//!
//! ```rust,ignore
//! use asthrac::{analyze_program, generate_program};
//!
//! let mut program = serde_json::from_str(&ast_json)?;
//! let mut analysis = analyze_program(&mut program);
//! if analysis.reporter.has_errors() {
//!     eprintln!("{}", analysis.reporter.render_human());
//!     std::process::exit(1);
//! }
//! let module = generate_program(&mut analysis, &program)?;
//! println!("{}", module);
//! ```

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod ffi;
pub mod symbols;
pub mod types;

pub use analyzer::SemanticAnalyzer;
pub use ast::Program;
pub use codegen::{CodeGen, CodeGenError, IrModule};
pub use config::{CompilerConfig, TargetArch};
pub use diagnostics::{Confidence, Diagnostic, DiagnosticReporter, ErrorCode, Severity};
pub use types::{TypeId, TypeUniverse};

use std::collections::HashMap;

/// Everything the analyzer hands downstream: the type universe, the
/// diagnostics, and the declared function signatures.
pub struct AnalysisResult {
    pub universe: TypeUniverse,
    pub reporter: DiagnosticReporter,
    pub function_types: HashMap<String, TypeId>,
    /// True when analysis completed without errors.
    pub success: bool,
}

/// Run semantic analysis over a program, annotating it in place.
pub fn analyze_program(program: &mut Program) -> AnalysisResult {
    analyze_program_with_config(program, &CompilerConfig::default())
}

/// Run semantic analysis with host configuration applied: the reporter's
/// suggestion threshold comes from `min_suggestion_confidence`.
pub fn analyze_program_with_config(
    program: &mut Program,
    config: &CompilerConfig,
) -> AnalysisResult {
    let mut analyzer = SemanticAnalyzer::new();
    analyzer
        .reporter
        .set_min_confidence(config.min_suggestion_confidence);
    let success = analyzer.analyze_program(program);
    AnalysisResult {
        universe: analyzer.universe,
        reporter: analyzer.reporter,
        function_types: analyzer.function_types,
        success,
    }
}

/// Lower an analyzed program to the IR module. Refuses to run when the
/// analysis reported errors.
pub fn generate_program(
    analysis: &mut AnalysisResult,
    program: &Program,
) -> Result<IrModule, CodeGenError> {
    let generator = CodeGen::new(analysis)?;
    generator.generate_program(program)
}

/// Full pipeline: analyze, then generate. On a failed analysis the
/// rendered diagnostics come back as the error string and no IR is
/// produced.
pub fn compile_program(program: &mut Program) -> Result<IrModule, String> {
    compile_program_with_config(program, &CompilerConfig::default())
}

/// Full pipeline with host configuration applied.
pub fn compile_program_with_config(
    program: &mut Program,
    config: &CompilerConfig,
) -> Result<IrModule, String> {
    let mut analysis = analyze_program_with_config(program, config);
    if analysis.reporter.has_errors() {
        return Err(analysis.reporter.render_human());
    }
    generate_program(&mut analysis, program).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::codegen::{Opcode, Operand};
    use crate::diagnostics::{Confidence, SuggestionKind};

    fn sp() -> Span {
        Span::new("test.as", 0, 0, 0, 4)
    }

    fn e(kind: ExprKind) -> Expr {
        Expr::new(kind, sp())
    }

    fn int(value: i64) -> Expr {
        e(ExprKind::IntLiteral {
            value,
            suffix: None,
        })
    }

    fn ident(name: &str) -> Expr {
        e(ExprKind::Identifier(name.to_string()))
    }

    fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        e(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    fn field(object: Expr, name: &str) -> Expr {
        e(ExprKind::FieldAccess {
            object: Box::new(object),
            field: name.to_string(),
        })
    }

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt { kind, span: sp() }
    }

    fn block(stmts: Vec<Stmt>) -> Block {
        Block { stmts, span: sp() }
    }

    fn param(name: &str, ty: TypeExpr) -> Param {
        Param {
            name: name.to_string(),
            ty,
            annotations: vec![],
            span: sp(),
        }
    }

    fn function(
        name: &str,
        params: Vec<Param>,
        return_type: Option<TypeExpr>,
        stmts: Vec<Stmt>,
    ) -> Decl {
        Decl::Function(FunctionDecl {
            visibility: Visibility::Pub,
            name: name.to_string(),
            type_params: vec![],
            params,
            return_type,
            body: block(stmts),
            span: sp(),
            validated: false,
        })
    }

    /// Every expression in an analyzed program carries type_info.
    fn assert_fully_typed(program: &Program) {
        fn walk_expr(expr: &Expr) {
            assert!(
                expr.type_info.is_some(),
                "untyped expression: {:?}",
                expr.kind
            );
            match &expr.kind {
                ExprKind::Binary { lhs, rhs, .. } => {
                    walk_expr(lhs);
                    walk_expr(rhs);
                }
                ExprKind::Unary { operand, .. } => walk_expr(operand),
                ExprKind::Assignment { target, value } => {
                    walk_expr(target);
                    walk_expr(value);
                }
                ExprKind::Call { callee, args } => {
                    // Type-name callees in enum constructors are annotated
                    // on the object, not the field chain.
                    if let ExprKind::FieldAccess { object, .. } = &callee.kind {
                        walk_expr(object);
                    } else {
                        walk_expr(callee);
                    }
                    args.iter().for_each(walk_expr);
                }
                ExprKind::AssociatedCall { args, .. } => args.iter().for_each(walk_expr),
                ExprKind::FieldAccess { object, .. } => walk_expr(object),
                ExprKind::EnumVariant { payload, .. } => {
                    if let Some(payload) = payload {
                        walk_expr(payload);
                    }
                }
                ExprKind::StructLiteral { fields, .. } => {
                    fields.iter().for_each(|(_, v)| walk_expr(v));
                }
                ExprKind::ArrayLiteral(elements) | ExprKind::TupleLiteral(elements) => {
                    elements.iter().for_each(walk_expr);
                }
                ExprKind::ArrayRepeat { value, count } => {
                    walk_expr(value);
                    walk_expr(count);
                }
                ExprKind::Index { base, index } => {
                    walk_expr(base);
                    walk_expr(index);
                }
                ExprKind::Slice { base, start, end } => {
                    walk_expr(base);
                    if let Some(start) = start {
                        walk_expr(start);
                    }
                    if let Some(end) = end {
                        walk_expr(end);
                    }
                }
                _ => {}
            }
        }
        fn walk_block(block: &Block) {
            for stmt in &block.stmts {
                match &stmt.kind {
                    StmtKind::Let { value, .. } => walk_expr(value),
                    StmtKind::Expr(expr) => walk_expr(expr),
                    StmtKind::If {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        walk_expr(cond);
                        walk_block(then_block);
                        if let Some(b) = else_block {
                            walk_block(b);
                        }
                    }
                    StmtKind::IfLet {
                        value,
                        then_block,
                        else_block,
                        ..
                    } => {
                        walk_expr(value);
                        walk_block(then_block);
                        if let Some(b) = else_block {
                            walk_block(b);
                        }
                    }
                    StmtKind::For { iter, body, .. } => {
                        walk_expr(iter);
                        walk_block(body);
                    }
                    StmtKind::Return(Some(expr)) => walk_expr(expr),
                    StmtKind::Match { scrutinee, arms } => {
                        walk_expr(scrutinee);
                        arms.iter().for_each(|arm| walk_block(&arm.body));
                    }
                    StmtKind::Block(b) => walk_block(b),
                    _ => {}
                }
            }
        }
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => walk_block(&f.body),
                Decl::Impl(i) => i.methods.iter().for_each(|m| walk_block(&m.body)),
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // End-to-end scenarios
    // ------------------------------------------------------------------

    #[test]
    fn test_arity_mismatch_diagnostic() {
        let mut program = Program {
            decls: vec![
                function(
                    "add",
                    vec![
                        param("a", TypeExpr::named("i32")),
                        param("b", TypeExpr::named("i32")),
                    ],
                    Some(TypeExpr::named("i32")),
                    vec![stmt(StmtKind::Return(Some(e(ExprKind::Binary {
                        op: BinaryOp::Add,
                        lhs: Box::new(ident("a")),
                        rhs: Box::new(ident("b")),
                    }))))],
                ),
                function(
                    "main",
                    vec![],
                    None,
                    vec![stmt(StmtKind::Expr(call(ident("add"), vec![int(1)])))],
                ),
            ],
        };
        let mut analysis = analyze_program(&mut program);
        assert!(!analysis.success);
        let diagnostic = &analysis.reporter.diagnostics()[0];
        assert_eq!(diagnostic.code.as_str(), "ASTHRA_E004");
        assert_eq!(
            diagnostic.message,
            "Function 'add' expects 2 arguments, got 1"
        );
        // Codegen refuses to run over a failed analysis.
        assert!(generate_program(&mut analysis, &program).is_err());
    }

    #[test]
    fn test_generic_result_inference() {
        // pub fn f() -> Result<i32, string> { return Result.Ok(42); }
        let result_ty = TypeExpr::Named {
            name: "Result".to_string(),
            type_args: vec![TypeExpr::named("i32"), TypeExpr::named("string")],
        };
        let mut program = Program {
            decls: vec![function(
                "f",
                vec![],
                Some(result_ty),
                vec![stmt(StmtKind::Return(Some(call(
                    field(ident("Result"), "Ok"),
                    vec![int(42)],
                ))))],
            )],
        };
        let mut analysis = analyze_program(&mut program);
        assert!(analysis.success, "{}", analysis.reporter.render_human());
        assert_fully_typed(&program);

        // The constructor's type is the full Result<i32, string>.
        let Decl::Function(f) = &program.decls[0] else {
            unreachable!()
        };
        let StmtKind::Return(Some(ctor)) = &f.body.stmts[0].kind else {
            unreachable!()
        };
        let ctor_ty = ctor.type_info.unwrap();
        assert_eq!(analysis.universe.name_of(ctor_ty), "Result<i32, string>");
        assert_eq!(analysis.universe.size_of(ctor_ty), 16);

        let module = generate_program(&mut analysis, &program).unwrap();
        // Discriminant 0 stored for Ok, payload 42 stored after the tag.
        let tag_store = module.instructions.iter().any(|i| {
            i.comment.as_deref() == Some("tag Ok")
                && matches!(i.operands.get(1), Some(Operand::Immediate(0)))
        });
        assert!(tag_store, "missing Ok tag store:\n{}", module);
        let payload_store = module
            .instructions
            .iter()
            .any(|i| matches!(i.operands.get(1), Some(Operand::Immediate(42))));
        assert!(payload_store, "missing payload store:\n{}", module);
    }

    #[test]
    fn test_method_dispatch_uses_method_table() {
        // struct Point { x: i32, y: i32 } with a method named `len`: the
        // method table wins over the predeclared `len`.
        let mut program = Program {
            decls: vec![
                Decl::Struct(StructDecl {
                    visibility: Visibility::Pub,
                    name: "Point".to_string(),
                    type_params: vec![],
                    fields: vec![
                        StructFieldDecl {
                            name: "x".to_string(),
                            ty: TypeExpr::named("i32"),
                            span: sp(),
                        },
                        StructFieldDecl {
                            name: "y".to_string(),
                            ty: TypeExpr::named("i32"),
                            span: sp(),
                        },
                    ],
                    span: sp(),
                    validated: false,
                }),
                Decl::Impl(ImplBlock {
                    target: "Point".to_string(),
                    methods: vec![FunctionDecl {
                        visibility: Visibility::Pub,
                        name: "len".to_string(),
                        type_params: vec![],
                        params: vec![param("self", TypeExpr::named("Point"))],
                        return_type: Some(TypeExpr::named("i32")),
                        body: block(vec![stmt(StmtKind::Return(Some(field(
                            e(ExprKind::Unary {
                                op: UnaryOp::Deref,
                                operand: Box::new(ident("self")),
                            }),
                            "x",
                        ))))]),
                        span: sp(),
                        validated: false,
                    }],
                    span: sp(),
                }),
                function(
                    "main",
                    vec![],
                    Some(TypeExpr::named("i32")),
                    vec![
                        stmt(StmtKind::Let {
                            name: "p".to_string(),
                            ty: None,
                            value: e(ExprKind::StructLiteral {
                                name: "Point".to_string(),
                                type_args: vec![],
                                fields: vec![
                                    ("x".to_string(), int(3)),
                                    ("y".to_string(), int(4)),
                                ],
                            }),
                        }),
                        stmt(StmtKind::Return(Some(call(
                            field(ident("p"), "len"),
                            vec![],
                        )))),
                    ],
                ),
            ],
        };
        let mut analysis = analyze_program(&mut program);
        assert!(analysis.success, "{}", analysis.reporter.render_human());
        let module = generate_program(&mut analysis, &program).unwrap();
        let calls_mangled = module.instructions.iter().any(|i| {
            i.opcode == Opcode::Call
                && matches!(i.operands.first(), Some(Operand::Label(l)) if l == "Point_len")
        });
        assert!(calls_mangled, "expected call Point_len:\n{}", module);
    }

    #[test]
    fn test_match_on_option_lowering() {
        // fn pick(opt: Option<i32>) -> i32 {
        //     match opt { Option.Some(x) => return x, Option.None => return 0 }
        // }
        let option_i32 = TypeExpr::Named {
            name: "Option".to_string(),
            type_args: vec![TypeExpr::named("i32")],
        };
        let mut program = Program {
            decls: vec![function(
                "pick",
                vec![param("opt", option_i32)],
                Some(TypeExpr::named("i32")),
                vec![stmt(StmtKind::Match {
                    scrutinee: ident("opt"),
                    arms: vec![
                        MatchArm {
                            pattern: Pattern {
                                kind: PatternKind::EnumVariant {
                                    enum_name: Some("Option".to_string()),
                                    variant: "Some".to_string(),
                                    binding: Some(Box::new(Pattern {
                                        kind: PatternKind::Identifier("x".to_string()),
                                        span: sp(),
                                    })),
                                },
                                span: sp(),
                            },
                            body: block(vec![stmt(StmtKind::Return(Some(ident("x"))))]),
                            span: sp(),
                        },
                        MatchArm {
                            pattern: Pattern {
                                kind: PatternKind::EnumVariant {
                                    enum_name: Some("Option".to_string()),
                                    variant: "None".to_string(),
                                    binding: None,
                                },
                                span: sp(),
                            },
                            body: block(vec![stmt(StmtKind::Return(Some(int(0))))]),
                            span: sp(),
                        },
                    ],
                })],
            )],
        };
        let mut analysis = analyze_program(&mut program);
        assert!(analysis.success, "{}", analysis.reporter.render_human());
        assert_fully_typed(&program);
        // No exhaustiveness warning: both variants covered.
        assert!(analysis.reporter.diagnostics().is_empty());

        let module = generate_program(&mut analysis, &program).unwrap();
        // Discriminant loads compared against Some=0 and None=1.
        let discriminant_compares: Vec<i64> = module
            .instructions
            .iter()
            .zip(module.instructions.iter().skip(1))
            .filter(|(load, _)| load.comment.as_deref() == Some("discriminant"))
            .filter_map(|(_, cmp)| match cmp.operands.get(1) {
                Some(Operand::Immediate(v)) if cmp.opcode == Opcode::Cmp => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(discriminant_compares, vec![0, 1], "{}", module);
    }

    #[test]
    fn test_undefined_variable_suggestion() {
        let mut program = Program {
            decls: vec![function(
                "main",
                vec![],
                None,
                vec![
                    stmt(StmtKind::Let {
                        name: "user_id".to_string(),
                        ty: None,
                        value: int(7),
                    }),
                    stmt(StmtKind::Let {
                        name: "x".to_string(),
                        ty: None,
                        value: ident("useer_id"),
                    }),
                ],
            )],
        };
        let analysis = analyze_program(&mut program);
        assert!(!analysis.success);
        let diagnostic = analysis
            .reporter
            .diagnostics()
            .iter()
            .find(|d| d.code.as_str() == "ASTHRA_E001")
            .expect("expected undefined-symbol diagnostic");
        let suggestion = &diagnostic.suggestions[0];
        assert_eq!(suggestion.kind, SuggestionKind::Replace);
        assert_eq!(suggestion.text, "user_id");
        assert_eq!(suggestion.confidence, Confidence::Medium);
        assert_eq!(suggestion.rationale, "Similar variable found in scope");
    }

    #[test]
    fn test_type_mismatch_conversion_hint() {
        let mut program = Program {
            decls: vec![function(
                "main",
                vec![],
                None,
                vec![stmt(StmtKind::Let {
                    name: "s".to_string(),
                    ty: Some(TypeExpr::named("string")),
                    value: int(42),
                })],
            )],
        };
        let analysis = analyze_program(&mut program);
        assert!(!analysis.success);
        let diagnostic = analysis
            .reporter
            .diagnostics()
            .iter()
            .find(|d| d.code.as_str() == "ASTHRA_E003")
            .expect("expected type-mismatch diagnostic");
        assert_eq!(
            diagnostic.message,
            "type mismatch: expected 'string', found 'i32'"
        );
        let suggestion = &diagnostic.suggestions[0];
        assert_eq!(suggestion.text, ".to_string()");
        assert_eq!(suggestion.confidence, Confidence::High);
    }

    // ------------------------------------------------------------------
    // Round-trip and structural properties
    // ------------------------------------------------------------------

    #[test]
    fn test_annotated_ast_round_trip_is_stable() {
        let make = || Program {
            decls: vec![function(
                "double",
                vec![param("n", TypeExpr::named("i64"))],
                Some(TypeExpr::named("i64")),
                vec![stmt(StmtKind::Return(Some(e(ExprKind::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(ident("n")),
                    rhs: Box::new(int(2)),
                }))))],
            )],
        };
        let mut first = make();
        assert!(analyze_program(&mut first).success);

        // Serialize the annotated AST, re-analyze, and expect identical
        // annotations: analysis is deterministic.
        let json = serde_json::to_string(&first).unwrap();
        let mut second: Program = serde_json::from_str(&json).unwrap();
        assert!(analyze_program(&mut second).success);
        assert_eq!(first, second);
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let mut program = Program {
            decls: vec![function("main", vec![], None, vec![stmt(StmtKind::Break)])],
        };
        let analysis = analyze_program(&mut program);
        assert!(!analysis.success);
        assert_eq!(
            analysis.reporter.diagnostics()[0].code.as_str(),
            "ASTHRA_E010"
        );
    }

    #[test]
    fn test_for_over_range_lowering() {
        let mut program = Program {
            decls: vec![function(
                "main",
                vec![],
                None,
                vec![stmt(StmtKind::For {
                    var: "i".to_string(),
                    iter: call(ident("range"), vec![int(10)]),
                    body: block(vec![stmt(StmtKind::Expr(call(
                        ident("log"),
                        vec![e(ExprKind::StringLiteral("tick".to_string()))],
                    )))]),
                })],
            )],
        };
        let module = compile_program(&mut program).unwrap();
        // The predeclared log maps to the runtime entry point.
        let calls_runtime = module.instructions.iter().any(|i| {
            matches!(i.operands.first(), Some(Operand::Label(l)) if l == "asthra_simple_log")
        });
        assert!(calls_runtime, "{}", module);
        // Loop skeleton: a compare at the top jumping past the body.
        assert!(module.instructions.iter().any(|i| i.opcode == Opcode::Jge));
        assert!(module.stats.functions_lowered >= 1);
    }

    #[test]
    fn test_non_exhaustive_match_warns() {
        let option_i32 = TypeExpr::Named {
            name: "Option".to_string(),
            type_args: vec![TypeExpr::named("i32")],
        };
        let mut program = Program {
            decls: vec![function(
                "peek",
                vec![param("opt", option_i32)],
                None,
                vec![stmt(StmtKind::Match {
                    scrutinee: ident("opt"),
                    arms: vec![MatchArm {
                        pattern: Pattern {
                            kind: PatternKind::EnumVariant {
                                enum_name: Some("Option".to_string()),
                                variant: "Some".to_string(),
                                binding: None,
                            },
                            span: sp(),
                        },
                        body: block(vec![]),
                        span: sp(),
                    }],
                })],
            )],
        };
        let analysis = analyze_program(&mut program);
        // A warning, not an error.
        assert!(analysis.success);
        let warning = &analysis.reporter.diagnostics()[0];
        assert_eq!(warning.code.as_str(), "ASTHRA_E012");
        assert!(warning.message.contains("None"));
    }

    #[test]
    fn test_monomorphized_method_emission() {
        // struct Box<T> { value: T } with fn get(self) -> T, called at i64.
        let mut program = Program {
            decls: vec![
                Decl::Struct(StructDecl {
                    visibility: Visibility::Pub,
                    name: "Box".to_string(),
                    type_params: vec!["T".to_string()],
                    fields: vec![StructFieldDecl {
                        name: "value".to_string(),
                        ty: TypeExpr::named("T"),
                        span: sp(),
                    }],
                    span: sp(),
                    validated: false,
                }),
                Decl::Impl(ImplBlock {
                    target: "Box".to_string(),
                    methods: vec![FunctionDecl {
                        visibility: Visibility::Pub,
                        name: "get".to_string(),
                        type_params: vec![],
                        params: vec![param("self", TypeExpr::named("Box"))],
                        return_type: Some(TypeExpr::named("T")),
                        body: block(vec![stmt(StmtKind::Return(Some(field(
                            e(ExprKind::Unary {
                                op: UnaryOp::Deref,
                                operand: Box::new(ident("self")),
                            }),
                            "value",
                        ))))]),
                        span: sp(),
                        validated: false,
                    }],
                    span: sp(),
                }),
                function(
                    "main",
                    vec![],
                    Some(TypeExpr::named("i64")),
                    vec![
                        stmt(StmtKind::Let {
                            name: "b".to_string(),
                            ty: None,
                            value: e(ExprKind::StructLiteral {
                                name: "Box".to_string(),
                                type_args: vec![TypeExpr::named("i64")],
                                fields: vec![("value".to_string(), int(9))],
                            }),
                        }),
                        stmt(StmtKind::Return(Some(call(
                            field(ident("b"), "get"),
                            vec![],
                        )))),
                    ],
                ),
            ],
        };
        let mut analysis = analyze_program(&mut program);
        assert!(analysis.success, "{}", analysis.reporter.render_human());
        let module = generate_program(&mut analysis, &program).unwrap();
        // The specialized method is both called and defined.
        let call_count = module
            .instructions
            .iter()
            .filter(|i| {
                i.opcode == Opcode::Call
                    && matches!(i.operands.first(), Some(Operand::Label(l)) if l == "Box_i64_get")
            })
            .count();
        assert_eq!(call_count, 1, "{}", module);
        let defined = module.instructions.iter().any(|i| {
            i.opcode == Opcode::Label
                && matches!(i.operands.first(), Some(Operand::Label(l)) if l == "Box_i64_get")
        });
        assert!(defined, "specialized body missing:\n{}", module);
    }

    #[test]
    fn test_float_arguments_use_xmm_registers() {
        use crate::codegen::Register;

        // fn scale(x: f64) -> f64 { return x; } called as scale(1.5):
        // the argument travels in XMM0, not an integer register.
        let mut program = Program {
            decls: vec![
                function(
                    "scale",
                    vec![param("x", TypeExpr::named("f64"))],
                    Some(TypeExpr::named("f64")),
                    vec![stmt(StmtKind::Return(Some(ident("x"))))],
                ),
                function(
                    "main",
                    vec![],
                    None,
                    vec![stmt(StmtKind::Expr(call(
                        ident("scale"),
                        vec![e(ExprKind::FloatLiteral {
                            value: 1.5,
                            suffix: None,
                        })],
                    )))],
                ),
            ],
        };
        let module = compile_program(&mut program).unwrap();

        // Caller side: the argument is loaded into XMM0 with movsd.
        let arg_load = module.instructions.iter().any(|i| {
            i.opcode == Opcode::Movsd
                && matches!(i.operands.first(), Some(Operand::Register(Register::Xmm0)))
                && matches!(i.operands.get(1), Some(Operand::Memory { .. }))
        });
        assert!(arg_load, "float argument not loaded into xmm0:\n{}", module);

        // Callee side: the parameter is stored from XMM0, and the integer
        // argument sequence is untouched.
        let param_store = module.instructions.iter().any(|i| {
            i.opcode == Opcode::Movsd
                && matches!(i.operands.first(), Some(Operand::Memory { .. }))
                && matches!(i.operands.get(1), Some(Operand::Register(Register::Xmm0)))
        });
        assert!(param_store, "float parameter not stored from xmm0:\n{}", module);
        let rdi_load = module.instructions.iter().any(|i| {
            i.opcode == Opcode::Mov
                && matches!(i.operands.first(), Some(Operand::Register(Register::RDI)))
        });
        assert!(!rdi_load, "float argument leaked into rdi:\n{}", module);
    }

    #[test]
    fn test_config_threshold_drops_low_confidence_suggestions() {
        use std::io::Write;

        // The did-you-mean scan produces a Medium-confidence suggestion.
        let make = || Program {
            decls: vec![function(
                "main",
                vec![],
                None,
                vec![
                    stmt(StmtKind::Let {
                        name: "user_id".to_string(),
                        ty: None,
                        value: int(7),
                    }),
                    stmt(StmtKind::Let {
                        name: "x".to_string(),
                        ty: None,
                        value: ident("useer_id"),
                    }),
                ],
            )],
        };

        // Default threshold keeps it.
        let analysis = analyze_program(&mut make());
        assert!(analysis.reporter.render_human().contains("user_id"));

        // A config file raising the threshold drops it, exactly as the
        // CLI drivers load and apply it.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "min_suggestion_confidence = \"high\"").unwrap();
        let config = CompilerConfig::load(file.path()).unwrap();
        let analysis = analyze_program_with_config(&mut make(), &config);

        let diagnostic = analysis
            .reporter
            .diagnostics()
            .iter()
            .find(|d| d.code.as_str() == "ASTHRA_E001")
            .expect("expected undefined-symbol diagnostic");
        // The suggestion is still recorded; rendering filters it.
        assert!(!diagnostic.suggestions.is_empty());
        assert!(!analysis.reporter.render_human().contains("suggestion"));
        let json = analysis.reporter.to_json();
        let e001 = json["diagnostics"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["code"] == "ASTHRA_E001")
            .unwrap();
        assert!(e001["suggestions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_compile_program_reports_failure_text() {
        let mut program = Program {
            decls: vec![function(
                "main",
                vec![],
                None,
                vec![stmt(StmtKind::Expr(ident("ghost")))],
            )],
        };
        let err = compile_program(&mut program).unwrap_err();
        assert!(err.contains("ASTHRA_E001"));
        assert!(err.contains("ghost"));
    }
}
