//! Abstract Syntax Tree and tagged-dispatch visitor
//!
//! One arena-free tree (nodes own their children through `Box`/`Vec`,
//! exactly like the teacher's `UnionDef`/`Pattern`/`Expr` trees) walked by
//! a visitor returning a three-valued control token per §4.5. The
//! original source's visitor is class-hierarchy-based (`Node` subclasses,
//! `accept(Visitor&)` overrides); this is the "visitor pattern → tagged
//! dispatch" redesign: [`VisitResult`] replaces the three-valued
//! `Stmt_Transparency`-style return, and every node kind gets a plain
//! `match` instead of a v-table.

use crate::source::Span;
use crate::types::BuiltinType;

/// Result of visiting one node, per §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Recurse into this node's children.
    Continue,
    /// Skip this node's remaining children/siblings; resume at the parent.
    ContinueParent,
    /// Abort the whole traversal immediately.
    Stop,
}

/// Chain two visit steps: `ContinueParent` absorbs here (the caller sees
/// a normal `Continue`, since from its point of view this subtree is
/// done); `Stop` propagates immediately; `Continue` proceeds to `next`.
fn and_then(result: VisitResult, next: impl FnOnce() -> VisitResult) -> VisitResult {
    match result {
        VisitResult::Continue => next(),
        VisitResult::ContinueParent => VisitResult::Continue,
        VisitResult::Stop => VisitResult::Stop,
    }
}

/// Visit a homogeneous list of siblings in source order.
fn visit_each<'a, T: 'a>(
    items: impl IntoIterator<Item = &'a T>,
    mut f: impl FnMut(&'a T) -> VisitResult,
) -> VisitResult {
    for item in items {
        match f(item) {
            VisitResult::Continue => {}
            VisitResult::ContinueParent => return VisitResult::Continue,
            VisitResult::Stop => return VisitResult::Stop,
        }
    }
    VisitResult::Continue
}

/// Per-kind visitor callbacks. An unoverridden method defaults to
/// `Continue`, matching "an unimplemented per-kind override defaults to
/// continue" in §4.5.
pub trait Visitor {
    fn visit_decl(&mut self, _decl: &Decl) -> VisitResult {
        VisitResult::Continue
    }
    fn visit_stmt(&mut self, _stmt: &Stmt) -> VisitResult {
        VisitResult::Continue
    }
    fn visit_expr(&mut self, _expr: &Expr) -> VisitResult {
        VisitResult::Continue
    }
}

// ---------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------

/// A type as written in source: builtin, named struct, or array.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Builtin(BuiltinType),
    /// Named reference to a declared struct.
    Struct(String),
    /// `size` absent means runtime-sized.
    Array { base: Box<TypeExpr>, size: Option<u32> },
}

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Vertex,
    Fragment,
    Compute,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Input,
    Output,
    Uniform,
    PushConstant,
    Buffer,
    Automatic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeArg {
    Named(String, Literal),
    Positional(Literal),
    /// A bare identifier argument, e.g. the source name in `@from(camera)`.
    Identifier(String),
}

/// e.g. a layout qualifier: `@layout(location = 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<AttributeArg>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeExpr,
    pub body: Block,
    pub span: Span,
}

/// `fn <pass>::<stage>(params) -> type { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFunctionDecl {
    pub pass: String,
    pub stage: StageKind,
    pub params: Vec<Param>,
    pub return_type: TypeExpr,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Uniform,
    PushConstant,
    Storage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDecl {
    pub kind: BufferKind,
    pub name: String,
    pub fields: Vec<StructField>,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

/// Semantic-only grouping of overloads sharing a name. Produced by
/// whatever assembles the declaration list after parsing, never by the
/// parser itself, hence no span of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct OverloadedFunctionDecl {
    pub name: String,
    pub overloads: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FunctionDecl),
    StageFunction(StageFunctionDecl),
    Struct(StructDecl),
    OverloadedFunction(OverloadedFunctionDecl),
    Buffer(BufferDecl),
}

impl Decl {
    pub fn accept(&self, visitor: &mut dyn Visitor) -> VisitResult {
        and_then(visitor.visit_decl(self), || self.walk_children(visitor))
    }

    fn walk_children(&self, visitor: &mut dyn Visitor) -> VisitResult {
        match self {
            Decl::Function(f) => f.body.accept(visitor),
            Decl::StageFunction(f) => f.body.accept(visitor),
            Decl::Struct(_) | Decl::Buffer(_) => VisitResult::Continue,
            Decl::OverloadedFunction(group) => {
                visit_each(group.overloads.iter(), |f| f.body.accept(visitor))
            }
        }
    }
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn accept(&self, visitor: &mut dyn Visitor) -> VisitResult {
        visit_each(self.statements.iter(), |s| s.accept(visitor))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchArm {
    pub labels: Vec<i64>,
    pub is_default: bool,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub mutable: bool,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    Switch {
        selector: Expr,
        arms: Vec<SwitchArm>,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Vec<Expr>,
        body: Block,
        span: Span,
    },
    While {
        condition: Expr,
        body: Block,
        span: Span,
    },
    DoWhile {
        body: Block,
        condition: Expr,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Discard {
        span: Span,
    },
    Expression {
        expr: Expr,
        span: Span,
    },
    Variable(VarDecl),
}

impl Stmt {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block(b) => b.span,
            Stmt::If { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::For { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Discard { span }
            | Stmt::Expression { span, .. } => *span,
            Stmt::Variable(v) => v.span,
        }
    }

    pub fn accept(&self, visitor: &mut dyn Visitor) -> VisitResult {
        and_then(visitor.visit_stmt(self), || self.walk_children(visitor))
    }

    fn walk_children(&self, visitor: &mut dyn Visitor) -> VisitResult {
        match self {
            Stmt::Block(b) => b.accept(visitor),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => and_then(condition.accept(visitor), || {
                and_then(then_branch.accept(visitor), || match else_branch {
                    Some(e) => e.accept(visitor),
                    None => VisitResult::Continue,
                })
            }),
            Stmt::Switch {
                selector, arms, ..
            } => and_then(selector.accept(visitor), || {
                visit_each(arms.iter(), |arm| visit_each(arm.body.iter(), |s| s.accept(visitor)))
            }),
            Stmt::For {
                init,
                condition,
                step,
                body,
                ..
            } => {
                let visit_init = || match init {
                    Some(i) => i.accept(visitor),
                    None => VisitResult::Continue,
                };
                let visit_cond = || match condition {
                    Some(c) => c.accept(visitor),
                    None => VisitResult::Continue,
                };
                and_then(visit_init(), || {
                    and_then(visit_cond(), || {
                        and_then(visit_each(step.iter(), |e| e.accept(visitor)), || {
                            body.accept(visitor)
                        })
                    })
                })
            }
            Stmt::While {
                condition, body, ..
            } => and_then(condition.accept(visitor), || body.accept(visitor)),
            Stmt::DoWhile {
                body, condition, ..
            } => and_then(body.accept(visitor), || condition.accept(visitor)),
            Stmt::Return { value, .. } => match value {
                Some(e) => e.accept(visitor),
                None => VisitResult::Continue,
            },
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Discard { .. } => {
                VisitResult::Continue
            }
            Stmt::Expression { expr, .. } => expr.accept(visitor),
            Stmt::Variable(v) => match &v.init {
                Some(e) => e.accept(visitor),
                None => VisitResult::Continue,
            },
        }
    }
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int { value: u64, unsigned: bool },
    Float { value: f64, is_f64: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitialiserArg {
    Positional(Expr),
    Named(String, Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    If {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Identifier(String),
    Assignment {
        op: CompoundOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    InitialiserCall {
        ty: TypeExpr,
        args: Vec<InitialiserArg>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Reinterpret {
        ty: TypeExpr,
        value: Box<Expr>,
    },
    Default {
        ty: TypeExpr,
    },
    Literal(Literal),
}

/// Every expression carries its span and, once semantic analysis has run,
/// its resolved type. This crate consumes `evaluated_type`; it never
/// computes it (§1 non-goals), so `evaluated_type` is populated by
/// whatever constructs the AST upstream of lowering — a fixture in tests,
/// a real analysis pass in a full pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub evaluated_type: Option<TypeExpr>,
}

impl Expr {
    pub fn accept(&self, visitor: &mut dyn Visitor) -> VisitResult {
        and_then(visitor.visit_expr(self), || self.walk_children(visitor))
    }

    fn walk_children(&self, visitor: &mut dyn Visitor) -> VisitResult {
        match &self.kind {
            ExprKind::If {
                condition,
                then_expr,
                else_expr,
            } => and_then(condition.accept(visitor), || {
                and_then(then_expr.accept(visitor), || else_expr.accept(visitor))
            }),
            ExprKind::Identifier(_) | ExprKind::Literal(_) | ExprKind::Default { .. } => {
                VisitResult::Continue
            }
            ExprKind::Assignment { target, value, .. } => {
                and_then(target.accept(visitor), || value.accept(visitor))
            }
            ExprKind::InitialiserCall { args, .. } => visit_each(args.iter(), |a| match a {
                InitialiserArg::Positional(e) | InitialiserArg::Named(_, e) => e.accept(visitor),
            }),
            ExprKind::Call { args, .. } => visit_each(args.iter(), |e| e.accept(visitor)),
            ExprKind::FieldAccess { base, .. } => base.accept(visitor),
            ExprKind::Index { base, index } => {
                and_then(base.accept(visitor), || index.accept(visitor))
            }
            ExprKind::Reinterpret { value, .. } => value.accept(visitor),
        }
    }
}

/// Top-level container: an ordered list of declarations in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub decls: Vec<Decl>,
    pub span: Span,
}

impl Program {
    pub fn accept(&self, visitor: &mut dyn Visitor) -> VisitResult {
        visit_each(self.decls.iter(), |d| d.accept(visitor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;

    fn span(a: u32, b: u32) -> Span {
        Span::new(SourceId::new(0), a, b, 0, a)
    }

    fn ident(name: &str, a: u32, b: u32) -> Expr {
        Expr {
            kind: ExprKind::Identifier(name.to_string()),
            span: span(a, b),
            evaluated_type: None,
        }
    }

    #[test]
    fn continue_recurses_into_children() {
        struct CountIdents(u32);
        impl Visitor for CountIdents {
            fn visit_expr(&mut self, expr: &Expr) -> VisitResult {
                if matches!(expr.kind, ExprKind::Identifier(_)) {
                    self.0 += 1;
                }
                VisitResult::Continue
            }
        }
        let expr = Expr {
            kind: ExprKind::Index {
                base: Box::new(ident("a", 0, 1)),
                index: Box::new(ident("b", 2, 3)),
            },
            span: span(0, 4),
            evaluated_type: None,
        };
        let mut v = CountIdents(0);
        expr.accept(&mut v);
        assert_eq!(v.0, 3); // the Index node itself is not an identifier, plus a and b
    }

    #[test]
    fn continue_parent_skips_remaining_siblings() {
        struct StopAtFirst(Vec<String>);
        impl Visitor for StopAtFirst {
            fn visit_expr(&mut self, expr: &Expr) -> VisitResult {
                if let ExprKind::Identifier(name) = &expr.kind {
                    self.0.push(name.clone());
                    if name == "a" {
                        return VisitResult::ContinueParent;
                    }
                }
                VisitResult::Continue
            }
        }
        // Index's base is visited (name "a", returns ContinueParent, aborting
        // its own children which is moot since it has none); base has no
        // siblings inside Index besides `index`, which the parent's
        // walk_children chain still visits because ContinueParent only
        // cancels the *returning* node's own subtree, not its siblings.
        let expr = Expr {
            kind: ExprKind::Index {
                base: Box::new(ident("a", 0, 1)),
                index: Box::new(ident("b", 2, 3)),
            },
            span: span(0, 4),
            evaluated_type: None,
        };
        let mut v = StopAtFirst(Vec::new());
        expr.accept(&mut v);
        assert_eq!(v.0, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn stop_aborts_whole_traversal() {
        struct StopImmediately(u32);
        impl Visitor for StopImmediately {
            fn visit_expr(&mut self, _expr: &Expr) -> VisitResult {
                self.0 += 1;
                VisitResult::Stop
            }
        }
        let expr = Expr {
            kind: ExprKind::Index {
                base: Box::new(ident("a", 0, 1)),
                index: Box::new(ident("b", 2, 3)),
            },
            span: span(0, 4),
            evaluated_type: None,
        };
        let mut v = StopImmediately(0);
        let result = expr.accept(&mut v);
        assert_eq!(result, VisitResult::Stop);
        assert_eq!(v.0, 1);
    }

    #[test]
    fn block_visits_statements_in_source_order() {
        struct Order(Vec<u32>);
        impl Visitor for Order {
            fn visit_stmt(&mut self, stmt: &Stmt) -> VisitResult {
                self.0.push(stmt.span().start_offset);
                VisitResult::Continue
            }
        }
        let block = Block {
            statements: vec![
                Stmt::Break { span: span(0, 1) },
                Stmt::Continue { span: span(2, 3) },
                Stmt::Discard { span: span(4, 5) },
            ],
            span: span(0, 5),
        };
        let mut v = Order(Vec::new());
        block.accept(&mut v);
        assert_eq!(v.0, vec![0, 2, 4]);
    }

    #[test]
    fn if_visits_condition_before_branches() {
        struct Order(Vec<&'static str>);
        impl Visitor for Order {
            fn visit_expr(&mut self, expr: &Expr) -> VisitResult {
                if let ExprKind::Identifier(name) = &expr.kind {
                    self.0.push(if name == "c" { "cond" } else { "other" });
                }
                VisitResult::Continue
            }
        }
        let stmt = Stmt::If {
            condition: ident("c", 0, 1),
            then_branch: Block {
                statements: vec![Stmt::Expression {
                    expr: ident("t", 2, 3),
                    span: span(2, 3),
                }],
                span: span(2, 3),
            },
            else_branch: None,
            span: span(0, 3),
        };
        let mut v = Order(Vec::new());
        stmt.accept(&mut v);
        assert_eq!(v.0, vec!["cond", "other"]);
    }
}
