//! Typed syntax tree: expressions, statements and declarations.
//!
//! Nodes are tagged sums with an outer position wrapper, following the same
//! variants-over-inheritance shape the evaluator dispatches on. Names are
//! stored as written (`A\B`, `\A\B`, `namespace\A`); resolution against the
//! current namespace happens at evaluation time.

use strum::Display;

use crate::token::Pos;

/// Anything that occupies a source range starting at a known position.
pub trait Node {
    fn pos(&self) -> Pos;
}

/// A parsed file: top-level statements plus the `declare(strict_types=1)`
/// flag when the file opens with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    pub strict_types: bool,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Node for Expr {
    fn pos(&self) -> Pos {
        self.pos
    }
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

/// One piece of an interpolated string: either literal bytes (escapes already
/// decoded) or an embedded expression.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Lit(Vec<u8>),
    Expr(Expr),
}

/// An element of an array literal or a destructuring pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
    pub by_ref: bool,
    pub unpack: bool,
}

/// A call-site argument; `name` is set for named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
    pub unpack: bool,
}

/// A member selector after `->`/`?->`/`::`: a literal name, a variable, or a
/// braced expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberName {
    Name(String),
    Expr(Box<Expr>),
}

/// One arm of a `match` expression; `conds` is `None` for `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub conds: Option<Vec<Expr>>,
    pub body: Expr,
}

/// Closure and arrow-function payload shared by both syntaxes.
///
/// Arrow functions store their single expression as a `Return` statement and
/// set `is_arrow`, which switches capture semantics from the explicit `use`
/// list to implicit by-value capture of whatever the body reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureExpr {
    pub params: Vec<Param>,
    pub uses: Vec<ClosureUse>,
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub by_ref_return: bool,
    pub is_static: bool,
    pub is_arrow: bool,
    pub is_generator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureUse {
    pub name: String,
    pub by_ref: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = ".")]
    Concat,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "===")]
    Identical,
    #[strum(serialize = "!==")]
    NotIdentical,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=>")]
    Spaceship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CastKind {
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "array")]
    Array,
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "unset")]
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IncludeKind {
    #[strum(serialize = "include")]
    Include,
    #[strum(serialize = "include_once")]
    IncludeOnce,
    #[strum(serialize = "require")]
    Require,
    #[strum(serialize = "require_once")]
    RequireOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MagicConst {
    #[strum(serialize = "__LINE__")]
    Line,
    #[strum(serialize = "__FILE__")]
    File,
    #[strum(serialize = "__DIR__")]
    Dir,
    #[strum(serialize = "__FUNCTION__")]
    Function,
    #[strum(serialize = "__CLASS__")]
    Class,
    #[strum(serialize = "__METHOD__")]
    Method,
    #[strum(serialize = "__NAMESPACE__")]
    Namespace,
    #[strum(serialize = "__TRAIT__")]
    Trait,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A constant string; escape sequences already decoded to bytes.
    Str(Vec<u8>),
    /// Double-quoted or heredoc string with interpolation.
    Interp(Vec<InterpPart>),
    /// Backtick string; the command routes through the `shell_exec` builtin.
    ShellExec(Vec<InterpPart>),
    /// `$name`.
    Variable(String),
    /// `$$name` or `${expr}`: the inner expression names the variable.
    VarVar(Box<Expr>),
    /// A bare name at expression position: constant fetch or, in call
    /// position, a function name.
    Ident(String),
    Array(Vec<ArrayItem>),
    /// `list(...)` or `[...]` at a destructuring position. `None` entries are
    /// skipped slots.
    List(Vec<Option<ArrayItem>>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    PreIncDec {
        inc: bool,
        target: Box<Expr>,
    },
    PostIncDec {
        inc: bool,
        target: Box<Expr>,
    },
    /// `a ? b : c`; `then` is `None` for the elvis form `a ?: c`.
    Ternary {
        cond: Box<Expr>,
        then: Option<Box<Expr>>,
        else_: Box<Expr>,
    },
    Coalesce {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Instanceof {
        expr: Box<Expr>,
        class: Box<Expr>,
    },
    Cast {
        kind: CastKind,
        expr: Box<Expr>,
    },
    Clone(Box<Expr>),
    New {
        class: Box<Expr>,
        args: Vec<Arg>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    MethodCall {
        object: Box<Expr>,
        method: MemberName,
        args: Vec<Arg>,
        nullsafe: bool,
    },
    StaticCall {
        class: Box<Expr>,
        method: MemberName,
        args: Vec<Arg>,
    },
    Prop {
        object: Box<Expr>,
        name: MemberName,
        nullsafe: bool,
    },
    StaticProp {
        class: Box<Expr>,
        name: String,
    },
    /// `Foo::BAR` and `Foo::class`.
    ClassConst {
        class: Box<Expr>,
        name: String,
    },
    /// `base[index]`; `index` is `None` for the append form `base[]`.
    Index {
        base: Box<Expr>,
        index: Option<Box<Expr>>,
    },
    Closure(Box<ClosureExpr>),
    /// First-class callable creation: `f(...)`, `$o->m(...)`, `C::m(...)`.
    /// The inner expression is the zero-argument call shape it was built from.
    FirstClassCallable(Box<Expr>),
    Yield {
        key: Option<Box<Expr>>,
        value: Option<Box<Expr>>,
    },
    YieldFrom(Box<Expr>),
    /// `throw` at expression position.
    Throw(Box<Expr>),
    Print(Box<Expr>),
    Include {
        kind: IncludeKind,
        expr: Box<Expr>,
    },
    Isset(Vec<Expr>),
    Empty(Box<Expr>),
    Eval(Box<Expr>),
    Exit(Option<Box<Expr>>),
    Match {
        subject: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `??=`: assigns only when the target is null or unset.
    CoalesceAssign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `$a = &$b`.
    AssignRef {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    ErrorSuppress(Box<Expr>),
    MagicConst(MagicConst),
    /// Produced by error recovery; evaluating one is a runtime error.
    Bad,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

impl Node for Stmt {
    fn pos(&self) -> Pos {
        self.pos
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Union of class names this clause matches.
    pub types: Vec<String>,
    /// Capture variable, if present.
    pub var: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Empty,
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        elseifs: Vec<(Expr, Vec<Stmt>)>,
        else_: Option<Vec<Stmt>>,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        subject: Expr,
        key_var: Option<Expr>,
        value_var: Expr,
        by_ref: bool,
        body: Vec<Stmt>,
    },
    Break(u32),
    Continue(u32),
    Return(Option<Expr>),
    Goto(String),
    Label(String),
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Throw(Expr),
    Echo(Vec<Expr>),
    Global(Vec<String>),
    StaticVars(Vec<(String, Option<Expr>)>),
    Unset(Vec<Expr>),
    Declare {
        directives: Vec<(String, Expr)>,
        body: Option<Vec<Stmt>>,
    },
    InlineHtml(Vec<u8>),
    HaltCompiler,
    Decl(Decl),
    /// Produced by error recovery.
    Bad,
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    pub pos: Pos,
}

impl Node for Decl {
    fn pos(&self) -> Pos {
        self.pos
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UseKind {
    #[strum(serialize = "")]
    Class,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "const")]
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseItem {
    pub path: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Namespace {
        name: Option<String>,
        /// `Some` for the braced form; `None` for file-scoped.
        body: Option<Vec<Stmt>>,
    },
    Use {
        kind: UseKind,
        items: Vec<UseItem>,
    },
    Const(Vec<(String, Expr)>),
    Function(FuncDecl),
    Class(ClassDecl),
    /// Produced by error recovery.
    Bad,
}

/// `#[Name(args)]` attached to a declaration, parameter or class member.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Visibility {
    #[strum(serialize = "public")]
    Public,
    #[strum(serialize = "protected")]
    Protected,
    #[strum(serialize = "private")]
    Private,
}

/// Modifier set accumulated in front of a class member or promoted
/// constructor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberModifiers {
    pub visibility: Option<Visibility>,
    /// Asymmetric write visibility: `public(set)`, `protected(set)`, `private(set)`.
    pub set_visibility: Option<Visibility>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
}

impl MemberModifiers {
    pub fn visibility_or_public(&self) -> Visibility {
        self.visibility.unwrap_or(Visibility::Public)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub by_ref: bool,
    pub variadic: bool,
    /// Set when the parameter carries visibility/readonly modifiers in a
    /// constructor, promoting it to a property.
    pub promotion: Option<MemberModifiers>,
    pub attrs: Vec<AttributeSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// `None` for abstract and interface methods.
    pub body: Option<Vec<Stmt>>,
    pub by_ref_return: bool,
    /// True when the body contains `yield`/`yield from` at its own level.
    pub is_generator: bool,
    pub attrs: Vec<AttributeSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ClassKind {
    #[strum(serialize = "class")]
    Class,
    #[strum(serialize = "interface")]
    Interface,
    #[strum(serialize = "trait")]
    Trait,
    #[strum(serialize = "enum")]
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub kind: ClassKind,
    pub name: String,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
    /// Classes extend at most one name; interfaces may extend several.
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    /// Backing scalar type for backed enums.
    pub enum_backing: Option<TypeExpr>,
    pub members: Vec<ClassMember>,
    pub attrs: Vec<AttributeSpec>,
}

/// A property hook (`get`/`set`) body.
#[derive(Debug, Clone, PartialEq)]
pub struct PropHook {
    pub is_get: bool,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Property {
        modifiers: MemberModifiers,
        ty: Option<TypeExpr>,
        entries: Vec<(String, Option<Expr>)>,
        hooks: Vec<PropHook>,
        attrs: Vec<AttributeSpec>,
    },
    Method {
        modifiers: MemberModifiers,
        func: FuncDecl,
    },
    Const {
        modifiers: MemberModifiers,
        entries: Vec<(String, Expr)>,
        attrs: Vec<AttributeSpec>,
    },
    TraitUse {
        traits: Vec<String>,
        adaptations: Vec<TraitAdaptation>,
    },
    EnumCase {
        name: String,
        value: Option<Expr>,
        attrs: Vec<AttributeSpec>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraitAdaptation {
    /// `A::m insteadof B, C;`
    InsteadOf {
        trait_name: String,
        method: String,
        excluded: Vec<String>,
    },
    /// `A::m as protected n;`
    As {
        trait_name: Option<String>,
        method: String,
        visibility: Option<Visibility>,
        alias: Option<String>,
    },
}

/// A type expression: nullable flag plus simple, union or intersection form.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub nullable: bool,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Simple(String),
    Union(Vec<String>),
    Intersection(Vec<String>),
}

impl TypeExpr {
    pub fn simple(name: impl Into<String>) -> Self {
        Self { nullable: false, kind: TypeKind::Simple(name.into()) }
    }

    /// All names this type mentions, in source order.
    pub fn names(&self) -> Vec<&str> {
        match &self.kind {
            TypeKind::Simple(n) => vec![n.as_str()],
            TypeKind::Union(ns) | TypeKind::Intersection(ns) => {
                ns.iter().map(String::as_str).collect()
            }
        }
    }
}

/// Scans a statement list for `yield`/`yield from` without descending into
/// nested function or closure bodies, which own their yields.
pub fn contains_yield(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_has_yield)
}

fn stmt_has_yield(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Throw(e) => expr_has_yield(e),
        StmtKind::Return(e) => e.as_ref().is_some_and(expr_has_yield),
        StmtKind::Block(body) => contains_yield(body),
        StmtKind::If { cond, then, elseifs, else_ } => {
            expr_has_yield(cond)
                || contains_yield(then)
                || elseifs.iter().any(|(c, b)| expr_has_yield(c) || contains_yield(b))
                || else_.as_ref().is_some_and(|b| contains_yield(b))
        }
        StmtKind::Switch { subject, cases } => {
            expr_has_yield(subject)
                || cases
                    .iter()
                    .any(|c| c.test.as_ref().is_some_and(expr_has_yield) || contains_yield(&c.body))
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
            expr_has_yield(cond) || contains_yield(body)
        }
        StmtKind::For { init, cond, step, body } => {
            init.iter().chain(cond).chain(step).any(expr_has_yield) || contains_yield(body)
        }
        StmtKind::Foreach { subject, key_var, value_var, body, .. } => {
            expr_has_yield(subject)
                || key_var.as_ref().is_some_and(expr_has_yield)
                || expr_has_yield(value_var)
                || contains_yield(body)
        }
        StmtKind::Try { body, catches, finally } => {
            contains_yield(body)
                || catches.iter().any(|c| contains_yield(&c.body))
                || finally.as_ref().is_some_and(|b| contains_yield(b))
        }
        StmtKind::Echo(exprs) | StmtKind::Unset(exprs) => exprs.iter().any(expr_has_yield),
        StmtKind::StaticVars(vars) => {
            vars.iter().any(|(_, init)| init.as_ref().is_some_and(expr_has_yield))
        }
        _ => false,
    }
}

fn expr_has_yield(expr: &Expr) -> bool {
    use ExprKind::*;
    match &expr.kind {
        Yield { .. } | YieldFrom(_) => true,
        Binary { lhs, rhs, .. }
        | Coalesce { lhs, rhs }
        | Assign { target: lhs, value: rhs }
        | CompoundAssign { target: lhs, value: rhs, .. }
        | CoalesceAssign { target: lhs, value: rhs }
        | AssignRef { target: lhs, value: rhs } => expr_has_yield(lhs) || expr_has_yield(rhs),
        Unary { operand, .. }
        | Cast { expr: operand, .. }
        | Clone(operand)
        | Throw(operand)
        | Print(operand)
        | Empty(operand)
        | Eval(operand)
        | ErrorSuppress(operand)
        | PreIncDec { target: operand, .. }
        | PostIncDec { target: operand, .. }
        | VarVar(operand)
        | Include { expr: operand, .. } => expr_has_yield(operand),
        Ternary { cond, then, else_ } => {
            expr_has_yield(cond)
                || then.as_deref().is_some_and(expr_has_yield)
                || expr_has_yield(else_)
        }
        Call { callee, args } => expr_has_yield(callee) || args.iter().any(|a| expr_has_yield(&a.value)),
        MethodCall { object, args, .. } => {
            expr_has_yield(object) || args.iter().any(|a| expr_has_yield(&a.value))
        }
        StaticCall { args, .. } | New { args, .. } => args.iter().any(|a| expr_has_yield(&a.value)),
        Index { base, index } => {
            expr_has_yield(base) || index.as_deref().is_some_and(expr_has_yield)
        }
        Array(items) => items.iter().any(|i| {
            i.key.as_ref().is_some_and(expr_has_yield) || expr_has_yield(&i.value)
        }),
        Match { subject, arms } => {
            expr_has_yield(subject)
                || arms.iter().any(|a| {
                    a.conds.as_ref().is_some_and(|cs| cs.iter().any(expr_has_yield))
                        || expr_has_yield(&a.body)
                })
        }
        Interp(parts) | ShellExec(parts) => parts.iter().any(|p| match p {
            InterpPart::Expr(e) => expr_has_yield(e),
            InterpPart::Lit(_) => false,
        }),
        Isset(exprs) => exprs.iter().any(expr_has_yield),
        Exit(arg) => arg.as_deref().is_some_and(expr_has_yield),
        _ => false,
    }
}
