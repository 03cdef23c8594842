#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Smallest span covering both `a` and `b`.
pub fn join(a: Span, b: Span) -> Span {
    let a0: usize = a.offset();
    let a1 = a0 + a.len();
    let b0: usize = b.offset();
    let b1 = b0 + b.len();
    span_between(a0.min(b0), a1.max(b1))
}

pub type Ident = Spanned<String>;

#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return(Option<Expr>),
    Delete(Vec<Expr>),
    /// `a = b = value` keeps every target in source order.
    Assign(AssignStmt),
    AugAssign(AugAssignStmt),
    AnnAssign(AnnAssignStmt),
    For(ForStmt),
    While(WhileStmt),
    If(IfStmt),
    With(WithStmt),
    Raise(RaiseStmt),
    Try(TryStmt),
    Match(MatchStmt),
    /// `type Name[params] = value`
    TypeAlias(TypeAliasStmt),
    Assert(AssertStmt),
    Import(Vec<Alias>),
    ImportFrom(ImportFrom),
    Global(Vec<Ident>),
    Nonlocal(Vec<Ident>),
    Expr(Expr),
    Pass,
    Break,
    Continue,
}

impl StmtKind {
    /// Short human-readable name, used in diagnostics and C placeholders.
    pub fn describe(&self) -> &'static str {
        match self {
            StmtKind::FunctionDef(_) => "function definition",
            StmtKind::ClassDef(_) => "class definition",
            StmtKind::Return(_) => "return",
            StmtKind::Delete(_) => "del",
            StmtKind::Assign(_) => "assignment",
            StmtKind::AugAssign(_) => "augmented assignment",
            StmtKind::AnnAssign(_) => "annotated assignment",
            StmtKind::For(_) => "for loop",
            StmtKind::While(_) => "while loop",
            StmtKind::If(_) => "if",
            StmtKind::With(_) => "with",
            StmtKind::Raise(_) => "raise",
            StmtKind::Try(_) => "try",
            StmtKind::Match(_) => "match",
            StmtKind::TypeAlias(_) => "type alias",
            StmtKind::Assert(_) => "assert",
            StmtKind::Import(_) => "import",
            StmtKind::ImportFrom(_) => "from-import",
            StmtKind::Global(_) => "global",
            StmtKind::Nonlocal(_) => "nonlocal",
            StmtKind::Expr(_) => "expression statement",
            StmtKind::Pass => "pass",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub is_async: bool,
    pub decorators: Vec<Expr>,
    pub params: Vec<Param>,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// Plain positional parameters (no `*args`, keyword-only or `**kwargs`).
    pub fn positional_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.kind == ParamKind::Positional)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    VarArgs,
    KeywordOnly,
    VarKeywords,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub kind: ParamKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDef {
    pub name: Ident,
    pub decorators: Vec<Expr>,
    pub bases: Vec<Expr>,
    pub keywords: Vec<Keyword>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub targets: Vec<Expr>,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AugAssignStmt {
    pub target: Expr,
    pub op: BinOp,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnAssignStmt {
    pub target: Expr,
    pub annotation: Expr,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub is_async: bool,
    pub target: Expr,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
}

/// `elif` chains are nested `IfStmt`s in `orelse`, as in CPython's tree.
#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WithStmt {
    pub is_async: bool,
    pub items: Vec<WithItem>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub binding: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RaiseStmt {
    pub exc: Option<Expr>,
    pub cause: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TryStmt {
    /// `except*` handlers (exception groups).
    pub is_star: bool,
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Vec<Stmt>,
    pub finalbody: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExceptHandler {
    pub span: Span,
    pub ty: Option<Expr>,
    pub name: Option<Ident>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchStmt {
    pub subject: Expr,
    pub cases: Vec<MatchCase>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchCase {
    pub span: Span,
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternKind {
    /// Literal or dotted-name constant compared by value.
    Value(Expr),
    /// Bare name; `None` is the wildcard `_`.
    Capture(Option<Ident>),
    /// `*rest` inside a sequence; `None` is `*_`.
    Star(Option<Ident>),
    Sequence(Vec<Pattern>),
    Mapping {
        keys: Vec<Expr>,
        patterns: Vec<Pattern>,
        rest: Option<Ident>,
    },
    Class {
        cls: Expr,
        patterns: Vec<Pattern>,
        keywords: Vec<(Ident, Pattern)>,
    },
    Or(Vec<Pattern>),
    As {
        pattern: Box<Pattern>,
        name: Ident,
    },
}

impl Pattern {
    /// Names the pattern binds on a successful match, in source order.
    pub fn bound_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.kind {
            PatternKind::Value(_) => {}
            PatternKind::Capture(name) | PatternKind::Star(name) => {
                out.extend(name.as_ref().map(|n| n.node.as_str()));
            }
            PatternKind::Sequence(items) => items.iter().for_each(|p| p.collect_names(out)),
            // Alternatives bind the same names; the first one is enough.
            PatternKind::Or(alts) => {
                if let Some(first) = alts.first() {
                    first.collect_names(out);
                }
            }
            PatternKind::Mapping { patterns, rest, .. } => {
                patterns.iter().for_each(|p| p.collect_names(out));
                out.extend(rest.as_ref().map(|n| n.node.as_str()));
            }
            PatternKind::Class {
                patterns, keywords, ..
            } => {
                patterns.iter().for_each(|p| p.collect_names(out));
                keywords.iter().for_each(|(_, p)| p.collect_names(out));
            }
            PatternKind::As { pattern, name } => {
                pattern.collect_names(out);
                out.push(&name.node);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAliasStmt {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssertStmt {
    pub test: Expr,
    pub msg: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Alias {
    pub span: Span,
    /// Dotted module path, e.g. `os.path`.
    pub name: String,
    pub asname: Option<Ident>,
}

impl Alias {
    /// The name this import binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(a) => &a.node,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportFrom {
    pub module: Option<String>,
    pub names: Vec<Alias>,
    /// Number of leading dots in a relative import.
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Name(String),
    Constant(Constant),
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    /// `a < b <= c` keeps the chain: `ops.len() == comparators.len()`.
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Attribute {
        value: Box<Expr>,
        attr: Ident,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Starred(Box<Expr>),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    /// A `None` key is a `**mapping` unpacking entry.
    Dict {
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    NamedExpr {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
}

impl ExprKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ExprKind::Name(_) => "name",
            ExprKind::Constant(_) => "constant",
            ExprKind::BinOp { .. } => "binary operation",
            ExprKind::UnaryOp { .. } => "unary operation",
            ExprKind::BoolOp { .. } => "boolean operation",
            ExprKind::Compare { .. } => "comparison",
            ExprKind::Call { .. } => "call",
            ExprKind::Attribute { .. } => "attribute access",
            ExprKind::Subscript { .. } => "subscript",
            ExprKind::Slice { .. } => "slice",
            ExprKind::Starred(_) => "starred expression",
            ExprKind::Tuple(_) => "tuple",
            ExprKind::List(_) => "list",
            ExprKind::Set(_) => "set",
            ExprKind::Dict { .. } => "dict",
            ExprKind::IfExp { .. } => "conditional expression",
            ExprKind::Lambda { .. } => "lambda",
            ExprKind::ListComp { .. } => "list comprehension",
            ExprKind::SetComp { .. } => "set comprehension",
            ExprKind::DictComp { .. } => "dict comprehension",
            ExprKind::GeneratorExp { .. } => "generator expression",
            ExprKind::NamedExpr { .. } => "assignment expression",
            ExprKind::Await(_) => "await",
            ExprKind::Yield(_) => "yield",
            ExprKind::YieldFrom(_) => "yield from",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub span: Span,
    /// `None` for `**kwargs` unpacking.
    pub arg: Option<Ident>,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(u64),
    /// Integer literal too wide for `u64`, kept as written minus underscores.
    BigInt(String),
    Float(f64),
    /// Imaginary literal such as `2j`; holds the imaginary part.
    Imaginary(f64),
    /// Raw literal body; escapes are kept as written.
    Str(String),
    Bytes(String),
    Bool(bool),
    None,
    Ellipsis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    MatMul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::MatMul => "@",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_covers_both_spans_in_any_order() {
        let a = span(4, 2);
        let b = span(10, 3);
        assert_eq!(join(a, b), span_between(4, 13));
        assert_eq!(join(b, a), span_between(4, 13));
    }

    #[test]
    fn alias_binds_first_segment_or_asname() {
        let plain = Alias {
            span: span(0, 0),
            name: "os.path".to_string(),
            asname: None,
        };
        assert_eq!(plain.bound_name(), "os");

        let renamed = Alias {
            span: span(0, 0),
            name: "esbmc".to_string(),
            asname: Some(Ident::new(span(0, 0), "v".to_string())),
        };
        assert_eq!(renamed.bound_name(), "v");
    }
}
