// Syntax tree for the Python subset found in short benchmark solutions.
// Produced by the tree-sitter front-end, rewritten by the transformation
// rules, turned back into text by `source_gen` and executed by the
// interpreter.

pub mod literal;
pub mod source_gen;
pub use source_gen::ToSource;

#[cfg(test)]
mod source_gen_tests;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// A whole program: an ordered sequence of statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub body: Vec<Stmt>,
}

impl Module {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    FunctionDef(FunctionDef),
    Return {
        value: Option<Expr>,
    },
    /// `a = b = value`; more than one target is legal Python
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: Operator,
        value: Expr,
    },
    /// `target: annotation [= value]`; `simple` is false for parenthesized names
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
        simple: bool,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Delete {
        targets: Vec<Expr>,
    },
    Import {
        names: Vec<Alias>,
    },
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: usize,
    },
    Global {
        names: Vec<String>,
    },
    Nonlocal {
        names: Vec<String>,
    },
    Expr {
        value: Expr,
    },
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub args: Arguments,
    pub body: Vec<Stmt>,
    pub decorator_list: Vec<Expr>,
    pub returns: Option<Expr>,
}

/// Parameter list of a `def` or `lambda`.
///
/// `defaults` align with the tail of `posonlyargs + args`; `kw_defaults`
/// has one slot per keyword-only parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    pub posonlyargs: Vec<Arg>,
    pub args: Vec<Arg>,
    pub vararg: Option<Arg>,
    pub kwonlyargs: Vec<Arg>,
    pub kw_defaults: Vec<Option<Expr>>,
    pub kwarg: Option<Arg>,
    pub defaults: Vec<Expr>,
}

impl Arguments {
    /// Plain positional parameters without defaults or annotations
    pub fn simple(names: &[&str]) -> Self {
        Self {
            args: names.iter().map(|name| Arg::new(*name)).collect(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posonlyargs.is_empty()
            && self.args.is_empty()
            && self.vararg.is_none()
            && self.kwonlyargs.is_empty()
            && self.kwarg.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub arg: String,
    pub annotation: Option<Expr>,
}

impl Arg {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            arg: name.into(),
            annotation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// `None` for `**mapping` arguments
    pub arg: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub exc_type: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Lambda {
        args: Box<Arguments>,
        body: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// A `None` key marks a `**mapping` entry
    Dict {
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Set {
        elts: Vec<Expr>,
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
    /// f-string
    JoinedStr {
        values: Vec<FStringPart>,
    },
    Constant {
        value: Constant,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Starred {
        value: Box<Expr>,
    },
    Name {
        id: String,
    },
    List {
        elts: Vec<Expr>,
    },
    Tuple {
        elts: Vec<Expr>,
    },
    /// Only valid as the `slice` of a subscript
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FStringPart {
    Literal(String),
    Formatted {
        value: Box<Expr>,
        conversion: Option<char>,
        format_spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    /// Integer literal outside the 64-bit range
    LongInt(BigInt),
    Float(f64),
    Str(String),
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mult,
        Operator::MatMult,
        Operator::Div,
        Operator::Mod,
        Operator::Pow,
        Operator::LShift,
        Operator::RShift,
        Operator::BitOr,
        Operator::BitXor,
        Operator::BitAnd,
        Operator::FloorDiv,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mult => "*",
            Operator::MatMult => "@",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "**",
            Operator::LShift => "<<",
            Operator::RShift => ">>",
            Operator::BitOr => "|",
            Operator::BitXor => "^",
            Operator::BitAnd => "&",
            Operator::FloorDiv => "//",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Invert,
    Not,
    UAdd,
    USub,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not",
            UnaryOp::UAdd => "+",
            UnaryOp::USub => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "==" => CmpOp::Eq,
            "!=" | "<>" => CmpOp::NotEq,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::LtE,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::GtE,
            "is" => CmpOp::Is,
            "is not" => CmpOp::IsNot,
            "in" => CmpOp::In,
            "not in" => CmpOp::NotIn,
            _ => return None,
        };
        Some(op)
    }
}

// Constructors used when the rewriters synthesize new nodes
impl Expr {
    pub fn name(id: impl Into<String>) -> Self {
        Expr::Name { id: id.into() }
    }

    pub fn int(value: i64) -> Self {
        Expr::Constant {
            value: Constant::Int(value),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Constant {
            value: Constant::Str(value.into()),
        }
    }

    pub fn binop(left: Expr, op: Operator, right: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn compare(left: Expr, op: CmpOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            ops: vec![op],
            comparators: vec![right],
        }
    }

    pub fn if_exp(test: Expr, body: Expr, orelse: Expr) -> Self {
        Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
        }
    }

    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Expr::Attribute {
            value: Box::new(value),
            attr: attr.into(),
        }
    }

    pub fn subscript(value: Expr, slice: Expr) -> Self {
        Expr::Subscript {
            value: Box::new(value),
            slice: Box::new(slice),
        }
    }

    pub fn tuple(elts: Vec<Expr>) -> Self {
        Expr::Tuple { elts }
    }

    pub fn list(elts: Vec<Expr>) -> Self {
        Expr::List { elts }
    }

    pub fn lambda(params: &[&str], body: Expr) -> Self {
        Expr::Lambda {
            args: Box::new(Arguments::simple(params)),
            body: Box::new(body),
        }
    }

    /// CPython class name of the node, used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::BoolOp { .. } => "BoolOp",
            Expr::BinOp { .. } => "BinOp",
            Expr::UnaryOp { .. } => "UnaryOp",
            Expr::Lambda { .. } => "Lambda",
            Expr::IfExp { .. } => "IfExp",
            Expr::Dict { .. } => "Dict",
            Expr::Set { .. } => "Set",
            Expr::ListComp { .. } => "ListComp",
            Expr::SetComp { .. } => "SetComp",
            Expr::DictComp { .. } => "DictComp",
            Expr::GeneratorExp { .. } => "GeneratorExp",
            Expr::Compare { .. } => "Compare",
            Expr::Call { .. } => "Call",
            Expr::JoinedStr { .. } => "JoinedStr",
            Expr::Constant { .. } => "Constant",
            Expr::Attribute { .. } => "Attribute",
            Expr::Subscript { .. } => "Subscript",
            Expr::Starred { .. } => "Starred",
            Expr::Name { .. } => "Name",
            Expr::List { .. } => "List",
            Expr::Tuple { .. } => "Tuple",
            Expr::Slice { .. } => "Slice",
        }
    }
}

impl Stmt {
    pub fn expr(value: Expr) -> Self {
        Stmt::Expr { value }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::FunctionDef(_) => "FunctionDef",
            Stmt::Return { .. } => "Return",
            Stmt::Assign { .. } => "Assign",
            Stmt::AugAssign { .. } => "AugAssign",
            Stmt::AnnAssign { .. } => "AnnAssign",
            Stmt::For { .. } => "For",
            Stmt::While { .. } => "While",
            Stmt::If { .. } => "If",
            Stmt::Try { .. } => "Try",
            Stmt::Raise { .. } => "Raise",
            Stmt::Assert { .. } => "Assert",
            Stmt::Delete { .. } => "Delete",
            Stmt::Import { .. } => "Import",
            Stmt::ImportFrom { .. } => "ImportFrom",
            Stmt::Global { .. } => "Global",
            Stmt::Nonlocal { .. } => "Nonlocal",
            Stmt::Expr { .. } => "Expr",
            Stmt::Pass => "Pass",
            Stmt::Break => "Break",
            Stmt::Continue => "Continue",
        }
    }
}
