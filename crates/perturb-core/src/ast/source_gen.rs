// Source code generation from the AST
// Reproduces the layout of CPython's `ast.unparse`: four-space indentation,
// minimal parentheses chosen by operator precedence, `repr` spelling for
// constants and a blank line before every function definition.

use super::literal::{docstring_literal, float_repr, is_printable, str_repr};
use super::*;

/// Trait for types that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

impl ToSource for Module {
    fn to_source(&self) -> String {
        let mut unparser = Unparser::default();
        unparser.body_with_docstring(&self.body);
        unparser.out
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        let mut unparser = Unparser::default();
        unparser.stmt(self);
        unparser.out
    }
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        let mut unparser = Unparser::default();
        unparser.expr(self, Precedence::TEST);
        unparser.out
    }
}

/// Binding strength of an expression context, mirroring `ast._Precedence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Precedence(u8);

impl Precedence {
    const TUPLE: Self = Self(2);
    const YIELD: Self = Self(3);
    const TEST: Self = Self(4);
    const OR: Self = Self(5);
    const AND: Self = Self(6);
    const NOT: Self = Self(7);
    const CMP: Self = Self(8);
    const EXPR: Self = Self(9);
    const BOR: Self = Self(9);
    const BXOR: Self = Self(10);
    const BAND: Self = Self(11);
    const SHIFT: Self = Self(12);
    const ARITH: Self = Self(13);
    const TERM: Self = Self(14);
    const FACTOR: Self = Self(15);
    const POWER: Self = Self(16);
    const ATOM: Self = Self(18);

    fn next(self) -> Self {
        if self < Self::ATOM {
            Self(self.0 + 1)
        } else {
            self
        }
    }

    fn of_operator(op: Operator) -> Self {
        match op {
            Operator::Add | Operator::Sub => Self::ARITH,
            Operator::Mult
            | Operator::MatMult
            | Operator::Div
            | Operator::Mod
            | Operator::FloorDiv => Self::TERM,
            Operator::Pow => Self::POWER,
            Operator::LShift | Operator::RShift => Self::SHIFT,
            Operator::BitOr => Self::BOR,
            Operator::BitXor => Self::BXOR,
            Operator::BitAnd => Self::BAND,
        }
    }
}

#[derive(Default)]
struct Unparser {
    out: String,
    indent: usize,
}

impl Unparser {
    fn write(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn maybe_newline(&mut self) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
    }

    fn fill(&mut self, text: &str) {
        self.maybe_newline();
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
    }

    fn block(&mut self, body: &[Stmt]) {
        self.write(":");
        self.indent += 1;
        for stmt in body {
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn docstring_block(&mut self, body: &[Stmt]) {
        self.write(":");
        self.indent += 1;
        self.body_with_docstring(body);
        self.indent -= 1;
    }

    fn body_with_docstring(&mut self, body: &[Stmt]) {
        let rest = match body.first() {
            Some(Stmt::Expr {
                value:
                    Expr::Constant {
                        value: Constant::Str(doc),
                    },
            }) => {
                self.fill(&docstring_literal(doc));
                &body[1..]
            }
            _ => body,
        };
        for stmt in rest {
            self.stmt(stmt);
        }
    }

    fn delimit_if(&mut self, open: &str, close: &str, condition: bool, f: impl FnOnce(&mut Self)) {
        if condition {
            self.write(open);
        }
        f(self);
        if condition {
            self.write(close);
        }
    }

    fn interleave(&mut self, items: &[Expr], precedence: Precedence) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(item, precedence);
        }
    }

    /// Tuple-style element list: a lone element keeps its trailing comma
    fn items_view(&mut self, items: &[Expr]) {
        if items.len() == 1 {
            self.expr(&items[0], Precedence::TEST);
            self.write(",");
        } else {
            self.interleave(items, Precedence::TEST);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.maybe_newline();
                for decorator in &def.decorator_list {
                    self.fill("@");
                    self.expr(decorator, Precedence::TEST);
                }
                self.fill(&format!("def {}", def.name));
                self.write("(");
                self.arguments(&def.args);
                self.write(")");
                if let Some(returns) = &def.returns {
                    self.write(" -> ");
                    self.expr(returns, Precedence::TEST);
                }
                self.docstring_block(&def.body);
            }
            Stmt::Return { value } => {
                self.fill("return");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value, Precedence::TEST);
                }
            }
            Stmt::Assign { targets, value } => {
                self.fill("");
                for target in targets {
                    self.expr(target, Precedence::TUPLE);
                    self.write(" = ");
                }
                self.expr(value, Precedence::TEST);
            }
            Stmt::AugAssign { target, op, value } => {
                self.fill("");
                self.expr(target, Precedence::TEST);
                self.write(&format!(" {}= ", op.symbol()));
                self.expr(value, Precedence::TEST);
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                simple,
            } => {
                self.fill("");
                let parenthesize = !*simple && matches!(target, Expr::Name { .. });
                self.delimit_if("(", ")", parenthesize, |u| {
                    u.expr(target, Precedence::TEST)
                });
                self.write(": ");
                self.expr(annotation, Precedence::TEST);
                if let Some(value) = value {
                    self.write(" = ");
                    self.expr(value, Precedence::TEST);
                }
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.fill("for ");
                self.expr(target, Precedence::TUPLE);
                self.write(" in ");
                self.expr(iter, Precedence::TEST);
                self.block(body);
                if !orelse.is_empty() {
                    self.fill("else");
                    self.block(orelse);
                }
            }
            Stmt::While { test, body, orelse } => {
                self.fill("while ");
                self.expr(test, Precedence::TEST);
                self.block(body);
                if !orelse.is_empty() {
                    self.fill("else");
                    self.block(orelse);
                }
            }
            Stmt::If { test, body, orelse } => {
                self.fill("if ");
                self.expr(test, Precedence::TEST);
                self.block(body);
                let mut orelse = orelse;
                // collapse nested ifs into elif chains
                while let [Stmt::If { test, body, orelse: next }] = orelse.as_slice() {
                    self.fill("elif ");
                    self.expr(test, Precedence::TEST);
                    self.block(body);
                    orelse = next;
                }
                if !orelse.is_empty() {
                    self.fill("else");
                    self.block(orelse);
                }
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.fill("try");
                self.block(body);
                for handler in handlers {
                    self.fill("except");
                    if let Some(exc_type) = &handler.exc_type {
                        self.write(" ");
                        self.expr(exc_type, Precedence::TEST);
                    }
                    if let Some(name) = &handler.name {
                        self.write(" as ");
                        self.write(name);
                    }
                    self.block(&handler.body);
                }
                if !orelse.is_empty() {
                    self.fill("else");
                    self.block(orelse);
                }
                if !finalbody.is_empty() {
                    self.fill("finally");
                    self.block(finalbody);
                }
            }
            Stmt::Raise { exc, cause } => {
                self.fill("raise");
                if let Some(exc) = exc {
                    self.write(" ");
                    self.expr(exc, Precedence::TEST);
                    if let Some(cause) = cause {
                        self.write(" from ");
                        self.expr(cause, Precedence::TEST);
                    }
                }
            }
            Stmt::Assert { test, msg } => {
                self.fill("assert ");
                self.expr(test, Precedence::TEST);
                if let Some(msg) = msg {
                    self.write(", ");
                    self.expr(msg, Precedence::TEST);
                }
            }
            Stmt::Delete { targets } => {
                self.fill("del ");
                self.interleave(targets, Precedence::TEST);
            }
            Stmt::Import { names } => {
                self.fill("import ");
                self.aliases(names);
            }
            Stmt::ImportFrom {
                module,
                names,
                level,
            } => {
                self.fill("from ");
                self.write(&".".repeat(*level));
                if let Some(module) = module {
                    self.write(module);
                }
                self.write(" import ");
                self.aliases(names);
            }
            Stmt::Global { names } => {
                self.fill("global ");
                self.write(&names.join(", "));
            }
            Stmt::Nonlocal { names } => {
                self.fill("nonlocal ");
                self.write(&names.join(", "));
            }
            Stmt::Expr { value } => {
                self.fill("");
                self.expr(value, Precedence::YIELD);
            }
            Stmt::Pass => self.fill("pass"),
            Stmt::Break => self.fill("break"),
            Stmt::Continue => self.fill("continue"),
        }
    }

    fn aliases(&mut self, names: &[Alias]) {
        for (i, alias) in names.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write(&alias.name);
            if let Some(asname) = &alias.asname {
                self.write(" as ");
                self.write(asname);
            }
        }
    }

    fn arg(&mut self, arg: &Arg) {
        self.write(&arg.arg);
        if let Some(annotation) = &arg.annotation {
            self.write(": ");
            self.expr(annotation, Precedence::TEST);
        }
    }

    fn arguments(&mut self, args: &Arguments) {
        let mut first = true;
        let positional: Vec<&Arg> = args.posonlyargs.iter().chain(args.args.iter()).collect();
        let default_offset = positional.len().saturating_sub(args.defaults.len());

        for (index, arg) in positional.iter().enumerate() {
            if first {
                first = false;
            } else {
                self.write(", ");
            }
            self.arg(arg);
            if index >= default_offset {
                if let Some(default) = args.defaults.get(index - default_offset) {
                    self.write("=");
                    self.expr(default, Precedence::TEST);
                }
            }
            if index + 1 == args.posonlyargs.len() {
                self.write(", /");
            }
        }

        if args.vararg.is_some() || !args.kwonlyargs.is_empty() {
            if first {
                first = false;
            } else {
                self.write(", ");
            }
            self.write("*");
            if let Some(vararg) = &args.vararg {
                self.write(&vararg.arg);
                if let Some(annotation) = &vararg.annotation {
                    self.write(": ");
                    self.expr(annotation, Precedence::TEST);
                }
            }
        }

        for (arg, default) in args.kwonlyargs.iter().zip(args.kw_defaults.iter()) {
            if first {
                first = false;
            } else {
                self.write(", ");
            }
            self.arg(arg);
            if let Some(default) = default {
                self.write("=");
                self.expr(default, Precedence::TEST);
            }
        }

        if let Some(kwarg) = &args.kwarg {
            if !first {
                self.write(", ");
            }
            self.write("**");
            self.arg(kwarg);
        }
    }

    fn comprehensions(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.write(" for ");
            self.expr(&generator.target, Precedence::TUPLE);
            self.write(" in ");
            self.expr(&generator.iter, Precedence::TEST.next());
            for condition in &generator.ifs {
                self.write(" if ");
                self.expr(condition, Precedence::TEST.next());
            }
        }
    }

    fn constant(&mut self, value: &Constant) {
        match value {
            Constant::None => self.write("None"),
            Constant::Bool(true) => self.write("True"),
            Constant::Bool(false) => self.write("False"),
            Constant::Int(i) => self.write(&i.to_string()),
            Constant::LongInt(i) => self.write(&i.to_string()),
            Constant::Float(f) => {
                let text = float_repr(*f).replace("inf", "1e309");
                let text = text.replace("nan", "(1e309-1e309)");
                self.write(&text);
            }
            Constant::Str(s) => self.write(&str_repr(s)),
            Constant::Ellipsis => self.write("..."),
        }
    }

    fn expr(&mut self, expr: &Expr, precedence: Precedence) {
        match expr {
            Expr::BoolOp { op, values } => {
                let op_precedence = match op {
                    BoolOp::And => Precedence::AND,
                    BoolOp::Or => Precedence::OR,
                };
                self.delimit_if("(", ")", precedence > op_precedence, |u| {
                    let mut inner = op_precedence;
                    for (i, value) in values.iter().enumerate() {
                        inner = inner.next();
                        if i > 0 {
                            u.write(&format!(" {} ", op.keyword()));
                        }
                        u.expr(value, inner);
                    }
                });
            }
            Expr::BinOp { left, op, right } => {
                let op_precedence = Precedence::of_operator(*op);
                self.delimit_if("(", ")", precedence > op_precedence, |u| {
                    let (left_precedence, right_precedence) = if *op == Operator::Pow {
                        (op_precedence.next(), op_precedence)
                    } else {
                        (op_precedence, op_precedence.next())
                    };
                    u.expr(left, left_precedence);
                    u.write(&format!(" {} ", op.symbol()));
                    u.expr(right, right_precedence);
                });
            }
            Expr::UnaryOp { op, operand } => {
                let op_precedence = match op {
                    UnaryOp::Not => Precedence::NOT,
                    _ => Precedence::FACTOR,
                };
                self.delimit_if("(", ")", precedence > op_precedence, |u| {
                    u.write(op.symbol());
                    if *op == UnaryOp::Not {
                        u.write(" ");
                    }
                    u.expr(operand, op_precedence);
                });
            }
            Expr::Lambda { args, body } => {
                self.delimit_if("(", ")", precedence > Precedence::TEST, |u| {
                    u.write("lambda");
                    if !args.is_empty() {
                        u.write(" ");
                        u.arguments(args);
                    }
                    u.write(": ");
                    u.expr(body, Precedence::TEST);
                });
            }
            Expr::IfExp { test, body, orelse } => {
                self.delimit_if("(", ")", precedence > Precedence::TEST, |u| {
                    u.expr(body, Precedence::TEST.next());
                    u.write(" if ");
                    u.expr(test, Precedence::TEST.next());
                    u.write(" else ");
                    u.expr(orelse, Precedence::TEST);
                });
            }
            Expr::Dict { keys, values } => {
                self.write("{");
                for (i, (key, value)) in keys.iter().zip(values.iter()).enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    match key {
                        Some(key) => {
                            self.expr(key, Precedence::TEST);
                            self.write(": ");
                            self.expr(value, Precedence::TEST);
                        }
                        None => {
                            self.write("**");
                            self.expr(value, Precedence::EXPR);
                        }
                    }
                }
                self.write("}");
            }
            Expr::Set { elts } => {
                if elts.is_empty() {
                    self.write("{*()}");
                } else {
                    self.write("{");
                    self.interleave(elts, Precedence::TEST);
                    self.write("}");
                }
            }
            Expr::ListComp { elt, generators } => {
                self.write("[");
                self.expr(elt, Precedence::TEST);
                self.comprehensions(generators);
                self.write("]");
            }
            Expr::SetComp { elt, generators } => {
                self.write("{");
                self.expr(elt, Precedence::TEST);
                self.comprehensions(generators);
                self.write("}");
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.write("{");
                self.expr(key, Precedence::TEST);
                self.write(": ");
                self.expr(value, Precedence::TEST);
                self.comprehensions(generators);
                self.write("}");
            }
            Expr::GeneratorExp { elt, generators } => {
                self.write("(");
                self.expr(elt, Precedence::TEST);
                self.comprehensions(generators);
                self.write(")");
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                self.delimit_if("(", ")", precedence > Precedence::CMP, |u| {
                    u.expr(left, Precedence::CMP.next());
                    for (op, comparator) in ops.iter().zip(comparators.iter()) {
                        u.write(&format!(" {} ", op.symbol()));
                        u.expr(comparator, Precedence::CMP.next());
                    }
                });
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func, Precedence::ATOM);
                self.write("(");
                let mut first = true;
                for arg in args {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.expr(arg, Precedence::TEST);
                }
                for keyword in keywords {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    match &keyword.arg {
                        Some(name) => {
                            self.write(name);
                            self.write("=");
                        }
                        None => self.write("**"),
                    }
                    self.expr(&keyword.value, Precedence::TEST);
                }
                self.write(")");
            }
            Expr::JoinedStr { values } => self.joined_str(values),
            Expr::Constant { value } => self.constant(value),
            Expr::Attribute { value, attr } => {
                self.expr(value, Precedence::ATOM);
                // `1.real` would lex as a float
                if let Expr::Constant {
                    value: Constant::Int(_) | Constant::LongInt(_) | Constant::Bool(_),
                } = value.as_ref()
                {
                    self.write(" ");
                }
                self.write(".");
                self.write(attr);
            }
            Expr::Subscript { value, slice } => {
                self.expr(value, Precedence::ATOM);
                self.write("[");
                match slice.as_ref() {
                    Expr::Tuple { elts } if !elts.is_empty() => self.items_view(elts),
                    other => self.expr(other, Precedence::TEST),
                }
                self.write("]");
            }
            Expr::Starred { value } => {
                self.write("*");
                self.expr(value, Precedence::EXPR);
            }
            Expr::Name { id } => self.write(id),
            Expr::List { elts } => {
                self.write("[");
                self.interleave(elts, Precedence::TEST);
                self.write("]");
            }
            Expr::Tuple { elts } => {
                let delimit = elts.is_empty() || precedence > Precedence::TUPLE;
                self.delimit_if("(", ")", delimit, |u| u.items_view(elts));
            }
            Expr::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    self.expr(lower, Precedence::TEST);
                }
                self.write(":");
                if let Some(upper) = upper {
                    self.expr(upper, Precedence::TEST);
                }
                if let Some(step) = step {
                    self.write(":");
                    self.expr(step, Precedence::TEST);
                }
            }
        }
    }

    fn joined_str(&mut self, parts: &[FStringPart]) {
        let rendered: Vec<Option<String>> = parts
            .iter()
            .map(|part| match part {
                FStringPart::Literal(_) => None,
                FStringPart::Formatted { value, .. } => {
                    let mut inner = Unparser::default();
                    inner.expr(value, Precedence::TEST.next());
                    Some(inner.out)
                }
            })
            .collect();

        let quote = ["'", "\"", "'''", "\"\"\""]
            .into_iter()
            .find(|q| rendered.iter().flatten().all(|text| !text.contains(q)))
            .unwrap_or("'");
        let quote_char = quote.chars().next().unwrap_or('\'');

        self.write("f");
        self.write(quote);
        for (part, text) in parts.iter().zip(rendered) {
            match (part, text) {
                (FStringPart::Literal(literal), _) => {
                    for c in literal.chars() {
                        match c {
                            '{' => self.write("{{"),
                            '}' => self.write("}}"),
                            '\\' => self.write("\\\\"),
                            '\n' => self.write("\\n"),
                            '\r' => self.write("\\r"),
                            '\t' => self.write("\\t"),
                            c if c == quote_char => {
                                self.out.push('\\');
                                self.out.push(c);
                            }
                            c if is_printable(c) => self.out.push(c),
                            c => self.write(&format!("\\u{:04x}", c as u32)),
                        }
                    }
                }
                (
                    FStringPart::Formatted {
                        conversion,
                        format_spec,
                        ..
                    },
                    Some(text),
                ) => {
                    self.write("{");
                    if text.starts_with('{') {
                        self.write(" ");
                    }
                    self.write(&text);
                    if let Some(conversion) = conversion {
                        self.out.push('!');
                        self.out.push(*conversion);
                    }
                    if let Some(spec) = format_spec {
                        self.write(":");
                        self.write(spec);
                    }
                    self.write("}");
                }
                (FStringPart::Formatted { .. }, None) => {}
            }
        }
        self.write(quote);
    }
}
