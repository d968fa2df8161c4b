//! Parent links for a borrowed syntax tree.
//!
//! Built once per rewrite pass and consulted read-only. Nodes are identified by
//! address, so the map is only meaningful for the tree it was built from.

use std::collections::HashMap;

use crate::ast::{Arguments, Expr, FStringPart, Module, Stmt};

#[derive(Debug, Clone, Copy)]
pub enum Parent<'a> {
    Expr(&'a Expr),
    Stmt(&'a Stmt),
}

#[derive(Debug, Default)]
pub struct ParentMap<'a> {
    parents: HashMap<*const Expr, Parent<'a>>,
}

impl<'a> ParentMap<'a> {
    pub fn build(module: &'a Module) -> Self {
        let mut map = Self::default();
        for stmt in &module.body {
            map.visit_stmt(stmt);
        }
        map
    }

    pub fn parent(&self, expr: &Expr) -> Option<Parent<'a>> {
        self.parents.get(&(expr as *const Expr)).copied()
    }

    /// Positional arguments of the call `expr` sits directly inside
    pub fn enclosing_call_args(&self, expr: &Expr) -> Option<&'a [Expr]> {
        match self.parent(expr)? {
            Parent::Expr(Expr::Call { args, .. }) => Some(args.as_slice()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    fn record(&mut self, child: &'a Expr, parent: Parent<'a>) {
        self.parents.insert(child as *const Expr, parent);
        self.visit_expr(child);
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        let parent = Parent::Stmt(stmt);
        for child in stmt_exprs(stmt) {
            self.record(child, parent);
        }
        for nested in nested_blocks(stmt) {
            for inner in nested {
                self.visit_stmt(inner);
            }
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        let parent = Parent::Expr(expr);
        for child in expr_children(expr) {
            self.record(child, parent);
        }
    }
}

fn argument_exprs(args: &Arguments) -> impl Iterator<Item = &Expr> {
    let annotations = args
        .posonlyargs
        .iter()
        .chain(&args.args)
        .chain(&args.vararg)
        .chain(&args.kwonlyargs)
        .chain(&args.kwarg)
        .filter_map(|arg| arg.annotation.as_ref());
    args.defaults
        .iter()
        .chain(args.kw_defaults.iter().flatten())
        .chain(annotations)
}

/// Expressions owned directly by a statement, excluding nested blocks
fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::FunctionDef(def) => def
            .decorator_list
            .iter()
            .chain(argument_exprs(&def.args))
            .chain(&def.returns)
            .collect(),
        Stmt::Return { value } => value.iter().collect(),
        Stmt::Assign { targets, value } => targets.iter().chain([value]).collect(),
        Stmt::AugAssign { target, value, .. } => vec![target, value],
        Stmt::AnnAssign {
            target,
            annotation,
            value,
            ..
        } => [target, annotation].into_iter().chain(value).collect(),
        Stmt::For { target, iter, .. } => vec![target, iter],
        Stmt::While { test, .. } | Stmt::If { test, .. } => vec![test],
        Stmt::Try { handlers, .. } => handlers
            .iter()
            .filter_map(|handler| handler.exc_type.as_ref())
            .collect(),
        Stmt::Raise { exc, cause } => exc.iter().chain(cause).collect(),
        Stmt::Assert { test, msg } => [test].into_iter().chain(msg).collect(),
        Stmt::Delete { targets } => targets.iter().collect(),
        Stmt::Expr { value } => vec![value],
        Stmt::Import { .. }
        | Stmt::ImportFrom { .. }
        | Stmt::Global { .. }
        | Stmt::Nonlocal { .. }
        | Stmt::Pass
        | Stmt::Break
        | Stmt::Continue => Vec::new(),
    }
}

fn nested_blocks(stmt: &Stmt) -> Vec<&[Stmt]> {
    match stmt {
        Stmt::FunctionDef(def) => vec![def.body.as_slice()],
        Stmt::For { body, orelse, .. }
        | Stmt::While { body, orelse, .. }
        | Stmt::If { body, orelse, .. } => vec![body.as_slice(), orelse.as_slice()],
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let mut blocks = vec![body.as_slice()];
            blocks.extend(handlers.iter().map(|handler| handler.body.as_slice()));
            blocks.push(orelse.as_slice());
            blocks.push(finalbody.as_slice());
            blocks
        }
        _ => Vec::new(),
    }
}

fn expr_children(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BoolOp { values, .. } => values.iter().collect(),
        Expr::BinOp { left, right, .. } => vec![&**left, &**right],
        Expr::UnaryOp { operand, .. } => vec![&**operand],
        Expr::Lambda { args, body } => argument_exprs(args).chain([&**body]).collect(),
        Expr::IfExp { test, body, orelse } => vec![&**test, &**body, &**orelse],
        Expr::Dict { keys, values } => keys.iter().flatten().chain(values).collect(),
        Expr::Set { elts } | Expr::List { elts } | Expr::Tuple { elts } => elts.iter().collect(),
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            let mut children = vec![&**elt];
            for generator in generators {
                children.extend([&generator.target, &generator.iter]);
                children.extend(&generator.ifs);
            }
            children
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            let mut children = vec![&**key, &**value];
            for generator in generators {
                children.extend([&generator.target, &generator.iter]);
                children.extend(&generator.ifs);
            }
            children
        }
        Expr::Compare {
            left, comparators, ..
        } => [&**left].into_iter().chain(comparators).collect(),
        Expr::Call {
            func,
            args,
            keywords,
        } => [&**func]
            .into_iter()
            .chain(args)
            .chain(keywords.iter().map(|keyword| &keyword.value))
            .collect(),
        Expr::JoinedStr { values } => values
            .iter()
            .filter_map(|part| match part {
                FStringPart::Formatted { value, .. } => Some(&**value),
                FStringPart::Literal(_) => None,
            })
            .collect(),
        Expr::Attribute { value, .. } | Expr::Starred { value } => vec![&**value],
        Expr::Subscript { value, slice } => vec![&**value, &**slice],
        Expr::Slice { lower, upper, step } => lower
            .iter()
            .chain(upper)
            .chain(step)
            .map(|bound| &**bound)
            .collect(),
        Expr::Constant { .. } | Expr::Name { .. } => Vec::new(),
    }
}
