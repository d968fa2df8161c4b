//! One-based indexing rewrite.
//!
//! Every subscript becomes a runtime dispatch: lists, tuples and strings get
//! the index shifted down by one (negative indices are left alone and an index
//! of zero raises `ZeroDivisionError`), anything else is indexed as before.
//! Subscript assignments turn into an `if isinstance(...)` statement because a
//! conditional expression cannot be an assignment target.
//!
//! Attribute access is whitelisted. Methods that never take a position pass
//! through, `pop(i)` and `index(x)` are wrapped so the receiver is evaluated
//! once and only sequences see the shift, and every other attribute on a
//! sequence fails at runtime with `IndexError` instead of silently keeping
//! zero-based meaning.
//!
//! Rewritten programs are prefixed with [`PRELUDE`], which makes `range(n)`
//! and `enumerate(x)` start counting at 1.

use tracing::debug;

use super::parents::ParentMap;
use super::review::ReviewList;
use super::{TransformError, TransformResult, TransformationRule};
use crate::ast::{
    Arguments, CmpOp, Comprehension, ExceptHandler, Expr, FStringPart, FunctionDef, Keyword,
    Module, Operator, Stmt, ToSource,
};
use crate::parser::parse_program;

pub const PRELUDE: &str = "\
old_enumerate = enumerate
# implicitly asserting that the user can't use this start= kwargs
enumerate = lambda x: old_enumerate(x, start=1)
old_range = range
range = lambda *args: old_range(1, args[0]) if len(args) == 1 else old_range(*args)
";

/// Methods that never take or return a position
const POSITION_FREE_METHODS: [&str; 19] = [
    "append", "extend", "join", "clear", "split", "lower", "upper", "islower", "isupper",
    "isdigit", "isalpha", "swapcase", "sort", "remove", "count", "replace", "reverse", "encode",
    "strip",
];

const RECEIVER: &str = "__recv";
const ARGUMENT: &str = "__antwnc";

pub struct OneBasedIndexing;

impl TransformationRule for OneBasedIndexing {
    fn name(&self) -> &'static str {
        "one_based_indexing"
    }

    fn description(&self) -> &'static str {
        "Shifts sequence indices, slices, pop() and index() to count from 1"
    }

    fn transform(&self, module: &Module) -> TransformResult<Module> {
        let parents = ParentMap::build(module);
        debug!(nodes = parents.len(), "built parent map");
        let rewriter = Rewriter { parents };
        Ok(Module::new(rewriter.block(&module.body)?))
    }
}

/// Rewrite program text, checking the result against the built-in review list
pub fn rewrite_for_one_based_indexing(program: &str) -> TransformResult<String> {
    rewrite_with_review(program, &ReviewList::default())
}

pub fn rewrite_with_review(program: &str, reviewed: &ReviewList) -> TransformResult<String> {
    let module = parse_program(program)?;
    let rewritten = OneBasedIndexing.transform(&module)?.to_source();
    let program = format!("{PRELUDE}{rewritten}");
    reviewed.check(&program)?;
    debug!(bytes = program.len(), "rewrote program for one-based indexing");
    Ok(program)
}

/// `index - (1 if index > 0 else 0 if index < 0 else 1 / 0)`
pub fn shift_index(index: Expr) -> Expr {
    let zero_fault = Expr::binop(Expr::int(1), Operator::Div, Expr::int(0));
    let adjustment = Expr::if_exp(
        Expr::compare(index.clone(), CmpOp::Gt, Expr::int(0)),
        Expr::int(1),
        Expr::if_exp(
            Expr::compare(index.clone(), CmpOp::Lt, Expr::int(0)),
            Expr::int(0),
            zero_fault,
        ),
    );
    Expr::binop(index, Operator::Sub, adjustment)
}

/// Shift both bounds of a slice, or the index itself; the step keeps its meaning
fn shift_slice(slice: &Expr) -> Expr {
    match slice {
        Expr::Slice { lower, upper, step } => Expr::Slice {
            lower: lower.as_ref().map(|bound| Box::new(shift_index((**bound).clone()))),
            upper: upper.as_ref().map(|bound| Box::new(shift_index((**bound).clone()))),
            step: step.clone(),
        },
        index => shift_index(index.clone()),
    }
}

/// `isinstance(value, (list, tuple, str))`
fn is_sequence(value: Expr) -> Expr {
    let kinds = Expr::tuple(vec![Expr::name("list"), Expr::name("tuple"), Expr::name("str")]);
    Expr::call(Expr::name("isinstance"), vec![value, kinds])
}

fn check_index_kind(slice: &Expr) -> TransformResult<()> {
    match slice {
        Expr::Constant { .. }
        | Expr::UnaryOp { .. }
        | Expr::BinOp { .. }
        | Expr::Name { .. }
        | Expr::Subscript { .. }
        | Expr::IfExp { .. }
        | Expr::Slice { .. } => Ok(()),
        other => Err(TransformError::Unsupported(format!(
            "{} used as a subscript index",
            other.kind_name()
        ))),
    }
}

/// `(lambda __recv: (wrapped) if isinstance(__recv, ...) else __recv.method)(receiver)`
fn deferred_method(receiver: Expr, method: &str, wrapped: Expr) -> Expr {
    let bound = Expr::attribute(Expr::name(RECEIVER), method);
    let dispatch = Expr::if_exp(is_sequence(Expr::name(RECEIVER)), wrapped, bound);
    Expr::call(Expr::lambda(&[RECEIVER], dispatch), vec![receiver])
}

struct Rewriter<'a> {
    parents: ParentMap<'a>,
}

impl<'a> Rewriter<'a> {
    fn block(&self, body: &'a [Stmt]) -> TransformResult<Vec<Stmt>> {
        body.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn exprs(&self, exprs: &'a [Expr]) -> TransformResult<Vec<Expr>> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    fn optional(&self, expr: &'a Option<Expr>) -> TransformResult<Option<Expr>> {
        expr.as_ref().map(|expr| self.expr(expr)).transpose()
    }

    fn boxed(&self, expr: &'a Expr) -> TransformResult<Box<Expr>> {
        Ok(Box::new(self.expr(expr)?))
    }

    fn stmt(&self, stmt: &'a Stmt) -> TransformResult<Stmt> {
        let rewritten = match stmt {
            Stmt::FunctionDef(def) => Stmt::FunctionDef(FunctionDef {
                name: def.name.clone(),
                args: self.arguments(&def.args)?,
                body: self.block(&def.body)?,
                decorator_list: self.exprs(&def.decorator_list)?,
                returns: self.optional(&def.returns)?,
            }),
            Stmt::Return { value } => Stmt::Return {
                value: self.optional(value)?,
            },
            Stmt::Assign { targets, value } => {
                if !targets.iter().any(|target| matches!(target, Expr::Subscript { .. })) {
                    return Ok(Stmt::Assign {
                        targets: targets
                            .iter()
                            .map(|target| self.target(target))
                            .collect::<TransformResult<_>>()?,
                        value: self.expr(value)?,
                    });
                }
                let [Expr::Subscript {
                    value: container,
                    slice,
                }] = targets.as_slice()
                else {
                    return Err(TransformError::NotImplemented(
                        "assignment with more than one target".to_string(),
                    ));
                };
                self.subscript_store(container, slice, value, |target, value| Stmt::Assign {
                    targets: vec![target],
                    value,
                })?
            }
            Stmt::AugAssign { target, op, value } => match target {
                Expr::Subscript {
                    value: container,
                    slice,
                } => {
                    let op = *op;
                    self.subscript_store(container, slice, value, |target, value| {
                        Stmt::AugAssign { target, op, value }
                    })?
                }
                other => Stmt::AugAssign {
                    target: self.target(other)?,
                    op: *op,
                    value: self.expr(value)?,
                },
            },
            Stmt::AnnAssign {
                target,
                annotation,
                value,
                simple,
            } => Stmt::AnnAssign {
                target: self.target(target)?,
                annotation: self.expr(annotation)?,
                value: self.optional(value)?,
                simple: *simple,
            },
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => Stmt::For {
                target: self.target(target)?,
                iter: self.expr(iter)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            Stmt::While { test, body, orelse } => Stmt::While {
                test: self.expr(test)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            Stmt::If { test, body, orelse } => Stmt::If {
                test: self.expr(test)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => Stmt::Try {
                body: self.block(body)?,
                handlers: handlers
                    .iter()
                    .map(|handler| {
                        Ok(ExceptHandler {
                            exc_type: self.optional(&handler.exc_type)?,
                            name: handler.name.clone(),
                            body: self.block(&handler.body)?,
                        })
                    })
                    .collect::<TransformResult<_>>()?,
                orelse: self.block(orelse)?,
                finalbody: self.block(finalbody)?,
            },
            Stmt::Raise { exc, cause } => Stmt::Raise {
                exc: self.optional(exc)?,
                cause: self.optional(cause)?,
            },
            Stmt::Assert { test, msg } => Stmt::Assert {
                test: self.expr(test)?,
                msg: self.optional(msg)?,
            },
            Stmt::Delete { targets } => Stmt::Delete {
                targets: targets
                    .iter()
                    .map(|target| self.target(target))
                    .collect::<TransformResult<_>>()?,
            },
            Stmt::Expr { value } => Stmt::Expr {
                value: self.expr(value)?,
            },
            other @ (Stmt::Import { .. }
            | Stmt::ImportFrom { .. }
            | Stmt::Global { .. }
            | Stmt::Nonlocal { .. }
            | Stmt::Pass
            | Stmt::Break
            | Stmt::Continue) => other.clone(),
        };
        Ok(rewritten)
    }

    /// `if isinstance(c, ...): <shifted store> else: <original store>`
    fn subscript_store<F>(
        &self,
        container: &'a Expr,
        slice: &'a Expr,
        value: &'a Expr,
        store: F,
    ) -> TransformResult<Stmt>
    where
        F: Fn(Expr, Expr) -> Stmt,
    {
        check_index_kind(slice)?;
        let container = self.expr(container)?;
        let slice = self.expr(slice)?;
        let value = self.expr(value)?;
        let shifted = Expr::subscript(container.clone(), shift_slice(&slice));
        let original = Expr::subscript(container.clone(), slice);
        Ok(Stmt::If {
            test: is_sequence(container),
            body: vec![store(shifted, value.clone())],
            orelse: vec![store(original, value)],
        })
    }

    /// Only plain subscript targets of `=` and `op=` can be dispatched, so a
    /// subscript anywhere else is refused.
    fn target(&self, target: &'a Expr) -> TransformResult<Expr> {
        match target {
            Expr::Name { .. } => Ok(target.clone()),
            Expr::Tuple { elts } => Ok(Expr::Tuple {
                elts: elts
                    .iter()
                    .map(|elt| self.target(elt))
                    .collect::<TransformResult<_>>()?,
            }),
            Expr::List { elts } => Ok(Expr::List {
                elts: elts
                    .iter()
                    .map(|elt| self.target(elt))
                    .collect::<TransformResult<_>>()?,
            }),
            Expr::Starred { value } => Ok(Expr::Starred {
                value: Box::new(self.target(value)?),
            }),
            Expr::Subscript { .. } => Err(TransformError::Unsupported(
                "subscript in a loop, unpacking, annotated or del target".to_string(),
            )),
            other => self.expr(other),
        }
    }

    fn arguments(&self, args: &'a Arguments) -> TransformResult<Arguments> {
        let mut rewritten = args.clone();
        rewritten.defaults = self.exprs(&args.defaults)?;
        rewritten.kw_defaults = args
            .kw_defaults
            .iter()
            .map(|default| self.optional(default))
            .collect::<TransformResult<_>>()?;
        let params = rewritten
            .posonlyargs
            .iter_mut()
            .chain(rewritten.args.iter_mut())
            .chain(rewritten.vararg.iter_mut())
            .chain(rewritten.kwonlyargs.iter_mut())
            .chain(rewritten.kwarg.iter_mut());
        let originals = args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.vararg)
            .chain(&args.kwonlyargs)
            .chain(&args.kwarg);
        for (param, original) in params.zip(originals) {
            param.annotation = self.optional(&original.annotation)?;
        }
        Ok(rewritten)
    }

    fn generators(&self, generators: &'a [Comprehension]) -> TransformResult<Vec<Comprehension>> {
        generators
            .iter()
            .map(|generator| {
                Ok(Comprehension {
                    target: self.target(&generator.target)?,
                    iter: self.expr(&generator.iter)?,
                    ifs: self.exprs(&generator.ifs)?,
                })
            })
            .collect()
    }

    fn expr(&self, expr: &'a Expr) -> TransformResult<Expr> {
        let rewritten = match expr {
            Expr::Subscript { value, slice } => {
                check_index_kind(slice)?;
                let container = self.expr(value)?;
                let slice = self.expr(slice)?;
                let shifted = Expr::subscript(container.clone(), shift_slice(&slice));
                let original = Expr::subscript(container.clone(), slice);
                Expr::if_exp(is_sequence(container), shifted, original)
            }
            Expr::Attribute { value, attr } => self.attribute(expr, value, attr)?,
            Expr::BoolOp { op, values } => Expr::BoolOp {
                op: *op,
                values: self.exprs(values)?,
            },
            Expr::BinOp { left, op, right } => Expr::BinOp {
                left: self.boxed(left)?,
                op: *op,
                right: self.boxed(right)?,
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: self.boxed(operand)?,
            },
            Expr::Lambda { args, body } => Expr::Lambda {
                args: Box::new(self.arguments(args)?),
                body: self.boxed(body)?,
            },
            Expr::IfExp { test, body, orelse } => Expr::IfExp {
                test: self.boxed(test)?,
                body: self.boxed(body)?,
                orelse: self.boxed(orelse)?,
            },
            Expr::Dict { keys, values } => Expr::Dict {
                keys: keys
                    .iter()
                    .map(|key| self.optional(key))
                    .collect::<TransformResult<_>>()?,
                values: self.exprs(values)?,
            },
            Expr::Set { elts } => Expr::Set {
                elts: self.exprs(elts)?,
            },
            Expr::List { elts } => Expr::List {
                elts: self.exprs(elts)?,
            },
            Expr::Tuple { elts } => Expr::Tuple {
                elts: self.exprs(elts)?,
            },
            Expr::ListComp { elt, generators } => Expr::ListComp {
                elt: self.boxed(elt)?,
                generators: self.generators(generators)?,
            },
            Expr::SetComp { elt, generators } => Expr::SetComp {
                elt: self.boxed(elt)?,
                generators: self.generators(generators)?,
            },
            Expr::GeneratorExp { elt, generators } => Expr::GeneratorExp {
                elt: self.boxed(elt)?,
                generators: self.generators(generators)?,
            },
            Expr::DictComp {
                key,
                value,
                generators,
            } => Expr::DictComp {
                key: self.boxed(key)?,
                value: self.boxed(value)?,
                generators: self.generators(generators)?,
            },
            Expr::Compare {
                left,
                ops,
                comparators,
            } => Expr::Compare {
                left: self.boxed(left)?,
                ops: ops.clone(),
                comparators: self.exprs(comparators)?,
            },
            Expr::Call {
                func,
                args,
                keywords,
            } => Expr::Call {
                func: self.boxed(func)?,
                args: self.exprs(args)?,
                keywords: keywords
                    .iter()
                    .map(|keyword| {
                        Ok(Keyword {
                            arg: keyword.arg.clone(),
                            value: self.expr(&keyword.value)?,
                        })
                    })
                    .collect::<TransformResult<_>>()?,
            },
            Expr::JoinedStr { values } => Expr::JoinedStr {
                values: values
                    .iter()
                    .map(|part| match part {
                        FStringPart::Formatted {
                            value,
                            conversion,
                            format_spec,
                        } => Ok(FStringPart::Formatted {
                            value: self.boxed(value)?,
                            conversion: *conversion,
                            format_spec: format_spec.clone(),
                        }),
                        literal => Ok(literal.clone()),
                    })
                    .collect::<TransformResult<_>>()?,
            },
            Expr::Starred { value } => Expr::Starred {
                value: self.boxed(value)?,
            },
            Expr::Slice { lower, upper, step } => Expr::Slice {
                lower: lower.as_deref().map(|e| self.boxed(e)).transpose()?,
                upper: upper.as_deref().map(|e| self.boxed(e)).transpose()?,
                step: step.as_deref().map(|e| self.boxed(e)).transpose()?,
            },
            Expr::Constant { .. } | Expr::Name { .. } => expr.clone(),
        };
        Ok(rewritten)
    }

    /// Number of positional arguments of the call this attribute is invoked by
    fn call_arity(&self, node: &Expr, attr: &str) -> TransformResult<usize> {
        self.parents
            .enclosing_call_args(node)
            .map(<[Expr]>::len)
            .ok_or_else(|| {
                TransformError::Unsupported(format!("`.{attr}` used without calling it"))
            })
    }

    fn attribute(&self, node: &'a Expr, value: &'a Expr, attr: &str) -> TransformResult<Expr> {
        let receiver = self.expr(value)?;
        if POSITION_FREE_METHODS.contains(&attr) {
            return Ok(Expr::attribute(receiver, attr));
        }
        match attr {
            "startswith" | "endswith" => match self.call_arity(node, attr)? {
                1 => Ok(Expr::attribute(receiver, attr)),
                _ => Err(TransformError::Unsupported(format!(
                    "`.{attr}` with start/end positions"
                ))),
            },
            "pop" => match self.call_arity(node, attr)? {
                0 => Ok(Expr::attribute(receiver, attr)),
                1 => {
                    let shifted = Expr::call(
                        Expr::attribute(Expr::name(RECEIVER), "pop"),
                        vec![shift_index(Expr::name(ARGUMENT))],
                    );
                    Ok(deferred_method(receiver, "pop", Expr::lambda(&[ARGUMENT], shifted)))
                }
                n => Err(TransformError::Unsupported(format!(
                    "`.pop` with {n} arguments"
                ))),
            },
            "index" => match self.call_arity(node, attr)? {
                1 => {
                    let found = Expr::call(
                        Expr::attribute(Expr::name(RECEIVER), "index"),
                        vec![Expr::name(ARGUMENT)],
                    );
                    let plus_one = Expr::binop(found, Operator::Add, Expr::int(1));
                    Ok(deferred_method(receiver, "index", Expr::lambda(&[ARGUMENT], plus_one)))
                }
                _ => Err(TransformError::Unsupported(
                    "`.index` with start/end positions".to_string(),
                )),
            },
            _ => {
                let fault = Expr::subscript(Expr::list(Vec::new()), Expr::int(1));
                let guarded = Expr::if_exp(is_sequence(receiver.clone()), fault, receiver);
                Ok(Expr::attribute(guarded, attr))
            }
        }
    }
}
