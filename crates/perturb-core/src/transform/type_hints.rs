// Removal of static type annotations.
// Parameter and return annotations go away, `x: T` declarations are dropped,
// `x: T = v` becomes `x = v` and `typing` imports disappear. Blocks emptied
// by the removal get a `pass` so the output stays valid Python.

use tracing::debug;

use super::{TransformResult, TransformationRule};
use crate::ast::{Arguments, ExceptHandler, FunctionDef, Module, Stmt};

pub struct TypeHintRemover;

impl TransformationRule for TypeHintRemover {
    fn name(&self) -> &'static str {
        "remove_type_hints"
    }

    fn description(&self) -> &'static str {
        "Drops parameter, return and variable annotations plus typing imports"
    }

    fn transform(&self, module: &Module) -> TransformResult<Module> {
        let body = strip_block(&module.body);
        debug!(
            before = module.body.len(),
            after = body.len(),
            "removed type hints"
        );
        Ok(Module::new(body))
    }
}

/// Strip the annotations from program text
pub fn remove_type_hints(program: &str) -> TransformResult<String> {
    TypeHintRemover.transform_source(program)
}

fn strip_block(body: &[Stmt]) -> Vec<Stmt> {
    body.iter().filter_map(strip_stmt).collect()
}

/// A nested block may not end up empty
fn strip_nested(body: &[Stmt]) -> Vec<Stmt> {
    let stripped = strip_block(body);
    if stripped.is_empty() && !body.is_empty() {
        vec![Stmt::Pass]
    } else {
        stripped
    }
}

fn strip_arguments(args: &Arguments) -> Arguments {
    let mut args = args.clone();
    let params = args
        .posonlyargs
        .iter_mut()
        .chain(args.args.iter_mut())
        .chain(args.vararg.iter_mut())
        .chain(args.kwonlyargs.iter_mut())
        .chain(args.kwarg.iter_mut());
    for param in params {
        param.annotation = None;
    }
    args
}

fn strip_stmt(stmt: &Stmt) -> Option<Stmt> {
    let stripped = match stmt {
        Stmt::FunctionDef(def) => Stmt::FunctionDef(FunctionDef {
            name: def.name.clone(),
            args: strip_arguments(&def.args),
            body: strip_nested(&def.body),
            decorator_list: def.decorator_list.clone(),
            returns: None,
        }),
        Stmt::AnnAssign { value: None, .. } => return None,
        Stmt::AnnAssign {
            target,
            value: Some(value),
            ..
        } => Stmt::Assign {
            targets: vec![target.clone()],
            value: value.clone(),
        },
        Stmt::Import { names } => {
            let names: Vec<_> = names
                .iter()
                .filter(|alias| alias.name != "typing")
                .cloned()
                .collect();
            if names.is_empty() {
                return None;
            }
            Stmt::Import { names }
        }
        Stmt::ImportFrom {
            module: Some(module),
            ..
        } if module == "typing" => return None,
        Stmt::For {
            target,
            iter,
            body,
            orelse,
        } => Stmt::For {
            target: target.clone(),
            iter: iter.clone(),
            body: strip_nested(body),
            orelse: strip_block(orelse),
        },
        Stmt::While { test, body, orelse } => Stmt::While {
            test: test.clone(),
            body: strip_nested(body),
            orelse: strip_block(orelse),
        },
        Stmt::If { test, body, orelse } => Stmt::If {
            test: test.clone(),
            body: strip_nested(body),
            orelse: strip_block(orelse),
        },
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => Stmt::Try {
            body: strip_nested(body),
            handlers: handlers
                .iter()
                .map(|handler| ExceptHandler {
                    exc_type: handler.exc_type.clone(),
                    name: handler.name.clone(),
                    body: strip_nested(&handler.body),
                })
                .collect(),
            orelse: strip_block(orelse),
            finalbody: strip_nested(finalbody),
        },
        other => other.clone(),
    };
    Some(stripped)
}
