//! In-process runtime for the Python subset.
//!
//! The evaluator hands every generated program to a fresh [`Interpreter`].
//! Each interpreter owns its own global scope, so nothing a program defines
//! leaks into the next run. `print` output is captured in a buffer instead
//! of reaching the process stdout.

pub mod builtins;
pub mod errors;
pub mod format;
pub mod hash;
pub mod methods;
pub mod ops;
pub mod set;
pub mod value;

#[cfg(test)]
mod tests;

use std::{collections::HashSet, rc::Rc};

use tracing::trace;

use crate::ast::{Arguments, Comprehension, Expr, FStringPart, Module, Stmt};
use crate::PerturbConfig;

pub use errors::{ExceptionKind, PyException};
use ops::{Index, SliceBounds};
use value::{
    Dict, ExceptionObject, Function, FunctionBody, IteratorState, Range, Scope, ScopeKind,
    ScopeRef, Set,
};
pub use value::Value;

pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

/// `__name__` of the program module; never `"__main__"`, so script guards
/// in solutions stay silent
pub const MODULE_NAME: &str = "solution";

/// How a block finished
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Walks a `for` loop's iterable without materializing lists or ranges, so
/// appends made by the loop body are observed like in CPython.
enum Cursor {
    List(Rc<std::cell::RefCell<Vec<Value>>>, usize),
    Range(Range, usize),
    Iter(Rc<std::cell::RefCell<IteratorState>>),
    Items(std::vec::IntoIter<Value>),
}

impl Cursor {
    fn new(iterable: &Value) -> Result<Self, PyException> {
        let cursor = match iterable {
            Value::List(items) => Cursor::List(items.clone(), 0),
            Value::Range(range) => Cursor::Range(*range, 0),
            Value::Iterator(state) => Cursor::Iter(state.clone()),
            other => Cursor::Items(ops::iterate(other)?.into_iter()),
        };
        Ok(cursor)
    }
}

impl Iterator for Cursor {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Cursor::List(items, position) => {
                let item = items.borrow().get(*position).cloned();
                *position += 1;
                item
            }
            Cursor::Range(range, position) => {
                if *position >= range.len() {
                    return None;
                }
                let item = Value::Int(range.get(*position));
                *position += 1;
                Some(item)
            }
            Cursor::Iter(state) => state.borrow_mut().items.pop_front(),
            Cursor::Items(items) => items.next(),
        }
    }
}

type ComprehensionSink<'s> = dyn FnMut(&mut Interpreter, &ScopeRef) -> Result<(), PyException> + 's;

pub struct Interpreter {
    globals: ScopeRef,
    output: String,
    depth: usize,
    recursion_limit: usize,
    /// Exceptions whose `except` handlers are currently running; a bare
    /// `raise` re-raises the innermost one.
    handling: Vec<PyException>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_RECURSION_LIMIT)
    }
}

impl Interpreter {
    pub fn new(recursion_limit: usize) -> Self {
        let globals = Scope::module();
        {
            let mut scope = globals.borrow_mut();
            scope.vars.insert("__name__".to_string(), Value::str(MODULE_NAME));
            scope
                .vars
                .insert("__builtins__".to_string(), builtins::builtins_module());
        }
        Self {
            globals,
            output: String::new(),
            depth: 0,
            recursion_limit,
            handling: Vec::new(),
        }
    }

    pub fn from_config(config: &PerturbConfig) -> Self {
        Self::new(config.recursion_limit)
    }

    /// Everything `print` has written so far
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().vars.get(name).cloned()
    }

    pub fn exec_module(&mut self, module: &Module) -> Result<(), PyException> {
        let globals = self.globals.clone();
        trace!(statements = module.body.len(), "executing module");
        self.exec_block(&module.body, &globals)?;
        Ok(())
    }

    /// Evaluate a single expression in the global scope
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, PyException> {
        let globals = self.globals.clone();
        self.eval_expr(expr, &globals)
    }

    /// Call any callable value with positional arguments
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, PyException> {
        self.call_value(func, args, Vec::new())
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    // ---- names ----

    fn lookup(&self, scope: &ScopeRef, name: &str) -> Result<Value, PyException> {
        {
            let current = scope.borrow();
            if current.globals.contains(name) {
                return self.lookup_global(name);
            }
            if current.kind != ScopeKind::Module
                && current.locals.contains(name)
                && !current.nonlocals.contains(name)
            {
                return current.vars.get(name).cloned().ok_or_else(|| {
                    PyException::new(
                        ExceptionKind::UnboundLocalError,
                        format!(
                            "cannot access local variable '{name}' where it is not associated with a value"
                        ),
                    )
                });
            }
            if let Some(value) = current.vars.get(name) {
                return Ok(value.clone());
            }
        }

        let mut next = scope.borrow().parent.clone();
        while let Some(enclosing) = next {
            let enclosing = enclosing.borrow();
            if let Some(value) = enclosing.vars.get(name) {
                return Ok(value.clone());
            }
            next = enclosing.parent.clone();
        }
        builtins::builtin_value(name).ok_or_else(|| PyException::name_error(name))
    }

    fn lookup_global(&self, name: &str) -> Result<Value, PyException> {
        if let Some(value) = self.globals.borrow().vars.get(name) {
            return Ok(value.clone());
        }
        builtins::builtin_value(name).ok_or_else(|| PyException::name_error(name))
    }

    fn assign_name(&mut self, scope: &ScopeRef, name: &str, value: Value) {
        let target = {
            let current = scope.borrow();
            if current.globals.contains(name) {
                Some(self.globals.clone())
            } else if current.nonlocals.contains(name) {
                Self::enclosing_binding(scope, name)
            } else {
                None
            }
        };
        let target = target.unwrap_or_else(|| scope.clone());
        target.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// The nearest enclosing function scope that binds `name`
    fn enclosing_binding(scope: &ScopeRef, name: &str) -> Option<ScopeRef> {
        let mut next = scope.borrow().parent.clone();
        while let Some(enclosing) = next {
            {
                let inner = enclosing.borrow();
                if inner.kind == ScopeKind::Function
                    && (inner.vars.contains_key(name) || inner.locals.contains(name))
                {
                    drop(inner);
                    return Some(enclosing);
                }
            }
            next = enclosing.borrow().parent.clone();
        }
        None
    }

    fn delete_name(&mut self, scope: &ScopeRef, name: &str) -> Result<(), PyException> {
        let target = if scope.borrow().globals.contains(name) {
            self.globals.clone()
        } else {
            scope.clone()
        };
        let removed = target.borrow_mut().vars.remove(name);
        match removed {
            Some(_) => Ok(()),
            None => Err(PyException::name_error(name)),
        }
    }

    // ---- statements ----

    fn exec_block(&mut self, body: &[Stmt], scope: &ScopeRef) -> Result<Flow, PyException> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Result<Flow, PyException> {
        match stmt {
            Stmt::FunctionDef(def) => {
                let mut function = self.make_function(
                    &def.name,
                    &def.args,
                    FunctionBody::Block(def.body.clone()),
                    scope,
                )?;
                for decorator in def.decorator_list.iter().rev() {
                    let decorator = self.eval_expr(decorator, scope)?;
                    function = self.call_value(&decorator, vec![function], Vec::new())?;
                }
                self.assign_name(scope, &def.name, function);
            }
            Stmt::Return { value } => {
                let value = match value {
                    Some(value) => self.eval_expr(value, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval_expr(value, scope)?;
                for target in targets {
                    self.assign_target(target, value.clone(), scope)?;
                }
            }
            Stmt::AugAssign { target, op, value } => {
                self.exec_aug_assign(target, *op, value, scope)?;
            }
            Stmt::AnnAssign { target, value, .. } => {
                if let Some(value) = value {
                    let value = self.eval_expr(value, scope)?;
                    self.assign_target(target, value, scope)?;
                }
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => return self.exec_for(target, iter, body, orelse, scope),
            Stmt::While { test, body, orelse } => {
                return self.exec_while(test, body, orelse, scope)
            }
            Stmt::If { test, body, orelse } => {
                let branch = if self.eval_expr(test, scope)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, scope),
            Stmt::Raise { exc, cause } => {
                return Err(self.exec_raise(exc.as_ref(), cause.as_ref(), scope)?)
            }
            Stmt::Assert { test, msg } => {
                if !self.eval_expr(test, scope)?.is_truthy() {
                    let exception = match msg {
                        Some(msg) => {
                            let msg = self.eval_expr(msg, scope)?;
                            exception_from_object(ExceptionKind::AssertionError, vec![msg])
                        }
                        None => PyException::new(ExceptionKind::AssertionError, ""),
                    };
                    return Err(exception);
                }
            }
            Stmt::Delete { targets } => {
                for target in targets {
                    self.delete_target(target, scope)?;
                }
            }
            Stmt::Import { names } => {
                for alias in names {
                    let module = builtins::import_module(&alias.name)?;
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    self.assign_name(scope, bound, module);
                }
            }
            Stmt::ImportFrom { module, names, .. } => {
                let module_name = module.as_deref().unwrap_or("");
                let Value::Module(imported) = builtins::import_module(module_name)? else {
                    return Err(PyException::new(
                        ExceptionKind::ImportError,
                        format!("cannot import from '{module_name}'"),
                    ));
                };
                for alias in names {
                    if alias.name == "*" {
                        for (name, value) in &imported.attrs {
                            self.assign_name(scope, name, value.clone());
                        }
                        continue;
                    }
                    let value = imported.attrs.get(&alias.name).cloned().ok_or_else(|| {
                        PyException::new(
                            ExceptionKind::ImportError,
                            format!(
                                "cannot import name '{}' from '{}' (unknown location)",
                                alias.name, imported.name
                            ),
                        )
                    })?;
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    self.assign_name(scope, bound, value);
                }
            }
            // resolved when the enclosing function is created
            Stmt::Global { .. } | Stmt::Nonlocal { .. } | Stmt::Pass => {}
            Stmt::Expr { value } => {
                self.eval_expr(value, scope)?;
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn exec_aug_assign(
        &mut self,
        target: &Expr,
        op: crate::ast::Operator,
        value: &Expr,
        scope: &ScopeRef,
    ) -> Result<(), PyException> {
        match target {
            Expr::Name { id } => {
                let current = self.lookup(scope, id)?;
                let rhs = self.eval_expr(value, scope)?;
                let updated = inplace_op(op, &current, &rhs)?;
                self.assign_name(scope, id, updated);
            }
            Expr::Subscript {
                value: container,
                slice,
            } => {
                let container = self.eval_expr(container, scope)?;
                let index = self.eval_index(slice, scope)?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval_expr(value, scope)?;
                let updated = inplace_op(op, &current, &rhs)?;
                ops::set_item(&container, &index, updated)?;
            }
            Expr::Attribute { value, attr } => {
                let receiver = self.eval_expr(value, scope)?;
                return Err(PyException::attribute_error(receiver.type_name(), attr));
            }
            other => {
                return Err(PyException::type_error(format!(
                    "'{}' is an illegal expression for augmented assignment",
                    other.kind_name()
                )))
            }
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        target: &Expr,
        iter: &Expr,
        body: &[Stmt],
        orelse: &[Stmt],
        scope: &ScopeRef,
    ) -> Result<Flow, PyException> {
        let iterable = self.eval_expr(iter, scope)?;
        for item in Cursor::new(&iterable)? {
            self.assign_target(target, item, scope)?;
            match self.exec_block(body, scope)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        self.exec_block(orelse, scope)
    }

    fn exec_while(
        &mut self,
        test: &Expr,
        body: &[Stmt],
        orelse: &[Stmt],
        scope: &ScopeRef,
    ) -> Result<Flow, PyException> {
        while self.eval_expr(test, scope)?.is_truthy() {
            match self.exec_block(body, scope)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        self.exec_block(orelse, scope)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[crate::ast::ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        scope: &ScopeRef,
    ) -> Result<Flow, PyException> {
        let outcome = match self.exec_block(body, scope) {
            Ok(Flow::Normal) => self.exec_block(orelse, scope),
            Ok(flow) => Ok(flow),
            Err(exception) => self.handle_exception(exception, handlers, scope),
        };
        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, scope)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn handle_exception(
        &mut self,
        exception: PyException,
        handlers: &[crate::ast::ExceptHandler],
        scope: &ScopeRef,
    ) -> Result<Flow, PyException> {
        for handler in handlers {
            if let Some(exc_type) = &handler.exc_type {
                let filter = self.eval_expr(exc_type, scope)?;
                if !exception_matches(&exception, &filter)? {
                    continue;
                }
            }
            if let Some(name) = &handler.name {
                let bound = Value::Exception(Rc::new(ExceptionObject {
                    kind: exception.kind,
                    args: exception.args.clone(),
                }));
                self.assign_name(scope, name, bound);
            }
            self.handling.push(exception);
            let result = self.exec_block(&handler.body, scope);
            self.handling.pop();
            if let Some(name) = &handler.name {
                scope.borrow_mut().vars.remove(name);
            }
            return result;
        }
        Err(exception)
    }

    fn exec_raise(
        &mut self,
        exc: Option<&Expr>,
        cause: Option<&Expr>,
        scope: &ScopeRef,
    ) -> Result<PyException, PyException> {
        let Some(exc) = exc else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| {
                PyException::new(ExceptionKind::RuntimeError, "No active exception to reraise")
            }));
        };
        let raised = self.eval_expr(exc, scope)?;
        if let Some(cause) = cause {
            self.eval_expr(cause, scope)?;
        }
        match raised {
            Value::ExceptionType(kind) => Ok(exception_from_object(kind, Vec::new())),
            Value::Exception(object) => Ok(exception_from_object(object.kind, object.args.clone())),
            _ => Err(PyException::type_error(
                "exceptions must derive from BaseException",
            )),
        }
    }

    fn assign_target(
        &mut self,
        target: &Expr,
        value: Value,
        scope: &ScopeRef,
    ) -> Result<(), PyException> {
        match target {
            Expr::Name { id } => {
                self.assign_name(scope, id, value);
                Ok(())
            }
            Expr::Tuple { elts } | Expr::List { elts } => self.unpack(elts, value, scope),
            Expr::Subscript {
                value: container,
                slice,
            } => {
                let container = self.eval_expr(container, scope)?;
                let index = self.eval_index(slice, scope)?;
                ops::set_item(&container, &index, value)
            }
            Expr::Attribute { value: receiver, attr } => {
                let receiver = self.eval_expr(receiver, scope)?;
                Err(PyException::attribute_error(receiver.type_name(), attr))
            }
            other => Err(PyException::type_error(format!(
                "cannot assign to {}",
                other.kind_name()
            ))),
        }
    }

    fn unpack(&mut self, elts: &[Expr], value: Value, scope: &ScopeRef) -> Result<(), PyException> {
        let items = ops::iterate(&value).map_err(|_| {
            PyException::type_error(format!(
                "cannot unpack non-iterable {} object",
                value.type_name()
            ))
        })?;
        let starred = elts.iter().position(|e| matches!(e, Expr::Starred { .. }));
        match starred {
            None => {
                if items.len() > elts.len() {
                    return Err(PyException::value_error(format!(
                        "too many values to unpack (expected {})",
                        elts.len()
                    )));
                }
                if items.len() < elts.len() {
                    return Err(PyException::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        elts.len(),
                        items.len()
                    )));
                }
                for (target, item) in elts.iter().zip(items) {
                    self.assign_target(target, item, scope)?;
                }
            }
            Some(star) => {
                let fixed = elts.len() - 1;
                if items.len() < fixed {
                    return Err(PyException::value_error(format!(
                        "not enough values to unpack (expected at least {fixed}, got {})",
                        items.len()
                    )));
                }
                let after = elts.len() - star - 1;
                let mut items = items;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(star);
                for (target, item) in elts[..star].iter().zip(items) {
                    self.assign_target(target, item, scope)?;
                }
                if let Expr::Starred { value } = &elts[star] {
                    self.assign_target(value, Value::list(middle), scope)?;
                }
                for (target, item) in elts[star + 1..].iter().zip(tail) {
                    self.assign_target(target, item, scope)?;
                }
            }
        }
        Ok(())
    }

    fn delete_target(&mut self, target: &Expr, scope: &ScopeRef) -> Result<(), PyException> {
        match target {
            Expr::Name { id } => self.delete_name(scope, id),
            Expr::Subscript { value, slice } => {
                let container = self.eval_expr(value, scope)?;
                let index = self.eval_index(slice, scope)?;
                ops::del_item(&container, &index)
            }
            Expr::Tuple { elts } | Expr::List { elts } => {
                for elt in elts {
                    self.delete_target(elt, scope)?;
                }
                Ok(())
            }
            other => Err(PyException::type_error(format!(
                "cannot delete {}",
                other.kind_name()
            ))),
        }
    }

    // ---- expressions ----

    pub(crate) fn eval_expr(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Value, PyException> {
        match expr {
            Expr::BoolOp { op, values } => {
                let mut result = Value::None;
                for value in values {
                    result = self.eval_expr(value, scope)?;
                    let short_circuit = match op {
                        crate::ast::BoolOp::And => !result.is_truthy(),
                        crate::ast::BoolOp::Or => result.is_truthy(),
                    };
                    if short_circuit {
                        break;
                    }
                }
                Ok(result)
            }
            Expr::BinOp { left, op, right } => {
                let left = self.eval_expr(left, scope)?;
                let right = self.eval_expr(right, scope)?;
                ops::binary_op(*op, &left, &right)
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval_expr(operand, scope)?;
                ops::unary_op(*op, &operand)
            }
            Expr::Lambda { args, body } => self.make_function(
                "<lambda>",
                args,
                FunctionBody::Lambda((**body).clone()),
                scope,
            ),
            Expr::IfExp { test, body, orelse } => {
                if self.eval_expr(test, scope)?.is_truthy() {
                    self.eval_expr(body, scope)
                } else {
                    self.eval_expr(orelse, scope)
                }
            }
            Expr::Dict { keys, values } => self.eval_dict(keys, values, scope),
            Expr::Set { elts } => {
                let items = self.eval_elements(elts, scope)?;
                if elts.len() > 2 && elts.iter().all(is_folded_constant) {
                    return Ok(Value::set(Set::from_constants(items)?));
                }
                Ok(Value::set(Set::from_values(items)?))
            }
            Expr::List { elts } => Ok(Value::list(self.eval_elements(elts, scope)?)),
            Expr::Tuple { elts } => Ok(Value::tuple(self.eval_elements(elts, scope)?)),
            Expr::ListComp { elt, generators } => {
                Ok(Value::list(self.collect_comprehension(elt, generators, scope)?))
            }
            Expr::GeneratorExp { elt, generators } => Ok(Value::iterator(
                "generator",
                self.collect_comprehension(elt, generators, scope)?,
            )),
            Expr::SetComp { elt, generators } => {
                let items = self.collect_comprehension(elt, generators, scope)?;
                Ok(Value::set(Set::from_values(items)?))
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => self.eval_dict_comprehension(key, value, generators, scope),
            Expr::Compare {
                left,
                ops: operators,
                comparators,
            } => {
                let mut left = self.eval_expr(left, scope)?;
                for (op, comparator) in operators.iter().zip(comparators) {
                    let right = self.eval_expr(comparator, scope)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => self.eval_call(func, args, keywords, scope),
            Expr::JoinedStr { values } => self.eval_joined_str(values, scope),
            Expr::Constant { value } => Ok(constant_value(value)),
            Expr::Attribute { value, attr } => {
                let receiver = self.eval_expr(value, scope)?;
                self.get_attribute(&receiver, attr)
            }
            Expr::Subscript { value, slice } => {
                let container = self.eval_expr(value, scope)?;
                let index = self.eval_index(slice, scope)?;
                ops::get_item(&container, &index)
            }
            Expr::Name { id } => self.lookup(scope, id),
            Expr::Starred { .. } => Err(PyException::type_error(
                "can't use starred expression here",
            )),
            Expr::Slice { .. } => Err(PyException::type_error(
                "slice expression outside of a subscript",
            )),
        }
    }

    fn eval_index(&mut self, slice: &Expr, scope: &ScopeRef) -> Result<Index, PyException> {
        match slice {
            Expr::Slice { lower, upper, step } => {
                let mut bound = |expr: &Option<Box<Expr>>| -> Result<Option<Value>, PyException> {
                    expr.as_deref()
                        .map(|expr| self.eval_expr(expr, scope))
                        .transpose()
                };
                let lower = bound(lower)?;
                let upper = bound(upper)?;
                let step = bound(step)?;
                Ok(Index::Slice(SliceBounds::from_values(lower, upper, step)?))
            }
            other => Ok(Index::Item(self.eval_expr(other, scope)?)),
        }
    }

    /// Evaluate display elements, expanding `*iterable`
    fn eval_elements(&mut self, elts: &[Expr], scope: &ScopeRef) -> Result<Vec<Value>, PyException> {
        let mut items = Vec::with_capacity(elts.len());
        for elt in elts {
            match elt {
                Expr::Starred { value } => {
                    let iterable = self.eval_expr(value, scope)?;
                    items.extend(ops::iterate(&iterable)?);
                }
                other => items.push(self.eval_expr(other, scope)?),
            }
        }
        Ok(items)
    }

    fn eval_dict(
        &mut self,
        keys: &[Option<Expr>],
        values: &[Expr],
        scope: &ScopeRef,
    ) -> Result<Value, PyException> {
        let mut dict = Dict::new();
        for (key, value) in keys.iter().zip(values) {
            match key {
                Some(key) => {
                    let key = self.eval_expr(key, scope)?;
                    let value = self.eval_expr(value, scope)?;
                    dict.insert(key, value)?;
                }
                None => match self.eval_expr(value, scope)? {
                    Value::Dict(other) => {
                        for (key, value) in other.borrow().items() {
                            dict.insert(key, value)?;
                        }
                    }
                    other => {
                        return Err(PyException::type_error(format!(
                            "'{}' object is not a mapping",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(Value::dict(dict))
    }

    fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        keywords: &[crate::ast::Keyword],
        scope: &ScopeRef,
    ) -> Result<Value, PyException> {
        let callee = self.eval_expr(func, scope)?;
        let positional = self.eval_elements(args, scope)?;
        let mut named = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let value = self.eval_expr(&keyword.value, scope)?;
            match &keyword.arg {
                Some(name) => named.push((name.clone(), value)),
                None => {
                    let Value::Dict(mapping) = value else {
                        return Err(PyException::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            value.type_name()
                        )));
                    };
                    for (key, value) in mapping.borrow().items() {
                        let Value::Str(key) = key else {
                            return Err(PyException::type_error("keywords must be strings"));
                        };
                        named.push((key.to_string(), value));
                    }
                }
            }
        }
        self.call_value(&callee, positional, named)
    }

    fn eval_joined_str(&mut self, parts: &[FStringPart], scope: &ScopeRef) -> Result<Value, PyException> {
        let mut text = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(literal) => text.push_str(literal),
                FStringPart::Formatted {
                    value,
                    conversion,
                    format_spec,
                } => {
                    let value = self.eval_expr(value, scope)?;
                    let value = match conversion {
                        Some('r') | Some('a') => Value::str(format::repr(&value)),
                        Some('s') => Value::str(format::to_str(&value)),
                        _ => value,
                    };
                    let spec = format_spec.as_deref().unwrap_or("");
                    text.push_str(&format::format_value(&value, spec)?);
                }
            }
        }
        Ok(Value::str(text))
    }

    // ---- comprehensions ----

    fn collect_comprehension(
        &mut self,
        elt: &Expr,
        generators: &[Comprehension],
        scope: &ScopeRef,
    ) -> Result<Vec<Value>, PyException> {
        let mut items = Vec::new();
        self.run_comprehension(generators, scope, &mut |interp: &mut Interpreter, inner: &ScopeRef| {
            items.push(interp.eval_expr(elt, inner)?);
            Ok(())
        })?;
        Ok(items)
    }

    fn eval_dict_comprehension(
        &mut self,
        key: &Expr,
        value: &Expr,
        generators: &[Comprehension],
        scope: &ScopeRef,
    ) -> Result<Value, PyException> {
        let mut dict = Dict::new();
        self.run_comprehension(generators, scope, &mut |interp: &mut Interpreter, inner: &ScopeRef| {
            let key = interp.eval_expr(key, inner)?;
            let value = interp.eval_expr(value, inner)?;
            dict.insert(key, value)
        })?;
        Ok(Value::dict(dict))
    }

    /// The first iterable is evaluated in the enclosing scope; targets and
    /// everything else live in a scope of their own.
    fn run_comprehension(
        &mut self,
        generators: &[Comprehension],
        scope: &ScopeRef,
        sink: &mut ComprehensionSink<'_>,
    ) -> Result<(), PyException> {
        let Some(first) = generators.first() else {
            return Ok(());
        };
        let iterable = self.eval_expr(&first.iter, scope)?;
        let mut locals = HashSet::new();
        for generator in generators {
            collect_target_names(&generator.target, &mut locals);
        }
        let inner = Scope::child(ScopeKind::Comprehension, scope.clone(), Rc::new(locals));
        self.comprehension_level(generators, 0, iterable, &inner, sink)
    }

    fn comprehension_level(
        &mut self,
        generators: &[Comprehension],
        level: usize,
        iterable: Value,
        inner: &ScopeRef,
        sink: &mut ComprehensionSink<'_>,
    ) -> Result<(), PyException> {
        let generator = &generators[level];
        'items: for item in Cursor::new(&iterable)? {
            self.assign_target(&generator.target, item, inner)?;
            for condition in &generator.ifs {
                if !self.eval_expr(condition, inner)?.is_truthy() {
                    continue 'items;
                }
            }
            if level + 1 == generators.len() {
                sink(self, inner)?;
            } else {
                let next = self.eval_expr(&generators[level + 1].iter, inner)?;
                self.comprehension_level(generators, level + 1, next, inner, sink)?;
            }
        }
        Ok(())
    }

    // ---- functions ----

    fn make_function(
        &mut self,
        name: &str,
        args: &Arguments,
        body: FunctionBody,
        scope: &ScopeRef,
    ) -> Result<Value, PyException> {
        let mut defaults = Vec::with_capacity(args.defaults.len());
        for default in &args.defaults {
            defaults.push(self.eval_expr(default, scope)?);
        }
        let mut kw_defaults = Vec::with_capacity(args.kw_defaults.len());
        for default in &args.kw_defaults {
            kw_defaults.push(match default {
                Some(default) => Some(self.eval_expr(default, scope)?),
                None => None,
            });
        }

        let mut locals: HashSet<String> = args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.vararg)
            .chain(&args.kwonlyargs)
            .chain(&args.kwarg)
            .map(|arg| arg.arg.clone())
            .collect();
        let mut globals = HashSet::new();
        let mut nonlocals = HashSet::new();
        if let FunctionBody::Block(statements) = &body {
            collect_assigned(statements, &mut locals, &mut globals, &mut nonlocals);
        }
        locals.retain(|name| !globals.contains(name) && !nonlocals.contains(name));

        Ok(Value::Function(Rc::new(Function {
            name: name.to_string(),
            args: args.clone(),
            defaults,
            kw_defaults,
            body,
            closure: scope.clone(),
            locals: Rc::new(locals),
            globals,
            nonlocals,
        })))
    }

    pub(crate) fn call_value(
        &mut self,
        func: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        match func {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(name) => self.call_builtin(name, args, kwargs),
            Value::BoundMethod(method) => {
                self.call_method(&method.receiver, &method.name, args, kwargs)
            }
            Value::MethodDescriptor(owner, name) => {
                let mut args = args.into_iter();
                let receiver = args.next().ok_or_else(|| {
                    PyException::type_error(format!(
                        "unbound method {}.{}() needs an argument",
                        owner.name(),
                        name
                    ))
                })?;
                if !receiver.is_instance_of(*owner) {
                    return Err(PyException::type_error(format!(
                        "descriptor '{}' for '{}' objects doesn't apply to a '{}' object",
                        name,
                        owner.name(),
                        receiver.type_name()
                    )));
                }
                self.call_method(&receiver, name, args.collect(), kwargs)
            }
            Value::Type(kind) => self.construct(*kind, args, kwargs),
            Value::ExceptionType(kind) => {
                if !kwargs.is_empty() {
                    return Err(PyException::type_error(format!(
                        "{}() takes no keyword arguments",
                        kind.name()
                    )));
                }
                Ok(Value::Exception(Rc::new(ExceptionObject { kind: *kind, args })))
            }
            other => Err(PyException::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, PyException> {
        if self.depth >= self.recursion_limit {
            return Err(PyException::new(
                ExceptionKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let scope = Scope::child(
            ScopeKind::Function,
            function.closure.clone(),
            function.locals.clone(),
        );
        {
            let mut frame = scope.borrow_mut();
            frame.globals = function.globals.clone();
            frame.nonlocals = function.nonlocals.clone();
        }
        bind_arguments(function, args, kwargs, &scope)?;

        self.depth += 1;
        let result = match &function.body {
            FunctionBody::Block(body) => self.exec_block(body, &scope).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            FunctionBody::Lambda(body) => self.eval_expr(body, &scope),
        };
        self.depth -= 1;
        result
    }
}

/// Literals the compiler folds into a single constant
fn is_folded_constant(expr: &Expr) -> bool {
    match expr {
        Expr::Constant { .. } => true,
        Expr::UnaryOp { operand, .. } => matches!(operand.as_ref(), Expr::Constant { .. }),
        Expr::Tuple { elts } => elts.iter().all(is_folded_constant),
        _ => false,
    }
}

fn constant_value(constant: &crate::ast::Constant) -> Value {
    use crate::ast::Constant;
    match constant {
        Constant::None | Constant::Ellipsis => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::LongInt(i) => Value::from_bigint(i.clone()),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s.as_str()),
    }
}

/// `x op= y`: lists extend and sets update in place so aliases observe the
/// change
fn inplace_op(
    op: crate::ast::Operator,
    current: &Value,
    rhs: &Value,
) -> Result<Value, PyException> {
    use crate::ast::Operator;
    match (op, current, rhs) {
        (Operator::Add, Value::List(items), _) => {
            let extra = ops::iterate(rhs)?;
            items.borrow_mut().extend(extra);
            Ok(current.clone())
        }
        (
            Operator::BitOr | Operator::BitAnd | Operator::Sub | Operator::BitXor,
            Value::Set(set),
            Value::Set(other),
        ) => {
            if Rc::ptr_eq(set, other) {
                match op {
                    Operator::Sub | Operator::BitXor => set.borrow_mut().clear(),
                    Operator::BitAnd => {
                        let copy = set.borrow().copy();
                        set.borrow_mut().replace_entries(copy);
                    }
                    _ => {}
                }
                return Ok(current.clone());
            }
            match op {
                Operator::BitOr => ops::set_update(&mut set.borrow_mut(), rhs)?,
                Operator::BitAnd => {
                    let common = ops::set_intersection(&set.borrow(), rhs)?;
                    set.borrow_mut().replace_entries(common);
                }
                Operator::Sub => ops::set_difference_update(&mut set.borrow_mut(), rhs)?,
                _ => ops::set_symmetric_difference_update(&mut set.borrow_mut(), rhs)?,
            }
            Ok(current.clone())
        }
        _ => ops::binary_op(op, current, rhs),
    }
}

pub(crate) fn exception_from_object(kind: ExceptionKind, args: Vec<Value>) -> PyException {
    PyException {
        kind,
        message: format::exception_message(kind, &args),
        args,
    }
}

fn exception_matches(exception: &PyException, filter: &Value) -> Result<bool, PyException> {
    match filter {
        Value::ExceptionType(kind) => Ok(exception.matches(*kind)),
        Value::Tuple(kinds) => {
            for kind in kinds.iter() {
                if exception_matches(exception, kind)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(PyException::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn collect_target_names(target: &Expr, names: &mut HashSet<String>) {
    match target {
        Expr::Name { id } => {
            names.insert(id.clone());
        }
        Expr::Tuple { elts } | Expr::List { elts } => {
            for elt in elts {
                collect_target_names(elt, names);
            }
        }
        Expr::Starred { value } => collect_target_names(value, names),
        _ => {}
    }
}

/// Names a function body binds, which makes them local to it. Nested
/// function bodies are not entered.
fn collect_assigned(
    body: &[Stmt],
    locals: &mut HashSet<String>,
    globals: &mut HashSet<String>,
    nonlocals: &mut HashSet<String>,
) {
    for stmt in body {
        match stmt {
            Stmt::FunctionDef(def) => {
                locals.insert(def.name.clone());
            }
            Stmt::Assign { targets, .. } | Stmt::Delete { targets } => {
                for target in targets {
                    collect_target_names(target, locals);
                }
            }
            Stmt::AugAssign { target, .. } | Stmt::AnnAssign { target, .. } => {
                collect_target_names(target, locals)
            }
            Stmt::For {
                target,
                body,
                orelse,
                ..
            } => {
                collect_target_names(target, locals);
                collect_assigned(body, locals, globals, nonlocals);
                collect_assigned(orelse, locals, globals, nonlocals);
            }
            Stmt::While { body, orelse, .. } | Stmt::If { body, orelse, .. } => {
                collect_assigned(body, locals, globals, nonlocals);
                collect_assigned(orelse, locals, globals, nonlocals);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_assigned(body, locals, globals, nonlocals);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        locals.insert(name.clone());
                    }
                    collect_assigned(&handler.body, locals, globals, nonlocals);
                }
                collect_assigned(orelse, locals, globals, nonlocals);
                collect_assigned(finalbody, locals, globals, nonlocals);
            }
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } => {
                for alias in names {
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    if bound != "*" {
                        locals.insert(bound.to_string());
                    }
                }
            }
            Stmt::Global { names } => globals.extend(names.iter().cloned()),
            Stmt::Nonlocal { names } => nonlocals.extend(names.iter().cloned()),
            _ => {}
        }
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`
fn quoted_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{name}'")).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

fn bind_arguments(
    function: &Function,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    scope: &ScopeRef,
) -> Result<(), PyException> {
    let spec = &function.args;
    let name = &function.name;
    let positional: Vec<&str> = spec
        .posonlyargs
        .iter()
        .chain(&spec.args)
        .map(|arg| arg.arg.as_str())
        .collect();
    let mut slots: Vec<Option<Value>> = vec![None; positional.len()];
    let mut kwonly: Vec<Option<Value>> = vec![None; spec.kwonlyargs.len()];
    let mut extra_positional = Vec::new();
    let mut extra_keywords = Dict::new();

    let given = args.len();
    for (i, arg) in args.into_iter().enumerate() {
        if i < slots.len() {
            slots[i] = Some(arg);
        } else {
            extra_positional.push(arg);
        }
    }
    if !extra_positional.is_empty() && spec.vararg.is_none() {
        let required = positional.len() - function.defaults.len();
        let takes = if function.defaults.is_empty() {
            plural(positional.len(), "positional argument")
        } else {
            format!("from {required} to {}", plural(positional.len(), "positional argument"))
        };
        let was = if given == 1 { "was" } else { "were" };
        return Err(PyException::type_error(format!(
            "{name}() takes {takes} but {given} {was} given"
        )));
    }

    for (key, value) in kwargs {
        let position = positional
            .iter()
            .position(|param| *param == key)
            .filter(|&i| i >= spec.posonlyargs.len());
        if let Some(i) = position {
            if slots[i].is_some() {
                return Err(PyException::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[i] = Some(value);
        } else if let Some(i) = spec.kwonlyargs.iter().position(|arg| arg.arg == key) {
            kwonly[i] = Some(value);
        } else if spec.kwarg.is_some() {
            extra_keywords.insert(Value::str(key.as_str()), value)?;
        } else {
            return Err(PyException::type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
    }

    let first_default = positional.len() - function.defaults.len();
    let mut missing = Vec::new();
    for (i, slot) in slots.iter_mut().enumerate() {
        if slot.is_none() {
            if i >= first_default {
                *slot = Some(function.defaults[i - first_default].clone());
            } else {
                missing.push(positional[i].to_string());
            }
        }
    }
    if !missing.is_empty() {
        return Err(PyException::type_error(format!(
            "{name}() missing {}: {}",
            plural(missing.len(), "required positional argument"),
            quoted_list(&missing)
        )));
    }
    let mut missing = Vec::new();
    for (i, slot) in kwonly.iter_mut().enumerate() {
        if slot.is_none() {
            match function.kw_defaults.get(i).cloned().flatten() {
                Some(default) => *slot = Some(default),
                None => missing.push(spec.kwonlyargs[i].arg.clone()),
            }
        }
    }
    if !missing.is_empty() {
        return Err(PyException::type_error(format!(
            "{name}() missing {}: {}",
            plural(missing.len(), "required keyword-only argument"),
            quoted_list(&missing)
        )));
    }

    let mut frame = scope.borrow_mut();
    for (param, value) in positional.iter().zip(slots) {
        if let Some(value) = value {
            frame.vars.insert(param.to_string(), value);
        }
    }
    for (param, value) in spec.kwonlyargs.iter().zip(kwonly) {
        if let Some(value) = value {
            frame.vars.insert(param.arg.clone(), value);
        }
    }
    if let Some(vararg) = &spec.vararg {
        frame
            .vars
            .insert(vararg.arg.clone(), Value::tuple(extra_positional));
    }
    if let Some(kwarg) = &spec.kwarg {
        frame
            .vars
            .insert(kwarg.arg.clone(), Value::dict(extra_keywords));
    }
    Ok(())
}
