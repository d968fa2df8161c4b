use tree_sitter::Node;

use super::{ParseError, Parser};
use crate::ast::*;

type Result<T> = std::result::Result<T, ParseError>;

/// Python front-end backed by tree-sitter-python
pub struct PythonParser {
    parser: tree_sitter::Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|e| ParseError::Language(e.to_string()))?;

        Ok(Self { parser })
    }

    pub fn parse_module(&mut self, source: &str) -> Result<Module> {
        let tree = self.parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(syntax_error(root, source));
        }
        Ok(Module::new(self.convert_block(root, source)?))
    }

    fn get_node_text<'a>(&self, node: Node, source: &'a str) -> &'a str {
        &source[node.byte_range()]
    }

    fn convert_block(&self, node: Node, source: &str) -> Result<Vec<Stmt>> {
        named_children(node)
            .into_iter()
            .map(|child| self.convert_statement(child, source))
            .collect()
    }

    fn convert_statement(&self, node: Node, source: &str) -> Result<Stmt> {
        match node.kind() {
            "expression_statement" => self.convert_expression_statement(node, source),

            "return_statement" => {
                let value = match named_children(node).first() {
                    Some(child) => Some(self.convert_expression(*child, source)?),
                    None => None,
                };
                Ok(Stmt::Return { value })
            }

            "pass_statement" => Ok(Stmt::Pass),
            "break_statement" => Ok(Stmt::Break),
            "continue_statement" => Ok(Stmt::Continue),

            "if_statement" => self.convert_if_statement(node, source),
            "for_statement" => self.convert_for_statement(node, source),
            "while_statement" => self.convert_while_statement(node, source),
            "try_statement" => self.convert_try_statement(node, source),

            "function_definition" => Ok(Stmt::FunctionDef(
                self.convert_function_definition(node, source, Vec::new())?,
            )),

            "decorated_definition" => {
                let mut decorators = Vec::new();
                for child in named_children(node) {
                    if child.kind() == "decorator" {
                        let expr = first_named(child)?;
                        decorators.push(self.convert_expression(expr, source)?);
                    }
                }
                let definition = field(node, "definition")?;
                if definition.kind() != "function_definition" {
                    return Err(unsupported(definition, "decorated class definitions"));
                }
                Ok(Stmt::FunctionDef(self.convert_function_definition(
                    definition, source, decorators,
                )?))
            }

            "raise_statement" => {
                let mut exc = None;
                let mut cause = None;
                let mut after_from = false;
                for child in all_children(node) {
                    if child.is_extra() {
                        continue;
                    }
                    if !child.is_named() {
                        after_from |= child.kind() == "from";
                        continue;
                    }
                    let expr = self.convert_expression(child, source)?;
                    if after_from {
                        cause = Some(expr);
                    } else {
                        exc = Some(expr);
                    }
                }
                Ok(Stmt::Raise { exc, cause })
            }

            "assert_statement" => {
                let children = named_children(node);
                let test = self.convert_expression(first_named(node)?, source)?;
                let msg = match children.get(1) {
                    Some(child) => Some(self.convert_expression(*child, source)?),
                    None => None,
                };
                Ok(Stmt::Assert { test, msg })
            }

            "delete_statement" => {
                let target = first_named(node)?;
                let targets = match self.convert_expression(target, source)? {
                    Expr::Tuple { elts } if target.kind() == "expression_list" => elts,
                    other => vec![other],
                };
                Ok(Stmt::Delete { targets })
            }

            "global_statement" | "nonlocal_statement" => {
                let names = named_children(node)
                    .into_iter()
                    .map(|child| self.get_node_text(child, source).to_string())
                    .collect();
                if node.kind() == "global_statement" {
                    Ok(Stmt::Global { names })
                } else {
                    Ok(Stmt::Nonlocal { names })
                }
            }

            "import_statement" => Ok(Stmt::Import {
                names: self.convert_import_names(node, source)?,
            }),

            "import_from_statement" => self.convert_import_from(node, source),

            "future_import_statement" => Ok(Stmt::ImportFrom {
                module: Some("__future__".to_string()),
                names: self.convert_import_names(node, source)?,
                level: 0,
            }),

            // Python 2 `print x`, kept only in its plain form
            "print_statement" => {
                let mut args = Vec::new();
                for child in named_children(node) {
                    if child.kind() == "chevron" {
                        return Err(unsupported(child, "print chevrons"));
                    }
                    args.push(self.convert_expression(child, source)?);
                }
                Ok(Stmt::expr(Expr::call(Expr::name("print"), args)))
            }

            "class_definition" => Err(unsupported(node, "class definitions")),
            "with_statement" => Err(unsupported(node, "with statements")),
            "match_statement" => Err(unsupported(node, "match statements")),
            other => Err(unsupported(node, format!("{other} statements"))),
        }
    }

    fn convert_expression_statement(&self, node: Node, source: &str) -> Result<Stmt> {
        let children = named_children(node);
        match children.as_slice() {
            [single] => match single.kind() {
                "assignment" => self.convert_assignment(*single, source),
                "augmented_assignment" => {
                    let target = self.convert_expression(field(*single, "left")?, source)?;
                    let operator = field(*single, "operator")?;
                    let symbol = self.get_node_text(operator, source);
                    let op = Operator::from_symbol(symbol.trim_end_matches('='))
                        .ok_or_else(|| unsupported(operator, format!("operator {symbol}")))?;
                    let value = self.convert_expression(field(*single, "right")?, source)?;
                    Ok(Stmt::AugAssign { target, op, value })
                }
                _ => Ok(Stmt::expr(self.convert_expression(*single, source)?)),
            },
            many => {
                let elts = many
                    .iter()
                    .map(|child| self.convert_expression(*child, source))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Stmt::expr(Expr::tuple(elts)))
            }
        }
    }

    fn convert_assignment(&self, node: Node, source: &str) -> Result<Stmt> {
        let left = field(node, "left")?;
        let target = self.convert_expression(left, source)?;

        if let Some(annotation) = node.child_by_field_name("type") {
            let value = match node.child_by_field_name("right") {
                Some(right) => Some(self.convert_expression(right, source)?),
                None => None,
            };
            return Ok(Stmt::AnnAssign {
                target,
                annotation: self.convert_type(annotation, source)?,
                value,
                simple: left.kind() == "identifier",
            });
        }

        // `a = b = value` nests the second assignment on the right
        let mut targets = vec![target];
        let mut right = field(node, "right")?;
        while right.kind() == "assignment" {
            if right.child_by_field_name("type").is_some() {
                return Err(unsupported(right, "annotated chained assignment"));
            }
            targets.push(self.convert_expression(field(right, "left")?, source)?);
            right = field(right, "right")?;
        }
        if right.kind() == "augmented_assignment" {
            return Err(unsupported(right, "augmented assignment as a value"));
        }

        let value = self.convert_expression(right, source)?;
        Ok(Stmt::Assign { targets, value })
    }

    fn convert_if_statement(&self, node: Node, source: &str) -> Result<Stmt> {
        let test = self.convert_expression(field(node, "condition")?, source)?;
        let body = self.convert_block(field(node, "consequence")?, source)?;

        let mut cursor = node.walk();
        let alternatives: Vec<Node> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();

        // fold elif clauses from the innermost outward
        let mut orelse = Vec::new();
        for clause in alternatives.iter().rev() {
            match clause.kind() {
                "else_clause" => orelse = self.convert_block(field(*clause, "body")?, source)?,
                "elif_clause" => {
                    let test = self.convert_expression(field(*clause, "condition")?, source)?;
                    let body = self.convert_block(field(*clause, "consequence")?, source)?;
                    orelse = vec![Stmt::If {
                        test,
                        body,
                        orelse: std::mem::take(&mut orelse),
                    }];
                }
                other => return Err(unsupported(*clause, format!("{other} in if statement"))),
            }
        }

        Ok(Stmt::If { test, body, orelse })
    }

    fn convert_else(&self, node: Node, source: &str) -> Result<Vec<Stmt>> {
        match node.child_by_field_name("alternative") {
            Some(clause) => self.convert_block(field(clause, "body")?, source),
            None => Ok(Vec::new()),
        }
    }

    fn convert_for_statement(&self, node: Node, source: &str) -> Result<Stmt> {
        if has_token(node, "async") {
            return Err(unsupported(node, "async for loops"));
        }
        Ok(Stmt::For {
            target: self.convert_expression(field(node, "left")?, source)?,
            iter: self.convert_expression(field(node, "right")?, source)?,
            body: self.convert_block(field(node, "body")?, source)?,
            orelse: self.convert_else(node, source)?,
        })
    }

    fn convert_while_statement(&self, node: Node, source: &str) -> Result<Stmt> {
        Ok(Stmt::While {
            test: self.convert_expression(field(node, "condition")?, source)?,
            body: self.convert_block(field(node, "body")?, source)?,
            orelse: self.convert_else(node, source)?,
        })
    }

    fn convert_try_statement(&self, node: Node, source: &str) -> Result<Stmt> {
        let body = self.convert_block(field(node, "body")?, source)?;
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();

        for child in named_children(node) {
            match child.kind() {
                "block" => {}
                "except_clause" => handlers.push(self.convert_except_clause(child, source)?),
                "else_clause" => orelse = self.convert_block(field(child, "body")?, source)?,
                "finally_clause" => {
                    let block = named_children(child)
                        .into_iter()
                        .find(|n| n.kind() == "block")
                        .ok_or_else(|| missing(child, "block"))?;
                    finalbody = self.convert_block(block, source)?;
                }
                "except_group_clause" => return Err(unsupported(child, "except* clauses")),
                other => return Err(unsupported(child, format!("{other} in try statement"))),
            }
        }

        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn convert_except_clause(&self, node: Node, source: &str) -> Result<ExceptHandler> {
        let mut exc_type = None;
        let mut name = None;
        let mut body = Vec::new();
        let mut after_as = false;

        for child in all_children(node) {
            if child.is_extra() {
                continue;
            }
            if !child.is_named() {
                after_as |= matches!(child.kind(), "as" | ",");
                continue;
            }
            match child.kind() {
                "block" => body = self.convert_block(child, source)?,
                // newer grammars fold `E as name` into one node
                "as_pattern" => {
                    exc_type = Some(self.convert_expression(first_named(child)?, source)?);
                    let alias = field(child, "alias")?;
                    name = Some(self.get_node_text(alias, source).to_string());
                }
                _ if after_as => name = Some(self.get_node_text(child, source).to_string()),
                _ => exc_type = Some(self.convert_expression(child, source)?),
            }
        }

        Ok(ExceptHandler {
            exc_type,
            name,
            body,
        })
    }

    fn convert_function_definition(
        &self,
        node: Node,
        source: &str,
        decorator_list: Vec<Expr>,
    ) -> Result<FunctionDef> {
        if has_token(node, "async") {
            return Err(unsupported(node, "async functions"));
        }
        if node.child_by_field_name("type_parameters").is_some() {
            return Err(unsupported(node, "type parameter lists"));
        }

        let name = self
            .get_node_text(field(node, "name")?, source)
            .to_string();
        let args = self.convert_parameters(field(node, "parameters")?, source)?;
        let returns = match node.child_by_field_name("return_type") {
            Some(annotation) => Some(self.convert_type(annotation, source)?),
            None => None,
        };
        let body = self.convert_block(field(node, "body")?, source)?;

        Ok(FunctionDef {
            name,
            args,
            body,
            decorator_list,
            returns,
        })
    }

    fn convert_parameters(&self, node: Node, source: &str) -> Result<Arguments> {
        let mut args = Arguments::default();
        let mut keyword_only = false;

        for param in named_children(node) {
            match param.kind() {
                "identifier" => {
                    let arg = Arg::new(self.get_node_text(param, source));
                    push_parameter(&mut args, keyword_only, arg, None);
                }
                "typed_parameter" => {
                    let inner = first_named(param)?;
                    let annotation = Some(self.convert_type(field(param, "type")?, source)?);
                    match inner.kind() {
                        "list_splat_pattern" => {
                            let name = self.get_node_text(first_named(inner)?, source);
                            args.vararg = Some(Arg {
                                arg: name.to_string(),
                                annotation,
                            });
                            keyword_only = true;
                        }
                        "dictionary_splat_pattern" => {
                            let name = self.get_node_text(first_named(inner)?, source);
                            args.kwarg = Some(Arg {
                                arg: name.to_string(),
                                annotation,
                            });
                        }
                        _ => {
                            let arg = Arg {
                                arg: self.get_node_text(inner, source).to_string(),
                                annotation,
                            };
                            push_parameter(&mut args, keyword_only, arg, None);
                        }
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = field(param, "name")?;
                    if name.kind() != "identifier" {
                        return Err(unsupported(name, "destructuring parameters"));
                    }
                    let annotation = match param.child_by_field_name("type") {
                        Some(annotation) => Some(self.convert_type(annotation, source)?),
                        None => None,
                    };
                    let default = self.convert_expression(field(param, "value")?, source)?;
                    let arg = Arg {
                        arg: self.get_node_text(name, source).to_string(),
                        annotation,
                    };
                    push_parameter(&mut args, keyword_only, arg, Some(default));
                }
                "list_splat_pattern" => {
                    let name = self.get_node_text(first_named(param)?, source);
                    args.vararg = Some(Arg::new(name));
                    keyword_only = true;
                }
                "dictionary_splat_pattern" => {
                    let name = self.get_node_text(first_named(param)?, source);
                    args.kwarg = Some(Arg::new(name));
                }
                "keyword_separator" => keyword_only = true,
                "positional_separator" => {
                    let positional = std::mem::take(&mut args.args);
                    args.posonlyargs.extend(positional);
                }
                _ => return Err(unsupported(param, "destructuring parameters")),
            }
        }

        Ok(args)
    }

    fn convert_import_names(&self, node: Node, source: &str) -> Result<Vec<Alias>> {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        names
            .into_iter()
            .map(|name| self.convert_alias(name, source))
            .collect()
    }

    fn convert_alias(&self, node: Node, source: &str) -> Result<Alias> {
        match node.kind() {
            "aliased_import" => Ok(Alias {
                name: self.get_node_text(field(node, "name")?, source).to_string(),
                asname: Some(self.get_node_text(field(node, "alias")?, source).to_string()),
            }),
            _ => Ok(Alias {
                name: self.get_node_text(node, source).to_string(),
                asname: None,
            }),
        }
    }

    fn convert_import_from(&self, node: Node, source: &str) -> Result<Stmt> {
        let module_node = field(node, "module_name")?;
        let (module, level) = if module_node.kind() == "relative_import" {
            let mut level = 0;
            let mut module = None;
            for child in named_children(module_node) {
                match child.kind() {
                    "import_prefix" => {
                        level = self.get_node_text(child, source).matches('.').count()
                    }
                    _ => module = Some(self.get_node_text(child, source).to_string()),
                }
            }
            (module, level)
        } else {
            (Some(self.get_node_text(module_node, source).to_string()), 0)
        };

        let mut names = self.convert_import_names(node, source)?;
        if named_children(node)
            .iter()
            .any(|child| child.kind() == "wildcard_import")
        {
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
            });
        }

        Ok(Stmt::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn convert_expression(&self, node: Node, source: &str) -> Result<Expr> {
        match node.kind() {
            "identifier" | "keyword_identifier" => {
                Ok(Expr::name(self.get_node_text(node, source)))
            }
            "integer" => self.convert_integer(node, source),
            "float" => self.convert_float(node, source),
            "true" => Ok(Expr::Constant {
                value: Constant::Bool(true),
            }),
            "false" => Ok(Expr::Constant {
                value: Constant::Bool(false),
            }),
            "none" => Ok(Expr::Constant {
                value: Constant::None,
            }),
            "ellipsis" => Ok(Expr::Constant {
                value: Constant::Ellipsis,
            }),
            "string" | "concatenated_string" => self.convert_strings(node, source),

            "parenthesized_expression" => {
                let inner = first_named(node)?;
                if inner.kind() == "yield" {
                    return Err(unsupported(inner, "yield expressions"));
                }
                self.convert_expression(inner, source)
            }

            "expression_list" | "pattern_list" | "tuple" | "tuple_pattern" => {
                Ok(Expr::tuple(self.convert_elements(node, source)?))
            }
            "list" | "list_pattern" => Ok(Expr::list(self.convert_elements(node, source)?)),
            "set" => Ok(Expr::Set {
                elts: self.convert_elements(node, source)?,
            }),

            "dictionary" => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for child in named_children(node) {
                    match child.kind() {
                        "pair" => {
                            keys.push(Some(self.convert_expression(field(child, "key")?, source)?));
                            values.push(self.convert_expression(field(child, "value")?, source)?);
                        }
                        "dictionary_splat" => {
                            keys.push(None);
                            values.push(self.convert_expression(first_named(child)?, source)?);
                        }
                        other => return Err(unsupported(child, format!("{other} in dict display"))),
                    }
                }
                Ok(Expr::Dict { keys, values })
            }

            "list_splat" | "list_splat_pattern" => Ok(Expr::Starred {
                value: Box::new(self.convert_expression(first_named(node)?, source)?),
            }),

            "binary_operator" => {
                let operator = field(node, "operator")?;
                let symbol = self.get_node_text(operator, source);
                let op = Operator::from_symbol(symbol)
                    .ok_or_else(|| unsupported(operator, format!("operator {symbol}")))?;
                Ok(Expr::binop(
                    self.convert_expression(field(node, "left")?, source)?,
                    op,
                    self.convert_expression(field(node, "right")?, source)?,
                ))
            }

            "unary_operator" => {
                let operator = field(node, "operator")?;
                let op = match self.get_node_text(operator, source) {
                    "-" => UnaryOp::USub,
                    "+" => UnaryOp::UAdd,
                    "~" => UnaryOp::Invert,
                    other => return Err(unsupported(operator, format!("unary operator {other}"))),
                };
                Ok(Expr::UnaryOp {
                    op,
                    operand: Box::new(self.convert_expression(field(node, "argument")?, source)?),
                })
            }

            "not_operator" => Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(self.convert_expression(field(node, "argument")?, source)?),
            }),

            "boolean_operator" => {
                let op = match self.get_node_text(field(node, "operator")?, source) {
                    "and" => BoolOp::And,
                    _ => BoolOp::Or,
                };
                let left = field(node, "left")?;
                // `a or b or c` is one BoolOp; parenthesized operands stay nested
                let mut values = match self.convert_expression(left, source)? {
                    Expr::BoolOp { op: inner, values }
                        if inner == op && left.kind() == "boolean_operator" =>
                    {
                        values
                    }
                    other => vec![other],
                };
                values.push(self.convert_expression(field(node, "right")?, source)?);
                Ok(Expr::BoolOp { op, values })
            }

            "comparison_operator" => self.convert_comparison(node, source),

            "conditional_expression" => {
                let parts = named_children(node);
                match parts.as_slice() {
                    [body, test, orelse] => Ok(Expr::if_exp(
                        self.convert_expression(*test, source)?,
                        self.convert_expression(*body, source)?,
                        self.convert_expression(*orelse, source)?,
                    )),
                    _ => Err(missing(node, "conditional expression operand")),
                }
            }

            "lambda" => {
                let args = match node.child_by_field_name("parameters") {
                    Some(params) => self.convert_parameters(params, source)?,
                    None => Arguments::default(),
                };
                Ok(Expr::Lambda {
                    args: Box::new(args),
                    body: Box::new(self.convert_expression(field(node, "body")?, source)?),
                })
            }

            "attribute" => Ok(Expr::attribute(
                self.convert_expression(field(node, "object")?, source)?,
                self.get_node_text(field(node, "attribute")?, source),
            )),

            "subscript" => self.convert_subscript(node, source),
            "slice" => self.convert_slice(node, source),
            "call" => self.convert_call(node, source),

            "list_comprehension" | "set_comprehension" | "generator_expression" => {
                let elt = Box::new(self.convert_expression(field(node, "body")?, source)?);
                let generators = self.convert_comprehension_clauses(node, source)?;
                Ok(match node.kind() {
                    "list_comprehension" => Expr::ListComp { elt, generators },
                    "set_comprehension" => Expr::SetComp { elt, generators },
                    _ => Expr::GeneratorExp { elt, generators },
                })
            }

            "dictionary_comprehension" => {
                let pair = field(node, "body")?;
                Ok(Expr::DictComp {
                    key: Box::new(self.convert_expression(field(pair, "key")?, source)?),
                    value: Box::new(self.convert_expression(field(pair, "value")?, source)?),
                    generators: self.convert_comprehension_clauses(node, source)?,
                })
            }

            "type" => self.convert_type(node, source),

            "named_expression" => Err(unsupported(node, "assignment expressions")),
            "await" => Err(unsupported(node, "await expressions")),
            "yield" => Err(unsupported(node, "yield expressions")),
            other => Err(unsupported(node, format!("{other} expressions"))),
        }
    }

    fn convert_elements(&self, node: Node, source: &str) -> Result<Vec<Expr>> {
        named_children(node)
            .into_iter()
            .map(|child| self.convert_expression(child, source))
            .collect()
    }

    fn convert_comparison(&self, node: Node, source: &str) -> Result<Expr> {
        let mut operands = Vec::new();
        let mut ops = Vec::new();
        // `not in` / `is not` may arrive as two tokens
        let mut pending: Vec<&str> = Vec::new();

        for child in all_children(node) {
            if child.is_extra() {
                continue;
            }
            let kind = child.kind();
            let is_operator = !child.is_named() || CmpOp::from_symbol(kind).is_some();
            if is_operator {
                pending.push(self.get_node_text(child, source));
                continue;
            }
            if !pending.is_empty() {
                let symbol = pending.join(" ");
                let op = CmpOp::from_symbol(&symbol)
                    .ok_or_else(|| unsupported(child, format!("comparison {symbol}")))?;
                ops.push(op);
                pending.clear();
            }
            operands.push(self.convert_expression(child, source)?);
        }

        let mut operands = operands.into_iter();
        let left = operands
            .next()
            .ok_or_else(|| missing(node, "comparison operand"))?;
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators: operands.collect(),
        })
    }

    fn convert_subscript(&self, node: Node, source: &str) -> Result<Expr> {
        let value = self.convert_expression(field(node, "value")?, source)?;

        let mut cursor = node.walk();
        let items: Vec<Node> = node
            .children_by_field_name("subscript", &mut cursor)
            .collect();
        let trailing_comma = all_children(node)
            .iter()
            .any(|child| !child.is_named() && child.kind() == ",");

        let mut elts = items
            .into_iter()
            .map(|item| self.convert_expression(item, source))
            .collect::<Result<Vec<_>>>()?;

        let slice = if elts.len() == 1 && !trailing_comma {
            elts.remove(0)
        } else {
            Expr::tuple(elts)
        };
        Ok(Expr::subscript(value, slice))
    }

    fn convert_slice(&self, node: Node, source: &str) -> Result<Expr> {
        let mut sections: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut section = 0;
        for child in all_children(node) {
            if child.is_extra() {
                continue;
            }
            if !child.is_named() {
                if child.kind() == ":" {
                    section += 1;
                }
                continue;
            }
            if let Some(slot) = sections.get_mut(section) {
                *slot = Some(Box::new(self.convert_expression(child, source)?));
            }
        }
        let [lower, upper, step] = sections;
        Ok(Expr::Slice { lower, upper, step })
    }

    fn convert_call(&self, node: Node, source: &str) -> Result<Expr> {
        let func = self.convert_expression(field(node, "function")?, source)?;
        let arguments = field(node, "arguments")?;

        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if arguments.kind() == "generator_expression" {
            args.push(self.convert_expression(arguments, source)?);
        } else {
            for child in named_children(arguments) {
                match child.kind() {
                    "keyword_argument" => keywords.push(Keyword {
                        arg: Some(self.get_node_text(field(child, "name")?, source).to_string()),
                        value: self.convert_expression(field(child, "value")?, source)?,
                    }),
                    "dictionary_splat" => keywords.push(Keyword {
                        arg: None,
                        value: self.convert_expression(first_named(child)?, source)?,
                    }),
                    "parenthesized_list_splat" => {
                        return Err(unsupported(child, "parenthesized star arguments"))
                    }
                    _ => args.push(self.convert_expression(child, source)?),
                }
            }
        }

        Ok(Expr::Call {
            func: Box::new(func),
            args,
            keywords,
        })
    }

    fn convert_comprehension_clauses(&self, node: Node, source: &str) -> Result<Vec<Comprehension>> {
        let mut generators: Vec<Comprehension> = Vec::new();
        for clause in named_children(node) {
            match clause.kind() {
                "for_in_clause" => {
                    if has_token(clause, "async") {
                        return Err(unsupported(clause, "async comprehensions"));
                    }
                    let target = self.convert_expression(field(clause, "left")?, source)?;
                    let mut cursor = clause.walk();
                    let rights: Vec<Node> = clause
                        .children_by_field_name("right", &mut cursor)
                        .collect();
                    let mut iters = rights
                        .into_iter()
                        .map(|right| self.convert_expression(right, source))
                        .collect::<Result<Vec<_>>>()?;
                    let iter = if iters.len() == 1 {
                        iters.remove(0)
                    } else {
                        Expr::tuple(iters)
                    };
                    generators.push(Comprehension {
                        target,
                        iter,
                        ifs: Vec::new(),
                    });
                }
                "if_clause" => {
                    let condition = self.convert_expression(first_named(clause)?, source)?;
                    generators
                        .last_mut()
                        .ok_or_else(|| missing(clause, "for clause before if clause"))?
                        .ifs
                        .push(condition);
                }
                _ => {}
            }
        }
        Ok(generators)
    }

    /// Annotations are kept as expressions so they can be unparsed or
    /// stripped; the newer grammar's dedicated type nodes map onto the
    /// equivalent subscript, union and attribute shapes.
    fn convert_type(&self, node: Node, source: &str) -> Result<Expr> {
        match node.kind() {
            "type" => match named_children(node).as_slice() {
                [inner] => self.convert_type(*inner, source),
                _ => Ok(Expr::name(self.get_node_text(node, source))),
            },
            "generic_type" => {
                let mut base = None;
                let mut params = Vec::new();
                for child in named_children(node) {
                    if child.kind() == "type_parameter" {
                        for param in named_children(child) {
                            params.push(self.convert_type(param, source)?);
                        }
                    } else if base.is_none() {
                        base = Some(self.convert_type(child, source)?);
                    }
                }
                let base = base.ok_or_else(|| missing(node, "generic base type"))?;
                let slice = if params.len() == 1 {
                    params.remove(0)
                } else {
                    Expr::tuple(params)
                };
                Ok(Expr::subscript(base, slice))
            }
            "union_type" => match named_children(node).as_slice() {
                [left, right] => Ok(Expr::binop(
                    self.convert_type(*left, source)?,
                    Operator::BitOr,
                    self.convert_type(*right, source)?,
                )),
                _ => Err(missing(node, "union member")),
            },
            "member_type" => match named_children(node).as_slice() {
                [value, attr] => Ok(Expr::attribute(
                    self.convert_type(*value, source)?,
                    self.get_node_text(*attr, source),
                )),
                _ => Err(missing(node, "member type attribute")),
            },
            "splat_type" => Ok(Expr::Starred {
                value: Box::new(Expr::name(self.get_node_text(first_named(node)?, source))),
            }),
            "constrained_type" => Ok(Expr::name(self.get_node_text(node, source))),
            _ => self.convert_expression(node, source),
        }
    }

    fn convert_integer(&self, node: Node, source: &str) -> Result<Expr> {
        let text = self
            .get_node_text(node, source)
            .replace('_', "")
            .to_ascii_lowercase();
        if text.ends_with('j') {
            return Err(unsupported(node, "complex literals"));
        }
        let text = text.trim_end_matches('l');
        let (digits, radix) = if let Some(rest) = text.strip_prefix("0x") {
            (rest, 16)
        } else if let Some(rest) = text.strip_prefix("0o") {
            (rest, 8)
        } else if let Some(rest) = text.strip_prefix("0b") {
            (rest, 2)
        } else {
            (text, 10)
        };
        if let Ok(value) = i64::from_str_radix(digits, radix) {
            return Ok(Expr::int(value));
        }
        num_bigint::BigInt::parse_bytes(digits.as_bytes(), radix)
            .map(|value| Expr::Constant {
                value: Constant::LongInt(value),
            })
            .ok_or_else(|| ParseError::Literal {
                message: format!("bad integer literal {text}"),
                line: line_of(node),
            })
    }

    fn convert_float(&self, node: Node, source: &str) -> Result<Expr> {
        let text = self.get_node_text(node, source).replace('_', "");
        if text.ends_with('j') || text.ends_with('J') {
            return Err(unsupported(node, "complex literals"));
        }
        let value: f64 = text.parse().map_err(|_| ParseError::Literal {
            message: format!("bad float literal {text}"),
            line: line_of(node),
        })?;
        Ok(Expr::Constant {
            value: Constant::Float(value),
        })
    }

    fn convert_strings(&self, node: Node, source: &str) -> Result<Expr> {
        let pieces = if node.kind() == "concatenated_string" {
            named_children(node)
        } else {
            vec![node]
        };

        let mut formatted = false;
        let mut parts = Vec::new();
        for piece in pieces {
            let (is_f, piece_parts) = self.convert_string(piece, source)?;
            formatted |= is_f;
            parts.extend(piece_parts);
        }

        if !formatted {
            let mut value = String::new();
            for part in parts {
                if let FStringPart::Literal(text) = part {
                    value.push_str(&text);
                }
            }
            return Ok(Expr::string(value));
        }

        // merge neighbouring literal runs and drop empty ones
        let mut values: Vec<FStringPart> = Vec::new();
        for part in parts {
            if let FStringPart::Literal(text) = &part {
                if text.is_empty() {
                    continue;
                }
                if let Some(FStringPart::Literal(previous)) = values.last_mut() {
                    previous.push_str(text);
                    continue;
                }
            }
            values.push(part);
        }
        Ok(Expr::JoinedStr { values })
    }

    fn convert_string(&self, node: Node, source: &str) -> Result<(bool, Vec<FStringPart>)> {
        let text = self.get_node_text(node, source);
        let line = line_of(node);
        let prefix_len = text
            .find(['\'', '"'])
            .ok_or_else(|| ParseError::Literal {
                message: "string without quotes".to_string(),
                line,
            })?;
        let prefix = text[..prefix_len].to_ascii_lowercase();
        if prefix.contains('b') {
            return Err(unsupported(node, "bytes literals"));
        }
        let raw = prefix.contains('r');
        let formatted = prefix.contains('f');

        let rest = &text[prefix_len..];
        let quote_len = if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
            3
        } else {
            1
        };
        if rest.len() < quote_len * 2 {
            return Err(ParseError::Literal {
                message: "unterminated string".to_string(),
                line,
            });
        }
        let body_start = node.start_byte() + prefix_len + quote_len;
        let body_end = node.end_byte() - quote_len;

        if !formatted {
            let value = decode_escapes(&source[body_start..body_end], raw, line)?;
            return Ok((false, vec![FStringPart::Literal(value)]));
        }

        let mut parts = Vec::new();
        let mut position = body_start;
        for child in named_children(node) {
            if child.kind() != "interpolation" {
                continue;
            }
            let literal = source[position..child.start_byte()]
                .replace("{{", "{")
                .replace("}}", "}");
            parts.push(FStringPart::Literal(decode_escapes(&literal, raw, line)?));
            parts.push(self.convert_interpolation(child, source)?);
            position = child.end_byte();
        }
        let literal = source[position..body_end]
            .replace("{{", "{")
            .replace("}}", "}");
        parts.push(FStringPart::Literal(decode_escapes(&literal, raw, line)?));

        Ok((true, parts))
    }

    fn convert_interpolation(&self, node: Node, source: &str) -> Result<FStringPart> {
        let mut value = None;
        let mut conversion = None;
        let mut format_spec = None;

        for child in all_children(node) {
            if child.is_extra() {
                continue;
            }
            match child.kind() {
                "type_conversion" => {
                    conversion = self
                        .get_node_text(child, source)
                        .trim_start_matches('!')
                        .chars()
                        .next();
                }
                "format_specifier" => {
                    if named_children(child)
                        .iter()
                        .any(|n| n.kind() == "interpolation" || n.kind() == "format_expression")
                    {
                        return Err(unsupported(child, "nested f-string format specs"));
                    }
                    let spec = self.get_node_text(child, source);
                    format_spec = Some(spec.strip_prefix(':').unwrap_or(spec).to_string());
                }
                "=" if !child.is_named() => {
                    return Err(unsupported(child, "self-documenting f-string fields"))
                }
                _ if child.is_named() && value.is_none() => {
                    value = Some(self.convert_expression(child, source)?);
                }
                _ => {}
            }
        }

        Ok(FStringPart::Formatted {
            value: Box::new(value.ok_or_else(|| missing(node, "f-string expression"))?),
            conversion,
            format_spec,
        })
    }
}

impl Parser for PythonParser {
    fn parse_program(&mut self, source: &str) -> Result<Module> {
        self.parse_module(source)
    }

    fn name(&self) -> &'static str {
        "python"
    }
}

fn push_parameter(args: &mut Arguments, keyword_only: bool, arg: Arg, default: Option<Expr>) {
    if keyword_only {
        args.kwonlyargs.push(arg);
        args.kw_defaults.push(default);
    } else {
        args.args.push(arg);
        if let Some(default) = default {
            args.defaults.push(default);
        }
    }
}

fn decode_escapes(text: &str, raw: bool, line: usize) -> Result<String> {
    if raw {
        return Ok(text.to_string());
    }

    let bad_escape = |what: &str| ParseError::Literal {
        message: format!("invalid {what} escape"),
        line,
    };

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => out.push('\\'),
            Some('\n') => {}
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('a') => out.push('\u{7}'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\u{b}'),
            Some(first @ '0'..='7') => {
                let mut code = first.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            code = code * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or_else(|| bad_escape("octal"))?);
            }
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&digits, 16)
                    .ok()
                    .filter(|_| digits.len() == width)
                    .ok_or_else(|| bad_escape("hex"))?;
                out.push(char::from_u32(code).ok_or_else(|| bad_escape("unicode"))?);
            }
            Some('N') => return Err(bad_escape("named unicode")),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn first_named(node: Node) -> Result<Node> {
    named_children(node)
        .into_iter()
        .next()
        .ok_or_else(|| missing(node, "operand"))
}

fn field<'t>(node: Node<'t>, name: &str) -> Result<Node<'t>> {
    node.child_by_field_name(name)
        .ok_or_else(|| missing(node, name))
}

fn has_token(node: Node, token: &str) -> bool {
    all_children(node)
        .iter()
        .any(|child| !child.is_named() && child.kind() == token)
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

fn unsupported(node: Node, construct: impl Into<String>) -> ParseError {
    ParseError::Unsupported {
        construct: construct.into(),
        line: line_of(node),
    }
}

fn missing(node: Node, what: &str) -> ParseError {
    ParseError::Syntax {
        line: line_of(node),
        column: node.start_position().column + 1,
        snippet: format!("{} without {what}", node.kind()),
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

fn syntax_error(root: Node, source: &str) -> ParseError {
    let node = first_error(root).unwrap_or(root);
    let snippet = if node.is_missing() {
        format!("missing {}", node.kind())
    } else {
        source[node.byte_range()].chars().take(32).collect()
    };
    ParseError::Syntax {
        line: line_of(node),
        column: node.start_position().column + 1,
        snippet,
    }
}
