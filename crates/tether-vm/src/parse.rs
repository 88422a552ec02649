//! Lowers the ruff AST into the runtime's own [`Node`]/[`ExprLoc`] tree.
//!
//! Only the subset of syntax the evaluator understands is accepted; anything
//! else becomes a `SyntaxError` fault pointing at the offending line.

use std::sync::Arc;

use ruff_python_ast::{
    self as ast, BoolOp, CmpOp, ElifElseClause, Expr as AstExpr, Number, Operator as AstOperator,
    ParameterWithDefault, Stmt, UnaryOp,
};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use crate::{
    exception::{ExcType, RunError, StackFrame},
    expressions::{CmpOperator, ExceptHandler, Expr, ExprLoc, FunctionDef, Literal, Node, NodeKind, Operator, Target},
};

/// Maximum nesting depth for statements and expressions.
///
/// Deeper sources are rejected before evaluation so the recursive evaluator
/// cannot overflow the host stack on pathological input.
pub const MAX_NESTING_DEPTH: u16 = 100;

/// Parses `code` into runtime statements.
///
/// Errors are `SyntaxError` faults carrying a single `<module>` frame at the
/// line where parsing failed.
pub(crate) fn parse(code: &str, filename: &str) -> Result<Vec<Node>, RunError> {
    let mut parser = Parser::new(code, filename);
    let parsed = parse_module(code).map_err(|e| parser.syntax_error(e.to_string(), e.range()))?;
    let module = parsed.into_syntax();
    parser.parse_statements(module.body)
}

struct Parser<'a> {
    code: &'a str,
    filename: &'a str,
    /// Byte offset at which each line starts.
    line_starts: Vec<usize>,
    depth_remaining: u16,
}

impl<'a> Parser<'a> {
    fn new(code: &'a str, filename: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(code.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            code,
            filename,
            line_starts,
            depth_remaining: MAX_NESTING_DEPTH,
        }
    }

    fn line_of(&self, range: TextRange) -> u32 {
        let offset: usize = range.start().into();
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact + 1,
            Err(insert_at) => insert_at,
        };
        u32::try_from(line).unwrap_or(u32::MAX)
    }

    fn syntax_error(&self, msg: impl Into<String>, range: TextRange) -> RunError {
        let mut error = RunError::new(ExcType::SyntaxError, msg);
        error.push_frame(StackFrame::new("<module>", self.filename, Some(self.line_of(range))));
        error
    }

    fn unsupported(&self, what: &str, range: TextRange) -> RunError {
        self.syntax_error(format!("{what} is not supported"), range)
    }

    fn parse_statements(&mut self, statements: impl IntoIterator<Item = Stmt>) -> Result<Vec<Node>, RunError> {
        statements.into_iter().map(|s| self.parse_statement(s)).collect()
    }

    fn parse_elif_else_clauses(&mut self, clauses: Vec<ElifElseClause>) -> Result<Vec<Node>, RunError> {
        let mut tail: Vec<Node> = Vec::new();
        for clause in clauses.into_iter().rev() {
            let line = self.line_of(clause.range);
            match clause.test {
                Some(test) => {
                    let test = self.parse_expression(test)?;
                    let body = self.parse_statements(clause.body)?;
                    let or_else = tail;
                    tail = vec![Node {
                        line,
                        kind: NodeKind::If { test, body, or_else },
                    }];
                }
                None => tail = self.parse_statements(clause.body)?,
            }
        }
        Ok(tail)
    }

    fn parse_statement(&mut self, statement: Stmt) -> Result<Node, RunError> {
        let range = statement.range();
        self.decr_depth_remaining(range)?;
        let result = self.parse_statement_impl(statement, range);
        self.depth_remaining += 1;
        Ok(Node {
            line: self.line_of(range),
            kind: result?,
        })
    }

    fn parse_statement_impl(&mut self, statement: Stmt, range: TextRange) -> Result<NodeKind, RunError> {
        match statement {
            Stmt::FunctionDef(function) => {
                if function.is_async {
                    return Err(self.unsupported("async def", range));
                }
                if !function.decorator_list.is_empty() {
                    return Err(self.unsupported("decorators", range));
                }
                let (params, defaults) = self.parse_parameters(Some(&*function.parameters), range)?;
                let body = self.parse_statements(function.body)?;
                Ok(NodeKind::FunctionDef(Arc::new(FunctionDef {
                    name: function.name.id.to_string(),
                    params,
                    defaults,
                    body,
                })))
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => Ok(NodeKind::Return(
                value.map(|v| self.parse_expression(*v)).transpose()?,
            )),
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let targets = targets
                    .into_iter()
                    .map(|t| self.parse_target(t))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = self.parse_expression(*value)?;
                Ok(NodeKind::Assign { targets, value })
            }
            Stmt::AnnAssign(ast::StmtAnnAssign { target, value, .. }) => match value {
                Some(value) => Ok(NodeKind::Assign {
                    targets: vec![self.parse_target(*target)?],
                    value: self.parse_expression(*value)?,
                }),
                None => Ok(NodeKind::Pass),
            },
            Stmt::AugAssign(ast::StmtAugAssign { target, op, value, .. }) => {
                let op = convert_op(op).ok_or_else(|| self.unsupported("this augmented operator", range))?;
                let target = self.parse_target(*target)?;
                if matches!(target, Target::Unpack(_)) {
                    return Err(self.syntax_error("illegal expression for augmented assignment", range));
                }
                Ok(NodeKind::AugAssign {
                    target,
                    op,
                    value: self.parse_expression(*value)?,
                })
            }
            Stmt::For(ast::StmtFor {
                is_async,
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                if is_async || !orelse.is_empty() {
                    return Err(self.unsupported("async for / for-else", range));
                }
                Ok(NodeKind::For {
                    target: self.parse_target(*target)?,
                    iter: self.parse_expression(*iter)?,
                    body: self.parse_statements(body)?,
                })
            }
            Stmt::While(ast::StmtWhile { test, body, orelse, .. }) => {
                if !orelse.is_empty() {
                    return Err(self.unsupported("while-else", range));
                }
                Ok(NodeKind::While {
                    test: self.parse_expression(*test)?,
                    body: self.parse_statements(body)?,
                })
            }
            Stmt::If(ast::StmtIf {
                test,
                body,
                elif_else_clauses,
                ..
            }) => {
                let test = self.parse_expression(*test)?;
                let body = self.parse_statements(body)?;
                let or_else = self.parse_elif_else_clauses(elif_else_clauses)?;
                Ok(NodeKind::If { test, body, or_else })
            }
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                is_star,
                ..
            }) => {
                if is_star || !orelse.is_empty() || !finalbody.is_empty() {
                    return Err(self.unsupported("try-else / finally / except*", range));
                }
                let body = self.parse_statements(body)?;
                let handlers = handlers
                    .into_iter()
                    .map(|handler| {
                        let ast::ExceptHandler::ExceptHandler(h) = handler;
                        Ok(ExceptHandler {
                            exc_type: h.type_.map(|t| self.parse_expression(*t)).transpose()?,
                            name: h.name.map(|n| n.id.to_string()),
                            body: self.parse_statements(h.body)?,
                        })
                    })
                    .collect::<Result<Vec<_>, RunError>>()?;
                Ok(NodeKind::Try { body, handlers })
            }
            Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                if cause.is_some() {
                    return Err(self.unsupported("raise ... from", range));
                }
                Ok(NodeKind::Raise(exc.map(|e| self.parse_expression(*e)).transpose()?))
            }
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => Ok(NodeKind::Assert {
                test: self.parse_expression(*test)?,
                msg: msg.map(|m| self.parse_expression(*m)).transpose()?,
            }),
            Stmt::Global(ast::StmtGlobal { names, .. }) => Ok(NodeKind::Global(
                names.iter().map(|id| self.code[id.range].to_owned()).collect(),
            )),
            Stmt::Expr(ast::StmtExpr { value, .. }) => Ok(NodeKind::Expr(self.parse_expression(*value)?)),
            Stmt::Pass(_) => Ok(NodeKind::Pass),
            Stmt::Break(_) => Ok(NodeKind::Break),
            Stmt::Continue(_) => Ok(NodeKind::Continue),
            _ => Err(self.unsupported("this statement", range)),
        }
    }

    /// Positional parameters with trailing defaults; every other parameter kind is rejected.
    fn parse_parameters(
        &mut self,
        parameters: Option<&ast::Parameters>,
        range: TextRange,
    ) -> Result<(Vec<String>, Vec<ExprLoc>), RunError> {
        let Some(params) = parameters else {
            return Ok((Vec::new(), Vec::new()));
        };
        if params.vararg.is_some() || params.kwarg.is_some() || !params.kwonlyargs.is_empty() {
            return Err(self.unsupported("*args, **kwargs and keyword-only parameters", range));
        }
        let all: Vec<&ParameterWithDefault> = params.posonlyargs.iter().chain(params.args.iter()).collect();
        let mut names = Vec::with_capacity(all.len());
        let mut defaults = Vec::new();
        for p in all {
            names.push(p.parameter.name.id.to_string());
            match &p.default {
                Some(expr) => defaults.push(self.parse_expression((**expr).clone())?),
                None if !defaults.is_empty() => {
                    return Err(self.syntax_error("non-default argument follows default argument", range));
                }
                None => {}
            }
        }
        Ok((names, defaults))
    }

    fn parse_target(&mut self, target: AstExpr) -> Result<Target, RunError> {
        match target {
            AstExpr::Name(ast::ExprName { id, .. }) => Ok(Target::Name(id.to_string())),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Ok(Target::Attr {
                object: self.parse_expression(*value)?,
                attr: attr.id().to_string(),
            }),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => Ok(Target::Subscript {
                object: self.parse_expression(*value)?,
                index: self.parse_expression(*slice)?,
            }),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) | AstExpr::List(ast::ExprList { elts, .. }) => Ok(
                Target::Unpack(elts.into_iter().map(|e| self.parse_target(e)).collect::<Result<_, _>>()?),
            ),
            other => Err(self.syntax_error("cannot assign to expression", other.range())),
        }
    }

    fn parse_expression(&mut self, expression: AstExpr) -> Result<ExprLoc, RunError> {
        let range = expression.range();
        self.decr_depth_remaining(range)?;
        let result = self.parse_expression_impl(expression, range);
        self.depth_remaining += 1;
        Ok(ExprLoc::new(self.line_of(range), result?))
    }

    fn parse_boxed(&mut self, expression: AstExpr) -> Result<Box<ExprLoc>, RunError> {
        self.parse_expression(expression).map(Box::new)
    }

    fn parse_expression_impl(&mut self, expression: AstExpr, range: TextRange) -> Result<Expr, RunError> {
        let line = self.line_of(range);
        match expression {
            AstExpr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
                // right-fold `a and b and c` into `a and (b and c)`
                let mut values_iter = values.into_iter().rev();
                let last = values_iter
                    .next()
                    .ok_or_else(|| self.syntax_error("empty boolean operation", range))?;
                let mut result = self.parse_expression(last)?;
                for value in values_iter {
                    let left = self.parse_boxed(value)?;
                    let expr = match op {
                        BoolOp::And => Expr::And(left, Box::new(result)),
                        BoolOp::Or => Expr::Or(left, Box::new(result)),
                    };
                    result = ExprLoc::new(line, expr);
                }
                Ok(result.expr)
            }
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, .. }) => {
                let op = convert_op(op).ok_or_else(|| self.unsupported("this binary operator", range))?;
                Ok(Expr::Op {
                    left: self.parse_boxed(*left)?,
                    op,
                    right: self.parse_boxed(*right)?,
                })
            }
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                let operand = self.parse_boxed(*operand)?;
                match op {
                    UnaryOp::Not => Ok(Expr::Not(operand)),
                    UnaryOp::USub => Ok(Expr::UnaryMinus(operand)),
                    UnaryOp::UAdd => Ok(Expr::UnaryPlus(operand)),
                    UnaryOp::Invert => Err(self.unsupported("bitwise inversion", range)),
                }
            }
            AstExpr::Lambda(ast::ExprLambda { parameters, body, .. }) => {
                let (params, defaults) = self.parse_parameters(parameters.as_deref(), range)?;
                let body = self.parse_expression(*body)?;
                Ok(Expr::Lambda(Arc::new(FunctionDef {
                    name: "<lambda>".to_owned(),
                    params,
                    defaults,
                    body: vec![Node {
                        line,
                        kind: NodeKind::Return(Some(body)),
                    }],
                })))
            }
            AstExpr::If(ast::ExprIf { test, body, orelse, .. }) => Ok(Expr::IfElse {
                test: self.parse_boxed(*test)?,
                body: self.parse_boxed(*body)?,
                orelse: self.parse_boxed(*orelse)?,
            }),
            AstExpr::Dict(ast::ExprDict { items, .. }) => {
                let mut pairs = Vec::with_capacity(items.len());
                for ast::DictItem { key, value } in items {
                    let Some(key) = key else {
                        return Err(self.unsupported("dict unpacking", range));
                    };
                    pairs.push((self.parse_expression(key)?, self.parse_expression(value)?));
                }
                Ok(Expr::Dict(pairs))
            }
            AstExpr::Compare(ast::ExprCompare {
                left, ops, comparators, ..
            }) => {
                let left = self.parse_boxed(*left)?;
                let comparisons = ops
                    .into_vec()
                    .into_iter()
                    .zip(comparators.into_vec())
                    .map(|(op, right)| Ok((convert_compare_op(op), self.parse_expression(right)?)))
                    .collect::<Result<Vec<_>, RunError>>()?;
                Ok(Expr::Compare { left, comparisons })
            }
            AstExpr::Call(ast::ExprCall { func, arguments, .. }) => {
                let ast::Arguments { args, keywords, .. } = arguments;
                let mut positional = Vec::with_capacity(args.len());
                for arg in args.into_vec() {
                    if matches!(arg, AstExpr::Starred(_)) {
                        return Err(self.unsupported("*args unpacking", range));
                    }
                    positional.push(self.parse_expression(arg)?);
                }
                let mut kwargs = Vec::with_capacity(keywords.len());
                for keyword in keywords.into_iter() {
                    let Some(key) = keyword.arg else {
                        return Err(self.unsupported("**kwargs unpacking", range));
                    };
                    kwargs.push((key.id.to_string(), self.parse_expression(keyword.value)?));
                }
                Ok(Expr::Call {
                    callable: self.parse_boxed(*func)?,
                    args: positional,
                    kwargs,
                })
            }
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => {
                Ok(Expr::Literal(Literal::Str(value.to_string())))
            }
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value, .. }) => match value {
                Number::Int(i) => i
                    .as_i64()
                    .map(|i| Expr::Literal(Literal::Int(i)))
                    .ok_or_else(|| self.syntax_error(format!("integer literal too large: {i}"), range)),
                Number::Float(f) => Ok(Expr::Literal(Literal::Float(f))),
                Number::Complex { .. } => Err(self.unsupported("complex literals", range)),
            },
            AstExpr::BooleanLiteral(ast::ExprBooleanLiteral { value, .. }) => Ok(Expr::Literal(Literal::Bool(value))),
            AstExpr::NoneLiteral(_) => Ok(Expr::Literal(Literal::None)),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Ok(Expr::Attr {
                object: self.parse_boxed(*value)?,
                attr: attr.id().to_string(),
            }),
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                if matches!(*slice, AstExpr::Slice(_)) {
                    return Err(self.unsupported("slicing", range));
                }
                Ok(Expr::Subscript {
                    object: self.parse_boxed(*value)?,
                    index: self.parse_boxed(*slice)?,
                })
            }
            AstExpr::Name(ast::ExprName { id, .. }) => Ok(Expr::Name(id.to_string())),
            AstExpr::List(ast::ExprList { elts, .. }) => Ok(Expr::List(self.parse_elements(elts, range)?)),
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Ok(Expr::Tuple(self.parse_elements(elts, range)?)),
            _ => Err(self.unsupported("this expression", range)),
        }
    }

    fn parse_elements(&mut self, elts: Vec<AstExpr>, range: TextRange) -> Result<Vec<ExprLoc>, RunError> {
        if elts.iter().any(|e| matches!(e, AstExpr::Starred(_))) {
            return Err(self.unsupported("starred expressions", range));
        }
        elts.into_iter().map(|e| self.parse_expression(e)).collect()
    }

    fn decr_depth_remaining(&mut self, range: TextRange) -> Result<(), RunError> {
        if let Some(depth_remaining) = self.depth_remaining.checked_sub(1) {
            self.depth_remaining = depth_remaining;
            Ok(())
        } else {
            Err(self.syntax_error("too many nested statements or expressions", range))
        }
    }
}

fn convert_op(op: AstOperator) -> Option<Operator> {
    match op {
        AstOperator::Add => Some(Operator::Add),
        AstOperator::Sub => Some(Operator::Sub),
        AstOperator::Mult => Some(Operator::Mult),
        AstOperator::Div => Some(Operator::Div),
        AstOperator::FloorDiv => Some(Operator::FloorDiv),
        AstOperator::Mod => Some(Operator::Mod),
        AstOperator::Pow => Some(Operator::Pow),
        _ => None,
    }
}

fn convert_compare_op(op: CmpOp) -> CmpOperator {
    match op {
        CmpOp::Eq => CmpOperator::Eq,
        CmpOp::NotEq => CmpOperator::NotEq,
        CmpOp::Lt => CmpOperator::Lt,
        CmpOp::LtE => CmpOperator::LtE,
        CmpOp::Gt => CmpOperator::Gt,
        CmpOp::GtE => CmpOperator::GtE,
        CmpOp::Is => CmpOperator::Is,
        CmpOp::IsNot => CmpOperator::IsNot,
        CmpOp::In => CmpOperator::In,
        CmpOp::NotIn => CmpOperator::NotIn,
    }
}
