//! Tree-walking evaluator.
//!
//! An [`Interp`] borrows the runtime for the duration of one crossing. Faults
//! travel as `Err(RunError)`; each function activation appends its frame as the
//! error leaves it, so the traceback is innermost first.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::{
    builtins::Builtin,
    exception::{ExcType, RunError, RunResult, StackFrame},
    expressions::{Expr, ExprLoc, FunctionDef, Literal, Node, NodeKind, Target},
    heap::HeapData,
    runtime::{RootModule, Runtime},
    types::{ExceptionObject, Function},
    value::Value,
};

/// How a statement finished.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// One function activation (or the top-level module activation).
struct Activation {
    function: String,
    /// Line of the statement currently executing.
    line: u32,
    /// `None` at top level, where bindings go straight to `Main`.
    locals: Option<AHashMap<String, Value>>,
    globals: AHashSet<String>,
}

impl Activation {
    fn module() -> Self {
        Self {
            function: "<module>".to_owned(),
            line: 0,
            locals: None,
            globals: AHashSet::new(),
        }
    }

    fn function(name: &str, locals: AHashMap<String, Value>) -> Self {
        Self {
            function: name.to_owned(),
            line: 0,
            locals: Some(locals),
            globals: AHashSet::new(),
        }
    }
}

pub(crate) struct Interp<'a> {
    rt: &'a mut Runtime,
    frames: Vec<Activation>,
    /// Exceptions currently being handled, innermost last; target of a bare `raise`.
    handling: Vec<RunError>,
}

impl<'a> Interp<'a> {
    pub(crate) fn new(rt: &'a mut Runtime) -> Self {
        Self {
            rt,
            frames: Vec::new(),
            handling: Vec::new(),
        }
    }

    /// Runs a parsed script at top level and computes its result value.
    pub(crate) fn run_module(mut self, nodes: &[Node]) -> RunResult<Value> {
        self.frames.push(Activation::module());
        let result = self.run_top_level(nodes);
        let activation = self.frames.pop();
        result.map_err(|mut err| {
            if let Some(activation) = activation {
                err.push_frame(self.frame_of(&activation));
            }
            err
        })
    }

    fn run_top_level(&mut self, nodes: &[Node]) -> RunResult<Value> {
        let (init, trailing) = match nodes.split_last() {
            Some((last, init)) => match &last.kind {
                NodeKind::Expr(expr) => (init, Some((last.line, expr))),
                _ => (nodes, None),
            },
            None => (nodes, None),
        };
        match self.exec_block(init)? {
            Flow::Return(value) => return Ok(value),
            Flow::Break | Flow::Continue => return Err(outside_loop()),
            Flow::Normal => {}
        }
        match trailing {
            Some((line, expr)) => {
                self.set_line(line);
                self.eval(expr)
            }
            None => Ok(Value::None),
        }
    }

    fn frame_of(&self, activation: &Activation) -> StackFrame {
        StackFrame::new(
            activation.function.clone(),
            self.rt.config.script_name.clone(),
            (activation.line > 0).then_some(activation.line),
        )
    }

    fn set_line(&mut self, line: u32) {
        if let Some(activation) = self.frames.last_mut() {
            activation.line = line;
        }
    }

    // --- statements ---

    fn exec_block(&mut self, nodes: &[Node]) -> RunResult<Flow> {
        for node in nodes {
            let flow = self.exec(node)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, node: &Node) -> RunResult<Flow> {
        self.set_line(node.line);
        match &node.kind {
            NodeKind::Expr(expr) => {
                self.eval(expr)?;
            }
            NodeKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value)?;
                }
            }
            NodeKind::AugAssign { target, op, value } => match target {
                Target::Name(name) => {
                    let current = self.load_name(name)?;
                    let rhs = self.eval(value)?;
                    let updated = self.rt.binary_op(*op, current, rhs)?;
                    self.store_name(name, updated);
                }
                Target::Attr { object, attr } => {
                    let object = self.eval(object)?;
                    let current = self.rt.get_attr(object, attr)?;
                    let rhs = self.eval(value)?;
                    let updated = self.rt.binary_op(*op, current, rhs)?;
                    self.rt.set_attr(object, attr, updated)?;
                }
                Target::Subscript { object, index } => {
                    let object = self.eval(object)?;
                    let index = self.eval(index)?;
                    let current = self.rt.subscript(object, index)?;
                    let rhs = self.eval(value)?;
                    let updated = self.rt.binary_op(*op, current, rhs)?;
                    self.rt.store_subscript(object, index, updated)?;
                }
                Target::Unpack(_) => {
                    return Err(RunError::new(
                        ExcType::SyntaxError,
                        "illegal expression for augmented assignment",
                    ));
                }
            },
            NodeKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            NodeKind::If { test, body, or_else } => {
                let test = self.eval(test)?;
                let branch = if self.rt.truthy(test) { body } else { or_else };
                return self.exec_block(branch);
            }
            NodeKind::While { test, body } => loop {
                let test_value = self.eval(test)?;
                if !self.rt.truthy(test_value) {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
                self.set_line(node.line);
            },
            NodeKind::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                for item in self.rt.iterate(iterable)? {
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            NodeKind::Try { body, handlers } => {
                let err = match self.exec_block(body) {
                    Ok(flow) => return Ok(flow),
                    Err(err) => err,
                };
                for handler in handlers {
                    let matches = match &handler.exc_type {
                        None => true,
                        Some(expr) => {
                            let handled = self.eval(expr)?;
                            self.handler_matches(handled, err.exc_type())?
                        }
                    };
                    if matches {
                        if let Some(name) = &handler.name {
                            let exception = self.exception_object(&err);
                            self.store_name(name, exception);
                        }
                        self.handling.push(err);
                        let result = self.exec_block(&handler.body);
                        self.handling.pop();
                        return result;
                    }
                }
                return Err(err);
            }
            NodeKind::FunctionDef(def) => {
                let function = self.make_function(def)?;
                self.store_name(&def.name, function);
            }
            NodeKind::Global(names) => {
                if let Some(activation) = self.frames.last_mut() {
                    activation.globals.extend(names.iter().cloned());
                }
            }
            NodeKind::Raise(None) => {
                return Err(self
                    .handling
                    .last()
                    .cloned()
                    .map(|mut err| {
                        err.0.frames.clear();
                        err
                    })
                    .unwrap_or_else(|| RunError::new(ExcType::RuntimeError, "No active exception to reraise")));
            }
            NodeKind::Raise(Some(expr)) => {
                let raised = self.eval(expr)?;
                return Err(self.raised_error(raised));
            }
            NodeKind::Assert { test, msg } => {
                let test = self.eval(test)?;
                if !self.rt.truthy(test) {
                    let message = match msg {
                        Some(msg) => {
                            let msg = self.eval(msg)?;
                            self.rt.str_of(msg)
                        }
                        None => String::new(),
                    };
                    return Err(RunError::new(ExcType::AssertionError, message));
                }
            }
            NodeKind::Break => return Ok(Flow::Break),
            NodeKind::Continue => return Ok(Flow::Continue),
            NodeKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn handler_matches(&self, handled: Value, raised: ExcType) -> RunResult<bool> {
        let types = match self.rt.sequence_items(handled) {
            Some(items) => items.to_vec(),
            None => vec![handled],
        };
        for candidate in types {
            match candidate {
                Value::Builtin(Builtin::Exc(exc_type)) => {
                    if raised.is_subclass_of(exc_type) {
                        return Ok(true);
                    }
                }
                other => {
                    return Err(RunError::type_error(format!(
                        "catching '{}' that does not inherit from Exception is not allowed",
                        self.rt.type_name(other)
                    )));
                }
            }
        }
        Ok(false)
    }

    fn exception_object(&mut self, err: &RunError) -> Value {
        let object = ExceptionObject {
            exc_type: err.exc_type(),
            message: err.0.message.clone(),
        };
        Value::Ref(self.rt.heap.allocate(HeapData::Exception(object)))
    }

    fn raised_error(&self, raised: Value) -> RunError {
        match raised {
            Value::Builtin(Builtin::Exc(exc_type)) => RunError::new(exc_type, ""),
            Value::Ref(id) => match self.rt.heap.get(id) {
                HeapData::Exception(e) => RunError::new(e.exc_type, e.message.clone()),
                _ => not_an_exception(),
            },
            _ => not_an_exception(),
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> RunResult<()> {
        match target {
            Target::Name(name) => {
                self.store_name(name, value);
                Ok(())
            }
            Target::Attr { object, attr } => {
                let object = self.eval(object)?;
                self.rt.set_attr(object, attr, value)
            }
            Target::Subscript { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.rt.store_subscript(object, index, value)
            }
            Target::Unpack(targets) => {
                let items = self.rt.iterate(value)?;
                if items.len() != targets.len() {
                    return Err(RunError::value_error(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    }));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    // --- names ---

    fn load_name(&self, name: &str) -> RunResult<Value> {
        if let Some(activation) = self.frames.last()
            && !activation.globals.contains(name)
            && let Some(found) = activation.locals.as_ref().and_then(|locals| locals.get(name))
        {
            return Ok(*found);
        }
        self.rt
            .resolve_global(name)
            .ok_or_else(|| RunError::new(ExcType::NameError, format!("name '{name}' is not defined")))
    }

    fn store_name(&mut self, name: &str, value: Value) {
        if let Some(activation) = self.frames.last_mut()
            && !activation.globals.contains(name)
            && let Some(locals) = activation.locals.as_mut()
        {
            locals.insert(name.to_owned(), value);
            return;
        }
        let main = self.rt.module_id(RootModule::Main);
        if let HeapData::Module(module) = self.rt.heap.get_mut(main) {
            module.namespace.insert(name.to_owned(), value);
        }
    }

    // --- expressions ---

    fn eval(&mut self, expr: &ExprLoc) -> RunResult<Value> {
        match &expr.expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => self.rt.alloc_str(s.clone()),
            }),
            Expr::Name(name) => self.load_name(name),
            Expr::Op { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.rt.binary_op(*op, left, right)
            }
            Expr::Not(operand) => {
                let operand = self.eval(operand)?;
                Ok(Value::Bool(!self.rt.truthy(operand)))
            }
            Expr::UnaryMinus(operand) => {
                let operand = self.eval(operand)?;
                self.rt.negate(operand)
            }
            Expr::UnaryPlus(operand) => match self.eval(operand)? {
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                number @ (Value::Int(_) | Value::Float(_)) => Ok(number),
                other => Err(RunError::type_error(format!(
                    "bad operand type for unary +: '{}'",
                    self.rt.type_name(other)
                ))),
            },
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if self.rt.truthy(left) { self.eval(right) } else { Ok(left) }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if self.rt.truthy(left) { Ok(left) } else { self.eval(right) }
            }
            Expr::Compare { left, comparisons } => {
                let mut left = self.eval(left)?;
                for (op, right) in comparisons {
                    let right = self.eval(right)?;
                    if !self.rt.compare_op(*op, left, right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call {
                callable,
                args,
                kwargs,
            } => {
                let callable = self.eval(callable)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<RunResult<SmallVec<[Value; 4]>>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, value)| -> RunResult<(String, Value)> { Ok((name.clone(), self.eval(value)?)) })
                    .collect::<RunResult<Vec<_>>>()?;
                self.call_value(callable, &args, &kwargs)
            }
            Expr::Attr { object, attr } => {
                let object = self.eval(object)?;
                self.rt.get_attr(object, attr)
            }
            Expr::Subscript { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.rt.subscript(object, index)
            }
            Expr::List(items) => {
                let items = self.eval_all(items)?;
                Ok(self.rt.alloc_list(items))
            }
            Expr::Tuple(items) => {
                let items = self.eval_all(items)?;
                Ok(self.rt.alloc_tuple(items))
            }
            Expr::Dict(pairs) => {
                let pairs = pairs
                    .iter()
                    .map(|(k, v)| -> RunResult<(Value, Value)> { Ok((self.eval(k)?, self.eval(v)?)) })
                    .collect::<RunResult<Vec<_>>>()?;
                self.rt.new_dict(pairs)
            }
            Expr::Lambda(def) => self.make_function(def),
            Expr::IfElse { test, body, orelse } => {
                let test = self.eval(test)?;
                if self.rt.truthy(test) {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
        }
    }

    fn eval_all(&mut self, items: &[ExprLoc]) -> RunResult<Vec<Value>> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn make_function(&mut self, def: &Arc<FunctionDef>) -> RunResult<Value> {
        let defaults = self.eval_all(&def.defaults)?;
        let captures = self
            .frames
            .last()
            .and_then(|activation| activation.locals.as_ref())
            .map(|locals| locals.iter().map(|(name, value)| (name.clone(), *value)).collect())
            .unwrap_or_default();
        let function = Function {
            def: Arc::clone(def),
            defaults,
            captures,
        };
        Ok(Value::Ref(self.rt.heap.allocate(HeapData::Function(function))))
    }

    // --- calls ---

    /// Invokes any callable value. Native functions contribute a `<builtin>` frame on failure.
    pub(crate) fn call_value(
        &mut self,
        callable: Value,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> RunResult<Value> {
        match callable {
            Value::Builtin(builtin) => self.rt.call_builtin(builtin, args, kwargs).map_err(|mut err| {
                err.push_frame(StackFrame::builtin(builtin.name()));
                err
            }),
            Value::Ref(id) => match self.rt.heap.get(id) {
                HeapData::Function(function) => {
                    let def = Arc::clone(&function.def);
                    let defaults = function.defaults.clone();
                    let captures = function.captures.clone();
                    self.call_function(&def, &defaults, captures, args, kwargs)
                }
                HeapData::Method(method) => {
                    let (receiver, method) = (method.receiver, method.method);
                    self.rt.call_method(receiver, method, args, kwargs).map_err(|mut err| {
                        err.push_frame(StackFrame::builtin(method.name()));
                        err
                    })
                }
                _ => Err(self.not_callable(callable)),
            },
            _ => Err(self.not_callable(callable)),
        }
    }

    fn not_callable(&self, value: Value) -> RunError {
        RunError::type_error(format!("'{}' object is not callable", self.rt.type_name(value)))
    }

    fn call_function(
        &mut self,
        def: &FunctionDef,
        defaults: &[Value],
        captures: Vec<(String, Value)>,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> RunResult<Value> {
        if self.frames.len() >= self.rt.config.max_recursion_depth {
            return Err(RunError::new(ExcType::RecursionError, "maximum recursion depth exceeded"));
        }
        let locals = bind_arguments(def, defaults, captures, args, kwargs)?;

        self.frames.push(Activation::function(&def.name, locals));
        let depth = self.frames.len();
        self.rt.tracer.on_call(&def.name, depth);
        let result = self.exec_block(&def.body);
        let activation = self.frames.pop();
        self.rt.tracer.on_return(depth - 1);

        match result {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(Flow::Normal) => Ok(Value::None),
            Ok(Flow::Break | Flow::Continue) => Err(outside_loop()),
            Err(mut err) => {
                if let Some(activation) = activation {
                    err.push_frame(self.frame_of(&activation));
                }
                Err(err)
            }
        }
    }
}

/// Builds the local scope of a call: captures, then positional, keyword and default arguments.
fn bind_arguments(
    def: &FunctionDef,
    defaults: &[Value],
    captures: Vec<(String, Value)>,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> RunResult<AHashMap<String, Value>> {
    let params = &def.params;
    if args.len() > params.len() {
        return Err(RunError::type_error(format!(
            "{}() takes {} positional argument{} but {} {} given",
            def.name,
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.len(),
            if args.len() == 1 { "was" } else { "were" },
        )));
    }

    let mut bound: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, arg) in bound.iter_mut().zip(args) {
        *slot = Some(*arg);
    }
    for (name, value) in kwargs {
        let Some(position) = params.iter().position(|param| param == name) else {
            return Err(RunError::type_error(format!(
                "{}() got an unexpected keyword argument '{name}'",
                def.name
            )));
        };
        if bound[position].replace(*value).is_some() {
            return Err(RunError::type_error(format!(
                "{}() got multiple values for argument '{name}'",
                def.name
            )));
        }
    }

    let first_default = params.len() - defaults.len();
    let mut locals: AHashMap<String, Value> = captures.into_iter().collect();
    for (position, (param, slot)) in params.iter().zip(bound).enumerate() {
        let value = match slot {
            Some(value) => value,
            None if position >= first_default => defaults[position - first_default],
            None => {
                return Err(RunError::type_error(format!(
                    "{}() missing required argument: '{param}'",
                    def.name
                )));
            }
        };
        locals.insert(param.clone(), value);
    }
    Ok(locals)
}

fn outside_loop() -> RunError {
    RunError::new(ExcType::SyntaxError, "'break' or 'continue' outside loop")
}

fn not_an_exception() -> RunError {
    RunError::type_error("exceptions must derive from Exception")
}
