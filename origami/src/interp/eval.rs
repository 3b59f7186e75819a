//! Expression and statement evaluator

use super::call;
use super::class::ClassValue;
use super::control::{Control, Flow};
use super::env::Context;
use super::error;
use super::object::ObjectValue;
use super::value::{AsFloat, AsInt, AsString, Callable, Value};
use crate::ast::{AssignOp, Ast, BinOp, Node, Span, UnaryOp, Variable};
use crate::error::Error;
use crate::types::Type;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

/// Stack growth parameters for deep recursion
const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Run a file's top-level statements. A top-level `return` becomes a
/// [`Value::Return`].
pub fn run_program(stmts: &[Ast], ctx: &Context) -> Flow<Value> {
    match exec_block(stmts, ctx) {
        Ok(_) => Ok(Value::Null),
        Err(Control::Return(value)) => Ok(Value::Return(Box::new(value))),
        Err(Control::Returns(values)) => Ok(Value::Return(Box::new(Value::array(values)))),
        Err(other) => Err(other),
    }
}

/// Execute statements in order; the first non-local exit stops the block.
/// Yields the value of the last statement.
pub fn exec_block(stmts: &[Ast], ctx: &Context) -> Flow<Value> {
    let mut last = Value::Null;
    for stmt in stmts {
        last = eval(stmt, ctx)?;
    }
    Ok(last)
}

/// Evaluate a node with automatic stack growth for deep recursion
pub fn eval(ast: &Ast, ctx: &Context) -> Flow<Value> {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || eval_inner(ast, ctx))
}

fn eval_inner(ast: &Ast, ctx: &Context) -> Flow<Value> {
    let span = ast.span;
    match &ast.node {
        Node::Null => Ok(Value::Null),
        Node::Bool(b) => Ok(Value::Bool(*b)),
        Node::Int(n) => Ok(Value::Int(*n)),
        Node::Float(f) => Ok(Value::Float(*f)),
        Node::Str(s) => Ok(Value::from(s.as_str())),
        Node::Array(items) => {
            let values = items.iter().map(|i| eval(i, ctx)).collect::<Flow<Vec<_>>>()?;
            Ok(Value::array(values))
        }
        Node::Object(pairs) => {
            let object = ObjectValue::new();
            for (key, value) in pairs {
                let key = eval(key, ctx)?.to_display_string();
                object.set(key, eval(value, ctx)?);
            }
            Ok(Value::object(object))
        }

        Node::Variable(var) => ctx.get_variable_value(var),
        Node::VariableList(vars) => {
            let values = vars
                .iter()
                .map(|v| ctx.get_variable_value(v))
                .collect::<Flow<Vec<_>>>()?;
            Ok(Value::array(values))
        }
        Node::This => match ctx.this() {
            Some(this) => Ok(Value::Class(this.clone())),
            None => Err(error::runtime("$this used outside of an object context", span)),
        },
        Node::Ident(name) => Ok(lookup_constant(name, ctx).unwrap_or_else(|| Value::from(name.as_str()))),
        Node::Const { name, value } => {
            let value = eval(value, ctx)?;
            ctx.vm().add_constant(name, value.clone());
            Ok(value)
        }

        Node::Assign { target, op, value } => eval_assign(target, *op, value, ctx, span),
        Node::Binary { op: BinOp::And, lhs, rhs } => {
            Ok(Value::Bool(eval(lhs, ctx)?.is_truthy() && eval(rhs, ctx)?.is_truthy()))
        }
        Node::Binary { op: BinOp::Or, lhs, rhs } => {
            Ok(Value::Bool(eval(lhs, ctx)?.is_truthy() || eval(rhs, ctx)?.is_truthy()))
        }
        Node::Binary { op, lhs, rhs } => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            binary_op(*op, &l, &r, span)
        }
        Node::Unary { op, operand } => {
            let value = eval(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match numeric(&value) {
                    Some(Num::Int(n)) => Ok(n
                        .checked_neg()
                        .map(Value::Int)
                        .unwrap_or(Value::Float(-(n as f64)))),
                    Some(Num::Float(f)) => Ok(Value::Float(-f)),
                    None => Err(error::unsupported_operand("-", "", &value.type_name(), span)),
                },
            }
        }
        Node::IncDec {
            target,
            increment,
            prefix,
        } => {
            let old = eval(target, ctx)?;
            let delta = if *increment { 1 } else { -1 };
            let new = match numeric(&old) {
                Some(Num::Int(n)) => n
                    .checked_add(delta)
                    .map(Value::Int)
                    .unwrap_or(Value::Float(n as f64 + delta as f64)),
                Some(Num::Float(f)) => Value::Float(f + delta as f64),
                None => {
                    let op = if *increment { "++" } else { "--" };
                    return Err(error::unsupported_operand(op, &old.type_name(), "", span));
                }
            };
            assign_to(target, new.clone(), ctx, span)?;
            Ok(if *prefix { new } else { old })
        }
        Node::Ternary {
            cond,
            then,
            otherwise,
        } => {
            let c = eval(cond, ctx)?;
            if c.is_truthy() {
                match then {
                    Some(then) => eval(then, ctx),
                    None => Ok(c),
                }
            } else {
                eval(otherwise, ctx)
            }
        }
        Node::NullCoalesce { lhs, rhs } => match eval(lhs, ctx) {
            Ok(value) if !value.is_null() => Ok(value),
            Ok(_) | Err(Control::Throw(_)) => eval(rhs, ctx),
            Err(other) => Err(other),
        },
        Node::InstanceOf { value, class } => {
            let value = eval(value, ctx)?;
            Ok(Value::Bool(instance_of(&value, class)))
        }
        Node::Like { value, class } => {
            let value = eval(value, ctx)?;
            Ok(Value::Bool(like(&value, class, ctx)))
        }
        Node::Cast { ty, value } => {
            let value = eval(value, ctx)?;
            cast(ty, value, span)
        }

        Node::Call {
            name,
            candidates,
            args,
        } => {
            let callable = candidates
                .iter()
                .chain(std::iter::once(name))
                .find_map(|n| ctx.vm().get_func(n))
                .ok_or_else(|| error::undefined_function(name, span))?;
            trace!(function = %name, "call");
            call::call_callable(&callable, args, ctx, span)
        }
        Node::CallValue { callee, args } => {
            let callee = eval(callee, ctx)?;
            let callable = callable_of(&callee, ctx, span)?;
            call::call_callable(&callable, args, ctx, span)
        }
        Node::MethodCall {
            object,
            method,
            args,
        } => {
            let object = eval(object, ctx)?;
            call::call_method_on(&object, method, args, ctx, span)
        }
        Node::Property { object, name } => {
            let object = eval(object, ctx)?;
            get_property(&object, name, ctx, span)
        }
        Node::Index { object, index } => {
            let container = eval(object, ctx)?;
            let Some(index) = index else {
                return Err(error::runtime("cannot use [] for reading", span));
            };
            let index = eval(index, ctx)?;
            get_index(&container, index, ctx, span)
        }
        Node::Slice { object, start, end } => {
            let container = eval(object, ctx)?;
            let start = start.as_ref().map(|s| eval(s, ctx)).transpose()?;
            let end = end.as_ref().map(|e| eval(e, ctx)).transpose()?;
            slice(&container, start, end, span)
        }
        Node::StaticCall {
            class,
            method,
            args,
        } => call::call_static(class, method, args, ctx, span),
        Node::StaticProperty { class, name } => {
            let class = call::resolve_class(class, ctx, span)?;
            call::static_property(&class, name, ctx, span)
        }
        Node::ParentCall { method, args } => call::call_parent(method, args, ctx, span),
        Node::New {
            class,
            type_args,
            args,
        } => call::instantiate(class, type_args, args, ctx, span),
        Node::InitClass { class, fields } => {
            let class = call::resolve_class(class, ctx, span)?;
            let generic = class
                .clone_generic(Vec::new())
                .map_err(|e| Control::throw(e.with_span(span)))?;
            let instance = call::new_instance(&generic, ctx, span)?;
            for (name, value) in fields {
                let value = eval(value, ctx)?;
                set_class_property(&instance, name, value, ctx, span)?;
            }
            Ok(Value::Class(instance))
        }

        Node::Lambda(lambda) => Ok(Value::func(Callable::Closure {
            lambda: lambda.clone(),
            ctx: ctx.clone(),
        })),
        Node::FunctionDecl(decl) => {
            if ctx.vm().get_func(&decl.name).is_none() {
                ctx.vm().add_func(decl.clone());
            }
            Ok(Value::Null)
        }
        Node::ClassDecl(class) => {
            if ctx.vm().get_class(&class.name).is_none() {
                ctx.vm()
                    .add_class(class.clone())
                    .map_err(Control::throw)?;
            }
            Ok(Value::Null)
        }
        Node::InterfaceDecl(iface) => {
            ctx.vm()
                .add_interface(iface.clone())
                .map_err(Control::throw)?;
            Ok(Value::Null)
        }

        Node::Block(stmts) => exec_block(stmts, ctx),
        Node::Echo(items) => {
            for item in items {
                let value = eval(item, ctx)?;
                ctx.vm().write_output(&value.to_display_string());
            }
            Ok(Value::Null)
        }
        Node::If {
            cond,
            then,
            elifs,
            otherwise,
        } => {
            if eval(cond, ctx)?.is_truthy() {
                return eval(then, ctx);
            }
            for (cond, body) in elifs {
                if eval(cond, ctx)?.is_truthy() {
                    return eval(body, ctx);
                }
            }
            match otherwise {
                Some(body) => eval(body, ctx),
                None => Ok(Value::Null),
            }
        }
        Node::While { cond, body } => {
            while eval(cond, ctx)?.is_truthy() {
                if !loop_body(body, ctx)? {
                    break;
                }
            }
            Ok(Value::Null)
        }
        Node::DoWhile { body, cond } => {
            loop {
                if !loop_body(body, ctx)? || !eval(cond, ctx)?.is_truthy() {
                    break;
                }
            }
            Ok(Value::Null)
        }
        Node::For {
            init,
            cond,
            step,
            body,
        } => {
            for stmt in init {
                eval(stmt, ctx)?;
            }
            loop {
                if let Some(cond) = cond {
                    if !eval(cond, ctx)?.is_truthy() {
                        break;
                    }
                }
                if !loop_body(body, ctx)? {
                    break;
                }
                for stmt in step {
                    eval(stmt, ctx)?;
                }
            }
            Ok(Value::Null)
        }
        Node::Foreach {
            iterable,
            key,
            value,
            body,
        } => {
            let iterable = eval(iterable, ctx)?;
            for (k, v) in iteration_pairs(&iterable, ctx, span)? {
                if let Some(key) = key {
                    ctx.set_variable_value(key, k, span)?;
                }
                ctx.set_variable_value(value, v, span)?;
                if !loop_body(body, ctx)? {
                    break;
                }
            }
            Ok(Value::Null)
        }
        Node::Switch { subject, cases } => {
            let subject = eval(subject, ctx)?;
            let mut start = None;
            for (i, case) in cases.iter().enumerate() {
                if let Some(pattern) = &case.pattern {
                    if eval(pattern, ctx)?.loose_eq(&subject) {
                        start = Some(i);
                        break;
                    }
                }
            }
            let start = start.or_else(|| cases.iter().position(|c| c.pattern.is_none()));
            if let Some(start) = start {
                for case in &cases[start..] {
                    match exec_block(&case.body, ctx) {
                        Ok(_) => {}
                        Err(Control::Break(_)) => break,
                        Err(other) => return Err(other),
                    }
                }
            }
            Ok(Value::Null)
        }
        Node::Match {
            subject,
            arms,
            default,
        } => {
            let subject = eval(subject, ctx)?;
            for arm in arms {
                for pattern in &arm.patterns {
                    if eval(pattern, ctx)?.strict_eq(&subject) {
                        return eval(&arm.body, ctx);
                    }
                }
            }
            match default {
                Some(body) => eval(body, ctx),
                None => Err(error::runtime(
                    format!("unhandled match value: {}", subject.to_display_string()),
                    span,
                )),
            }
        }
        Node::Try {
            body,
            catches,
            finally,
        } => {
            let result = match eval(body, ctx) {
                Err(control @ Control::Throw(_)) => {
                    let thrown = control.thrown_value().unwrap_or(Value::Null);
                    match catches.iter().find(|c| catches_value(&c.class, &thrown)) {
                        Some(catch) => {
                            if let Some(var) = &catch.var {
                                ctx.set_index_value(var.index, thrown);
                            }
                            eval(&catch.body, ctx)
                        }
                        None => Err(control),
                    }
                }
                other => other,
            };
            if let Some(finally) = finally {
                eval(finally, ctx)?;
            }
            result
        }
        Node::Throw(value) => {
            let value = eval(value, ctx)?;
            Err(throw_value(value, span))
        }
        Node::Return(value) => {
            let value = match value {
                Some(v) => eval(v, ctx)?,
                None => Value::Null,
            };
            Err(Control::Return(value))
        }
        Node::Returns(values) => {
            let values = values.iter().map(|v| eval(v, ctx)).collect::<Flow<Vec<_>>>()?;
            Err(Control::Returns(values))
        }
        Node::Break => Err(Control::Break(None)),
        Node::Continue => Err(Control::Continue(None)),
        Node::Spawn(unit) => spawn(unit, ctx, span),
        Node::Namespace { name, body } => match body {
            None => {
                ctx.set_namespace(name);
                Ok(Value::Null)
            }
            Some(body) => {
                let previous = ctx.get_namespace();
                ctx.set_namespace(name);
                let result = exec_block(body, ctx);
                ctx.set_namespace(&previous);
                result
            }
        },
    }
}

/// Run one loop iteration. `Ok(false)` means the loop should stop.
fn loop_body(body: &Ast, ctx: &Context) -> Flow<bool> {
    match eval(body, ctx) {
        Ok(_) | Err(Control::Continue(_)) => Ok(true),
        Err(Control::Break(_)) => Ok(false),
        Err(other) => Err(other),
    }
}

fn lookup_constant(name: &str, ctx: &Context) -> Option<Value> {
    let namespace = ctx.get_namespace();
    if !namespace.is_empty() {
        if let Some(value) = ctx.vm().get_constant(&format!("{namespace}\\{name}")) {
            return Some(value);
        }
    }
    ctx.vm().get_constant(name)
}

/// Run `unit` on its own thread. A throw that escapes the unit goes to the
/// VM throw handler; any other control (`exit`, a stray `break`) only ends
/// that thread.
fn spawn(unit: &Ast, ctx: &Context, span: Span) -> Flow<Value> {
    let unit = unit.clone();
    let ctx = ctx.clone();
    let vm = ctx.vm().clone();
    let id = vm.next_task_id();
    debug!(task = id, "spawn");
    let result = std::thread::Builder::new()
        .name(format!("origami-spawn-{id}"))
        .spawn(move || {
            let result = match &unit.node {
                Node::Lambda(_) => eval(&unit, &ctx).and_then(|f| {
                    let callable = callable_of(&f, &ctx, unit.span)?;
                    call::call_with_values(&callable, Vec::new(), &ctx, unit.span)
                }),
                _ => eval(&unit, &ctx),
            };
            match result {
                Err(control) if control.is_throw() => {
                    let _ = vm.throw_control(control);
                }
                Err(control) => debug!(task = id, ?control, "spawned unit ended with a stray control"),
                Ok(_) => {}
            }
            trace!(task = id, "spawned unit finished");
        });
    match result {
        Ok(_) => Ok(Value::Null),
        Err(err) => Err(error::runtime(format!("spawn failed: {err}"), span)),
    }
}

/// Turn a thrown language value into a throw control.
pub fn throw_value(value: Value, span: Span) -> Control {
    match value.deref_value() {
        Value::Throw(err) => Control::throw((*err).clone()),
        Value::Class(instance) => {
            let message = instance
                .get_property("message")
                .map(|m| m.to_display_string())
                .unwrap_or_else(|| format!("uncaught {}", instance.class_name()));
            Control::throw(Error::runtime(message, span).with_thrown(Value::Class(instance)))
        }
        other => Control::throw(Error::runtime(other.to_display_string(), span)),
    }
}

fn catches_value(class: &str, thrown: &Value) -> bool {
    matches!(class, "Exception" | "Throwable" | "\\Exception" | "\\Throwable")
        || instance_of(thrown, class)
}

pub fn instance_of(value: &Value, class: &str) -> bool {
    match value.deref_value() {
        Value::Class(instance) => instance.instance_of(class),
        Value::Throw(_) => matches!(class, "Throwable" | "Exception"),
        _ => false,
    }
}

/// Structural check: the value offers every method the named interface or
/// class declares.
fn like(value: &Value, class: &str, ctx: &Context) -> bool {
    let vm = ctx.vm();
    let required: Vec<String> = if vm.get_interface(class).is_some() {
        vm.interface_methods(class)
    } else if let Ok(target) = vm.get_or_load_class(class) {
        target
            .ancestry(vm)
            .iter()
            .flat_map(|c| c.methods.values())
            .filter(|m| m.modifier == super::class::Modifier::Public && m.name != "__construct")
            .map(|m| m.name.clone())
            .collect()
    } else if vm.get_or_load_interface(class).is_ok() {
        vm.interface_methods(class)
    } else {
        return false;
    };
    match value.deref_value() {
        Value::Class(instance) => required
            .iter()
            .all(|m| instance.stmt().find_method(vm, m).is_some()),
        Value::Object(object) => required
            .iter()
            .all(|m| matches!(object.get(m), Some(Value::Func(_)))),
        _ => false,
    }
}

fn cast(ty: &Type, value: Value, span: Span) -> Flow<Value> {
    let value = value.deref_value();
    let got = value.type_name();
    let failed = || error::type_mismatch("cast", ty, &got, span);
    match ty {
        Type::Int => value.as_int().map(Value::Int).ok_or_else(failed),
        Type::Float => value.as_float().map(Value::Float).ok_or_else(failed),
        Type::String => match value.as_string() {
            Some(s) => Ok(Value::from(s)),
            None => Ok(Value::from(value.to_display_string())),
        },
        Type::Bool => Ok(Value::Bool(value.is_truthy())),
        Type::Array => Ok(match value {
            Value::Array(_) => value,
            Value::Null => Value::array(Vec::new()),
            Value::Object(object) => Value::array(object.entries().into_iter().map(|(_, v)| v).collect()),
            other => Value::array(vec![other]),
        }),
        other => {
            if other.is(&value) {
                Ok(value)
            } else {
                Err(failed())
            }
        }
    }
}

/// Resolve a value to something callable: closures, function names, or
/// `[object, "method"]` pairs.
pub fn callable_of(value: &Value, ctx: &Context, span: Span) -> Flow<Arc<Callable>> {
    match value.deref_value() {
        Value::Func(callable) => Ok(callable),
        Value::Str(name) => ctx
            .vm()
            .get_func(&name)
            .ok_or_else(|| error::undefined_function(&name, span)),
        Value::Array(items) => {
            let items = items.read();
            if let [Value::Class(instance), Value::Str(method)] = items.as_slice() {
                if let Some(m) = instance.stmt().find_method(ctx.vm(), method) {
                    return Ok(Arc::new(Callable::Bound {
                        this: instance.clone(),
                        method: m,
                    }));
                }
            }
            Err(error::runtime("array is not callable", span))
        }
        other => Err(error::runtime(
            format!("value of type {} is not callable", other.type_name()),
            span,
        )),
    }
}

// Assignment

fn eval_assign(target: &Ast, op: AssignOp, value: &Ast, ctx: &Context, span: Span) -> Flow<Value> {
    let rhs = eval(value, ctx)?;
    let value = match op.binary() {
        None => rhs,
        Some(bin) => {
            let current = eval(target, ctx)?;
            binary_op(bin, &current, &rhs, span)?
        }
    };
    assign_to(target, value.clone(), ctx, span)?;
    Ok(value)
}

/// Store `value` into an assignable node.
pub fn assign_to(target: &Ast, value: Value, ctx: &Context, span: Span) -> Flow<()> {
    match &target.node {
        Node::Variable(var) => ctx.set_variable_value(var, value, span),
        Node::VariableList(vars) => destructure(vars, value, ctx, span),
        Node::Property { object, name } => {
            let object = eval(object, ctx)?;
            set_property(&object, name, value, ctx, span)
        }
        Node::Index { object, index } => {
            let container = writable_container(object, ctx, span)?;
            let index = index.as_ref().map(|i| eval(i, ctx)).transpose()?;
            set_index(&container, index, value, ctx, span)
        }
        Node::StaticProperty { class, name } => {
            let class = call::resolve_class(class, ctx, span)?;
            call::set_static_property(&class, name, value, ctx, span)
        }
        _ => Err(error::runtime("invalid assignment target", span)),
    }
}

fn destructure(vars: &[Variable], value: Value, ctx: &Context, span: Span) -> Flow<()> {
    let Value::Array(items) = value.deref_value() else {
        return Err(error::runtime(
            format!("cannot destructure a value of type {}", value.type_name()),
            span,
        ));
    };
    let items = items.read().clone();
    for (i, var) in vars.iter().enumerate() {
        let item = items.get(i).cloned().unwrap_or(Value::Null);
        ctx.set_variable_value(var, item, span)?;
    }
    Ok(())
}

/// Evaluate the container of an index write, creating an array in an unset
/// variable.
fn writable_container(object: &Ast, ctx: &Context, span: Span) -> Flow<Value> {
    let current = eval(object, ctx)?;
    if current.is_null() {
        if let Node::Variable(var) = &object.node {
            let fresh = Value::array(Vec::new());
            ctx.set_variable_value(var, fresh.clone(), span)?;
            return Ok(fresh);
        }
    }
    Ok(current)
}

// Member access

pub fn get_property(object: &Value, name: &str, ctx: &Context, span: Span) -> Flow<Value> {
    match object.deref_value() {
        Value::Class(instance) => {
            call::check_property_access(&instance, name, ctx, span)?;
            if let Some(value) = instance.get_property(name) {
                return Ok(value);
            }
            if let Some(method) = call::find_method_for(&instance, name, ctx) {
                return Ok(Value::func(Callable::Bound {
                    this: instance,
                    method,
                }));
            }
            Ok(Value::Null)
        }
        Value::Object(object) => Ok(object.get(name).unwrap_or(Value::Null)),
        Value::Throw(err) => Ok(match name {
            "message" => Value::from(err.message.as_str()),
            _ => Value::Null,
        }),
        Value::Null => Err(error::runtime(
            format!("cannot read property '{name}' of null"),
            span,
        )),
        other => Err(error::runtime(
            format!("cannot read property '{name}' of {}", other.type_name()),
            span,
        )),
    }
}

fn set_property(object: &Value, name: &str, value: Value, ctx: &Context, span: Span) -> Flow<()> {
    match object.deref_value() {
        Value::Class(instance) => set_class_property(&instance, name, value, ctx, span),
        Value::Object(object) => {
            object.set(name, value);
            Ok(())
        }
        other => Err(error::runtime(
            format!("cannot set property '{name}' on {}", other.type_name()),
            span,
        )),
    }
}

fn set_class_property(
    instance: &Arc<ClassValue>,
    name: &str,
    value: Value,
    ctx: &Context,
    span: Span,
) -> Flow<()> {
    call::check_property_access(instance, name, ctx, span)?;
    if let Some(ty) = call::declared_property_type(instance, name, ctx) {
        let ty = ty.resolve(&instance.class.bindings);
        if !ty.is(&value) {
            return Err(error::type_mismatch(
                &format!("property {}::${name}", instance.class_name()),
                &ty,
                &value.type_name(),
                span,
            ));
        }
    }
    instance.props.set(name, value.deref_value());
    Ok(())
}

fn get_index(container: &Value, index: Value, ctx: &Context, span: Span) -> Flow<Value> {
    match container.deref_value() {
        Value::Array(items) => {
            let i = index
                .as_int()
                .ok_or_else(|| error::runtime("array index must be an integer", span))?;
            let items = items.read();
            let i = if i < 0 { items.len() as i64 + i } else { i };
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null))
        }
        Value::Object(object) => Ok(object.get(&index.to_display_string()).unwrap_or(Value::Null)),
        Value::Str(s) => {
            let i = index
                .as_int()
                .ok_or_else(|| error::runtime("string offset must be an integer", span))?;
            let count = s.chars().count() as i64;
            let i = if i < 0 { count + i } else { i };
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::from(c.to_string()))
                .unwrap_or(Value::Null))
        }
        Value::Class(instance) => {
            call::call_method_values(&instance, "get", vec![index], ctx, span)
        }
        Value::Null => Ok(Value::Null),
        other => Err(error::runtime(
            format!("cannot index a value of type {}", other.type_name()),
            span,
        )),
    }
}

fn set_index(
    container: &Value,
    index: Option<Value>,
    value: Value,
    ctx: &Context,
    span: Span,
) -> Flow<()> {
    let value = value.deref_value();
    match container.deref_value() {
        Value::Array(items) => {
            let mut items = items.write();
            match index {
                None => items.push(value),
                Some(index) => {
                    let i = index
                        .as_int()
                        .and_then(|i| usize::try_from(i).ok())
                        .ok_or_else(|| error::runtime("array index must be a non-negative integer", span))?;
                    match i.cmp(&items.len()) {
                        Ordering::Less => items[i] = value,
                        Ordering::Equal => items.push(value),
                        Ordering::Greater => {
                            return Err(error::runtime(
                                format!("array index {i} out of range (length {})", items.len()),
                                span,
                            ));
                        }
                    }
                }
            }
            Ok(())
        }
        Value::Object(object) => {
            let key = match index {
                Some(index) => index.to_display_string(),
                None => object.len().to_string(),
            };
            object.set(key, value);
            Ok(())
        }
        Value::Class(instance) => {
            let args = match index {
                Some(index) => vec![index, value],
                None => vec![value],
            };
            let method = if args.len() == 2 { "set" } else { "add" };
            call::call_method_values(&instance, method, args, ctx, span).map(|_| ())
        }
        other => Err(error::runtime(
            format!("cannot assign by index into {}", other.type_name()),
            span,
        )),
    }
}

/// `a[x..y]`: bounds default to the whole sequence; negative bounds count
/// from the end.
fn slice(container: &Value, start: Option<Value>, end: Option<Value>, span: Span) -> Flow<Value> {
    let bound = |v: Option<Value>, len: usize, default: usize| -> Flow<usize> {
        match v {
            None => Ok(default),
            Some(v) => {
                let n = v
                    .as_int()
                    .ok_or_else(|| error::runtime("slice bound must be an integer", span))?;
                let n = if n < 0 { len as i64 + n } else { n };
                Ok(n.clamp(0, len as i64) as usize)
            }
        }
    };
    match container.deref_value() {
        Value::Array(items) => {
            let items = items.read();
            let s = bound(start, items.len(), 0)?;
            let e = bound(end, items.len(), items.len())?;
            let part = if s < e { items[s..e].to_vec() } else { Vec::new() };
            Ok(Value::array(part))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let s = bound(start, chars.len(), 0)?;
            let e = bound(end, chars.len(), chars.len())?;
            let part: String = if s < e { chars[s..e].iter().collect() } else { String::new() };
            Ok(Value::from(part))
        }
        other => Err(error::runtime(
            format!("cannot slice a value of type {}", other.type_name()),
            span,
        )),
    }
}

/// Key/value pairs a `foreach` walks, snapshotted up front.
fn iteration_pairs(value: &Value, ctx: &Context, span: Span) -> Flow<Vec<(Value, Value)>> {
    match value.deref_value() {
        Value::Array(items) => Ok(items
            .read()
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v.clone()))
            .collect()),
        Value::Object(object) => Ok(object
            .entries()
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect()),
        Value::Class(instance) => {
            if let Some(entries) = instance.proxy.as_ref().and_then(|p| p.entries()) {
                return Ok(entries);
            }
            Ok(instance
                .props
                .entries()
                .into_iter()
                .filter(|(k, _)| call::check_property_access(&instance, k, ctx, span).is_ok())
                .map(|(k, v)| (Value::from(k), v))
                .collect())
        }
        Value::Null => Ok(Vec::new()),
        other => Err(error::runtime(
            format!("cannot iterate over a value of type {}", other.type_name()),
            span,
        )),
    }
}

// Operators

enum Num {
    Int(i64),
    Float(f64),
}

fn numeric(value: &Value) -> Option<Num> {
    match value.deref_value() {
        Value::Int(n) => Some(Num::Int(n)),
        Value::Float(f) => Some(Num::Float(f)),
        Value::Bool(b) => Some(Num::Int(b as i64)),
        Value::Null => Some(Num::Int(0)),
        Value::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Num::Int)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Num::Float))
        }
        _ => None,
    }
}

pub fn binary_op(op: BinOp, l: &Value, r: &Value, span: Span) -> Flow<Value> {
    let l = l.deref_value();
    let r = r.deref_value();
    match op {
        BinOp::Concat => Ok(Value::from(format!(
            "{}{}",
            l.to_display_string(),
            r.to_display_string()
        ))),
        BinOp::Eq => Ok(Value::Bool(l.loose_eq(&r))),
        BinOp::Ne => Ok(Value::Bool(!l.loose_eq(&r))),
        BinOp::StrictEq => Ok(Value::Bool(l.strict_eq(&r))),
        BinOp::StrictNe => Ok(Value::Bool(!l.strict_eq(&r))),
        BinOp::Lt => Ok(Value::Bool(l.compare(&r) == Some(Ordering::Less))),
        BinOp::Gt => Ok(Value::Bool(l.compare(&r) == Some(Ordering::Greater))),
        BinOp::Le => Ok(Value::Bool(matches!(
            l.compare(&r),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinOp::Ge => Ok(Value::Bool(matches!(
            l.compare(&r),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        BinOp::And => Ok(Value::Bool(l.is_truthy() && r.is_truthy())),
        BinOp::Or => Ok(Value::Bool(l.is_truthy() || r.is_truthy())),
        BinOp::Add => {
            if let (Value::Array(a), Value::Array(b)) = (&l, &r) {
                let mut joined = a.read().clone();
                joined.extend(b.read().iter().cloned());
                return Ok(Value::array(joined));
            }
            match (numeric(&l), numeric(&r)) {
                (Some(a), Some(b)) => Ok(arith(op, a, b, span)?),
                _ if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) => Ok(Value::from(
                    format!("{}{}", l.to_display_string(), r.to_display_string()),
                )),
                _ => Err(error::unsupported_operand(
                    "+",
                    &l.type_name(),
                    &r.type_name(),
                    span,
                )),
            }
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => match (numeric(&l), numeric(&r)) {
            (Some(a), Some(b)) => arith(op, a, b, span),
            _ => Err(error::unsupported_operand(
                &op.to_string(),
                &l.type_name(),
                &r.type_name(),
                span,
            )),
        },
    }
}

fn arith(op: BinOp, a: Num, b: Num, span: Span) -> Flow<Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            BinOp::Add => Ok(x.checked_add(y).map(Value::Int).unwrap_or(Value::Float(x as f64 + y as f64))),
            BinOp::Sub => Ok(x.checked_sub(y).map(Value::Int).unwrap_or(Value::Float(x as f64 - y as f64))),
            BinOp::Mul => Ok(x.checked_mul(y).map(Value::Int).unwrap_or(Value::Float(x as f64 * y as f64))),
            BinOp::Div => {
                if y == 0 {
                    return Err(error::division_by_zero(span));
                }
                match (x.checked_rem(y), x.checked_div(y)) {
                    (Some(0), Some(q)) => Ok(Value::Int(q)),
                    _ => Ok(Value::Float(x as f64 / y as f64)),
                }
            }
            BinOp::Mod => {
                if y == 0 {
                    return Err(error::division_by_zero(span));
                }
                Ok(Value::Int(x.wrapping_rem(y)))
            }
            _ => unreachable!("not an arithmetic operator"),
        },
        (a, b) => {
            let x = match a {
                Num::Int(n) => n as f64,
                Num::Float(f) => f,
            };
            let y = match b {
                Num::Int(n) => n as f64,
                Num::Float(f) => f,
            };
            match op {
                BinOp::Add => Ok(Value::Float(x + y)),
                BinOp::Sub => Ok(Value::Float(x - y)),
                BinOp::Mul => Ok(Value::Float(x * y)),
                BinOp::Div => {
                    if y == 0.0 {
                        return Err(error::division_by_zero(span));
                    }
                    Ok(Value::Float(x / y))
                }
                BinOp::Mod => {
                    let (xi, yi) = (x as i64, y as i64);
                    if yi == 0 {
                        return Err(error::division_by_zero(span));
                    }
                    Ok(Value::Int(xi.wrapping_rem(yi)))
                }
                _ => unreachable!("not an arithmetic operator"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::default()
    }

    #[test]
    fn test_int_arithmetic() {
        assert!(matches!(binary_op(BinOp::Add, &Value::Int(2), &Value::Int(3), sp()), Ok(Value::Int(5))));
        assert!(matches!(binary_op(BinOp::Mul, &Value::Int(4), &Value::Int(3), sp()), Ok(Value::Int(12))));
        assert!(matches!(binary_op(BinOp::Mod, &Value::Int(7), &Value::Int(3), sp()), Ok(Value::Int(1))));
    }

    #[test]
    fn test_division() {
        assert!(matches!(binary_op(BinOp::Div, &Value::Int(6), &Value::Int(3), sp()), Ok(Value::Int(2))));
        assert!(matches!(
            binary_op(BinOp::Div, &Value::Int(7), &Value::Int(2), sp()),
            Ok(Value::Float(f)) if f == 3.5
        ));
        assert!(binary_op(BinOp::Div, &Value::Int(1), &Value::Int(0), sp()).is_err());
        assert!(binary_op(BinOp::Mod, &Value::Int(1), &Value::Int(0), sp()).is_err());
    }

    #[test]
    fn test_float_promotion() {
        assert!(matches!(
            binary_op(BinOp::Add, &Value::Int(1), &Value::Float(0.5), sp()),
            Ok(Value::Float(f)) if f == 1.5
        ));
    }

    #[test]
    fn test_overflow_promotes_to_float() {
        assert!(matches!(
            binary_op(BinOp::Add, &Value::Int(i64::MAX), &Value::Int(1), sp()),
            Ok(Value::Float(_))
        ));
    }

    #[test]
    fn test_min_int_division_promotes_to_float() {
        assert!(matches!(
            binary_op(BinOp::Div, &Value::Int(i64::MIN), &Value::Int(-1), sp()),
            Ok(Value::Float(f)) if f == -(i64::MIN as f64)
        ));
        assert!(matches!(binary_op(BinOp::Mod, &Value::Int(i64::MIN), &Value::Int(-1), sp()), Ok(Value::Int(0))));
    }

    #[test]
    fn test_string_plus_concatenates() {
        let v = binary_op(BinOp::Add, &Value::from("a"), &Value::from("b"), sp()).unwrap();
        assert_eq!(v.to_display_string(), "ab");
        let n = binary_op(BinOp::Add, &Value::from("2"), &Value::Int(3), sp()).unwrap();
        assert!(matches!(n, Value::Int(5)));
    }

    #[test]
    fn test_concat_uses_display_strings() {
        let v = binary_op(BinOp::Concat, &Value::from("n="), &Value::Null, sp()).unwrap();
        assert_eq!(v.to_display_string(), "n=");
        let v = binary_op(BinOp::Concat, &Value::Int(1), &Value::Bool(true), sp()).unwrap();
        assert_eq!(v.to_display_string(), "1true");
    }

    #[test]
    fn test_comparisons() {
        assert!(matches!(binary_op(BinOp::Lt, &Value::Int(1), &Value::Float(1.5), sp()), Ok(Value::Bool(true))));
        assert!(matches!(binary_op(BinOp::Ge, &Value::Int(2), &Value::Int(2), sp()), Ok(Value::Bool(true))));
        assert!(matches!(binary_op(BinOp::StrictEq, &Value::Int(1), &Value::from("1"), sp()), Ok(Value::Bool(false))));
        assert!(matches!(binary_op(BinOp::Eq, &Value::Int(1), &Value::from("1"), sp()), Ok(Value::Bool(true))));
    }

    #[test]
    fn test_unsupported_operands() {
        let arr = Value::array(vec![]);
        assert!(binary_op(BinOp::Sub, &arr, &Value::Int(1), sp()).is_err());
    }

    #[test]
    fn test_slice_bounds() {
        let arr = Value::array((0..5).map(Value::Int).collect());
        let part = slice(&arr, Some(Value::Int(1)), Some(Value::Int(3)), sp()).unwrap();
        assert_eq!(part.to_string(), "[1, 2]");
        let tail = slice(&arr, Some(Value::Int(-2)), None, sp()).unwrap();
        assert_eq!(tail.to_string(), "[3, 4]");
        let head = slice(&arr, None, Some(Value::Int(2)), sp()).unwrap();
        assert_eq!(head.to_string(), "[0, 1]");
        let text = slice(&Value::from("hello"), Some(Value::Int(1)), Some(Value::Int(4)), sp()).unwrap();
        assert_eq!(text.to_display_string(), "ell");
    }

    #[test]
    fn test_cast() {
        assert!(matches!(cast(&Type::Int, Value::from("42"), sp()), Ok(Value::Int(42))));
        assert!(matches!(cast(&Type::Bool, Value::Int(0), sp()), Ok(Value::Bool(false))));
        assert!(cast(&Type::Int, Value::array(vec![]), sp()).is_err());
        let wrapped = cast(&Type::Array, Value::Int(1), sp()).unwrap();
        assert_eq!(wrapped.to_string(), "[1]");
    }

    #[test]
    fn test_throw_value_keeps_string_message() {
        let Control::Throw(err) = throw_value(Value::from("bad"), sp()) else {
            panic!("expected throw");
        };
        assert_eq!(err.message, "bad");
        assert!(err.thrown.is_none());
    }
}
