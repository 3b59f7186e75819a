//! Calls, method dispatch and instantiation
//!
//! Arguments are evaluated in the caller's frame, then bound into a fresh
//! frame for the callee. Parameters declared `&$x` receive the caller's
//! slot as a shared [`Reference`] when the argument is a plain variable.

use super::class::{ClassGeneric, ClassStmt, ClassValue, Method, MethodBody, Modifier};
use super::control::{Control, Flow};
use super::env::Context;
use super::error;
use super::eval::{eval, exec_block};
use super::object::ObjectValue;
use super::value::{Callable, Reference, Value};
use crate::ast::{Arg, FunctionDecl, Node, Param, ParamKind, Span};
use crate::types::Type;
use std::sync::Arc;
use tracing::trace;

/// One evaluated argument.
pub enum ArgValue {
    Value(Value),
    Ref(Arc<Reference>),
}

impl ArgValue {
    pub fn into_value(self) -> Value {
        match self {
            ArgValue::Value(value) => value,
            ArgValue::Ref(cell) => cell.get(),
        }
    }
}

/// Evaluated call arguments.
#[derive(Default)]
pub struct ArgValues {
    pub positional: Vec<ArgValue>,
    pub named: Vec<(String, ArgValue)>,
}

impl ArgValues {
    pub fn from_values(values: Vec<Value>) -> Self {
        ArgValues {
            positional: values.into_iter().map(ArgValue::Value).collect(),
            named: Vec::new(),
        }
    }

    /// Flatten for host code; named arguments follow the positional ones.
    pub fn into_values(self) -> Vec<Value> {
        self.positional
            .into_iter()
            .chain(self.named.into_iter().map(|(_, v)| v))
            .map(ArgValue::into_value)
            .collect()
    }

    fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }
}

/// Evaluate arguments left to right. With `params` known, a variable passed
/// to a reference parameter is passed as its slot.
pub fn eval_args(args: &[Arg], params: Option<&[Param]>, ctx: &Context) -> Flow<ArgValues> {
    let mut out = ArgValues::default();
    for (i, arg) in args.iter().enumerate() {
        let param = params.and_then(|params| match &arg.name {
            Some(name) => params.iter().find(|p| &p.var.name == name),
            None => params.get(i),
        });
        let value = match (&arg.value.node, param) {
            (Node::Variable(var), Some(p)) if p.kind == ParamKind::Reference => {
                ArgValue::Ref(ctx.reference(var.index))
            }
            _ => ArgValue::Value(eval(&arg.value, ctx)?.deref_value()),
        };
        match &arg.name {
            Some(name) => out.named.push((name.clone(), value)),
            None => out.positional.push(value),
        }
    }
    Ok(out)
}

fn params_of(callable: &Callable) -> Option<&[Param]> {
    match callable {
        Callable::Function(decl) => Some(&decl.params),
        Callable::Closure { lambda, .. } => Some(&lambda.func.params),
        Callable::Bound { method, .. } => method.decl().map(|d| d.params.as_slice()),
        Callable::Host { .. } => None,
    }
}

/// Call with unevaluated arguments.
pub fn call_callable(callable: &Arc<Callable>, args: &[Arg], ctx: &Context, span: Span) -> Flow<Value> {
    let args = eval_args(args, params_of(callable), ctx)?;
    dispatch(callable, args, ctx, span)
}

/// Call with already-evaluated arguments.
pub fn call_with_values(
    callable: &Arc<Callable>,
    values: Vec<Value>,
    ctx: &Context,
    span: Span,
) -> Flow<Value> {
    dispatch(callable, ArgValues::from_values(values), ctx, span)
}

fn dispatch(callable: &Callable, args: ArgValues, ctx: &Context, span: Span) -> Flow<Value> {
    match callable {
        Callable::Function(decl) => {
            let frame = ctx.create_base_context().with_depth(ctx.depth() + 1);
            frame.set_namespace(namespace_of(&decl.name));
            invoke(decl, args, frame, span)
        }
        Callable::Closure { lambda, ctx: def } => {
            let frame = def.create_context().with_depth(ctx.depth() + 1);
            for capture in &lambda.captures {
                if let Some(value) = def.get_index_value(capture.parent) {
                    frame.set_index_value(capture.child, value);
                }
            }
            invoke(&lambda.func, args, frame, span)
        }
        Callable::Host { func, .. } => func(ctx, args.into_values()),
        Callable::Bound { this, method } => call_method(this, method, args, ctx, span),
    }
}

/// Bind arguments, run the body and check the declared return type.
fn invoke(decl: &FunctionDecl, args: ArgValues, frame: Context, span: Span) -> Flow<Value> {
    let limit = frame.vm().max_call_depth();
    if frame.depth() > limit {
        return Err(error::call_depth(limit, span));
    }
    trace!(function = decl.display_name(), depth = frame.depth(), "invoke");
    bind_params(decl, args, &frame, span)?;

    let value = match exec_block(&decl.body, &frame) {
        Ok(_) => Value::Null,
        Err(Control::Return(value)) => value,
        Err(Control::Returns(values)) => Value::array(values),
        Err(Control::Break(_)) => return Err(error::runtime("'break' outside of a loop", span)),
        Err(Control::Continue(_)) => {
            return Err(error::runtime("'continue' outside of a loop", span));
        }
        Err(other) => return Err(other),
    };

    if let Some(ret) = &decl.ret {
        let ret = resolve_in(ret, &frame);
        if !ret.is(&value) {
            return Err(error::type_mismatch(
                &format!("return value of {}()", decl.display_name()),
                &ret,
                &value.type_name(),
                span,
            ));
        }
    }
    Ok(value)
}

fn resolve_in(ty: &Type, frame: &Context) -> Type {
    match frame.this() {
        Some(this) => ty.resolve(&this.class.bindings),
        None => ty.clone(),
    }
}

fn check_arg(decl: &FunctionDecl, param: &Param, value: &Value, frame: &Context, span: Span) -> Flow<()> {
    let Some(ty) = &param.var.ty else {
        return Ok(());
    };
    let ty = resolve_in(ty, frame);
    if ty.is(value) {
        return Ok(());
    }
    Err(error::type_mismatch(
        &format!("argument ${} of {}()", param.var.name, decl.display_name()),
        &ty,
        &value.type_name(),
        span,
    ))
}

fn bind_params(decl: &FunctionDecl, args: ArgValues, frame: &Context, span: Span) -> Flow<()> {
    let given = args.len();
    let mut positional = args.positional.into_iter();
    let mut named = args.named;

    for param in &decl.params {
        if param.kind == ParamKind::Variadic {
            let rest: Vec<Value> = positional.by_ref().map(ArgValue::into_value).collect();
            for value in &rest {
                check_arg(decl, param, value, frame, span)?;
            }
            frame.set_index_value(param.var.index, Value::array(rest));
            continue;
        }

        let arg = positional.next().or_else(|| {
            let at = named.iter().position(|(name, _)| name == &param.var.name)?;
            Some(named.remove(at).1)
        });
        match arg {
            Some(ArgValue::Ref(cell)) if param.kind == ParamKind::Reference => {
                check_arg(decl, param, &cell.get(), frame, span)?;
                frame.bind_reference(param.var.index, cell);
            }
            Some(arg) => {
                let value = arg.into_value();
                check_arg(decl, param, &value, frame, span)?;
                frame.set_index_value(param.var.index, value);
            }
            None => match &param.default {
                Some(default) => {
                    let value = eval(default, frame)?;
                    check_arg(decl, param, &value, frame, span)?;
                    frame.set_index_value(param.var.index, value);
                }
                None => {
                    return Err(error::arity(
                        decl.display_name(),
                        decl.required_params(),
                        given,
                        span,
                    ));
                }
            },
        }
    }

    if let Some((name, _)) = named.first() {
        return Err(error::runtime(
            format!("unknown named argument ${name} for {}()", decl.display_name()),
            span,
        ));
    }
    Ok(())
}

/// `A\B\f` -> `A\B`
pub fn namespace_of(name: &str) -> &str {
    name.rfind('\\').map(|i| &name[..i]).unwrap_or("")
}

// Visibility

/// Whether code running in the current frame may touch a member declared
/// in `owner` with `modifier`.
fn visible(modifier: Modifier, owner: &str, ctx: &Context) -> bool {
    match modifier {
        Modifier::Public => true,
        Modifier::Private => ctx.current_class().is_some_and(|c| c.name == owner),
        Modifier::Protected => ctx.current_class().is_some_and(|current| {
            let vm = ctx.vm();
            vm.class_is(current, owner)
                || vm.get_class(owner).is_some_and(|o| vm.class_is(&o, &current.name))
        }),
    }
}

enum Lookup {
    Found(Arc<Method>),
    Hidden(Arc<Method>),
    Missing,
}

fn lookup_method(instance: &Arc<ClassValue>, name: &str, ctx: &Context) -> Lookup {
    let vm = ctx.vm();
    // Code in a class sees that class's private methods on any instance of it.
    if let Some(current) = ctx.current_class() {
        if let Some(method) = current.methods.get(name) {
            if method.modifier == Modifier::Private && vm.class_is(instance.stmt(), &current.name) {
                return Lookup::Found(method.clone());
            }
        }
    }
    match instance.stmt().find_method(vm, name) {
        Some(method) if visible(method.modifier, &method.class, ctx) => Lookup::Found(method),
        Some(method) => Lookup::Hidden(method),
        None => Lookup::Missing,
    }
}

/// Method `name` as seen from the current frame, if accessible.
pub fn find_method_for(instance: &Arc<ClassValue>, name: &str, ctx: &Context) -> Option<Arc<Method>> {
    match lookup_method(instance, name, ctx) {
        Lookup::Found(method) => Some(method),
        _ => None,
    }
}

/// Fails when the current frame may not read or write property `name`.
/// Undeclared properties are accessible.
pub fn check_property_access(instance: &Arc<ClassValue>, name: &str, ctx: &Context, span: Span) -> Flow<()> {
    let vm = ctx.vm();
    if let Some(current) = ctx.current_class() {
        if current.own_property(name).is_some() && vm.class_is(instance.stmt(), &current.name) {
            return Ok(());
        }
    }
    match instance.stmt().find_property(vm, name) {
        Some((owner, index)) => {
            let property = &owner.properties[index];
            if visible(property.modifier, &owner.name, ctx) {
                Ok(())
            } else {
                Err(error::runtime(
                    format!(
                        "cannot access {} property {}::${name}",
                        property.modifier.as_str(),
                        instance.class_name()
                    ),
                    span,
                ))
            }
        }
        None => {
            let hidden = instance.stmt().ancestry(vm).iter().skip(1).any(|c| {
                c.own_property(name)
                    .is_some_and(|p| p.modifier == Modifier::Private)
            });
            if hidden {
                Err(error::runtime(
                    format!("cannot access private property {}::${name}", instance.class_name()),
                    span,
                ))
            } else {
                Ok(())
            }
        }
    }
}

/// Declared type of an instance property as seen from the current frame.
pub fn declared_property_type(instance: &Arc<ClassValue>, name: &str, ctx: &Context) -> Option<Type> {
    if let Some(current) = ctx.current_class() {
        if let Some(property) = current.own_property(name) {
            return property.ty.clone();
        }
    }
    let (owner, index) = instance.stmt().find_property(ctx.vm(), name)?;
    owner.properties[index].ty.clone()
}

// Methods

/// Run `method` with `instance` as `$this`.
pub fn call_method(
    instance: &Arc<ClassValue>,
    method: &Arc<Method>,
    args: ArgValues,
    ctx: &Context,
    span: Span,
) -> Flow<Value> {
    match &method.body {
        MethodBody::Host(func) => func(instance, ctx, args.into_values()),
        MethodBody::Ast(decl) => {
            let owner = ctx
                .vm()
                .get_class(&method.class)
                .unwrap_or_else(|| instance.stmt().clone());
            let this = (!method.is_static).then(|| instance.clone());
            let frame = instance
                .ctx
                .create_context()
                .with_this(this, Some(owner.clone()))
                .with_depth(ctx.depth() + 1);
            frame.set_namespace(namespace_of(&owner.name));
            invoke(decl, args, frame, span)
        }
    }
}

fn call_static_method(
    class: &Arc<ClassStmt>,
    method: &Arc<Method>,
    args: ArgValues,
    ctx: &Context,
    span: Span,
) -> Flow<Value> {
    let MethodBody::Ast(decl) = &method.body else {
        return Err(error::runtime(
            format!("{}::{}() cannot be called statically", class.name, method.name),
            span,
        ));
    };
    let owner = ctx.vm().get_class(&method.class).unwrap_or_else(|| class.clone());
    let frame = ctx
        .create_base_context()
        .with_this(None, Some(owner.clone()))
        .with_depth(ctx.depth() + 1);
    frame.set_namespace(namespace_of(&owner.name));
    invoke(decl, args, frame, span)
}

/// `$value->name(args)`
pub fn call_method_on(value: &Value, name: &str, args: &[Arg], ctx: &Context, span: Span) -> Flow<Value> {
    match value.deref_value() {
        Value::Class(instance) => {
            if instance.proxy.is_some() {
                let values = eval_args(args, None, ctx)?.into_values();
                return call_method_values(&instance, name, values, ctx, span);
            }
            match lookup_method(&instance, name, ctx) {
                Lookup::Found(method) => {
                    let params = method.decl().map(|d| d.params.as_slice());
                    let args = eval_args(args, params, ctx)?;
                    call_method(&instance, &method, args, ctx, span)
                }
                Lookup::Hidden(method) => Err(hidden_method(&instance, &method, span)),
                Lookup::Missing => match instance.props.get(name) {
                    Some(Value::Func(func)) => call_callable(&func, args, ctx, span),
                    _ => Err(error::undefined_method(instance.class_name(), name, span)),
                },
            }
        }
        Value::Object(object) => match object.get(name) {
            Some(Value::Func(func)) => call_callable(&func, args, ctx, span),
            _ => Err(error::undefined_method("object", name, span)),
        },
        Value::Throw(err) => match name {
            "getMessage" => Ok(Value::from(err.message.as_str())),
            "getCode" => Ok(Value::Int(0)),
            "getPrevious" => Ok(Value::Null),
            _ => Err(error::undefined_method("Throwable", name, span)),
        },
        Value::Null => Err(error::runtime(format!("call to {name}() on null"), span)),
        other => Err(error::runtime(
            format!("call to {name}() on {}", other.type_name()),
            span,
        )),
    }
}

/// Method call with evaluated arguments. Host proxies get the first chance.
pub fn call_method_values(
    instance: &Arc<ClassValue>,
    name: &str,
    values: Vec<Value>,
    ctx: &Context,
    span: Span,
) -> Flow<Value> {
    if let Some(proxy) = &instance.proxy {
        if let Some(result) = proxy.call(instance, ctx, name, values.clone()) {
            return result;
        }
    }
    match lookup_method(instance, name, ctx) {
        Lookup::Found(method) => call_method(instance, &method, ArgValues::from_values(values), ctx, span),
        Lookup::Hidden(method) => Err(hidden_method(instance, &method, span)),
        Lookup::Missing => Err(error::undefined_method(instance.class_name(), name, span)),
    }
}

fn hidden_method(instance: &ClassValue, method: &Method, span: Span) -> Control {
    error::runtime(
        format!(
            "cannot call {} method {}::{}()",
            method.modifier.as_str(),
            instance.class_name(),
            method.name
        ),
        span,
    )
}

/// `Class::method(args)`. A non-static method called on the current
/// object's own class keeps `$this`.
pub fn call_static(class: &str, name: &str, args: &[Arg], ctx: &Context, span: Span) -> Flow<Value> {
    let class = resolve_class(class, ctx, span)?;
    let vm = ctx.vm();
    let method = class
        .find_method(vm, name)
        .ok_or_else(|| error::undefined_method(&class.name, name, span))?;
    if !visible(method.modifier, &method.class, ctx) {
        return Err(error::runtime(
            format!("cannot call {} method {}::{name}()", method.modifier.as_str(), class.name),
            span,
        ));
    }
    let params = method.decl().map(|d| d.params.as_slice());
    let args = eval_args(args, params, ctx)?;
    match ctx.this() {
        Some(this) if !method.is_static && vm.class_is(this.stmt(), &class.name) => {
            call_method(this, &method, args, ctx, span)
        }
        _ => call_static_method(&class, &method, args, ctx, span),
    }
}

/// `parent::method(args)`
pub fn call_parent(name: &str, args: &[Arg], ctx: &Context, span: Span) -> Flow<Value> {
    let parent = resolve_class("parent", ctx, span)?;
    let method = parent
        .find_method(ctx.vm(), name)
        .ok_or_else(|| error::undefined_method(&parent.name, name, span))?;
    let params = method.decl().map(|d| d.params.as_slice());
    let args = eval_args(args, params, ctx)?;
    match ctx.this() {
        Some(this) if !method.is_static => call_method(this, &method, args, ctx, span),
        _ => call_static_method(&parent, &method, args, ctx, span),
    }
}

/// Resolve a class reference, including `self`, `static` and `parent`.
pub fn resolve_class(name: &str, ctx: &Context, span: Span) -> Flow<Arc<ClassStmt>> {
    let outside = || error::runtime(format!("cannot use '{name}' outside of a class"), span);
    match name {
        "self" => ctx.current_class().cloned().ok_or_else(outside),
        "static" => match ctx.this() {
            Some(this) => Ok(this.stmt().clone()),
            None => ctx.current_class().cloned().ok_or_else(outside),
        },
        "parent" => {
            let current = ctx.current_class().ok_or_else(outside)?;
            let parent = current.extends.as_deref().ok_or_else(|| {
                error::runtime(format!("class {} has no parent", current.name), span)
            })?;
            load_class(parent, ctx, span)
        }
        _ => load_class(name, ctx, span),
    }
}

fn load_class(name: &str, ctx: &Context, span: Span) -> Flow<Arc<ClassStmt>> {
    ctx.vm()
        .get_or_load_class(name)
        .map_err(|err| Control::throw(err.with_span(span)))
}

// Static members

fn static_owner(class: &Arc<ClassStmt>, name: &str, ctx: &Context, span: Span) -> Flow<(Arc<ClassStmt>, usize)> {
    class
        .ancestry(ctx.vm())
        .into_iter()
        .find_map(|c| {
            let index = c
                .properties
                .iter()
                .position(|p| p.name == name && (p.is_static || p.is_const))?;
            Some((c, index))
        })
        .ok_or_else(|| {
            error::runtime(format!("undefined static property {}::${name}", class.name), span)
        })
}

/// Read a static property or class constant, initializing it on first use.
pub fn static_property(class: &Arc<ClassStmt>, name: &str, ctx: &Context, span: Span) -> Flow<Value> {
    let (owner, index) = static_owner(class, name, ctx, span)?;
    let property = &owner.properties[index];
    if !visible(property.modifier, &owner.name, ctx) {
        return Err(error::runtime(
            format!("cannot access {} property {}::${name}", property.modifier.as_str(), owner.name),
            span,
        ));
    }
    if let Some(value) = owner.static_value(name) {
        return Ok(value);
    }
    let value = match &property.default {
        Some(default) => {
            let frame = ctx.create_base_context().with_this(None, Some(owner.clone()));
            frame.set_namespace(namespace_of(&owner.name));
            eval(default, &frame)?
        }
        None => Value::Null,
    };
    owner.set_static_value(name, value.clone());
    Ok(value)
}

pub fn set_static_property(
    class: &Arc<ClassStmt>,
    name: &str,
    value: Value,
    ctx: &Context,
    span: Span,
) -> Flow<()> {
    let (owner, index) = static_owner(class, name, ctx, span)?;
    let property = &owner.properties[index];
    if property.is_const {
        return Err(error::runtime(
            format!("cannot modify constant {}::{name}", owner.name),
            span,
        ));
    }
    if !visible(property.modifier, &owner.name, ctx) {
        return Err(error::runtime(
            format!("cannot access {} property {}::${name}", property.modifier.as_str(), owner.name),
            span,
        ));
    }
    if let Some(ty) = &property.ty {
        if !ty.is(&value) {
            return Err(error::type_mismatch(
                &format!("static property {}::${name}", owner.name),
                ty,
                &value.type_name(),
                span,
            ));
        }
    }
    owner.set_static_value(name, value.deref_value());
    Ok(())
}

// Instantiation

/// `new Class<T>(args)`
pub fn instantiate(class: &str, type_args: &[Type], args: &[Arg], ctx: &Context, span: Span) -> Flow<Value> {
    let class = resolve_class(class, ctx, span)?;
    let type_args = type_args.iter().map(|t| resolve_in(t, ctx)).collect();
    let generic = class
        .clone_generic(type_args)
        .map_err(|err| Control::throw(err.with_span(span)))?;
    let constructor = class.find_method(ctx.vm(), "__construct");
    let params = constructor
        .as_ref()
        .and_then(|m| m.decl())
        .map(|d| d.params.as_slice());
    let args = eval_args(args, params, ctx)?;
    construct(&generic, args, ctx, span, None).map(Value::Class)
}

/// Instantiate with evaluated arguments. `prepare` runs after property
/// defaults are set and before the constructor.
pub fn instantiate_with_values(
    class: &Arc<ClassStmt>,
    values: Vec<Value>,
    ctx: &Context,
    span: Span,
    prepare: Option<&dyn Fn(&Arc<ClassValue>)>,
) -> Flow<Arc<ClassValue>> {
    let generic = class
        .clone_generic(Vec::new())
        .map_err(|err| Control::throw(err.with_span(span)))?;
    construct(&generic, ArgValues::from_values(values), ctx, span, prepare)
}

fn construct(
    generic: &Arc<ClassGeneric>,
    args: ArgValues,
    ctx: &Context,
    span: Span,
    prepare: Option<&dyn Fn(&Arc<ClassValue>)>,
) -> Flow<Arc<ClassValue>> {
    let class = &generic.class;
    if let Some(factory) = &class.host {
        let proxy = factory(generic, ctx, args.into_values())?;
        return Ok(Arc::new(ClassValue {
            class: generic.clone(),
            props: ObjectValue::new(),
            ctx: ctx.create_base_context(),
            proxy: Some(proxy),
        }));
    }

    let instance = new_instance(generic, ctx, span)?;
    if let Some(prepare) = prepare {
        prepare(&instance);
    }
    if let Some(constructor) = class.find_method(ctx.vm(), "__construct") {
        if !visible(constructor.modifier, &constructor.class, ctx) {
            return Err(error::runtime(
                format!(
                    "cannot instantiate {}: constructor is {}",
                    class.name,
                    constructor.modifier.as_str()
                ),
                span,
            ));
        }
        call_method(&instance, &constructor, args, ctx, span)?;
    }
    Ok(instance)
}

/// Allocate an instance and evaluate property defaults, root class first.
/// No constructor runs.
pub fn new_instance(generic: &Arc<ClassGeneric>, ctx: &Context, span: Span) -> Flow<Arc<ClassValue>> {
    let class = &generic.class;
    if class.host.is_some() {
        return Err(error::runtime(
            format!("{} cannot be initialized without its constructor", class.name),
            span,
        ));
    }
    let vm = ctx.vm();
    let instance_ctx = ctx.create_base_context();
    instance_ctx.set_namespace(namespace_of(&class.name));
    let instance = Arc::new(ClassValue {
        class: generic.clone(),
        props: ObjectValue::new(),
        ctx: instance_ctx,
        proxy: None,
    });

    for owner in class.ancestry(vm).into_iter().rev() {
        let frame = instance
            .ctx
            .create_context()
            .with_this(Some(instance.clone()), Some(owner.clone()));
        frame.set_namespace(namespace_of(&owner.name));
        for property in owner.properties.iter().filter(|p| !p.is_static && !p.is_const) {
            let value = match &property.default {
                Some(default) => eval(default, &frame)?,
                None => Value::Null,
            };
            instance.props.set(property.name.as_str(), value);
        }
    }
    Ok(instance)
}
