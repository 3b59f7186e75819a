//! Host functions, host classes and the language prelude

use super::channel::Channel;
use super::class::{ClassGeneric, ClassStmt, ClassValue, HostObject};
use super::control::{Control, Flow};
use super::env::Context;
use super::error;
use super::value::{AsFloat, AsInt, Value};
use super::vm::Vm;
use crate::ast::Span;
use crate::types::Type;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Declarations every program can rely on, written in the language itself.
const PRELUDE: &str = r#"<?php
interface Throwable {
    public function getMessage();
}

interface TypeMacro {}

interface CallAnnotation {
    public function call($target);
}

class Exception implements Throwable {
    public $message = "";
    public $code = 0;
    public $previous = null;

    public function __construct($message = "", $code = 0, $previous = null) {
        $this->message = $message;
        $this->code = $code;
        $this->previous = $previous;
    }

    public function getMessage() {
        return $this->message;
    }

    public function getCode() {
        return $this->code;
    }

    public function getPrevious() {
        return $this->previous;
    }
}
"#;

pub fn install(vm: &Arc<Vm>) {
    install_functions(vm);
    vm.register_reflect_class(channel_class());
    vm.register_reflect_class(list_class());
    vm.register_reflect_class(map_class());

    let ctx = vm.create_context();
    if let Err(control) = vm.run_source(PRELUDE, None, &ctx) {
        error!(?control, "prelude failed to load");
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn host_error(message: impl Into<String>) -> Control {
    error::runtime(message, Span::default())
}

fn install_functions(vm: &Vm) {
    vm.register_function(
        "print",
        Arc::new(|ctx: &Context, args: Vec<Value>| {
            for value in &args {
                ctx.vm().write_output(&value.to_display_string());
            }
            Ok(Value::Null)
        }),
    );
    vm.register_function(
        "println",
        Arc::new(|ctx: &Context, args: Vec<Value>| {
            let line: Vec<String> = args.iter().map(Value::to_display_string).collect();
            ctx.vm().write_output(&format!("{}\n", line.join(" ")));
            Ok(Value::Null)
        }),
    );
    for name in ["count", "len"] {
        vm.register_function(name, Arc::new(|_: &Context, args: Vec<Value>| count(&arg(&args, 0))));
    }
    vm.register_function(
        "gettype",
        Arc::new(|_: &Context, args: Vec<Value>| Ok(Value::from(arg(&args, 0).type_name()))),
    );
    vm.register_function(
        "exit",
        Arc::new(|_: &Context, args: Vec<Value>| {
            let code = arg(&args, 0).as_int().unwrap_or(0);
            Err(Control::Exit(code as i32))
        }),
    );
    vm.register_function(
        "int",
        Arc::new(|_: &Context, args: Vec<Value>| {
            let value = arg(&args, 0);
            value.as_int().map(Value::Int).ok_or_else(|| {
                error::type_mismatch("int()", &Type::Int, &value.type_name(), Span::default())
            })
        }),
    );
    vm.register_function(
        "float",
        Arc::new(|_: &Context, args: Vec<Value>| {
            let value = arg(&args, 0);
            value.as_float().map(Value::Float).ok_or_else(|| {
                error::type_mismatch("float()", &Type::Float, &value.type_name(), Span::default())
            })
        }),
    );
    vm.register_function(
        "string",
        Arc::new(|_: &Context, args: Vec<Value>| Ok(Value::from(arg(&args, 0).to_display_string()))),
    );
    vm.register_function(
        "bool",
        Arc::new(|_: &Context, args: Vec<Value>| Ok(Value::Bool(arg(&args, 0).is_truthy()))),
    );
    vm.register_function(
        "array_keys",
        Arc::new(|_: &Context, args: Vec<Value>| match arg(&args, 0).deref_value() {
            Value::Array(items) => Ok(Value::array(
                (0..items.read().len() as i64).map(Value::Int).collect(),
            )),
            Value::Object(object) => Ok(Value::array(
                object.keys().into_iter().map(Value::from).collect(),
            )),
            Value::Class(instance) => match instance.proxy.as_ref().and_then(|p| p.entries()) {
                Some(entries) => Ok(Value::array(entries.into_iter().map(|(k, _)| k).collect())),
                None => Ok(Value::array(
                    instance.props.keys().into_iter().map(Value::from).collect(),
                )),
            },
            other => Err(host_error(format!(
                "array_keys() expects an array, got {}",
                other.type_name()
            ))),
        }),
    );
    vm.register_function(
        "array_values",
        Arc::new(|_: &Context, args: Vec<Value>| match arg(&args, 0).deref_value() {
            Value::Array(items) => Ok(Value::array(items.read().clone())),
            Value::Object(object) => Ok(Value::array(
                object.entries().into_iter().map(|(_, v)| v).collect(),
            )),
            Value::Class(instance) => match instance.proxy.as_ref().and_then(|p| p.entries()) {
                Some(entries) => Ok(Value::array(entries.into_iter().map(|(_, v)| v).collect())),
                None => Ok(Value::array(
                    instance.props.entries().into_iter().map(|(_, v)| v).collect(),
                )),
            },
            other => Err(host_error(format!(
                "array_values() expects an array, got {}",
                other.type_name()
            ))),
        }),
    );
    vm.register_function(
        "sleep_ms",
        Arc::new(|_: &Context, args: Vec<Value>| {
            let ms = arg(&args, 0).as_int().unwrap_or(0).max(0) as u64;
            std::thread::sleep(Duration::from_millis(ms));
            Ok(Value::Null)
        }),
    );
}

fn count(value: &Value) -> Flow<Value> {
    let n = match value.deref_value() {
        Value::Array(items) => items.read().len(),
        Value::Object(object) => object.len(),
        Value::Str(s) => s.chars().count(),
        Value::Null => 0,
        Value::Class(instance) => match instance.proxy.as_ref().and_then(|p| p.count()) {
            Some(n) => n,
            None => instance.props.len(),
        },
        other => {
            return Err(host_error(format!(
                "count() expects an array or object, got {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(n as i64))
}

/// Bound type argument, or an unbound parameter accepting anything.
fn bound_type(generic: &ClassGeneric, name: &str) -> Type {
    generic.binding(name).cloned().unwrap_or_else(|| Type::param(name))
}

fn check_element(ty: &Type, value: &Value, what: &str) -> Flow<()> {
    if ty.is(value) {
        Ok(())
    } else {
        Err(error::type_mismatch(what, ty, &value.type_name(), Span::default()))
    }
}

// Channel

struct ChannelObject {
    elem: Type,
    channel: Arc<Channel>,
}

impl HostObject for ChannelObject {
    fn call(&self, _: &Arc<ClassValue>, _: &Context, method: &str, args: Vec<Value>) -> Option<Flow<Value>> {
        let result = match method {
            "send" => {
                let value = arg(&args, 0).deref_value();
                check_element(&self.elem, &value, "Channel::send()").and_then(|_| {
                    self.channel
                        .send(value)
                        .map(|_| Value::Null)
                        .map_err(|err| host_error(err.to_string()))
                })
            }
            "receive" => Ok(match self.channel.receive() {
                Some(value) => Value::array(vec![value, Value::Bool(true)]),
                None => Value::array(vec![Value::Null, Value::Bool(false)]),
            }),
            "close" => {
                self.channel.close();
                Ok(Value::Null)
            }
            "isClosed" => Ok(Value::Bool(self.channel.is_closed())),
            "len" => Ok(Value::Int(self.channel.len() as i64)),
            "cap" => Ok(Value::Int(self.channel.cap() as i64)),
            _ => return None,
        };
        Some(result)
    }

    fn count(&self) -> Option<usize> {
        Some(self.channel.len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `new Channel(cap)` or `new Channel<T>(cap)`; capacity 0 is a rendezvous.
fn channel_class() -> ClassStmt {
    let mut class = ClassStmt::new("Channel");
    class.generics = vec!["T".to_string()];
    class.host = Some(Arc::new(|generic: &Arc<ClassGeneric>, _: &Context, args: Vec<Value>| {
        let cap = match args.first() {
            None => 0,
            Some(value) => value
                .as_int()
                .filter(|n| *n >= 0)
                .ok_or_else(|| host_error("channel capacity must be a non-negative integer"))?,
        };
        Ok(Arc::new(ChannelObject {
            elem: bound_type(generic, "T"),
            channel: Arc::new(Channel::new(cap as usize)),
        }) as Arc<dyn HostObject>)
    }));
    class
}

// List<T>

struct ListObject {
    elem: Type,
    items: RwLock<Vec<Value>>,
}

impl ListObject {
    fn index(&self, value: &Value) -> Flow<usize> {
        let len = self.items.read().len();
        value
            .as_int()
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < len)
            .ok_or_else(|| host_error(format!("list index {value} out of range (length {len})")))
    }
}

impl HostObject for ListObject {
    fn call(&self, _: &Arc<ClassValue>, _: &Context, method: &str, args: Vec<Value>) -> Option<Flow<Value>> {
        let result = match method {
            "add" => {
                let value = arg(&args, 0).deref_value();
                check_element(&self.elem, &value, "List::add()").map(|_| {
                    self.items.write().push(value);
                    Value::Null
                })
            }
            "get" => self
                .index(&arg(&args, 0))
                .map(|i| self.items.read()[i].clone()),
            "set" => {
                let value = arg(&args, 1).deref_value();
                check_element(&self.elem, &value, "List::set()")
                    .and_then(|_| self.index(&arg(&args, 0)))
                    .map(|i| {
                        self.items.write()[i] = value;
                        Value::Null
                    })
            }
            "remove" => self
                .index(&arg(&args, 0))
                .map(|i| self.items.write().remove(i)),
            "contains" => {
                let needle = arg(&args, 0);
                Ok(Value::Bool(self.items.read().iter().any(|v| v.strict_eq(&needle))))
            }
            "count" | "len" => Ok(Value::Int(self.items.read().len() as i64)),
            "toArray" => Ok(Value::array(self.items.read().clone())),
            _ => return None,
        };
        Some(result)
    }

    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        Some(
            self.items
                .read()
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v.clone()))
                .collect(),
        )
    }

    fn count(&self) -> Option<usize> {
        Some(self.items.read().len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `new List<T>(...items)`
fn list_class() -> ClassStmt {
    let mut class = ClassStmt::new("List");
    class.generics = vec!["T".to_string()];
    class.host = Some(Arc::new(|generic: &Arc<ClassGeneric>, _: &Context, args: Vec<Value>| {
        let elem = bound_type(generic, "T");
        for value in &args {
            check_element(&elem, value, "List::__construct()")?;
        }
        Ok(Arc::new(ListObject {
            elem,
            items: RwLock::new(args),
        }) as Arc<dyn HostObject>)
    }));
    class
}

// Map<K, V>

struct MapObject {
    key: Type,
    value: Type,
    /// Display form of the key -> (key, value)
    items: RwLock<IndexMap<String, (Value, Value)>>,
}

impl HostObject for MapObject {
    fn call(&self, _: &Arc<ClassValue>, _: &Context, method: &str, args: Vec<Value>) -> Option<Flow<Value>> {
        let key = arg(&args, 0).deref_value();
        let slot = key.to_display_string();
        let result = match method {
            "set" => {
                let value = arg(&args, 1).deref_value();
                check_element(&self.key, &key, "Map::set() key")
                    .and_then(|_| check_element(&self.value, &value, "Map::set() value"))
                    .map(|_| {
                        self.items.write().insert(slot, (key, value));
                        Value::Null
                    })
            }
            "get" => Ok(self
                .items
                .read()
                .get(&slot)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null)),
            "has" => Ok(Value::Bool(self.items.read().contains_key(&slot))),
            "remove" => Ok(self
                .items
                .write()
                .shift_remove(&slot)
                .map(|(_, v)| v)
                .unwrap_or(Value::Null)),
            "keys" => Ok(Value::array(
                self.items.read().values().map(|(k, _)| k.clone()).collect(),
            )),
            "values" => Ok(Value::array(
                self.items.read().values().map(|(_, v)| v.clone()).collect(),
            )),
            "count" | "len" => Ok(Value::Int(self.items.read().len() as i64)),
            _ => return None,
        };
        Some(result)
    }

    fn get_property(&self, _name: &str) -> Option<Value> {
        None
    }

    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        Some(self.items.read().values().cloned().collect())
    }

    fn count(&self) -> Option<usize> {
        Some(self.items.read().len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `new Map<K, V>()`
fn map_class() -> ClassStmt {
    let mut class = ClassStmt::new("Map");
    class.generics = vec!["K".to_string(), "V".to_string()];
    class.host = Some(Arc::new(|generic: &Arc<ClassGeneric>, _: &Context, _: Vec<Value>| {
        Ok(Arc::new(MapObject {
            key: bound_type(generic, "K"),
            value: bound_type(generic, "V"),
            items: RwLock::new(IndexMap::new()),
        }) as Arc<dyn HostObject>)
    }));
    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::call::{call_method_values, instantiate_with_values};
    use crate::interp::vm::OutputBuffer;
    use pretty_assertions::assert_eq;

    fn call(vm: &Arc<Vm>, name: &str, args: Vec<Value>) -> Flow<Value> {
        let func = vm.get_func(name).unwrap();
        crate::interp::call::call_with_values(&func, args, &vm.create_context(), Span::default())
    }

    fn new_host(vm: &Arc<Vm>, class: &str, type_args: Vec<Type>, args: Vec<Value>) -> Flow<Arc<ClassValue>> {
        let ctx = vm.create_context();
        let class = vm.get_class(class).unwrap();
        if type_args.is_empty() {
            return instantiate_with_values(&class, args, &ctx, Span::default(), None);
        }
        let generic = class.clone_generic(type_args).unwrap();
        let proxy = (class.host.as_ref().unwrap())(&generic, &ctx, args)?;
        Ok(Arc::new(ClassValue {
            class: generic,
            props: crate::interp::ObjectValue::new(),
            ctx: ctx.clone(),
            proxy: Some(proxy),
        }))
    }

    #[test]
    fn test_println_joins_with_spaces() {
        let out = OutputBuffer::new();
        let vm = Vm::with_output(Box::new(out.clone()));
        call(&vm, "println", vec![Value::from("a"), Value::Int(1)]).unwrap();
        call(&vm, "print", vec![Value::from("x")]).unwrap();
        assert_eq!(out.contents(), "a 1\nx");
    }

    #[test]
    fn test_count_and_gettype() {
        let vm = Vm::new();
        let arr = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(call(&vm, "count", vec![arr]), Ok(Value::Int(2))));
        assert!(matches!(call(&vm, "len", vec![Value::from("héllo")]), Ok(Value::Int(5))));
        let ty = call(&vm, "gettype", vec![Value::Float(1.0)]).unwrap();
        assert_eq!(ty.to_display_string(), "float");
    }

    #[test]
    fn test_exit_produces_exit_control() {
        let vm = Vm::new();
        assert!(matches!(call(&vm, "exit", vec![Value::Int(3)]), Err(Control::Exit(3))));
    }

    #[test]
    fn test_conversions() {
        let vm = Vm::new();
        assert!(matches!(call(&vm, "int", vec![Value::from("12")]), Ok(Value::Int(12))));
        assert!(call(&vm, "int", vec![Value::from("twelve")]).is_err());
        assert!(matches!(call(&vm, "bool", vec![Value::from("")]), Ok(Value::Bool(false))));
    }

    #[test]
    fn test_typed_list_rejects_wrong_element() {
        let vm = Vm::new();
        let ctx = vm.create_context();
        let list = new_host(&vm, "List", vec![Type::Int], Vec::new()).unwrap();
        call_method_values(&list, "add", vec![Value::Int(1)], &ctx, Span::default()).unwrap();
        let err = call_method_values(&list, "add", vec![Value::from("x")], &ctx, Span::default());
        assert!(matches!(err, Err(Control::Throw(_))));
        let n = call_method_values(&list, "count", Vec::new(), &ctx, Span::default()).unwrap();
        assert!(matches!(n, Value::Int(1)));
    }

    #[test]
    fn test_untyped_list_accepts_anything() {
        let vm = Vm::new();
        let ctx = vm.create_context();
        let list = new_host(&vm, "List", Vec::new(), vec![Value::Int(1), Value::from("a")]).unwrap();
        let arr = call_method_values(&list, "toArray", Vec::new(), &ctx, Span::default()).unwrap();
        assert_eq!(arr.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn test_typed_map() {
        let vm = Vm::new();
        let ctx = vm.create_context();
        let map = new_host(&vm, "Map", vec![Type::String, Type::Int], Vec::new()).unwrap();
        call_method_values(&map, "set", vec![Value::from("a"), Value::Int(1)], &ctx, Span::default()).unwrap();
        assert!(call_method_values(&map, "set", vec![Value::Int(1), Value::Int(1)], &ctx, Span::default()).is_err());
        assert!(call_method_values(&map, "set", vec![Value::from("b"), Value::from("x")], &ctx, Span::default()).is_err());
        let got = call_method_values(&map, "get", vec![Value::from("a")], &ctx, Span::default()).unwrap();
        assert!(matches!(got, Value::Int(1)));
        assert_eq!(map.proxy.as_ref().unwrap().count(), Some(1));
    }

    #[test]
    fn test_channel_receive_after_close() {
        let vm = Vm::new();
        let ctx = vm.create_context();
        let ch = new_host(&vm, "Channel", Vec::new(), vec![Value::Int(1)]).unwrap();
        call_method_values(&ch, "send", vec![Value::Int(5)], &ctx, Span::default()).unwrap();
        call_method_values(&ch, "close", Vec::new(), &ctx, Span::default()).unwrap();
        let first = call_method_values(&ch, "receive", Vec::new(), &ctx, Span::default()).unwrap();
        assert_eq!(first.to_string(), "[5, true]");
        let second = call_method_values(&ch, "receive", Vec::new(), &ctx, Span::default()).unwrap();
        assert_eq!(second.to_string(), "[null, false]");
        assert!(call_method_values(&ch, "send", vec![Value::Int(1)], &ctx, Span::default()).is_err());
        assert!(ch.host::<ChannelObject>().is_some());
    }
}
