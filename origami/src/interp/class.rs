//! Classes, interfaces and instances
//!
//! A [`ClassStmt`] is the template produced by the parser. Instantiation
//! first binds the template's type parameters ([`ClassStmt::clone_generic`]),
//! then builds a [`ClassValue`] against the bound [`ClassGeneric`].
//!
//! Member lookup checks the class itself, then walks the single superclass
//! chain; an ancestor's `private` members are never found through a
//! subclass.

use super::control::Flow;
use super::env::Context;
use super::object::ObjectValue;
use super::value::Value;
use super::vm::Vm;
use crate::ast::{Ast, FunctionDecl, Param, Span};
use crate::error::{Error, ErrorKind};
use crate::types::Type;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum Modifier {
    #[default]
    Public,
    Protected,
    Private,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Public => "public",
            Modifier::Protected => "protected",
            Modifier::Private => "private",
        }
    }
}

#[derive(Debug)]
pub struct Property {
    pub name: String,
    pub modifier: Modifier,
    pub is_static: bool,
    pub is_const: bool,
    pub ty: Option<Type>,
    pub default: Option<Ast>,
    pub annotations: Vec<Value>,
}

/// Host implementation of a method.
pub type HostMethod =
    Arc<dyn Fn(&Arc<ClassValue>, &Context, Vec<Value>) -> Flow<Value> + Send + Sync>;

pub enum MethodBody {
    Ast(Arc<FunctionDecl>),
    Host(HostMethod),
}

pub struct Method {
    pub name: String,
    /// Name of the class that declared the method.
    pub class: String,
    pub modifier: Modifier,
    pub is_static: bool,
    pub body: MethodBody,
    pub annotations: Vec<Value>,
}

impl Method {
    pub fn decl(&self) -> Option<&Arc<FunctionDecl>> {
        match &self.body {
            MethodBody::Ast(decl) => Some(decl),
            MethodBody::Host(_) => None,
        }
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("modifier", &self.modifier)
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// Builds the host side of a host-backed class instance.
pub type HostFactory =
    Arc<dyn Fn(&Arc<ClassGeneric>, &Context, Vec<Value>) -> Flow<Arc<dyn HostObject>> + Send + Sync>;

/// Delegation wrapper for host-backed instances. Each hook returns `None`
/// to fall through to the class's own members.
pub trait HostObject: Send + Sync {
    fn call(
        &self,
        instance: &Arc<ClassValue>,
        ctx: &Context,
        method: &str,
        args: Vec<Value>,
    ) -> Option<Flow<Value>>;

    fn get_property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Key/value pairs for `foreach`.
    fn entries(&self) -> Option<Vec<(Value, Value)>> {
        None
    }

    fn count(&self) -> Option<usize> {
        None
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

/// Class template.
pub struct ClassStmt {
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    /// Type parameter names, in declaration order.
    pub generics: Vec<String>,
    pub properties: Vec<Property>,
    pub methods: IndexMap<String, Arc<Method>>,
    /// Own or inherited constructor.
    pub construct: Option<Arc<Method>>,
    pub span: Span,
    pub file: Option<Arc<str>>,
    pub host: Option<HostFactory>,
    statics: Mutex<IndexMap<String, Value>>,
    annotations: Mutex<Vec<Value>>,
}

impl std::fmt::Debug for ClassStmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassStmt")
            .field("name", &self.name)
            .field("extends", &self.extends)
            .field("implements", &self.implements)
            .field("generics", &self.generics)
            .field("properties", &self.properties)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ClassStmt {
    pub fn new(name: impl Into<String>) -> Self {
        ClassStmt {
            name: name.into(),
            extends: None,
            implements: Vec::new(),
            generics: Vec::new(),
            properties: Vec::new(),
            methods: IndexMap::new(),
            construct: None,
            span: Span::default(),
            file: None,
            host: None,
            statics: Mutex::new(IndexMap::new()),
            annotations: Mutex::new(Vec::new()),
        }
    }

    pub fn add_method(&mut self, method: Method) {
        let method = Arc::new(method);
        if method.name == "__construct" {
            self.construct = Some(method.clone());
        }
        self.methods.insert(method.name.clone(), method);
    }

    /// Host method helper for classes implemented in Rust.
    pub fn add_host_method(
        &mut self,
        name: &str,
        func: impl Fn(&Arc<ClassValue>, &Context, Vec<Value>) -> Flow<Value> + Send + Sync + 'static,
    ) {
        let method = Method {
            name: name.to_string(),
            class: self.name.clone(),
            modifier: Modifier::Public,
            is_static: false,
            body: MethodBody::Host(Arc::new(func)),
            annotations: Vec::new(),
        };
        self.add_method(method);
    }

    pub fn own_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn annotations(&self) -> Vec<Value> {
        self.annotations.lock().clone()
    }

    pub fn add_annotation(&self, annotation: Value) {
        self.annotations.lock().push(annotation);
    }

    pub fn static_value(&self, name: &str) -> Option<Value> {
        self.statics.lock().get(name).cloned()
    }

    pub fn set_static_value(&self, name: &str, value: Value) {
        self.statics.lock().insert(name.to_string(), value);
    }

    /// Walk this class and its ancestors, nearest first.
    pub fn ancestry(self: &Arc<Self>, vm: &Vm) -> Vec<Arc<ClassStmt>> {
        let mut chain = vec![self.clone()];
        let mut current = self.extends.clone();
        while let Some(parent) = current {
            if chain.iter().any(|c| c.name == parent) {
                break;
            }
            match vm.get_class(&parent) {
                Some(class) => {
                    current = class.extends.clone();
                    chain.push(class);
                }
                None => break,
            }
        }
        chain
    }

    pub fn find_method(self: &Arc<Self>, vm: &Vm, name: &str) -> Option<Arc<Method>> {
        for (depth, class) in self.ancestry(vm).into_iter().enumerate() {
            if let Some(method) = class.methods.get(name) {
                if depth > 0 && method.modifier == Modifier::Private {
                    return None;
                }
                return Some(method.clone());
            }
        }
        None
    }

    /// Declaring class and property, skipping ancestors' private members.
    pub fn find_property(self: &Arc<Self>, vm: &Vm, name: &str) -> Option<(Arc<ClassStmt>, usize)> {
        for (depth, class) in self.ancestry(vm).into_iter().enumerate() {
            if let Some(index) = class.properties.iter().position(|p| p.name == name) {
                if depth > 0 && class.properties[index].modifier == Modifier::Private {
                    return None;
                }
                return Some((class, index));
            }
        }
        None
    }

    /// Bind type arguments. An empty list leaves every parameter unbound.
    pub fn clone_generic(self: &Arc<Self>, type_args: Vec<Type>) -> Result<Arc<ClassGeneric>, Error> {
        if !type_args.is_empty() && type_args.len() != self.generics.len() {
            return Err(Error::new(
                ErrorKind::Type,
                format!(
                    "class {} expects {} type argument(s), {} given",
                    self.name,
                    self.generics.len(),
                    type_args.len()
                ),
            ));
        }
        let bindings = if type_args.is_empty() {
            self.generics.iter().map(|g| (g.clone(), Type::param(g))).collect()
        } else {
            self.generics.iter().cloned().zip(type_args).collect()
        };
        Ok(Arc::new(ClassGeneric {
            class: self.clone(),
            bindings,
        }))
    }
}

/// A class template with its type parameters bound.
#[derive(Debug)]
pub struct ClassGeneric {
    pub class: Arc<ClassStmt>,
    pub bindings: IndexMap<String, Type>,
}

impl ClassGeneric {
    pub fn binding(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }
}

/// A class instance.
pub struct ClassValue {
    pub class: Arc<ClassGeneric>,
    pub props: ObjectValue,
    /// Context of the frame that created the instance; methods run in
    /// frames derived from it.
    pub ctx: Context,
    pub proxy: Option<Arc<dyn HostObject>>,
}

impl ClassValue {
    pub fn class_name(&self) -> &str {
        &self.class.class.name
    }

    pub fn stmt(&self) -> &Arc<ClassStmt> {
        &self.class.class
    }

    pub fn instance_of(&self, name: &str) -> bool {
        self.ctx.vm().class_is(self.stmt(), name)
    }

    pub fn get_property(&self, name: &str) -> Option<Value> {
        if let Some(proxy) = &self.proxy {
            if let Some(value) = proxy.get_property(name) {
                return Some(value);
            }
        }
        self.props.get(name)
    }

    pub fn host<T: 'static>(&self) -> Option<&T> {
        self.proxy.as_ref()?.as_any().downcast_ref::<T>()
    }
}

/// Method signature inside an interface.
#[derive(Debug)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
}

/// Interface: a name-only contract.
#[derive(Debug)]
pub struct InterfaceStmt {
    pub name: String,
    pub extends: Vec<String>,
    pub methods: Vec<MethodSig>,
    pub span: Span,
    pub file: Option<Arc<str>>,
}

impl InterfaceStmt {
    pub fn new(name: impl Into<String>) -> Self {
        InterfaceStmt {
            name: name.into(),
            extends: Vec::new(),
            methods: Vec::new(),
            span: Span::default(),
            file: None,
        }
    }
}

/// What an annotation was attached to; passed to annotations as `$target`.
#[derive(Debug, Clone)]
pub enum AnnotationTarget {
    Class(Arc<ClassStmt>),
    Function(Arc<FunctionDecl>),
    Method { class: String, method: String },
    Property { class: String, name: String },
    Statement(Arc<Ast>),
}

impl AnnotationTarget {
    pub fn name(&self) -> String {
        match self {
            AnnotationTarget::Class(class) => class.name.clone(),
            AnnotationTarget::Function(decl) => decl.name.clone(),
            AnnotationTarget::Method { class, method } => format!("{class}::{method}"),
            AnnotationTarget::Property { class, name } => format!("{class}::${name}"),
            AnnotationTarget::Statement(_) => "statement".to_string(),
        }
    }
}
