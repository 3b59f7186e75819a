//! Classes, interfaces and annotations
//!
//! Class and interface declarations are registered in the VM while they
//! are parsed, so later statements in the same unit can instantiate them.
//!
//! Annotations are instantiated at parse time. Member annotations (on
//! properties and methods) run immediately, in declaration order. For
//! statement targets (classes, functions, any other statement) every
//! annotation is constructed first, then those implementing
//! `CallAnnotation` have `call($target)` invoked in reverse order.

use super::Parser;
use crate::ast::{Arg, Ast, FunctionDecl, Node, Span};
use crate::error::{Error, Result};
use crate::interp::call::{call_method_values, instantiate_with_values};
use crate::interp::eval::eval;
use crate::interp::{
    AnnotationTarget, AnyValue, ClassStmt, ClassValue, Control, Flow, InterfaceStmt, Method,
    MethodBody, MethodSig, Modifier, Property, Value,
};
use crate::lexer::TokenKind;
use std::sync::Arc;
use tracing::debug;

/// `@Name(args)` seen before its target.
pub(super) struct PendingAnnotation {
    class: String,
    args: Vec<Arg>,
    span: Span,
}

/// Modifiers in front of a class member, in any order.
#[derive(Default)]
struct MemberModifiers {
    modifier: Modifier,
    is_static: bool,
    is_const: bool,
}

impl Parser {
    /// `class Name<T> extends Base implements I, J { members }`
    pub(super) fn parse_class(&mut self, annotations: Vec<PendingAnnotation>) -> Result<Ast> {
        let start = self.expect(TokenKind::Class, "")?.span;
        let name = self.expect(TokenKind::Ident, "after `class`")?.literal;
        let name = self.qualify(&name);

        let generics = if self.check(TokenKind::Lt) {
            self.advance();
            let mut names = Vec::new();
            while !self.check(TokenKind::Gt) {
                names.push(self.expect(TokenKind::Ident, "as a type parameter")?.literal);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "to close the type parameters")?;
            names
        } else {
            Vec::new()
        };

        let saved_generics = std::mem::replace(&mut self.generics, generics.clone());
        let saved_class = self.current_class.replace(name.clone());
        let result = self.class_body(name, generics, start);
        self.generics = saved_generics;
        self.current_class = saved_class;
        let class = result?;

        let class = Arc::new(class);
        self.vm
            .add_class(class.clone())
            .map_err(|err| err.with_span(class.span).with_file(self.file.clone()))?;
        debug!(class = %class.name, "class declared");

        let target = AnnotationTarget::Class(class.clone());
        for annotation in self.apply_annotations(&annotations, &target, true)? {
            class.add_annotation(annotation);
        }
        Ok(Ast::new(Node::ClassDecl(class.clone()), class.span))
    }

    /// Everything after the class name and type parameters.
    fn class_body(&mut self, name: String, generics: Vec<String>, start: Span) -> Result<ClassStmt> {
        let mut class = ClassStmt::new(name);
        class.generics = generics;
        class.file = self.file.clone();

        if self.eat(TokenKind::Extends) {
            let parent = self.parse_class_reference()?;
            self.ensure_loaded(&parent);
            class.extends = Some(parent);
        }
        if self.eat(TokenKind::Implements) {
            loop {
                let iface = self.parse_class_reference()?;
                self.ensure_loaded(&iface);
                class.implements.push(iface);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace, "to open the class body")?;
        let (result, _) = self.in_scope(false, |p| {
            while !p.check(TokenKind::RBrace) && !p.at_end() {
                let member_start = p.pos;
                if let Err(err) = p.parse_member(&mut class) {
                    p.errors.push(err);
                    p.recover(member_start);
                }
            }
            Ok(())
        });
        result?;
        self.expect(TokenKind::RBrace, "to close the class body")?;
        class.span = self.span_from(start);

        if class.construct.is_none() {
            class.construct = self.inherited_constructor(class.extends.as_deref());
        }
        Ok(class)
    }

    /// The nearest ancestor's constructor.
    fn inherited_constructor(&self, parent: Option<&str>) -> Option<Arc<Method>> {
        let parent = self.vm.get_class(parent?)?;
        parent
            .ancestry(&self.vm)
            .into_iter()
            .find_map(|class| class.construct.clone())
    }

    fn parse_member(&mut self, class: &mut ClassStmt) -> Result<()> {
        let annotations = self.parse_annotations()?;
        let modifiers = self.parse_modifiers();
        match self.kind() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::Function => {
                let mut method = self.parse_method(&class.name, modifiers)?;
                let target = AnnotationTarget::Method {
                    class: class.name.clone(),
                    method: method.name.clone(),
                };
                method.annotations = self.apply_annotations(&annotations, &target, false)?;
                class.add_method(method);
                Ok(())
            }
            _ => {
                let mut property = self.parse_property(modifiers)?;
                if class.own_property(&property.name).is_some() {
                    return Err(self.error(format!(
                        "property {}::${} is already declared",
                        class.name, property.name
                    )));
                }
                let target = AnnotationTarget::Property {
                    class: class.name.clone(),
                    name: property.name.clone(),
                };
                property.annotations = self.apply_annotations(&annotations, &target, false)?;
                class.properties.push(property);
                Ok(())
            }
        }
    }

    fn parse_modifiers(&mut self) -> MemberModifiers {
        let mut modifiers = MemberModifiers::default();
        loop {
            match self.kind() {
                TokenKind::Public => modifiers.modifier = Modifier::Public,
                TokenKind::Protected => modifiers.modifier = Modifier::Protected,
                TokenKind::Private => modifiers.modifier = Modifier::Private,
                TokenKind::Static => modifiers.is_static = true,
                // `const NAME` but not `const int $x`
                TokenKind::Const if self.peek_kind(2) == TokenKind::Assign => {
                    modifiers.is_const = true;
                    modifiers.is_static = true;
                }
                TokenKind::Var => {}
                _ => return modifiers,
            }
            self.advance();
        }
    }

    fn parse_method(&mut self, class: &str, modifiers: MemberModifiers) -> Result<Method> {
        let start = self.expect(TokenKind::Function, "")?.span;
        let name = self.expect_name("after `function`")?.literal;
        let (params, ret, body) = self.function_parts(true)?;
        let decl = Arc::new(FunctionDecl {
            name: name.clone(),
            params,
            ret,
            body,
            span: self.span_from(start),
            file: self.file.clone(),
        });
        Ok(Method {
            name,
            class: class.to_string(),
            modifier: modifiers.modifier,
            is_static: modifiers.is_static,
            body: MethodBody::Ast(decl),
            annotations: Vec::new(),
        })
    }

    /// `$x`, `Type $x`, `?Type $x`, `List<T> $x`, `x: Type`, `NAME` (for
    /// constants), each with an optional `= default`.
    fn parse_property(&mut self, modifiers: MemberModifiers) -> Result<Property> {
        let typed = match self.kind() {
            TokenKind::Question => true,
            TokenKind::Ident => matches!(
                self.peek_kind(1),
                TokenKind::Variable | TokenKind::Ident | TokenKind::Lt
            ),
            _ => false,
        };
        let mut ty = if typed { self.parse_type()? } else { None };
        let name = match self.kind() {
            TokenKind::Variable => self.advance().literal,
            _ => self.expect_name("as a property name")?.literal,
        };
        if ty.is_none() && self.eat(TokenKind::Colon) {
            ty = self.parse_type()?;
        }
        let default = if self.eat(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        if modifiers.is_const && default.is_none() {
            return Err(self.error(format!("constant {name} needs a value")));
        }
        self.skip_semicolon();
        Ok(Property {
            name,
            modifier: modifiers.modifier,
            is_static: modifiers.is_static,
            is_const: modifiers.is_const,
            ty,
            default,
            annotations: Vec::new(),
        })
    }

    /// `interface Name extends A, B { function m($a): int; }`
    pub(super) fn parse_interface(&mut self) -> Result<Ast> {
        let start = self.expect(TokenKind::Interface, "")?.span;
        let name = self.expect(TokenKind::Ident, "after `interface`")?.literal;
        let mut iface = InterfaceStmt::new(self.qualify(&name));
        iface.file = self.file.clone();
        if self.eat(TokenKind::Extends) {
            loop {
                let parent = self.parse_class_reference()?;
                self.ensure_loaded(&parent);
                iface.extends.push(parent);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace, "to open the interface body")?;
        while !self.check(TokenKind::RBrace) && !self.at_end() {
            self.parse_modifiers();
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            self.expect(TokenKind::Function, "in interface body")?;
            let method = self.expect_name("after `function`")?.literal;
            let (result, _) = self.in_scope(false, |p| {
                let params = p.parse_params()?;
                let ret = p.parse_return_type()?;
                Ok((params, ret))
            });
            let (params, ret) = result?;
            self.skip_semicolon();
            iface.methods.push(MethodSig {
                name: method,
                params,
                ret,
            });
        }
        self.expect(TokenKind::RBrace, "to close the interface body")?;
        iface.span = self.span_from(start);

        let iface = Arc::new(iface);
        self.vm
            .add_interface(iface.clone())
            .map_err(|err| err.with_file(self.file.clone()))?;
        Ok(Ast::new(Node::InterfaceDecl(iface.clone()), iface.span))
    }

    /// `@Name(args) ... <statement>`
    pub(super) fn parse_annotated(&mut self) -> Result<Option<Ast>> {
        let annotations = self.parse_annotations()?;
        match self.kind() {
            TokenKind::Class => self.parse_class(annotations).map(Some),
            TokenKind::Function if self.peek_kind(1) == TokenKind::Ident => {
                let decl = self.parse_function_decl()?;
                self.apply_annotations(&annotations, &AnnotationTarget::Function(decl.clone()), true)?;
                Ok(Some(Ast::new(Node::FunctionDecl(decl.clone()), decl.span)))
            }
            _ => {
                let stmt = self.parse_statement()?;
                if let Some(stmt) = &stmt {
                    let target = AnnotationTarget::Statement(Arc::new(stmt.clone()));
                    self.apply_annotations(&annotations, &target, true)?;
                }
                Ok(stmt)
            }
        }
    }

    fn parse_annotations(&mut self) -> Result<Vec<PendingAnnotation>> {
        let mut annotations = Vec::new();
        while self.check(TokenKind::At) {
            let start = self.advance().span;
            let class = self.expect(TokenKind::Ident, "after `@`")?.literal;
            let args = if self.check(TokenKind::LParen) && self.touches_previous() {
                self.parse_args()?
            } else {
                Vec::new()
            };
            annotations.push(PendingAnnotation {
                class,
                args,
                span: self.span_from(start),
            });
        }
        Ok(annotations)
    }

    /// Construct every annotation against `target`. Deferred annotations
    /// have `call` run after all are constructed, last declared first;
    /// otherwise each runs right after its construction.
    fn apply_annotations(
        &self,
        annotations: &[PendingAnnotation],
        target: &AnnotationTarget,
        deferred: bool,
    ) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(annotations.len());
        let mut calls = Vec::new();
        for annotation in annotations {
            let (instance, callable) = self.construct_annotation(annotation, target)?;
            if callable {
                if deferred {
                    calls.push((instance.clone(), annotation));
                } else {
                    self.call_annotation(&instance, annotation, target)?;
                }
            }
            values.push(Value::Class(instance));
        }
        for (instance, annotation) in calls.into_iter().rev() {
            self.call_annotation(&instance, annotation, target)?;
        }
        Ok(values)
    }

    /// Instantiate one annotation. Returns the instance and whether it is a
    /// `CallAnnotation`.
    fn construct_annotation(
        &self,
        annotation: &PendingAnnotation,
        target: &AnnotationTarget,
    ) -> Result<(Arc<ClassValue>, bool)> {
        let name = self.resolve_class_name(&annotation.class);
        let class = self.vm.get_or_load_class(&name).map_err(|err| {
            Error::annotation(format!("unknown annotation @{name}"), annotation.span)
                .with_file(self.file.clone())
                .with_cause(err)
        })?;
        let ctx = self.vm.create_context();
        let values = annotation
            .args
            .iter()
            .map(|arg| eval(&arg.value, &ctx).map(|v| v.deref_value()))
            .collect::<Flow<Vec<_>>>()
            .map_err(|control| self.annotation_failure(&name, "arguments", annotation.span, control))?;

        let target_value = Value::Any(AnyValue::new(target.clone()));
        let set_target = |instance: &Arc<ClassValue>| instance.props.set("target", target_value.clone());
        let prepare: Option<&dyn Fn(&Arc<ClassValue>)> = if self.vm.class_is(&class, "TypeMacro") {
            Some(&set_target)
        } else {
            None
        };
        let instance = instantiate_with_values(&class, values, &ctx, annotation.span, prepare)
            .map_err(|control| self.annotation_failure(&name, "construction", annotation.span, control))?;
        debug!(annotation = %name, target = %target.name(), "annotation constructed");
        Ok((instance, self.vm.class_is(&class, "CallAnnotation")))
    }

    fn call_annotation(
        &self,
        instance: &Arc<ClassValue>,
        annotation: &PendingAnnotation,
        target: &AnnotationTarget,
    ) -> Result<()> {
        let ctx = self.vm.create_context();
        let target_value = Value::Any(AnyValue::new(target.clone()));
        call_method_values(instance, "call", vec![target_value], &ctx, annotation.span)
            .map(|_| ())
            .map_err(|control| self.annotation_failure(instance.class_name(), "call", annotation.span, control))
    }

    fn annotation_failure(&self, name: &str, stage: &str, span: Span, control: Control) -> Error {
        let error = Error::annotation(format!("annotation @{name} failed during {stage}"), span)
            .with_file(self.file.clone());
        match control.into_error() {
            Some(cause) => error.with_cause(cause),
            None => error,
        }
    }
}
