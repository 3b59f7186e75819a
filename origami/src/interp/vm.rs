//! The virtual machine: registries shared by every frame and thread

use super::builtins;
use super::class::{ClassStmt, InterfaceStmt};
use super::control::{Control, Flow};
use super::env::Context;
use super::eval;
use super::value::{Callable, HostFn, Value};
use crate::ast::FunctionDecl;
use crate::error::{Error, ErrorKind, Result};
use crate::parser::Parser;
use crate::resolver::ClassPathManager;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error};

/// Receives throws nobody caught (spawned units, top level).
pub type ThrowHandler = Arc<dyn Fn(&Control) + Send + Sync>;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

/// Registries are filled while loading and read afterwards, from any thread.
pub struct Vm {
    classes: DashMap<String, Arc<ClassStmt>>,
    interfaces: DashMap<String, Arc<InterfaceStmt>>,
    functions: DashMap<String, Arc<Callable>>,
    constants: DashMap<String, Value>,
    class_path: ClassPathManager,
    class_path_cache: DashMap<String, PathBuf>,
    loaded_files: DashSet<PathBuf>,
    throw_handler: RwLock<Option<ThrowHandler>>,
    output: Mutex<Box<dyn Write + Send>>,
    max_call_depth: AtomicUsize,
    spawned: AtomicUsize,
}

impl Vm {
    /// VM writing to stdout, with builtins and the prelude installed.
    pub fn new() -> Arc<Vm> {
        Vm::with_output(Box::new(std::io::stdout()))
    }

    pub fn with_output(output: Box<dyn Write + Send>) -> Arc<Vm> {
        let vm = Arc::new(Vm {
            classes: DashMap::new(),
            interfaces: DashMap::new(),
            functions: DashMap::new(),
            constants: DashMap::new(),
            class_path: ClassPathManager::new(),
            class_path_cache: DashMap::new(),
            loaded_files: DashSet::new(),
            throw_handler: RwLock::new(None),
            output: Mutex::new(output),
            max_call_depth: AtomicUsize::new(DEFAULT_MAX_CALL_DEPTH),
            spawned: AtomicUsize::new(0),
        });
        builtins::install(&vm);
        vm
    }

    pub fn create_context(self: &Arc<Self>) -> Context {
        Context::new(self.clone())
    }

    pub fn class_path(&self) -> &ClassPathManager {
        &self.class_path
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth.load(Ordering::Relaxed)
    }

    pub fn set_max_call_depth(&self, depth: usize) {
        self.max_call_depth.store(depth, Ordering::Relaxed);
    }

    pub(crate) fn next_task_id(&self) -> usize {
        self.spawned.fetch_add(1, Ordering::Relaxed)
    }

    // Classes and interfaces

    pub fn add_class(&self, class: Arc<ClassStmt>) -> Result<()> {
        if self.classes.contains_key(&class.name) || self.interfaces.contains_key(&class.name) {
            return Err(Error::new(
                ErrorKind::Runtime,
                format!("class {} is already declared", class.name),
            )
            .with_span(class.span)
            .with_file(class.file.clone()));
        }
        debug!(class = %class.name, "class registered");
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    pub fn get_class(&self, name: &str) -> Option<Arc<ClassStmt>> {
        self.classes.get(name).map(|c| c.clone())
    }

    /// Registered class, or load it through the class path.
    pub fn get_or_load_class(self: &Arc<Self>, name: &str) -> Result<Arc<ClassStmt>> {
        if let Some(class) = self.get_class(name) {
            return Ok(class);
        }
        self.class_path.load_class(name, self)?;
        self.get_class(name).ok_or_else(|| {
            Error::new(ErrorKind::ClassNotDefined, format!("{name} is not a class"))
        })
    }

    /// Re-registration from the file that declared the interface is allowed.
    pub fn add_interface(&self, iface: Arc<InterfaceStmt>) -> Result<()> {
        if let Some(existing) = self.interfaces.get(&iface.name) {
            if existing.file == iface.file {
                return Ok(());
            }
            return Err(Error::new(
                ErrorKind::Runtime,
                format!("interface {} is already declared", iface.name),
            )
            .with_span(iface.span));
        }
        if self.classes.contains_key(&iface.name) {
            return Err(Error::new(
                ErrorKind::Runtime,
                format!("{} is already declared as a class", iface.name),
            )
            .with_span(iface.span));
        }
        debug!(interface = %iface.name, "interface registered");
        self.interfaces.insert(iface.name.clone(), iface);
        Ok(())
    }

    pub fn get_interface(&self, name: &str) -> Option<Arc<InterfaceStmt>> {
        self.interfaces.get(name).map(|i| i.clone())
    }

    pub fn get_or_load_interface(self: &Arc<Self>, name: &str) -> Result<Arc<InterfaceStmt>> {
        if let Some(iface) = self.get_interface(name) {
            return Ok(iface);
        }
        self.class_path.load_class(name, self)?;
        self.get_interface(name).ok_or_else(|| {
            Error::new(ErrorKind::ClassNotDefined, format!("{name} is not an interface"))
        })
    }

    /// Whether `class` is `name`, extends it, or implements it (directly or
    /// through interface inheritance).
    pub fn class_is(&self, class: &Arc<ClassStmt>, name: &str) -> bool {
        class.ancestry(self).iter().any(|c| {
            c.name == name || c.implements.iter().any(|i| self.interface_is(i, name, 0))
        })
    }

    fn interface_is(&self, iface: &str, name: &str, depth: usize) -> bool {
        if iface == name {
            return true;
        }
        if depth > 64 {
            return false;
        }
        self.get_interface(iface)
            .is_some_and(|i| i.extends.iter().any(|e| self.interface_is(e, name, depth + 1)))
    }

    /// Every method an interface requires, including inherited ones.
    pub fn interface_methods(&self, name: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut pending = vec![name.to_string()];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if seen.contains(&current) {
                continue;
            }
            if let Some(iface) = self.get_interface(&current) {
                names.extend(iface.methods.iter().map(|m| m.name.clone()));
                pending.extend(iface.extends.iter().cloned());
            }
            seen.push(current);
        }
        names
    }

    // Functions and constants

    pub fn add_func(&self, decl: Arc<FunctionDecl>) {
        debug!(function = %decl.name, "function registered");
        self.functions
            .insert(decl.name.clone(), Arc::new(Callable::Function(decl)));
    }

    pub fn get_func(&self, name: &str) -> Option<Arc<Callable>> {
        self.functions.get(name).map(|f| f.clone())
    }

    pub fn register_function(&self, name: &str, func: HostFn) {
        self.functions.insert(
            name.to_string(),
            Arc::new(Callable::Host {
                name: name.to_string(),
                func,
            }),
        );
    }

    /// Register a class whose instances are built by host code.
    pub fn register_reflect_class(&self, class: ClassStmt) {
        debug!(class = %class.name, "host class registered");
        self.classes.insert(class.name.clone(), Arc::new(class));
    }

    pub fn add_constant(&self, name: &str, value: Value) {
        self.constants.insert(name.to_string(), value);
    }

    pub fn get_constant(&self, name: &str) -> Option<Value> {
        self.constants.get(name).map(|v| v.clone())
    }

    // Throws

    pub fn set_throw_control(&self, handler: ThrowHandler) {
        *self.throw_handler.write() = Some(handler);
    }

    /// Hand an uncaught control to the handler. Returns `Control::None`
    /// when a handler took it, otherwise gives it back.
    pub fn throw_control(&self, control: Control) -> Control {
        let handler = self.throw_handler.read().clone();
        match handler {
            Some(handler) => {
                handler(&control);
                Control::None
            }
            None => {
                if let Control::Throw(err) = &control {
                    error!(error = %err, "uncaught throw");
                }
                control
            }
        }
    }

    // Loading

    pub fn set_class_path_cache(&self, class: &str, path: PathBuf) {
        self.class_path_cache.insert(class.to_string(), path);
    }

    pub fn get_class_path_cache(&self, class: &str) -> Option<PathBuf> {
        self.class_path_cache.get(class).map(|p| p.clone())
    }

    /// Parse and execute a file once. Loading a file again is a no-op.
    pub fn load_and_run(self: &Arc<Self>, path: &Path) -> Flow<Value> {
        let path = path.canonicalize().map_err(|err| {
            Control::throw(Error::io_error(format!("cannot open {}: {err}", path.display())))
        })?;
        if !self.loaded_files.insert(path.clone()) {
            return Ok(Value::Null);
        }
        let source = std::fs::read_to_string(&path).map_err(|err| {
            Control::throw(Error::io_error(format!("cannot read {}: {err}", path.display())))
        })?;
        debug!(path = %path.display(), "loading file");
        let ctx = self.create_context();
        self.run_source(&source, Some(&path), &ctx)
    }

    /// `load_and_run` with the control folded into an error.
    pub fn load_file(self: &Arc<Self>, path: &Path) -> Result<Value> {
        match self.load_and_run(path) {
            Ok(value) => Ok(value),
            Err(Control::Exit(code)) => Err(Error::new(
                ErrorKind::Runtime,
                format!("exit({code}) while loading {}", path.display()),
            )),
            Err(control) => Err(control
                .into_error()
                .unwrap_or_else(|| Error::new(ErrorKind::Runtime, "unexpected control flow"))),
        }
    }

    /// Parse `source` and execute it in `ctx`.
    pub fn run_source(self: &Arc<Self>, source: &str, file: Option<&Path>, ctx: &Context) -> Flow<Value> {
        let mut parser = Parser::new(self.clone());
        if let Some(file) = file {
            parser.set_file(file);
        }
        let program = parser.parse_program(source).map_err(Control::throw)?;
        eval::run_program(&program.statements, ctx)
    }

    // Output

    pub fn write_output(&self, text: &str) {
        let mut out = self.output.lock();
        if let Err(err) = out.write_all(text.as_bytes()) {
            error!(%err, "write to output failed");
        }
    }

    pub fn flush_output(&self) {
        let _ = self.output.lock().flush();
    }
}

/// In-memory output sink; clones share the buffer.
#[derive(Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_duplicate_class_rejected() {
        let vm = Vm::new();
        vm.add_class(Arc::new(ClassStmt::new("Dup"))).unwrap();
        assert!(vm.add_class(Arc::new(ClassStmt::new("Dup"))).is_err());
    }

    #[test]
    fn test_prelude_is_installed() {
        let vm = Vm::new();
        assert!(vm.get_class("Exception").is_some());
        assert!(vm.get_interface("Throwable").is_some());
        assert!(vm.get_interface("CallAnnotation").is_some());
        assert!(vm.get_func("println").is_some());
    }

    #[test]
    fn test_class_is_walks_interfaces() {
        let vm = Vm::new();
        let mut base = InterfaceStmt::new("Base");
        base.file = None;
        vm.add_interface(Arc::new(base)).unwrap();
        let mut derived = InterfaceStmt::new("Derived");
        derived.extends.push("Base".into());
        vm.add_interface(Arc::new(derived)).unwrap();

        let mut class = ClassStmt::new("Impl");
        class.implements.push("Derived".into());
        let class = Arc::new(class);
        vm.add_class(class.clone()).unwrap();

        assert!(vm.class_is(&class, "Impl"));
        assert!(vm.class_is(&class, "Derived"));
        assert!(vm.class_is(&class, "Base"));
        assert!(!vm.class_is(&class, "Other"));
    }

    #[test]
    fn test_throw_control_handler() {
        let vm = Vm::new();
        let ctl = Control::throw(Error::new(ErrorKind::Runtime, "x"));
        assert!(vm.throw_control(ctl.clone()).is_throw());

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        vm.set_throw_control(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(vm.throw_control(ctl).is_none());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_and_run_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.zy");
        fs::write(&file, "<?php echo \"loaded\";").unwrap();
        let out = OutputBuffer::new();
        let vm = Vm::with_output(Box::new(out.clone()));
        vm.load_and_run(&file).unwrap();
        vm.load_and_run(&file).unwrap();
        assert_eq!(out.contents(), "loaded");
    }

    #[test]
    fn test_file_level_return() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.zy");
        fs::write(&file, "<?php return 42;").unwrap();
        let vm = Vm::new();
        match vm.load_and_run(&file) {
            Ok(Value::Return(inner)) => assert!(matches!(*inner, Value::Int(42))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let vm = Vm::new();
        let err = vm.load_file(Path::new("/no/such/file.zy")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
