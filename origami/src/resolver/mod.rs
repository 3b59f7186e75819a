//! Class path resolution
//!
//! Maps namespace segments to directory roots and resolves qualified class
//! names (`App\Models\User`) to source files, loading them on demand.
//! Namespace nodes form a tree keyed by segment; each node may carry
//! several roots, tried in registration order. A segment with no node is
//! discovered lazily as a subdirectory of its parent's roots.

use crate::error::{Error, ErrorKind, Result};
use crate::interp::Vm;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source file extensions, in lookup order.
pub const EXTENSIONS: [&str; 2] = ["zy", "php"];

#[derive(Debug, Default)]
struct NamespaceNode {
    paths: Vec<PathBuf>,
    children: IndexMap<String, NamespaceNode>,
}

impl NamespaceNode {
    /// Exact segment first, then a case-insensitive match.
    fn child_key(&self, part: &str) -> Option<String> {
        if self.children.contains_key(part) {
            return Some(part.to_string());
        }
        self.children
            .keys()
            .find(|k| k.eq_ignore_ascii_case(part))
            .cloned()
    }
}

/// Namespace tree behind a lock; lookups may insert discovered nodes.
#[derive(Debug, Default)]
pub struct ClassPathManager {
    root: RwLock<NamespaceNode>,
}

impl ClassPathManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` as a root for `namespace`. Empty or missing paths are
    /// skipped with a warning; duplicates are ignored.
    pub fn add_namespace(&self, namespace: &str, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            warn!(namespace, "empty path for namespace");
            return;
        }
        let abs = match path.canonicalize() {
            Ok(abs) => abs,
            Err(err) => {
                warn!(namespace, path = %path.display(), %err, "namespace path does not exist");
                return;
            }
        };
        if !abs.is_dir() {
            warn!(namespace, path = %abs.display(), "namespace path is not a directory");
            return;
        }

        let mut root = self.root.write();
        let mut node = &mut *root;
        for part in split_namespace(namespace) {
            node = node.children.entry(part.to_string()).or_default();
        }
        if !node.paths.contains(&abs) {
            debug!(namespace, path = %abs.display(), "namespace registered");
            node.paths.push(abs);
        }
    }

    /// Roots registered (or discovered) for a namespace.
    pub fn roots(&self, namespace: &str) -> Vec<PathBuf> {
        self.with_node(namespace, |node| node.paths.clone())
            .unwrap_or_default()
    }

    /// Resolve a qualified class name to a source file.
    pub fn find_class_file(&self, class_name: &str) -> Option<PathBuf> {
        let (namespace, simple) = split_class_name(class_name);
        let roots = self.roots(namespace);
        for root in &roots {
            if let Some(found) = search_in_path(root, Path::new(simple)) {
                return Some(found);
            }
            if class_name.contains('\\') {
                let relative: PathBuf = split_namespace(class_name).collect();
                if let Some(found) = search_in_path(root, &relative) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Locate, load and execute the file for `class_name`, then confirm the
    /// class or interface is registered.
    pub fn load_class(&self, class_name: &str, vm: &Arc<Vm>) -> Result<()> {
        let Some(path) = self.find_class_file(class_name) else {
            return Err(Error::new(
                ErrorKind::ClassNotFound,
                format!("class {class_name} does not exist or cannot be loaded"),
            ));
        };
        debug!(class = class_name, path = %path.display(), "loading class");
        vm.load_file(&path)?;
        if vm.get_class(class_name).is_some() || vm.get_interface(class_name).is_some() {
            vm.set_class_path_cache(class_name, path);
            return Ok(());
        }
        Err(Error::new(
            ErrorKind::ClassNotDefined,
            format!("class {class_name} not found in file://{}", path.display()),
        ))
    }

    fn with_node<T>(&self, namespace: &str, f: impl FnOnce(&NamespaceNode) -> T) -> Option<T> {
        let parts: Vec<&str> = split_namespace(namespace).collect();
        {
            let root = self.root.read();
            let mut node = &*root;
            let mut complete = true;
            for part in &parts {
                match node.child_key(part) {
                    Some(key) => node = &node.children[&key],
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                return Some(f(node));
            }
        }

        let mut root = self.root.write();
        let mut node = &mut *root;
        for part in parts {
            let key = match node.child_key(part) {
                Some(key) => key,
                None => {
                    let dir = node.paths.iter().find_map(|p| find_dir(p, part))?;
                    debug!(segment = part, dir = %dir.display(), "namespace discovered");
                    node.children.insert(
                        part.to_string(),
                        NamespaceNode {
                            paths: vec![dir],
                            children: IndexMap::new(),
                        },
                    );
                    part.to_string()
                }
            };
            node = node.children.get_mut(&key)?;
        }
        Some(f(node))
    }
}

fn split_namespace(namespace: &str) -> impl Iterator<Item = &str> {
    namespace.split('\\').filter(|s| !s.is_empty())
}

/// `A\B\C` -> (`A\B`, `C`)
fn split_class_name(class_name: &str) -> (&str, &str) {
    match class_name.rfind('\\') {
        Some(i) => (&class_name[..i], &class_name[i + 1..]),
        None => ("", class_name),
    }
}

fn search_in_path(base: &Path, relative: &Path) -> Option<PathBuf> {
    for ext in EXTENSIONS {
        let candidate = base.join(relative).with_extension(ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    // Case-insensitive fallback, one component at a time.
    let mut dir = base.to_path_buf();
    let components: Vec<_> = relative.iter().collect();
    let (file, dirs) = components.split_last()?;
    for part in dirs {
        dir = find_dir(&dir, &part.to_string_lossy())?;
    }
    for ext in EXTENSIONS {
        let wanted = format!("{}.{ext}", file.to_string_lossy());
        if let Some(found) = find_entry(&dir, &wanted, false) {
            return Some(found);
        }
    }
    None
}

fn find_dir(base: &Path, name: &str) -> Option<PathBuf> {
    let exact = base.join(name);
    if exact.is_dir() {
        return Some(exact);
    }
    find_entry(base, name, true)
}

fn find_entry(base: &Path, name: &str, want_dir: bool) -> Option<PathBuf> {
    let entries = std::fs::read_dir(base).ok()?;
    entries.flatten().find_map(|entry| {
        let path = entry.path();
        let matches = entry.file_name().to_string_lossy().eq_ignore_ascii_case(name)
            && path.is_dir() == want_dir;
        matches.then_some(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<?php\n").unwrap();
    }

    #[test]
    fn test_find_in_registered_root() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("User.zy"));
        let cp = ClassPathManager::new();
        cp.add_namespace("App", dir.path());
        let found = cp.find_class_file("App\\User").unwrap();
        assert!(found.ends_with("User.zy"));
    }

    #[test]
    fn test_zy_preferred_over_php() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("User.php"));
        touch(&dir.path().join("User.zy"));
        let cp = ClassPathManager::new();
        cp.add_namespace("App", dir.path());
        assert!(cp.find_class_file("App\\User").unwrap().ends_with("User.zy"));
    }

    #[test]
    fn test_subdirectory_discovered_lazily() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        touch(&src.join("Models").join("User.php"));
        let cp = ClassPathManager::new();
        cp.add_namespace("app", &src);
        let found = cp.find_class_file("App\\Models\\User").unwrap();
        assert!(found.ends_with(Path::new("Models").join("User.php")));
        assert_eq!(cp.roots("App\\Models").len(), 1);
    }

    #[test]
    fn test_case_insensitive_file_match() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("user.zy"));
        let cp = ClassPathManager::new();
        cp.add_namespace("App", dir.path());
        assert!(cp.find_class_file("App\\User").is_some());
    }

    #[test]
    fn test_multiple_roots_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&second.path().join("Only.zy"));
        touch(&first.path().join("Both.zy"));
        touch(&second.path().join("Both.zy"));
        let cp = ClassPathManager::new();
        cp.add_namespace("Lib", first.path());
        cp.add_namespace("Lib", second.path());
        cp.add_namespace("Lib", first.path());
        assert_eq!(cp.roots("Lib").len(), 2);
        assert!(cp.find_class_file("Lib\\Only").unwrap().starts_with(second.path().canonicalize().unwrap()));
        assert!(cp.find_class_file("Lib\\Both").unwrap().starts_with(first.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_full_name_as_relative_path() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("Vendor").join("Pkg").join("Thing.zy"));
        let cp = ClassPathManager::new();
        cp.add_namespace("", dir.path());
        assert!(cp.find_class_file("Vendor\\Pkg\\Thing").is_some());
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let cp = ClassPathManager::new();
        cp.add_namespace("Ghost", "/definitely/not/here");
        cp.add_namespace("Empty", "");
        assert!(cp.roots("Ghost").is_empty());
        assert!(cp.find_class_file("Ghost\\X").is_none());
    }

    #[test]
    fn test_split_class_name() {
        assert_eq!(split_class_name("A\\B\\C"), ("A\\B", "C"));
        assert_eq!(split_class_name("C"), ("", "C"));
    }

    #[test]
    fn test_load_class_errors_are_distinct() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Empty.zy"), "<?php\n$x = 1;\n").unwrap();
        let vm = Vm::new();
        vm.class_path().add_namespace("App", dir.path());

        let missing = vm.class_path().load_class("App\\Nope", &vm).unwrap_err();
        assert_eq!(missing.kind, ErrorKind::ClassNotFound);

        let undefined = vm.class_path().load_class("App\\Empty", &vm).unwrap_err();
        assert_eq!(undefined.kind, ErrorKind::ClassNotDefined);
    }

    #[test]
    fn test_load_class_registers_class() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Greeter.zy"),
            "<?php\nnamespace App;\nclass Greeter { public function hi() { return \"hi\"; } }\n",
        )
        .unwrap();
        let vm = Vm::new();
        vm.class_path().add_namespace("App", dir.path());
        vm.class_path().load_class("App\\Greeter", &vm).unwrap();
        assert!(vm.get_class("App\\Greeter").is_some());
        assert!(vm.get_class_path_cache("App\\Greeter").is_some());
    }
}
