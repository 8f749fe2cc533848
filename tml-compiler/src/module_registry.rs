// Module registry: maps module paths (`std::mathx`, `helpers`) to parsed
// modules and their checked views. The checker requests views lazily;
// import cycles are detected by tracking the in-progress set.

use crate::env::TypeEnv;
use std::collections::{BTreeMap, HashSet};
use tml_ast::Module;

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, ModuleEntry>,
    in_progress: HashSet<String>,
}

#[derive(Debug)]
struct ModuleEntry {
    module: Module,
    source: String,
    file_name: String,
    view: Option<TypeEnv>,
}

pub enum ModuleView<'a> {
    Ready(&'a TypeEnv),
    /// Requesting a module that is already being checked: import cycle.
    Cycle(Vec<String>),
    Missing,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parsed module under a path like `helpers` or
    /// `std::mathx`.
    pub fn register(&mut self, path: &str, module: Module, source: String, file_name: String) {
        self.modules.insert(
            path.to_string(),
            ModuleEntry {
                module,
                source,
                file_name,
                view: None,
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.modules.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|k| k.as_str())
    }

    pub fn module(&self, path: &str) -> Option<&Module> {
        self.modules.get(path).map(|e| &e.module)
    }

    pub fn source_of(&self, path: &str) -> Option<(&str, &str)> {
        self.modules
            .get(path)
            .map(|e| (e.source.as_str(), e.file_name.as_str()))
    }

    /// Fetch (building on first use) the typed view of a module. The
    /// builder callback checks the module body; reentrancy means a cycle.
    pub fn view_or_build(
        &mut self,
        path: &str,
        build: impl FnOnce(&Module, &str, &str) -> TypeEnv,
    ) -> ModuleView<'_> {
        if !self.modules.contains_key(path) {
            return ModuleView::Missing;
        }
        if self.in_progress.contains(path) {
            let mut chain: Vec<String> = self.in_progress.iter().cloned().collect();
            chain.sort();
            return ModuleView::Cycle(chain);
        }
        let needs_build = self
            .modules
            .get(path)
            .map(|e| e.view.is_none())
            .unwrap_or(false);
        if needs_build {
            self.in_progress.insert(path.to_string());
            let (module, source, file_name) = {
                let entry = &self.modules[path];
                (
                    entry.module.clone(),
                    entry.source.clone(),
                    entry.file_name.clone(),
                )
            };
            let view = build(&module, &source, &file_name);
            self.in_progress.remove(path);
            if let Some(entry) = self.modules.get_mut(path) {
                entry.view = Some(view);
            }
        }
        match self.modules.get(path).and_then(|e| e.view.as_ref()) {
            Some(view) => ModuleView::Ready(view),
            None => ModuleView::Missing,
        }
    }

    /// Pre-built view access without triggering a build.
    pub fn view(&self, path: &str) -> Option<&TypeEnv> {
        self.modules.get(path).and_then(|e| e.view.as_ref())
    }
}
