//! Local names of the raw module and the recovery boundary in one file.

use std::collections::{HashMap, HashSet};
use syn::visit::{self, Visit};
use syn::{File, ItemUse, UseTree};

/// Free functions of the raw module, for resolving glob imports.
const RAW_FUNCTIONS: &[&str] = &[
    "global",
    "null",
    "undefined",
    "value_of",
    "func_of",
    "copy_bytes_to_rust",
    "copy_bytes_to_js",
];

/// Types of the raw module, for resolving glob imports.
const RAW_TYPES: &[&str] = &["Value", "Func", "Error", "Type", "Native", "ValueError"];

enum UseEntry {
    Named { path: Vec<String>, local: String },
    Glob { path: Vec<String> },
}

#[derive(Debug, Clone)]
pub(crate) struct RawImports {
    raw_path: String,
    raw_segments: Vec<String>,
    crate_root: String,
    catch_path: String,
    recovery_functions: Vec<String>,
    /// Local names bound to the raw module itself.
    bindings: HashSet<String>,
    /// Local name to canonical path, for types imported from the module.
    types: HashMap<String, String>,
    /// Local name to operation, for functions imported from the module.
    functions: HashMap<String, String>,
    glob: bool,
    catch_modules: HashSet<String>,
    recovery: HashSet<String>,
    qualified_mention: bool,
}

impl RawImports {
    pub(crate) fn new(raw_path: &str, recovery_functions: &[String]) -> Self {
        let crate_root = raw_path
            .rsplit_once("::")
            .map_or(raw_path, |(root, _)| root)
            .to_string();
        Self {
            raw_path: raw_path.to_string(),
            raw_segments: raw_path.split("::").map(str::to_string).collect(),
            catch_path: format!("{crate_root}::catch"),
            crate_root,
            recovery_functions: recovery_functions.to_vec(),
            bindings: HashSet::new(),
            types: HashMap::new(),
            functions: HashMap::new(),
            glob: false,
            catch_modules: HashSet::new(),
            recovery: HashSet::new(),
            qualified_mention: false,
        }
    }

    pub(crate) fn collect(file: &File, raw_path: &str, recovery_functions: &[String]) -> Self {
        let mut imports = Self::new(raw_path, recovery_functions);
        imports.visit_file(file);
        imports
    }

    pub(crate) fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Whether the file can reach the raw module at all.
    pub(crate) fn is_active(&self) -> bool {
        self.qualified_mention
            || self.glob
            || !self.bindings.is_empty()
            || !self.types.is_empty()
            || !self.functions.is_empty()
    }

    /// Canonical path of `segments` as written in this file, when it
    /// names something inside the raw module.
    pub(crate) fn canonicalize(&self, segments: &[String]) -> Option<String> {
        let (first, rest) = segments.split_first()?;
        if segments.starts_with(&self.raw_segments) {
            return Some(segments.join("::"));
        }
        let base = if self.bindings.contains(first) {
            self.raw_path.clone()
        } else if let Some(ty) = self.types.get(first) {
            ty.clone()
        } else if let Some(op) = self.functions.get(first).filter(|_| rest.is_empty()) {
            format!("{}::{}", self.raw_path, op)
        } else if self.glob
            && (RAW_TYPES.contains(&first.as_str())
                || (rest.is_empty() && RAW_FUNCTIONS.contains(&first.as_str())))
        {
            format!("{}::{}", self.raw_path, first)
        } else {
            return None;
        };
        Some(
            std::iter::once(base)
                .chain(rest.iter().cloned())
                .collect::<Vec<_>>()
                .join("::"),
        )
    }

    /// Whether a call through `segments` enters the recovery boundary.
    pub(crate) fn is_recovery_call(&self, segments: &[String]) -> bool {
        match segments {
            [name] => self.recovery.contains(name),
            [module, name] if self.catch_modules.contains(module) => {
                self.recovery_functions.contains(name)
            }
            _ => {
                let joined = segments.join("::");
                self.is_recovery_path(&joined)
            }
        }
    }

    fn is_recovery_path(&self, joined: &str) -> bool {
        self.recovery_functions.iter().any(|f| {
            joined == format!("{}::{}", self.catch_path, f)
                || joined == format!("{}::{}", self.crate_root, f)
        })
    }

    fn record(&mut self, entry: UseEntry) {
        match entry {
            UseEntry::Named { path, local } => {
                let joined = path.join("::");
                if joined == self.raw_path {
                    self.bindings.insert(local);
                } else if let Some(item) = self.raw_item(&joined) {
                    if item.starts_with(char::is_uppercase) {
                        self.types.insert(local, joined.clone());
                    } else {
                        self.functions.insert(local, item.to_string());
                    }
                } else if joined == self.catch_path {
                    self.catch_modules.insert(local);
                } else if self.is_recovery_path(&joined) {
                    self.recovery.insert(local);
                }
            }
            UseEntry::Glob { path } => {
                let joined = path.join("::");
                if joined == self.raw_path {
                    self.glob = true;
                } else if joined == self.catch_path {
                    self.recovery.extend(self.recovery_functions.iter().cloned());
                } else if joined == self.crate_root {
                    if let Some(module) = self.raw_segments.last() {
                        self.bindings.insert(module.clone());
                    }
                    self.catch_modules.insert("catch".to_string());
                    self.recovery.extend(self.recovery_functions.iter().cloned());
                }
            }
        }
    }

    fn raw_item<'p>(&self, joined: &'p str) -> Option<&'p str> {
        joined
            .strip_prefix(self.raw_path.as_str())?
            .strip_prefix("::")
            .filter(|item| !item.contains("::"))
    }
}

fn flatten(prefix: &mut Vec<String>, tree: &UseTree, out: &mut Vec<UseEntry>) {
    match tree {
        UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            flatten(prefix, &path.tree, out);
            prefix.pop();
        }
        UseTree::Name(name) => {
            if name.ident == "self" {
                if let Some(local) = prefix.last() {
                    out.push(UseEntry::Named {
                        local: local.clone(),
                        path: prefix.clone(),
                    });
                }
            } else {
                let mut path = prefix.clone();
                path.push(name.ident.to_string());
                out.push(UseEntry::Named {
                    path,
                    local: name.ident.to_string(),
                });
            }
        }
        UseTree::Rename(rename) => {
            if rename.rename == "_" {
                return;
            }
            let mut path = prefix.clone();
            if rename.ident != "self" {
                path.push(rename.ident.to_string());
            }
            out.push(UseEntry::Named {
                path,
                local: rename.rename.to_string(),
            });
        }
        UseTree::Glob(_) => out.push(UseEntry::Glob {
            path: prefix.clone(),
        }),
        UseTree::Group(group) => {
            for item in &group.items {
                flatten(prefix, item, out);
            }
        }
    }
}

impl<'ast> Visit<'ast> for RawImports {
    fn visit_item_use(&mut self, item: &'ast ItemUse) {
        let mut entries = Vec::new();
        flatten(&mut Vec::new(), &item.tree, &mut entries);
        for entry in entries {
            self.record(entry);
        }
    }

    fn visit_path(&mut self, path: &'ast syn::Path) {
        if !self.qualified_mention {
            let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
            self.qualified_mention = segments.starts_with(&self.raw_segments);
        }
        visit::visit_path(self, path);
    }
}
