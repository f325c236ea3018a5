use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::error::{BenchError, Result};

/// Reserved module name under which layout pages are addressed.
pub const LAYOUT_MODULE: &str = "pages";

/// Extension of widget and layout definition files.
const DEFINITION_EXT: &str = "xml";

/// Subdirectory that marks a directory as a module.
const MODULE_CONFIG_DIR: &str = "config";

// ─── Targets ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    Widget,
    Layout,
}

impl TargetKind {
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::Widget => "widget",
            TargetKind::Layout => "layout",
        }
    }
}

/// One benchmarkable unit, addressed as `module/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub module: String,
    pub name: String,
}

impl Target {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> TargetKind {
        if self.module == LAYOUT_MODULE {
            TargetKind::Layout
        } else {
            TargetKind::Widget
        }
    }

    pub fn is_layout(&self) -> bool {
        self.kind() == TargetKind::Layout
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.name)
    }
}

// ─── Target tree ─────────────────────────────────────────────────

/// Ordered `module -> [name]` buckets. Insertion order is kept so the
/// report follows discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetTree {
    buckets: Vec<(String, Vec<String>)>,
}

impl TargetTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let mut tree = Self::new();
        for target in targets {
            tree.push(target);
        }
        tree
    }

    /// Append a target to its module bucket. Duplicates are ignored.
    pub fn push(&mut self, target: Target) {
        let Target { module, name } = target;
        match self.buckets.iter_mut().find(|(m, _)| *m == module) {
            Some((_, names)) => {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            None => self.buckets.push((module, vec![name])),
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.buckets.iter().map(|(m, n)| (m.as_str(), n.as_slice()))
    }

    pub fn targets(&self) -> impl Iterator<Item = Target> + '_ {
        self.modules()
            .flat_map(|(m, names)| names.iter().map(move |n| Target::new(m, n.as_str())))
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|(_, n)| n.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when at least one non-layout module contributes a widget.
    pub fn has_widget_modules(&self) -> bool {
        self.buckets
            .iter()
            .any(|(m, names)| m != LAYOUT_MODULE && !names.is_empty())
    }

    /// Move the layout bucket in front of every module bucket.
    fn layouts_first(&mut self) {
        if let Some(pos) = self.buckets.iter().position(|(m, _)| m == LAYOUT_MODULE) {
            let layouts = self.buckets.remove(pos);
            self.buckets.insert(0, layouts);
        }
    }
}

// ─── Selection expressions ───────────────────────────────────────

/// What the operator asked to benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `*`: every module, plus layouts when enabled.
    All,
    /// `module/*`
    Module(String),
    /// `module/name`
    Single(Target),
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for Selection {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Selection::All);
        }

        let invalid = || BenchError::InvalidSelection(s.to_string());
        let (module, name) = s.split_once('/').ok_or_else(invalid)?;
        if !is_identifier(module) {
            return Err(invalid());
        }

        match name {
            "*" => Ok(Selection::Module(module.to_string())),
            name if is_identifier(name) => Ok(Selection::Single(Target::new(module, name))),
            _ => Err(invalid()),
        }
    }
}

// ─── Target sources ──────────────────────────────────────────────

/// Which part of the application to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    AllModules,
    Module(&'a str),
    Layouts,
}

/// Existence checks and enumeration over the benchmarked application's
/// definitions.
pub trait TargetSource {
    fn module_exists(&self, module: &str) -> bool;

    fn target_exists(&self, target: &Target) -> bool;

    fn enumerate(&self, scope: Scope<'_>) -> Result<Vec<Target>>;
}

/// Reads definitions from an application checkout:
/// `modules/<module>/config/<name>.xml` and `pages/<name>.xml`.
#[derive(Debug, Clone)]
pub struct FsTargetSource {
    modules_dir: PathBuf,
    layouts_dir: PathBuf,
}

impl FsTargetSource {
    pub fn new(modules_dir: impl Into<PathBuf>, layouts_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules_dir: modules_dir.into(),
            layouts_dir: layouts_dir.into(),
        }
    }

    fn definition_path(&self, target: &Target) -> PathBuf {
        let file = format!("{}.{DEFINITION_EXT}", target.name);
        if target.is_layout() {
            self.layouts_dir.join(file)
        } else {
            self.modules_dir
                .join(&target.module)
                .join(MODULE_CONFIG_DIR)
                .join(file)
        }
    }

    /// Walk `dir`. Directories holding a `config` subdirectory are modules
    /// and get scanned one level down; definition files become targets of
    /// `module`.
    fn scan(&self, dir: &Path, module: Option<&str>, out: &mut Vec<Target>) -> Result<()> {
        for file in sorted_entries(dir)? {
            if file.starts_with('.') || file == LAYOUT_MODULE {
                continue;
            }

            let path = dir.join(&file);
            let nested = path.join(MODULE_CONFIG_DIR);
            if nested.is_dir() {
                self.scan(&nested, Some(&file), out)?;
            } else if let (Some(module), Some(name)) = (module, definition_name(&file)) {
                out.push(Target::new(module, name));
            }
        }
        Ok(())
    }
}

impl TargetSource for FsTargetSource {
    fn module_exists(&self, module: &str) -> bool {
        self.modules_dir.join(module).is_dir()
    }

    fn target_exists(&self, target: &Target) -> bool {
        self.definition_path(target).is_file()
    }

    fn enumerate(&self, scope: Scope<'_>) -> Result<Vec<Target>> {
        let mut out = Vec::new();
        match scope {
            Scope::AllModules => self.scan(&self.modules_dir, None, &mut out)?,
            Scope::Module(module) => {
                let dir = self.modules_dir.join(module).join(MODULE_CONFIG_DIR);
                self.scan(&dir, Some(module), &mut out)?;
            }
            Scope::Layouts => self.scan(&self.layouts_dir, Some(LAYOUT_MODULE), &mut out)?,
        }
        Ok(out)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)
        .map_err(|e| BenchError::io(dir, e))?
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .map_err(|e| BenchError::io(dir, e))
        })
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

fn definition_name(file: &str) -> Option<&str> {
    let (stem, ext) = file.rsplit_once('.')?;
    (ext.eq_ignore_ascii_case(DEFINITION_EXT) && !stem.is_empty()).then_some(stem)
}

// ─── Discovery ───────────────────────────────────────────────────

/// Resolves a [`Selection`] into the tree the engine will walk.
pub struct Discoverer<'a, S: TargetSource + ?Sized> {
    source: &'a S,
    layouts: bool,
}

impl<'a, S: TargetSource + ?Sized> Discoverer<'a, S> {
    /// `layouts` controls whether the universal wildcard also picks up
    /// layout pages.
    pub fn new(source: &'a S, layouts: bool) -> Self {
        Self { source, layouts }
    }

    pub fn discover(&self, selection: &Selection) -> Result<TargetTree> {
        let mut tree = TargetTree::new();

        match selection {
            Selection::Single(target) => {
                self.check_exists(target)?;
                tree.push(target.clone());
            }
            Selection::Module(module) if module == LAYOUT_MODULE => {
                extend(&mut tree, self.source.enumerate(Scope::Layouts)?);
            }
            Selection::Module(module) => {
                if !self.source.module_exists(module) {
                    return Err(BenchError::ModuleNotFound(module.clone()));
                }
                extend(&mut tree, self.source.enumerate(Scope::Module(module))?);
            }
            Selection::All => {
                if self.layouts {
                    extend(&mut tree, self.source.enumerate(Scope::Layouts)?);
                }
                extend(&mut tree, self.source.enumerate(Scope::AllModules)?);
                tree.layouts_first();
            }
        }

        debug!(targets = tree.len(), "target tree resolved");
        Ok(tree)
    }

    fn check_exists(&self, target: &Target) -> Result<()> {
        if target.is_layout() {
            if !self.source.target_exists(target) {
                return Err(BenchError::LayoutNotFound(target.name.clone()));
            }
            return Ok(());
        }

        if !self.source.module_exists(&target.module) {
            return Err(BenchError::ModuleNotFound(target.module.clone()));
        }
        if !self.source.target_exists(target) {
            return Err(BenchError::WidgetNotFound {
                module: target.module.clone(),
                name: target.name.clone(),
            });
        }
        Ok(())
    }
}

fn extend(tree: &mut TargetTree, targets: Vec<Target>) {
    for target in targets {
        tree.push(target);
    }
}
