//! Decompiler collaborators used by decode passes.
//!
//! A [`Decompiler`] exposes the classes of one archive grouped into
//! independent batches, the archive's resources, and per-class accessors for
//! source text and a secondary listing. [`JarDecompiler`] implements it on top
//! of CFR and `javap`.

use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{self, top_level_class};
use crate::cfr::{Cfr, Javap};
use crate::filter::SourceFilter;

/// A top-level class and the inner classes folded into its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// `com.app.Main`
    pub full_name: String,
    /// `Lcom/app/Main;`
    pub raw_name: String,
    /// `Main`
    pub simple_name: String,
    /// `com/app/Main`
    pub alias_path: String,
    /// Class paths of inner classes, `com/app/Main$1`.
    pub inner: Vec<String>,
}

impl ClassEntry {
    pub fn from_class_path(class_path: &str) -> Self {
        let simple_name = class_path.rsplit('/').next().unwrap_or(class_path);
        Self {
            full_name: class_path.replace('/', "."),
            raw_name: format!("L{class_path};"),
            simple_name: simple_name.to_string(),
            alias_path: class_path.to_string(),
            inner: Vec::new(),
        }
    }

    /// The class is written when it or one of its inner classes is selected.
    pub fn is_eligible(&self, filter: &SourceFilter) -> bool {
        filter.accepts(&self.raw_name)
            || self
                .inner
                .iter()
                .any(|inner| filter.accepts(&format!("L{inner};")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub name: String,
}

pub trait Decompiler: Send + Sync {
    fn build_batches(&self) -> Vec<Vec<ClassEntry>>;

    fn resources(&self) -> Vec<ResourceEntry>;

    fn code(&self, class: &ClassEntry) -> Result<String>;

    fn smali(&self, class: &ClassEntry) -> Result<String>;

    /// Writes the resource below `out_dir` and returns the written path.
    fn save_resource(&self, resource: &ResourceEntry, out_dir: &Path) -> Result<PathBuf>;
}

/// What a decode pass needs from the decompiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecompileOptions {
    pub rename_classes: bool,
    pub include_source: bool,
    pub include_resources: bool,
}

pub trait DecompilerProvider: Send + Sync {
    fn open(&self, archive: &Path, options: &DecompileOptions) -> Result<Arc<dyn Decompiler>>;
}

#[derive(Debug, Clone)]
pub struct JarDecompilerProvider {
    pub cfr: Cfr,
}

impl DecompilerProvider for JarDecompilerProvider {
    fn open(&self, archive: &Path, options: &DecompileOptions) -> Result<Arc<dyn Decompiler>> {
        let cfr = self.cfr.clone().with_renaming(options.rename_classes);
        Ok(Arc::new(JarDecompiler::open(archive, cfr, options)?))
    }
}

#[derive(Debug)]
pub struct JarDecompiler {
    archive: PathBuf,
    cfr: Cfr,
    javap: Javap,
    classes: Vec<ClassEntry>,
    resources: Vec<ResourceEntry>,
}

impl JarDecompiler {
    pub fn open(archive: &Path, cfr: Cfr, options: &DecompileOptions) -> Result<Self> {
        let listed = catalog::catalog(archive)?;

        let classes = if options.include_source {
            group_classes(&listed.classes)
        } else {
            Vec::new()
        };
        let resources = if options.include_resources {
            listed
                .resources
                .into_iter()
                .map(|name| ResourceEntry { name })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            archive: archive.to_path_buf(),
            cfr,
            javap: Javap,
            classes,
            resources,
        })
    }
}

fn group_classes(class_paths: &[String]) -> Vec<ClassEntry> {
    let known: HashSet<&str> = class_paths.iter().map(String::as_str).collect();
    let mut grouped: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for path in class_paths {
        let top = top_level_class(path, |p| known.contains(p));
        let inner = grouped.entry(top).or_default();
        if top != path.as_str() {
            inner.push(path.clone());
        }
    }
    grouped
        .into_iter()
        .map(|(top, inner)| ClassEntry {
            inner,
            ..ClassEntry::from_class_path(top)
        })
        .collect()
}

impl Decompiler for JarDecompiler {
    fn build_batches(&self) -> Vec<Vec<ClassEntry>> {
        self.classes.iter().map(|c| vec![c.clone()]).collect()
    }

    fn resources(&self) -> Vec<ResourceEntry> {
        self.resources.clone()
    }

    fn code(&self, class: &ClassEntry) -> Result<String> {
        let code = self.cfr.decompile_class(&self.archive, &class.full_name)?;
        if code.trim().is_empty() {
            bail!("CFR produced no output for {}", class.full_name);
        }
        Ok(code)
    }

    fn smali(&self, class: &ClassEntry) -> Result<String> {
        self.javap.disassemble_class(&self.archive, &class.full_name)
    }

    fn save_resource(&self, resource: &ResourceEntry, out_dir: &Path) -> Result<PathBuf> {
        let relative = Path::new(&resource.name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Refusing to write resource outside output: {}", resource.name);
        }
        let bytes = catalog::read_entry(&self.archive, &resource.name)?;
        let target = out_dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&target, bytes)
            .with_context(|| format!("Failed to write resource: {}", target.display()))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_explorer_decompiler_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default())?;
            zip.write_all(content.as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn class_entry_names() {
        let entry = ClassEntry::from_class_path("com/app/Main");
        assert_eq!(entry.full_name, "com.app.Main");
        assert_eq!(entry.raw_name, "Lcom/app/Main;");
        assert_eq!(entry.simple_name, "Main");
        assert_eq!(entry.alias_path, "com/app/Main");
    }

    #[test]
    fn inner_classes_fold_into_top_level_batches() -> Result<()> {
        let base = temp_dir("batches");
        let jar = base.join("app.jar");
        write_jar(
            &jar,
            &[
                ("com/app/Main.class", ""),
                ("com/app/Main$1.class", ""),
                ("com/app/Util.class", ""),
                ("res/values/strings.xml", "<resources/>"),
            ],
        )?;

        let options = DecompileOptions {
            include_source: true,
            include_resources: true,
            ..Default::default()
        };
        let decompiler = JarDecompiler::open(&jar, Cfr::new(base.join("cfr.jar")), &options)?;
        let batches = decompiler.build_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].full_name, "com.app.Main");
        assert_eq!(batches[0][0].inner, vec!["com/app/Main$1"]);
        assert_eq!(batches[1][0].full_name, "com.app.Util");

        let only_inner = SourceFilter::from_results(&["com.app.Main$1".to_string()]);
        assert!(batches[0][0].is_eligible(&only_inner));
        assert!(!batches[1][0].is_eligible(&only_inner));

        let resources = decompiler.resources();
        assert_eq!(resources.len(), 1);
        let out = base.join("out");
        let written = decompiler.save_resource(&resources[0], &out)?;
        assert_eq!(written, out.join("res/values/strings.xml"));
        assert_eq!(std::fs::read_to_string(&written)?, "<resources/>");

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn dollar_prefixed_names_stay_top_level() {
        let paths = [
            "com/google/gson/internal/$Gson$Types",
            "com/google/gson/internal/$Gson$Types$1",
            "com/google/gson/internal/Excluder",
            "com/app/Orphan$Inner",
        ]
        .map(String::from);
        let entries = group_classes(&paths);

        let names: Vec<&str> = entries.iter().map(|e| e.full_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.app.Orphan$Inner",
                "com.google.gson.internal.$Gson$Types",
                "com.google.gson.internal.Excluder",
            ]
        );
        let types = &entries[1];
        assert_eq!(types.simple_name, "$Gson$Types");
        assert_eq!(types.raw_name, "Lcom/google/gson/internal/$Gson$Types;");
        assert_eq!(types.inner, vec!["com/google/gson/internal/$Gson$Types$1"]);
        assert!(entries[0].inner.is_empty());
        assert!(entries[2].inner.is_empty());
    }

    #[test]
    fn excluded_kinds_are_empty() -> Result<()> {
        let base = temp_dir("excluded");
        let jar = base.join("app.jar");
        write_jar(&jar, &[("a/B.class", ""), ("x.txt", "x")])?;

        let cfr = Cfr::new(base.join("cfr.jar"));
        let resources_only = JarDecompiler::open(
            &jar,
            cfr.clone(),
            &DecompileOptions {
                include_resources: true,
                ..Default::default()
            },
        )?;
        assert!(resources_only.build_batches().is_empty());
        assert_eq!(resources_only.resources().len(), 1);

        let sources_only = JarDecompiler::open(
            &jar,
            cfr,
            &DecompileOptions {
                include_source: true,
                ..Default::default()
            },
        )?;
        assert!(sources_only.resources().is_empty());

        let _ = std::fs::remove_dir_all(base);
        Ok(())
    }
}
