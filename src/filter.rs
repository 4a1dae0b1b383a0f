//! Compiled filters handed to the search engine, and the eligibility
//! predicates used by decode passes.

use regex::Regex;
use std::collections::HashSet;

use crate::advanced::AdvancedQuery;
use crate::literal::NumericLiteral;
use crate::query::{ClassPattern, QuerySpec, ReferenceTypes};

/// Class-level constraints, built from a query and the class advanced query.
#[derive(Debug, Clone)]
pub struct ClassFilter {
    pub packages: Vec<String>,
    pub classes: Vec<String>,
    pub class_simple_names: Vec<String>,
    pub class_pattern: Option<ClassPattern>,
    pub reference_types: ReferenceTypes,
    pub references: Vec<String>,
    pub reference_regex: Option<Regex>,
    pub signatures: Vec<String>,
    pub source_names: Vec<String>,
    pub numbers: Vec<NumericLiteral>,
    pub annotation_types: Vec<String>,
    pub annotation_values: Vec<String>,
    pub synthetic_enabled: bool,
    pub modifiers: i32,
    pub super_class: Option<String>,
    pub interfaces: Option<Vec<String>>,
    pub annotations: Vec<String>,
}

impl ClassFilter {
    pub fn compile(spec: &QuerySpec, advanced: &AdvancedQuery) -> Self {
        Self {
            packages: spec.packages.clone(),
            classes: spec.classes.clone(),
            class_simple_names: spec.class_simple_names.clone(),
            class_pattern: spec.class_pattern.clone(),
            reference_types: spec.reference_types,
            references: spec.references.clone(),
            reference_regex: spec.reference_regex.clone(),
            signatures: spec.signatures.clone(),
            source_names: spec.source_names.clone(),
            numbers: spec.numbers.clone(),
            annotation_types: spec.annotation_types.clone(),
            annotation_values: spec.annotation_values.clone(),
            synthetic_enabled: spec.synthetic_enabled,
            modifiers: advanced.modifiers,
            super_class: advanced.super_class.clone(),
            interfaces: advanced.interfaces.clone(),
            annotations: advanced.annotations.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MethodFilter {
    MatchAll,
    Match(Box<MethodConstraints>),
}

#[derive(Debug, Clone)]
pub struct MethodConstraints {
    pub reference_types: ReferenceTypes,
    pub references: Vec<String>,
    pub reference_regex: Option<Regex>,
    pub signatures: Vec<String>,
    pub numbers: Vec<NumericLiteral>,
    pub modifiers: i32,
    pub method_names: Vec<String>,
    pub params: Option<Vec<String>>,
    pub return_type: Option<String>,
    pub param_size: i32,
    pub annotations: Vec<String>,
    pub synthetic_enabled: bool,
}

impl MethodFilter {
    pub fn compile(spec: &QuerySpec, advanced: &AdvancedQuery) -> Self {
        Self::Match(Box::new(MethodConstraints {
            reference_types: spec.reference_types,
            references: spec.references.clone(),
            reference_regex: spec.reference_regex.clone(),
            signatures: spec.signatures.clone(),
            numbers: spec.numbers.clone(),
            modifiers: advanced.modifiers,
            method_names: advanced.method_names.clone(),
            params: advanced.method_params.clone(),
            return_type: advanced.method_return.clone(),
            param_size: advanced.param_size,
            annotations: advanced.annotations.clone(),
            synthetic_enabled: spec.synthetic_enabled,
        }))
    }
}

/// Which classes of an archive a decode pass writes. Class names are in
/// internal form (`Lcom/app/Main;`).
#[derive(Debug, Clone, Default)]
pub enum SourceFilter {
    #[default]
    All,
    /// Package prefixes (`Lcom/app/`) and classes including their inner
    /// classes (`Lcom/app/Main` followed by `;` or `$`).
    Selection {
        packages: Vec<String>,
        classes: Vec<String>,
    },
    /// Exactly these classes.
    Exact(HashSet<String>),
}

impl SourceFilter {
    pub fn from_selection(packages: &[String], classes: &[String]) -> Self {
        if packages.is_empty() && classes.is_empty() {
            return Self::All;
        }
        let packages = packages
            .iter()
            .map(|p| format!("L{}/", p.replace('.', "/")))
            .collect();
        let classes = classes
            .iter()
            .map(|c| {
                let internal = java_to_internal(c);
                internal.strip_suffix(';').unwrap_or(&internal).to_string()
            })
            .collect();
        Self::Selection { packages, classes }
    }

    /// Restricts a decode pass to the classes a search matched.
    pub fn from_results<'a>(class_names: impl IntoIterator<Item = &'a String>) -> Self {
        Self::Exact(
            class_names
                .into_iter()
                .map(|name| java_to_internal(name))
                .collect(),
        )
    }

    pub fn accepts(&self, internal_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Selection { packages, classes } => {
                packages.iter().any(|p| internal_name.starts_with(p.as_str()))
                    || classes.iter().any(|c| class_or_inner(c, internal_name))
            }
            Self::Exact(names) => names.contains(internal_name),
        }
    }
}

fn class_or_inner(class_prefix: &str, entry: &str) -> bool {
    entry
        .strip_prefix(class_prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c == ';' || c == '$')
}

pub const MANIFEST_ENTRIES: &[&str] = &["AndroidManifest.xml", "META-INF/MANIFEST.MF"];

/// Which resource entries a decode pass writes. The manifest is always kept.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    prefixes: Option<Vec<String>>,
}

impl ResourceFilter {
    pub fn all() -> Self {
        Self { prefixes: None }
    }

    /// `color` → entries under `res/color`.
    pub fn from_types(types: &[String]) -> Self {
        if types.is_empty() {
            return Self::all();
        }
        Self {
            prefixes: Some(types.iter().map(|t| format!("res/{t}")).collect()),
        }
    }

    pub fn accepts(&self, entry: &str) -> bool {
        if MANIFEST_ENTRIES.contains(&entry) {
            return true;
        }
        match self.prefixes.as_ref() {
            None => true,
            Some(prefixes) => prefixes.iter().any(|p| entry.starts_with(p.as_str())),
        }
    }
}

/// `com.app.Main` → `Lcom/app/Main;`, `int[]` → `[I`.
pub fn java_to_internal(java_name: &str) -> String {
    if java_name.is_empty() {
        return String::new();
    }
    let mut element = java_name;
    let mut dims = 0;
    while let Some(rest) = element.strip_suffix("[]") {
        element = rest;
        dims += 1;
    }
    let descriptor = match element {
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "short" => "S".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "float" => "F".to_string(),
        "double" => "D".to_string(),
        "void" => "V".to_string(),
        _ => format!("L{};", element.replace('.', "/")),
    };
    format!("{}{descriptor}", "[".repeat(dims))
}
