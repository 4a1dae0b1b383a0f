//! Normalized search queries built from command-line flags.

use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::{EngineError, ParseError, UsageError};
use crate::literal::{NumericLiteral, parse_literals};

/// Which sections of a reference pool take part in matching or printing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceTypes(u8);

impl ReferenceTypes {
    pub const STRING: u8 = 0b0001;
    pub const TYPE_DESC: u8 = 0b0010;
    pub const FIELD: u8 = 0b0100;
    pub const METHOD: u8 = 0b1000;
    pub const ALL: u8 = 0b1111;

    pub const VALID_CHARS: &'static str = "astfm";

    pub fn none() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self(Self::ALL)
    }

    /// `a` all, `s` string, `t` type, `f` field, `m` method.
    pub fn parse(flags: &str) -> Result<Self, UsageError> {
        let mut bits = 0;
        for c in flags.chars() {
            bits |= match c {
                'a' => Self::ALL,
                's' => Self::STRING,
                't' => Self::TYPE_DESC,
                'f' => Self::FIELD,
                'm' => Self::METHOD,
                _ => return Err(UsageError::new(format!("Invalid reference type: {c}"))),
            };
        }
        Ok(Self(bits))
    }

    pub fn has_none(self) -> bool {
        self.0 == 0
    }

    pub fn has_all(self) -> bool {
        self.0 == Self::ALL
    }

    pub fn has_string(self) -> bool {
        self.0 & Self::STRING != 0
    }

    pub fn has_type_desc(self) -> bool {
        self.0 & Self::TYPE_DESC != 0
    }

    pub fn has_field(self) -> bool {
        self.0 & Self::FIELD != 0
    }

    pub fn has_method(self) -> bool {
        self.0 & Self::METHOD != 0
    }
}

/// Full-name constraint on classes.
#[derive(Debug, Clone)]
pub enum ClassPattern {
    /// User supplied; must match the whole class name.
    Regex(Regex),
    /// Matches every class whose name does not start with one of the containers.
    Excluding(Vec<String>),
}

impl ClassPattern {
    pub fn compile(pattern: &str) -> Result<Self, ParseError> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::Regex)
            .map_err(|e| ParseError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn excluding(containers: Vec<String>) -> Self {
        Self::Excluding(containers)
    }

    pub fn is_match(&self, class_name: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(class_name),
            Self::Excluding(containers) => !containers
                .iter()
                .any(|c| class_name.starts_with(c.as_str())),
        }
    }
}

impl fmt::Display for ClassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(re) => {
                let s = re.as_str();
                write!(f, "{}", &s[4..s.len() - 2])
            }
            Self::Excluding(containers) => {
                let quoted: Vec<String> = containers.iter().map(|c| format!("\\Q{c}\\E")).collect();
                write!(f, "^(?!{}).*$", quoted.join("|"))
            }
        }
    }
}

/// One `--res-name` entry: a field of a resource container class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceName {
    pub container: String,
    pub name: String,
}

impl ResourceName {
    /// `com.app.R$string.app_name` → container `com.app.R$string`, name `app_name`.
    pub fn from_qualified(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((container, name)) => Self {
                container: container.to_string(),
                name: name.to_string(),
            },
            None => Self {
                container: String::new(),
                name: qualified.to_string(),
            },
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.container, self.name)
    }
}

/// Expands `["com.app.R", "string:app_name"]` into `com.app.R$string.app_name`.
/// The first value names the resource class; the rest are `type:name` pairs.
/// Entries are expected to be validated already.
pub fn parse_resource_names(values: &[String]) -> Vec<ResourceName> {
    let Some((res_class, entries)) = values.split_first() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| entry.split_once(':'))
        .map(|(kind, name)| ResourceName::from_qualified(&format!("{res_class}${kind}.{name}")))
        .collect()
}

/// Numeric ids behind resource names, supplied by the search engine.
pub trait ResourceLookup {
    fn resource_id(&self, resource: &ResourceName) -> Result<i64, EngineError>;
}

/// Raw search flags, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub packages: Vec<String>,
    pub classes: Vec<String>,
    pub class_names: Vec<String>,
    pub class_regex: String,
    pub ref_types: String,
    pub references: Vec<String>,
    pub ref_regex: String,
    pub signatures: Vec<String>,
    pub sources: Vec<String>,
    pub numbers: Vec<String>,
    pub resource_names: Vec<String>,
    pub annotation_types: Vec<String>,
    pub annotation_values: Vec<String>,
    pub synthetic: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
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
    pub resource_names: Vec<ResourceName>,
    pub annotation_types: Vec<String>,
    pub annotation_values: Vec<String>,
    pub synthetic_enabled: bool,
}

impl QuerySpec {
    /// Compiles validated flags. `classes` and `class_names` are mutually
    /// exclusive and the reference flags travel together with `ref_types`.
    pub fn build(args: &QueryArgs) -> Result<Self, ParseError> {
        debug_assert!(args.classes.is_empty() || args.class_names.is_empty());

        let class_pattern = if args.class_regex.is_empty() {
            None
        } else {
            Some(ClassPattern::compile(&args.class_regex)?)
        };
        let reference_regex = if args.ref_regex.is_empty() {
            None
        } else {
            Some(
                Regex::new(&args.ref_regex).map_err(|e| ParseError::InvalidPattern {
                    pattern: args.ref_regex.clone(),
                    reason: e.to_string(),
                })?,
            )
        };
        let reference_types =
            ReferenceTypes::parse(&args.ref_types).map_err(|e| ParseError::InvalidKey(e.0))?;

        Ok(Self {
            packages: args.packages.clone(),
            classes: args.classes.clone(),
            class_simple_names: args.class_names.clone(),
            class_pattern,
            reference_types,
            references: args.references.clone(),
            reference_regex,
            signatures: args.signatures.clone(),
            source_names: args.sources.clone(),
            numbers: parse_literals(&args.numbers)?,
            resource_names: parse_resource_names(&args.resource_names),
            annotation_types: args.annotation_types.clone(),
            annotation_values: args.annotation_values.clone(),
            synthetic_enabled: args.synthetic,
        })
    }

    /// Looks up every resource name and returns the containers touched and
    /// the ids, both in the order the names were given.
    pub fn resolve_resources<L: ResourceLookup + ?Sized>(
        &self,
        lookup: &L,
    ) -> Result<ResolvedResources, EngineError> {
        let mut resolved = ResolvedResources::default();
        for resource in &self.resource_names {
            let id = lookup.resource_id(resource)?;
            if !resolved.containers.contains(&resource.container) {
                resolved.containers.push(resource.container.clone());
            }
            resolved.ids.push(NumericLiteral::integer(id));
        }
        Ok(resolved)
    }

    /// Specialization of this query for one archive. Resource ids follow the
    /// explicit literals. Containers are excluded from matching only when no
    /// explicit class pattern was given; an explicit pattern wins and the
    /// containers stay matchable.
    pub fn with_resources(&self, resolved: &ResolvedResources) -> Self {
        let mut spec = self.clone();
        spec.numbers.extend(resolved.ids.iter().cloned());
        if spec.class_pattern.is_none() && !resolved.containers.is_empty() {
            spec.class_pattern = Some(ClassPattern::excluding(resolved.containers.clone()));
        }
        spec
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedResources {
    pub containers: Vec<String>,
    pub ids: Vec<NumericLiteral>,
}
