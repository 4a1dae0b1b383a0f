//! Advanced per-entity queries: `f:public+final,s:Base,i:Foo+Bar`.
//!
//! A raw string is a `,`-separated list of `key:value(+value)*` queries. The
//! recognized keys depend on whether the query constrains classes or methods.

use serde::Serialize;

use crate::error::ParseError;

pub const QUERY_DIVIDER: char = ',';
pub const KEY_EXTRACTOR: char = ':';
pub const VALUE_DIVIDER: char = '+';

pub mod key {
    pub const FLAGS: char = 'f';
    pub const SUPER: char = 's';
    pub const IFACES: char = 'i';
    pub const ANNOTATIONS: char = 'a';
    pub const METHODS: char = 'm';
    pub const PARAMS: char = 'p';
    pub const PSIZE: char = 'q';
    pub const RETURN: char = 'r';
}

const CLASS_KEYS: &[char] = &[key::FLAGS, key::SUPER, key::IFACES, key::ANNOTATIONS];
const METHOD_KEYS: &[char] = &[
    key::FLAGS,
    key::METHODS,
    key::PARAMS,
    key::PSIZE,
    key::RETURN,
    key::ANNOTATIONS,
];
const EMPTY_ALLOWED: &[char] = &[key::IFACES, key::PARAMS];

pub const CLASS_QUERY_FORMAT: &str =
    "f:public+final+..., s:superclass, i:interface1+interface2+..., a:annotation+...";
pub const METHOD_QUERY_FORMAT: &str =
    "f:public+..., m:methodName+..., p:param1+..., r:return, q:paramSize, a:annotation+...";

/// Access flag bits as they appear in class files.
pub mod modifier {
    pub const PUBLIC: i32 = 0x0001;
    pub const PRIVATE: i32 = 0x0002;
    pub const PROTECTED: i32 = 0x0004;
    pub const STATIC: i32 = 0x0008;
    pub const FINAL: i32 = 0x0010;
    pub const SYNCHRONIZED: i32 = 0x0020;
    pub const NATIVE: i32 = 0x0100;
    pub const ABSTRACT: i32 = 0x0400;
    pub const STRICT: i32 = 0x0800;
}

const MODIFIERS: &[(&str, i32)] = &[
    ("PUBLIC", modifier::PUBLIC),
    ("PROTECTED", modifier::PROTECTED),
    ("PRIVATE", modifier::PRIVATE),
    ("ABSTRACT", modifier::ABSTRACT),
    ("STATIC", modifier::STATIC),
    ("FINAL", modifier::FINAL),
    ("STRICT", modifier::STRICT),
    ("NATIVE", modifier::NATIVE),
    ("SYNCHRONIZED", modifier::SYNCHRONIZED),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Class,
    Method,
}

impl EntityKind {
    fn label(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
        }
    }

    fn accepts(self, key: char) -> bool {
        match self {
            Self::Class => CLASS_KEYS.contains(&key),
            Self::Method => METHOD_KEYS.contains(&key),
        }
    }
}

/// Compiled advanced query. `None` means "no constraint"; `Some(vec![])` on
/// interfaces or params means "only entities with none".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvancedQuery {
    pub modifiers: i32,
    pub super_class: Option<String>,
    pub interfaces: Option<Vec<String>>,
    pub annotations: Vec<String>,
    pub method_names: Vec<String>,
    pub method_params: Option<Vec<String>>,
    pub method_return: Option<String>,
    pub param_size: i32,
}

impl Default for AdvancedQuery {
    fn default() -> Self {
        Self {
            modifiers: -1,
            super_class: None,
            interfaces: None,
            annotations: Vec::new(),
            method_names: Vec::new(),
            method_params: None,
            method_return: None,
            param_size: -1,
        }
    }
}

impl AdvancedQuery {
    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }

    pub fn parse(entity: EntityKind, raw: &str) -> Result<Self, ParseError> {
        let mut advanced = Self::default();
        if raw.is_empty() {
            return Ok(advanced);
        }

        for query in raw.split(QUERY_DIVIDER) {
            let (key, args) = divide_query(query)?;
            if !entity.accepts(key) {
                return Err(ParseError::KeyNotAllowed {
                    key,
                    entity: entity.label(),
                });
            }
            let values = sanitize(key, args)?;
            match key {
                key::FLAGS => advanced.modifiers = modifier_mask(&values)?,
                key::SUPER => advanced.super_class = values.into_iter().next(),
                key::IFACES => advanced.interfaces = Some(values),
                key::ANNOTATIONS => advanced.annotations = values,
                key::METHODS => advanced.method_names = values,
                key::PARAMS => advanced.method_params = Some(values),
                key::RETURN => advanced.method_return = values.into_iter().next(),
                key::PSIZE => {
                    let first = values.first().map(String::as_str).unwrap_or_default();
                    advanced.param_size = first
                        .parse()
                        .map_err(|_| ParseError::InvalidParamSize(first.to_string()))?;
                }
                _ => return Err(ParseError::InvalidKey(query.to_string())),
            }
        }
        Ok(advanced)
    }
}

fn divide_query(query: &str) -> Result<(char, &str), ParseError> {
    let Some((head, args)) = query.split_once(KEY_EXTRACTOR) else {
        return Err(ParseError::MissingDelimiter(query.to_string()));
    };
    match head.chars().last() {
        Some(k) if !k.is_whitespace() => Ok((k, args)),
        _ => Err(ParseError::InvalidKey(query.to_string())),
    }
}

fn sanitize(key: char, args: &str) -> Result<Vec<String>, ParseError> {
    let values: Vec<String> = args
        .split(VALUE_DIVIDER)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if values.is_empty() && !EMPTY_ALLOWED.contains(&key) {
        return Err(ParseError::MissingValue(key));
    }
    Ok(values)
}

/// Looks up one modifier name, case-insensitively.
pub fn modifier_bit(name: &str) -> Result<i32, ParseError> {
    let upper = name.to_uppercase();
    MODIFIERS
        .iter()
        .find(|(n, _)| *n == upper)
        .map(|(_, bit)| *bit)
        .ok_or_else(|| ParseError::UnknownModifier(name.to_string()))
}

pub fn modifier_mask(names: &[String]) -> Result<i32, ParseError> {
    names
        .iter()
        .try_fold(0, |acc, name| Ok(acc | modifier_bit(name)?))
}
