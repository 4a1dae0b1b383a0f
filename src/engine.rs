//! Search engine seam and the search session that drives it.
//!
//! A [`SearchEngine`] loads archives; a loaded [`SearchArchive`] evaluates
//! compiled filters and streams matches back through a callback. The
//! [`SearchSession`] compiles a query once and runs it against each archive,
//! printing results as they arrive.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::advanced::AdvancedQuery;
use crate::catalog;
use crate::error::{EngineError, EngineStateError};
use crate::filter::{ClassFilter, MethodFilter};
use crate::query::{QuerySpec, ReferenceTypes, ResourceLookup, ResourceName};
use crate::sink::OutputSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Class,
    Method,
}

impl SearchMode {
    fn title(self) -> &'static str {
        match self {
            Self::Class => "Class",
            Self::Method => "Method",
        }
    }

    fn plural(self) -> &'static str {
        match self {
            Self::Class => "classes",
            Self::Method => "methods",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencePool {
    pub strings: Vec<String>,
    pub types: Vec<String>,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
}

/// One match. `class_name` is the dotted name of the declaring class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemData {
    pub class_name: String,
    pub display: String,
    pub reference_pool: Option<ReferencePool>,
}

/// Callback for streamed matches; returning `true` stops the search.
pub type ResultHandler<'a> = dyn FnMut(ItemData) -> bool + 'a;

pub trait SearchArchive: ResourceLookup {
    fn on_class_result(
        &self,
        class_filter: &ClassFilter,
        handler: &mut ResultHandler<'_>,
    ) -> Result<(), EngineError>;

    fn on_method_result(
        &self,
        class_filter: &ClassFilter,
        method_filter: &MethodFilter,
        handler: &mut ResultHandler<'_>,
    ) -> Result<(), EngineError>;
}

pub trait SearchEngine {
    fn load(&self, archive: &Path) -> Result<Box<dyn SearchArchive>, EngineError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub file: String,
    pub results: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct Compiled {
    spec: QuerySpec,
    class_advanced: AdvancedQuery,
    method_advanced: AdvancedQuery,
    class_filter: ClassFilter,
    method_filter: MethodFilter,
}

pub struct SearchSession {
    mode: SearchMode,
    limit: i64,
    print_pool: ReferenceTypes,
    compiled: Option<Compiled>,
}

impl SearchSession {
    pub fn new(mode: SearchMode) -> Self {
        Self {
            mode,
            limit: -1,
            print_pool: ReferenceTypes::none(),
            compiled: None,
        }
    }

    /// Stop after this many distinct classes; zero or negative means no limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_print_pool(mut self, types: ReferenceTypes) -> Self {
        self.print_pool = types;
        self
    }

    pub fn init(
        &mut self,
        spec: QuerySpec,
        class_advanced: AdvancedQuery,
        method_advanced: AdvancedQuery,
    ) -> Result<(), EngineStateError> {
        if self.compiled.is_some() {
            return Err(EngineStateError::AlreadyInitialized);
        }
        let (class_filter, method_filter) =
            compile_filters(self.mode, &spec, &class_advanced, &method_advanced);
        self.compiled = Some(Compiled {
            spec,
            class_advanced,
            method_advanced,
            class_filter,
            method_filter,
        });
        Ok(())
    }

    /// Runs the compiled query against one archive. Engine failures are
    /// printed and yield an empty result set.
    pub fn search(
        &self,
        engine: &dyn SearchEngine,
        archive: &Path,
        sink: &dyn OutputSink,
    ) -> Result<SearchOutcome, EngineStateError> {
        let compiled = self
            .compiled
            .as_ref()
            .ok_or(EngineStateError::NotInitialized)?;

        let mut outcome = SearchOutcome {
            file: archive.to_string_lossy().to_string(),
            results: Vec::new(),
            error: None,
        };
        sink.write(&format!("Searching {}...", self.mode.plural()));
        match self.run(compiled, engine, archive, sink) {
            Ok(results) => outcome.results = results,
            Err(err) => {
                sink.write(&format!("Failed: {err}"));
                tracing::debug!(archive = %archive.display(), "search failed: {err}");
                outcome.error = Some(err.to_string());
                return Ok(outcome);
            }
        }
        if outcome.results.is_empty() {
            sink.write("Result:  [Not Found]");
        }
        Ok(outcome)
    }

    fn run(
        &self,
        compiled: &Compiled,
        engine: &dyn SearchEngine,
        archive: &Path,
        sink: &dyn OutputSink,
    ) -> Result<Vec<String>, EngineError> {
        let loaded = engine.load(archive)?;

        let specialized;
        let (class_filter, method_filter) = if compiled.spec.resource_names.is_empty() {
            (&compiled.class_filter, &compiled.method_filter)
        } else {
            let resolved = compiled.spec.resolve_resources(&*loaded)?;
            let archive_spec = compiled.spec.with_resources(&resolved);
            specialized = compile_filters(
                self.mode,
                &archive_spec,
                &compiled.class_advanced,
                &compiled.method_advanced,
            );
            (&specialized.0, &specialized.1)
        };

        let mut results: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut handler = |item: ItemData| {
            if results.is_empty() {
                sink.write("Result:");
            }
            if seen.insert(item.class_name.clone()) {
                results.push(item.class_name.clone());
            }
            sink.write(&format!("+ {}: {}", self.mode.title(), item.display));
            if let Some(pool) = item.reference_pool.as_ref() {
                if let Some(text) = format_pool(pool, self.print_pool) {
                    sink.write(&text);
                }
            }
            self.limit > 0 && results.len() as i64 >= self.limit
        };

        match self.mode {
            SearchMode::Class => loaded.on_class_result(class_filter, &mut handler)?,
            SearchMode::Method => {
                loaded.on_method_result(class_filter, method_filter, &mut handler)?
            }
        }
        Ok(results)
    }
}

fn compile_filters(
    mode: SearchMode,
    spec: &QuerySpec,
    class_advanced: &AdvancedQuery,
    method_advanced: &AdvancedQuery,
) -> (ClassFilter, MethodFilter) {
    let class_filter = ClassFilter::compile(spec, class_advanced);
    let method_filter = match mode {
        SearchMode::Class => MethodFilter::MatchAll,
        SearchMode::Method => MethodFilter::compile(spec, method_advanced),
    };
    (class_filter, method_filter)
}

fn format_pool(pool: &ReferencePool, types: ReferenceTypes) -> Option<String> {
    if types.has_none() {
        return None;
    }
    let mut lines = vec!["- ReferencePool: ".to_string()];
    let sections = [
        (types.has_string(), "String References: ", &pool.strings),
        (types.has_type_desc(), "Type References: ", &pool.types),
        (types.has_field(), "Field References: ", &pool.fields),
        (types.has_method(), "Method References: ", &pool.methods),
    ];
    for (enabled, title, entries) in sections {
        if !enabled {
            continue;
        }
        lines.push(title.to_string());
        if entries.is_empty() {
            lines.push("  [EMPTY]".to_string());
        } else {
            lines.extend(entries.iter().map(|e| format!("  {e}")));
        }
    }
    Some(lines.join("\n   "))
}

/// Name-only engine over an archive's class list. Evaluates packages,
/// classes, simple names and the class pattern in class mode; any other
/// criterion is reported as unsupported.
#[derive(Debug, Default)]
pub struct CatalogEngine;

impl SearchEngine for CatalogEngine {
    fn load(&self, archive: &Path) -> Result<Box<dyn SearchArchive>, EngineError> {
        let listed = catalog::catalog(archive).map_err(|e| EngineError::Load {
            path: archive.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        Ok(Box::new(CatalogArchive {
            classes: listed
                .classes
                .iter()
                .map(|c| c.replace('/', "."))
                .collect(),
        }))
    }
}

struct CatalogArchive {
    classes: Vec<String>,
}

impl ResourceLookup for CatalogArchive {
    fn resource_id(&self, resource: &ResourceName) -> Result<i64, EngineError> {
        Err(EngineError::Unsupported(format!(
            "resource id lookup ({})",
            resource.qualified()
        )))
    }
}

impl SearchArchive for CatalogArchive {
    fn on_class_result(
        &self,
        filter: &ClassFilter,
        handler: &mut ResultHandler<'_>,
    ) -> Result<(), EngineError> {
        if let Some(criterion) = unsupported_criterion(filter) {
            return Err(EngineError::Unsupported(criterion.to_string()));
        }
        for class in &self.classes {
            if !matches_names(filter, class) {
                continue;
            }
            let item = ItemData {
                class_name: class.clone(),
                display: class.clone(),
                reference_pool: None,
            };
            if handler(item) {
                break;
            }
        }
        Ok(())
    }

    fn on_method_result(
        &self,
        _class_filter: &ClassFilter,
        _method_filter: &MethodFilter,
        _handler: &mut ResultHandler<'_>,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("method search".to_string()))
    }
}

fn unsupported_criterion(filter: &ClassFilter) -> Option<&'static str> {
    if !filter.reference_types.has_none() {
        Some("reference types")
    } else if !filter.source_names.is_empty() {
        Some("source names")
    } else if !filter.numbers.is_empty() {
        Some("numbers")
    } else if !filter.annotation_types.is_empty() || !filter.annotation_values.is_empty() {
        Some("annotation criteria")
    } else if filter.modifiers != -1 {
        Some("modifiers")
    } else if filter.super_class.is_some() {
        Some("super class")
    } else if filter.interfaces.is_some() {
        Some("interfaces")
    } else if !filter.annotations.is_empty() {
        Some("annotations")
    } else {
        None
    }
}

fn matches_names(filter: &ClassFilter, class: &str) -> bool {
    let package_ok = filter.packages.is_empty()
        || filter.packages.iter().any(|p| {
            class
                .strip_prefix(p.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
        });
    let class_ok = filter.classes.is_empty() || filter.classes.iter().any(|c| c == class);
    let simple = class.rsplit('.').next().unwrap_or(class);
    let simple_ok = filter.class_simple_names.is_empty()
        || filter.class_simple_names.iter().any(|s| s == simple);
    let pattern_ok = filter
        .class_pattern
        .as_ref()
        .is_none_or(|pattern| pattern.is_match(class));
    package_ok && class_ok && simple_ok && pattern_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advanced::EntityKind;
    use crate::query::QueryArgs;
    use crate::sink::MemorySink;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    struct FakeEngine {
        items: Vec<ItemData>,
        ids: HashMap<String, i64>,
    }

    struct FakeArchive {
        items: Vec<ItemData>,
        ids: HashMap<String, i64>,
    }

    impl SearchEngine for FakeEngine {
        fn load(&self, archive: &Path) -> Result<Box<dyn SearchArchive>, EngineError> {
            if archive.ends_with("broken.apk") {
                return Err(EngineError::Load {
                    path: archive.to_path_buf(),
                    reason: "bad magic".to_string(),
                });
            }
            Ok(Box::new(FakeArchive {
                items: self.items.clone(),
                ids: self.ids.clone(),
            }))
        }
    }

    impl ResourceLookup for FakeArchive {
        fn resource_id(&self, resource: &ResourceName) -> Result<i64, EngineError> {
            self.ids
                .get(&resource.qualified())
                .copied()
                .ok_or_else(|| EngineError::ResourceId(resource.qualified()))
        }
    }

    impl SearchArchive for FakeArchive {
        fn on_class_result(
            &self,
            filter: &ClassFilter,
            handler: &mut ResultHandler<'_>,
        ) -> Result<(), EngineError> {
            for item in &self.items {
                let allowed = filter
                    .class_pattern
                    .as_ref()
                    .is_none_or(|p| p.is_match(&item.class_name));
                if allowed && handler(item.clone()) {
                    break;
                }
            }
            Ok(())
        }

        fn on_method_result(
            &self,
            class_filter: &ClassFilter,
            method_filter: &MethodFilter,
            handler: &mut ResultHandler<'_>,
        ) -> Result<(), EngineError> {
            assert!(matches!(method_filter, MethodFilter::Match(_)));
            self.on_class_result(class_filter, handler)
        }
    }

    fn item(class: &str, display: &str) -> ItemData {
        ItemData {
            class_name: class.to_string(),
            display: display.to_string(),
            reference_pool: None,
        }
    }

    fn engine() -> FakeEngine {
        FakeEngine {
            items: vec![
                item("com.app.Main", "com.app.Main"),
                item("com.app.R$string", "com.app.R$string"),
                item("com.app.net.Http", "com.app.net.Http"),
            ],
            ids: HashMap::from([("com.app.R$string.title".to_string(), 0x7f0a0001)]),
        }
    }

    fn session(mode: SearchMode, args: QueryArgs) -> SearchSession {
        let mut session = SearchSession::new(mode);
        session
            .init(
                QuerySpec::build(&args).unwrap(),
                AdvancedQuery::parse(EntityKind::Class, "").unwrap(),
                AdvancedQuery::parse(EntityKind::Method, "").unwrap(),
            )
            .unwrap();
        session
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut session = SearchSession::new(SearchMode::Class);
        let sink = MemorySink::default();
        assert_eq!(
            session
                .search(&engine(), Path::new("app.apk"), &sink)
                .unwrap_err(),
            EngineStateError::NotInitialized
        );
        let spec = QuerySpec::build(&QueryArgs::default()).unwrap();
        let adv = AdvancedQuery::default();
        session.init(spec.clone(), adv.clone(), adv.clone()).unwrap();
        assert_eq!(
            session.init(spec, adv.clone(), adv).unwrap_err(),
            EngineStateError::AlreadyInitialized
        );
    }

    #[test]
    fn prints_results_and_honors_limit() {
        let session = session(SearchMode::Class, QueryArgs::default()).with_limit(2);
        let sink = MemorySink::default();
        let outcome = session
            .search(&engine(), Path::new("app.apk"), &sink)
            .unwrap();
        assert_eq!(outcome.results, vec!["com.app.Main", "com.app.R$string"]);
        assert_eq!(
            sink.lines(),
            vec![
                "Searching classes...",
                "Result:",
                "+ Class: com.app.Main",
                "+ Class: com.app.R$string",
            ]
        );
    }

    #[test]
    fn resource_containers_are_excluded_per_archive() {
        let session = session(
            SearchMode::Method,
            QueryArgs {
                resource_names: strings(&["com.app.R", "string:title"]),
                ..Default::default()
            },
        );
        let sink = MemorySink::default();
        let outcome = session
            .search(&engine(), Path::new("app.apk"), &sink)
            .unwrap();
        assert_eq!(outcome.results, vec!["com.app.Main", "com.app.net.Http"]);
        assert!(sink.lines().contains(&"+ Method: com.app.net.Http".to_string()));
    }

    #[test]
    fn engine_errors_yield_an_empty_set() {
        let session = session(SearchMode::Class, QueryArgs::default());
        let sink = MemorySink::default();
        let outcome = session
            .search(&engine(), Path::new("broken.apk"), &sink)
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.error.unwrap().contains("bad magic"));

        let missing = session_with_missing_resource();
        let outcome = missing
            .search(&engine(), Path::new("app.apk"), &sink)
            .unwrap();
        assert!(outcome.error.unwrap().contains("com.app.R$string.gone"));
    }

    fn session_with_missing_resource() -> SearchSession {
        session(
            SearchMode::Class,
            QueryArgs {
                resource_names: strings(&["com.app.R", "string:gone"]),
                ..Default::default()
            },
        )
    }

    #[test]
    fn not_found_is_reported() {
        let session = session(
            SearchMode::Class,
            QueryArgs {
                class_regex: "org\\..*".to_string(),
                ..Default::default()
            },
        );
        let sink = MemorySink::default();
        let outcome = session
            .search(&engine(), Path::new("app.apk"), &sink)
            .unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(sink.lines().last().unwrap(), "Result:  [Not Found]");
    }

    #[test]
    fn pool_sections_follow_requested_types() {
        let pool = ReferencePool {
            strings: strings(&["hello"]),
            ..Default::default()
        };
        let text = format_pool(&pool, ReferenceTypes::parse("sf").unwrap()).unwrap();
        assert_eq!(
            text,
            "- ReferencePool: \n   String References: \n     hello\n   Field References: \n     [EMPTY]"
        );
        assert!(format_pool(&pool, ReferenceTypes::none()).is_none());
    }

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_explorer_engine_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, classes: &[&str]) {
        use std::io::Write;
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for class in classes {
            zip.start_file(format!("{class}.class"), zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(b"").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn catalog_engine_matches_names() {
        let jar = temp_path("catalog.jar");
        write_jar(&jar, &["com/app/Main", "com/app/ui/MainView", "com/other/Main"]);

        let session = session(
            SearchMode::Class,
            QueryArgs {
                packages: strings(&["com.app"]),
                class_names: strings(&["Main", "MainView"]),
                ..Default::default()
            },
        );
        let sink = MemorySink::default();
        let outcome = session.search(&CatalogEngine, &jar, &sink).unwrap();
        assert_eq!(outcome.results, vec!["com.app.Main", "com.app.ui.MainView"]);

        let unsupported = session_numbers();
        let outcome = unsupported.search(&CatalogEngine, &jar, &sink).unwrap();
        assert!(outcome.error.unwrap().contains("numbers"));

        let _ = std::fs::remove_file(jar);
    }

    fn session_numbers() -> SearchSession {
        session(
            SearchMode::Class,
            QueryArgs {
                numbers: strings(&["7"]),
                ..Default::default()
            },
        )
    }
}
