//! Command drivers: validate flags, build the query or decode job, and run
//! it over every input archive.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::advanced::{AdvancedQuery, EntityKind};
use crate::cli::{BatchArgs, DecodeArgs, MapverArgs, SearchArgs, command_description};
use crate::config;
use crate::decoder::{DecodeJob, DecodeReport, Decoder};
use crate::decompiler::DecompilerProvider;
use crate::engine::{SearchEngine, SearchMode, SearchOutcome, SearchSession};
use crate::error::UsageError;
use crate::filter::{ResourceFilter, SourceFilter};
use crate::input::InputLines;
use crate::prompt::ConflictPrompt;
use crate::query::{QueryArgs, QuerySpec, ReferenceTypes};
use crate::scan::expand_inputs;
use crate::sink::OutputSink;

const VALID_SEARCH_MODES: &str = "cm";
const VALID_DECODE_MODES: &str = "jsr";

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandOutcome {
    Search {
        searches: Vec<SearchOutcome>,
        generated: Vec<DecodeReport>,
    },
    Decode {
        reports: Vec<DecodeReport>,
    },
    NotImplemented {
        name: &'static str,
        description: &'static str,
    },
}

/// Collaborators shared by the command drivers.
pub struct Services<'a> {
    pub sink: Arc<dyn OutputSink>,
    pub prompt: Arc<dyn ConflictPrompt>,
    /// Interactive lines; shared with `prompt` when it reads from the console.
    pub input: Arc<InputLines>,
    pub engine: &'a dyn SearchEngine,
    /// Built on demand; resolving the decompiler may download tools.
    pub decompilers: &'a dyn Fn() -> Result<Arc<dyn DecompilerProvider>>,
}

pub fn validate_search(args: &SearchArgs) -> Result<(), UsageError> {
    if args.output.is_empty() {
        return Err(UsageError::new("Invalid output directory name"));
    }
    if args.files.is_empty() {
        return Err(UsageError::new("Please provide input files"));
    }
    if args.mode.chars().count() != 1 || !VALID_SEARCH_MODES.contains(args.mode.as_str()) {
        return Err(UsageError::new("Please enter correct search mode"));
    }
    let no_lists = [
        &args.classes,
        &args.class_names,
        &args.sources,
        &args.res_names,
        &args.numbers,
        &args.annot_types,
        &args.annot_values,
    ]
    .iter()
    .all(|list| list.is_empty());
    let advanced = if args.mode == "c" {
        &args.class_advanced
    } else {
        &args.method_advanced
    };
    if no_lists && args.ref_type.is_empty() && args.class_regex.is_empty() && advanced.is_empty() {
        return Err(UsageError::new("Please provide a search query"));
    }
    if !args.classes.is_empty() && !args.class_names.is_empty() {
        return Err(UsageError::new(
            "(--cls, --classes) cannot be used together with (--cnm, --cls-names)",
        ));
    }
    if !args.ref_type.is_empty() {
        if ReferenceTypes::parse(&args.ref_type).is_err() {
            return Err(UsageError::new("Please enter correct reference types"));
        }
        if args.references.is_empty() && args.signatures.is_empty() && args.ref_regex.is_empty() {
            return Err(UsageError::new("Please provide references [--ref, --references]"));
        }
    } else if !args.references.is_empty() || !args.signatures.is_empty() || !args.ref_regex.is_empty()
    {
        return Err(UsageError::new("Please provide reference types [--rt, --ref-type]"));
    }
    if let Some(first) = args.res_names.first() {
        if args.res_names.len() < 2 {
            let missing = if first == "R" || first.ends_with(".R") {
                "resource names"
            } else {
                "the R class as first value"
            };
            return Err(UsageError::new(format!("[--res, --res-name] Please provide {missing}")));
        }
        let malformed = args.res_names[1..]
            .iter()
            .any(|entry| entry.contains('.') || entry.split(':').count() != 2);
        if malformed {
            return Err(UsageError::new(
                "[--res, --res-name] Please enter correct resource names",
            ));
        }
    }
    if ReferenceTypes::parse(&args.print_pool).is_err() {
        return Err(UsageError::new("[--pool, --print-pool] Please enter correct pool types"));
    }
    Ok(())
}

pub fn validate_decode(args: &DecodeArgs) -> Result<(), UsageError> {
    if args.files.is_empty() {
        return Err(UsageError::new("Please provide input files"));
    }
    if args.output.is_empty() {
        return Err(UsageError::new("Invalid output directory name"));
    }
    if args.mode.is_empty() || args.mode.chars().any(|c| !VALID_DECODE_MODES.contains(c)) {
        return Err(UsageError::new("Please enter correct decode mode"));
    }
    Ok(())
}

fn query_args(args: &SearchArgs) -> QueryArgs {
    QueryArgs {
        packages: args.packages.clone(),
        classes: args.classes.clone(),
        class_names: args.class_names.clone(),
        class_regex: args.class_regex.clone(),
        ref_types: args.ref_type.clone(),
        references: args.references.clone(),
        ref_regex: args.ref_regex.clone(),
        signatures: args.signatures.clone(),
        sources: args.sources.clone(),
        numbers: args.numbers.clone(),
        resource_names: args.res_names.clone(),
        annotation_types: args.annot_types.clone(),
        annotation_values: args.annot_values.clone(),
        synthetic: args.synthetic,
    }
}

pub fn run_search(args: &SearchArgs, services: &Services<'_>) -> Result<CommandOutcome> {
    validate_search(args)?;

    let mode = if args.mode == "m" {
        SearchMode::Method
    } else {
        SearchMode::Class
    };
    let spec = QuerySpec::build(&query_args(args))?;
    let class_advanced = AdvancedQuery::parse(EntityKind::Class, &args.class_advanced)?;
    let method_advanced = AdvancedQuery::parse(EntityKind::Method, &args.method_advanced)?;
    let print_pool = ReferenceTypes::parse(&args.print_pool)?;

    let mut session = SearchSession::new(mode)
        .with_limit(args.limit)
        .with_print_pool(print_pool);
    session.init(spec, class_advanced, method_advanced)?;

    let files = expand_inputs(&args.files)?;
    let sink = services.sink.as_ref();
    let mut generator: Option<Decoder> = None;
    let mut searches = Vec::new();
    let mut generated = Vec::new();

    for file in &files {
        sink.write(&format!("File: {}", file_name(file)));
        let outcome = session.search(services.engine, file, sink)?;

        if args.gen_sources && !outcome.results.is_empty() {
            let decoder = match generator.as_mut() {
                Some(decoder) => decoder,
                None => generator.insert(source_generator(args, services)?),
            };
            decoder.set_source_filter(SourceFilter::from_results(&outcome.results));
            sink.write("Generating sources...");
            generated.push(decoder.decode(file));
        }
        searches.push(outcome);
        sink.write("");
    }

    Ok(CommandOutcome::Search {
        searches,
        generated,
    })
}

/// Flattened java + smali output for the classes a search matched.
fn source_generator(args: &SearchArgs, services: &Services<'_>) -> Result<Decoder> {
    let job = DecodeJob {
        output_root: args.output.clone().into(),
        source_filter: SourceFilter::All,
        resource_filter: ResourceFilter::all(),
        flatten: true,
        rename_classes: true,
        thread_count: config::thread_count(None),
        pause_enabled: false,
        decode_java: true,
        decode_smali: true,
        decode_res: false,
    };
    Decoder::new(
        job,
        (services.decompilers)()?,
        services.prompt.clone(),
        services.sink.clone(),
    )
}

pub fn run_decode(args: &DecodeArgs, services: &Services<'_>) -> Result<CommandOutcome> {
    validate_decode(args)?;

    let files = expand_inputs(&args.files)?;
    let job = DecodeJob {
        output_root: args.output.clone().into(),
        source_filter: SourceFilter::from_selection(&args.packages, &args.classes),
        resource_filter: ResourceFilter::from_types(&args.resources),
        flatten: args.flat,
        rename_classes: !args.disable_rename,
        thread_count: config::thread_count(args.jobs),
        pause_enabled: args.enable_pause,
        decode_java: args.mode.contains('j'),
        decode_smali: args.mode.contains('s'),
        decode_res: args.mode.contains('r'),
    };
    tracing::debug!(?job, "decode job");

    let decoder = Decoder::new(
        job,
        (services.decompilers)()?,
        services.prompt.clone(),
        services.sink.clone(),
    )?
    .with_pause_input(services.input.clone());

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        services.sink.write(&format!("File: {}", file_name(file)));
        reports.push(decoder.decode(file));
        services.sink.write("");
    }
    Ok(CommandOutcome::Decode { reports })
}

pub fn run_mapver(_args: &MapverArgs) -> CommandOutcome {
    CommandOutcome::NotImplemented {
        name: "mapver",
        description: command_description("mapver"),
    }
}

pub fn run_batch(_args: &BatchArgs) -> CommandOutcome {
    CommandOutcome::NotImplemented {
        name: "batch",
        description: command_description("batch"),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
