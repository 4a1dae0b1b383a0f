use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::advanced::{CLASS_QUERY_FORMAT, METHOD_QUERY_FORMAT};

pub const DEFAULT_OUTPUT: &str = "class-explorer-out";

/// `(name, alias, description)` of every command.
pub const COMMAND_TABLE: &[(&str, &str, &str)] = &[
    ("search", "s", "Search classes and methods"),
    ("decode", "d", "Decompile java, smali and resource files"),
    ("mapver", "m", "Map classes from one version to another"),
    ("batch", "b", "Perform multiple search at once"),
];

pub fn command_description(name: &str) -> &'static str {
    COMMAND_TABLE
        .iter()
        .find(|(n, alias, _)| *n == name || *alias == name)
        .map_or("", |(_, _, desc)| desc)
}

#[derive(Debug, Clone, Parser)]
#[command(name = "class-explorer", version)]
#[command(about = "Search and decompile classes inside jar, apk, dex and aar archives")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE")]
    pub cfr: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[arg(short = 'v', long, hide = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(visible_alias = "s", about = command_description("search"))]
    Search(SearchArgs),

    #[command(visible_alias = "d", about = command_description("decode"))]
    Decode(DecodeArgs),

    #[command(visible_alias = "m", about = command_description("mapver"))]
    Mapver(MapverArgs),

    #[command(visible_alias = "b", about = command_description("batch"))]
    Batch(BatchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Search mode: c: find class (default), m: find method
    #[arg(short = 'm', long, default_value = "c")]
    pub mode: String,

    /// Search from a list of packages only. Default: all
    #[arg(long, visible_alias = "pkg", num_args = 1..)]
    pub packages: Vec<String>,

    /// Search a list of classes only (fully qualified name)
    #[arg(long, visible_alias = "cls", num_args = 1..)]
    pub classes: Vec<String>,

    /// Search a list of classes by names (simple short name)
    #[arg(long = "cls-names", visible_alias = "cnm", num_args = 1..)]
    pub class_names: Vec<String>,

    /// Filter classes with a regex (checks against the full name)
    #[arg(long = "cls-regex", visible_alias = "clx", default_value = "")]
    pub class_regex: String,

    /// Reference types: a: all, s: string, t: type, f: field, m: method
    #[arg(long = "ref-type", visible_alias = "rt", default_value = "")]
    pub ref_type: String,

    /// References: string, type, field or method names
    #[arg(long, visible_alias = "ref", num_args = 1..)]
    pub references: Vec<String>,

    /// A regex that matches against the reference pools
    #[arg(long = "ref-regex", visible_alias = "rfx", default_value = "")]
    pub ref_regex: String,

    /// Same as --references except that it compares with signatures
    #[arg(long, visible_alias = "sig", num_args = 1..)]
    pub signatures: Vec<String>,

    /// Source names to match against (eg: 'Cache.java')
    #[arg(long, visible_alias = "src", num_args = 1..)]
    pub sources: Vec<String>,

    /// Numbers to match against (eg: 123 124.1f 121.1d)
    #[arg(long, visible_alias = "num", num_args = 1.., allow_negative_numbers = true)]
    pub numbers: Vec<String>,

    /// Resource names: 'com.app.R' 'string:res_name' 'color:..'
    #[arg(long = "res-name", visible_alias = "res", num_args = 1..)]
    pub res_names: Vec<String>,

    /// Match based on contained annotations (eg: 'java.lang.Deprecated')
    #[arg(long = "annot-type", visible_alias = "ann", num_args = 1..)]
    pub annot_types: Vec<String>,

    /// Match based on contained annotation values
    #[arg(long = "annot-value", visible_alias = "anv", num_args = 1..)]
    pub annot_values: Vec<String>,

    /// Enable synthetic items. Default: disabled
    #[arg(long)]
    pub synthetic: bool,

    /// Limit maximum results. Default: -1 (no limit)
    #[arg(short = 'l', long, default_value_t = -1, allow_negative_numbers = true)]
    pub limit: i64,

    /// Print reference pool: a: all, s: string, t: type, f: field, m: method
    #[arg(long = "print-pool", visible_alias = "pool", default_value = "")]
    pub print_pool: String,

    /// Generate java and smali source files from search results
    #[arg(long = "gen-sources", visible_alias = "gen")]
    pub gen_sources: bool,

    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT)]
    pub output: String,

    #[arg(long = "class-advanced", visible_alias = "cdv", default_value = "", help = CLASS_QUERY_FORMAT)]
    pub class_advanced: String,

    #[arg(long = "method-advanced", visible_alias = "mdv", default_value = "", help = METHOD_QUERY_FORMAT)]
    pub method_advanced: String,
}

#[derive(Debug, Clone, Args)]
pub struct DecodeArgs {
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Decode mode: j: java (default), s: smali, r: resources
    #[arg(short = 'm', long, default_value = "j")]
    pub mode: String,

    /// Decompile a list of classes. Default: all
    #[arg(long, visible_alias = "cls", num_args = 1..)]
    pub classes: Vec<String>,

    /// Decompile a list of packages. Default: all
    #[arg(long, visible_alias = "pkg", num_args = 1..)]
    pub packages: Vec<String>,

    /// Resource types: color, values, drawable etc. Default: all
    #[arg(long, visible_alias = "res", num_args = 1..)]
    pub resources: Vec<String>,

    /// The number of threads to use. Default: available cores
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Disable renaming of illegal identifiers
    #[arg(long = "disable-rename", visible_alias = "dren")]
    pub disable_rename: bool,

    /// Pause and resume with the ENTER key
    #[arg(long = "enable-pause", visible_alias = "eps")]
    pub enable_pause: bool,

    /// Write every class directly under the output directory
    #[arg(long)]
    pub flat: bool,

    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT)]
    pub output: String,
}

#[derive(Debug, Clone, Args)]
pub struct MapverArgs {
    /// Source version (file) to map from
    #[arg(short = 's', long, default_value = "")]
    pub source: String,

    /// List of classes to map
    #[arg(short = 'c', long, num_args = 1..)]
    pub classes: Vec<String>,

    /// Target versions (files) to map into
    #[arg(short = 't', long, num_args = 1..)]
    pub target: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct BatchArgs {
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Read queries from file, one per line
    #[arg(short = 'f', long, default_value = "")]
    pub file: String,

    /// Multiple queries separated by ';'
    #[arg(short = 'q', long, num_args = 1..)]
    pub queries: Vec<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
