//! # class-explorer
//!
//! Search and decompile classes inside compiled application archives.
//!
//! ## Architecture
//!
//! - **literal**: numeric literal parsing with exact bit patterns
//! - **advanced**: the `key:value+value,...` advanced-query language
//! - **query**: normalized search queries built from command-line flags
//! - **filter**: compiled search filters and decode eligibility predicates
//! - **engine**: search engine seam, search sessions and a name-only engine
//! - **catalog**: archive entry listing
//! - **cfr**: CFR and javap invocation
//! - **decompiler**: decompiler seam and the CFR-backed implementation
//! - **output**: collision-free output paths
//! - **pool**: worker pool with cooperative pause
//! - **decoder**: per-archive decode orchestration and failure log
//! - **sink**: user-facing output lines
//! - **input**: line input shared by the prompt and the pause monitor
//! - **prompt**: output-directory conflict prompt
//! - **scan**: input expansion into archive files
//! - **commands**: command drivers

pub mod advanced;
pub mod catalog;
pub mod cfr;
pub mod cli;
pub mod commands;
pub mod config;
pub mod decoder;
pub mod decompiler;
pub mod engine;
pub mod error;
pub mod filter;
pub mod input;
pub mod literal;
pub mod output;
pub mod pool;
pub mod prompt;
pub mod query;
pub mod scan;
pub mod sink;
