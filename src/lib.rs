//! docweave - block evaluation engine for declarative documents
//!
//! Documents are described as trees of *blocks* in YAML or JSON definition files.
//! docweave resolves those trees into rendered markdown: it follows `ref` blocks
//! to their bases, resolves lazily evaluated variables, expands loops, filters
//! by inclusion expressions and tags, and calls content providers and data
//! sources to produce output.
//!
//! # Architecture Overview
//!
//! A run goes through these stages:
//! 1. [`blocks::load_sources`] parses definition files into immutable block trees
//! 2. [`registry::BlockRegistry`] indexes every named block once; refs and
//!    `depends_on` targets are looked up lazily, so forward references just work
//!    and only cycles that are actually reached are reported
//! 3. [`engine::Engine`] walks the target document depth first. For each block the
//!    [`scope`] resolver builds its variable frame, the [`filter`] decides whether
//!    it is included, [`dynamic`] expands loops, and [`providers`] render content
//!    or fetch data
//! 4. The result is a [`render::RenderedNode`] tree plus [`core::Diagnostics`]
//!
//! Block-scoped problems never abort a run: they are collected as diagnostics and
//! evaluation continues with the next sibling.
//!
//! # Block Format
//!
//! ```yaml
//! blocks:
//!   - kind: document
//!     name: report
//!     title: "Report for {{ vars.customer }}"
//!     vars:
//!       customer: ACME
//!       regions: { query_jq: ".data.inline.regions.list" }
//!     blocks:
//!       - kind: data
//!         type: inline
//!         name: regions
//!         list: [emea, apac]
//!       - kind: dynamic
//!         items: { query_jq: ".vars.regions" }
//!         blocks:
//!           - kind: section
//!             title: "{{ vars.dynamic_item }}"
//!             blocks:
//!               - kind: content
//!                 type: text
//!                 value: "Numbers for {{ vars.dynamic_item }}"
//! ```
//!
//! # Core Modules
//!
//! - [`blocks`] - block definitions, keys, expressions and the file loader
//! - [`registry`] - named block index, `ref` chain resolution, cycle detection
//! - [`scope`] - lazy `let*` variable frames and the ref merge rule
//! - [`query`] - the query collaborator and the bundled jq subset
//! - [`templating`] - Tera rendering of text attributes
//! - [`filter`] - `is_included` truthiness and the required tag gate
//! - [`dynamic`] - loop and conditional expansion
//! - [`providers`] - content providers and data sources
//! - [`engine`] - render and fetch runs
//! - [`render`] - the rendered output tree
//! - [`config`] - `docweave.toml`
//! - [`core`] - errors and diagnostics
//! - [`cli`] - the `docweave` command line

pub mod blocks;
pub mod cli;
pub mod config;
pub mod core;
pub mod dynamic;
pub mod engine;
pub mod filter;
pub mod providers;
pub mod query;
pub mod registry;
pub mod render;
pub mod scope;
pub mod templating;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
