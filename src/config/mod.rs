//! Configuration management for docweave
//!
//! Runs are configured by an optional `docweave.toml`:
//!
//! ```toml
//! [render]
//! required_tags = ["public"]   # tag gate; empty renders everything
//!
//! [templating]
//! enabled = true               # false passes templates through verbatim
//!
//! [env]
//! prefix = "DOCWEAVE_"         # only these variables appear under `.env`
//!
//! [limits]
//! max_depth = 64               # nesting and ref recursion limit
//! max_dynamic_items = 10000    # iterations per dynamic block
//! ```
//!
//! # Location
//!
//! The file is looked up in this order:
//! 1. `--config <PATH>` on the command line
//! 2. the `DOCWEAVE_CONFIG` environment variable
//! 3. `./docweave.toml`, if it exists
//!
//! When none applies, [`EngineConfig::default`] is used. Unknown keys are rejected
//! so that typos do not silently fall back to defaults.

mod engine;

pub use engine::{
    CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, EngineConfig, EnvSettings, Limits, RenderSettings,
    TemplatingSettings,
};
