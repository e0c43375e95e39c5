//! Block definitions and the definition file loader.
//!
//! - [`BlockDefinition`] - one immutable parsed block with its children
//! - [`BlockKey`] / [`BlockKind`] - registry keys such as `content.text.intro`
//! - [`Expr`] / [`VarDecl`] - unevaluated attribute values and ordered variable declarations
//! - [`loader`] - reads YAML/JSON definition files into block trees

pub mod definition;
pub mod expr;
pub mod key;
pub mod loader;

pub use definition::{BlockDefinition, ConfigSource, LOCAL_VAR_NAME, Meta};
pub use expr::{Expr, QUERY_KEY, VarDecl, VarDecls};
pub use key::{BlockKey, BlockKind, REF_TYPE};
pub use loader::{ParseOutput, ParsedFile, SourceFormat, load_sources, parse_source};
