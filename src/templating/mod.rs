//! String templating for block attributes.
//!
//! Block attributes such as titles and content provider arguments may embed
//! Tera syntax (`{{ vars.name }}`, `{% if %}`) that is rendered against the
//! block's evaluation context right before the provider is invoked.

pub mod error;
pub mod renderer;

pub use error::TemplateError;
pub use renderer::{TemplateRenderer, VarUsage};
