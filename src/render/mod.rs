//! Component rendering glue between content and the template/macro engines.

mod component;
mod error;
mod params;

pub use component::{ComponentRenderer, MacroRenderer, PublishedContentQuery, TemplateRenderer};
pub use error::RenderError;
pub use params::{MacroParams, decode_entities, normalize};
