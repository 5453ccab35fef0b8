//! Template and macro rendering for content items.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::cache::{DocumentCache, PublishedContent};
use crate::domain::{ContentId, UNASSIGNED_ID};
use crate::refresher::panic_message;

use super::error::RenderError;
use super::params::{MacroParams, normalize};

/// Renders a content item's page template.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Render `content_id` with its own template, or `alt_template_id` when given.
    async fn render(
        &self,
        content_id: ContentId,
        alt_template_id: Option<i32>,
    ) -> Result<String, RenderError>;
}

/// Renders a named macro against a resolved content item.
pub trait MacroRenderer: Send + Sync {
    fn render(
        &self,
        alias: &str,
        content: &PublishedContent,
        params: &MacroParams,
    ) -> Result<String, RenderError>;
}

/// Published content lookup used to resolve macro targets.
pub trait PublishedContentQuery: Send + Sync {
    fn by_id(&self, id: ContentId) -> Option<Arc<PublishedContent>>;
}

impl PublishedContentQuery for DocumentCache {
    fn by_id(&self, id: ContentId) -> Option<Arc<PublishedContent>> {
        self.get(id)
    }
}

pub struct ComponentRenderer {
    templates: Arc<dyn TemplateRenderer>,
    macros: Arc<dyn MacroRenderer>,
    content: Arc<dyn PublishedContentQuery>,
}

impl ComponentRenderer {
    pub fn new(
        templates: Arc<dyn TemplateRenderer>,
        macros: Arc<dyn MacroRenderer>,
        content: Arc<dyn PublishedContentQuery>,
    ) -> Self {
        Self {
            templates,
            macros,
            content,
        }
    }

    /// Render a page template. Failures, panics included, are written into
    /// the output as an HTML comment instead of being returned.
    #[instrument(skip(self))]
    pub async fn render_template(
        &self,
        content_id: ContentId,
        alt_template_id: Option<i32>,
    ) -> String {
        let outcome = AssertUnwindSafe(self.templates.render(content_id, alt_template_id))
            .catch_unwind()
            .await;
        let err = match outcome {
            Ok(Ok(html)) => return html,
            Ok(Err(err)) => err,
            Err(panic) => RenderError::engine(panic_message(panic.as_ref())),
        };

        warn!(content_id, error = %err, "Template render failed");
        format!("<!-- Error rendering template with id {content_id}: '{err}' -->")
    }

    #[instrument(skip(self, params))]
    pub fn render_macro<I>(
        &self,
        content_id: ContentId,
        alias: &str,
        params: I,
    ) -> Result<String, RenderError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if content_id == UNASSIGNED_ID {
            return Err(RenderError::InvalidArgument { id: content_id });
        }

        let content = self.content.by_id(content_id).ok_or_else(|| {
            RenderError::not_found(format!("no content found by id {content_id}"))
        })?;

        self.render_resolved(&content, alias, params)
    }

    pub fn render_macro_for_content<I>(
        &self,
        content: Option<&PublishedContent>,
        alias: &str,
        params: I,
    ) -> Result<String, RenderError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let content = content.ok_or_else(|| RenderError::not_found("content is absent"))?;
        self.render_resolved(content, alias, params)
    }

    fn render_resolved<I>(
        &self,
        content: &PublishedContent,
        alias: &str,
        params: I,
    ) -> Result<String, RenderError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let params = normalize(params);
        self.macros.render(alias, content, &params)
    }
}
