//! Fixed informational pages.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("No page at {0}")]
    NotFound(String),

    #[error("Template {template} failed: {reason}")]
    Render { template: String, reason: String },
}

/// A static page route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPage {
    pub name: &'static str,
}

impl StaticPage {
    /// URL path: `/` followed by the name with `_` replaced by `-`.
    pub fn path(&self) -> String {
        format!("/{}", self.name.replace('_', "-"))
    }

    pub fn template(&self) -> String {
        format!("pages/{}.html", self.name)
    }
}

pub const STATIC_PAGES: [StaticPage; 4] = [
    StaticPage { name: "faq" },
    StaticPage { name: "acknowledgements" },
    StaticPage { name: "legal_notes" },
    StaticPage { name: "privacy" },
];

/// Page served at `path`, if any.
pub fn route(path: &str) -> Option<StaticPage> {
    STATIC_PAGES.iter().copied().find(|page| page.path() == path)
}

/// Rendering engine of the hosting site.
pub trait TemplateRenderer {
    fn render(&self, template: &str) -> Result<String, String>;
}

/// Renders the page at `path`.
pub fn render<R: TemplateRenderer + ?Sized>(renderer: &R, path: &str) -> Result<String, PageError> {
    let page = route(path).ok_or_else(|| PageError::NotFound(path.to_string()))?;
    let template = page.template();
    renderer
        .render(&template)
        .map_err(|reason| PageError::Render { template, reason })
}
