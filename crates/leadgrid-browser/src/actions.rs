use crate::error::{BrowserError, Result};

/// Something to click, located either by CSS or by visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    /// First element matching a CSS selector
    Css(String),
    /// First element of `tag` whose text contains `text`
    Text { tag: String, text: String },
}

impl ClickTarget {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn button_text(text: impl Into<String>) -> Self {
        Self::Text {
            tag: "button".to_string(),
            text: text.into(),
        }
    }
}

/// A cookie pre-seeded into a page before navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// URL the cookie is scoped to; required by CDP when the page is blank
    pub url: String,
}

/// Browser actions for automation
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Navigate to a URL and wait for the document to load
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL the page currently shows (after redirects)
    async fn current_url(&self) -> Result<String>;

    /// Serialized DOM of the page
    async fn content(&self) -> Result<String>;

    /// Click a target in the top document; `false` if nothing matched
    async fn click(&self, target: &ClickTarget) -> Result<bool>;

    /// Click a target inside any accessible embedded frame
    async fn click_in_frames(&self, target: &ClickTarget) -> Result<bool>;

    /// Submit the first form whose action contains `action_fragment`
    async fn submit_form(&self, action_fragment: &str) -> Result<bool>;

    /// Number of elements matching a selector
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Whether any element matching `selector` contains `text` (case-insensitive)
    async fn has_text(&self, selector: &str, text: &str) -> Result<bool>;

    /// Scroll a container to its bottom; `false` if it does not exist
    async fn scroll_to_bottom(&self, selector: &str) -> Result<bool>;

    /// Wait for a selector to appear
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Install cookies for subsequent navigations
    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()>;

    /// Close the page
    async fn close(&self) -> Result<()>;
}

/// One isolated browser instance.
#[async_trait::async_trait]
pub trait BrowserSession: Send + Sync {
    type Page: BrowserActions;

    /// Open a page with fingerprint, init script, and `cookies` applied
    async fn new_page(&self, cookies: &[SessionCookie]) -> Result<Self::Page>;

    /// Tear the instance down
    async fn close(self) -> Result<()>;
}

/// Creates a fresh browser session per collection attempt.
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(|s| s.to_string())
}
