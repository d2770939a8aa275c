use crate::actions::{BrowserActions, BrowserLauncher, BrowserSession, ClickTarget, SessionCookie};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use crate::stealth::{js_string, CHROMIUM_ARGS, STEALTH_SCRIPT};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetTimezoneOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settings applied to every launched browser.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub locale: String,
}

impl From<&leadgrid_core::BrowserConfig> for LaunchSettings {
    fn from(config: &leadgrid_core::BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            locale: config.locale.clone(),
        }
    }
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self::from(&leadgrid_core::BrowserConfig::default())
    }
}

/// Launches one Chromium process per collection attempt.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    settings: LaunchSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Session = BrowserEngine;

    async fn launch(&self) -> Result<BrowserEngine> {
        let fingerprint = FingerprintConfig::for_locale(&self.settings.locale);
        BrowserEngine::with_fingerprint(self.settings.clone(), fingerprint).await
    }
}

/// A running Chromium instance
pub struct BrowserEngine {
    browser: Browser,
    handler: JoinHandle<()>,
    fingerprint: FingerprintConfig,
    settings: LaunchSettings,
}

impl BrowserEngine {
    /// Create a new browser engine with a randomized fingerprint
    pub async fn new(settings: LaunchSettings) -> Result<Self> {
        let fingerprint = FingerprintConfig::for_locale(&settings.locale);
        Self::with_fingerprint(settings, fingerprint).await
    }

    /// Create a new browser engine with specific fingerprint
    pub async fn with_fingerprint(
        settings: LaunchSettings,
        fingerprint: FingerprintConfig,
    ) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .viewport(Viewport {
                width: fingerprint.viewport_width,
                height: fingerprint.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .request_timeout(settings.navigation_timeout)
            .args(CHROMIUM_ARGS)
            .arg(format!("--lang={}", settings.locale));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler event error: {}", e);
                }
            }
        });

        tracing::debug!(
            "Launched browser ({}x{}, headless={})",
            fingerprint.viewport_width,
            fingerprint.viewport_height,
            settings.headless
        );

        Ok(Self {
            browser,
            handler,
            fingerprint,
            settings,
        })
    }

    async fn prepare_page(&self, page: &Page, cookies: &[SessionCookie]) -> Result<()> {
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.fingerprint.user_agent.clone())
            .accept_language(self.settings.locale.clone())
            .build()
            .map_err(BrowserError::ChromiumError)?;
        page.execute(user_agent).await.map_err(chromium)?;

        page.execute(SetTimezoneOverrideParams::new(
            self.fingerprint.timezone.clone(),
        ))
        .await
        .map_err(chromium)?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(chromium)?;

        install_cookies(page, cookies).await
    }
}

#[async_trait::async_trait]
impl BrowserSession for BrowserEngine {
    type Page = EnginePage;

    async fn new_page(&self, cookies: &[SessionCookie]) -> Result<EnginePage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(chromium)?;
        self.prepare_page(&page, cookies).await?;
        Ok(EnginePage {
            page,
            navigation_timeout: self.settings.navigation_timeout,
        })
    }

    async fn close(mut self) -> Result<()> {
        let closed = self.browser.close().await.map_err(chromium);
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.map(|_| ())
    }
}

/// A single tab inside a [`BrowserEngine`]
pub struct EnginePage {
    page: Page,
    navigation_timeout: Duration,
}

impl EnginePage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| BrowserError::ScriptError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl BrowserActions for EnginePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
            Err(_) => Err(BrowserError::Timeout(format!("navigation to {url}"))),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.map_err(chromium)?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(chromium)
    }

    async fn click(&self, target: &ClickTarget) -> Result<bool> {
        self.eval(format!(
            "(() => {{ const find = {}; const el = find(document); if (!el) return false; el.click(); return true; }})()",
            finder(target)
        ))
        .await
    }

    async fn click_in_frames(&self, target: &ClickTarget) -> Result<bool> {
        self.eval(format!(
            "(() => {{ const find = {}; \
             for (const frame of document.querySelectorAll('iframe')) {{ \
               let doc = null; try {{ doc = frame.contentDocument; }} catch (e) {{ continue; }} \
               if (!doc) continue; \
               const el = find(doc); if (el) {{ el.click(); return true; }} \
             }} return false; }})()",
            finder(target)
        ))
        .await
    }

    async fn submit_form(&self, action_fragment: &str) -> Result<bool> {
        self.eval(format!(
            "(() => {{ for (const form of document.querySelectorAll('form')) {{ \
               if (form.action && form.action.includes({})) {{ form.submit(); return true; }} \
             }} return false; }})()",
            js_string(action_fragment)
        ))
        .await
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.eval(format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        ))
        .await
    }

    async fn has_text(&self, selector: &str, text: &str) -> Result<bool> {
        self.eval(format!(
            "Array.from(document.querySelectorAll({})).some(el => (el.textContent || '').toLowerCase().includes({}))",
            js_string(selector),
            js_string(&text.to_lowercase())
        ))
        .await
    }

    async fn scroll_to_bottom(&self, selector: &str) -> Result<bool> {
        self.eval(format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.scrollTop = el.scrollHeight; return true; }})()",
            js_string(selector)
        ))
        .await
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.count(selector).await? > 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "{selector} not visible after {timeout_ms}ms"
                )));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        install_cookies(&self.page, cookies).await
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await.map_err(chromium)
    }
}

async fn install_cookies(page: &Page, cookies: &[SessionCookie]) -> Result<()> {
    if cookies.is_empty() {
        return Ok(());
    }
    let params = cookies
        .iter()
        .map(|c| {
            CookieParam::builder()
                .name(c.name.clone())
                .value(c.value.clone())
                .url(c.url.clone())
                .domain(c.domain.clone())
                .path(c.path.clone())
                .build()
                .map_err(BrowserError::CookieError)
        })
        .collect::<Result<Vec<_>>>()?;
    page.execute(SetCookiesParams::new(params))
        .await
        .map_err(chromium)?;
    Ok(())
}

/// JavaScript function `doc => Element | null` locating `target`.
fn finder(target: &ClickTarget) -> String {
    match target {
        ClickTarget::Css(selector) => {
            format!("(doc) => doc.querySelector({})", js_string(selector))
        }
        ClickTarget::Text { tag, text } => format!(
            "(doc) => Array.from(doc.querySelectorAll({})).find(el => (el.innerText || el.textContent || '').includes({})) || null",
            js_string(tag),
            js_string(text)
        ),
    }
}

fn chromium(e: chromiumoxide::error::CdpError) -> BrowserError {
    BrowserError::ChromiumError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_settings_from_config() {
        let config = leadgrid_core::BrowserConfig {
            headless: false,
            navigation_timeout_secs: 12,
            locale: "de-DE".to_string(),
        };
        let settings = LaunchSettings::from(&config);
        assert!(!settings.headless);
        assert_eq!(settings.navigation_timeout, Duration::from_secs(12));
        assert_eq!(settings.locale, "de-DE");
    }

    #[test]
    fn test_css_finder_is_quoted() {
        let js = finder(&ClickTarget::css("#L2AGLb"));
        assert_eq!(js, "(doc) => doc.querySelector(\"#L2AGLb\")");
    }

    #[test]
    fn test_text_finder_matches_tag_and_text() {
        let js = finder(&ClickTarget::button_text("Alle akzeptieren"));
        assert!(js.contains("querySelectorAll(\"button\")"));
        assert!(js.contains("includes(\"Alle akzeptieren\")"));
    }
}
