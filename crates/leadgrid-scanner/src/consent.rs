//! Consent and interstitial handling.
//!
//! The browser is pre-seeded with consent cookies, but the consent wall still
//! shows up for some regions and fresh profiles. [`dismiss_consent`] walks an
//! ordered fallback chain and reports which step cleared the page.

use crate::error::Result;
use leadgrid_browser::{BrowserActions, ClickTarget, SessionCookie};
use std::time::Duration;
use url::Url;

const CONSENT_COOKIE: &str = "YES+cb.20210720-07-p0.en+FX+410";
const SOCS_COOKIE: &str = "CAISHAgBEhJnd3NfMjAyMzA4MTAtMF9SQzIaAmVuIAEaBgiAo_CmBg";

/// Button labels tried on the consent wall, English first.
const CONSENT_LABELS: [&str; 4] = ["Accept all", "Reject all", "Alle akzeptieren", "Alle ablehnen"];

/// Known element selectors for consent controls.
const CONSENT_SELECTORS: [&str; 5] = [
    "[aria-label=\"Accept all\"]",
    "[aria-label=\"Reject all\"]",
    "#L2AGLb",
    ".VfPpkd-LgbsSe",
    "form[action*=\"consent\"] button",
];

/// Labels of in-page overlays shown on top of an otherwise normal page.
const OVERLAY_LABELS: [&str; 4] = ["Accept all", "I agree", "Agree", "Accept"];

/// Which step of the fallback chain cleared the interstitial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// The page was never an interstitial
    NotPresent,
    /// A consent button in the top document worked
    ButtonClicked,
    /// A consent button inside an embedded frame worked
    FrameClicked,
    /// Submitting the consent form worked
    FormSubmitted,
    /// Re-seeding cookies and re-navigating worked
    Renavigated,
    /// Still on an interstitial or block page
    Stuck,
}

impl ConsentOutcome {
    /// Whether the page is usable after the chain ran.
    #[must_use]
    pub const fn is_cleared(self) -> bool {
        !matches!(self, Self::Stuck)
    }
}

/// Cookies that pre-accept the consent wall on `.google.com`.
#[must_use]
pub fn consent_cookies() -> Vec<SessionCookie> {
    [("CONSENT", CONSENT_COOKIE), ("SOCS", SOCS_COOKIE)]
        .into_iter()
        .map(|(name, value)| SessionCookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: ".google.com".to_string(),
            path: "/".to_string(),
            url: "https://www.google.com/".to_string(),
        })
        .collect()
}

/// Whether `url` is the consent wall.
#[must_use]
pub fn is_consent_url(url: &str) -> bool {
    url.contains("consent.google.")
}

/// Whether `url` is any page that blocks the search (consent or rate-limit).
#[must_use]
pub fn is_blocked_url(url: &str) -> bool {
    is_consent_url(url) || url.contains("/sorry/")
}

/// Click targets for the consent wall, in the order they are tried.
#[must_use]
pub fn consent_targets() -> Vec<ClickTarget> {
    CONSENT_LABELS
        .iter()
        .map(|label| ClickTarget::button_text(*label))
        .chain(CONSENT_SELECTORS.iter().map(|sel| ClickTarget::css(*sel)))
        .collect()
}

/// Original destination carried in the consent page's `continue=` parameter.
#[must_use]
pub fn continue_target(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "continue")
        .map(|(_, value)| value.into_owned())
        .filter(|value| value.starts_with("http"))
}

/// Run the consent fallback chain on `page`.
///
/// Steps, in order: a direct button click, the same click inside embedded
/// frames, a programmatic submit of the consent form, and finally re-seeding
/// the consent cookies and re-navigating to the original destination.
/// Click and submit failures are not errors; only the final navigation can
/// fail the attempt.
pub async fn dismiss_consent<P: BrowserActions>(
    page: &P,
    search_url: &str,
    pause: Duration,
) -> Result<ConsentOutcome> {
    let initial_url = page.current_url().await?;
    if !is_blocked_url(&initial_url) {
        return Ok(ConsentOutcome::NotPresent);
    }
    tracing::debug!("Interstitial detected at {}", initial_url);

    let targets = consent_targets();

    for target in &targets {
        if page.click(target).await.unwrap_or(false) {
            tracing::debug!("Clicked consent control {:?}", target);
            tokio::time::sleep(pause).await;
            if !is_blocked_url(&page.current_url().await?) {
                return Ok(ConsentOutcome::ButtonClicked);
            }
            break;
        }
    }

    for target in &targets {
        if page.click_in_frames(target).await.unwrap_or(false) {
            tracing::debug!("Clicked consent control {:?} inside frame", target);
            tokio::time::sleep(pause).await;
            if !is_blocked_url(&page.current_url().await?) {
                return Ok(ConsentOutcome::FrameClicked);
            }
            break;
        }
    }

    if page.submit_form("consent").await.unwrap_or(false) {
        tracing::debug!("Submitted consent form");
        tokio::time::sleep(pause).await;
        if !is_blocked_url(&page.current_url().await?) {
            return Ok(ConsentOutcome::FormSubmitted);
        }
    }

    let destination =
        continue_target(&initial_url).unwrap_or_else(|| search_url.to_string());
    page.set_cookies(&consent_cookies()).await?;
    page.navigate(&destination).await?;
    tokio::time::sleep(pause).await;

    let final_url = page.current_url().await?;
    if is_blocked_url(&final_url) {
        tracing::warn!("Consent chain exhausted, still at {}", final_url);
        Ok(ConsentOutcome::Stuck)
    } else {
        Ok(ConsentOutcome::Renavigated)
    }
}

/// Best-effort dismissal of an overlay on a normal page.
pub async fn dismiss_overlay<P: BrowserActions>(page: &P) -> bool {
    for label in OVERLAY_LABELS {
        if page
            .click(&ClickTarget::button_text(label))
            .await
            .unwrap_or(false)
        {
            tracing::debug!("Dismissed in-page overlay via '{}'", label);
            return true;
        }
    }
    false
}
