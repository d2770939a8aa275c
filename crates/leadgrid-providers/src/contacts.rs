//! Contact extraction from business websites.
//!
//! Fetches a site's home page and common contact pages, then scans the HTML
//! for email addresses and social network links. Needs no API key and never
//! fails: an unreachable site just yields nothing.

use crate::common::{build_http_client, BROWSER_USER_AGENT};
use crate::enrich::{add_email, add_social_link, is_valid_url};
use crate::error::Result;
use leadgrid_core::Lead;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeMap;

/// Pages tried after the home page.
const CONTACT_PATHS: [&str; 4] = ["/contact", "/contact-us", "/about", "/about-us"];

/// Emails kept per site.
const MAX_EMAILS: usize = 5;

/// Substrings that mark tracking, placeholder, or asset addresses.
const EXCLUDED_SUBSTRINGS: [&str; 22] = [
    "sentry@",
    "webpack@",
    "noreply@",
    "no-reply@",
    "example@",
    "test@",
    "wix.com",
    "sentry.io",
    "w3.org",
    "schema.org",
    "googleapis.com",
    "google.com",
    "cloudflare.com",
    "wordpress.org",
    "gravatar.com",
    ".png",
    ".jpg",
    ".gif",
    ".svg",
    ".css",
    ".js",
    ".webp",
];

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid regex")
});

static SOCIAL: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("facebook", r#"https?://(?:www\.)?facebook\.com/[^\s"'<>]+"#),
        ("instagram", r#"https?://(?:www\.)?instagram\.com/[^\s"'<>]+"#),
        (
            "linkedin",
            r#"https?://(?:www\.)?linkedin\.com/(?:company|in)/[^\s"'<>]+"#,
        ),
        ("twitter", r#"https?://(?:www\.)?(?:twitter|x)\.com/[^\s"'<>]+"#),
        ("youtube", r#"https?://(?:www\.)?youtube\.com/[^\s"'<>]+"#),
    ]
    .into_iter()
    .map(|(network, pattern)| (network, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// Contacts found on one website.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteContacts {
    /// Cleaned addresses, most prominent first
    pub emails: Vec<String>,
    /// First link found per social network
    pub social_links: BTreeMap<String, String>,
}

impl SiteContacts {
    /// Scan HTML for contacts.
    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let emails = clean_emails(EMAIL.find_iter(html).map(|m| m.as_str()));
        let social_links = SOCIAL
            .iter()
            .filter_map(|(network, pattern)| {
                pattern
                    .find(html)
                    .map(|m| ((*network).to_string(), clean_social_url(m.as_str())))
            })
            .collect();
        Self {
            emails,
            social_links,
        }
    }

    /// Whether nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.social_links.is_empty()
    }

    /// Merge into `lead` without overwriting; `true` if it gained an email.
    pub fn apply(&self, lead: &mut Lead) -> bool {
        let mut gained_email = false;
        for email in &self.emails {
            gained_email |= add_email(lead, email);
        }
        for (network, url) in &self.social_links {
            add_social_link(lead, network, url);
        }
        gained_email
    }
}

fn clean_emails<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut clean: Vec<String> = Vec::new();
    for email in raw {
        let email = email.trim().to_lowercase();
        if clean.contains(&email)
            || EXCLUDED_SUBSTRINGS
                .iter()
                .any(|excluded| email.contains(excluded))
        {
            continue;
        }
        clean.push(email);
        if clean.len() >= MAX_EMAILS {
            break;
        }
    }
    clean
}

fn clean_social_url(url: &str) -> String {
    url.trim_end_matches(|c| matches!(c, '"' | '\'' | '/' | '>' | '#' | ')' | ';' | ','))
        .to_string()
}

/// Website contact scanner.
pub struct ContactExtractor {
    client: Client,
}

impl ContactExtractor {
    /// Create an extractor with a per-request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(timeout_secs), Some(BROWSER_USER_AGENT))?,
        })
    }

    /// Scan `website` and its contact pages.
    pub async fn extract(&self, website: &str) -> SiteContacts {
        if !is_valid_url(website) {
            return SiteContacts::default();
        }

        let mut html = match self.fetch(website).await {
            Some(body) => body,
            None => {
                tracing::debug!("Could not fetch {}", website);
                return SiteContacts::default();
            }
        };

        let base = website.trim_end_matches('/');
        for path in CONTACT_PATHS {
            if let Some(body) = self.fetch(&format!("{base}{path}")).await {
                html.push_str(&body);
            }
        }

        SiteContacts::from_html(&html)
    }

    async fn fetch(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                tracing::trace!("{} returned {}", url, response.status());
                None
            }
            Err(e) => {
                tracing::trace!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgrid_core::LeadSource;

    const PAGE: &str = r#"
        <a href="mailto:Hello@JosCoffee.com">Email us</a>
        <p>Orders: orders@joscoffee.com, hello@joscoffee.com</p>
        <img src="logo@2x.png">
        <script>sentry@sentry.io noreply@joscoffee.com</script>
        <a href="https://www.facebook.com/joscoffee/">fb</a>
        <a href='https://x.com/joscoffee'>x</a>
        <a href="https://www.linkedin.com/company/jos-coffee">in</a>
    "#;

    #[test]
    fn test_from_html_extracts_contacts() {
        let contacts = SiteContacts::from_html(PAGE);
        assert_eq!(
            contacts.emails,
            vec![
                "hello@joscoffee.com".to_string(),
                "orders@joscoffee.com".to_string()
            ]
        );
        assert_eq!(
            contacts.social_links.get("facebook").map(String::as_str),
            Some("https://www.facebook.com/joscoffee")
        );
        assert_eq!(
            contacts.social_links.get("twitter").map(String::as_str),
            Some("https://x.com/joscoffee")
        );
        assert!(contacts.social_links.contains_key("linkedin"));
        assert!(!contacts.social_links.contains_key("youtube"));
    }

    #[test]
    fn test_clean_emails_caps_count() {
        let raw: Vec<String> = (0..10).map(|i| format!("user{i}@shop.com")).collect();
        let clean = clean_emails(raw.iter().map(String::as_str));
        assert_eq!(clean.len(), MAX_EMAILS);
    }

    #[test]
    fn test_apply_keeps_existing_primary() {
        let mut lead = Lead::new("ChIJx", LeadSource::Playwright, "Jo's");
        lead.primary_email = Some("owner@joscoffee.com".to_string());

        let contacts = SiteContacts::from_html(PAGE);
        assert!(!contacts.apply(&mut lead));
        assert_eq!(lead.primary_email.as_deref(), Some("owner@joscoffee.com"));
        assert_eq!(lead.emails.len(), 2);
        assert_eq!(lead.social_links.len(), 3);
    }
}
