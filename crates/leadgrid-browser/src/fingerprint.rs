//! Per-session browser identity.
//!
//! Every cell opens a fresh session, so each one draws its own user agent
//! and window size. The timezone follows the configured locale's region so
//! the reported clock agrees with the `Accept-Language` header.

use rand::seq::SliceRandom;

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
];

// Wide enough for the results feed and the detail pane side by side.
const VIEWPORTS: [(u32, u32); 4] = [(1280, 900), (1366, 768), (1440, 900), (1536, 864)];

const US_TIMEZONES: [&str; 4] = [
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
];

/// Identity presented by one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timezone: String,
}

impl FingerprintConfig {
    /// Random identity whose timezone matches the region of `locale`.
    #[must_use]
    pub fn for_locale(locale: &str) -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0]);
        let (width, height) = *VIEWPORTS.choose(&mut rng).unwrap_or(&VIEWPORTS[0]);

        let timezone = match region(locale).as_deref() {
            Some("US") | None => US_TIMEZONES
                .choose(&mut rng)
                .copied()
                .unwrap_or(US_TIMEZONES[0]),
            Some("GB") => "Europe/London",
            Some("DE" | "AT") => "Europe/Berlin",
            Some("FR") => "Europe/Paris",
            Some("CA") => "America/Toronto",
            Some("AU") => "Australia/Sydney",
            Some(_) => "UTC",
        };

        Self {
            user_agent: (*user_agent).to_string(),
            viewport_width: width,
            viewport_height: height,
            timezone: timezone.to_string(),
        }
    }
}

/// Region subtag of a BCP 47 tag, e.g. `GB` for `en-GB`.
fn region(locale: &str) -> Option<String> {
    locale
        .split(['-', '_'])
        .nth(1)
        .filter(|r| r.len() == 2)
        .map(str::to_ascii_uppercase)
}
