//! Launch flags and init script that keep the headless browser small and
//! hide the usual automation signals.

/// Chromium flags that trim memory use on small hosts.
pub const CHROMIUM_ARGS: [&str; 13] = [
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-setuid-sandbox",
    "--disable-extensions",
    "--disable-plugins",
    "--disable-background-networking",
    "--disable-default-apps",
    "--disable-sync",
    "--disable-translate",
    "--no-first-run",
    "--disable-features=site-per-process",
    "--js-flags=--max-old-space-size=256",
    "--disable-blink-features=AutomationControlled",
];

/// Evaluated in every new document before page scripts run.
pub const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3]});
Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
window.chrome = {runtime: {}};
";

/// Quote a Rust string as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(
            js_string(r#"button[aria-label="Accept all"]"#),
            r#""button[aria-label=\"Accept all\"]""#
        );
    }

    #[test]
    fn test_stealth_script_masks_webdriver() {
        assert!(STEALTH_SCRIPT.contains("navigator, 'webdriver'"));
        assert!(STEALTH_SCRIPT.contains("window.chrome"));
    }
}
