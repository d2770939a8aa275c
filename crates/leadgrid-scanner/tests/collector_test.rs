use leadgrid_browser::{
    BrowserActions, BrowserError, BrowserLauncher, BrowserSession, ClickTarget, SessionCookie,
};
use leadgrid_core::{CollectorConfig, Coordinates, IdKind};
use leadgrid_scanner::{CellRequest, Collector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type BrowserResult<T> = Result<T, BrowserError>;

fn is_detail(url: &str) -> bool {
    url.contains("/maps/place/") || url.contains("cid=")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsentMode {
    None,
    ButtonWorks,
    FramesWork,
    FormWorks,
    RenavigateWorks,
    Stuck,
}

struct Site {
    consent: ConsentMode,
    feed_html: Option<String>,
    detail_html: String,
    failing_launches: usize,
}

#[derive(Default)]
struct Trace {
    launches: AtomicUsize,
    closes: AtomicUsize,
    events: Mutex<Vec<String>>,
}

impl Trace {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, prefix: &str) -> Option<usize> {
        self.events().iter().position(|e| e.starts_with(prefix))
    }
}

struct FakeLauncher {
    site: Arc<Site>,
    trace: Arc<Trace>,
}

struct FakeSession {
    site: Arc<Site>,
    trace: Arc<Trace>,
}

struct FakePage {
    site: Arc<Site>,
    trace: Arc<Trace>,
    url: Mutex<String>,
    cookies_reseeded: Mutex<bool>,
}

#[async_trait::async_trait]
impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self) -> BrowserResult<FakeSession> {
        let n = self.trace.launches.fetch_add(1, Ordering::SeqCst);
        if n < self.site.failing_launches {
            return Err(BrowserError::ChromiumError("launch failed".to_string()));
        }
        Ok(FakeSession {
            site: Arc::clone(&self.site),
            trace: Arc::clone(&self.trace),
        })
    }
}

#[async_trait::async_trait]
impl BrowserSession for FakeSession {
    type Page = FakePage;

    async fn new_page(&self, cookies: &[SessionCookie]) -> BrowserResult<FakePage> {
        assert!(cookies.iter().any(|c| c.name == "SOCS"));
        Ok(FakePage {
            site: Arc::clone(&self.site),
            trace: Arc::clone(&self.trace),
            url: Mutex::new("about:blank".to_string()),
            cookies_reseeded: Mutex::new(false),
        })
    }

    async fn close(self) -> BrowserResult<()> {
        self.trace.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FakePage {
    fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    fn on_detail(&self) -> bool {
        is_detail(&self.url())
    }

    fn on_consent(&self) -> bool {
        self.url().contains("consent.google.")
    }

    fn clear_consent(&self) {
        *self.url.lock().unwrap() = "https://www.google.com/maps/search/cafe".to_string();
    }
}

#[async_trait::async_trait]
impl BrowserActions for FakePage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.trace.push(format!("navigate:{url}"));
        let blocked = url.contains("/maps/search/")
            && self.site.consent != ConsentMode::None
            && !(self.site.consent == ConsentMode::RenavigateWorks
                && *self.cookies_reseeded.lock().unwrap());
        *self.url.lock().unwrap() = if blocked {
            "https://consent.google.com/ml?continue=https%3A%2F%2Fwww.google.com%2Fmaps%2Fsearch%2Fcafe"
                .to_string()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.url())
    }

    async fn content(&self) -> BrowserResult<String> {
        if self.on_detail() {
            Ok(self.site.detail_html.clone())
        } else {
            Ok(self.site.feed_html.clone().unwrap_or_default())
        }
    }

    async fn click(&self, target: &ClickTarget) -> BrowserResult<bool> {
        if !self.on_consent() {
            return Ok(false);
        }
        self.trace.push("click");
        if self.site.consent == ConsentMode::ButtonWorks
            && *target == ClickTarget::button_text("Accept all")
        {
            self.clear_consent();
            return Ok(true);
        }
        Ok(false)
    }

    async fn click_in_frames(&self, _target: &ClickTarget) -> BrowserResult<bool> {
        self.trace.push("frame");
        if self.site.consent == ConsentMode::FramesWork {
            self.clear_consent();
            return Ok(true);
        }
        Ok(false)
    }

    async fn submit_form(&self, action_fragment: &str) -> BrowserResult<bool> {
        self.trace.push(format!("submit:{action_fragment}"));
        if self.site.consent == ConsentMode::FormWorks {
            self.clear_consent();
            return Ok(true);
        }
        Ok(false)
    }

    async fn count(&self, selector: &str) -> BrowserResult<usize> {
        let Some(feed) = self.site.feed_html.as_deref() else {
            return Ok(0);
        };
        if self.on_detail() {
            return Ok(usize::from(selector.contains("main")));
        }
        if selector.contains("jsaction") {
            Ok(feed.matches("jsaction=\"mouseover").count())
        } else {
            Ok(usize::from(selector.contains("feed")))
        }
    }

    async fn has_text(&self, _selector: &str, text: &str) -> BrowserResult<bool> {
        Ok(self
            .site
            .feed_html
            .as_deref()
            .is_some_and(|feed| feed.to_lowercase().contains(text)))
    }

    async fn scroll_to_bottom(&self, _selector: &str) -> BrowserResult<bool> {
        self.trace.push("scroll");
        Ok(true)
    }

    async fn wait_for_selector(&self, selector: &str, _timeout_ms: u64) -> BrowserResult<()> {
        if self.count(selector).await? > 0 {
            Ok(())
        } else {
            Err(BrowserError::Timeout(selector.to_string()))
        }
    }

    async fn set_cookies(&self, _cookies: &[SessionCookie]) -> BrowserResult<()> {
        self.trace.push("cookies");
        *self.cookies_reseeded.lock().unwrap() = true;
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        Ok(())
    }
}

fn card(name: &str, href: &str) -> String {
    format!(
        r#"<div><div class="Nv2PK" jsaction="mouseover:pane">
            <a class="hfpxzc" aria-label="{name}" href="{href}"></a>
            <span role="img" aria-label="4.5 stars 120 Reviews"></span>
        </div></div>"#
    )
}

fn feed_html() -> String {
    format!(
        r#"<html><body><div role="feed">{}{}{}</div>
           <p class="fontBodyMedium"><span>You've reached the end of results.</span></p>
           </body></html>"#,
        card(
            "Jo's Coffee",
            "https://www.google.com/maps/place/Jo's/data=!3m1!1s0x8644b5a0b9f6b5d7:0x1a2b3c4d5e6f7081!3d30.25!4d-97.75"
        ),
        card(
            "Houndstooth",
            "/maps/place/Houndstooth/data=!3m1!1s0x8644b5000000000a:0x00000000000000b1"
        ),
        card("Mystery Beans", "https://www.google.com/maps?cid=77"),
    )
}

const DETAIL_HTML: &str = r#"<html><body><div role="main">
    <button data-item-id="phone:tel:+15125550100"><div class="fontBodyMedium">(512) 555-0100</div></button>
</div></body></html>"#;

fn site(consent: ConsentMode) -> Site {
    Site {
        consent,
        feed_html: Some(feed_html()),
        detail_html: DETAIL_HTML.to_string(),
        failing_launches: 0,
    }
}

fn fast_config() -> CollectorConfig {
    CollectorConfig {
        retry_backoff_base_ms: 0,
        detail_delay_min_ms: 0,
        detail_delay_max_ms: 0,
        consent_pause_ms: 0,
        scroll_pause_ms: 0,
        ..CollectorConfig::default()
    }
}

fn collector(site: Site, config: CollectorConfig) -> (Collector<FakeLauncher>, Arc<Trace>) {
    let trace = Arc::new(Trace::default());
    let launcher = FakeLauncher {
        site: Arc::new(site),
        trace: Arc::clone(&trace),
    };
    (Collector::new(launcher, config), trace)
}

fn request(detail_limit: Option<usize>) -> CellRequest<'static> {
    CellRequest {
        keyword: "cafe",
        location: "Austin, TX",
        coordinates: Coordinates::new(30.2672, -97.7431),
        max_results: 60,
        detail_limit,
    }
}

fn detail_visits(trace: &Trace) -> usize {
    trace
        .events()
        .iter()
        .filter(|e| e.starts_with("navigate:") && is_detail(e))
        .count()
}

#[tokio::test]
async fn test_collects_listings_with_details() {
    let (collector, trace) = collector(site(ConsentMode::None), fast_config());
    let outcome = collector.collect(&request(None)).await;

    assert_eq!(outcome.attempted, 1);
    assert_eq!(outcome.leads.len(), 3);
    assert!(outcome
        .leads
        .iter()
        .all(|lead| lead.phone.as_deref() == Some("(512) 555-0100")));

    assert_eq!(outcome.leads[0].id_kind(), IdKind::FeatureId);
    assert_eq!(outcome.leads[2].id_kind(), IdKind::Synthetic);
    assert_eq!(detail_visits(&trace), 3);
    assert_eq!(trace.launches.load(Ordering::SeqCst), 1);
    assert_eq!(trace.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_detail_limit_bounds_visits() {
    let (collector, trace) = collector(site(ConsentMode::None), fast_config());
    let outcome = collector.collect(&request(Some(1))).await;
    assert_eq!(outcome.leads.len(), 3);
    assert_eq!(detail_visits(&trace), 1);
    assert!(outcome.leads[1].phone.is_none());

    let (collector, trace) = collector_without_details();
    let outcome = collector.collect(&request(None)).await;
    assert_eq!(outcome.leads.len(), 3);
    assert_eq!(detail_visits(&trace), 0);
}

fn collector_without_details() -> (Collector<FakeLauncher>, Arc<Trace>) {
    collector(
        site(ConsentMode::None),
        CollectorConfig {
            scrape_details: false,
            ..fast_config()
        },
    )
}

#[tokio::test]
async fn test_consent_button_clears_interstitial() {
    let (collector, trace) = collector(site(ConsentMode::ButtonWorks), fast_config());
    let outcome = collector.collect(&request(Some(0))).await;
    assert_eq!(outcome.leads.len(), 3);
    assert!(trace.position("click").is_some());
    assert!(trace.position("frame").is_none());
}

#[tokio::test]
async fn test_consent_chain_runs_in_order() {
    let (collector, trace) = collector(site(ConsentMode::FormWorks), fast_config());
    let outcome = collector.collect(&request(Some(0))).await;
    assert_eq!(outcome.leads.len(), 3);

    let click = trace.position("click").expect("button step");
    let frame = trace.position("frame").expect("frame step");
    let submit = trace.position("submit:consent").expect("form step");
    assert!(click < frame && frame < submit);
    assert!(trace.position("cookies").is_none());

    let (collector, trace) = collector_for(ConsentMode::FramesWork);
    assert_eq!(collector.collect(&request(Some(0))).await.leads.len(), 3);
    assert!(trace.position("submit").is_none());
}

fn collector_for(mode: ConsentMode) -> (Collector<FakeLauncher>, Arc<Trace>) {
    collector(site(mode), fast_config())
}

#[tokio::test]
async fn test_consent_renavigation_with_reseeded_cookies() {
    let (collector, trace) = collector_for(ConsentMode::RenavigateWorks);
    let outcome = collector.collect(&request(Some(0))).await;
    assert_eq!(outcome.leads.len(), 3);

    let submit = trace.position("submit").expect("form step");
    let cookies = trace.position("cookies").expect("cookie step");
    assert!(submit < cookies);
    assert!(trace
        .events()
        .iter()
        .any(|e| e == "navigate:https://www.google.com/maps/search/cafe"));
}

#[tokio::test]
async fn test_stuck_interstitial_exhausts_retries() {
    let (collector, trace) = collector_for(ConsentMode::Stuck);
    let outcome = collector.collect(&request(None)).await;

    assert!(outcome.leads.is_empty());
    assert_eq!(outcome.attempted, 1);
    assert_eq!(trace.launches.load(Ordering::SeqCst), 3);
    assert_eq!(trace.closes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_launch_failures_are_retried() {
    let mut flaky = site(ConsentMode::None);
    flaky.failing_launches = 2;
    let (collector, trace) = collector(flaky, fast_config());

    let outcome = collector.collect(&request(Some(0))).await;
    assert_eq!(outcome.leads.len(), 3);
    assert_eq!(trace.launches.load(Ordering::SeqCst), 3);
    assert_eq!(trace.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_feed_is_empty_without_retry() {
    let mut empty = site(ConsentMode::None);
    empty.feed_html = None;
    let (collector, trace) = collector(empty, fast_config());

    let outcome = collector.collect(&request(None)).await;
    assert!(outcome.leads.is_empty());
    assert_eq!(trace.launches.load(Ordering::SeqCst), 1);
    assert_eq!(trace.closes.load(Ordering::SeqCst), 1);
}
