use leadgrid_browser::{
    BrowserActions, BrowserLauncher, BrowserSession, ChromiumLauncher, ClickTarget, LaunchSettings,
    SessionCookie,
};

fn example_cookie() -> SessionCookie {
    SessionCookie {
        name: "probe".to_string(),
        value: "1".to_string(),
        domain: "example.com".to_string(),
        path: "/".to_string(),
        url: "https://example.com/".to_string(),
    }
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_launch_and_close() {
    let launcher = ChromiumLauncher::new(LaunchSettings::default());
    let session = launcher.launch().await.expect("launch browser");
    session.close().await.expect("close browser");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_navigation_and_dom_queries() {
    let launcher = ChromiumLauncher::new(LaunchSettings::default());
    let session = launcher.launch().await.expect("launch browser");
    let page = session
        .new_page(&[example_cookie()])
        .await
        .expect("open page");

    page.navigate("https://example.com").await.expect("navigate");
    assert!(page
        .current_url()
        .await
        .expect("url")
        .starts_with("https://example.com"));
    assert!(page.count("h1").await.expect("count") >= 1);
    assert!(page.has_text("h1", "example domain").await.expect("text"));
    assert!(!page
        .click(&ClickTarget::css("#definitely-missing"))
        .await
        .expect("click"));

    page.close().await.expect("close page");
    session.close().await.expect("close browser");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_webdriver_flag_is_hidden() {
    let launcher = ChromiumLauncher::new(LaunchSettings::default());
    let session = launcher.launch().await.expect("launch browser");
    let page = session.new_page(&[]).await.expect("open page");
    page.navigate("https://example.com").await.expect("navigate");

    let html = page.content().await.expect("content");
    assert!(html.contains("Example Domain"));

    session.close().await.expect("close browser");
}
