//! End-to-end page scenarios driven through the public API only.

use std::sync::Arc;

use consentry_core::{ConsentryConfig, CookieStore, Document};
use consentry_protocol::{
    ConsentCategory, ConsentEvent, EventBus, HostConsentApi, InMemoryConsentApi, SourceKind,
    VisitorProfile,
};
use consentry_runtime::{FragmentAttributes, GateAction, GateState, Page, WrappedFragment};
use parking_lot::Mutex;

const BROWSER: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 Safari/605.1.15";
const COOKIE: &str = "wp_conditional_ana_banner";

struct Harness {
    page: Page,
    cookies: Arc<CookieStore>,
    events: Arc<Mutex<Vec<ConsentEvent>>>,
}

fn config() -> ConsentryConfig {
    ConsentryConfig {
        google_analytics_tag: Some("G-SCENARIO".into()),
        ..Default::default()
    }
}

fn page_with(
    zone: &str,
    cookies: Arc<CookieStore>,
    api: Option<Arc<dyn HostConsentApi>>,
    bus: Arc<EventBus>,
) -> Harness {
    visitor_page(VisitorProfile::new(zone, BROWSER), cookies, api, bus)
}

fn visitor_page(
    visitor: VisitorProfile,
    cookies: Arc<CookieStore>,
    api: Option<Arc<dyn HostConsentApi>>,
    bus: Arc<EventBus>,
) -> Harness {
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = events.clone();
    bus.subscribe(move |e| seen.lock().push(e.clone()));

    let page = Page::init(
        config(),
        Arc::new(Document::new()),
        cookies.clone(),
        visitor,
        api,
        bus,
    )
    .unwrap();
    Harness { page, cookies, events }
}

fn page(zone: &str) -> Harness {
    page_with(
        zone,
        Arc::new(CookieStore::for_host("www.example.com")),
        None,
        Arc::new(EventBus::new()),
    )
}

fn fragment(content_type: &str, inner: &str) -> WrappedFragment {
    WrappedFragment::wrap(
        &FragmentAttributes {
            content_identifier: Some(content_type.into()),
            ..Default::default()
        },
        inner,
    )
}

#[test]
fn scenario_a_outside_eu_autoloads() {
    let h = page("America/New_York");
    assert!(h.page.should_autoload_analytics());
    assert!(h.page.analytics_loaded());
    assert_eq!(h.page.document().count_id("google-analytics-js"), 1);
    // No decision stored yet, so the banner still renders.
    assert!(h.page.banner_visible());
    assert!(h.page.document().has_class("body", "cookies-accepted"));
}

#[test]
fn scenario_b_eu_defaults_to_denied() {
    let h = page("Europe/Berlin");
    assert!(!h.page.should_autoload_analytics());
    assert!(!h.page.analytics_loaded());
    assert!(h.page.banner_visible());
    assert!(h.page.document().head().is_empty());

    let gate = h.page.mount(fragment("general", "<p>embed</p>"));
    assert_eq!(gate.state(), GateState::Hidden);
}

#[test]
fn scenario_c_accept_reveals_and_loads_once() {
    let h = page("Europe/Berlin");
    let general = h.page.mount(fragment("general", "<p>hello</p>"));
    let analytics = h.page.mount(fragment("analytics", "<script>track()</script>"));

    h.page.accept_all(false);
    h.page.accept_all(false);

    let cookie = h.cookies.cookie(COOKIE).unwrap();
    assert_eq!(cookie.value, "true");
    let days = (cookie.expires.unwrap() - chrono::Utc::now()).num_days();
    assert!((1824..=1825).contains(&days));

    assert!(h.events.lock().contains(&ConsentEvent::GlobalCookiesAccepted));
    assert_eq!(general.state(), GateState::Revealed);
    assert_eq!(analytics.state(), GateState::Revealed);

    assert_eq!(h.page.document().count_id("google-analytics-js"), 1);
    assert_eq!(h.page.document().count_id("google-analytics-config"), 1);
    assert!(!h.page.banner_visible());
    assert_eq!(h.page.document().executed_scripts().len(), 1);
}

#[test]
fn scenario_d_external_api_overrides_heuristic() {
    let bus = Arc::new(EventBus::new());
    let api: Arc<dyn HostConsentApi> = Arc::new(
        InMemoryConsentApi::new()
            .with_bus(bus.clone())
            .with_decision(ConsentCategory::Statistics, false),
    );
    let cookies = Arc::new(CookieStore::for_host("example.com"));
    cookies.set(COOKIE, "true", 30);
    let h = page_with("America/New_York", cookies, Some(api), bus);

    let record = h.page.oracle().record(ConsentCategory::Statistics);
    assert_eq!(record.source, SourceKind::ExternalApi);
    assert!(!record.allowed());
    assert!(!h.page.analytics_loaded());
    assert!(h.page.document().head().is_empty());
}

#[test]
fn scenario_e_last_registration_wins() {
    let h = page("Europe/Berlin");
    let loader = h.page.loader();
    loader.register("chat", "https://old.example/chat.js", Vec::new());
    loader.register("chat", "https://new.example/chat.js", Vec::new());

    assert!(loader.load_registered("chat"));
    assert!(!loader.load_registered("chat"));
    let head = h.page.document().head();
    assert_eq!(head.len(), 1);
    assert_eq!(head[0].attribute("src"), Some("https://new.example/chat.js"));
}

#[test]
fn reveal_is_sticky_after_decline() {
    let h = page("Europe/Lisbon");
    let gate = h.page.mount(fragment("video", "<iframe src=\"https://video.example/1\"></iframe>"));
    h.page.accept_all(false);
    assert_eq!(gate.state(), GateState::Revealed);

    h.page.decline_all();
    h.page.external_consent_changed(ConsentCategory::Marketing, false);
    h.page.window_loaded();
    assert_eq!(gate.state(), GateState::Revealed);
    assert_eq!(h.cookies.get(COOKIE).as_deref(), Some("false"));
}

#[test]
fn content_type_accept_only_touches_matching_gates() {
    let h = page("Europe/Warsaw");
    let video = h.page.mount(fragment("video", "<p>video</p>"));
    let maps = h.page.mount(fragment("maps", "<p>map</p>"));

    assert_eq!(
        h.page.click(video.wrapper_id(), GateAction::AcceptContentType),
        Some(GateState::Revealed)
    );
    assert_eq!(maps.state(), GateState::Hidden);
    assert!(!h.page.analytics_loaded());
    assert!(h.events.lock().contains(&ConsentEvent::ContentTypeAccepted {
        content_type: "video".into()
    }));

    // A later page view remembers the per-type decision.
    let again = page_with(
        "Europe/Warsaw",
        h.cookies.clone(),
        None,
        Arc::new(EventBus::new()),
    );
    let video_again = again.page.mount(fragment("video", "<p>video</p>"));
    assert_eq!(video_again.state(), GateState::Revealed);
}

#[test]
fn accept_all_button_on_gate() {
    let h = page("Europe/Dublin");
    let untyped = h.page.mount(fragment("", "<p>x</p>"));
    assert_eq!(
        h.page.click(untyped.wrapper_id(), GateAction::AcceptContentType),
        Some(GateState::Revealed)
    );
    assert!(h.page.analytics_loaded());
    assert!(h.page.click("wpca-wrapper-unknown", GateAction::AcceptAll).is_none());
}

#[test]
fn external_change_reveals_matching_category() {
    let bus = Arc::new(EventBus::new());
    let api = Arc::new(InMemoryConsentApi::new().with_bus(bus.clone()));
    let h = page_with(
        "Europe/Berlin",
        Arc::new(CookieStore::for_host("example.com")),
        Some(api.clone() as Arc<dyn HostConsentApi>),
        bus,
    );
    let video = h.page.mount(fragment("video", "<p>v</p>"));
    let stats = h.page.mount(fragment("analytics", "<p>s</p>"));

    api.set_consent(ConsentCategory::Marketing, true).unwrap();
    assert_eq!(video.state(), GateState::Revealed);
    assert_eq!(stats.state(), GateState::Hidden);
    assert!(!h.page.analytics_loaded());

    api.set_consent(ConsentCategory::Statistics, true).unwrap();
    assert_eq!(stats.state(), GateState::Revealed);
    assert!(h.page.analytics_loaded());
}

#[test]
fn corrupt_fragment_stays_blocked() {
    let h = page("America/New_York");
    let mut broken = fragment("general", "");
    broken.encoded_payload = "***".into();
    let overlay = broken.overlay_id();
    let gate = h.page.mount(broken);
    assert_eq!(gate.state(), GateState::Hidden);
    assert!(h.page.document().is_visible(&overlay));
}

#[test]
fn declined_cookie_marks_body_and_hides_banner() {
    let cookies = Arc::new(CookieStore::for_host("example.com"));
    cookies.set(COOKIE, "false", 30);
    let h = page_with("America/New_York", cookies, None, Arc::new(EventBus::new()));
    assert!(!h.page.banner_visible());
    assert!(!h.page.analytics_loaded());
    assert!(h.page.document().has_class("body", "cookies-declined"));
}

#[test]
fn secondary_integration_activates_on_window_load() {
    let cookies = Arc::new(CookieStore::for_host("example.com"));
    cookies.set(COOKIE, "true", 30);
    let h = page_with("Europe/Berlin", cookies, None, Arc::new(EventBus::new()));
    assert!(h.page.analytics_loaded());

    h.page.document().define_global("vgo");
    h.page.window_loaded();
    h.page.window_loaded();
    assert_eq!(
        h.page.document().global_calls("vgo"),
        vec![vec!["process".to_string(), "allowTracking".to_string()]]
    );
}

#[test]
fn late_registration_loads_immediately_after_bundle() {
    let h = page("America/New_York");
    h.page.register_script("late", "https://late.example/l.js");
    assert_eq!(h.page.document().count_id("late-js"), 1);
    assert!(h.page.remove_script("late"));
}

#[test]
fn report_reflects_state() {
    let h = page("Europe/Berlin");
    h.page.mount(fragment("maps", "<p>m</p>"));
    let report = h.page.report();
    assert!(!report.autoload_analytics);
    assert!(report.banner_visible);
    assert_eq!(report.records.len(), 4);
    assert_eq!(report.gates.len(), 1);
    assert_eq!(report.gates[0].category, ConsentCategory::Functional);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["gates"][0]["state"], "hidden");
}

#[test]
fn content_type_accept_reaches_every_gate_of_that_type() {
    let h = page("Europe/Berlin");
    let first = h.page.mount(fragment("custom:newsletter", "<p>1</p>"));
    let second = h.page.mount(fragment("custom:newsletter", "<p>2</p>"));
    let upper = h.page.mount(fragment("Video", "<p>v</p>"));
    let lower = h.page.mount(fragment("video", "<p>v</p>"));

    h.page.click(first.wrapper_id(), GateAction::AcceptContentType);
    assert_eq!(first.state(), GateState::Revealed);
    assert_eq!(second.state(), GateState::Revealed);
    assert_eq!(upper.state(), GateState::Hidden);

    h.page.click(upper.wrapper_id(), GateAction::AcceptContentType);
    assert_eq!(upper.state(), GateState::Revealed);
    assert_eq!(lower.state(), GateState::Revealed);
}

#[test]
fn class_change_signal_rechecks_gates() {
    let h = page("Europe/Berlin");
    let gate = h.page.mount(fragment("maps", "<p>m</p>"));

    // Another script on the page stores consent without announcing it.
    h.cookies.set(COOKIE, "true", 30);
    assert_eq!(gate.state(), GateState::Hidden);

    h.page.bus().publish(ConsentEvent::HostClassChanged);
    assert_eq!(gate.state(), GateState::Revealed);
}

#[test]
fn eu_bot_is_granted_by_default() {
    let googlebot = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
    let h = visitor_page(
        VisitorProfile::new("Europe/Berlin", googlebot),
        Arc::new(CookieStore::for_host("example.com")),
        None,
        Arc::new(EventBus::new()),
    );
    assert!(h.page.should_autoload_analytics());
    assert!(h.page.analytics_loaded());
    assert_eq!(
        h.page.oracle().record(ConsentCategory::Marketing).source,
        SourceKind::Heuristic
    );
    let video = h.page.mount(fragment("video", "<p>v</p>"));
    assert_eq!(video.state(), GateState::Revealed);
}
