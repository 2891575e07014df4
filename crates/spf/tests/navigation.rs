//! Integration tests for the full click/request/process navigation
//! pipeline, exercising the scenarios named in spec.md §8 end to end
//! against the in-memory `RecordingDom`/`FakeHistory`/`FakeTransport`
//! doubles rather than a real browser.

use std::rc::Rc;

use spf::context::NavContext;
use spf::dom::{Dom, RecordingDom};
use spf::history::{FakeHistory, HistoryBackend};
use spf::navigation::{ClickContext, NavigateOptions};
use spf::transport::{FakeTransport, Transport};
use spf::SpfConfig;

fn harness() -> (NavContext, Rc<RecordingDom>, Rc<FakeTransport>, Rc<FakeHistory>) {
    let dom = Rc::new(RecordingDom::with_elements(["main"]));
    dom.set_location("https://example.com/");
    let history = Rc::new(FakeHistory::new());
    let transport = Rc::new(FakeTransport::new());
    let context = NavContext::new(
        SpfConfig::default(),
        dom.clone() as Rc<dyn Dom>,
        history.clone() as Rc<dyn HistoryBackend>,
        transport.clone() as Rc<dyn Transport>,
    );
    (context, dom, transport, history)
}

#[tokio::test]
async fn navigate_applies_a_single_response_and_updates_history() {
    let (context, dom, transport, history) = harness();
    transport.script(
        "https://example.com/a?spf=navigate",
        vec![br#"{"title":"A","body":{"main":"<p>a</p>"}}"#.to_vec()],
    );

    context.navigate("https://example.com/a".to_owned(), NavigateOptions::default()).await;

    assert_eq!(dom.title(), "A");
    assert_eq!(dom.inner_html("main").as_deref(), Some("<p>a</p>"));
    assert_eq!(history.entries().len(), 1);
    let event_names: Vec<String> = dom.dispatched_events().into_iter().map(|(name, _)| name).collect();
    assert!(event_names.contains(&"spfdone".to_owned()));
}

#[tokio::test]
async fn a_prefetch_promoted_to_navigation_issues_exactly_one_request() {
    let (context, dom, transport, _history) = harness();
    transport.script("https://example.com/a?spf=prefetch", vec![br#"{"title":"A"}"#.to_vec()]);

    let prefetch = context.prefetch("https://example.com/a".to_owned());
    let navigate = context.navigate("https://example.com/a".to_owned(), NavigateOptions::default());
    let (_, ()) = tokio::join!(prefetch, navigate);

    assert_eq!(dom.title(), "A");
    let sent = transport.sent_requests();
    assert_eq!(sent.iter().filter(|r| r.url.contains("spf=prefetch")).count(), 1);
    assert_eq!(sent.iter().filter(|r| r.url.contains("spf=navigate")).count(), 0);
}

#[tokio::test]
async fn a_multipart_response_applies_every_part_in_order() {
    let (context, dom, transport, _history) = harness();
    transport.script_multipart(
        "https://example.com/a?spf=navigate",
        vec![b"[\r\n{\"title\":\"T1\"},\r\n{\"title\":\"T2\"}]\r\n".to_vec()],
    );

    context.navigate("https://example.com/a".to_owned(), NavigateOptions::default()).await;

    assert_eq!(dom.title(), "T2");
    let event_names: Vec<String> = dom.dispatched_events().into_iter().map(|(name, _)| name).collect();
    assert_eq!(event_names.iter().filter(|name| *name == "spfpartdone").count(), 2);
    assert!(!event_names.contains(&"spfprocess".to_owned()), "spfprocess is only dispatched for non-multipart responses");
}

#[tokio::test]
async fn a_redirect_response_is_followed_without_applying_other_fields() {
    let (context, dom, transport, history) = harness();
    transport.script(
        "https://example.com/a?spf=navigate",
        vec![br#"{"redirect":"https://example.com/b","title":"Should not apply"}"#.to_vec()],
    );
    transport.script("https://example.com/b?spf=navigate", vec![br#"{"title":"B"}"#.to_vec()]);

    context.navigate("https://example.com/a".to_owned(), NavigateOptions::default()).await;

    assert_eq!(dom.title(), "B", "the redirect target's response wins, not the redirecting response's own fields");
    assert!(history.entries().iter().any(|entry| matches!(
        entry,
        spf::history::FakeEntry::Replace { url: Some(url), .. } if url == "https://example.com/b"
    )));
}

#[tokio::test]
async fn navigate_limit_of_zero_reloads_instead_of_navigating() {
    let mut config = SpfConfig::default();
    config.navigate_limit = Some(0);
    let dom = Rc::new(RecordingDom::with_elements(["main"]));
    dom.set_location("https://example.com/");
    let transport = Rc::new(FakeTransport::new());
    transport.script("https://example.com/a?spf=navigate", vec![br#"{"title":"A"}"#.to_vec()]);
    let context = NavContext::new(
        config,
        dom.clone() as Rc<dyn Dom>,
        Rc::new(FakeHistory::new()) as Rc<dyn HistoryBackend>,
        transport.clone() as Rc<dyn Transport>,
    );

    context.navigate("https://example.com/a".to_owned(), NavigateOptions::default()).await;

    assert!(transport.sent_requests().is_empty(), "an ineligible navigation must not issue a request");
    assert!(dom.reloads().iter().any(|(url, _)| url.contains("spf-reload-reason=1")));
}

#[tokio::test]
async fn click_with_a_modifier_key_is_ignored() {
    let (context, dom, transport, _history) = harness();
    let (prevented, future) = context.handle_click(&ClickContext {
        href: "https://example.com/a".to_owned(),
        has_modifier_key: true,
        is_primary_button: true,
        has_link_class: true,
        has_nolink_class: false,
    });
    assert!(!prevented);
    assert!(future.is_none());
    assert!(transport.sent_requests().is_empty());
    let _ = dom;
}
