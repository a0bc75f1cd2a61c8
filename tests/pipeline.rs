use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use concert_tracker::artists::{ArtistListError, ArtistListSource};
use concert_tracker::db::{keys, Store};
use concert_tracker::models::{Event, RunStatus, Source};
use concert_tracker::notify::{NoopNotifier, Notifier, NotifyError};
use concert_tracker::pipeline::{Pipeline, PipelineError};
use concert_tracker::scraping::{Connector, ConnectorError};

const LIST_URL: &str = "https://raw.githubusercontent.com/someone/lists/main/artists.txt";

struct FixedVenue {
    source: Source,
    events: Vec<Event>,
}

#[async_trait]
impl Connector for FixedVenue {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        Ok(self.events.clone())
    }
}

struct DownVenue(Source);

#[async_trait]
impl Connector for DownVenue {
    fn source(&self) -> Source {
        self.0
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        Err(ConnectorError::Http("connection reset by peer".to_string()))
    }
}

struct PanickingVenue(Source);

#[async_trait]
impl Connector for PanickingVenue {
    fn source(&self) -> Source {
        self.0
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        panic!("layout changed");
    }
}

/// Blocks inside the fetch until released.
struct GatedVenue {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Connector for GatedVenue {
    fn source(&self) -> Source {
        Source::Melkweg
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

struct ListOk(&'static str);

#[async_trait]
impl ArtistListSource for ListOk {
    async fn download(&self, _url: &str) -> Result<String, ArtistListError> {
        Ok(self.0.to_string())
    }
}

struct ListDown;

#[async_trait]
impl ArtistListSource for ListDown {
    async fn download(&self, _url: &str) -> Result<String, ArtistListError> {
        Err(ArtistListError::Fetch("404 Not Found".to_string()))
    }
}

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<String>>,
    fail_when_contains: Option<&'static str>,
}

impl Recorder {
    fn failing_on(needle: &'static str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_when_contains: Some(needle),
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if let Some(needle) = self.fail_when_contains {
            if text.contains(needle) {
                return Err(NotifyError::Delivery("chat not found".to_string()));
            }
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn event(source: Source, title: &str, venue: &str, date: &str, url: &str) -> Event {
    Event::new(source, title, venue, "", date, url)
}

fn filler(source: Source, count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            event(
                source,
                &format!("Unrelated Night {i}"),
                source.display_name(),
                "2026-05-01",
                &format!("https://example.org/{}/{i}", source.id()),
            )
        })
        .collect()
}

fn burna_at_paradiso() -> Event {
    event(
        Source::Paradiso,
        "BURNA BOY - Love, Damini Tour",
        "Paradiso",
        "2026-03-01",
        "https://www.paradiso.nl/en/program/burna-boy/101",
    )
}

fn configured_store(cached: Option<&str>) -> Arc<Store> {
    let store = Store::open_in_memory().expect("store");
    store.set_setting(keys::ARTISTS_LIST_URL, LIST_URL).unwrap();
    if let Some(cached) = cached {
        store.set_setting(keys::ARTISTS_LIST_CACHED, cached).unwrap();
    }
    Arc::new(store)
}

fn pipeline(
    store: &Arc<Store>,
    connectors: Vec<Arc<dyn Connector>>,
    list: impl ArtistListSource + 'static,
) -> Pipeline {
    Pipeline::with_artist_source(Arc::clone(store), connectors, Arc::new(list))
}

fn single_venue(events: Vec<Event>) -> Vec<Arc<dyn Connector>> {
    vec![Arc::new(FixedVenue {
        source: Source::Paradiso,
        events,
    })]
}

#[tokio::test]
async fn one_match_sends_one_notification_and_records_history() {
    let store = configured_store(None);
    let mut events = filler(Source::Paradiso, 3);
    events.push(burna_at_paradiso());
    let pipeline = pipeline(&store, single_venue(events), ListOk("Burna Boy\nTems\n"));
    let notifier = Recorder::default();

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.events_scanned_total, 4);
    assert_eq!(report.matches_total, 1);
    assert_eq!(report.notifications_sent, 1);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("🎵 Match found: **Burna Boy**"));
    assert!(sent[0].contains("**Source:** paradiso"));
    assert!(store.history_exists("Burna Boy", "Paradiso", "2026-03-01").unwrap());
    assert_eq!(
        store.get_setting(keys::ARTISTS_LIST_CACHED).unwrap().as_deref(),
        Some("Burna Boy\nTems")
    );
}

#[tokio::test]
async fn repeated_run_sends_nothing_new() {
    let store = configured_store(None);
    let pipeline = pipeline(&store, single_venue(vec![burna_at_paradiso()]), ListOk("Burna Boy"));
    let notifier = Recorder::default();

    pipeline.run(&notifier, false).await.expect("first run");
    let second = pipeline.run(&notifier, false).await.expect("second run");

    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.matches_total, 1);
    assert!(second.new_matches.is_empty());
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(store.history_count().unwrap(), 1);
}

#[tokio::test]
async fn more_than_ten_matches_get_a_digest_first() {
    let store = configured_store(None);
    let artists: Vec<String> = (1..=11).map(|i| format!("Performer {i:02}")).collect();
    let events = artists
        .iter()
        .enumerate()
        .map(|(i, artist)| {
            event(
                Source::Melkweg,
                &format!("{artist} in concert"),
                "Melkweg",
                &format!("2026-04-{:02}", i + 1),
                &format!("https://www.melkweg.nl/en/agenda/{i}"),
            )
        })
        .collect();
    let list: &'static str = Box::leak(artists.join("\n").into_boxed_str());
    let pipeline = pipeline(&store, single_venue(events), ListOk(list));
    let notifier = Recorder::default();

    let report = pipeline.run(&notifier, false).await.expect("run");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 12);
    assert_eq!(sent[0], "You have 11 new matches. Sending details below.");
    assert_eq!(report.notifications_sent, 11);
    assert_eq!(report.status, RunStatus::Success);
}

#[tokio::test]
async fn lost_digest_is_logged_without_degrading_status() {
    let store = configured_store(None);
    let artists: Vec<String> = (1..=11).map(|i| format!("Performer {i:02}")).collect();
    let events = artists
        .iter()
        .enumerate()
        .map(|(i, artist)| {
            event(
                Source::Melkweg,
                &format!("{artist} in concert"),
                "Melkweg",
                &format!("2026-04-{:02}", i + 1),
                &format!("https://www.melkweg.nl/en/agenda/{i}"),
            )
        })
        .collect();
    let list: &'static str = Box::leak(artists.join("\n").into_boxed_str());
    let pipeline = pipeline(&store, single_venue(events), ListOk(list));
    let notifier = Recorder::failing_on("new matches. Sending details below.");

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::Success);
    assert!(report.errors.is_empty());
    assert_eq!(report.notifications_sent, 11);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 11);
    assert!(sent.iter().all(|text| text.starts_with("🎵")));
}

#[tokio::test]
async fn exactly_ten_matches_get_no_digest() {
    let store = configured_store(None);
    let artists: Vec<String> = (1..=10).map(|i| format!("Performer {i:02}")).collect();
    let events = artists
        .iter()
        .enumerate()
        .map(|(i, artist)| {
            event(
                Source::Melkweg,
                artist,
                "Melkweg",
                "",
                &format!("https://www.melkweg.nl/en/agenda/{i}"),
            )
        })
        .collect();
    let list: &'static str = Box::leak(artists.join("\n").into_boxed_str());
    let pipeline = pipeline(&store, single_venue(events), ListOk(list));
    let notifier = Recorder::default();

    pipeline.run(&notifier, false).await.expect("run");
    let sent = notifier.sent();
    assert_eq!(sent.len(), 10);
    assert!(sent.iter().all(|text| text.starts_with("🎵")));
}

#[tokio::test]
async fn one_failing_connector_out_of_six_is_isolated() {
    let store = configured_store(None);
    let connectors: Vec<Arc<dyn Connector>> = vec![
        Arc::new(FixedVenue {
            source: Source::Paradiso,
            events: filler(Source::Paradiso, 3),
        }),
        Arc::new(FixedVenue {
            source: Source::Melkweg,
            events: filler(Source::Melkweg, 4),
        }),
        Arc::new(FixedVenue {
            source: Source::AfasLive,
            events: filler(Source::AfasLive, 5),
        }),
        Arc::new(FixedVenue {
            source: Source::ZiggoDome,
            events: filler(Source::ZiggoDome, 6),
        }),
        Arc::new(DownVenue(Source::Ticketmaster)),
        Arc::new(FixedVenue {
            source: Source::JohanCruijffArena,
            events: filler(Source::JohanCruijffArena, 7),
        }),
    ];
    let pipeline = pipeline(&store, connectors, ListOk("Burna Boy"));

    let report = pipeline.run(&Recorder::default(), false).await.expect("run");

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.events_scanned_total, 25);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("ticketmaster: "), "{}", report.errors[0]);
}

#[tokio::test]
async fn panicking_connector_is_recorded_not_fatal() {
    let store = configured_store(None);
    let connectors: Vec<Arc<dyn Connector>> = vec![
        Arc::new(PanickingVenue(Source::ZiggoDome)),
        Arc::new(FixedVenue {
            source: Source::Paradiso,
            events: vec![burna_at_paradiso()],
        }),
    ];
    let pipeline = pipeline(&store, connectors, ListOk("Burna Boy"));
    let notifier = Recorder::default();

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.events_scanned_total, 1);
    assert_eq!(report.notifications_sent, 1);
    assert!(report.errors[0].starts_with("ziggodome: "));
}

#[tokio::test]
async fn unreachable_list_falls_back_to_cache_and_warns() {
    let store = configured_store(Some("Burna Boy"));
    let pipeline = pipeline(&store, single_venue(vec![burna_at_paradiso()]), ListDown);
    let notifier = Recorder::default();

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_ne!(report.status, RunStatus::Failure);
    assert_eq!(report.artists_fetch_error.as_deref(), Some("404 Not Found"));
    assert_eq!(report.new_matches.len(), 1);
    assert_eq!(report.new_matches[0].artist, "Burna Boy");
    let sent = notifier.sent();
    assert_eq!(
        sent[0],
        "Artists list URL could not be fetched; using cached list. Error: 404 Not Found"
    );
    assert_eq!(sent.len(), 2);
}

#[tokio::test]
async fn stale_warning_delivery_failure_is_swallowed() {
    let store = configured_store(Some("Burna Boy"));
    let pipeline = pipeline(&store, single_venue(vec![burna_at_paradiso()]), ListDown);
    let notifier = Recorder::failing_on("using cached list");

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::Success);
    assert!(report.errors.is_empty());
    assert_eq!(report.notifications_sent, 1);
}

#[tokio::test]
async fn unreachable_list_without_cache_fails_before_fetching() {
    let store = configured_store(None);
    let pipeline = pipeline(&store, single_venue(vec![burna_at_paradiso()]), ListDown);
    let notifier = Recorder::default();

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.events_scanned_total, 0);
    assert!(notifier.sent().is_empty());
    assert_eq!(
        store.get_setting(keys::LAST_RUN_STATUS).unwrap().as_deref(),
        Some("failure")
    );
    let summary: serde_json::Value = serde_json::from_str(
        &store.get_setting(keys::LAST_RUN_SUMMARY_JSON).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(summary["error"], "404 Not Found");
}

#[tokio::test]
async fn missing_list_url_is_a_failure() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let pipeline = pipeline(&store, single_venue(vec![burna_at_paradiso()]), ListOk("Burna Boy"));
    let notifier = Recorder::default();

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.errors, vec!["artists_list_url not set".to_string()]);
    assert!(notifier.sent().is_empty());
    assert_eq!(
        store.get_setting(keys::LAST_RUN_SUMMARY_JSON).unwrap().as_deref(),
        Some(r#"{"error":"artists_list_url not set"}"#)
    );
    assert!(store.get_setting(keys::LAST_RUN_AT).unwrap().is_some());
}

#[tokio::test]
async fn dry_run_reports_without_side_effects() {
    let store = configured_store(None);
    let pipeline = pipeline(&store, single_venue(vec![burna_at_paradiso()]), ListOk("Burna Boy"));
    let notifier = Recorder::default();

    let dry = pipeline.run(&notifier, true).await.expect("dry run");
    assert_eq!(dry.new_matches.len(), 1);
    assert_eq!(dry.notifications_sent, 0);
    assert!(notifier.sent().is_empty());
    assert_eq!(store.history_count().unwrap(), 0);

    let real = pipeline.run(&notifier, false).await.expect("real run");
    assert_eq!(real.notifications_sent, 1);
}

#[tokio::test]
async fn failed_sends_are_recorded_and_later_sends_continue() {
    let store = configured_store(None);
    let events = vec![
        event(
            Source::Melkweg,
            "Tems: Born in the Wild",
            "Melkweg",
            "2026-06-10",
            "https://www.melkweg.nl/en/agenda/tems",
        ),
        burna_at_paradiso(),
    ];
    let pipeline = pipeline(&store, single_venue(events), ListOk("Tems\nBurna Boy"));
    let notifier = Recorder::failing_on("**Tems**");

    let report = pipeline.run(&notifier, false).await.expect("run");

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.errors, vec!["send: delivery failed: chat not found".to_string()]);
    assert!(notifier.sent()[0].contains("**Burna Boy**"));
    assert_eq!(store.history_count().unwrap(), 2);
}

#[tokio::test]
async fn summary_is_persisted_after_run() {
    let store = configured_store(None);
    let mut events = filler(Source::Paradiso, 2);
    events.push(burna_at_paradiso());
    let pipeline = pipeline(&store, single_venue(events), ListOk("Burna Boy"));

    pipeline.run(&Recorder::default(), false).await.expect("run");

    assert_eq!(
        store.get_setting(keys::LAST_RUN_STATUS).unwrap().as_deref(),
        Some("success")
    );
    let last_at = store.get_setting(keys::LAST_RUN_AT).unwrap().unwrap();
    assert!(last_at.ends_with('Z'));
    let summary: serde_json::Value = serde_json::from_str(
        &store.get_setting(keys::LAST_RUN_SUMMARY_JSON).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(summary["events_scanned_total"], 3);
    assert_eq!(summary["matches_total"], 1);
    assert_eq!(summary["notifications_sent"], 1);
    assert_eq!(summary["errors"], serde_json::json!([]));
}

#[tokio::test]
async fn overlapping_run_is_rejected() {
    let store = configured_store(None);
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let connectors: Vec<Arc<dyn Connector>> = vec![Arc::new(GatedVenue {
        started: Arc::clone(&started),
        release: Arc::clone(&release),
    })];
    let pipeline = Arc::new(pipeline(&store, connectors, ListOk("Burna Boy")));

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run(&NoopNotifier, true).await })
    };
    started.notified().await;

    let second = pipeline.run(&NoopNotifier, true).await;
    assert!(matches!(second, Err(PipelineError::RunInProgress)));

    release.notify_one();
    let first = first.await.expect("join").expect("first run");
    assert_eq!(first.status, RunStatus::Success);

    assert!(pipeline.run(&NoopNotifier, true).await.is_ok());
}
