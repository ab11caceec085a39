//! End-to-end runs of the four loops and the HTTP API against scripted
//! devices and on-disk storage.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use parkgate::devices::sim::{ChannelTokenReader, ChannelTrigger, RecordingActuator, RecordingDisplay};
use parkgate::transport::http::routes;
use parkgate::config::InputConfig;
use parkgate::{
    Devices, EventLoops, GateService, GateTiming, JsonFileStorage, ParkingState, SharedState,
    TokenId, TokenStore, Triggers,
};

/// One full gate cycle (open, dwell, close) plus re-arm, with slack.
const CYCLE: Duration = Duration::from_secs(10);

struct Lot {
    service: Arc<GateService>,
    cards: mpsc::Sender<TokenId>,
    entry: mpsc::Sender<()>,
    exit: mpsc::Sender<()>,
    add: mpsc::Sender<()>,
    remove: mpsc::Sender<()>,
    servo: Arc<RecordingActuator>,
    display: Arc<RecordingDisplay>,
    loops: EventLoops,
}

impl Lot {
    fn open(dir: &Path, capacity: usize) -> Self {
        let tokens = TokenStore::load(Box::new(JsonFileStorage::in_dir(dir))).unwrap();
        let (cards, reader) = ChannelTokenReader::new(8);
        let servo = Arc::new(RecordingActuator::new());
        let display = Arc::new(RecordingDisplay::new());
        let service = Arc::new(GateService::new(
            SharedState::new(ParkingState::new(tokens, capacity)),
            Devices {
                reader: Arc::new(reader),
                actuator: servo.clone(),
                display: display.clone(),
            },
            GateTiming::default(),
            Duration::from_secs(10),
            CancellationToken::new(),
        ));

        let (entry, entry_rx) = ChannelTrigger::new(4);
        let (exit, exit_rx) = ChannelTrigger::new(4);
        let (add, add_rx) = ChannelTrigger::new(4);
        let (remove, remove_rx) = ChannelTrigger::new(4);
        let loops = EventLoops::spawn(
            Arc::clone(&service),
            Triggers {
                entry: Box::new(entry_rx),
                exit: Box::new(exit_rx),
                add: Box::new(add_rx),
                remove: Box::new(remove_rx),
            },
            &InputConfig::default(),
        );

        Self {
            service,
            cards,
            entry,
            exit,
            add,
            remove,
            servo,
            display,
            loops,
        }
    }

    async fn arrive(&self, card: &str) {
        self.cards.send(TokenId::new(card)).await.unwrap();
        self.entry.send(()).await.unwrap();
        tokio::time::sleep(CYCLE).await;
    }

    async fn depart(&self) {
        self.exit.send(()).await.unwrap();
        tokio::time::sleep(CYCLE).await;
    }

    async fn press(&self, button: &mpsc::Sender<()>, card: &str) {
        self.cards.send(TokenId::new(card)).await.unwrap();
        button.send(()).await.unwrap();
        tokio::time::sleep(CYCLE).await;
    }

    async fn close(self) {
        self.service.trigger_shutdown();
        self.loops.join().await;
    }
}

#[tokio::test(start_paused = true)]
async fn reserved_card_holds_capacity_against_walk_ins() {
    let dir = tempfile::tempdir().unwrap();
    let lot = Lot::open(dir.path(), 4);
    lot.press(&lot.add, "A").await;
    lot.press(&lot.add, "B").await;
    lot.service.reserve(&TokenId::new("A")).await.unwrap();

    lot.arrive("A").await;
    let slot_of_a = lot.service.state().lock().slots.slot_of(&TokenId::new("A"));
    assert_eq!(slot_of_a, Some(0));

    lot.arrive("B").await;
    assert_eq!(lot.service.available_slots(), 3);

    lot.depart().await;
    assert_eq!(lot.service.available_slots(), 4);

    lot.arrive("B").await;
    assert_eq!(lot.service.available_slots(), 3);

    let shown = lot.display.messages();
    let outcomes: Vec<&str> = shown
        .iter()
        .map(String::as_str)
        .filter(|m| *m != "Scanning RFID" && *m != "Scan New Card")
        .collect();
    assert_eq!(
        outcomes,
        vec![
            "Added: A",
            "Added: B",
            "Entry Granted",
            "Walk-in Denied",
            "Exit Granted",
            "Entry Granted",
        ]
    );
    // Three barrier cycles: A in, A out, B in.
    assert_eq!(lot.servo.angles(), vec![90, 0, 90, 0, 90, 0]);

    lot.close().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_card_never_opens_the_barrier() {
    let dir = tempfile::tempdir().unwrap();
    let lot = Lot::open(dir.path(), 2);

    lot.arrive("stranger").await;

    assert_eq!(lot.service.available_slots(), 2);
    assert_eq!(lot.display.last().as_deref(), Some("Access Denied"));
    assert!(lot.servo.angles().is_empty());

    lot.close().await;
}

#[tokio::test(start_paused = true)]
async fn full_lot_turns_vehicles_away() {
    let dir = tempfile::tempdir().unwrap();
    let lot = Lot::open(dir.path(), 1);
    lot.press(&lot.add, "A").await;
    lot.press(&lot.add, "B").await;

    lot.arrive("A").await;
    lot.arrive("B").await;

    assert_eq!(lot.service.available_slots(), 0);
    assert_eq!(lot.display.last().as_deref(), Some("Parking Full"));

    lot.close().await;
}

#[tokio::test(start_paused = true)]
async fn registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let lot = Lot::open(dir.path(), 4);
    lot.press(&lot.add, "A").await;
    lot.press(&lot.add, "B").await;
    lot.service.reserve(&TokenId::new("B")).await.unwrap();
    lot.press(&lot.remove, "A").await;
    let before = lot.service.state().lock().tokens.snapshot().clone();
    lot.close().await;

    let reloaded = TokenStore::load(Box::new(JsonFileStorage::in_dir(dir.path()))).unwrap();
    assert_eq!(reloaded.snapshot(), &before);
    assert!(reloaded.is_reserved(&TokenId::new("B")));
    assert!(!reloaded.is_registered(&TokenId::new("A")));
}

#[tokio::test(start_paused = true)]
async fn removed_card_loses_reservation_and_entry() {
    let dir = tempfile::tempdir().unwrap();
    let lot = Lot::open(dir.path(), 4);
    lot.press(&lot.add, "A").await;
    lot.service.reserve(&TokenId::new("A")).await.unwrap();
    lot.press(&lot.remove, "A").await;

    assert!(lot.service.reserve(&TokenId::new("A")).await.is_err());
    lot.arrive("A").await;
    assert_eq!(lot.display.last().as_deref(), Some("Access Denied"));

    lot.close().await;
}

#[tokio::test(start_paused = true)]
async fn status_and_reserve_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let lot = Lot::open(dir.path(), 4);
    lot.press(&lot.add, "A").await;
    lot.arrive("A").await;

    let response = routes(Arc::clone(&lot.service))
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json, serde_json::json!({ "available_slots": 3 }));

    let response = routes(Arc::clone(&lot.service))
        .oneshot(
            Request::post("/reserve")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"uid":"X"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(lot.service.occupancy().reserved, 0);

    lot.close().await;
}
