//! Tests d'intégration du moteur de sessions : scénarios de bout en bout
//! avec resolver, pipeline et sink factices.

use async_trait::async_trait;
use bardeaudio::{
    FramePacket, FrameSink, FrameSource, FrameSourceFactory, OpenOptions, PipelineError,
    SinkError, VolumeControl,
};
use bardesession::{
    DestinationId, LoopMode, PipelineBuilder, PlaybackState, PlayerEvent, SessionError,
    SessionRegistry, StopReason,
};
use bardesource::{MediaDescriptor, ResolveError, SourceKind, TrackResolver};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const FRAME_MS: u64 = 1;

fn descriptor(name: &str) -> MediaDescriptor {
    MediaDescriptor {
        reference: name.to_string(),
        stream_url: format!("http://cdn.test/{name}"),
        title: name.to_string(),
        duration: Some(Duration::from_secs(10)),
        kind: SourceKind::CatalogTrack,
    }
}

/// Comportement programmé du resolver pour une référence
#[derive(Clone)]
enum StubOutcome {
    Found(MediaDescriptor),
    Unavailable,
    Empty,
    Hang,
}

struct StubResolver {
    outcomes: HashMap<String, StubOutcome>,
    calls: Mutex<Vec<String>>,
}

impl StubResolver {
    fn new(outcomes: &[(&str, StubOutcome)]) -> Arc<Self> {
        Arc::new(Self {
            outcomes: outcomes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn tracks(names: &[&str]) -> Arc<Self> {
        let outcomes: Vec<(&str, StubOutcome)> = names
            .iter()
            .map(|n| (*n, StubOutcome::Found(descriptor(n))))
            .collect();
        Self::new(&outcomes)
    }

    fn call_count(&self, reference: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == reference)
            .count()
    }
}

#[async_trait]
impl TrackResolver for StubResolver {
    async fn resolve(&self, reference: &str) -> bardesource::Result<Vec<MediaDescriptor>> {
        self.calls.lock().unwrap().push(reference.to_string());
        match self.outcomes.get(reference) {
            Some(StubOutcome::Found(d)) => Ok(vec![d.clone()]),
            Some(StubOutcome::Unavailable) => {
                Err(ResolveError::UpstreamUnavailable("catalog down".into()))
            }
            Some(StubOutcome::Empty) => Ok(vec![]),
            Some(StubOutcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(vec![])
            }
            None => Err(ResolveError::InvalidReference(reference.to_string())),
        }
    }
}

/// Fabrique factice : chaque piste produit `frames` frames de 1 ms
struct StubFactory {
    frames: u64,
    hang_on: Vec<String>,
    opened: Mutex<Vec<String>>,
}

impl StubFactory {
    fn new(frames: u64) -> Arc<Self> {
        Arc::new(Self {
            frames,
            hang_on: Vec::new(),
            opened: Mutex::new(Vec::new()),
        })
    }

    fn hanging_on(frames: u64, titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            frames,
            hang_on: titles.iter().map(|t| t.to_string()).collect(),
            opened: Mutex::new(Vec::new()),
        })
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameSourceFactory for StubFactory {
    async fn open(
        &self,
        descriptor: &MediaDescriptor,
        _options: OpenOptions,
    ) -> Result<FrameSource, PipelineError> {
        if self.hang_on.contains(&descriptor.title) {
            // Ouverture interminable : seul un cancel peut en sortir
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Err(PipelineError::Fetch("unreachable".to_string()));
        }
        self.opened.lock().unwrap().push(descriptor.stream_url.clone());

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);
        let (_err_tx, err_rx) = mpsc::channel(1);

        let frames = self.frames;
        let feeder_token = token.clone();
        tokio::spawn(async move {
            for sequence in 0..frames {
                let frame = FramePacket {
                    data: Bytes::from_static(&[0xF8, 0xFF, 0xFE]),
                    sequence,
                    duration: Duration::from_millis(FRAME_MS),
                };
                tokio::select! {
                    _ = feeder_token.cancelled() => break,
                    result = tx.send(frame) => {
                        if result.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(FrameSource::from_parts(rx, err_rx, token))
    }
}

/// Sink factice : enregistre les numéros de séquence livrés
#[derive(Clone, Default)]
struct RecordingSink {
    sequences: Arc<Mutex<Vec<u64>>>,
}

impl RecordingSink {
    fn delivered(&self) -> Vec<u64> {
        self.sequences.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn accept(&mut self, frame: FramePacket) -> Result<(), SinkError> {
        self.sequences.lock().unwrap().push(frame.sequence);
        Ok(())
    }
}

/// Sink qui casse après un nombre donné de frames
struct FailingSink {
    after: usize,
    accepted: usize,
}

#[async_trait]
impl FrameSink for FailingSink {
    async fn accept(&mut self, _frame: FramePacket) -> Result<(), SinkError> {
        if self.accepted >= self.after {
            return Err(SinkError::Transport("destination unreachable".to_string()));
        }
        self.accepted += 1;
        Ok(())
    }
}

fn registry_with(
    resolver: Arc<StubResolver>,
    factory: Arc<StubFactory>,
    idle_timeout: Duration,
) -> Arc<SessionRegistry> {
    let factory: Arc<dyn FrameSourceFactory> = factory;
    let builder: PipelineBuilder =
        Arc::new(move || (factory.clone(), VolumeControl::new(0.5)));
    SessionRegistry::new(resolver, builder, idle_timeout, Duration::from_millis(250))
}

fn destination() -> DestinationId {
    DestinationId::new(100, 1)
}

async fn next_event(rx: &mut broadcast::Receiver<PlayerEvent>) -> PlayerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for player event")
        .expect("event stream closed")
}

#[tokio::test]
async fn test_enqueue_plays_in_fifo_order() {
    let resolver = StubResolver::tracks(&["a", "b", "c"]);
    let factory = StubFactory::new(3);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();

    for reference in ["a", "b", "c"] {
        session.enqueue_reference(reference, "tester").await.unwrap();
    }

    let mut started = Vec::new();
    loop {
        match next_event(&mut events).await {
            PlayerEvent::TrackStarted { title, .. } => started.push(title),
            PlayerEvent::QueueFinished if started.len() == 3 => break,
            _ => {}
        }
    }
    assert_eq!(started, vec!["a", "b", "c"]);

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(snapshot.queue.is_empty());
}

#[tokio::test]
async fn test_skip_on_error_scenario() {
    // A se résout, B échoue côté catalogue, C se résout
    let resolver = StubResolver::new(&[
        ("a", StubOutcome::Found(descriptor("a"))),
        ("b", StubOutcome::Unavailable),
        ("c", StubOutcome::Found(descriptor("c"))),
    ]);
    let factory = StubFactory::new(3);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();

    for reference in ["a", "b", "c"] {
        session.enqueue_reference(reference, "tester").await.unwrap();
    }

    let mut log = Vec::new();
    loop {
        match next_event(&mut events).await {
            PlayerEvent::TrackStarted { title, .. } => log.push(format!("start:{title}")),
            PlayerEvent::TrackFinished { title } => log.push(format!("finish:{title}")),
            PlayerEvent::TrackSkipped { title, .. } => log.push(format!("skip:{title}")),
            PlayerEvent::QueueFinished => break,
            PlayerEvent::Stopped { .. } => panic!("session must survive a failing entry"),
        }
    }

    assert_eq!(
        log,
        vec!["start:a", "finish:a", "skip:b", "start:c", "finish:c"]
    );

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(snapshot.queue.is_empty());
}

#[tokio::test]
async fn test_pause_resume_without_frame_loss() {
    let resolver = StubResolver::tracks(&["long"]);
    let factory = StubFactory::new(200);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let sink = RecordingSink::default();
    let sink_clone = sink.clone();
    let session = registry
        .get_or_create(destination(), move || Box::new(sink_clone))
        .await;
    let mut events = session.subscribe();

    session.enqueue_reference("long", "tester").await.unwrap();
    matches!(next_event(&mut events).await, PlayerEvent::TrackStarted { .. });

    // Laisser quelques frames partir puis suspendre
    tokio::time::sleep(Duration::from_millis(30)).await;
    session.pause().await.unwrap();
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Paused);

    // Pendant la pause, plus aucune frame ne part
    tokio::time::sleep(Duration::from_millis(20)).await;
    let during_pause = sink.delivered().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.delivered().len(), during_pause, "paused session must not deliver");

    session.resume().await.unwrap();
    loop {
        if matches!(
            next_event(&mut events).await,
            PlayerEvent::TrackFinished { .. }
        ) {
            break;
        }
    }

    // Reprise au même offset : séquence dense, sans répétition ni trou
    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 200);
    for (i, sequence) in delivered.iter().enumerate() {
        assert_eq!(*sequence, i as u64);
    }
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let resolver = StubResolver::tracks(&["a"]);
    let factory = StubFactory::new(500);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();

    session.enqueue_reference("a", "tester").await.unwrap();
    matches!(next_event(&mut events).await, PlayerEvent::TrackStarted { .. });

    session.stop().await.unwrap();
    // Second stop : no-op, pas une erreur, même si le worker est déjà parti
    session.stop().await.unwrap();

    loop {
        match next_event(&mut events).await {
            PlayerEvent::Stopped { reason } => {
                assert_eq!(reason, StopReason::Requested);
                break;
            }
            _ => {}
        }
    }

    // Les opérations suivantes trouvent une session terminée
    let result = session.enqueue_reference("a", "tester").await;
    assert!(matches!(result, Err(SessionError::Terminated)));
}

#[tokio::test]
async fn test_loop_track_replays_identical_descriptor() {
    let resolver = StubResolver::tracks(&["tube"]);
    let factory = StubFactory::new(3);
    let registry = registry_with(resolver.clone(), factory.clone(), Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();

    session.set_loop(LoopMode::Track).await.unwrap();
    session.enqueue_reference("tube", "tester").await.unwrap();

    // Trois lectures complètes sous loop=track
    let mut starts = 0;
    while starts < 3 {
        if matches!(
            next_event(&mut events).await,
            PlayerEvent::TrackStarted { .. }
        ) {
            starts += 1;
        }
    }

    session.set_loop(LoopMode::Off).await.unwrap();
    loop {
        if matches!(next_event(&mut events).await, PlayerEvent::QueueFinished) {
            break;
        }
    }

    // Le descripteur est identique à chaque tour : une seule résolution
    assert_eq!(resolver.call_count("tube"), 1);
    let opened = factory.opened();
    assert!(opened.len() >= 3);
    assert!(opened.iter().all(|url| url == &opened[0]));

    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Idle);
}

#[tokio::test]
async fn test_skip_cancels_inflight_open() {
    // L'ouverture de "stuck" ne se termine jamais ; "next" est normale
    let resolver = StubResolver::tracks(&["stuck", "next"]);
    let factory = StubFactory::hanging_on(3, &["stuck"]);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();

    session.enqueue_reference("stuck", "tester").await.unwrap();
    session.enqueue_reference("next", "tester").await.unwrap();

    // Laisser la session s'engager dans l'ouverture bloquée
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Loading);

    session.skip().await.unwrap();

    // L'annulation est bornée : la piste suivante démarre rapidement,
    // et aucun Stopped n'est émis (l'annulation n'est pas une erreur)
    let started = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match next_event(&mut events).await {
                PlayerEvent::TrackStarted { title, .. } => break title,
                PlayerEvent::Stopped { .. } => panic!("skip must not stop the session"),
                _ => {}
            }
        }
    })
    .await
    .expect("next track must start promptly after skip");

    assert_eq!(started, "next");
}

#[tokio::test]
async fn test_transport_error_is_session_fatal() {
    let resolver = StubResolver::tracks(&["a"]);
    let factory = StubFactory::new(50);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || {
            Box::new(FailingSink {
                after: 2,
                accepted: 0,
            })
        })
        .await;
    let mut events = session.subscribe();

    session.enqueue_reference("a", "tester").await.unwrap();

    loop {
        match next_event(&mut events).await {
            PlayerEvent::Stopped { reason } => {
                assert!(matches!(reason, StopReason::Transport(_)));
                break;
            }
            PlayerEvent::TrackSkipped { .. } => {
                panic!("transport failure is fatal, not a per-track skip")
            }
            _ => {}
        }
    }

    // La session terminée finit par être évincée du registre
    let evicted = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if registry.get(destination()).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(evicted.is_ok(), "stopped session must leave the registry");
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_one_session() {
    let resolver = StubResolver::tracks(&[]);
    let factory = StubFactory::new(1);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let sinks_created = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let sinks_created = sinks_created.clone();
        handles.push(tokio::spawn(async move {
            registry
                .get_or_create(destination(), move || {
                    sinks_created.fetch_add(1, Ordering::SeqCst);
                    Box::new(RecordingSink::default())
                })
                .await
        }));
    }

    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap());
    }

    assert_eq!(sinks_created.load(Ordering::SeqCst), 1, "one sink, one session");
    assert_eq!(registry.len().await, 1);
    for session in &sessions[1..] {
        assert!(Arc::ptr_eq(&sessions[0], session));
    }
}

#[tokio::test]
async fn test_registry_remove_is_idempotent() {
    let resolver = StubResolver::tracks(&[]);
    let factory = StubFactory::new(1);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;

    assert!(registry.remove(destination()).await);
    assert!(!registry.remove(destination()).await);
    assert!(registry.get(destination()).await.is_none());
}

#[tokio::test]
async fn test_pause_rejected_when_idle() {
    let resolver = StubResolver::tracks(&[]);
    let factory = StubFactory::new(1);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;

    let err = session.pause().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));

    let err = session.resume().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_queue_snapshot_and_volume() {
    let resolver = StubResolver::tracks(&["a", "b", "c"]);
    let factory = StubFactory::new(400);
    let registry = registry_with(resolver, factory, Duration::from_secs(300));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();

    for reference in ["a", "b", "c"] {
        session.enqueue_reference(reference, "tester").await.unwrap();
    }
    matches!(next_event(&mut events).await, PlayerEvent::TrackStarted { .. });

    // "a" joue, "b" et "c" attendent dans l'ordre d'enfilage
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    let pending: Vec<&str> = snapshot.queue.iter().map(|e| e.reference.as_str()).collect();
    assert_eq!(pending, vec!["b", "c"]);
    assert!(snapshot.now_playing.is_some());

    assert!((session.volume() - 0.5).abs() < f32::EPSILON);
    session.set_volume(1.5);
    assert!((session.volume() - 1.5).abs() < f32::EPSILON);
    let snapshot = session.snapshot().await.unwrap();
    assert!((snapshot.volume - 1.5).abs() < f32::EPSILON);

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_is_evicted_after_timeout() {
    let resolver = StubResolver::tracks(&[]);
    let factory = StubFactory::new(1);
    let registry = registry_with(resolver, factory, Duration::from_secs(30));

    let session = registry
        .get_or_create(destination(), || Box::new(RecordingSink::default()))
        .await;
    let mut events = session.subscribe();
    assert_eq!(registry.len().await, 1);

    // Bien au-delà du délai d'éviction + l'intervalle de balayage
    tokio::time::sleep(Duration::from_secs(60)).await;

    let evicted = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if registry.get(destination()).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    assert!(evicted.is_ok(), "idle session must be evicted");

    loop {
        match next_event(&mut events).await {
            PlayerEvent::Stopped { reason } => {
                assert_eq!(reason, StopReason::IdleEvicted);
                break;
            }
            _ => {}
        }
    }
}
