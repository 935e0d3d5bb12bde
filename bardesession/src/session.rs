//! Session de lecture : un worker par destination vocale
//!
//! La session est un acteur : le handle public [`Session`] pousse des
//! commandes sur un channel mpsc, le worker les traite une par une. Toutes
//! les opérations de contrôle d'une même session sont donc totalement
//! ordonnées — `skip` émis en concurrence avec `pause` produit une
//! séquence bien définie, jamais une course.
//!
//! La piste active tourne dans une task dédiée qui pompe la
//! [`FrameSource`] vers le sink rythmé ; le sink voyage dans la task et
//! revient avec l'issue de la piste. La résolution d'une entrée tourne
//! elle aussi dans une task annulable, pour que `skip`/`stop` interrompent
//! une résolution ou un fetch en cours dans le délai imparti.

use crate::error::{Result, SessionError};
use crate::events::{PlayerEvent, StopReason};
use crate::queue::{QueueEntry, TrackQueue};
use crate::state::{LoopMode, PlaybackState};
use bardeaudio::{
    FrameSink, FrameSource, FrameSourceFactory, OpenOptions, PacedSink, PipelineError, SinkError,
    VolumeControl,
};
use bardesource::{MediaDescriptor, TrackResolver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identité d'une destination vocale : un canal dans un serveur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationId {
    pub guild: u64,
    pub channel: u64,
}

impl DestinationId {
    pub fn new(guild: u64, channel: u64) -> Self {
        Self { guild, channel }
    }
}

impl std::fmt::Display for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.guild, self.channel)
    }
}

/// Piste en cours avec sa position de lecture
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub descriptor: MediaDescriptor,
    pub requested_by: String,
    /// Temps de lecture déjà livré au transport
    pub elapsed: Duration,
}

/// Vue instantanée de l'état d'une session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub loop_mode: LoopMode,
    pub volume: f32,
    pub now_playing: Option<NowPlaying>,
    pub queue: Vec<QueueEntry>,
    /// Durée d'inactivité si la session est Idle
    pub idle_for: Option<Duration>,
}

type ReplyTx<T> = oneshot::Sender<Result<T>>;

enum Command {
    Enqueue {
        entries: Vec<QueueEntry>,
        reply: ReplyTx<usize>,
    },
    Pause {
        reply: ReplyTx<()>,
    },
    Resume {
        reply: ReplyTx<()>,
    },
    Skip {
        reply: ReplyTx<()>,
    },
    Stop {
        reason: StopReason,
        reply: ReplyTx<()>,
    },
    SetLoop {
        mode: LoopMode,
        reply: ReplyTx<()>,
    },
    Clear {
        reply: ReplyTx<usize>,
    },
    Remove {
        start: usize,
        end: usize,
        reply: ReplyTx<Vec<QueueEntry>>,
    },
    MoveEntry {
        src: usize,
        dest: usize,
        reply: ReplyTx<()>,
    },
    Shuffle {
        reply: ReplyTx<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Issue d'une piste jouée
enum TrackEnd {
    Completed,
    Pipeline(PipelineError),
    Transport(SinkError),
    Cancelled,
}

/// Issue d'un chargement (résolution + ouverture)
enum LoadOutcome {
    Ready {
        entry: QueueEntry,
        source: FrameSource,
    },
    Failed {
        entry: QueueEntry,
        reason: String,
    },
    Cancelled,
}

/// Intention enregistrée avant une annulation
enum AfterCancel {
    Skip,
    Stop(StopReason),
}

struct LoadingTrack {
    cancel: CancellationToken,
    outcome_rx: oneshot::Receiver<LoadOutcome>,
}

struct ActiveTrack {
    entry: QueueEntry,
    pause_tx: watch::Sender<bool>,
    track_cancel: CancellationToken,
    source_cancel: CancellationToken,
    elapsed_us: Arc<AtomicU64>,
    outcome_rx: oneshot::Receiver<(TrackEnd, Box<dyn FrameSink + Send>)>,
}

enum Activity {
    Idle,
    Loading(LoadingTrack),
    Playing(ActiveTrack),
}

enum Wake {
    Cmd(Option<Command>),
    Loaded(LoadOutcome),
    Ended(TrackEnd, Option<Box<dyn FrameSink + Send>>),
}

/// Résolution + ouverture d'une entrée, annulable à tout instant
async fn run_load(
    entry: QueueEntry,
    resolver: Arc<dyn TrackResolver>,
    factory: Arc<dyn FrameSourceFactory>,
    cancel: CancellationToken,
) -> LoadOutcome {
    let work = async move {
        let descriptor = match entry.descriptor.clone() {
            // Entrée re-enfilée par un mode loop : descripteur réutilisé tel quel
            Some(descriptor) => descriptor,
            None => match resolver.resolve(&entry.reference).await {
                Ok(mut descriptors) if !descriptors.is_empty() => descriptors.remove(0),
                Ok(_) => {
                    return LoadOutcome::Failed {
                        entry,
                        reason: "no match found".to_string(),
                    };
                }
                Err(e) => {
                    return LoadOutcome::Failed {
                        entry,
                        reason: e.to_string(),
                    };
                }
            },
        };

        match factory.open(&descriptor, OpenOptions::default()).await {
            Ok(source) => {
                let mut entry = entry;
                entry.descriptor = Some(descriptor);
                LoadOutcome::Ready { entry, source }
            }
            Err(e) => LoadOutcome::Failed {
                entry,
                reason: e.to_string(),
            },
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => LoadOutcome::Cancelled,
        outcome = work => outcome,
    }
}

/// Pompe les frames de la source vers le sink rythmé
///
/// La pause suspend la consommation entre deux frames ; la production
/// amont se suspend alors d'elle-même par backpressure des channels
/// bornés, et la reprise continue au même offset.
async fn run_track(
    mut source: FrameSource,
    sink: Box<dyn FrameSink + Send>,
    mut pause_rx: watch::Receiver<bool>,
    track_cancel: CancellationToken,
    elapsed_us: Arc<AtomicU64>,
) -> (TrackEnd, Box<dyn FrameSink + Send>) {
    let mut paced = PacedSink::new(sink);

    let end = 'track: loop {
        // Pause : aucune frame générée ni consommée
        while *pause_rx.borrow() {
            tokio::select! {
                _ = track_cancel.cancelled() => break 'track TrackEnd::Cancelled,
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        break 'track TrackEnd::Cancelled;
                    }
                }
            }
        }

        let frame = tokio::select! {
            _ = track_cancel.cancelled() => break 'track TrackEnd::Cancelled,
            result = source.next_frame() => match result {
                Ok(Some(frame)) => frame,
                Ok(None) => break 'track TrackEnd::Completed,
                Err(e) => break 'track TrackEnd::Pipeline(e),
            },
        };

        let duration_us = frame.duration.as_micros() as u64;
        match paced.accept(frame).await {
            Ok(()) => {
                elapsed_us.fetch_add(duration_us, Ordering::Relaxed);
            }
            Err(e) => break 'track TrackEnd::Transport(e),
        }
    };

    (end, paced.into_inner())
}

pub(crate) struct SessionParams {
    pub destination: DestinationId,
    pub resolver: Arc<dyn TrackResolver>,
    pub factory: Arc<dyn FrameSourceFactory>,
    pub volume: VolumeControl,
    pub sink: Box<dyn FrameSink + Send>,
    pub evictions: mpsc::UnboundedSender<DestinationId>,
}

struct SessionWorker {
    destination: DestinationId,
    rx: mpsc::Receiver<Command>,
    queue: TrackQueue,
    state: PlaybackState,
    loop_mode: LoopMode,
    resolver: Arc<dyn TrackResolver>,
    factory: Arc<dyn FrameSourceFactory>,
    volume: VolumeControl,
    sink: Option<Box<dyn FrameSink + Send>>,
    events: broadcast::Sender<PlayerEvent>,
    evictions: mpsc::UnboundedSender<DestinationId>,
    activity: Activity,
    after_cancel: Option<AfterCancel>,
    idle_since: Option<Instant>,
}

impl SessionWorker {
    async fn run(mut self) {
        debug!(destination = %self.destination, "Session worker started");

        loop {
            let wake = match &mut self.activity {
                Activity::Idle => Wake::Cmd(self.rx.recv().await),
                Activity::Loading(loading) => tokio::select! {
                    cmd = self.rx.recv() => Wake::Cmd(cmd),
                    outcome = &mut loading.outcome_rx => {
                        Wake::Loaded(outcome.unwrap_or(LoadOutcome::Cancelled))
                    }
                },
                Activity::Playing(active) => tokio::select! {
                    cmd = self.rx.recv() => Wake::Cmd(cmd),
                    outcome = &mut active.outcome_rx => match outcome {
                        Ok((end, sink)) => Wake::Ended(end, Some(sink)),
                        Err(_) => Wake::Ended(TrackEnd::Cancelled, None),
                    },
                },
            };

            match wake {
                Wake::Cmd(None) => {
                    // Tous les handles sont tombés : démontage silencieux
                    self.cancel_activity();
                    break;
                }
                Wake::Cmd(Some(cmd)) => self.handle_command(cmd),
                Wake::Loaded(outcome) => self.handle_load_outcome(outcome),
                Wake::Ended(end, sink) => self.handle_track_end(end, sink),
            }

            if self.state.is_terminal() {
                break;
            }
        }

        debug!(destination = %self.destination, "Session worker exited");
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    /// Transition interne ; les chemins appelants sont valides par
    /// construction, un refus signale un invariant cassé
    fn set_state(&mut self, to: PlaybackState) {
        if self.state.can_transition(to) {
            self.state = to;
            self.idle_since = (to == PlaybackState::Idle).then(Instant::now);
        } else {
            warn!(
                destination = %self.destination,
                from = %self.state,
                to = %to,
                "Rejected internal state transition"
            );
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Enqueue { entries, reply } => {
                let result = self.enqueue(entries);
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            Command::Skip { reply } => {
                let _ = reply.send(self.skip());
            }
            Command::Stop { reason, reply } => {
                let _ = reply.send(self.stop(reason));
            }
            Command::SetLoop { mode, reply } => {
                self.loop_mode = mode;
                let _ = reply.send(Ok(()));
            }
            Command::Clear { reply } => {
                let _ = reply.send(Ok(self.queue.clear()));
            }
            Command::Remove { start, end, reply } => {
                let _ = reply.send(self.queue.remove_range(start, end));
            }
            Command::MoveEntry { src, dest, reply } => {
                let _ = reply.send(self.queue.move_entry(src, dest));
            }
            Command::Shuffle { reply } => {
                let _ = reply.send(Ok(self.queue.shuffle()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn enqueue(&mut self, entries: Vec<QueueEntry>) -> Result<usize> {
        for entry in entries {
            debug!(
                destination = %self.destination,
                title = entry.title(),
                "Track enqueued"
            );
            self.queue.push_back(entry);
        }
        let pending = self.queue.len();

        // Une session inactive démarre immédiatement la piste suivante
        if self.state == PlaybackState::Idle {
            self.begin_next();
        }
        Ok(pending)
    }

    fn pause(&mut self) -> Result<()> {
        let next = self.state.transition(PlaybackState::Paused)?;
        match &self.activity {
            Activity::Playing(active) => {
                let _ = active.pause_tx.send(true);
                self.state = next;
                Ok(())
            }
            _ => Err(SessionError::Internal(
                "playing state without an active track".to_string(),
            )),
        }
    }

    fn resume(&mut self) -> Result<()> {
        let next = self.state.transition(PlaybackState::Playing)?;
        match &self.activity {
            Activity::Playing(active) => {
                let _ = active.pause_tx.send(false);
                self.state = next;
                Ok(())
            }
            _ => Err(SessionError::Internal(
                "paused state without an active track".to_string(),
            )),
        }
    }

    fn skip(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Loading => {
                self.after_cancel = Some(AfterCancel::Skip);
                self.cancel_activity();
                Ok(())
            }
            from => Err(SessionError::InvalidTransition {
                from,
                to: PlaybackState::Loading,
            }),
        }
    }

    fn stop(&mut self, reason: StopReason) -> Result<()> {
        match self.state {
            // Idempotent : un second stop est un no-op, pas une erreur
            PlaybackState::Stopped | PlaybackState::Stopping => Ok(()),
            _ => {
                self.set_state(PlaybackState::Stopping);
                if matches!(self.activity, Activity::Idle) {
                    self.finalize_stop(reason);
                } else {
                    self.after_cancel = Some(AfterCancel::Stop(reason));
                    self.cancel_activity();
                }
                Ok(())
            }
        }
    }

    fn cancel_activity(&mut self) {
        match &self.activity {
            Activity::Idle => {}
            Activity::Loading(loading) => loading.cancel.cancel(),
            Activity::Playing(active) => {
                let _ = active.pause_tx.send(false);
                active.track_cancel.cancel();
                active.source_cancel.cancel();
            }
        }
    }

    /// Passe à l'entrée suivante de la queue, ou redevient inactive
    fn begin_next(&mut self) {
        match self.queue.pop_front() {
            None => {
                self.activity = Activity::Idle;
                self.set_state(PlaybackState::Idle);
                self.emit(PlayerEvent::QueueFinished);
            }
            Some(entry) => {
                self.set_state(PlaybackState::Loading);
                let cancel = CancellationToken::new();
                let (tx, rx) = oneshot::channel();
                let resolver = self.resolver.clone();
                let factory = self.factory.clone();
                let load_cancel = cancel.clone();
                tokio::spawn(async move {
                    let outcome = run_load(entry, resolver, factory, load_cancel).await;
                    let _ = tx.send(outcome);
                });
                self.activity = Activity::Loading(LoadingTrack {
                    cancel,
                    outcome_rx: rx,
                });
            }
        }
    }

    fn handle_load_outcome(&mut self, outcome: LoadOutcome) {
        let pending = self.after_cancel.take();

        if let Some(AfterCancel::Stop(reason)) = &pending {
            // L'arrêt prime sur toute issue de chargement ; un éventuel
            // pipeline déjà ouvert est démonté par le drop de la source
            self.activity = Activity::Idle;
            self.finalize_stop(reason.clone());
            return;
        }

        match outcome {
            LoadOutcome::Ready { entry, source } => {
                if matches!(pending, Some(AfterCancel::Skip)) {
                    // Un skip a gagné la course : écarter la piste chargée
                    self.begin_next();
                    return;
                }
                self.start_track(entry, source);
            }
            LoadOutcome::Failed { entry, reason } => {
                warn!(
                    destination = %self.destination,
                    title = entry.title(),
                    reason = %reason,
                    "Track failed to load, skipping"
                );
                self.emit(PlayerEvent::TrackSkipped {
                    title: entry.title().to_string(),
                    reason,
                });
                self.begin_next();
            }
            LoadOutcome::Cancelled => self.begin_next(),
        }
    }

    fn start_track(&mut self, entry: QueueEntry, source: FrameSource) {
        let Some(sink) = self.sink.take() else {
            warn!(destination = %self.destination, "No transport sink available");
            self.set_state(PlaybackState::Stopping);
            self.finalize_stop(StopReason::Transport("no sink available".to_string()));
            return;
        };

        let (pause_tx, pause_rx) = watch::channel(false);
        let track_cancel = CancellationToken::new();
        let source_cancel = source.cancellation_token();
        let elapsed_us = Arc::new(AtomicU64::new(0));
        let (tx, rx) = oneshot::channel();

        let task_cancel = track_cancel.clone();
        let task_elapsed = elapsed_us.clone();
        tokio::spawn(async move {
            let outcome = run_track(source, sink, pause_rx, task_cancel, task_elapsed).await;
            let _ = tx.send(outcome);
        });

        let title = entry.title().to_string();
        info!(destination = %self.destination, title = %title, "Track started");
        self.emit(PlayerEvent::TrackStarted {
            title,
            requested_by: entry.requested_by.clone(),
        });

        self.activity = Activity::Playing(ActiveTrack {
            entry,
            pause_tx,
            track_cancel,
            source_cancel,
            elapsed_us,
            outcome_rx: rx,
        });
        self.set_state(PlaybackState::Playing);
    }

    fn handle_track_end(&mut self, end: TrackEnd, sink: Option<Box<dyn FrameSink + Send>>) {
        let entry = match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Playing(active) => active.entry,
            _ => {
                warn!(destination = %self.destination, "Track end without active track");
                return;
            }
        };

        match sink {
            Some(sink) => self.sink = Some(sink),
            None => {
                // La task de piste est morte sans rendre le sink : le
                // handle transport est perdu, la session ne peut continuer
                self.finalize_stop(StopReason::Transport("voice task failed".to_string()));
                return;
            }
        }

        let pending = self.after_cancel.take();
        if let Some(AfterCancel::Stop(reason)) = pending {
            self.finalize_stop(reason);
            return;
        }

        match end {
            TrackEnd::Completed => {
                let title = entry.title().to_string();
                debug!(destination = %self.destination, title = %title, "Track completed");
                self.emit(PlayerEvent::TrackFinished { title });

                // Re-enfilage selon le mode loop, descripteur conservé
                match self.loop_mode {
                    LoopMode::Track => self.queue.push_front(entry),
                    LoopMode::Queue => self.queue.push_back(entry),
                    LoopMode::Off => {}
                }
                self.begin_next();
            }
            TrackEnd::Pipeline(e) => {
                self.emit(PlayerEvent::TrackSkipped {
                    title: entry.title().to_string(),
                    reason: e.to_string(),
                });
                self.begin_next();
            }
            TrackEnd::Transport(e) => {
                // Fatal pour la session : arrêt involontaire, sans retry
                warn!(destination = %self.destination, error = %e, "Transport failed");
                self.set_state(PlaybackState::Stopping);
                self.finalize_stop(StopReason::Transport(e.to_string()));
            }
            TrackEnd::Cancelled => self.begin_next(),
        }
    }

    fn finalize_stop(&mut self, reason: StopReason) {
        let discarded = self.queue.clear();
        if discarded > 0 {
            debug!(
                destination = %self.destination,
                discarded = discarded,
                "Queue discarded on stop"
            );
        }

        // Libération du handle transport
        self.sink = None;
        self.activity = Activity::Idle;

        if self.state != PlaybackState::Stopping {
            self.set_state(PlaybackState::Stopping);
        }
        self.set_state(PlaybackState::Stopped);

        self.emit(PlayerEvent::Stopped {
            reason: reason.clone(),
        });
        let _ = self.evictions.send(self.destination);
        info!(destination = %self.destination, reason = %reason, "Session stopped");
    }

    fn snapshot(&self) -> SessionSnapshot {
        let now_playing = match &self.activity {
            Activity::Playing(active) => {
                active.entry.descriptor.clone().map(|descriptor| NowPlaying {
                    descriptor,
                    requested_by: active.entry.requested_by.clone(),
                    elapsed: Duration::from_micros(active.elapsed_us.load(Ordering::Relaxed)),
                })
            }
            _ => None,
        };

        SessionSnapshot {
            state: self.state,
            loop_mode: self.loop_mode,
            volume: self.volume.gain(),
            now_playing,
            queue: self.queue.snapshot(),
            idle_for: self.idle_since.map(|since| since.elapsed()),
        }
    }
}

/// Handle public d'une session de lecture
///
/// Clonable à volonté via `Arc` ; toutes les opérations passent par le
/// channel de commandes du worker, sauf le volume (atomique, sans effet
/// sur l'ordonnancement des frames).
pub struct Session {
    destination: DestinationId,
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<PlayerEvent>,
    volume: VolumeControl,
}

impl Session {
    pub(crate) fn spawn(params: SessionParams) -> Arc<Session> {
        let (tx, rx) = mpsc::channel(32);
        let (events, _) = broadcast::channel(64);

        let worker = SessionWorker {
            destination: params.destination,
            rx,
            queue: TrackQueue::new(),
            state: PlaybackState::Idle,
            loop_mode: LoopMode::Off,
            resolver: params.resolver,
            factory: params.factory,
            volume: params.volume.clone(),
            sink: Some(params.sink),
            events: events.clone(),
            evictions: params.evictions,
            activity: Activity::Idle,
            after_cancel: None,
            idle_since: Some(Instant::now()),
        };
        tokio::spawn(worker.run());

        Arc::new(Session {
            destination: params.destination,
            tx,
            events,
            volume: params.volume,
        })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> std::result::Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Terminated)?;
        reply_rx.await.map_err(|_| SessionError::Terminated)
    }

    /// Destination vocale de cette session
    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    /// S'abonne aux évènements de lecture
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Enfile des entrées ; retourne la profondeur de la queue
    ///
    /// Valide dans tout état non terminal ; une session inactive démarre
    /// immédiatement la première entrée.
    pub async fn enqueue(&self, entries: Vec<QueueEntry>) -> Result<usize> {
        self.request(|reply| Command::Enqueue { entries, reply })
            .await?
    }

    /// Enfile une référence brute, résolue au lancement
    pub async fn enqueue_reference(
        &self,
        reference: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Result<usize> {
        self.enqueue(vec![QueueEntry::new(reference, requested_by)])
            .await
    }

    /// Enfile des descripteurs déjà résolus, dans l'ordre fourni
    pub async fn enqueue_resolved(
        &self,
        descriptors: Vec<MediaDescriptor>,
        requested_by: impl Into<String>,
    ) -> Result<usize> {
        let requested_by = requested_by.into();
        let entries = descriptors
            .into_iter()
            .map(|d| QueueEntry::resolved(d, requested_by.clone()))
            .collect();
        self.enqueue(entries).await
    }

    /// Suspend la lecture ; la production amont se fige par backpressure
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    /// Reprend la lecture au même offset
    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    /// Abandonne la piste en cours et passe à la suivante
    pub async fn skip(&self) -> Result<()> {
        self.request(|reply| Command::Skip { reply }).await?
    }

    /// Arrête la session : queue vidée, pipeline et transport libérés
    ///
    /// Idempotent ; la session devient terminale et sera évincée. Arrêter
    /// une session déjà terminée est un no-op, pas une erreur.
    pub async fn stop(&self) -> Result<()> {
        match self.stop_with(StopReason::Requested).await {
            Err(SessionError::Terminated) => Ok(()),
            other => other,
        }
    }

    pub(crate) async fn stop_with(&self, reason: StopReason) -> Result<()> {
        self.request(|reply| Command::Stop { reason, reply })
            .await?
    }

    /// Change la politique de répétition
    pub async fn set_loop(&self, mode: LoopMode) -> Result<()> {
        self.request(|reply| Command::SetLoop { mode, reply })
            .await?
    }

    /// Vide la queue sans toucher à la piste en cours
    pub async fn clear(&self) -> Result<usize> {
        self.request(|reply| Command::Clear { reply }).await?
    }

    /// Retire une plage inclusive d'entrées (0-based)
    pub async fn remove_range(&self, start: usize, end: usize) -> Result<Vec<QueueEntry>> {
        self.request(|reply| Command::Remove { start, end, reply })
            .await?
    }

    /// Déplace une entrée dans la queue (0-based)
    pub async fn move_entry(&self, src: usize, dest: usize) -> Result<()> {
        self.request(|reply| Command::MoveEntry { src, dest, reply })
            .await?
    }

    /// Mélange la queue ; retourne le nombre d'entrées mélangées
    pub async fn shuffle(&self) -> Result<usize> {
        self.request(|reply| Command::Shuffle { reply }).await?
    }

    /// Vue instantanée de l'état de la session
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Gain linéaire courant
    pub fn volume(&self) -> f32 {
        self.volume.gain()
    }

    /// Modifie le gain (clampé) ; effet immédiat sur l'encodeur
    pub fn set_volume(&self, gain: f32) {
        self.volume.set(gain);
    }
}
