//! Registre des sessions par destination
//!
//! Le registre est le seul état partagé entre sessions : une map
//! destination → session gardée par un `RwLock`. La création est atomique
//! (un seul write lock) : deux demandes concurrentes pour la même
//! destination reçoivent la même session, jamais deux.
//!
//! Une task de maintenance ("reaper") retire les sessions terminées et
//! évince les sessions restées inactives au-delà du délai configuré.

use crate::events::StopReason;
use crate::session::{DestinationId, Session, SessionParams};
use crate::state::PlaybackState;
use bardeaudio::{FrameSink, FrameSourceFactory, TranscodePipeline, VolumeControl};
use bardesource::TrackResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Fabrique du pipeline d'une nouvelle session
///
/// Chaque session reçoit son propre pipeline (et donc son propre contrôle
/// de gain) ; le builder est appelé sous le write lock de création.
pub type PipelineBuilder =
    Arc<dyn Fn() -> (Arc<dyn FrameSourceFactory>, VolumeControl) + Send + Sync>;

type SessionMap = Arc<RwLock<HashMap<DestinationId, Arc<Session>>>>;

/// Registre process-wide des sessions de lecture
///
/// # Exemple
///
/// ```no_run
/// use bardesession::{DestinationId, SessionRegistry};
/// use bardesource::{HttpCatalog, Resolver};
/// use std::sync::Arc;
///
/// # async fn example(sink: Box<dyn bardeaudio::FrameSink + Send>) -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = Arc::new(HttpCatalog::from_config()?);
/// let resolver = Arc::new(Resolver::from_config(catalog));
/// let registry = SessionRegistry::from_config(resolver);
///
/// let destination = DestinationId::new(42, 7);
/// let session = registry.get_or_create(destination, move || sink).await;
/// session.enqueue_reference("around the world", "someone").await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionRegistry {
    sessions: SessionMap,
    resolver: Arc<dyn TrackResolver>,
    pipelines: PipelineBuilder,
    evict_tx: mpsc::UnboundedSender<DestinationId>,
    reaper_cancel: CancellationToken,
    cancel_grace: Duration,
}

impl SessionRegistry {
    /// Crée un registre avec des délais explicites
    ///
    /// `cancel_grace` borne l'attente d'un arrêt de session lors d'un
    /// [`remove`](Self::remove) ; une session récalcitrante est détachée
    /// sans bloquer l'appelant.
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        pipelines: PipelineBuilder,
        idle_timeout: Duration,
        cancel_grace: Duration,
    ) -> Arc<Self> {
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));
        let (evict_tx, evict_rx) = mpsc::unbounded_channel();
        let reaper_cancel = CancellationToken::new();

        tokio::spawn(run_reaper(
            sessions.clone(),
            evict_rx,
            idle_timeout,
            reaper_cancel.clone(),
        ));

        Arc::new(Self {
            sessions,
            resolver,
            pipelines,
            evict_tx,
            reaper_cancel,
            cancel_grace,
        })
    }

    /// Crée un registre depuis la configuration globale
    ///
    /// Le pipeline de chaque session est un [`TranscodePipeline`] construit
    /// sur la configuration.
    pub fn from_config(resolver: Arc<dyn TrackResolver>) -> Arc<Self> {
        let pipelines: PipelineBuilder = Arc::new(|| {
            let pipeline = TranscodePipeline::from_config();
            let volume = pipeline.volume();
            (
                Arc::new(pipeline) as Arc<dyn FrameSourceFactory>,
                volume,
            )
        });
        let config = bardeconfig::get_config();
        Self::new(
            resolver,
            pipelines,
            config.idle_eviction_timeout(),
            config.cancel_grace(),
        )
    }

    /// Retourne la session de la destination, en la créant au besoin
    ///
    /// `make_sink` n'est appelé que si une session est réellement créée :
    /// le second appelant concurrent reçoit la session déjà créée et
    /// conserve son sink.
    pub async fn get_or_create(
        &self,
        destination: DestinationId,
        make_sink: impl FnOnce() -> Box<dyn FrameSink + Send>,
    ) -> Arc<Session> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&destination) {
            return session.clone();
        }

        let (factory, volume) = (self.pipelines)();
        let session = Session::spawn(SessionParams {
            destination,
            resolver: self.resolver.clone(),
            factory,
            volume,
            sink: make_sink(),
            evictions: self.evict_tx.clone(),
        });
        sessions.insert(destination, session.clone());
        info!(destination = %destination, "Session created");
        session
    }

    /// Session existante pour une destination, s'il y en a une
    pub async fn get(&self, destination: DestinationId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&destination).cloned()
    }

    /// Retire et arrête la session d'une destination
    ///
    /// Idempotent : retirer une destination absente n'est pas une erreur.
    /// L'attente de l'arrêt est bornée par le délai de grâce : une session
    /// qui ne répond plus est détachée sans bloquer l'appelant.
    pub async fn remove(&self, destination: DestinationId) -> bool {
        let removed = self.sessions.write().await.remove(&destination);
        match removed {
            Some(session) => {
                // Best-effort : la session peut déjà être terminée
                let _ = tokio::time::timeout(self.cancel_grace, session.stop()).await;
                info!(destination = %destination, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Nombre de sessions vivantes
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.reaper_cancel.cancel();
    }
}

/// Intervalle de balayage : un quart du délai d'éviction, borné
fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).clamp(Duration::from_secs(5), Duration::from_secs(60))
}

/// Task de maintenance du registre
///
/// - retire immédiatement les sessions qui signalent leur terminaison ;
/// - balaye périodiquement les sessions inactives au-delà du délai et les
///   arrête (ce qui déclenche leur retrait par le premier mécanisme).
async fn run_reaper(
    sessions: SessionMap,
    mut evict_rx: mpsc::UnboundedReceiver<DestinationId>,
    idle_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(sweep_interval(idle_timeout));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            evicted = evict_rx.recv() => {
                match evicted {
                    Some(destination) => {
                        if sessions.write().await.remove(&destination).is_some() {
                            debug!(destination = %destination, "Terminated session evicted");
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                let candidates: Vec<Arc<Session>> =
                    sessions.read().await.values().cloned().collect();
                for session in candidates {
                    let Ok(snapshot) = session.snapshot().await else {
                        continue;
                    };
                    let expired = snapshot.state == PlaybackState::Idle
                        && snapshot.queue.is_empty()
                        && snapshot.idle_for.is_some_and(|idle| idle >= idle_timeout);
                    if expired {
                        info!(
                            destination = %session.destination(),
                            "Evicting idle session"
                        );
                        let _ = session.stop_with(StopReason::IdleEvicted).await;
                    }
                }
            }
        }
    }
}
