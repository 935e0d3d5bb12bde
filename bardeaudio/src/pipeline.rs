//! Assemblage du pipeline de transcodage
//!
//! `open()` câble les quatre étages (fetch → decode → resample → encode)
//! sur des channels bornés partageant un même `CancellationToken`, et
//! retourne une [`FrameSource`] : séquence paresseuse, finie et non
//! redémarrable de [`FramePacket`].
//!
//! # Arrêt coordonné
//!
//! - **Descendant** : `token.cancel()` propage l'arrêt à tous les étages
//! - **Montant** : un étage en erreur dépose son erreur dans le slot
//!   d'erreur puis cancel ; les autres étages se terminent proprement
//! - **Annulation volontaire** : `FrameSource::cancel()` (ou son drop)
//!   n'enregistre aucune erreur — l'appelant sait qu'il a annulé
//!
//! # Backpressure
//!
//! Tous les channels inter-étages sont bornés (`audio.channel_size`). Un
//! consommateur à l'arrêt suspend la production jusqu'à l'étage de fetch,
//! sans jamais accumuler plus que la profondeur des channels.

use crate::decode::run_decode;
use crate::encode::run_encode;
use crate::error::PipelineError;
use crate::fetch::run_fetch;
use crate::frame::{FrameFormat, FramePacket};
use crate::resample::run_resample;
use crate::volume::VolumeControl;
use async_trait::async_trait;
use bardesource::MediaDescriptor;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Options d'ouverture d'une piste
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Position de départ dans la piste (reprise après pause, seek)
    pub offset: Option<Duration>,
}

/// Fabrique de sources de frames
///
/// Seam d'injection pour le moteur de sessions : l'implémentation standard
/// est [`TranscodePipeline`], les tests fournissent des fabriques factices.
#[async_trait]
pub trait FrameSourceFactory: Send + Sync {
    /// Ouvre une piste et retourne sa séquence de frames
    async fn open(
        &self,
        descriptor: &MediaDescriptor,
        options: OpenOptions,
    ) -> Result<FrameSource, PipelineError>;
}

/// Séquence paresseuse de frames encodées pour une piste
///
/// Non redémarrable : une fois épuisée ou annulée, il faut rouvrir la
/// piste via la fabrique. Le drop annule le pipeline et libère la
/// connexion réseau sous-jacente.
pub struct FrameSource {
    rx: mpsc::Receiver<FramePacket>,
    err_rx: mpsc::Receiver<PipelineError>,
    token: CancellationToken,
}

impl FrameSource {
    /// Construit une source depuis des canaux externes
    ///
    /// Réservé aux sources hors pipeline standard et aux tests.
    pub fn from_parts(
        rx: mpsc::Receiver<FramePacket>,
        err_rx: mpsc::Receiver<PipelineError>,
        token: CancellationToken,
    ) -> Self {
        Self { rx, err_rx, token }
    }

    /// Frame suivante
    ///
    /// - `Ok(Some(frame))` : frame disponible
    /// - `Ok(None)` : fin de piste normale, ou annulation volontaire
    /// - `Err(e)` : le pipeline a échoué ; la séquence est terminée
    pub async fn next_frame(&mut self) -> Result<Option<FramePacket>, PipelineError> {
        match self.rx.recv().await {
            Some(frame) => Ok(Some(frame)),
            None => match self.err_rx.try_recv() {
                Ok(err) => Err(err),
                Err(_) => Ok(None),
            },
        }
    }

    /// Annule le pipeline ; les étages se terminent promptement
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token d'annulation partagé par les étages
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Pipeline de transcodage d'une session
///
/// Une instance par session : elle porte le format cible et le contrôle de
/// gain partagés par toutes les pistes de la session.
///
/// # Exemple
///
/// ```no_run
/// use bardeaudio::{FrameSourceFactory, OpenOptions, TranscodePipeline};
/// use bardesource::MediaDescriptor;
///
/// # async fn example(descriptor: MediaDescriptor) -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = TranscodePipeline::from_config();
/// let mut source = pipeline.open(&descriptor, OpenOptions::default()).await?;
///
/// while let Some(frame) = source.next_frame().await? {
///     println!("frame #{} ({} octets)", frame.sequence, frame.data.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct TranscodePipeline {
    format: FrameFormat,
    channel_size: usize,
    stall_timeout: Duration,
    volume: VolumeControl,
}

impl TranscodePipeline {
    /// Crée un pipeline avec des paramètres explicites
    pub fn new(
        format: FrameFormat,
        channel_size: usize,
        stall_timeout: Duration,
        volume: VolumeControl,
    ) -> Self {
        Self {
            format,
            channel_size: channel_size.max(1),
            stall_timeout,
            volume,
        }
    }

    /// Crée un pipeline depuis la configuration globale
    pub fn from_config() -> Self {
        let config = bardeconfig::get_config();
        Self::new(
            FrameFormat::from_config(),
            config.get_channel_size(),
            config.stall_timeout(),
            VolumeControl::from_config(),
        )
    }

    /// Handle de contrôle du gain de ce pipeline
    pub fn volume(&self) -> VolumeControl {
        self.volume.clone()
    }

    /// Format cible de ce pipeline
    pub fn format(&self) -> FrameFormat {
        self.format
    }
}

/// Extension de fichier de l'URL, comme indice de format pour le probe
fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Spawn un étage : en cas d'erreur, dépose l'erreur et cancel le pipeline
fn spawn_stage<F>(
    stage: F,
    err_tx: mpsc::Sender<PipelineError>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = Result<(), PipelineError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = stage.await {
            if !token.is_cancelled() {
                debug!("Pipeline stage failed: {e}");
                let _ = err_tx.try_send(e);
                token.cancel();
            }
        }
    })
}

#[async_trait]
impl FrameSourceFactory for TranscodePipeline {
    async fn open(
        &self,
        descriptor: &MediaDescriptor,
        options: OpenOptions,
    ) -> Result<FrameSource, PipelineError> {
        if options.offset.is_some() && !descriptor.seekable() {
            return Err(PipelineError::SeekUnsupported(descriptor.kind));
        }

        info!(
            title = %descriptor.title,
            kind = %descriptor.kind,
            offset = ?options.offset,
            "Opening transcode pipeline"
        );

        let token = CancellationToken::new();
        let (bytes_tx, bytes_rx) = mpsc::channel(self.channel_size);
        let (pcm_tx, pcm_rx) = mpsc::channel(self.channel_size);
        let (norm_tx, norm_rx) = mpsc::channel(self.channel_size);
        let (frame_tx, frame_rx) = mpsc::channel(self.channel_size);
        let (err_tx, err_rx) = mpsc::channel(4);

        spawn_stage(
            run_fetch(
                descriptor.stream_url.clone(),
                self.stall_timeout,
                bytes_tx,
                token.clone(),
            ),
            err_tx.clone(),
            token.clone(),
        );

        let hint = extension_hint(&descriptor.stream_url);
        let offset = options.offset;
        let decode_token = token.clone();
        spawn_stage(
            async move {
                tokio::task::spawn_blocking(move || {
                    run_decode(bytes_rx, pcm_tx, hint, offset, decode_token)
                })
                .await
                .map_err(|e| PipelineError::Transcode(format!("decode task panicked: {e}")))?
            },
            err_tx.clone(),
            token.clone(),
        );

        spawn_stage(
            run_resample(pcm_rx, norm_tx, self.format.sample_rate, token.clone()),
            err_tx.clone(),
            token.clone(),
        );

        spawn_stage(
            run_encode(
                norm_rx,
                frame_tx,
                self.format,
                self.volume.clone(),
                token.clone(),
            ),
            err_tx,
            token.clone(),
        );

        Ok(FrameSource::from_parts(frame_rx, err_rx, token))
    }
}
