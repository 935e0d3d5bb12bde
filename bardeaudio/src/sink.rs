//! Abstraction du transport sortant et pacing temps réel
//!
//! Le sink est le contrat entre le pipeline et le transport vocal : il
//! accepte des frames et signale les échecs de transport — distincts d'une
//! fin de piste normale, pour que la session puisse différencier "piste
//! terminée" de "connexion perdue".
//!
//! [`PacedSink`] impose le rythme temps réel : une frame n'est jamais
//! soumise plus tôt que ne le dicte la durée de présentation cumulée des
//! frames précédentes.

use crate::error::SinkError;
use crate::frame::FramePacket;
use async_trait::async_trait;
use tokio::time::Instant;

/// Contrat du transport sortant
///
/// Les implémentations réelles enveloppent un canal vocal déjà négocié par
/// la couche gateway externe ; le moteur ne fait que livrer des frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Livre une frame au transport
    ///
    /// # Erreurs
    ///
    /// Retourne [`SinkError::Transport`] quand la destination est
    /// injoignable ; cette erreur est fatale pour la session.
    async fn accept(&mut self, frame: FramePacket) -> Result<(), SinkError>;
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink + Send> {
    async fn accept(&mut self, frame: FramePacket) -> Result<(), SinkError> {
        (**self).accept(frame).await
    }
}

/// Décorateur imposant le pacing temps réel
///
/// La première frame part immédiatement ; chaque frame suivante attend
/// l'échéance cumulée. Si le transport aval a pris du retard, l'échéance
/// est réancrée sur l'horloge courante pour ne pas rafaler.
pub struct PacedSink<S> {
    inner: S,
    next_deadline: Option<Instant>,
}

impl<S: FrameSink> PacedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            next_deadline: None,
        }
    }

    /// Récupère le sink sous-jacent
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: FrameSink + Send> FrameSink for PacedSink<S> {
    async fn accept(&mut self, frame: FramePacket) -> Result<(), SinkError> {
        let duration = frame.duration;
        match self.next_deadline {
            None => {
                self.next_deadline = Some(Instant::now() + duration);
            }
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                let now = Instant::now();
                // Réancrage si le transport a bloqué plus d'une frame
                let base = if now > deadline + duration { now } else { deadline };
                self.next_deadline = Some(base + duration);
            }
        }
        self.inner.accept(frame).await
    }
}

/// Sink de test : collecte les frames et leurs instants d'arrivée
pub struct CollectorSink {
    frames: Vec<FramePacket>,
    arrivals: Vec<Instant>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            arrivals: Vec::new(),
        }
    }

    /// Frames collectées, dans l'ordre d'arrivée
    pub fn frames(&self) -> &[FramePacket] {
        &self.frames
    }

    /// Instants d'arrivée des frames
    pub fn arrivals(&self) -> &[Instant] {
        &self.arrivals
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSink for CollectorSink {
    async fn accept(&mut self, frame: FramePacket) -> Result<(), SinkError> {
        self.frames.push(frame);
        self.arrivals.push(Instant::now());
        Ok(())
    }
}
