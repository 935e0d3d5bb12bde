//! Types de données transitant dans le pipeline
//!
//! Deux granularités coexistent :
//! - [`PcmBlock`] : bloc de PCM stéréo f32 de taille variable, échangé entre
//!   les étages internes (décodage, resampling) ;
//! - [`FramePacket`] : frame encodée de durée fixe, produit final du
//!   pipeline, consommée par le sink.

use bytes::Bytes;
use std::time::Duration;

/// Format cible du transport vocal
///
/// Fixé une fois à la construction du pipeline (valeurs de configuration),
/// jamais négocié par appel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Fréquence d'échantillonnage cible (Hz)
    pub sample_rate: u32,
    /// Durée de présentation d'une frame
    pub frame_duration: Duration,
    /// Débit de l'encodeur opus (bit/s)
    pub bitrate: u32,
}

impl FrameFormat {
    /// Construit le format depuis la configuration globale
    pub fn from_config() -> Self {
        let config = bardeconfig::get_config();
        Self {
            sample_rate: config.get_sample_rate(),
            frame_duration: config.frame_duration(),
            bitrate: config.get_bitrate(),
        }
    }

    /// Nombre d'échantillons par canal dans une frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration.as_millis() as u64 / 1000) as usize
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_duration: Duration::from_millis(20),
            bitrate: 96_000,
        }
    }
}

/// Bloc de PCM stéréo flottant
///
/// Les échantillons sont des paires `[gauche, droite]` normalisées dans
/// `[-1.0, 1.0]`. Un bloc porte son propre sample rate : les étages amont
/// émettent au rate de la source, le resampler normalise.
#[derive(Debug, Clone)]
pub struct PcmBlock {
    /// Paires d'échantillons stéréo
    pub frames: Vec<[f32; 2]>,
    /// Fréquence d'échantillonnage de ce bloc (Hz)
    pub sample_rate: u32,
}

impl PcmBlock {
    pub fn new(frames: Vec<[f32; 2]>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    /// Durée du bloc
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames.len() as f64 / self.sample_rate as f64)
    }
}

/// Frame audio encodée, prête pour le transport temps réel
///
/// Transitoire : produite et consommée dans un seul passage de pipeline,
/// jamais persistée.
#[derive(Debug, Clone)]
pub struct FramePacket {
    /// Octets encodés (opaque pour le sink)
    pub data: Bytes,
    /// Numéro de séquence, dense à partir de 0
    pub sequence: u64,
    /// Durée de présentation
    pub duration: Duration,
}
