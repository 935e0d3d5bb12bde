//! Étage d'encodage : PCM normalisé → frames opus de durée fixe
//!
//! Accumule les blocs PCM jusqu'à obtenir des fenêtres d'exactement
//! `samples_per_frame` échantillons, applique le gain de la session, puis
//! encode chaque fenêtre en une [`FramePacket`]. La dernière fenêtre
//! partielle est complétée de silence en fin de piste.

use crate::error::PipelineError;
use crate::frame::{FrameFormat, FramePacket, PcmBlock};
use crate::volume::VolumeControl;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Taille maximale recommandée d'un paquet opus encodé
const MAX_OPUS_PACKET: usize = 4000;

/// Applique un gain linéaire en place, avec écrêtage doux dans `[-1, 1]`
pub(crate) fn apply_gain(frames: &mut [[f32; 2]], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for frame in frames {
        frame[0] = (frame[0] * gain).clamp(-1.0, 1.0);
        frame[1] = (frame[1] * gain).clamp(-1.0, 1.0);
    }
}

/// Encodeur de frames à fenêtrage fixe
pub(crate) struct FrameEncoder {
    format: FrameFormat,
    encoder: opus::Encoder,
    pending: Vec<[f32; 2]>,
    interleaved: Vec<f32>,
    out_buf: Vec<u8>,
    sequence: u64,
    volume: VolumeControl,
}

impl FrameEncoder {
    pub(crate) fn new(format: FrameFormat, volume: VolumeControl) -> Result<Self, PipelineError> {
        let mut encoder = opus::Encoder::new(
            format.sample_rate,
            opus::Channels::Stereo,
            opus::Application::Audio,
        )
        .map_err(|e| PipelineError::Transcode(format!("opus encoder init failed: {e}")))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(format.bitrate as i32))
            .map_err(|e| PipelineError::Transcode(format!("opus bitrate rejected: {e}")))?;

        let samples = format.samples_per_frame();
        Ok(Self {
            format,
            encoder,
            pending: Vec::with_capacity(samples * 2),
            interleaved: vec![0.0; samples * 2],
            out_buf: vec![0u8; MAX_OPUS_PACKET],
            sequence: 0,
            volume,
        })
    }

    /// Nombre de frames complètes émises jusqu'ici
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    fn encode_window(&mut self) -> Result<FramePacket, PipelineError> {
        let samples = self.format.samples_per_frame();
        for (i, frame) in self.pending.drain(..samples).enumerate() {
            self.interleaved[2 * i] = frame[0];
            self.interleaved[2 * i + 1] = frame[1];
        }

        let len = self
            .encoder
            .encode_float(&self.interleaved, &mut self.out_buf)
            .map_err(|e| PipelineError::Transcode(format!("opus encode failed: {e}")))?;

        let packet = FramePacket {
            data: Bytes::copy_from_slice(&self.out_buf[..len]),
            sequence: self.sequence,
            duration: self.format.frame_duration,
        };
        self.sequence += 1;
        Ok(packet)
    }

    /// Accumule un bloc et retourne les frames complètes produites
    pub(crate) fn push(&mut self, mut block: PcmBlock) -> Result<Vec<FramePacket>, PipelineError> {
        apply_gain(&mut block.frames, self.volume.gain());
        self.pending.extend_from_slice(&block.frames);

        let samples = self.format.samples_per_frame();
        let mut packets = Vec::new();
        while self.pending.len() >= samples {
            packets.push(self.encode_window()?);
        }
        Ok(packets)
    }

    /// Encode la fenêtre partielle restante, complétée de silence
    pub(crate) fn finish(&mut self) -> Result<Option<FramePacket>, PipelineError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let samples = self.format.samples_per_frame();
        self.pending.resize(samples, [0.0, 0.0]);
        Ok(Some(self.encode_window()?))
    }
}

/// Boucle d'encodage
pub(crate) async fn run_encode(
    mut rx: mpsc::Receiver<PcmBlock>,
    tx: mpsc::Sender<FramePacket>,
    format: FrameFormat,
    volume: VolumeControl,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    let mut encoder = FrameEncoder::new(format, volume)?;

    loop {
        let block = tokio::select! {
            _ = token.cancelled() => {
                debug!("Encode cancelled");
                return Ok(());
            }
            result = rx.recv() => {
                match result {
                    Some(block) => block,
                    None => break,
                }
            }
        };

        for packet in encoder.push(block)? {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Encode cancelled");
                    return Ok(());
                }
                result = tx.send(packet) => {
                    if result.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    // Fin de piste : flusher la fenêtre partielle
    if let Some(packet) = encoder.finish()? {
        let _ = tx.send(packet).await;
    }

    debug!(frames = encoder.sequence(), "Encode complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn format() -> FrameFormat {
        FrameFormat {
            sample_rate: 48_000,
            frame_duration: Duration::from_millis(20),
            bitrate: 96_000,
        }
    }

    fn sine_block(frames: usize) -> PcmBlock {
        let samples = (0..frames)
            .map(|i| {
                let s = (i as f32 * 440.0 * std::f32::consts::TAU / 48_000.0).sin() * 0.5;
                [s, s]
            })
            .collect();
        PcmBlock::new(samples, 48_000)
    }

    #[test]
    fn test_apply_gain_scales_and_clamps() {
        let mut frames = vec![[0.5, -0.5], [0.9, -0.9]];
        apply_gain(&mut frames, 2.0);
        assert_eq!(frames[0], [1.0, -1.0]);
        assert_eq!(frames[1], [1.0, -1.0]);
    }

    #[test]
    fn test_unit_gain_leaves_samples_untouched() {
        let mut frames = vec![[0.25, -0.25]];
        apply_gain(&mut frames, 1.0);
        assert_eq!(frames, vec![[0.25, -0.25]]);
    }

    #[test]
    fn test_encoder_emits_dense_sequence() {
        let mut encoder = FrameEncoder::new(format(), VolumeControl::default()).unwrap();

        // 2.5 frames de 960 échantillons
        let packets = encoder.push(sine_block(2400)).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].sequence, 0);
        assert_eq!(packets[1].sequence, 1);
        assert_eq!(packets[0].duration, Duration::from_millis(20));
        assert!(!packets[0].data.is_empty());

        // Le reliquat est complété de silence
        let last = encoder.finish().unwrap().expect("partial window pending");
        assert_eq!(last.sequence, 2);

        assert!(encoder.finish().unwrap().is_none(), "flush is idempotent");
    }

    #[test]
    fn test_encoder_exact_multiple_has_no_remainder() {
        let mut encoder = FrameEncoder::new(format(), VolumeControl::default()).unwrap();
        let packets = encoder.push(sine_block(1920)).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(encoder.finish().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_encode_end_to_end() {
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_encode(
            in_rx,
            out_tx,
            format(),
            VolumeControl::default(),
            token,
        ));

        // Une seconde exacte de PCM : 50 frames de 20 ms
        in_tx.send(sine_block(48_000)).await.unwrap();
        drop(in_tx);

        let mut frames = Vec::new();
        while let Some(frame) = out_rx.recv().await {
            frames.push(frame);
        }

        handle.await.unwrap().unwrap();
        assert_eq!(frames.len(), 50);
        assert_eq!(frames.last().unwrap().sequence, 49);
    }
}
