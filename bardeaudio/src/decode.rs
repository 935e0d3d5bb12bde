//! Étage de décodage : octets compressés → PCM stéréo f32
//!
//! Le décodage est effectué par symphonia dans une task bloquante dédiée,
//! alimentée par le channel d'octets de l'étage de fetch via un adaptateur
//! [`std::io::Read`]. Le flux est traité incrémentalement, jamais bufferisé
//! en entier.
//!
//! La reprise à un offset ("seek") est implémentée ici : les échantillons
//! décodés avant l'offset demandé sont comptés puis jetés, jamais émis.

use crate::error::PipelineError;
use crate::frame::PcmBlock;
use bytes::{Buf, Bytes};
use std::io::Read;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Adaptateur `Read` bloquant au-dessus du channel d'octets
///
/// `read` retourne 0 (EOF) quand le fetch a terminé ou que le pipeline est
/// annulé ; symphonia voit alors une fin de flux ordinaire.
struct ChannelReader {
    rx: mpsc::Receiver<Bytes>,
    current: Bytes,
    token: CancellationToken,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<Bytes>, token: CancellationToken) -> Self {
        Self {
            rx,
            current: Bytes::new(),
            token,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.current.is_empty() {
            if self.token.is_cancelled() {
                return Ok(0);
            }
            match self.rx.blocking_recv() {
                Some(bytes) => self.current = bytes,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

/// Convertit un buffer interleavé en paires stéréo
///
/// Mono est dupliqué sur les deux canaux ; au-delà de deux canaux, seuls
/// les deux premiers sont conservés.
fn interleaved_to_pairs(samples: &[f32], channels: usize) -> Vec<[f32; 2]> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().map(|&s| [s, s]).collect(),
        n => samples.chunks_exact(n).map(|c| [c[0], c[1]]).collect(),
    }
}

/// Boucle de décodage (à exécuter dans `spawn_blocking`)
pub(crate) fn run_decode(
    rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<PcmBlock>,
    extension: Option<String>,
    offset: Option<Duration>,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    let reader = ChannelReader::new(rx, token.clone());
    let source = ReadOnlySource::new(reader);
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension.as_deref() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PipelineError::Transcode(format!("unrecognized stream format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PipelineError::Transcode("no audio track in stream".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PipelineError::Transcode(format!("unsupported codec: {e}")))?;

    debug!(track_id = track_id, offset = ?offset, "Decode started");

    // Échantillons restant à jeter avant l'offset demandé
    let mut to_skip: Option<u64> = None;
    let mut emitted: u64 = 0;

    loop {
        if token.is_cancelled() {
            debug!("Decode cancelled");
            return Ok(());
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(PipelineError::Transcode(format!("demux error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Paquet isolé corrompu : on continue sur le suivant
                warn!("Skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(PipelineError::Transcode(format!("decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let sample_rate = spec.rate;

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let mut frames = interleaved_to_pairs(sample_buf.samples(), channels);

        if frames.is_empty() {
            continue;
        }

        // Première frame décodée : convertir l'offset en échantillons
        if to_skip.is_none() {
            to_skip = Some(
                offset
                    .map(|o| (o.as_secs_f64() * sample_rate as f64) as u64)
                    .unwrap_or(0),
            );
        }

        if let Some(skip) = to_skip.as_mut() {
            if *skip > 0 {
                let len = frames.len() as u64;
                if len <= *skip {
                    *skip -= len;
                    continue;
                }
                frames.drain(..*skip as usize);
                *skip = 0;
            }
        }

        emitted += frames.len() as u64;
        trace!(frames = frames.len(), rate = sample_rate, "PCM block decoded");

        if tx
            .blocking_send(PcmBlock::new(frames, sample_rate))
            .is_err()
        {
            // L'aval a disparu (annulation ou erreur déjà signalée)
            return Ok(());
        }
    }

    debug!(emitted = emitted, "Decode complete");
    Ok(())
}
