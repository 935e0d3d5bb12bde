//! Étage de resampling : normalise le sample rate vers le format cible
//!
//! Le resampling est effectué via libsoxr. Les blocs déjà au bon sample
//! rate sont passés tels quels ; le resampler est recréé quand le rate de
//! la source change en cours de flux.

use crate::error::PipelineError;
use crate::frame::PcmBlock;
use soxr::format::Stereo;
use soxr::params::{QualityRecipe, QualitySpec, RuntimeSpec};
use soxr::Soxr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(crate) struct Resampler {
    source_hz: f64,
    dest_hz: f64,
    soxr: Soxr<Stereo<f32>>,
}

pub(crate) fn build_resampler(source_hz: u32, dest_hz: u32) -> Result<Resampler, PipelineError> {
    let quality = QualitySpec::new(QualityRecipe::high());
    let rt = RuntimeSpec::default();

    let soxr = Soxr::<Stereo<f32>>::new_with_params(source_hz as f64, dest_hz as f64, quality, rt)
        .map_err(|e| PipelineError::Transcode(format!("resampler init failed: {e}")))?;

    Ok(Resampler {
        source_hz: source_hz as f64,
        dest_hz: dest_hz as f64,
        soxr,
    })
}

pub(crate) fn resample(
    resampler: &mut Resampler,
    input: &[[f32; 2]],
) -> Result<Vec<[f32; 2]>, PipelineError> {
    let output_len =
        ((input.len() as f64) * resampler.dest_hz / resampler.source_hz).ceil() as usize;
    let mut output = vec![[0.0f32; 2]; output_len];

    resampler
        .soxr
        .process(input, &mut output)
        .map_err(|e| PipelineError::Transcode(format!("resampling failed: {e}")))?;

    Ok(output)
}

struct ResamplerState {
    source_hz: u32,
    resampler: Resampler,
}

/// Boucle de normalisation du sample rate
pub(crate) async fn run_resample(
    mut rx: mpsc::Receiver<PcmBlock>,
    tx: mpsc::Sender<PcmBlock>,
    target_rate: u32,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    let mut state: Option<ResamplerState> = None;

    loop {
        let block = tokio::select! {
            _ = token.cancelled() => {
                debug!("Resample cancelled");
                return Ok(());
            }
            result = rx.recv() => {
                match result {
                    Some(block) => block,
                    None => break,
                }
            }
        };

        let output = if block.sample_rate == target_rate {
            block
        } else {
            let need_new = match &state {
                None => true,
                Some(s) => s.source_hz != block.sample_rate,
            };
            if need_new {
                debug!(
                    "Creating resampler {}Hz -> {}Hz",
                    block.sample_rate, target_rate
                );
                state = Some(ResamplerState {
                    source_hz: block.sample_rate,
                    resampler: build_resampler(block.sample_rate, target_rate)?,
                });
            }
            let s = state.as_mut().expect("resampler state just created");
            let frames = resample(&mut s.resampler, &block.frames)?;
            PcmBlock::new(frames, target_rate)
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!("Resample cancelled");
                return Ok(());
            }
            result = tx.send(output) => {
                if result.is_err() {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}
