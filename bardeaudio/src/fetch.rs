//! Étage de récupération des octets du média
//!
//! Télécharge le flux en streaming (jamais de buffering complet) et pousse
//! les chunks bruts vers l'étage de décodage via un channel borné. Le
//! backpressure du channel suspend naturellement la lecture réseau quand
//! l'aval ne consomme plus.

use crate::error::PipelineError;
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Boucle de téléchargement d'un flux HTTP
///
/// Chaque attente de chunk est bornée par `stall_timeout` : une source qui
/// ne fournit plus rien fait échouer la piste avec
/// [`PipelineError::SourceStalled`]. L'attente d'espace dans le channel de
/// sortie n'est pas bornée : c'est le backpressure voulu.
pub(crate) async fn run_fetch(
    url: String,
    stall_timeout: Duration,
    tx: mpsc::Sender<Bytes>,
    token: CancellationToken,
) -> Result<(), PipelineError> {
    let response = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        result = tokio::time::timeout(stall_timeout, reqwest::get(&url)) => {
            match result {
                Err(_) => return Err(PipelineError::SourceStalled(stall_timeout)),
                Ok(response) => response.map_err(|e| {
                    PipelineError::Fetch(format!("request failed for {url}: {e}"))
                })?,
            }
        }
    };

    if !response.status().is_success() {
        return Err(PipelineError::Fetch(format!(
            "request returned status {}: {url}",
            response.status()
        )));
    }

    debug!(url = %url, "Fetch started");
    let mut stream = response.bytes_stream();
    let mut total: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => {
                debug!(url = %url, bytes = total, "Fetch cancelled");
                return Ok(());
            }
            result = tokio::time::timeout(stall_timeout, stream.next()) => {
                match result {
                    Err(_) => return Err(PipelineError::SourceStalled(stall_timeout)),
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        return Err(PipelineError::Fetch(format!("stream error: {e}")))
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                }
            }
        };

        total += chunk.len() as u64;
        tokio::select! {
            _ = token.cancelled() => {
                debug!(url = %url, bytes = total, "Fetch cancelled");
                return Ok(());
            }
            result = tx.send(chunk) => {
                if result.is_err() {
                    // L'étage de décodage a disparu ; l'erreur réelle est déjà signalée
                    return Err(PipelineError::ChannelClosed);
                }
            }
        }
    }

    debug!(url = %url, bytes = total, "Fetch complete");
    Ok(())
}
