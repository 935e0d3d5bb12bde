//! Erreurs du pipeline de transcodage et du sink

use bardesource::SourceKind;
use std::time::Duration;

/// Erreurs possibles dans le pipeline de transcodage
///
/// Une erreur de pipeline termine la piste en cours, jamais la session :
/// c'est le moteur de session qui décide de passer à l'entrée suivante.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// La source d'octets n'a rien fourni pendant le délai configuré
    #[error("source stalled: no data within {0:?}")]
    SourceStalled(Duration),

    /// Échec de la récupération du flux (connexion, status HTTP)
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Échec de décodage ou d'encodage (flux corrompu, codec non supporté)
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// La source ne permet pas la reprise à un offset
    #[error("seek not supported for {0}")]
    SeekUnsupported(SourceKind),

    /// Un étage du pipeline a disparu prématurément
    #[error("pipeline stage terminated unexpectedly")]
    ChannelClosed,
}

/// Erreurs du transport sortant
///
/// Distinctes des erreurs de pipeline : une [`SinkError`] est fatale pour
/// la session (le transport est injoignable), là où une fin de piste
/// normale n'est pas une erreur du tout.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// La destination est injoignable
    #[error("transport error: {0}")]
    Transport(String),

    /// Le transport a été fermé côté distant
    #[error("transport closed")]
    Closed,
}
