//! Évènements de lecture diffusés par une session
//!
//! C'est la surface de notification de la couche de commande externe : les
//! évènements portent le titre et la nature de l'erreur, jamais de
//! diagnostic interne brut.

/// Raison d'un arrêt de session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Arrêt demandé par la couche de commande
    Requested,
    /// Le transport vocal est devenu injoignable (arrêt involontaire)
    Transport(String),
    /// Session inactive évincée par le registre
    IdleEvicted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Requested => write!(f, "requested"),
            StopReason::Transport(e) => write!(f, "transport error: {e}"),
            StopReason::IdleEvicted => write!(f, "idle eviction"),
        }
    }
}

/// Évènement de lecture d'une session
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Une piste démarre
    TrackStarted {
        title: String,
        requested_by: String,
    },
    /// La piste en cours s'est terminée normalement
    TrackFinished { title: String },
    /// Une entrée a été écartée suite à un échec (skip-on-error)
    TrackSkipped { title: String, reason: String },
    /// La queue est épuisée, la session redevient inactive
    QueueFinished,
    /// La session s'est arrêtée ; elle sera évincée du registre
    Stopped { reason: StopReason },
}
