//! Machine à états de lecture d'une session
//!
//! L'état est un variant fermé : toute transition passe par
//! [`PlaybackState::transition`], qui rejette les transitions invalides au
//! lieu de corriger silencieusement l'état.

use crate::error::{Result, SessionError};

/// État de lecture d'une session
///
/// ```text
/// Idle → Loading → Playing ⇄ Paused
///   ↘      ↓          ↓        ↓
///    Stopping ←───────┴────────┘
///        ↓
///    Stopped (terminal)
/// ```
///
/// `Loading → Loading` et `Playing/Paused → Loading` couvrent
/// l'enchaînement des pistes (fin de piste, skip, skip-on-error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Aucune piste active, queue vide ou en attente
    Idle,
    /// Résolution et ouverture de la prochaine piste en cours
    Loading,
    /// Frames en cours de livraison au transport
    Playing,
    /// Production et livraison suspendues, reprise possible
    Paused,
    /// Arrêt demandé, démontage en cours
    Stopping,
    /// État terminal ; la session est évincée du registre
    Stopped,
}

impl PlaybackState {
    /// Vrai si la transition `self -> to` fait partie de la machine
    pub fn can_transition(self, to: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, to),
            (Idle, Loading)
                | (Idle, Stopping)
                | (Loading, Loading)
                | (Loading, Playing)
                | (Loading, Idle)
                | (Loading, Stopping)
                | (Playing, Paused)
                | (Playing, Loading)
                | (Playing, Idle)
                | (Playing, Stopping)
                | (Paused, Playing)
                | (Paused, Loading)
                | (Paused, Idle)
                | (Paused, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Applique une transition, ou échoue avec `InvalidTransition`
    pub fn transition(self, to: PlaybackState) -> Result<PlaybackState> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(SessionError::InvalidTransition { from: self, to })
        }
    }

    /// Vrai pour les états où une piste est chargée (active ou suspendue)
    pub fn has_active_track(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }

    /// Vrai pour l'état terminal
    pub fn is_terminal(self) -> bool {
        self == PlaybackState::Stopped
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopping => "stopping",
            PlaybackState::Stopped => "stopped",
        };
        write!(f, "{label}")
    }
}

/// Politique de répétition de la lecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Avancement normal de la queue
    #[default]
    Off,
    /// La piste terminée est re-enfilée en tête
    Track,
    /// La piste terminée est re-enfilée en queue
    Queue,
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::Track => write!(f, "track"),
            LoopMode::Queue => write!(f, "queue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_lifecycle() {
        use PlaybackState::*;
        let mut state = Idle;
        for next in [Loading, Playing, Paused, Playing, Loading, Idle] {
            state = state.transition(next).unwrap();
        }
        state = state.transition(Stopping).unwrap();
        state = state.transition(Stopped).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_terminal_state_has_no_exit() {
        use PlaybackState::*;
        for to in [Idle, Loading, Playing, Paused, Stopping, Stopped] {
            assert!(!Stopped.can_transition(to));
        }
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        use PlaybackState::*;
        let err = Idle.transition(Paused).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));

        assert!(Idle.transition(Playing).is_err());
        assert!(Paused.transition(Paused).is_err());
        assert!(Stopping.transition(Playing).is_err());
    }

    #[test]
    fn test_skip_paths() {
        use PlaybackState::*;
        // skip depuis Playing, Paused ou Loading mène à Loading
        assert!(Playing.can_transition(Loading));
        assert!(Paused.can_transition(Loading));
        assert!(Loading.can_transition(Loading));
    }
}
