//! Contrôle de gain partagé entre la session et l'étage d'encodage
//!
//! Le gain est lu à chaque bloc par l'encodeur ; le handle peut être cloné
//! et modifié depuis n'importe quelle task sans bloquer le pipeline.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Gain linéaire maximal accepté
pub const MAX_GAIN: f32 = 2.0;

/// Handle de contrôle du gain linéaire
///
/// # Exemples
///
/// ```
/// use bardeaudio::VolumeControl;
///
/// let volume = VolumeControl::new(0.5);
/// let handle = volume.clone();
///
/// handle.set(1.2);
/// assert!((volume.gain() - 1.2).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone)]
pub struct VolumeControl {
    // f32 stocké sous forme de bits pour rester lock-free
    gain_bits: Arc<AtomicU32>,
}

impl VolumeControl {
    /// Crée un contrôle avec un gain initial (clampé dans `[0, MAX_GAIN]`)
    pub fn new(gain: f32) -> Self {
        Self {
            gain_bits: Arc::new(AtomicU32::new(Self::clamp(gain).to_bits())),
        }
    }

    /// Crée un contrôle avec le gain par défaut de la configuration
    pub fn from_config() -> Self {
        Self::new(bardeconfig::get_config().get_default_volume() as f32)
    }

    fn clamp(gain: f32) -> f32 {
        if gain.is_finite() {
            gain.clamp(0.0, MAX_GAIN)
        } else {
            1.0
        }
    }

    /// Gain linéaire courant
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Modifie le gain (clampé dans `[0, MAX_GAIN]`)
    pub fn set(&self, gain: f32) {
        self.gain_bits
            .store(Self::clamp(gain).to_bits(), Ordering::Relaxed);
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let v = VolumeControl::new(5.0);
        assert_eq!(v.gain(), MAX_GAIN);

        v.set(-1.0);
        assert_eq!(v.gain(), 0.0);

        v.set(f32::NAN);
        assert_eq!(v.gain(), 1.0);
    }

    #[test]
    fn test_shared_between_clones() {
        let v = VolumeControl::new(0.5);
        let clone = v.clone();
        clone.set(0.8);
        assert!((v.gain() - 0.8).abs() < f32::EPSILON);
    }
}
