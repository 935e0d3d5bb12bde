//! File d'attente des pistes d'une session
//!
//! FIFO stricte, sauf réordonnancement explicite (loop, move, shuffle).
//! La queue n'est mutée que par le worker de session : aucune
//! synchronisation interne n'est nécessaire.

use bardesource::MediaDescriptor;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::VecDeque;

use crate::error::{Result, SessionError};

/// Entrée de la file d'attente
///
/// Une entrée fraîchement enfilée ne porte que la référence ; le
/// descripteur est résolu au moment de lancer la piste. Les entrées
/// re-enfilées par les modes loop conservent leur descripteur, qui est
/// alors réutilisé tel quel.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Référence d'origine (URL ou phrase de recherche)
    pub reference: String,
    /// Descripteur résolu, si déjà connu
    pub descriptor: Option<MediaDescriptor>,
    /// Identité du demandeur
    pub requested_by: String,
    /// Horodatage de l'enfilage
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Entrée à résoudre au lancement
    pub fn new(reference: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            descriptor: None,
            requested_by: requested_by.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// Entrée pré-résolue (playlists, re-enfilage loop)
    pub fn resolved(descriptor: MediaDescriptor, requested_by: impl Into<String>) -> Self {
        Self {
            reference: descriptor.reference.clone(),
            descriptor: Some(descriptor),
            requested_by: requested_by.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// Titre affichable : celui du descripteur, sinon la référence
    pub fn title(&self) -> &str {
        self.descriptor
            .as_ref()
            .map(|d| d.title.as_str())
            .unwrap_or(&self.reference)
    }
}

/// File d'attente FIFO avec opérations de manipulation
#[derive(Debug, Default)]
pub struct TrackQueue {
    entries: VecDeque<QueueEntry>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push_back(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn push_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Vide la queue et retourne le nombre d'entrées retirées
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Copie ordonnée des entrées en attente
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Retire une plage inclusive d'entrées (indices 0-based)
    ///
    /// Les bornes inversées sont remises dans l'ordre et la borne haute est
    /// ramenée dans la queue ; seule une borne basse hors queue est une
    /// erreur.
    pub fn remove_range(&mut self, start: usize, end: usize) -> Result<Vec<QueueEntry>> {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let len = self.entries.len();
        if start >= len {
            return Err(SessionError::IndexOutOfRange { index: start, len });
        }
        let end = end.min(len - 1);

        let mut kept: VecDeque<QueueEntry> = VecDeque::with_capacity(len - (end - start + 1));
        let mut removed = Vec::with_capacity(end - start + 1);
        for (i, entry) in self.entries.drain(..).enumerate() {
            if i >= start && i <= end {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        Ok(removed)
    }

    /// Déplace une entrée vers une nouvelle position (indices 0-based)
    pub fn move_entry(&mut self, src: usize, dest: usize) -> Result<()> {
        let len = self.entries.len();
        if src >= len {
            return Err(SessionError::IndexOutOfRange { index: src, len });
        }
        if dest >= len {
            return Err(SessionError::IndexOutOfRange { index: dest, len });
        }
        if src == dest {
            return Ok(());
        }
        let entry = self
            .entries
            .remove(src)
            .ok_or_else(|| SessionError::Internal("queue entry vanished during move".into()))?;
        self.entries.insert(dest, entry);
        Ok(())
    }

    /// Mélange les entrées en attente ; retourne le nombre mélangé
    ///
    /// Une queue de moins de deux entrées est laissée telle quelle.
    pub fn shuffle(&mut self) -> usize {
        if self.entries.len() < 2 {
            return 0;
        }
        let mut items: Vec<QueueEntry> = self.entries.drain(..).collect();
        items.shuffle(&mut rand::rng());
        let count = items.len();
        self.entries = items.into();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(reference: &str) -> QueueEntry {
        QueueEntry::new(reference, "tester")
    }

    fn queue_of(refs: &[&str]) -> TrackQueue {
        let mut q = TrackQueue::new();
        for r in refs {
            q.push_back(entry(r));
        }
        q
    }

    fn references(q: &TrackQueue) -> Vec<String> {
        q.snapshot().iter().map(|e| e.reference.clone()).collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut q = queue_of(&["a", "b", "c"]);
        assert_eq!(q.pop_front().unwrap().reference, "a");
        assert_eq!(q.pop_front().unwrap().reference, "b");
        assert_eq!(q.pop_front().unwrap().reference, "c");
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn test_remove_range_inclusive() {
        let mut q = queue_of(&["a", "b", "c", "d", "e"]);
        let removed = q.remove_range(1, 3).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(references(&q), vec!["a", "e"]);
    }

    #[test]
    fn test_remove_range_swapped_and_clamped() {
        let mut q = queue_of(&["a", "b", "c"]);
        // Bornes inversées et borne haute hors queue
        let removed = q.remove_range(10, 1).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(references(&q), vec!["a"]);
    }

    #[test]
    fn test_remove_range_start_out_of_bounds() {
        let mut q = queue_of(&["a"]);
        let err = q.remove_range(5, 6).unwrap_err();
        assert!(matches!(err, SessionError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_move_entry() {
        let mut q = queue_of(&["a", "b", "c", "d"]);
        q.move_entry(3, 0).unwrap();
        assert_eq!(references(&q), vec!["d", "a", "b", "c"]);

        q.move_entry(0, 2).unwrap();
        assert_eq!(references(&q), vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_move_same_position_is_noop() {
        let mut q = queue_of(&["a", "b"]);
        q.move_entry(1, 1).unwrap();
        assert_eq!(references(&q), vec!["a", "b"]);
    }

    #[test]
    fn test_move_out_of_range() {
        let mut q = queue_of(&["a", "b"]);
        assert!(q.move_entry(0, 7).is_err());
        assert!(q.move_entry(7, 0).is_err());
    }

    #[test]
    fn test_shuffle_preserves_entries() {
        let refs: Vec<String> = (0..32).map(|i| format!("track-{i}")).collect();
        let mut q = TrackQueue::new();
        for r in &refs {
            q.push_back(entry(r));
        }

        assert_eq!(q.shuffle(), 32);
        let mut shuffled = references(&q);
        assert_eq!(shuffled.len(), 32);
        shuffled.sort();
        let mut expected: Vec<String> = refs.clone();
        expected.sort();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn test_shuffle_tiny_queue_is_noop() {
        let mut q = queue_of(&["a"]);
        assert_eq!(q.shuffle(), 0);
        assert_eq!(references(&q), vec!["a"]);
    }

    #[test]
    fn test_clear_reports_count() {
        let mut q = queue_of(&["a", "b", "c"]);
        assert_eq!(q.clear(), 3);
        assert!(q.is_empty());
        assert_eq!(q.clear(), 0);
    }
}
