//! Structures de données pour représenter les médias résolus

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Désérialiseur flexible pour les IDs qui peuvent être des strings ou des integers
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::custom("ID must be a string or number")),
    }
}

/// Nature de la source d'un média résolu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// URL pointant directement sur un fichier audio
    DirectUrl,
    /// Piste résolue par le catalogue externe
    CatalogTrack,
    /// Flux continu sans durée connue (radio, direct)
    LiveStream,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::DirectUrl => write!(f, "direct URL"),
            SourceKind::CatalogTrack => write!(f, "catalog track"),
            SourceKind::LiveStream => write!(f, "live stream"),
        }
    }
}

/// Piste telle que retournée par le démon catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTrack {
    /// Identifiant unique de la piste
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Titre de la piste
    pub title: String,
    /// URL du flux audio exploitable
    pub stream_url: String,
    /// URL de la page d'origine
    #[serde(default)]
    pub page_url: Option<String>,
    /// Durée en millisecondes (absente pour les flux continus)
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Indique un flux continu sans fin connue
    #[serde(default)]
    pub live: bool,
}

/// Réponse du endpoint de recherche du catalogue
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    /// Résultats classés par pertinence décroissante
    pub results: Vec<CatalogTrack>,
}

/// Descripteur d'un média prêt à être lu
///
/// Produit par le resolver, consommé par le pipeline de transcodage.
/// Immuable une fois résolu.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    /// Référence d'origine fournie par l'utilisateur
    pub reference: String,
    /// URL du flux audio résolu
    pub stream_url: String,
    /// Titre lisible
    pub title: String,
    /// Durée si connue
    pub duration: Option<Duration>,
    /// Nature de la source
    pub kind: SourceKind,
}

impl MediaDescriptor {
    /// Construit un descripteur depuis une piste catalogue
    pub fn from_catalog_track(reference: impl Into<String>, track: CatalogTrack) -> Self {
        let kind = if track.live {
            SourceKind::LiveStream
        } else {
            SourceKind::CatalogTrack
        };
        Self {
            reference: reference.into(),
            stream_url: track.stream_url,
            title: track.title,
            duration: track.duration_ms.map(Duration::from_millis),
            kind,
        }
    }

    /// Construit un descripteur direct depuis une URL de fichier audio
    ///
    /// Le titre est extrait du nom de fichier, comme pour un flux HTTP sans
    /// métadonnées.
    pub fn from_direct_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let title = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(|name| name.split('?').next().unwrap_or(name).to_string())
            .unwrap_or_else(|| url.clone());
        Self {
            reference: url.clone(),
            stream_url: url,
            title,
            duration: None,
            kind: SourceKind::DirectUrl,
        }
    }

    /// Vrai si la source peut être reprise à un offset arbitraire
    pub fn seekable(&self) -> bool {
        self.kind != SourceKind::LiveStream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_url_title_from_filename() {
        let d = MediaDescriptor::from_direct_url("http://example.com/music/air.flac");
        assert_eq!(d.title, "air.flac");
        assert_eq!(d.kind, SourceKind::DirectUrl);
        assert!(d.duration.is_none());
    }

    #[test]
    fn test_direct_url_strips_query() {
        let d = MediaDescriptor::from_direct_url("http://example.com/a.mp3?token=xyz");
        assert_eq!(d.title, "a.mp3");
    }

    #[test]
    fn test_catalog_track_live_flag() {
        let track = CatalogTrack {
            id: "42".into(),
            title: "Morning show".into(),
            stream_url: "http://radio.example.com/live".into(),
            page_url: None,
            duration_ms: None,
            live: true,
        };
        let d = MediaDescriptor::from_catalog_track("morning show", track);
        assert_eq!(d.kind, SourceKind::LiveStream);
        assert!(!d.seekable());
    }

    #[test]
    fn test_flexible_id_deserialization() {
        let json = r#"{"id": 123, "title": "t", "stream_url": "http://x/y"}"#;
        let track: CatalogTrack = serde_json::from_str(json).unwrap();
        assert_eq!(track.id, "123");
        assert!(!track.live);
    }
}
