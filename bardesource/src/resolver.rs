//! Classification des références et résolution en descripteurs
//!
//! Une référence utilisateur est soit une URL (fichier audio direct ou page
//! à résoudre par le catalogue), soit une phrase de recherche. Le resolver
//! borne chaque résolution par un timeout et ne touche jamais à l'état des
//! sessions.

use crate::catalog::MediaCatalog;
use crate::error::{ResolveError, Result};
use crate::models::MediaDescriptor;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Extensions de fichiers considérées comme de l'audio direct
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "oga", "opus", "flac", "wav", "m4a", "aac"];

/// Détection d'un schéma d'URI en tête de référence
static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("invalid scheme regex"));

/// Contrat de résolution exposé au moteur de sessions
///
/// Permet d'injecter un resolver factice dans les tests de session sans
/// dépendre du client HTTP.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Résout une référence en descripteurs exploitables, par pertinence
    async fn resolve(&self, reference: &str) -> Result<Vec<MediaDescriptor>>;
}

/// Resolver de références
///
/// # Exemple
///
/// ```rust,no_run
/// use bardesource::{HttpCatalog, Resolver, TrackResolver};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = Arc::new(HttpCatalog::new("http://127.0.0.1:7070")?);
/// let resolver = Resolver::new(catalog, Duration::from_secs(15), 5);
///
/// let descriptors = resolver.resolve("someone like you adele").await?;
/// for d in &descriptors {
///     println!("{} ({})", d.title, d.kind);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Resolver {
    catalog: Arc<dyn MediaCatalog>,
    timeout: Duration,
    search_limit: usize,
}

impl Resolver {
    /// Crée un resolver avec un timeout et une limite de recherche explicites
    pub fn new(catalog: Arc<dyn MediaCatalog>, timeout: Duration, search_limit: usize) -> Self {
        Self {
            catalog,
            timeout,
            search_limit: search_limit.max(1),
        }
    }

    /// Crée un resolver en utilisant la configuration globale
    pub fn from_config(catalog: Arc<dyn MediaCatalog>) -> Self {
        let config = bardeconfig::get_config();
        Self::new(
            catalog,
            config.resolve_timeout(),
            config.get_search_limit(),
        )
    }

    /// Vrai si l'URL pointe directement sur un fichier audio connu
    fn is_direct_audio_url(url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        AUDIO_EXTENSIONS
            .iter()
            .any(|ext| path.ends_with(&format!(".{ext}")))
    }

    async fn resolve_inner(&self, reference: &str) -> Result<Vec<MediaDescriptor>> {
        if SCHEME_RE.is_match(reference) {
            let url = Url::parse(reference)
                .map_err(|e| ResolveError::InvalidReference(format!("{reference}: {e}")))?;

            match url.scheme() {
                "http" | "https" => {}
                other => {
                    return Err(ResolveError::InvalidReference(format!(
                        "unsupported scheme: {other}"
                    )));
                }
            }

            if Self::is_direct_audio_url(&url) {
                debug!(url = reference, "Direct audio URL, skipping catalog");
                return Ok(vec![MediaDescriptor::from_direct_url(reference)]);
            }

            let track = self.catalog.lookup(reference).await?;
            return Ok(vec![MediaDescriptor::from_catalog_track(reference, track)]);
        }

        let tracks = self.catalog.search(reference, self.search_limit).await?;
        Ok(tracks
            .into_iter()
            .map(|t| MediaDescriptor::from_catalog_track(reference, t))
            .collect())
    }
}

#[async_trait]
impl TrackResolver for Resolver {
    async fn resolve(&self, reference: &str) -> Result<Vec<MediaDescriptor>> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ResolveError::InvalidReference("empty reference".into()));
        }

        let descriptors = tokio::time::timeout(self.timeout, self.resolve_inner(reference))
            .await
            .map_err(|_| ResolveError::Timeout)??;

        info!(
            reference = reference,
            count = descriptors.len(),
            "Reference resolved"
        );
        Ok(descriptors)
    }
}
