//! Client HTTP pour le démon catalogue externe
//!
//! Le catalogue est un collaborateur externe : il transforme une phrase de
//! recherche ou une URL de page en pistes exploitables (URL de flux, titre,
//! durée). Ce module n'expose que le contrat [`MediaCatalog`] et son
//! implémentation HTTP.

use crate::error::{ResolveError, Result};
use crate::models::{CatalogTrack, SearchResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Contrat d'accès au catalogue de médias
///
/// Les implémentations ne doivent jamais retourner d'erreur pour une
/// recherche sans résultat : la liste vide est la réponse attendue.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Recherche les meilleures pistes pour une phrase, par pertinence
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>>;

    /// Résout une URL de page en piste exploitable
    async fn lookup(&self, page_url: &str) -> Result<CatalogTrack>;
}

/// Client HTTP du démon catalogue
///
/// # Exemple
///
/// ```rust,no_run
/// use bardesource::{HttpCatalog, MediaCatalog};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = HttpCatalog::new("http://127.0.0.1:7070")?;
/// let tracks = catalog.search("someone like you adele", 5).await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    /// Crée un client vers le démon catalogue
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ResolveError::UpstreamUnavailable(e.to_string()))?;

        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    /// Crée un client en utilisant la configuration globale
    pub fn from_config() -> Result<Self> {
        let config = bardeconfig::get_config();
        Self::new(config.get_catalog_url())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::UpstreamUnavailable(format!(
                "catalog returned status {status}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaCatalog for HttpCatalog {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>> {
        debug!(query = query, limit = limit, "Catalog search");
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("limit", &limit.to_string())])
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let body: SearchResponse = response.json().await?;

        // Le catalogue peut ignorer `limit` ; tronquer côté client
        let mut results = body.results;
        results.truncate(limit);
        Ok(results)
    }

    async fn lookup(&self, page_url: &str) -> Result<CatalogTrack> {
        debug!(page_url = page_url, "Catalog lookup");
        let response = self
            .client
            .get(format!("{}/resolve", self.base_url))
            .query(&[("url", page_url)])
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        let track: CatalogTrack = response.json().await?;
        Ok(track)
    }
}
