//! Tile/style provider client.

use std::future::Future;
use std::pin::Pin;

use layers::OverlayKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    FetchFailed(String),
    FetchTimeout,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::FetchFailed(msg) => write!(f, "style metadata fetch failed: {msg}"),
            ProviderError::FetchTimeout => write!(f, "style metadata fetch timed out"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// What the provider publishes about one layer reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleMetadata {
    /// Sub-layer name inside the vector tiles.
    pub layer_name: String,
    pub tile_set: String,
    #[serde(default)]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
}

fn default_max_zoom() -> u8 {
    14
}

pub trait StyleProvider: Send + Sync {
    fn metadata(&self, kind: OverlayKind) -> BoxFuture<'_, Result<StyleMetadata, ProviderError>>;

    /// Tile URL template with `{z}/{x}/{y}` placeholders, without credentials.
    fn tile_template(&self, kind: OverlayKind, metadata: &StyleMetadata) -> String;
}

/// Append a bearer credential as the `access_token` query parameter.
pub fn with_access_token(template: &str, token: &str) -> String {
    let sep = if template.contains('?') { '&' } else { '?' };
    format!("{template}{sep}access_token={token}")
}

/// `GET {base_url}/styles/{layerRef}`; tiles under `{base_url}/tiles/...`.
pub struct HttpStyleProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStyleProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn style_url(&self, kind: OverlayKind) -> String {
        format!("{}/styles/{}", self.base_url, kind.layer_ref())
    }
}

impl StyleProvider for HttpStyleProvider {
    fn metadata(&self, kind: OverlayKind) -> BoxFuture<'_, Result<StyleMetadata, ProviderError>> {
        Box::pin(async move {
            let url = self.style_url(kind);
            debug!(%url, %kind, "fetching style metadata");

            let resp = self.client.get(&url).send().await.map_err(map_reqwest_error)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ProviderError::FetchFailed(format!(
                    "style provider HTTP {} for {}",
                    status.as_u16(),
                    kind.layer_ref()
                )));
            }
            resp.json::<StyleMetadata>().await.map_err(map_reqwest_error)
        })
    }

    fn tile_template(&self, kind: OverlayKind, metadata: &StyleMetadata) -> String {
        format!(
            "{}/tiles/{}/{}/{{z}}/{{x}}/{{y}}",
            self.base_url,
            kind.layer_ref(),
            metadata.tile_set
        )
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::FetchTimeout
    } else {
        ProviderError::FetchFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn urls_follow_layer_refs() {
        let p = HttpStyleProvider::new(reqwest::Client::new(), "https://wx.example/");
        assert_eq!(p.style_url(OverlayKind::Swell), "https://wx.example/styles/swell-height");
        let meta = StyleMetadata {
            layer_name: "swh".into(),
            tile_set: "2026101912".into(),
            min_zoom: 0,
            max_zoom: 8,
        };
        assert_eq!(
            p.tile_template(OverlayKind::Swell, &meta),
            "https://wx.example/tiles/swell-height/2026101912/{z}/{x}/{y}"
        );
    }

    #[test]
    fn access_token_is_appended() {
        assert_eq!(with_access_token("https://t/{z}", "abc"), "https://t/{z}?access_token=abc");
        assert_eq!(with_access_token("https://t/{z}?v=2", "abc"), "https://t/{z}?v=2&access_token=abc");
    }

    #[test]
    fn metadata_wire_format() {
        let meta: StyleMetadata =
            serde_json::from_str(r#"{"layerName":"isobars","tileSet":"gfs","minZoom":1}"#).unwrap();
        assert_eq!(meta.layer_name, "isobars");
        assert_eq!(meta.min_zoom, 1);
        assert_eq!(meta.max_zoom, 14);
    }
}
