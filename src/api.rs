//! Remote resolvers: the three HTTP/JSON operations against the mask
//! backend. Session context is explicit — a `SessionId` is generated per
//! upload and handed to every call, never stashed in global state.

use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Client-generated session token, created once per upload and sent with
/// every subsequent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    /// Timestamp-derived token, unique enough for one backend session.
    pub fn generate() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self(millis.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One region mask as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskPayload {
    /// Base64 PNG, same pixel dimensions as the photo.
    pub segmentation: String,
    pub area: u64,
    pub bbox: [f64; 4],
    pub point_coords: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
struct GenerateMasksRequest<'a> {
    file: &'a str,
    session_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateMasksResponse {
    pub width: u32,
    pub height: u32,
    pub masks: Vec<MaskPayload>,
}

#[derive(Debug, Serialize)]
struct PointRequest<'a> {
    x: u32,
    y: u32,
    session_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointResponse {
    pub mask_indices: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct ApplyColorsRequest<'a> {
    session_id: &'a str,
    mask_indices: &'a [usize],
    color: [u8; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyColorsResponse {
    pub colored_image: String,
}

/// HTTP client for the mask backend.
#[derive(Debug, Clone)]
pub struct PainterClient {
    http: reqwest::Client,
    config: BackendConfig,
}

impl PainterClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    /// Upload an encoded photo and receive the region masks plus the
    /// canonical image dimensions. Called once per upload; the caller must
    /// not resolve clicks until this completes.
    pub async fn generate_masks(
        &self,
        file_data_uri: &str,
        session: &SessionId,
    ) -> Result<GenerateMasksResponse, ApiError> {
        self.post(
            "/generate-masks",
            &GenerateMasksRequest {
                file: file_data_uri,
                session_id: session.as_str(),
            },
        )
        .await
    }

    /// Resolve a click in true image pixel space to the indices of all
    /// regions containing that point. An empty result is not an error.
    pub async fn mask_at_point(
        &self,
        x: u32,
        y: u32,
        session: &SessionId,
    ) -> Result<Vec<usize>, ApiError> {
        let response: PointResponse = self
            .post(
                "/get-mask-at-point",
                &PointRequest {
                    x,
                    y,
                    session_id: session.as_str(),
                },
            )
            .await?;
        Ok(response.mask_indices)
    }

    /// Ask the backend to permanently paint the given regions. The returned
    /// data URI becomes the new base image; the masks are unaffected.
    pub async fn apply_colors(
        &self,
        session: &SessionId,
        mask_indices: &[usize],
        color: [u8; 3],
    ) -> Result<String, ApiError> {
        let response: ApplyColorsResponse = self
            .post(
                "/apply-colors",
                &ApplyColorsRequest {
                    session_id: session.as_str(),
                    mask_indices,
                    color,
                },
            )
            .await?;
        Ok(response.colored_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_nonempty_digits() {
        let session = SessionId::generate();
        assert!(!session.as_str().is_empty());
        assert!(session.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn request_bodies_match_the_wire_contract() {
        let body = serde_json::to_value(GenerateMasksRequest {
            file: "data:image/png;base64,AA==",
            session_id: "1700000000000",
        })
        .expect("serialize failed");
        assert_eq!(body["file"], "data:image/png;base64,AA==");
        assert_eq!(body["session_id"], "1700000000000");

        let body = serde_json::to_value(ApplyColorsRequest {
            session_id: "1",
            mask_indices: &[0, 2],
            color: [255, 0, 0],
        })
        .expect("serialize failed");
        assert_eq!(body["mask_indices"], serde_json::json!([0, 2]));
        assert_eq!(body["color"], serde_json::json!([255, 0, 0]));
    }

    #[test]
    fn responses_parse_from_backend_json() {
        let parsed: GenerateMasksResponse = serde_json::from_str(
            r#"{"width": 4, "height": 2, "masks": [
                {"segmentation": "AA==", "area": 3,
                 "bbox": [0, 0, 2, 2], "point_coords": [[1, 1]]}
            ]}"#,
        )
        .expect("parse failed");
        assert_eq!(parsed.width, 4);
        assert_eq!(parsed.masks.len(), 1);
        assert_eq!(parsed.masks[0].area, 3);

        let parsed: PointResponse =
            serde_json::from_str(r#"{"mask_indices": []}"#).expect("parse failed");
        assert!(parsed.mask_indices.is_empty());
    }
}
