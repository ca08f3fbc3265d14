//! Admission review decoding.
//!
//! [`AdmissionDecoder`] is built once at startup and shared by all requests. It turns a raw
//! HTTP body into an [`AdmissionRequest`] and the embedded object into a typed [`Pod`].

use axum::http::{HeaderMap, header::CONTENT_TYPE};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use kube::core::{DynamicObject, TypeMeta};
use serde::Deserialize;
use thiserror::Error;

/// Content type required on admission requests
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors decoding an admission request
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty request body")]
    EmptyBody,

    #[error("invalid content type {0:?}, expected {JSON_CONTENT_TYPE}")]
    ContentType(Option<String>),

    #[error("failed to decode AdmissionReview: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The review did not decode but its request UID was readable
    #[error("failed to decode admission request: {source}")]
    Request {
        head: ReviewHead,
        #[source]
        source: serde_json::Error,
    },

    #[error("AdmissionReview has no request")]
    MissingRequest,

    #[error("failed to decode object as Pod: {0}")]
    Object(#[source] serde_json::Error),
}

/// Enough of an AdmissionReview to answer it when the full review does not decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewHead {
    pub types: TypeMeta,
    pub uid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHead {
    #[serde(default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_kind")]
    kind: String,
    request: Option<RawRequestHead>,
}

#[derive(Deserialize)]
struct RawRequestHead {
    #[serde(default)]
    uid: String,
}

fn default_api_version() -> String {
    "admission.k8s.io/v1".to_string()
}

fn default_kind() -> String {
    "AdmissionReview".to_string()
}

impl ReviewHead {
    /// Read the envelope type and request UID, ignoring everything else.
    ///
    /// Returns `None` when the body is not JSON or carries no UID.
    pub fn recover(body: &[u8]) -> Option<Self> {
        let raw: RawHead = serde_json::from_slice(body).ok()?;
        let uid = raw.request?.uid;
        if uid.is_empty() {
            return None;
        }
        Some(Self {
            types: TypeMeta {
                api_version: raw.api_version,
                kind: raw.kind,
            },
            uid,
        })
    }
}

/// Decoder for incoming admission reviews.
#[derive(Clone, Debug)]
pub struct AdmissionDecoder {
    content_type: String,
}

impl Default for AdmissionDecoder {
    fn default() -> Self {
        Self::new(JSON_CONTENT_TYPE)
    }
}

impl AdmissionDecoder {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
        }
    }

    /// Check the content type header. Parameters such as `charset` are ignored.
    fn check_content_type(&self, headers: &HeaderMap) -> Result<(), DecodeError> {
        let value = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let essence = value
            .as_deref()
            .and_then(|v| v.split(';').next())
            .map(str::trim);

        match essence {
            Some(e) if e.eq_ignore_ascii_case(&self.content_type) => Ok(()),
            _ => Err(DecodeError::ContentType(value)),
        }
    }

    /// Validate the body and headers and decode the admission request.
    ///
    /// An envelope that fails to decode is reported as [`DecodeError::Request`] when its
    /// UID can still be read, and as [`DecodeError::Envelope`] otherwise.
    pub fn decode_request(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<AdmissionRequest<DynamicObject>, DecodeError> {
        if body.is_empty() {
            return Err(DecodeError::EmptyBody);
        }
        self.check_content_type(headers)?;

        let review: AdmissionReview<DynamicObject> =
            serde_json::from_slice(body).map_err(|source| match ReviewHead::recover(body) {
                Some(head) => DecodeError::Request { head, source },
                None => DecodeError::Envelope(source),
            })?;
        review.try_into().map_err(|_| DecodeError::MissingRequest)
    }

    /// Decode the embedded object as a Pod.
    pub fn decode_pod(&self, object: &DynamicObject) -> Result<Pod, DecodeError> {
        let value = serde_json::to_value(object).map_err(DecodeError::Object)?;
        serde_json::from_value(value).map_err(DecodeError::Object)
    }
}
