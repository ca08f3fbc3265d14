//! Pod mutation handler.
//!
//! Every request moves through decode, mutation check, config resolution and patch
//! compilation, and is answered exactly once:
//! - body/envelope failures get HTTP 400 with an `invalid` review (no UID is known yet)
//! - an undecodable review whose UID is still readable is denied with that UID
//! - Pods without the trigger annotation are allowed unchanged
//! - annotated Pods get the compiled patch of every config in the named ConfigMap
//! - any other failure is an error review echoing the request UID

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use k8s_openapi::api::core::v1::Pod;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, error, info, warn};

use super::WebhookState;
use super::decoder::DecodeError;
use super::error::WebhookError;
use crate::config::resolve_configs;
use crate::health::AdmissionOutcome;
use crate::patch::{guard_missing_arrays, to_json_patch};

/// Annotation whose value names the ConfigMap holding the mutation configs
pub const CONFIG_ANNOTATION: &str = "mutate.example.com/config";

/// What to do with a decoded Pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationDecision {
    /// Allow unchanged
    Passthrough,
    /// Resolve configs with this lookup key
    Resolve(String),
}

/// Read the trigger annotation. A missing or empty value means no mutation.
pub fn mutation_decision(pod: &Pod, annotation: &str) -> MutationDecision {
    match pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotation))
    {
        Some(key) if !key.is_empty() => MutationDecision::Resolve(key.clone()),
        _ => MutationDecision::Passthrough,
    }
}

/// `POST /mutate`
pub async fn mutate_pod(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match state.decoder.decode_request(&headers, &body) {
        Ok(request) => request,
        Err(DecodeError::Request { head, source }) => {
            warn!(uid = %head.uid, error = %source, "Failed to decode admission request");
            state.record(AdmissionOutcome::Denied);
            let mut response =
                AdmissionResponse::invalid(format!("failed to decode admission request: {source}"));
            response.types = head.types;
            response.uid = head.uid;
            return Json(response.into_review()).into_response();
        }
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            state.record(AdmissionOutcome::Invalid);
            return (
                StatusCode::BAD_REQUEST,
                Json(AdmissionResponse::invalid(e.to_string()).into_review()),
            )
                .into_response();
        }
    };

    debug!(
        uid = %request.uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing admission request"
    );

    let result = admit(&state, &request).await;
    respond(&state, &request, result)
}

/// Turn the result of [`admit`] into the HTTP response and record its outcome.
fn respond(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
    result: Result<(AdmissionResponse, AdmissionOutcome), WebhookError>,
) -> Response {
    let uid = &request.uid;
    match result {
        Ok((response, outcome)) => {
            state.record(outcome);
            Json(response.into_review()).into_response()
        }
        Err(e) if e.is_transport() => {
            error!(uid = %uid, error = %e, "Failed to encode admission response");
            state.record(AdmissionOutcome::Error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not encode response: {}", e),
            )
                .into_response()
        }
        Err(e) => {
            warn!(uid = %uid, error = %e, "Admission request failed");
            state.record(AdmissionOutcome::Denied);
            Json(
                AdmissionResponse::from(request)
                    .deny(e.to_string())
                    .into_review(),
            )
            .into_response()
        }
    }
}

/// Decide on and build the response for a decoded request.
async fn admit(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<(AdmissionResponse, AdmissionOutcome), WebhookError> {
    let uid = &request.uid;

    // DELETE and CONNECT carry no object
    let Some(object) = &request.object else {
        debug!(uid = %uid, operation = ?request.operation, "No object in request, allowing");
        return Ok((AdmissionResponse::from(request), AdmissionOutcome::Passthrough));
    };

    let pod = state.decoder.decode_pod(object)?;
    let pod_name = pod
        .metadata
        .name
        .as_deref()
        .or(pod.metadata.generate_name.as_deref())
        .unwrap_or_default();
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .or(request.namespace.as_deref())
        .unwrap_or_default();

    let key = match mutation_decision(&pod, &state.annotation) {
        MutationDecision::Passthrough => {
            debug!(
                uid = %uid,
                pod = %pod_name,
                namespace = %namespace,
                "Skipping pod without mutation annotation"
            );
            return Ok((AdmissionResponse::from(request), AdmissionOutcome::Passthrough));
        }
        MutationDecision::Resolve(key) => key,
    };

    let configs = resolve_configs(state.store.as_ref(), &key, state.metrics()).await?;

    let mut ops = configs
        .patch_ops()
        .map_err(|e| WebhookError::PatchSerialization(e.to_string()))?;
    guard_missing_arrays(&mut ops, &object.data);

    let encoded =
        serde_json::to_string(&ops).map_err(|e| WebhookError::PatchSerialization(e.to_string()))?;
    info!(
        uid = %uid,
        pod = %pod_name,
        namespace = %namespace,
        config_map = %key,
        configs = ?configs.names(),
        patch_ops = ops.len(),
        patch = %encoded,
        "Patched pod"
    );
    if let Some(m) = state.metrics() {
        m.observe_patch(ops.len());
    }

    let response = AdmissionResponse::from(request)
        .with_patch(to_json_patch(ops))
        .map_err(|e| WebhookError::PatchSerialization(e.to_string()))?;
    Ok((response, AdmissionOutcome::Mutated))
}
