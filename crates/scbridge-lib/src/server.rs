//! HTTP control API for the bridge.
//!
//! CORS-permissive so a local frontend can drive voices directly. Voice
//! endpoints are fire-and-forget like the bus underneath them; only the
//! engine start endpoint can fail, and only for setup errors.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use scbridge_core::protocol::Value;
use scbridge_core::table::TableSnapshot;
use scbridge_core::types::EngineStatus;

use crate::registry::VoiceRegistry;
use crate::supervisor::EngineSupervisor;

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub registry: VoiceRegistry,
    pub supervisor: EngineSupervisor,
}

/// Build the axum router over a registry and a supervisor.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/play", post(play))
        .route("/update", post(update))
        .route("/kill", post(kill))
        .route("/voices", get(voices))
        .route("/engine/start", post(engine_start))
        .route("/engine/stop", post(engine_stop))
        .route("/engine/status", get(engine_status))
        .route("/engine/port", post(engine_port))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request / response types ──────────────────────────────────────────────

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayRequest {
    name: String,
    synth_type: String,
    freqs: Vec<f64>,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct UpdateRequest {
    name: String,
    params: serde_json::Map<String, serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct KillRequest {
    name: String,
}

#[derive(serde::Deserialize)]
struct PortRequest {
    port: u16,
}

#[derive(serde::Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayResponse {
    ok: bool,
    requested_voices: usize,
}

// ─── Handlers ──────────────────────────────────────────────────────────────

async fn play(State(state): State<AppState>, Json(req): Json<PlayRequest>) -> Json<PlayResponse> {
    let params = to_protocol_params(&req.params);
    state
        .registry
        .play(&req.name, &req.synth_type, &req.freqs, &params);
    Json(PlayResponse {
        ok: true,
        requested_voices: req.freqs.len(),
    })
}

async fn update(State(state): State<AppState>, Json(req): Json<UpdateRequest>) -> Json<OkResponse> {
    state
        .registry
        .update(&req.name, &to_protocol_params(&req.params));
    Json(OkResponse { ok: true })
}

async fn kill(State(state): State<AppState>, Json(req): Json<KillRequest>) -> Json<OkResponse> {
    state.registry.kill(&req.name);
    Json(OkResponse { ok: true })
}

async fn voices(State(state): State<AppState>) -> Json<TableSnapshot> {
    Json(state.registry.snapshot())
}

async fn engine_start(
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, (StatusCode, String)> {
    state
        .supervisor
        .start()
        .await
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok(Json(OkResponse { ok: true }))
}

async fn engine_stop(State(state): State<AppState>) -> Json<OkResponse> {
    state.supervisor.stop().await;
    Json(OkResponse { ok: true })
}

async fn engine_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.supervisor.status().await)
}

async fn engine_port(State(state): State<AppState>, Json(req): Json<PortRequest>) -> Json<OkResponse> {
    state.supervisor.set_feedback_port(req.port);
    Json(OkResponse { ok: true })
}

/// Map JSON params onto protocol tokens: integers stay integers, other
/// numbers become floats, everything else goes through as text.
fn to_protocol_params(params: &serde_json::Map<String, serde_json::Value>) -> Vec<(String, Value)> {
    params
        .iter()
        .map(|(key, value)| {
            let token = match value {
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::Int(i),
                    None => Value::Float(n.as_f64().unwrap_or(0.0)),
                },
                serde_json::Value::String(s) => Value::Str(s.clone()),
                other => Value::Str(other.to_string()),
            };
            (key.clone(), token)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_keep_integer_and_float_distinction() {
        let raw: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"lpFreq": 1200, "amp": 0.5, "wave": "saw"}"#).unwrap();
        let params = to_protocol_params(&raw);
        let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(get("lpFreq"), Some(Value::Int(1200)));
        assert_eq!(get("amp"), Some(Value::Float(0.5)));
        assert_eq!(get("wave"), Some(Value::Str("saw".into())));
    }
}
