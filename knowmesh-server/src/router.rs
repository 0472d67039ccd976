use knowmesh_core::ipc::{KnowMeshRequest, KnowMeshResponse};
use serde_json::json;

use crate::engine::ResolutionEngine;
use crate::state::AppState;

/// Dispatch one request. `session` is the engine owned by the calling
/// connection; table operations go straight to the shared store.
pub fn handle_request(
    request: KnowMeshRequest,
    session: &mut ResolutionEngine,
    state: &AppState,
) -> KnowMeshResponse {
    match request {
        KnowMeshRequest::Ping => KnowMeshResponse::pong(),
        KnowMeshRequest::Status => {
            let mesh = state.replicator.as_ref().map(|r| r.status());
            KnowMeshResponse::ok(json!({
                "mesh": mesh,
                "records": state.store.get_all().len(),
                "session": session.state(),
            }))
        }
        KnowMeshRequest::Chat { text } => {
            let reply = session.handle(&text);
            KnowMeshResponse::ok(json!({
                "reply": reply,
                "text": reply.text(),
                "session": session.state(),
            }))
        }
        KnowMeshRequest::List { filter } => {
            let records = match filter.as_deref() {
                Some(f) => state.store.filter(f),
                None => state.store.get_all(),
            };
            KnowMeshResponse::ok(json!({
                "count": records.len(),
                "records": records,
            }))
        }
        KnowMeshRequest::Resolve { query } => {
            KnowMeshResponse::ok(json!({ "record": state.store.resolve(&query) }))
        }
        KnowMeshRequest::Insert {
            pattern,
            response,
            kind,
        } => match state.store.insert(&pattern, &response, kind) {
            Some(record) => KnowMeshResponse::ok(json!({ "record": record })),
            None => KnowMeshResponse::err("pattern and response must not be empty"),
        },
        KnowMeshRequest::Update {
            id,
            pattern,
            response,
        } => {
            let updated = state.store.update(id, &pattern, &response);
            KnowMeshResponse::ok(json!({ "updated": updated, "id": id }))
        }
        KnowMeshRequest::Reset { confirm } => {
            if !confirm {
                return KnowMeshResponse::err("reset discards all learned records; resend with confirm=true");
            }
            let records = state.store.reset();
            KnowMeshResponse::ok(json!({
                "count": records.len(),
                "records": records,
            }))
        }
        KnowMeshRequest::Evaluate { expression } => {
            KnowMeshResponse::ok(json!({ "result": state.evaluator.try_evaluate(&expression) }))
        }
    }
}
