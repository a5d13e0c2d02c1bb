use crate::accessibility::{self, SettingsError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn store<'a>(state: &'a AppState) -> Result<&'a SqliteStore, HandlerErr> {
    state.store.as_ref().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
    })
}

fn required_user_id(req: &Request) -> Result<String, HandlerErr> {
    req.params
        .get("userId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing userId".to_string(),
        })
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let user_id = required_user_id(req)?;
    let settings = accessibility::resolve(store, &user_id);
    Ok(json!({ "userId": user_id, "settings": settings }))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store(state)?;
    let user_id = required_user_id(req)?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "patch must be an object".to_string(),
        });
    };
    match accessibility::update(store, &user_id, patch) {
        Ok(settings) => Ok(json!({ "userId": user_id, "settings": settings })),
        Err(SettingsError::Invalid(message)) => Err(HandlerErr {
            code: "bad_params",
            message,
        }),
        Err(e @ SettingsError::WriteFailed(_)) => Err(HandlerErr {
            code: "write_failed",
            message: e.to_string(),
        }),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "accessibility.get" => handle_get(state, req),
        "accessibility.update" => handle_update(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
