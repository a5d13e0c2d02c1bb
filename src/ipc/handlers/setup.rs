use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::setup;
use serde_json::json;

#[derive(Clone, Copy)]
enum SetupSection {
    Feed,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(Self::Feed),
            _ => None,
        }
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let feed = match setup::load_feed_section(store) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "feed": feed }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    match section {
        SetupSection::Feed => {
            let mut current = match setup::load_feed_section(store) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            if let Err(msg) = setup::merge_feed_patch(&mut current, patch_obj) {
                return err(&req.id, "bad_params", msg, None);
            }
            if let Err(e) = setup::save_feed_section(store, &current) {
                return err(&req.id, "write_failed", e.to_string(), None);
            }
        }
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
