use crate::feed;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::pipeline;
use crate::setup;
use crate::store::SqliteStore;
use serde_json::json;

const DEFAULT_ENGAGEMENT_LIMIT: usize = 5;

fn db_store<'a>(state: &'a AppState, req: &Request) -> Result<&'a SqliteStore, serde_json::Value> {
    state
        .store
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be integer", key), None)),
    }
}

fn handle_feed_page(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match db_store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let page = match optional_i64(req, "page") {
        Ok(v) => v.unwrap_or(1),
        Err(e) => return e,
    };
    let page_size = match optional_i64(req, "pageSize") {
        Ok(Some(n)) if (1..=100).contains(&n) => Some(n as usize),
        Ok(Some(_)) => {
            return err(&req.id, "bad_params", "pageSize must be in 1..=100", None);
        }
        Ok(None) => None,
        Err(e) => return e,
    };
    let user_id = req
        .params
        .get("userId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let defaults = setup::load_feed_defaults(store);
    let page_size = page_size.unwrap_or(defaults.default_page_size);
    let view = pipeline::open_feed(store, user_id, &defaults);
    let page = feed::paginate(&view.snapshot.feed, page, page_size);

    let mut result = json!({
        "items": page.items,
        "page": page.page,
        "pageSize": page.page_size,
        "totalPages": page.total_pages,
        "totalItems": page.total_items,
    });
    if let Some(settings) = view.settings {
        result["settings"] = json!(settings);
    }
    ok(&req.id, result)
}

fn handle_feed_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match db_store(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let limit = match optional_i64(req, "limit") {
        Ok(Some(n)) if (1..=50).contains(&n) => n as usize,
        Ok(Some(_)) => return err(&req.id, "bad_params", "limit must be in 1..=50", None),
        Ok(None) => DEFAULT_ENGAGEMENT_LIMIT,
        Err(e) => return e,
    };

    let defaults = setup::load_feed_defaults(store);
    let snapshot = pipeline::load_feed(store, &defaults);
    ok(
        &req.id,
        json!({
            "coverage": snapshot.coverage(),
            "engagement": feed::rank_course_engagement(&snapshot.feed, limit),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feed.page" => Some(handle_feed_page(state, req)),
        "feed.stats" => Some(handle_feed_stats(state, req)),
        _ => None,
    }
}
