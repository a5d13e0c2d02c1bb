use serde_json::{json, Map, Value};
use tracing::warn;

use crate::store::{RecordStore, Row, StoreError};

pub const WORKSPACE_SETTINGS_TABLE: &str = "workspace_settings";
pub const FEED_SECTION_KEY: &str = "setup.feed";

const DEFAULT_PAGE_SIZE: usize = 12;
const DEFAULT_DESCRIPTION_MAX_CHARS: usize = 100;
const DEFAULT_VIDEO_URL: &str = "/videos/rsl-default.mp4";

#[derive(Clone, Debug, PartialEq)]
pub struct FeedDefaults {
    pub default_page_size: usize,
    pub description_max_chars: usize,
    pub default_video_url: String,
}

impl Default for FeedDefaults {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            description_max_chars: DEFAULT_DESCRIPTION_MAX_CHARS,
            default_video_url: DEFAULT_VIDEO_URL.to_string(),
        }
    }
}

pub fn default_feed_section() -> Value {
    json!({
        "defaultPageSize": DEFAULT_PAGE_SIZE,
        "descriptionMaxChars": DEFAULT_DESCRIPTION_MAX_CHARS,
        "defaultVideoUrl": DEFAULT_VIDEO_URL
    })
}

fn parse_usize_range(v: &Value, key: &str, min: usize, max: usize) -> Result<usize, String> {
    let n = v
        .as_u64()
        .ok_or_else(|| format!("{} must be a non-negative integer", key))? as usize;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

pub fn merge_feed_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "defaultPageSize" => {
                obj.insert(k.clone(), Value::from(parse_usize_range(v, k, 1, 100)?));
            }
            "descriptionMaxChars" => {
                obj.insert(k.clone(), Value::from(parse_usize_range(v, k, 20, 500)?));
            }
            "defaultVideoUrl" => {
                obj.insert(k.clone(), Value::String(parse_string_max(v, k, 500)?));
            }
            _ => return Err(format!("unknown feed field: {}", k)),
        }
    }
    Ok(())
}

fn load_saved(store: &dyn RecordStore) -> Result<Option<Map<String, Value>>, StoreError> {
    let row = store.get(
        WORKSPACE_SETTINGS_TABLE,
        "key",
        FEED_SECTION_KEY,
        &["key", "value_json"],
    )?;
    Ok(row
        .and_then(|r| r.get("value_json").and_then(|v| v.as_str()).map(str::to_string))
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|v| v.as_object().cloned()))
}

/// Defaults overlaid with whatever saved values still validate.
pub fn load_feed_section(store: &dyn RecordStore) -> Result<Value, StoreError> {
    let mut current = default_feed_section();
    if let Some(saved) = load_saved(store)? {
        // Apply field by field: one malformed historical value must not
        // discard the rest.
        for (k, v) in saved {
            let mut single = Map::new();
            single.insert(k, v);
            let _ = merge_feed_patch(&mut current, &single);
        }
    }
    Ok(current)
}

pub fn save_feed_section(store: &dyn RecordStore, section: &Value) -> Result<(), StoreError> {
    let mut fields = Row::new();
    fields.insert("value_json".to_string(), Value::String(section.to_string()));
    store.upsert(WORKSPACE_SETTINGS_TABLE, "key", FEED_SECTION_KEY, &fields)
}

pub fn load_feed_defaults(store: &dyn RecordStore) -> FeedDefaults {
    let section = match load_feed_section(store) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "feed setup unavailable; using built-in defaults");
            return FeedDefaults::default();
        }
    };
    let d = FeedDefaults::default();
    FeedDefaults {
        default_page_size: section
            .get("defaultPageSize")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(d.default_page_size),
        description_max_chars: section
            .get("descriptionMaxChars")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(d.description_max_chars),
        default_video_url: section
            .get("defaultVideoUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(d.default_video_url),
    }
}
