//! Per-user accessibility preferences.
//!
//! Stored rows hold a partial JSON blob; resolution fills every field that is
//! missing or malformed from [`AccessibilitySettings::default`]. Reads are
//! best-effort, writes are not.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{RecordStore, Row, StoreError};

pub const SETTINGS_TABLE: &str = "accessibility_settings";
const SETTINGS_COLUMNS: &[&str] = &["user_id", "settings"];

const MAX_VIDEO_SPEED: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilitySettings {
    pub show_captions: bool,
    pub video_speed: f64,
    pub high_contrast: bool,
    pub large_text: bool,
    pub auto_repeat: bool,
    pub sign_descriptions: bool,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            show_captions: true,
            video_speed: 1.0,
            high_contrast: false,
            large_text: false,
            auto_repeat: false,
            sign_descriptions: true,
        }
    }
}

impl AccessibilitySettings {
    /// Reads each field independently; anything missing or of the wrong shape
    /// takes the default for that field only.
    pub fn from_stored(blob: &Map<String, Value>) -> Self {
        let d = Self::default();
        let flag = |key: &str, fallback: bool| {
            blob.get(key).and_then(|v| v.as_bool()).unwrap_or(fallback)
        };
        Self {
            show_captions: flag("show_captions", d.show_captions),
            video_speed: blob
                .get("video_speed")
                .and_then(|v| v.as_f64())
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(d.video_speed),
            high_contrast: flag("high_contrast", d.high_contrast),
            large_text: flag("large_text", d.large_text),
            auto_repeat: flag("auto_repeat", d.auto_repeat),
            sign_descriptions: flag("sign_descriptions", d.sign_descriptions),
        }
    }
}

/// Upper bound applies to new patches only; stored speeds need only be positive.
fn valid_patch_speed(s: f64) -> bool {
    s.is_finite() && s > 0.0 && s <= MAX_VIDEO_SPEED
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0}")]
    Invalid(String),

    #[error("settings write failed: {0}")]
    WriteFailed(#[source] StoreError),
}

/// `Ok(None)` when the user has no stored row.
fn load_stored(
    store: &dyn RecordStore,
    user_id: &str,
) -> Result<Option<Map<String, Value>>, StoreError> {
    let Some(row) = store.get(SETTINGS_TABLE, "user_id", user_id, SETTINGS_COLUMNS)? else {
        return Ok(None);
    };
    let blob = match row.get("settings") {
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(obj)) => obj,
            Ok(_) | Err(_) => {
                warn!(user_id, "stored accessibility settings are not a JSON object");
                Map::new()
            }
        },
        Some(Value::Object(obj)) => obj.clone(),
        _ => Map::new(),
    };
    Ok(Some(blob))
}

pub fn resolve(store: &dyn RecordStore, user_id: &str) -> AccessibilitySettings {
    match load_stored(store, user_id) {
        Ok(Some(blob)) => AccessibilitySettings::from_stored(&blob),
        Ok(None) => {
            debug!(user_id, "no stored accessibility settings; using defaults");
            AccessibilitySettings::default()
        }
        Err(e) => {
            warn!(user_id, error = %e, "accessibility settings unavailable; using defaults");
            AccessibilitySettings::default()
        }
    }
}

fn validate_patch(patch: &Map<String, Value>) -> Result<(), SettingsError> {
    for (k, v) in patch {
        match k.as_str() {
            "show_captions" | "high_contrast" | "large_text" | "auto_repeat"
            | "sign_descriptions" => {
                if !v.is_boolean() {
                    return Err(SettingsError::Invalid(format!("{} must be boolean", k)));
                }
            }
            "video_speed" => {
                let ok = v.as_f64().map(valid_patch_speed).unwrap_or(false);
                if !ok {
                    return Err(SettingsError::Invalid(format!(
                        "video_speed must be a number in (0, {}]",
                        MAX_VIDEO_SPEED
                    )));
                }
            }
            _ => return Err(SettingsError::Invalid(format!("unknown settings field: {}", k))),
        }
    }
    Ok(())
}

/// Shallow-merges `patch` over the stored blob and writes the whole blob
/// back. Last writer wins.
pub fn update(
    store: &dyn RecordStore,
    user_id: &str,
    patch: &Map<String, Value>,
) -> Result<AccessibilitySettings, SettingsError> {
    validate_patch(patch)?;

    let mut blob = load_stored(store, user_id)
        .map_err(SettingsError::WriteFailed)?
        .unwrap_or_default();
    for (k, v) in patch {
        blob.insert(k.clone(), v.clone());
    }

    let mut fields = Row::new();
    fields.insert(
        "settings".to_string(),
        Value::String(Value::Object(blob.clone()).to_string()),
    );
    fields.insert(
        "updated_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    store
        .upsert(SETTINGS_TABLE, "user_id", user_id, &fields)
        .map_err(SettingsError::WriteFailed)?;

    Ok(AccessibilitySettings::from_stored(&blob))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object patch")
    }

    #[test]
    fn missing_row_resolves_to_defaults_without_writing() {
        let store = MemoryStore::new();
        let s = resolve(&store, "u1");
        assert_eq!(s, AccessibilitySettings::default());
        assert_eq!(store.writes(SETTINGS_TABLE), 0);
        assert!(store.rows(SETTINGS_TABLE).is_empty());
    }

    #[test]
    fn partial_blob_keeps_other_fields_at_default() {
        let store = MemoryStore::new();
        store.insert(
            SETTINGS_TABLE,
            json!({
                "user_id": "u1",
                "settings": "{\"high_contrast\":true,\"video_speed\":\"fast\"}"
            }),
        );
        let s = resolve(&store, "u1");
        assert!(s.high_contrast);
        assert_eq!(s.video_speed, 1.0);
        assert!(s.show_captions);
        assert!(s.sign_descriptions);
        assert!(!s.large_text);
    }

    #[test]
    fn stored_speed_above_patch_cap_is_kept() {
        let store = MemoryStore::new();
        store.insert(
            SETTINGS_TABLE,
            json!({ "user_id": "u1", "settings": "{\"video_speed\":6.0}" }),
        );
        assert_eq!(resolve(&store, "u1").video_speed, 6.0);

        store.insert(
            SETTINGS_TABLE,
            json!({ "user_id": "u2", "settings": "{\"video_speed\":-2.0}" }),
        );
        assert_eq!(resolve(&store, "u2").video_speed, 1.0);
    }

    #[test]
    fn unreadable_store_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.fail_table(SETTINGS_TABLE);
        assert_eq!(resolve(&store, "u1"), AccessibilitySettings::default());
    }

    #[test]
    fn garbage_blob_is_treated_as_empty() {
        let store = MemoryStore::new();
        store.insert(SETTINGS_TABLE, json!({ "user_id": "u1", "settings": "not json" }));
        assert_eq!(resolve(&store, "u1"), AccessibilitySettings::default());
    }

    #[test]
    fn sequential_updates_compose_left_to_right() {
        let store = MemoryStore::new();
        update(&store, "u1", &patch(json!({ "large_text": true, "video_speed": 0.5 })))
            .expect("first update");
        let after = update(
            &store,
            "u1",
            &patch(json!({ "video_speed": 1.5, "show_captions": false })),
        )
        .expect("second update");

        let expected = AccessibilitySettings {
            show_captions: false,
            video_speed: 1.5,
            large_text: true,
            ..AccessibilitySettings::default()
        };
        assert_eq!(after, expected);
        assert_eq!(resolve(&store, "u1"), expected);
        assert_eq!(store.rows(SETTINGS_TABLE).len(), 1);
    }

    #[test]
    fn invalid_patch_is_rejected_before_any_write() {
        let store = MemoryStore::new();
        for bad in [
            json!({ "video_speed": 0 }),
            json!({ "video_speed": 9.0 }),
            json!({ "high_contrast": "yes" }),
            json!({ "font": "big" }),
        ] {
            let e = update(&store, "u1", &patch(bad)).expect_err("must reject");
            assert!(matches!(e, SettingsError::Invalid(_)));
        }
        assert_eq!(store.writes(SETTINGS_TABLE), 0);
    }

    #[test]
    fn store_failure_during_update_is_surfaced() {
        let store = MemoryStore::new();
        store.fail_table(SETTINGS_TABLE);
        let e = update(&store, "u1", &patch(json!({ "auto_repeat": true })))
            .expect_err("must surface");
        assert!(matches!(e, SettingsError::WriteFailed(_)));
    }
}
