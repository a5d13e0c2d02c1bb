mod test_support;

use serde_json::json;
use test_support::{
    error_code, insert_question, insert_quiz, request, request_ok, select_workspace,
    spawn_sidecar, temp_dir, workspace_db,
};

#[test]
fn setup_feed_section_persists_and_drives_normalization() {
    let workspace = temp_dir("rslfeed-setup-feed");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let setup = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(
        setup["feed"],
        json!({
            "defaultPageSize": 12,
            "descriptionMaxChars": 100,
            "defaultVideoUrl": "/videos/rsl-default.mp4"
        })
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({
            "section": "feed",
            "patch": { "descriptionMaxChars": 20, "defaultVideoUrl": "/videos/intro.mp4" }
        }),
    );

    let conn = workspace_db(&workspace);
    insert_quiz(&conn, "qz1", "Alphabet", true, None, "2024-04-01T10:00:00Z");
    insert_question(
        &conn,
        "qs1",
        "qz1",
        "Show the handshape used for the first letter of the alphabet",
        Some("/v/a.mp4"),
        "2024-04-02T10:00:00Z",
    );

    let page = request_ok(&mut stdin, &mut reader, "3", "feed.page", json!({}));
    let items = page["items"].as_array().expect("items");
    assert_eq!(items[0]["description"], json!("Show the handshape u..."));
    assert_eq!(items[1]["video_url"], json!("/videos/intro.mp4"));

    let reread = request_ok(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(reread["feed"]["descriptionMaxChars"], json!(20));
    assert_eq!(reread["feed"]["defaultPageSize"], json!(12));
}

#[test]
fn setup_update_validates_section_and_fields() {
    let workspace = temp_dir("rslfeed-setup-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    for (i, params) in [
        json!({ "section": "printer", "patch": {} }),
        json!({ "section": "feed", "patch": { "defaultPageSize": 500 } }),
        json!({ "section": "feed", "patch": { "defaultVideoUrl": "  " } }),
        json!({ "section": "feed", "patch": { "colour": "red" } }),
        json!({ "section": "feed" }),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(&mut stdin, &mut reader, &format!("v{}", i), "setup.update", params);
        assert_eq!(error_code(&resp), Some("bad_params"), "{}", resp);
    }
}
