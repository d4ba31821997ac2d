pub mod browse;
pub mod files;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/servers", get(browse::servers))
        .route("/browse/{server}", get(browse::browse))
        .route("/quick_search/{server}", get(browse::quick_search))
        .route("/client_path", get(browse::client_paths))
        .route("/client_path/save", post(browse::save_client_path))
        .route("/active_transfers", get(browse::active_transfers))
        .route("/delete", post(files::delete))
        .route("/create_folder", post(files::create_folder))
        .route("/create_file", post(files::create_file))
        .route("/rename", post(files::rename))
        .route("/compute_size", post(tools::compute_size))
        .route("/compress", post(tools::compress))
        .route("/extract", post(tools::extract))
        .route("/run_file", post(tools::run_file))
        .route("/run_file/cancel", post(tools::cancel_run))
        .route("/compare_files", post(tools::compare_files))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;

    struct TestApp {
        dir: TempDir,
        root: String,
        app: Router,
    }

    fn test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("alpha.txt"), "one\ntwo\n").unwrap();
        std::fs::write(dir.path().join("beta.txt"), "one\n2\n").unwrap();
        std::fs::write(dir.path().join(".env"), "secret").unwrap();
        for i in 0..150 {
            std::fs::write(dir.path().join(format!("docs/f{i}.txt")), "x").unwrap();
        }
        let root = dir.path().to_string_lossy().to_string();
        let config = ServerConfig::parse(&format!(
            "[servers.box]\nkind = \"local\"\nos = \"posix\"\ndefault_path = \"{root}\"\n"
        ))
        .unwrap();
        let app = Router::new()
            .nest("/api", router())
            .with_state(AppState::new(config))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000))));
        TestApp { dir, root, app }
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        call(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        call(app, request).await
    }

    fn encode(s: &str) -> String {
        s.replace('%', "%25").replace(' ', "%20").replace('/', "%2F")
    }

    #[tokio::test]
    async fn lists_servers() {
        let t = test_app();
        let (status, body) = get(&t.app, "/api/servers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["servers"][0]["name"], "box");
        assert_eq!(body["servers"][0]["local"], true);
        assert_eq!(body["servers"][0]["default_path"], t.root.as_str());
    }

    #[tokio::test]
    async fn browse_sorts_filters_and_pages() {
        let t = test_app();
        let (_, body) = get(&t.app, &format!("/api/browse/box?path={}", encode(&t.root))).await;
        assert_eq!(body["success"], true);
        let names: Vec<&str> = body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["docs", "alpha.txt", "beta.txt"]);
        assert_eq!(body["has_more"], false);
        assert!(body["next_offset"].is_null());

        let docs = encode(&format!("{}/docs", t.root));
        let (_, page) = get(&t.app, &format!("/api/browse/box?path={docs}&offset=0&limit=1")).await;
        assert_eq!(page["limit"], 100);
        assert_eq!(page["files"].as_array().unwrap().len(), 100);
        assert_eq!(page["total_count"], 150);
        assert_eq!(page["next_offset"], 100);
        assert_eq!(page["files"][2]["name"], "f2.txt");

        let (_, tail) = get(&t.app, &format!("/api/browse/box?path={docs}&offset=100&limit=100")).await;
        assert_eq!(tail["files"].as_array().unwrap().len(), 50);
        assert_eq!(tail["loaded_count"], 150);
        assert_eq!(tail["has_more"], false);
    }

    #[tokio::test]
    async fn browse_unknown_server_is_not_found() {
        let t = test_app();
        let (status, body) = get(&t.app, "/api/browse/nope?path=%2F").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn quick_search_reports_index() {
        let t = test_app();
        let docs = encode(&format!("{}/docs", t.root));
        let (_, body) = get(&t.app, &format!("/api/quick_search/box?path={docs}&keyword=F12")).await;
        assert_eq!(body["match"]["name"], "f12.txt");
        assert_eq!(body["index"], 12);

        let (_, none) = get(&t.app, &format!("/api/quick_search/box?path={docs}&keyword=zzz")).await;
        assert!(none["match"].is_null());
    }

    #[tokio::test]
    async fn create_rename_delete_round() {
        let t = test_app();
        let (_, created) = post(&t.app, "/api/create_folder", json!({
            "server": "box", "parent_path": t.root, "folder_name": "new dir"
        })).await;
        assert_eq!(created["success"], true);
        assert!(t.dir.path().join("new dir").is_dir());

        let (status, dup) = post(&t.app, "/api/create_folder", json!({
            "server": "box", "parent_path": t.root, "folder_name": "new dir"
        })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(dup["success"], false);

        let (_, renamed) = post(&t.app, "/api/rename", json!({
            "server": "box", "old_path": format!("{}/new dir", t.root), "new_name": "renamed"
        })).await;
        assert_eq!(renamed["success"], true);
        assert!(t.dir.path().join("renamed").is_dir());

        let (_, deleted) = post(&t.app, "/api/delete", json!({
            "server": "box",
            "paths": [format!("{}/renamed", t.root), format!("{}/ghost", t.root)]
        })).await;
        assert_eq!(deleted["success"], true);
        assert_eq!(deleted["deleted_count"], 1);
        assert_eq!(deleted["failed_items"][0]["path"], format!("{}/ghost", t.root));
        assert!(!t.dir.path().join("renamed").exists());
    }

    #[tokio::test]
    async fn bad_names_are_rejected() {
        let t = test_app();
        let (status, _) = post(&t.app, "/api/create_file", json!({
            "server": "box", "parent_path": t.root, "file_name": "../escape"
        })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mutations_refresh_cached_listing() {
        let t = test_app();
        let uri = format!("/api/browse/box?path={}", encode(&t.root));
        get(&t.app, &uri).await;
        post(&t.app, "/api/create_file", json!({
            "server": "box", "parent_path": t.root, "file_name": "fresh.txt"
        })).await;
        let (_, body) = get(&t.app, &uri).await;
        assert_eq!(body["total_count"], 4);
    }

    #[tokio::test]
    async fn compute_size_of_tree() {
        let t = test_app();
        let (_, body) = post(&t.app, "/api/compute_size", json!({
            "server": "box", "path": format!("{}/docs", t.root)
        })).await;
        assert_eq!(body["size_bytes"], 150);
        assert_eq!(body["file_count"], 150);
        assert_eq!(body["dir_count"], 0);
        assert_eq!(body["size_human"], "150 B");
    }

    #[tokio::test]
    async fn compare_two_files() {
        let t = test_app();
        let (_, body) = post(&t.app, "/api/compare_files", json!({
            "server_a": "box", "path_a": format!("{}/alpha.txt", t.root),
            "server_b": "box", "path_b": format!("{}/beta.txt", t.root)
        })).await;
        let lines = body["lines"].as_array().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tag"], "equal");
        assert_eq!(lines[1]["tag"], "replace");
        assert_eq!(lines[1]["left"], "two");
        assert_eq!(lines[1]["right"], "2");
    }

    #[tokio::test]
    async fn run_rejects_unknown_types() {
        let t = test_app();
        let (status, _) = post(&t.app, "/api/run_file", json!({
            "server": "box", "path": format!("{}/alpha.txt", t.root)
        })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(&t.app, "/api/run_file/cancel", json!({"run_id": "run_missing"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn client_paths_are_per_address() {
        let t = test_app();
        let (_, saved) = post(&t.app, "/api/client_path/save", json!({
            "panel": "target", "server": "box", "path": t.root
        })).await;
        assert_eq!(saved["success"], true);
        let (_, body) = get(&t.app, "/api/client_path").await;
        assert_eq!(body["paths"]["target"]["server"], "box");
        assert!(body["paths"]["source"].is_null());
    }

    #[tokio::test]
    async fn no_active_transfers_at_rest() {
        let t = test_app();
        let (_, body) = get(&t.app, "/api/active_transfers").await;
        assert_eq!(body["transfers"], json!([]));
    }
}
