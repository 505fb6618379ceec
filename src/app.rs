use axum::Router;
use crate::state::AppState;
use tower_http::trace::TraceLayer;

pub async fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::encoder::SharedEncoderSettings;
    use crate::config::settings::AppConfig;
    use crate::infrastructure::ffmpeg::FfmpegTools;
    use crate::infrastructure::notify::hub::NotificationHub;
    use crate::modules::transcode::capability::CapabilityProber;
    use crate::modules::transcode::orchestrator::{Orchestrator, OrchestratorOptions};
    use crate::modules::transcode::repository::MemoryStatusStore;
    use crate::modules::upload::session::UploadSessionStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_state(root: &Path) -> AppState {
        let config = AppConfig {
            server_port: 0,
            database_url: None,
            media_dir: root.join("media"),
            thumbnail_dir: root.join("thumbnails"),
            upload_staging_dir: root.join("staging"),
            ffmpeg_path: "/nonexistent/ffmpeg".into(),
            ffprobe_path: "/nonexistent/ffprobe".into(),
            pool_size: Some(2),
            preset: "fast".into(),
            crf: 23,
            stuck_job_timeout_minutes: 30,
            sweep_schedule: "0 */5 * * * *".into(),
            upload_session_ttl_seconds: 60,
        };
        let tools = FfmpegTools::new(&config.ffmpeg_path, &config.ffprobe_path);
        let orchestrator = Orchestrator::new(
            OrchestratorOptions {
                tools: tools.clone(),
                thumbnail_dir: config.thumbnail_dir.clone(),
                pool_size: 2,
            },
            Arc::new(MemoryStatusStore::new()),
            NotificationHub::default(),
            Arc::new(CapabilityProber::new(tools)),
            SharedEncoderSettings::default(),
        );
        let uploads = UploadSessionStore::new(&config.upload_staging_dir, Duration::from_secs(60));
        AppState::new(config, orchestrator, uploads)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Body, json: bool) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if json {
            req = req.header("content-type", "application/json");
        }
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        send(app, method, uri, Body::from(body.to_string()), true).await
    }

    #[tokio::test]
    async fn health_check_responds() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path())).await;

        let resp = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn unknown_asset_status_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path())).await;

        let uri = format!("/api/v1/media/{}/status", Uuid::new_v4());
        let (status, body) = send(&app, Method::GET, &uri, Body::empty(), false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn settings_updates_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path())).await;

        let (status, _) = send_json(&app, Method::PUT, "/api/v1/media/settings", json!({"crf": 99})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &app,
            Method::PUT,
            "/api/v1/media/settings",
            json!({"preset": "slow", "crf": 20, "pool_size": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["preset"], "slow");
        assert_eq!(body["data"]["pool_size"], 3);

        let (status, body) = send(&app, Method::GET, "/api/v1/media/settings", Body::empty(), false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["crf"], 20);
    }

    #[tokio::test]
    async fn capability_report_and_sweep_are_exposed() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path())).await;

        let (status, body) = send(&app, Method::GET, "/api/v1/media/capabilities", Body::empty(), false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pool_size"], 2);

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/api/v1/media/sweep",
            json!({"owner_id": Uuid::new_v4()}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reset"], 0);
    }

    #[tokio::test]
    async fn chunked_upload_of_a_non_video_completes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path())).await;
        let owner = Uuid::new_v4();

        let (status, body) = send_json(
            &app,
            Method::POST,
            "/api/v1/uploads",
            json!({"owner_id": owner, "filename": "welcome.png", "total_chunks": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let upload_id = body["data"]["upload_id"].as_str().unwrap().to_string();
        let asset_id = body["data"]["asset_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/uploads/{upload_id}/complete"),
            Body::empty(),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        for (index, part) in ["hello ", "screens"].iter().enumerate() {
            let (status, body) = send(
                &app,
                Method::PUT,
                &format!("/api/v1/uploads/{upload_id}/chunks/{index}"),
                Body::from(*part),
                false,
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["received"], index + 1);
        }

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/uploads/{upload_id}/complete"),
            Body::empty(),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["status"], "COMPLETED");
        assert_eq!(body["data"]["size_bytes"], 13);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/media/{asset_id}/status"),
            Body::empty(),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["progress"], 100.0);
    }

    #[tokio::test]
    async fn chunk_for_unknown_session_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path())).await;

        let uri = format!("/api/v1/uploads/{}/chunks/0", Uuid::new_v4());
        let (status, _) = send(&app, Method::PUT, &uri, Body::from("x"), false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
