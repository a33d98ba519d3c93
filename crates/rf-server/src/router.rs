//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, and static serving of published results.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::uploads::upload_files,
        routes::uploads::delete_upload,
        routes::uploads::clear_uploads,
        routes::presets::list_presets,
        routes::jobs::list_jobs,
        routes::jobs::submit_job,
        routes::jobs::get_job,
        routes::jobs::cancel_job,
        routes::admin::tools,
    ),
    components(schemas(
        routes::uploads::UploadResponse,
        routes::uploads::ClearUploadsResponse,
        routes::jobs::JobResponse,
        routes::jobs::SubmitJobRequest,
        rf_pipeline::Preset,
        rf_pipeline::TranscodeParams,
        rf_pipeline::JobStatus,
        rf_pipeline::JobFailure,
        rf_av::ToolInfo,
    ))
)]
struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = DefaultBodyLimit::max(ctx.config.server.upload_limit());

    let api = Router::new()
        // Uploads
        .route(
            "/uploads",
            post(routes::uploads::upload_files)
                .layer(upload_limit)
                .delete(routes::uploads::clear_uploads),
        )
        .route(
            "/uploads/{upload_id}",
            delete(routes::uploads::delete_upload),
        )
        // Presets
        .route("/presets", get(routes::presets::list_presets))
        // Jobs
        .route(
            "/jobs",
            get(routes::jobs::list_jobs).post(routes::jobs::submit_job),
        )
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/jobs/{id}/cancel", post(routes::jobs::cancel_job))
        // SSE Events
        .route("/events", get(routes::events::events_handler))
        // Admin
        .route("/admin/tools", get(routes::admin::tools));

    let outputs = ServeDir::new(ctx.outputs_dir());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .nest_service("/outputs", outputs)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rf_av::ToolRegistry;
    use rf_core::config::Config;
    use rf_pipeline::transformer::testing::ScriptedTransformer;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    struct TestApp {
        _tmp: tempfile::TempDir,
        ctx: AppContext,
    }

    impl TestApp {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.storage.uploads_dir = tmp.path().join("uploads");
            config.storage.outputs_dir = tmp.path().join("outputs");
            config.storage.work_dir = Some(tmp.path().join("work"));

            let ctx = AppContext::new(
                config,
                Arc::new(ScriptedTransformer::succeeding()),
                Arc::new(ToolRegistry::default()),
            )
            .unwrap();
            Self { _tmp: tmp, ctx }
        }

        fn router(&self) -> Router {
            build_router(self.ctx.clone())
        }

        /// Put a file into a fresh upload session without going through HTTP.
        fn seed_upload(&self, name: &str, bytes: &[u8]) -> rf_core::UploadId {
            let id = rf_core::UploadId::new();
            let dir = self.ctx.upload_dir(id);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(name), bytes).unwrap();
            id
        }
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = TestApp::new();
        let (status, body) = send(app.router(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let app = TestApp::new();
        let req = Request::builder()
            .uri("/health")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn presets_are_listed() {
        let app = TestApp::new();
        let (status, body) = send(app.router(), get("/api/presets")).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"web-720p"));
    }

    #[tokio::test]
    async fn submit_and_fetch_job() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");

        let (status, body) = send(
            app.router(),
            json_request(
                "POST",
                "/api/jobs",
                json!({"upload_id": upload.to_string(), "file_name": "clip.mov", "preset": "web-720p"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["source"], "clip.mov");

        let id: rf_core::JobId = body["id"].as_str().unwrap().parse().unwrap();
        app.ctx.pipeline.wait(id).await.unwrap();

        let (status, body) = send(app.router(), get(&format!("/api/jobs/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "succeeded");
        let url = body["result_url"].as_str().unwrap().to_string();
        assert_eq!(url, format!("/outputs/{id}.mp4"));

        let resp = app.router().oneshot(get(&url)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"transcoded");
    }

    #[tokio::test]
    async fn submit_with_explicit_params() {
        let app = TestApp::new();
        let upload = app.seed_upload("song.wav", b"fake audio");

        let (status, body) = send(
            app.router(),
            json_request(
                "POST",
                "/api/jobs",
                json!({
                    "upload_id": upload.to_string(),
                    "file_name": "song.wav",
                    "params": {"format": "mp3", "audio_bitrate_kbps": 128}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["params"]["format"], "mp3");
    }

    #[tokio::test]
    async fn submit_unknown_upload_is_404() {
        let app = TestApp::new();
        let (status, body) = send(
            app.router(),
            json_request(
                "POST",
                "/api/jobs",
                json!({"upload_id": rf_core::UploadId::new().to_string(), "file_name": "x.mp4", "preset": "web-720p"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
        assert!(app.ctx.pipeline.list().is_empty());
    }

    #[tokio::test]
    async fn submit_missing_file_is_400_without_record() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");
        let (status, body) = send(
            app.router(),
            json_request(
                "POST",
                "/api/jobs",
                json!({"upload_id": upload.to_string(), "file_name": "other.mov", "preset": "web-720p"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_input");
        assert!(app.ctx.pipeline.list().is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_path_traversal() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");
        let (status, _) = send(
            app.router(),
            json_request(
                "POST",
                "/api/jobs",
                json!({"upload_id": upload.to_string(), "file_name": "../clip.mov", "preset": "web-720p"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_params() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");
        let (status, _) = send(
            app.router(),
            json_request(
                "POST",
                "/api/jobs",
                json!({
                    "upload_id": upload.to_string(),
                    "file_name": "clip.mov",
                    "params": {"format": "mp3", "crf": 20}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.ctx.pipeline.list().is_empty());
    }

    #[tokio::test]
    async fn unknown_job_is_404_and_bad_id_is_400() {
        let app = TestApp::new();
        let (status, _) = send(
            app.router(),
            get(&format!("/api/jobs/{}", rf_core::JobId::new())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app.router(), get("/api/jobs/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_input");
    }

    #[tokio::test]
    async fn cancel_finished_job_is_409() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");
        let source = app.ctx.upload_dir(upload).join("clip.mov");
        let job = app
            .ctx
            .pipeline
            .submit(&source, rf_pipeline::presets::resolve("web-720p").unwrap())
            .unwrap();
        app.ctx.pipeline.wait(job.id).await.unwrap();

        let (status, body) = send(
            app.router(),
            json_request("POST", &format!("/api/jobs/{}/cancel", job.id), Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "invalid_state");
    }

    #[tokio::test]
    async fn list_jobs_filters_by_status() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");
        let source = app.ctx.upload_dir(upload).join("clip.mov");
        let job = app
            .ctx
            .pipeline
            .submit(&source, rf_pipeline::presets::resolve("web-720p").unwrap())
            .unwrap();
        app.ctx.pipeline.wait(job.id).await.unwrap();

        let (_, body) = send(app.router(), get("/api/jobs?status=succeeded")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        let (_, body) = send(app.router(), get("/api/jobs?status=failed")).await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_upload_removes_session() {
        let app = TestApp::new();
        let upload = app.seed_upload("clip.mov", b"fake video");

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/uploads/{upload}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.router(), req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!app.ctx.upload_dir(upload).exists());

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/uploads/{upload}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.router(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clear_uploads_removes_every_session() {
        let app = TestApp::new();
        app.seed_upload("a.mov", b"a");
        app.seed_upload("b.mov", b"b");

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/uploads")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Uploads cleared");
        assert_eq!(body["removed"], 2);
        assert_eq!(std::fs::read_dir(app.ctx.uploads_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn multipart_upload_stores_files() {
        let app = TestApp::new();
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"one.mp4\"\r\n\
             Content-Type: video/mp4\r\n\r\nfirst\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"two.mp4\"\r\n\
             Content-Type: video/mp4\r\n\r\nsecond\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/uploads")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, body) = send(app.router(), req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["files"], json!(["one.mp4", "two.mp4"]));
        assert_eq!(body["message"], "Uploaded 2 files");

        let id: rf_core::UploadId = body["upload_id"].as_str().unwrap().parse().unwrap();
        let stored = std::fs::read(app.ctx.upload_dir(id).join("two.mp4")).unwrap();
        assert_eq!(stored, b"second");
    }

    #[tokio::test]
    async fn upload_without_files_is_rejected() {
        let app = TestApp::new();
        let boundary = "XBOUNDARYX";
        let req = Request::builder()
            .method("POST")
            .uri("/api/uploads")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{boundary}--\r\n"
            )))
            .unwrap();

        let (status, _) = send(app.router(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(app.ctx.uploads_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = TestApp::new();
        let (status, body) = send(app.router(), get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/jobs"].is_object());
    }
}
