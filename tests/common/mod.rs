//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which lays out staging directories in a temp
//! dir, wires a scripted transformer into a full [`AppContext`], and starts
//! Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_pipeline::transformer::testing::{Behavior, ScriptedTransformer};
use rf_server::context::AppContext;
use rf_server::router::build_router;
use serde_json::Value;

/// Test harness wrapping a running server over temp staging directories.
pub struct TestHarness {
    pub ctx: AppContext,
    pub transformer: Arc<ScriptedTransformer>,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    /// Start a server whose transcoder always succeeds.
    pub async fn with_server() -> Self {
        Self::start(ScriptedTransformer::succeeding(), |_| {}).await
    }

    /// Start a server with a scripted transcoder behaviour.
    pub async fn with_behavior(behavior: Behavior) -> Self {
        Self::start(ScriptedTransformer::new(behavior), |_| {}).await
    }

    /// Start a server with a custom transformer and config tweaks.
    pub async fn start(transformer: ScriptedTransformer, tweak: impl FnOnce(&mut Config)) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.uploads_dir = tmp.path().join("uploads");
        config.storage.outputs_dir = tmp.path().join("outputs");
        config.storage.work_dir = Some(tmp.path().join("work"));
        tweak(&mut config);

        let transformer = Arc::new(transformer);
        let ctx = AppContext::new(
            config,
            transformer.clone(),
            Arc::new(ToolRegistry::default()),
        )
        .expect("failed to build context");
        let app = build_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            ctx,
            transformer,
            addr,
            client: reqwest::Client::new(),
            _tmp: tmp,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Upload files in one multipart request and return the response body.
    pub async fn upload(&self, files: &[(&str, &str)]) -> Value {
        let mut form = reqwest::multipart::Form::new().percent_encode_noop();
        for (name, contents) in files {
            let part = reqwest::multipart::Part::bytes(contents.as_bytes().to_vec()).file_name(name.to_string());
            form = form.part("files", part);
        }
        let resp = self
            .client
            .post(self.url("/api/uploads"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201, "upload failed");
        resp.json().await.unwrap()
    }

    /// Upload a single file and submit a job for it with a preset.
    pub async fn upload_and_submit(&self, file_name: &str, preset: &str) -> Value {
        let upload = self.upload(&[(file_name, "fake media bytes")]).await;
        let resp = self
            .client
            .post(self.url("/api/jobs"))
            .json(&serde_json::json!({
                "upload_id": upload["upload_id"],
                "file_name": file_name,
                "preset": preset,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202, "submit failed");
        resp.json().await.unwrap()
    }

    pub async fn get_job(&self, id: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/jobs/{id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Poll a job over HTTP until it reaches `succeeded` or `failed`.
    pub async fn wait_terminal(&self, id: &str) -> Value {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let job = self.get_job(id).await;
                if job["status"] == "succeeded" || job["status"] == "failed" {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    /// Poll a job over HTTP until it is `running`.
    pub async fn wait_running(&self, id: &str) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.get_job(id).await["status"] != "running" {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not start in time")
    }
}
