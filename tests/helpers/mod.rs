//! In-process fake of the FitSense analysis service for integration tests

#![allow(dead_code)]

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

/// How every job created by the fake behaves.
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// HTTP status for POST /upload-outfit. Non-2xx fails the upload.
    pub upload_status: u16,
    /// Status checks answered with `processing` before the terminal state.
    pub processing_checks: u32,
    /// Terminal state after the processing checks. `None` never finishes.
    pub terminal: Option<Terminal>,
}

#[derive(Debug, Clone)]
pub enum Terminal {
    Completed,
    Failed(String),
}

impl Default for JobPlan {
    fn default() -> Self {
        Self {
            upload_status: 200,
            processing_checks: 2,
            terminal: Some(Terminal::Completed),
        }
    }
}

/// One multipart upload as the fake received it.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub user_id: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file_len: usize,
}

#[derive(Default)]
struct Jobs {
    next_id: u32,
    /// job_id -> (user_id, status checks seen)
    checks: HashMap<String, (String, u32)>,
    checks_after_terminal: u32,
}

struct FakeState {
    plan: JobPlan,
    uploads: Mutex<Vec<ReceivedUpload>>,
    jobs: Mutex<Jobs>,
}

pub struct FakeAnalysisService {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakeAnalysisService {
    pub async fn start(plan: JobPlan) -> Self {
        let state = Arc::new(FakeState {
            plan,
            uploads: Mutex::new(Vec::new()),
            jobs: Mutex::new(Jobs::default()),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/upload-outfit", post(upload_outfit))
            .route("/job/{job_id}", get(job_status))
            .route("/wardrobe/{user_id}/summary", get(wardrobe_summary))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake service");
        let addr = listener.local_addr().expect("No local address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake service error");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }

    /// Total status checks across all jobs.
    pub fn status_checks(&self) -> u32 {
        let jobs = self.state.jobs.lock().unwrap();
        jobs.checks.values().map(|(_, n)| n).sum()
    }

    pub fn status_checks_for(&self, job_id: &str) -> u32 {
        let jobs = self.state.jobs.lock().unwrap();
        jobs.checks.get(job_id).map(|(_, n)| *n).unwrap_or(0)
    }

    pub fn checks_after_terminal(&self) -> u32 {
        self.state.jobs.lock().unwrap().checks_after_terminal
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "message": "API is running"}))
}

async fn upload_outfit(
    State(state): State<Arc<FakeState>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut received = ReceivedUpload {
        user_id: None,
        file_name: None,
        content_type: None,
        file_len: 0,
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("file") => {
                received.file_name = field.file_name().map(str::to_string);
                received.content_type = field.content_type().map(str::to_string);
                received.file_len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            }
            Some("user_id") => received.user_id = field.text().await.ok(),
            _ => {}
        }
    }

    let user_id = received.user_id.clone().unwrap_or_else(|| "default_user".to_string());
    state.uploads.lock().unwrap().push(received);

    let status = StatusCode::from_u16(state.plan.upload_status).unwrap_or(StatusCode::OK);
    if !status.is_success() {
        return (
            status,
            Json(json!({
                "success": false,
                "error": "pipeline crashed",
                "traceback": "Traceback (most recent call last): ..."
            })),
        );
    }

    let mut jobs = state.jobs.lock().unwrap();
    jobs.next_id += 1;
    let job_id = format!("job-{}", jobs.next_id);
    jobs.checks.insert(job_id.clone(), (user_id, 0));

    (status, Json(json!({"success": true, "job_id": job_id})))
}

async fn job_status(
    State(state): State<Arc<FakeState>>,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut jobs = state.jobs.lock().unwrap();
    let Some((user_id, checks)) = jobs.checks.get_mut(&job_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Job not found"})),
        );
    };

    *checks += 1;
    let seen = *checks;
    let user_id = user_id.clone();
    let plan = &state.plan;

    if seen <= plan.processing_checks {
        return (StatusCode::OK, Json(json!({"status": "processing"})));
    }

    let body = match &plan.terminal {
        None => json!({"status": "processing"}),
        Some(Terminal::Completed) => json!({
            "status": "completed",
            "results": {
                "user_id": user_id,
                "detections": {"tshirt": 1, "jeans": 1},
                "items": [
                    {
                        "category": "tshirt",
                        "image_url": null,
                        "attributes": {
                            "color": {"color": "black", "confidence": 0.85},
                            "pattern": {"pattern": "solid", "confidence": 0.8},
                            "confidence": 0.825
                        }
                    },
                    {
                        "category": "jeans",
                        "image_url": null,
                        "attributes": {
                            "color": {"color": "blue", "confidence": 0.85},
                            "pattern": {"pattern": "solid", "confidence": 0.8},
                            "confidence": 0.8
                        }
                    }
                ],
                "items_classified": 2,
                "items_added": 2
            }
        }),
        Some(Terminal::Failed(message)) => json!({"status": "error", "error": message}),
    };

    if plan.terminal.is_some() && seen > plan.processing_checks + 1 {
        jobs.checks_after_terminal += 1;
    }

    (StatusCode::OK, Json(body))
}

async fn wardrobe_summary(Path(user_id): Path<String>) -> Json<Value> {
    Json(json!({
        "success": true,
        "summary": {
            "user_id": user_id,
            "total_items": 2,
            "by_category": {"tshirts": 1, "jeans": 1, "shoes": 0, "watches": 0, "caps": 0, "bags": 0}
        }
    }))
}

/// Accepts connections and reads every request byte, but never answers.
pub struct SilentService {
    pub base_url: String,
    bytes_read: Arc<AtomicUsize>,
}

impl SilentService {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent service");
        let addr = listener.local_addr().expect("No local address");
        let bytes_read = Arc::new(AtomicUsize::new(0));

        let counter = bytes_read.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 16 * 1024];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                        counter.fetch_add(n, Ordering::SeqCst);
                    }
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            bytes_read,
        }
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }
}
