use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::wardrobe::WardrobeCategory;

/// Handle to one in-flight analysis job, returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
}

/// Status of an analysis job as reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Processing,
    Completed(AnalysisResults),
    Error(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed(_) => "completed",
            JobStatus::Error(_) => "error",
        }
    }
}

/// Response from POST /upload-outfit
#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response from GET /job/{job_id}
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum StatusResponse {
    Processing,
    Completed {
        #[serde(default)]
        results: Option<Value>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

impl From<StatusResponse> for JobStatus {
    fn from(resp: StatusResponse) -> Self {
        match resp {
            StatusResponse::Processing => JobStatus::Processing,
            StatusResponse::Completed { results } => {
                JobStatus::Completed(AnalysisResults(results.unwrap_or(Value::Null)))
            }
            StatusResponse::Error { error } => JobStatus::Error(
                error.unwrap_or_else(|| "job failed without an error message".to_string()),
            ),
        }
    }
}

/// Analysis payload of a completed job. The schema belongs to the service,
/// so the raw JSON is kept and typed views are best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResults(pub Value);

impl AnalysisResults {
    pub fn raw(&self) -> &Value {
        &self.0
    }

    /// Items the service detected and classified. Entries that don't parse
    /// are skipped.
    pub fn items(&self) -> Vec<DetectedItem> {
        self.0
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Detection counts per detector label, e.g. `{"tshirt": 1, "shoes": 2}`.
    pub fn detection_counts(&self) -> Vec<(String, u64)> {
        self.0
            .get("detections")
            .and_then(Value::as_object)
            .map(|counts| {
                counts
                    .iter()
                    .filter_map(|(label, n)| n.as_u64().map(|n| (label.clone(), n)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn original_image_url(&self) -> Option<&str> {
        self.0.get("original_image_url").and_then(Value::as_str)
    }
}

/// One classified clothing item from an analysis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectedItem {
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub attributes: Value,
}

impl DetectedItem {
    pub fn color(&self) -> Option<&str> {
        self.attribute("color")
    }

    pub fn pattern(&self) -> Option<&str> {
        self.attribute("pattern")
    }

    pub fn confidence(&self) -> Option<f64> {
        self.attributes.get("confidence").and_then(Value::as_f64)
    }

    pub fn wardrobe_category(&self) -> Option<WardrobeCategory> {
        WardrobeCategory::from_item_type(&self.category)
    }

    // Attributes are nested as {"color": {"color": "black", "confidence": 0.85}}
    fn attribute(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s),
            Value::Object(inner) => inner.get(key).and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Successful outcome of a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub job_id: String,
    pub results: AnalysisResults,
    /// Status checks issued before the terminal state was observed.
    pub attempts: u32,
}
