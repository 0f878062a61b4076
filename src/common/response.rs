use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }

    pub fn skipped(data: T, message: &str) -> Self {
        Self {
            status: "skipped".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }

    pub fn error(data: T, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

/// Structured result of one event invocation, shaped like the trigger
/// platform's `{statusCode, body}` convention.
#[derive(Debug, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl HandlerResponse {
    pub fn ok<T: Serialize>(response: ApiResponse<T>) -> Self {
        Self::with_status(200, response)
    }

    pub fn failed<T: Serialize>(status_code: u16, response: ApiResponse<T>) -> Self {
        Self::with_status(status_code, response)
    }

    fn with_status<T: Serialize>(status_code: u16, response: ApiResponse<T>) -> Self {
        let body = serde_json::to_value(&response).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "message": e.to_string(), "data": null })
        });
        Self { status_code, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The `status` field of the body envelope.
    pub fn status(&self) -> &str {
        self.body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
    }
}
