use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

use super::dto::S3Notification;
use crate::common::response::{ApiResponse, HandlerResponse};
use crate::infrastructure::storage::s3::is_source_key;
use crate::modules::pipeline::{Pipeline, WorkItem};

/// Single-shot entry point: one notification, one pipeline run, one payload.
/// There is no ledger on this path and no internal retry; redelivery is up to
/// the trigger platform.
pub struct EventHandler {
    pipeline: Pipeline,
    /// Parent for the per-invocation temp directory; system temp when `None`.
    scratch_root: Option<PathBuf>,
}

impl EventHandler {
    pub fn new(pipeline: Pipeline, scratch_root: Option<PathBuf>) -> Self {
        Self {
            pipeline,
            scratch_root,
        }
    }

    pub async fn handle(&self, notification: &S3Notification) -> HandlerResponse {
        let Some(target) = notification.target() else {
            error!("notification carries no object record");
            return HandlerResponse::failed(
                400,
                ApiResponse::error(json!({ "kind": "InvalidNotification" }), "No object record in event"),
            );
        };

        info!(bucket = %target.bucket, key = %target.key, "event received");

        if !is_source_key(&target.key) {
            info!(key = %target.key, "not a USDZ file, skipping");
            return HandlerResponse::ok(ApiResponse::skipped(
                json!({ "input": target.key }),
                "Not a USDZ file",
            ));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("usdz-event-");
        let workspace = match &self.scratch_root {
            Some(root) => std::fs::create_dir_all(root).and_then(|_| builder.tempdir_in(root)),
            None => builder.tempdir(),
        };
        let workspace = match workspace {
            Ok(dir) => dir,
            Err(e) => {
                error!(error = %e, "cannot create invocation workspace");
                return HandlerResponse::failed(
                    500,
                    ApiResponse::error(
                        json!({ "kind": "WorkspaceError", "input": target.key }),
                        &e.to_string(),
                    ),
                );
            }
        };

        let mut item = WorkItem::new(&target.key, workspace.path());
        match self.pipeline.process(&mut item, None).await {
            Ok(outcome) => HandlerResponse::ok(ApiResponse::success(outcome, "Conversion successful")),
            Err(e) => {
                error!(key = %target.key, kind = e.kind(), error = %e, "event processing failed");
                HandlerResponse::failed(
                    500,
                    ApiResponse::error(json!({ "kind": e.kind(), "input": target.key }), &e.to_string()),
                )
            }
        }
    }
}
