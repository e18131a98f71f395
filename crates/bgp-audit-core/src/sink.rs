//! Recommendation report.
//!
//! The report is an append-only text file with one block per device:
//!
//! ```text
//! Recommendations for edge-1:
//! enable ttl-security check
//! set maximum-prefix limit
//!
//! edge-2: audit failed at connect — authentication failed: bad password
//!
//! ```
//!
//! All writes go through one [`ReportSink`]. A batch is rendered in full and
//! written under a single lock, so blocks from concurrent callers never
//! interleave.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::{AuditResult, Outcome, WriteError};

/// Line written for a device audited without findings.
pub const NO_ISSUES_LINE: &str = "No issues found.";

/// Render the report block for one device, including its trailing blank line.
pub fn render_block(result: &AuditResult) -> String {
    let mut out = String::new();
    match &result.outcome {
        Outcome::Success { findings } => {
            out.push_str(&format!("Recommendations for {}:\n", result.hostname));
            if findings.is_empty() {
                out.push_str(NO_ISSUES_LINE);
                out.push('\n');
            }
            for finding in findings {
                out.push_str(&finding.recommendation);
                out.push('\n');
            }
        }
        Outcome::Failure { stage, reason } => {
            out.push_str(&format!(
                "{}: audit failed at {} — {}\n",
                result.hostname, stage, reason
            ));
        }
    }
    out.push('\n');
    out
}

/// Render a batch of blocks in the given order.
pub fn render_report(results: &[AuditResult]) -> String {
    results.iter().map(render_block).collect()
}

/// Single-writer sink for the recommendation report.
#[derive(Debug)]
pub struct ReportSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl ReportSink {
    /// Open (or create) the report in append mode.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, WriteError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WriteError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| WriteError::io(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one block per result, in the order given.
    ///
    /// The batch is flushed before returning; any error is fatal for the run.
    pub async fn record(&self, results: &[AuditResult]) -> Result<(), WriteError> {
        if results.is_empty() {
            return Ok(());
        }
        let rendered = render_report(results);

        let mut file = self.file.lock().await;
        file.write_all(rendered.as_bytes())
            .await
            .map_err(|e| WriteError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| WriteError::io(&self.path, e))?;
        file.sync_data()
            .await
            .map_err(|e| WriteError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Finding, Stage};

    fn finding(hostname: &str, rule_id: &str, recommendation: &str) -> Finding {
        Finding {
            hostname: hostname.to_string(),
            rule_id: rule_id.to_string(),
            recommendation: recommendation.to_string(),
        }
    }

    #[test]
    fn test_render_block_with_findings() {
        let result = AuditResult::success(
            "edge-1",
            vec![
                finding("edge-1", "ttl-security", "enable ttl-security check"),
                finding("edge-1", "maximum-prefix", "set maximum-prefix limit"),
            ],
        );
        assert_eq!(
            render_block(&result),
            "Recommendations for edge-1:\nenable ttl-security check\nset maximum-prefix limit\n\n"
        );
    }

    #[test]
    fn test_render_block_without_findings_is_explicit() {
        let block = render_block(&AuditResult::success("edge-2", vec![]));
        assert_eq!(block, "Recommendations for edge-2:\nNo issues found.\n\n");
    }

    #[test]
    fn test_render_block_failure_states_stage_and_reason() {
        let result = AuditResult::failure("edge-3", Stage::Connect, "authentication failed: denied");
        assert_eq!(
            render_block(&result),
            "edge-3: audit failed at connect — authentication failed: denied\n\n"
        );
    }

    #[tokio::test]
    async fn test_record_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("recommendations.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "previous run\n\n").unwrap();

        let sink = ReportSink::open(&path).await.unwrap();
        sink.record(&[
            AuditResult::success("b", vec![]),
            AuditResult::cancelled("a", Stage::Fetch),
        ])
        .await
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "previous run\n\nRecommendations for b:\nNo issues found.\n\na: audit failed at fetch — cancelled\n\n"
        );
    }

    #[tokio::test]
    async fn test_open_creates_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        let sink = ReportSink::open(&path).await.unwrap();
        sink.record(&[]).await.unwrap();
        assert!(path.exists());
        assert_eq!(sink.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let err = ReportSink::open(blocker.join("out.txt")).await.unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
