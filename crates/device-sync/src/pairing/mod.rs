//! Document upload through the external tool, including its one-time code
//! pairing handshake.
//!
//! An upload that needs a code is staged and parked per user until the code
//! arrives. Expired sessions are swept at the start of every operation.

mod classify;
mod sessions;
mod tool;

pub use classify::{
    CODE_PROMPT_SIGNATURES, INVALID_CODE_SIGNATURE, ToolSignal, classify_attempt,
    classify_submission,
};
pub use sessions::{PendingUpload, SessionStore};
pub use tool::{RmapiTool, ScriptedTool, ToolCall, UploadTool};

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};

use crate::error::{Error, Result};
use crate::library::ContentKind;

/// Length of a valid one-time code.
pub const CODE_LENGTH: usize = 8;

/// Result of a pairing operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Document is on the device
    Registered,
    /// Document is staged; a one-time code is required
    AwaitingCode,
}

/// Staged document name: whitespace runs become `_`, as does anything
/// outside `[A-Za-z0-9_.-]`.
pub fn sanitize_document_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

pub struct PairingService<T> {
    tool: T,
    staging_dir: PathBuf,
    ttl: Duration,
    sessions: SessionStore,
}

impl<T: UploadTool> PairingService<T> {
    pub fn new(tool: T, staging_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            tool,
            staging_dir: staging_dir.into(),
            ttl,
            sessions: SessionStore::new(),
        }
    }

    /// The upload parked for this user, if any.
    pub fn pending(&self, user: &str) -> Option<PendingUpload> {
        self.sessions.get(user)
    }

    /// Stage a document and try to upload it without a code.
    pub async fn attempt_upload(
        &self,
        user: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome> {
        self.sweep_expired().await;
        ContentKind::Document.check(original_name)?;

        let staged = self.stage(original_name, bytes).await?;
        let out = match self.tool.put(&staged).await {
            Ok(out) => out,
            Err(e) => {
                discard_staged(&staged).await;
                return Err(Error::TransferFailed(format!(
                    "Failed to run upload tool: {}",
                    e
                )));
            }
        };

        match classify_attempt(&out) {
            ToolSignal::NeedsCode => {
                self.park_staged(user, staged, original_name).await;
                tracing::info!("Upload of {} is waiting for a one-time code", original_name);
                Ok(UploadOutcome::AwaitingCode)
            }
            ToolSignal::Uploaded => {
                discard_staged(&staged).await;
                tracing::info!("Uploaded document {}", original_name);
                Ok(UploadOutcome::Registered)
            }
            ToolSignal::InvalidCode | ToolSignal::Failed => {
                discard_staged(&staged).await;
                Err(Error::TransferFailed(out.output))
            }
        }
    }

    /// Stage a document as the user's pending upload without running the tool.
    ///
    /// Used when the document arrives together with its one-time code.
    pub async fn park(&self, user: &str, original_name: &str, bytes: &[u8]) -> Result<()> {
        self.sweep_expired().await;
        ContentKind::Document.check(original_name)?;

        let staged = self.stage(original_name, bytes).await?;
        self.park_staged(user, staged, original_name).await;
        Ok(())
    }

    /// Register with a one-time code and retry the parked upload.
    ///
    /// A rejected code keeps the session so the user can try again.
    pub async fn submit_code(&self, user: &str, code: &str) -> Result<UploadOutcome> {
        self.sweep_expired().await;
        let pending = self.sessions.get(user).ok_or(Error::NoPendingUpload)?;

        let code = code.trim();
        if code.chars().count() != CODE_LENGTH {
            return Err(Error::InvalidCodeFormat);
        }

        let register = match self.tool.register(code).await {
            Ok(out) => out,
            Err(e) => {
                self.finish(user, &pending).await;
                return Err(Error::TransferFailed(format!(
                    "Failed to run upload tool: {}",
                    e
                )));
            }
        };
        let upload = match self.tool.put(&pending.staged_path).await {
            Ok(out) => out,
            Err(e) => {
                self.finish(user, &pending).await;
                return Err(Error::TransferFailed(format!(
                    "Failed to run upload tool: {}",
                    e
                )));
            }
        };

        match classify_submission(&register, &upload) {
            ToolSignal::Uploaded => {
                self.finish(user, &pending).await;
                tracing::info!("Registered and uploaded {}", pending.display_name);
                Ok(UploadOutcome::Registered)
            }
            ToolSignal::InvalidCode => {
                tracing::warn!("One-time code rejected for {}", pending.display_name);
                Err(Error::InvalidCode)
            }
            ToolSignal::NeedsCode | ToolSignal::Failed => {
                self.finish(user, &pending).await;
                Err(Error::TransferFailed(format!(
                    "Registration: {}\nUpload: {}",
                    register.output, upload.output
                )))
            }
        }
    }

    /// Drop the user's pending upload and its staged file.
    pub async fn abandon(&self, user: &str) {
        if let Some(pending) = self.sessions.remove(user) {
            discard_staged(&pending.staged_path).await;
        }
    }

    /// Clear a submitted upload, unless a newer attempt has replaced it.
    async fn finish(&self, user: &str, submitted: &PendingUpload) {
        match self.sessions.remove_if(user, &submitted.staged_path) {
            Some(pending) => discard_staged(&pending.staged_path).await,
            None => tracing::debug!("Pending upload {} was replaced", submitted.display_name),
        }
    }

    async fn park_staged(&self, user: &str, staged: PathBuf, original_name: &str) {
        let pending = PendingUpload::new(staged, original_name, self.ttl);
        if let Some(previous) = self.sessions.insert(user, pending) {
            tracing::debug!("Replacing pending upload {}", previous.display_name);
            discard_staged(&previous.staged_path).await;
        }
    }

    async fn sweep_expired(&self) {
        for pending in self.sessions.take_expired(Utc::now()) {
            tracing::debug!("Pending upload {} expired", pending.display_name);
            discard_staged(&pending.staged_path).await;
        }
    }

    /// Each attempt gets its own directory so the file keeps its sanitized
    /// name, which becomes the document title on the device.
    async fn stage(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.staging_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(sanitize_document_name(original_name));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

async fn discard_staged(staged: &Path) {
    let target = staged.parent().unwrap_or(staged);
    if let Err(e) = tokio::fs::remove_dir_all(target).await {
        tracing::warn!("Failed to remove staged upload {:?}: {}", target, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CommandOutput;
    use std::sync::Arc;
    use tempfile::TempDir;

    const PROMPT: &str =
        "Enter one-time code (go to https://my.remarkable.com/device/desktop/connect):";

    fn service() -> (TempDir, Arc<ScriptedTool>, PairingService<Arc<ScriptedTool>>) {
        let dir = TempDir::new().unwrap();
        let tool = Arc::new(ScriptedTool::new());
        let service =
            PairingService::new(tool.clone(), dir.path().join("staging"), Duration::hours(1));
        (dir, tool, service)
    }

    #[test]
    fn test_sanitize_document_name() {
        assert_eq!(sanitize_document_name("My  Notes (v2).pdf"), "My_Notes__v2_.pdf");
        assert_eq!(sanitize_document_name("../etc/passwd.pdf"), ".._etc_passwd.pdf");
        assert_eq!(sanitize_document_name("plain-name_1.pdf"), "plain-name_1.pdf");
    }

    #[tokio::test]
    async fn test_clean_upload_registers_without_session() {
        let (_dir, tool, service) = service();

        let outcome = service.attempt_upload("u1", "Notes.pdf", b"%PDF").await.unwrap();
        assert_eq!(outcome, UploadOutcome::Registered);
        assert!(service.pending("u1").is_none());

        match &tool.calls()[..] {
            [ToolCall::Put(path)] => {
                assert_eq!(path.file_name().unwrap(), "Notes.pdf");
                assert!(!path.exists());
            }
            calls => panic!("unexpected calls: {:?}", calls),
        }
    }

    #[tokio::test]
    async fn test_non_pdf_rejected_before_tool() {
        let (_dir, tool, service) = service();

        let result = service.attempt_upload("u1", "image.png", b"png").await;
        assert!(matches!(result, Err(Error::UnsupportedContentType(_))));
        assert!(tool.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_parks_staged_file() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, PROMPT));

        let outcome = service.attempt_upload("u1", "My Notes.pdf", b"%PDF").await.unwrap();
        assert_eq!(outcome, UploadOutcome::AwaitingCode);

        let pending = service.pending("u1").unwrap();
        assert_eq!(pending.display_name, "My Notes.pdf");
        assert_eq!(pending.staged_path.file_name().unwrap(), "My_Notes.pdf");
        assert_eq!(std::fs::read(&pending.staged_path).unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn test_other_failure_surfaces_output() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, "Error: network unreachable"));

        let result = service.attempt_upload("u1", "a.pdf", b"%PDF").await;
        assert!(
            matches!(result, Err(Error::TransferFailed(msg)) if msg.contains("network unreachable"))
        );
        assert!(service.pending("u1").is_none());
    }

    #[tokio::test]
    async fn test_short_code_rejected_without_tool_call() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, PROMPT));
        service.attempt_upload("u1", "a.pdf", b"%PDF").await.unwrap();

        let result = service.submit_code("u1", "abcdefg").await;
        assert!(matches!(result, Err(Error::InvalidCodeFormat)));
        assert!(service.pending("u1").is_some());
        assert_eq!(tool.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_valid_code_registers_and_clears_session() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, PROMPT));
        service.attempt_upload("u1", "a.pdf", b"%PDF").await.unwrap();
        let staged = service.pending("u1").unwrap().staged_path;

        let outcome = service.submit_code("u1", "abcd1234").await.unwrap();
        assert_eq!(outcome, UploadOutcome::Registered);
        assert!(service.pending("u1").is_none());
        assert!(!staged.exists());
        assert_eq!(
            tool.calls()[1..],
            [ToolCall::Register("abcd1234".into()), ToolCall::Put(staged)]
        );
    }

    #[tokio::test]
    async fn test_invalid_code_keeps_session() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, PROMPT));
        service.attempt_upload("u1", "a.pdf", b"%PDF").await.unwrap();

        tool.queue_register(CommandOutput::new(1, "Invalid code"));
        tool.queue_put(CommandOutput::new(1, PROMPT));

        let result = service.submit_code("u1", "abcd1234").await;
        assert!(matches!(result, Err(ref e) if e.needs_auth()));
        let pending = service.pending("u1").unwrap();
        assert!(pending.staged_path.exists());
    }

    #[tokio::test]
    async fn test_other_submission_failure_clears_session() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, PROMPT));
        service.attempt_upload("u1", "a.pdf", b"%PDF").await.unwrap();
        let staged = service.pending("u1").unwrap().staged_path;

        tool.queue_put(CommandOutput::new(1, "cloud unavailable"));
        let result = service.submit_code("u1", "abcd1234").await;
        assert!(
            matches!(result, Err(Error::TransferFailed(msg)) if msg.contains("cloud unavailable"))
        );
        assert!(service.pending("u1").is_none());
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_code_without_pending_upload() {
        let (_dir, tool, service) = service();

        let result = service.submit_code("u1", "abcd1234").await;
        assert!(matches!(result, Err(Error::NoPendingUpload)));
        assert!(tool.calls().is_empty());
    }

    #[tokio::test]
    async fn test_new_attempt_discards_superseded_file() {
        let (_dir, tool, service) = service();
        tool.queue_put(CommandOutput::new(1, PROMPT));
        tool.queue_put(CommandOutput::new(1, PROMPT));

        service.attempt_upload("u1", "a.pdf", b"first").await.unwrap();
        let first = service.pending("u1").unwrap().staged_path;
        service.attempt_upload("u1", "a.pdf", b"second").await.unwrap();
        let second = service.pending("u1").unwrap().staged_path;

        assert_ne!(first, second);
        assert!(!first.exists());
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_park_then_code_registers_without_prompt() {
        let (_dir, tool, service) = service();

        service.park("u1", "Notes.pdf", b"%PDF").await.unwrap();
        let staged = service.pending("u1").unwrap().staged_path;
        assert!(tool.calls().is_empty());

        let outcome = service.submit_code("u1", "abcd1234").await.unwrap();
        assert_eq!(outcome, UploadOutcome::Registered);
        assert!(service.pending("u1").is_none());
        assert!(!staged.exists());
        assert_eq!(
            tool.calls(),
            [ToolCall::Register("abcd1234".into()), ToolCall::Put(staged)]
        );
    }

    #[tokio::test]
    async fn test_park_rejects_non_pdf() {
        let (_dir, _tool, service) = service();

        let result = service.park("u1", "notes.txt", b"text").await;
        assert!(matches!(result, Err(Error::UnsupportedContentType(_))));
        assert!(service.pending("u1").is_none());
    }

    #[tokio::test]
    async fn test_finishing_replaced_upload_keeps_newer_one() {
        let (_dir, _tool, service) = service();

        service.park("u1", "a.pdf", b"first").await.unwrap();
        let submitted = service.pending("u1").unwrap();
        service.park("u1", "b.pdf", b"second").await.unwrap();

        service.finish("u1", &submitted).await;
        let pending = service.pending("u1").unwrap();
        assert_eq!(pending.display_name, "b.pdf");
        assert_eq!(std::fs::read(&pending.staged_path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_abandon_discards_staged_file() {
        let (_dir, _tool, service) = service();
        service.park("u1", "a.pdf", b"%PDF").await.unwrap();
        let staged = service.pending("u1").unwrap().staged_path;

        service.abandon("u1").await;
        assert!(service.pending("u1").is_none());
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_huge_ttl_parks_without_overflow() {
        let dir = TempDir::new().unwrap();
        let tool = Arc::new(ScriptedTool::new());
        let service = PairingService::new(
            tool.clone(),
            dir.path().join("staging"),
            Duration::seconds(9_000_000_000_000),
        );
        tool.queue_put(CommandOutput::new(1, PROMPT));

        let outcome = service.attempt_upload("u1", "a.pdf", b"%PDF").await.unwrap();
        assert_eq!(outcome, UploadOutcome::AwaitingCode);
        assert!(service.pending("u1").is_some());
    }

    #[tokio::test]
    async fn test_expired_session_swept() {
        let dir = TempDir::new().unwrap();
        let tool = Arc::new(ScriptedTool::new());
        let service =
            PairingService::new(tool.clone(), dir.path().join("staging"), Duration::seconds(-1));
        tool.queue_put(CommandOutput::new(1, PROMPT));
        service.attempt_upload("u1", "a.pdf", b"%PDF").await.unwrap();
        let staged = service.pending("u1").unwrap().staged_path;

        let result = service.submit_code("u1", "abcd1234").await;
        assert!(matches!(result, Err(Error::NoPendingUpload)));
        assert!(!staged.exists());
    }
}
