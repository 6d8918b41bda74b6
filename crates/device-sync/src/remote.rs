//! RemoteChannel trait abstraction over the one configured device.
//!
//! Implementations:
//! - `SshChannel` (in `ssh`) - Shells out to `ssh`/`scp`, optionally via `sshpass`
//! - `InMemoryRemote` - For testing
//!
//! A non-zero exit is not an error at this layer: callers inspect
//! `CommandOutput` and decide which step failed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Missing SSH details: device host and user must be configured")]
    NotConfigured,

    #[error("Failed to launch remote command: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Captured result of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code (-1 when killed by a signal)
    pub exit_code: i32,
    /// stdout and stderr, interleaved as captured
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn ok(output: impl Into<String>) -> Self {
        Self::new(0, output)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Local file to the device
    ToRemote,
    /// Device file to the local filesystem
    FromRemote,
}

/// Command execution and file copy against the configured device.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run one shell command line on the device
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Copy a file between `local` and `remote` in the given direction
    async fn copy(&self, local: &Path, remote: &str, direction: CopyDirection)
    -> Result<CommandOutput>;
}

#[async_trait]
impl<T: RemoteChannel + ?Sized> RemoteChannel for std::sync::Arc<T> {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        (**self).exec(command).await
    }

    async fn copy(
        &self,
        local: &Path,
        remote: &str,
        direction: CopyDirection,
    ) -> Result<CommandOutput> {
        (**self).copy(local, remote, direction).await
    }
}

/// Quote a value for a POSIX shell on the device.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// One recorded call against an `InMemoryRemote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Exec(String),
    CopyTo { remote: String },
    CopyFrom { remote: String },
}

/// In-memory device for testing.
///
/// Files copied to the device land in a map keyed by remote path. Commands
/// succeed with empty output unless a scripted response matches their prefix.
pub struct InMemoryRemote {
    configured: bool,
    files: RwLock<HashMap<String, Vec<u8>>>,
    responses: RwLock<Vec<(String, CommandOutput)>>,
    copy_failures: RwLock<HashMap<String, String>>,
    calls: RwLock<Vec<RemoteCall>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            configured: true,
            files: RwLock::new(HashMap::new()),
            responses: RwLock::new(Vec::new()),
            copy_failures: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// A device with no connection details; every call fails with `NotConfigured`.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Place a file on the device
    pub fn put_file(&self, remote: &str, content: impl Into<Vec<u8>>) {
        self.files
            .write()
            .unwrap()
            .insert(remote.to_string(), content.into());
    }

    pub fn file(&self, remote: &str) -> Option<Vec<u8>> {
        self.files.read().unwrap().get(remote).cloned()
    }

    /// Answer commands starting with `prefix` with a fixed result
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.responses
            .write()
            .unwrap()
            .push((prefix.to_string(), output));
    }

    /// Make any copy touching `remote` fail with the given output
    pub fn fail_copy(&self, remote: &str, output: &str) {
        self.copy_failures
            .write()
            .unwrap()
            .insert(remote.to_string(), output.to_string());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Exec(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.write().unwrap().push(call);
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteChannel for InMemoryRemote {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        if !self.configured {
            return Err(RemoteError::NotConfigured);
        }
        self.record(RemoteCall::Exec(command.to_string()));

        let responses = self.responses.read().unwrap();
        Ok(responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }

    async fn copy(
        &self,
        local: &Path,
        remote: &str,
        direction: CopyDirection,
    ) -> Result<CommandOutput> {
        if !self.configured {
            return Err(RemoteError::NotConfigured);
        }
        self.record(match direction {
            CopyDirection::ToRemote => RemoteCall::CopyTo {
                remote: remote.to_string(),
            },
            CopyDirection::FromRemote => RemoteCall::CopyFrom {
                remote: remote.to_string(),
            },
        });

        if let Some(output) = self.copy_failures.read().unwrap().get(remote) {
            return Ok(CommandOutput::new(1, output.clone()));
        }

        match direction {
            CopyDirection::ToRemote => {
                let content = std::fs::read(local).map_err(|e| RemoteError::Io(e.to_string()))?;
                self.put_file(remote, content);
            }
            CopyDirection::FromRemote => {
                let Some(content) = self.file(remote) else {
                    return Ok(CommandOutput::new(
                        1,
                        format!("scp: {}: No such file or directory", remote),
                    ));
                };
                std::fs::write(local, content).map_err(|e| RemoteError::Io(e.to_string()))?;
            }
        }
        Ok(CommandOutput::ok(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/a b/c.png"), "'/a b/c.png'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_inmemory_copy_round_trip() {
        let dir = TempDir::new().unwrap();
        let remote = InMemoryRemote::new();

        let local = dir.path().join("a.png");
        std::fs::write(&local, b"png").unwrap();
        let out = remote
            .copy(&local, "/r/a.png", CopyDirection::ToRemote)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(remote.file("/r/a.png").unwrap(), b"png");

        let back = dir.path().join("b.png");
        remote
            .copy(&back, "/r/a.png", CopyDirection::FromRemote)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_inmemory_missing_remote_file_fails() {
        let dir = TempDir::new().unwrap();
        let remote = InMemoryRemote::new();

        let out = remote
            .copy(&dir.path().join("x"), "/nope", CopyDirection::FromRemote)
            .await
            .unwrap();
        assert!(!out.success());
        assert!(out.output.contains("No such file"));
    }

    #[tokio::test]
    async fn test_inmemory_scripted_responses_match_prefix() {
        let remote = InMemoryRemote::new();
        remote.respond("cp ", CommandOutput::new(1, "cp: read-only"));

        assert!(!remote.exec("cp 'a' 'b'").await.unwrap().success());
        assert!(remote.exec("chmod 644 'a'").await.unwrap().success());
        assert_eq!(remote.executed(), vec!["cp 'a' 'b'", "chmod 644 'a'"]);
    }

    #[tokio::test]
    async fn test_unconfigured_remote_rejects_calls() {
        let remote = InMemoryRemote::unconfigured();
        assert!(matches!(
            remote.exec("true").await,
            Err(RemoteError::NotConfigured)
        ));
        assert!(remote.calls().is_empty());
    }
}
