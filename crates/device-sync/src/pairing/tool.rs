//! External content upload tool.
//!
//! Implementations:
//! - `RmapiTool` - Runs `rmapi` with a scoped HOME so its pairing token lives
//!   in the panel's data directory
//! - `ScriptedTool` - For testing

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::remote::CommandOutput;

#[async_trait]
pub trait UploadTool: Send + Sync {
    /// Upload one file to the cloud library
    async fn put(&self, file: &Path) -> std::io::Result<CommandOutput>;

    /// Pair this installation using a one-time code
    async fn register(&self, code: &str) -> std::io::Result<CommandOutput>;
}

pub struct RmapiTool {
    program: PathBuf,
    home: PathBuf,
}

impl RmapiTool {
    pub fn new(program: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            home: home.into(),
        }
    }

    async fn command(&self) -> std::io::Result<Command> {
        tokio::fs::create_dir_all(self.home.join(".config").join("rmapi")).await?;

        let mut command = Command::new(&self.program);
        command
            .env("HOME", &self.home)
            .env("XDG_CONFIG_HOME", self.home.join(".config"))
            .current_dir(&self.home)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

fn combine(output: std::process::Output) -> CommandOutput {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    CommandOutput::new(output.status.code().unwrap_or(-1), combined.trim_end().to_string())
}

#[async_trait]
impl UploadTool for RmapiTool {
    async fn put(&self, file: &Path) -> std::io::Result<CommandOutput> {
        let mut command = self.command().await?;
        command.arg("put").arg(file).stdin(Stdio::null());
        tracing::debug!("Running {} put {:?}", self.program.display(), file);
        Ok(combine(command.output().await?))
    }

    async fn register(&self, code: &str) -> std::io::Result<CommandOutput> {
        let mut command = self.command().await?;
        command.arg("register").stdin(Stdio::piped());
        tracing::debug!("Running {} register", self.program.display());

        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(format!("{}\n", code).as_bytes()).await?;
        }
        Ok(combine(child.wait_with_output().await?))
    }
}

/// One recorded call against a `ScriptedTool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Put(PathBuf),
    Register(String),
}

/// Upload tool double answering from queued outputs.
///
/// With an empty queue, `put` succeeds and `register` prints nothing.
#[derive(Default)]
pub struct ScriptedTool {
    puts: Mutex<VecDeque<CommandOutput>>,
    registers: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<ToolCall>>,
}

impl ScriptedTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_put(&self, output: CommandOutput) {
        self.puts.lock().unwrap().push_back(output);
    }

    pub fn queue_register(&self, output: CommandOutput) {
        self.registers.lock().unwrap().push_back(output);
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTool for ScriptedTool {
    async fn put(&self, file: &Path) -> std::io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(ToolCall::Put(file.to_path_buf()));
        Ok(self
            .puts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }

    async fn register(&self, code: &str) -> std::io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(ToolCall::Register(code.to_string()));
        Ok(self
            .registers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

#[async_trait]
impl<T: UploadTool + ?Sized> UploadTool for std::sync::Arc<T> {
    async fn put(&self, file: &Path) -> std::io::Result<CommandOutput> {
        (**self).put(file).await
    }

    async fn register(&self, code: &str) -> std::io::Result<CommandOutput> {
        (**self).register(code).await
    }
}
