//! SSH-backed `RemoteChannel`.
//!
//! Every call spawns one `ssh` or `scp` process (wrapped in `sshpass` when a
//! password is configured). Connection details are read from a shared
//! `ConnectionSettings` value on each call, so saving new settings takes
//! effect on the next request.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::remote::{CommandOutput, CopyDirection, RemoteChannel, RemoteError, Result};

/// Seconds allowed for establishing each connection.
pub const CONNECT_TIMEOUT_SECS: u32 = 5;

/// How to reach the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Hostname or IP address of the device
    #[serde(default, alias = "REMARKABLE_IP")]
    pub host: String,

    /// SSH user
    #[serde(default = "default_user", alias = "REMARKABLE_USER")]
    pub user: String,

    /// SSH password; empty means key-based auth
    #[serde(default, alias = "REMARKABLE_PASSWORD")]
    pub password: String,
}

fn default_user() -> String {
    "root".to_string()
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: default_user(),
            password: String::new(),
        }
    }
}

impl ConnectionSettings {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && !self.user.trim().is_empty()
    }

    fn ssh_target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn scp_target(&self, remote: &str) -> String {
        if self.host.contains(':') {
            format!("{}@[{}]:{}", self.user, self.host, remote)
        } else {
            format!("{}@{}:{}", self.user, self.host, remote)
        }
    }
}

/// Connection settings shared between the settings store and the channel.
pub type SharedSettings = Arc<RwLock<ConnectionSettings>>;

pub struct SshChannel {
    settings: SharedSettings,
}

impl SshChannel {
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }

    fn current(&self) -> Result<ConnectionSettings> {
        let settings = self
            .settings
            .read()
            .map_err(|_| RemoteError::Io("connection settings lock poisoned".to_string()))?
            .clone();
        if !settings.is_configured() {
            return Err(RemoteError::NotConfigured);
        }
        Ok(settings)
    }

    async fn run(
        &self,
        settings: &ConnectionSettings,
        args: Vec<OsString>,
    ) -> Result<CommandOutput> {
        let (program, args) = wrap_password(settings, args);
        tracing::debug!(
            "Running {} {}",
            program.to_string_lossy(),
            redacted(settings, &args)
        );

        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RemoteError::Spawn(format!("{}: {}", program.to_string_lossy(), e)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput::new(
            output.status.code().unwrap_or(-1),
            combined.trim_end().to_string(),
        ))
    }
}

fn common_options() -> Vec<OsString> {
    vec![
        "-o".into(),
        format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS).into(),
        "-o".into(),
        "StrictHostKeyChecking=no".into(),
    ]
}

/// Arguments for `ssh` running `command` on the device.
fn exec_args(settings: &ConnectionSettings, command: &str) -> Vec<OsString> {
    let mut args = vec![OsString::from("ssh")];
    args.extend(common_options());
    args.push(settings.ssh_target().into());
    args.push(command.into());
    args
}

/// Arguments for `scp` copying between `local` and `remote`.
fn copy_args(
    settings: &ConnectionSettings,
    local: &Path,
    remote: &str,
    direction: CopyDirection,
) -> Vec<OsString> {
    let mut args = vec![OsString::from("scp")];
    args.extend(common_options());
    let target = OsString::from(settings.scp_target(remote));
    match direction {
        CopyDirection::ToRemote => {
            args.push(local.as_os_str().to_owned());
            args.push(target);
        }
        CopyDirection::FromRemote => {
            args.push(target);
            args.push(local.as_os_str().to_owned());
        }
    }
    args
}

/// Split into program and arguments, prefixing `sshpass` when a password is set.
fn wrap_password(
    settings: &ConnectionSettings,
    mut args: Vec<OsString>,
) -> (OsString, Vec<OsString>) {
    if settings.password.is_empty() {
        let program = args.remove(0);
        (program, args)
    } else {
        let mut wrapped = vec![OsString::from("-p"), settings.password.clone().into()];
        wrapped.extend(args);
        (OsString::from("sshpass"), wrapped)
    }
}

fn redacted(settings: &ConnectionSettings, args: &[OsString]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.to_string_lossy();
            if !settings.password.is_empty() && arg == settings.password {
                "***".to_string()
            } else {
                arg.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let settings = self.current()?;
        self.run(&settings, exec_args(&settings, command)).await
    }

    async fn copy(
        &self,
        local: &Path,
        remote: &str,
        direction: CopyDirection,
    ) -> Result<CommandOutput> {
        let settings = self.current()?;
        self.run(&settings, copy_args(&settings, local, remote, direction))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(password: &str) -> ConnectionSettings {
        ConnectionSettings {
            host: "10.11.99.1".into(),
            user: "root".into(),
            password: password.into(),
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_exec_without_password_runs_ssh_directly() {
        let s = settings("");
        let (program, args) = wrap_password(&s, exec_args(&s, "echo hi"));

        assert_eq!(program, OsString::from("ssh"));
        assert_eq!(
            strings(&args),
            vec![
                "-o",
                "ConnectTimeout=5",
                "-o",
                "StrictHostKeyChecking=no",
                "root@10.11.99.1",
                "echo hi"
            ]
        );
    }

    #[test]
    fn test_password_wraps_in_sshpass() {
        let s = settings("hunter2");
        let (program, args) = wrap_password(&s, exec_args(&s, "true"));

        assert_eq!(program, OsString::from("sshpass"));
        assert_eq!(strings(&args)[..3], ["-p", "hunter2", "ssh"]);
        assert!(!redacted(&s, &args).contains("hunter2"));
    }

    #[test]
    fn test_copy_direction_orders_operands() {
        let s = settings("");
        let local = Path::new("/tmp/a.png");
        let up = strings(&copy_args(&s, local, "/r/a.png", CopyDirection::ToRemote));
        assert_eq!(up[0], "scp");
        assert_eq!(up[up.len() - 2..], ["/tmp/a.png", "root@10.11.99.1:/r/a.png"]);

        let down = strings(&copy_args(&s, local, "/r/a.png", CopyDirection::FromRemote));
        assert_eq!(down[down.len() - 2..], ["root@10.11.99.1:/r/a.png", "/tmp/a.png"]);
    }

    #[test]
    fn test_ipv6_host_is_bracketed_for_scp() {
        let s = ConnectionSettings {
            host: "fe80::1".into(),
            ..settings("")
        };
        assert_eq!(s.scp_target("/x"), "root@[fe80::1]:/x");
    }

    #[test]
    fn test_legacy_setting_keys_are_accepted() {
        let s: ConnectionSettings = serde_json::from_str(
            r#"{"REMARKABLE_IP":"10.0.0.5","REMARKABLE_USER":"root","REMARKABLE_PASSWORD":"pw"}"#,
        )
        .unwrap();
        assert_eq!(s.host, "10.0.0.5");
        assert_eq!(s.password, "pw");
        assert!(s.is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_channel_fails_before_spawning() {
        let channel = SshChannel::new(Arc::new(RwLock::new(ConnectionSettings::default())));
        assert!(matches!(
            channel.exec("true").await,
            Err(RemoteError::NotConfigured)
        ));
    }
}
