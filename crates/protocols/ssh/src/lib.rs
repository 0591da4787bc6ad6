use anyhow::{anyhow, Context, Result};

pub const DEFAULT_TERMINAL: &str = "wt.exe";

/// An `ssh` invocation run inside an external terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshLaunchConfig {
    pub terminal: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
}

impl SshLaunchConfig {
    pub fn destination(&self) -> String {
        match self.username.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => format!("{user}@{}", self.host.trim()),
            _ => self.host.trim().to_string(),
        }
    }

    /// Program and arguments. An empty terminal runs `ssh` directly.
    pub fn command_line(&self) -> (String, Vec<String>) {
        let ssh_args = vec![
            "ssh".to_string(),
            self.destination(),
            "-p".to_string(),
            self.port.to_string(),
        ];

        let terminal = self.terminal.trim();
        if terminal.is_empty() {
            let mut args = ssh_args;
            let program = args.remove(0);
            (program, args)
        } else {
            (terminal.to_string(), ssh_args)
        }
    }
}

/// Starts the terminal and returns its process id. The session itself is owned
/// by the terminal; nothing waits for it to end.
pub async fn launch(config: &SshLaunchConfig) -> Result<Option<u32>> {
    if config.host.trim().is_empty() {
        return Err(anyhow!("ssh launch requires a host"));
    }

    let (program, args) = config.command_line();
    tracing::info!(
        terminal = %program,
        destination = %config.destination(),
        port = config.port,
        "starting ssh session"
    );

    let child = tokio::process::Command::new(&program)
        .args(&args)
        .kill_on_drop(false)
        .spawn()
        .with_context(|| format!("spawning {program}"))?;

    Ok(child.id())
}
