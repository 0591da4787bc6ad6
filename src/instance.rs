//! One shell per user session.
//!
//! The first process creates the activation pipe and keeps serving it. A later
//! process finds the pipe taken, forwards its deep link (if any) as one JSON
//! line, waits for `{"ok":true}` and exits.

#[cfg(windows)]
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub const ACTIVATION_PIPE: &str = "RDSSH.Activation";

#[cfg(windows)]
const FORWARD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
#[cfg(windows)]
const BUSY_RETRY: std::time::Duration = std::time::Duration::from_millis(50);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationMessage {
    #[serde(default)]
    pub uri: Option<String>,
}

#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Serialize, Deserialize)]
struct ActivationReply {
    ok: bool,
}

/// Pipe name scoped to the signed-in user.
pub fn pipe_name() -> String {
    let user: String = std::env::var("USERNAME")
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if user.is_empty() {
        ACTIVATION_PIPE.to_string()
    } else {
        format!("{ACTIVATION_PIPE}.{user}")
    }
}

pub enum Instance {
    /// This process owns the shell and must serve the listener.
    Primary(Listener),
    /// The running shell took over the activation.
    Forwarded,
}

/// Sends `message` and waits for the primary's acknowledgement.
#[cfg_attr(not(windows), allow(dead_code))]
pub async fn forward<S>(stream: &mut S, message: &ActivationMessage) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(message).context("serializing activation")?;
    line.push(b'\n');
    stream.write_all(&line).await.context("writing activation")?;
    stream.flush().await.context("flushing activation")?;

    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .await
        .context("reading activation reply")?;
    if reply.trim().is_empty() {
        bail!("running instance closed the pipe without answering");
    }
    let reply: ActivationReply =
        serde_json::from_str(reply.trim()).context("parsing activation reply")?;
    if !reply.ok {
        bail!("running instance refused the activation");
    }
    Ok(())
}

/// Reads one activation and acknowledges it.
#[cfg_attr(not(windows), allow(dead_code))]
pub async fn receive<S>(stream: &mut S) -> Result<ActivationMessage>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut line = String::new();
    let mut reader = BufReader::new(&mut *stream);
    reader.read_line(&mut line).await.context("reading activation")?;
    let parsed = serde_json::from_str::<ActivationMessage>(line.trim());

    let reply = ActivationReply { ok: parsed.is_ok() };
    let mut payload = serde_json::to_vec(&reply).context("serializing activation reply")?;
    payload.push(b'\n');
    stream.write_all(&payload).await.context("writing activation reply")?;
    stream.flush().await.context("flushing activation reply")?;

    parsed.context("parsing activation")
}

/// Becomes the primary instance, or forwards `uri` to the one already running.
#[cfg(windows)]
pub async fn claim(name: &str, uri: Option<String>) -> Result<Instance> {
    use tokio::net::windows::named_pipe::ServerOptions;

    let path = format!(r"\\.\pipe\{name}");
    match ServerOptions::new().first_pipe_instance(true).create(&path) {
        Ok(server) => {
            tracing::debug!(pipe = %path, "activation pipe claimed");
            Ok(Instance::Primary(Listener { server, path }))
        }
        Err(error) => {
            tracing::debug!(pipe = %path, %error, "activation pipe taken; forwarding");
            allow_foreground();
            let mut client = open_client(&path).await?;
            forward(&mut client, &ActivationMessage { uri }).await?;
            Ok(Instance::Forwarded)
        }
    }
}

#[cfg(not(windows))]
pub async fn claim(_name: &str, _uri: Option<String>) -> Result<Instance> {
    Ok(Instance::Primary(Listener {}))
}

#[cfg(windows)]
async fn open_client(path: &str) -> Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;
    let deadline = tokio::time::Instant::now() + FORWARD_TIMEOUT;
    loop {
        match ClientOptions::new().open(path) {
            Ok(client) => return Ok(client),
            Err(error)
                if error.raw_os_error() == Some(ERROR_PIPE_BUSY)
                    && tokio::time::Instant::now() < deadline => {}
            Err(error) => {
                return Err(error).with_context(|| format!("opening activation pipe {path}"));
            }
        }
        tokio::time::sleep(BUSY_RETRY).await;
    }
}

// The running shell is in the background; let it take the foreground.
#[cfg(windows)]
fn allow_foreground() {
    use windows::Win32::UI::WindowsAndMessaging::{AllowSetForegroundWindow, ASFW_ANY};

    if let Err(error) = unsafe { AllowSetForegroundWindow(ASFW_ANY) } {
        tracing::debug!(%error, "AllowSetForegroundWindow");
    }
}

/// The primary instance's end of the activation pipe.
pub struct Listener {
    #[cfg(windows)]
    server: tokio::net::windows::named_pipe::NamedPipeServer,
    #[cfg(windows)]
    path: String,
}

impl Listener {
    /// Accepts forwarded activations until the runtime stops.
    #[cfg(windows)]
    pub fn serve<F>(self, runtime: &Handle, on_activation: F) -> JoinHandle<()>
    where
        F: Fn(ActivationMessage) + Send + Sync + 'static,
    {
        use tokio::net::windows::named_pipe::ServerOptions;

        let on_activation = Arc::new(on_activation);
        runtime.spawn(async move {
            let Listener { mut server, path } = self;
            loop {
                let connected = server.connect().await;
                let next = match ServerOptions::new().create(&path) {
                    Ok(next) => next,
                    Err(error) => {
                        tracing::warn!(pipe = %path, %error, "activation pipe lost; forwarding stops");
                        return;
                    }
                };
                let mut client = std::mem::replace(&mut server, next);
                if let Err(error) = connected {
                    tracing::debug!(pipe = %path, %error, "activation client dropped");
                    continue;
                }

                let on_activation = Arc::clone(&on_activation);
                tokio::spawn(async move {
                    match receive(&mut client).await {
                        Ok(message) => on_activation(message),
                        Err(error) => {
                            tracing::warn!(error = %format!("{error:#}"), "bad forwarded activation");
                        }
                    }
                });
            }
        })
    }

    #[cfg(not(windows))]
    pub fn serve<F>(self, runtime: &Handle, on_activation: F) -> JoinHandle<()>
    where
        F: Fn(ActivationMessage) + Send + Sync + 'static,
    {
        drop(on_activation);
        runtime.spawn(async {
            tracing::debug!("activation forwarding is only available on Windows");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_the_uri_and_gets_acknowledged() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let message = ActivationMessage {
            uri: Some("rdssh://connect?id=6f0c2a3e-4a51-4cf1-9d3e-2b8f7a1c5d90".into()),
        };

        let sent = message.clone();
        let sender = tokio::spawn(async move { forward(&mut client, &sent).await });
        let received = receive(&mut server).await.expect("received");

        assert_eq!(received, message);
        sender.await.expect("joined").expect("acknowledged");
    }

    #[tokio::test]
    async fn bare_activation_carries_no_uri() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let sender =
            tokio::spawn(async move { forward(&mut client, &ActivationMessage::default()).await });
        let received = receive(&mut server).await.expect("received");

        assert_eq!(received.uri, None);
        sender.await.expect("joined").expect("acknowledged");
    }

    #[tokio::test]
    async fn garbage_is_refused() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let reader = tokio::spawn(async move {
            client.write_all(b"not json\n").await.expect("written");
            let mut reply = String::new();
            BufReader::new(&mut client).read_line(&mut reply).await.expect("reply");
            reply
        });

        assert!(receive(&mut server).await.is_err());
        let reply = reader.await.expect("joined");
        assert_eq!(reply.trim(), r#"{"ok":false}"#);
    }

    #[tokio::test]
    async fn silent_peer_fails_the_forward() {
        let (mut client, server) = tokio::io::duplex(1024);
        drop(server);

        assert!(forward(&mut client, &ActivationMessage::default()).await.is_err());
    }

    #[test]
    fn pipe_name_is_scoped_under_the_activation_prefix() {
        assert!(pipe_name().starts_with(ACTIVATION_PIPE));
    }
}
