//! The UI thread: container windows, the session host and the message loop.
//!
//! The calling (main) thread becomes the UI thread. Launches and other async
//! work run on the tokio runtime and reach the session host only through the
//! [`UiDispatcher`].

use rdssh_protocol_rdp::{SessionHost, UiDispatcher};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::activation::Activations;
use crate::commands::{self, Launched};
use crate::instance::{ActivationMessage, Listener};
use crate::state::AppState;

#[cfg(windows)]
mod tabbed;
#[cfg(windows)]
mod win32;
#[cfg(windows)]
pub use win32::run;

#[cfg(not(windows))]
mod headless;
#[cfg(not(windows))]
pub use headless::run;

pub const APP_TITLE: &str = "RDSSH";

/// Handles a deep link on the runtime once `activations` opens.
fn spawn_activation(
    runtime: &Handle,
    state: &AppState,
    ui: &UiDispatcher<SessionHost>,
    activations: &Activations,
    uri: String,
) -> JoinHandle<()> {
    let state = state.clone();
    let launcher = state.launcher(ui.clone());
    let activations = activations.clone();

    runtime.spawn(async move {
        let outcome = activations
            .handle(&uri, |id| async move {
                (id, commands::connection_launch(&state, &launcher, id).await)
            })
            .await;

        match outcome {
            Some((id, Ok(Launched::Rdp(result)))) => {
                tracing::info!(connection_id = %id, ?result, "activation launched rdp session");
            }
            Some((id, Ok(Launched::Ssh(pid)))) => {
                tracing::info!(connection_id = %id, ?pid, "activation launched ssh session");
            }
            Some((id, Err(error))) => {
                tracing::warn!(connection_id = %id, error = %format!("{error:#}"), "activation failed");
            }
            None => {}
        }
    })
}

/// Serves activations forwarded by later processes: each one raises the
/// primary window and, when it carries a deep link, launches it.
fn serve_activations(
    listener: Listener,
    runtime: &Handle,
    state: &AppState,
    ui: &UiDispatcher<SessionHost>,
    activations: &Activations,
) -> JoinHandle<()> {
    let handle = runtime.clone();
    let state = state.clone();
    let ui = ui.clone();
    let activations = activations.clone();

    listener.serve(runtime, move |message: ActivationMessage| {
        tracing::info!(uri = ?message.uri, "activation forwarded from another process");
        let raised = ui.post(|host: &mut SessionHost| {
            if !host.bring_primary_to_front() {
                tracing::debug!("no primary window to raise");
            }
        });
        if !raised {
            return;
        }
        if let Some(uri) = message.uri {
            spawn_activation(&handle, &state, &ui, &activations, uri);
        }
    })
}
