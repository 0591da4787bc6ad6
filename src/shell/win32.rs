use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use rdssh_protocol_rdp::ui_loop::{self, OleApartment};
use rdssh_protocol_rdp::{channel, MsRdpBinder, SessionHost, Win32Platform};
use tokio::runtime::Runtime;
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};

use super::tabbed::{self, TabbedWindow, TabbedWindowFactory};
use super::{serve_activations, spawn_activation, APP_TITLE};
use crate::activation::Activations;
use crate::instance::Listener;
use crate::state::AppState;

/// Runs the windowed shell on the calling thread until the primary window
/// closes.
pub fn run(
    state: AppState,
    runtime: Runtime,
    listener: Listener,
    uri: Option<String>,
) -> Result<()> {
    if let Err(error) =
        unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) }
    {
        // Already set by the manifest or an earlier call.
        tracing::debug!(%error, "SetProcessDpiAwarenessContext");
    }

    let _apartment = OleApartment::enter().context("entering OLE apartment")?;
    tabbed::register_class().context("registering container window class")?;
    let platform = Win32Platform::new().context("registering session window class")?;

    let (ui, queue) = channel::<SessionHost>();
    let ui = ui.with_waker(ui_loop::current_thread_waker());

    let primary =
        TabbedWindow::create(APP_TITLE, true, ui.clone()).context("creating main window")?;
    let mut host = SessionHost::new(
        Rc::new(platform),
        Rc::new(MsRdpBinder),
        ui.clone(),
        state.status.clone(),
        state.containers.clone(),
    )
    .with_factory(Rc::new(TabbedWindowFactory::new(ui.clone())));
    host.add_container(Box::new(primary));

    let activations = Activations::new();
    {
        let activations = activations.clone();
        ui.post(move |_: &mut SessionHost| activations.mark_ready());
    }

    let activation =
        uri.map(|uri| spawn_activation(runtime.handle(), &state, &ui, &activations, uri));
    let forwarded = serve_activations(listener, runtime.handle(), &state, &ui, &activations);

    tracing::info!("ui thread running");
    ui_loop::run(&queue, &mut host);

    host.shutdown();
    forwarded.abort();
    if let Some(activation) = activation {
        activation.abort();
    }
    runtime.shutdown_timeout(Duration::from_secs(2));
    tracing::info!("ui thread stopped");
    Ok(())
}
