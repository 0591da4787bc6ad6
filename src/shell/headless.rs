//! Shell for hosts without the RDP control: no windows, but the dispatch
//! queue still runs so launches fail the same way they would on Windows.

use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use rdssh_protocol_rdp::{
    channel, ContainerWindow, LayoutRect, LayoutSource, QueueStatus, SessionError, SessionHost,
    TabId, TabSlot, UnsupportedBinder, UnsupportedPlatform, WindowId,
};
use tokio::runtime::Runtime;

use super::{serve_activations, spawn_activation};
use crate::activation::Activations;
use crate::instance::Listener;
use crate::state::AppState;

const POLL: Duration = Duration::from_millis(50);

struct NoLayout;

impl LayoutSource for NoLayout {
    fn layout_rect(&self) -> Option<LayoutRect> {
        None
    }
}

#[derive(Default)]
struct HeadlessContainer {
    tabs: Vec<TabId>,
    next: u64,
}

impl ContainerWindow for HeadlessContainer {
    fn window(&self) -> WindowId {
        WindowId(1)
    }

    fn is_primary(&self) -> bool {
        true
    }

    fn add_tab(&mut self, _title: &str) -> Result<TabSlot, SessionError> {
        self.next += 1;
        let tab = TabId(self.next);
        self.tabs.push(tab);
        Ok(TabSlot {
            tab,
            layout: Rc::new(NoLayout),
        })
    }

    fn remove_tab(&mut self, tab: TabId) {
        self.tabs.retain(|existing| *existing != tab);
    }

    fn select_tab(&mut self, _tab: TabId) {}

    fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    fn bring_to_front(&mut self) {}

    fn close(&mut self) {}
}

/// Handles `uri`, if any, and returns once it has been processed.
pub fn run(
    state: AppState,
    runtime: Runtime,
    listener: Listener,
    uri: Option<String>,
) -> Result<()> {
    tracing::warn!("embedded RDP sessions are not supported on this platform");

    let (ui, queue) = channel::<SessionHost>();
    let mut host = SessionHost::new(
        Rc::new(UnsupportedPlatform),
        Rc::new(UnsupportedBinder),
        ui.clone(),
        state.status.clone(),
        state.containers.clone(),
    );
    host.add_container(Box::new(HeadlessContainer::default()));

    let activations = Activations::new();
    activations.mark_ready();
    let forwarded = serve_activations(listener, runtime.handle(), &state, &ui, &activations);

    if let Some(uri) = uri {
        let activation = spawn_activation(runtime.handle(), &state, &ui, &activations, uri);
        while !activation.is_finished() {
            if queue.run_once(&mut host, POLL) == QueueStatus::Closed {
                break;
            }
        }
    }

    forwarded.abort();
    host.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(2));
    Ok(())
}
