//! Session registry and tab host.
//!
//! [`SessionHost`] lives on the UI thread inside the dispatch queue. It maps
//! connection ids to their native window and controller across every open
//! container window, so lookups by window work no matter which container a
//! session was undocked into.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::automation::{AutomationBinder, DisconnectReason, DisconnectSink};
use crate::controller::{SessionController, SessionState};
use crate::dispatcher::UiDispatcher;
use crate::embed::{NativeWindowEmbed, ReadySignal};
use crate::error::SessionError;
use crate::geometry::PixelRect;
use crate::options::ConnectParams;
use crate::platform::{LayoutSource, WindowId, WindowPlatform};
use crate::status::ConnectionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u64);

/// A tab created for a session: its id and the area the session fills.
pub struct TabSlot {
    pub tab: TabId,
    pub layout: Rc<dyn LayoutSource>,
}

/// A top-level window that shows sessions as tabs.
pub trait ContainerWindow {
    fn window(&self) -> WindowId;

    /// The main window. It stays open when its last tab closes.
    fn is_primary(&self) -> bool;

    fn add_tab(&mut self, title: &str) -> Result<TabSlot, SessionError>;

    fn remove_tab(&mut self, tab: TabId);

    fn select_tab(&mut self, tab: TabId);

    fn tab_count(&self) -> usize;

    fn bring_to_front(&mut self);

    fn close(&mut self);
}

/// Opens secondary container windows for undocked sessions.
pub trait ContainerFactory {
    fn create_container(&self, title: &str) -> Result<Box<dyn ContainerWindow>, SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerEntry {
    pub window: WindowId,
    pub primary: bool,
}

/// Live container windows, readable from any thread.
#[derive(Clone, Default)]
pub struct ContainerDirectory {
    entries: Arc<Mutex<Vec<ContainerEntry>>>,
}

impl ContainerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, window: WindowId, primary: bool) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.retain(|entry| entry.window != window);
            guard.push(ContainerEntry { window, primary });
        }
    }

    pub fn unregister(&self, window: WindowId) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.retain(|entry| entry.window != window);
        }
    }

    pub fn primary(&self) -> Option<WindowId> {
        self.entries
            .lock()
            .ok()?
            .iter()
            .find(|entry| entry.primary)
            .map(|entry| entry.window)
    }

    pub fn list(&self) -> Vec<ContainerEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

pub enum StartOutcome {
    /// A tab was reserved; its native window is created on a later UI pass.
    Started(ReadySignal),
    /// A session already existed and was brought to the front.
    Focused,
}

struct ActiveSession {
    // Declared before `embed`: the controller must go first.
    controller: Option<SessionController>,
    embed: NativeWindowEmbed,
    title: String,
    container: WindowId,
    tab: TabId,
}

impl ActiveSession {
    fn refresh(&mut self) -> Option<PixelRect> {
        let rect = self.embed.update_bounds()?;
        if let Some(controller) = self.controller.as_mut() {
            controller.update_display(rect.width, rect.height);
        }
        Some(rect)
    }

    fn is_connected(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(SessionController::is_connected)
    }
}

pub struct SessionHost {
    sessions: HashMap<Uuid, ActiveSession>,
    by_window: HashMap<WindowId, Uuid>,
    containers: HashMap<WindowId, Box<dyn ContainerWindow>>,
    platform: Rc<dyn WindowPlatform>,
    binder: Rc<dyn AutomationBinder>,
    factory: Option<Rc<dyn ContainerFactory>>,
    ui: UiDispatcher<SessionHost>,
    status: ConnectionStatus,
    directory: ContainerDirectory,
}

impl SessionHost {
    pub fn new(
        platform: Rc<dyn WindowPlatform>,
        binder: Rc<dyn AutomationBinder>,
        ui: UiDispatcher<SessionHost>,
        status: ConnectionStatus,
        directory: ContainerDirectory,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            by_window: HashMap::new(),
            containers: HashMap::new(),
            platform,
            binder,
            factory: None,
            ui,
            status,
            directory,
        }
    }

    pub fn with_factory(mut self, factory: Rc<dyn ContainerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    // ── Containers ──

    pub fn add_container(&mut self, container: Box<dyn ContainerWindow>) -> WindowId {
        let window = container.window();
        self.directory.register(window, container.is_primary());
        tracing::debug!(window = %window, primary = container.is_primary(), "container registered");
        self.containers.insert(window, container);
        window
    }

    pub fn primary_container(&self) -> Option<WindowId> {
        self.containers
            .values()
            .find(|container| container.is_primary())
            .map(|container| container.window())
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// The container window is going away: close its sessions and forget it.
    pub fn on_container_closed(&mut self, window: WindowId) {
        if self.containers.remove(&window).is_none() {
            return;
        }
        for identity in self.sessions_in(window) {
            self.close_session(identity);
        }
        self.directory.unregister(window);
        tracing::info!(window = %window, "container closed");
    }

    fn close_container(&mut self, window: WindowId) {
        if let Some(mut container) = self.containers.remove(&window) {
            self.directory.unregister(window);
            container.close();
            tracing::debug!(window = %window, "empty container closed");
        }
    }

    // ── Lookup ──

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, identity: Uuid) -> bool {
        self.sessions.contains_key(&identity)
    }

    pub fn session_state(&self, identity: Uuid) -> Option<SessionState> {
        self.sessions.get(&identity).map(|session| {
            session
                .controller
                .as_ref()
                .map(SessionController::state)
                .unwrap_or(SessionState::Unbound)
        })
    }

    pub fn session_window(&self, identity: Uuid) -> Option<WindowId> {
        self.sessions.get(&identity)?.embed.window()
    }

    pub fn session_container(&self, identity: Uuid) -> Option<WindowId> {
        self.sessions.get(&identity).map(|session| session.container)
    }

    pub fn session_tab(&self, identity: Uuid) -> Option<TabId> {
        self.sessions.get(&identity).map(|session| session.tab)
    }

    pub fn sessions_in(&self, container: WindowId) -> Vec<Uuid> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.container == container)
            .map(|(identity, _)| *identity)
            .collect()
    }

    pub fn find_by_window(&self, window: WindowId) -> Option<Uuid> {
        self.by_window.get(&window).copied()
    }

    // ── Launch ──

    /// Focuses the existing session for `identity`, or reserves a tab in the
    /// primary container and schedules creation of its native window.
    pub fn start_or_focus(
        &mut self,
        identity: Uuid,
        title: &str,
    ) -> Result<StartOutcome, SessionError> {
        if self.sessions.contains_key(&identity) {
            self.focus_session(identity);
            tracing::info!(connection_id = %identity, "session already open; focused");
            return Ok(StartOutcome::Focused);
        }

        let owner = self
            .primary_container()
            .ok_or_else(|| SessionError::Platform("no container window is open".into()))?;
        let container = self
            .containers
            .get_mut(&owner)
            .ok_or_else(|| SessionError::Platform("primary container vanished".into()))?;

        let slot = container.add_tab(title)?;
        let embed = NativeWindowEmbed::new(Rc::clone(&self.platform), owner, slot.layout);
        let ready = embed.ready();

        self.sessions.insert(
            identity,
            ActiveSession {
                controller: None,
                embed,
                title: title.to_string(),
                container: owner,
                tab: slot.tab,
            },
        );
        if let Some(window) = self.containers.get_mut(&owner) {
            window.bring_to_front();
        }
        self.select_tab(owner, slot.tab);

        if !self.ui.post(move |host: &mut SessionHost| host.realize(identity)) {
            self.close_session(identity);
            return Err(SessionError::UiThreadGone);
        }

        tracing::info!(connection_id = %identity, container = %owner, "session tab reserved");
        Ok(StartOutcome::Started(ready))
    }

    /// Focuses the open session for `identity`; false when there is none.
    pub fn focus_if_open(&mut self, identity: Uuid) -> bool {
        if !self.sessions.contains_key(&identity) {
            return false;
        }
        self.focus_session(identity);
        tracing::info!(connection_id = %identity, "session already open; focused");
        true
    }

    /// Raises the primary container, e.g. when another process activates us.
    pub fn bring_primary_to_front(&mut self) -> bool {
        let Some(primary) = self.primary_container() else {
            return false;
        };
        match self.containers.get_mut(&primary) {
            Some(window) => {
                window.bring_to_front();
                true
            }
            None => false,
        }
    }

    /// Creates the native window of a reserved session.
    pub fn realize(&mut self, identity: Uuid) {
        let Some(session) = self.sessions.get_mut(&identity) else {
            return;
        };

        match session.embed.create() {
            Ok(window) => {
                self.by_window.insert(window, identity);
            }
            Err(error) => {
                tracing::warn!(connection_id = %identity, %error, "native window creation failed");
                self.close_session(identity);
            }
        }
    }

    /// Binds a controller to the session's window and connects it.
    pub fn connect_session(
        &mut self,
        identity: Uuid,
        mut params: ConnectParams,
    ) -> Result<(), SessionError> {
        let ui = self.ui.clone();
        let session = self
            .sessions
            .get_mut(&identity)
            .ok_or(SessionError::NotFound(identity))?;
        let window = session
            .embed
            .window()
            .ok_or(SessionError::WindowNotReady(identity))?;
        if session.controller.is_some() {
            return Ok(());
        }

        if let Some(rect) = session.embed.last_bounds() {
            params.desktop_width = rect.width;
            params.desktop_height = rect.height;
        }

        let mut controller = SessionController::new(identity);
        controller.bind(window, self.binder.as_ref(), disconnect_sink(ui, identity, window))?;

        let result = controller.connect(&params);
        session.controller = Some(controller);
        result?;

        self.status.set(identity, true);
        Ok(())
    }

    /// Undoes a launch that failed before it connected.
    pub fn abort_launch(&mut self, identity: Uuid) {
        let connected = self
            .sessions
            .get(&identity)
            .is_some_and(ActiveSession::is_connected);
        if connected {
            return;
        }
        if self.close_session(identity) {
            tracing::warn!(connection_id = %identity, "launch aborted");
        }
        self.status.set(identity, false);
    }

    // ── Layout ──

    /// Refreshes every session of `container` after a size, move or DPI change.
    pub fn layout_pass(&mut self, container: WindowId) {
        for session in self.sessions.values_mut() {
            if session.container == container {
                session.refresh();
            }
        }
    }

    pub fn refresh_bounds(&mut self, identity: Uuid) -> Option<PixelRect> {
        self.sessions.get_mut(&identity)?.refresh()
    }

    pub fn update_display(&mut self, identity: Uuid, width: i32, height: i32) {
        if let Some(controller) = self
            .sessions
            .get_mut(&identity)
            .and_then(|session| session.controller.as_mut())
        {
            controller.update_display(width, height);
        }
    }

    pub fn display_handle(&self, identity: Uuid) -> DisplayHandle {
        DisplayHandle {
            ui: self.ui.clone(),
            identity,
        }
    }

    /// Shows the selected tab's session and hides the container's others.
    pub fn on_tab_selected(&mut self, container: WindowId, tab: TabId) {
        for session in self.sessions.values_mut() {
            if session.container != container {
                continue;
            }
            if session.tab == tab {
                session.embed.show();
                session.refresh();
            } else {
                session.embed.hide();
            }
        }
    }

    fn select_tab(&mut self, container: WindowId, tab: TabId) {
        if let Some(window) = self.containers.get_mut(&container) {
            window.select_tab(tab);
        }
        self.on_tab_selected(container, tab);
    }

    fn focus_session(&mut self, identity: Uuid) {
        let Some((container, tab)) = self
            .sessions
            .get(&identity)
            .map(|session| (session.container, session.tab))
        else {
            return;
        };

        if let Some(window) = self.containers.get_mut(&container) {
            window.bring_to_front();
        }
        self.select_tab(container, tab);
        if let Some(session) = self.sessions.get(&identity) {
            session.embed.focus();
        }
    }

    // ── Close ──

    /// Disposes the controller, then the window, then drops the tab. An
    /// emptied secondary container closes itself.
    pub fn close_session(&mut self, identity: Uuid) -> bool {
        let Some(mut session) = self.sessions.remove(&identity) else {
            return false;
        };

        if let Some(window) = session.embed.window() {
            self.by_window.remove(&window);
        }
        if let Some(mut controller) = session.controller.take() {
            controller.dispose();
        }
        session.embed.dispose();
        self.status.set(identity, false);

        let container = session.container;
        if let Some(window) = self.containers.get_mut(&container) {
            window.remove_tab(session.tab);
            let primary = window.is_primary();
            let empty = window.tab_count() == 0;

            if !primary && empty {
                self.close_container(container);
            } else {
                self.reselect(container);
            }
        }

        tracing::info!(connection_id = %identity, title = %session.title, "session closed");
        true
    }

    pub fn close_by_window(&mut self, window: WindowId) -> bool {
        match self.find_by_window(window) {
            Some(identity) => self.close_session(identity),
            None => false,
        }
    }

    /// Disconnect notification, already marshalled onto the UI thread.
    pub fn on_disconnected(&mut self, identity: Uuid, window: WindowId, reason: DisconnectReason) {
        let current = self
            .sessions
            .get(&identity)
            .and_then(|session| session.embed.window());
        if current != Some(window) {
            tracing::debug!(connection_id = %identity, hwnd = %window, "stale disconnect ignored");
            return;
        }

        tracing::info!(connection_id = %identity, %reason, "rdp session ended");
        self.close_session(identity);
    }

    /// Closes every session, e.g. before the message loop exits.
    pub fn shutdown(&mut self) {
        let identities: Vec<Uuid> = self.sessions.keys().copied().collect();
        for identity in identities {
            self.close_session(identity);
        }
    }

    fn reselect(&mut self, container: WindowId) {
        let any_visible = self
            .sessions
            .values()
            .any(|session| session.container == container && session.embed.is_visible());
        if any_visible {
            return;
        }
        let next = self
            .sessions
            .values()
            .filter(|session| session.container == container)
            .map(|session| session.tab)
            .max();
        if let Some(tab) = next {
            self.select_tab(container, tab);
        }
    }

    // ── Dock / undock ──

    /// Moves a session's tab and native window into another container without
    /// recreating the window or its control.
    ///
    /// On failure the session is left in its original tab, or closed if the
    /// window could not be returned there.
    pub fn move_session(&mut self, identity: Uuid, to: WindowId) -> Result<(), SessionError> {
        let (from, old_tab, title) = self
            .sessions
            .get(&identity)
            .map(|session| (session.container, session.tab, session.title.clone()))
            .ok_or(SessionError::NotFound(identity))?;
        if from == to {
            return Ok(());
        }

        let slot = self
            .containers
            .get_mut(&to)
            .ok_or_else(|| SessionError::Dock(format!("{to} is not a container window")))?
            .add_tab(&title)
            .map_err(|error| SessionError::Dock(format!("creating destination tab: {error}")))?;

        let moved = match self.sessions.get_mut(&identity) {
            Some(session) => session.embed.reparent_to(to, Rc::clone(&slot.layout)),
            None => Err(SessionError::NotFound(identity)),
        };

        if let Err(error) = moved {
            if let Some(destination) = self.containers.get_mut(&to) {
                destination.remove_tab(slot.tab);
            }
            if !self.restore_owner(identity, from) {
                self.close_session(identity);
                return Err(SessionError::Dock(format!(
                    "{error}; window could not be returned, session closed"
                )));
            }
            return Err(SessionError::Dock(error.to_string()));
        }

        if let Some(session) = self.sessions.get_mut(&identity) {
            session.container = to;
            session.tab = slot.tab;
        }
        if let Some(source) = self.containers.get_mut(&from) {
            source.remove_tab(old_tab);
        }

        self.focus_session(identity);

        let source_empty = self
            .containers
            .get(&from)
            .is_some_and(|source| !source.is_primary() && source.tab_count() == 0);
        if source_empty {
            self.close_container(from);
        } else {
            self.reselect(from);
        }

        tracing::info!(connection_id = %identity, from = %from, to = %to, "session moved");
        Ok(())
    }

    /// Opens a new container and moves the session into it.
    pub fn undock(&mut self, identity: Uuid) -> Result<WindowId, SessionError> {
        let factory = self
            .factory
            .clone()
            .ok_or_else(|| SessionError::Dock("no container factory configured".into()))?;
        let title = self
            .sessions
            .get(&identity)
            .map(|session| session.title.clone())
            .ok_or(SessionError::NotFound(identity))?;

        let container = factory
            .create_container(&title)
            .map_err(|error| SessionError::Dock(format!("opening window: {error}")))?;
        let window = self.add_container(container);

        if let Err(error) = self.move_session(identity, window) {
            self.close_container(window);
            return Err(error);
        }
        Ok(window)
    }

    /// Moves the session back into the primary container.
    pub fn dock(&mut self, identity: Uuid) -> Result<(), SessionError> {
        let primary = self
            .primary_container()
            .ok_or_else(|| SessionError::Dock("no primary container".into()))?;
        self.move_session(identity, primary)
    }

    /// Best-effort return of a session's window to `owner` after a failed
    /// move. `false` means the window is no longer where the registry says.
    fn restore_owner(&mut self, identity: Uuid, owner: WindowId) -> bool {
        let Some(window) = self.session_window(identity) else {
            // Not created yet; nothing on screen to return.
            return true;
        };
        match self.platform.reparent(window, owner) {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(connection_id = %identity, hwnd = %window, %error, "failed to restore window owner");
                false
            }
        }
    }
}

fn disconnect_sink(
    ui: UiDispatcher<SessionHost>,
    identity: Uuid,
    window: WindowId,
) -> DisconnectSink {
    Arc::new(move |reason: DisconnectReason| {
        let posted = ui.post(move |host: &mut SessionHost| {
            host.on_disconnected(identity, window, reason)
        });
        if !posted {
            tracing::warn!(connection_id = %identity, "ui thread gone; disconnect dropped");
        }
    })
}

/// Resizes a session's remote display from any thread.
#[derive(Clone)]
pub struct DisplayHandle {
    ui: UiDispatcher<SessionHost>,
    identity: Uuid,
}

impl DisplayHandle {
    pub fn update(&self, width: i32, height: i32) -> bool {
        let identity = self.identity;
        self.ui
            .post(move |host: &mut SessionHost| host.update_display(identity, width, height))
    }
}
