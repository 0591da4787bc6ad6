use std::rc::Rc;

use tokio::sync::watch;

use crate::error::SessionError;
use crate::geometry::{self, PixelRect};
use crate::platform::{LayoutSource, WindowId, WindowPlatform};

type BoundsListener = Box<dyn FnMut(PixelRect)>;

/// A native child window whose bounds follow a laid-out area of its owner.
///
/// Lives on the UI thread. The window can move to another owner without
/// being recreated; it is destroyed only by [`NativeWindowEmbed::dispose`].
pub struct NativeWindowEmbed {
    platform: Rc<dyn WindowPlatform>,
    owner: WindowId,
    layout: Rc<dyn LayoutSource>,
    window: Option<WindowId>,
    failed: bool,
    disposed: bool,
    visible: bool,
    last_bounds: Option<PixelRect>,
    ready_tx: watch::Sender<Option<WindowId>>,
    listeners: Vec<BoundsListener>,
}

impl NativeWindowEmbed {
    pub fn new(
        platform: Rc<dyn WindowPlatform>,
        owner: WindowId,
        layout: Rc<dyn LayoutSource>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(None);
        Self {
            platform,
            owner,
            layout,
            window: None,
            failed: false,
            disposed: false,
            visible: true,
            last_bounds: None,
            ready_tx,
            listeners: Vec::new(),
        }
    }

    pub fn window(&self) -> Option<WindowId> {
        self.window
    }

    pub fn owner(&self) -> WindowId {
        self.owner
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn last_bounds(&self) -> Option<PixelRect> {
        self.last_bounds
    }

    /// Resolves once the child window exists. Fails if the embed is dropped
    /// first.
    pub fn ready(&self) -> ReadySignal {
        ReadySignal {
            rx: self.ready_tx.subscribe(),
        }
    }

    pub fn on_bounds_changed(&mut self, listener: impl FnMut(PixelRect) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Creates the child window. A second call returns the existing handle.
    pub fn create(&mut self) -> Result<WindowId, SessionError> {
        if let Some(window) = self.window {
            return Ok(window);
        }
        if self.disposed {
            return Err(SessionError::Platform("embed already disposed".into()));
        }
        if self.failed {
            return Err(SessionError::Platform(
                "window creation failed earlier for this embed".into(),
            ));
        }

        let window = match self.platform.create_child(self.owner) {
            Ok(window) => window,
            Err(error) => {
                self.failed = true;
                return Err(error);
            }
        };

        tracing::debug!(hwnd = %window, owner = %self.owner, "native child window created");
        self.window = Some(window);
        if !self.visible {
            self.platform.hide(window);
        }
        self.ready_tx.send_replace(Some(window));
        self.update_bounds();
        Ok(window)
    }

    /// Moves the child window over its layout area. Returns the applied
    /// rectangle, or `None` when there was nothing to do.
    pub fn update_bounds(&mut self) -> Option<PixelRect> {
        if self.disposed {
            return None;
        }
        let window = self.window?;

        let Some(layout) = self.layout.layout_rect() else {
            tracing::trace!(hwnd = %window, "hosting area not laid out yet");
            return None;
        };
        if layout.is_degenerate() {
            return None;
        }

        let Some(dpi) = self.platform.dpi_for(self.owner) else {
            tracing::warn!(hwnd = %window, owner = %self.owner, "dpi lookup failed; skipping bounds update");
            return None;
        };

        let rect = geometry::to_physical(layout, dpi)?;
        self.platform.set_bounds(window, rect);
        self.last_bounds = Some(rect);

        for listener in &mut self.listeners {
            listener(rect);
        }
        Some(rect)
    }

    /// Hands the window to another top-level owner. Callers refresh bounds
    /// afterwards.
    pub fn reparent_to(
        &mut self,
        new_owner: WindowId,
        layout: Rc<dyn LayoutSource>,
    ) -> Result<(), SessionError> {
        if self.disposed {
            return Ok(());
        }

        if let Some(window) = self.window {
            self.platform.reparent(window, new_owner)?;
            tracing::debug!(hwnd = %window, from = %self.owner, to = %new_owner, "native child reparented");
        }

        self.owner = new_owner;
        self.layout = layout;
        self.last_bounds = None;
        Ok(())
    }

    pub fn show(&mut self) {
        self.visible = true;
        if let (false, Some(window)) = (self.disposed, self.window) {
            self.platform.show(window);
        }
    }

    pub fn hide(&mut self) {
        self.visible = false;
        if let (false, Some(window)) = (self.disposed, self.window) {
            self.platform.hide(window);
        }
    }

    pub fn focus(&self) {
        if let (false, Some(window)) = (self.disposed, self.window) {
            self.platform.focus(self.owner, window);
        }
    }

    /// Hides then destroys the window. Safe to repeat.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.listeners.clear();

        if let Some(window) = self.window.take() {
            self.platform.hide(window);
            self.platform.destroy(window);
            tracing::debug!(hwnd = %window, "native child window destroyed");
        }
    }
}

impl Drop for NativeWindowEmbed {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// One-shot "child window ready" signal.
#[derive(Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<Option<WindowId>>,
}

impl ReadySignal {
    /// Already-fulfilled signals resolve immediately.
    pub async fn wait(mut self) -> Option<WindowId> {
        self.rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|window| *window)
    }

    pub fn get(&self) -> Option<WindowId> {
        *self.rx.borrow()
    }
}
