#![allow(dead_code)]

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rdssh_protocol_rdp::{
    AutomationBinder, AutomationError, ContainerFactory, ContainerWindow, DisconnectSink,
    LayoutRect, LayoutSource, OptionValue, PixelRect, RdpAutomation, SessionError, TabId, TabSlot,
    WindowId, WindowPlatform,
};

pub const PRIMARY: WindowId = WindowId(0x100);

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CreateChild { owner: WindowId, window: WindowId },
    SetBounds { window: WindowId, rect: PixelRect },
    Reparent { window: WindowId, to: WindowId },
    Show(WindowId),
    Hide(WindowId),
    Destroy(WindowId),
    Focus { owner: WindowId, child: WindowId },

    Bind(WindowId),
    Server(String),
    UserName(String),
    Domain(String),
    DesktopSize(i32, i32),
    Advanced(String, OptionValue),
    Secured(String, OptionValue),
    Prompt(bool),
    Password(String),
    ResetPassword,
    Connect,
    Disconnect,
    UpdateDisplay(i32, i32),
    Subscribe(WindowId),
    Unsubscribe(WindowId),
    Release(WindowId),

    AddTab { container: WindowId, tab: TabId },
    RemoveTab { container: WindowId, tab: TabId },
    SelectTab { container: WindowId, tab: TabId },
    BringToFront(WindowId),
    CloseContainer(WindowId),
}

/// Everything the fakes did, in order.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// Tabs added to `container` and not yet removed.
    pub fn open_tabs(&self, container: WindowId) -> Vec<TabId> {
        let mut tabs = Vec::new();
        for event in self.events() {
            match event {
                Event::AddTab { container: c, tab } if c == container => tabs.push(tab),
                Event::RemoveTab { container: c, tab } if c == container => {
                    tabs.retain(|t| *t != tab)
                }
                _ => {}
            }
        }
        tabs
    }

    pub fn created_windows(&self) -> Vec<WindowId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::CreateChild { window, .. } => Some(window),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// ── Platform ──

#[derive(Clone)]
pub struct FakePlatform {
    pub journal: Journal,
    pub dpi: Option<u32>,
    pub fail_create: Arc<AtomicBool>,
    pub reject_reparent_to: Arc<Mutex<HashSet<WindowId>>>,
    next: Arc<AtomicIsize>,
}

impl FakePlatform {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            dpi: Some(96),
            fail_create: Arc::new(AtomicBool::new(false)),
            reject_reparent_to: Arc::default(),
            next: Arc::new(AtomicIsize::new(0x1000)),
        }
    }

    pub fn with_dpi(mut self, dpi: Option<u32>) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn reject_reparent_to(&self, owner: WindowId) {
        self.reject_reparent_to.lock().unwrap().insert(owner);
    }
}

impl WindowPlatform for FakePlatform {
    fn create_child(&self, owner: WindowId) -> Result<WindowId, SessionError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SessionError::Platform("CreateWindowExW failed".into()));
        }
        let window = WindowId(self.next.fetch_add(0x10, Ordering::SeqCst));
        self.journal.push(Event::CreateChild { owner, window });
        Ok(window)
    }

    fn set_bounds(&self, window: WindowId, rect: PixelRect) {
        self.journal.push(Event::SetBounds { window, rect });
    }

    fn reparent(&self, window: WindowId, new_owner: WindowId) -> Result<(), SessionError> {
        if self.reject_reparent_to.lock().unwrap().contains(&new_owner) {
            return Err(SessionError::Platform("SetParent failed".into()));
        }
        self.journal.push(Event::Reparent { window, to: new_owner });
        Ok(())
    }

    fn show(&self, window: WindowId) {
        self.journal.push(Event::Show(window));
    }

    fn hide(&self, window: WindowId) {
        self.journal.push(Event::Hide(window));
    }

    fn destroy(&self, window: WindowId) {
        self.journal.push(Event::Destroy(window));
    }

    fn dpi_for(&self, _window: WindowId) -> Option<u32> {
        self.dpi
    }

    fn focus(&self, owner: WindowId, child: WindowId) {
        self.journal.push(Event::Focus { owner, child });
    }
}

/// The first window a fresh [`FakePlatform`] hands out.
pub fn first_window() -> WindowId {
    WindowId(0x1000)
}

// ── Layout ──

#[derive(Default)]
pub struct FakeLayout {
    rect: Mutex<Option<LayoutRect>>,
}

impl FakeLayout {
    pub fn at(rect: LayoutRect) -> Rc<Self> {
        Rc::new(Self {
            rect: Mutex::new(Some(rect)),
        })
    }

    pub fn set(&self, rect: Option<LayoutRect>) {
        *self.rect.lock().unwrap() = rect;
    }
}

impl LayoutSource for FakeLayout {
    fn layout_rect(&self) -> Option<LayoutRect> {
        *self.rect.lock().unwrap()
    }
}

/// The tab content area every fake container lays out.
pub fn content_area() -> LayoutRect {
    LayoutRect::new(0.0, 30.0, 800.0, 570.0)
}

// ── Automation ──

#[derive(Clone, Default)]
pub struct BinderControls {
    pub fail_bind: Arc<AtomicBool>,
    pub fail_connect: Arc<AtomicBool>,
    pub no_dynamic_resize: Arc<AtomicBool>,
    pub sinks: Arc<Mutex<Vec<(WindowId, DisconnectSink)>>>,
}

impl BinderControls {
    pub fn sink_for(&self, window: WindowId) -> Option<DisconnectSink> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(w, _)| *w == window)
            .map(|(_, sink)| Arc::clone(sink))
    }
}

pub struct FakeBinder {
    pub journal: Journal,
    pub controls: BinderControls,
}

impl FakeBinder {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            controls: BinderControls::default(),
        }
    }
}

impl AutomationBinder for FakeBinder {
    fn bind(&self, window: WindowId) -> Result<Box<dyn RdpAutomation>, SessionError> {
        if self.controls.fail_bind.load(Ordering::SeqCst) {
            return Err(SessionError::Binding("class not registered".into()));
        }
        self.journal.push(Event::Bind(window));
        Ok(Box::new(FakeAutomation {
            window,
            journal: self.journal.clone(),
            controls: self.controls.clone(),
        }))
    }
}

pub struct FakeAutomation {
    pub window: WindowId,
    pub journal: Journal,
    pub controls: BinderControls,
}

impl RdpAutomation for FakeAutomation {
    fn set_server(&mut self, host: &str) -> Result<(), AutomationError> {
        self.journal.push(Event::Server(host.into()));
        Ok(())
    }

    fn set_user_name(&mut self, username: &str) -> Result<(), AutomationError> {
        self.journal.push(Event::UserName(username.into()));
        Ok(())
    }

    fn set_domain(&mut self, domain: &str) -> Result<(), AutomationError> {
        self.journal.push(Event::Domain(domain.into()));
        Ok(())
    }

    fn set_desktop_size(&mut self, width: i32, height: i32) -> Result<(), AutomationError> {
        self.journal.push(Event::DesktopSize(width, height));
        Ok(())
    }

    fn set_advanced_option(&mut self, name: &str, value: &OptionValue) -> bool {
        // Models an older client without the newer admin property.
        if name == "ConnectToAdministerServer" {
            return false;
        }
        self.journal.push(Event::Advanced(name.into(), value.clone()));
        true
    }

    fn set_secured_option(&mut self, name: &str, value: &OptionValue) -> bool {
        self.journal.push(Event::Secured(name.into(), value.clone()));
        true
    }

    fn set_prompt_for_credentials(&mut self, prompt: bool) -> bool {
        self.journal.push(Event::Prompt(prompt));
        true
    }

    fn set_clear_text_password(&mut self, password: &str) -> Result<(), AutomationError> {
        self.journal.push(Event::Password(password.into()));
        Ok(())
    }

    fn reset_password(&mut self) {
        self.journal.push(Event::ResetPassword);
    }

    fn connect(&mut self) -> Result<(), AutomationError> {
        self.journal.push(Event::Connect);
        if self.controls.fail_connect.load(Ordering::SeqCst) {
            return Err(AutomationError::new(0x8000_4005, "Connect failed"));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), AutomationError> {
        self.journal.push(Event::Disconnect);
        Ok(())
    }

    fn update_session_display(&mut self, width: i32, height: i32) -> Result<(), AutomationError> {
        if self.controls.no_dynamic_resize.load(Ordering::SeqCst) {
            return Err(AutomationError::new(0x8002_0006, "UpdateSessionDisplaySettings"));
        }
        self.journal.push(Event::UpdateDisplay(width, height));
        Ok(())
    }

    fn subscribe_disconnected(&mut self, sink: DisconnectSink) -> Result<(), AutomationError> {
        self.journal.push(Event::Subscribe(self.window));
        self.controls.sinks.lock().unwrap().push((self.window, sink));
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.journal.push(Event::Unsubscribe(self.window));
    }

    fn release(&mut self) {
        self.journal.push(Event::Release(self.window));
    }
}

// ── Containers ──

pub struct FakeContainer {
    window: WindowId,
    primary: bool,
    journal: Journal,
    tabs: Vec<TabId>,
    layout: Rc<FakeLayout>,
    pub fail_add_tab: Arc<AtomicBool>,
}

static NEXT_TAB: AtomicU64 = AtomicU64::new(1);

impl FakeContainer {
    pub fn new(window: WindowId, primary: bool, journal: Journal) -> Self {
        Self {
            window,
            primary,
            journal,
            tabs: Vec::new(),
            layout: FakeLayout::at(content_area()),
            fail_add_tab: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn primary(journal: Journal) -> Box<dyn ContainerWindow> {
        Box::new(Self::new(PRIMARY, true, journal))
    }
}

impl ContainerWindow for FakeContainer {
    fn window(&self) -> WindowId {
        self.window
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn add_tab(&mut self, _title: &str) -> Result<TabSlot, SessionError> {
        if self.fail_add_tab.load(Ordering::SeqCst) {
            return Err(SessionError::Platform("TCM_INSERTITEM failed".into()));
        }
        let tab = TabId(NEXT_TAB.fetch_add(1, Ordering::SeqCst));
        self.tabs.push(tab);
        self.journal.push(Event::AddTab {
            container: self.window,
            tab,
        });
        Ok(TabSlot {
            tab,
            layout: Rc::clone(&self.layout) as Rc<dyn LayoutSource>,
        })
    }

    fn remove_tab(&mut self, tab: TabId) {
        self.tabs.retain(|t| *t != tab);
        self.journal.push(Event::RemoveTab {
            container: self.window,
            tab,
        });
    }

    fn select_tab(&mut self, tab: TabId) {
        self.journal.push(Event::SelectTab {
            container: self.window,
            tab,
        });
    }

    fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    fn bring_to_front(&mut self) {
        self.journal.push(Event::BringToFront(self.window));
    }

    fn close(&mut self) {
        self.journal.push(Event::CloseContainer(self.window));
    }
}

pub struct FakeFactory {
    journal: Journal,
    next: AtomicIsize,
}

impl FakeFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            next: AtomicIsize::new(0x200),
        }
    }
}

impl ContainerFactory for FakeFactory {
    fn create_container(&self, _title: &str) -> Result<Box<dyn ContainerWindow>, SessionError> {
        let window = WindowId(self.next.fetch_add(0x100, Ordering::SeqCst));
        Ok(Box::new(FakeContainer::new(window, false, self.journal.clone())))
    }
}
