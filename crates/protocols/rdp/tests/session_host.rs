mod common;

use std::rc::Rc;

use common::{BinderControls, Event, FakeBinder, FakeContainer, FakeFactory, FakePlatform, Journal, PRIMARY};
use rdssh_domain::RdpOptions;
use rdssh_protocol_rdp::{
    channel, ConnectParams, ConnectionStatus, ContainerDirectory, DisconnectReason, DispatchQueue,
    PixelRect, ReadySignal, SessionError, SessionHost, SessionState, StartOutcome, WindowId,
};
use uuid::Uuid;
use zeroize::Zeroizing;

struct Harness {
    host: SessionHost,
    queue: DispatchQueue<SessionHost>,
    journal: Journal,
    platform: FakePlatform,
    binder: BinderControls,
    status: ConnectionStatus,
    directory: ContainerDirectory,
}

impl Harness {
    fn new() -> Self {
        let journal = Journal::default();
        let platform = FakePlatform::new(journal.clone());
        let binder = FakeBinder::new(journal.clone());
        let controls = binder.controls.clone();
        let status = ConnectionStatus::new();
        let directory = ContainerDirectory::new();
        let (ui, queue) = channel::<SessionHost>();

        let mut host = SessionHost::new(
            Rc::new(platform.clone()),
            Rc::new(binder),
            ui,
            status.clone(),
            directory.clone(),
        )
        .with_factory(Rc::new(FakeFactory::new(journal.clone())));
        host.add_container(FakeContainer::primary(journal.clone()));

        Self {
            host,
            queue,
            journal,
            platform,
            binder: controls,
            status,
            directory,
        }
    }

    fn pump(&mut self) {
        self.queue.drain(&mut self.host);
    }

    /// Reserves a tab and lets the UI pass create the window.
    fn start(&mut self, id: Uuid) -> ReadySignal {
        let ready = match self.host.start_or_focus(id, "srv1").expect("started") {
            StartOutcome::Started(ready) => ready,
            StartOutcome::Focused => panic!("expected a new session"),
        };
        self.pump();
        ready
    }

    fn connect(&mut self, id: Uuid) -> WindowId {
        let ready = self.start(id);
        let window = ready.get().expect("window ready");
        self.host.connect_session(id, params()).expect("connected");
        window
    }
}

fn params() -> ConnectParams {
    ConnectParams {
        host: "srv1".into(),
        port: 3389,
        username: "alice".into(),
        domain: None,
        password: Some(Zeroizing::new("pw".into())),
        desktop_width: 1280,
        desktop_height: 720,
        options: RdpOptions::default(),
        prompt_override: None,
    }
}

#[test]
fn second_start_focuses_the_existing_session() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);

    match h.host.start_or_focus(id, "srv1").expect("focused") {
        StartOutcome::Focused => {}
        StartOutcome::Started(_) => panic!("duplicate session"),
    }
    h.pump();

    assert_eq!(h.journal.created_windows(), vec![window]);
    assert_eq!(h.host.session_count(), 1);
    assert_eq!(h.journal.count(|e| *e == Event::BringToFront(PRIMARY)), 2);
    assert!(h
        .journal
        .position(&Event::Focus {
            owner: PRIMARY,
            child: window
        })
        .is_some());
}

#[test]
fn new_session_raises_its_container() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    h.start(id);

    let tab = h.host.session_tab(id).expect("tab reserved");
    let raised = h.journal.position(&Event::BringToFront(PRIMARY)).expect("raised");
    let selected = h
        .journal
        .position(&Event::SelectTab {
            container: PRIMARY,
            tab,
        })
        .expect("selected");
    assert!(raised < selected);
}

#[test]
fn activation_raises_the_primary_container() {
    let mut h = Harness::new();
    assert!(h.host.bring_primary_to_front());
    assert_eq!(h.journal.count(|e| *e == Event::BringToFront(PRIMARY)), 1);

    h.host.on_container_closed(PRIMARY);
    assert!(!h.host.bring_primary_to_front());
}

#[test]
fn connect_uses_the_laid_out_size() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    h.connect(id);

    assert!(h.journal.position(&Event::DesktopSize(800, 570)).is_some());
    assert_eq!(h.host.session_state(id), Some(SessionState::Connected));
    assert!(h.status.is_connected(id));
}

#[test]
fn close_disposes_controller_before_destroying_the_window() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);

    assert!(h.host.close_session(id));
    assert!(!h.host.close_session(id));

    let release = h.journal.position(&Event::Release(window)).expect("released");
    let destroy = h.journal.position(&Event::Destroy(window)).expect("destroyed");
    let unsubscribe = h.journal.position(&Event::Unsubscribe(window)).expect("unsubscribed");
    assert!(unsubscribe < release);
    assert!(release < destroy);

    assert_eq!(h.host.session_count(), 0);
    assert_eq!(h.host.find_by_window(window), None);
    assert!(!h.status.is_connected(id));
    assert_eq!(
        h.journal.count(|e| matches!(e, Event::RemoveTab { container, .. } if *container == PRIMARY)),
        1
    );
    assert_eq!(h.journal.count(|e| matches!(e, Event::CloseContainer(_))), 0);
}

#[test]
fn remote_disconnect_cleans_up_within_one_dispatch_cycle() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);

    // The control fires its event on a thread of its own.
    let sink = h.binder.sink_for(window).expect("subscribed");
    std::thread::spawn(move || sink(DisconnectReason::new(3)))
        .join()
        .expect("event thread");

    assert!(h.host.contains(id), "nothing happens off the UI thread");
    h.pump();

    assert!(!h.host.contains(id));
    assert!(!h.status.is_connected(id));
    assert!(h.journal.position(&Event::Destroy(window)).is_some());
    assert_eq!(h.journal.count(|e| matches!(e, Event::RemoveTab { .. })), 1);
}

#[test]
fn stale_disconnect_for_an_old_window_is_ignored() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);

    h.host
        .on_disconnected(id, WindowId(window.0 + 1), DisconnectReason::new(2));
    assert!(h.host.contains(id));
}

#[test]
fn window_creation_failure_removes_the_reservation() {
    let mut h = Harness::new();
    h.platform
        .fail_create
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let id = Uuid::new_v4();

    let ready = match h.host.start_or_focus(id, "srv1").expect("tab reserved") {
        StartOutcome::Started(ready) => ready,
        StartOutcome::Focused => panic!("unexpected focus"),
    };
    h.pump();

    assert!(!h.host.contains(id));
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    assert_eq!(rt.block_on(ready.wait()), None);
    assert_eq!(h.journal.count(|e| matches!(e, Event::RemoveTab { .. })), 1);
}

#[test]
fn connect_before_the_window_exists_is_rejected() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    h.host.start_or_focus(id, "srv1").expect("tab reserved");

    let result = h.host.connect_session(id, params());
    assert!(matches!(result, Err(SessionError::WindowNotReady(_))));
}

#[test]
fn selecting_a_tab_shows_only_its_session() {
    let mut h = Harness::new();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let first_window = h.connect(first);
    let second_window = h.connect(second);
    h.journal.clear();

    let tab = h.host.session_tab(first).expect("tab");
    h.host.on_tab_selected(PRIMARY, tab);

    assert!(h.journal.position(&Event::Show(first_window)).is_some());
    assert!(h.journal.position(&Event::Hide(second_window)).is_some());
    assert!(h
        .journal
        .events()
        .iter()
        .any(|e| matches!(e, Event::SetBounds { window, .. } if *window == first_window)));
}

#[test]
fn layout_pass_resizes_connected_sessions() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);
    h.journal.clear();

    h.host.layout_pass(PRIMARY);
    assert_eq!(
        h.journal.events(),
        vec![Event::SetBounds {
            window,
            rect: PixelRect::new(0, 30, 800, 570)
        }],
        "same size: no display update"
    );
}

#[test]
fn undock_and_dock_keep_the_binding() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);

    let secondary = h.host.undock(id).expect("undocked");
    assert_eq!(h.host.session_container(id), Some(secondary));
    assert_eq!(h.host.session_state(id), Some(SessionState::Connected));
    assert_eq!(h.host.session_window(id), Some(window));
    assert_eq!(h.host.find_by_window(window), Some(id));
    assert!(h.host.sessions_in(PRIMARY).is_empty());
    assert_eq!(h.host.sessions_in(secondary), vec![id]);
    assert_eq!(h.directory.list().len(), 2);
    assert!(h
        .journal
        .position(&Event::Reparent {
            window,
            to: secondary
        })
        .is_some());
    assert!(h.journal.open_tabs(PRIMARY).is_empty());
    assert_eq!(h.journal.open_tabs(secondary), vec![h.host.session_tab(id).expect("tab")]);

    h.host.dock(id).expect("docked");
    assert_eq!(h.host.session_container(id), Some(PRIMARY));
    assert_eq!(h.host.session_state(id), Some(SessionState::Connected));
    assert!(h.journal.position(&Event::CloseContainer(secondary)).is_some());
    assert_eq!(h.directory.list().len(), 1);
    assert!(h.journal.open_tabs(secondary).is_empty());
    assert_eq!(h.journal.open_tabs(PRIMARY), vec![h.host.session_tab(id).expect("tab")]);

    assert_eq!(h.journal.created_windows(), vec![window]);
    assert_eq!(h.journal.count(|e| matches!(e, Event::Destroy(_))), 0);
    assert_eq!(h.journal.count(|e| matches!(e, Event::Release(_))), 0);
}

#[test]
fn failed_move_leaves_the_session_in_its_original_tab() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);
    let original_tab = h.host.session_tab(id);

    let secondary = WindowId(0x200);
    h.platform.reject_reparent_to(secondary);

    let result = h.host.undock(id);
    assert!(matches!(result, Err(SessionError::Dock(_))));

    assert_eq!(h.host.session_container(id), Some(PRIMARY));
    assert_eq!(h.host.session_tab(id), original_tab);
    assert_eq!(h.host.session_state(id), Some(SessionState::Connected));
    assert!(h.journal.position(&Event::Destroy(window)).is_none());
    assert!(h.journal.position(&Event::CloseContainer(secondary)).is_some());
    assert_eq!(h.host.container_count(), 1);
}

#[test]
fn unrecoverable_move_disposes_the_session() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);

    h.platform.reject_reparent_to(WindowId(0x200));
    h.platform.reject_reparent_to(PRIMARY);

    assert!(h.host.undock(id).is_err());
    assert!(!h.host.contains(id));

    let release = h.journal.position(&Event::Release(window)).expect("released");
    let destroy = h.journal.position(&Event::Destroy(window)).expect("destroyed");
    assert!(release < destroy);
    assert!(!h.status.is_connected(id));
}

#[test]
fn closing_a_container_closes_its_sessions() {
    let mut h = Harness::new();
    let id = Uuid::new_v4();
    let window = h.connect(id);
    let secondary = h.host.undock(id).expect("undocked");

    h.host.on_container_closed(secondary);

    assert!(!h.host.contains(id));
    assert!(h.journal.position(&Event::Destroy(window)).is_some());
    assert_eq!(h.host.container_count(), 1);
    assert_eq!(h.directory.primary(), Some(PRIMARY));
}

#[test]
fn close_by_window_finds_sessions_in_any_container() {
    let mut h = Harness::new();
    let docked = Uuid::new_v4();
    let undocked = Uuid::new_v4();
    h.connect(docked);
    let undocked_window = h.connect(undocked);
    h.host.undock(undocked).expect("undocked");

    assert!(h.host.close_by_window(undocked_window));
    assert!(!h.host.contains(undocked));
    assert!(h.host.contains(docked));
    assert!(!h.host.close_by_window(WindowId(0xdead)));
}

#[test]
fn abort_spares_connected_sessions() {
    let mut h = Harness::new();
    let live = Uuid::new_v4();
    let pending = Uuid::new_v4();
    h.connect(live);
    h.start(pending);

    h.host.abort_launch(live);
    h.host.abort_launch(pending);

    assert!(h.host.contains(live));
    assert!(!h.host.contains(pending));
}
