mod common;

use std::rc::Rc;

use common::{Event, FakeLayout, FakePlatform, Journal, PRIMARY};
use rdssh_protocol_rdp::{LayoutRect, NativeWindowEmbed, PixelRect, WindowId};

fn embed_with(platform: FakePlatform, layout: Rc<FakeLayout>) -> NativeWindowEmbed {
    NativeWindowEmbed::new(Rc::new(platform), PRIMARY, layout)
}

#[test]
fn repeated_bounds_updates_do_not_drift() {
    let journal = Journal::default();
    let layout = FakeLayout::at(LayoutRect::new(10.5, 33.25, 801.3, 599.7));
    let mut embed = embed_with(FakePlatform::new(journal.clone()).with_dpi(Some(144)), layout);
    embed.create().expect("window created");

    let first = embed.update_bounds().expect("bounds applied");
    for _ in 0..10 {
        assert_eq!(embed.update_bounds(), Some(first));
    }
    assert_eq!(first, PixelRect::new(16, 50, 1202, 900));
}

#[test]
fn degenerate_layout_never_moves_the_window() {
    let journal = Journal::default();
    let layout = FakeLayout::at(LayoutRect::new(0.0, 0.0, 0.0, 0.0));
    let mut embed = embed_with(FakePlatform::new(journal.clone()), Rc::clone(&layout));
    embed.create().expect("window created");

    layout.set(Some(LayoutRect::new(5.0, 5.0, 1.0, 1.0)));
    assert_eq!(embed.update_bounds(), None);
    layout.set(None);
    assert_eq!(embed.update_bounds(), None);

    assert_eq!(journal.count(|e| matches!(e, Event::SetBounds { .. })), 0);
    assert_eq!(embed.last_bounds(), None);
}

#[test]
fn failed_dpi_lookup_skips_the_update() {
    let journal = Journal::default();
    let mut embed = embed_with(
        FakePlatform::new(journal.clone()).with_dpi(None),
        FakeLayout::at(common::content_area()),
    );
    embed.create().expect("window created");

    assert_eq!(embed.update_bounds(), None);
    assert_eq!(journal.count(|e| matches!(e, Event::SetBounds { .. })), 0);
}

#[test]
fn create_is_idempotent_and_failure_is_sticky() {
    let journal = Journal::default();
    let platform = FakePlatform::new(journal.clone());
    let mut embed = embed_with(platform.clone(), FakeLayout::at(common::content_area()));

    let window = embed.create().expect("window created");
    assert_eq!(embed.create().expect("same window"), window);
    assert_eq!(journal.created_windows(), vec![window]);

    platform.fail_create.store(true, std::sync::atomic::Ordering::SeqCst);
    let mut broken = embed_with(platform.clone(), FakeLayout::at(common::content_area()));
    assert!(broken.create().is_err());
    platform.fail_create.store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(broken.create().is_err(), "a failed embed cannot be retried in place");
}

#[test]
fn bounds_listeners_hear_every_applied_rect() {
    let journal = Journal::default();
    let mut embed = embed_with(FakePlatform::new(journal), FakeLayout::at(common::content_area()));

    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    embed.on_bounds_changed(move |rect| sink.borrow_mut().push(rect));

    embed.create().expect("window created");
    embed.update_bounds();

    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(seen.borrow()[0], PixelRect::new(0, 30, 800, 570));
}

#[test]
fn dispose_hides_then_destroys_once() {
    let journal = Journal::default();
    let mut embed = embed_with(FakePlatform::new(journal.clone()), FakeLayout::at(common::content_area()));
    let window = embed.create().expect("window created");

    embed.dispose();
    embed.dispose();

    let hide = journal.position(&Event::Hide(window)).expect("hidden");
    let destroy = journal.position(&Event::Destroy(window)).expect("destroyed");
    assert!(hide < destroy);
    assert_eq!(journal.count(|e| matches!(e, Event::Destroy(_))), 1);

    journal.clear();
    assert_eq!(embed.update_bounds(), None);
    embed
        .reparent_to(WindowId(0x999), FakeLayout::at(common::content_area()))
        .expect("no-op after dispose");
    assert!(journal.events().is_empty());
}

#[test]
fn reparent_keeps_the_window() {
    let journal = Journal::default();
    let mut embed = embed_with(FakePlatform::new(journal.clone()), FakeLayout::at(common::content_area()));
    let window = embed.create().expect("window created");

    let target = WindowId(0x300);
    embed
        .reparent_to(target, FakeLayout::at(LayoutRect::new(0.0, 0.0, 640.0, 480.0)))
        .expect("reparented");
    assert_eq!(embed.owner(), target);
    assert_eq!(embed.window(), Some(window));
    assert_eq!(embed.last_bounds(), None);

    assert_eq!(embed.update_bounds(), Some(PixelRect::new(0, 0, 640, 480)));
    assert_eq!(journal.created_windows().len(), 1);
}

#[tokio::test]
async fn ready_signal_resolves_with_the_created_window() {
    let journal = Journal::default();
    let mut embed = embed_with(FakePlatform::new(journal), FakeLayout::at(common::content_area()));
    let ready = embed.ready();
    assert_eq!(ready.get(), None);

    let window = embed.create().expect("window created");
    assert_eq!(ready.wait().await, Some(window));
    // Late subscribers see the value immediately.
    assert_eq!(embed.ready().wait().await, Some(window));
}

#[tokio::test]
async fn ready_signal_fails_when_the_embed_goes_away() {
    let journal = Journal::default();
    let embed = embed_with(FakePlatform::new(journal), FakeLayout::at(common::content_area()));
    let ready = embed.ready();
    drop(embed);
    assert_eq!(ready.wait().await, None);
}
