use amnis_reactor::{Item, Owner, Reactor};

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Default)]
struct TickProbe {
    ticks: AtomicUsize,
}

fn on_tick(target: Option<&Owner>) {
    let probe = target
        .and_then(|owner| owner.downcast_ref::<TickProbe>())
        .expect("target is a TickProbe");
    probe.ticks.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn timer_fires_once_per_pass() {
    let reactor = Reactor::new().unwrap();
    let probe = Arc::new(TickProbe::default());

    reactor.add_timer(on_tick, Some(probe.clone()));

    reactor.run_timers();
    reactor.run_timers();
    reactor.run_timers();

    assert_eq!(probe.ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn delete_before_any_pass_means_zero_invocations() {
    let reactor = Reactor::new().unwrap();
    let probe = Arc::new(TickProbe::default());

    reactor.add_timer(on_tick, Some(probe.clone()));
    reactor.del_timer(on_tick, Some(probe.clone()));

    reactor.run_timers();

    assert_eq!(probe.ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn delete_distinguishes_targets() {
    let reactor = Reactor::new().unwrap();
    let kept = Arc::new(TickProbe::default());
    let deleted = Arc::new(TickProbe::default());

    reactor.add_timer(on_tick, Some(kept.clone()));
    reactor.add_timer(on_tick, Some(deleted.clone()));
    reactor.del_timer(on_tick, Some(deleted.clone()));

    reactor.run_timers();

    assert_eq!(kept.ticks.load(Ordering::SeqCst), 1);
    assert_eq!(deleted.ticks.load(Ordering::SeqCst), 0);
}

static STALE_TICKS: AtomicUsize = AtomicUsize::new(0);

fn on_stale_tick(_target: Option<&Owner>) {
    STALE_TICKS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn stale_delete_consumes_the_next_matching_add() {
    let reactor = Reactor::new().unwrap();

    // Deleting a timer that was never added stays pending.
    reactor.del_timer(on_stale_tick, None);
    reactor.run_timers();
    assert_eq!(STALE_TICKS.load(Ordering::SeqCst), 0);

    // The pending deletion eats the next matching addition.
    reactor.add_timer(on_stale_tick, None);
    reactor.run_timers();
    assert_eq!(STALE_TICKS.load(Ordering::SeqCst), 0);

    // After that the deletion is gone.
    reactor.add_timer(on_stale_tick, None);
    reactor.run_timers();
    assert_eq!(STALE_TICKS.load(Ordering::SeqCst), 1);
}

static DUP_TICKS: AtomicUsize = AtomicUsize::new(0);

fn on_dup_tick(_target: Option<&Owner>) {
    DUP_TICKS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn duplicate_identity_delete_removes_one_entry() {
    let reactor = Reactor::new().unwrap();

    reactor.add_timer(on_dup_tick, None);
    reactor.add_timer(on_dup_tick, None);

    reactor.run_timers();
    assert_eq!(DUP_TICKS.load(Ordering::SeqCst), 2);

    reactor.del_timer(on_dup_tick, None);
    reactor.run_timers();
    assert_eq!(DUP_TICKS.load(Ordering::SeqCst), 3);

    reactor.del_timer(on_dup_tick, None);
    reactor.run_timers();
    assert_eq!(DUP_TICKS.load(Ordering::SeqCst), 3);
}

static SHARED: OnceLock<Reactor> = OnceLock::new();
static CHILD_SPAWNED: AtomicBool = AtomicBool::new(false);
static CHILD_TICKS: AtomicUsize = AtomicUsize::new(0);

fn child_tick(_target: Option<&Owner>) {
    CHILD_TICKS.fetch_add(1, Ordering::SeqCst);
}

fn spawning_tick(_target: Option<&Owner>) {
    if !CHILD_SPAWNED.swap(true, Ordering::SeqCst) {
        SHARED
            .get()
            .expect("shared reactor")
            .add_timer(child_tick, None);
    }
}

#[test]
fn timer_added_from_a_callback_runs_on_a_later_pass() {
    let reactor = SHARED.get_or_init(|| Reactor::new().unwrap());

    reactor.add_timer(spawning_tick, None);

    // The child is staged during the pass and promoted by the closing
    // reconcile, but not fired within the same pass.
    reactor.run_timers();
    assert_eq!(CHILD_TICKS.load(Ordering::SeqCst), 0);

    reactor.run_timers();
    assert_eq!(CHILD_TICKS.load(Ordering::SeqCst), 1);

    reactor.del_timer(spawning_tick, None);
    reactor.del_timer(child_tick, None);
}

static ORDER: Mutex<Vec<char>> = Mutex::new(Vec::new());

fn order_a(_target: Option<&Owner>) {
    ORDER.lock().unwrap().push('a');
}

fn order_b(_target: Option<&Owner>) {
    ORDER.lock().unwrap().push('b');
}

#[test]
fn later_additions_run_before_older_timers() {
    let reactor = Reactor::new().unwrap();

    reactor.add_timer(order_a, None);
    reactor.run_timers();

    reactor.add_timer(order_b, None);
    reactor.run_timers();

    assert_eq!(*ORDER.lock().unwrap(), vec!['a', 'b', 'a']);
}

#[derive(Default)]
struct ItemProbe {
    timer: AtomicUsize,
    last_tag: AtomicU64,
}

fn item_probe(owner: &Owner) -> &ItemProbe {
    owner.downcast_ref::<ItemProbe>().expect("owner is an ItemProbe")
}

fn on_item_readable(_fd: RawFd, _owner: &Owner, _tag: u64) {}

fn on_item_closed(_fd: RawFd, _owner: &Owner, _tag: u64) {}

fn on_item_timer(_fd: RawFd, owner: &Owner, tag: u64) {
    let p = item_probe(owner);
    p.timer.fetch_add(1, Ordering::SeqCst);
    p.last_tag.store(tag, Ordering::SeqCst);
}

fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe(2) failed");
    (fds[0], fds[1])
}

fn close_fd(fd: RawFd) {
    unsafe { libc::close(fd) };
}

#[test]
fn item_timer_fires_per_pass_until_removal() {
    let reactor = Reactor::new().unwrap();
    let (r, w) = pipe();
    let owner = Arc::new(ItemProbe::default());

    let item = Item::new(r, owner.clone(), 3)
        .on_readable(on_item_readable)
        .on_closed(on_item_closed)
        .on_timer(on_item_timer);
    reactor.add(item).unwrap();

    reactor.run_timers();
    reactor.run_timers();
    assert_eq!(owner.timer.load(Ordering::SeqCst), 2);
    assert_eq!(owner.last_tag.load(Ordering::SeqCst), 3);

    reactor.remove(r).unwrap();

    reactor.run_timers();
    assert_eq!(owner.timer.load(Ordering::SeqCst), 2);

    close_fd(r);
    close_fd(w);
}
