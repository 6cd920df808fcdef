//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, effects and owners work together
//! correctly through the public API.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use trellis_core::reactive::{
    batch, create_render_effect, create_root, create_scope, create_signal, create_user_effect,
    get_context, has_pending_effects, on_cleanup, set_context, Context, Effect, Memo, Runtime,
    Signal,
};
use trellis_core::{configure, flush, ReactiveError, RuntimeConfig};

/// Test that a memo tracks signal dependencies without manual invalidation.
#[test]
fn memo_tracks_signal_dependency() {
    let signal = Signal::new(10);

    let signal_clone = signal.clone();
    let memo = Memo::new(move |_| signal_clone.get() * 2);
    assert_eq!(memo.get(), 20);

    signal.set(5);
    assert_eq!(memo.get(), 10);
}

/// Test that an effect re-runs on its own when a source changes.
#[test]
fn effect_tracks_signal_dependency() {
    let signal = Signal::new(0);
    let observed_value = Arc::new(AtomicI32::new(-1));
    let observed_clone = observed_value.clone();

    let signal_clone = signal.clone();
    let effect = Effect::new(move || {
        observed_clone.store(signal_clone.get(), Ordering::SeqCst);
    });
    assert_eq!(observed_value.load(Ordering::SeqCst), 0);

    signal.set(42);
    assert_eq!(observed_value.load(Ordering::SeqCst), 42);
    effect.dispose();
}

/// A -> B, A -> C, (B, C) -> D: D runs once per change of A and never sees
/// a mix of old and new inputs.
#[test]
fn diamond_is_glitch_free() {
    create_root(|_| {
        let a = Signal::new(1);
        let (a1, a2) = (a.clone(), a.clone());
        let b = Memo::new(move |_| a1.get() * 2);
        let c = Memo::new(move |_| a2.get() + 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (b1, c1, log) = (b.clone(), c.clone(), seen.clone());
        let d = Effect::new(move || log.borrow_mut().push((b1.get(), c1.get())));

        a.set(2);
        a.set(5);
        assert_eq!(*seen.borrow(), [(2, 2), (4, 3), (10, 6)]);
        assert_eq!(d.run_count(), 3);
    });
}

/// Test that a memo depending on another memo updates through the chain.
#[test]
fn memo_depends_on_memo() {
    let signal = Signal::new(2);
    let s = signal.clone();
    let squared = Memo::new(move |_| s.get() * s.get());
    let sq = squared.clone();
    let plus_one = Memo::new(move |_| sq.get() + 1);

    assert_eq!(plus_one.get(), 5);
    signal.set(3);
    assert_eq!(plus_one.get(), 10);
}

/// An unchanged memo result stops propagation before downstream effects.
#[test]
fn equal_memo_result_skips_downstream_effect() {
    create_root(|_| {
        let signal = Signal::new(1);
        let s = signal.clone();
        let parity = Memo::new(move |_| s.get() % 2);
        let runs = Arc::new(AtomicI32::new(0));
        let (p, r) = (parity.clone(), runs.clone());
        Effect::new(move || {
            p.get();
            r.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(3);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        signal.set(4);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    });
}

/// Writes inside a batch produce a single effect run after the batch.
#[test]
fn batch_runs_effect_once() {
    create_root(|_| {
        let (a, set_a) = create_signal(0);
        let (b, set_b) = create_signal(0);
        let runs = Arc::new(AtomicI32::new(0));
        let r = runs.clone();
        Effect::new(move || {
            a.get();
            b.get();
            r.fetch_add(1, Ordering::SeqCst);
        });

        batch(|| {
            set_a.set(1);
            set_b.set(2);
            batch(|| set_a.set(3));
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    });
}

/// A branch that is no longer read stops triggering the effect.
#[test]
fn dynamic_dependencies_are_pruned() {
    create_root(|_| {
        let use_a = Signal::new(true);
        let a = Signal::new("a");
        let b = Signal::new("b");
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (flag, a1, b1, log) = (use_a.clone(), a.clone(), b.clone(), seen.clone());
        Effect::new(move || {
            let value = if flag.get() { a1.get() } else { b1.get() };
            log.borrow_mut().push(value);
        });
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        use_a.set(false);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);

        a.set("ignored");
        b.set("b2");
        assert_eq!(*seen.borrow(), ["a", "b", "b2"]);
    });
}

/// Test that a disposed effect never runs again and frees its nodes.
#[test]
fn disposed_effect_does_not_run() {
    let signal = Signal::new(0);
    let run_count = Arc::new(AtomicI32::new(0));
    let before = Runtime::node_count();

    let root = create_root(|root| {
        let (s, r) = (signal.clone(), run_count.clone());
        Effect::new(move || {
            s.get();
            r.fetch_add(1, Ordering::SeqCst);
        });
        root
    });
    assert_eq!(run_count.load(Ordering::SeqCst), 1);

    root.dispose();
    signal.set(1);
    assert_eq!(run_count.load(Ordering::SeqCst), 1);
    assert_eq!(Runtime::node_count(), before);
    assert_eq!(signal.subscriber_count(), 0);
}

/// Render effects flush before user effects regardless of creation order.
#[test]
fn render_phase_runs_before_user_phase() {
    create_root(|_| {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let (s, l) = (signal.clone(), log.clone());
        create_user_effect(move |_| s.get(), move |_, _| l.borrow_mut().push("user"));
        let (s, l) = (signal.clone(), log.clone());
        create_render_effect(move |_| s.get(), move |_, _| l.borrow_mut().push("render"));
        log.borrow_mut().clear();

        signal.set(1);
        assert_eq!(*log.borrow(), ["render", "user"]);
    });
}

/// Cleanups of a re-running effect run before its next body.
#[test]
fn cleanups_run_between_effect_runs() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let signal = Signal::new(0);

    let root = create_root(|root| {
        let (s, l) = (signal.clone(), log.clone());
        Effect::new(move || {
            let value = s.get();
            l.borrow_mut().push(format!("run {value}"));
            let l = l.clone();
            on_cleanup(move || l.borrow_mut().push(format!("cleanup {value}"))).unwrap();
        });
        root
    });

    signal.set(1);
    root.dispose();
    assert_eq!(*log.borrow(), ["run 0", "cleanup 0", "run 1", "cleanup 1"]);
}

/// A panicking effect leaves the graph consistent and is retried.
#[test]
fn panicking_effect_is_retried() {
    create_root(|_| {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (s, log) = (signal.clone(), seen.clone());
        Effect::new(move || {
            let value = s.get();
            if value == 1 {
                panic!("cannot handle 1");
            }
            log.borrow_mut().push(value);
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| signal.set(1)));
        assert!(result.is_err());
        assert!(!Runtime::is_tracking());
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(2);
        assert_eq!(*seen.borrow(), [0, 2]);
    });
}

/// In manual mode writes only queue effects until `flush`.
#[test]
fn manual_flush_mode_defers_effects() {
    configure(RuntimeConfig::manual());
    create_root(|_| {
        let signal = Signal::new(0);
        let observed = Arc::new(AtomicI32::new(-1));
        let (s, o) = (signal.clone(), observed.clone());
        Effect::new(move || o.store(s.get(), Ordering::SeqCst));

        signal.set(7);
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert!(has_pending_effects());

        flush();
        assert_eq!(observed.load(Ordering::SeqCst), 7);
        assert!(!has_pending_effects());
    });
}

/// An effect that keeps invalidating itself hits the flush limit.
#[test]
fn runaway_effect_hits_flush_limit() {
    configure(RuntimeConfig {
        max_flush_iterations: 10,
        ..RuntimeConfig::default()
    });
    let signal = Signal::new(0);
    let s = signal.clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        create_root(|_| {
            Effect::new(move || {
                let value = s.get();
                s.set(value + 1);
            });
        })
    }));

    let err = result.unwrap_err();
    let message = err.downcast_ref::<String>().cloned().unwrap_or_default();
    assert_eq!(message, ReactiveError::FlushLimit(10).to_string());
    assert!(!has_pending_effects());
}

/// Contexts provided by a scope are visible inside nested effects.
#[test]
fn context_reaches_nested_effects() {
    let theme = Context::<&'static str>::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    create_root(|_| {
        set_context(&theme, "dark").unwrap();
        create_scope(|_| {
            let (t, log) = (theme.clone(), seen.clone());
            Effect::new(move || log.borrow_mut().push(get_context(&t).unwrap()));
        });
    });

    assert_eq!(*seen.borrow(), ["dark"]);
}

/// Full chain: signal -> memo -> effect, all through the runtime.
#[test]
fn full_reactive_chain_with_runtime() {
    let count = Signal::new(1);
    let last_seen = Arc::new(AtomicI32::new(0));

    let root = create_root(|root| {
        let c = count.clone();
        let tripled = Memo::new(move |_| c.get() * 3);
        let (t, seen) = (tripled.clone(), last_seen.clone());
        Effect::new(move || seen.store(t.get(), Ordering::SeqCst));
        root
    });

    for n in 2..=4 {
        count.set(n);
        assert_eq!(last_seen.load(Ordering::SeqCst), n * 3);
    }

    root.dispose();
    count.set(100);
    assert_eq!(last_seen.load(Ordering::SeqCst), 12);
}
