//! Integration tests for the invocation protocol and context teardown,
//! driven through fake builders and loaders.
#![allow(unsafe_code)]

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

use kindle_core::testutil::{
    destroy_label, label_ptr, read_label, record, script, take_events, FakeBuilder, FakeLoader,
};
use kindle_core::{BuildConfig, Runtime, RuntimeError};

fn runtime() -> (Runtime, FakeBuilder) {
    let builder = FakeBuilder::new();
    let runtime = Runtime::with_parts(Box::new(builder.clone()), Box::new(FakeLoader::new()))
        .with_config(BuildConfig::isolated());
    (runtime, builder)
}

#[test]
fn n_invocations_push_n_frames() {
    let (mut rt, builder) = runtime();
    for n in 1..=5 {
        rt.exec("snippet").unwrap();
        assert_eq!(rt.context().frame_count(), n + 1);
    }
    assert_eq!(builder.seqs(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn failures_do_not_consume_sequence_numbers() {
    let (mut rt, builder) = runtime();
    rt.exec("one").unwrap();
    builder.fail_next("boom");
    assert!(matches!(rt.exec("broken"), Err(RuntimeError::Build(_))));
    rt.exec("two").unwrap();

    assert_eq!(builder.seqs(), vec![1, 2]);
    assert_eq!(rt.context().frame_count(), 3);
}

#[test]
fn runtime_teardown_order() {
    take_events();
    {
        let (mut rt, _) = runtime();

        script(|ctx| {
            ctx.set(label_ptr("v1a"), c"v1a", Some(destroy_label));
            ctx.set(label_ptr("v1b"), c"v1b", Some(destroy_label));
        });
        rt.exec("first").unwrap();

        script(|ctx| {
            ctx.set(label_ptr("v2a"), c"v2a", Some(destroy_label));
        });
        rt.exec("second").unwrap();
    }

    assert_eq!(
        take_events(),
        vec![
            "destroy(v2a)",
            "unload(a2)",
            "destroy(v1b)",
            "destroy(v1a)",
            "unload(a1)",
        ]
    );
}

#[test]
fn host_variables_outlive_every_module() {
    take_events();
    {
        let (mut rt, _) = runtime();
        rt.set_ctx_var(label_ptr("host"), "config", Some(Box::new(|p| unsafe { destroy_label(p) })));
        rt.exec("first").unwrap();
    }
    assert_eq!(take_events(), vec!["unload(a1)", "destroy(host)"]);
}

#[test]
fn later_snippets_read_earlier_results() {
    let (mut rt, _) = runtime();

    script(|ctx| {
        ctx.set(label_ptr("produced"), c"result", Some(destroy_label));
    });
    rt.exec("producer").unwrap();

    let seen = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&seen);
    script(move |ctx| {
        let value = ctx.get(c"result").map(|p| unsafe { read_label(p) });
        *slot.borrow_mut() = value;
    });
    rt.exec("consumer").unwrap();

    assert_eq!(seen.borrow().as_deref(), Some("produced"));
}

#[test]
fn shadowed_variable_restored_after_pop() {
    let (mut rt, _) = runtime();

    script(|ctx| {
        ctx.set(label_ptr("A"), c"x", Some(destroy_label));
    });
    rt.exec("one").unwrap();
    script(|ctx| {
        ctx.set(label_ptr("B"), c"x", Some(destroy_label));
    });
    rt.exec("two").unwrap();

    let x = rt.get_ctx_var("x").unwrap();
    assert_eq!(unsafe { read_label(x) }, "B");

    rt.pop_frame();
    let x = rt.get_ctx_var("x").unwrap();
    assert_eq!(unsafe { read_label(x) }, "A");
}

#[test]
fn release_runs_exactly_once_and_late() {
    let count = Rc::new(RefCell::new(0));
    {
        let (mut rt, _) = runtime();
        rt.exec("one").unwrap();

        let counter = Rc::clone(&count);
        rt.set_ctx_var(
            std::ptr::null_mut::<c_void>(),
            "marker",
            Some(Box::new(move |_| {
                *counter.borrow_mut() += 1;
                record("marker released");
            })),
        );
        rt.exec("two").unwrap();
        assert_eq!(*count.borrow(), 0);

        rt.pop_frame();
        assert_eq!(*count.borrow(), 0);
        assert!(rt.context().get("marker").is_some());

        rt.pop_frame();
        assert_eq!(*count.borrow(), 1);
        assert!(rt.context().get("marker").is_none());
    }
    assert_eq!(*count.borrow(), 1);
    assert_eq!(take_events(), vec!["unload(a2)", "marker released", "unload(a1)"]);
}

#[test]
#[should_panic(expected = "context has no frames")]
fn registering_into_empty_context_panics() {
    let (mut rt, _) = runtime();
    while rt.pop_frame() {}
    rt.set_ctx_value("x", Box::new(1i32));
}
