//! End-to-end tests against the system C compiler.
//!
//! Each test returns early when no compiler is installed.
#![allow(unsafe_code)]

use std::process::Command;

use kindle_core::{BuildError, Runtime, RuntimeError};

fn have_compiler() -> bool {
    ["clang", "gcc", "cc"]
        .iter()
        .any(|cc| Command::new(cc).arg("--version").output().is_ok_and(|o| o.status.success()))
}

const PRODUCER: &str = r#"
#include <stdlib.h>
#include "kindle.h"

KINDLE_ENTRY {
    int *answer = malloc(sizeof *answer);
    *answer = ANSWER;
    kindle_set(ctx, answer, "answer", free);
    kindle_log(ctx, "answer registered");
}
"#;

const CONSUMER: &str = r#"
#include <stdlib.h>
#include "kindle.h"

KINDLE_ENTRY {
    int *answer = kindle_get(ctx, "answer");
    int *doubled = malloc(sizeof *doubled);
    *doubled = answer ? *answer * 2 : -1;
    kindle_set(ctx, doubled, "doubled", free);
}
"#;

#[test]
fn compiled_snippets_share_variables() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let mut rt = Runtime::new();
    rt.set_defines(vec!["ANSWER=21".to_string()]);

    rt.exec(PRODUCER).unwrap();
    rt.exec(CONSUMER).unwrap();
    assert_eq!(rt.context().frame_count(), 3);

    let answer = rt.get_ctx_var("answer").unwrap();
    let doubled = rt.get_ctx_var("doubled").unwrap();
    assert_eq!(unsafe { *answer.cast::<i32>() }, 21);
    assert_eq!(unsafe { *doubled.cast::<i32>() }, 42);
}

#[test]
fn host_value_visible_to_snippet() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let mut rt = Runtime::new();
    rt.set_ctx_value("answer", Box::new(5i32));
    rt.exec(CONSUMER).unwrap();

    let doubled = rt.get_ctx_var("doubled").unwrap();
    assert_eq!(unsafe { *doubled.cast::<i32>() }, 10);
}

#[test]
fn compile_error_reports_diagnostics() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let mut rt = Runtime::new();
    let err = rt.exec("this is not C").unwrap_err();
    match err {
        RuntimeError::Build(build) => {
            assert!(matches!(build, BuildError::Toolchain { .. }));
            assert!(!build.diagnostics().unwrap_or_default().is_empty());
        }
        other => panic!("expected build error, got {other}"),
    }
    assert_eq!(rt.context().frame_count(), 1);
}

#[test]
fn artifact_without_entry_is_rejected() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let mut rt = Runtime::new();
    let err = rt.exec("int not_the_entry(void) { return 0; }").unwrap_err();
    assert!(matches!(err, RuntimeError::Load(kindle_core::LoadError::Symbol { .. })));
    assert_eq!(rt.context().frame_count(), 1);
}

#[test]
fn exec_file_runs_snippet_from_disk() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snippet.c");
    std::fs::write(&path, PRODUCER).unwrap();

    let mut rt = Runtime::new();
    rt.set_defines(vec!["ANSWER=7".to_string()]);
    rt.exec_file(&path).unwrap();

    let answer = rt.get_ctx_var("answer").unwrap();
    assert_eq!(unsafe { *answer.cast::<i32>() }, 7);
}

/// Registers a variable whose deleter lives in this module, and exports the
/// deleter so later modules can use it. Each call bumps the host's `drops`.
const DELETER_OWNER: &str = r#"
#include <stdlib.h>
#include "kindle.h"

struct deleter { kindle_deleter fn; };

static int *drops;

static void count_and_free(void *ptr)
{
    if (drops)
        (*drops)++;
    free(ptr);
}

static struct deleter exported = { count_and_free };

KINDLE_ENTRY {
    drops = kindle_get(ctx, "drops");
    kindle_set(ctx, malloc(16), "own", count_and_free);
    kindle_set(ctx, &exported, "deleter", NULL);
}
"#;

const DELETER_BORROWER: &str = r#"
#include <stdlib.h>
#include "kindle.h"

struct deleter { kindle_deleter fn; };

KINDLE_ENTRY {
    struct deleter *d = kindle_get(ctx, "deleter");
    kindle_set(ctx, malloc(16), "borrowed", d->fn);
}
"#;

#[test]
fn deleter_defined_in_snippet_runs_before_unload() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let drops = Box::into_raw(Box::new(0i32));
    let mut rt = Runtime::new();
    rt.set_ctx_var(drops.cast(), "drops", None);
    rt.exec(DELETER_OWNER).unwrap();
    assert_eq!(unsafe { *drops }, 0);

    drop(rt);
    let drops = unsafe { Box::from_raw(drops) };
    assert_eq!(*drops, 1);
}

#[test]
fn deleter_from_earlier_module_releases_later_variable() {
    if !have_compiler() {
        eprintln!("skipping: no C compiler");
        return;
    }

    let drops = Box::into_raw(Box::new(0i32));
    let mut rt = Runtime::new();
    rt.set_ctx_var(drops.cast(), "drops", None);
    rt.exec(DELETER_OWNER).unwrap();
    rt.exec(DELETER_BORROWER).unwrap();
    assert_eq!(rt.context().frame_count(), 3);

    // the borrowed variable is released while its deleter's module is mapped
    assert!(rt.pop_frame());
    assert_eq!(unsafe { *drops }, 1);
    assert!(rt.get_ctx_var("borrowed").is_none());

    drop(rt);
    let drops = unsafe { Box::from_raw(drops) };
    assert_eq!(*drops, 2);
}
