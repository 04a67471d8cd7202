//! Cross-module build scenarios exercising the scheduler, store, and
//! trace validation together through the public `Scheduler` API — the
//! same kind of whole-pipeline check as `convenient-graph`'s
//! `cache_integrity_test.rs`, but driven through real build files instead
//! of an in-memory cache simulation.

use rebuild_core::{Config, RecipeState, Scheduler};
use std::io::Write;
use std::path::{Path, PathBuf};

fn scheduler_in(dir: &Path) -> Scheduler {
    let config = Config { store_root: Some(dir.join("store")), ..Config::new() };
    Scheduler::new(config).unwrap()
}

fn write_build_file(dir: &Path, source: &str) -> PathBuf {
    let path = dir.join("BUILD.lua");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(source.as_bytes()).unwrap();
    path
}

/// Scenario 3: changing one leaf's recipe re-executes that leaf and
/// anything that reads its output, but leaves an unrelated sibling leaf's
/// cached result alone.
#[test]
fn leaf_change_reexecutes_only_affected_targets() {
    let dir = tempfile::tempdir().unwrap();
    let l2_marker = dir.path().join("l2_runs.txt");

    // `build_l2`'s own text is byte-identical across both versions of the
    // build file below; only `build_l1`'s body changes between them.
    let build_file = |l1_body: &str| {
        format!(
            r#"
            register_target("l1", "build_l1")
            register_target("l2", "build_l2")
            register_target("r", "build_r")

            function build_l1()
                {l1_body}
            end

            function build_l2()
                sys({{"sh", "-c", "printf x >> {marker}"}})
                sys({{"sh", "-c", "printf B > " .. OUTPUT_DIR .. "/out.txt"}})
            end

            function build_r()
                local l1 = depend_on("l1")
                local l2 = depend_on("l2")
                sys({{"sh", "-c", "cat " .. l1 .. "/out.txt " .. l2 .. "/out.txt > " .. OUTPUT_DIR .. "/out.txt"}})
            end
            "#,
            l1_body = l1_body,
            marker = l2_marker.display(),
        )
    };

    let build_path = write_build_file(
        dir.path(),
        &build_file(r#"sys({"sh", "-c", "printf A > " .. OUTPUT_DIR .. "/out.txt"})"#),
    );

    let mut first = scheduler_in(dir.path());
    first.load_build_file(&build_path).unwrap();
    let r_dir = first.build("r").unwrap();
    assert_eq!(std::fs::read_to_string(r_dir.join("out.txt")).unwrap(), "AB");
    assert_eq!(std::fs::read_to_string(&l2_marker).unwrap(), "x");

    write_build_file(
        dir.path(),
        &build_file(r#"sys({"sh", "-c", "printf AMODIFIED > " .. OUTPUT_DIR .. "/out.txt"})"#),
    );

    let mut second = scheduler_in(dir.path());
    second.load_build_file(&build_path).unwrap();
    let r_dir2 = second.build("r").unwrap();

    assert_eq!(
        std::fs::read_to_string(r_dir2.join("out.txt")).unwrap(),
        "AMODIFIEDB",
        "r must re-run because l1's recorded output hash no longer matches"
    );
    assert_eq!(
        std::fs::read_to_string(&l2_marker).unwrap(),
        "x",
        "l2's own recipe text did not change, so it must not re-execute"
    );
}

/// Scenario 4: a target that registers a file dependency via
/// `register_dep` (rather than `depend_on`ing another target) still
/// re-executes when that file's content changes, and only it does.
#[test]
fn header_style_dependency_invalidates_on_content_change() {
    let dir = tempfile::tempdir().unwrap();
    let header = dir.path().join("h.txt");
    std::fs::write(&header, "v1").unwrap();

    let runs_marker = dir.path().join("runs.txt");
    let build_path = write_build_file(
        dir.path(),
        &format!(
            r#"
            register_target("l2", "build_l2")

            function build_l2()
                register_dep("{header}")
                sys({{"sh", "-c", "printf x >> {runs}"}})
                sys({{"sh", "-c", "printf built > " .. OUTPUT_DIR .. "/out.txt"}})
            end
            "#,
            header = header.display(),
            runs = runs_marker.display(),
        ),
    );

    let mut first = scheduler_in(dir.path());
    first.load_build_file(&build_path).unwrap();
    let l2_dir = first.build("l2").unwrap();
    assert_eq!(std::fs::read_to_string(l2_dir.join("out.txt")).unwrap(), "built");
    assert_eq!(first.recipe_state("l2"), Some(RecipeState::Complete));
    assert_eq!(std::fs::read_to_string(&runs_marker).unwrap(), "x");

    // Re-run with the header unchanged: no new execution.
    let mut second = scheduler_in(dir.path());
    second.load_build_file(&build_path).unwrap();
    let _ = second.build("l2").unwrap();
    assert_eq!(
        std::fs::read_to_string(&runs_marker).unwrap(),
        "x",
        "unchanged header must be a no-op rebuild"
    );

    // Changing the header's content must re-execute the recipe.
    std::fs::write(&header, "v2").unwrap();
    let mut third = scheduler_in(dir.path());
    third.load_build_file(&build_path).unwrap();
    let l2_dir3 = third.build("l2").unwrap();
    assert_eq!(std::fs::read_to_string(l2_dir3.join("out.txt")).unwrap(), "built");
    assert_eq!(
        std::fs::read_to_string(&runs_marker).unwrap(),
        "xx",
        "a changed register_dep file must invalidate the trace and re-run the recipe"
    );
}
