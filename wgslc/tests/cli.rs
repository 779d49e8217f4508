use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const COMPUTE: &str = "\
var<workgroup> shared_data: array<u32, 64>;
@group(0) @binding(0) var<storage, read_write> out: array<u32>;

@compute @workgroup_size(64)
fn main(@builtin(local_invocation_index) i: u32) {
    shared_data[i] = i * 2u;
    out[i] = shared_data[i];
}
";

fn wgslc(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wgslc"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("spawn wgslc")
}

fn write(dir: &TempDir, name: &str, text: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, text).expect("write temp file");
    path.to_str().expect("temp path must be UTF-8").to_string()
}

#[test]
fn compiles_a_file_and_prints_its_ir() {
    let dir = TempDir::new().expect("create temp dir");
    let file = write(&dir, "shader.wgsl", COMPUTE);
    let out = wgslc(dir.path(), &[&file]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout.contains("main"), "{stdout}");
}

#[test]
fn errors_fail_the_run_and_are_rendered() {
    let dir = TempDir::new().expect("create temp dir");
    let good = write(&dir, "good.wgsl", COMPUTE);
    let bad = write(&dir, "bad.wgsl", "fn f() -> i32 { return lenght; }");
    let out = wgslc(dir.path(), &["--emit", "none", &good, &bad]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(!out.status.success());
    assert!(stderr.contains("unresolved identifier 'lenght'"), "{stderr}");
    assert!(stderr.contains("1 of 2 file(s) failed"), "{stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn disabled_feature_flag_rejects_enable_directive() {
    let dir = TempDir::new().expect("create temp dir");
    let file = write(&dir, "half.wgsl", "enable f16;\nfn f() -> f16 { return 1h; }");
    assert!(wgslc(dir.path(), &["--emit", "none", &file]).status.success());
    let out = wgslc(dir.path(), &["--emit", "none", "--disable", "f16", &file]);
    assert!(!out.status.success());

    let out = wgslc(dir.path(), &["--disable", "f64", &file]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(!out.status.success());
    assert!(stderr.contains("unknown feature 'f64'"), "{stderr}");
}

#[test]
fn config_file_is_found_next_to_the_input() {
    let dir = TempDir::new().expect("create temp dir");
    write(&dir, "wgslc.toml", "emit = \"none\"\n[features]\nf16 = false\n");
    let file = write(&dir, "half.wgsl", "enable f16;\nfn f() {}");
    let out = wgslc(dir.path(), &[&file]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn flags_override_the_config_file() {
    let dir = TempDir::new().expect("create temp dir");
    let config = write(&dir, "custom.toml", "emit = \"none\"\nentry_point = \"missing\"\n");
    let file = write(&dir, "shader.wgsl", COMPUTE);
    let out = wgslc(dir.path(), &["--config", &config, &file]);
    assert!(!out.status.success());

    let out = wgslc(
        dir.path(),
        &["--config", &config, "--entry-point", "main", "--emit", "ir", "--zero-init-workgroup", &file],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(!out.stdout.is_empty());
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().expect("create temp dir");
    let config = write(&dir, "broken.toml", "emit = 3\n");
    let file = write(&dir, "shader.wgsl", COMPUTE);
    let out = wgslc(dir.path(), &["--config", &config, &file]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(!out.status.success());
    assert!(stderr.contains("failed to parse"), "{stderr}");
}
