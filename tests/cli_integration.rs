use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_explorer_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn write_jar(path: &Path, entries: &[(&str, &str)]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

fn run(args: &[&str], envs: &[(&str, &Path)]) -> anyhow::Result<Output> {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_class-explorer"));
    cmd.args(args);
    for (k, v) in envs {
        cmd.env(k, v);
    }
    Ok(cmd.output()?)
}

fn run_json(args: &[&str], envs: &[(&str, &Path)]) -> anyhow::Result<Value> {
    let out = run(args, envs)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

struct Fixture {
    base: PathBuf,
    jar: PathBuf,
    cfr: PathBuf,
    java: PathBuf,
    javap: PathBuf,
}

impl Fixture {
    fn envs(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("CLASS_EXPLORER_JAVA", self.java.as_path()),
            ("CLASS_EXPLORER_JAVAP", self.javap.as_path()),
        ]
    }
}

#[cfg(unix)]
fn fixture(name: &str) -> anyhow::Result<Fixture> {
    let base = temp_dir(name);
    let jar = base.join("input/app.jar");
    write_jar(
        &jar,
        &[
            ("com/app/Main.class", ""),
            ("com/app/Main$1.class", ""),
            ("com/app/Broken.class", ""),
            ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\n"),
            ("res/values/strings.xml", "<resources/>"),
            ("res/drawable/icon.png", "png"),
        ],
    )?;

    let cfr = base.join("tools/cfr.jar");
    write_file(&cfr, "stub")?;

    let java = base.join("bin/java");
    write_file(
        &java,
        r#"#!/bin/sh
if [ "$5" = "com.app.Broken" ]; then
  echo "cannot decompile $5" >&2
  exit 1
fi
echo "// decompiled $5"
echo "public class Main {}"
"#,
    )?;
    make_executable(&java)?;

    let javap = base.join("bin/javap");
    write_file(
        &javap,
        r#"#!/bin/sh
echo "Compiled from \"$5\""
"#,
    )?;
    make_executable(&javap)?;

    Ok(Fixture {
        base,
        jar,
        cfr,
        java,
        javap,
    })
}

#[cfg(unix)]
#[test]
fn decode_writes_outputs_and_logs_failures() -> anyhow::Result<()> {
    let fx = fixture("decode")?;
    let out = fx.base.join("out");
    let args = [
        "--cfr",
        fx.cfr.to_str().unwrap(),
        "--format",
        "json",
        "decode",
        fx.jar.to_str().unwrap(),
        "-m",
        "jsr",
        "--res",
        "values",
        "-j",
        "2",
        "-o",
        out.to_str().unwrap(),
    ];
    let json = run_json(&args, &fx.envs())?;

    assert_eq!(json["command"], "decode");
    let report = &json["reports"][0];
    assert_eq!(report["state"], "done");
    assert_eq!(report["dispatched"], 4);
    assert_eq!(report["failed"], 1);

    let dir = out.join("app.jar_sources");
    let main = std::fs::read_to_string(dir.join("java/com/app/Main.java"))?;
    assert!(main.contains("// decompiled com.app.Main"));
    assert!(dir.join("smali/com/app/Main.smali").exists());
    assert!(dir.join("smali/com/app/Broken.smali").exists());
    assert!(!dir.join("java/com/app/Broken.java").exists());
    assert!(dir.join("res/values/strings.xml").exists());
    assert!(dir.join("META-INF/MANIFEST.MF").exists());
    assert!(!dir.join("res/drawable/icon.png").exists());

    let failed = std::fs::read_to_string(dir.join("_failed_classes"))?;
    assert_eq!(failed, "- com.app.Broken (Lcom/app/Broken;)\n");

    // A second run finds the directory; without an answer on stdin it is skipped.
    let json = run_json(&args, &fx.envs())?;
    assert_eq!(json["reports"][0]["state"], "skipped");
    assert!(dir.join("java/com/app/Main.java").exists());

    let _ = std::fs::remove_dir_all(fx.base);
    Ok(())
}

#[cfg(unix)]
#[test]
fn search_generates_sources_for_matches() -> anyhow::Result<()> {
    let fx = fixture("search_gen")?;
    let out = fx.base.join("out");
    let json = run_json(
        &[
            "--cfr",
            fx.cfr.to_str().unwrap(),
            "--format",
            "json",
            "search",
            fx.jar.to_str().unwrap(),
            "--cnm",
            "Main",
            "--gen",
            "-o",
            out.to_str().unwrap(),
        ],
        &fx.envs(),
    )?;

    assert_eq!(json["command"], "search");
    assert_eq!(json["searches"][0]["results"], serde_json::json!(["com.app.Main"]));
    assert_eq!(json["generated"][0]["state"], "done");

    let dir = out.join("app.jar_sources");
    assert!(dir.join("Main.java").exists());
    assert!(dir.join("Main.smali").exists());
    assert!(!dir.join("Broken.java").exists());
    assert!(!dir.join("_failed_classes").exists());

    let _ = std::fs::remove_dir_all(fx.base);
    Ok(())
}

#[cfg(unix)]
#[test]
fn text_search_prints_results() -> anyhow::Result<()> {
    let fx = fixture("search_text")?;
    let out = run(
        &[
            "search",
            fx.jar.to_str().unwrap(),
            "--clx",
            "com\\.app\\.Main.*",
        ],
        &fx.envs(),
    )?;
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("File: app.jar"));
    assert!(stdout.contains("Result:"));
    assert!(stdout.contains("+ Class: com.app.Main"));
    assert!(stdout.contains("+ Class: com.app.Main$1"));
    assert!(!stdout.contains("com.app.Broken"));

    let _ = std::fs::remove_dir_all(fx.base);
    Ok(())
}

#[test]
fn unsupported_criteria_are_reported_per_archive() -> anyhow::Result<()> {
    let base = temp_dir("unsupported");
    let jar = base.join("app.jar");
    write_jar(&jar, &[("com/app/Main.class", "")])?;

    let json = run_json(
        &["--format", "json", "search", jar.to_str().unwrap(), "--num", "7"],
        &[],
    )?;
    let search = &json["searches"][0];
    assert_eq!(search["results"], serde_json::json!([]));
    assert!(search["error"].as_str().unwrap().contains("numbers"));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn invalid_flags_fail_before_any_work() -> anyhow::Result<()> {
    let out = run(&["search", "missing.jar", "--pkg", "com.app"], &[])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Please provide a search query"));

    let out = run(&["search", "missing.jar", "--num", "12.5l"], &[])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Invalid number literal: '12.5l'"));
    Ok(())
}

#[test]
fn placeholder_commands_are_not_implemented() -> anyhow::Result<()> {
    let json = run_json(&["--format", "json", "mapver", "-s", "a.apk"], &[])?;
    assert_eq!(json["command"], "not_implemented");
    assert_eq!(json["name"], "mapver");

    let json = run_json(&["--format", "json", "b", "a.apk", "-q", "x"], &[])?;
    assert_eq!(json["name"], "batch");
    Ok(())
}
