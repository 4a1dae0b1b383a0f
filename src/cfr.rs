use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const JAVA_ENV: &str = "CLASS_EXPLORER_JAVA";
pub const JAVAP_ENV: &str = "CLASS_EXPLORER_JAVAP";

fn tool_command(env_key: &str, default_bin: &str, args: &[&str]) -> Result<std::process::Output> {
    let bin = std::env::var(env_key).unwrap_or_else(|_| default_bin.to_string());

    #[cfg(windows)]
    {
        let lower = bin.to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return Command::new("cmd")
                .arg("/C")
                .arg(&bin)
                .args(args)
                .output()
                .with_context(|| format!("Failed to execute {bin} (ensure JRE/JDK is installed)"));
        }
    }

    Command::new(&bin)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute {bin} (ensure JRE/JDK is installed)"))
}

fn utf8<'a>(path: &'a Path, what: &str) -> Result<&'a str> {
    path.to_str()
        .with_context(|| format!("{what} path is not valid UTF-8"))
}

/// CFR decompiler, run as `java -jar cfr.jar`.
#[derive(Debug, Clone)]
pub struct Cfr {
    cfr_jar: PathBuf,
    rename_illegal: bool,
}

impl Cfr {
    pub fn new(cfr_jar: PathBuf) -> Self {
        Self {
            cfr_jar,
            rename_illegal: true,
        }
    }

    pub fn with_renaming(mut self, rename_illegal: bool) -> Self {
        self.rename_illegal = rename_illegal;
        self
    }

    pub fn decompile_class(&self, archive: &Path, class_name: &str) -> Result<String> {
        let rename = if self.rename_illegal { "true" } else { "false" };
        let output = tool_command(
            JAVA_ENV,
            "java",
            &[
                "-jar",
                utf8(&self.cfr_jar, "cfr.jar")?,
                "--extraclasspath",
                utf8(archive, "archive")?,
                class_name,
                "--silent",
                "true",
                "--comments",
                "false",
                "--renameillegalidents",
                rename,
            ],
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("CFR decompilation failed: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Bytecode listing through `javap -c -p`.
#[derive(Debug, Clone, Default)]
pub struct Javap;

impl Javap {
    pub fn disassemble_class(&self, archive: &Path, class_name: &str) -> Result<String> {
        let output = tool_command(
            JAVAP_ENV,
            "javap",
            &[
                "-c",
                "-p",
                "-classpath",
                utf8(archive, "archive")?,
                class_name,
            ],
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("javap disassembly failed: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
