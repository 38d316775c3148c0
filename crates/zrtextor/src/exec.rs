//! Invocation of the surrounding TeX toolchain.
//!
//! The library shells out for final conversions (`pltotf`, `vptovf` and
//! friends) and for file lookup (`kpsewhich`). This module provides the
//! spawn-capture primitive, the command-name table with its
//! `ZRTeXtor.cfg` overrides, and the self-cleaning temporary files the
//! wrappers hand to those commands.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Error produced by the external boundary.
#[derive(Debug)]
pub enum Error {
    /// The command could not be spawned or its pipes could not be read.
    Spawn { command: String, error: std::io::Error },
    /// The command ran but did not produce the expected output file, or
    /// complained on stderr.
    ToolFailed { command: String, stderr: String },
    /// `kpsewhich` did not resolve the file.
    NotFound { name: String },
    /// A config file line is not `key = value`.
    BadConfigLine { line: usize, text: String },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Spawn { command, error } => {
                write!(f, "failed to run `{command}`: {error}")
            }
            Error::ToolFailed { command, stderr } => {
                write!(f, "`{command}` failed:\n{stderr}")
            }
            Error::NotFound { name } => write!(f, "`{name}` not found"),
            Error::BadConfigLine { line, text } => {
                write!(f, "config line {line} is not `key = value`: `{text}`")
            }
        }
    }
}

/// Names of the invokable commands, each overridable from the config
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    pub kpsewhich: String,
    pub tftopl: String,
    pub ptftopl: String,
    pub pltotf: String,
    pub ppltotf: String,
    pub uptftopl: String,
    pub uppltotf: String,
    pub vptovf: String,
    pub opl2ofm: String,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            kpsewhich: "kpsewhich".into(),
            tftopl: "tftopl".into(),
            ptftopl: "ptftopl".into(),
            pltotf: "pltotf".into(),
            ppltotf: "ppltotf".into(),
            uptftopl: "uptftopl".into(),
            uppltotf: "uppltotf".into(),
            vptovf: "vptovf".into(),
            opl2ofm: "opl2ofm".into(),
        }
    }
}

impl CommandTable {
    fn entry(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "kpsewhich" => Some(&mut self.kpsewhich),
            "tftopl" => Some(&mut self.tftopl),
            "ptftopl" => Some(&mut self.ptftopl),
            "pltotf" => Some(&mut self.pltotf),
            "ppltotf" => Some(&mut self.ppltotf),
            "uptftopl" => Some(&mut self.uptftopl),
            "uppltotf" => Some(&mut self.uppltotf),
            "vptovf" => Some(&mut self.vptovf),
            "opl2ofm" => Some(&mut self.opl2ofm),
            _ => None,
        }
    }

    /// The metric converter pair (to property list, to metric) for the
    /// configured engine family.
    pub fn metric_tools(&self, uptex: bool) -> (&str, &str) {
        if uptex {
            (&self.uptftopl, &self.uppltotf)
        } else {
            (&self.ptftopl, &self.ppltotf)
        }
    }
}

/// Apply `ZRTeXtor.cfg` overrides to a command table. The file is
/// line-based `key = value` with `#` comments; unknown keys are left to
/// the caller (encoding defaults are handled there).
pub fn apply_config_file(
    table: &mut CommandTable,
    text: &str,
) -> Result<Vec<(String, String)>, Error> {
    let mut unknown = vec![];
    for (i, raw) in text.lines().enumerate() {
        let line = match raw.find('#') {
            Some(p) => &raw[..p],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::BadConfigLine {
                line: i + 1,
                text: raw.into(),
            });
        };
        let (key, value) = (key.trim(), value.trim());
        match table.entry(key) {
            Some(slot) => *slot = value.into(),
            None => unknown.push((key.into(), value.into())),
        }
    }
    Ok(unknown)
}

/// Find `ZRTeXtor.cfg` next to the running executable or in the working
/// directory.
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("ZRTeXtor.cfg"));
        }
    }
    candidates.push(PathBuf::from("ZRTeXtor.cfg"));
    candidates.into_iter().find(|p| p.exists())
}

/// Captured output of a spawned command.
#[derive(Debug, Default)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run a command with stdin closed and stdout/stderr captured into
/// separate buffers. The exit status is deliberately not consulted;
/// callers judge success by the files the command produced and by
/// [`stderr_is_benign`].
pub fn spawn_capture<I, S>(
    command: &str,
    args: I,
    current_dir: Option<&Path>,
) -> Result<Captured, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let spawn_err = |error| Error::Spawn {
        command: command.into(),
        error,
    };
    let mut cmd = std::process::Command::new(command);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(spawn_err)?;
    Ok(Captured {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Lines the metric tools print routinely; their presence does not
/// indicate failure.
pub fn stderr_is_benign(stderr: &[u8]) -> bool {
    String::from_utf8_lossy(stderr).lines().all(|line| {
        let line = line.trim();
        line.is_empty()
            || line.contains("I had to round some")
            || line.contains("Input file is in kanji")
            || line.contains("LIG")
    })
}

/// Judge a tool invocation: the expected output file must exist and the
/// stderr must be benign.
pub fn tool_succeeded(command: &str, expected_output: &Path, captured: &Captured) -> Result<(), Error> {
    if expected_output.exists() && stderr_is_benign(&captured.stderr) {
        Ok(())
    } else {
        Err(Error::ToolFailed {
            command: command.into(),
            stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
        })
    }
}

/// The option argument of a `kpsewhich` lookup: either a bare format
/// string or the full option map.
#[derive(Debug, Default, Clone)]
pub struct KpseOptions {
    pub dpi: Option<u32>,
    pub engine: Option<String>,
    pub mode: Option<String>,
    pub progname: Option<String>,
    pub format: Option<String>,
    pub mustexist: bool,
}

impl From<&str> for KpseOptions {
    fn from(format: &str) -> Self {
        KpseOptions {
            format: Some(format.into()),
            ..Default::default()
        }
    }
}

impl KpseOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec![];
        if let Some(dpi) = self.dpi {
            args.push(format!("--dpi={dpi}"));
        }
        if let Some(engine) = &self.engine {
            args.push(format!("--engine={engine}"));
        }
        if let Some(mode) = &self.mode {
            args.push(format!("--mode={mode}"));
        }
        if let Some(progname) = &self.progname {
            args.push(format!("--progname={progname}"));
        }
        if let Some(format) = &self.format {
            args.push(format!("--format={format}"));
        }
        if self.mustexist {
            args.push("--must-exist".into());
        }
        args
    }
}

/// Resolve a file through `kpsewhich`: the absolute path it printed, if
/// the path exists.
pub fn kpsewhich(
    table: &CommandTable,
    name: &str,
    options: &KpseOptions,
) -> Result<PathBuf, Error> {
    let mut args = options.to_args();
    args.push(name.to_string());
    let captured = spawn_capture(&table.kpsewhich, args, None)?;
    let text = String::from_utf8_lossy(&captured.stdout);
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Err(Error::NotFound { name: name.into() });
    }
    let path = PathBuf::from(line);
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::NotFound { name: name.into() })
    }
}

/// A temporary file path that unlinks itself on drop, including on
/// failure paths. The name embeds the process id and a six-letter infix
/// permuted between calls, so concurrent invocations in one directory
/// do not collide.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

static TEMP_SERIAL: AtomicU32 = AtomicU32::new(0);

const TEMP_PREFIX: &str = "zrtx";

fn temp_infix() -> String {
    let serial = TEMP_SERIAL.fetch_add(1, Ordering::Relaxed);
    let mut state = std::process::id()
        .wrapping_mul(0x9E37_79B9)
        .wrapping_add(serial.wrapping_mul(0x85EB_CA6B));
    (0..6)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            char::from(b'a' + ((state >> 24) % 26) as u8)
        })
        .collect()
}

impl TempFile {
    /// A fresh path in `dir` with the given extension. The file itself
    /// is not created.
    pub fn new(dir: &Path, extension: &str) -> TempFile {
        let name = format!(
            "{TEMP_PREFIX}{}{}.{extension}",
            std::process::id(),
            temp_infix()
        );
        TempFile {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
