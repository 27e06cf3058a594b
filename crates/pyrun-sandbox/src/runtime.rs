//! Interpreter process plumbing shared by the validator and the engine

use crate::sanitize::Sanitizer;
use crate::{Result, SandboxError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

/// Configuration for interpreter runs
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter to invoke (looked up on `PATH` if relative)
    pub interpreter: PathBuf,
    /// Wall-clock deadline for one run
    pub timeout: Duration,
    /// Cap on captured bytes per stream
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            timeout: Duration::from_secs(10),
            max_output_bytes: 64 * 1024, // 64KB
        }
    }
}

impl SandboxConfig {
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Check whether the interpreter can be started at all
    pub fn interpreter_available(&self) -> bool {
        std::process::Command::new(&self.interpreter)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build an interpreter command running `driver` against `script`.
    ///
    /// Flags: no bytecode writes, `PYTHON*` variables ignored, no user site
    /// directory, unbuffered streams, UTF-8 mode. The environment is cleared
    /// down to `PATH` and `LANG`; the working directory is the script's own,
    /// so the script is named relative to it. On unix the child leads a new
    /// process group that [`kill_tree`] can take down as a whole.
    pub(crate) fn command(&self, driver: &str, script: &Path) -> Command {
        let (dir, name) = match (script.parent(), script.file_name()) {
            (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => (Some(dir), Path::new(name)),
            _ => (None, script),
        };

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(["-B", "-E", "-s", "-u", "-X", "utf8", "-c", driver])
            .arg(name)
            .env_clear()
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Kill everything the run started: the child's process group (which
/// includes forked descendants still holding the output pipes), then the
/// child itself, reaping it.
///
/// `pid` must be captured right after spawn; `Child::id` is gone once the
/// child has been waited on.
pub(crate) async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        signal_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

#[cfg(unix)]
fn signal_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid only signals the group the child
    // was placed in at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(error = %std::io::Error::last_os_error(), pgid, "group kill failed");
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32) {}

/// A captured stream, possibly cut short
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub bytes: Vec<u8>,
    pub discarded: u64,
}

impl Captured {
    pub fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.discarded > 0 {
            text.push_str(&format!(
                "\n...[truncated, {} more bytes]",
                self.discarded
            ));
        }
        text
    }
}

/// Read at most `limit` bytes, then drain the rest so the child never blocks
/// on a full pipe.
pub(crate) async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    (&mut reader)
        .take(limit as u64)
        .read_to_end(&mut bytes)
        .await?;
    let mut discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    if discarded > 0 {
        // do not cut a character in half at the cap
        if let Err(e) = std::str::from_utf8(&bytes) {
            if e.error_len().is_none() {
                discarded += (bytes.len() - e.valid_up_to()) as u64;
                bytes.truncate(e.valid_up_to());
            }
        }
    }
    Ok(Captured { bytes, discarded })
}

/// Sanitizer that scrubs the directory holding `script`
pub(crate) fn sanitizer_for(script: &Path) -> Sanitizer {
    host_prefixes(script)
        .into_iter()
        .fold(Sanitizer::new(), |sanitizer, prefix| sanitizer.redact_prefix(prefix))
}

/// Host prefixes that must not show up in diagnostics for `script`
pub(crate) fn host_prefixes(script: &Path) -> Vec<String> {
    let mut prefixes = Vec::new();
    if let Some(dir) = script.parent() {
        prefixes.push(dir.to_string_lossy().into_owned());
        if let Ok(canonical) = dir.canonicalize() {
            prefixes.push(canonical.to_string_lossy().into_owned());
        }
    }
    prefixes
}

pub(crate) fn spawn_failed(err: std::io::Error) -> SandboxError {
    SandboxError::SpawnFailed(err.to_string())
}

pub(crate) fn ensure_script(script: &Path) -> Result<()> {
    if script.is_file() {
        Ok(())
    } else {
        Err(SandboxError::MissingScript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_capped_truncates_and_drains() {
        let data = vec![b'x'; 100];
        let captured = read_capped(&data[..], 10).await.unwrap();
        assert_eq!(captured.bytes.len(), 10);
        assert_eq!(captured.discarded, 90);
        let text = captured.into_text();
        assert!(text.starts_with("xxxxxxxxxx\n"));
        assert!(text.contains("90 more bytes"));
    }

    #[tokio::test]
    async fn test_read_capped_under_limit() {
        let captured = read_capped(&b"hello\n"[..], 64).await.unwrap();
        assert_eq!(captured.discarded, 0);
        assert_eq!(captured.into_text(), "hello\n");
    }

    #[tokio::test]
    async fn test_read_capped_keeps_characters_whole() {
        // "é" is two bytes; a cap of 4 lands inside the second one
        let captured = read_capped("aéé".as_bytes(), 4).await.unwrap();
        assert_eq!(captured.bytes, "aé".as_bytes());
        assert_eq!(captured.discarded, 2);
        let text = captured.into_text();
        assert!(!text.contains('\u{FFFD}'), "{text}");
        assert_eq!(text, "aé\n...[truncated, 2 more bytes]");
    }

    #[test]
    fn test_command_names_script_relative_to_its_dir() {
        let config = SandboxConfig::default();
        let cmd = config.command("pass", Path::new("units/abc/snippet.py"));
        let std_cmd = cmd.as_std();
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args.last().copied(), Some(std::ffi::OsStr::new("snippet.py")));
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("units/abc")));
    }

    #[test]
    fn test_host_prefixes_include_parent() {
        let prefixes = host_prefixes(Path::new("/nonexistent/unit/snippet.py"));
        assert_eq!(prefixes, vec!["/nonexistent/unit".to_string()]);
    }
}
