//! Process supervision for one LuCLI instance (§4.4, C8).
//!
//! Launch, PID-track (file + OS liveness probe), two-phase graceful stop,
//! and restart of the servlet-container child process. A PID is "live"
//! when the OS reports a process with that id *and* a TCP probe to the
//! configured port succeeds, or — when the process table can't be
//! consulted — the PID file's mtime falls inside a freshness window (§4.4).

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use lucli_types::LucliError;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Name of the PID file within an instance's base directory (§3, §6).
pub const PID_FILE_NAME: &str = "lucli.pid";

/// Everything needed to spawn the supervised child process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

/// Spawn `spec` as a detached child and return its PID. The child is not
/// waited on; on Unix a dropped [`Child`] handle does not signal its
/// process, so the engine keeps running after this function returns.
pub fn spawn_detached(spec: &LaunchSpec) -> Result<u32, LucliError> {
    if let Some(parent) = spec.stdout_log.parent() {
        fs::create_dir_all(parent)?;
    }
    let stdout_file = fs::File::create(&spec.stdout_log)?;
    let stderr_file = fs::File::create(&spec.stderr_log)?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file));
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let child: Child = command.spawn().map_err(LucliError::Io)?;
    let pid = child.id();
    std::mem::drop(child);
    Ok(pid)
}

/// Run `program` with `args`, capturing output, optionally bounded by
/// `timeout`. Used for one-shot introspection commands (e.g. a container's
/// own `--version` probe) rather than for the supervised child itself.
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    working_dir: &Path,
    timeout: Option<Duration>,
) -> Result<CommandOutput, LucliError> {
    let start = Instant::now();
    let mut command = Command::new(program);
    command.args(args).current_dir(working_dir);

    let (exit_code, stdout, stderr, timed_out) = if let Some(timeout_dur) = timeout {
        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let deadline = Instant::now() + timeout_dur;
        loop {
            match child.try_wait()? {
                Some(status) => {
                    let (stdout, stderr) = drain(&mut child);
                    break (status.code().unwrap_or(-1), stdout, stderr, false);
                }
                None => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let (stdout, mut stderr) = drain(&mut child);
                        stderr.push_str(&format!(
                            "\ncommand timed out after {}",
                            humantime::format_duration(timeout_dur)
                        ));
                        break (-1, stdout, stderr, true);
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    } else {
        let output = command.output()?;
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
            false,
        )
    };

    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration: start.elapsed(),
    })
}

fn drain(child: &mut Child) -> (String, String) {
    let mut stdout_bytes = Vec::new();
    let mut stderr_bytes = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_end(&mut stdout_bytes);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_end(&mut stderr_bytes);
    }
    (
        String::from_utf8_lossy(&stdout_bytes).to_string(),
        String::from_utf8_lossy(&stderr_bytes).to_string(),
    )
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// The instance PID file: written atomically, read best-effort (§5).
pub struct PidFile;

impl PidFile {
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(PID_FILE_NAME)
    }

    pub fn write(base_dir: &Path, pid: u32) -> Result<(), LucliError> {
        fs::create_dir_all(base_dir)?;
        let path = Self::path(base_dir);
        let tmp_path = path.with_extension("pid.tmp");
        fs::write(&tmp_path, pid.to_string())?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// A missing or unparseable PID file is treated as absent state, not
    /// an error (§9 "stale PID files are treated as absent state").
    pub fn read(base_dir: &Path) -> Option<u32> {
        fs::read_to_string(Self::path(base_dir))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    pub fn remove(base_dir: &Path) -> Result<(), LucliError> {
        let path = Self::path(base_dir);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn mtime_age(base_dir: &Path) -> Option<Duration> {
        let meta = fs::metadata(Self::path(base_dir)).ok()?;
        let modified = meta.modified().ok()?;
        modified.elapsed().ok()
    }
}

/// Whether the OS process table has a process with this id.
pub fn is_pid_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system.process(Pid::from_u32(pid)).is_some()
}

/// Whether a TCP connection to `host:port` completes within `timeout`.
pub fn tcp_probe(host: &str, port: u16, timeout: Duration) -> bool {
    let Ok(mut addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

/// Liveness as observed by the supervisor (§4.4 invariant 4): the OS
/// reports the PID *and* the port answers, or — if the process table
/// can't be checked (e.g. a foreign host) — the PID file is recent.
pub fn is_live(base_dir: &Path, host: &str, port: u16, freshness_window: Duration) -> bool {
    let Some(pid) = PidFile::read(base_dir) else {
        return false;
    };
    if is_pid_alive(pid) {
        return tcp_probe(host, port, Duration::from_secs(2));
    }
    PidFile::mtime_age(base_dir)
        .map(|age| age < freshness_window)
        .unwrap_or(false)
}

/// Poll `host:port` with exponential backoff (50ms -> 2s) until a TCP
/// connection completes or `total_timeout` elapses (§4.4).
pub fn wait_until_ready(host: &str, port: u16, total_timeout: Duration) -> Result<(), ()> {
    let start = Instant::now();
    let mut step = Duration::from_millis(50);
    let max_step = Duration::from_secs(2);

    loop {
        if tcp_probe(host, port, Duration::from_secs(2)) {
            return Ok(());
        }
        if start.elapsed() >= total_timeout {
            return Err(());
        }
        std::thread::sleep(step.min(total_timeout.saturating_sub(start.elapsed())));
        step = (step * 2).min(max_step);
    }
}

/// Read the last `max_bytes` of a log file, for diagnostics on a failed
/// readiness probe (§4.4 "log failure with the tail of the server log").
pub fn tail_log(log_path: &Path, max_bytes: usize) -> String {
    let Ok(mut file) = fs::File::open(log_path) else {
        return String::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let start = len.saturating_sub(max_bytes as u64);
    if start > 0 {
        use std::io::Seek;
        let _ = file.seek(std::io::SeekFrom::Start(start));
    }
    let mut buf = String::new();
    let _ = file.read_to_string(&mut buf);
    buf
}

/// Parameters for the two-phase stop sequence (§4.4, §5).
#[derive(Debug, Clone, Copy)]
pub struct StopTimeouts {
    pub graceful: Duration,
    pub force_kill: Duration,
}

impl Default for StopTimeouts {
    fn default() -> Self {
        Self {
            graceful: Duration::from_secs(30),
            force_kill: Duration::from_secs(10),
        }
    }
}

/// Issue the engine's shutdown command on `shutdown_port`, a single
/// newline-terminated command string understood by the supervised
/// servlet container (the embedded/external/container providers agree
/// on this wire command when they provision the instance).
pub fn send_shutdown_command(shutdown_host: &str, shutdown_port: u16, command: &str) -> bool {
    let Ok(mut addrs) = (shutdown_host, shutdown_port).to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    let Ok(mut stream) = TcpStream::connect_timeout(&addr, Duration::from_secs(5)) else {
        return false;
    };
    stream.write_all(command.as_bytes()).is_ok()
}

/// Two-phase stop: shutdown command + grace period, then SIGTERM + grace
/// period, then SIGKILL. The PID file is removed only on confirmed exit.
pub fn stop(
    base_dir: &Path,
    shutdown_host: &str,
    shutdown_port: u16,
    shutdown_command: &str,
    pid: u32,
    timeouts: StopTimeouts,
) -> Result<(), LucliError> {
    if !is_pid_alive(pid) {
        PidFile::remove(base_dir)?;
        return Ok(());
    }

    send_shutdown_command(shutdown_host, shutdown_port, shutdown_command);
    if wait_for_exit(pid, timeouts.graceful) {
        PidFile::remove(base_dir)?;
        return Ok(());
    }

    signal_process(pid, Signal::Term);
    if wait_for_exit(pid, timeouts.force_kill) {
        PidFile::remove(base_dir)?;
        return Ok(());
    }

    signal_process(pid, Signal::Kill);
    if wait_for_exit(pid, Duration::from_secs(5)) {
        PidFile::remove(base_dir)?;
        return Ok(());
    }

    Err(LucliError::StartTimeout(format!(
        "pid {pid} did not exit after graceful shutdown, SIGTERM, and SIGKILL"
    )))
}

fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if !is_pid_alive(pid) {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

fn signal_process(pid: u32, signal: Signal) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system
        .process(Pid::from_u32(pid))
        .and_then(|p| p.kill_with(signal))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_write_then_read_roundtrips() {
        let td = tempfile::tempdir().unwrap();
        PidFile::write(td.path(), 4242).unwrap();
        assert_eq!(PidFile::read(td.path()), Some(4242));
        assert!(!td.path().join("lucli.pid.tmp").exists());
    }

    #[test]
    fn missing_pid_file_reads_as_none() {
        let td = tempfile::tempdir().unwrap();
        assert_eq!(PidFile::read(td.path()), None);
    }

    #[test]
    fn corrupt_pid_file_reads_as_none_not_error() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(PidFile::path(td.path()), "not-a-number").unwrap();
        assert_eq!(PidFile::read(td.path()), None);
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let td = tempfile::tempdir().unwrap();
        assert!(PidFile::remove(td.path()).is_ok());
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn bogus_pid_is_not_alive() {
        assert!(!is_pid_alive(u32::MAX));
    }

    #[test]
    fn tcp_probe_fails_closed_port() {
        assert!(!tcp_probe("127.0.0.1", 1, Duration::from_millis(200)));
    }

    #[test]
    fn is_live_false_without_pid_file() {
        let td = tempfile::tempdir().unwrap();
        assert!(!is_live(td.path(), "127.0.0.1", 1, Duration::from_secs(60)));
    }

    #[test]
    fn tail_log_returns_suffix_only() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("server.log");
        std::fs::write(&path, "0123456789").unwrap();
        assert_eq!(tail_log(&path, 4), "6789");
    }

    #[test]
    fn tail_log_missing_file_is_empty() {
        let td = tempfile::tempdir().unwrap();
        assert_eq!(tail_log(&td.path().join("nope.log"), 100), "");
    }

    #[test]
    fn run_command_with_timeout_captures_exit_code() {
        let td = tempfile::tempdir().unwrap();
        let out = run_command_with_timeout("true", &[], td.path(), None).unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(!out.timed_out);
    }

    #[test]
    fn stop_removes_pid_file_when_already_dead() {
        let td = tempfile::tempdir().unwrap();
        PidFile::write(td.path(), u32::MAX - 1).unwrap();
        stop(
            td.path(),
            "127.0.0.1",
            1,
            "SHUTDOWN",
            u32::MAX - 1,
            StopTimeouts::default(),
        )
        .unwrap();
        assert_eq!(PidFile::read(td.path()), None);
    }
}
