//! Helper process supervision
//!
//! `MountSupervisor` owns the `zookeeperfuse` process of a single volume. It
//! translates the volume configuration into a command line, spawns the
//! helper in its own process group, verifies it survived a short grace
//! period and, on teardown, escalates from SIGTERM on the helper to SIGKILL on
//! its whole process group.
//!
//! Every wait in here is bounded. A wait that runs out without the process
//! exiting means "still alive", never an error by itself.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{LeafMode, VolumeConfig};

/// How often a bounded wait re-checks the process
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Static settings shared by every supervisor in the process
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// The mount helper executable
    pub helper_binary: PathBuf,
    /// Arguments placed before the generated ones
    pub helper_args: Vec<String>,
    /// Mountpoints are created as `<base_path>/<mount id>`
    pub base_path: PathBuf,
    /// Where helper stdout/stderr go when `debug` is on
    pub log_dir: Option<PathBuf>,
    /// Passes debug flags to the helper and keeps its output
    pub debug: bool,
    /// How long a freshly spawned helper must stay up to count as mounted
    pub startup_grace: Duration,
    /// How long to wait after SIGTERM before escalating
    pub terminate_timeout: Duration,
    /// How long to wait after SIGKILL before giving up
    pub kill_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            helper_binary: PathBuf::from("/usr/bin/zookeeperfuse"),
            helper_args: Vec::new(),
            base_path: PathBuf::from("/mnt/volumes"),
            log_dir: Some(PathBuf::from("/log/zookeeper-volume")),
            debug: false,
            startup_grace: Duration::from_secs(2),
            terminate_timeout: Duration::from_secs(10),
            kill_timeout: Duration::from_secs(10),
        }
    }
}

impl SupervisorConfig {
    /// Local mountpoint for a mount identifier
    pub fn mountpoint(&self, mount_id: u32) -> PathBuf {
        self.base_path.join(mount_id.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("failed to create mountpoint {path}: {source}")]
    Mountpoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open helper log {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("helper process died shortly after startup (code {code:?}, signal {signal:?})")]
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("failed to signal helper process {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: io::Error,
    },
    #[error("helper process {pid} survived SIGKILL, manual cleanup of the mount is required")]
    Stuck { pid: i32 },
}

/// Owner of one volume's helper process
#[derive(Debug)]
pub struct MountSupervisor {
    config: Arc<SupervisorConfig>,
    child: Option<Child>,
    /// Mountpoint of the last successful start, removed on teardown
    mounted_at: Option<PathBuf>,
    last_exit: Option<ExitStatus>,
}

impl MountSupervisor {
    pub fn new(config: Arc<SupervisorConfig>) -> Self {
        Self {
            config,
            child: None,
            mounted_at: None,
            last_exit: None,
        }
    }

    /// Build the helper arguments for a volume
    pub fn command_line(&self, volume: &VolumeConfig, mountpoint: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            "auto_unmount".into(),
            "-f".into(),
            mountpoint.into(),
        ];
        if self.config.debug {
            args.extend(["-o".into(), "debug".into()]);
        }

        args.push("--".into());
        args.extend([
            "--zooHosts".into(),
            volume.hosts.to_arg().into(),
            "--zooPath".into(),
            volume.path.clone().into(),
        ]);
        if volume.mode != LeafMode::Dir {
            args.extend(["--leafMode".into(), volume.mode.as_str().into()]);
        }
        if let Some(auth) = volume.auth.as_deref().filter(|a| !a.is_empty()) {
            args.extend(["--zooAuthentication".into(), auth.into()]);
        }
        if self.config.debug {
            args.extend(["--logLevel".into(), "DEBUG".into()]);
        }
        args
    }

    /// Spawn the helper and verify it survives the startup grace period
    ///
    /// Blocks for the grace period. On failure the mountpoint directory is
    /// left in place so it can be inspected.
    pub fn start(&mut self, volume: &VolumeConfig, mountpoint: &Path) -> Result<(), MountError> {
        if self.is_running() {
            return Ok(());
        }

        fs::create_dir_all(mountpoint).map_err(|source| MountError::Mountpoint {
            path: mountpoint.to_path_buf(),
            source,
        })?;

        let args = self.command_line(volume, mountpoint);
        let (stdout, stderr) = self.output_streams(&volume.name)?;

        let mut command = Command::new(&self.config.helper_binary);
        command
            .args(&self.config.helper_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);

        tracing::debug!(
            volume = %volume.name,
            "spawning {} {:?} {:?}",
            self.config.helper_binary.display(),
            self.config.helper_args,
            args
        );
        let child = command.spawn().map_err(|source| MountError::Spawn {
            binary: self.config.helper_binary.clone(),
            source,
        })?;
        // The command holds the parent's copies of the log files; dropping it
        // closes them so only the helper keeps them open.
        drop(command);

        let pid = child.id();
        self.child = Some(child);
        self.last_exit = None;

        thread::sleep(self.config.startup_grace);

        if !self.is_running() {
            let code = self.last_exit_code();
            let signal = self.last_exit.and_then(|status| status.signal());
            tracing::error!(
                volume = %volume.name,
                pid,
                "helper died shortly after creation, RC={:?} signal={:?}, command line was {} {:?} {:?}",
                code,
                signal,
                self.config.helper_binary.display(),
                self.config.helper_args,
                args
            );
            return Err(MountError::Exited { code, signal });
        }

        tracing::debug!(volume = %volume.name, pid, "helper is up");
        self.mounted_at = Some(mountpoint.to_path_buf());
        Ok(())
    }

    /// Stop the helper and remove its mountpoint
    ///
    /// A no-op when nothing was started. Sends SIGTERM, then SIGKILL to the
    /// whole process group if the helper is still around after
    /// `terminate_timeout`. A helper surviving SIGKILL is fatal and reported
    /// as [`TeardownError::Stuck`]; the handle is kept so it stays visible.
    pub fn stop(&mut self) -> Result<(), TeardownError> {
        if self.is_running() {
            let pid = self.pid().map(|pid| pid as libc::pid_t).unwrap_or_default();

            tracing::debug!(pid, "terminating helper");
            send_signal(pid, libc::SIGTERM, false)
                .map_err(|source| TeardownError::Signal { pid, source })?;

            if !self.wait_for_exit(self.config.terminate_timeout) {
                // The helper is the leader of its own group, so pgid == pid.
                tracing::warn!("Forcibly terminating PID {} PGID {}", pid, pid);
                send_signal(pid, libc::SIGKILL, true)
                    .map_err(|source| TeardownError::Signal { pid, source })?;

                if !self.wait_for_exit(self.config.kill_timeout) {
                    tracing::error!(pid, "helper survived SIGKILL, giving up");
                    return Err(TeardownError::Stuck { pid });
                }
            }
        }
        // Exited on its own without being reaped yet.
        self.child = None;

        if let Some(mountpoint) = self.mounted_at.take() {
            remove_mountpoint(&mountpoint);
        }
        Ok(())
    }

    /// Non-blocking liveness check
    ///
    /// Reaps the helper if it has exited, recording its exit status.
    pub fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Err(e) => {
                tracing::warn!(pid = child.id(), "failed to poll helper process: {}", e);
                true
            }
        }
    }

    /// Whether a process handle is held, whether or not it is still alive
    pub fn has_process(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Exit code of the last helper that terminated, if it exited normally
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit.and_then(|status| status.code())
    }

    pub fn last_exit(&self) -> Option<ExitStatus> {
        self.last_exit
    }

    fn record_exit(&mut self, status: ExitStatus) {
        let pid = self.pid();
        if !status.success() {
            tracing::error!(?pid, "zookeeperfuse terminated with {}", status);
        } else {
            tracing::debug!(?pid, "zookeeperfuse exited cleanly");
        }
        self.last_exit = Some(status);
        self.child = None;
    }

    /// Poll until the helper exits or `timeout` runs out; true if it exited
    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn output_streams(&self, name: &str) -> Result<(Stdio, Stdio), MountError> {
        let log_dir = match (&self.config.log_dir, self.config.debug) {
            (Some(dir), true) => dir,
            _ => return Ok((Stdio::null(), Stdio::null())),
        };

        let open = |suffix: &str| -> Result<File, MountError> {
            let path = log_dir.join(format!("{name}.{suffix}.txt"));
            fs::create_dir_all(log_dir)
                .and_then(|_| File::create(&path))
                .map_err(|source| MountError::LogFile { path, source })
        };
        Ok((open("stdout")?.into(), open("stderr")?.into()))
    }
}

fn send_signal(pid: libc::pid_t, signal: libc::c_int, group: bool) -> io::Result<()> {
    if pid <= 0 {
        return Ok(());
    }
    // SAFETY: plain signal syscalls with no memory arguments. The pid belongs
    // to a child that has not been reaped yet, so it cannot have been reused.
    let rc = unsafe {
        if group {
            libc::killpg(pid, signal)
        } else {
            libc::kill(pid, signal)
        }
    };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(()),
        _ => Err(err),
    }
}

fn remove_mountpoint(path: &Path) {
    match fs::remove_dir(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed mountpoint"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "leaving mountpoint in place: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::host_set::HostSet;

    fn volume(mode: LeafMode, auth: Option<&str>) -> VolumeConfig {
        VolumeConfig {
            name: "vol".to_string(),
            hosts: HostSet::new(["zk2:2181", "zk1:2181"]).unwrap(),
            path: "/data".to_string(),
            mode,
            auth: auth.map(str::to_string),
        }
    }

    fn shell(script: &str, base: &Path) -> SupervisorConfig {
        SupervisorConfig {
            helper_binary: PathBuf::from("/bin/sh"),
            helper_args: vec!["-c".to_string(), script.to_string(), "zookeeperfuse".to_string()],
            base_path: base.to_path_buf(),
            log_dir: None,
            debug: false,
            startup_grace: Duration::from_millis(300),
            terminate_timeout: Duration::from_secs(2),
            kill_timeout: Duration::from_secs(2),
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_command_line_defaults() {
        let supervisor = MountSupervisor::new(Arc::new(SupervisorConfig::default()));
        let args = supervisor.command_line(&volume(LeafMode::Dir, None), Path::new("/mnt/volumes/0"));

        assert_eq!(
            strings(args),
            [
                "-o",
                "auto_unmount",
                "-f",
                "/mnt/volumes/0",
                "--",
                "--zooHosts",
                "zk1:2181,zk2:2181",
                "--zooPath",
                "/data",
            ]
        );
    }

    #[test]
    fn test_command_line_with_mode_auth_and_debug() {
        let config = SupervisorConfig {
            debug: true,
            ..SupervisorConfig::default()
        };
        let supervisor = MountSupervisor::new(Arc::new(config));
        let args = supervisor.command_line(
            &volume(LeafMode::File, Some("digest:user:pw")),
            Path::new("/mnt/volumes/3"),
        );

        assert_eq!(
            strings(args),
            [
                "-o",
                "auto_unmount",
                "-f",
                "/mnt/volumes/3",
                "-o",
                "debug",
                "--",
                "--zooHosts",
                "zk1:2181,zk2:2181",
                "--zooPath",
                "/data",
                "--leafMode",
                "FILE",
                "--zooAuthentication",
                "digest:user:pw",
                "--logLevel",
                "DEBUG",
            ]
        );
    }

    #[test]
    fn test_mountpoint_from_id() {
        let config = SupervisorConfig {
            base_path: PathBuf::from("/srv/mounts"),
            ..SupervisorConfig::default()
        };
        assert_eq!(config.mountpoint(7), PathBuf::from("/srv/mounts/7"));
    }

    #[test]
    fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let mountpoint = dir.path().join("0");
        let mut supervisor = MountSupervisor::new(Arc::new(shell("exec sleep 30", dir.path())));

        supervisor.start(&volume(LeafMode::Dir, None), &mountpoint).unwrap();
        assert!(supervisor.is_running());
        assert!(mountpoint.is_dir());

        supervisor.stop().unwrap();
        assert!(!supervisor.is_running());
        assert!(!supervisor.has_process());
        assert!(!mountpoint.exists());
        // Terminated by SIGTERM.
        assert_eq!(
            supervisor.last_exit().and_then(|s| s.signal()),
            Some(libc::SIGTERM)
        );
    }

    #[test]
    fn test_early_exit_is_mount_failure() {
        let dir = TempDir::new().unwrap();
        let mountpoint = dir.path().join("0");
        let mut supervisor = MountSupervisor::new(Arc::new(shell("exit 3", dir.path())));

        let err = supervisor
            .start(&volume(LeafMode::Dir, None), &mountpoint)
            .unwrap_err();
        assert!(matches!(err, MountError::Exited { code: Some(3), .. }));
        assert!(!supervisor.has_process());
        assert_eq!(supervisor.last_exit_code(), Some(3));
        // Left behind for inspection.
        assert!(mountpoint.is_dir());

        // Nothing to tear down, and the failed mountpoint stays put.
        supervisor.stop().unwrap();
        assert!(mountpoint.is_dir());
    }

    #[test]
    fn test_missing_binary_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let config = SupervisorConfig {
            helper_binary: dir.path().join("does-not-exist"),
            ..shell("", dir.path())
        };
        let mut supervisor = MountSupervisor::new(Arc::new(config));

        let err = supervisor
            .start(&volume(LeafMode::Dir, None), &dir.path().join("0"))
            .unwrap_err();
        assert!(matches!(err, MountError::Spawn { .. }));
    }

    #[test]
    fn test_escalates_to_sigkill() {
        let dir = TempDir::new().unwrap();
        let mountpoint = dir.path().join("0");
        let config = SupervisorConfig {
            terminate_timeout: Duration::from_millis(300),
            ..shell("trap '' TERM; exec sleep 30", dir.path())
        };
        let mut supervisor = MountSupervisor::new(Arc::new(config));

        supervisor.start(&volume(LeafMode::Dir, None), &mountpoint).unwrap();
        supervisor.stop().unwrap();

        assert!(!supervisor.has_process());
        assert_eq!(
            supervisor.last_exit().and_then(|s| s.signal()),
            Some(libc::SIGKILL)
        );
        assert!(!mountpoint.exists());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = MountSupervisor::new(Arc::new(shell("exec sleep 30", dir.path())));
        supervisor.stop().unwrap();
        assert!(supervisor.last_exit().is_none());
    }

    #[test]
    fn test_debug_output_goes_to_log_files() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let config = SupervisorConfig {
            log_dir: Some(log_dir.clone()),
            debug: true,
            ..shell("echo out; echo err >&2; exec sleep 30", dir.path())
        };
        let mut supervisor = MountSupervisor::new(Arc::new(config));

        supervisor
            .start(&volume(LeafMode::Dir, None), &dir.path().join("0"))
            .unwrap();
        supervisor.stop().unwrap();

        let stdout = fs::read_to_string(log_dir.join("vol.stdout.txt")).unwrap();
        let stderr = fs::read_to_string(log_dir.join("vol.stderr.txt")).unwrap();
        assert_eq!(stdout.trim(), "out");
        assert_eq!(stderr.trim(), "err");
    }
}
