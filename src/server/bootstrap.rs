//! Process lifecycle: daemonization, privilege drop, PID file, signal
//! handling, and the top-level init → serve → shutdown sequence that
//! `main()` calls into.

use crate::config::Config;
use crate::logging::{self, LogReopenHandle};
use crate::server::{self, ProxyState};
use std::ffi::CString;
use std::fmt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

/// CLI arguments forwarded from `main()`. Daemonization itself already
/// happened (or was skipped) before the tokio runtime was built, so this
/// only needs the config path.
pub struct BootstrapArgs {
    pub config_path: PathBuf,
}

/// Distinguishes the handful of startup failure modes `main()` maps to
/// distinct `sysexits.h`-style exit codes.
pub enum StartupError {
    Config(anyhow::Error),
    Socket(anyhow::Error),
    UnknownUser(String),
    PrivilegeDrop(anyhow::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "configuration error: {e:#}"),
            StartupError::Socket(e) => write!(f, "socket setup failed: {e:#}"),
            StartupError::UnknownUser(name) => write!(f, "unknown user or group: {name}"),
            StartupError::PrivilegeDrop(e) => write!(f, "failed to drop privileges: {e:#}"),
        }
    }
}

/// Double-fork + `setsid` + `chdir("/")` + redirect stdio to `/dev/null`.
///
/// Must run before the tokio runtime is built: forking a process that
/// already has multiple threads running is unsound, since only the
/// forking thread survives into the child.
pub fn daemonize() -> std::io::Result<()> {
    unsafe {
        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }

        if libc::setsid() == -1 {
            return Err(std::io::Error::last_os_error());
        }

        match libc::fork() {
            -1 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }

        let root = CString::new("/").expect("no NUL bytes");
        if libc::chdir(root.as_ptr()) == -1 {
            return Err(std::io::Error::last_os_error());
        }
    }

    redirect_stdio_to_devnull()
}

fn redirect_stdio_to_devnull() -> std::io::Result<()> {
    let devnull = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")?;
    let fd = devnull.as_raw_fd();
    unsafe {
        libc::dup2(fd, libc::STDIN_FILENO);
        libc::dup2(fd, libc::STDOUT_FILENO);
        libc::dup2(fd, libc::STDERR_FILENO);
    }
    Ok(())
}

fn write_pid_file(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

/// `setgid`/`setuid` to the configured `Group`/`User`, numeric or by name.
/// Group is dropped before user — dropping the user first would revoke the
/// privilege `setgid` needs.
fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<(), StartupError> {
    if let Some(name) = group {
        let gid = resolve_group(name)?;
        unsafe {
            if libc::setgroups(0, std::ptr::null()) != 0 {
                return Err(StartupError::PrivilegeDrop(anyhow::anyhow!(
                    "setgroups: {}",
                    std::io::Error::last_os_error()
                )));
            }
            if libc::setgid(gid) != 0 {
                return Err(StartupError::PrivilegeDrop(anyhow::anyhow!(
                    "setgid({gid}): {}",
                    std::io::Error::last_os_error()
                )));
            }
        }
    }

    if let Some(name) = user {
        let uid = resolve_user(name)?;
        unsafe {
            if libc::setuid(uid) != 0 {
                return Err(StartupError::PrivilegeDrop(anyhow::anyhow!(
                    "setuid({uid}): {}",
                    std::io::Error::last_os_error()
                )));
            }
        }
    }

    Ok(())
}

const LOOKUP_BUF_LEN: usize = 16 * 1024;

fn resolve_user(name: &str) -> Result<libc::uid_t, StartupError> {
    if let Ok(uid) = name.parse::<libc::uid_t>() {
        return Ok(uid);
    }
    let cname = CString::new(name).map_err(|_| StartupError::UnknownUser(name.to_string()))?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0_i8; LOOKUP_BUF_LEN];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwnam_r(
            cname.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() {
        return Err(StartupError::UnknownUser(name.to_string()));
    }
    Ok(pwd.pw_uid)
}

fn resolve_group(name: &str) -> Result<libc::gid_t, StartupError> {
    if let Ok(gid) = name.parse::<libc::gid_t>() {
        return Ok(gid);
    }
    let cname = CString::new(name).map_err(|_| StartupError::UnknownUser(name.to_string()))?;
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut buf = vec![0_i8; LOOKUP_BUF_LEN];
    let mut result: *mut libc::group = std::ptr::null_mut();
    let rc = unsafe {
        libc::getgrnam_r(
            cname.as_ptr(),
            &mut grp,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() {
        return Err(StartupError::UnknownUser(name.to_string()));
    }
    Ok(grp.gr_gid)
}

/// init → bind → drop privileges → serve → wait for signal → drain → exit.
pub async fn run(args: BootstrapArgs) -> Result<(), StartupError> {
    let config = Config::load(&args.config_path).map_err(StartupError::Config)?;

    let (_guard, reopen_handle) = logging::init(
        config.log_file.as_deref(),
        config.syslog,
        &config.log_level,
    );

    let proxy_listeners = server::bind_all(&config).map_err(StartupError::Socket)?;
    let admin_listener = match &config.admin_listen {
        Some(addr) => Some(server::bind_admin(addr).await.map_err(StartupError::Socket)?),
        None => None,
    };

    drop_privileges(config.user.as_deref(), config.group.as_deref())?;

    if let Some(pid_path) = &config.pid_path {
        if let Err(e) = write_pid_file(pid_path) {
            warn!("failed to write pid file {}: {e}", pid_path.display());
        }
    }

    let state = server::new_state(config, Some(args.config_path.clone()))
        .map_err(StartupError::Config)?;

    spawn_signal_handlers(state.clone(), reopen_handle);

    info!("tinyrelay starting");

    let admin_handle = admin_listener.map(|listener| {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_admin_server(listener, state).await {
                error!("admin server exited: {e:#}");
            }
        })
    });

    if let Err(e) = server::run_proxy_server(state.clone(), proxy_listeners).await {
        error!("proxy server exited: {e:#}");
    }

    if let Some(handle) = admin_handle {
        handle.abort();
    }

    if let Some(pid_path) = &state.config().pid_path {
        let _ = std::fs::remove_file(pid_path);
    }

    info!("tinyrelay shutdown complete");
    Ok(())
}

/// SIGHUP reloads config + reopens the log file; SIGTERM/SIGINT request a
/// graceful shutdown, picked up by the accept loop between connections.
fn spawn_signal_handlers(state: Arc<ProxyState>, reopen_handle: Option<LogReopenHandle>) {
    tokio::spawn({
        let state = state.clone();
        async move {
            let mut hup = match signal(SignalKind::hangup()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGHUP handler: {e}");
                    return;
                }
            };
            loop {
                hup.recv().await;
                info!("SIGHUP received, reloading configuration");
                state.request_reload();
                if let Some(handle) = &reopen_handle {
                    handle.request_reopen();
                }
            }
        }
    });

    tokio::spawn({
        let state = state.clone();
        async move {
            let mut term = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e}");
                    return;
                }
            };
            term.recv().await;
            info!("SIGTERM received, shutting down");
            state.request_quit();
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, shutting down");
            state.request_quit();
        }
    });
}
