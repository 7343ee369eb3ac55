//! Logging backend selection (SPEC_FULL.md §A.1). `LogFile`/`Syslog` are
//! config-level collaborators per spec.md §1; this wires them to real
//! `tracing` layers the way the teacher wires `tracing_appender`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Holds the non-blocking writer guard alive for the process lifetime —
/// dropping it would silently stop flushing log lines.
pub struct LoggingGuard(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

/// Lets the SIGHUP handler ask the file backend to reopen its path on the
/// next write, the way `logrotate` + a reopening daemon cooperate: rotate
/// moves the old file aside, the signal makes us stop appending to the now-
/// renamed inode and start a fresh one at the same path.
#[derive(Clone)]
pub struct LogReopenHandle(Arc<AtomicBool>);

impl LogReopenHandle {
    pub fn request_reopen(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub fn init(
    log_file: Option<&Path>,
    syslog: bool,
    log_level: &str,
) -> (LoggingGuard, Option<LogReopenHandle>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(map_log_level(log_level)));

    if syslog {
        openlog();
        let layer = SyslogLayer.with_filter(filter);
        tracing_subscriber::registry().with(layer).init();
        return (LoggingGuard(None), None);
    }

    if let Some(path) = log_file {
        let writer = match ReopenableFile::open(path.to_path_buf()) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("failed to open log file {}: {e}, falling back to stdout", path.display());
                let layer = tracing_subscriber::fmt::layer().with_filter(filter);
                tracing_subscriber::registry().with(layer).init();
                return (LoggingGuard(None), None);
            }
        };
        let handle = writer.handle();
        let (non_blocking, guard) = tracing_appender::non_blocking(writer);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).init();
        return (LoggingGuard(Some(guard)), Some(handle));
    }

    let layer = tracing_subscriber::fmt::layer().with_filter(filter);
    tracing_subscriber::registry().with(layer).init();
    (LoggingGuard(None), None)
}

/// A `Write` impl over a log file path that reopens (append mode) the next
/// time it's written to after `request_reopen()` is called.
struct ReopenableFile {
    path: PathBuf,
    file: Mutex<std::fs::File>,
    reopen: Arc<AtomicBool>,
}

impl ReopenableFile {
    fn open(path: PathBuf) -> std::io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            reopen: Arc::new(AtomicBool::new(false)),
        })
    }

    fn handle(&self) -> LogReopenHandle {
        LogReopenHandle(self.reopen.clone())
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

impl std::io::Write for ReopenableFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self.file.lock().expect("log file mutex poisoned");
        if self.reopen.swap(false, Ordering::SeqCst) {
            match open_append(&self.path) {
                Ok(new_file) => *file = new_file,
                Err(e) => eprintln!("log reopen failed for {}: {e}", self.path.display()),
            }
        }
        file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.lock().expect("log file mutex poisoned").flush()
    }
}

fn map_log_level(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "critical" | "error" => "error",
        "warning" => "warn",
        "notice" | "connect" | "info" => "info",
        "debug" => "debug",
        _ => "info",
    }
}

fn openlog() {
    use std::ffi::CString;
    let ident = CString::new("tinyrelay").expect("static ident has no NUL bytes");
    // leaked intentionally: libc::openlog keeps a raw pointer to `ident`
    // for the duration of the process.
    let ident = Box::leak(Box::new(ident));
    unsafe {
        libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON);
    }
}

struct SyslogLayer;

impl<S> Layer<S> for SyslogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let priority = match *event.metadata().level() {
            tracing::Level::ERROR => libc::LOG_ERR,
            tracing::Level::WARN => libc::LOG_WARNING,
            tracing::Level::INFO => libc::LOG_NOTICE,
            tracing::Level::DEBUG | tracing::Level::TRACE => libc::LOG_DEBUG,
        };

        if let Ok(c_message) = std::ffi::CString::new(message) {
            if let Ok(fmt) = std::ffi::CString::new("%s") {
                unsafe {
                    libc::syslog(priority, fmt.as_ptr(), c_message.as_ptr());
                }
            }
        }
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.0, "{value:?}");
        }
    }
}
