//! Client for reading and writing a single control file.
//!
//! A [`FileClient`] binds a human-readable name to one filesystem path,
//! probes whether the file is accessible, and reads or writes it. Files
//! that need root are accessed through the shared [`Shell`]; everything
//! else goes through `std::fs` directly.
//!
//! # Availability
//!
//! Accessibility is probed once at construction and cached; call
//! [`FileClient::refresh`] to re-probe. A missing file is a recorded,
//! queryable state, never a construction failure: callers are expected to
//! check [`FileClient::available`] and degrade.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use rustix::fs::{access, Access};
use tracing::{error, info, warn, Span};

use crate::{
    error::{ClientError, Failure, ShellError},
    shell::{quote, Shell},
};

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Non-destructive accessibility probe.
///
/// Elevated clients only check existence: the escalated reader runs as
/// root, so an `access(2)` check as the current user would be a false
/// negative. Direct clients additionally require read permission.
fn probe(path: &Path, sudo: bool) -> bool {
    if sudo {
        access(path, Access::EXISTS).is_ok()
    } else {
        access(path, Access::READ_OK).is_ok()
    }
}

/// Clip `raw` to its first `head` or last `tail` bytes.
fn clip(raw: &[u8], head: usize, tail: usize) -> String {
    let len = raw.len();
    let bytes = if head > 0 {
        &raw[..head.min(len)]
    } else if tail > 0 {
        &raw[len - tail.min(len)..]
    } else {
        raw
    };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Builds a [`FileClient`].
///
/// Concrete bindings (see [`crate::control`]) construct their clients
/// through this, fixing the path and access policy for one specific file.
#[derive(Debug)]
pub struct FileClientBuilder {
    path: PathBuf,
    name: String,
    sudo: bool,
    required: bool,
}

impl FileClientBuilder {
    /// Route reads and writes through the elevated shell.
    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// Treat absence of the file as expected: probe failures are logged as
    /// warnings instead of errors.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Probe the file and build the client.
    ///
    /// Never fails. A `required` file that is not accessible logs one
    /// error record; an optional one logs a warning.
    pub fn build(self, shell: Arc<Shell>) -> FileClient {
        let Self {
            path,
            name,
            sudo,
            required,
        } = self;
        let span = tracing::info_span!("file_client", file = %name);
        let available = probe(&path, sudo);
        if !available {
            let _guard = span.enter();
            if required {
                error!(path = %path.display(), "required control file is not accessible");
            } else {
                warn!(path = %path.display(), "control file is not accessible");
            }
        }
        FileClient {
            path,
            name,
            sudo,
            required,
            shell,
            span,
            available: Mutex::new(available),
        }
    }
}

/// One named control file, read and written as a whole.
///
/// Clients are `Send + Sync`; the cached availability state doubles as a
/// lock serializing the read/write critical section, so shell-mediated
/// operations against the same file never interleave.
#[derive(Debug)]
pub struct FileClient {
    path: PathBuf,
    name: String,
    sudo: bool,
    required: bool,

    /// Shared process-wide executor, injected at construction.
    shell: Arc<Shell>,

    /// Tags every diagnostic record with this client's name.
    span: Span,

    /// Cached result of the last availability probe.
    available: Mutex<bool>,
}

impl FileClient {
    /// Start building a client for `path`, identified as `name` in
    /// diagnostics.
    ///
    /// Defaults: direct (non-elevated) access, `required`.
    pub fn builder(path: impl Into<PathBuf>, name: impl Into<String>) -> FileClientBuilder {
        FileClientBuilder {
            path: path.into(),
            name: name.into(),
            sudo: false,
            required: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the file was accessible when last probed.
    ///
    /// Returns the cached state and never errors. Use
    /// [`FileClient::refresh`] to re-probe.
    pub fn available(&self) -> bool {
        *self.lock()
    }

    /// Re-probe the file and update the cached state.
    ///
    /// Logs only on a transition, so polling callers don't flood the log.
    pub fn refresh(&self) -> bool {
        let mut available = self.lock();
        let now = probe(&self.path, self.sudo);
        if now != *available {
            let _guard = self.span.enter();
            match (now, self.required) {
                (false, true) => {
                    error!(path = %self.path.display(), "control file became inaccessible")
                }
                (false, false) => {
                    warn!(path = %self.path.display(), "control file became inaccessible")
                }
                (true, _) => info!(path = %self.path.display(), "control file became accessible"),
            }
        }
        *available = now;
        now
    }

    /// Read the file's contents.
    ///
    /// `head` selects the first `head` bytes, `tail` the last `tail`
    /// bytes; `0` for both reads everything. Requests past the end are
    /// clipped to the content. `head` and `tail` can't be combined, that
    /// fails with [`ClientError::InvalidRange`].
    ///
    /// Elevated clients read through `cat` under the escalation front-end;
    /// the clipping always happens client-side.
    pub fn read(&self, head: usize, tail: usize) -> Result<String> {
        if head != 0 && tail != 0 {
            return Err(ClientError::InvalidRange(head, tail));
        }
        let _available = self.ensure_available("read")?;
        let raw = if self.sudo {
            let command = format!("cat -- {}", quote(&self.path.to_string_lossy()));
            let out = self
                .shell
                .run(&command, true)
                .map_err(|e| self.shell_failed(e, false))?;
            if !out.success() {
                return Err(self.read_failed(Failure::Exit {
                    status: out.status,
                    stderr: out.stderr,
                }));
            }
            out.stdout.into_bytes()
        } else {
            fs::read(&self.path).map_err(|e| self.read_failed(e.into()))?
        };
        Ok(clip(&raw, head, tail))
    }

    /// Replace the file's contents with `content`.
    ///
    /// Always a full replace, never an append. Elevated clients write
    /// through `tee` under the escalation front-end. A failed write leaves
    /// the on-disk state undefined; retrying is up to the caller.
    pub fn write(&self, content: &str) -> Result<()> {
        let _available = self.ensure_available("write")?;
        if self.sudo {
            let command = format!("tee -- {} > /dev/null", quote(&self.path.to_string_lossy()));
            let out = self
                .shell
                .run_with_input(&command, true, Some(content))
                .map_err(|e| self.shell_failed(e, true))?;
            if !out.success() {
                return Err(self.write_failed(Failure::Exit {
                    status: out.status,
                    stderr: out.stderr,
                }));
            }
            Ok(())
        } else {
            fs::write(&self.path, content).map_err(|e| self.write_failed(e.into()))
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.available.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject the operation up front when the last probe failed.
    ///
    /// The returned guard keeps the critical section locked for the
    /// duration of the operation.
    fn ensure_available(&self, op: &str) -> Result<MutexGuard<'_, bool>> {
        let guard = self.lock();
        if *guard {
            Ok(guard)
        } else {
            let _span = self.span.enter();
            if self.required {
                error!(path = %self.path.display(), "{op} rejected, control file is not available");
            } else {
                warn!(path = %self.path.display(), "{op} rejected, control file is not available");
            }
            Err(ClientError::Unavailable(self.name.clone()))
        }
    }

    fn read_failed(&self, cause: Failure) -> ClientError {
        let _span = self.span.enter();
        if self.required {
            error!(path = %self.path.display(), %cause, "read failed");
        } else {
            warn!(path = %self.path.display(), %cause, "read failed");
        }
        ClientError::Read(self.name.clone(), cause)
    }

    fn write_failed(&self, cause: Failure) -> ClientError {
        let _span = self.span.enter();
        if self.required {
            error!(path = %self.path.display(), %cause, "write failed");
        } else {
            warn!(path = %self.path.display(), %cause, "write failed");
        }
        ClientError::Write(self.name.clone(), cause)
    }

    fn shell_failed(&self, e: ShellError, write: bool) -> ClientError {
        match e {
            ShellError::Timeout(limit) => {
                let _span = self.span.enter();
                error!(path = %self.path.display(), ?limit, "command timed out");
                ClientError::Timeout(limit)
            }
            ShellError::Io(e) => {
                if write {
                    self.write_failed(e.into())
                } else {
                    self.read_failed(e.into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use anyhow::Result;
    use tempfile::NamedTempFile;
    use tracing::Level;

    use super::*;

    fn shell() -> Arc<Shell> {
        Arc::new(Shell::new())
    }

    fn client(path: &Path) -> FileClient {
        FileClient::builder(path, "test").build(shell())
    }

    fn fixture(content: &str) -> Result<NamedTempFile> {
        let mut f = NamedTempFile::new()?;
        f.write_all(content.as_bytes())?;
        Ok(f)
    }

    #[test]
    fn missing_path_is_unavailable() {
        let c = FileClient::builder("/sys/class/hwmon/hwmon99/fan1_input", "fan1").build(shell());
        assert!(!c.available());
        assert!(matches!(c.read(0, 0), Err(ClientError::Unavailable(_))));
        assert!(matches!(c.write("1"), Err(ClientError::Unavailable(_))));
    }

    #[test]
    fn round_trips() -> Result<()> {
        let f = fixture("42\n")?;
        let c = client(f.path());
        assert!(c.available());
        assert_eq!(c.read(0, 0)?, "42\n");
        // Repeated full reads are stable.
        assert_eq!(c.read(0, 0)?, "42\n");

        c.write("99")?;
        assert_eq!(c.read(0, 0)?, "99");
        Ok(())
    }

    #[test]
    fn write_replaces_instead_of_appending() -> Result<()> {
        let f = fixture("a much longer original value\n")?;
        let c = client(f.path());
        c.write("x")?;
        assert_eq!(c.read(0, 0)?, "x");
        Ok(())
    }

    #[test]
    fn head_and_tail_are_bytes() -> Result<()> {
        let f = fixture("42\n")?;
        let c = client(f.path());
        assert_eq!(c.read(1, 0)?, "4");
        assert_eq!(c.read(0, 2)?, "2\n");
        assert_eq!(c.read(3, 0)?, "42\n");
        // Requests past the end are clipped to the content.
        assert_eq!(c.read(16, 0)?, "42\n");
        assert_eq!(c.read(0, 16)?, "42\n");
        Ok(())
    }

    #[test]
    fn head_and_tail_cant_be_combined() -> Result<()> {
        let f = fixture("42\n")?;
        let c = client(f.path());
        assert!(matches!(c.read(1, 1), Err(ClientError::InvalidRange(1, 1))));
        Ok(())
    }

    #[test]
    fn refresh_tracks_the_filesystem() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("charge_control_end_threshold");

        let c = client(&path);
        assert!(!c.available());

        fs::write(&path, "80\n")?;
        assert!(!c.available(), "state is cached until refreshed");
        assert!(c.refresh());
        assert!(c.available());
        assert_eq!(c.read(0, 0)?, "80\n");

        fs::remove_file(&path)?;
        assert!(!c.refresh());
        assert!(!c.available());
        Ok(())
    }

    /// Counts error/warning events, enough to pin log severities.
    #[derive(Clone, Default)]
    struct LevelCounter(Arc<Counts>);

    #[derive(Default)]
    struct Counts {
        errors: AtomicUsize,
        warnings: AtomicUsize,
    }

    impl tracing::Subscriber for LevelCounter {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

        fn event(&self, event: &tracing::Event<'_>) {
            match *event.metadata().level() {
                Level::ERROR => {
                    self.0.errors.fetch_add(1, Ordering::SeqCst);
                }
                Level::WARN => {
                    self.0.warnings.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }

        fn enter(&self, _: &tracing::span::Id) {}

        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn construction_severity_follows_required() {
        let counter = LevelCounter::default();
        let counts = counter.0.clone();
        tracing::subscriber::with_default(counter, || {
            let _required =
                FileClient::builder("/sys/class/hwmon/hwmon99/fan1_input", "fan1").build(shell());
            assert_eq!(counts.errors.load(Ordering::SeqCst), 1);
            assert_eq!(counts.warnings.load(Ordering::SeqCst), 0);

            let _optional = FileClient::builder("/sys/class/hwmon/hwmon99/fan1_input", "fan1")
                .optional()
                .build(shell());
            assert_eq!(counts.errors.load(Ordering::SeqCst), 1);
            assert_eq!(counts.warnings.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn clipping() {
        assert_eq!(clip(b"42\n", 0, 0), "42\n");
        assert_eq!(clip(b"42\n", 2, 0), "42");
        assert_eq!(clip(b"42\n", 0, 1), "\n");
        assert_eq!(clip(b"", 4, 0), "");
    }
}
