/*!
Process-wide stdout capture for in-process execution (Unix only).

While a wrapped handler runs inside the host process:

  - fd 1 points at the write end of a pipe; a drain thread copies the read
    end into a bounded buffer so a chatty handler never blocks on a full pipe
  - fd 2 points at `/dev/null`
  - `CMDTREE_NO_INTERACTIVE=1` is set

Every redirection is owned by a guard whose `Drop` restores it, so the host
streams come back even if setup fails halfway or the closure unwinds.
Teardown order is fixed: restore fd 1 (which closes the last pipe writer),
join the drainer, then release fd 2 and the environment marker.

A single process-wide lock serializes captures; the descriptors being
swapped are global to the process.
*/

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, PipeReader, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::prompt::NO_INTERACTIVE_ENV;

static CAPTURE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Bytes written directly to fd 1 during a capture.
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub(crate) stdout: Vec<u8>,
    pub(crate) truncated: bool,
}

/// Run `f` with fd 1 captured and fd 2 discarded.
pub(crate) fn with_captured_stdio<F, R>(limit: usize, f: F) -> io::Result<(R, Captured)>
where
    F: FnOnce() -> R,
{
    let _lock = CAPTURE_LOCK.lock();

    let (reader, writer) = io::pipe()?;
    let drainer = Drainer::spawn(reader, limit)?;
    let discard = OpenOptions::new().write(true).open("/dev/null")?;

    let _marker = EnvMarker::set(NO_INTERACTIVE_ENV, "1");
    let stderr_guard = Redirect::install(StdStream::Stderr, discard.as_fd().as_raw_fd())?;
    let stdout_guard = Redirect::install(StdStream::Stdout, writer.as_fd().as_raw_fd())?;
    // fd 1 now holds the only write end.
    drop(writer);

    let result = f();

    stdout_guard.restore()?;
    let captured = drainer.join()?;
    drop(stderr_guard);
    Ok((result, captured))
}

/// Detach the protocol channel from fd 1.
///
/// Returns a duplicate of the current fd 1 for the protocol writer and points
/// fd 1 at stderr, so nothing printed later through fd 1 can land between
/// protocol frames.
pub(crate) fn detach_protocol_stdout() -> io::Result<File> {
    StdStream::Stdout.flush();
    let protocol = StdStream::Stdout.duplicate()?;
    dup2(io::stderr().as_fd().as_raw_fd(), StdStream::Stdout.fd())?;
    Ok(File::from(protocol))
}

/* -------------------------------------------------------------------------- */
/* Descriptor Redirection                                                     */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
enum StdStream {
    Stdout,
    Stderr,
}

impl StdStream {
    fn fd(&self) -> RawFd {
        match self {
            StdStream::Stdout => libc::STDOUT_FILENO,
            StdStream::Stderr => libc::STDERR_FILENO,
        }
    }

    fn duplicate(&self) -> io::Result<OwnedFd> {
        match self {
            StdStream::Stdout => io::stdout().as_fd().try_clone_to_owned(),
            StdStream::Stderr => io::stderr().as_fd().try_clone_to_owned(),
        }
    }

    fn flush(&self) {
        let _ = match self {
            StdStream::Stdout => io::stdout().flush(),
            StdStream::Stderr => io::stderr().flush(),
        };
    }
}

fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: both descriptors are open for the duration of the call and
        // dup2 takes ownership of neither.
        let rc = unsafe { libc::dup2(src, dst) };
        if rc != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

struct Redirect {
    stream: StdStream,
    saved: Option<OwnedFd>,
}

impl Redirect {
    fn install(stream: StdStream, replacement: RawFd) -> io::Result<Self> {
        stream.flush();
        let saved = stream.duplicate()?;
        dup2(replacement, stream.fd())?;
        Ok(Self {
            stream,
            saved: Some(saved),
        })
    }

    fn restore(mut self) -> io::Result<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> io::Result<()> {
        if let Some(saved) = self.saved.take() {
            self.stream.flush();
            dup2(saved.as_raw_fd(), self.stream.fd())?;
        }
        Ok(())
    }
}

impl Drop for Redirect {
    fn drop(&mut self) {
        let _ = self.restore_inner();
    }
}

/* -------------------------------------------------------------------------- */
/* Drain Thread                                                               */
/* -------------------------------------------------------------------------- */

struct Drainer {
    handle: JoinHandle<io::Result<Captured>>,
}

impl Drainer {
    fn spawn(reader: PipeReader, limit: usize) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("stdout-drain".into())
            .spawn(move || drain(reader, limit))?;
        Ok(Self { handle })
    }

    fn join(self) -> io::Result<Captured> {
        self.handle
            .join()
            .map_err(|_| io::Error::other("stdout drain thread panicked"))?
    }
}

/// Read until EOF, keeping at most `limit` bytes. Reading continues past the
/// limit so the writer never blocks.
fn drain(mut reader: impl Read, limit: usize) -> io::Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let room = limit.saturating_sub(captured.stdout.len());
        if n > room {
            captured.truncated = true;
        }
        captured.stdout.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(captured)
}

/* -------------------------------------------------------------------------- */
/* Environment Marker                                                         */
/* -------------------------------------------------------------------------- */

struct EnvMarker {
    key: &'static str,
    previous: Option<OsString>,
}

impl EnvMarker {
    fn set(key: &'static str, value: &str) -> Self {
        let previous = std::env::var_os(key);
        // SAFETY: the environment is mutated only here and in `drop`, both
        // while `CAPTURE_LOCK` is held, so markers never race each other.
        // Other reads in the adapter go through `std::env`, which shares
        // std's environment lock with `set_var`. No non-std code in the
        // adapter (libc `getenv`, resolver lookups) runs concurrently with a
        // capture: chat requests and tool calls are strictly sequential.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }
}

impl Drop for EnvMarker {
    fn drop(&mut self) {
        // SAFETY: still under `CAPTURE_LOCK`; see `EnvMarker::set`.
        unsafe {
            match self.previous.take() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }
}
