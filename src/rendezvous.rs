use log::debug;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const NAME_LEN: usize = 10;
const CREATE_ATTEMPTS: usize = 5;

/// Removes the pipe when dropped.
struct PipeFile(PathBuf);

impl Drop for PipeFile {
    fn drop(&mut self) {
        if fs::remove_file(&self.0).is_ok() {
            debug!("Removed {:?}", self.0);
        }
    }
}

/// The waiting end of a one-shot start signal carried over a named pipe.
/// The relay writes a single byte once the target program has been spawned.
pub struct StartSignal {
    pipe: PipeFile,
}

impl StartSignal {
    pub fn create() -> io::Result<Self> {
        Self::create_in(&env::temp_dir(), random_name)
    }

    /// Creates a pipe with a fresh name in `dir`, retrying when the name is
    /// taken.
    pub fn create_in(dir: &Path, mut next_name: impl FnMut() -> String) -> io::Result<Self> {
        for _ in 0..CREATE_ATTEMPTS {
            let path = dir.join(next_name());
            match mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR) {
                Ok(()) => return Ok(Self { pipe: PipeFile(path) }),
                Err(Errno::EEXIST) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "failed to create fifo, files already exist",
        ))
    }

    pub fn path(&self) -> &Path {
        &self.pipe.0
    }

    /// Blocks until the other end writes its byte. There is no timeout.
    pub fn wait(self) -> io::Result<()> {
        let mut pipe = File::open(self.path())?;
        let mut buf = [0u8; 1];
        match pipe.read(&mut buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "relay closed the pipe without signaling",
            )),
            _ => Ok(()),
        }
    }
}

/// The signaling end. The pipe is removed however this side ends.
pub struct StartNotifier {
    file: File,
    _pipe: PipeFile,
}

impl StartNotifier {
    /// Opens the pipe for writing. Blocks until the waiting side opens it.
    pub fn open(path: &Path) -> io::Result<Self> {
        let pipe = PipeFile(path.to_path_buf());
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(Self { file, _pipe: pipe })
    }

    pub fn notify(mut self) -> io::Result<()> {
        self.file.write_all(b"1")?;
        self.file.flush()
    }
}

fn random_name() -> String {
    Uuid::new_v4().simple().to_string()[..NAME_LEN].to_string()
}
