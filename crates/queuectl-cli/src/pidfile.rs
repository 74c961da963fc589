//! `workers.pid`: one PID per line, one line per running `worker start`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registered PIDs. A missing file means none. Unparsable lines are skipped.
    pub fn read(&self) -> io::Result<Vec<u32>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text
                .lines()
                .filter_map(|line| line.trim().parse().ok())
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn register(&self, pid: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{pid}")
    }

    /// Drop `pid`; the file is deleted once it is empty.
    pub fn unregister(&self, pid: u32) -> io::Result<()> {
        let rest: Vec<u32> = self.read()?.into_iter().filter(|p| *p != pid).collect();
        if rest.is_empty() {
            return self.remove();
        }
        let text: String = rest.iter().map(|p| format!("{p}\n")).collect();
        std::fs::write(&self.path, text)
    }

    pub fn remove(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
