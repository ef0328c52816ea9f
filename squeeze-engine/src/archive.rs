use std::{
    io::Write,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use zip::{
    CompressionMethod, ZipWriter,
    write::{SimpleFileOptions, StreamWriter},
};

use crate::error::ArchiveError;

/// A named buffer written once into the output.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Bytes,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Destination for the entries of a job. Implementations do blocking I/O and
/// are driven from a blocking thread, one call at a time.
pub trait EntrySink: Send + 'static {
    fn append(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError>;

    /// Called once, after every outcome of the job has settled.
    fn finish(&mut self) -> Result<(), ArchiveError>;
}

/// Refuses writes once the assembler is dropped unfinished, so the
/// finalize-on-drop of `ZipWriter` never emits a central directory.
struct Fused<W> {
    inner: W,
    open: Arc<AtomicBool>,
}

impl<W: Write> Write for Fused<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.open.load(Ordering::Acquire) {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        self.inner.flush()
    }
}

/// Streaming zip writer. Entries are deflated and written as they arrive;
/// nothing reaches the sink before the first entry, and the central
/// directory is only written by [`ArchiveAssembler::finish`].
pub struct ArchiveAssembler<W: Write> {
    pending: Option<Fused<W>>,
    writer: Option<ZipWriter<StreamWriter<Fused<W>>>>,
    open: Arc<AtomicBool>,
    options: SimpleFileOptions,
    entries: usize,
    finished: bool,
}

impl<W: Write> ArchiveAssembler<W> {
    pub fn new(sink: W) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9))
            .unix_permissions(0o644);
        let open = Arc::new(AtomicBool::new(true));
        Self {
            pending: Some(Fused {
                inner: sink,
                open: Arc::clone(&open),
            }),
            writer: None,
            open,
            options,
            entries: 0,
            finished: false,
        }
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn append(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError> {
        if self.finished {
            return Err(ArchiveError::Finished);
        }
        if self.writer.is_none() {
            let sink = self.pending.take().ok_or(ArchiveError::Finished)?;
            self.writer = Some(ZipWriter::new_stream(sink));
        }
        let writer = self.writer.as_mut().ok_or(ArchiveError::Finished)?;

        writer.start_file(entry.name.as_str(), self.options)?;
        writer.write_all(&entry.data)?;
        self.entries += 1;
        Ok(())
    }

    /// Write the central directory and flush. Fails with
    /// [`ArchiveError::Empty`] when no entry was appended.
    pub fn finish(&mut self) -> Result<(), ArchiveError> {
        if self.finished {
            return Err(ArchiveError::Finished);
        }
        self.finished = true;
        self.pending = None;

        let writer = self.writer.take().ok_or(ArchiveError::Empty)?;
        let mut out = writer.finish()?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write> Drop for ArchiveAssembler<W> {
    fn drop(&mut self) {
        if !self.finished {
            self.open.store(false, Ordering::Release);
        }
    }
}

impl<W: Write + Send + 'static> EntrySink for ArchiveAssembler<W> {
    fn append(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError> {
        ArchiveAssembler::append(self, entry)
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        ArchiveAssembler::finish(self)
    }
}

/// Batch mode sink: every entry becomes a file in `dir`.
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl EntrySink for DirectorySink {
    fn append(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError> {
        let path = self.dir.join(&entry.name);
        std::fs::write(&path, &entry.data)?;
        self.written.push(path);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        Ok(())
    }
}
