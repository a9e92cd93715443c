use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const TMP_SUFFIX: &str = ".tmp";

/// Writes a replacement for `target` beside it and renames it into place on
/// [`commit`](Self::commit). The rename is the commit point: until it happens
/// the previous contents of `target` stay intact, and an uncommitted writer
/// removes its temp file when dropped.
#[derive(Debug)]
pub struct AtomicFileWriter {
    target: PathBuf,
    tmp: PathBuf,
    file: Option<BufWriter<File>>,
}

impl AtomicFileWriter {
    pub fn create(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = tmp_path(&target);
        let file = File::create(&tmp)?;
        Ok(Self {
            target,
            tmp,
            file: Some(BufWriter::new(file)),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    /// Flushes, fsyncs, and renames the temp file over the target. On failure
    /// the temp file is removed and the target is untouched.
    pub fn commit(mut self) -> io::Result<()> {
        let writer = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer already closed"))?;
        let result = sync(writer).and_then(|()| fs::rename(&self.tmp, &self.target));
        if result.is_err() {
            let _ = fs::remove_file(&self.tmp);
        }
        result
    }

    /// Discards everything written so far; the target is untouched.
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.tmp);
        }
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer already closed"))
    }
}

impl Write for AtomicFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for AtomicFileWriter {
    fn drop(&mut self) {
        self.discard();
    }
}

/// Runs `write` against a fresh [`AtomicFileWriter`] and commits on success.
/// Any error aborts the write and leaves `target` as it was.
pub fn write_atomic<F>(target: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut AtomicFileWriter) -> io::Result<()>,
{
    let mut writer = AtomicFileWriter::create(target)?;
    match write(&mut writer) {
        Ok(()) => writer.commit(),
        Err(err) => {
            writer.abort();
            Err(err)
        }
    }
}

fn sync(writer: BufWriter<File>) -> io::Result<()> {
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(TMP_SUFFIX);
    target.with_file_name(name)
}
