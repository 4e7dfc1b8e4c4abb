use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::Frame;

// Magic bytes to identify persisted frame files
const FRAME_MAGIC: &[u8; 4] = b"BLRF"; // "Baler Frame"
const FRAME_FORMAT_VERSION: u32 = 1;
// Magic + version + checksum + length
const ENVELOPE_HEADER_LEN: u64 = 16;
const FRAME_FILE_SUFFIX: &str = ".frame";
const TMP_SUFFIX: &str = ".tmp";
const LOCK_FILE: &str = "LOCK";

/// Directory-backed store for closed frames that must survive a shutdown.
///
/// Each undrained frame becomes one file: a magic/version/checksum envelope
/// around the frame's finalized bytes, written to a temp name and renamed
/// into place. File names embed the frame id, so lexical order equals id
/// order. The directory is single-owner, enforced by an exclusive lock file.
pub struct DurableStore {
    /// Directory holding frame files and the lock file
    dir: PathBuf,
    /// Exclusive lock held for the store's lifetime
    _lock_file: File,
    /// Whether to fsync each frame file and the directory
    sync_writes: bool,
    /// Whether to verify frame checksums on load
    verify_checksums: bool,
}

impl DurableStore {
    /// Create the directory if needed and take exclusive ownership of it
    pub fn acquire<P: AsRef<Path>>(
        dir: P,
        sync_writes: bool,
        verify_checksums: bool,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::storage(format!(
                "Failed to create durable directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)
            .map_err(|e| {
                Error::storage(format!(
                    "Failed to open lock file {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;
        lock_file.try_lock_exclusive().map_err(|_| {
            Error::storage(format!(
                "Durable directory {} is locked by another process",
                dir.display()
            ))
        })?;

        Ok(Self {
            dir,
            _lock_file: lock_file,
            sync_writes,
            verify_checksums,
        })
    }

    /// The directory this store owns
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one closed frame. Returns the final file path.
    ///
    /// The envelope is written to a temp file, synced, then renamed into
    /// place, so the directory never holds a partially written frame under
    /// its final name.
    pub fn persist(&self, frame: &Frame) -> Result<PathBuf> {
        let id = frame
            .id()
            .ok_or_else(|| Error::frame("only closed frames can be persisted"))?;
        if frame.len() > u32::MAX as usize {
            return Err(Error::frame(format!(
                "frame {} of {} bytes exceeds the envelope length field",
                id,
                frame.len()
            )));
        }

        let final_path = self.dir.join(Self::file_name(id));
        let tmp_path = self.dir.join(format!("{}{}", Self::file_name(id), TMP_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| {
                Error::storage(format!(
                    "Failed to create frame file {}: {}",
                    tmp_path.display(),
                    e
                ))
            })?;

        let mut writer = BufWriter::new(&file);
        writer.write_all(FRAME_MAGIC)?;
        writer.write_u32::<BigEndian>(FRAME_FORMAT_VERSION)?;
        writer.write_u32::<BigEndian>(Self::compute_checksum(frame.data()))?;
        writer.write_u32::<BigEndian>(frame.len() as u32)?;
        writer.write_all(frame.data())?;
        writer.flush()?;
        drop(writer);

        if self.sync_writes {
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        if self.sync_writes {
            self.sync_dir()?;
        }

        debug!(id, path = %final_path.display(), "persisted frame");
        Ok(final_path)
    }

    /// Load every persisted frame, sorted by id.
    ///
    /// Temp files left by an interrupted persist are removed; they never
    /// count as persisted. Returns each frame with the file that holds it.
    pub fn load_all(&self) -> Result<Vec<(Frame, PathBuf)>> {
        let mut frames = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if name.ends_with(TMP_SUFFIX) {
                warn!(path = %path.display(), "removing interrupted persist");
                if let Err(err) = fs::remove_file(&path) {
                    warn!(path = %path.display(), %err, "failed to remove temp file");
                }
                continue;
            }
            if !name.ends_with(FRAME_FILE_SUFFIX) {
                continue;
            }

            let frame = self.read_frame_file(&path)?;
            frames.push((frame, path));
        }

        frames.sort_by_key(|(frame, _)| frame.id());
        Ok(frames)
    }

    /// Unlink one persisted frame file
    pub fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn read_frame_file(&self, path: &Path) -> Result<Frame> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| Self::damaged(path, "missing envelope header"))?;
        if &magic != FRAME_MAGIC {
            return Err(Self::damaged(path, "bad magic bytes"));
        }

        let version = reader
            .read_u32::<BigEndian>()
            .map_err(|_| Self::damaged(path, "missing format version"))?;
        if version != FRAME_FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "frame file {} has unsupported format version {}",
                path.display(),
                version
            )));
        }

        let stored_checksum = reader
            .read_u32::<BigEndian>()
            .map_err(|_| Self::damaged(path, "missing checksum"))?;
        let len = reader
            .read_u32::<BigEndian>()
            .map_err(|_| Self::damaged(path, "missing length field"))? as usize;

        // Never size the buffer from a length the file cannot actually hold
        if len as u64 > file_len.saturating_sub(ENVELOPE_HEADER_LEN) {
            return Err(Self::damaged(path, "length field exceeds file size"));
        }

        let mut bytes = vec![0u8; len];
        reader
            .read_exact(&mut bytes)
            .map_err(|_| Self::damaged(path, "truncated frame bytes"))?;

        // Anything after the declared length means the file was tampered with
        let mut extra = [0u8; 1];
        if reader.read(&mut extra)? != 0 {
            return Err(Self::damaged(path, "trailing bytes after frame"));
        }

        if self.verify_checksums {
            let computed = Self::compute_checksum(&bytes);
            if computed != stored_checksum {
                return Err(Error::corruption(format!(
                    "frame file {} checksum mismatch: stored {:08x}, computed {:08x}",
                    path.display(),
                    stored_checksum,
                    computed
                )));
            }
        }

        Frame::parse(&bytes)
    }

    fn sync_dir(&self) -> Result<()> {
        let dir = File::open(&self.dir)?;
        dir.sync_all()?;
        Ok(())
    }

    fn file_name(id: u64) -> String {
        format!("frame-{:020}{}", id, FRAME_FILE_SUFFIX)
    }

    fn damaged(path: &Path, what: &str) -> Error {
        Error::corruption(format!("frame file {}: {}", path.display(), what))
    }

    /// Compute checksum for frame bytes
    fn compute_checksum(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}
