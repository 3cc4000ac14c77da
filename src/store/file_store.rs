//! Single-file object store with content-addressed storage
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("SMTSTORE")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - object_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE), newest index segment
//!   - refs_offset: 8 bytes (u64 LE), newest refs block
//!   - refs_count: 8 bytes (u64 LE)
//!   - reserved: 16 bytes
//!
//! [BODY: append-only]
//!   - compressed blobs
//!   - index segments: prev_offset (u64) + count (u64) + (id, offset, size)
//!     entries for the objects added since the previous segment
//!   - refs blocks: every ref, written whenever a ref changed
//! ```
//!
//! Nothing already on disk is overwritten except the header, which is
//! rewritten last on every sync. A crash before the header lands leaves the
//! previous sync's view intact. [`FileStore::compact`] rewrites the file with
//! a single segment and drops bytes no header points at.

use crate::model::Hash;
use crate::store::blob::{Blob, DEFAULT_COMPRESSION_LEVEL};
use crate::store::ObjectStore;
use crate::{Error, Result, MAGIC, VERSION};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

const HEADER_SIZE: u64 = 64;
const INDEX_ENTRY_SIZE: usize = 44; // 32 id + 8 offset + 4 size
const SEGMENT_HEADER_SIZE: usize = 16; // 8 prev + 8 count

/// Index entry for an object
#[derive(Clone, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A content-addressed object store backed by a single file
pub struct FileStore {
    /// Path to the database file
    path: PathBuf,
    /// The file handle and the current append position
    file: Mutex<FileState>,
    /// In-memory index
    index: RwLock<HashMap<Hash, IndexEntry>>,
    /// Refs (namespace → version record)
    refs: RwLock<HashMap<String, Hash>>,
    /// Refs changed since the last sync
    refs_dirty: AtomicBool,
    /// zstd level for new blobs
    compression_level: i32,
}

struct FileState {
    file: File,
    write_offset: u64,
    /// Objects written since the last sync
    pending: Vec<(Hash, IndexEntry)>,
    /// Offset of the newest index segment on disk, 0 if none
    last_segment: u64,
}

/// Where the header currently points
struct Header {
    object_count: u64,
    index_offset: u64,
    refs_offset: u64,
    refs_count: u64,
}

impl Header {
    fn write_to(&self, file: &mut File) -> Result<()> {
        let mut buf = Vec::with_capacity(32);
        buf.extend_from_slice(&self.object_count.to_le_bytes());
        buf.extend_from_slice(&self.index_offset.to_le_bytes());
        buf.extend_from_slice(&self.refs_offset.to_le_bytes());
        buf.extend_from_slice(&self.refs_count.to_le_bytes());
        file.seek(SeekFrom::Start(16))?;
        file.write_all(&buf)?;
        Ok(())
    }
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn encode_segment<'a>(
    prev: u64,
    entries: impl ExactSizeIterator<Item = (&'a Hash, &'a IndexEntry)>,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SEGMENT_HEADER_SIZE + entries.len() * INDEX_ENTRY_SIZE);
    buf.extend_from_slice(&prev.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for (id, entry) in entries {
        buf.extend_from_slice(id.as_bytes());
        buf.extend_from_slice(&entry.offset.to_le_bytes());
        buf.extend_from_slice(&entry.size.to_le_bytes());
    }
    buf
}

/// Refs: name_len (u16) + name + id (32 bytes), sorted by name
fn encode_refs(refs: &HashMap<String, Hash>, buf: &mut Vec<u8>) -> Result<u64> {
    let mut ref_list: Vec<_> = refs.iter().collect();
    ref_list.sort_by(|a, b| a.0.cmp(b.0));

    for (name, id) in &ref_list {
        let name_bytes = name.as_bytes();
        let len = u16::try_from(name_bytes.len())
            .map_err(|_| Error::InvalidFile(format!("Ref name too long: {}", name)))?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(name_bytes);
        buf.extend_from_slice(id.as_bytes());
    }
    Ok(ref_list.len() as u64)
}

/// Read the index segment chain ending at `offset`
fn read_index(file: &mut File, mut offset: u64) -> Result<HashMap<Hash, IndexEntry>> {
    let mut index = HashMap::new();
    while offset > 0 {
        file.seek(SeekFrom::Start(offset))?;
        let mut segment_header = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut segment_header)?;
        let prev = read_u64(&segment_header, 0);
        let count = read_u64(&segment_header, 8);

        for _ in 0..count {
            let mut entry_buf = [0u8; INDEX_ENTRY_SIZE];
            file.read_exact(&mut entry_buf)?;

            let mut id_bytes = [0u8; 32];
            id_bytes.copy_from_slice(&entry_buf[0..32]);
            let id = Hash::from_bytes(id_bytes);

            let entry_offset = read_u64(&entry_buf, 32);
            let mut size_bytes = [0u8; 4];
            size_bytes.copy_from_slice(&entry_buf[40..44]);
            let size = u32::from_le_bytes(size_bytes);

            index.entry(id).or_insert(IndexEntry {
                offset: entry_offset,
                size,
            });
        }

        if prev != 0 && (prev < HEADER_SIZE || prev >= offset) {
            return Err(Error::Corruption(format!(
                "Index segment at {} points forward to {}",
                offset, prev
            )));
        }
        offset = prev;
    }
    Ok(index)
}

fn read_refs(file: &mut File, offset: u64, count: u64) -> Result<HashMap<String, Hash>> {
    let mut refs = HashMap::new();
    if offset == 0 || count == 0 {
        return Ok(refs);
    }

    file.seek(SeekFrom::Start(offset))?;
    for _ in 0..count {
        let mut len_buf = [0u8; 2];
        file.read_exact(&mut len_buf)?;
        let name_len = u16::from_le_bytes(len_buf) as usize;

        let mut name_buf = vec![0u8; name_len];
        file.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf)
            .map_err(|_| Error::Corruption("Ref name is not UTF-8".into()))?;

        let mut id_buf = [0u8; 32];
        file.read_exact(&mut id_buf)?;

        refs.insert(name, Hash::from_bytes(id_buf));
    }
    Ok(refs)
}

fn write_empty_header(file: &mut File) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    Ok(())
}

impl FileStore {
    /// Create a new database file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        write_empty_header(&mut file)?;
        file.sync_all()?;

        debug!(path = %path.display(), "created database file");

        Ok(FileStore {
            path,
            file: Mutex::new(FileState {
                file,
                write_offset: HEADER_SIZE,
                pending: Vec::new(),
                last_segment: 0,
            }),
            index: RwLock::new(HashMap::new()),
            refs: RwLock::new(HashMap::new()),
            refs_dirty: AtomicBool::new(false),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Open an existing database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version_bytes);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let object_count = read_u64(&header, 16);
        let index_offset = read_u64(&header, 24);
        let refs_offset = read_u64(&header, 32);
        let refs_count = read_u64(&header, 40);

        let index = read_index(&mut file, index_offset)?;
        if index.len() as u64 != object_count {
            return Err(Error::Corruption(format!(
                "Header counts {} objects, index holds {}",
                object_count,
                index.len()
            )));
        }
        let refs = read_refs(&mut file, refs_offset, refs_count)?;

        // Anything past the last sync is unindexed; append after it
        let write_offset = file.seek(SeekFrom::End(0))?;

        debug!(
            path = %path.display(),
            objects = index.len(),
            refs = refs.len(),
            "opened database file"
        );

        Ok(FileStore {
            path,
            file: Mutex::new(FileState {
                file,
                write_offset,
                pending: Vec::new(),
                last_segment: index_offset,
            }),
            index: RwLock::new(index),
            refs: RwLock::new(refs),
            refs_dirty: AtomicBool::new(false),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Open or create a database file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Set the zstd level used for blobs written from now on
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compaction_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".compact");
        PathBuf::from(name)
    }
}

impl ObjectStore for FileStore {
    fn put(&self, id: Hash, blob: &Blob) -> Result<()> {
        if self.index.read().contains_key(&id) {
            return Ok(());
        }

        let compressed = blob.compress(self.compression_level)?;
        let size = compressed.len() as u32;

        let mut state = self.file.lock();
        // Another writer stored the same id while we were compressing
        if self.index.read().contains_key(&id) {
            return Ok(());
        }
        let offset = state.write_offset;
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.write_all(&compressed)?;
        state.write_offset = offset + size as u64;

        let entry = IndexEntry { offset, size };
        state.pending.push((id, entry.clone()));
        self.index.write().insert(id, entry);
        Ok(())
    }

    fn get(&self, id: &Hash) -> Result<Blob> {
        let entry = self
            .index
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_hex()))?;

        let mut data = vec![0u8; entry.size as usize];
        {
            let mut state = self.file.lock();
            state.file.seek(SeekFrom::Start(entry.offset))?;
            state.file.read_exact(&mut data)?;
        }

        Blob::decompress(&data)
    }

    fn contains(&self, id: &Hash) -> bool {
        self.index.read().contains_key(id)
    }

    fn object_count(&self) -> usize {
        self.index.read().len()
    }

    fn get_ref(&self, name: &str) -> Option<Hash> {
        self.refs.read().get(name).copied()
    }

    fn set_ref(&self, name: &str, id: Hash) {
        let mut refs = self.refs.write();
        refs.insert(name.to_string(), id);
        self.refs_dirty.store(true, Ordering::SeqCst);
    }

    fn remove_ref(&self, name: &str) -> bool {
        let mut refs = self.refs.write();
        let removed = refs.remove(name).is_some();
        if removed {
            self.refs_dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    fn list_refs(&self) -> Vec<(String, Hash)> {
        self.refs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Append the objects and refs changed since the last sync, then point
    /// the header at them
    fn sync(&self) -> Result<()> {
        let mut state = self.file.lock();
        let refs = self.refs.read();
        let refs_dirty = self.refs_dirty.swap(false, Ordering::SeqCst);
        if state.pending.is_empty() && !refs_dirty {
            return Ok(());
        }

        let result = self.append_sync_record(&mut state, &refs);
        if result.is_err() {
            self.refs_dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    /// Copy every indexed object into a fresh file with a single index
    /// segment, then swap it in
    fn compact(&self) -> Result<()> {
        let mut state = self.file.lock();
        let mut index = self.index.write();
        let refs = self.refs.read();
        let before = state.file.seek(SeekFrom::End(0))?;

        let tmp_path = self.compaction_path();
        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        write_empty_header(&mut out)?;

        let mut objects: Vec<_> = index.iter().map(|(id, e)| (*id, e.clone())).collect();
        objects.sort_by_key(|(_, entry)| entry.offset);

        let mut compacted = HashMap::with_capacity(objects.len());
        let mut offset = HEADER_SIZE;
        let mut data = Vec::new();
        for (id, entry) in objects {
            data.resize(entry.size as usize, 0);
            state.file.seek(SeekFrom::Start(entry.offset))?;
            state.file.read_exact(&mut data)?;
            out.write_all(&data)?;
            compacted.insert(
                id,
                IndexEntry {
                    offset,
                    size: entry.size,
                },
            );
            offset += entry.size as u64;
        }

        let index_offset = offset;
        let mut sorted: Vec<_> = compacted.iter().collect();
        sorted.sort_by_key(|(id, _)| *id.as_bytes());
        let mut buf = encode_segment(0, sorted.into_iter());
        let refs_offset = index_offset + buf.len() as u64;
        let refs_count = encode_refs(&refs, &mut buf)?;
        out.write_all(&buf)?;
        let end = index_offset + buf.len() as u64;

        Header {
            object_count: compacted.len() as u64,
            index_offset,
            refs_offset,
            refs_count,
        }
        .write_to(&mut out)?;
        out.sync_all()?;
        drop(out);

        std::fs::rename(&tmp_path, &self.path)?;
        state.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        state.write_offset = end;
        state.pending.clear();
        state.last_segment = index_offset;
        *index = compacted;
        self.refs_dirty.store(false, Ordering::SeqCst);

        debug!(
            path = %self.path.display(),
            before,
            after = end,
            objects = index.len(),
            "compacted database file"
        );
        Ok(())
    }
}

impl FileStore {
    fn append_sync_record(
        &self,
        state: &mut FileState,
        refs: &HashMap<String, Hash>,
    ) -> Result<()> {
        let start = state.write_offset;
        let index_offset = if state.pending.is_empty() {
            state.last_segment
        } else {
            start
        };

        let mut buf = if state.pending.is_empty() {
            Vec::new()
        } else {
            encode_segment(
                state.last_segment,
                state.pending.iter().map(|(id, entry)| (id, entry)),
            )
        };
        let refs_offset = start + buf.len() as u64;
        let refs_count = encode_refs(refs, &mut buf)?;

        state.file.seek(SeekFrom::Start(start))?;
        state.file.write_all(&buf)?;
        state.file.sync_data()?;

        Header {
            object_count: self.index.read().len() as u64,
            index_offset,
            refs_offset,
            refs_count,
        }
        .write_to(&mut state.file)?;
        state.file.sync_all()?;

        debug!(
            objects = state.pending.len(),
            refs = refs_count,
            bytes = buf.len(),
            "synced database file"
        );

        state.write_offset = start + buf.len() as u64;
        state.last_segment = index_offset;
        state.pending.clear();
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
