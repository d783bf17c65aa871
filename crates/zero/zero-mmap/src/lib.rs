use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write memory mapping that can host a ring.
///
/// File-backed regions are shared with every process that maps the same
/// file. Mappings are page-aligned, which covers the word alignment the ring
/// header needs.
pub struct MmapRegion {
    _file: Option<File>,
    mmap: MmapMut,
}

impl MmapRegion {
    /// Create (or truncate) a file of `size_bytes` and map it read-write.
    ///
    /// The new file reads as zeros, so a ring created in it starts out
    /// uninitialized.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: Some(file),
            mmap,
        })
    }

    /// Open an existing file and map all of it read-write
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            _file: Some(file),
            mmap,
        })
    }

    /// Map `size_bytes` of zeroed anonymous memory.
    pub fn anonymous(size_bytes: usize) -> io::Result<Self> {
        let mmap = MmapMut::map_anon(size_bytes)?;
        Ok(Self { _file: None, mmap })
    }

    /// Return raw pointer to start of memory mapped data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Flush outstanding changes of a file-backed mapping to disk.
    pub fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }
}
