//! Buffer objects shared between host and emulated device.
//!
//! Each buffer keeps two copies of its contents, a host view and a device
//! view, stored as 32-bit words (every kernel here works on `int32_t`).
//! [`BufferObject::sync`] is the only way data crosses between them.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::device::Device;
use super::RuntimeError;

/// Largest buffer object the emulator allocates (1 GiB).
pub const MAX_BO_BYTES: usize = 1 << 30;

/// Allocation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoFlags {
    /// Plain device buffer.
    Normal,
    /// Cacheable buffer, used for instruction streams.
    Cacheable,
    /// Host-only buffer, used for kernel data.
    HostOnly,
}

/// Direction of a [`BufferObject::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Host view to device view.
    ToDevice,
    /// Device view to host view.
    FromDevice,
}

struct BoInner {
    id: u32,
    bytes: usize,
    flags: BoFlags,
    group: u32,
    host: Mutex<Vec<u32>>,
    device: Mutex<Vec<u32>>,
}

/// Handle to a buffer object. Clones share the same storage.
#[derive(Clone)]
pub struct BufferObject {
    inner: Arc<BoInner>,
}

/// Locked view of one side of a buffer.
pub struct BoMap<'a>(MutexGuard<'a, Vec<u32>>);

impl Deref for BoMap<'_> {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.0
    }
}

impl DerefMut for BoMap<'_> {
    fn deref_mut(&mut self) -> &mut [u32] {
        &mut self.0
    }
}

fn lock(words: &Mutex<Vec<u32>>) -> MutexGuard<'_, Vec<u32>> {
    words.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BufferObject {
    /// Allocate a zero-filled buffer of `bytes` bytes in memory group `group`.
    ///
    /// Storage is rounded up to whole 32-bit words.
    pub fn new(device: &Device, bytes: usize, flags: BoFlags, group: u32) -> Result<Self, RuntimeError> {
        if bytes == 0 {
            return Err(RuntimeError::ZeroSizedBuffer);
        }
        if bytes > MAX_BO_BYTES {
            return Err(RuntimeError::BufferTooLarge { bytes, max: MAX_BO_BYTES });
        }

        let words = bytes.div_ceil(4);
        let id = device.next_bo_id().fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "bo#{}: {} bytes ({} words), {:?}, group {}",
            id, bytes, words, flags, group
        );

        Ok(Self {
            inner: Arc::new(BoInner {
                id,
                bytes,
                flags,
                group,
                host: Mutex::new(vec![0; words]),
                device: Mutex::new(vec![0; words]),
            }),
        })
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.inner.bytes
    }

    /// Number of 32-bit words backing the buffer.
    pub fn words(&self) -> usize {
        lock(&self.inner.host).len()
    }

    /// Allocation flags.
    pub fn flags(&self) -> BoFlags {
        self.inner.flags
    }

    /// Memory group the buffer was allocated in.
    pub fn group(&self) -> u32 {
        self.inner.group
    }

    /// Host view, read-only.
    pub fn map(&self) -> BoMap<'_> {
        BoMap(lock(&self.inner.host))
    }

    /// Host view, writable.
    pub fn map_mut(&self) -> BoMap<'_> {
        BoMap(lock(&self.inner.host))
    }

    /// Copy `words` into the start of the host view.
    ///
    /// Extra words beyond the buffer are dropped.
    pub fn write(&self, words: &[u32]) {
        let mut host = self.map_mut();
        let n = words.len().min(host.len());
        host[..n].copy_from_slice(&words[..n]);
    }

    /// Zero the host view.
    pub fn clear(&self) {
        self.map_mut().fill(0);
    }

    /// Snapshot of the host view.
    pub fn to_vec(&self) -> Vec<u32> {
        self.map().to_vec()
    }

    /// Move data between host and device views.
    pub fn sync(&self, direction: SyncDirection) {
        // always host then device
        let mut host = lock(&self.inner.host);
        let mut device = lock(&self.inner.device);
        match direction {
            SyncDirection::ToDevice => device.copy_from_slice(&host),
            SyncDirection::FromDevice => host.copy_from_slice(&device),
        }
        log::trace!("bo#{}: sync {:?}", self.inner.id, direction);
    }

    /// Device view, for the emulated kernel.
    pub(crate) fn device_view(&self) -> BoMap<'_> {
        BoMap(lock(&self.inner.device))
    }

    /// Whether two handles refer to the same storage.
    pub fn same_as(&self, other: &BufferObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("id", &self.inner.id)
            .field("bytes", &self.inner.bytes)
            .field("flags", &self.inner.flags)
            .field("group", &self.inner.group)
            .finish()
    }
}
