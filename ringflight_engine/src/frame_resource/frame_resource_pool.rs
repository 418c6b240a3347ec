/// Ring of fixed-size uniform slots gated by a counting semaphore.
///
/// The producer (application thread) acquires a slot, fills it and hands it
/// to the GPU with a completion handler that releases it. At most `depth`
/// slots are in flight at once; `acquire_and_fill` blocks until the GPU gives
/// one back, so the CPU never runs more than `depth` frames ahead and never
/// writes into memory the GPU is still reading.
///
/// Slots are reused round-robin in acquisition order. When completions
/// arrive out of order and the next slot is still in flight, acquisition
/// skips ahead to the next free one.
///
/// # Example
///
/// ```ignore
/// let pool = FrameResourcePool::new(device, 128, 3)?;
/// let handle = pool.acquire_and_fill(bytemuck::bytes_of(&uniforms));
/// encoder.set_uniform_buffer(pool.slot(&handle), 0, 1)?;
/// cmd.add_completed_handler(pool.release_on_completion(handle));
/// cmd.commit()?;
/// ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferDesc, BufferUsage, CompletionHandler, GraphicsDevice};
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

const SOURCE: &str = "ringflight::FrameResourcePool";

/// Unique id per pool, used to detect handles released to the wrong pool
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Public types
// ============================================================================

/// Pool configuration
#[derive(Debug, Clone)]
pub struct FramePoolConfig {
    /// Number of slots, i.e. maximum frames in flight
    pub depth: usize,
    /// Check handle ownership and slot states on every acquire/release
    pub debug_accounting: bool,
    /// Name used in log messages
    pub label: String,
}

impl Default for FramePoolConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            debug_accounting: cfg!(debug_assertions),
            label: "frame_pool".to_string(),
        }
    }
}

/// Proof of one outstanding acquisition
///
/// Not `Clone`: giving it back to `release` (directly or through
/// `release_on_completion`) consumes it.
#[derive(Debug)]
#[must_use = "an acquired slot must be released, or it is lost until the pool is dropped"]
pub struct SlotHandle {
    pool_id: u64,
    index: usize,
}

impl SlotHandle {
    /// Index of the slot in the ring
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Counters since pool creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Releases
    pub releases: u64,
    /// Acquisitions that had to wait for a release
    pub stalls: u64,
}

// ============================================================================
// Shared state
// ============================================================================

struct PoolState {
    /// Semaphore count
    available: usize,
    /// Next slot to hand out
    cursor: usize,
    /// Per-slot "acquired and not yet released" flag
    outstanding: Vec<bool>,
    stats: PoolStats,
}

/// State shared between the pool and its pending completion handlers
///
/// Pending handlers keep the slot buffers alive until the GPU is done with
/// them, even if the pool object itself is gone.
struct PoolShared {
    id: u64,
    label: String,
    slot_size: usize,
    debug_accounting: bool,
    slots: Vec<Arc<dyn Buffer>>,
    state: Mutex<PoolState>,
    /// Signaled on every release
    slot_freed: Condvar,
    /// Signaled when the last outstanding slot is released
    idle: Condvar,
}

impl PoolShared {
    /// Panics happen before any mutation, so a poisoned state is still consistent
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn depth(&self) -> usize {
        self.slots.len()
    }

    fn check_owner(&self, handle: &SlotHandle) {
        if self.debug_accounting {
            assert!(
                handle.pool_id == self.id,
                "slot handle from pool #{} released to pool '{}' (#{})",
                handle.pool_id,
                self.label,
                self.id
            );
        }
    }

    /// Claim the next slot; caller guarantees `available > 0`
    fn take_slot(&self, state: &mut PoolState) -> usize {
        let depth = self.depth();
        let mut index = state.cursor;

        if state.outstanding[index] {
            // Out-of-order completion: the cursor slot is still on the GPU.
            engine_warn!(
                SOURCE,
                "'{}': slot {} is still in flight at the cursor (out-of-order completion)",
                self.label,
                index
            );
            // Fall forward to a free slot; one exists since available > 0.
            while state.outstanding[index] {
                index = (index + 1) % depth;
            }
        }

        state.outstanding[index] = true;
        state.available -= 1;
        state.cursor = (index + 1) % depth;
        state.stats.acquisitions += 1;
        index
    }

    fn release(&self, handle: SlotHandle) {
        self.check_owner(&handle);

        let now_idle = {
            let mut state = self.lock();
            let Some(outstanding) = state.outstanding.get_mut(handle.index) else {
                engine_error!(
                    SOURCE,
                    "'{}': slot {} out of range ({} slots), release ignored",
                    self.label,
                    handle.index,
                    self.depth()
                );
                return;
            };
            if self.debug_accounting {
                assert!(
                    *outstanding,
                    "slot {} of '{}' released while free",
                    handle.index,
                    self.label
                );
            }
            *outstanding = false;
            state.available = (state.available + 1).min(self.depth());
            state.stats.releases += 1;
            state.available == self.depth()
        };

        engine_trace!(SOURCE, "'{}': slot {} released", self.label, handle.index);
        self.slot_freed.notify_one();
        if now_idle {
            self.idle.notify_all();
        }
    }
}

/// Completion continuation: releases its slot when called, or when dropped
/// without being called (work never reached the GPU)
struct ReleaseOnCompletion {
    shared: Arc<PoolShared>,
    handle: Option<SlotHandle>,
}

impl ReleaseOnCompletion {
    fn run(mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.release(handle);
        }
    }
}

impl Drop for ReleaseOnCompletion {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            engine_debug!(
                SOURCE,
                "'{}': completion handler for slot {} dropped without running",
                self.shared.label,
                handle.index
            );
            self.shared.release(handle);
        }
    }
}

// ============================================================================
// FrameResourcePool
// ============================================================================

/// Fixed ring of uniform slots with at most `depth` acquisitions outstanding
///
/// Teardown contract: call `drain()` (after the backend finished or dropped
/// all submitted work) before dropping the pool.
pub struct FrameResourcePool {
    shared: Arc<PoolShared>,
}

impl FrameResourcePool {
    /// Create a pool of `depth` slots of `slot_size` bytes each
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if `slot_size` or `depth` is zero
    /// - `Error::AllocationFailed` if the device cannot provide a slot
    pub fn new(device: &dyn GraphicsDevice, slot_size: usize, depth: usize) -> Result<Self> {
        Self::with_config(
            device,
            slot_size,
            FramePoolConfig {
                depth,
                ..FramePoolConfig::default()
            },
        )
    }

    /// Create a pool from a full configuration
    pub fn with_config(
        device: &dyn GraphicsDevice,
        slot_size: usize,
        config: FramePoolConfig,
    ) -> Result<Self> {
        if slot_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame pool '{}': slot size must be greater than zero",
                config.label
            )));
        }
        if config.depth == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame pool '{}': depth must be greater than zero",
                config.label
            )));
        }

        let mut slots = Vec::with_capacity(config.depth);
        for index in 0..config.depth {
            let buffer = device
                .create_buffer(BufferDesc {
                    size: slot_size as u64,
                    usage: BufferUsage::Uniform,
                })
                .map_err(|e| {
                    engine_error!(SOURCE, "'{}': slot {} allocation failed: {}", config.label, index, e);
                    Error::AllocationFailed(format!("frame pool '{}' slot {}: {}", config.label, index, e))
                })?;

            if buffer.size() < slot_size as u64 || buffer.mapped_ptr().is_none() {
                engine_error!(
                    SOURCE,
                    "'{}': slot {} is not a mapped buffer of {} bytes",
                    config.label,
                    index,
                    slot_size
                );
                return Err(Error::AllocationFailed(format!(
                    "frame pool '{}' slot {}: backend returned {} bytes, mapped: {}",
                    config.label,
                    index,
                    buffer.size(),
                    buffer.mapped_ptr().is_some()
                )));
            }
            slots.push(buffer);
        }

        engine_debug!(
            SOURCE,
            "'{}' created: {} slots of {} bytes",
            config.label,
            config.depth,
            slot_size
        );

        let depth = config.depth;
        Ok(Self {
            shared: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                label: config.label,
                slot_size,
                debug_accounting: config.debug_accounting,
                slots,
                state: Mutex::new(PoolState {
                    available: depth,
                    cursor: 0,
                    outstanding: vec![false; depth],
                    stats: PoolStats::default(),
                }),
                slot_freed: Condvar::new(),
                idle: Condvar::new(),
            }),
        })
    }

    // ===== ACQUIRE =====

    /// Block until a slot is free, copy `payload` into it and return its handle
    ///
    /// # Panics
    ///
    /// If `payload` is larger than the slot size.
    pub fn acquire_and_fill(&self, payload: &[u8]) -> SlotHandle {
        self.check_payload(payload);

        let index = {
            let mut state = self.shared.lock();
            if state.available == 0 {
                state.stats.stalls += 1;
                engine_trace!(SOURCE, "'{}': all {} slots in flight, waiting", self.shared.label, self.depth());
            }
            while state.available == 0 {
                state = self
                    .shared
                    .slot_freed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            self.shared.take_slot(&mut state)
        };

        self.fill(index, payload)
    }

    /// Non-blocking variant: None if every slot is in flight
    pub fn try_acquire_and_fill(&self, payload: &[u8]) -> Option<SlotHandle> {
        self.check_payload(payload);

        let index = {
            let mut state = self.shared.lock();
            if state.available == 0 {
                return None;
            }
            self.shared.take_slot(&mut state)
        };

        Some(self.fill(index, payload))
    }

    /// Bounded variant of `acquire_and_fill`
    ///
    /// # Errors
    ///
    /// `Error::AcquireTimeout` if no slot was freed within `timeout`.
    pub fn acquire_and_fill_timeout(&self, payload: &[u8], timeout: Duration) -> Result<SlotHandle> {
        self.check_payload(payload);

        let start = Instant::now();
        let index = {
            let mut state = self.shared.lock();
            if state.available == 0 {
                state.stats.stalls += 1;
            }
            while state.available == 0 {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(Error::AcquireTimeout {
                        waited_ms: elapsed.as_millis() as u64,
                    });
                }
                let (guard, _) = self
                    .shared
                    .slot_freed
                    .wait_timeout(state, timeout - elapsed)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }
            self.shared.take_slot(&mut state)
        };

        Ok(self.fill(index, payload))
    }

    fn check_payload(&self, payload: &[u8]) {
        assert!(
            payload.len() <= self.shared.slot_size,
            "payload of {} bytes does not fit in a {}-byte slot of '{}'",
            payload.len(),
            self.shared.slot_size,
            self.shared.label
        );
    }

    /// Write into a slot this thread exclusively owns
    fn fill(&self, index: usize, payload: &[u8]) -> SlotHandle {
        let handle = SlotHandle {
            pool_id: self.shared.id,
            index,
        };
        if let Err(e) = self.shared.slots[index].update(0, payload) {
            // Hand the unit back before failing so the ring stays consistent
            self.shared.release(handle);
            panic!("write into slot {} of '{}' failed: {}", index, self.shared.label, e);
        }
        handle
    }

    // ===== RELEASE =====

    /// Return a slot once the consumer finished reading it
    ///
    /// # Panics
    ///
    /// With `debug_accounting`, if the handle belongs to another pool.
    pub fn release(&self, handle: SlotHandle) {
        self.shared.release(handle);
    }

    /// Wrap `handle` in a completion handler for `CommandBuffer::add_completed_handler`
    ///
    /// The handler releases the slot exactly once, either when the backend
    /// runs it or when the backend drops it without running it.
    pub fn release_on_completion(&self, handle: SlotHandle) -> CompletionHandler {
        self.shared.check_owner(&handle);
        let guard = ReleaseOnCompletion {
            shared: Arc::clone(&self.shared),
            handle: Some(handle),
        };
        Box::new(move || guard.run())
    }

    /// Block until every acquired slot has been released
    pub fn drain(&self) {
        let depth = self.depth();
        let mut state = self.shared.lock();
        while state.available < depth {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    // ===== INTROSPECTION =====

    /// Number of slots (maximum frames in flight)
    pub fn depth(&self) -> usize {
        self.shared.depth()
    }

    /// Size of one slot in bytes
    pub fn slot_size(&self) -> usize {
        self.shared.slot_size
    }

    /// Slots that can be acquired without blocking
    pub fn available(&self) -> usize {
        self.shared.lock().available
    }

    /// Acquisitions not yet released
    pub fn outstanding(&self) -> usize {
        self.depth() - self.available()
    }

    /// Index of the next slot to be handed out
    pub fn cursor(&self) -> usize {
        self.shared.lock().cursor
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Backend buffer behind an acquired slot
    pub fn slot(&self, handle: &SlotHandle) -> &Arc<dyn Buffer> {
        self.shared.check_owner(handle);
        &self.shared.slots[handle.index]
    }

    /// Read back `out.len()` bytes from the start of slot `index`
    ///
    /// # Errors
    ///
    /// `Error::InvalidResource` if `index` is out of range or the read does
    /// not fit in the slot.
    pub fn read_slot(&self, index: usize, out: &mut [u8]) -> Result<()> {
        let slot = self.shared.slots.get(index).ok_or_else(|| {
            Error::InvalidResource(format!(
                "slot {} out of range for '{}' ({} slots)",
                index,
                self.shared.label,
                self.depth()
            ))
        })?;
        slot.read(0, out)
    }
}

impl Drop for FrameResourcePool {
    fn drop(&mut self) {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            engine_error!(
                SOURCE,
                "'{}' dropped with {} slot(s) still in flight; drain() before dropping",
                self.shared.label,
                outstanding
            );
            if !std::thread::panicking() {
                debug_assert!(
                    outstanding == 0,
                    "frame pool '{}' dropped with {} slot(s) in flight",
                    self.shared.label,
                    outstanding
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "frame_resource_pool_tests.rs"]
mod tests;
