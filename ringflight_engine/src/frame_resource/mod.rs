//! Frame resource module
//!
//! Ring of per-frame uniform slots with bounded in-flight synchronization.

mod frame_resource_pool;

pub use frame_resource_pool::{FramePoolConfig, FrameResourcePool, PoolStats, SlotHandle};
