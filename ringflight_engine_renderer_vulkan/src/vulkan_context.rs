/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Every resource (buffer, drawable, queue, sampler cache) holds an
/// `Arc<GpuContext>`, so the device outlives whatever was created from it.
/// The last owner to go away tears down allocator, device and instance in
/// that order.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared GPU context for all Vulkan resources.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue; vkQueueSubmit requires external synchronization
    graphics_queue: Mutex<vk::Queue>,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// VK_KHR_push_descriptor entry points
    pub push_descriptor: ash::khr::push_descriptor::Device,

    instance: ash::Instance,

    /// Kept alive so the loaded library outlives the instance
    _entry: ash::Entry,

    /// Debug utils loader and messenger (validation only)
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl GpuContext {
    pub(crate) fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) -> Self {
        let push_descriptor = ash::khr::push_descriptor::Device::new(&instance, &device);
        Self {
            device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue: Mutex::new(graphics_queue),
            graphics_queue_family,
            push_descriptor,
            instance,
            _entry: entry,
            debug_messenger,
        }
    }

    /// Lock the allocator, recovering from a poisoned lock
    pub(crate) fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the graphics queue for submission
    pub(crate) fn queue(&self) -> MutexGuard<'_, vk::Queue> {
        self.graphics_queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // Allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}
