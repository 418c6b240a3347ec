/// VulkanGraphicsDevice - Vulkan implementation of GraphicsDevice
///
/// Headless: no window or presentation engine is involved. Frames render
/// into a `VulkanOffscreenSurface` and complete through a
/// `VulkanCommandQueue`.

use ringflight_engine::ringflight::render::{Buffer, BufferDesc, BufferUsage, Config};
use ringflight_engine::ringflight::{Error, GraphicsDevice, Result};
use ringflight_engine::{engine_bail, engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use std::ffi::CString;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_queue::VulkanCommandQueue;
use crate::vulkan_context::GpuContext;
use crate::vulkan_offscreen_surface::VulkanOffscreenSurface;
use crate::vulkan_sampler::SamplerCache;

const SOURCE: &str = "ringflight::vulkan";

/// Binding that holds the fragment combined image sampler in set 0
pub const TEXTURE_BINDING: u32 = 0;
/// Binding that holds the vertex-stage uniform buffer in set 0
pub const UNIFORM_BINDING: u32 = 1;

/// Vulkan device implementation
pub struct VulkanGraphicsDevice {
    ctx: Arc<GpuContext>,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    /// Push-descriptor layout for set 0 of every pipeline
    descriptor_set_layout: vk::DescriptorSetLayout,
    sampler_cache: Arc<Mutex<SamplerCache>>,
}

impl VulkanGraphicsDevice {
    /// Create a headless Vulkan 1.3 device with VK_KHR_push_descriptor
    ///
    /// # Errors
    ///
    /// `Error::InitializationFailed` if no suitable GPU or driver is found.
    pub fn new(config: Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = CString::new(config.app_name.clone())
                .map_err(|_| Error::InvalidConfig("application name contains a NUL byte".to_string()))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"RingFlight")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let validation = validation_enabled(&config);
            let mut extension_names = Vec::new();
            let mut layer_names = Vec::new();
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            let debug_messenger = if validation {
                Some(create_debug_messenger(&entry, &instance)?)
            } else {
                None
            };

            let (physical_device, graphics_family_index) = pick_physical_device(&instance)?;
            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());
            let anisotropy_supported =
                instance.get_physical_device_features(physical_device).sampler_anisotropy == vk::TRUE;

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::push_descriptor::NAME.as_ptr()];
            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(anisotropy_supported);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                device,
                allocator,
                graphics_queue,
                graphics_family_index,
                debug_messenger,
            ));

            let descriptor_set_layout = create_descriptor_set_layout(&ctx.device)?;
            let sampler_cache = Arc::new(Mutex::new(SamplerCache::new(ctx.clone(), anisotropy_supported)));

            engine_info!(SOURCE, "Vulkan device ready: {}", device_name);

            Ok(Self {
                ctx,
                physical_device,
                device_name,
                descriptor_set_layout,
                sampler_cache,
            })
        }
    }

    /// A new in-order submission queue with its own completion thread
    pub fn command_queue(&self) -> Result<VulkanCommandQueue> {
        VulkanCommandQueue::new(self.ctx.clone(), self.sampler_cache.clone())
    }

    /// A ring of `image_count` offscreen drawables
    pub fn create_offscreen_surface(
        &self,
        width: u32,
        height: u32,
        image_count: usize,
    ) -> Result<VulkanOffscreenSurface> {
        VulkanOffscreenSurface::new(self.ctx.clone(), width, height, image_count)
    }

    /// Set 0 layout pipelines must use (push descriptors)
    ///
    /// Binding `TEXTURE_BINDING` is a fragment combined image sampler,
    /// binding `UNIFORM_BINDING` a vertex uniform buffer.
    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.descriptor_set_layout
    }

    /// Logical device, for building pipelines outside the engine
    pub fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Distinct sampler descriptions seen so far
    pub fn cached_sampler_count(&self) -> usize {
        self.sampler_cache
            .lock()
            .map(|cache| cache.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("buffer size must be non-zero".to_string()));
        }

        unsafe {
            let device = &self.ctx.device;
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = device
                .create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocation = self.ctx.allocator().allocate(&AllocationCreateDesc {
                name: buffer_name(desc.usage),
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    let size_kb = requirements.size as f64 / 1024.0;
                    engine_error!(SOURCE, "Out of GPU memory for buffer (required: {:.2} KB): {}", size_kb, e);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.ctx.allocator().free(allocation).ok();
                device.destroy_buffer(buffer, None);
                engine_bail!(SOURCE, "Failed to bind buffer memory: {:?}", e);
            }

            Ok(Arc::new(VulkanBuffer::new(
                self.ctx.clone(),
                buffer,
                allocation,
                desc.size,
                desc.usage,
            )))
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "Failed to wait for device idle: {:?}", e))
        }
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
            self.ctx
                .device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
        // Device, allocator and instance go with the last Arc<GpuContext>
    }
}

fn validation_enabled(config: &Config) -> bool {
    if config.enable_validation && !cfg!(feature = "vulkan-validation") {
        engine_warn!(SOURCE, "validation requested but the vulkan-validation feature is disabled");
    }
    config.enable_validation && cfg!(feature = "vulkan-validation")
}

#[cfg(feature = "vulkan-validation")]
unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
    let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(crate::vulkan_debug::severity_flags())
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));

    let messenger = debug_utils
        .create_debug_utils_messenger(&debug_info, None)
        .map_err(|e| {
            engine_error!(SOURCE, "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;
    Ok((debug_utils, messenger))
}

#[cfg(not(feature = "vulkan-validation"))]
unsafe fn create_debug_messenger(
    _entry: &ash::Entry,
    _instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    Err(Error::InitializationFailed("vulkan-validation feature is disabled".to_string()))
}

/// First GPU with a graphics queue and push descriptors, discrete GPUs first
unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
    let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
        engine_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
        Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
    })?;

    let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = physical_devices
        .into_iter()
        .filter_map(|physical_device| {
            let graphics_family = instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
                as u32;

            let extensions = instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default();
            let push_descriptor = extensions
                .iter()
                .any(|ext| {
                    ext.extension_name_as_c_str()
                        .is_ok_and(|name| name == ash::khr::push_descriptor::NAME)
                });
            let properties = instance.get_physical_device_properties(physical_device);
            if !push_descriptor || properties.api_version < vk::API_VERSION_1_3 {
                return None;
            }

            let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
            Some((physical_device, graphics_family, discrete))
        })
        .collect();

    candidates.sort_by_key(|&(_, _, discrete)| !discrete);
    candidates
        .first()
        .map(|&(physical_device, family, _)| (physical_device, family))
        .ok_or_else(|| {
            engine_error!(SOURCE, "No Vulkan 1.3 GPU with VK_KHR_push_descriptor found");
            Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
        })
}

unsafe fn create_descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding::default()
            .binding(TEXTURE_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT),
        vk::DescriptorSetLayoutBinding::default()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX),
    ];
    let create_info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR)
        .bindings(&bindings);

    device
        .create_descriptor_set_layout(&create_info, None)
        .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor set layout: {:?}", e))
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
    }
}

fn buffer_name(usage: BufferUsage) -> &'static str {
    match usage {
        BufferUsage::Vertex => "vertex_buffer",
        BufferUsage::Uniform => "uniform_slot",
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
