/// VulkanTexture - wraps an externally loaded, shader-readable image view

use ringflight_engine::ringflight::render::Texture;
use ash::vk;
use std::any::Any;

/// Not owned: the view must stay valid (in SHADER_READ_ONLY_OPTIMAL layout)
/// until every frame sampling it has completed.
pub struct VulkanTexture {
    pub(crate) view: vk::ImageView,
    width: u32,
    height: u32,
}

impl VulkanTexture {
    pub fn from_raw(view: vk::ImageView, width: u32, height: u32) -> Self {
        Self { view, width, height }
    }
}

impl Texture for VulkanTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
