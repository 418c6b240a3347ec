/// Surface and drawable traits - where frames are rendered to

use std::any::Any;
use std::sync::Arc;

/// A presentable render target handed out for one frame
pub trait Drawable: Send + Sync {
    /// Width in pixels
    fn width(&self) -> u32;

    /// Height in pixels
    fn height(&self) -> u32;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

/// Source of drawables (window swapchain, offscreen ring, ...)
pub trait Surface: Send + Sync {
    /// Next drawable to render into
    ///
    /// Returns None when no drawable is available this frame; the caller
    /// skips the frame.
    fn next_drawable(&self) -> Option<Arc<dyn Drawable>>;
}
