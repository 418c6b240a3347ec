//! Unit tests for renderable.rs
//!
//! Drives submit_frame against the mock backend and checks the recorded
//! command stream, the uniform slot contents and slot accounting on every
//! failure path.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::{Mat4, Vec3};

use super::*;
use crate::graphics_device::mock_graphics_device::*;
use crate::scene::{triangle, ColoredVertex};

struct Fixture {
    device: MockGraphicsDevice,
    queue: MockCommandQueue,
    surface: MockSurface,
    pipeline: Arc<dyn Pipeline>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            device: MockGraphicsDevice::new(),
            queue: MockCommandQueue::new(),
            surface: MockSurface::new(),
            pipeline: Arc::new(MockPipeline::new("basic".to_string())),
        }
    }

    fn ctx(&self) -> DrawContext<'_> {
        DrawContext {
            queue: &self.queue,
            surface: &self.surface,
            pipeline: &self.pipeline,
            clear_color: None,
        }
    }

    fn triangle(&self, depth: usize) -> Renderable {
        Renderable::new(
            &self.device,
            "triangle",
            &triangle(),
            None,
            FramePoolConfig {
                depth,
                debug_accounting: true,
                label: "triangle".to_string(),
            },
        )
        .unwrap()
    }
}

// ============================================================================
// CONSTRUCTION TESTS
// ============================================================================

#[test]
fn test_new_uploads_vertices() {
    let fx = Fixture::new();
    let renderable = fx.triangle(3);

    assert_eq!(renderable.name(), "triangle");
    assert_eq!(renderable.vertex_count(), 3);
    assert_eq!(renderable.time(), 0.0);
    assert_eq!(renderable.pool().depth(), 3);
    assert_eq!(renderable.pool().slot_size(), 128);

    let tri = triangle();
    let expected: &[u8] = bytemuck::cast_slice(&tri);
    let mut uploaded = vec![0u8; expected.len()];
    renderable.vertex_buffer().read(0, &mut uploaded).unwrap();
    assert_eq!(uploaded, expected);
}

#[test]
fn test_new_rejects_empty_mesh() {
    let fx = Fixture::new();
    let empty: [ColoredVertex; 0] = [];

    let result = Renderable::new(&fx.device, "empty", &empty, None, FramePoolConfig::default());

    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert_eq!(fx.device.created_buffers(), 0);
}

#[test]
fn test_new_propagates_pool_allocation_failure() {
    let fx = Fixture::new();
    // Allocation 0 is the vertex buffer, 1 is the first slot
    fx.device.fail_allocation_at(1);

    let result = Renderable::new(&fx.device, "tri", &triangle(), None, FramePoolConfig::default());

    assert!(matches!(result, Err(Error::AllocationFailed(_))));
    assert_eq!(fx.device.live_buffers(), 0);
}

#[test]
fn test_uniforms_layout() {
    assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);

    let mv = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let uniforms = FrameUniforms::new(&mv, &Mat4::IDENTITY);
    // Column-major: translation sits in the last column
    assert_eq!(uniforms.model_view[3], [1.0, 2.0, 3.0, 1.0]);
    assert_eq!(uniforms.projection, Mat4::IDENTITY.to_cols_array_2d());
}

#[test]
fn test_update_with_delta_accumulates() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(1);

    renderable.update_with_delta(0.016);
    renderable.update_with_delta(0.034);

    assert!((renderable.time() - 0.05).abs() < 1e-12);
}

#[test]
fn test_default_sampler() {
    let fx = Fixture::new();
    let renderable = fx.triangle(1);
    assert_eq!(*renderable.sampler(), SamplerDesc::default());
}

// ============================================================================
// SUBMIT FRAME TESTS
// ============================================================================

#[test]
fn test_submit_frame_command_sequence() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);

    renderable
        .submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY)
        .unwrap();

    let submissions = fx.queue.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        submissions[0],
        vec![
            "begin_render_pass drawable=0",
            "set_pipeline basic",
            "set_vertex_buffer buffer=0 offset=0 index=0",
            "set_cull_mode Front",
            "set_fragment_texture none index=0",
            "set_fragment_sampler index=0",
            "set_uniform_buffer buffer=1 offset=0 index=1",
            "draw Triangle start=0 count=3 instances=1",
            "end_encoding",
            "add_completed_handler",
            "present drawable=0",
        ]
    );

    fx.queue.complete_all();
    renderable.drain();
}

#[test]
fn test_submit_frame_binds_texture() {
    let fx = Fixture::new();
    let texture: Arc<dyn Texture> = Arc::new(MockTexture::new(64, 64, "checker".to_string()));
    let mut renderable = Renderable::new(
        &fx.device,
        "textured",
        &triangle(),
        Some(texture),
        FramePoolConfig::default(),
    )
    .unwrap();

    renderable
        .submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY)
        .unwrap();

    assert!(fx.queue.submissions()[0].contains(&"set_fragment_texture checker index=0".to_string()));
    fx.queue.complete_all();
}

#[test]
fn test_submit_frame_clear_color() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(2);
    let red = ClearColor::new(1.0, 0.0, 0.0, 1.0);

    renderable
        .submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY)
        .unwrap();
    let ctx = DrawContext {
        clear_color: Some(red),
        ..fx.ctx()
    };
    renderable.submit_frame(&ctx, &Mat4::IDENTITY, &Mat4::IDENTITY).unwrap();

    assert_eq!(
        fx.queue.load_actions(),
        vec![LoadAction::Clear(DEFAULT_CLEAR_COLOR), LoadAction::Clear(red)]
    );
    fx.queue.complete_all();
}

#[test]
fn test_submit_frame_writes_uniforms() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);
    renderable.transform_mut().position = Vec3::new(0.5, 0.0, 0.0);
    renderable.transform_mut().scale = 2.0;

    let parent = Mat4::from_translation(Vec3::new(0.0, 0.0, -7.0));
    let projection = Mat4::perspective_rh(1.2, 1.5, 0.01, 100.0);
    renderable.submit_frame(&fx.ctx(), &parent, &projection).unwrap();

    let expected = FrameUniforms::new(&(parent * renderable.model_matrix()), &projection);
    let mut written = [0u8; 128];
    renderable.pool().read_slot(0, &mut written).unwrap();
    assert_eq!(&written[..], bytemuck::bytes_of(&expected));

    fx.queue.complete_all();
}

#[test]
fn test_parent_applied_after_local_transform() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(1);
    renderable.transform_mut().position = Vec3::new(1.0, 0.0, 0.0);

    let parent = Mat4::from_scale(Vec3::splat(3.0));
    renderable.submit_frame(&fx.ctx(), &parent, &Mat4::IDENTITY).unwrap();

    let mut written = [0u8; 128];
    renderable.pool().read_slot(0, &mut written).unwrap();
    let uniforms: FrameUniforms = bytemuck::pod_read_unaligned(&written);
    let model_view = Mat4::from_cols_array_2d(&uniforms.model_view);

    // Local translation happens first, then the parent scales it
    let origin = model_view.transform_point3(Vec3::ZERO);
    assert!((origin - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-5);

    fx.queue.complete_all();
}

#[test]
fn test_slot_released_on_gpu_completion() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);

    for _ in 0..3 {
        renderable
            .submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY)
            .unwrap();
    }
    assert_eq!(renderable.pool().outstanding(), 3);

    fx.queue.complete_next();
    assert_eq!(renderable.pool().outstanding(), 2);

    fx.queue.complete_all();
    assert_eq!(renderable.pool().outstanding(), 0);
}

#[test]
fn test_submit_frame_throttles_at_depth() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);
    let ctx = fx.ctx();

    for _ in 0..3 {
        renderable.submit_frame(&ctx, &Mat4::IDENTITY, &Mat4::IDENTITY).unwrap();
    }

    thread::scope(|scope| {
        let producer = scope.spawn(|| {
            renderable.submit_frame(&ctx, &Mat4::IDENTITY, &Mat4::IDENTITY)
        });

        // The fourth frame cannot be recorded while three are in flight
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fx.queue.submissions().len(), 3);
        assert!(!producer.is_finished());

        fx.queue.complete_next();
        producer.join().unwrap().unwrap();
    });

    assert_eq!(fx.queue.submissions().len(), 4);
    assert_eq!(fx.queue.in_flight(), 3);
    assert_eq!(renderable.pool().stats().stalls, 1);

    fx.queue.complete_all();
    renderable.drain();
}

// ============================================================================
// FAILURE PATH TESTS
// ============================================================================

#[test]
fn test_no_drawable_releases_slot() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);
    fx.surface.set_available(false);

    let result = renderable.submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY);

    assert!(matches!(result, Err(Error::DrawFailure(DrawFailure::NoDrawable))));
    assert_eq!(renderable.pool().outstanding(), 0);
    assert!(fx.queue.submissions().is_empty());
}

#[test]
fn test_no_command_buffer_releases_slot() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);
    fx.queue.fail_command_buffer.store(true, Ordering::SeqCst);

    let result = renderable.submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY);

    assert!(matches!(result, Err(Error::DrawFailure(DrawFailure::NoCommandBuffer))));
    assert_eq!(renderable.pool().outstanding(), 0);
}

#[test]
fn test_no_render_encoder_releases_slot() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);
    fx.queue.fail_encoder.store(true, Ordering::SeqCst);

    let result = renderable.submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY);

    assert!(matches!(result, Err(Error::DrawFailure(DrawFailure::NoRenderEncoder))));
    assert_eq!(renderable.pool().outstanding(), 0);
}

#[test]
fn test_failed_commit_releases_slot() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(3);
    fx.queue.fail_commit.store(true, Ordering::SeqCst);

    let result = renderable.submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY);

    assert!(matches!(result, Err(Error::BackendError(_))));
    assert_eq!(renderable.pool().outstanding(), 0);
    assert_eq!(fx.queue.in_flight(), 0);
}

#[test]
fn test_repeated_failures_never_exhaust_pool() {
    let fx = Fixture::new();
    let mut renderable = fx.triangle(1);
    fx.surface.set_available(false);

    // With a leaked slot the second call would block forever
    for _ in 0..5 {
        assert!(renderable
            .submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY)
            .is_err());
    }

    fx.surface.set_available(true);
    renderable
        .submit_frame(&fx.ctx(), &Mat4::IDENTITY, &Mat4::IDENTITY)
        .unwrap();
    fx.queue.complete_all();
    assert_eq!(renderable.pool().stats().releases, 6);
}
