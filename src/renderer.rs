// =============================================================================
// RENDERER - frame loop over the backend objects
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for this frame slot's fence (its previous submission is done)
// 2. Acquire a swapchain image
// 3. Wait for whichever frame last rendered into that image
// 4. Re-record the slot's command buffer around the caller's closure
// 5. Submit, signaling the image's render_finished semaphore + the fence
// 6. Present and move to the next slot
//
// FRAME TIMELINE (2 frames in flight):
//
//   CPU  | record 0 | record 1 | wait F0, record 0 | wait F1, record 1 |
//   GPU             | render 0 | render 1          | render 0          |
//
// A slot's fence is only reset once its submit is certain to follow, so a
// skipped or failed frame never leaves the next wait blocked forever.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;

use crate::backend::pipeline::{create_framebuffers, destroy_framebuffers};
use crate::backend::sync::create_semaphore;
use crate::backend::{
    AcquireOutcome, Buffer, CommandPool, DepthBuffer, FrameCursor, FrameSync, GraphicsPipeline, ImageFences,
    Instance, RenderPass, Surface, Swapchain, VulkanDevice,
};
use crate::config::Config;

/// Renderer settings, usually taken from the config file
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    pub validation: bool,
    pub preferred_device: Option<String>,
    pub present_mode: vk::PresentModeKHR,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub depth_buffer: bool,
}

impl RendererSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_name: config.window.title.clone(),
            validation: config.debug.validation_layers,
            preferred_device: config.preferred_device().map(str::to_owned),
            present_mode: config.present_mode(),
            frames_in_flight: config.frames_in_flight(),
            clear_color: config.graphics.clear_color,
            depth_buffer: config.graphics.depth_buffer,
        }
    }
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// What `draw_frame` does before touching any frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Window is minimized, draw nothing
    Skip,
    /// Rebuild the swapchain first
    Recreate,
    Draw,
}

/// Resize, minimize and out-of-date bookkeeping for the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentState {
    window_size: (u32, u32),
    minimized: bool,
    needs_recreate: bool,
}

impl PresentState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window_size: (width, height),
            minimized: width == 0 || height == 0,
            needs_recreate: false,
        }
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate
    }

    /// A zero size pauses rendering, anything else schedules a rebuild
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
        if width == 0 || height == 0 {
            self.minimized = true;
        } else {
            self.minimized = false;
            self.needs_recreate = true;
        }
    }

    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    pub fn next_action(&self) -> FrameAction {
        if self.minimized {
            FrameAction::Skip
        } else if self.needs_recreate {
            FrameAction::Recreate
        } else {
            FrameAction::Draw
        }
    }

    /// Whether a rebuild can go ahead for this surface extent.
    ///
    /// A zero extent on either side pauses rendering until the next
    /// non-zero resize; the rebuild stays pending.
    pub fn begin_recreate(&mut self, surface_extent: vk::Extent2D) -> bool {
        let (width, height) = self.window_size;
        if is_zero_extent(surface_extent) || width == 0 || height == 0 {
            self.minimized = true;
            return false;
        }
        true
    }

    pub fn recreated(&mut self) {
        self.needs_recreate = false;
    }

    /// Image to render into, or `None` when the frame must be dropped
    /// before its fence is reset
    pub fn on_acquire(&mut self, outcome: AcquireOutcome) -> Option<u32> {
        match outcome {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                Some(index)
            }
            AcquireOutcome::OutOfDate => {
                self.needs_recreate = true;
                None
            }
        }
    }

    pub fn on_present(&mut self, stale: bool) {
        if stale {
            self.needs_recreate = true;
        }
    }

    /// A frame failed after acquire; its sync objects are replaced and the
    /// swapchain is rebuilt before the next draw
    pub fn frame_abandoned(&mut self) {
        self.needs_recreate = true;
    }
}

/// Full-target viewport with the usual 0..1 depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub struct Renderer {
    settings: RendererSettings,
    state: PresentState,
    frame_count: u64,

    cursor: FrameCursor,
    frame_sync: Vec<FrameSync>,
    render_finished: Vec<vk::Semaphore>,
    image_fences: ImageFences,
    command_buffers: Vec<vk::CommandBuffer>,

    // Field order is drop order for everything below
    command_pool: CommandPool,
    framebuffers: Vec<vk::Framebuffer>,
    depth_buffer: Option<DepthBuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
    surface: Arc<Surface>,
    instance: Arc<Instance>,
}

impl Renderer {
    /// Set up Vulkan for `window`, whose drawable size is `width` x `height`
    pub fn new<W>(window: &W, width: u32, height: u32, settings: RendererSettings) -> Result<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let instance = Instance::new(&settings.app_name, settings.validation, window.raw_display_handle())?;
        let surface = Surface::new(instance.clone(), window)?;
        let device = VulkanDevice::new(instance.clone(), &surface, settings.preferred_device.as_deref())?;

        let swapchain = Swapchain::new(
            device.clone(),
            surface.clone(),
            width,
            height,
            settings.present_mode,
            None,
        )?;

        let depth_buffer = if settings.depth_buffer {
            Some(DepthBuffer::new(device.clone(), swapchain.extent)?)
        } else {
            None
        };

        let render_pass = RenderPass::new(
            device.clone(),
            swapchain.format,
            depth_buffer.as_ref().map(|depth| depth.format),
        )?;

        let framebuffers = create_framebuffers(
            &device,
            &render_pass,
            &swapchain.image_views,
            depth_buffer.as_ref().map(|depth| depth.view),
            swapchain.extent,
        )?;

        let command_pool = CommandPool::new(device.clone())?;

        let mut renderer = Self {
            state: PresentState::new(width, height),
            frame_count: 0,
            cursor: FrameCursor::new(settings.frames_in_flight),
            frame_sync: Vec::new(),
            render_finished: Vec::new(),
            image_fences: ImageFences::new(swapchain.image_count()),
            command_buffers: Vec::new(),
            command_pool,
            framebuffers,
            depth_buffer,
            render_pass,
            swapchain,
            device,
            surface,
            instance,
            settings,
        };

        // From here on Drop cleans up whatever was created
        let frames = renderer.cursor.frames_in_flight();
        for _ in 0..frames {
            let sync = FrameSync::new(&renderer.device)?;
            renderer.frame_sync.push(sync);
        }
        renderer.command_buffers = renderer.command_pool.allocate(frames as u32)?;
        renderer.create_render_finished()?;

        log::info!(
            "Renderer ready on {} ({} frames in flight, depth {})",
            renderer.device.name(),
            frames,
            if renderer.depth_buffer.is_some() { "on" } else { "off" }
        );

        Ok(renderer)
    }

    fn create_render_finished(&mut self) -> Result<()> {
        for semaphore in self.render_finished.drain(..) {
            unsafe { self.device.device.destroy_semaphore(semaphore, None) };
        }
        for _ in 0..self.swapchain.image_count() {
            let semaphore = create_semaphore(&self.device)?;
            self.render_finished.push(semaphore);
        }
        Ok(())
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    pub fn frames_in_flight(&self) -> usize {
        self.cursor.frames_in_flight()
    }

    /// Frames submitted so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_minimized(&self) -> bool {
        self.state.is_minimized()
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.settings.clear_color = color;
    }

    /// Record a window size change; a zero size pauses rendering
    pub fn resize(&mut self, width: u32, height: u32) {
        self.state.resize(width, height);
    }

    /// Force a swapchain rebuild before the next frame
    pub fn request_recreate(&mut self) {
        self.state.request_recreate();
    }

    /// Render one frame, calling `record` inside the render pass.
    ///
    /// Returns `false` when no frame was presented (minimized window or an
    /// out-of-date swapchain that will be rebuilt next time).
    pub fn draw_frame<F>(&mut self, record: F) -> Result<bool>
    where
        F: FnOnce(&mut FrameContext) -> Result<()>,
    {
        match self.state.next_action() {
            FrameAction::Skip => return Ok(false),
            FrameAction::Recreate => {
                self.recreate_swapchain()?;
                if self.state.next_action() != FrameAction::Draw {
                    return Ok(false);
                }
            }
            FrameAction::Draw => {}
        }

        let frame = self.cursor.current();
        let fence = self.frame_sync[frame].in_flight_fence;
        let image_available = self.frame_sync[frame].image_available;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for the last submission from this slot
        // ─────────────────────────────────────────────────────────────────────
        unsafe { self.device.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("Failed to wait for frame fence")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire a swapchain image
        // ─────────────────────────────────────────────────────────────────────
        // Out of date: bail before resetting the fence so the next wait returns
        let outcome = self.swapchain.acquire_next_image(u64::MAX, image_available)?;
        let Some(image_index) = self.state.on_acquire(outcome) else {
            log::debug!("Swapchain out of date on acquire");
            return Ok(false);
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Wait for the frame that last rendered into this image
        // ─────────────────────────────────────────────────────────────────────
        if let Some(previous) = self.image_fences.claim(image_index as usize, fence) {
            unsafe { self.device.device.wait_for_fences(&[previous], true, u64::MAX) }
                .context("Failed to wait for image fence")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Record
        // ─────────────────────────────────────────────────────────────────────
        let cmd = self.command_buffers[frame];

        // The acquire semaphore must be consumed even if the caller fails,
        // so a failed recording is replaced by a clear-only pass
        let recorded = self.record_commands(cmd, frame, image_index, record);
        if let Err(e) = &recorded {
            log::error!("Frame recording failed: {:?}", e);
            if let Err(e) = self.record_commands(cmd, frame, image_index, |_| Ok(())) {
                self.abandon_frame(frame);
                return Err(e.context("Failed to record clear-only frame"));
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Submit
        // ─────────────────────────────────────────────────────────────────────
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished[image_index as usize]];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { self.device.device.reset_fences(&[fence]) }.context("Failed to reset frame fence")?;

        let submitted = unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], fence)
        };
        if let Err(e) = submitted {
            // Fence is unsignaled and the acquire semaphore still pending
            self.abandon_frame(frame);
            return Err(e).context("Failed to submit frame");
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Present and advance to the next slot
        // ─────────────────────────────────────────────────────────────────────
        let stale = self
            .swapchain
            .present(self.device.present_queue, image_index, &signal_semaphores)?;
        self.state.on_present(stale);

        self.cursor.advance();
        self.frame_count += 1;

        recorded.map(|_| true)
    }

    /// Give a frame slot fresh sync objects after a failure between acquire
    /// and submit, and schedule a swapchain rebuild
    fn abandon_frame(&mut self, frame: usize) {
        self.state.frame_abandoned();

        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to idle device for frame recovery: {:?}", e);
        }
        if let Err(e) = self.frame_sync[frame].renew(&self.device) {
            log::error!("Failed to renew sync objects for frame {}: {:?}", frame, e);
        }
    }

    fn record_commands<F>(&self, cmd: vk::CommandBuffer, frame: usize, image_index: u32, record: F) -> Result<()>
    where
        F: FnOnce(&mut FrameContext) -> Result<()>,
    {
        let device = &self.device.device;
        let extent = self.swapchain.extent;
        let clear_values = self.render_pass.clear_values(self.settings.clear_color);

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::builder())
                .context("Failed to begin command buffer")?;
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
            device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );
        }

        let mut ctx = FrameContext {
            device: &self.device.device,
            cmd,
            frame_index: frame,
            image_index,
            extent,
            bound_layout: None,
        };
        let recorded = record(&mut ctx);

        unsafe {
            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd).context("Failed to end command buffer")?;
        }

        recorded
    }

    /// Rebuild the swapchain and everything sized by it
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let capabilities = self
            .surface
            .query_support(self.device.physical_device)?
            .capabilities;

        if !self.state.begin_recreate(capabilities.current_extent) {
            log::debug!("Surface has zero size, pausing rendering");
            return Ok(());
        }
        let (width, height) = self.state.window_size();

        self.device.wait_idle()?;

        let framebuffers = std::mem::take(&mut self.framebuffers);
        destroy_framebuffers(&self.device, &framebuffers);
        self.depth_buffer = None;

        let swapchain = Swapchain::new(
            self.device.clone(),
            self.surface.clone(),
            width,
            height,
            self.settings.present_mode,
            Some(&self.swapchain),
        )?;

        if swapchain.format != self.render_pass.color_format {
            anyhow::bail!(
                "Swapchain format changed from {:?} to {:?}",
                self.render_pass.color_format,
                swapchain.format
            );
        }

        // Old swapchain is destroyed here, after the new one took over
        self.swapchain = swapchain;

        if self.render_pass.has_depth() {
            self.depth_buffer = Some(DepthBuffer::new(self.device.clone(), self.swapchain.extent)?);
        }

        self.framebuffers = create_framebuffers(
            &self.device,
            &self.render_pass,
            &self.swapchain.image_views,
            self.depth_buffer.as_ref().map(|depth| depth.view),
            self.swapchain.extent,
        )?;

        self.create_render_finished()?;
        self.image_fences.reset(self.swapchain.image_count());
        self.state.recreated();

        log::info!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );

        Ok(())
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");

        let _ = self.device.wait_idle();

        let device = &self.device.device;
        for sync in &self.frame_sync {
            sync.destroy(device);
        }
        unsafe {
            for &semaphore in &self.render_finished {
                device.destroy_semaphore(semaphore, None);
            }
        }
        destroy_framebuffers(&self.device, &self.framebuffers);

        // The rest is released by field drops: command pool, depth buffer,
        // render pass, swapchain, then the device/surface/instance handles
    }
}

// =============================================================================
// RECORDING
// =============================================================================

/// Recording state handed to the draw closure for one frame
pub struct FrameContext<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    frame_index: usize,
    image_index: u32,
    extent: vk::Extent2D,
    bound_layout: Option<vk::PipelineLayout>,
}

impl<'a> FrameContext<'a> {
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    /// Frame slot in `0..frames_in_flight`, for per-frame resources
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
        }
        self.bound_layout = Some(pipeline.layout);
    }

    pub fn bind_vertex_buffer(&mut self, buffer: &Buffer) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.cmd, 0, &[buffer.buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&mut self, buffer: &Buffer, index_type: vk::IndexType) {
        unsafe {
            self.device.cmd_bind_index_buffer(self.cmd, buffer.buffer, 0, index_type);
        }
    }

    /// Bind sets starting at set 0 on the bound pipeline's layout
    pub fn bind_descriptor_sets(&mut self, sets: &[vk::DescriptorSet]) -> Result<()> {
        let layout = self.bound_layout.context("No pipeline bound")?;
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
        Ok(())
    }

    pub fn push_constants<T: Pod>(&mut self, stages: vk::ShaderStageFlags, value: &T) -> Result<()> {
        let layout = self.bound_layout.context("No pipeline bound")?;
        unsafe {
            self.device
                .cmd_push_constants(self.cmd, layout, stages, 0, bytemuck::bytes_of(value));
        }
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32) {
        unsafe {
            self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0);
        }
    }

    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device.cmd_draw_indexed(self.cmd, index_count, 1, 0, 0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 9;
        config.graphics.present_mode = "mailbox".into();
        config.graphics.preferred_device = Some("  ".into());

        let settings = RendererSettings::from_config(&config);
        assert_eq!(settings.frames_in_flight, 4);
        assert_eq!(settings.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(settings.preferred_device, None);
        assert_eq!(settings.app_name, config.window.title);
    }

    #[test]
    fn zero_extents() {
        assert!(is_zero_extent(vk::Extent2D { width: 0, height: 600 }));
        assert!(is_zero_extent(vk::Extent2D { width: 800, height: 0 }));
        assert!(!is_zero_extent(vk::Extent2D { width: 800, height: 600 }));
    }

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    #[test]
    fn zero_window_size_pauses_rendering() {
        let mut state = PresentState::new(800, 600);
        assert_eq!(state.next_action(), FrameAction::Draw);

        state.resize(0, 600);
        assert!(state.is_minimized());
        assert_eq!(state.next_action(), FrameAction::Skip);
    }

    #[test]
    fn restored_window_schedules_rebuild() {
        let mut state = PresentState::new(800, 600);
        state.resize(0, 0);
        state.resize(1024, 768);

        assert!(!state.is_minimized());
        assert_eq!(state.window_size(), (1024, 768));
        assert_eq!(state.next_action(), FrameAction::Recreate);

        assert!(state.begin_recreate(vk::Extent2D { width: 1024, height: 768 }));
        state.recreated();
        assert_eq!(state.next_action(), FrameAction::Draw);
    }

    #[test]
    fn zero_surface_extent_defers_rebuild() {
        let mut state = PresentState::new(800, 600);
        state.request_recreate();

        assert!(!state.begin_recreate(vk::Extent2D { width: 0, height: 0 }));
        assert!(state.is_minimized());
        assert!(state.needs_recreate());
        assert_eq!(state.next_action(), FrameAction::Skip);

        // The next non-zero resize resumes with the rebuild still pending
        state.resize(800, 600);
        assert_eq!(state.next_action(), FrameAction::Recreate);
        assert!(state.begin_recreate(EXTENT));
    }

    #[test]
    fn out_of_date_acquire_drops_frame() {
        let mut state = PresentState::new(800, 600);

        assert_eq!(state.on_acquire(AcquireOutcome::OutOfDate), None);
        assert!(state.needs_recreate());
        assert_eq!(state.next_action(), FrameAction::Recreate);
    }

    #[test]
    fn suboptimal_acquire_still_draws() {
        let mut state = PresentState::new(800, 600);

        let outcome = AcquireOutcome::Acquired {
            index: 2,
            suboptimal: true,
        };
        assert_eq!(state.on_acquire(outcome), Some(2));
        assert!(state.needs_recreate());

        let mut fresh = PresentState::new(800, 600);
        let outcome = AcquireOutcome::Acquired {
            index: 0,
            suboptimal: false,
        };
        assert_eq!(fresh.on_acquire(outcome), Some(0));
        assert!(!fresh.needs_recreate());
    }

    #[test]
    fn stale_present_schedules_rebuild() {
        let mut state = PresentState::new(800, 600);
        state.on_present(false);
        assert_eq!(state.next_action(), FrameAction::Draw);
        state.on_present(true);
        assert_eq!(state.next_action(), FrameAction::Recreate);
    }

    #[test]
    fn abandoned_frame_forces_rebuild() {
        let mut state = PresentState::new(800, 600);
        state.frame_abandoned();
        assert_eq!(state.next_action(), FrameAction::Recreate);
        assert!(!state.is_minimized());
    }

    #[test]
    fn viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
