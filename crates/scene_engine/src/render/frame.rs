//! Viewport state and resize decisions

use ash::vk;

/// What a window-size event should do to the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    /// Zero-area window; keep everything as is
    Minimized,
    /// Same size as now
    Unchanged,
    /// Recreate the back buffers at this size
    Resize {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
}

/// Whether a frame can be recorded against the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    /// A back buffer is acquired; record and present
    Ready,
    /// Nothing acquired yet; rebuild the swapchain and look again
    Recreate,
    /// Still nothing acquired after a rebuild; skip this frame
    Skip,
}

impl AcquireState {
    /// Decide from the swapchain's acquired flag and whether this frame
    /// already rebuilt it
    #[must_use]
    pub const fn decide(acquired: bool, recreated: bool) -> Self {
        match (acquired, recreated) {
            (true, _) => Self::Ready,
            (false, false) => Self::Recreate,
            (false, true) => Self::Skip,
        }
    }
}

/// Size of the area rendered each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameViewport {
    width: u32,
    height: u32,
}

impl FrameViewport {
    /// Viewport covering `width` x `height`
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Viewport covering a swapchain extent
    #[must_use]
    pub const fn from_extent(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }

    /// Classify a window-size event against the current size
    #[must_use]
    pub const fn decide_resize(&self, width: u32, height: u32) -> ResizeDecision {
        if width == 0 || height == 0 {
            ResizeDecision::Minimized
        } else if width == self.width && height == self.height {
            ResizeDecision::Unchanged
        } else {
            ResizeDecision::Resize { width, height }
        }
    }

    /// Full-size viewport with depth `[0, 1]`
    #[must_use]
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Full-size scissor rectangle
    #[must_use]
    pub const fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }

    /// Width over height; 1.0 for a degenerate size
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Width in pixels
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_area_is_skipped() {
        let viewport = FrameViewport::new(1280, 720);
        assert_eq!(viewport.decide_resize(0, 0), ResizeDecision::Minimized);
        assert_eq!(viewport.decide_resize(0, 720), ResizeDecision::Minimized);
        assert_eq!(viewport.decide_resize(1280, 0), ResizeDecision::Minimized);
    }

    #[test]
    fn test_same_size_is_unchanged() {
        let viewport = FrameViewport::new(800, 600);
        assert_eq!(viewport.decide_resize(800, 600), ResizeDecision::Unchanged);
    }

    #[test]
    fn test_resize_covers_new_size() {
        let viewport = FrameViewport::new(800, 600);
        let ResizeDecision::Resize { width, height } = viewport.decide_resize(1024, 300) else {
            panic!("expected a resize");
        };

        let resized = FrameViewport::new(width, height);
        let vp = resized.viewport();
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (0.0, 0.0, 1024.0, 300.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));

        let scissor = resized.scissor();
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!((scissor.extent.width, scissor.extent.height), (1024, 300));
    }

    #[test]
    fn test_unacquired_swapchain_never_records() {
        assert_eq!(AcquireState::decide(true, false), AcquireState::Ready);
        assert_eq!(AcquireState::decide(true, true), AcquireState::Ready);

        // One rebuild per frame, then give up until the next one
        assert_eq!(AcquireState::decide(false, false), AcquireState::Recreate);
        assert_eq!(AcquireState::decide(false, true), AcquireState::Skip);
    }

    #[test]
    fn test_clamped_extent_does_not_retrigger_resize() {
        // Surface clamped a 5000x300 request to 4096x300
        let requested = FrameViewport::new(5000, 300);
        let extent = FrameViewport::from_extent(vk::Extent2D {
            width: 4096,
            height: 300,
        });

        assert_eq!(requested.decide_resize(5000, 300), ResizeDecision::Unchanged);
        assert_ne!(extent.decide_resize(5000, 300), ResizeDecision::Unchanged);
    }

    #[test]
    fn test_aspect() {
        assert!((FrameViewport::new(1920, 1080).aspect() - 16.0 / 9.0).abs() < 1e-6);
        assert!((FrameViewport::new(10, 0).aspect() - 1.0).abs() < f32::EPSILON);
    }
}
