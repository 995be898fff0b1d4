//! In-memory camera with a synthetic viewfinder.

use std::sync::{Mutex, MutexGuard, PoisonError};

use camlink_core::{CameraMode, FlashMode};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::info;

use crate::application::remote_commands::{CameraControl, CameraError};

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 8.0;
/// Zoom change per `ZOOM_IN` / `ZOOM_OUT`.
pub const ZOOM_STEP: f32 = 0.5;

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Lens {
    #[default]
    Back,
    Front,
}

#[derive(Debug)]
struct CameraStatus {
    zoom: f32,
    flash: FlashMode,
    mode: CameraMode,
    lens: Lens,
    photos_taken: u32,
    frame_counter: u32,
    suggestions: Vec<String>,
}

impl Default for CameraStatus {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            flash: FlashMode::Off,
            mode: CameraMode::Photo,
            lens: Lens::Back,
            photos_taken: 0,
            frame_counter: 0,
            suggestions: Vec::new(),
        }
    }
}

/// A [`CameraControl`] that needs no hardware.
///
/// Every command succeeds and updates the in-memory status.  Preview frames
/// are a 640×480 gradient that scrolls one step per frame, so consecutive
/// frames differ and a viewer can tell the stream is live.
#[derive(Debug, Default)]
pub struct SimulatedCamera {
    status: Mutex<CameraStatus>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::default()
    }

    fn status(&self) -> MutexGuard<'_, CameraStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lens(&self) -> Lens {
        self.status().lens
    }

    pub fn photos_taken(&self) -> u32 {
        self.status().photos_taken
    }

    /// Suggestion titles applied so far, oldest first.
    pub fn applied_suggestions(&self) -> Vec<String> {
        self.status().suggestions.clone()
    }

    fn render(offset: u32) -> RgbImage {
        RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            let r = ((x + offset) % 256) as u8;
            let g = ((y + offset / 2) % 256) as u8;
            let b = ((x ^ y) % 256) as u8;
            Rgb([r, g, b])
        })
    }
}

impl CameraControl for SimulatedCamera {
    fn current_zoom(&self) -> f32 {
        self.status().zoom
    }

    fn flash_mode(&self) -> FlashMode {
        self.status().flash
    }

    fn current_mode(&self) -> CameraMode {
        self.status().mode
    }

    fn capture_preview_frame(&self) -> Option<DynamicImage> {
        let offset = {
            let mut status = self.status();
            status.frame_counter = status.frame_counter.wrapping_add(1);
            status.frame_counter.wrapping_mul(4)
        };
        Some(DynamicImage::ImageRgb8(Self::render(offset)))
    }

    fn capture_photo(&self) -> Result<(), CameraError> {
        let mut status = self.status();
        status.photos_taken += 1;
        info!(photo = status.photos_taken, mode = %status.mode, "photo captured");
        Ok(())
    }

    fn toggle_flash(&self) -> Result<FlashMode, CameraError> {
        let mut status = self.status();
        status.flash = match status.flash {
            FlashMode::Off => FlashMode::On,
            FlashMode::On => FlashMode::Auto,
            FlashMode::Auto => FlashMode::Off,
        };
        Ok(status.flash)
    }

    fn flip_camera(&self) -> Result<(), CameraError> {
        let mut status = self.status();
        status.lens = match status.lens {
            Lens::Back => Lens::Front,
            Lens::Front => Lens::Back,
        };
        info!(lens = ?status.lens, "camera flipped");
        Ok(())
    }

    fn zoom_in(&self) -> Result<f32, CameraError> {
        let zoom = self.current_zoom() + ZOOM_STEP;
        self.set_zoom(zoom)
    }

    fn zoom_out(&self) -> Result<f32, CameraError> {
        let zoom = self.current_zoom() - ZOOM_STEP;
        self.set_zoom(zoom)
    }

    /// Clamps `zoom` to the supported range.
    fn set_zoom(&self, zoom: f32) -> Result<f32, CameraError> {
        if !zoom.is_finite() {
            return Err(CameraError::Failed(format!("zoom factor is not finite: {zoom}")));
        }
        let mut status = self.status();
        status.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        Ok(status.zoom)
    }

    fn set_mode(&self, mode: CameraMode) -> Result<(), CameraError> {
        self.status().mode = mode;
        Ok(())
    }

    fn apply_suggestion(&self, title: &str) -> Result<(), CameraError> {
        self.status().suggestions.push(title.to_string());
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
