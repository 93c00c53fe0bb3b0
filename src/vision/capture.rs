//! Screen capture and image file helpers.
//!
//! `ScreenCapture` is the seam between the runtime and the display: the default
//! implementation grabs monitors through `xcap`, tests plug in an in-memory one.

use image::{DynamicImage, RgbaImage};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};
use xcap::Monitor;

use crate::config::Region;
use crate::error::{ActionError, ActionResult};

/// Something that can produce a screenshot.
pub trait ScreenCapture: Send {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Capture the given monitor, or the primary one when `monitor` is `None`.
    fn capture(&mut self, monitor: Option<usize>) -> ActionResult<RgbaImage>;
}

/// Captures real monitors with `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl ScreenCapture for XcapScreen {
    fn name(&self) -> &'static str {
        "xcap"
    }

    fn capture(&mut self, monitor: Option<usize>) -> ActionResult<RgbaImage> {
        let monitors =
            Monitor::all().map_err(|e| ActionError::Capture(format!("failed to list monitors: {e}")))?;

        let selected = match monitor {
            Some(index) => monitors
                .get(index)
                .ok_or_else(|| ActionError::Capture(format!("monitor {index} not found")))?,
            None => monitors
                .iter()
                .find(|m| m.is_primary())
                .or_else(|| monitors.first())
                .ok_or_else(|| ActionError::Capture("no monitors found".into()))?,
        };

        trace!(
            target: "screenqueue::capture",
            monitor = selected.name(),
            width = selected.width(),
            height = selected.height(),
            "Capturing monitor"
        );

        selected
            .capture_image()
            .map_err(|e| ActionError::Capture(e.to_string()))
    }
}

/// Crop `image` to `region`, rejecting empty or out-of-bounds regions.
pub fn crop_region(image: &RgbaImage, region: Region) -> ActionResult<RgbaImage> {
    if region.left < 0 || region.top < 0 {
        return Err(ActionError::invalid_params(
            "screenshot",
            "region must not have negative coordinates",
        ));
    }
    if region.width() <= 0 || region.height() <= 0 {
        return Err(ActionError::invalid_params(
            "screenshot",
            format!("region {region:?} is empty"),
        ));
    }
    if region.right as u32 > image.width() || region.bottom as u32 > image.height() {
        return Err(ActionError::invalid_params(
            "screenshot",
            format!(
                "region {region:?} exceeds the {}x{} capture",
                image.width(),
                image.height()
            ),
        ));
    }

    Ok(image::imageops::crop_imm(
        image,
        region.left as u32,
        region.top as u32,
        region.width() as u32,
        region.height() as u32,
    )
    .to_image())
}

/// Write `image` to `path`, creating parent directories. An existing file is replaced.
pub fn save_image(image: &RgbaImage, path: &Path) -> ActionResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
    }
    image.save(path).map_err(|e| ActionError::image(path, e))?;
    debug!(target: "screenqueue::capture", path = %path.display(), "Image saved");
    Ok(())
}

/// Load an image file.
pub fn load_image(path: &Path) -> ActionResult<DynamicImage> {
    image::open(path).map_err(|e| ActionError::image(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn crop_takes_the_requested_area() {
        let img = gradient(40, 30);
        let out = crop_region(
            &img,
            Region {
                left: 10,
                top: 5,
                right: 20,
                bottom: 25,
            },
        )
        .unwrap();
        assert_eq!(out.dimensions(), (10, 20));
        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 5, 0, 255]));
    }

    #[test]
    fn crop_rejects_bad_regions() {
        let img = gradient(40, 30);
        let bad = [
            Region { left: -1, top: 0, right: 5, bottom: 5 },
            Region { left: 5, top: 5, right: 5, bottom: 10 },
            Region { left: 0, top: 0, right: 41, bottom: 10 },
        ];
        for region in bad {
            assert!(
                matches!(crop_region(&img, region), Err(ActionError::InvalidParams { .. })),
                "{region:?}"
            );
        }
    }

    #[test]
    fn save_creates_directories_and_load_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/shot.png");
        save_image(&gradient(8, 6), &path).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (8, 6));
    }

    #[test]
    fn load_missing_file_fails() {
        let err = load_image(Path::new("definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, ActionError::Image { .. }));
    }
}
