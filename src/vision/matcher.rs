//! Template matching on top of `imageproc`.
//!
//! Scores are normalized correlation coefficients in `[-1, 1]`: both the window
//! and the template have their mean removed, so flat regions score 0 instead of
//! matching everything. Matching runs on grayscale images in pixel space; only the
//! reported positions are converted to input coordinates with the scale factor.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use imageproc::contrast::equalize_histogram;
use imageproc::definitions::Image;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::rect::Rect;
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{Point, PreprocessOptions};
use crate::error::{ActionError, ActionResult};

/// Upper bound on the matches reported for one search.
const MAX_MATCHES: usize = 32;
const DEFAULT_BLUR_SIGMA: f32 = 1.5;
const DEFAULT_BINARIZE_LEVEL: u8 = 150;

/// A raw match in pixel space (top-left corner of the template).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// A reported match in input coordinates.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ScoredPoint {
    pub x: i32,
    pub y: i32,
    pub score: f32,
}

/// Outcome of a `find_image` search.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageMatch {
    pub found: bool,
    /// Centre of the best match, scaled to input coordinates.
    pub position: Option<Point>,
    /// Best score seen, whether or not it passed the threshold.
    pub confidence: f32,
    /// Every accepted match, best first.
    pub matches: Vec<ScoredPoint>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageMatcher {
    scale_factor: f32,
    threshold: f32,
}

impl ImageMatcher {
    pub fn new(scale_factor: f32, threshold: f32) -> Self {
        Self {
            scale_factor,
            threshold,
        }
    }

    /// Score every placement of `template` in `screen`.
    ///
    /// Returns the best score overall and the candidates at or above the threshold,
    /// best first, with overlapping neighbours of a better candidate removed.
    /// A template larger than the screen yields no candidates.
    pub fn find_candidates(&self, screen: &GrayImage, template: &GrayImage) -> (f32, Vec<Candidate>) {
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > screen.width() || th > screen.height() {
            debug!(
                target: "screenqueue::matcher",
                template = ?template.dimensions(),
                screen = ?screen.dimensions(),
                "Template does not fit in the source image"
            );
            return (0.0, Vec::new());
        }

        let scores = correlation_coefficients(screen, template);
        let extremes = find_extremes(&scores);
        let best = if extremes.max_value.is_finite() {
            extremes.max_value
        } else {
            0.0
        };
        trace!(
            target: "screenqueue::matcher",
            best,
            at = ?extremes.max_value_location,
            threshold = self.threshold,
            "Template scored"
        );

        let mut raw: Vec<Candidate> = scores
            .enumerate_pixels()
            // A score of 0 or less means no correlation, whatever the threshold.
            .filter(|(_, _, p)| p.0[0] > 0.0 && p.0[0] >= self.threshold)
            .map(|(x, y, p)| Candidate { x, y, score: p.0[0] })
            .collect();
        raw.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut kept: Vec<Candidate> = Vec::new();
        for c in raw {
            let overlaps = kept
                .iter()
                .any(|k| k.x.abs_diff(c.x) < tw / 2 + 1 && k.y.abs_diff(c.y) < th / 2 + 1);
            if !overlaps {
                kept.push(c);
                if kept.len() == MAX_MATCHES {
                    break;
                }
            }
        }
        (best, kept)
    }

    /// Keep candidates whose surroundings contain `context`.
    ///
    /// The area examined is `± area_size` pixels around the candidate's centre,
    /// clamped to the screen. An area smaller than the context image never matches.
    pub fn filter_by_context(
        &self,
        screen: &GrayImage,
        candidates: Vec<Candidate>,
        template_size: (u32, u32),
        context: &GrayImage,
        context_threshold: f32,
        area_size: u32,
    ) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| {
                let cx = c.x + template_size.0 / 2;
                let cy = c.y + template_size.1 / 2;
                let x0 = cx.saturating_sub(area_size);
                let y0 = cy.saturating_sub(area_size);
                let x1 = (cx + area_size).min(screen.width());
                let y1 = (cy + area_size).min(screen.height());
                if x1 <= x0 || y1 <= y0 {
                    return false;
                }
                let area = image::imageops::crop_imm(screen, x0, y0, x1 - x0, y1 - y0).to_image();
                let context_matcher = ImageMatcher::new(self.scale_factor, context_threshold);
                let (score, hits) = context_matcher.find_candidates(&area, context);
                trace!(target: "screenqueue::matcher", x = c.x, y = c.y, score, "Context check");
                !hits.is_empty()
            })
            .collect()
    }

    /// Convert candidates into the reported match, scaling centres to input coordinates.
    pub fn summarize(&self, best: f32, candidates: &[Candidate], template_size: (u32, u32)) -> ImageMatch {
        let matches: Vec<ScoredPoint> = candidates
            .iter()
            .map(|c| {
                let center = self.to_input_point(
                    c.x as f32 + template_size.0 as f32 / 2.0,
                    c.y as f32 + template_size.1 as f32 / 2.0,
                );
                ScoredPoint {
                    x: center.x,
                    y: center.y,
                    score: c.score,
                }
            })
            .collect();

        ImageMatch {
            found: !matches.is_empty(),
            position: matches.first().map(|m| Point::new(m.x, m.y)),
            confidence: best,
            matches,
        }
    }

    /// Pixel-space point to input coordinates.
    pub fn to_input_point(&self, x: f32, y: f32) -> Point {
        scale_to_input(x, y, self.scale_factor)
    }
}

/// Normalized correlation coefficient of `template` at every placement in `screen`.
///
/// `(n·ΣIT − ΣI·ΣT) / sqrt((n·ΣI² − (ΣI)²)(n·ΣT² − (ΣT)²))`, with the window sums
/// read from integral images. A window or template without variance scores 0.
fn correlation_coefficients(screen: &GrayImage, template: &GrayImage) -> Image<Luma<f32>> {
    let (tw, th) = template.dimensions();
    let n = i128::from(tw) * i128::from(th);

    let cross = match_template(screen, template, MatchTemplateMethod::CrossCorrelation);
    let sums: Image<Luma<u64>> = integral_image(screen);
    let squares: Image<Luma<u64>> = integral_squared_image(screen);

    let (sum_t, sum_t2) = template.pixels().fold((0i128, 0i128), |(s, s2), p| {
        let v = i128::from(p.0[0]);
        (s + v, s2 + v * v)
    });
    let template_var = n * sum_t2 - sum_t * sum_t;

    ImageBuffer::from_fn(cross.width(), cross.height(), |x, y| {
        if template_var <= 0 {
            return Luma([0.0]);
        }
        let sum_i = window_sum(&sums, x, y, tw, th);
        let sum_i2 = window_sum(&squares, x, y, tw, th);
        let window_var = n * sum_i2 - sum_i * sum_i;
        if window_var <= 0 {
            return Luma([0.0]);
        }
        let sum_it = f64::from(cross.get_pixel(x, y).0[0]);
        let numerator = n as f64 * sum_it - (sum_i * sum_t) as f64;
        let score = numerator / ((window_var as f64) * (template_var as f64)).sqrt();
        Luma([score.clamp(-1.0, 1.0) as f32])
    })
}

/// Sum of the `w`×`h` window at `(x, y)`, from an integral image with a zero first row and column.
fn window_sum(integral: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> i128 {
    let at = |x: u32, y: u32| i128::from(integral.get_pixel(x, y).0[0]);
    at(x + w, y + h) - at(x, y + h) - at(x + w, y) + at(x, y)
}

/// Convert a pixel-space position to input coordinates.
pub fn scale_to_input(x: f32, y: f32, scale_factor: f32) -> Point {
    Point::new((x * scale_factor).round() as i32, (y * scale_factor).round() as i32)
}

/// Grayscale conversion followed by the requested preprocessing steps,
/// in the order blur, equalize, binarize.
pub fn preprocess(image: &DynamicImage, options: &PreprocessOptions) -> ActionResult<GrayImage> {
    let mut gray = image.to_luma8();
    if options.is_noop() {
        return Ok(gray);
    }

    if options.blur {
        let sigma = options.blur_sigma.unwrap_or(DEFAULT_BLUR_SIGMA);
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(ActionError::InvalidParams {
                action_type: "preprocess_options".into(),
                reason: format!("blur_sigma must be positive, got {sigma}"),
            });
        }
        gray = gaussian_blur_f32(&gray, sigma);
    }

    if options.equalize {
        gray = equalize_histogram(&gray);
    }

    if options.binarize {
        let level = options.binarize_level.unwrap_or(DEFAULT_BINARIZE_LEVEL);
        for p in gray.pixels_mut() {
            p.0[0] = if p.0[0] > level { 255 } else { 0 };
        }
    }

    Ok(gray)
}

/// Copy of `source` with a red box around every candidate.
pub fn annotate_matches(source: &DynamicImage, candidates: &[Candidate], template_size: (u32, u32)) -> RgbaImage {
    let mut canvas = source.to_rgba8();
    for c in candidates {
        let rect = Rect::at(c.x as i32, c.y as i32).of_size(template_size.0.max(1), template_size.1.max(1));
        draw_hollow_rect_mut(&mut canvas, rect, Rgba([255, 0, 0, 255]));
    }
    canvas
}
