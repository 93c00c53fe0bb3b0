//! OCR word lookup.
//!
//! Recognition itself is delegated to the `tesseract` executable (TSV output);
//! this module only parses its output and picks the words a `find_text` action
//! asks for.

use image::GrayImage;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, trace, warn};

use crate::config::Point;
use crate::error::{ActionError, ActionResult};

/// TSV `level` value tesseract uses for single words.
const WORD_LEVEL: u32 = 5;

/// One recognized word, in pixel space.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl OcrWord {
    pub fn center(&self) -> (f32, f32) {
        (
            self.left as f32 + self.width as f32 / 2.0,
            self.top as f32 + self.height as f32 / 2.0,
        )
    }

    fn contains_ignore_case(&self, needle_lower: &str) -> bool {
        self.text.to_lowercase().contains(needle_lower)
    }
}

/// Outcome of a `find_text` search.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextMatch {
    pub found: bool,
    /// Centre of the first matching word, scaled to input coordinates.
    pub position: Option<Point>,
    /// Every matching word (pixel-space boxes), in reading order.
    pub words: Vec<OcrWord>,
}

/// Anything that turns an image into words.
pub trait OcrEngine: Send {
    fn name(&self) -> &'static str;

    fn recognize(&self, image: &GrayImage, lang: &str, config: &str) -> ActionResult<Vec<OcrWord>>;
}

/// Runs the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
}

impl TesseractCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage, lang: &str, config: &str) -> ActionResult<Vec<OcrWord>> {
        let temp_path = std::env::temp_dir().join(format!("screenqueue_ocr_{}.png", uuid::Uuid::new_v4()));
        image
            .save(&temp_path)
            .map_err(|e| ActionError::image(&temp_path, e))?;

        trace!(
            target: "screenqueue::ocr",
            program = %self.program.display(), %lang, %config,
            "Running tesseract"
        );
        let output = Command::new(&self.program)
            .arg(&temp_path)
            .arg("stdout")
            .args(["-l", lang])
            .args(config.split_whitespace())
            .arg("tsv")
            .output();

        if let Err(e) = std::fs::remove_file(&temp_path) {
            warn!(target: "screenqueue::ocr", path = %temp_path.display(), error = %e, "Failed to remove temp image");
        }

        let output = output.map_err(|e| {
            ActionError::Ocr(format!("failed to run {}: {e}", self.program.display()))
        })?;
        if !output.status.success() {
            return Err(ActionError::Ocr(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(target: "screenqueue::ocr", words = words.len(), "OCR finished");
        Ok(words)
    }
}

/// Parse tesseract TSV output into words. Non-word rows, blank words and
/// malformed lines are skipped.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    tsv.lines()
        .skip_while(|line| line.starts_with("level"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            if cols[0].trim().parse::<u32>().ok()? != WORD_LEVEL {
                return None;
            }
            let text = cols[11..].join("\t").trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(OcrWord {
                text,
                left: cols[6].trim().parse().ok()?,
                top: cols[7].trim().parse().ok()?,
                width: cols[8].trim().parse().ok()?,
                height: cols[9].trim().parse().ok()?,
                confidence: cols[10].trim().parse().unwrap_or(-1.0),
            })
        })
        .collect()
}

/// Words containing `target` (case-insensitive).
///
/// When more than one word matches and `contexts` is non-empty, keep only the
/// words with some context word whose centre is closer than `max_distance`.
pub fn find_text_positions<'a>(
    words: &'a [OcrWord],
    target: &str,
    contexts: &[String],
    max_distance: f32,
) -> Vec<&'a OcrWord> {
    let target_lower = target.to_lowercase();
    let hits: Vec<&OcrWord> = words
        .iter()
        .filter(|w| w.contains_ignore_case(&target_lower))
        .collect();

    if hits.len() <= 1 || contexts.is_empty() {
        return hits;
    }

    let context_lower: Vec<String> = contexts
        .iter()
        .filter(|c| !c.is_empty())
        .map(|c| c.to_lowercase())
        .collect();

    hits.into_iter()
        .filter(|hit| {
            let (hx, hy) = hit.center();
            context_lower.iter().any(|ctx| {
                words
                    .iter()
                    .filter(|w| !std::ptr::eq(*w, *hit) && w.contains_ignore_case(ctx))
                    .any(|w| {
                        let (cx, cy) = w.center();
                        ((hx - cx).powi(2) + (hy - cy).powi(2)).sqrt() < max_distance
                    })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
4\t1\t1\t1\t1\t0\t10\t5\t300\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t5\t40\t20\t95.5\tFile
5\t1\t1\t1\t1\t2\t60\t5\t40\t20\t91\tEdit
5\t1\t1\t1\t1\t3\t110\t5\t40\t20\t0\t
5\t1\t2\t1\t1\t1\t400\t300\t60\t20\t88\tProfile
garbage line
";

    fn word(text: &str, left: i32, top: i32) -> OcrWord {
        OcrWord {
            text: text.into(),
            left,
            top,
            width: 20,
            height: 10,
            confidence: 90.0,
        }
    }

    #[test]
    fn parses_word_rows_only() {
        let words = parse_tsv(SAMPLE);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["File", "Edit", "Profile"]);
        assert_eq!(words[0].left, 10);
        assert_eq!(words[0].confidence, 95.5);
        assert_eq!(words[2].center(), (430.0, 310.0));
    }

    #[test]
    fn finds_case_insensitive_substrings() {
        let words = parse_tsv(SAMPLE);
        let hits = find_text_positions(&words, "file", &[], 10.0);
        // "File" and "Profile"
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn context_disambiguates_multiple_hits() {
        let words = vec![
            word("Save", 0, 0),
            word("Cancel", 25, 0),
            word("Save", 300, 200),
            word("Help", 320, 200),
        ];
        let ctx = vec!["help".to_string()];
        let hits = find_text_positions(&words, "save", &ctx, 30.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].left, 300);

        // Too strict a distance filters everything out.
        assert!(find_text_positions(&words, "save", &ctx, 5.0).is_empty());
    }

    #[test]
    fn single_hit_ignores_context() {
        let words = vec![word("Open", 0, 0), word("Far", 500, 500)];
        let ctx = vec!["far".to_string()];
        assert_eq!(find_text_positions(&words, "open", &ctx, 1.0).len(), 1);
    }

    #[test]
    fn missing_program_is_an_ocr_error() {
        let engine = TesseractCli::new("screenqueue-no-such-tesseract-binary");
        let err = engine.recognize(&GrayImage::new(4, 4), "eng", "--psm 6").unwrap_err();
        assert!(matches!(err, ActionError::Ocr(_)));
    }
}
