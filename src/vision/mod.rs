//! Vision capabilities used by the interpreter.
//!
//! - `capture`: screenshots (`xcap`) and image file I/O
//! - `matcher`: template matching and preprocessing (`imageproc`)
//! - `ocr`: word lookup over `tesseract` output

pub mod capture;
pub mod matcher;
pub mod ocr;

pub use capture::{ScreenCapture, XcapScreen};
pub use matcher::{ImageMatch, ImageMatcher};
pub use ocr::{OcrEngine, OcrWord, TesseractCli, TextMatch};
