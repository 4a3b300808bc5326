//! # Placeholder images
//!
//! The degraded path of the web UI: a dark square with the prompt written on
//! it, used whenever the pretrained pipeline is unavailable or fails.
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use rusttype::{Font, Scale};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::utils::ensure_dir;

pub const SIZE: u32 = 512;
pub const LINE_WIDTH: usize = 40;
pub const EMPTY_PROMPT_TEXT: &str = "No prompt provided";

const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
const FOREGROUND: Rgb<u8> = Rgb([230, 230, 230]);
const FONT_SIZE: f32 = 18.;
const MARGIN: i32 = 10;
const FONT_CANDIDATES: [&str; 3] = [
    "DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];
// DejaVu Sans, Bitstream Vera license (assets/DejaVuSans-LICENSE.txt).
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Splits `text` into chunks of at most `width` characters.
pub fn wrap_prompt(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(width.max(1)).map(|c| c.iter().collect()).collect()
}

pub struct Placeholder {
    font: Font<'static>,
}

impl Placeholder {
    pub fn new(font: Font<'static>) -> Self {
        Self { font }
    }

    /// The font compiled into the crate.
    pub fn bundled() -> Result<Self> {
        Font::try_from_bytes(BUNDLED_FONT)
            .map(Self::new)
            .ok_or_else(|| Error::Config("bundled placeholder font is invalid".to_string()))
    }

    /// Uses `font_file` when given, then DejaVuSans from a few usual places,
    /// then the bundled copy.
    pub fn load(font_file: Option<&Path>) -> Result<Self> {
        let candidates = font_file
            .map(Path::to_path_buf)
            .into_iter()
            .chain(FONT_CANDIDATES.iter().map(PathBuf::from));
        for path in candidates {
            let font = std::fs::read(&path).ok().and_then(Font::try_from_vec);
            if let Some(font) = font {
                debug!("placeholder font {:?}", path);
                return Ok(Self::new(font));
            }
        }
        if let Some(path) = font_file {
            warn!("cannot load font {:?}, using the bundled one", path);
        }
        Self::bundled()
    }

    pub fn render(&self, prompt: &str) -> RgbImage {
        let mut image = RgbImage::from_pixel(SIZE, SIZE, BACKGROUND);
        let text = if prompt.trim().is_empty() { EMPTY_PROMPT_TEXT } else { prompt };
        let scale = Scale::uniform(FONT_SIZE);
        let v_metrics = self.font.v_metrics(scale);
        let line_height = v_metrics.ascent - v_metrics.descent;
        for (index, line) in wrap_prompt(text, LINE_WIDTH).iter().enumerate() {
            let y = MARGIN + (index as f32 * line_height).ceil() as i32;
            draw_text_mut(&mut image, FOREGROUND, MARGIN, y, scale, &self.font, line);
        }
        image
    }

    /// Renders and writes the placeholder, creating the parent directory.
    pub fn save<P: AsRef<Path>>(&self, prompt: &str, path: P) -> Result<RgbImage> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            ensure_dir(dir)?;
        }
        let image = self.render(prompt);
        image.save(path).map_err(|source| Error::Image { path: path.to_path_buf(), source })?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_every_forty_chars() {
        let text = "a".repeat(95);
        let lines = wrap_prompt(&text, LINE_WIDTH);
        let lengths: Vec<_> = lines.iter().map(|l| l.len()).collect();
        assert_eq!(lengths, vec![40, 40, 15]);
        assert!(wrap_prompt("", LINE_WIDTH).is_empty());
    }

    #[test]
    fn wraps_on_char_boundaries() {
        let lines = wrap_prompt("ééé", 2);
        assert_eq!(lines, vec!["éé".to_string(), "é".to_string()]);
    }

    fn has_text_in_rows(image: &RgbImage, rows: std::ops::Range<u32>) -> bool {
        rows.flat_map(|y| (0..SIZE).map(move |x| (x, y)))
            .any(|(x, y)| *image.get_pixel(x, y) != BACKGROUND)
    }

    #[test]
    fn blank_prompt_renders_default_text() {
        let image = Placeholder::bundled().unwrap().render("   ");
        assert_eq!(image.dimensions(), (SIZE, SIZE));
        assert!(has_text_in_rows(&image, 0..40));
        assert!(!has_text_in_rows(&image, 60..SIZE));
    }

    #[test]
    fn long_prompt_renders_every_line() {
        let placeholder = Placeholder::bundled().unwrap();
        let short = placeholder.render("A fantasy landscape at sunset");
        let long = placeholder.render(&"A fantasy landscape at sunset ".repeat(4));
        assert!(has_text_in_rows(&short, 0..40));
        assert!(!has_text_in_rows(&short, 40..SIZE));
        // 120 characters wrap onto three lines.
        assert!(has_text_in_rows(&long, 40..60));
        assert!(has_text_in_rows(&long, 60..90));
    }

    #[test]
    fn missing_font_file_falls_back() {
        let placeholder = Placeholder::load(Some(Path::new("does/not/exist.ttf"))).unwrap();
        assert!(placeholder.render("").pixels().any(|p| *p != BACKGROUND));
    }

    #[test]
    fn save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("output.png");
        Placeholder::bundled().unwrap().save("prompt", &path).unwrap();
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (SIZE, SIZE));
    }
}
