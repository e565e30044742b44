//! Downloaded-artifact persistence
//!
//! Every saved image carries the prompt that produced it, embedded as a
//! PNG `iTXt` chunk so any metadata-aware reader can recover the
//! provenance. Decoding goes through the `image` crate; encoding uses the
//! `png` crate directly because text chunks are not reachable through the
//! generic encoder API.

use easel_core::{EaselError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Keyword under which the originating prompt is stored
pub const PROMPT_KEYWORD: &str = "Prompt";

/// Re-encode a downloaded image as PNG at `dest` with the prompt embedded.
pub fn embed_prompt(source: &Path, dest: &Path, prompt: &str) -> Result<()> {
    let img = image::open(source)
        .map_err(|e| EaselError::Artifact(format!("cannot decode {}: {}", source.display(), e)))?
        .to_rgba8();
    let (width, height) = img.dimensions();

    let file = File::create(dest)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    // iTXt rather than tEXt: prompts are not limited to Latin-1
    encoder
        .add_itxt_chunk(PROMPT_KEYWORD.to_string(), prompt.to_string())
        .map_err(|e| EaselError::Artifact(format!("cannot embed prompt: {}", e)))?;

    let mut writer = encoder
        .write_header()
        .map_err(|e| EaselError::Artifact(format!("cannot write {}: {}", dest.display(), e)))?;
    writer
        .write_image_data(img.as_raw())
        .map_err(|e| EaselError::Artifact(format!("cannot write {}: {}", dest.display(), e)))?;
    writer
        .finish()
        .map_err(|e| EaselError::Artifact(format!("cannot write {}: {}", dest.display(), e)))?;

    Ok(())
}

/// Read the embedded prompt back from a saved artifact, if present.
pub fn read_prompt(path: &Path) -> Result<Option<String>> {
    let decoder = png::Decoder::new(File::open(path)?);
    let reader = decoder
        .read_info()
        .map_err(|e| EaselError::Artifact(format!("cannot decode {}: {}", path.display(), e)))?;
    let info = reader.info();

    for chunk in &info.utf8_text {
        if chunk.keyword == PROMPT_KEYWORD {
            let text = chunk.get_text().map_err(|e| {
                EaselError::Artifact(format!("corrupt prompt chunk in {}: {}", path.display(), e))
            })?;
            return Ok(Some(text));
        }
    }
    // Artifacts written by older tools may carry a Latin-1 chunk instead
    for chunk in &info.uncompressed_latin1_text {
        if chunk.keyword == PROMPT_KEYWORD {
            return Ok(Some(chunk.text.clone()));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::flatten_text;
    use image::{Rgba, RgbaImage};

    fn sample_image(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("source.png");
        let mut img = RgbaImage::new(4, 4);
        for pixel in img.pixels_mut() {
            *pixel = Rgba([200, 40, 40, 255]);
        }
        img.save(&path).expect("write sample image");
        path
    }

    #[test]
    fn test_prompt_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = sample_image(dir.path());
        let dest = dir.path().join("art_01.png");

        let prompt = "a red fox in the snow";
        embed_prompt(&source, &dest, prompt).expect("embed");

        let restored = read_prompt(&dest).expect("read").expect("prompt present");
        assert_eq!(restored, prompt);
    }

    #[test]
    fn test_prompt_round_trip_whitespace_normalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = sample_image(dir.path());
        let dest = dir.path().join("art_01.png");

        let prompt = "a red fox\n  jumping over\ta fence";
        embed_prompt(&source, &dest, prompt).expect("embed");

        let restored = read_prompt(&dest).expect("read").expect("prompt present");
        assert_eq!(flatten_text(&restored), flatten_text(prompt));
    }

    #[test]
    fn test_prompt_round_trip_non_latin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = sample_image(dir.path());
        let dest = dir.path().join("art_01.png");

        let prompt = "雪地里的红色狐狸";
        embed_prompt(&source, &dest, prompt).expect("embed");

        let restored = read_prompt(&dest).expect("read").expect("prompt present");
        assert_eq!(restored, prompt);
    }

    #[test]
    fn test_missing_prompt_reads_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = sample_image(dir.path());
        assert!(read_prompt(&source).expect("read").is_none());
    }

    #[test]
    fn test_pixels_survive_reencode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = sample_image(dir.path());
        let dest = dir.path().join("art_01.png");

        embed_prompt(&source, &dest, "check").expect("embed");

        let reloaded = image::open(&dest).expect("open").to_rgba8();
        assert_eq!(reloaded.dimensions(), (4, 4));
        assert_eq!(reloaded.get_pixel(0, 0), &Rgba([200, 40, 40, 255]));
    }
}
