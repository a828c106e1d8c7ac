use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use store_review_common::export_filename;

use crate::model::{ClipImage, ThumbPixels};

/// 保存ダイアログの既定ファイル名
pub fn default_export_name(date: &str, extension: &str) -> String {
    format!("{}.{}", export_filename(date), extension)
}

pub fn save_export(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// 画像をデコードしてサムネイルにする
pub fn decode_thumbnail(bytes: &[u8]) -> Result<ThumbPixels> {
    let image = image::load_from_memory(bytes).context("decode image")?;
    let thumb = image.thumbnail(220, 160);
    Ok(ThumbPixels {
        size: [thumb.width() as usize, thumb.height() as usize],
        pixels: thumb.to_rgba8().into_raw(),
    })
}

/// クリップボード用に原寸でデコードする
pub fn decode_clip_image(bytes: &[u8]) -> Result<ClipImage> {
    let rgba = image::load_from_memory(bytes).context("decode image")?.to_rgba8();
    Ok(ClipImage {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_default_export_name() {
        assert_eq!(default_export_name("2025-03-01", "csv"), "审核结果_2025-03-01.csv");
    }

    #[test]
    fn test_decode_thumbnail_shrinks() {
        let mut png = Vec::new();
        image::RgbImage::new(880, 640)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let thumb = decode_thumbnail(&png).unwrap();
        assert_eq!(thumb.size, [220, 160]);
        assert_eq!(thumb.pixels.len(), 220 * 160 * 4);

        assert!(decode_thumbnail(b"not an image").is_err());
    }

    #[test]
    fn test_decode_clip_image_keeps_size() {
        let mut png = Vec::new();
        image::RgbImage::new(300, 200)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let clip = decode_clip_image(&png).unwrap();
        assert_eq!((clip.width, clip.height), (300, 200));
        assert_eq!(clip.rgba.len(), 300 * 200 * 4);

        assert!(decode_clip_image(b"<html></html>").is_err());
    }
}
