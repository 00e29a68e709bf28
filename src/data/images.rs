use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use rayon::prelude::*;

use super::model::Spectrum;
use super::reduce::SpectralReducer;
use crate::error::{Result, SpectraError};

/// Image files of one class folder, sorted by file name.
///
/// Every regular file with an image extension is listed, including formats
/// this build cannot decode, so they fail loudly in [`load_spectrum`].
/// Sub-directories, hidden files and non-image files are left out.
pub fn list_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        let is_image = ImageFormat::from_path(&path).is_ok();
        if !hidden && is_image {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Fixed-point BT.601 weights (`0.299, 0.587, 0.114` scaled by 2^14), the
/// grayscale conversion OpenCV applies when reading colour frames.
const BT601_R: u32 = 4899;
const BT601_G: u32 = 9617;
const BT601_B: u32 = 1868;

/// Convert a decoded frame to 8-bit gray.
///
/// Gray inputs only lose extra bit depth; colour inputs are weighted with
/// BT.601 rather than the Rec.709 weights of [`DynamicImage::to_luma8`].
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    if !image.color().has_color() {
        return image.to_luma8();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let weighted =
            u32::from(r) * BT601_R + u32::from(g) * BT601_G + u32::from(b) * BT601_B;
        Luma([((weighted + (1 << 13)) >> 14) as u8])
    })
}

/// Decode one image as 8-bit gray and reduce it.
pub fn load_spectrum(path: &Path, reducer: &SpectralReducer) -> Result<Spectrum> {
    let decoded = image::open(path).map_err(|source| SpectraError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let image = to_gray(&decoded);
    let spectrum = reducer
        .reduce(&image)
        .ok_or_else(|| SpectraError::EmptyImage {
            path: path.to_path_buf(),
        })?;
    log::debug!("{}: {} bins", path.display(), spectrum.width());

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(spectrum.with_source(name))
}

/// Reduce every image of a class folder into a spectrum.
///
/// Images are decoded in parallel; the result follows the sorted file-name
/// order of [`list_images`]. The first unreadable image aborts the batch, and
/// an image whose column count differs from the first image's fails with
/// [`SpectraError::Shape`].
pub fn load_class_folder(folder: &Path, reducer: &SpectralReducer) -> Result<Vec<Spectrum>> {
    let paths = list_images(folder)?;
    if paths.is_empty() {
        return Err(SpectraError::EmptyFolder(folder.to_path_buf()));
    }

    let spectra = paths
        .par_iter()
        .map(|path| load_spectrum(path, reducer))
        .collect::<Result<Vec<_>>>()?;

    let width = spectra[0].width();
    for (path, spectrum) in paths.iter().zip(&spectra) {
        if spectrum.width() != width {
            return Err(SpectraError::Shape {
                path: path.clone(),
                expected: width,
                actual: spectrum.width(),
            });
        }
    }

    log::info!(
        "{}: reduced {} images to {}-bin spectra",
        folder.display(),
        spectra.len(),
        width
    );
    Ok(spectra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
        GrayImage::from_pixel(width, height, Luma([value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_loads_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "c.png", 4, 3, 30);
        write_png(dir.path(), "a.png", 4, 5, 10);
        write_png(dir.path(), "b.png", 4, 2, 20);

        let spectra = load_class_folder(dir.path(), &SpectralReducer::new(1.0)).unwrap();

        let firsts: Vec<f64> = spectra.iter().map(|s| s.values[0]).collect();
        assert_eq!(firsts, vec![10.0, 20.0, 30.0]);
        assert_eq!(spectra[0].source.as_deref(), Some("a.png"));
        assert!(spectra.iter().all(|s| s.width() == 4));
    }

    #[test]
    fn test_skips_non_image_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "frame.png", 2, 2, 1);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        std::fs::write(dir.path().join(".hidden.png"), "junk").unwrap();
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let paths = list_images(dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("frame.png"));
    }

    #[test]
    fn test_jpeg_and_bmp_frames_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 4, 2, 100);
        write_png(dir.path(), "b.png", 4, 2, 100);
        let gray = RgbImage::from_pixel(4, 2, Rgb([100, 100, 100]));
        gray.save(dir.path().join("c.jpg")).unwrap();
        gray.save(dir.path().join("d.bmp")).unwrap();

        let names: Vec<_> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.png", "b.png", "c.jpg", "d.bmp"]);

        let spectra = load_class_folder(dir.path(), &SpectralReducer::new(1.0)).unwrap();
        assert_eq!(spectra.len(), 4);
        assert!(spectra.iter().all(|s| s.width() == 4));
        assert_eq!(spectra[3].values, vec![100.0; 4]);
    }

    #[test]
    fn test_undecodable_format_is_not_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 4, 2, 1);
        std::fs::write(dir.path().join("b.gif"), b"GIF89a").unwrap();

        assert_eq!(list_images(dir.path()).unwrap().len(), 2);
        let err = load_class_folder(dir.path(), &SpectralReducer::default()).unwrap_err();
        match err {
            SpectraError::Decode { path, .. } => assert!(path.ends_with("b.gif")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_colour_frames_use_bt601_weights() {
        let rgb = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            2 => Rgb([0, 0, 255]),
            _ => Rgb([255, 255, 255]),
        });
        let gray = to_gray(&DynamicImage::ImageRgb8(rgb));
        let values: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![76, 150, 29, 255]);
    }

    #[test]
    fn test_shape_error_on_width_change() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 4, 2, 1);
        write_png(dir.path(), "b.png", 5, 2, 1);

        let err = load_class_folder(dir.path(), &SpectralReducer::default()).unwrap_err();
        match err {
            SpectraError::Shape {
                path,
                expected,
                actual,
            } => {
                assert!(path.ends_with("b.png"));
                assert_eq!((expected, actual), (4, 5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_error_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 4, 2, 1);
        std::fs::write(dir.path().join("b.png"), b"definitely not png").unwrap();

        let err = load_class_folder(dir.path(), &SpectralReducer::default()).unwrap_err();
        assert!(matches!(err, SpectraError::Decode { .. }));
    }

    #[test]
    fn test_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_class_folder(dir.path(), &SpectralReducer::default()).unwrap_err();
        assert!(matches!(err, SpectraError::EmptyFolder(_)));
    }

    #[test]
    fn test_missing_folder_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_class_folder(&dir.path().join("nope"), &SpectralReducer::default())
            .unwrap_err();
        assert!(matches!(err, SpectraError::Io(_)));
    }
}
