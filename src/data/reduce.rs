use image::GrayImage;

use super::model::Spectrum;

/// Collapses a 2D grayscale frame into a 1D spectrum.
///
/// Entry `j` of the output is `gain × mean(column j)`, rounded half to even
/// (numpy's rounding), so results are reproducible bit for bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralReducer {
    gain: f64,
}

impl SpectralReducer {
    pub const DEFAULT_GAIN: f64 = 5.0;

    /// `gain` must be positive and finite; the config layer validates it.
    pub fn new(gain: f64) -> Self {
        debug_assert!(gain.is_finite() && gain > 0.0);
        Self { gain }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Reduce one image. Returns `None` for an image without pixels, whose
    /// column mean is undefined.
    pub fn reduce(&self, image: &GrayImage) -> Option<Spectrum> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let mut sums = vec![0u64; width as usize];
        for row in image.rows() {
            for (sum, px) in sums.iter_mut().zip(row) {
                *sum += u64::from(px.0[0]);
            }
        }

        let rows = f64::from(height);
        let values = sums
            .into_iter()
            .map(|s| (self.gain * (s as f64 / rows)).round_ties_even())
            .collect();
        Some(Spectrum::new(values))
    }
}

impl Default for SpectralReducer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GAIN)
    }
}
