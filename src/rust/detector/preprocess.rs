use image::imageops::FilterType;
use image::DynamicImage;

/// Side length of the square image the classifier expects.
pub const INPUT_SIZE: u32 = 224;
/// RGB channels per pixel.
pub const CHANNELS: usize = 3;
/// Number of values in one preprocessed input.
pub const INPUT_LEN: usize = (INPUT_SIZE as usize) * (INPUT_SIZE as usize) * CHANNELS;

/// Model input in HWC layout, red/green/blue per pixel, each value in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedInput(Vec<f32>);

impl PreprocessedInput {
    /// An all-zero (black) input, used to probe a model's output size.
    pub fn zeros() -> Self {
        Self(vec![0.0; INPUT_LEN])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// Converts an image of any size and pixel format into the classifier input.
///
/// The image is resampled to 224x224 with bilinear filtering, alpha is
/// dropped and every channel is scaled linearly from `[0, 255]` to `[0, 1]`.
/// Pixels are emitted row-major from the top-left corner.
pub fn preprocess(image: &DynamicImage) -> PreprocessedInput {
    let rgb = if image.width() == INPUT_SIZE && image.height() == INPUT_SIZE {
        image.to_rgb8()
    } else {
        image
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            .to_rgb8()
    };

    let mut values = Vec::with_capacity(INPUT_LEN);
    for pixel in rgb.pixels() {
        values.push(pixel[0] as f32 / 255.0);
        values.push(pixel[1] as f32 / 255.0);
        values.push(pixel[2] as f32 / 255.0);
    }

    PreprocessedInput(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_solid_color_gives_constant_buffer() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([255, 128, 0])));
        let input = preprocess(&image);

        assert_eq!(input.len(), 150528);
        for triple in input.as_slice().chunks(3) {
            assert_eq!(triple[0], 1.0);
            assert_eq!(triple[1], 128.0 / 255.0);
            assert_eq!(triple[2], 0.0);
        }
    }

    #[test]
    fn test_small_image_is_upscaled() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 5, Rgb([10, 20, 30])));
        let input = preprocess(&image);

        assert_eq!(input.len(), INPUT_LEN);
        assert_eq!(&input.as_slice()[..3], &[10.0 / 255.0, 20.0 / 255.0, 30.0 / 255.0]);
    }

    #[test]
    fn test_alpha_is_discarded() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(224, 224, Rgba([50, 100, 150, 0])));
        let input = preprocess(&image);

        assert_eq!(&input.as_slice()[..3], &[50.0 / 255.0, 100.0 / 255.0, 150.0 / 255.0]);
    }

    #[test]
    fn test_row_major_channel_order() {
        let mut pixels = RgbImage::new(224, 224);
        pixels.put_pixel(1, 0, Rgb([255, 0, 0]));
        pixels.put_pixel(0, 1, Rgb([0, 0, 255]));
        let input = preprocess(&DynamicImage::ImageRgb8(pixels));
        let values = input.as_slice();

        // (x=1, y=0) is the second pixel
        assert_eq!(&values[3..6], &[1.0, 0.0, 0.0]);
        // (x=0, y=1) starts the second row
        let row = 224 * 3;
        assert_eq!(&values[row..row + 3], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_deterministic() {
        let mut pixels = RgbImage::new(300, 200);
        for (x, y, p) in pixels.enumerate_pixels_mut() {
            *p = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        let image = DynamicImage::ImageRgb8(pixels);
        assert_eq!(preprocess(&image), preprocess(&image));
    }
}
