//! Image preprocessing
//!
//! Same pipeline the classifiers were trained with: resize to 224×224
//! (bilinear), scale to [0, 1], normalize each channel with the ImageNet
//! mean and standard deviation, lay out as NCHW with a batch of one.

use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;

pub const INPUT_SIZE: u32 = 224;
pub const INPUT_SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

const PLANE: usize = (INPUT_SIZE * INPUT_SIZE) as usize;

/// Normalized input tensor of shape [`INPUT_SHAPE`]
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        INPUT_SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

pub fn preprocess(image: &DynamicImage) -> ImageTensor {
    let rgb = image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let mut data = vec![0.0f32; 3 * PLANE];
    for (i, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            data[channel * PLANE + i] = (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }

    ImageTensor { data }
}

/// Decode an image file and preprocess it
pub fn load_image(path: &Path) -> Result<ImageTensor, image::ImageError> {
    let image = image::open(path)?;
    Ok(preprocess(&image))
}
