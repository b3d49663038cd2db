//! Blob extraction: foreground mask to detections.
//!
//! The mask is opened (erode then dilate) to remove speckle and then closed
//! (dilate then erode) to fill small gaps inside one silhouette. Connected
//! components are labelled with 8-connectivity. Each component becomes at
//! most one detection; merges and splits across frames are the tracker's
//! concern.

use image::Luma;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::result::{BoundingBox, Detection};
use crate::frame::ForegroundMask;

#[derive(Clone, Copy, Debug)]
struct ComponentStats {
    first_pixel: usize,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    sum_x: u64,
    sum_y: u64,
    area: u32,
}

impl ComponentStats {
    fn new(first_pixel: usize, x: u32, y: u32) -> Self {
        Self {
            first_pixel,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            sum_x: 0,
            sum_y: 0,
            area: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.area += 1;
    }

    fn into_detection(self, frame_index: u64) -> Detection {
        let bbox = BoundingBox::new(
            self.min_x as f32,
            self.min_y as f32,
            (self.max_x - self.min_x + 1) as f32,
            (self.max_y - self.min_y + 1) as f32,
        );
        let area = self.area as f64;
        let centroid = (
            (self.sum_x as f64 / area) as f32,
            (self.sum_y as f64 / area) as f32,
        );
        Detection::new(frame_index, bbox, centroid, self.area)
    }
}

pub struct BlobExtractor {
    min_area: u32,
    confidence_threshold: f32,
    morphology_radius: u8,
}

impl BlobExtractor {
    pub fn new(min_area: u32, confidence_threshold: f32, morphology_radius: u8) -> Self {
        Self {
            min_area,
            confidence_threshold,
            morphology_radius,
        }
    }

    /// Detections for one mask, in raster order of each component's first
    /// pixel.
    pub fn extract(&self, mask: &ForegroundMask) -> Vec<Detection> {
        let candidates = self.candidates(mask);
        let total = candidates.len();
        let detections: Vec<Detection> = candidates
            .into_iter()
            .filter(|det| det.confidence >= self.confidence_threshold)
            .collect();
        if detections.len() < total {
            log::debug!(
                "frame {}: {} of {} blobs below detection threshold {}",
                mask.frame_index(),
                total - detections.len(),
                total,
                self.confidence_threshold
            );
        }
        detections
    }

    /// Components passing the area filter, before the confidence filter.
    pub fn candidates(&self, mask: &ForegroundMask) -> Vec<Detection> {
        if mask.is_empty() {
            return Vec::new();
        }
        let mut image = mask.to_gray_image();
        if self.morphology_radius > 0 {
            image = open(&image, Norm::LInf, self.morphology_radius);
            image = close(&image, Norm::LInf, self.morphology_radius);
        }

        let labels = connected_components(&image, Connectivity::Eight, Luma([0u8]));
        let mut stats: Vec<Option<ComponentStats>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0] as usize;
            if label == 0 {
                continue;
            }
            if stats.len() < label {
                stats.resize(label, None);
            }
            let pixel = (y * labels.width() + x) as usize;
            stats[label - 1]
                .get_or_insert_with(|| ComponentStats::new(pixel, x, y))
                .add(x, y);
        }

        let mut components: Vec<ComponentStats> = stats
            .into_iter()
            .flatten()
            .filter(|c| c.area >= self.min_area)
            .collect();
        components.sort_by_key(|c| c.first_pixel);
        components
            .into_iter()
            .map(|c| c.into_detection(mask.frame_index()))
            .collect()
    }
}
