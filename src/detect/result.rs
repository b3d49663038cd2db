use serde::Serialize;

/// Axis-aligned box in pixel coordinates (top-left origin).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Same size, re-centred on `(cx, cy)`.
    pub fn centered_at(&self, cx: f32, cy: f32) -> Self {
        Self {
            x: cx - self.w / 2.0,
            y: cy - self.h / 2.0,
            ..*self
        }
    }
}

/// One connected foreground component on one frame. Detections carry no
/// identity across frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub frame_index: u64,
    pub bbox: BoundingBox,
    /// Mean position of the component's pixels.
    pub centroid: (f32, f32),
    /// Foreground pixel count.
    pub area: u32,
    /// Fraction of the bounding box covered by the component (0..=1).
    pub confidence: f32,
}

impl Detection {
    pub fn new(frame_index: u64, bbox: BoundingBox, centroid: (f32, f32), area: u32) -> Self {
        let box_area = bbox.area();
        let confidence = if box_area > 0.0 {
            (area as f32 / box_area).min(1.0)
        } else {
            0.0
        };
        Self {
            frame_index,
            bbox,
            centroid,
            area,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_box_fill_ratio() {
        let det = Detection::new(0, BoundingBox::new(0.0, 0.0, 4.0, 5.0), (2.0, 2.5), 10);
        assert!((det.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn recentering_keeps_size() {
        let bbox = BoundingBox::new(10.0, 10.0, 4.0, 6.0).centered_at(0.0, 0.0);
        assert_eq!(bbox, BoundingBox::new(-2.0, -3.0, 4.0, 6.0));
        assert_eq!(bbox.center(), (0.0, 0.0));
    }
}
