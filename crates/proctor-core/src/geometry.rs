use serde::Serialize;

/// Axis-aligned detection box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Resolution-independent position of one face in one frame.
///
/// All three fields are fractions of the frame: centre x over width,
/// centre y over height, box area over frame area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceObservation {
    pub center_x: f64,
    pub center_y: f64,
    pub area: f64,
}

impl FaceObservation {
    /// Normalize a pixel box against a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` for a degenerate (zero-sized) frame.
    pub fn from_box(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        let w = bbox.width as f64;
        let h = bbox.height as f64;

        Some(Self {
            center_x: (bbox.x as f64 + w / 2.0) / fw,
            center_y: (bbox.y as f64 + h / 2.0) / fh,
            area: (w * h) / (fw * fh),
        })
    }

    /// Euclidean distance between the two centres, ignoring area.
    pub fn center_distance(&self, other: &FaceObservation) -> f64 {
        let dx = self.center_x - other.center_x;
        let dy = self.center_y - other.center_y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_against_frame() {
        let obs = FaceObservation::from_box(&BoundingBox::new(100, 50, 200, 100), 800, 400)
            .unwrap();
        assert!((obs.center_x - 0.25).abs() < 1e-12);
        assert!((obs.center_y - 0.25).abs() < 1e-12);
        assert!((obs.area - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_zero_sized_frame_rejected() {
        let bbox = BoundingBox::new(0, 0, 10, 10);
        assert!(FaceObservation::from_box(&bbox, 0, 480).is_none());
        assert!(FaceObservation::from_box(&bbox, 640, 0).is_none());
    }

    #[test]
    fn test_center_distance() {
        let a = FaceObservation {
            center_x: 0.1,
            center_y: 0.1,
            area: 0.2,
        };
        let b = FaceObservation {
            center_x: 0.4,
            center_y: 0.5,
            area: 0.9,
        };
        assert!((a.center_distance(&b) - 0.5).abs() < 1e-12);
    }
}
