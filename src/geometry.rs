/// Derives the patient-space geometry of each output slice.
///
/// Implementations receive the slice location computed by the synthesizer and
/// return the values written to Image Position (Patient) and Image
/// Orientation (Patient).
pub trait GeometryPolicy {
    /// Row direction cosines followed by column direction cosines
    fn orientation(&self) -> [f64; 6];

    fn position(&self, slice_location: f64) -> [f64; 3];
}

/// Axial identity orientation with a fixed in-plane position.
///
/// Does not look at the source volume's transform, so the output is only
/// spatially correct for volumes that are already axial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaceholderGeometry {
    pub x: f64,
    pub y: f64,
}

impl Default for PlaceholderGeometry {
    fn default() -> Self {
        Self { x: -1.0, y: -1.0 }
    }
}

impl GeometryPolicy for PlaceholderGeometry {
    fn orientation(&self) -> [f64; 6] {
        [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
    }

    fn position(&self, slice_location: f64) -> [f64; 3] {
        [self.x, self.y, slice_location]
    }
}
