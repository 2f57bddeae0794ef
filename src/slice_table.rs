use ndarray::Array1;

/// Per-instance slice parameters, computed once per run.
///
/// Entries are ordered by slice first and frame second, so entry `k` belongs
/// to slice `k / frames` and frame `k % frames`. Slice locations start at 0
/// and advance by the slice spacing, independent of the volume's origin.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceParameterTable {
    frames: usize,
    slice_indices: Vec<u32>,
    slice_locations: Vec<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceEntry {
    /// Zero based position along the slice axis
    pub z: usize,
    /// Zero based frame
    pub frame: usize,
    /// One based slice index
    pub slice_index: u32,
    pub slice_location: f64,
}

impl SliceParameterTable {
    pub fn new(slices: usize, frames: usize, spacing: f64) -> Self {
        let last = spacing * slices.saturating_sub(1) as f64;
        let locations = Array1::linspace(0.0, last, slices);

        let slice_indices = (1..=slices as u32)
            .flat_map(|index| std::iter::repeat_n(index, frames))
            .collect();
        let slice_locations = locations
            .iter()
            .flat_map(|&location| std::iter::repeat_n(location, frames))
            .collect();

        Self {
            frames,
            slice_indices,
            slice_locations,
        }
    }

    pub fn len(&self) -> usize {
        self.slice_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice_indices.is_empty()
    }

    pub fn slice_indices(&self) -> &[u32] {
        &self.slice_indices
    }

    pub fn slice_locations(&self) -> &[f64] {
        &self.slice_locations
    }

    pub fn get(&self, position: usize) -> Option<SliceEntry> {
        Some(SliceEntry {
            z: position / self.frames,
            frame: position % self.frames,
            slice_index: *self.slice_indices.get(position)?,
            slice_location: *self.slice_locations.get(position)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = SliceEntry> + '_ {
        (0..self.len()).filter_map(|position| self.get(position))
    }
}
