//! Pixel validity masks for interferogram analysis.
//!
//! A [`Mask`] marks which pixels of a frame take part in the analysis (`true`
//! = valid). Masked pixels become NaN in every downstream product and never
//! contribute to fits, normalisations or statistics.
//!
//! # Key Features
//!
//! - **Shape constructors**: circular, elliptic, rectangular and polygonal apertures
//! - **Mask sets**: several stored masks with selection and inversion flags,
//!   combined by union into the analysis mask
//! - **Bounding boxes**: crop frames and masks to the valid region
//! - **Policies**: [`MaskPolicy`] states explicitly where validity comes from
//!
//! # Examples
//!
//! ```rust
//! use interferometry::grid::ImageSize;
//! use interferometry::mask::{Mask, MaskKind, MaskSet};
//!
//! let size = ImageSize::from_width_height(64, 64);
//! let mut set = MaskSet::new();
//! set.add(Mask::circular(size, 31.5, 31.5, 20.0), MaskKind::Circular);
//! set.add(Mask::circular(size, 31.5, 31.5, 5.0), MaskKind::Circular);
//! set.invert(1, true);
//!
//! // Union of the disk and everything outside the small disk
//! let combined = set.combined().unwrap().unwrap();
//! assert_eq!(combined.count(), size.pixel_count());
//! ```

use log::debug;
use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, MetrologyError, Result};
use crate::grid::ImageSize;

/// Boolean validity map, `true` marks a pixel used by the analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    valid: Array2<bool>,
}

impl Mask {
    pub fn new(valid: Array2<bool>) -> Self {
        Self { valid }
    }

    /// Every pixel valid.
    pub fn all_valid(size: ImageSize) -> Self {
        Self::new(Array2::from_elem(size.shape(), true))
    }

    /// Valid where `values > threshold`, the usual encoding of stored masks.
    pub fn from_threshold(values: &Array2<f64>, threshold: f64) -> Self {
        Self::new(values.mapv(|v| v > threshold))
    }

    /// Valid where `values` is finite (NaN-coded validity).
    pub fn from_finite(values: &Array2<f64>) -> Self {
        Self::new(values.mapv(f64::is_finite))
    }

    /// Disk of `radius` pixels around the pixel position `(center_x, center_y)`.
    pub fn circular(size: ImageSize, center_x: f64, center_y: f64, radius: f64) -> Self {
        let r2 = radius * radius;
        Self::new(Array2::from_shape_fn(size.shape(), |(i, j)| {
            let dx = j as f64 - center_x;
            let dy = i as f64 - center_y;
            dx * dx + dy * dy <= r2
        }))
    }

    /// Ellipse in normalised pupil coordinates (`x`, `y` in `[-1, 1]`).
    ///
    /// # Arguments
    /// * `cx`, `cy` - Ellipse centre
    /// * `a`, `b` - Semi-axes along x and y
    pub fn elliptic(size: ImageSize, cx: f64, cy: f64, a: f64, b: f64) -> Self {
        let (x, y) = size.normalized_coordinates();
        let mut valid = Array2::from_elem(size.shape(), false);
        Zip::from(&mut valid).and(&x).and(&y).for_each(|v, &x, &y| {
            *v = (x - cx).powi(2) / (a * a) + (y - cy).powi(2) / (b * b) < 1.0;
        });
        Self::new(valid)
    }

    /// Unit disk of the normalised pupil grid.
    pub fn unit_disk(size: ImageSize) -> Self {
        let (x, y) = size.normalized_coordinates();
        let mut valid = Array2::from_elem(size.shape(), false);
        Zip::from(&mut valid)
            .and(&x)
            .and(&y)
            .for_each(|v, &x, &y| *v = x * x + y * y <= 1.0);
        Self::new(valid)
    }

    /// Axis-aligned rectangle (inclusive bounds, clipped to the frame).
    pub fn rectangular(size: ImageSize, region: BoundingBox) -> Self {
        Self::new(Array2::from_shape_fn(size.shape(), |(i, j)| {
            region.contains(i, j)
        }))
    }

    /// Polygon given by `(x, y)` pixel vertices, filled with the even-odd rule
    /// evaluated at pixel centres.
    pub fn polygon(size: ImageSize, vertices: &[(f64, f64)]) -> Self {
        Self::new(Array2::from_shape_fn(size.shape(), |(i, j)| {
            point_in_polygon(j as f64, i as f64, vertices)
        }))
    }

    pub fn valid(&self) -> &Array2<bool> {
        &self.valid
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::of(&self.valid)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.valid.dim()
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }

    /// Number of valid pixels
    pub fn count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.valid.iter().any(|&v| v)
    }

    pub fn inverted(&self) -> Self {
        Self::new(self.valid.mapv(|v| !v))
    }

    /// Pixel-wise OR of two masks of the same shape.
    pub fn union(&self, other: &Mask) -> Result<Self> {
        ensure_shape("mask union", self.shape(), other.shape())?;
        let mut valid = self.valid.clone();
        Zip::from(&mut valid)
            .and(&other.valid)
            .for_each(|a, &b| *a = *a || b);
        Ok(Self::new(valid))
    }

    /// Pixel-wise AND of two masks of the same shape.
    pub fn intersection(&self, other: &Mask) -> Result<Self> {
        ensure_shape("mask intersection", self.shape(), other.shape())?;
        let mut valid = self.valid.clone();
        Zip::from(&mut valid)
            .and(&other.valid)
            .for_each(|a, &b| *a = *a && b);
        Ok(Self::new(valid))
    }

    /// Smallest box containing every valid pixel, `None` for an empty mask.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        for ((i, j), &v) in self.valid.indexed_iter() {
            if !v {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox::from_coords(i, j, i, j),
                Some(b) => BoundingBox::from_coords(
                    b.min_row.min(i),
                    b.min_col.min(j),
                    b.max_row.max(i),
                    b.max_col.max(j),
                ),
            });
        }
        bbox
    }

    pub fn crop(&self, region: &BoundingBox) -> Self {
        Self::new(region.crop(&self.valid))
    }

    /// Copy of `values` with NaN at every invalid pixel.
    pub fn apply(&self, values: &Array2<f64>) -> Result<Array2<f64>> {
        ensure_shape("masked values", self.shape(), values.dim())?;
        let mut out = values.clone();
        Zip::from(&mut out)
            .and(&self.valid)
            .for_each(|v, &ok| {
                if !ok {
                    *v = f64::NAN;
                }
            });
        Ok(out)
    }

    /// Mask as 0/1 floats, the pupil amplitude of an aperture.
    pub fn to_amplitude(&self) -> Array2<f64> {
        self.valid.mapv(|v| if v { 1.0 } else { 0.0 })
    }
}

fn point_in_polygon(x: f64, y: f64, vertices: &[(f64, f64)]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Axis-aligned region of a frame with inclusive row/column bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl BoundingBox {
    pub fn from_coords(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::from_width_height(self.width(), self.height())
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.min_row && row <= self.max_row && col >= self.min_col && col <= self.max_col
    }

    /// Copy of the region of `array`, clipped to the array extent.
    pub fn crop<T: Clone>(&self, array: &Array2<T>) -> Array2<T> {
        let (rows, cols) = array.dim();
        let r1 = (self.max_row + 1).min(rows);
        let c1 = (self.max_col + 1).min(cols);
        let r0 = self.min_row.min(r1);
        let c0 = self.min_col.min(c1);
        array.slice(s![r0..r1, c0..c1]).to_owned()
    }
}

/// Geometry tag of a stored mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskKind {
    Other,
    Circular,
    Rectangular,
    Polygon,
}

impl MaskKind {
    /// Short tag used in dataset files
    pub fn tag(&self) -> &'static str {
        match self {
            MaskKind::Other => "other",
            MaskKind::Circular => "circ",
            MaskKind::Rectangular => "rect",
            MaskKind::Polygon => "poly",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "circ" => MaskKind::Circular,
            "rect" => MaskKind::Rectangular,
            "poly" => MaskKind::Polygon,
            _ => MaskKind::Other,
        }
    }

    /// Integer code stored in the `Masks_type` archive entry.
    pub fn code(&self) -> u8 {
        match self {
            MaskKind::Other => 0,
            MaskKind::Circular => 1,
            MaskKind::Rectangular => 2,
            MaskKind::Polygon => 3,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => MaskKind::Circular,
            2 => MaskKind::Rectangular,
            3 => MaskKind::Polygon,
            _ => MaskKind::Other,
        }
    }
}

/// One stored mask and its flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskEntry {
    pub mask: Mask,
    pub kind: MaskKind,
    pub selected: bool,
    pub inverted: bool,
}

impl MaskEntry {
    /// Contribution of this entry to the union, honouring inversion.
    pub fn effective(&self) -> Mask {
        if self.inverted {
            self.mask.inverted()
        } else {
            self.mask.clone()
        }
    }
}

/// Ordered collection of masks combined into one analysis mask.
///
/// The combined mask is the union of every selected entry (each optionally
/// inverted), then optionally inverted as a whole. Indices are 0-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskSet {
    entries: Vec<MaskEntry>,
    global_inverted: bool,
}

impl MaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new mask, selected and not inverted. Returns its index.
    pub fn add(&mut self, mask: Mask, kind: MaskKind) -> usize {
        self.entries.push(MaskEntry {
            mask,
            kind,
            selected: true,
            inverted: false,
        });
        self.entries.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<MaskEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.global_inverted = false;
    }

    pub fn select(&mut self, index: usize, selected: bool) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.selected = selected;
        }
    }

    pub fn invert(&mut self, index: usize, inverted: bool) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.inverted = inverted;
        }
    }

    pub fn invert_global(&mut self, inverted: bool) {
        self.global_inverted = inverted;
    }

    pub fn is_global_inverted(&self) -> bool {
        self.global_inverted
    }

    pub fn get(&self, index: usize) -> Option<&MaskEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[MaskEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combined analysis mask, `None` when no mask is stored.
    ///
    /// Fails with `ShapeMismatch` when a selected entry differs in shape from
    /// the first stored mask.
    pub fn combined(&self) -> Result<Option<Mask>> {
        let Some(first) = self.entries.first() else {
            return Ok(None);
        };
        let mut global = Array2::from_elem(first.mask.shape(), false);
        for entry in self.entries.iter().filter(|e| e.selected) {
            ensure_shape("mask set entry", global.dim(), entry.mask.shape())?;
            let mask = entry.effective();
            Zip::from(&mut global)
                .and(mask.valid())
                .for_each(|g, &m| *g = *g || m);
        }
        if self.global_inverted {
            global.mapv_inplace(|v| !v);
        }
        Ok(Some(Mask::new(global)))
    }

    /// Combined mask cropped to its bounding box, with the box used.
    pub fn combined_cropped(&self) -> Result<Option<(Mask, BoundingBox)>> {
        Ok(self.combined()?.and_then(|combined| {
            let bbox = combined.bounding_box()?;
            Some((combined.crop(&bbox), bbox))
        }))
    }
}

/// Where pixel validity comes from for one analysis.
#[derive(Debug, Clone)]
pub enum MaskPolicy {
    /// Every pixel is valid.
    AllValid,
    /// One explicit mask.
    Single(Mask),
    /// Validity encoded as finite values in the frames themselves.
    NanCoded,
    /// Union of the selected entries of a mask set.
    Union(MaskSet),
}

impl MaskPolicy {
    /// Resolve the policy into a concrete mask for `frames`.
    ///
    /// Fails with `ShapeMismatch` when a stored mask does not match the frame
    /// shape and with `EmptyMask` when no pixel survives.
    pub fn resolve(&self, frames: &[Array2<f64>]) -> Result<Mask> {
        let first = frames.first().ok_or_else(|| {
            MetrologyError::InvalidParameter("no frames to build a mask for".to_string())
        })?;
        let shape = first.dim();
        let mask = match self {
            MaskPolicy::AllValid => Mask::all_valid(ImageSize::from(shape)),
            MaskPolicy::Single(mask) => mask.clone(),
            MaskPolicy::NanCoded => {
                let mut valid = Array2::from_elem(shape, true);
                for frame in frames {
                    ensure_shape("NaN-coded frames", shape, frame.dim())?;
                    Zip::from(&mut valid)
                        .and(frame)
                        .for_each(|v, &x| *v = *v && x.is_finite());
                }
                Mask::new(valid)
            }
            MaskPolicy::Union(set) => set.combined()?.ok_or_else(|| {
                MetrologyError::InvalidParameter("mask set is empty".to_string())
            })?,
        };
        ensure_shape("analysis mask", shape, mask.shape())?;
        if mask.is_empty() {
            return Err(MetrologyError::EmptyMask);
        }
        debug!(
            "resolved mask: {} of {} pixels valid",
            mask.count(),
            shape.0 * shape.1
        );
        Ok(mask)
    }
}
