//! Interferogram archives on disk.
//!
//! A dataset is a NumPy `.npz` archive holding:
//! - `Images`: `H × W × 5k` intensities, `k` acquisitions of five frames
//!   (float64, float32, uint16 or uint8, C or Fortran order)
//! - `Masks` (optional): `H × W × m` masks, bool, uint8 or float (> 0.5 valid);
//!   a 2-D array is read as a single mask
//! - `Masks_type` (optional): `m` uint8 geometry codes (0 other, 1 circ,
//!   2 rect, 3 poly)

use log::{debug, info};
use ndarray::Array2;
use npyz::npz::{NpzArchive, NpzWriter};
use npyz::{DType, NpyFile, Order, TypeChar, WriterBuilder};
use std::io::{Read, Seek, Write};
use std::path::Path;
use thiserror::Error;

use crate::demodulation::{InterferogramSet, FRAMES_PER_SET};
use crate::error::Result;
use crate::grid::ImageSize;
use crate::mask::{Mask, MaskKind, MaskSet};

pub const IMAGES_KEY: &str = "Images";
pub const MASKS_KEY: &str = "Masks";
pub const MASK_TYPES_KEY: &str = "Masks_type";

/// Errors reading or writing interferogram archives.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive has no '{0}' entry")]
    MissingKey(&'static str),

    #[error("'{key}' has unsupported dtype {dtype}")]
    UnsupportedDtype { key: &'static str, dtype: String },

    #[error("'{key}' has unexpected shape {shape:?}")]
    InvalidShape { key: &'static str, shape: Vec<u64> },

    #[error("'Images' holds {frames} frames, not a positive multiple of 5")]
    SetSize { frames: usize },

    #[error("mask of size {found} does not match images of size {expected}")]
    MaskSize { expected: ImageSize, found: ImageSize },
}

/// Interferogram sets sharing one frame size, with their stored masks.
#[derive(Debug, Clone, Default)]
pub struct InterferogramDataset {
    pub sets: Vec<InterferogramSet>,
    pub masks: MaskSet,
}

/// Raw values of an archive entry with its 3-D layout.
struct Volume {
    data: Vec<f64>,
    dims: [usize; 3],
    order: Order,
}

impl Volume {
    fn at(&self, row: usize, col: usize, slice: usize) -> f64 {
        let [h, w, d] = self.dims;
        let index = match self.order {
            Order::C => (row * w + col) * d + slice,
            Order::Fortran => row + h * (col + w * slice),
        };
        self.data[index]
    }

    fn slice(&self, slice: usize) -> Array2<f64> {
        let [h, w, _] = self.dims;
        Array2::from_shape_fn((h, w), |(r, c)| self.at(r, c, slice))
    }
}

fn read_values<R: Read>(
    npy: NpyFile<R>,
    key: &'static str,
) -> std::result::Result<Vec<f64>, DatasetError> {
    let dtype = npy.dtype();
    let unsupported = || DatasetError::UnsupportedDtype {
        key,
        dtype: format!("{dtype:?}"),
    };
    let (type_char, size) = match &dtype {
        DType::Plain(ts) => (ts.type_char(), ts.size_field()),
        _ => return Err(unsupported()),
    };
    let values = match (type_char, size) {
        (TypeChar::Float, 8) => npy.into_vec::<f64>()?,
        (TypeChar::Float, 4) => npy.into_vec::<f32>()?.into_iter().map(f64::from).collect(),
        (TypeChar::Uint, 2) => npy.into_vec::<u16>()?.into_iter().map(f64::from).collect(),
        (TypeChar::Uint, 1) => npy.into_vec::<u8>()?.into_iter().map(f64::from).collect(),
        (TypeChar::Bool, 1) => npy
            .into_vec::<bool>()?
            .into_iter()
            .map(|b| if b { 1.0 } else { 0.0 })
            .collect(),
        _ => return Err(unsupported()),
    };
    Ok(values)
}

fn read_volume<R: Read>(
    npy: NpyFile<R>,
    key: &'static str,
) -> std::result::Result<Volume, DatasetError> {
    let shape = npy.shape().to_vec();
    let order = npy.order();
    let dims = match shape.as_slice() {
        &[h, w] => [h as usize, w as usize, 1],
        &[h, w, d] => [h as usize, w as usize, d as usize],
        _ => {
            return Err(DatasetError::InvalidShape {
                key,
                shape: shape.clone(),
            })
        }
    };
    let data = read_values(npy, key)?;
    Ok(Volume { data, dims, order })
}

pub(crate) fn write_entry<W, T>(
    npz: &mut NpzWriter<W>,
    name: &str,
    shape: &[u64],
    values: impl IntoIterator<Item = T>,
) -> std::io::Result<()>
where
    W: Write + Seek,
    T: npyz::AutoSerialize,
{
    let mut writer = npz
        .array(name, Default::default())?
        .default_dtype()
        .shape(shape)
        .begin_nd()?;
    writer.extend(values)?;
    writer.finish()
}

impl InterferogramDataset {
    /// Group frames into sets of five.
    pub fn from_frames(frames: Vec<Array2<f64>>) -> Result<Self> {
        if frames.is_empty() || frames.len() % FRAMES_PER_SET != 0 {
            return Err(DatasetError::SetSize {
                frames: frames.len(),
            }
            .into());
        }
        let mut sets = Vec::with_capacity(frames.len() / FRAMES_PER_SET);
        let mut frames = frames.into_iter();
        while let Some(first) = frames.next() {
            let rest: Vec<_> = frames.by_ref().take(FRAMES_PER_SET - 1).collect();
            let [b, c, d, e]: [Array2<f64>; 4] = rest
                .try_into()
                .map_err(|v: Vec<_>| DatasetError::SetSize { frames: v.len() + 1 })?;
            sets.push(InterferogramSet::new([first, b, c, d, e])?);
        }
        Ok(Self {
            sets,
            masks: MaskSet::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn set(&self, index: usize) -> Option<&InterferogramSet> {
        self.sets.get(index)
    }

    /// Frame size shared by every set, `None` for an empty dataset.
    pub fn size(&self) -> Option<ImageSize> {
        self.sets.first().map(|s| s.size())
    }

    /// Load an archive written by the acquisition software or [`Self::save_npz`].
    pub fn load_npz(path: &Path) -> Result<Self> {
        let (images, masks, kinds) = read_archive(path)?;
        let [h, w, depth] = images.dims;
        if depth == 0 || depth % FRAMES_PER_SET != 0 {
            return Err(DatasetError::SetSize { frames: depth }.into());
        }
        let size = ImageSize::from((h, w));
        let sets = (0..depth / FRAMES_PER_SET)
            .map(|k| {
                InterferogramSet::new(std::array::from_fn(|i| {
                    images.slice(k * FRAMES_PER_SET + i)
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut mask_set = MaskSet::new();
        if let Some(volume) = masks {
            let found = ImageSize::from((volume.dims[0], volume.dims[1]));
            if found != size {
                return Err(DatasetError::MaskSize {
                    expected: size,
                    found,
                }
                .into());
            }
            for m in 0..volume.dims[2] {
                let valid = volume.slice(m).mapv(|v| v > 0.5);
                let kind = kinds.get(m).copied().unwrap_or(MaskKind::Other);
                mask_set.add(Mask::new(valid), kind);
            }
        }

        info!(
            "loaded {} interferogram sets of {} and {} masks from {}",
            sets.len(),
            size,
            mask_set.len(),
            path.display()
        );
        Ok(Self {
            sets,
            masks: mask_set,
        })
    }

    /// Write every set and mask, in C order, float64 images and uint8 masks.
    pub fn save_npz(&self, path: &Path) -> Result<()> {
        let size = self.size().ok_or(DatasetError::SetSize { frames: 0 })?;
        write_archive(self, size, path)?;
        debug!("wrote {} sets to {}", self.sets.len(), path.display());
        Ok(())
    }
}

/// Entries of an archive: images, optional masks and their kinds.
fn read_archive(
    path: &Path,
) -> std::result::Result<(Volume, Option<Volume>, Vec<MaskKind>), DatasetError> {
    let mut npz = NpzArchive::open(path)?;
    let images = npz
        .by_name(IMAGES_KEY)?
        .ok_or(DatasetError::MissingKey(IMAGES_KEY))?;
    let images = read_volume(images, IMAGES_KEY)?;
    let masks = match npz.by_name(MASKS_KEY)? {
        Some(entry) => Some(read_volume(entry, MASKS_KEY)?),
        None => None,
    };
    let kinds = match npz.by_name(MASK_TYPES_KEY)? {
        Some(entry) => read_values(entry, MASK_TYPES_KEY)?
            .into_iter()
            .map(|code| MaskKind::from_code(code as u8))
            .collect(),
        None => Vec::new(),
    };
    Ok((images, masks, kinds))
}

fn write_archive(
    dataset: &InterferogramDataset,
    size: ImageSize,
    path: &Path,
) -> std::result::Result<(), DatasetError> {
    let (h, w) = size.shape();
    let depth = dataset.sets.len() * FRAMES_PER_SET;
    let frames: Vec<&Array2<f64>> = dataset.sets.iter().flat_map(|s| s.frames().iter()).collect();

    let mut npz = NpzWriter::create(path)?;
    write_entry(
        &mut npz,
        IMAGES_KEY,
        &[h as u64, w as u64, depth as u64],
        (0..h).flat_map(|r| {
            let frames = &frames;
            (0..w).flat_map(move |c| frames.iter().map(move |f| f[[r, c]]))
        }),
    )?;

    let masks: Vec<&Mask> = dataset.masks.entries().iter().map(|e| &e.mask).collect();
    if !masks.is_empty() {
        if let Some(bad) = masks.iter().find(|m| m.size() != size) {
            return Err(DatasetError::MaskSize {
                expected: size,
                found: bad.size(),
            });
        }
        write_entry(
            &mut npz,
            MASKS_KEY,
            &[h as u64, w as u64, masks.len() as u64],
            (0..h).flat_map(|r| {
                let masks = &masks;
                (0..w).flat_map(move |c| masks.iter().map(move |m| m.is_valid(r, c) as u8))
            }),
        )?;
        write_entry(
            &mut npz,
            MASK_TYPES_KEY,
            &[masks.len() as u64],
            dataset.masks.entries().iter().map(|e| e.kind.code()),
        )?;
    }
    Ok(())
}
