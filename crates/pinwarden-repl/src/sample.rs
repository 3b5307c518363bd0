//! Circular sampling of directory indices.

use rand::Rng;

/// A contiguous circular range of directory indices,
/// `[offset, offset + width) mod directory_size`.
///
/// The width is clamped to the directory size so a window never repeats an
/// index, and an empty directory yields an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    offset: u64,
    width: u64,
    directory_size: u64,
}

impl SampleWindow {
    /// Window of `width` indices starting at `offset`.
    pub fn new(offset: u64, width: u64, directory_size: u64) -> Self {
        if directory_size == 0 {
            return Self {
                offset: 0,
                width: 0,
                directory_size: 0,
            };
        }
        Self {
            offset: offset % directory_size,
            width: width.min(directory_size),
            directory_size,
        }
    }

    /// Window with an offset drawn uniformly from `[0, directory_size)`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, width: u64, directory_size: u64) -> Self {
        let offset = if directory_size == 0 {
            0
        } else {
            rng.gen_range(0..directory_size)
        };
        Self::new(offset, width, directory_size)
    }

    /// First index of the window.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Directory size the window was computed against.
    pub fn directory_size(&self) -> u64 {
        self.directory_size
    }

    /// Number of indices in the window.
    pub fn len(&self) -> usize {
        self.width as usize
    }

    /// True when the window holds no indices.
    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    /// The `k`-th index of the window, wrapping past the end of the directory.
    pub fn index_at(&self, k: u64) -> Option<u64> {
        if k >= self.width {
            return None;
        }
        let room = self.directory_size - self.offset;
        Some(if k < room { self.offset + k } else { k - room })
    }

    /// Iterate over the window's indices in sampling order.
    pub fn indices(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.width).filter_map(move |k| self.index_at(k))
    }
}
