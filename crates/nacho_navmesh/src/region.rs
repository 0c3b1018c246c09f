use thiserror::Error;

/// The id of a region in an [`OpenHeightfield`](crate::OpenHeightfield).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RegionId(pub u16);

impl Default for RegionId {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u16> for RegionId {
    fn from(value: u16) -> Self {
        RegionId(value)
    }
}

impl RegionId {
    /// The null region. Spans that are not part of any region carry this id.
    pub const NONE: Self = Self(0);

    /// Whether this is the null region.
    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// A connected set of open spans sharing a [`RegionId`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    /// The id shared by all spans of the region.
    pub id: RegionId,
    /// Indices of the member spans in [`OpenHeightfield::spans`](crate::OpenHeightfield::spans).
    pub spans: Vec<usize>,
}

/// Hands out fresh, strictly increasing region ids for one partitioning run.
#[derive(Debug, Clone)]
pub struct RegionIdCounter {
    next: u16,
}

impl Default for RegionIdCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl RegionIdCounter {
    /// Returns the next unused id and marks it as used.
    pub fn next_id(&mut self) -> Result<RegionId, RegionBuildError> {
        let id = self.peek_id()?;
        self.next += 1;
        Ok(id)
    }

    /// Returns the id [`RegionIdCounter::next_id`] would hand out, without using it up.
    pub fn peek_id(&self) -> Result<RegionId, RegionBuildError> {
        if self.next == u16::MAX {
            return Err(RegionBuildError::TooManyRegions);
        }
        Ok(RegionId(self.next))
    }

    /// The highest id handed out so far, or [`RegionId::NONE`].
    pub fn last_id(&self) -> RegionId {
        RegionId(self.next - 1)
    }
}

/// Errors that can occur when partitioning an [`OpenHeightfield`](crate::OpenHeightfield) into regions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionBuildError {
    /// Happens when the 16-bit region id space is exhausted.
    #[error("ran out of region ids, at most {max} regions are supported", max = u16::MAX - 1)]
    TooManyRegions,
}
