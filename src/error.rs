use thiserror::Error;

pub use crate::raw::FormatState;

/// Errors that can occur while operating the image store. Marked as non-exhaustive to allow for
/// future additions. A caller usually only needs to handle `NotFound`, `HeaderTableFull` and
/// `OutOfSpace` at runtime, the remaining variants point at a broken device or a caller bug.
#[derive(Error, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The layout does not fit the device or leaves no room for a single granule
    #[error("invalid layout")]
    InvalidLayout,

    /// Ids 0x0000 and 0xFFFF mark empty slots and can't be used for images
    #[error("invalid image id")]
    InvalidId,

    /// width * height is larger than a single granule (`max_image_size`)
    #[error("image size exceeded")]
    SizeExceeded,

    /// The supplied buffer length disagrees with width * height
    #[error("size mismatch")]
    SizeMismatch,

    /// Every slot of the header table is occupied
    #[error("header table full")]
    HeaderTableFull,

    /// No free granule is left in the data area
    #[error("out of space")]
    OutOfSpace,

    /// The internal error value is returned from the provided storage transport
    #[error("internal storage error")]
    StorageError,

    /// No committed image carries the requested id
    #[error("image not found")]
    NotFound,

    /// The image data has been written to `address` but the header table could not be persisted.
    /// The data is orphaned; the in-memory table was rolled back and the header area on the device
    /// may be stale or torn. `reload` reports which.
    #[error("partial commit, orphaned data at {address:#08x}")]
    PartialCommit { address: u32 },

    /// The format marker at the start of the device is missing
    #[error("device not formatted: {0}")]
    NotFormatted(FormatState),

    /// The header area doesn't match the checksum stored next to the format marker
    #[error("header checksum mismatch")]
    ChecksumMismatch,

    /// The destination buffer can't hold width * height bytes
    #[error("buffer too small")]
    BufferTooSmall,

    /// A header record points outside of the data area
    #[error("corrupted data")]
    CorruptedData,
}
