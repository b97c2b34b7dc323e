use crate::error::Error;
use crate::raw::{CHECKSUM_SIZE, HEADER_RECORD_SIZE, MAGIC_SIZE};

pub(crate) const MAGIC_OFFSET: u32 = 0;
pub(crate) const CHECKSUM_OFFSET: u32 = MAGIC_OFFSET + MAGIC_SIZE as u32;
pub(crate) const HEADER_AREA_START: u32 = CHECKSUM_OFFSET + CHECKSUM_SIZE as u32;

/// Describes where everything lives on the device. All offsets are derived from the three
/// parameters, so writer and reader can't drift apart as long as they share a `Layout`.
///
/// ```text
/// 0x0000  magic      u32
/// 0x0004  checksum   u32   CRC32 over the header area
/// 0x0008  header area      max_images * 12 byte records
///         reserved         ceil(max_images / 8) bytes, never accessed
///         data area        granules of max_image_size bytes up to eeprom_size
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    eeprom_size: u32,
    max_images: u16,
    max_image_size: u32,
}

impl Layout {
    /// 4 Mbit M95M04 SPI EEPROM holding up to 64 images of at most 320x240 bytes.
    pub const M95M04: Layout = Layout {
        eeprom_size: 524_288,
        max_images: 64,
        max_image_size: 76_800,
    };

    pub const fn new(eeprom_size: u32, max_images: u16, max_image_size: u32) -> Result<Self, Error> {
        if max_images == 0 || max_image_size == 0 {
            return Err(Error::InvalidLayout);
        }

        let layout = Layout {
            eeprom_size,
            max_images,
            max_image_size,
        };

        // at least one granule has to fit behind the header area
        match layout.data_area_start().checked_add(max_image_size) {
            Some(end) if end <= eeprom_size => Ok(layout),
            _ => Err(Error::InvalidLayout),
        }
    }

    pub const fn eeprom_size(&self) -> u32 {
        self.eeprom_size
    }

    pub const fn max_images(&self) -> u16 {
        self.max_images
    }

    /// Size of a granule, the smallest unit the data area allocator hands out.
    pub const fn max_image_size(&self) -> u32 {
        self.max_image_size
    }

    pub const fn header_record_size(&self) -> u32 {
        HEADER_RECORD_SIZE as u32
    }

    pub const fn header_area_start(&self) -> u32 {
        HEADER_AREA_START
    }

    pub const fn header_area_size(&self) -> u32 {
        self.max_images as u32 * HEADER_RECORD_SIZE as u32
    }

    pub const fn header_area_end(&self) -> u32 {
        HEADER_AREA_START + self.header_area_size()
    }

    /// The reserved `ceil(max_images / 8)` bytes are kept for compatibility with existing devices.
    pub const fn data_area_start(&self) -> u32 {
        self.header_area_end() + (self.max_images as u32).div_ceil(8)
    }

    /// Number of granules in the data area. The last one may be truncated by the end of the
    /// device and then only accepts images that still fit.
    pub const fn granules(&self) -> u32 {
        (self.eeprom_size - self.data_area_start()).div_ceil(self.max_image_size)
    }

    pub(crate) const fn granule_address(&self, granule: u32) -> u32 {
        self.data_area_start() + granule * self.max_image_size
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::M95M04
    }
}
