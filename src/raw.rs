//! Byte exact on-device representation of the format marker and the header records.

use core::fmt::{Debug, Formatter};
use core::mem::{offset_of, size_of};

use crate::platform::FnCrc32;

/// Marks a device formatted by this crate.
pub(crate) const MAGIC_NUMBER: u32 = 0x0207_2025;
pub(crate) const MAGIC_SIZE: usize = size_of::<u32>();
pub(crate) const CHECKSUM_SIZE: usize = size_of::<u32>();

/// id, width, height, 2 bytes padding, address. Same padding a naturally aligned C struct gets.
pub(crate) const HEADER_RECORD_SIZE: usize = 12;

// only describes the record layout, records are encoded field by field
#[allow(dead_code)]
#[repr(C)]
struct RawHeaderRecord {
    id: u16,
    width: u16,
    height: u16,
    _reserved: u16,
    address: u32,
}

const _: () = assert!(
    size_of::<RawHeaderRecord>() == HEADER_RECORD_SIZE,
    "Header record size must match the on-device record size"
);

const ID_OFFSET: usize = offset_of!(RawHeaderRecord, id);
const WIDTH_OFFSET: usize = offset_of!(RawHeaderRecord, width);
const HEIGHT_OFFSET: usize = offset_of!(RawHeaderRecord, height);
const ADDRESS_OFFSET: usize = offset_of!(RawHeaderRecord, address);

/// Ids that mark a header slot as unused. 0xFFFF is the state of an erased EEPROM cell,
/// 0x0000 is what `format` writes.
#[derive(strum::FromRepr, Debug, PartialEq, Copy, Clone)]
#[repr(u16)]
pub(crate) enum FreeMarker {
    Zeroed = 0x0000,
    Erased = 0xFFFF,
}

/// Metadata of a single committed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageHeader {
    pub id: u16,
    pub width: u16,
    pub height: u16,
    pub address: u32,
}

impl ImageHeader {
    /// Length of the image data in bytes.
    pub const fn size(&self) -> u32 {
        self.width as u32 * self.height as u32
    }
}

/// A single entry of the header table.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Empty,
    Occupied(ImageHeader),
}

impl Slot {
    pub(crate) fn occupied(&self) -> Option<&ImageHeader> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(header) => Some(header),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub(crate) fn decode(raw: &[u8; HEADER_RECORD_SIZE]) -> Self {
        let id = u16::from_le_bytes([raw[ID_OFFSET], raw[ID_OFFSET + 1]]);
        if FreeMarker::from_repr(id).is_some() {
            return Slot::Empty;
        }

        Slot::Occupied(ImageHeader {
            id,
            width: u16::from_le_bytes([raw[WIDTH_OFFSET], raw[WIDTH_OFFSET + 1]]),
            height: u16::from_le_bytes([raw[HEIGHT_OFFSET], raw[HEIGHT_OFFSET + 1]]),
            address: u32::from_le_bytes([
                raw[ADDRESS_OFFSET],
                raw[ADDRESS_OFFSET + 1],
                raw[ADDRESS_OFFSET + 2],
                raw[ADDRESS_OFFSET + 3],
            ]),
        })
    }

    /// Empty slots are written as all zeros.
    pub(crate) fn encode(&self) -> [u8; HEADER_RECORD_SIZE] {
        let mut raw = [0u8; HEADER_RECORD_SIZE];
        if let Slot::Occupied(header) = self {
            raw[ID_OFFSET..ID_OFFSET + 2].copy_from_slice(&header.id.to_le_bytes());
            raw[WIDTH_OFFSET..WIDTH_OFFSET + 2].copy_from_slice(&header.width.to_le_bytes());
            raw[HEIGHT_OFFSET..HEIGHT_OFFSET + 2].copy_from_slice(&header.height.to_le_bytes());
            raw[ADDRESS_OFFSET..ADDRESS_OFFSET + 4].copy_from_slice(&header.address.to_le_bytes());
        }
        raw
    }
}

impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Slot::Empty => f.write_str("Slot::Empty"),
            Slot::Occupied(h) => f.write_fmt(format_args!(
                "Slot {{ id: {:>5}, dim: {:>3}x{:<3}, address: 0x{:0>8x} }}",
                h.id, h.width, h.height, h.address
            )),
        }
    }
}

/// What the first eight bytes of the device tell about it.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatState {
    /// Magic number present
    Formatted,
    /// All marker bytes read as 0xFF or 0x00, the device was never formatted
    Blank,
    /// Some other magic number, the device belongs to someone else
    Foreign,
}

pub(crate) struct FormatMarker {
    pub(crate) magic: u32,
    pub(crate) checksum: u32,
}

impl FormatMarker {
    pub(crate) fn decode(raw: &[u8; MAGIC_SIZE + CHECKSUM_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            checksum: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    pub(crate) fn state(&self) -> FormatState {
        match self.magic {
            MAGIC_NUMBER => FormatState::Formatted,
            u32::MAX | 0 => FormatState::Blank,
            _ => FormatState::Foreign,
        }
    }
}

/// CRC32 over the encoded header area.
pub(crate) fn calculate_checksum(crc32: FnCrc32, header_area: &[u8]) -> u32 {
    crc32(u32::MAX, header_area)
}
