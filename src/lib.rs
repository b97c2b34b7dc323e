#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

mod directory;
pub mod error;
pub mod layout;
pub mod platform;
mod raw;

pub use layout::Layout;
pub use raw::{FormatState, ImageHeader};

extern crate alloc;

use crate::directory::Directory;
use crate::error::Error;
use crate::platform::Platform;
use crate::raw::FreeMarker;
use alloc::vec;
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::trace;

/// An image as returned by [`ImageStore::read_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u16,
    pub height: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStatistics {
    pub slots: SlotStatistics,
    pub granules: GranuleStatistics,
    /// Sum of width * height over all committed images
    pub bytes_used: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotStatistics {
    pub used: u16,
    pub free: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GranuleStatistics {
    pub used: u32,
    pub free: u32,
}

/// The ImageStore keeps the complete header table in memory and owns the storage transport.
/// Every image occupies one header slot and one granule of `max_image_size` bytes in the data area.
pub struct ImageStore<T: Platform> {
    pub(crate) hal: T,
    pub(crate) directory: Directory,
}

impl<T: Platform> ImageStore<T> {
    /// Formats the device: writes an empty header table, its checksum and the format marker.
    /// Existing images become unreachable, their data is not touched.
    pub fn format(mut hal: T, layout: Layout) -> Result<ImageStore<T>, Error> {
        Self::check_capacity(&hal, &layout)?;

        let directory = Directory::format(&mut hal, layout)?;
        Ok(Self { hal, directory })
    }

    /// Opens a formatted device and loads the header table.
    ///
    /// Fails with `NotFormatted` if the format marker is missing and with `ChecksumMismatch` if the
    /// header area was altered or torn by an interrupted write.
    pub fn open(mut hal: T, layout: Layout) -> Result<ImageStore<T>, Error> {
        Self::check_capacity(&hal, &layout)?;

        let directory = Directory::load(&mut hal, layout)?;
        Ok(Self { hal, directory })
    }

    /// Opens the device and formats it first if it is blank. A device carrying a foreign magic
    /// number is not touched and reported as `NotFormatted(Foreign)`, one with a valid marker but
    /// a broken header table as `ChecksumMismatch`.
    pub fn open_or_format(mut hal: T, layout: Layout) -> Result<ImageStore<T>, Error> {
        Self::check_capacity(&hal, &layout)?;

        let directory = match Directory::load(&mut hal, layout) {
            Ok(directory) => directory,
            Err(Error::NotFormatted(FormatState::Blank)) => {
                #[cfg(feature = "defmt")]
                trace!("open_or_format: blank device, formatting");

                Directory::format(&mut hal, layout)?
            }
            Err(e) => return Err(e),
        };
        Ok(Self { hal, directory })
    }

    fn check_capacity(hal: &T, layout: &Layout) -> Result<(), Error> {
        if hal.capacity() < layout.eeprom_size() as usize {
            return Err(Error::InvalidLayout);
        }
        Ok(())
    }

    /// Discards the in-memory header table and loads it from the device again.
    pub fn reload(&mut self) -> Result<(), Error> {
        let layout = *self.directory.layout();
        self.directory = Directory::load(&mut self.hal, layout)?;
        Ok(())
    }

    /// Writes the image data to a free granule and commits its header afterward.
    ///
    /// `data` has to contain exactly `width * height` bytes. Saving an id that already exists
    /// replaces the image: the new data goes to a fresh slot and granule and the old slot is
    /// released with the same header table write, so the old image stays readable until the new
    /// one is committed.
    ///
    /// If the data write fails nothing changes. If the header table write fails `PartialCommit`
    /// is returned, the data is orphaned and the in-memory table still describes the previous
    /// state.
    pub fn save_image(&mut self, id: u16, width: u16, height: u16, data: &[u8]) -> Result<(), Error> {
        if FreeMarker::from_repr(id).is_some() {
            return Err(Error::InvalidId);
        }

        if data.len() != width as usize * height as usize {
            return Err(Error::SizeMismatch);
        }

        let allocation = self.directory.allocate(width, height)?;
        let replaced = self.directory.find(id).map(|(idx, _)| idx);

        #[cfg(feature = "defmt")]
        trace!("save_image: id {} @{:#08x}[{}]", id, allocation.address, data.len());

        #[cfg(feature = "debug-logs")]
        println!(
            "save_image: id {id} {width}x{height} -> slot {} @{:#08x}",
            allocation.slot.0, allocation.address
        );

        if !data.is_empty() {
            self.hal
                .write(allocation.address, data)
                .map_err(|_| Error::StorageError)?;
        }

        let header = ImageHeader {
            id,
            width,
            height,
            address: allocation.address,
        };

        self.directory
            .commit(&mut self.hal, allocation, header, replaced)
            .map_err(|_| Error::PartialCommit {
                address: allocation.address,
            })
    }

    /// Reads an image by id.
    pub fn read_image(&mut self, id: u16) -> Result<Image, Error> {
        let header = self.checked_header(id)?;

        let mut data = vec![0u8; header.size() as usize];
        self.read_data(&header, &mut data)?;

        Ok(Image {
            width: header.width,
            height: header.height,
            data,
        })
    }

    /// Reads an image into `buf` without allocating. Only the first `width * height` bytes of
    /// `buf` are written.
    pub fn read_image_into(&mut self, id: u16, buf: &mut [u8]) -> Result<ImageHeader, Error> {
        let header = self.checked_header(id)?;

        let size = header.size() as usize;
        if buf.len() < size {
            return Err(Error::BufferTooSmall);
        }

        self.read_data(&header, &mut buf[..size])?;

        Ok(header)
    }

    fn checked_header(&self, id: u16) -> Result<ImageHeader, Error> {
        let (_, header) = self.directory.find(id).ok_or(Error::NotFound)?;

        let layout = self.directory.layout();
        let in_bounds = header.size() <= layout.max_image_size()
            && header.address >= layout.data_area_start()
            && header
                .address
                .checked_add(header.size())
                .is_some_and(|end| end <= layout.eeprom_size());
        if !in_bounds {
            return Err(Error::CorruptedData);
        }

        Ok(*header)
    }

    fn read_data(&mut self, header: &ImageHeader, buf: &mut [u8]) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("read_image: id {} @{:#08x}[{}]", header.id, header.address, buf.len());

        if buf.is_empty() {
            return Ok(());
        }

        self.hal
            .read(header.address, buf)
            .map_err(|_| Error::StorageError)
    }

    /// Header of a committed image.
    pub fn header(&self, id: u16) -> Option<ImageHeader> {
        self.directory.find(id).map(|(_, header)| *header)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.directory.find(id).is_some()
    }

    /// All committed images in slot order.
    pub fn images(&self) -> impl Iterator<Item = ImageHeader> + '_ {
        self.directory.occupied().copied()
    }

    /// Returns statistics about slot and data area usage
    pub fn statistics(&self) -> StoreStatistics {
        let layout = self.directory.layout();

        let used_slots = self.directory.occupied().count() as u16;
        let used_granules = (0..layout.granules())
            .map(|granule| layout.granule_address(granule))
            .filter(|&address| {
                self.directory
                    .occupied()
                    .any(|header| header.address == address)
            })
            .count() as u32;

        StoreStatistics {
            slots: SlotStatistics {
                used: used_slots,
                free: self.directory.slots().len() as u16 - used_slots,
            },
            granules: GranuleStatistics {
                used: used_granules,
                free: layout.granules() - used_granules,
            },
            bytes_used: self.directory.occupied().map(ImageHeader::size).sum(),
        }
    }

    pub fn layout(&self) -> &Layout {
        self.directory.layout()
    }

    /// Access to the underlying storage transport.
    pub fn device(&self) -> &T {
        &self.hal
    }

    /// Gives back the storage transport.
    pub fn release(self) -> T {
        self.hal
    }
}
