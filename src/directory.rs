use crate::error::Error;
use crate::layout::{CHECKSUM_OFFSET, Layout, MAGIC_OFFSET};
use crate::platform::Platform;
use crate::raw::{
    CHECKSUM_SIZE, FormatMarker, FormatState, HEADER_RECORD_SIZE, ImageHeader, MAGIC_NUMBER,
    MAGIC_SIZE, Slot, calculate_checksum,
};
use alloc::vec;
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::trace;
#[cfg(feature = "defmt")]
use defmt::warn;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct SlotIndex(pub(crate) usize);

impl From<SlotIndex> for usize {
    fn from(val: SlotIndex) -> Self {
        val.0
    }
}

/// Slot and data address picked for an image that has not been written yet.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct Allocation {
    pub(crate) slot: SlotIndex,
    pub(crate) address: u32,
}

/// In-memory mirror of the header table. Owns every mutation of the table; the device copy is
/// only ever replaced as a whole by `persist`.
#[cfg_attr(feature = "debug-logs", derive(Debug))]
pub(crate) struct Directory {
    layout: Layout,
    slots: Vec<Slot>,
}

impl Directory {
    pub(crate) fn empty(layout: Layout) -> Self {
        Self {
            layout,
            slots: vec![Slot::Empty; layout.max_images() as usize],
        }
    }

    /// Writes an empty header table followed by the format marker.
    pub(crate) fn format<T: Platform>(hal: &mut T, layout: Layout) -> Result<Self, Error> {
        #[cfg(feature = "defmt")]
        trace!("format: {} slots", layout.max_images());

        #[cfg(feature = "debug-logs")]
        println!("  directory: format {layout:?}");

        let directory = Self::empty(layout);
        directory.persist(hal)?;

        // the magic goes last, an interrupted format must not look like a formatted device
        hal.write(MAGIC_OFFSET, &MAGIC_NUMBER.to_le_bytes())
            .map_err(|_| Error::StorageError)?;

        Ok(directory)
    }

    /// Checks the format marker, reads the header area and verifies it against the stored
    /// checksum before decoding it.
    pub(crate) fn load<T: Platform>(hal: &mut T, layout: Layout) -> Result<Self, Error> {
        #[cfg(feature = "defmt")]
        trace!("load: @{:#08x}[{}]", layout.header_area_start(), layout.header_area_size());

        let mut buf = [0u8; MAGIC_SIZE + CHECKSUM_SIZE];
        hal.read(MAGIC_OFFSET, &mut buf)
            .map_err(|_| Error::StorageError)?;
        let marker = FormatMarker::decode(&buf);

        match marker.state() {
            FormatState::Formatted => {}
            state => {
                #[cfg(feature = "defmt")]
                warn!("load: device not formatted, magic: {:#08x}", marker.magic);
                return Err(Error::NotFormatted(state));
            }
        }

        let mut header_area = vec![0u8; layout.header_area_size() as usize];
        hal.read(layout.header_area_start(), &mut header_area)
            .map_err(|_| Error::StorageError)?;

        if calculate_checksum(T::crc32, &header_area) != marker.checksum {
            #[cfg(feature = "defmt")]
            warn!("load: header checksum mismatch");
            return Err(Error::ChecksumMismatch);
        }

        let slots = header_area
            .chunks_exact(HEADER_RECORD_SIZE)
            .map(|chunk| {
                // chunks_exact guarantees the length
                let mut raw = [0u8; HEADER_RECORD_SIZE];
                raw.copy_from_slice(chunk);
                Slot::decode(&raw)
            })
            .collect::<Vec<_>>();

        #[cfg(feature = "debug-logs")]
        println!(
            "  directory: loaded {} occupied slots",
            slots.iter().filter(|slot| !slot.is_empty()).count()
        );

        Ok(Self { layout, slots })
    }

    /// Rewrites the checksum and the complete header table in a single transport write.
    pub(crate) fn persist<T: Platform>(&self, hal: &mut T) -> Result<(), Error> {
        let mut buf = vec![0u8; CHECKSUM_SIZE + self.layout.header_area_size() as usize];
        let (checksum, header_area) = buf.split_at_mut(CHECKSUM_SIZE);
        for (raw, slot) in header_area
            .chunks_exact_mut(HEADER_RECORD_SIZE)
            .zip(self.slots.iter())
        {
            raw.copy_from_slice(&slot.encode());
        }
        checksum.copy_from_slice(&calculate_checksum(T::crc32, header_area).to_le_bytes());

        #[cfg(feature = "defmt")]
        trace!("persist: @{:#08x}[{}]", CHECKSUM_OFFSET, buf.len());

        #[cfg(feature = "debug-logs")]
        println!("  directory: persist {} bytes", buf.len());

        hal.write(CHECKSUM_OFFSET, &buf)
            .map_err(|_| Error::StorageError)
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn occupied(&self) -> impl Iterator<Item = &ImageHeader> {
        self.slots.iter().filter_map(Slot::occupied)
    }

    /// First slot holding `id`. Ids are unique as long as the table was written by this crate.
    pub(crate) fn find(&self, id: u16) -> Option<(SlotIndex, &ImageHeader)> {
        self.slots
            .iter()
            .enumerate()
            .find_map(|(idx, slot)| match slot.occupied() {
                Some(header) if header.id == id => Some((SlotIndex(idx), header)),
                _ => None,
            })
    }

    /// Lowest unused slot index.
    pub(crate) fn find_free_header_slot(&self) -> Option<SlotIndex> {
        self.slots.iter().position(Slot::is_empty).map(SlotIndex)
    }

    /// Walks the data area granule by granule and returns the first granule start that no
    /// occupied record points at and that leaves room for `required_size` bytes before the end of
    /// the device. Only exact address matches count as collisions, so a granule is never shared.
    /// Candidates always start inside the device, even for zero sized images.
    pub(crate) fn find_free_data_space(&self, required_size: u32) -> Option<u32> {
        let eeprom_size = self.layout.eeprom_size();
        let mut address = self.layout.data_area_start();

        while address < eeprom_size && address.checked_add(required_size)? <= eeprom_size {
            if !self.occupied().any(|header| header.address == address) {
                return Some(address);
            }
            address = address.checked_add(self.layout.max_image_size())?;
        }

        None
    }

    /// Picks a slot and a granule for an image. The table is left untouched until `commit`.
    pub(crate) fn allocate(&self, width: u16, height: u16) -> Result<Allocation, Error> {
        let size = width as u32 * height as u32;
        if size > self.layout.max_image_size() {
            return Err(Error::SizeExceeded);
        }

        let slot = self
            .find_free_header_slot()
            .ok_or(Error::HeaderTableFull)?;
        let address = self
            .find_free_data_space(size)
            .ok_or(Error::OutOfSpace)?;

        #[cfg(feature = "debug-logs")]
        println!("  directory: allocate slot {} @{address:#08x}", slot.0);

        Ok(Allocation { slot, address })
    }

    /// Stores `header` in the allocated slot, empties `replaced` and persists the table. On a
    /// failed persist the in-memory table is restored, so it keeps describing the last committed
    /// state.
    pub(crate) fn commit<T: Platform>(
        &mut self,
        hal: &mut T,
        allocation: Allocation,
        header: ImageHeader,
        replaced: Option<SlotIndex>,
    ) -> Result<(), Error> {
        let slot: usize = allocation.slot.into();
        let previous = replaced.map(|idx| (idx, self.slots[idx.0]));

        self.slots[slot] = Slot::Occupied(header);
        if let Some((idx, _)) = previous {
            self.slots[idx.0] = Slot::Empty;
        }

        match self.persist(hal) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.slots[slot] = Slot::Empty;
                if let Some((idx, old)) = previous {
                    self.slots[idx.0] = old;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(id: u16, address: u32) -> Slot {
        Slot::Occupied(ImageHeader {
            id,
            width: 1,
            height: 1,
            address,
        })
    }

    fn directory() -> Directory {
        // data area starts at 105, four full granules and a truncated one of 96 bytes
        Directory::empty(Layout::new(105 + 4 * 256 + 96, 8, 256).unwrap())
    }

    #[test]
    fn lowest_free_slot_wins() {
        let mut directory = directory();
        assert_eq!(directory.find_free_header_slot(), Some(SlotIndex(0)));

        directory.slots[0] = occupied(1, 105);
        directory.slots[1] = occupied(2, 361);
        directory.slots[3] = occupied(3, 617);
        assert_eq!(directory.find_free_header_slot(), Some(SlotIndex(2)));

        directory.slots.iter_mut().for_each(|slot| *slot = occupied(4, 0));
        assert_eq!(directory.find_free_header_slot(), None);
    }

    #[test]
    fn exact_address_collisions_only() {
        let mut directory = directory();
        assert_eq!(directory.find_free_data_space(1), Some(105));

        directory.slots[5] = occupied(1, 105);
        assert_eq!(directory.find_free_data_space(1), Some(361));

        // a record off the granule grid doesn't block the granule it overlaps
        directory.slots[6] = occupied(2, 362);
        assert_eq!(directory.find_free_data_space(1), Some(361));
    }

    #[test]
    fn truncated_last_granule() {
        let mut directory = directory();
        for (idx, address) in [105, 361, 617, 873].into_iter().enumerate() {
            directory.slots[idx] = occupied(idx as u16 + 1, address);
        }

        assert_eq!(directory.find_free_data_space(96), Some(1129));
        assert_eq!(directory.find_free_data_space(97), None);
    }

    #[test]
    fn zero_size_stays_inside_the_device() {
        // data area ends exactly on a granule boundary
        let mut directory = Directory::empty(Layout::new(105 + 256, 8, 256).unwrap());
        assert_eq!(directory.find_free_data_space(0), Some(105));

        directory.slots[0] = occupied(1, 105);
        assert_eq!(directory.find_free_data_space(0), None);
        assert_eq!(directory.allocate(0, 0), Err(Error::OutOfSpace));
    }

    #[test]
    fn allocate_leaves_table_untouched() {
        let directory = directory();

        assert_eq!(directory.allocate(16, 17), Err(Error::SizeExceeded));
        assert_eq!(
            directory.allocate(16, 16),
            Ok(Allocation {
                slot: SlotIndex(0),
                address: 105
            })
        );
        assert!(directory.slots().iter().all(Slot::is_empty));
    }

    #[test]
    fn find_first_match() {
        let mut directory = directory();
        directory.slots[2] = occupied(9, 105);
        directory.slots[4] = occupied(9, 361);

        let (idx, header) = directory.find(9).unwrap();
        assert_eq!(idx, SlotIndex(2));
        assert_eq!(header.address, 105);
        assert!(directory.find(10).is_none());
    }
}
