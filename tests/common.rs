#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use eeprom_images::Layout;
use embedded_storage::{ReadStorage, Storage};

pub const MAGIC_OFFSET: usize = 0;
pub const CHECKSUM_OFFSET: usize = 4;
pub const HEADER_AREA_START: usize = 8;
pub const HEADER_RECORD_SIZE: usize = 12;

/// 8 slots, 4 granules of 256 bytes and a truncated fifth one of 96 bytes.
/// Data area starts at 8 + 8 * 12 + 1 = 105.
pub const SMALL: Layout = match Layout::new(105 + 4 * 256 + 96, 8, 256) {
    Ok(layout) => layout,
    Err(_) => panic!("invalid test layout"),
};

/// In-memory EEPROM. Starts out erased (all 0xFF) like a factory fresh M95 part.
#[derive(Default)]
pub struct Eeprom {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
}

impl Eeprom {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0xffu8; size],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn for_layout(layout: &Layout) -> Self {
        Self::new(layout.eeprom_size() as usize)
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    /// Makes the n-th transport call from now on fail, counting from 0.
    pub fn fail_in(&mut self, operations: usize) {
        self.fail_after_operation = self.operations.len() + operations;
    }

    pub fn writes(&self) -> Vec<Operation> {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .cloned()
            .collect()
    }

    pub fn header_area(&self, layout: &Layout) -> Vec<u8> {
        self.buf[HEADER_AREA_START..layout.header_area_end() as usize].to_vec()
    }

    pub fn record(&self, slot: usize) -> &[u8] {
        let start = HEADER_AREA_START + slot * HEADER_RECORD_SIZE;
        &self.buf[start..start + HEADER_RECORD_SIZE]
    }
}

#[derive(Debug)]
pub struct EepromError;

impl ReadStorage for Eeprom {
    type Error = EepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        println!(
            "    eeprom: read:  0x{offset:06X}[0x{:05X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        if self.operations.len() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return Err(EepromError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        assert!(offset + bytes.len() <= self.buf.len());
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Storage for Eeprom {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        println!(
            "    eeprom: write: 0x{offset:06X}[0x{:05X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );

        if self.operations.len() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return Err(EepromError);
        }
        assert!(!bytes.is_empty());

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        // unlike flash every byte can be rewritten freely
        let offset = offset as usize;
        assert!(offset + bytes.len() <= self.buf.len());
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl eeprom_images::platform::Crc for Eeprom {
    fn crc32(init: u32, data: &[u8]) -> u32 {
        unsafe { libz_sys::crc32(init as _, data.as_ptr(), data.len() as _) as u32 }
    }
}

/// Deterministic, non repeating looking image content.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
