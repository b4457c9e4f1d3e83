use crate::bus::{Slave, SlaveError, SlaveResult};
use crate::AddressRange;

/// Byte-based RAM slave mapped at a fixed base address.
///
/// Stores exactly what it is given and returns it on subsequent reads. Accesses that are not
/// entirely contained in the mapped range are refused with [`SlaveError::OutOfRange`] and leave
/// the contents untouched.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ram {
    data: Vec<u8>,
    range: AddressRange,
}

impl Ram {
    /// Create a new zero-initialized RAM holding `size` bytes, mapped at `address`.
    ///
    /// `size` must be at least one, and the range must fit in the address space. If it doesn't,
    /// `None` is returned and nothing is allocated.
    pub fn new(address: u64, size: usize) -> Option<Self> {
        let range = AddressRange::from_base_size(address, u64::try_from(size).ok()?)?;
        Some(Self {
            data: vec![0; size],
            range,
        })
    }

    /// Returns the size expressed in bytes. Guaranteed to be at least one.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns the bus address range this RAM is mapped at.
    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Force RAM back to its reset state, which is all-zeros.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Direct access to the stored bytes, indexed from the base address.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Translate an access into an index range of `self.data`.
    fn locate(&self, address: u64, size: usize) -> Result<std::ops::Range<usize>, SlaveError> {
        let out_of_range = || SlaveError::OutOfRange {
            address,
            size: size as u64,
        };
        if !self.range.contains_access(address, size as u64) {
            return Err(out_of_range());
        }
        let start = self
            .range
            .offset_of(address)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(out_of_range)?;
        Ok(start..start + size)
    }
}

impl Slave for Ram {
    fn handle_read(&mut self, buf: &mut [u8], address: u64) -> SlaveResult {
        let range = self.locate(address, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn handle_write(&mut self, address: u64, buf: &[u8]) -> SlaveResult {
        let range = self.locate(address, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_what_it_is_given() {
        let mut ram = Ram::new(0x1000, 0x2000).unwrap();
        assert_eq!(0x2000, ram.len());
        ram.handle_write(0x1004, b"Hello world!").unwrap();

        let mut buf = [0u8; 12];
        ram.handle_read(&mut buf, 0x1004).unwrap();
        assert_eq!(b"Hello world!", &buf);
        assert_eq!(b'H', ram.contents()[4]);

        ram.reset();
        ram.handle_read(&mut buf, 0x1004).unwrap();
        assert_eq!([0u8; 12], buf);
    }

    #[test]
    fn refuses_out_of_range_access() {
        let mut ram = Ram::new(0x1000, 0x10).unwrap();
        assert_eq!(
            Err(SlaveError::OutOfRange {
                address: 0x100c,
                size: 8
            }),
            ram.handle_write(0x100c, &[0xaa; 8])
        );
        assert!(ram.contents().iter().all(|&b| b == 0));

        let mut buf = [0u8; 1];
        assert!(ram.handle_read(&mut buf, 0x0fff).is_err());
        assert!(ram.handle_read(&mut buf, 0x1010).is_err());
        assert!(ram.handle_read(&mut buf, 0x100f).is_ok());
    }

    #[test]
    fn rejects_degenerate_sizes() {
        assert!(Ram::new(0, 0).is_none());
        assert!(Ram::new(u64::MAX, 2).is_none());
        assert_eq!(0x2fff, Ram::new(0x1000, 0x2000).unwrap().range().end());
    }
}
