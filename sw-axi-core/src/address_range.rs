use std::fmt;
use std::fmt::{Display, Formatter};

/// A non-empty range in the 64-bit bus address space bounded inclusively below and above.
///
/// Enforces the invariant that `self.start() <= self.end()`.
///
/// This is the start/end view of an IP block's address space; [`IpConfig`](crate::IpConfig)
/// itself stores the base address and the size.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AddressRange {
    start: u64,
    end: u64,
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

impl AddressRange {
    /// Create the range covering `size` bytes starting at `address`.
    ///
    /// Returns `None` if `size` is zero or the range would run past the end of the address space.
    pub fn from_base_size(address: u64, size: u64) -> Option<Self> {
        let delta = size.checked_sub(1)?;
        let end = address.checked_add(delta)?;
        Some(Self {
            start: address,
            end,
        })
    }

    pub fn start(self) -> u64 {
        self.start
    }

    pub fn end(self) -> u64 {
        self.end
    }

    /// Check if an address is contained within this address range.
    pub fn contains(self, address: u64) -> bool {
        self.start <= address && address <= self.end
    }

    /// Check if the whole access `address..address + size` lies within this range.
    ///
    /// Zero-sized accesses are accepted as long as `address` itself is in range.
    pub fn contains_access(self, address: u64, size: u64) -> bool {
        if !self.contains(address) {
            return false;
        }
        match size.checked_sub(1) {
            None => true,
            Some(delta) => self.end - address >= delta,
        }
    }

    /// Returns `true` if the two ranges share at least one address.
    pub fn overlaps(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Offset of `address` from the start of this range, if it is contained in it.
    pub fn offset_of(self, address: u64) -> Option<u64> {
        self.contains(address).then(|| address - self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_size_conversion() {
        let range = AddressRange::from_base_size(0x1000, 0x2000).unwrap();
        assert_eq!(0x1000, range.start());
        assert_eq!(0x2fff, range.end());

        assert!(AddressRange::from_base_size(0x1000, 0).is_none());
        assert!(AddressRange::from_base_size(u64::MAX, 2).is_none());
        let top = AddressRange::from_base_size(u64::MAX, 1).unwrap();
        assert_eq!((u64::MAX, u64::MAX), (top.start(), top.end()));
    }

    #[test]
    fn access_containment() {
        let range = AddressRange::from_base_size(0x1000, 0x10).unwrap();
        assert!(range.contains_access(0x1000, 0x10));
        assert!(range.contains_access(0x100f, 1));
        assert!(range.contains_access(0x1008, 0));
        assert!(!range.contains_access(0x100f, 2));
        assert!(!range.contains_access(0x0fff, 1));
        assert_eq!(Some(4), range.offset_of(0x1004));
        assert_eq!(None, range.offset_of(0x1010));
    }

    #[test]
    fn overlap() {
        let a = AddressRange::from_base_size(0x1000, 0x1000).unwrap();
        let b = AddressRange::from_base_size(0x1fff, 0x1001).unwrap();
        let c = AddressRange::from_base_size(0x2000, 0x1000).unwrap();
        assert!(a.overlaps(b));
        assert!(b.overlaps(a));
        assert!(!a.overlaps(c));
        assert_eq!("[0x1000, 0x1fff]", a.to_string());
    }
}
