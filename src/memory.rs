//! Emulated memory regions seen by the DSP
//!
//! The mixer reads from two address spaces: ARAM, the auxiliary memory
//! holding compressed and PCM sample data, and main RAM, which holds the
//! voice parameter blocks and raw streamed audio. Each region has a fixed
//! address mask that is applied before dereferencing; addresses outside
//! the backing storage are a precondition violation of the provider, not
//! something the mixer validates.

/// Address mask for the ARAM sample region (16 MiB).
pub const ARAM_MASK: u32 = 16 * 1024 * 1024 - 1;

/// Address mask for main RAM (32 MiB of physical address space).
pub const RAM_MASK: u32 = 0x01FF_FFFF;

/// Access to the two emulated memory regions.
///
/// Implementations own the backing storage; the mixer only ever borrows
/// byte slices and applies the region masks itself. Parameter blocks are
/// written back through `ram_mut`.
pub trait DspMemory {
    /// ARAM sample/compressed-audio region.
    fn aram(&self) -> &[u8];

    /// Main system memory.
    fn ram(&self) -> &[u8];

    /// Mutable main system memory (parameter-block write-back).
    fn ram_mut(&mut self) -> &mut [u8];
}

/// Read a big-endian 16-bit word from a region at a masked byte address.
#[inline]
pub(crate) fn read_u16(region: &[u8], addr: u32, mask: u32) -> u16 {
    let a = (addr & mask) as usize;
    u16::from_be_bytes([region[a], region[a + 1]])
}

/// Read a big-endian signed 16-bit sample from a region.
#[inline]
pub(crate) fn read_i16(region: &[u8], addr: u32, mask: u32) -> i16 {
    read_u16(region, addr, mask) as i16
}

/// Simple `Vec`-backed memory provider.
///
/// Suitable for hosts that keep ARAM and main RAM as flat allocations, and
/// for tests. Region sizes need not span the full masked address space;
/// accesses are expected to stay within the allocated prefix.
#[derive(Debug, Clone)]
pub struct EmulatedMemory {
    aram: Vec<u8>,
    ram: Vec<u8>,
}

impl EmulatedMemory {
    /// Allocate zeroed regions of the given byte sizes.
    pub fn new(aram_size: usize, ram_size: usize) -> Self {
        Self {
            aram: vec![0; aram_size],
            ram: vec![0; ram_size],
        }
    }

    /// Copy bytes into ARAM at `addr`.
    pub fn load_aram(&mut self, addr: u32, data: &[u8]) {
        let a = (addr & ARAM_MASK) as usize;
        self.aram[a..a + data.len()].copy_from_slice(data);
    }

    /// Copy bytes into main RAM at `addr`.
    pub fn load_ram(&mut self, addr: u32, data: &[u8]) {
        let a = (addr & RAM_MASK) as usize;
        self.ram[a..a + data.len()].copy_from_slice(data);
    }
}

impl DspMemory for EmulatedMemory {
    fn aram(&self) -> &[u8] {
        &self.aram
    }

    fn ram(&self) -> &[u8] {
        &self.ram
    }

    fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }
}
