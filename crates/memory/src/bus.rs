/// Guest physical address space as the board's CPU and host code see it.
///
/// Reads take `&mut self`: an address may decode to a device register whose read has side
/// effects (the UART's RXBYTE, for one). The sized helpers are little-endian; the Marin
/// registers are 16 bits wide and kernel words 32.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    fn read_u16(&mut self, paddr: u64) -> u16 {
        let mut raw = [0u8; 2];
        self.read_physical(paddr, &mut raw);
        u16::from_le_bytes(raw)
    }

    fn write_u16(&mut self, paddr: u64, value: u16) {
        self.write_physical(paddr, &value.to_le_bytes());
    }

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut raw = [0u8; 4];
        self.read_physical(paddr, &mut raw);
        u32::from_le_bytes(raw)
    }

    fn write_u32(&mut self, paddr: u64, value: u32) {
        self.write_physical(paddr, &value.to_le_bytes());
    }
}

/// Device register window mapped into the address space.
///
/// `offset` is relative to the window base and `size` is the width the CPU issued. Values travel
/// little-endian in the low `size` bytes.
pub trait MmioHandler {
    fn read(&mut self, offset: u64, size: usize) -> u64;
    fn write(&mut self, offset: u64, size: usize, value: u64);
}
