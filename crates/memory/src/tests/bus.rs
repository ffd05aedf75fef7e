use crate::bus::{MemoryBus, MmioHandler};
use crate::map::{MapError, PhysicalMemoryBus, RegionKind};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<(char, u64, usize, u64)>>>;

struct RecordingMmio {
    log: Log,
    value: u64,
}

impl MmioHandler for RecordingMmio {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        self.log.borrow_mut().push(('r', offset, size, 0));
        self.value
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        self.log.borrow_mut().push(('w', offset, size, value));
    }
}

fn recorder(value: u64) -> (Log, Box<dyn MmioHandler>) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let handler = RecordingMmio {
        log: log.clone(),
        value,
    };
    (log, Box::new(handler))
}

#[test]
fn rom_ignores_guest_writes_but_accepts_loader_writes() {
    let mut bus = PhysicalMemoryBus::new();
    bus.map_rom("rom", 0x1000, 0x1000).unwrap();

    bus.load_image(0x1000, &[0xAA, 0xBB]).unwrap();
    assert_eq!(bus.read_u16(0x1000), 0xBBAA);

    bus.write_u16(0x1000, 0x5555);
    assert_eq!(bus.read_u16(0x1000), 0xBBAA);
}

#[test]
fn mmio_precedes_ram_and_sees_the_issued_width() {
    let (log, handler) = recorder(0x1234);

    let mut bus = PhysicalMemoryBus::new();
    bus.map_ram("ram", 0x0, 0x2000).unwrap();
    bus.map_mmio("dev", 0x1000, 4, 0, handler).unwrap();

    assert_eq!(bus.read_u16(0x1002), 0x1234);
    bus.write_u16(0x1000, 0xBEEF);

    assert_eq!(
        log.borrow().as_slice(),
        &[('r', 2, 2, 0), ('w', 0, 2, 0xBEEF)]
    );
    assert_eq!(bus.read_u16(0x0FFE), 0);
}

#[test]
fn higher_priority_mmio_wins_inside_an_overlap() {
    let (low_log, low) = recorder(0x1111);
    let (high_log, high) = recorder(0x2222);

    let mut bus = PhysicalMemoryBus::new();
    bus.map_mmio("low", 0x100, 0x10, 0, low).unwrap();
    bus.map_mmio("high", 0x108, 2, 1, high).unwrap();

    assert_eq!(bus.read_u16(0x108), 0x2222);
    assert_eq!(bus.read_u16(0x106), 0x1111);
    assert_eq!(bus.read_u16(0x10A), 0x1111);

    assert_eq!(high_log.borrow().as_slice(), &[('r', 0, 2, 0)]);
    assert_eq!(
        low_log.borrow().as_slice(),
        &[('r', 6, 2, 0), ('r', 0xA, 2, 0)]
    );
}

#[test]
fn mmio_overlap_at_equal_priority_is_rejected() {
    let (_, a) = recorder(0);
    let (_, b) = recorder(0);

    let mut bus = PhysicalMemoryBus::new();
    bus.map_mmio("a", 0x100, 0x10, 0, a).unwrap();
    let err = bus.map_mmio("b", 0x108, 2, 0, b).unwrap_err();
    assert!(matches!(err, MapError::Overlap { ref existing, .. } if existing == "a"));
}

#[test]
fn memory_regions_may_not_overlap() {
    let mut bus = PhysicalMemoryBus::new();
    bus.map_ram("a", 0x1000, 0x1000).unwrap();
    assert!(matches!(
        bus.map_ram("b", 0x1800, 0x1000),
        Err(MapError::Overlap { .. })
    ));
    assert!(matches!(
        bus.map_ram("c", 0x3000, 0),
        Err(MapError::ZeroLength { .. })
    ));
}

#[test]
fn unmapped_accesses_read_zero_and_drop_writes() {
    let mut bus = PhysicalMemoryBus::new();
    bus.map_ram("ram", 0x1000, 0x10).unwrap();

    bus.write_u32(0x2000, 0xFFFF_FFFF);
    assert_eq!(bus.read_u32(0x2000), 0);

    // Straddles the end of RAM: the backed half is written, the rest is dropped.
    bus.write_u32(0x100E, 0xAABB_CCDD);
    assert_eq!(bus.read_u16(0x100E), 0xCCDD);
    assert_eq!(bus.read_u32(0x100E), 0x0000_CCDD);
}

#[test]
fn load_image_rejects_unbacked_ranges() {
    let mut bus = PhysicalMemoryBus::new();
    bus.map_ram("ram", 0x1000, 0x10).unwrap();

    let err = bus.load_image(0x1008, &[0u8; 16]).unwrap_err();
    assert_eq!(
        err,
        MapError::Unbacked {
            paddr: 0x1008,
            len: 16
        }
    );
    assert!(bus.is_backed(0x1008, 8));
    assert!(!bus.is_backed(0x1008, 16));
    assert!(!bus.is_backed(0x1000, u64::MAX));
}

#[test]
fn large_ram_is_backed_sparsely_and_spans_regions() {
    let mut bus = PhysicalMemoryBus::new();
    bus.map_ram("low", 0x0, 0x1000).unwrap();
    bus.map_ram("big", 0x1000, 64 * 1024 * 1024).unwrap();

    bus.load_image(0xFFE, &[1, 2, 3, 4]).unwrap();
    assert_eq!(bus.read_u32(0xFFE), 0x0403_0201);
    assert!(bus.is_backed(0x0, 0x1000 + 64 * 1024 * 1024));
    assert_eq!(bus.read_u16(0x1000 + 64 * 1024 * 1024 - 2), 0);

    let kinds: Vec<_> = bus.regions().iter().map(|r| (r.name.clone(), r.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("low".to_string(), RegionKind::Ram),
            ("big".to_string(), RegionKind::Ram)
        ]
    );
}

proptest::proptest! {
    #[test]
    fn ram_bytes_read_back_what_was_written(
        offset in 0u64..0x1F00,
        data in proptest::collection::vec(proptest::num::u8::ANY, 1..64),
    ) {
        let mut bus = PhysicalMemoryBus::new();
        bus.map_ram("ram", 0x4000, 0x2000).unwrap();

        bus.write_physical(0x4000 + offset, &data);
        let mut out = vec![0u8; data.len()];
        bus.read_physical(0x4000 + offset, &mut out);
        proptest::prop_assert_eq!(out, data);
    }
}
