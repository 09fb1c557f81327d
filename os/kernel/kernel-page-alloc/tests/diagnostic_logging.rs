use kernel_console::{CharSink, ConsoleLogger};
use kernel_memory_addresses::{PhysicalAddress, PhysicalAddressRange};
use kernel_page_alloc::{FrameRecord, FreeRun, PageFrameAllocator, max_free_runs};
use log::LevelFilter;
use std::sync::Mutex;

struct Capture(Vec<u8>);

impl CharSink for Capture {
    fn putc(&mut self, byte: u8) {
        self.0.push(byte);
    }
}

static LOGGER: ConsoleLogger<Capture> = ConsoleLogger::new(Capture(Vec::new()), LevelFilter::Debug);
static SERIAL: Mutex<()> = Mutex::new(());

fn captured<R>(f: impl FnOnce() -> R) -> (R, String) {
    let _serial = SERIAL.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let _ = LOGGER.init();
    LOGGER.with_sink(|s| s.0.clear());
    let result = f();
    let text = LOGGER.with_sink(|s| String::from_utf8(std::mem::take(&mut s.0)).unwrap());
    (result, text)
}

fn with_allocator<R>(f: impl FnOnce(&mut PageFrameAllocator<'_>) -> R) -> R {
    let mut frames = vec![FrameRecord::FREE; 4];
    let mut runs = vec![FreeRun::default(); max_free_runs(4)];
    let ram = PhysicalAddressRange::from_len(PhysicalAddress::new(0x8000_0000), 4 * 4096).unwrap();
    let mut alloc = PageFrameAllocator::new(&[ram], &mut frames, &mut runs).unwrap();
    f(&mut alloc)
}

#[test]
fn out_of_memory_is_reported_as_warning() {
    let (result, log) = captured(|| with_allocator(|alloc| alloc.allocate(5)));
    assert!(result.is_err());
    assert!(
        log.lines()
            .any(|l| l.starts_with("[WARN] kernel_page_alloc") && l.contains("out of memory")),
        "{log}"
    );
}

#[test]
fn rejected_free_is_reported_as_error() {
    let (result, log) = captured(|| {
        with_allocator(|alloc| alloc.free(PhysicalAddress::new(0x8000_1000)))
    });
    assert!(result.is_err());
    assert!(
        log.contains("[ERROR] kernel_page_alloc::frame_alloc: rejected free of"),
        "{log}"
    );
}

#[test]
fn dump_lists_every_free_run() {
    let (runs, log) = captured(|| {
        with_allocator(|alloc| {
            let a = alloc.allocate(1).unwrap();
            alloc.allocate(1).unwrap();
            alloc.free(a).unwrap();
            alloc.dump();
            alloc.stats().free_runs
        })
    });
    assert_eq!(runs, 2);
    assert_eq!(log.lines().filter(|l| l.contains("  free #")).count(), 2, "{log}");
    assert!(log.contains("[INFO] kernel_page_alloc::frame_alloc: managing"), "{log}");
}
