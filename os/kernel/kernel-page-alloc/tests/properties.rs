use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalAddressRange};
use kernel_page_alloc::{
    AllocError, FrameIndex, FrameRecord, FreeRun, InvalidFreeReason, PageFrameAllocator,
    Placement, max_free_runs,
};

const BASE: u64 = 0x4000_0000;

fn page(frame: u64) -> PhysicalAddress {
    PhysicalAddress::new(BASE + frame * PAGE_SIZE)
}

fn pages(start: u64, len: u64) -> PhysicalAddressRange {
    PhysicalAddressRange::new(page(start), page(start + len))
}

fn run(start: usize, len: usize) -> FreeRun {
    FreeRun::new(FrameIndex::new(start), len)
}

struct Storage {
    frames: Vec<FrameRecord>,
    runs: Vec<FreeRun>,
}

impl Storage {
    fn new(frames: usize) -> Self {
        Self {
            frames: vec![FrameRecord::FREE; frames],
            runs: vec![FreeRun::default(); max_free_runs(frames)],
        }
    }

    fn allocator(&mut self, ranges: &[PhysicalAddressRange]) -> PageFrameAllocator<'_> {
        PageFrameAllocator::new(ranges, &mut self.frames, &mut self.runs).unwrap()
    }
}

#[test]
fn fragmentation_and_defragmentation() {
    let mut storage = Storage::new(10);
    let mut alloc = storage.allocator(&[pages(0, 10)]);

    let a0 = alloc.allocate(2).unwrap();
    let a1 = alloc.allocate(2).unwrap();
    let a2 = alloc.allocate(2).unwrap();
    assert_eq!((a0, a1, a2), (page(0), page(2), page(4)));

    assert_eq!(alloc.free(a1), Ok(2));
    assert_eq!(alloc.free_runs().collect::<Vec<_>>(), [run(2, 2), run(6, 4)]);

    assert_eq!(alloc.free(a0), Ok(2));
    assert_eq!(alloc.free_runs().collect::<Vec<_>>(), [run(0, 4), run(6, 4)]);

    assert_eq!(alloc.allocate(4), Ok(page(0)));
    alloc.check().unwrap();
}

#[test]
fn exhaustion_and_recovery() {
    const K: usize = 7;
    let mut storage = Storage::new(K);
    let mut alloc = storage.allocator(&[pages(0, K as u64)]);

    let all = alloc.allocate(K).unwrap();
    assert_eq!(
        alloc.allocate(1),
        Err(AllocError::OutOfMemory {
            requested: 1,
            largest_free_run: 0
        })
    );
    assert_eq!(alloc.stats().free_pages, 0);

    assert_eq!(alloc.free(all), Ok(K));
    assert_eq!(alloc.allocate(1), Ok(page(0)));
}

#[test]
fn double_free_is_rejected() {
    let mut storage = Storage::new(4);
    let mut alloc = storage.allocator(&[pages(0, 4)]);

    let block = alloc.allocate(3).unwrap();
    assert_eq!(alloc.free(block), Ok(3));

    let err = alloc.free(block).unwrap_err();
    assert_eq!(err.reason(), InvalidFreeReason::NotAllocated);
    assert_eq!(alloc.stats().free_pages, 4);
    alloc.check().unwrap();
}

#[test]
fn interior_and_foreign_addresses_are_rejected_without_mutation() {
    let mut storage = Storage::new(8);
    let mut alloc = storage.allocator(&[pages(0, 8)]);
    let block = alloc.allocate(4).unwrap();
    let before: Vec<_> = alloc.free_runs().collect();

    for addr in [page(1), page(3), page(9), PhysicalAddress::new(0), block + 0x10] {
        assert!(alloc.free(addr).is_err(), "{addr} should be rejected");
    }

    assert_eq!(alloc.free_runs().collect::<Vec<_>>(), before);
    assert_eq!(alloc.block_len(block), Some(4));
}

#[test]
fn failed_allocation_changes_nothing() {
    let mut storage = Storage::new(6);
    let mut alloc = storage.allocator(&[pages(0, 2), pages(3, 3)]);
    let before = (alloc.stats(), alloc.free_runs().collect::<Vec<_>>());

    assert!(matches!(alloc.allocate(4), Err(AllocError::OutOfMemory { .. })));
    assert_eq!(alloc.allocate(0), Err(AllocError::ZeroPages));

    assert_eq!((alloc.stats(), alloc.free_runs().collect::<Vec<_>>()), before);
}

#[test]
fn allocate_then_free_restores_the_index() {
    let mut storage = Storage::new(32);
    let mut alloc = storage.allocator(&[pages(0, 12), pages(14, 18)]);
    let _pinned = alloc.allocate(5).unwrap();
    let hole = alloc.allocate(2).unwrap();
    let _pinned2 = alloc.allocate(1).unwrap();
    alloc.free(hole).unwrap();

    for n in 1..=20 {
        let before: Vec<_> = alloc.free_runs().collect();
        if let Ok(addr) = alloc.allocate(n) {
            alloc.free(addr).unwrap();
        }
        assert_eq!(alloc.free_runs().collect::<Vec<_>>(), before, "n = {n}");
    }
}

#[test]
fn first_fit_prefers_low_addresses() {
    let mut storage = Storage::new(16);
    let mut alloc = storage.allocator(&[pages(0, 2), pages(4, 4), pages(10, 6)]);

    assert_eq!(alloc.allocate(3), Ok(page(4)));
    assert_eq!(alloc.allocate(1), Ok(page(0)));
    assert_eq!(alloc.allocate(2), Ok(page(10)));
    assert_eq!(alloc.placement(), Placement::FirstFit);
}

/// xorshift64; deterministic and dependency-free.
struct Rng(u64);

impl Rng {
    fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

fn assert_properties(alloc: &PageFrameAllocator<'_>, live: &[(PhysicalAddress, usize)]) {
    alloc.check().unwrap();

    let stats = alloc.stats();
    assert_eq!(stats.free_pages + stats.allocated_pages, stats.total_pages);
    assert_eq!(stats.allocated_pages, live.iter().map(|(_, n)| n).sum::<usize>());

    let region = alloc.region();
    let mut blocks: Vec<_> = live.to_vec();
    blocks.sort_unstable();
    for &(addr, n) in &blocks {
        assert!(addr.is_aligned::<kernel_memory_addresses::Size4K>());
        assert!(region.contains(addr));
        assert!(addr + (n as u64 * PAGE_SIZE) <= region.end);
    }
    for pair in blocks.windows(2) {
        let (a, a_len) = pair[0];
        assert!(a + a_len as u64 * PAGE_SIZE <= pair[1].0, "blocks overlap");
    }

    let runs: Vec<_> = alloc.free_runs().collect();
    for pair in runs.windows(2) {
        assert!(pair[0].end() < pair[1].start, "free runs touch");
    }
}

fn stress(placement: Placement, seed: u64) {
    let ranges = [pages(0, 40), pages(43, 60), pages(110, 18)];
    let mut frames = vec![FrameRecord::FREE; 128];
    let mut runs = vec![FreeRun::default(); max_free_runs(128)];
    let mut alloc: PageFrameAllocator =
        PageFrameAllocator::with_placement(&ranges, &mut frames, &mut runs, placement).unwrap();
    let total = alloc.stats().total_pages;

    let mut rng = Rng(seed);
    let mut live: Vec<(PhysicalAddress, usize)> = Vec::new();

    for _ in 0..4000 {
        if live.is_empty() || rng.below(100) < 55 {
            let n = 1 + rng.below(12) as usize;
            match alloc.allocate(n) {
                Ok(addr) => live.push((addr, n)),
                Err(AllocError::OutOfMemory {
                    largest_free_run, ..
                }) => assert!(largest_free_run < n),
                Err(err) => panic!("unexpected {err}"),
            }
        } else {
            let (addr, n) = live.swap_remove(rng.below(live.len() as u64) as usize);
            assert_eq!(alloc.free(addr), Ok(n));
            assert!(alloc.free(addr).is_err());
        }
        assert_properties(&alloc, &live);
    }

    for (addr, n) in live.drain(..) {
        assert_eq!(alloc.free(addr), Ok(n));
    }
    assert_eq!(alloc.stats().free_pages, total);
    assert_eq!(
        alloc.free_runs().collect::<Vec<_>>(),
        [run(0, 40), run(43, 60), run(110, 18)]
    );
}

#[test]
fn randomized_first_fit() {
    stress(Placement::FirstFit, 0x9e37_79b9_7f4a_7c15);
}

#[test]
fn randomized_best_fit() {
    stress(Placement::BestFit, 0x2545_f491_4f6c_dd1d);
}
