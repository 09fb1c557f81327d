use kernel_memory_addresses::{PhysicalAddress, PhysicalAddressRange};
use kernel_page_alloc::phys_mapper::OffsetPhysMapper;
use kernel_page_alloc::{
    AllocError, FrameRecord, FreeRun, LockedPageAllocator, PageFrameAllocator, max_free_runs,
};
use std::sync::Barrier;
use std::thread;

const PAGES: usize = 256;

fn region() -> PhysicalAddressRange {
    PhysicalAddressRange::from_len(PhysicalAddress::new(0x100_0000), PAGES as u64 * 4096).unwrap()
}

#[test]
fn page_block_frees_on_drop() {
    let mut frames = vec![FrameRecord::FREE; 8];
    let mut runs = vec![FreeRun::default(); max_free_runs(8)];
    let ram = PhysicalAddressRange::from_len(PhysicalAddress::new(0x1000), 8 * 4096).unwrap();
    let locked = LockedPageAllocator::new(
        PageFrameAllocator::new(&[ram], &mut frames, &mut runs).unwrap(),
    );

    {
        let block = locked.allocate_block(8).unwrap();
        assert_eq!(block.addr(), PhysicalAddress::new(0x1000));
        assert_eq!(block.len_bytes(), 8 * 4096);
        assert!(matches!(
            locked.allocate(1),
            Err(AllocError::OutOfMemory { .. })
        ));
    }
    assert_eq!(locked.stats().free_pages, 8);

    let addr = locked.allocate_block(3).unwrap().leak();
    assert_eq!(locked.stats().free_pages, 5);
    assert_eq!(locked.free(addr), Ok(3));
    locked.check().unwrap();
}

#[test]
fn block_freed_by_hand_does_not_free_its_successor() {
    let mut frames = vec![FrameRecord::FREE; 8];
    let mut runs = vec![FreeRun::default(); max_free_runs(8)];
    let ram = PhysicalAddressRange::from_len(PhysicalAddress::new(0x1000), 8 * 4096).unwrap();
    let locked = LockedPageAllocator::new(
        PageFrameAllocator::new(&[ram], &mut frames, &mut runs).unwrap(),
    );

    let block = locked.allocate_block(2).unwrap();
    assert_eq!(locked.free(block.addr()), Ok(2));
    let successor = locked.allocate(3).unwrap();
    assert_eq!(successor, block.addr());

    drop(block);
    assert_eq!(locked.with(|alloc| alloc.block_len(successor)), Some(3));
    assert_eq!(locked.stats().allocated_pages, 3);
    locked.check().unwrap();
}

#[test]
fn zeroed_allocations_clear_only_their_pages() {
    const PATTERN: u8 = 0xa5;
    let base = PhysicalAddress::new(0x40_0000);
    let mut ram = vec![PATTERN; 8 * 4096];
    let mapper = OffsetPhysMapper::between(base, ram.as_mut_ptr());

    let mut frames = vec![FrameRecord::FREE; 8];
    let mut runs = vec![FreeRun::default(); max_free_runs(8)];
    let range = PhysicalAddressRange::from_len(base, 8 * 4096).unwrap();
    let locked = LockedPageAllocator::new(
        PageFrameAllocator::new(&[range], &mut frames, &mut runs).unwrap(),
    );

    let plain = locked.allocate(1).unwrap();
    let zeroed = unsafe { locked.allocate_zeroed(3, &mapper) }.unwrap();
    let block = unsafe { locked.allocate_block_zeroed(2, &mapper) }.unwrap();
    assert_eq!(plain, base);
    assert_eq!(zeroed, base + 4096);
    assert_eq!(block.addr(), base + 4 * 4096);
    drop(block);

    let page = |n: usize| &ram[n * 4096..(n + 1) * 4096];
    assert!(page(0).iter().all(|&b| b == PATTERN));
    assert!((1..6).all(|n| page(n).iter().all(|&b| b == 0)));
    assert!((6..8).all(|n| page(n).iter().all(|&b| b == PATTERN)));
}

#[test]
fn with_runs_a_sequence_under_one_lock() {
    let mut frames = vec![FrameRecord::FREE; 8];
    let mut runs = vec![FreeRun::default(); max_free_runs(8)];
    let ram = PhysicalAddressRange::from_len(PhysicalAddress::new(0x1000), 8 * 4096).unwrap();
    let locked = LockedPageAllocator::new(
        PageFrameAllocator::new(&[ram], &mut frames, &mut runs).unwrap(),
    );

    let (a, b) = locked.with(|alloc| (alloc.allocate(1).unwrap(), alloc.allocate(1).unwrap()));
    assert_eq!(b, a + 4096);

    let alloc = locked.into_inner();
    assert_eq!(alloc.live_blocks().count(), 2);
}

#[test]
fn concurrent_callers_never_share_pages() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let mut frames = vec![FrameRecord::FREE; PAGES];
    let mut runs = vec![FreeRun::default(); max_free_runs(PAGES)];
    let locked = LockedPageAllocator::new(
        PageFrameAllocator::new(&[region()], &mut frames, &mut runs).unwrap(),
    );
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for t in 0..THREADS {
            let locked = &locked;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                let mut held = Vec::new();
                for round in 0..ROUNDS {
                    let pages = 1 + (t + round) % 4;
                    if let Ok(block) = locked.allocate_block(pages) {
                        held.push(block);
                    }
                    if held.len() > 3 {
                        drop(held.remove(0));
                    }
                }
            });
        }
    });

    let stats = locked.stats();
    assert_eq!(stats.free_pages, PAGES);
    assert_eq!(stats.free_runs, 1);
    locked.check().unwrap();
}

#[test]
fn concurrent_blocks_are_disjoint() {
    const THREADS: usize = 4;

    let mut frames = vec![FrameRecord::FREE; PAGES];
    let mut runs = vec![FreeRun::default(); max_free_runs(PAGES)];
    let locked = LockedPageAllocator::new(
        PageFrameAllocator::new(&[region()], &mut frames, &mut runs).unwrap(),
    );

    let mut all: Vec<(PhysicalAddress, usize)> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let locked = &locked;
                s.spawn(move || {
                    let mut mine = Vec::new();
                    while let Ok(addr) = locked.allocate(1 + t) {
                        mine.push((addr, 1 + t));
                    }
                    mine
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    all.sort_unstable();
    for pair in all.windows(2) {
        let (a, n) = pair[0];
        assert!(a + n as u64 * 4096 <= pair[1].0);
    }
    let allocated: usize = all.iter().map(|(_, n)| n).sum();
    assert_eq!(locked.stats().allocated_pages, allocated);
    locked.check().unwrap();
}
