use kernel_memory_addresses::{PhysicalAddress, PhysicalAddressRange};
use kernel_page_alloc::global::{self, GlobalError};
use kernel_page_alloc::{
    AllocError, FrameRecord, FreeRun, InvalidFreeReason, PageFrameAllocator, max_free_runs,
};

fn leaked_allocator(pages: usize) -> PageFrameAllocator<'static> {
    let frames = Box::leak(vec![FrameRecord::FREE; pages].into_boxed_slice());
    let runs = Box::leak(vec![FreeRun::default(); max_free_runs(pages)].into_boxed_slice());
    let ram =
        PhysicalAddressRange::from_len(PhysicalAddress::new(0x20_0000), pages as u64 * 4096)
            .unwrap();
    PageFrameAllocator::new(&[ram], frames, runs).unwrap()
}

// The facade is process-wide, so its whole lifecycle lives in one test.
#[test]
fn page_alloc_and_page_free_lifecycle() {
    assert_eq!(global::page_alloc(1), Err(GlobalError::NotInstalled));
    assert_eq!(
        global::page_free(PhysicalAddress::new(0x20_0000)),
        Err(GlobalError::NotInstalled)
    );
    assert!(global::allocator().is_none());

    let installed = global::install(leaked_allocator(16)).unwrap();
    assert_eq!(installed.stats().total_pages, 16);
    assert_eq!(
        global::install(leaked_allocator(4)).unwrap_err(),
        GlobalError::AlreadyInstalled
    );

    let a = global::page_alloc(4).unwrap();
    let b = global::page_alloc(12).unwrap();
    assert_eq!(a, PhysicalAddress::new(0x20_0000));
    assert_eq!(
        global::page_alloc(1),
        Err(GlobalError::Alloc(AllocError::OutOfMemory {
            requested: 1,
            largest_free_run: 0
        }))
    );

    assert_eq!(global::page_free(a), Ok(4));
    assert!(matches!(
        global::page_free(a),
        Err(GlobalError::Free(err)) if err.reason() == InvalidFreeReason::NotAllocated
    ));
    assert_eq!(global::page_free(b), Ok(12));
    global::allocator().unwrap().check().unwrap();
}
