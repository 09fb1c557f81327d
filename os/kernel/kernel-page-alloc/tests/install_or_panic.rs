use kernel_page_alloc::{InitError, global};

#[test]
#[should_panic(expected = "page allocator initialization failed: no usable memory")]
fn failed_initialization_is_fatal() {
    let _ = global::install_or_panic(Err::<_, InitError>(InitError::NoMemory));
}
