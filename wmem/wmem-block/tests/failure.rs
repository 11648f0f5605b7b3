mod common;

use common::{SMALL_BLOCK, fill, filled, scripted};
use wmem_block::AllocError;

#[test]
fn refused_block_leaves_allocator_untouched() {
    let (mut wmem, log) = scripted(SMALL_BLOCK);
    log.deny_all();

    assert_eq!(wmem.alloc(10), Err(AllocError::OutOfMemory { size: SMALL_BLOCK }));
    assert_eq!(wmem.block_count(), 0);
    wmem.verify().unwrap();

    log.allow(1);
    let max = wmem.config().max_alloc_size();
    let p = wmem.alloc(max).unwrap();
    fill(p, max, 0x99);

    // The only block is full; the next request needs another.
    assert!(matches!(wmem.alloc(1), Err(AllocError::OutOfMemory { .. })));
    assert_eq!(wmem.block_count(), 1);
    assert_eq!(log.outstanding.get(), 1);
    wmem.verify().unwrap();
    assert!(filled(p, max, 0x99));

    // After a free the same request is served from the recycled chunk.
    unsafe { wmem.free(p) };
    let q = wmem.alloc(1).unwrap();
    assert_eq!(wmem.block_count(), 1);
    unsafe { wmem.free(q) };
    wmem.verify().unwrap();
}

#[test]
fn refused_jumbo_is_reported() {
    let (mut wmem, log) = scripted(SMALL_BLOCK);
    log.deny_all();

    let size = 4 * SMALL_BLOCK;
    let err = wmem.alloc(size).unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory { size: s } if s > size));
    assert_eq!(wmem.block_count(), 0);
}

#[test]
fn unrepresentable_request_overflows() {
    let (mut wmem, _log) = scripted(SMALL_BLOCK);
    assert_eq!(
        wmem.alloc(usize::MAX),
        Err(AllocError::SizeOverflow { size: usize::MAX })
    );
    assert_eq!(wmem.block_count(), 0);
}

#[test]
fn refused_jumbo_realloc_keeps_old_allocation() {
    let (mut wmem, log) = scripted(SMALL_BLOCK);
    let p = wmem.alloc(2 * SMALL_BLOCK).unwrap();
    fill(p, 256, 0x5A);

    log.deny_all();
    let err = unsafe { wmem.realloc(p, 8 * SMALL_BLOCK) }.unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory { .. }));
    assert!(filled(p, 256, 0x5A));
    assert_eq!(wmem.jumbo_count(), 1);
    wmem.verify().unwrap();

    log.allow_all();
    let q = unsafe { wmem.realloc(p, 8 * SMALL_BLOCK) }.unwrap();
    assert!(filled(q, 256, 0x5A));
    wmem.verify().unwrap();
}

#[test]
fn refused_move_keeps_old_allocation() {
    let (mut wmem, log) = scripted(SMALL_BLOCK);
    let max = wmem.config().max_alloc_size();
    let p = wmem.alloc(100).unwrap();
    fill(p, 100, 0x01);
    let _pin = wmem.alloc(8).unwrap();

    log.deny_all();
    // Cannot grow in place (pinned) and cannot get a fresh block.
    assert!(unsafe { wmem.realloc(p, max) }.is_err());
    assert!(filled(p, 100, 0x01));
    assert_eq!(unsafe { wmem.usable_size(p) }, 112);
    wmem.verify().unwrap();
}

#[test]
fn drop_returns_every_region() {
    let (mut wmem, log) = scripted(SMALL_BLOCK);
    for i in 0..50 {
        wmem.alloc(i * 37).unwrap();
    }
    wmem.alloc(10 * SMALL_BLOCK).unwrap();
    assert!(log.outstanding.get() > 2);
    assert_eq!(log.bytes.get(), wmem.stats().os_bytes);

    drop(wmem);
    assert_eq!(log.outstanding.get(), 0);
    assert_eq!(log.bytes.get(), 0);
}

#[test]
fn free_all_then_gc_releases_everything() {
    let (mut wmem, log) = scripted(SMALL_BLOCK);
    for i in 0..200 {
        wmem.alloc(i * 13).unwrap();
    }
    wmem.alloc(5 * SMALL_BLOCK).unwrap();

    wmem.free_all();
    assert_eq!(wmem.jumbo_count(), 0);
    assert_eq!(log.outstanding.get(), wmem.block_count());

    wmem.gc();
    assert_eq!(wmem.block_count(), 0);
    assert_eq!(log.outstanding.get(), 0);
}
