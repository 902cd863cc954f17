// Buffer cache.
//
// The buffer cache holds cached copies of disk block contents, sharded
// across NBUCKET independent hash chains so that concurrent lookups for
// different blocks don't serialize on a single lock. Caching disk blocks
// in memory reduces the number of disk reads and also provides a
// synchronization point for disk blocks used by multiple processes.
//
// Interface:
// * To get a buffer for a particular disk block, call bread.
// * After changing buffer data, call bwrite to write it to disk.
// * When done with the buffer, call brelse.
// * Do not use the buffer after calling brelse.
// * Only one process at a time can use a buffer,
//     so do not keep them longer than necessary.
//
// Each bucket owns a spinlock, a circular doubly-linked list of buffers,
// and a sentinel node (itself a full `Buf`, used only for its prev/next
// links) that forms the head of that list. A buffer is always in exactly
// one bucket's list -- its home bucket, `hash(dev, blockno) % NBUCKET` --
// whenever its refcnt is nonzero. Idle (refcnt == 0) buffers are fair
// game for any bucket to steal: that's what keeps a skewed workload from
// starving while other buckets sit on unused buffers.

use core::ptr::NonNull;

use crate::buf::Buf;
use crate::param::{NBUCKET, NBUF};
use crate::spinlock::Spinlock;
use crate::virtio::virtio_disk::virtio_disk_rw;
use log::{debug, trace, warn};

struct BCache {
    buf: [Buf; NBUF],
    bucket_lock: [Spinlock; NBUCKET],
    // Sentinel head of each bucket's circular list. Only prev/next are
    // meaningful; the rest of the Buf fields are unused.
    bucket: [Buf; NBUCKET],
}

static mut BCACHE: BCache = BCache {
    buf: [Buf::new(); NBUF],
    bucket_lock: [Spinlock::init_lock("bcache.bucket"); NBUCKET],
    bucket: [Buf::new(); NBUCKET],
};

fn home_bucket(dev: u32, blockno: u32) -> usize {
    ((dev as u64 + blockno as u64) % NBUCKET as u64) as usize
}

pub fn binit() {
    unsafe {
        for i in 0..NBUCKET {
            let head_ptr = &mut BCACHE.bucket[i] as *mut Buf;
            (*head_ptr).prev = NonNull::new(head_ptr);
            (*head_ptr).next = NonNull::new(head_ptr);
        }

        // Statically distribute all buffers across buckets by index mod
        // NBUCKET -- any deterministic assignment works, since every
        // buffer starts out idle and eligible for reuse from any bucket.
        for (i, b) in BCACHE.buf.iter_mut().enumerate() {
            let bucketid = i % NBUCKET;

            let head_ptr = &mut BCACHE.bucket[bucketid] as *mut Buf;
            let head = head_ptr.as_mut().unwrap();

            let b_ptr = NonNull::new(b as *mut Buf);
            b.next = head.next;
            b.prev = NonNull::new(head_ptr);
            head.next.unwrap().as_mut().prev = b_ptr;
            head.next = b_ptr;
        }
    }
}

/// Walk `bucketid`'s list looking for a buffer satisfying `pred`. Caller
/// must hold `bucket_lock[bucketid]`.
unsafe fn scan_bucket(bucketid: usize, mut pred: impl FnMut(&Buf) -> bool) -> Option<*mut Buf> {
    let head_ptr = &mut BCACHE.bucket[bucketid] as *mut Buf;
    let mut p = (*head_ptr).next.unwrap().as_ptr();
    while p != head_ptr {
        let b = &*p;
        if pred(b) {
            return Some(p);
        }
        p = b.next.unwrap().as_ptr();
    }
    None
}

/// Hit or local-reuse check against a single bucket. Caller must hold
/// `bucket_lock[bucketid]`. Does not touch any other bucket's lock.
unsafe fn try_fast_path(bucketid: usize, dev: u32, blockno: u32) -> Option<*mut Buf> {
    if let Some(p) = scan_bucket(bucketid, |b| b.dev == dev && b.blockno == blockno) {
        let b = &mut *p;
        b.refcnt += 1;
        trace!("bcache: hit dev={dev} blockno={blockno} bucket={bucketid} refcnt={}", b.refcnt);
        return Some(p);
    }
    if let Some(p) = scan_bucket(bucketid, |b| b.refcnt == 0) {
        let b = &mut *p;
        b.dev = dev;
        b.blockno = blockno;
        b.valid = false;
        b.refcnt = 1;
        debug!("bcache: reused idle buffer in place, bucket={bucketid} dev={dev} blockno={blockno}");
        return Some(p);
    }
    None
}

/// Unlink `b` from whatever list it is currently in (caller holds that
/// bucket's lock) and splice it at the head of `home`'s list (caller
/// holds `home`'s lock too).
unsafe fn relink_into_home(b_ptr: *mut Buf, home: usize) {
    let b = &mut *b_ptr;
    b.next.unwrap().as_mut().prev = b.prev;
    b.prev.unwrap().as_mut().next = b.next;

    let home_head_ptr = &mut BCACHE.bucket[home] as *mut Buf;
    let home_head = &mut *home_head_ptr;
    // b.prev must point at the home bucket's own sentinel node, not at
    // the bucket array's base address -- the latter is a known bug in
    // the original C implementation that leaves the first stolen
    // buffer's backward pointer inconsistent.
    b.next = home_head.next;
    b.prev = NonNull::new(home_head_ptr);
    home_head.next.unwrap().as_mut().prev = NonNull::new(b_ptr);
    home_head.next = NonNull::new(b_ptr);
}

/// Look through the buffer cache for block (dev, blockno). If not found,
/// claim an idle buffer -- preferring one already in the home bucket,
/// falling back to stealing one from another bucket. In either case,
/// return the buffer with its sleep-lock held.
fn bget(dev: u32, blockno: u32) -> &'static mut Buf {
    let home = home_bucket(dev, blockno);

    loop {
        unsafe {
            BCACHE.bucket_lock[home].acquire();
            trace!("bcache: holding {} for dev={dev} blockno={blockno}", BCACHE.bucket_lock[home].name());
            if let Some(p) = try_fast_path(home, dev, blockno) {
                BCACHE.bucket_lock[home].release();
                let b = &mut *p;
                b.lock.acquire_sleep();
                return b;
            }
            BCACHE.bucket_lock[home].release();

            // Cross-bucket steal. Probe one bucket lock at a time (never
            // nested) to find a bucket that looks like it holds an idle
            // buffer.
            let mut victim = None;
            for i in 1..NBUCKET {
                let candidate = (home + i) % NBUCKET;
                BCACHE.bucket_lock[candidate].acquire();
                let has_idle = scan_bucket(candidate, |b| b.refcnt == 0).is_some();
                BCACHE.bucket_lock[candidate].release();
                if has_idle {
                    victim = Some(candidate);
                    break;
                }
            }

            let Some(victim) = victim else {
                panic!("bget: no buffers");
            };

            // Commit phase: acquire both locks in ascending bucket index
            // order, regardless of which one is home, so that no two
            // threads can ever wait on each other's lock (a fixed total
            // order over all shard locks rules out cycles).
            let (first, second) = if home < victim { (home, victim) } else { (victim, home) };
            BCACHE.bucket_lock[first].acquire();
            BCACHE.bucket_lock[second].acquire();

            // Another thread may have inserted (dev, blockno), or freed a
            // buffer, into the home bucket while we held no locks at
            // all. Re-run the cheap fast path before trusting the
            // steal we scouted.
            if let Some(p) = try_fast_path(home, dev, blockno) {
                BCACHE.bucket_lock[second].release();
                BCACHE.bucket_lock[first].release();
                let b = &mut *p;
                b.lock.acquire_sleep();
                return b;
            }

            if let Some(p) = scan_bucket(victim, |b| b.refcnt == 0) {
                let b = &mut *p;
                b.dev = dev;
                b.blockno = blockno;
                b.valid = false;
                b.refcnt = 1;
                relink_into_home(p, home);
                warn!("bcache: stole buffer from bucket {victim} into bucket {home} for dev={dev} blockno={blockno}");
                BCACHE.bucket_lock[second].release();
                BCACHE.bucket_lock[first].release();
                b.lock.acquire_sleep();
                return b;
            }

            // Lost the race: the buffer we scouted got claimed by
            // someone else between the scout scan and the commit.
            // Release everything and restart from the top.
            BCACHE.bucket_lock[second].release();
            BCACHE.bucket_lock[first].release();
            trace!("bcache: steal race lost for dev={dev} blockno={blockno}, restarting bget");
        }
    }
}

// Return a locked buf with the contents of the indicated block.
pub fn bread(dev: u32, blockno: u32) -> &'static mut Buf {
    let b = bget(dev, blockno);
    if !b.valid {
        unsafe { virtio_disk_rw(b, false) };
        b.valid = true
    }

    return b;
}

// Write b's contents to disk.  Must be locked.
pub fn bwrite(b: &mut Buf) {
    if !b.lock.holding_sleep() {
        panic!("bwrite");
    }
    unsafe {
        virtio_disk_rw(b, true);
    }
}

// Release a locked buffer.
pub fn brelse(b: &mut Buf) {
    if !b.lock.holding_sleep() {
        panic!("brelse");
    }

    b.lock.release_sleep();

    let bucketid = home_bucket(b.dev, b.blockno);
    unsafe {
        BCACHE.bucket_lock[bucketid].acquire();
        b.refcnt -= 1;
        // refcnt reaching 0 makes the buffer a reuse candidate; there is
        // no write-back policy here and no recency list to maintain, so
        // there's nothing further to do.
        BCACHE.bucket_lock[bucketid].release();
    }
}

pub fn bpin(b: &mut Buf) {
    let bucketid = home_bucket(b.dev, b.blockno);
    unsafe {
        BCACHE.bucket_lock[bucketid].acquire();
        b.refcnt += 1;
        BCACHE.bucket_lock[bucketid].release()
    }
}

pub fn bunpin(b: *mut Buf) {
    unsafe {
        let b = b.as_mut().unwrap();
        let bucketid = home_bucket(b.dev, b.blockno);
        BCACHE.bucket_lock[bucketid].acquire();
        b.refcnt -= 1;
        BCACHE.bucket_lock[bucketid].release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn home_bucket_is_a_pure_function_of_identity() {
        assert_eq!(home_bucket(1, 0), home_bucket(1, 0));
        assert_eq!(home_bucket(1, 13), ((1u64 + 13) % NBUCKET as u64) as usize);
    }

    #[test_case]
    fn colliding_blocks_share_a_home_bucket() {
        // With NBUCKET = 13, blocks (1, 0) and (1, 13) collide on purpose
        // -- this is the scenario the local-reuse path is built for.
        assert_eq!(home_bucket(1, 0), home_bucket(1, 13));
        assert_ne!(home_bucket(1, 0), home_bucket(1, 1));
    }
}
