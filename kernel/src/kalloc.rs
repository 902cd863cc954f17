// Physical page allocator.
//
// Free pages are kept in NCPU independent per-CPU pools instead of one
// global freelist, so that concurrent kalloc()/kfree() calls from
// different harts don't serialize on a single spinlock. Each pool owns
// its own spinlock and singly-linked freelist. A kalloc() that finds its
// own pool empty steals a page from another pool rather than failing --
// pages aren't CPU-affine data, just free memory, so there's no
// correctness reason to let one hart starve while another sits on spare
// pages.

use core::ptr;

use crate::memlayout::PHYSTOP;
use crate::param::NCPU;
use crate::proc::cpuid;
use crate::riscv::PGSIZE;
use crate::spinlock::{pop_off, push_off, Spinlock};
use crate::string::memset;
use crate::PGROUNDUP;
use log::{debug, trace, warn};

extern "C" {
    // first address after kernel.
    // defined by kernel.ld.
    static mut end: u8;
}

struct Run {
    next: *mut Run,
}

#[derive(Copy, Clone)]
struct Pool {
    lock: Spinlock,
    freelist: *mut Run,
}

pub struct KMem {
    pool: [Pool; NCPU],
}

pub static mut KMEM: KMem = KMem::create();

impl KMem {
    const fn create() -> Self {
        Self {
            pool: [Pool {
                lock: Spinlock::init_lock("kmem"),
                freelist: ptr::null_mut(),
            }; NCPU],
        }
    }

    /// Hand out the whole free-RAM range to CPU 0's pool at boot, then
    /// let kalloc()'s steal fallback redistribute pages to other CPUs as
    /// they start allocating. There is no other coordination point this
    /// early, so an even split isn't worth the complexity.
    pub fn kinit() {
        unsafe {
            KMEM.freerange_into((&mut end) as *mut u8, PHYSTOP as *mut u8, 0);
        }
    }

    fn freerange_into<T: Sized>(self: &mut Self, pa_start: *mut T, pa_end: *mut T, id: usize) {
        let mut p = PGROUNDUP!(pa_start);
        let mut n = 0;
        while p + PGSIZE <= pa_end as usize {
            self.free_into(p as *mut T, id);
            p += PGSIZE;
            n += 1;
        }
        debug!("kalloc: seeded pool {id} with {n} pages");
    }

    fn free_into<T: Sized>(self: &mut Self, pa: *mut T, id: usize) {
        unsafe {
            let pa_usize = pa as usize;
            if pa_usize % PGSIZE != 0
                || pa_usize < ((&end) as *const u8) as usize
                || pa_usize >= PHYSTOP
            {
                panic!("kfree");
            }
        }

        // Fill with junk to catch dangling refs.
        memset(pa as *mut u8, 1, PGSIZE);

        let r = pa as *mut Run;

        self.pool[id].lock.acquire();
        unsafe {
            (*r).next = self.pool[id].freelist;
        }
        self.pool[id].freelist = r;
        self.pool[id].lock.release();
    }

    /// Free the page of physical memory pointed at by pa, which normally
    /// should have been returned by a call to kalloc(). Returned to the
    /// freeing CPU's own pool -- the allocating CPU, if different, will
    /// pick it up later via the steal path rather than this call paying
    /// the cost of finding the page's original owner.
    pub fn kfree<T: Sized>(self: &mut Self, pa: *mut T) {
        push_off();
        let id = cpuid();
        self.free_into(pa, id);
        pop_off();
    }

    /// Allocate one 4096-byte page of physical memory. Returns a null
    /// pointer if no page can be found in any pool.
    pub fn kalloc<T: Sized>(self: &mut Self) -> *mut T {
        push_off();
        let id = cpuid();

        let mut r = self.take_from(id);

        if r.is_null() {
            for i in 1..NCPU {
                let other = (id + i) % NCPU;
                r = self.take_from(other);
                if !r.is_null() {
                    warn!("kalloc: pool {id} empty, stole a page from pool {other}");
                    break;
                }
            }
        } else {
            trace!("kalloc: pool {id} served locally");
        }

        pop_off();

        if !r.is_null() {
            memset(r as *mut u8, 5, PGSIZE); // fill with junk
        }
        r as *mut T
    }

    fn take_from(self: &mut Self, id: usize) -> *mut Run {
        self.pool[id].lock.acquire();
        trace!("kalloc: holding {}", self.pool[id].lock.name());
        let r = self.pool[id].freelist;
        if !r.is_null() {
            unsafe {
                self.pool[id].freelist = (*r).next;
            }
        }
        self.pool[id].lock.release();
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn pools_start_empty_apart_from_boot_seeding() {
        // Every pool's lock is independently named, not shared -- a
        // regression here would silently serialize all CPUs again.
        let fresh = KMem::create();
        for p in fresh.pool.iter() {
            assert!(p.freelist.is_null());
        }
    }

    #[test_case]
    fn steal_order_wraps_around_from_the_requesting_cpu() {
        let id = 5usize;
        let mut seen = 0;
        for i in 1..NCPU {
            let other = (id + i) % NCPU;
            assert_ne!(other, id);
            seen += 1;
        }
        assert_eq!(seen, NCPU - 1);
    }
}
