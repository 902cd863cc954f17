#![no_std]
#![no_main]
#![feature(panic_info_message)]
#![feature(strict_provenance)]
#![feature(const_mut_refs)]
#![cfg_attr(test, feature(custom_test_frameworks))]
#![cfg_attr(test, test_runner(crate::test::test_runner))]
#![cfg_attr(test, reexport_test_harness_main = "test_main")]

extern crate alloc;

mod asm;
mod riscv;
mod memlayout;
mod param;
mod uart;
mod start;
mod spinlock;
mod sleeplock;
mod proc;
mod console;
mod printf;
mod klog;
mod kalloc;
mod string;
mod vm;
mod trap;
mod plic;
mod buf;
mod bio;
mod fs;
mod file;
mod pipe;
mod stat;
mod virtio;

mod log;

#[cfg(test)]
mod test;
#[cfg(test)]
mod test_device;

use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicBool, Ordering};
use crate::console::Console;
use crate::kalloc::KMem;
use crate::proc::cpuid;
use crate::riscv::__sync_synchronize;
use ::log::{info, LevelFilter};

// ///////////////////////////////////
// / LANGUAGE STRUCTURES / FUNCTIONS
// ///////////////////////////////////
#[no_mangle]
extern "C" fn eh_personality() {}
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    printf!("Aborting: \n");
    if let Some(p) = info.location() {
        printf!(
            "line {}, file {}: {}\n",
            p.line(),
            p.file(),
            info.message().unwrap()
        );
    }
    else {
        printf!("no information available.\n");
    }
    abort();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test::test_panic_handler(info)
}

#[no_mangle]
extern "C"
fn abort() -> ! {
    loop {
        unsafe {
            core::arch::asm!("wfi")
        }
    }
}

struct NoopAllocator{}
unsafe impl Sync for NoopAllocator {}
unsafe impl GlobalAlloc for NoopAllocator {
    unsafe fn alloc(&self, _layout: Layout) -> *mut u8 {
        todo!()
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        todo!()
    }
}
#[global_allocator]
static ALLOCATOR: NoopAllocator = NoopAllocator{};

static STARTED: AtomicBool = AtomicBool::new(false);

#[no_mangle]
pub extern "C" fn kmain() {
    if cpuid() == 0 {
        Console::init();
        printf!("\nxv6 kernel is booting...\n\n");

        let level = if cfg!(debug_assertions) { LevelFilter::Trace } else { LevelFilter::Info };
        klog::init(level).expect("klog::init called twice");

        #[cfg(test)]
        {
            KMem::kinit();
            bio::binit();
            test_main();
        }

        KMem::kinit(); // physical page allocator
        info!("kernel memory initialized ({} per-CPU pools)", crate::param::NCPU);

        vm::kvminit(); // create kernel page table
        info!("virtual memory initialized");

        vm::kvminithart(); // turn on paging
        info!("paging turned on");

        proc::procinit(); // process table
        info!("processes initialized");

        trap::trapinit(); // trap vectors
        trap::trapinithart(); // install kernel trap vector
        info!("trap initialized");

        plic::plicinit(); // set up interrupt controller
        plic::plicinithart(); // ask PLIC for device interrupts
        info!("plic initialized");

        bio::binit(); // buffer cache
        info!("buffer cache initialized ({} buffers, {} buckets)", crate::param::NBUF, crate::param::NBUCKET);

        fs::fs::iinit(); // inode table
        file::file::fileinit(); // file table
        info!("itable ftable initialized");

        virtio::virtio_disk::virtio_disk_init(); // emulated hard disk
        info!("virtio disk initialized");

        proc::userinit(); // first user process
        info!("first user process initialized");

        __sync_synchronize();
        STARTED.store(true, Ordering::Relaxed);
        printf!("\nSystem boot successful\n")
    } else {
        while !STARTED.load(Ordering::Relaxed) {}

        __sync_synchronize();
        printf!("hart {} starting\n", cpuid());
        vm::kvminithart();    // turn on paging
        trap::trapinithart();   // install kernel trap vector
        plic::plicinithart();    // ask PLIC for device interrupts
    }

    proc::scheduler();
}