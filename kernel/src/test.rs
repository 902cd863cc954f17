// In-kernel test harness.
//
// `cargo test` can't run a #![no_std] #![no_main] kernel on the host, so
// tests are instead collected by `#![feature(custom_test_frameworks)]`
// into a `test_main()` entry point that kmain() calls when built with
// `cfg(test)`. Pass/fail is reported back to the process that launched
// qemu by writing to the SiFive test-finisher device, since there's no
// other way for a bare-metal binary to hand an exit code to the host.

use crate::printf;

pub trait Testable {
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        printf!("{}...\t", core::any::type_name::<T>());
        self();
        printf!("[ok]\n");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    printf!("running {} tests\n", tests.len());
    for test in tests {
        test.run();
    }
    crate::test_device::exit_pass();
}

pub fn test_panic_handler(info: &core::panic::PanicInfo) -> ! {
    printf!("[failed]\n");
    printf!("{}\n", info);
    crate::test_device::exit_fail();
}
