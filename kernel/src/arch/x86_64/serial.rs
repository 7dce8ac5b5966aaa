//! Serial port driver for debug output
//!
//! 16550 UART on COM1, the sink behind the kernel logger on bare metal.

use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

/// Standard COM1 port address
const SERIAL_IO_PORT: u16 = 0x3F8;

lazy_static! {
    /// Global serial port instance protected by spinlock
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(SERIAL_IO_PORT) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

/// Initialize the serial port early so the first log line is not lazy
pub fn init() {
    let _ = SERIAL1.lock();
}

/// Print to the serial port (internal use)
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    // Interrupts stay off while the UART lock is held: a log call from an
    // interrupt handler must not deadlock against an interrupted writer.
    let was_enabled = super::interrupts::save_and_disable();
    let _ = SERIAL1.lock().write_fmt(args);
    super::interrupts::restore(was_enabled);
}
