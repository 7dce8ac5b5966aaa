//! Interrupt Descriptor Table and vector dispatch
//!
//! CPU exceptions get fixed handlers; hardware IRQ vectors 32..48 are
//! routed through a dispatch table that external code registers into.

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use super::{pic, pit};

/// Registered handler plus its opaque context
type VectorEntry = Option<(fn(usize), usize)>;

/// Dispatch table for hardware vectors
static VECTORS: Mutex<[VectorEntry; 256]> = Mutex::new([None; 256]);

/// Register a handler-with-context for a vector
pub fn register(vector: u8, handler: fn(usize), context: usize) {
    VECTORS.lock()[vector as usize] = Some((handler, context));
}

/// Remove the handler for a vector
pub fn unregister(vector: u8) {
    VECTORS.lock()[vector as usize] = None;
}

fn dispatch(vector: u8) {
    let entry = VECTORS.lock()[vector as usize];
    if let Some((handler, context)) = entry {
        handler(context);
    }
}

/// Common IRQ path. The timer vector is acknowledged before its handler
/// runs: the handler may context-switch, and the thread switched to must
/// not owe the PIC an EOI.
fn irq_common(vector: u8) {
    if vector == pic::PIC1_OFFSET {
        pit::on_tick();
        unsafe {
            pic::PICS.lock().notify_end_of_interrupt(vector);
        }
        dispatch(vector);
    } else {
        dispatch(vector);
        unsafe {
            pic::PICS.lock().notify_end_of_interrupt(vector);
        }
    }
}

macro_rules! irq_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            irq_common($vector);
        }
    };
}

irq_stub!(irq0, 32);
irq_stub!(irq1, 33);
irq_stub!(irq2, 34);
irq_stub!(irq3, 35);
irq_stub!(irq4, 36);
irq_stub!(irq5, 37);
irq_stub!(irq6, 38);
irq_stub!(irq7, 39);
irq_stub!(irq8, 40);
irq_stub!(irq9, 41);
irq_stub!(irq10, 42);
irq_stub!(irq11, 43);
irq_stub!(irq12, 44);
irq_stub!(irq13, 45);
irq_stub!(irq14, 46);
irq_stub!(irq15, 47);

extern "x86-interrupt" fn breakpoint_handler(frame: InterruptStackFrame) {
    crate::log_warn!("[INT] breakpoint at {:#x}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn invalid_opcode_handler(frame: InterruptStackFrame) {
    panic!("invalid opcode at {:#x}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn general_protection_fault_handler(frame: InterruptStackFrame, code: u64) {
    panic!(
        "general protection fault (code {:#x}) at {:#x}",
        code,
        frame.instruction_pointer.as_u64()
    );
}

extern "x86-interrupt" fn page_fault_handler(frame: InterruptStackFrame, code: PageFaultErrorCode) {
    let addr = x86_64::registers::control::Cr2::read();
    panic!(
        "page fault at {:?} ({:?}), rip {:#x}",
        addr,
        code,
        frame.instruction_pointer.as_u64()
    );
}

extern "x86-interrupt" fn double_fault_handler(frame: InterruptStackFrame, _code: u64) -> ! {
    panic!("double fault, rip {:#x}", frame.instruction_pointer.as_u64());
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.double_fault.set_handler_fn(double_fault_handler);

        idt[32].set_handler_fn(irq0);
        idt[33].set_handler_fn(irq1);
        idt[34].set_handler_fn(irq2);
        idt[35].set_handler_fn(irq3);
        idt[36].set_handler_fn(irq4);
        idt[37].set_handler_fn(irq5);
        idt[38].set_handler_fn(irq6);
        idt[39].set_handler_fn(irq7);
        idt[40].set_handler_fn(irq8);
        idt[41].set_handler_fn(irq9);
        idt[42].set_handler_fn(irq10);
        idt[43].set_handler_fn(irq11);
        idt[44].set_handler_fn(irq12);
        idt[45].set_handler_fn(irq13);
        idt[46].set_handler_fn(irq14);
        idt[47].set_handler_fn(irq15);

        idt
    };
}

/// Load the IDT and remap the PICs
pub fn init() {
    IDT.load();
    unsafe {
        pic::PICS.lock().initialize();
    }
    crate::log!("[INT] IDT loaded, PICs remapped to 32..48");
}
