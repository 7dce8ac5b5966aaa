//! x86_64 context switching
//!
//! Saved thread contexts, forging of initial contexts and the low-level
//! save/restore. Only callee-saved registers cross a switch: the switch is
//! always entered through a function call, so everything else is dead.

use crate::arch::ForgeSpec;

/// Saved CPU context of a thread that is not running
#[derive(Debug, Clone, Default)]
#[repr(C)]
pub struct Context {
    // Callee-saved registers (offsets are baked into the switch asm)
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,

    // Stack pointer
    pub rsp: u64,

    // Instruction pointer (resume address)
    pub rip: u64,

    // Flags register
    pub rflags: u64,
}

impl Context {
    /// Context slot for a thread that is already running (the bootstrap
    /// thread). Filled in by the first switch away from it.
    pub fn bootstrap() -> Self {
        Self::default()
    }

    /// Forge the initial context of a new thread.
    ///
    /// The first switch into this context lands in the wrapper with the
    /// entry function in R12 and its argument in R13, on a fresh stack.
    pub fn forged(spec: &ForgeSpec) -> Self {
        let stack_top = spec.stack_top & !0xF;

        Self {
            rbx: 0,
            rbp: 0,
            r12: spec.entry,
            r13: spec.arg,
            r14: 0,
            r15: 0,
            rsp: stack_top,
            rip: spec.wrapper,
            rflags: 0x202, // IF=1, reserved bit 1 always set
        }
    }
}

/// Low-level context switch.
///
/// Saves the callee-saved registers and stack of the calling thread into
/// `from`, then resumes execution at `to`'s saved instruction pointer on
/// `to`'s stack. Returns only when the `from` context is switched back in.
///
/// # Safety
/// Both pointers must reference live, correctly forged or previously saved
/// contexts, and `to` must not be the running thread's own context.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(from: *mut Context, to: *const Context) {
    core::arch::naked_asm!(
        // RDI = from, RSI = to

        // Save callee-saved registers
        "mov [rdi + 0x00], rbx",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], r12",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r14",
        "mov [rdi + 0x28], r15",

        // Save RSP
        "mov [rdi + 0x30], rsp",

        // Save return address as RIP
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",

        // Load callee-saved registers from the target context
        "mov rbx, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov r12, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r14, [rsi + 0x20]",
        "mov r15, [rsi + 0x28]",

        // Load RSP
        "mov rsp, [rsi + 0x30]",

        // Jump to saved RIP
        "jmp [rsi + 0x38]",

        // Resume point for the saved context
        "2:",
        "ret",
    );
}
