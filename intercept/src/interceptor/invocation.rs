use crate::types::PtRegs;

// ── x86-64 syscall ABI ──────────────────────────────────────────────
//
// Arg0=RDI, Arg1=RSI, Arg2=RDX, Arg3=R10, Arg4=R8, Arg5=R9
// Number=ORIG_RAX
//
// Arg3 lives in R10, not RCX: `syscall` clobbers RCX with the return address.

/// Read syscall argument `n` from the saved frame. Only register values are
/// read; nothing they point at is touched.
#[inline]
pub fn syscall_argument(regs: &PtRegs, n: u8) -> Option<u64> {
    let val = match n {
        0 => regs.di,
        1 => regs.si,
        2 => regs.dx,
        3 => regs.r10,
        4 => regs.r8,
        5 => regs.r9,
        _ => return None,
    };
    Some(val)
}

#[inline]
pub fn syscall_nr(regs: &PtRegs) -> u64 {
    regs.orig_ax
}
