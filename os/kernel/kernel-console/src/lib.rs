//! # Kernel Console
//!
//! Character output for diagnostics: a byte sink (`putc`/`puts`), `printf`
//! style rendering on top of it, and a [`log`] backend so kernel subsystems
//! can emit records without knowing where they end up.
//!
//! ## Output Mechanism
//! ```text
//! log::warn!(..)            kprint!(sink, ..)
//!     ↓                          ↓
//! ConsoleLogger ──────────► Console<S> (fmt::Write)
//!                                ↓
//!                         CharSink::putc()
//!                                ↓
//!              UART / QEMU debug port / test buffer
//! ```
//!
//! Subsystems such as the page frame allocator only emit `log` records and
//! keep working when no logger is installed, or when the installed logger
//! writes into a [`NullSink`].
//!
//! ## Usage
//! ```rust
//! use kernel_console::{CharSink, kprint};
//!
//! struct Capture(Vec<u8>);
//! impl CharSink for Capture {
//!     fn putc(&mut self, byte: u8) {
//!         self.0.push(byte);
//!     }
//! }
//!
//! let mut sink = Capture(Vec::new());
//! kprint!(sink, "{} pages at {:#x}\n", 4, 0x8000_0000u64);
//! assert_eq!(sink.0, b"4 pages at 0x80000000\n");
//! ```
//!
//! ## Features
//! * `qemu`: enables [`qemu::QemuDebugcon`], a sink writing to QEMU's
//!   `-debugcon` port `0x402` (x86-64 only).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::ConsoleLogger;

use core::fmt::{self, Write};

/// A byte-oriented output device.
pub trait CharSink {
    /// Transmit one byte.
    fn putc(&mut self, byte: u8);

    /// Transmit a string byte by byte.
    fn puts(&mut self, s: &str) {
        for b in s.bytes() {
            self.putc(b);
        }
    }
}

impl<S: CharSink + ?Sized> CharSink for &mut S {
    fn putc(&mut self, byte: u8) {
        (**self).putc(byte);
    }

    fn puts(&mut self, s: &str) {
        (**self).puts(s);
    }
}

/// Discards everything; stands in for an absent console.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullSink;

impl CharSink for NullSink {
    #[inline]
    fn putc(&mut self, _byte: u8) {}

    #[inline]
    fn puts(&mut self, _s: &str) {}
}

/// [`fmt::Write`] adapter over a [`CharSink`].
pub struct Console<S>(pub S);

impl<S: CharSink> Write for Console<S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.puts(s);
        Ok(())
    }
}

/// Render `args` into `sink`. Output is best-effort; formatting errors are ignored.
#[inline]
pub fn console_write<S: CharSink>(sink: &mut S, args: fmt::Arguments) {
    let _ = Console(sink).write_fmt(args);
}

/// `printf`-style output to a [`CharSink`] without allocating.
#[macro_export]
macro_rules! kprint {
    ($sink:expr, $($arg:tt)*) => {{
        $crate::console_write(&mut $sink, core::format_args!($($arg)*));
    }};
}

#[cfg(all(feature = "qemu", target_arch = "x86_64"))]
pub mod qemu {
    use crate::CharSink;

    /// The port number for QEMU's debug console.
    const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Sink for QEMU's `-debugcon` device.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct QemuDebugcon;

    impl CharSink for QemuDebugcon {
        #[inline]
        fn putc(&mut self, byte: u8) {
            // Safety: port 0x402 is output-only; on real hardware the write is ignored.
            unsafe { outb(QEMU_DEBUG_PORT, byte) }
        }
    }

    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn outb(port: u16, val: u8) {
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, nostack, preserves_flags)
            );
        }
    }
}
