//! Linux user-mode front end: guest address space, static ELF
//! loading and the syscall subset guest programs need.

pub mod guest_space;
pub mod loader;
pub mod syscall;

pub use guest_space::GuestSpace;
pub use loader::{load_elf, ElfInfo, LoadError};
pub use syscall::{handle_syscall, SyscallResult};
