//! Cross-crate tests: decoding and block formation, host code
//! emission, and end-to-end execution of small guest programs.
#![cfg(test)]

mod backend;
mod core_state;
mod rv;
