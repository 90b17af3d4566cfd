#![no_std]
extern crate alloc;

pub mod assets;
pub mod audio;
pub mod console;
pub mod font;
pub mod input;
pub mod rng;
