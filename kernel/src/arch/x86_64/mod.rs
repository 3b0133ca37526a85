//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! x86_64 裸机后端

#[cfg(not(target_arch = "x86_64"))]
compile_error!("bare-metal builds only support x86_64");

pub mod context;
pub mod cpu;
