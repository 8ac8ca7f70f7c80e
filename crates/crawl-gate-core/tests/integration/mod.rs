pub mod common;
mod gate_tests;
mod parallel_tests;
