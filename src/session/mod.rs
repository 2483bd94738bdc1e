pub mod assembler;
pub mod controller;
