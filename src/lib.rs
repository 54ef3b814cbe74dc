pub mod construct;
pub mod elements;
pub mod errors;
pub mod stack;
pub mod synth;
pub mod tokens;
