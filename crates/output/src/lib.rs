pub mod convert;
pub mod interleave;
pub mod write;
