pub mod dna;
pub mod fs;
