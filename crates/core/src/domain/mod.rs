pub mod analysis;
pub mod market;
pub mod research;
