pub mod feedback;
pub mod push;
pub mod stats;
