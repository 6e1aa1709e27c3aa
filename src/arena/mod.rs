pub mod generational;

pub use generational::{Arena, Index};
