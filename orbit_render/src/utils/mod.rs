pub mod alignment;

pub use alignment::{align_up, next_power_of_two, GrowthPolicy};
