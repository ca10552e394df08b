pub mod bug;
pub mod dates;
pub mod priority;
pub mod task;
