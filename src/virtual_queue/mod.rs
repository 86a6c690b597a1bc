pub mod ahead_output_queue;
pub mod virtual_queue;

pub use ahead_output_queue::AheadOutputQueue;
pub use virtual_queue::VirtualQueue;
