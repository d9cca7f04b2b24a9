pub mod prio_bitmap;

pub use prio_bitmap::PriorityBitmap;
