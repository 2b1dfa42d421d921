// Buffer module: bounded storage for packets nobody is listening to yet
pub mod packet_buffer;

pub use packet_buffer::*;
