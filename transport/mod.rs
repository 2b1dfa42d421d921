// Transport module: TCP connections and the timed-accept listener
pub mod options;
pub mod tcp;
pub mod acceptor;

pub use options::*;
pub use tcp::*;
pub use acceptor::*;
