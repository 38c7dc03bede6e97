//! EtherNet/IP transport for Logix controllers: session registration,
//! unconnected explicit messaging and tag metadata upload.

pub mod session;
pub mod tags;

pub use session::{consts, CommPath, EipError, EipSession};
pub use tags::LogixController;
