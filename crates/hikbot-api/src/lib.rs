// hikbot-api: Async client for the Hikvision ISAPI camera firmware interface

pub mod client;
pub mod error;
pub mod model;
pub mod stream;
pub mod transport;

pub use client::{AlertStream, CameraApi, HikvisionClient};
pub use error::Error;
pub use model::{Detection, IrcutFilter, Resolution};
pub use transport::{AuthScheme, ClientConfig};
