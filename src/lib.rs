//! A small dataflow graph runtime: placeholders, device-scoped op placement
//! and sessions that run ops on the host or on a GPU through wgpu.
//!
//! ```no_run
//! use gosgraph::{feed_dict, Device, Graph, Session, SessionConfig, Tensor};
//!
//! # fn main() -> Result<(), gosgraph::GosgraphError> {
//! let mut graph = Graph::new();
//! let x = graph.placeholder_f32("x", vec![3])?;
//! let loss = graph.with_device(Device::Gpu, |g| g.l2_loss(&x))?;
//!
//! let mut sess = Session::new(&graph, SessionConfig::from_env()?)?;
//! let feeds = feed_dict! { &x => Some(Tensor::from_f32(vec![1.0, 2.0, 3.0], vec![3])?) };
//! assert_eq!(sess.run(&loss, &feeds)?.scalar_value(), Some(7.0));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod gpu;
pub mod graph;
pub mod index_library;
mod macros;
pub mod ops;
pub mod session;
pub mod utils;

pub use config::SessionConfig;
pub use device::{Device, DeviceScope};
pub use errors::GosgraphError;
pub use graph::{Graph, Tensor, TensorType};
pub use session::{FeedDict, Session};
