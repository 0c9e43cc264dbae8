//! Entity instances, references and the identity pool.

mod handle;
mod pool;
mod reference;

pub use handle::{ErasedHandle, Handle, LifecycleState};
pub use pool::{Instantiated, Pool};
pub use reference::Reference;
