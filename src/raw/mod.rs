mod arena;
mod handle;
mod node;
mod tree;

pub(crate) use handle::Handle;
pub(crate) use tree::{DEFAULT_CAPACITY, RawTree};
