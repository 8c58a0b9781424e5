mod operations;
mod slotted_node;

pub use operations::{delete_key, delete_node, get, insert, split};
pub use slotted_node::SlottedNode;
