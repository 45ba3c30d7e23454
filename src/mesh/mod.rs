//! Communities and the manager that schedules across them.

mod community;
mod tmesh;

pub use community::*;
pub use tmesh::*;
