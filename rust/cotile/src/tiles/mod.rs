mod dim;
pub mod layout;
mod rt;
mod st;
mod tile;

pub use dim::*;
pub use rt::*;
pub use st::*;
pub use tile::*;
