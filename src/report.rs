pub mod artifacts;
pub mod io;
pub mod summary;
