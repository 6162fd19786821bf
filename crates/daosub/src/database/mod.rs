//! Order store implementations

pub use daosub_common::database::{
    Directory, DirectoryWriter, DynDirectory, DynDirectoryWriter, DynOrderDatabase, Error,
    OrderDatabase,
};

mod memory;

pub use memory::OrderMemoryDatabase;
