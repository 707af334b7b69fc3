//! Layer archive codec.
//!
//! A layer archive is a single distributable file:
//!
//! ```text
//! [40-byte magic][u32 LE length N][N bytes info.json][filesystem image to EOF]
//! ```
//!
//! The image is produced and consumed by an [`ImageBackend`]; production uses
//! EROFS through [`ErofsBackend`].

pub mod backend;
pub mod dir;
pub mod file;
pub mod packager;

pub use backend::{ErofsBackend, ImageBackend};
pub use dir::LayerDir;
pub use file::LayerFile;
pub use packager::LayerPackager;
