pub mod editor;
pub mod fixtures;

pub use editor::{TestEditor, TestLog};
