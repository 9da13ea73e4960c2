pub mod parsing;
pub mod privileges;

// Re-export commonly used items
pub use privileges::{ensure_root, is_root};
