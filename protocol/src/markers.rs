//! Reserved text markers exchanged between components.

/// Stdout control line announcing a rendered plot.
pub const IMAGE_MARKER: &str = "[IMAGE_GENERATED]:";

/// Stdout control line announcing a created or modified output file.
pub const FILE_MARKER: &str = "[FILE_GENERATED]:";

/// Prefix of the context-file reference appended to user messages.
pub const CONTEXT_FILE_PREFIX: &str = "\n[Context File: ";

/// Delimiters used when persisting thought text inside assistant content.
pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";
