//! Read-only views of buffer state consumed by the rendering layer

pub mod cursor;
