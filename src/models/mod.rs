//! Core data models: the object descriptor every operation revolves around
//! and the completed-part value fed back when finalizing a multipart upload.

pub mod object;
pub mod part;
