//! Integer helpers that the expansion rules need and the standard library does not provide.
pub(crate) mod diophantine;
pub(crate) mod num_ext;
