//! Out of scope: OS power-management hooks. The engine never calls into
//! this crate.
