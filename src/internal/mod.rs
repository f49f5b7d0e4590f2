//! Internal building blocks (the commit object model) that power the public API.

pub mod object;
