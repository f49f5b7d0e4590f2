//! `gitreview-internal` implements the Git transport pipeline and Change
//! engine behind a Gerrit-style code review server: a smart-protocol front
//! end, a magic-branch receive pipeline that turns pushes into reviewable
//! Changes, the synthetic-ref advertiser, and the revision operations
//! (rebase, cherry-pick, submit, revert) that act on them.
pub mod change;
pub mod config;
pub mod errors;
pub mod hash;
pub mod internal;
pub mod protocol;
pub mod server;
