//! The server-side components that sit above the generic Git smart-protocol
//! engine (`protocol::`) and the Change model (`change::`): the Repository
//! Gateway, ref advertiser, receive/upload pipelines, revision operations
//! and the review surface (§4).

pub mod error;
pub mod gateway;
pub mod receive_pipeline;
pub mod ref_advertiser;
pub mod revision_ops;
pub mod review;
pub mod upload_pipeline;
