//! Pack negotiation glue between the smart-protocol state machine and
//! `RepositoryAccess`.
//!
//! Pack encoding/decoding itself is not this crate's job -- `RepositoryAccess`
//! implementations are expected to delegate to a real Git object database
//! (e.g. by shelling out to `git pack-objects`/`git index-pack`). This module
//! only turns want/have lists into a streamed response and hands received
//! pack bytes back to storage.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::core::RepositoryAccess;
use super::types::ProtocolError;

/// Negotiates and streams pack data for one upload-pack/receive-pack exchange.
pub struct PackNegotiator<'a, R>
where
    R: RepositoryAccess,
{
    repo_access: &'a R,
}

/// Pack data is chunked into pieces of this size before being pushed onto the
/// output channel, so large packs don't block on a single oversized send.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

impl<'a, R> PackNegotiator<'a, R>
where
    R: RepositoryAccess,
{
    pub fn new(repo_access: &'a R) -> Self {
        Self { repo_access }
    }

    /// Generate pack data satisfying `want`, excluding objects reachable from
    /// `have`, and stream it to the caller in fixed-size chunks.
    pub async fn generate_pack(
        &self,
        want: Vec<String>,
        have: Vec<String>,
    ) -> Result<ReceiverStream<Vec<u8>>, ProtocolError> {
        let pack_data = self
            .repo_access
            .generate_pack_data(&want, &have)
            .await
            .map_err(|e| {
                ProtocolError::repository_error(format!("Failed to generate pack: {e}"))
            })?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in pack_data.chunks(STREAM_CHUNK_SIZE) {
                if tx.send(chunk.to_vec()).await.is_err() {
                    break;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Hand a received pack payload to storage for indexing.
    pub async fn unpack(&self, pack_data: Bytes) -> Result<(), ProtocolError> {
        self.repo_access
            .index_pack_data(&pack_data)
            .await
            .map_err(|e| ProtocolError::repository_error(format!("Failed to index pack: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct DummyRepoAccess {
        indexed: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl RepositoryAccess for DummyRepoAccess {
        async fn get_repository_refs(&self) -> Result<Vec<(String, String)>, ProtocolError> {
            Ok(vec![])
        }
        async fn has_object(&self, _object_hash: &str) -> Result<bool, ProtocolError> {
            Ok(false)
        }
        async fn get_object(&self, _object_hash: &str) -> Result<Vec<u8>, ProtocolError> {
            Err(ProtocolError::repository_error(
                "not implemented".to_string(),
            ))
        }
        async fn generate_pack_data(
            &self,
            wants: &[String],
            _haves: &[String],
        ) -> Result<Vec<u8>, ProtocolError> {
            Ok(format!("PACK:{}", wants.join(",")).into_bytes())
        }
        async fn index_pack_data(&self, pack_data: &[u8]) -> Result<(), ProtocolError> {
            self.indexed.lock().unwrap().push(pack_data.to_vec());
            Ok(())
        }
        async fn update_reference(
            &self,
            _ref_name: &str,
            _old_hash: Option<&str>,
            _new_hash: &str,
        ) -> Result<(), ProtocolError> {
            Ok(())
        }
        async fn has_default_branch(&self) -> Result<bool, ProtocolError> {
            Ok(false)
        }
        async fn post_receive_hook(&self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn generate_pack_streams_all_chunks() {
        let repo = DummyRepoAccess::default();
        let negotiator = PackNegotiator::new(&repo);
        let want = vec!["deadbeef".to_string()];
        let stream = negotiator
            .generate_pack(want.clone(), vec![])
            .await
            .unwrap();

        use futures::StreamExt;
        let chunks: Vec<Vec<u8>> = stream.collect().await;
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, b"PACK:deadbeef".to_vec());
    }

    #[tokio::test]
    async fn unpack_forwards_to_repo_access() {
        let repo = DummyRepoAccess::default();
        let negotiator = PackNegotiator::new(&repo);
        negotiator
            .unpack(Bytes::from_static(b"raw-pack-bytes"))
            .await
            .unwrap();
        assert_eq!(repo.indexed.lock().unwrap().len(), 1);
    }
}
