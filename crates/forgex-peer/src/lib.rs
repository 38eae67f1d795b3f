//! HTTP peer client: the block-loading subset of the peer protocol.
//!
//! `GET /blocks?lastBlockId=…` returns a JSON array of blocks;
//! `GET /blocks/common?ids=a,b,c` returns the most recent shared block.
//! Malformed payloads are rejected by schema validation; a peer that keeps
//! failing validation is banned for the life of the process.

pub mod client;

pub use client::{CommonBlockInfo, PeerClient};
