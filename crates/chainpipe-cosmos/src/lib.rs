//! chainpipe-cosmos: CometBFT/Cosmos SDK adapters for ChainPipe.
//!
//! - [`client::CometRpcClient`]: [`ChainClient`](chainpipe_core::ChainClient)
//!   over CometBFT JSON-RPC (`status`, `block`, `block_results`, `blockchain`)
//! - [`codec::ProtoCodec`]: [`Codec`](chainpipe_core::Codec) for protobuf
//!   transactions and typed SDK events

pub mod client;
pub mod codec;
pub mod proto;
pub mod rpc;

pub use client::{CometRpcClient, RpcClientConfig, RpcError};
pub use codec::{MessageDecoder, ProtoCodec};
