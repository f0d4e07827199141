//! Wire messages for datasets and model checkpoints.

/// Row-major dense matrix.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Matrix {
    #[prost(uint32, tag = "1")]
    pub rows: u32,
    #[prost(uint32, tag = "2")]
    pub cols: u32,
    #[prost(float, repeated, tag = "3")]
    pub values: ::prost::alloc::vec::Vec<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ActivationKind {
    Identity = 0,
    Relu = 1,
    Sigmoid = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DenseLayerProto {
    #[prost(message, optional, tag = "1")]
    pub weights: ::core::option::Option<Matrix>,
    #[prost(float, repeated, tag = "2")]
    pub bias: ::prost::alloc::vec::Vec<f32>,
    #[prost(enumeration = "ActivationKind", tag = "3")]
    pub activation: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetworkProto {
    #[prost(message, repeated, tag = "1")]
    pub layers: ::prost::alloc::vec::Vec<DenseLayerProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AutoencoderCheckpoint {
    #[prost(message, optional, tag = "1")]
    pub encoder: ::core::option::Option<NetworkProto>,
    #[prost(message, optional, tag = "2")]
    pub decoder: ::core::option::Option<NetworkProto>,
    #[prost(float, tag = "3")]
    pub reconstruction_loss: f32,
    #[prost(message, optional, tag = "4")]
    pub created_at: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncoderCheckpoint {
    #[prost(message, optional, tag = "1")]
    pub encoder: ::core::option::Option<NetworkProto>,
    #[prost(message, optional, tag = "2")]
    pub created_at: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecCheckpoint {
    #[prost(message, optional, tag = "1")]
    pub encoder: ::core::option::Option<NetworkProto>,
    #[prost(float, tag = "2")]
    pub alpha: f32,
    #[prost(message, optional, tag = "3")]
    pub centers: ::core::option::Option<Matrix>,
    #[prost(uint64, tag = "4")]
    pub iterations: u64,
    #[prost(bool, tag = "5")]
    pub converged: bool,
    #[prost(message, optional, tag = "6")]
    pub created_at: ::core::option::Option<::prost_types::Timestamp>,
}

/// Flattened images, one row per sample. `labels` is empty for unlabeled data.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DatasetProto {
    #[prost(message, optional, tag = "1")]
    pub images: ::core::option::Option<Matrix>,
    #[prost(uint32, repeated, tag = "2")]
    pub labels: ::prost::alloc::vec::Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EmbeddingsProto {
    #[prost(message, optional, tag = "1")]
    pub embeddings: ::core::option::Option<Matrix>,
    #[prost(uint32, repeated, tag = "2")]
    pub labels: ::prost::alloc::vec::Vec<u32>,
    #[prost(uint32, repeated, tag = "3")]
    pub predictions: ::prost::alloc::vec::Vec<u32>,
}
