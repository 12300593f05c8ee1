//! Foundation types for Gantry.
//!
//! This crate provides the identifier, partition, and lifecycle types used
//! throughout the aggregation pipeline. Every other Gantry crate depends on
//! `gantry-types`.
//!
//! # Key Types
//!
//! - [`PieceId`] — content commitment digest for a piece or aggregate, with
//!   the legacy height-parameterized conversion
//! - [`ContentId`] — content-addressed object-store key (BLAKE3)
//! - [`GroupKey`] — validated partition/tenancy key
//! - [`Piece`] / [`PieceStatus`] — an ingested content unit and its one-way
//!   `Pending -> Included` lifecycle
//! - [`ContainerId`] — UUID v7 allocation hint for containers
//! - [`ContainerStatus`] — the forward-only container state machine

pub mod container;
pub mod content;
pub mod error;
pub mod group;
pub mod piece;
pub mod temporal;

pub use container::{ContainerId, ContainerStatus};
pub use content::ContentId;
pub use error::TypeError;
pub use group::GroupKey;
pub use piece::{Piece, PieceId, PieceRef, PieceStatus};
pub use temporal::epoch_ms;
