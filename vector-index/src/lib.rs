//! # Vector Index
//!
//! Exact nearest-neighbor search over the chunk vectors of one category,
//! plus the on-disk format those indexes are persisted in.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Vector Index                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Category ──► IndexLayout ──► <root>/<category>/index.json      │
//! │     │                         <root>/<category>/texts.txt       │
//! │     ▼                                   ▲                       │
//! │  VectorIndex ◄──── persist::load ───────┘                       │
//! │     │        ───── persist::save ──────►                        │
//! │     ▼                                                           │
//! │  search (brute-force squared L2, stable order)                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Search is an exact scan over every stored vector, sized for corpora that
//! fit on one machine.

pub mod category;
pub mod distance;
pub mod error;
pub mod index;
pub mod persist;

pub use category::Category;
pub use distance::{nearest, squared_l2};
pub use error::{IndexError, Result};
pub use index::{Neighbor, Vector, VectorIndex};
pub use persist::IndexLayout;
