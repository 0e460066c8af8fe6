pub mod builder;
pub mod extract;
pub mod field;

pub use builder::{color_for_slot, field_position, BallKind, BlobBuilder, StrengthTable, PALETTE};
pub use extract::{extract_isosurface, SurfaceMesh, SurfaceVertex};
pub use field::{Metaball, MetaballField};
