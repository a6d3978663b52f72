#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use pointprep_3d as k3d;
