pub mod skin;

#[cfg(feature = "backend-opencv")]
pub mod haar;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use skin::SkinRegionBackend;

#[cfg(feature = "backend-opencv")]
pub use haar::HaarCascadeBackend;
#[cfg(feature = "backend-tract")]
pub use tract::TractFaceBackend;
