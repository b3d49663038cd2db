mod background;
mod backends;
mod blob;
mod result;

pub use background::{build_background_model, BackgroundModel};
pub use backends::{FrameDifferenceModel, GaussianMixtureModel, RunningAverageModel};
pub use blob::BlobExtractor;
pub use result::{BoundingBox, Detection};
