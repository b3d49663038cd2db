pub mod frame_difference;
pub mod mixture;
pub mod running_average;

pub use frame_difference::FrameDifferenceModel;
pub use mixture::GaussianMixtureModel;
pub use running_average::RunningAverageModel;
