//! Signal-processing building blocks: windows, spectra, features, noise gate
//! and the pre-estimation filter chain.

pub mod features;
pub mod gate;
pub mod preprocess;
pub mod spectrum;
pub mod window;

pub use features::{rms, SpectralFeatures};
pub use gate::NoiseGate;
pub use preprocess::Preprocessor;
pub use spectrum::SpectrumAnalyzer;
pub use window::WindowType;
