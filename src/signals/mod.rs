pub mod moonshot;
pub mod rug;

pub use moonshot::MoonshotClassifier;
pub use rug::RugClassifier;
