pub mod generation;
pub mod image_manager;
pub mod repository;

pub use generation::{GeneratedImage, GenerationProvider, GenerationRequest, LlmGenerationService};
pub use image_manager::{ImageManager, ImageStore};
pub use repository::EntryRepository;
