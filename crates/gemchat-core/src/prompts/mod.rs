pub mod agri;

pub use agri::{CropQuery, Language, build_recommendation_prompt, format_recommendation};
