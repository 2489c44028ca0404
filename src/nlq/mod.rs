// Natural-language question handling: word sets for matching, parameters for filling

pub mod extractor;
pub mod months;
pub mod normalizer;

pub use extractor::{extract_parameters, Identifier, ParameterExtractor, ParameterSet};
pub use months::month_number;
pub use normalizer::{normalize, Normalizer, WordSet, CREATOR_ID_MARKER, MONTH_MARKER, VIDEO_ID_MARKER};
