//! Factory for creating defect format handlers

use std::path::Path;

use crate::errors::{ObsError, ObsResult};
use super::ecsv::EcsvHandler;
use super::handler::{DefectFormat, DefectFormatHandler};
use super::table::TableHandler;
use super::text::TextHandler;

/// Factory for creating defect format handlers
pub struct DefectFormatFactory;

impl DefectFormatFactory {
    /// Create a handler for the given format
    pub fn create_handler(format: DefectFormat) -> Box<dyn DefectFormatHandler> {
        match format {
            DefectFormat::Table => Box::new(TableHandler),
            DefectFormat::Text => Box::new(TextHandler),
            DefectFormat::Ecsv => Box::new(EcsvHandler),
        }
    }

    /// Get the handler implied by a file extension
    pub fn get_handler_for_path(path: &Path) -> ObsResult<Box<dyn DefectFormatHandler>> {
        match DefectFormat::from_path(path) {
            Some(format) => Ok(Self::create_handler(format)),
            None => {
                let known: Vec<String> = Self::get_available_handlers().iter()
                    .flat_map(|handler| handler.format().extensions().iter().map(|ext| format!(".{}", ext)))
                    .collect();
                Err(ObsError::FormatError(format!(
                    "Cannot tell the defect format of {}; use one of {}", path.display(), known.join(", "))))
            }
        }
    }

    /// Get all available defect format handlers
    pub fn get_available_handlers() -> Vec<Box<dyn DefectFormatHandler>> {
        vec![
            Box::new(TableHandler),
            Box::new(TextHandler),
            Box::new(EcsvHandler),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_by_extension() {
        let handler = DefectFormatFactory::get_handler_for_path(Path::new("defects_c0.ecsv")).unwrap();
        assert_eq!(handler.format(), DefectFormat::Ecsv);
        let handler = DefectFormatFactory::get_handler_for_path(Path::new("defects.FITS")).unwrap();
        assert_eq!(handler.format(), DefectFormat::Table);
        let handler = DefectFormatFactory::get_handler_for_path(Path::new("bad.dat")).unwrap();
        assert_eq!(handler.format(), DefectFormat::Text);
        assert!(DefectFormatFactory::get_handler_for_path(Path::new("defects")).is_err());
        match DefectFormatFactory::get_handler_for_path(Path::new("defects.json")) {
            Err(ObsError::FormatError(msg)) => {
                assert!(msg.contains("defects.json"));
                assert!(msg.ends_with(".fits, .fit, .dat, .txt, .ecsv"), "{}", msg);
            }
            other => panic!("expected FormatError, got {:?}", other.map(|h| h.name())),
        }
    }

    #[test]
    fn every_format_has_a_handler() {
        let handlers = DefectFormatFactory::get_available_handlers();
        for format in [DefectFormat::Table, DefectFormat::Text, DefectFormat::Ecsv] {
            assert!(handlers.iter().any(|h| h.format() == format));
            for ext in format.extensions() {
                assert_eq!(DefectFormat::from_extension(ext), Some(format));
            }
        }
    }
}
