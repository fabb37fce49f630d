use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required field: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Serial number already registered: {0}")]
    SerialAlreadyRegistered(String),

    #[error("Serial number already exists: {0}")]
    DuplicateSerial(String),

    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),

    #[error("Image upload failed: {0}")]
    UploadFailed(String),

    #[error("Page creation failed: {0}")]
    PageCreationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Message shown to the person who submitted the form.
    pub fn notice(&self) -> String {
        match self {
            Error::Validation(field) => format!("Please fill in the {} field.", field),
            Error::Authorization(_) => {
                "You are not allowed to register this item.".to_string()
            }
            Error::SerialAlreadyRegistered(_) => {
                "This serial number has already been registered.".to_string()
            }
            Error::DuplicateSerial(serial) => {
                format!("Serial number {} already exists.", serial)
            }
            Error::UnsupportedImageType(_) => {
                "Only JPG, PNG, or GIF images are allowed.".to_string()
            }
            Error::UploadFailed(_) => "Image upload failed. Please try again.".to_string(),
            Error::PageCreationFailed(_) => {
                "Something went wrong. We could not generate your page.".to_string()
            }
            Error::NotFound(what) => format!("{} could not be found.", what),
            Error::Redis(_) | Error::JsonSerialization(_) | Error::Io(_) | Error::Other(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
        }
    }

    /// Whether the failure was caused by the submitted data rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Authorization(_)
                | Error::SerialAlreadyRegistered(_)
                | Error::DuplicateSerial(_)
                | Error::UnsupportedImageType(_)
                | Error::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_hides_infrastructure_details() {
        let err = Error::Redis("connection refused 10.0.0.4:6379".to_string());
        assert!(!err.notice().contains("10.0.0.4"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_serial_already_registered_notice() {
        let err = Error::SerialAlreadyRegistered("SN-1".to_string());
        assert_eq!(
            err.notice(),
            "This serial number has already been registered."
        );
        assert!(err.is_client_error());
    }
}
