// src/error.rs
//
// Unified error handling for mockup-engine
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or configuration, recoverable
// - CodecError: Format/encoding issues and failed imaging operations
// - ResourceLimit: Memory/dimension limits, asset I/O
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide whether a re-run can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues, failed imaging primitives
    CodecError,
    /// Memory/dimension limits, asset transport
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// mockup-engine error types
#[derive(Debug, Error)]
pub enum MockupError {
    // Asset Errors
    #[error("Asset not found: {identifier}")]
    AssetNotFound { identifier: Cow<'static, str> },

    #[error("Failed to fetch asset '{identifier}': {source}")]
    AssetFetchFailed {
        identifier: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to present mockup: {message}")]
    SinkFailed { message: Cow<'static, str> },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Template dimensions unavailable: {message}")]
    DimensionUnavailable { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Operation Errors
    #[error(
        "Unsupported rotation angle: {degrees}. Only 0, 90, 180, 270 (and negatives) are supported"
    )]
    InvalidRotationAngle { degrees: i32 },

    #[error("Invalid resize dimensions: width={width}, height={height}")]
    InvalidResizeDimensions { width: u32, height: u32 },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Imaging operation '{operation}' failed: {message}")]
    OperationFailed {
        operation: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Configuration Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Pipeline Errors
    #[error("Stage '{stage}' is missing its input '{dependency}'")]
    MissingDependency {
        stage: Cow<'static, str>,
        dependency: Cow<'static, str>,
    },

    #[error("Illegal pipeline transition {from} -> {to}")]
    InvalidTransition {
        from: Cow<'static, str>,
        to: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for MockupError {
    fn clone(&self) -> Self {
        match self {
            Self::AssetNotFound { identifier } => Self::AssetNotFound {
                identifier: identifier.clone(),
            },
            Self::AssetFetchFailed { identifier, source } => Self::AssetFetchFailed {
                identifier: identifier.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::SinkFailed { message } => Self::SinkFailed {
                message: message.clone(),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::DimensionUnavailable { message } => Self::DimensionUnavailable {
                message: message.clone(),
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::InvalidRotationAngle { degrees } => {
                Self::InvalidRotationAngle { degrees: *degrees }
            }
            Self::InvalidResizeDimensions { width, height } => Self::InvalidResizeDimensions {
                width: *width,
                height: *height,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::OperationFailed { operation, message } => Self::OperationFailed {
                operation: operation.clone(),
                message: message.clone(),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::MissingDependency { stage, dependency } => Self::MissingDependency {
                stage: stage.clone(),
                dependency: dependency.clone(),
            },
            Self::InvalidTransition { from, to } => Self::InvalidTransition {
                from: from.clone(),
                to: to.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl MockupError {
    pub fn asset_not_found(identifier: impl Into<Cow<'static, str>>) -> Self {
        Self::AssetNotFound {
            identifier: identifier.into(),
        }
    }

    pub fn asset_fetch_failed(
        identifier: impl Into<Cow<'static, str>>,
        source: std::io::Error,
    ) -> Self {
        Self::AssetFetchFailed {
            identifier: identifier.into(),
            source,
        }
    }

    pub fn sink_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::SinkFailed {
            message: message.into(),
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DimensionUnavailable {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_rotation_angle(degrees: i32) -> Self {
        Self::InvalidRotationAngle { degrees }
    }

    pub fn invalid_resize_dimensions(width: u32, height: u32) -> Self {
        Self::InvalidResizeDimensions { width, height }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn operation_failed(
        operation: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_dependency(
        stage: impl Into<Cow<'static, str>>,
        dependency: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::MissingDependency {
            stage: stage.into(),
            dependency: dependency.into(),
        }
    }

    pub fn invalid_transition(
        from: impl Into<Cow<'static, str>>,
        to: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable,
    /// CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            // UserError: Invalid input, recoverable
            Self::AssetNotFound { .. }
            | Self::InvalidRotationAngle { .. }
            | Self::InvalidResizeDimensions { .. }
            | Self::InvalidArgument { .. }
            | Self::DimensionUnavailable { .. } => ErrorCategory::UserError,

            // CodecError: Format/encoding issues and failed primitives
            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. }
            | Self::OperationFailed { .. }
            // A missing dependency is always the shadow of an upstream
            // decode/operation failure.
            | Self::MissingDependency { .. } => ErrorCategory::CodecError,

            // ResourceLimit: Memory/dimension limits, asset transport
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::AssetFetchFailed { .. }
            | Self::SinkFailed { .. } => ErrorCategory::ResourceLimit,

            // InternalBug: Library bugs (should not happen)
            Self::InternalPanic { .. } | Self::InvalidTransition { .. } => {
                ErrorCategory::InternalBug
            }
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, MockupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MockupError::asset_not_found("assets/template.jpg");
        assert!(err.to_string().contains("assets/template.jpg"));

        let err = MockupError::missing_dependency("composite", "displacement_map");
        assert_eq!(
            err.to_string(),
            "Stage 'composite' is missing its input 'displacement_map'"
        );
    }

    #[test]
    fn test_error_recoverable() {
        assert!(MockupError::asset_not_found("mask.jpg").is_recoverable());
        assert!(MockupError::invalid_argument("percent", "130", "out of range").is_recoverable());
        assert!(MockupError::dimension_exceeds_limit(40000, 32768).is_recoverable());
        assert!(!MockupError::decode_failed("garbage").is_recoverable());
        assert!(!MockupError::operation_failed("distort", "singular").is_recoverable());
        assert!(!MockupError::internal_panic("test").is_recoverable());
    }

    #[test]
    fn test_error_category_mapping() {
        assert_eq!(
            MockupError::dimension_unavailable("no header").category(),
            ErrorCategory::UserError
        );
        assert_eq!(
            MockupError::decode_failed("test").category(),
            ErrorCategory::CodecError
        );
        assert_eq!(
            MockupError::missing_dependency("assemble", "artwork").category(),
            ErrorCategory::CodecError
        );
        assert_eq!(
            MockupError::asset_fetch_failed(
                "mask.jpg",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied)
            )
            .category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            MockupError::invalid_transition("Idle", "Done").category(),
            ErrorCategory::InternalBug
        );
    }

    #[test]
    fn test_clone_preserves_io_source_kind() {
        let err = MockupError::asset_fetch_failed(
            "artwork.png",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk"),
        );
        match err.clone() {
            MockupError::AssetFetchFailed { identifier, source } => {
                assert_eq!(identifier, "artwork.png");
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
                assert!(source.to_string().contains("slow disk"));
            }
            other => panic!("unexpected clone result: {other:?}"),
        }
    }

    #[test]
    fn test_category_as_str() {
        assert_eq!(ErrorCategory::UserError.as_str(), "UserError");
        assert_eq!(ErrorCategory::CodecError.as_str(), "CodecError");
        assert_eq!(ErrorCategory::ResourceLimit.as_str(), "ResourceLimit");
        assert_eq!(ErrorCategory::InternalBug.as_str(), "InternalBug");
    }
}
