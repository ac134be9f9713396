// Copyright (c) 2026 The bestman-rs Authors
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Error type returned by vendor SDK capability objects.
///
/// Vendor errors are never reinterpreted, they are wrapped into
/// [`HardwareException`](`BestmanException::HardwareException`) and handed to the caller as-is.
pub type SdkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type of vendor SDK capability calls.
pub type SdkResult<T> = Result<T, SdkError>;

/// Represents all kind of errors which can occur while configuring, connecting or commanding a robot.
#[derive(Error, Debug)]
pub enum BestmanException {
    /// ConfigurationException is returned if a configuration is invalid or incomplete.
    /// It is always raised while the configuration is constructed and never reaches hardware.
    #[error("Invalid robot configuration: {message}")]
    ConfigurationException { message: String },

    /// UnsupportedConfigurationException is returned by the factory if no driver is
    /// registered for the type tag of a configuration.
    #[error("Unsupported robot configuration type {type_tag:?}. Registered: {registered:?}")]
    UnsupportedConfigurationException {
        /// Type tag of the presented configuration.
        type_tag: String,
        /// All currently registered type tags.
        registered: Vec<String>,
    },

    /// ConnectionException is returned if the vendor handle cannot be created.
    /// The driver is guaranteed to be disconnected afterwards.
    #[error("{message}")]
    ConnectionException {
        /// Explanatory string.
        message: String,
        /// Error reported by the vendor SDK, if any.
        #[source]
        source: Option<SdkError>,
    },

    /// PreconditionException is returned before any hardware call is attempted, e.g. when the
    /// robot is in the wrong mode or a vector has the wrong length.
    #[error("{message}")]
    PreconditionException { message: String },

    /// NotImplementedException is returned for contract operations the vendor hardware cannot
    /// realize. This is a capability gap, not a transient fault.
    #[error("{operation} is not supported by the {type_tag} driver")]
    NotImplementedException {
        /// Name of the contract operation.
        operation: &'static str,
        /// Type tag of the driver.
        type_tag: String,
    },

    /// HardwareException wraps an error raised by the vendor SDK during a call.
    #[error("{0}")]
    HardwareException(#[from] SdkError),

    /// TrajectoryException is returned if a recorded trajectory cannot be read.
    #[error("{message}")]
    TrajectoryException { message: String },
}

/// creates a PreconditionException from anything that can be displayed
pub(crate) fn create_precondition_exception(message: impl Into<String>) -> BestmanException {
    BestmanException::PreconditionException {
        message: message.into(),
    }
}

/// creates a ConfigurationException from anything that can be displayed
pub(crate) fn create_configuration_exception(message: impl Into<String>) -> BestmanException {
    BestmanException::ConfigurationException {
        message: message.into(),
    }
}

/// Result type which can have BestmanException as Error
pub type BestmanResult<T> = Result<T, BestmanException>;
