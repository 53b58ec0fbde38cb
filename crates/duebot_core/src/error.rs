use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("io_error - {0}")]
    Io(String),
    /// The task owner is not known to the notification sink.
    #[error("unknown_recipient - {0}")]
    UnknownRecipient(String),
    /// The sink was reachable in principle but the delivery did not go through.
    #[error("delivery_failed - {0}")]
    Delivery(String),
}

impl AppError {
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn unknown_recipient<M: Into<String>>(message: M) -> Self {
        Self::UnknownRecipient(message.into())
    }

    pub fn delivery<M: Into<String>>(message: M) -> Self {
        Self::Delivery(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidData(_) => "invalid_data",
            Self::Io(_) => "io_error",
            Self::UnknownRecipient(_) => "unknown_recipient",
            Self::Delivery(_) => "delivery_failed",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput(message)
            | Self::InvalidData(message)
            | Self::Io(message)
            | Self::UnknownRecipient(message)
            | Self::Delivery(message) => message,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
