use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("no configuration file found for team `{0}`")]
    UnknownTeam(String),
    #[error("no sprint has been recorded for team `{0}`")]
    NoSprint(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure talking to Trello, GitHub or Slack.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("{service} request failed: {message}")]
    Transport { service: &'static str, message: String },
    #[error("{service} returned status {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: &'static str, message: String },
    #[error("{service} rate limited the request, retry after {retry_after_secs}s")]
    RateLimited { service: &'static str, retry_after_secs: u64 },
    #[error("{service} rejected the call: {message}")]
    Rejected { service: &'static str, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("store failure: {0}")]
pub struct StoreError(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("could not read board data: {0}")]
    BoardRead(#[source] PortError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "I'm not sure what you are asking me to do.",
            Self::ServiceUnavailable { .. } => {
                "Something went wrong talking to Trello or the database, please check the logs."
            }
            Self::Internal { .. } => "Something went totally wrong, please check the logs.",
        }
    }
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Domain(error) => Self::Domain(error),
            WorkflowError::Store(error) => Self::Persistence(error.0),
            WorkflowError::BoardRead(error) | WorkflowError::Port(error) => {
                Self::Integration(error.to_string())
            }
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{
        ApplicationError, DomainError, InterfaceError, PortError, StoreError, WorkflowError,
    };

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::UnknownTeam("mcboard".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("mcboard")
        ));
    }

    #[test]
    fn board_read_failure_maps_to_service_unavailable() {
        let error = WorkflowError::BoardRead(PortError::Status {
            service: "trello",
            status: 401,
            body: "invalid token".to_owned(),
        });
        let interface = ApplicationError::from(error).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { ref message, .. }
            if message.contains("401")));
        assert_eq!(
            interface.user_message(),
            "Something went wrong talking to Trello or the database, please check the logs."
        );
    }

    #[test]
    fn store_error_maps_to_persistence() {
        let application =
            ApplicationError::from(WorkflowError::Store(StoreError("locked".to_owned())));
        assert_eq!(application, ApplicationError::Persistence("locked".to_owned()));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid app token".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(
            interface.user_message(),
            "Something went totally wrong, please check the logs."
        );
    }
}
