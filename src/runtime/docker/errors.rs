// ABOUTME: Translation of bollard failures into the shared runtime error kinds.
// ABOUTME: Keyed on the HTTP status of the engine's response.

use crate::runtime::error::{ResourceKind, RuntimeError};
use bollard::errors::Error as BollardError;

/// HTTP status of an engine response error, if the engine answered at all.
pub(super) fn status_of(e: &BollardError) -> Option<u16> {
    match e {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Engine message of a response error.
pub(super) fn message_of(e: &BollardError) -> &str {
    match e {
        BollardError::DockerResponseServerError { message, .. } => message,
        _ => "",
    }
}

fn is_connection_error(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::IOError { .. }
            | BollardError::SocketNotFoundError(_)
            | BollardError::RequestTimeoutError
            | BollardError::HyperResponseError { .. }
    )
}

/// Default mapping: 404 is a missing `kind`, transport failures mean the engine
/// is unreachable, everything else is an engine error naming the target.
pub(super) fn map_error(
    e: BollardError,
    endpoint: &str,
    op: &'static str,
    kind: ResourceKind,
    name: &str,
) -> RuntimeError {
    if status_of(&e) == Some(404) {
        return RuntimeError::not_found(kind, name);
    }
    if is_connection_error(&e) {
        return RuntimeError::EngineUnavailable {
            endpoint: endpoint.to_string(),
            source: Box::new(e),
        };
    }
    RuntimeError::engine(op, name, e)
}

/// Creation conflicts are name collisions.
pub(super) fn map_create_error(
    e: BollardError,
    endpoint: &str,
    kind: ResourceKind,
    name: &str,
) -> RuntimeError {
    if status_of(&e) == Some(409) {
        return RuntimeError::already_exists(kind, name);
    }
    map_error(e, endpoint, "create", kind, name)
}

/// Exec creation answers 409 when the node is not running.
pub(super) fn map_exec_error(e: BollardError, endpoint: &str, node: &str) -> RuntimeError {
    if status_of(&e) == Some(409) {
        return RuntimeError::engine("exec", node, format!("node is not running: {}", message_of(&e)));
    }
    map_error(e, endpoint, "exec", ResourceKind::Node, node)
}

/// Start and stop answer 304 when the node is already in the requested state.
pub(super) fn is_not_modified(e: &BollardError) -> bool {
    status_of(e) == Some(304)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ErrorKind;

    fn server(status_code: u16, message: &str) -> BollardError {
        BollardError::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        }
    }

    #[test]
    fn missing_maps_to_not_found() {
        let err = map_error(server(404, "no such container"), "/s", "start", ResourceKind::Node, "n1");
        assert!(matches!(
            err,
            RuntimeError::NotFound { kind: ResourceKind::Node, ref name } if name == "n1"
        ));
    }

    #[test]
    fn conflict_on_create_is_already_exists() {
        let err = map_create_error(server(409, "name in use"), "/s", ResourceKind::Node, "n1");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn conflict_elsewhere_is_engine_error() {
        let err = map_error(server(409, "volume in use"), "/s", "delete", ResourceKind::Volume, "v");
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn missing_socket_is_unavailable() {
        let err = map_error(
            BollardError::SocketNotFoundError("/nope".into()),
            "/nope",
            "info",
            ResourceKind::Node,
            "",
        );
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
        assert!(err.is_transient());
    }

    #[test]
    fn exec_on_stopped_node_names_the_node() {
        let err = map_exec_error(server(409, "container is paused"), "/s", "n1");
        assert!(err.to_string().contains("n1"));
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn not_modified_is_recognized() {
        assert!(is_not_modified(&server(304, "")));
        assert!(!is_not_modified(&server(500, "")));
    }
}
