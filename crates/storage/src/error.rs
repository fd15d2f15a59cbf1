use armory_core::DomainError;
use mongodb::error::{Error, ErrorKind, WriteFailure, RETRYABLE_WRITE_ERROR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeClass {
    Temporary,
    Conflict,
    Other,
}

/// Server error codes worth retrying.
fn classify_code(code: i32) -> CodeClass {
    match code {
        6       // HostUnreachable
        | 7     // HostNotFound
        | 24    // LockTimeout
        | 46    // LockBusy
        | 50    // ExceededTimeLimit
        | 89    // NetworkTimeout
        | 91    // ShutdownInProgress
        | 94    // NotYetInitialized
        | 101   // OutdatedClient
        | 107   // LockFailed
        | 109   // ConfigurationInProgress
        | 146   // ExceededMemoryLimit
        | 164   // InitialSyncActive
        | 202   // NetworkInterfaceExceededTimeLimit
        | 208   // TooManyLocks
        | 9001  // SocketException
        => CodeClass::Temporary,
        84 | 11000 | 11001 => CodeClass::Conflict,
        _ => CodeClass::Other,
    }
}

fn from_code(code: i32, detail: String) -> DomainError {
    match classify_code(code) {
        CodeClass::Temporary => DomainError::Temporary(detail),
        CodeClass::Conflict => DomainError::Conflict(detail),
        CodeClass::Other => DomainError::Internal(detail),
    }
}

/// Maps a driver error onto the domain taxonomy. `context` names the failed operation.
pub fn classify(err: &Error, context: &str) -> DomainError {
    let detail = format!("{context}: {err}");

    if err.contains_label(RETRYABLE_WRITE_ERROR) {
        return DomainError::Temporary(detail);
    }

    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => DomainError::Temporary(detail),
        ErrorKind::Authentication { .. } => DomainError::Unavailable(detail),
        ErrorKind::Command(command) => from_code(command.code, detail),
        ErrorKind::Write(WriteFailure::WriteError(write)) => from_code(write.code, detail),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
            from_code(concern.code, detail)
        }
        _ => DomainError::Internal(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_server_codes_are_temporary() {
        for code in [6, 7, 50, 89, 91, 9001] {
            assert_eq!(classify_code(code), CodeClass::Temporary, "code {code}");
        }
    }

    #[test]
    fn duplicate_key_codes_are_conflicts() {
        for code in [84, 11000, 11001] {
            assert_eq!(classify_code(code), CodeClass::Conflict, "code {code}");
        }
    }

    #[test]
    fn unknown_codes_are_internal() {
        assert_eq!(classify_code(2), CodeClass::Other);
        assert!(matches!(
            from_code(48, "create collection: NamespaceExists".into()),
            DomainError::Internal(ref msg) if msg.contains("NamespaceExists")
        ));
    }

    #[test]
    fn network_failures_are_temporary() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let classified = classify(&Error::from(io), "find character");
        assert!(matches!(
            classified,
            DomainError::Temporary(ref msg) if msg.starts_with("find character")
        ));
    }
}
