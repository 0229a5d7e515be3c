//! Pattern tables for classifying transport and engine errors.
//!
//! Classification happens once, where a driver or SSH error first surfaces.
//! The tables are plain data so they can be inspected and tested on their own:
//!
//! - `MYSQL_CODE_CLASSES` maps MySQL server error numbers to a class
//! - `MESSAGE_PATTERNS` maps lowercase message substrings to a class
//! - `user_message` maps a class to the fixed user-facing text

use serde::{Deserialize, Serialize};

/// What an error message turned out to be about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Connect or read exceeded its deadline
    Timeout,
    /// Nothing accepted the TCP connection
    ConnectionRefused,
    /// Host name could not be resolved
    UnknownHost,
    /// Server rejected the credentials
    AccessDenied,
    /// SQL could not be parsed
    Syntax,
    /// Database, table or column does not exist
    MissingObject,
    /// Unique or primary key violation
    Duplicate,
    /// Foreign key constraint violation
    ForeignKey,
    /// Lock wait timeout or deadlock
    Lock,
    /// Authenticated user lacks a privilege
    PermissionDenied,
    /// No pattern matched
    Unclassified,
}

/// MySQL server error numbers with a well-known meaning.
///
/// See the server error reference; only codes users routinely hit are listed.
pub const MYSQL_CODE_CLASSES: &[(u16, ErrorClass)] = &[
    (1044, ErrorClass::PermissionDenied),
    (1045, ErrorClass::AccessDenied),
    (1049, ErrorClass::MissingObject),
    (1051, ErrorClass::MissingObject),
    (1054, ErrorClass::MissingObject),
    (1060, ErrorClass::Duplicate),
    (1062, ErrorClass::Duplicate),
    (1064, ErrorClass::Syntax),
    (1142, ErrorClass::PermissionDenied),
    (1143, ErrorClass::PermissionDenied),
    (1146, ErrorClass::MissingObject),
    (1205, ErrorClass::Lock),
    (1213, ErrorClass::Lock),
    (1216, ErrorClass::ForeignKey),
    (1217, ErrorClass::ForeignKey),
    (1227, ErrorClass::PermissionDenied),
    (1451, ErrorClass::ForeignKey),
    (1452, ErrorClass::ForeignKey),
    (2003, ErrorClass::ConnectionRefused),
    (2005, ErrorClass::UnknownHost),
    (2013, ErrorClass::Timeout),
];

/// Lowercase substrings checked in order; the first hit wins.
///
/// Lock patterns come before the timeout patterns because the server reports
/// "Lock wait timeout exceeded" for lock contention.
pub const MESSAGE_PATTERNS: &[(&str, ErrorClass)] = &[
    ("lock wait", ErrorClass::Lock),
    ("deadlock", ErrorClass::Lock),
    ("timed out", ErrorClass::Timeout),
    ("timeout", ErrorClass::Timeout),
    ("connection refused", ErrorClass::ConnectionRefused),
    ("refused", ErrorClass::ConnectionRefused),
    ("unknown host", ErrorClass::UnknownHost),
    ("name or service not known", ErrorClass::UnknownHost),
    ("failed to lookup address", ErrorClass::UnknownHost),
    ("no such host", ErrorClass::UnknownHost),
    ("nodename nor servname", ErrorClass::UnknownHost),
    ("command denied", ErrorClass::PermissionDenied),
    ("access denied", ErrorClass::AccessDenied),
    ("authentication", ErrorClass::AccessDenied),
    ("syntax", ErrorClass::Syntax),
    ("doesn't exist", ErrorClass::MissingObject),
    ("unknown database", ErrorClass::MissingObject),
    ("unknown table", ErrorClass::MissingObject),
    ("unknown column", ErrorClass::MissingObject),
    ("duplicate", ErrorClass::Duplicate),
    ("foreign key", ErrorClass::ForeignKey),
    ("lock", ErrorClass::Lock),
    ("permission", ErrorClass::PermissionDenied),
];

/// Classify a MySQL server error number.
pub fn classify_code(code: u16) -> Option<ErrorClass> {
    MYSQL_CODE_CLASSES.iter().find(|(c, _)| *c == code).map(|(_, class)| *class)
}

/// Classify an error by its message text.
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, class)| *class)
        .unwrap_or(ErrorClass::Unclassified)
}

/// Classify using the server code when known, otherwise the message.
pub fn classify(code: Option<u16>, message: &str) -> ErrorClass {
    code.and_then(classify_code).unwrap_or_else(|| classify_message(message))
}

/// Fixed user-facing text for an error class.
pub fn user_message(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::Timeout => "The server did not respond in time. Check your network and try again.",
        ErrorClass::ConnectionRefused => {
            "The server refused the connection. Check the host, port and that the server is running."
        }
        ErrorClass::UnknownHost => "The host name could not be resolved. Check the server address.",
        ErrorClass::AccessDenied => "Access denied. Check the username and password.",
        ErrorClass::Syntax => "The SQL statement has a syntax error.",
        ErrorClass::MissingObject => "The database, table or column does not exist.",
        ErrorClass::Duplicate => "A row with the same unique key already exists.",
        ErrorClass::ForeignKey => "The change violates a foreign key constraint.",
        ErrorClass::Lock => "The table is locked by another session. Try again shortly.",
        ErrorClass::PermissionDenied => "You do not have permission to perform this operation.",
        ErrorClass::Unclassified => "An unexpected error occurred.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message_patterns() {
        assert_eq!(classify_message("Connection refused (os error 111)"), ErrorClass::ConnectionRefused);
        assert_eq!(classify_message("operation timed out"), ErrorClass::Timeout);
        assert_eq!(
            classify_message("failed to lookup address information: Name or service not known"),
            ErrorClass::UnknownHost
        );
        assert_eq!(
            classify_message("Access denied for user 'root'@'10.0.0.2' (using password: YES)"),
            ErrorClass::AccessDenied
        );
        assert_eq!(
            classify_message("You have an error in your SQL syntax; check the manual"),
            ErrorClass::Syntax
        );
        assert_eq!(classify_message("Table 'shop.orders' doesn't exist"), ErrorClass::MissingObject);
        assert_eq!(classify_message("Duplicate entry '1' for key 'PRIMARY'"), ErrorClass::Duplicate);
        assert_eq!(
            classify_message("Cannot delete or update a parent row: a foreign key constraint fails"),
            ErrorClass::ForeignKey
        );
        assert_eq!(classify_message("something odd happened"), ErrorClass::Unclassified);
    }

    #[test]
    fn test_lock_wait_timeout_is_lock_not_timeout() {
        assert_eq!(
            classify_message("Lock wait timeout exceeded; try restarting transaction"),
            ErrorClass::Lock
        );
    }

    #[test]
    fn test_command_denied_is_permission() {
        assert_eq!(
            classify_message("DROP command denied to user 'app'@'%' for table 'users'"),
            ErrorClass::PermissionDenied
        );
    }

    #[test]
    fn test_code_takes_precedence_over_message() {
        assert_eq!(classify(Some(1062), "whatever"), ErrorClass::Duplicate);
        assert_eq!(classify(Some(9999), "syntax error"), ErrorClass::Syntax);
        assert_eq!(classify(None, "deadlock found"), ErrorClass::Lock);
    }

    #[test]
    fn test_every_class_has_message() {
        let classes = [
            ErrorClass::Timeout,
            ErrorClass::ConnectionRefused,
            ErrorClass::UnknownHost,
            ErrorClass::AccessDenied,
            ErrorClass::Syntax,
            ErrorClass::MissingObject,
            ErrorClass::Duplicate,
            ErrorClass::ForeignKey,
            ErrorClass::Lock,
            ErrorClass::PermissionDenied,
            ErrorClass::Unclassified,
        ];
        for class in classes {
            assert!(!user_message(class).is_empty(), "{class:?} has no message");
        }
    }
}
