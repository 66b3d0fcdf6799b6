use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Load,
    SymbolNotFound,
    Invocation,
    ManagedMarshal,
    Usage,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    symbol: Option<&'static str>,
    operation: Option<&'static str>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            symbol: None,
            operation: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exported name that failed to resolve, for `SymbolNotFound`.
    pub fn symbol(&self) -> Option<&'static str> {
        self.symbol
    }

    /// Engine operation that reported the failure, for `Invocation`.
    pub fn operation(&self) -> Option<&'static str> {
        self.operation
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_symbol(mut self, symbol: &'static str) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// True for kinds after which no further operation may run in the session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Load | ErrorKind::SymbolNotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(symbol) = self.symbol {
            write!(f, " (symbol: {symbol})")?;
        }
        if let Some(operation) = self.operation {
            write!(f, " (operation: {operation})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn error_kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Load => 1,
        ErrorKind::SymbolNotFound => 2,
        ErrorKind::Invocation => 3,
        ErrorKind::ManagedMarshal => 4,
        ErrorKind::Usage => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, error_kind_code};
    use std::error::Error as _;

    #[test]
    fn kind_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Load, 1),
            (ErrorKind::SymbolNotFound, 2),
            (ErrorKind::Invocation, 3),
            (ErrorKind::ManagedMarshal, 4),
            (ErrorKind::Usage, 5),
        ];

        for (kind, code) in cases {
            assert_eq!(error_kind_code(kind), code);
        }
    }

    #[test]
    fn display_includes_symbol_and_path() {
        let err = Error::new(ErrorKind::SymbolNotFound)
            .with_message("required entry point missing")
            .with_symbol("get_num_des_from_file")
            .with_path("/opt/nitf-gnr/libnitf_gnr.so");
        let text = err.to_string();
        assert!(text.starts_with("SymbolNotFound: required entry point missing"));
        assert!(text.contains("(symbol: get_num_des_from_file)"));
        assert!(text.contains("(path: /opt/nitf-gnr/libnitf_gnr.so)"));
    }

    #[test]
    fn source_is_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::new(ErrorKind::Load).with_source(io);
        assert!(err.source().is_some());
        assert!(err.to_string().ends_with("no such file"));
    }

    #[test]
    fn only_load_and_resolution_are_session_fatal() {
        assert!(Error::new(ErrorKind::Load).is_session_fatal());
        assert!(Error::new(ErrorKind::SymbolNotFound).is_session_fatal());
        assert!(!Error::new(ErrorKind::Invocation).is_session_fatal());
        assert!(!Error::new(ErrorKind::ManagedMarshal).is_session_fatal());
        assert!(!Error::new(ErrorKind::Usage).is_session_fatal());
    }
}
